//! Scan progress reporting
//!
//! Percentages are split into fixed bands: 0-10 for setup and listing,
//! 10-70 for tools and prompts (shared in proportion to their count),
//! 70-95 for resources and 95-100 for the summary. Reported values never
//! go backwards.

use std::sync::Arc;

use super::finding::ComponentKind;

/// Receives `(percent, message)` on every progress step
pub type ProgressCallback = Arc<dyn Fn(u8, &str) + Send + Sync>;

const LISTING_DONE: u8 = 10;
const INTERACTIVE_END: u8 = 70;
const RESOURCES_END: u8 = 95;
const COMPLETE: u8 = 100;

#[derive(Default)]
pub struct ProgressTracker {
    callback: Option<ProgressCallback>,
    current: u8,
    interactive_total: usize,
    interactive_done: usize,
    resource_total: usize,
    resource_done: usize,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("current", &self.current)
            .field("interactive", &(self.interactive_done, self.interactive_total))
            .field("resources", &(self.resource_done, self.resource_total))
            .finish()
    }
}

fn band(start: u8, end: u8, done: usize, total: usize) -> u8 {
    if total == 0 {
        return end;
    }
    let span = usize::from(end - start);
    let offset = span * done.min(total) / total;
    start + offset as u8
}

impl ProgressTracker {
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            ..Default::default()
        }
    }

    pub fn current(&self) -> u8 {
        self.current
    }

    /// Report `percent`, clamped so progress is monotonic and at most 100.
    pub fn report(&mut self, percent: u8, message: &str) {
        self.current = self.current.max(percent.min(COMPLETE));
        if let Some(callback) = &self.callback {
            callback(self.current, message);
        }
    }

    /// Component counts are known; the setup band is complete.
    pub fn listed(&mut self, tools_and_prompts: usize, resources: usize) {
        self.interactive_total = tools_and_prompts;
        self.resource_total = resources;
        self.report(
            LISTING_DONE,
            &format!(
                "Found {} tool(s)/prompt(s) and {} resource(s)",
                tools_and_prompts, resources
            ),
        );
    }

    pub fn component_started(&mut self, kind: ComponentKind, name: &str) {
        let percent = self.position(kind);
        self.report(percent, &format!("Analyzing {} {}", kind, name));
    }

    pub fn component_finished(&mut self, kind: ComponentKind, name: &str) {
        match kind {
            ComponentKind::Tool | ComponentKind::Prompt => self.interactive_done += 1,
            ComponentKind::Resource => self.resource_done += 1,
        }
        let percent = self.position(kind);
        self.report(percent, &format!("Finished {} {}", kind, name));
    }

    pub fn summarizing(&mut self) {
        self.report(RESOURCES_END, "Generating summary");
    }

    pub fn complete(&mut self) {
        self.report(COMPLETE, "Scan complete");
    }

    fn position(&self, kind: ComponentKind) -> u8 {
        match kind {
            ComponentKind::Tool | ComponentKind::Prompt => band(
                LISTING_DONE,
                INTERACTIVE_END,
                self.interactive_done,
                self.interactive_total,
            ),
            ComponentKind::Resource => band(
                INTERACTIVE_END,
                RESOURCES_END,
                self.resource_done,
                self.resource_total,
            ),
        }
    }
}
