//! Scan Engine - comprehensive scan orchestration
//!
//! Walks every component of a server through
//! `INIT -> TOOL_ANALYSIS -> PROMPT_ANALYSIS -> RESOURCE_ANALYSIS -> SUMMARY`.
//! Components are handled one at a time: static analysis first, then the
//! dynamic tests. A failure confined to one component is logged and the
//! scan moves on; only cancellation ends a running scan early.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::ai::{build_narrative_request, OracleClient};
use crate::client::McpClientTrait;
use crate::errors::{is_cancellation, Interrupted, ScanError};

use super::cancel::CancellationSignal;
use super::component::{preprocess_inventory, Component, Inventory, PreprocessedInventory};
use super::context::{ScanConfig, StepContext};
use super::executor::run_dynamic_tests;
use super::log::{LogType, ScanLog, ScanLogEntry};
use super::passive::PassiveReceiver;
use super::progress::ProgressCallback;
use super::results::{ComponentResult, ScanReport, StaticAnalysis};
use super::session::{ScanCoordinator, ScanPhase, ScanSession};
use super::static_analysis::analyze_component;

/// Everything a single scan needs besides the client
#[derive(Default)]
pub struct ScanRequest<'a> {
    pub server_name: String,
    /// Pre-enumerated components; listed from the client when absent
    pub inventory: Option<Inventory>,
    pub progress: Option<ProgressCallback>,
    /// Passive results drained during the summary phase
    pub passive: Option<&'a mut PassiveReceiver>,
    /// Caller-held signal; a fresh one is created when absent
    pub signal: Option<CancellationSignal>,
}

impl<'a> ScanRequest<'a> {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            ..Default::default()
        }
    }

    pub fn with_inventory(mut self, inventory: Inventory) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn with_passive(mut self, receiver: &'a mut PassiveReceiver) -> Self {
        self.passive = Some(receiver);
        self
    }

    pub fn with_signal(mut self, signal: CancellationSignal) -> Self {
        self.signal = Some(signal);
        self
    }
}

/// Comprehensive scan engine
pub struct ScanEngine {
    config: ScanConfig,
    oracle: Arc<OracleClient>,
    coordinator: ScanCoordinator,
    log: ScanLog,
}

impl ScanEngine {
    /// Engine with its own coordinator.
    pub fn new(config: ScanConfig, oracle: Arc<OracleClient>) -> Self {
        Self {
            config,
            oracle,
            coordinator: ScanCoordinator::new(),
            log: ScanLog::new(),
        }
    }

    /// Share `coordinator` with other engines, e.g. [`ScanCoordinator::global`].
    pub fn with_coordinator(mut self, coordinator: ScanCoordinator) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Log of the current (or most recent) scan. Clones share entries and
    /// listeners.
    pub fn log(&self) -> ScanLog {
        self.log.clone()
    }

    pub fn coordinator(&self) -> &ScanCoordinator {
        &self.coordinator
    }

    pub fn is_scanning(&self) -> bool {
        self.coordinator.is_busy()
    }

    /// Trip the active scan's signal. False when nothing is running.
    pub fn cancel_scan(&self) -> bool {
        let cancelled = self.coordinator.cancel_active();
        if cancelled {
            tracing::info!("Cancellation requested for the active scan");
        }
        cancelled
    }

    /// Run a full scan of the server behind `client`.
    pub async fn start_comprehensive_scan(
        &self,
        client: &mut dyn McpClientTrait,
        request: ScanRequest<'_>,
    ) -> Result<ScanReport, ScanError> {
        self.config.validate()?;

        let ScanRequest {
            server_name,
            inventory,
            progress,
            passive,
            signal,
        } = request;
        let signal = signal.unwrap_or_default();
        let mut session = ScanSession::new(&server_name, signal.clone(), self.log.clone(), progress);

        let _guard = match self.coordinator.begin(&session.id, signal) {
            Ok(guard) => guard,
            Err(e) => {
                self.log.emit(ScanLogEntry::new(
                    LogType::Error,
                    ScanPhase::Rejected,
                    "Scan rejected",
                    e.to_string(),
                ));
                return Err(e);
            }
        };

        self.log.clear();
        self.log.emit(
            ScanLogEntry::new(
                LogType::Info,
                ScanPhase::Init,
                "Scan started",
                format!("Comprehensive scan of {}", server_name),
            )
            .with_metadata("session", session.id.as_str())
            .with_metadata("llm_analysis", self.config.enable_llm_analysis)
            .with_metadata("auto_generate", self.config.auto_generate)
            .with_metadata("max_test_cases", self.config.max_test_cases as u64),
        );
        tracing::info!(session = %session.id, server = %server_name, "Starting comprehensive scan");

        match self.run(&mut session, client, inventory, passive).await {
            Ok(()) => {
                session.phase = ScanPhase::Done;
                session.report.duration_ms = session.elapsed_ms();
                session.progress.complete();
                self.log.emit(
                    ScanLogEntry::new(
                        LogType::Success,
                        ScanPhase::Done,
                        "Scan complete",
                        format!(
                            "Overall risk {}; {} issue(s) across {} component(s)",
                            session.report.overall_risk,
                            session.report.summary.total,
                            session.components_completed
                        ),
                    )
                    .with_duration(session.report.duration_ms),
                );
                Ok(session.report)
            }
            Err(Interrupted) => {
                session.phase = ScanPhase::Cancelled;
                let err = session.cancelled_error();
                self.log.emit(
                    ScanLogEntry::new(
                        LogType::Warning,
                        ScanPhase::Cancelled,
                        "Scan cancelled",
                        err.to_string(),
                    )
                    .with_duration(session.elapsed_ms()),
                );
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        session: &mut ScanSession,
        client: &mut dyn McpClientTrait,
        inventory: Option<Inventory>,
        passive: Option<&mut PassiveReceiver>,
    ) -> Result<(), Interrupted> {
        let signal = session.signal.clone();

        let inventory = match inventory {
            Some(inventory) => inventory,
            None => self.list_components(client, &signal).await?,
        };
        let components = preprocess_inventory(&inventory);
        self.log.info(ScanPhase::Init, "Components preprocessed", components.summary());
        session
            .progress
            .listed(components.tools.len() + components.prompts.len(), components.resources.len());

        let PreprocessedInventory {
            tools,
            prompts,
            resources,
        } = components;
        for (phase, list) in [
            (ScanPhase::ToolAnalysis, tools),
            (ScanPhase::PromptAnalysis, prompts),
            (ScanPhase::ResourceAnalysis, resources),
        ] {
            self.run_phase(session, client, phase, &list).await?;
        }

        self.summarize(session, passive).await
    }

    /// Fetch the inventory. A listing that fails counts as empty.
    async fn list_components(
        &self,
        client: &mut dyn McpClientTrait,
        signal: &CancellationSignal,
    ) -> Result<Inventory, Interrupted> {
        let inventory = Inventory {
            tools: self.listing(signal, "tools/list", client.list_tools()).await?,
            prompts: self.listing(signal, "prompts/list", client.list_prompts()).await?,
            resources: self
                .listing(signal, "resources/list", client.list_resources())
                .await?,
            resource_templates: self
                .listing(
                    signal,
                    "resources/templates/list",
                    client.list_resource_templates(),
                )
                .await?,
        };

        tracing::debug!(
            tools = inventory.tools.len(),
            prompts = inventory.prompts.len(),
            resources = inventory.resources.len(),
            templates = inventory.resource_templates.len(),
            "Listed components"
        );
        Ok(inventory)
    }

    async fn listing<T, F>(
        &self,
        signal: &CancellationSignal,
        method: &str,
        call: F,
    ) -> Result<Vec<T>, Interrupted>
    where
        F: Future<Output = Result<Vec<T>>>,
    {
        let secs = self.config.timeout_secs;
        let timed = async {
            match tokio::time::timeout(Duration::from_secs(secs), call).await {
                Ok(result) => result,
                Err(_) => Err(anyhow!("timed out after {}s", secs)),
            }
        };
        match signal.guard(timed).await {
            Ok(items) => Ok(items),
            Err(e) if is_cancellation(&e) => Err(Interrupted),
            Err(e) => {
                self.log.warning(
                    ScanPhase::Init,
                    "Listing failed",
                    format!("{} failed, treating as empty: {:#}", method, e),
                );
                Ok(Vec::new())
            }
        }
    }

    async fn run_phase(
        &self,
        session: &mut ScanSession,
        client: &mut dyn McpClientTrait,
        phase: ScanPhase,
        components: &[Component],
    ) -> Result<(), Interrupted> {
        session.phase = phase;
        let signal = session.signal.clone();
        let phase_start = Instant::now();
        tracing::debug!(phase = %phase, count = components.len(), "Entering phase");
        self.log.info(phase, "Phase started", format!("{} component(s)", components.len()));

        for component in components {
            signal.check()?;
            session.progress.component_started(component.kind, &component.name);

            let ctx = StepContext {
                oracle: &self.oracle,
                config: &self.config,
                signal: &signal,
                log: &self.log,
                phase,
            };
            match self.scan_component(ctx, client, component).await {
                Ok(result) => session.report.push(result),
                Err(e) if is_cancellation(&e) => return Err(Interrupted),
                Err(e) => {
                    self.log.emit(
                        ScanLogEntry::new(
                            LogType::Error,
                            phase,
                            "Component failed",
                            format!("{} could not be analyzed", component.display_name()),
                        )
                        .with_details(format!("{:#}", e))
                        .with_metadata("component", component.name.as_str()),
                    );
                }
            }

            session.components_completed += 1;
            session.progress.component_finished(component.kind, &component.name);
        }

        self.log.emit(
            ScanLogEntry::new(
                LogType::Success,
                phase,
                "Phase complete",
                format!("{} component(s) analyzed", components.len()),
            )
            .with_duration(phase_start.elapsed().as_millis() as u64),
        );
        Ok(())
    }

    async fn scan_component(
        &self,
        ctx: StepContext<'_>,
        client: &mut dyn McpClientTrait,
        component: &Component,
    ) -> Result<ComponentResult> {
        let mut result = ComponentResult::new(component);

        if self.config.enable_llm_analysis {
            let analysis = analyze_component(ctx, component).await?;
            if let StaticAnalysis::Parsed(issues) = &analysis {
                for issue in issues {
                    result.add_issue(issue.clone());
                }
            }
            result.static_analysis = analysis;
        }

        if self.config.auto_generate {
            run_dynamic_tests(ctx, client, component, &mut result).await?;
        }

        tracing::debug!(
            component = %component.name,
            kind = %component.kind,
            risk = %result.risk_level,
            issues = result.issues.len(),
            tests = result.test_results.len(),
            "Component analyzed"
        );
        Ok(result)
    }

    async fn summarize(
        &self,
        session: &mut ScanSession,
        passive: Option<&mut PassiveReceiver>,
    ) -> Result<(), Interrupted> {
        session.phase = ScanPhase::Summary;
        session.progress.summarizing();
        session.report.finalize();

        if let Some(receiver) = passive {
            let merged = session.report.merge_passive(receiver.drain());
            if merged > 0 {
                self.log.info(
                    ScanPhase::Summary,
                    "Passive results merged",
                    format!("{} passive result(s) folded into the report", merged),
                );
            }
        }

        if self.config.enable_llm_analysis {
            let ctx = StepContext {
                oracle: &self.oracle,
                config: &self.config,
                signal: &session.signal,
                log: &self.log,
                phase: ScanPhase::Summary,
            };
            let request = build_narrative_request(&session.report);
            match ctx.consult(&request).await {
                Ok(response) => {
                    let narrative = response.content.trim().to_string();
                    if !narrative.is_empty() {
                        session.report.narrative_analysis = Some(narrative);
                    }
                }
                Err(e) if is_cancellation(&e) => return Err(Interrupted),
                Err(e) => self.log.warning(
                    ScanPhase::Summary,
                    "Narrative unavailable",
                    format!("{:#}", e),
                ),
            }
        }

        self.log.info(
            ScanPhase::Summary,
            "Summary",
            format!(
                "{} critical, {} high, {} medium, {} low",
                session.report.summary.critical,
                session.report.summary.high,
                session.report.summary.medium,
                session.report.summary.low
            ),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{LlmProvider, MockProvider, RequestKind};
    use crate::client::MockMcpClient;
    use crate::scanner::finding::Severity;
    use crate::scanner::passive::{passive_channel, PassiveResult};
    use crate::scanner::finding::{ComponentKind, IssueRecord, IssueSource};

    fn engine(provider: MockProvider, config: ScanConfig) -> ScanEngine {
        let provider: Arc<dyn LlmProvider> = Arc::new(provider);
        ScanEngine::new(config, Arc::new(OracleClient::single(provider)))
    }

    #[tokio::test]
    async fn empty_server_produces_clean_report() {
        let engine = engine(MockProvider::new(), ScanConfig::default());
        let mut client = MockMcpClient::new();

        let report = engine
            .start_comprehensive_scan(&mut client, ScanRequest::new("empty"))
            .await
            .unwrap();
        assert_eq!(report.overall_risk, Severity::Low);
        assert_eq!(report.summary.total, 0);
        assert!(report.narrative_analysis.is_some());
        assert!(!engine.is_scanning());
    }

    #[tokio::test]
    async fn listing_failure_is_a_warning() {
        let engine = engine(MockProvider::new(), ScanConfig::default().with_llm_analysis(false));
        let mut client = MockMcpClient::new()
            .with_tool(MockMcpClient::simple_tool("ping", "Ping"))
            .with_list_failure("prompts/list", "Method not found");

        let report = engine
            .start_comprehensive_scan(&mut client, ScanRequest::new("server"))
            .await
            .unwrap();
        assert_eq!(report.tool_results.len(), 1);
        assert!(report.prompt_results.is_empty());
        assert!(engine
            .log()
            .entries()
            .iter()
            .any(|e| e.log_type == LogType::Warning && e.message.contains("prompts/list")));
    }

    #[tokio::test]
    async fn static_findings_raise_component_risk() {
        let provider = MockProvider::new().with_response(
            RequestKind::StaticAnalysis,
            r#"[{"type": "command_injection", "severity": "high", "description": "cmd reaches a shell"}]"#,
        );
        let engine = engine(provider, ScanConfig::default().with_auto_generate(false));
        let mut client =
            MockMcpClient::new().with_tool(MockMcpClient::string_tool("exec", "Run", &["cmd"]));

        let report = engine
            .start_comprehensive_scan(&mut client, ScanRequest::new("server"))
            .await
            .unwrap();
        let exec = report.find(ComponentKind::Tool, "exec").unwrap();
        assert_eq!(exec.risk_level, Severity::High);
        assert!(matches!(exec.static_analysis, StaticAnalysis::Parsed(ref v) if v.len() == 1));
        assert!(exec.test_results.is_empty());
        assert_eq!(client.call_count().await, 0);
    }

    #[tokio::test]
    async fn passive_results_are_drained_in_summary() {
        let engine = engine(MockProvider::new(), ScanConfig::default().with_llm_analysis(false));
        let mut client = MockMcpClient::new().with_tool(MockMcpClient::simple_tool("ping", "Ping"));
        let (tx, mut rx) = passive_channel(8);
        tx.send(
            PassiveResult::new(ComponentKind::Tool, "ping").with_issue(IssueRecord::new(
                ComponentKind::Tool,
                IssueSource::Passive,
                "stack_trace",
                Severity::Medium,
                "trace in error",
            )),
        )
        .await
        .unwrap();

        let report = engine
            .start_comprehensive_scan(&mut client, ScanRequest::new("server").with_passive(&mut rx))
            .await
            .unwrap();
        let ping = report.find(ComponentKind::Tool, "ping").unwrap();
        assert_eq!(ping.risk_level, Severity::Medium);
        assert_eq!(ping.test_results.len(), 1);
        assert_eq!(report.overall_risk, Severity::Medium);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_session() {
        let engine = engine(MockProvider::new(), ScanConfig::default().with_timeout(0));
        let mut client = MockMcpClient::new();
        let err = engine
            .start_comprehensive_scan(&mut client, ScanRequest::new("server"))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidConfig { .. }));
        assert!(!engine.is_scanning());
    }
}
