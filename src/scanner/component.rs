//! Component preprocessing
//!
//! Turns raw MCP listings into [`Component`]s with their parameter analysis
//! computed once, up front. Everything downstream branches on
//! `parameter_analysis` instead of re-inspecting schemas.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::{Prompt, Resource, ResourceTemplate, Tool};

use super::finding::ComponentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// Fixed URI
    Static,
    /// URI template with `{param}` placeholders
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterAnalysis {
    pub has_parameters: bool,
    pub parameter_count: usize,
    pub parameters: Vec<ParameterInfo>,
    pub requires_generation: bool,
}

impl ParameterAnalysis {
    pub fn from_parameters(parameters: Vec<ParameterInfo>) -> Self {
        let count = parameters.len();
        Self {
            has_parameters: count > 0,
            parameter_count: count,
            parameters,
            requires_generation: count > 0,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }
}

/// A tool, prompt or resource ready for scanning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub kind: ComponentKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Listing entry as the server sent it
    pub definition: Value,
    pub parameter_analysis: ParameterAnalysis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceType>,
}

impl Component {
    pub fn has_parameters(&self) -> bool {
        self.parameter_analysis.has_parameters
    }

    /// Name followed by URI when there is one, for log lines
    pub fn display_name(&self) -> String {
        match &self.uri {
            Some(uri) if uri != &self.name => format!("{} ({})", self.name, uri),
            _ => self.name.clone(),
        }
    }
}

fn uri_param_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^{}]+)\}").ok()).as_ref()
}

/// Placeholder names in a URI template, in order, duplicates collapsed.
pub fn extract_uri_parameters(uri: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let Some(re) = uri_param_regex() else {
        return names;
    };
    for cap in re.captures_iter(uri) {
        // RFC 6570 operators such as `{?query}` or `{+path}`
        let name = cap[1].trim().trim_start_matches(['+', '#', '.', '/', ';', '?', '&']);
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Substitute every placeholder in `template` from `params`. Strings are
/// inserted verbatim, other values as compact JSON, missing names as "".
pub fn resolve_uri_template(template: &str, params: &serde_json::Map<String, Value>) -> String {
    let Some(re) = uri_param_regex() else {
        return template.to_string();
    };
    re.replace_all(template, |cap: &regex::Captures<'_>| {
        let name = cap[1].trim().trim_start_matches(['+', '#', '.', '/', ';', '?', '&']);
        match params.get(name) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    })
    .into_owned()
}

pub fn is_dynamic_uri(uri: &str) -> bool {
    uri_param_regex().is_some_and(|re| re.is_match(uri))
}

fn schema_type(schema: &Value) -> String {
    match schema.get("type") {
        Some(Value::String(t)) => t.clone(),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("|"),
        _ if schema.get("enum").is_some() => "enum".to_string(),
        _ => "any".to_string(),
    }
}

pub fn preprocess_tool(tool: &Tool) -> Component {
    let required: Vec<&str> = tool
        .input_schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let parameters = tool
        .input_schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(name, schema)| ParameterInfo {
                    name: name.clone(),
                    param_type: schema_type(schema),
                    required: required.contains(&name.as_str()),
                    description: schema
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default();

    Component {
        kind: ComponentKind::Tool,
        name: tool.name.clone(),
        uri: None,
        description: tool.description.clone(),
        definition: serde_json::to_value(tool).unwrap_or(Value::Null),
        parameter_analysis: ParameterAnalysis::from_parameters(parameters),
        resource_type: None,
    }
}

pub fn preprocess_prompt(prompt: &Prompt) -> Component {
    let parameters = prompt
        .arguments
        .iter()
        .flatten()
        .map(|arg| ParameterInfo {
            name: arg.name.clone(),
            param_type: "string".to_string(),
            required: arg.required.unwrap_or(false),
            description: arg.description.clone(),
        })
        .collect();

    Component {
        kind: ComponentKind::Prompt,
        name: prompt.name.clone(),
        uri: None,
        description: prompt.description.clone(),
        definition: serde_json::to_value(prompt).unwrap_or(Value::Null),
        parameter_analysis: ParameterAnalysis::from_parameters(parameters),
        resource_type: None,
    }
}

fn resource_component(
    name: &str,
    uri: &str,
    description: Option<&String>,
    definition: Value,
) -> Component {
    let dynamic = is_dynamic_uri(uri);
    let parameters = extract_uri_parameters(uri)
        .into_iter()
        .map(|name| ParameterInfo {
            name,
            param_type: "string".to_string(),
            required: true,
            description: None,
        })
        .collect();

    Component {
        kind: ComponentKind::Resource,
        name: name.to_string(),
        uri: Some(uri.to_string()),
        description: description.cloned(),
        definition,
        parameter_analysis: ParameterAnalysis::from_parameters(parameters),
        resource_type: Some(if dynamic {
            ResourceType::Dynamic
        } else {
            ResourceType::Static
        }),
    }
}

pub fn preprocess_resource(resource: &Resource) -> Component {
    resource_component(
        &resource.name,
        &resource.uri,
        resource.description.as_ref(),
        serde_json::to_value(resource).unwrap_or(Value::Null),
    )
}

pub fn preprocess_resource_template(template: &ResourceTemplate) -> Component {
    resource_component(
        &template.name,
        &template.uri_template,
        template.description.as_ref(),
        serde_json::to_value(template).unwrap_or(Value::Null),
    )
}

/// Raw listings as returned by the server (or supplied by the caller)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    #[serde(default)]
    pub tools: Vec<Tool>,
    #[serde(default)]
    pub prompts: Vec<Prompt>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub resource_templates: Vec<ResourceTemplate>,
}

#[derive(Debug, Clone, Default)]
pub struct PreprocessedInventory {
    pub tools: Vec<Component>,
    pub prompts: Vec<Component>,
    /// Static resources followed by templates
    pub resources: Vec<Component>,
}

impl PreprocessedInventory {
    pub fn len(&self) -> usize {
        self.tools.len() + self.prompts.len() + self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// "N of M tools require parameters; ..." for the scan log
    pub fn summary(&self) -> String {
        fn count(components: &[Component]) -> usize {
            components.iter().filter(|c| c.has_parameters()).count()
        }
        let dynamic = self
            .resources
            .iter()
            .filter(|c| c.resource_type == Some(ResourceType::Dynamic))
            .count();
        format!(
            "{} of {} tools require parameters; {} of {} prompts require arguments; {} of {} resources are dynamic templates",
            count(&self.tools),
            self.tools.len(),
            count(&self.prompts),
            self.prompts.len(),
            dynamic,
            self.resources.len()
        )
    }
}

pub fn preprocess_inventory(inventory: &Inventory) -> PreprocessedInventory {
    let preprocessed = PreprocessedInventory {
        tools: inventory.tools.iter().map(preprocess_tool).collect(),
        prompts: inventory.prompts.iter().map(preprocess_prompt).collect(),
        resources: inventory
            .resources
            .iter()
            .map(preprocess_resource)
            .chain(inventory.resource_templates.iter().map(preprocess_resource_template))
            .collect(),
    };
    tracing::info!("{}", preprocessed.summary());
    preprocessed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PromptArgument;
    use serde_json::json;

    #[test]
    fn tool_parameters_from_schema() {
        let tool = Tool {
            name: "read_file".to_string(),
            description: Some("Read a file".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File path"},
                    "encoding": {"type": ["string", "null"]},
                    "mode": {"enum": ["r", "rb"]}
                },
                "required": ["path"]
            }),
        };
        let component = preprocess_tool(&tool);
        let analysis = &component.parameter_analysis;

        assert!(analysis.has_parameters);
        assert!(analysis.requires_generation);
        assert_eq!(analysis.parameter_count, 3);

        let path = analysis.parameters.iter().find(|p| p.name == "path").unwrap();
        assert!(path.required);
        assert_eq!(path.description.as_deref(), Some("File path"));

        let encoding = analysis.parameters.iter().find(|p| p.name == "encoding").unwrap();
        assert_eq!(encoding.param_type, "string|null");
        assert!(!encoding.required);

        let mode = analysis.parameters.iter().find(|p| p.name == "mode").unwrap();
        assert_eq!(mode.param_type, "enum");
    }

    #[test]
    fn tool_without_schema_has_no_parameters() {
        let tool = Tool {
            name: "ping".to_string(),
            description: None,
            input_schema: Value::Null,
        };
        let component = preprocess_tool(&tool);
        assert!(!component.has_parameters());
        assert_eq!(component.parameter_analysis.parameter_count, 0);
        assert!(!component.parameter_analysis.requires_generation);
    }

    #[test]
    fn prompt_arguments_become_parameters() {
        let prompt = Prompt {
            name: "summarize".to_string(),
            description: None,
            arguments: Some(vec![PromptArgument {
                name: "text".to_string(),
                description: None,
                required: Some(true),
            }]),
        };
        let component = preprocess_prompt(&prompt);
        assert_eq!(component.kind, ComponentKind::Prompt);
        assert_eq!(component.parameter_analysis.names().collect::<Vec<_>>(), vec!["text"]);
        assert!(component.parameter_analysis.parameters[0].required);
    }

    #[test]
    fn uri_parameters_collapse_duplicates_in_order() {
        assert_eq!(
            extract_uri_parameters("db://{table}/{id}/{table}{?fields}"),
            vec!["table", "id", "fields"]
        );
        assert!(extract_uri_parameters("file:///etc/hosts").is_empty());
    }

    #[test]
    fn template_resolution_formats_values() {
        let params = json!({"table": "users", "id": 7, "fields": null})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(
            resolve_uri_template("db://{table}/{id}/{missing}{?fields}", &params),
            "db://users/7/"
        );
        assert_eq!(
            resolve_uri_template("file:///{+path}", &json!({"path": "../etc/passwd"}).as_object().cloned().unwrap()),
            "file:///../etc/passwd"
        );
    }

    #[test]
    fn resource_kind_follows_braces() {
        let fixed = preprocess_resource(&Resource {
            uri: "file:///config.json".to_string(),
            name: "config".to_string(),
            description: None,
            mime_type: None,
        });
        assert_eq!(fixed.resource_type, Some(ResourceType::Static));
        assert!(!fixed.has_parameters());

        let template = preprocess_resource_template(&ResourceTemplate {
            uri_template: "users://{user_id}/profile".to_string(),
            name: "profile".to_string(),
            description: None,
            mime_type: None,
        });
        assert_eq!(template.resource_type, Some(ResourceType::Dynamic));
        assert_eq!(template.uri.as_deref(), Some("users://{user_id}/profile"));
        assert_eq!(template.parameter_analysis.parameter_count, 1);
    }

    #[test]
    fn inventory_summary_counts() {
        let inventory = Inventory {
            tools: vec![
                Tool {
                    name: "ping".to_string(),
                    description: None,
                    input_schema: json!({"type": "object"}),
                },
                Tool {
                    name: "exec".to_string(),
                    description: None,
                    input_schema: json!({"properties": {"cmd": {"type": "string"}}}),
                },
            ],
            ..Default::default()
        };
        let preprocessed = preprocess_inventory(&inventory);
        assert_eq!(preprocessed.len(), 2);
        assert!(preprocessed.summary().starts_with("1 of 2 tools require parameters"));
    }
}
