use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    Tool,
    Hook,
}

impl ResourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Hook => "hook",
        }
    }

    /// Kinds a requirement of this category may declare
    pub fn valid_kinds(&self) -> &'static [&'static str] {
        match self {
            Self::Tool => &["command", "api", "library", "service"],
            Self::Hook => &["pre", "post", "error"],
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tool" => Ok(Self::Tool),
            "hook" => Ok(Self::Hook),
            other => Err(format!("unknown resource category '{}', expected tool or hook", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Command,
    Api,
    Library,
    Service,
}

impl FromStr for ToolKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "command" => Ok(Self::Command),
            "api" => Ok(Self::Api),
            "library" => Ok(Self::Library),
            "service" => Ok(Self::Service),
            _ => Err(()),
        }
    }
}

/// When a hook runs relative to the worker's executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPhase {
    Pre,
    Post,
    Error,
}

impl HookPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pre => "pre",
            Self::Post => "post",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookPhase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pre" => Ok(Self::Pre),
            "post" => Ok(Self::Post),
            "error" => Ok(Self::Error),
            _ => Err(()),
        }
    }
}

/// Abstract description of a tool or hook a task needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub name: String,
    pub category: ResourceCategory,
    /// Parsed against [`ResourceCategory::valid_kinds`] at synthesis time
    pub kind: String,
    pub description: String,
    pub parameters: Map<String, Value>,
    pub priority: u8,
    pub critical: bool,
}

impl ResourceRequirement {
    pub fn new(name: impl Into<String>, category: ResourceCategory, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category,
            kind: kind.into(),
            description: String::new(),
            parameters: Map::new(),
            priority: 50,
            critical: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(100);
        self
    }

    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Merge the fields of a JSON object into the parameter bag; other values are ignored
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        if let Value::Object(map) = parameters {
            self.parameters.extend(map);
        }
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }

    /// String array parameter; absent or malformed entries yield an empty list
    pub fn param_strings(&self, key: &str) -> Vec<String> {
        self.parameters
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the orchestrator should synthesize this before execution
    pub fn is_required(&self, priority_threshold: u8) -> bool {
        self.critical || self.priority > priority_threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImplementationShape {
    Function,
    ClassLike,
    CommandWrapper,
    ApiWrapper,
}

impl fmt::Display for ImplementationShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Function => "function",
            Self::ClassLike => "class-like",
            Self::CommandWrapper => "command-wrapper",
            Self::ApiWrapper => "api-wrapper",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookAction {
    Validate,
    Notify,
    Cleanup,
    Escalate,
    Rollback,
}

/// Declarative behaviour of a synthesized hook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookDescriptor {
    pub phase: HookPhase,
    pub action: HookAction,
    /// Task metadata keys a validation hook insists on
    pub required_metadata: Vec<String>,
    pub priority: u8,
    pub continue_on_failure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourcePayload {
    /// Text payload; `entry` names the statically registered handler that serves it
    Source {
        language: String,
        entry: String,
        code: String,
    },
    Command {
        program: String,
        base_args: Vec<String>,
        timeout_secs: Option<u64>,
    },
    Api {
        base_url: String,
        method: String,
        headers: BTreeMap<String, String>,
    },
    Hook(HookDescriptor),
}

/// Executable specification produced from a [`ResourceRequirement`]. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedResource {
    pub id: String,
    pub name: String,
    pub category: ResourceCategory,
    pub kind: String,
    pub description: String,
    pub shape: ImplementationShape,
    pub payload: ResourcePayload,
    /// Requirement parameters, consulted by handlers at invocation time
    pub parameters: Map<String, Value>,
    /// Human-readable rendering written out by export
    pub source: String,
    pub input_schema: Value,
    pub output_schema: Value,
    pub dependencies: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl SynthesizedResource {
    pub fn is_hook(&self) -> bool {
        self.category == ResourceCategory::Hook
    }

    pub fn hook_descriptor(&self) -> Option<&HookDescriptor> {
        match &self.payload {
            ResourcePayload::Hook(descriptor) => Some(descriptor),
            _ => None,
        }
    }
}
