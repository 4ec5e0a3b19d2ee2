//! Code templates, one per tool kind and hook phase.

use crate::error::{ForgeError, ForgeResult};
use crate::synthesis::types::{
    HookAction, HookDescriptor, HookPhase, ImplementationShape, ResourcePayload, ResourceRequirement,
};
use serde_json::{Value, json};
use std::borrow::Cow;
use std::collections::BTreeMap;

const DEFAULT_HANDLER: &str = "passthrough";

/// Template output before an identifier is assigned
#[derive(Debug, Clone)]
pub struct Rendered {
    pub shape: ImplementationShape,
    pub payload: ResourcePayload,
    pub source: String,
    pub input_schema: Value,
    pub output_schema: Value,
    pub dependencies: Vec<String>,
}

fn escape(value: &str) -> Cow<'_, str> {
    shell_escape::escape(Cow::Borrowed(value))
}

/// `snake_case` identifier derived from a resource name, always namespaced by `prefix`
/// so names like `eval` or `exec` never render as bare calls
fn identifier(prefix: &str, name: &str) -> String {
    let snake: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("{}_{}", prefix, snake)
}

fn type_name(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Single-line summary for a generated comment. Line breaks are collapsed.
fn doc_line(requirement: &ResourceRequirement) -> String {
    let text = if requirement.description.is_empty() {
        requirement.name.clone()
    } else {
        format!("{}: {}", requirement.name, requirement.description)
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn handler_name(requirement: &ResourceRequirement) -> String {
    requirement
        .param_str("handler")
        .unwrap_or(DEFAULT_HANDLER)
        .to_string()
}

pub fn command_wrapper(requirement: &ResourceRequirement) -> ForgeResult<Rendered> {
    let program = requirement
        .param_str("program")
        .filter(|program| !program.trim().is_empty())
        .ok_or_else(|| {
            ForgeError::code_generation(&requirement.name, "command tools need a 'program' parameter")
        })?
        .to_string();
    let base_args = requirement.param_strings("args");
    let timeout_secs = requirement.parameters.get("timeout_secs").and_then(Value::as_u64);

    let mut invocation = vec![escape(&program).into_owned()];
    invocation.extend(base_args.iter().map(|arg| escape(arg).into_owned()));

    let source = format!(
        "#!/bin/sh\n# {}\n# Parameters are passed as --flag value pairs after the base arguments.\nset -eu\nexec {} \"$@\"\n",
        doc_line(requirement),
        invocation.join(" ")
    );

    Ok(Rendered {
        shape: ImplementationShape::CommandWrapper,
        payload: ResourcePayload::Command {
            program: program.clone(),
            base_args,
            timeout_secs,
        },
        source,
        input_schema: json!({ "type": "object", "description": "serialized to --key value flags" }),
        output_schema: json!({
            "type": "object",
            "properties": {
                "stdout": { "type": "string" },
                "stderr": { "type": "string" },
                "exit_code": { "type": "integer" }
            }
        }),
        dependencies: vec![program],
    })
}

pub fn api_wrapper(requirement: &ResourceRequirement) -> ForgeResult<Rendered> {
    let base_url = requirement
        .param_str("url")
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ForgeError::code_generation(&requirement.name, "api tools need a 'url' parameter"))?
        .to_string();
    let method = requirement.param_str("method").unwrap_or("GET").to_ascii_uppercase();
    let headers: BTreeMap<String, String> = requirement
        .parameters
        .get("headers")
        .and_then(Value::as_object)
        .map(|object| {
            object
                .iter()
                .filter_map(|(name, value)| value.as_str().map(|value| (name.clone(), value.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let mut curl = vec!["curl".to_string(), "-sS".to_string(), "-X".to_string(), escape(&method).into_owned()];
    for (name, value) in &headers {
        curl.push("-H".to_string());
        curl.push(escape(&format!("{}: {}", name, value)).into_owned());
    }
    curl.push(escape(&base_url).into_owned());

    let source = format!(
        "#!/bin/sh\n# {}\nset -eu\nexec {} \"$@\"\n",
        doc_line(requirement),
        curl.join(" ")
    );

    Ok(Rendered {
        shape: ImplementationShape::ApiWrapper,
        payload: ResourcePayload::Api {
            base_url,
            method,
            headers,
        },
        source,
        input_schema: json!({
            "type": "object",
            "properties": {
                "url": { "type": "string" },
                "method": { "type": "string" },
                "headers": { "type": "object" },
                "query": { "type": "object" },
                "body": {}
            }
        }),
        output_schema: json!({
            "type": "object",
            "properties": { "status": { "type": "integer" }, "body": {} }
        }),
        dependencies: vec!["curl".to_string()],
    })
}

pub fn library_wrapper(requirement: &ResourceRequirement) -> ForgeResult<Rendered> {
    let entry = handler_name(requirement);
    let source = format!(
        "/// {}\npub fn {}(params: serde_json::Value) -> anyhow::Result<serde_json::Value> {{\n    handlers::{}(params)\n}}\n",
        doc_line(requirement),
        identifier("tool", &requirement.name),
        identifier("handle", &entry)
    );

    Ok(Rendered {
        shape: ImplementationShape::Function,
        payload: ResourcePayload::Source {
            language: "rust".to_string(),
            entry,
            code: source.clone(),
        },
        source,
        input_schema: json!({ "type": "object" }),
        output_schema: json!({}),
        dependencies: vec!["serde_json".to_string(), "anyhow".to_string()],
    })
}

pub fn service_wrapper(requirement: &ResourceRequirement) -> ForgeResult<Rendered> {
    let entry = handler_name(requirement);
    let endpoint = requirement.param_str("endpoint").unwrap_or("local");
    let type_name = format!("{}Service", type_name(&requirement.name));
    let source = format!(
        "/// {doc}\npub struct {ty} {{\n    endpoint: String,\n}}\n\n\
         impl {ty} {{\n    pub fn new() -> Self {{\n        Self {{ endpoint: {endpoint:?}.to_string() }}\n    }}\n\n    \
         pub fn call(&self, params: serde_json::Value) -> anyhow::Result<serde_json::Value> {{\n        \
         handlers::{handler}(params)\n    }}\n}}\n",
        doc = doc_line(requirement),
        ty = type_name,
        endpoint = endpoint,
        handler = identifier("handle", &entry)
    );

    Ok(Rendered {
        shape: ImplementationShape::ClassLike,
        payload: ResourcePayload::Source {
            language: "rust".to_string(),
            entry,
            code: source.clone(),
        },
        source,
        input_schema: json!({ "type": "object" }),
        output_schema: json!({}),
        dependencies: vec!["serde_json".to_string(), "anyhow".to_string()],
    })
}

pub fn hook(requirement: &ResourceRequirement, phase: HookPhase) -> ForgeResult<Rendered> {
    let requested = requirement.param_str("action");
    let action = match (phase, requested) {
        (HookPhase::Pre, None | Some("validate")) => HookAction::Validate,
        (HookPhase::Post, None | Some("notify")) => HookAction::Notify,
        (HookPhase::Post, Some("cleanup")) => HookAction::Cleanup,
        (HookPhase::Error, None | Some("escalate")) => HookAction::Escalate,
        (HookPhase::Error, Some("rollback")) => HookAction::Rollback,
        (_, Some(other)) => {
            return Err(ForgeError::code_generation(
                &requirement.name,
                format!("action '{}' is not available for {} hooks", other, phase),
            ));
        }
    };

    let required_metadata = requirement.param_strings("required_metadata");
    let continue_on_failure = requirement
        .parameters
        .get("continue_on_failure")
        .and_then(Value::as_bool)
        .unwrap_or(phase != HookPhase::Pre);
    // Hooks with lower priority run earlier; requirements rank higher-is-more-important
    let priority = 100 - requirement.priority.min(100);

    let body = match action {
        HookAction::Validate => format!(
            "    for key in {:?} {{\n        anyhow::ensure!(ctx.task.metadata.contains_key(key), \"missing metadata '{{}}'\", key);\n    }}\n",
            required_metadata
        ),
        HookAction::Notify => "    tracing::info!(\"task {} completed\", ctx.task.id);\n".to_string(),
        HookAction::Cleanup => "    tracing::info!(\"cleaning up after task {}\", ctx.task.id);\n".to_string(),
        HookAction::Escalate => "    tracing::warn!(\"task {} failed: {:?}\", ctx.task.id, ctx.error);\n".to_string(),
        HookAction::Rollback => {
            "    tracing::warn!(\"rolling back task {} after failure: {:?}\", ctx.task.id, ctx.error);\n".to_string()
        }
    };
    let source = format!(
        "/// {} ({} hook)\npub async fn {}(ctx: &HookContext) -> anyhow::Result<()> {{\n{}    Ok(())\n}}\n",
        doc_line(requirement),
        phase,
        identifier("hook", &requirement.name),
        body
    );

    Ok(Rendered {
        shape: ImplementationShape::Function,
        payload: ResourcePayload::Hook(HookDescriptor {
            phase,
            action,
            required_metadata,
            priority,
            continue_on_failure,
        }),
        source,
        input_schema: json!({ "type": "object", "description": "hook context" }),
        output_schema: json!(null),
        dependencies: vec!["anyhow".to_string(), "tracing".to_string()],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::synthesis::types::ResourceCategory;

    #[test]
    fn test_identifiers() {
        assert_eq!(identifier("tool", "load-tester"), "tool_load_tester");
        assert_eq!(identifier("tool", "2fa"), "tool_2fa");
        assert_eq!(type_name("load-tester"), "LoadTester");
    }

    #[test]
    fn test_command_script_escapes_arguments() {
        let requirement = ResourceRequirement::new("greeter", ResourceCategory::Tool, "command")
            .with_parameters(json!({ "program": "echo", "args": ["hello world", "it's"] }));
        let rendered = command_wrapper(&requirement).unwrap();

        assert_eq!(rendered.shape, ImplementationShape::CommandWrapper);
        assert!(rendered.source.contains("exec echo 'hello world' 'it'\\''s' \"$@\""));
        assert_eq!(rendered.dependencies, vec!["echo".to_string()]);
    }

    #[test]
    fn test_multiline_description_stays_in_comment() {
        let requirement = ResourceRequirement::new("lint", ResourceCategory::Tool, "command")
            .with_description("runs lint\nrm -rf \"$HOME\"\r\necho done")
            .with_parameters(json!({ "program": "eslint" }));
        let rendered = command_wrapper(&requirement).unwrap();

        let lines: Vec<&str> = rendered.source.lines().collect();
        assert_eq!(lines[1], "# lint: runs lint rm -rf \"$HOME\" echo done");
        assert_eq!(lines[2], "# Parameters are passed as --flag value pairs after the base arguments.");
        assert_eq!(lines[3], "set -eu");
        assert!(lines.iter().all(|line| line.starts_with('#') || *line == "set -eu" || line.starts_with("exec ")));

        let library = ResourceRequirement::new("fmt", ResourceCategory::Tool, "library")
            .with_description("formats code\npub fn injected() {}");
        let rendered = library_wrapper(&library).unwrap();
        assert!(!rendered.source.lines().any(|line| line.starts_with("pub fn injected")));
    }

    #[test]
    fn test_reserved_names_pass_safety_scan() {
        let scanner = crate::executor::SafetyScanner::default();
        for name in ["exec", "spawn", "eval"] {
            let requirement = ResourceRequirement::new(name, ResourceCategory::Tool, "library");
            let rendered = library_wrapper(&requirement).unwrap();
            assert!(rendered.source.contains(&format!("pub fn tool_{}(", name)));
            assert!(!scanner.scan(&rendered.source).blocked, "{} should not be blocked", name);
        }
    }

    #[test]
    fn test_command_requires_program() {
        let requirement = ResourceRequirement::new("nothing", ResourceCategory::Tool, "command");
        let error = command_wrapper(&requirement).unwrap_err();
        assert_eq!(error.kind, ErrorKind::CodeGeneration);
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_api_wrapper_defaults_to_get() {
        let requirement = ResourceRequirement::new("status", ResourceCategory::Tool, "api")
            .with_parameters(json!({ "url": "http://localhost:8080/status", "headers": { "Accept": "application/json" } }));
        let rendered = api_wrapper(&requirement).unwrap();

        match &rendered.payload {
            ResourcePayload::Api { method, headers, .. } => {
                assert_eq!(method, "GET");
                assert_eq!(headers.get("Accept").map(String::as_str), Some("application/json"));
            }
            other => panic!("unexpected payload {:?}", other),
        }
        assert!(rendered.source.contains("curl -sS -X GET -H 'Accept: application/json'"));
    }

    #[test]
    fn test_service_is_class_like() {
        let requirement = ResourceRequirement::new("load-tester", ResourceCategory::Tool, "service");
        let rendered = service_wrapper(&requirement).unwrap();
        assert_eq!(rendered.shape, ImplementationShape::ClassLike);
        assert!(rendered.source.contains("pub struct LoadTesterService"));
    }

    #[test]
    fn test_hook_actions() {
        let pre = ResourceRequirement::new("gate", ResourceCategory::Hook, "pre")
            .with_priority(60)
            .with_parameters(json!({ "required_metadata": ["ticket"] }));
        let rendered = hook(&pre, HookPhase::Pre).unwrap();
        let descriptor = match rendered.payload {
            ResourcePayload::Hook(descriptor) => descriptor,
            other => panic!("unexpected payload {:?}", other),
        };
        assert_eq!(descriptor.action, HookAction::Validate);
        assert_eq!(descriptor.required_metadata, vec!["ticket".to_string()]);
        assert_eq!(descriptor.priority, 40);
        assert!(!descriptor.continue_on_failure);

        let rollback = ResourceRequirement::new("undo", ResourceCategory::Hook, "error")
            .with_parameters(json!({ "action": "rollback" }));
        assert!(hook(&rollback, HookPhase::Error).is_ok());

        let invalid = ResourceRequirement::new("undo", ResourceCategory::Hook, "pre")
            .with_parameters(json!({ "action": "rollback" }));
        assert_eq!(hook(&invalid, HookPhase::Pre).unwrap_err().kind, ErrorKind::CodeGeneration);
    }
}
