use crate::synthesis::SynthesizedResource;
use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Statically registered implementation behind a `function` or `class-like` resource.
///
/// The resource's source text is only ever scanned; its entry name picks the handler.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, resource: &SynthesizedResource, params: Value) -> Result<Value>;
}

/// Echoes the invocation back, tagged with the resource it came through
#[derive(Debug, Default)]
pub struct PassthroughHandler;

#[async_trait]
impl CapabilityHandler for PassthroughHandler {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn invoke(&self, resource: &SynthesizedResource, params: Value) -> Result<Value> {
        Ok(json!({
            "resource": resource.name,
            "params": params,
        }))
    }
}

/// Fails unless every key listed in the resource's `required` parameter is supplied
#[derive(Debug, Default)]
pub struct RequireParamsHandler;

#[async_trait]
impl CapabilityHandler for RequireParamsHandler {
    fn name(&self) -> &str {
        "require-params"
    }

    async fn invoke(&self, resource: &SynthesizedResource, params: Value) -> Result<Value> {
        let required: Vec<&str> = resource
            .parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|keys| keys.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|key| params.get(key).is_none_or(Value::is_null))
            .collect();
        if !missing.is_empty() {
            bail!("missing required parameter(s): {}", missing.join(", "));
        }

        Ok(json!({ "validated": required, "params": params }))
    }
}

/// Closed set of capability handlers, looked up by name
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn CapabilityHandler>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl HandlerRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        Self::empty()
            .with_handler(Arc::new(PassthroughHandler))
            .with_handler(Arc::new(RequireParamsHandler))
    }

    pub fn with_handler(mut self, handler: Arc<dyn CapabilityHandler>) -> Self {
        self.register(handler);
        self
    }

    /// Registering a name twice replaces the earlier handler
    pub fn register(&mut self, handler: Arc<dyn CapabilityHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CapabilityHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}
