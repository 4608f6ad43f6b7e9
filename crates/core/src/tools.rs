//! Tool collection for session creation and tool-call dispatch.

use crate::model::{ToolCallOutput, ToolDescriptor};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, warn};

/// Something attached to the agent that offers tool descriptors.
///
/// Items may be bare descriptors or wrapped in a `tool` envelope; anything
/// else is skipped during collection.
pub trait ToolProvider: Send + Sync {
    fn offered(&self) -> Vec<Value>;
}

impl ToolProvider for Vec<Value> {
    fn offered(&self) -> Vec<Value> {
        self.clone()
    }
}

impl ToolProvider for ToolDescriptor {
    fn offered(&self) -> Vec<Value> {
        serde_json::to_value(self).map(|v| vec![v]).unwrap_or_default()
    }
}

/// Runs one named tool when the agent calls it.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    /// Executes the call, returning the `result` payload for the agent.
    ///
    /// Failures are reported inside the payload as `{ok: false, error}`.
    async fn execute(&self, call: &ToolCallOutput) -> Value;
}

/// Providers and executors available to every session.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    providers: Vec<Arc<dyn ToolProvider>>,
    executors: HashMap<String, Arc<dyn ToolExecutor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes every provider's offer, keeping provider order then item order.
    pub fn collect(providers: &[Arc<dyn ToolProvider>]) -> Vec<ToolDescriptor> {
        providers
            .iter()
            .flat_map(|provider| provider.offered())
            .filter_map(|item| {
                let descriptor = ToolDescriptor::normalize(&item);
                if descriptor.is_none() {
                    warn!(item = %item, "Skipping unrecognized tool item");
                }
                descriptor
            })
            .collect()
    }

    pub fn add_provider(&mut self, provider: Arc<dyn ToolProvider>) {
        self.providers.push(provider);
    }

    /// Registers an executor and offers its descriptor to new sessions.
    pub fn register_tool(&mut self, executor: Arc<dyn ToolExecutor>) {
        let descriptor = executor.descriptor();
        debug!(tool = %descriptor.name, "Registering tool");
        self.providers.push(Arc::new(descriptor.clone()));
        self.executors.insert(descriptor.name, executor);
    }

    /// Descriptor snapshot for a new session.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        Self::collect(&self.providers)
    }

    pub fn has_executor(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }

    pub async fn execute(&self, call: &ToolCallOutput) -> Value {
        match self.executors.get(&call.name) {
            Some(executor) => executor.execute(call).await,
            None => {
                warn!(tool = %call.name, call_id = %call.call_id, "No executor for tool call");
                json!({"ok": false, "error": format!("unknown tool '{}'", call.name)})
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("providers", &self.providers.len())
            .field("executors", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}
