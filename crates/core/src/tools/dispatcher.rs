//! Sequential execution of agent-issued tool invocations.

use super::MapTools;
use async_trait::async_trait;
use futures::FutureExt;
use openai_realtime_types::{ToolInvocation, ToolResult};
use serde_json::Value;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Runs a named tool. Implemented by [`MapTools`].
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn call(&self, name: &str, arguments: Value) -> Result<String, String>;
}

#[async_trait]
impl ToolExecutor for MapTools {
    async fn call(&self, name: &str, arguments: Value) -> Result<String, String> {
        MapTools::call(self, name, arguments).await
    }
}

/// Where finished tool results go. Delivery must not block on the agent.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn deliver(&self, result: ToolResult);
}

/// Executes the invocations of each completed response strictly in order.
///
/// Every invocation yields exactly one [`ToolResult`], delivered before the
/// next invocation starts. Handler failures and panics become prose.
pub struct Dispatcher {
    tools: Arc<dyn ToolExecutor>,
    seen: HashSet<String>,
}

impl Dispatcher {
    pub fn new(tools: Arc<dyn ToolExecutor>) -> Self {
        Self {
            tools,
            seen: HashSet::new(),
        }
    }

    pub async fn dispatch(&mut self, invocations: Vec<ToolInvocation>, sink: &dyn ResultSink) {
        for invocation in invocations {
            if !self.seen.insert(invocation.id.clone()) {
                warn!(call_id = %invocation.id, tool = %invocation.name, "Invocation id already answered, skipping");
                continue;
            }
            let output = self.execute(&invocation).await;
            sink.deliver(ToolResult::new(invocation.id, output)).await;
        }
    }

    async fn execute(&self, invocation: &ToolInvocation) -> String {
        let call = self.tools.call(&invocation.name, invocation.arguments.clone());
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(message)) => {
                info!(call_id = %invocation.id, tool = %invocation.name, "Tool succeeded");
                message
            }
            Ok(Err(reason)) => {
                warn!(call_id = %invocation.id, tool = %invocation.name, %reason, "Tool failed");
                reason
            }
            Err(_) => {
                error!(call_id = %invocation.id, tool = %invocation.name, "Tool panicked");
                format!("Tool '{}' failed unexpectedly.", invocation.name)
            }
        }
    }
}
