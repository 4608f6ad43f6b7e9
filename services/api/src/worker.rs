//! Consumer of session outputs.
//!
//! Tool calls with a registered executor are run here and their results sent
//! back to the call's stream. Calls to other tools are left for an external
//! client, which answers through `POST /calls/{id}/tool-result`.

use std::sync::{Arc, Weak};
use tokio::{sync::mpsc, task::JoinSet};
use tracing::{Instrument, error, info, warn};
use voicenet_core::{SessionOrchestrator, SessionOutput, ToolCallOutput, ToolResult};

/// Runs until the output channel closes, then waits for in-flight tools.
///
/// Only a weak reference to the orchestrator is held, so the channel closes
/// once the orchestrator and its session tasks are gone.
pub async fn run_output_worker(
    orchestrator: Weak<SessionOrchestrator>,
    mut outputs: mpsc::Receiver<SessionOutput>,
) {
    let mut running = JoinSet::new();

    while let Some(output) = outputs.recv().await {
        while running.try_join_next().is_some() {}
        match output {
            SessionOutput::ToolCall(call) => {
                let Some(orchestrator) = orchestrator.upgrade() else {
                    warn!(call_id = %call.call_id, tool = %call.name, "Orchestrator gone, dropping tool call");
                    continue;
                };
                if !orchestrator.tools().has_executor(&call.name) {
                    info!(call_id = %call.call_id, tool = %call.name, tool_call_id = %call.tool_call_id, "Tool call awaiting external result");
                    continue;
                }
                let span = tracing::info_span!("tool_call", call_id = %call.call_id, tool = %call.name);
                running.spawn(execute_tool(orchestrator, call).instrument(span));
            }
            SessionOutput::CallTransferred { call_id, target } => {
                info!(%call_id, %target, "Call transferred");
            }
            SessionOutput::CallEnded { call_id, reason } => {
                info!(%call_id, %reason, "Call ended");
            }
            SessionOutput::Error(outcome) => {
                warn!(call_id = %outcome.call_id, code = %outcome.code, message = %outcome.message, "Session error");
            }
        }
    }

    while running.join_next().await.is_some() {}
    info!("Session output worker stopped.");
}

async fn execute_tool(orchestrator: Arc<SessionOrchestrator>, call: ToolCallOutput) {
    let result = orchestrator.tools().execute(&call).await;
    let tool_result = ToolResult {
        tool_call_id: call.tool_call_id.clone(),
        name: Some(call.name.clone()),
        result,
    };
    if let Err(e) = orchestrator
        .submit_tool_result(&call.call_id, tool_result)
        .await
    {
        error!(error = %e, "Failed to deliver tool result");
    }
}
