//! The built-in `transfer_call` tool.

use crate::{
    command::CommandClient,
    model::{ToolCallOutput, ToolDescriptor, ToolType},
    tools::ToolExecutor,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const TRANSFER_TOOL_NAME: &str = "transfer_call";

/// Moves the call to another extension or number, optionally announcing it first.
pub struct TransferCallTool {
    client: Arc<dyn CommandClient>,
}

impl TransferCallTool {
    pub fn new(client: Arc<dyn CommandClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolExecutor for TransferCallTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            tool_type: ToolType::Function,
            name: TRANSFER_TOOL_NAME.to_string(),
            description: "Transfer the current call to another extension or phone number"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "target": {
                        "type": "string",
                        "description": "The extension or phone number to transfer to"
                    },
                    "announceText": {
                        "type": "string",
                        "description": "Optional text to speak before transferring"
                    }
                },
                "required": ["target"]
            }),
        }
    }

    #[instrument(skip_all, fields(call_id = %call.call_id, tool_call_id = %call.tool_call_id))]
    async fn execute(&self, call: &ToolCallOutput) -> Value {
        let Some(target) = call
            .args
            .get("target")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
        else {
            warn!("transfer_call invoked without a target");
            return json!({"ok": false, "error": "missing required argument 'target'"});
        };

        let announce = call
            .args
            .get("announceText")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty());
        if let Some(text) = announce {
            if let Err(e) = self.client.say(&call.call_id, text).await {
                return json!({"ok": false, "error": e.to_string()});
            }
        }

        match self.client.transfer(&call.call_id, target).await {
            Ok(_) => {
                info!(%target, "Call transferred");
                json!({"ok": true, "status": "transferred", "target": target})
            }
            Err(e) => json!({"ok": false, "error": e.to_string()}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        command::MockCommandClient,
        error::{CommandKind, FailureKind, VoiceError},
    };
    use mockall::{Sequence, predicate::eq};

    fn call(args: Value) -> ToolCallOutput {
        ToolCallOutput {
            tool_call_id: "t1".to_string(),
            name: TRANSFER_TOOL_NAME.to_string(),
            args,
            call_id: "c1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_announces_then_transfers() {
        let mut client = MockCommandClient::new();
        let mut seq = Sequence::new();
        client
            .expect_say()
            .with(eq("c1"), eq("Transferring you now"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Value::Null));
        client
            .expect_transfer()
            .with(eq("c1"), eq("100"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Value::Null));

        let tool = TransferCallTool::new(Arc::new(client));
        let result = tool
            .execute(&call(json!({"target": "100", "announceText": "Transferring you now"})))
            .await;
        assert_eq!(
            result,
            json!({"ok": true, "status": "transferred", "target": "100"})
        );
    }

    #[tokio::test]
    async fn test_missing_target_issues_no_command() {
        let client = MockCommandClient::new();
        let tool = TransferCallTool::new(Arc::new(client));
        let result = tool.execute(&call(json!({}))).await;
        assert_eq!(result["ok"], json!(false));
    }

    #[tokio::test]
    async fn test_transfer_failure_is_reported_in_result() {
        let mut client = MockCommandClient::new();
        client.expect_transfer().returning(|_, _| {
            Err(VoiceError::CommandFailed {
                command: CommandKind::Transfer,
                kind: FailureKind::Rejected { status: 404 },
                message: "unknown extension".to_string(),
            })
        });

        let tool = TransferCallTool::new(Arc::new(client));
        let result = tool.execute(&call(json!({"target": "999"}))).await;
        assert_eq!(result["ok"], json!(false));
        assert!(result["error"].as_str().unwrap().contains("unknown extension"));
    }

    #[test]
    fn test_descriptor_requires_target() {
        let tool = TransferCallTool::new(Arc::new(MockCommandClient::new()));
        let descriptor = tool.descriptor();
        assert_eq!(descriptor.name, TRANSFER_TOOL_NAME);
        assert_eq!(descriptor.parameters["required"], json!(["target"]));
    }
}
