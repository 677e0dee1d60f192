use crate::transport::{Transport, next_id};
use crate::transport_actor::{TargetMessage, TransportResponse};
use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

/// Parses the JSON payload carried inside a `TargetMessage`.
pub(crate) fn serde_msg(msg: &TargetMessage) -> Result<Value> {
    let str_msg = msg.params["message"]
        .as_str()
        .ok_or_else(|| anyhow!("Invalid message format"))?;
    Ok(serde_json::from_str(str_msg)?)
}

/// Sends a message to a target session and waits for its reply.
pub(crate) async fn send_and_get_msg(
    transport: Arc<Transport>,
    msg_id: usize,
    session_id: &str,
    msg: String,
) -> Result<TargetMessage> {
    // Register the waiter before the command goes out so the reply cannot
    // race past its registration.
    let reply_rx = transport.expect_target_msg(msg_id).await?;

    transport
        .send(json!({
            "id": next_id(),
            "method": "Target.sendMessageToTarget",
            "params": { "sessionId": session_id, "message": msg }
        }))
        .await?;

    let target_msg = match time::timeout(Duration::from_secs(10), reply_rx).await {
        Ok(reply) => reply.map_err(|_| anyhow!("Response channel closed"))??,
        Err(_) => return Err(anyhow!("Timeout while waiting for target message")),
    };

    match target_msg {
        TransportResponse::Target(res) => Ok(res),
        other => Err(anyhow!("Unexpected response: {:?}", other)),
    }
}
