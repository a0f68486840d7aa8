use crate::transport::{TargetMessage, Transport, TransportResponse, next_id};
use crate::types::WaitOptions;
use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Parses the JSON message carried by a `TargetMessage`, surfacing CDP errors.
pub(crate) fn serde_msg(msg: &TargetMessage) -> Result<Value> {
    let str_msg = msg.params["message"]
        .as_str()
        .ok_or_else(|| anyhow!("Invalid message format"))?;
    let value: Value = serde_json::from_str(str_msg)?;
    if let Some(err) = value.get("error") {
        return Err(anyhow!("CDP error: {}", err));
    }
    Ok(value)
}

/// Sends a message to a target session and waits for the corresponding response.
pub(crate) async fn send_and_get_msg(
    transport: Arc<Transport>,
    msg_id: usize,
    session_id: &str,
    msg: String,
) -> Result<TargetMessage> {
    let reply = transport.listen_target_msg(msg_id).await?;

    transport
        .send(json!({
            "id": next_id(),
            "method": "Target.sendMessageToTarget",
            "params": { "sessionId": session_id, "message": msg }
        }))
        .await?;

    match Transport::await_target_msg(reply).await? {
        TransportResponse::Target(res) => Ok(res),
        other => Err(anyhow!("Unexpected response: {:?}", other)),
    }
}

/// Outcome of [`wait_until`] when the condition never held.
#[derive(Debug)]
pub(crate) enum WaitError {
    /// The deadline passed; carries the last probe error, if any.
    TimedOut(Option<anyhow::Error>),
}

/// Polls `probe` until it yields `Some`, or gives up after `opts.timeout`.
///
/// Probe errors are treated as "not ready yet" so that transient failures
/// (element missing, page mid-navigation) keep polling.
pub(crate) async fn wait_until<T, F, Fut>(
    opts: &WaitOptions,
    mut probe: F,
) -> std::result::Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let start = Instant::now();
    let mut last_err = None;
    loop {
        match probe().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => last_err = Some(e),
        }
        if start.elapsed() >= opts.timeout {
            return Err(WaitError::TimedOut(last_err));
        }
        tokio::time::sleep(opts.poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Duration;

    fn fast() -> WaitOptions {
        WaitOptions::new(Duration::from_millis(200)).with_poll_interval(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn wait_until_returns_once_ready() {
        let calls = Cell::new(0);
        let got = wait_until(&fast(), || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { Ok((n >= 3).then_some(n)) }
        })
        .await;
        assert!(matches!(got, Ok(3)));
    }

    #[tokio::test]
    async fn wait_until_times_out_with_last_error() {
        let got: std::result::Result<(), _> =
            wait_until(&fast(), || async { Err(anyhow!("not yet")) }).await;
        match got {
            Err(WaitError::TimedOut(Some(e))) => assert_eq!(e.to_string(), "not yet"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn wait_until_times_out_without_error() {
        let got: std::result::Result<(), _> = wait_until(&fast(), || async { Ok(None) }).await;
        assert!(matches!(got, Err(WaitError::TimedOut(None))));
    }

    #[test]
    fn serde_msg_surfaces_cdp_errors() {
        let msg = TargetMessage {
            params: json!({ "message": r#"{"id":1,"error":{"code":-32000,"message":"boom"}}"# }),
        };
        assert!(serde_msg(&msg).is_err());

        let ok = TargetMessage {
            params: json!({ "message": r#"{"id":2,"result":{"x":1}}"# }),
        };
        assert_eq!(serde_msg(&ok).unwrap()["result"]["x"], 1);
    }
}
