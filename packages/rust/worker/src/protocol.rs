//! JSON-lines protocol spoken with worker and host processes.
//!
//! One JSON object per line on the child's stdin/stdout. The child announces
//! itself with `ready`, then answers each `call` with a `result` or `error`
//! carrying the same `id`. Answers may arrive in any order.

use serde::{Deserialize, Serialize};

/// Request message sent to a worker process.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub(crate) enum RequestMessage<'a> {
    #[serde(rename = "call")]
    Call {
        id: &'a str,
        op: &'a str,
        payload: &'a serde_json::Value,
    },
    #[serde(rename = "shutdown")]
    Shutdown,
}

/// Response message received from a worker process.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub(crate) enum ResponseMessage {
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "result")]
    Result {
        id: String,
        #[serde(default)]
        result: serde_json::Value,
    },
    #[serde(rename = "error")]
    Error { id: String, error: String },
}

/// Encode a request as a single newline-terminated line.
pub(crate) fn encode(msg: &RequestMessage<'_>) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}
