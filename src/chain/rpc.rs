//! Minimal JSON-RPC 2.0 client over HTTP
//!
//! Shared by the balance reader (node RPC) and the relayer adapter
//! (bundler RPC). Transport failures map to retryable errors; a JSON-RPC
//! error object is returned as [`RpcCallError::Remote`] so callers decide
//! whether it is a rejection or a transient fault.

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::error::Error;

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Serialize)]
struct RpcRequest<'a, P: Serialize> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

/// Failure of a single call
#[derive(Debug)]
pub enum RpcCallError {
    /// Transport or decoding failure
    Transport(Error),
    /// The server answered with a JSON-RPC error object
    Remote(RpcErrorObject),
}

impl From<RpcCallError> for Error {
    fn from(e: RpcCallError) -> Self {
        match e {
            RpcCallError::Transport(e) => e,
            RpcCallError::Remote(obj) => Error::Rpc(format!("{} (code {})", obj.message, obj.code)),
        }
    }
}

/// JSON-RPC client bound to one endpoint
pub struct JsonRpcClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> crate::error::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
            next_id: AtomicU64::new(1),
        })
    }

    /// Call `method` and decode a non-null result
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R, RpcCallError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        self.call_optional(method, params).await?.ok_or_else(|| {
            RpcCallError::Transport(Error::Rpc(format!("No result in {} response", method)))
        })
    }

    /// Call `method`; a `null` result decodes to `None`
    pub async fn call_optional<P, R>(&self, method: &str, params: P) -> Result<Option<R>, RpcCallError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        debug!(method, "JSON-RPC request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcCallError::Transport(Error::RpcTimeout(self.timeout.as_millis() as u64))
                } else {
                    RpcCallError::Transport(Error::from(e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(http_failure(method, status, &body));
        }

        let rpc_response: RpcResponse<R> = response.json().await.map_err(|e| {
            RpcCallError::Transport(Error::Deserialization(format!(
                "Failed to parse {} response: {}",
                method, e
            )))
        })?;

        decode_response(rpc_response)
    }
}

/// Classify a non-2xx answer. A JSON-RPC error object in the body wins over
/// the status; otherwise only 5xx and 429 stay transient.
fn http_failure(method: &str, status: StatusCode, body: &str) -> RpcCallError {
    if let Ok(RpcResponse {
        error: Some(error), ..
    }) = serde_json::from_str::<RpcResponse<serde_json::Value>>(body)
    {
        return RpcCallError::Remote(error);
    }

    let message = format!("{} HTTP {}: {}", method, status, body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RpcCallError::Transport(Error::Rpc(message))
    } else {
        RpcCallError::Transport(Error::RpcRejected(message))
    }
}

fn decode_response<R>(response: RpcResponse<R>) -> Result<Option<R>, RpcCallError> {
    if let Some(error) = response.error {
        return Err(RpcCallError::Remote(error));
    }
    Ok(response.result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    #[test]
    fn test_decode_result() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"result":"0x2a"}"#;
        let response: RpcResponse<U256> = serde_json::from_str(raw).unwrap();
        assert_eq!(decode_response(response).unwrap(), Some(U256::from(42u64)));
    }

    #[test]
    fn test_decode_null_result() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"result":null}"#;
        let response: RpcResponse<U256> = serde_json::from_str(raw).unwrap();
        assert_eq!(decode_response(response).unwrap(), None);
    }

    #[test]
    fn test_decode_error_object() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"invalid params"}}"#;
        let response: RpcResponse<U256> = serde_json::from_str(raw).unwrap();
        match decode_response(response) {
            Err(RpcCallError::Remote(obj)) => {
                assert_eq!(obj.code, -32602);
                assert_eq!(obj.message, "invalid params");
            }
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_without_result_field() {
        let raw = r#"{"jsonrpc":"2.0","id":7,"error":{"code":-32000,"message":"reverted","data":"0x"}}"#;
        let response: RpcResponse<U256> = serde_json::from_str(raw).unwrap();
        assert!(response.result.is_none());
        assert!(matches!(decode_response(response), Err(RpcCallError::Remote(_))));
    }

    #[test]
    fn test_http_failure_with_error_body_is_remote() {
        let body = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"allowance exceeded"}}"#;
        match http_failure("relayer_sendDelegatedCalls", StatusCode::BAD_REQUEST, body) {
            RpcCallError::Remote(obj) => {
                assert_eq!(obj.code, -32602);
                assert_eq!(obj.message, "allowance exceeded");
            }
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[test]
    fn test_http_failure_status_classification() {
        let transient = [StatusCode::SERVICE_UNAVAILABLE, StatusCode::TOO_MANY_REQUESTS];
        for status in transient {
            match http_failure("eth_call", status, "busy") {
                RpcCallError::Transport(e) => assert!(e.is_retryable(), "{} should retry", status),
                other => panic!("expected transport error, got {:?}", other),
            }
        }

        match http_failure("eth_call", StatusCode::UNAUTHORIZED, "bad api key") {
            RpcCallError::Transport(e) => {
                assert!(matches!(e, Error::RpcRejected(_)));
                assert!(!e.is_retryable());
            }
            other => panic!("expected transport error, got {:?}", other),
        }
    }
}
