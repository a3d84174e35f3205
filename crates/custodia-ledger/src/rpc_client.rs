//! JSON-RPC 2.0 batch client for the ledger node (spec.md §4.7). Raw
//! `reqwest` POST with a hand-rolled envelope, matching
//! `chronx-wallet::rpc_client::WalletRpcClient`'s reasoning for avoiding a
//! full RPC client framework: this process is only ever a JSON-RPC
//! *client*, never a server.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use custodia_resilience::{classify_rpc_code, retry_with_backoff, ErrorKind, RetryPolicy};

#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcCallError {
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("missing response")]
    MissingResponse,
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Clone, Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    method: String,
    params: Value,
    id: u64,
}

#[derive(Clone, Debug, Deserialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
    #[allow(dead_code)]
    data: Option<Value>,
}

#[derive(Clone, Debug, Deserialize)]
struct JsonRpcResponse {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<JsonRpcErrorBody>,
}

/// One call in a batch: the method name and its params.
#[derive(Clone, Debug)]
pub struct RpcCall {
    pub method: String,
    pub params: Value,
}

/// Reconstruct call-order from the `id` field of an unordered JSON-RPC
/// batch response array, synthesizing `Err(-32603, "missing response")`
/// for any request id absent from the response.
fn reconcile_batch(
    requests: &[JsonRpcRequest],
    responses: Vec<JsonRpcResponse>,
) -> Vec<Result<Value, RpcCallError>> {
    let mut by_id: HashMap<u64, JsonRpcResponse> = responses
        .into_iter()
        .filter_map(|r| r.id.map(|id| (id, r)))
        .collect();

    requests
        .iter()
        .map(|req| match by_id.remove(&req.id) {
            Some(resp) => {
                if let Some(err) = resp.error {
                    Err(RpcCallError::Rpc {
                        code: err.code,
                        message: err.message,
                    })
                } else {
                    Ok(resp.result.unwrap_or(Value::Null))
                }
            }
            None => Err(RpcCallError::MissingResponse),
        })
        .collect()
}

fn call_is_retryable(err: &RpcCallError) -> bool {
    match err {
        RpcCallError::MissingResponse => true,
        RpcCallError::Transport(_) => true,
        RpcCallError::Rpc { code, .. } => classify_rpc_code(*code) == ErrorKind::Transient,
    }
}

#[derive(Clone)]
pub struct BatchRpcClient {
    url: String,
    http: reqwest::Client,
    retry_policy: RetryPolicy,
}

impl BatchRpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
            retry_policy: RetryPolicy::default(),
        }
    }

    async fn post_batch(
        &self,
        calls: &[(u64, RpcCall)],
    ) -> Result<Vec<Result<Value, RpcCallError>>, RpcCallError> {
        let requests: Vec<JsonRpcRequest> = calls
            .iter()
            .map(|(id, c)| JsonRpcRequest {
                jsonrpc: "2.0",
                method: c.method.clone(),
                params: c.params.clone(),
                id: *id,
            })
            .collect();

        let http_status_is_retryable = |status: u16| status == 429 || (500..600).contains(&status);

        let resp = self
            .http
            .post(&self.url)
            .json(&requests)
            .send()
            .await
            .map_err(|e| RpcCallError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        if http_status_is_retryable(status) {
            return Err(RpcCallError::Transport(format!("http {status}")));
        }

        let responses: Vec<JsonRpcResponse> = resp
            .json()
            .await
            .map_err(|e| RpcCallError::Transport(e.to_string()))?;

        Ok(reconcile_batch(&requests, responses))
    }

    /// Issue a single batch POST, then selectively retry only the
    /// sub-calls that failed (spec.md §4.7): the HTTP envelope itself is
    /// retried on 429/partial-failure, but successful results from the
    /// first attempt carry over and are never re-requested.
    pub async fn call_batch(&self, calls: Vec<RpcCall>) -> Vec<Result<Value, RpcCallError>> {
        let mut indexed: Vec<(u64, RpcCall)> =
            calls.into_iter().enumerate().map(|(i, c)| (i as u64, c)).collect();
        let mut results: HashMap<u64, Result<Value, RpcCallError>> = HashMap::new();

        let mut attempt = 0u32;
        loop {
            let batch_result = self.post_batch(&indexed).await;
            match batch_result {
                Ok(outcomes) => {
                    let mut still_failing = Vec::new();
                    for ((id, call), outcome) in indexed.iter().zip(outcomes.into_iter()) {
                        match outcome {
                            Ok(v) => {
                                results.insert(*id, Ok(v));
                            }
                            Err(e) if call_is_retryable(&e) && attempt < self.retry_policy.max_retries => {
                                still_failing.push((*id, call.clone()));
                            }
                            Err(e) => {
                                results.insert(*id, Err(e));
                            }
                        }
                    }
                    if still_failing.is_empty() {
                        break;
                    }
                    indexed = still_failing;
                }
                Err(e) if attempt < self.retry_policy.max_retries => {
                    // whole envelope failed (e.g. HTTP 429): retry all
                    // still-outstanding calls.
                    tracing::warn!(attempt, error = %e, "batch RPC envelope retry");
                }
                Err(e) => {
                    for (id, _) in &indexed {
                        results.insert(*id, Err(e.clone()));
                    }
                    break;
                }
            }
            attempt += 1;
            let delay = std::time::Duration::from_millis(500) * (1u32 << attempt.min(8));
            tokio::time::sleep(delay).await;
        }

        let n = results.len();
        let mut ordered = Vec::with_capacity(n);
        for id in 0..n as u64 {
            ordered.push(
                results
                    .remove(&id)
                    .unwrap_or(Err(RpcCallError::MissingResponse)),
            );
        }
        ordered
    }

    /// Convenience single-call wrapper built on [`retry_with_backoff`],
    /// used by the four-call concurrent fallback path.
    pub async fn call_single(&self, method: &str, params: Value) -> Result<Value, RpcCallError> {
        let policy = self.retry_policy;
        retry_with_backoff(
            policy,
            || async {
                let calls = vec![(0u64, RpcCall { method: method.to_string(), params: params.clone() })];
                let mut out = self.post_batch(&calls).await?;
                out.pop().unwrap_or(Err(RpcCallError::MissingResponse))
            },
            call_is_retryable,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(id: u64) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0",
            method: "getBalance".into(),
            params: Value::Null,
            id,
        }
    }

    /// Seed scenario 5 (spec.md §8): 4 calls, one errors, missing ids are
    /// synthesized.
    #[test]
    fn reconcile_reorders_and_synthesizes_missing() {
        let requests = vec![req(0), req(1), req(2), req(3)];
        let responses = vec![
            JsonRpcResponse {
                id: Some(2),
                result: Some(Value::from(3)),
                error: None,
            },
            JsonRpcResponse {
                id: Some(0),
                result: Some(Value::from(1)),
                error: None,
            },
            JsonRpcResponse {
                id: Some(1),
                result: None,
                error: Some(JsonRpcErrorBody {
                    code: -32005,
                    message: "node behind".into(),
                    data: None,
                }),
            },
            // id 3 missing entirely.
        ];

        let out = reconcile_batch(&requests, responses);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].as_ref().unwrap(), &Value::from(1));
        assert!(matches!(out[1], Err(RpcCallError::Rpc { code: -32005, .. })));
        assert_eq!(out[2].as_ref().unwrap(), &Value::from(3));
        assert!(matches!(out[3], Err(RpcCallError::MissingResponse)));
    }

    #[test]
    fn retryable_classification() {
        assert!(call_is_retryable(&RpcCallError::MissingResponse));
        assert!(call_is_retryable(&RpcCallError::Rpc {
            code: -32005,
            message: String::new()
        }));
        assert!(!call_is_retryable(&RpcCallError::Rpc {
            code: -32602,
            message: String::new()
        }));
    }
}
