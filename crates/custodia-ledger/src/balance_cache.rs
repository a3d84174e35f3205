//! Cached balance repository (spec.md §4.7, P10): fetches native + SPL
//! balances as one batch RPC call, falling back to four concurrent single
//! calls on batch failure, with a 60s default TTL and explicit
//! post-submission invalidation.

use std::collections::BTreeMap;

use dashmap::DashMap;
use futures::future::join_all;
use serde_json::Value;

use custodia_core::constants::BALANCE_CACHE_TTL_MS;
use custodia_core::types::TimestampMs;

use crate::rpc_client::{BatchRpcClient, RpcCall, RpcCallError};

#[derive(Clone, Debug)]
pub struct BalanceSnapshot {
    pub native: u64,
    pub tokens: BTreeMap<String, u64>,
    pub fetched_at: TimestampMs,
}

impl BalanceSnapshot {
    pub fn is_fresh(&self, now_ms: TimestampMs, ttl_ms: i64) -> bool {
        now_ms - self.fetched_at < ttl_ms
    }
}

pub struct BalanceCacheRepository {
    client: BatchRpcClient,
    ttl_ms: i64,
    cache: DashMap<String, BalanceSnapshot>,
}

fn parse_lamports(value: &Value) -> u64 {
    value
        .get("value")
        .and_then(|v| v.as_u64())
        .or_else(|| value.as_u64())
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0)
}

impl BalanceCacheRepository {
    pub fn new(client: BatchRpcClient) -> Self {
        Self {
            client,
            ttl_ms: BALANCE_CACHE_TTL_MS,
            cache: DashMap::new(),
        }
    }

    pub fn with_ttl(client: BatchRpcClient, ttl_ms: i64) -> Self {
        Self {
            client,
            ttl_ms,
            cache: DashMap::new(),
        }
    }

    /// Returns the cached snapshot if still fresh; otherwise fetches
    /// native + each SPL mint balance as one batch call, falling back to
    /// N concurrent single calls on batch failure. Writes the result back
    /// atomically.
    pub async fn get_balances(
        &self,
        address: &str,
        mints: &[String],
        now_ms: TimestampMs,
    ) -> Result<BalanceSnapshot, RpcCallError> {
        if let Some(entry) = self.cache.get(address) {
            if entry.is_fresh(now_ms, self.ttl_ms) {
                return Ok(entry.clone());
            }
        }

        let mut snapshot = match self.fetch_batch(address, mints).await {
            Ok(s) => s,
            Err(_) => self.fetch_fallback(address, mints).await?,
        };
        snapshot.fetched_at = now_ms;

        self.cache.insert(address.to_string(), snapshot.clone());
        Ok(snapshot)
    }

    async fn fetch_batch(
        &self,
        address: &str,
        mints: &[String],
    ) -> Result<BalanceSnapshot, RpcCallError> {
        let mut calls = vec![RpcCall {
            method: "getBalance".into(),
            params: serde_json::json!([address]),
        }];
        for mint in mints {
            calls.push(RpcCall {
                method: "getTokenAccountBalance".into(),
                params: serde_json::json!([address, { "mint": mint }]),
            });
        }

        let results = self.client.call_batch(calls).await;
        if results.iter().any(|r| r.is_err()) {
            return Err(RpcCallError::MissingResponse);
        }

        let mut iter = results.into_iter();
        let native = parse_lamports(&iter.next().unwrap().unwrap());
        let mut tokens = BTreeMap::new();
        for (mint, result) in mints.iter().zip(iter) {
            tokens.insert(mint.clone(), parse_lamports(&result.unwrap()));
        }

        Ok(BalanceSnapshot {
            native,
            tokens,
            fetched_at: 0, // stamped by caller via insert-time clock below
        })
    }

    async fn fetch_fallback(
        &self,
        address: &str,
        mints: &[String],
    ) -> Result<BalanceSnapshot, RpcCallError> {
        let native_fut = self.client.call_single("getBalance", serde_json::json!([address]));
        let token_futs = mints.iter().map(|mint| {
            self.client
                .call_single("getTokenAccountBalance", serde_json::json!([address, { "mint": mint }]))
        });

        let (native_result, token_results) =
            futures::join!(native_fut, join_all(token_futs));

        let native = parse_lamports(&native_result?);
        let mut tokens = BTreeMap::new();
        for (mint, result) in mints.iter().zip(token_results) {
            tokens.insert(mint.clone(), parse_lamports(&result?));
        }

        Ok(BalanceSnapshot {
            native,
            tokens,
            fetched_at: 0,
        })
    }

    /// Invalidate the cached snapshot for `address`. Called immediately
    /// after every successful submission for that address (P10); a
    /// subsequent `get_balances` then refetches.
    pub fn invalidate(&self, address: &str) {
        self.cache.remove(address);
    }

    pub fn contains(&self, address: &str) -> bool {
        self.cache.contains_key(address)
    }
}
