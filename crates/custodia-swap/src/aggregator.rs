//! Quote aggregator client (spec.md §4.4 steps 3/4). DTOs modeled on a
//! Jupiter-shaped quote/swap API — `inputMint`/`outputMint`/`slippageBps`/
//! `priceImpactPct`/`route` — since spec.md leaves the wire shape opaque
//! and a concrete client has to pick one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use custodia_core::error::CustodiaError;
use custodia_core::types::{Address, Amount, BasisPoints, Mint};
use custodia_resilience::sanitize_external_message;

#[derive(Clone, Debug)]
pub struct QuoteRequest {
    pub input_mint: Mint,
    pub output_mint: Mint,
    pub amount: Amount,
    pub slippage_bps: BasisPoints,
}

fn mint_param(mint: &Mint) -> String {
    match mint {
        Mint::Native => "So11111111111111111111111111111111111111112".to_string(),
        Mint::Spl(addr) => addr.clone(),
    }
}

#[derive(Serialize)]
struct JupiterQuoteParams<'a> {
    #[serde(rename = "inputMint")]
    input_mint: &'a str,
    #[serde(rename = "outputMint")]
    output_mint: &'a str,
    amount: Amount,
    #[serde(rename = "slippageBps")]
    slippage_bps: BasisPoints,
}

#[derive(Deserialize)]
struct JupiterQuoteResponse {
    #[serde(rename = "outAmount")]
    out_amount: Amount,
    #[serde(rename = "priceImpactPct")]
    price_impact_pct: f64,
    #[serde(rename = "routePlan")]
    route_plan: serde_json::Value,
}

#[derive(Serialize)]
struct JupiterSwapParams<'a> {
    #[serde(rename = "userPublicKey")]
    user_public_key: &'a str,
    route: &'a serde_json::Value,
    #[serde(rename = "prioritizationFeeLamports", skip_serializing_if = "Option::is_none")]
    prioritization_fee_lamports: Option<u64>,
}

#[derive(Deserialize)]
struct JupiterSwapResponse {
    #[serde(rename = "swapTransaction")]
    swap_transaction: String,
}

/// Abstracts the aggregator HTTP surface so the pipeline can be tested
/// against a fake without a live network call.
#[async_trait]
pub trait QuoteAggregatorClient: Send + Sync {
    async fn quote(&self, req: QuoteRequest) -> Result<custodia_core::swap::SwapQuote, CustodiaError>;

    /// Returns a base64-encoded unsigned transaction blueprint for the
    /// given quote's route, payable by `payer`.
    async fn build_transaction(
        &self,
        quote: &custodia_core::swap::SwapQuote,
        payer: &Address,
        priority_fee_micro_lamports: Option<u64>,
    ) -> Result<String, CustodiaError>;
}

pub struct JupiterAggregatorClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl JupiterAggregatorClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }
}

#[async_trait]
impl QuoteAggregatorClient for JupiterAggregatorClient {
    async fn quote(&self, req: QuoteRequest) -> Result<custodia_core::swap::SwapQuote, CustodiaError> {
        let input_mint = mint_param(&req.input_mint);
        let output_mint = mint_param(&req.output_mint);
        let params = JupiterQuoteParams {
            input_mint: &input_mint,
            output_mint: &output_mint,
            amount: req.amount,
            slippage_bps: req.slippage_bps,
        };

        let url = format!("{}/quote", self.base_url);
        let resp = self
            .request(self.http.get(&url).query(&params))
            .send()
            .await
            .map_err(|e| CustodiaError::QuoteError(sanitize_external_message(&e.to_string())))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CustodiaError::QuoteError(sanitize_external_message(&format!(
                "aggregator returned {status}: {body}"
            ))));
        }

        let body: JupiterQuoteResponse = resp
            .json()
            .await
            .map_err(|e| CustodiaError::QuoteError(sanitize_external_message(&e.to_string())))?;

        Ok(custodia_core::swap::SwapQuote {
            input_mint: req.input_mint,
            output_mint: req.output_mint,
            input_amount: req.amount,
            output_amount: body.out_amount,
            price_impact_bps: (body.price_impact_pct * 10_000.0).round() as u32,
            slippage_bps: req.slippage_bps,
            route: body.route_plan,
        })
    }

    async fn build_transaction(
        &self,
        quote: &custodia_core::swap::SwapQuote,
        payer: &Address,
        priority_fee_micro_lamports: Option<u64>,
    ) -> Result<String, CustodiaError> {
        let params = JupiterSwapParams {
            user_public_key: payer.as_str(),
            route: &quote.route,
            prioritization_fee_lamports: priority_fee_micro_lamports,
        };

        let url = format!("{}/swap-transaction", self.base_url);
        let resp = self
            .request(self.http.post(&url).json(&params))
            .send()
            .await
            .map_err(|e| CustodiaError::BuildError(sanitize_external_message(&e.to_string())))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CustodiaError::BuildError(sanitize_external_message(&format!(
                "aggregator returned {status}: {body}"
            ))));
        }

        let body: JupiterSwapResponse = resp
            .json()
            .await
            .map_err(|e| CustodiaError::BuildError(sanitize_external_message(&e.to_string())))?;

        Ok(body.swap_transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_mint_maps_to_wrapped_sol_address() {
        assert_eq!(
            mint_param(&Mint::Native),
            "So11111111111111111111111111111111111111112"
        );
        assert_eq!(mint_param(&Mint::Spl("USDC".into())), "USDC");
    }
}
