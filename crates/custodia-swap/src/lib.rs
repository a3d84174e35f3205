//! Swap execution pipeline (spec.md §4.4), grounded on
//! `chronx-timelock/src/query.rs`'s thin query-struct-over-`&StateDb`
//! pattern, generalized from a read-only query into a multi-step pipeline
//! that drives the ledger, the quote aggregator, and the signer.

pub mod aggregator;
pub mod pipeline;

pub use aggregator::{JupiterAggregatorClient, QuoteAggregatorClient, QuoteRequest};
pub use pipeline::{SwapEvent, SwapEventStream, SwapPipeline, SwapRequest};
