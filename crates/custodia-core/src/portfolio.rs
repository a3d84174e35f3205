use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{Amount, Mint, PrincipalId, TimestampMs};

/// A principal's accumulated position in one asset, rolled up from
/// confirmed purchases. Cost basis is tracked in quote-asset terms so DCA
/// reporting does not need to re-derive it from the transaction log.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PortfolioPosition {
    pub base_amount: Amount,
    pub quote_amount_spent: Amount,
    pub purchase_count: u32,
}

/// The full set of positions held by one principal.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Portfolio {
    pub principal_id: Option<PrincipalId>,
    pub positions: BTreeMap<String, PortfolioPosition>,
    pub updated_at: Option<TimestampMs>,
}

impl Portfolio {
    pub fn new(principal_id: PrincipalId) -> Self {
        Self {
            principal_id: Some(principal_id),
            positions: BTreeMap::new(),
            updated_at: None,
        }
    }

    /// Fold one confirmed purchase into the position for `mint`.
    pub fn record_purchase(
        &mut self,
        mint: &Mint,
        quote_spent: Amount,
        base_received: Amount,
        now_ms: TimestampMs,
    ) {
        let entry = self.positions.entry(mint.to_string()).or_default();
        entry.base_amount = entry.base_amount.saturating_add(base_received);
        entry.quote_amount_spent = entry.quote_amount_spent.saturating_add(quote_spent);
        entry.purchase_count += 1;
        self.updated_at = Some(now_ms);
    }
}
