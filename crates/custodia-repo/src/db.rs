//! Persistent state database backed by sled (pure-Rust, no C dependencies),
//! one tree per repository — the structure of `chronx_state::StateDb`
//! applied to spec.md §3's entities instead of DAG vertices/accounts.
//!
//! Named trees:
//!   principals   — PrincipalId utf8 bytes → bincode(Principal)
//!   authorized   — PrincipalId utf8 bytes → bincode(AuthorizedPrincipal)
//!   invites      — token utf8 bytes       → bincode(InviteToken)
//!   transactions — tx id utf8 bytes       → bincode(Transaction)
//!   purchases    — purchase id utf8 bytes → bincode(Purchase)
//!   portfolios   — PrincipalId utf8 bytes → bincode(Portfolio)
//!   scheduler    — fixed key b"state"     → bincode(SchedulerState), CHECK singleton

use std::path::Path;

use custodia_core::error::CustodiaError;
use custodia_core::{
    AuthorizedPrincipal, InviteToken, Portfolio, Principal, Purchase, SchedulerState, Transaction,
};

const SCHEDULER_SINGLETON_KEY: &[u8] = b"state";

fn storage_err(e: sled::Error) -> CustodiaError {
    CustodiaError::Storage(e.to_string())
}

fn ser<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, CustodiaError> {
    bincode::serialize(value).map_err(|e| CustodiaError::Serialization(e.to_string()))
}

fn de<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, CustodiaError> {
    bincode::deserialize(bytes).map_err(|e| CustodiaError::Serialization(e.to_string()))
}

pub struct CustodiaDb {
    _db: sled::Db,
    principals: sled::Tree,
    authorized: sled::Tree,
    invites: sled::Tree,
    transactions: sled::Tree,
    purchases: sled::Tree,
    portfolios: sled::Tree,
    scheduler: sled::Tree,
}

impl CustodiaDb {
    /// Open or create the state database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CustodiaError> {
        let db = sled::open(path).map_err(storage_err)?;
        Self::from_sled(db)
    }

    /// In-memory, non-persistent instance — used by every `#[cfg(test)]`
    /// module in this workspace that needs a repository without touching
    /// the filesystem.
    pub fn open_temporary() -> Result<Self, CustodiaError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(storage_err)?;
        Self::from_sled(db)
    }

    fn from_sled(db: sled::Db) -> Result<Self, CustodiaError> {
        let principals = db.open_tree("principals").map_err(storage_err)?;
        let authorized = db.open_tree("authorized").map_err(storage_err)?;
        let invites = db.open_tree("invites").map_err(storage_err)?;
        let transactions = db.open_tree("transactions").map_err(storage_err)?;
        let purchases = db.open_tree("purchases").map_err(storage_err)?;
        let portfolios = db.open_tree("portfolios").map_err(storage_err)?;
        let scheduler = db.open_tree("scheduler").map_err(storage_err)?;
        Ok(Self {
            _db: db,
            principals,
            authorized,
            invites,
            transactions,
            purchases,
            portfolios,
            scheduler,
        })
    }

    // ── Principals ───────────────────────────────────────────────────────

    pub fn get_principal(&self, id: &str) -> Result<Option<Principal>, CustodiaError> {
        match self.principals.get(id.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(de(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_principal(&self, principal: &Principal) -> Result<(), CustodiaError> {
        let bytes = ser(principal)?;
        self.principals
            .insert(principal.id.as_str().as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    // ── Authorization ────────────────────────────────────────────────────

    pub fn get_authorized(&self, id: &str) -> Result<Option<AuthorizedPrincipal>, CustodiaError> {
        match self.authorized.get(id.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(de(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_authorized(&self, entry: &AuthorizedPrincipal) -> Result<(), CustodiaError> {
        let bytes = ser(entry)?;
        self.authorized
            .insert(entry.id.as_str().as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn iter_authorized(&self) -> Result<Vec<AuthorizedPrincipal>, CustodiaError> {
        let mut out = Vec::new();
        for item in self.authorized.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(de(&bytes)?);
        }
        Ok(out)
    }

    pub fn count_active_dca_principals(&self) -> Result<u64, CustodiaError> {
        let mut count = 0u64;
        for item in self.principals.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let p: Principal = de(&bytes)?;
            if p.dca_enabled {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn iter_dca_active_principals(&self) -> Result<Vec<Principal>, CustodiaError> {
        let mut out = Vec::new();
        for item in self.principals.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let p: Principal = de(&bytes)?;
            if p.dca_enabled {
                out.push(p);
            }
        }
        Ok(out)
    }

    // ── Invites ──────────────────────────────────────────────────────────

    pub fn get_invite(&self, token: &str) -> Result<Option<InviteToken>, CustodiaError> {
        match self.invites.get(token.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(de(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_invite(&self, invite: &InviteToken) -> Result<(), CustodiaError> {
        let bytes = ser(invite)?;
        self.invites
            .insert(invite.token.as_str().as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    /// Atomically mark an invite used iff it is still unused — the single
    /// conditional write spec.md §4.6 requires to defeat the activation
    /// race (P9). Returns `true` iff this call was the one that won.
    pub fn mark_invite_used(
        &self,
        token: &str,
        used_by: custodia_core::PrincipalId,
        now_ms: custodia_core::TimestampMs,
    ) -> Result<bool, CustodiaError> {
        let key = token.as_bytes();
        let result = self.invites.fetch_and_update(key, |existing| {
            let bytes = existing?;
            let mut invite: InviteToken = bincode::deserialize(bytes).ok()?;
            if invite.used_by.is_some() {
                return Some(bytes.to_vec());
            }
            invite.used_by = Some(used_by.clone());
            invite.used_at = Some(now_ms);
            bincode::serialize(&invite).ok()
        });

        let new_bytes = result.map_err(storage_err)?.ok_or(CustodiaError::InviteNotFound)?;
        let invite: InviteToken = de(&new_bytes)?;
        Ok(invite.used_by.as_ref() == Some(&used_by))
    }

    // ── Transactions ─────────────────────────────────────────────────────

    pub fn put_transaction(&self, tx: &Transaction) -> Result<(), CustodiaError> {
        let bytes = ser(tx)?;
        self.transactions
            .insert(tx.id.as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_transaction(&self, id: &str) -> Result<Option<Transaction>, CustodiaError> {
        match self.transactions.get(id.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(de(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Transactions for one principal, most-recent-first. There is a
    /// secondary index on `principal_id` in the logical schema (spec.md
    /// §6); here that is a linear scan with a filter, matching
    /// `chronx_state`'s own `iter_timelocks_for_recipient` pattern — an
    /// index is an optimization the embedded store is free to add later.
    pub fn transactions_for_principal(&self, id: &str) -> Result<Vec<Transaction>, CustodiaError> {
        let mut out = Vec::new();
        for item in self.transactions.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let tx: Transaction = de(&bytes)?;
            if tx.principal_id.as_str() == id {
                out.push(tx);
            }
        }
        out.sort_by_key(|t| std::cmp::Reverse(t.created_at));
        Ok(out)
    }

    // ── Purchases / Portfolio ────────────────────────────────────────────

    pub fn put_purchase(&self, purchase: &Purchase) -> Result<(), CustodiaError> {
        let bytes = ser(purchase)?;
        self.purchases
            .insert(purchase.id.as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn purchases_for_principal(&self, id: &str) -> Result<Vec<Purchase>, CustodiaError> {
        let mut out = Vec::new();
        for item in self.purchases.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let p: Purchase = de(&bytes)?;
            if p.principal_id.as_str() == id {
                out.push(p);
            }
        }
        Ok(out)
    }

    pub fn get_portfolio(&self, id: &str) -> Result<Option<Portfolio>, CustodiaError> {
        match self.portfolios.get(id.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(de(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_portfolio(&self, portfolio: &Portfolio) -> Result<(), CustodiaError> {
        let key = portfolio
            .principal_id
            .as_ref()
            .ok_or_else(|| CustodiaError::Internal("portfolio missing principal_id".into()))?;
        let bytes = ser(portfolio)?;
        self.portfolios
            .insert(key.as_str().as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    // ── Scheduler (singleton row) ────────────────────────────────────────

    pub fn get_scheduler_state(&self) -> Result<Option<SchedulerState>, CustodiaError> {
        match self
            .scheduler
            .get(SCHEDULER_SINGLETON_KEY)
            .map_err(storage_err)?
        {
            Some(bytes) => Ok(Some(de(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_scheduler_state(&self, state: &SchedulerState) -> Result<(), CustodiaError> {
        let bytes = ser(state)?;
        self.scheduler
            .insert(SCHEDULER_SINGLETON_KEY, bytes)
            .map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodia_core::types::PrincipalId;

    #[test]
    fn principal_roundtrip() {
        let db = CustodiaDb::open_temporary().unwrap();
        let p = Principal::new(PrincipalId::new("42"), 1_000);
        db.put_principal(&p).unwrap();
        let loaded = db.get_principal("42").unwrap().unwrap();
        assert_eq!(loaded.id, p.id);
    }

    #[test]
    fn scheduler_state_is_singleton() {
        let db = CustodiaDb::open_temporary().unwrap();
        assert!(db.get_scheduler_state().unwrap().is_none());
        let s = SchedulerState::new(60_000, 1_000);
        db.put_scheduler_state(&s).unwrap();
        let mut loaded = db.get_scheduler_state().unwrap().unwrap();
        loaded.last_run_at = Some(2_000);
        db.put_scheduler_state(&loaded).unwrap();
        let reloaded = db.get_scheduler_state().unwrap().unwrap();
        assert_eq!(reloaded.last_run_at, Some(2_000));
    }

    #[test]
    fn invite_mark_used_is_single_winner() {
        use custodia_core::principal::Role;
        use custodia_core::types::SessionToken;

        let db = CustodiaDb::open_temporary().unwrap();
        let invite = InviteToken::new(
            SessionToken("abcdEFGH12345678901234".into()),
            Role::User,
            PrincipalId::new("1"),
            1_000,
            86_400_000,
        );
        db.put_invite(&invite).unwrap();

        let a = db
            .mark_invite_used(invite.token.as_str(), PrincipalId::new("2"), 2_000)
            .unwrap();
        let b = db
            .mark_invite_used(invite.token.as_str(), PrincipalId::new("3"), 3_000)
            .unwrap();
        assert!(a);
        assert!(!b);

        let stored = db.get_invite(invite.token.as_str()).unwrap().unwrap();
        assert_eq!(stored.used_by, Some(PrincipalId::new("2")));
    }

    #[test]
    fn transactions_for_principal_filters_and_orders() {
        let db = CustodiaDb::open_temporary().unwrap();
        use custodia_core::types::Mint;

        let mut tx1 = Transaction::new_submitted(
            "tx1".into(),
            PrincipalId::new("1"),
            Mint::Native,
            Mint::Spl("USDC".into()),
            1_000,
            50,
            1_000,
        );
        tx1.created_at = 1_000;
        let mut tx2 = tx1.clone();
        tx2.id = "tx2".into();
        tx2.created_at = 2_000;
        let mut tx3 = tx1.clone();
        tx3.id = "tx3".into();
        tx3.principal_id = PrincipalId::new("2");

        db.put_transaction(&tx1).unwrap();
        db.put_transaction(&tx2).unwrap();
        db.put_transaction(&tx3).unwrap();

        let for_one = db.transactions_for_principal("1").unwrap();
        assert_eq!(for_one.len(), 2);
        assert_eq!(for_one[0].id, "tx2");
    }
}
