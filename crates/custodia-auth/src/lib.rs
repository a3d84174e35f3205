//! Authorization & invite service (spec.md §4.6), grounded on
//! `chronx-recovery`'s thin-service-struct-over-shared-store pattern
//! (`VerifierRegistry`, `RecoveryQuery` each wrap a `&StateDb` and expose
//! query/mutate helpers) generalized from a verifier registry to a role
//! hierarchy.

use tracing::info;

use custodia_core::error::CustodiaError;
use custodia_core::principal::{AuthorizedPrincipal, Role};
use custodia_core::types::{PrincipalId, SessionToken, TimestampMs};
use custodia_core::InviteToken;
use custodia_repo::CustodiaDb;
use custodia_crypto::generate_session_token;

/// Default invite TTL (spec.md §4.6: "24-h configurable").
pub const DEFAULT_INVITE_TTL_MS: i64 = custodia_core::DEFAULT_INVITE_TTL_MS;

/// Thin service layer over `CustodiaDb`'s `authorized`/`invites` trees.
/// Owns no state of its own — every call re-reads the store, matching the
/// teacher's `VerifierRegistry<'a> { db: &'a StateDb }` shape.
pub struct Authorizer<'a> {
    db: &'a CustodiaDb,
}

impl<'a> Authorizer<'a> {
    pub fn new(db: &'a CustodiaDb) -> Self {
        Self { db }
    }

    /// Materialize the owner row if it is missing — idempotent, called
    /// once at boot with `OWNER_ID`.
    pub fn initialize(&self, owner_id: &PrincipalId, now_ms: TimestampMs) -> Result<(), CustodiaError> {
        if self.db.get_authorized(owner_id.as_str())?.is_some() {
            return Ok(());
        }
        let owner = AuthorizedPrincipal::bootstrap_owner(owner_id.clone(), now_ms);
        self.db.put_authorized(&owner)?;
        info!(owner_id = %owner_id, "authorization: owner row initialized");
        Ok(())
    }

    pub fn role_of(&self, id: &PrincipalId) -> Result<Option<Role>, CustodiaError> {
        Ok(self
            .db
            .get_authorized(id.as_str())?
            .filter(|a| a.active)
            .map(|a| a.role))
    }

    pub fn is_authorized(&self, id: &PrincipalId) -> Result<bool, CustodiaError> {
        Ok(self.role_of(id)?.is_some())
    }

    /// `add`: the acting principal must be admin-or-higher and strictly
    /// outrank the *proposed* role (spec.md §4.6); `owner` can never be
    /// assigned via this path.
    pub fn add(
        &self,
        actor_id: &PrincipalId,
        target_id: &PrincipalId,
        role: Role,
        now_ms: TimestampMs,
    ) -> Result<AuthorizedPrincipal, CustodiaError> {
        if role == Role::Owner {
            return Err(CustodiaError::PermissionDenied(
                "the owner role cannot be assigned".into(),
            ));
        }
        let actor_role = self.require_manager_role(actor_id)?;
        if !actor_role.can_manage(role) {
            return Err(CustodiaError::InsufficientRole {
                have: actor_role.to_string(),
                target: role.to_string(),
            });
        }
        if self.is_authorized(target_id)? {
            return Err(CustodiaError::AlreadyAuthorized(target_id.to_string()));
        }

        let entry = AuthorizedPrincipal {
            id: target_id.clone(),
            role,
            authorized_at: now_ms,
            authorized_by: Some(actor_id.clone()),
            active: true,
            updated_at: now_ms,
        };
        self.db.put_authorized(&entry)?;
        info!(actor = %actor_id, target = %target_id, role = %role, "authorization: principal added");
        Ok(entry)
    }

    /// `remove`: soft-delete (sets `active = false`) so the audit trail
    /// survives — the owner row is immutable and can never be removed.
    pub fn remove(
        &self,
        actor_id: &PrincipalId,
        target_id: &PrincipalId,
        now_ms: TimestampMs,
    ) -> Result<(), CustodiaError> {
        let actor_role = self.require_manager_role(actor_id)?;
        let target = self
            .db
            .get_authorized(target_id.as_str())?
            .ok_or_else(|| CustodiaError::PrincipalNotFound(target_id.to_string()))?;
        if target.role == Role::Owner {
            return Err(CustodiaError::PermissionDenied("the owner row is immutable".into()));
        }
        if !actor_role.can_manage(target.role) {
            return Err(CustodiaError::InsufficientRole {
                have: actor_role.to_string(),
                target: target.role.to_string(),
            });
        }

        let mut updated = target;
        updated.active = false;
        updated.updated_at = now_ms;
        self.db.put_authorized(&updated)?;
        info!(actor = %actor_id, target = %target_id, "authorization: principal removed");
        Ok(())
    }

    /// `updateRole`: actor must strictly outrank both the target's current
    /// role and the proposed role (spec.md §4.6, P8).
    pub fn update_role(
        &self,
        actor_id: &PrincipalId,
        target_id: &PrincipalId,
        new_role: Role,
        now_ms: TimestampMs,
    ) -> Result<AuthorizedPrincipal, CustodiaError> {
        if new_role == Role::Owner {
            return Err(CustodiaError::PermissionDenied(
                "the owner role cannot be assigned".into(),
            ));
        }
        let actor_role = self.require_manager_role(actor_id)?;
        let mut target = self
            .db
            .get_authorized(target_id.as_str())?
            .filter(|a| a.active)
            .ok_or_else(|| CustodiaError::PrincipalNotFound(target_id.to_string()))?;
        if target.role == Role::Owner {
            return Err(CustodiaError::PermissionDenied("the owner row is immutable".into()));
        }
        if !actor_role.can_manage(target.role) || !actor_role.can_manage(new_role) {
            return Err(CustodiaError::InsufficientRole {
                have: actor_role.to_string(),
                target: new_role.to_string(),
            });
        }

        target.role = new_role;
        target.updated_at = now_ms;
        self.db.put_authorized(&target)?;
        info!(actor = %actor_id, target = %target_id, role = %new_role, "authorization: role updated");
        Ok(target)
    }

    fn require_manager_role(&self, actor_id: &PrincipalId) -> Result<Role, CustodiaError> {
        let role = self
            .role_of(actor_id)?
            .ok_or_else(|| CustodiaError::NotAuthorized(actor_id.to_string()))?;
        if role == Role::User {
            return Err(CustodiaError::PermissionDenied(
                "admin or owner role required".into(),
            ));
        }
        Ok(role)
    }

    // ── Invite ───────────────────────────────────────────────────────────

    /// `generate`: the creator must themselves be admin-or-higher and
    /// strictly outrank the role the invite grants.
    pub fn generate_invite(
        &self,
        creator_id: &PrincipalId,
        role: Role,
        ttl_ms: i64,
        now_ms: TimestampMs,
    ) -> Result<InviteToken, CustodiaError> {
        if role == Role::Owner {
            return Err(CustodiaError::PermissionDenied(
                "an invite cannot grant the owner role".into(),
            ));
        }
        let creator_role = self.require_manager_role(creator_id)?;
        if !creator_role.can_manage(role) {
            return Err(CustodiaError::InsufficientRole {
                have: creator_role.to_string(),
                target: role.to_string(),
            });
        }

        let token = generate_session_token();
        let invite = InviteToken::new(token, role, creator_id.clone(), now_ms, ttl_ms);
        self.db.put_invite(&invite)?;
        info!(creator = %creator_id, role = %role, "authorization: invite generated");
        Ok(invite)
    }

    /// `activate`: requires the activating principal not already
    /// authorized, the token to exist/be unexpired/unused, and performs
    /// the single conditional write that defeats the activation race (P9).
    pub fn activate_invite(
        &self,
        token: &SessionToken,
        principal_id: &PrincipalId,
        now_ms: TimestampMs,
    ) -> Result<AuthorizedPrincipal, CustodiaError> {
        if !SessionToken::is_well_formed(token.as_str()) {
            return Err(CustodiaError::InvalidTokenFormat);
        }
        if self.is_authorized(principal_id)? {
            return Err(CustodiaError::AlreadyAuthorized(principal_id.to_string()));
        }

        let invite = self
            .db
            .get_invite(token.as_str())?
            .ok_or(CustodiaError::InviteNotFound)?;
        if invite.is_expired(now_ms) {
            return Err(CustodiaError::InviteNotFound);
        }
        if invite.is_used() {
            return Err(CustodiaError::InviteAlreadyUsed);
        }

        let won = self.db.mark_invite_used(token.as_str(), principal_id.clone(), now_ms)?;
        if !won {
            return Err(CustodiaError::InviteAlreadyUsed);
        }

        let entry = AuthorizedPrincipal {
            id: principal_id.clone(),
            role: invite.role,
            authorized_at: now_ms,
            authorized_by: Some(invite.created_by.clone()),
            active: true,
            updated_at: now_ms,
        };
        self.db.put_authorized(&entry)?;
        info!(principal = %principal_id, role = %invite.role, "authorization: invite activated");
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner_db(owner: &str) -> CustodiaDb {
        let db = CustodiaDb::open_temporary().unwrap();
        Authorizer::new(&db)
            .initialize(&PrincipalId::new(owner), 0)
            .unwrap();
        db
    }

    #[test]
    fn bootstrap_owner_is_idempotent() {
        let db = owner_db("1");
        let auth = Authorizer::new(&db);
        auth.initialize(&PrincipalId::new("1"), 1_000).unwrap();
        let role = auth.role_of(&PrincipalId::new("1")).unwrap();
        assert_eq!(role, Some(Role::Owner));
    }

    /// P8: actor must strictly outrank both current and proposed role.
    #[test]
    fn p8_admin_cannot_promote_to_admin() {
        let db = owner_db("1");
        let auth = Authorizer::new(&db);
        let owner = PrincipalId::new("1");
        let admin = PrincipalId::new("2");
        let user = PrincipalId::new("3");

        auth.add(&owner, &admin, Role::Admin, 10).unwrap();
        auth.add(&owner, &user, Role::User, 20).unwrap();

        // an admin cannot promote another principal to admin (not strictly outranked).
        let result = auth.update_role(&admin, &user, Role::Admin, 30);
        assert!(matches!(result, Err(CustodiaError::InsufficientRole { .. })));
    }

    #[test]
    fn owner_row_is_immutable() {
        let db = owner_db("1");
        let auth = Authorizer::new(&db);
        let owner = PrincipalId::new("1");
        let result = auth.remove(&owner, &owner, 10);
        assert!(matches!(result, Err(CustodiaError::PermissionDenied(_))));
    }

    #[test]
    fn owner_role_can_never_be_assigned() {
        let db = owner_db("1");
        let auth = Authorizer::new(&db);
        let owner = PrincipalId::new("1");
        let target = PrincipalId::new("2");
        let result = auth.add(&owner, &target, Role::Owner, 10);
        assert!(matches!(result, Err(CustodiaError::PermissionDenied(_))));
    }

    /// Seed scenario 1 (spec.md §8): invite happy path + single-use.
    #[test]
    fn seed_scenario_invite_happy_path_and_single_use() {
        let db = owner_db("1");
        let auth = Authorizer::new(&db);
        let owner = PrincipalId::new("1");

        let invite = auth
            .generate_invite(&owner, Role::User, DEFAULT_INVITE_TTL_MS, 0)
            .unwrap();

        let a = PrincipalId::new("2");
        let activated = auth.activate_invite(&invite.token, &a, 1_000).unwrap();
        assert_eq!(activated.role, Role::User);

        let b = PrincipalId::new("3");
        let result = auth.activate_invite(&invite.token, &b, 2_000);
        assert!(matches!(result, Err(CustodiaError::InviteAlreadyUsed)));
    }

    #[test]
    fn p4_expired_invite_is_not_found() {
        let db = owner_db("1");
        let auth = Authorizer::new(&db);
        let owner = PrincipalId::new("1");
        let invite = auth.generate_invite(&owner, Role::User, 1_000, 0).unwrap();

        let result = auth.activate_invite(&invite.token, &PrincipalId::new("2"), 5_000);
        assert!(matches!(result, Err(CustodiaError::InviteNotFound)));
    }

    #[test]
    fn already_authorized_principal_cannot_activate_another_invite() {
        let db = owner_db("1");
        let auth = Authorizer::new(&db);
        let owner = PrincipalId::new("1");
        let invite = auth
            .generate_invite(&owner, Role::User, DEFAULT_INVITE_TTL_MS, 0)
            .unwrap();

        let result = auth.activate_invite(&invite.token, &owner, 10);
        assert!(matches!(result, Err(CustodiaError::AlreadyAuthorized(_))));
    }
}
