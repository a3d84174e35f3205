//! The closed set of use-cases the dispatcher can route to, and the
//! minimum role each one requires (spec.md §4.9 step 4).

use custodia_core::principal::Role;
use custodia_core::types::{Amount, Mint, PrincipalId, SessionToken};

#[derive(Clone, Debug)]
pub enum Command {
    ProvisionWallet,
    GetBalance { mints: Vec<Mint> },
    ExecuteSwap {
        input_mint: Mint,
        output_mint: Mint,
        input_amount: Amount,
        slippage_bps: u32,
    },
    SetDcaEnabled(bool),
    AddAuthorized { target: PrincipalId, role: Role },
    RemoveAuthorized { target: PrincipalId },
    UpdateRole { target: PrincipalId, role: Role },
    GenerateInvite { role: Role, ttl_ms: i64 },
    ActivateInvite { token: SessionToken },
}

impl Command {
    /// `None` means the command may run for an identity that is not yet
    /// authorized at all — only invite activation, since that is exactly
    /// how an unauthorized principal becomes one.
    pub fn requires_role(&self) -> Option<Role> {
        match self {
            Command::ActivateInvite { .. } => None,
            Command::ProvisionWallet
            | Command::GetBalance { .. }
            | Command::ExecuteSwap { .. }
            | Command::SetDcaEnabled(_) => Some(Role::User),
            Command::AddAuthorized { .. }
            | Command::RemoveAuthorized { .. }
            | Command::UpdateRole { .. }
            | Command::GenerateInvite { .. } => Some(Role::Admin),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::ProvisionWallet => "provision_wallet",
            Command::GetBalance { .. } => "get_balance",
            Command::ExecuteSwap { .. } => "execute_swap",
            Command::SetDcaEnabled(_) => "set_dca_enabled",
            Command::AddAuthorized { .. } => "add_authorized",
            Command::RemoveAuthorized { .. } => "remove_authorized",
            Command::UpdateRole { .. } => "update_role",
            Command::GenerateInvite { .. } => "generate_invite",
            Command::ActivateInvite { .. } => "activate_invite",
        }
    }
}
