//! custodia-admin — operator CLI for owner-only maintenance tasks,
//! grounded on `chronx-wallet::main`'s `clap` `Args`/`Subcommand` derive
//! pattern, generalized from wallet signing commands to authorization and
//! scheduler maintenance against the persistent store directly (this
//! binary never runs a process alongside `custodia-node`; it is an
//! offline tool over the same `sled` database).

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};

use custodia_auth::Authorizer;
use custodia_core::principal::Role;
use custodia_core::types::{PrincipalId, SessionToken};
use custodia_repo::CustodiaDb;

#[derive(Parser, Debug)]
#[command(
    name = "custodia-admin",
    version,
    about = "Operator CLI for the custodial trading assistant's persistent store"
)]
struct Args {
    /// Path to the persistent state database (`DATABASE_PATH`).
    #[arg(long, global = true)]
    database_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RoleArg {
    Admin,
    User,
}

impl From<RoleArg> for Role {
    fn from(r: RoleArg) -> Self {
        match r {
            RoleArg::Admin => Role::Admin,
            RoleArg::User => Role::User,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Issue an invite token for a given role.
    Invite {
        /// Principal id issuing the invite (must already be admin-or-higher).
        #[arg(long)]
        creator: String,
        /// Role the invite grants.
        #[arg(long, value_enum)]
        role: RoleArg,
        /// Invite TTL in milliseconds (default: 24h).
        #[arg(long, default_value_t = custodia_core::DEFAULT_INVITE_TTL_MS)]
        ttl_ms: i64,
    },

    /// Activate a previously-issued invite token for a principal — useful
    /// to bootstrap the first admin without a chat-adapter in place.
    ActivateInvite {
        #[arg(long)]
        token: String,
        #[arg(long)]
        principal: String,
    },

    /// List every authorized principal and its role.
    ListAuthorized,

    /// Grant a role directly, bypassing invite issuance.
    AddAuthorized {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        target: String,
        #[arg(long, value_enum)]
        role: RoleArg,
    },

    /// Revoke a principal's authorization.
    RemoveAuthorized {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        target: String,
    },

    /// Print the persisted DCA scheduler singleton row.
    SchedulerStatus,

    /// List transactions recorded for one principal, most-recent-first.
    Transactions {
        #[arg(long)]
        principal: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("warn,custodia_admin=info").init();

    let args = Args::parse();
    let db = CustodiaDb::open(&args.database_path)
        .with_context(|| format!("opening database at {}", args.database_path.display()))?;

    match args.command {
        Command::Invite { creator, role, ttl_ms } => {
            let creator_id = PrincipalId::new(creator);
            let invite = Authorizer::new(&db)
                .generate_invite(&creator_id, role.into(), ttl_ms, now_ms())
                .context("generating invite")?;
            println!("Invite token: {}", invite.token.as_str());
            println!("Role:         {}", invite.role);
            println!("Expires at:   {} (epoch ms)", invite.expires_at);
            Ok(())
        }

        Command::ActivateInvite { token, principal } => {
            let token = SessionToken(token);
            let principal_id = PrincipalId::new(principal);
            let entry = Authorizer::new(&db)
                .activate_invite(&token, &principal_id, now_ms())
                .context("activating invite")?;
            println!("Activated. Principal {} is now {}.", entry.id, entry.role);
            Ok(())
        }

        Command::ListAuthorized => {
            let mut rows = db.iter_authorized().context("reading authorized principals")?;
            rows.sort_by(|a, b| b.role.cmp(&a.role).then(a.id.as_str().cmp(b.id.as_str())));
            for row in rows {
                println!(
                    "{:<16} {:<8} active={:<5} added_by={}",
                    row.id.as_str(),
                    row.role.to_string(),
                    row.active,
                    row.authorized_by.as_ref().map(|p| p.as_str()).unwrap_or("-"),
                );
            }
            Ok(())
        }

        Command::AddAuthorized { actor, target, role } => {
            let actor_id = PrincipalId::new(actor);
            let target_id = PrincipalId::new(target);
            let entry = Authorizer::new(&db)
                .add(&actor_id, &target_id, role.into(), now_ms())
                .context("adding authorized principal")?;
            println!("Added {} as {}.", entry.id, entry.role);
            Ok(())
        }

        Command::RemoveAuthorized { actor, target } => {
            let actor_id = PrincipalId::new(actor);
            let target_id = PrincipalId::new(target);
            Authorizer::new(&db)
                .remove(&actor_id, &target_id, now_ms())
                .context("removing authorized principal")?;
            println!("Removed {target_id}.");
            Ok(())
        }

        Command::SchedulerStatus => {
            match db.get_scheduler_state().context("reading scheduler state")? {
                Some(state) => {
                    println!("running:      {}", state.running);
                    println!("interval_ms:  {}", state.interval_ms);
                    println!("last_run_at:  {:?}", state.last_run_at);
                    println!("updated_at:   {}", state.updated_at);
                }
                None => println!("scheduler has never run (no persisted state row yet)"),
            }
            Ok(())
        }

        Command::Transactions { principal } => {
            let rows = db
                .transactions_for_principal(&principal)
                .context("reading transactions")?;
            if rows.is_empty() {
                bail!("no transactions recorded for principal {principal}");
            }
            for tx in rows {
                println!(
                    "{}  {:?}  {} -> {}  in={} out={:?}  sig={}",
                    tx.created_at,
                    tx.status,
                    tx.input_mint,
                    tx.output_mint,
                    tx.input_amount,
                    tx.output_amount,
                    tx.signature.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
                );
            }
            Ok(())
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
