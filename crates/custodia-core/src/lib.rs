pub mod constants;
pub mod custody;
pub mod error;
pub mod invite;
pub mod portfolio;
pub mod principal;
pub mod scheduler;
pub mod swap;
pub mod transaction;
pub mod types;

pub use constants::*;
pub use custody::{ConfirmationKind, ConfirmationSession, FormSession, ImportSession, SecretEntry};
pub use error::CustodiaError;
pub use invite::InviteToken;
pub use portfolio::{Portfolio, PortfolioPosition};
pub use principal::{AuthorizedPrincipal, Principal, Role};
pub use scheduler::SchedulerState;
pub use swap::{FrameMode, SwapProgressFrame, SwapQuote, SwapResult};
pub use transaction::{Purchase, Transaction, TransactionStatus};
pub use types::*;
