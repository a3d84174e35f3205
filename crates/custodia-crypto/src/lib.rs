pub mod aead;
pub mod hash;
pub mod signer;

pub use aead::{CryptoError, MasterKeyHandle};
pub use hash::{blake3_hash, generate_session_token};
pub use signer::{Signer, SignerError};
