//! Admin credentials and scoped-token issuance/validation/revocation.

pub mod admin_registry;
pub mod token_minter;

pub use admin_registry::{AdminError, AdminKeyRegistry};
pub use token_minter::{verify_hmac_constant_time, MintOptions, ScopedTokenMinter, ValidatedToken};
