//! Credential model: the persisted credential set, redacting secret wrappers, and the pure
//! expiry evaluator.

pub mod credential;
pub mod secret;

pub use credential::*;
pub use secret::*;
