//! Host-side drivers
//!
//! The host walks parties through setup and collects round submissions. It
//! only ever handles public keys, ciphertexts and shares addressed to
//! someone else; fused plaintexts it sees are public tallies.

mod actions;
mod dkg;
mod roles;

pub use actions::{decrypt_tally, resolve_night, resolve_vote, ActionCollector, Tallies};
pub use dkg::{DkgCoordinator, DkgOutcome};
pub use roles::BlindRoleAssigner;
