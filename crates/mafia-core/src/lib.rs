//! # Mafia Core
//!
//! Threshold homomorphic protocol layer for a blind hidden-role game.
//!
//! N mutually distrusting parties play Citizen, Mafia, Doctor and Police.
//! Nobody, the host included, learns another party's role or action in
//! plaintext, yet collective outcomes can still be computed:
//!
//! - Distributed Key Generation (chained, join order)
//! - Blind role reveal (each owner fuses its own role vector)
//! - Strict N-of-N threshold decryption
//! - Relay decryption chain
//! - Parallel investigation
//! - Shape-uniform action triples and decoy traffic
//!
//! ## Example
//!
//! ```rust,ignore
//! use mafia_core::host::{BlindRoleAssigner, DkgCoordinator};
//!
//! let setup = DkgCoordinator::new(&transport, "game-1", 4).run().await?;
//! BlindRoleAssigner::new(&transport, "game-1", 4)
//!     .assign(&roster, &setup.joint_public_key)
//!     .await?;
//! ```

pub mod action;
pub mod audit;
pub mod codec;
pub mod config;
pub mod dkg;
pub mod error;
pub mod fhe;
pub mod host;
pub mod investigate;
pub mod node;
pub mod relay;
pub mod roles;
pub mod session;
pub mod threshold;
pub mod transport;
pub mod types;

#[cfg(test)]
mod scenario_tests;

pub use action::{ActionTriple, DecisionSource, Phase};
pub use audit::{AuditEvent, AuditSink, Milestone};
pub use config::ProtocolConfig;
pub use error::{Error, ErrorKind, Result};
pub use node::PartyNode;
pub use session::PartySession;
pub use transport::{PeerRequest, PeerResponse, PeerTransport};
pub use types::{GameId, PartyId, Role, Roster, LEAD_PARTY, ROLE_KINDS};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
