//! CoTA protocol module
//!
//! This module turns protocol witnesses into store mutations:
//! - Molecule decoding of witnesses, scripts and SMT entry tables
//! - Protocol type script constants per chain
//! - Witness entry parsing per transaction
//! - Operation dispatch to the domain transformers
//! - Issuer and class metadata parsing

/// Protocol type script constants
pub mod constants;
/// SMT entry layouts per operation and revision
pub mod entries;
/// JSON metadata envelope
pub mod metadata;
/// Molecule reader and writer
pub mod molecule;
/// Operation codes
pub mod operation;
/// Domain transformers
pub mod transformer;
/// Witness entry parser
pub mod witness;

pub use constants::ProtocolScripts;
pub use metadata::parse_metadata;
pub use transformer::{EntryDispatcher, TransformError};
pub use witness::{Entry, EntryPayload, WitnessEntryParser};

use crate::node::NodeError;
use molecule::DecodeError;

/// Error types for witness parsing
#[derive(Debug, thiserror::Error)]
pub enum CotaError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),
}
