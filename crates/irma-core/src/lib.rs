//! IRMA Scheme Core Types
//!
//! Value types shared by everything that reads or writes a scheme
//! configuration tree: hierarchical identifiers, identifier sets and the
//! signed scheme manager index.

pub mod identifier;
pub mod index;
pub mod set;

pub use identifier::{
    AttributeId, CredentialTypeId, IdentifierError, IssuerId, SchemeManagerId, SEPARATOR,
};
pub use index::{FileHash, IndexError, SchemeManagerIndex, HASH_LENGTH};
pub use set::IdentifierSet;
