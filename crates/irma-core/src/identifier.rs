//! Hierarchical object identifiers
//!
//! Identifiers are dot-separated paths, one segment per level:
//! - scheme manager: `irma-demo`
//! - issuer: `irma-demo.RU`
//! - credential type: `irma-demo.RU.studentCard`
//! - attribute: `irma-demo.RU.studentCard.studentID`
//!
//! `new` never fails and performs no validation; `parse` (and `FromStr`)
//! additionally checks the segment count and rejects empty segments and
//! path separators, so a parsed identifier is always safe as a folder name.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between identifier segments
pub const SEPARATOR: char = '.';

/// Errors from validating identifier construction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("{kind} identifier {value:?} must have {expected} segments, found {found}")]
    SegmentCount {
        kind: &'static str,
        value: String,
        expected: usize,
        found: usize,
    },

    #[error("{kind} identifier {value:?} contains an empty segment")]
    EmptySegment { kind: &'static str, value: String },

    #[error("{kind} identifier {value:?} contains a path separator")]
    PathSeparator { kind: &'static str, value: String },
}

fn parent_of(id: &str) -> &str {
    match id.rfind(SEPARATOR) {
        Some(i) => &id[..i],
        None => "",
    }
}

fn name_of(id: &str) -> &str {
    match id.rfind(SEPARATOR) {
        Some(i) => &id[i + 1..],
        None => id,
    }
}

fn validate(kind: &'static str, value: &str, expected: usize) -> Result<(), IdentifierError> {
    if value.contains(|c: char| c == '/' || c == '\\') {
        return Err(IdentifierError::PathSeparator {
            kind,
            value: value.to_string(),
        });
    }
    let segments: Vec<&str> = value.split(SEPARATOR).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(IdentifierError::EmptySegment {
            kind,
            value: value.to_string(),
        });
    }
    if segments.len() != expected {
        return Err(IdentifierError::SegmentCount {
            kind,
            value: value.to_string(),
            expected,
            found: segments.len(),
        });
    }
    Ok(())
}

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident, $kind:literal, $segments:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier string without validating it
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Construct from a string, checking its shape
            pub fn parse(id: &str) -> Result<Self, IdentifierError> {
                validate($kind, id, $segments)?;
                Ok(Self(id.to_string()))
            }

            /// Everything before the last separator (empty at the top level)
            pub fn parent(&self) -> &str {
                parent_of(&self.0)
            }

            /// The last segment
            pub fn name(&self) -> &str {
                name_of(&self.0)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdentifierError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

identifier!(
    /// Identifies a scheme manager, for example `irma-demo`
    SchemeManagerId,
    "scheme manager",
    1
);

identifier!(
    /// Identifies an issuer, for example `irma-demo.RU`
    IssuerId,
    "issuer",
    2
);

identifier!(
    /// Identifies a credential type, for example `irma-demo.RU.studentCard`
    CredentialTypeId,
    "credential type",
    3
);

identifier!(
    /// Identifies an attribute, for example `irma-demo.RU.studentCard.studentID`
    AttributeId,
    "attribute",
    4
);

fn child(parent: &str, name: &str) -> String {
    format!("{}{}{}", parent, SEPARATOR, name)
}

impl SchemeManagerId {
    /// Identifier of the issuer `name` under this scheme manager
    pub fn issuer(&self, name: &str) -> IssuerId {
        IssuerId::new(child(&self.0, name))
    }
}

impl IssuerId {
    pub fn scheme_manager_id(&self) -> SchemeManagerId {
        SchemeManagerId::new(self.parent())
    }

    /// Identifier of the credential type `name` issued by this issuer
    pub fn credential_type(&self, name: &str) -> CredentialTypeId {
        CredentialTypeId::new(child(&self.0, name))
    }
}

impl CredentialTypeId {
    pub fn issuer_id(&self) -> IssuerId {
        IssuerId::new(self.parent())
    }

    pub fn scheme_manager_id(&self) -> SchemeManagerId {
        self.issuer_id().scheme_manager_id()
    }

    pub fn attribute(&self, name: &str) -> AttributeId {
        AttributeId::new(child(&self.0, name))
    }
}

impl AttributeId {
    pub fn credential_type_id(&self) -> CredentialTypeId {
        CredentialTypeId::new(self.parent())
    }
}
