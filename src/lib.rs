//! IRMA Scheme Configuration
//!
//! Parses, verifies and synchronizes scheme configuration trees: signed
//! folders describing scheme managers, the issuers under them, the
//! credential types those issuers issue and the issuers' public keys.
//!
//! Every file under a scheme manager is trusted only after its hash matches
//! the manager's `index`, and the index itself is trusted only after its
//! ECDSA signature verifies against the manager's `pk.pem`.

pub mod assets;
pub mod authenticated;
pub mod cancel;
pub mod configuration;
pub mod disk;
pub mod error;
pub mod logging;
pub mod parser;
pub mod public_key;
pub mod scheme;
pub mod settings;
pub mod signature;
pub mod storage;
pub mod transport;
pub mod update;

pub use irma_core::{
    AttributeId, CredentialTypeId, FileHash, IdentifierError, IdentifierSet, IndexError, IssuerId,
    SchemeManagerId, SchemeManagerIndex,
};

pub use authenticated::read_authenticated;
pub use cancel::CancelToken;
pub use configuration::{compact_hash, CompactHash, Configuration};
pub use error::{
    ConfigurationError, ConfigurationResult, IntegrityError, SchemeError, SchemeManagerError,
    SchemeResult,
};
pub use public_key::PublicKey;
pub use scheme::{
    AttributeType, CredentialType, Issuer, SchemeManager, SchemeManagerStatus, TranslatedString,
};
pub use settings::{HttpSettings, LoggingSettings, Settings, SettingsError};
pub use signature::{verify_signature, SignatureError};
pub use storage::{Storage, StorageError};
pub use transport::{HttpTransport, MockTransport, Transport, TransportError};
