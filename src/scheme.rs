//! Scheme description documents
//!
//! Deserialized from the `description.xml` files of the configuration tree:
//! - `<SchemeManager version="7">` at `<manager>/description.xml`
//! - `<Issuer version="4">` at `<manager>/<issuer>/description.xml`
//! - `<IssueSpecification version="4">` at
//!   `<manager>/<issuer>/Issues/<credtype>/description.xml`
//!
//! Fields marked `serde(skip)` are runtime state filled in by the parser.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use irma_core::{CredentialTypeId, IssuerId, SchemeManagerId, SchemeManagerIndex};

use crate::error::{SchemeError, SchemeResult};

/// Description file name in every manager, issuer and credential type folder
pub const DESCRIPTION_FILE: &str = "description.xml";

/// Folder holding an issuer's credential types
pub const ISSUES_DIR: &str = "Issues";

/// Folder holding an issuer's public keys
pub const PUBLIC_KEYS_DIR: &str = "PublicKeys";

pub const MIN_SCHEME_MANAGER_VERSION: u32 = 7;
pub const MIN_ISSUER_VERSION: u32 = 4;
pub const MIN_CREDENTIAL_TYPE_VERSION: u32 = 4;

/// Outcome of parsing a scheme manager folder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemeManagerStatus {
    #[default]
    Unprocessed,
    InvalidIndex,
    InvalidSignature,
    ParsingError,
    ContentParsingError,
    Valid,
}

impl fmt::Display for SchemeManagerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchemeManagerStatus::Unprocessed => "Unprocessed",
            SchemeManagerStatus::InvalidIndex => "InvalidIndex",
            SchemeManagerStatus::InvalidSignature => "InvalidSignature",
            SchemeManagerStatus::ParsingError => "ParsingError",
            SchemeManagerStatus::ContentParsingError => "ContentParsingError",
            SchemeManagerStatus::Valid => "Valid",
        };
        f.write_str(s)
    }
}

/// Text in several languages, keyed by language code
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TranslatedString(BTreeMap<String, String>);

impl TranslatedString {
    /// Translation for `lang`, falling back to English
    pub fn get(&self, lang: &str) -> Option<&str> {
        self.0
            .get(lang)
            .or_else(|| self.0.get("en"))
            .map(String::as_str)
    }

    pub fn insert(&mut self, lang: impl Into<String>, text: impl Into<String>) {
        self.0.insert(lang.into(), text.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// A scheme manager and its parse state
#[derive(Debug, Clone, Deserialize)]
pub struct SchemeManager {
    #[serde(rename = "@version", default)]
    pub version: u32,

    #[serde(rename = "Id")]
    pub id: SchemeManagerId,

    /// Base URL the manager's files are served from
    #[serde(rename = "Url", default)]
    pub url: String,

    #[serde(rename = "Name", default)]
    pub name: TranslatedString,

    #[serde(rename = "Description", default)]
    pub description: TranslatedString,

    #[serde(rename = "Contact", default)]
    pub contact: String,

    #[serde(rename = "KeyshareServer", default)]
    pub keyshare_server: Option<String>,

    #[serde(rename = "KeyshareWebsite", default)]
    pub keyshare_website: Option<String>,

    #[serde(rename = "KeyshareAttribute", default)]
    pub keyshare_attribute: Option<String>,

    #[serde(rename = "TimestampServer", default)]
    pub timestamp_server: Option<String>,

    /// Signed index; stays empty until its signature has been verified
    #[serde(skip)]
    pub index: SchemeManagerIndex,

    #[serde(skip)]
    pub status: SchemeManagerStatus,

    /// True only when `status` is `Valid`
    #[serde(skip)]
    pub valid: bool,
}

impl SchemeManager {
    /// An unprocessed manager known only by its folder name
    pub fn new(id: SchemeManagerId) -> Self {
        Self {
            version: 0,
            id,
            url: String::new(),
            name: TranslatedString::default(),
            description: TranslatedString::default(),
            contact: String::new(),
            keyshare_server: None,
            keyshare_website: None,
            keyshare_attribute: None,
            timestamp_server: None,
            index: SchemeManagerIndex::default(),
            status: SchemeManagerStatus::Unprocessed,
            valid: false,
        }
    }

    pub fn identifier(&self) -> &SchemeManagerId {
        &self.id
    }

    pub fn distributed(&self) -> bool {
        self.keyshare_server.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Whether files can be authenticated against this manager's index
    pub fn has_verified_index(&self) -> bool {
        !self.index.is_empty()
    }

    /// URL of `file` relative to this manager's base URL
    pub fn file_url(&self, file: &str) -> String {
        join_url(&self.url, file)
    }
}

/// `file` below the base URL `base`
pub(crate) fn join_url(base: &str, file: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), file)
}

/// An issuer description
#[derive(Debug, Clone, Deserialize)]
pub struct Issuer {
    #[serde(rename = "@version", default)]
    pub version: u32,

    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "SchemeManager")]
    pub scheme_manager: String,

    #[serde(rename = "Name", default)]
    pub name: TranslatedString,

    #[serde(rename = "ShortName", default)]
    pub short_name: TranslatedString,

    #[serde(rename = "ContactAddress", default)]
    pub contact_address: String,

    #[serde(rename = "ContactEMail", default)]
    pub contact_email: String,

    /// Copy of the owning manager's validity at parse time
    #[serde(skip)]
    pub valid: bool,
}

impl Issuer {
    pub fn identifier(&self) -> IssuerId {
        self.scheme_manager_identifier().issuer(&self.id)
    }

    pub fn scheme_manager_identifier(&self) -> SchemeManagerId {
        SchemeManagerId::new(self.scheme_manager.as_str())
    }
}

/// Attribute declared by a credential type
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttributeType {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "Name", default)]
    pub name: TranslatedString,

    #[serde(rename = "Description", default)]
    pub description: TranslatedString,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AttributeList {
    #[serde(rename = "Attribute", default)]
    attributes: Vec<AttributeType>,
}

fn attribute_list<'de, D>(deserializer: D) -> Result<Vec<AttributeType>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(AttributeList::deserialize(deserializer)?.attributes)
}

/// A credential type description
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialType {
    #[serde(rename = "@version", default)]
    pub version: u32,

    #[serde(rename = "Name", default)]
    pub name: TranslatedString,

    #[serde(rename = "ShortName", default)]
    pub short_name: TranslatedString,

    #[serde(rename = "SchemeManager")]
    pub scheme_manager: String,

    #[serde(rename = "IssuerID")]
    pub issuer: String,

    #[serde(rename = "CredentialID")]
    pub id: String,

    #[serde(rename = "Description", default)]
    pub description: TranslatedString,

    #[serde(rename = "Attributes", default, deserialize_with = "attribute_list")]
    pub attributes: Vec<AttributeType>,

    /// Copy of the owning manager's validity at parse time
    #[serde(skip)]
    pub valid: bool,
}

impl CredentialType {
    pub fn identifier(&self) -> CredentialTypeId {
        self.issuer_identifier().credential_type(&self.id)
    }

    pub fn issuer_identifier(&self) -> IssuerId {
        SchemeManagerId::new(self.scheme_manager.as_str()).issuer(&self.issuer)
    }

    pub fn attribute(&self, id: &str) -> Option<&AttributeType> {
        self.attributes.iter().find(|a| a.id == id)
    }
}

/// Decode an XML document read from `rel`
pub(crate) fn decode<T: DeserializeOwned>(rel: &str, bytes: &[u8]) -> SchemeResult<T> {
    let text = std::str::from_utf8(bytes).map_err(|e| SchemeError::content(rel, e))?;
    let text = text.trim_start_matches('\u{feff}');
    quick_xml::de::from_str(text).map_err(|e| SchemeError::content(rel, e))
}
