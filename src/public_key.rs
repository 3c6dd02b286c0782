//! Issuer public keys (`<manager>/<issuer>/PublicKeys/<counter>.xml`)
//!
//! Keys are parsed into a data object carrying the raw key elements as
//! decimal strings. No arithmetic is done on them here.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use irma_core::IssuerId;

use crate::error::{SchemeError, SchemeResult};
use crate::scheme::decode;

const BASE_PREFIX: &str = "Base_";

#[derive(Debug, Deserialize)]
struct RawPublicKey {
    #[serde(rename = "Counter")]
    counter: u32,
    #[serde(rename = "ExpiryDate")]
    expiry_date: i64,
    #[serde(rename = "Elements")]
    elements: RawElements,
    #[serde(rename = "Features", default)]
    features: Option<RawFeatures>,
}

#[derive(Debug, Deserialize)]
struct RawElements {
    n: String,
    #[serde(rename = "Z")]
    z: String,
    #[serde(rename = "S")]
    s: String,
    #[serde(rename = "Bases", default)]
    bases: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawFeatures {
    #[serde(rename = "Epoch", default)]
    epoch: Option<RawEpoch>,
}

#[derive(Debug, Deserialize)]
struct RawEpoch {
    #[serde(rename = "@length", default)]
    length: Option<u64>,
}

/// An issuer public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub counter: u32,
    /// Unix seconds after which the key may no longer be used for issuance
    pub expiry_date: i64,
    pub n: String,
    pub z: String,
    pub s: String,
    /// Bases `R_0..R_k`, in index order
    pub bases: Vec<String>,
    pub epoch_length: Option<u64>,
    /// Set when loaded through a configuration
    pub issuer: Option<IssuerId>,
}

fn check_decimal(rel: &str, name: &str, value: &str) -> SchemeResult<String> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SchemeError::content(
            rel,
            format!("public key element {} is not a decimal integer", name),
        ));
    }
    Ok(value.to_string())
}

impl PublicKey {
    /// Parse a public key document read from `rel`
    pub fn from_xml(rel: &str, bytes: &[u8]) -> SchemeResult<Self> {
        let raw: RawPublicKey = decode(rel, bytes)?;

        let mut indexed = Vec::new();
        for (key, value) in &raw.elements.bases {
            // Attributes of <Bases>, e.g. num="6"
            if key.starts_with('@') {
                continue;
            }
            let index = key
                .strip_prefix(BASE_PREFIX)
                .and_then(|i| i.parse::<u32>().ok())
                .ok_or_else(|| {
                    SchemeError::content(rel, format!("unexpected public key base {}", key))
                })?;
            indexed.push((index, check_decimal(rel, key, value)?));
        }
        indexed.sort_by_key(|(i, _)| *i);

        Ok(Self {
            counter: raw.counter,
            expiry_date: raw.expiry_date,
            n: check_decimal(rel, "n", &raw.elements.n)?,
            z: check_decimal(rel, "Z", &raw.elements.z)?,
            s: check_decimal(rel, "S", &raw.elements.s)?,
            bases: indexed.into_iter().map(|(_, b)| b).collect(),
            epoch_length: raw.features.and_then(|f| f.epoch).and_then(|e| e.length),
            issuer: None,
        })
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.expiry_date, 0).single()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|t| t <= now)
    }
}
