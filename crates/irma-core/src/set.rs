//! Identifier sets
//!
//! A bundle of scheme managers, issuers, credential types and issuer public
//! keys (by epoch counter). Used both to request artifacts from a
//! configuration and to report what an update actually downloaded.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::identifier::{CredentialTypeId, IssuerId, SchemeManagerId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierSet {
    pub scheme_managers: BTreeSet<SchemeManagerId>,
    pub issuers: BTreeSet<IssuerId>,
    pub credential_types: BTreeSet<CredentialTypeId>,
    /// Issuer to the epoch counters of its public keys
    pub public_keys: BTreeMap<IssuerId, BTreeSet<u32>>,
}

impl IdentifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.scheme_managers.is_empty()
            && self.issuers.is_empty()
            && self.credential_types.is_empty()
            && self.public_keys.values().all(BTreeSet::is_empty)
    }

    pub fn add_public_key(&mut self, issuer: IssuerId, counter: u32) {
        self.public_keys.entry(issuer).or_default().insert(counter);
    }

    /// Every scheme manager referenced directly or through a child identifier
    pub fn referenced_scheme_managers(&self) -> BTreeSet<SchemeManagerId> {
        let mut managers = self.scheme_managers.clone();
        managers.extend(self.issuers.iter().map(IssuerId::scheme_manager_id));
        managers.extend(
            self.credential_types
                .iter()
                .map(CredentialTypeId::scheme_manager_id),
        );
        managers.extend(self.public_keys.keys().map(IssuerId::scheme_manager_id));
        managers
    }
}
