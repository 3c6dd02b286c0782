//! Parsing the configuration tree
//!
//! Each scheme manager folder goes through the same sequence; the first
//! failing step decides the manager's final status:
//!
//! 1. `description.xml` exists                      -> else `ParsingError`
//! 2. `index` parses and stays inside the manager   -> else `InvalidIndex`
//! 3. signature and every present file verify       -> else `InvalidSignature`
//! 4. description authenticates, decodes, version 7+ -> else `ParsingError`
//! 5. issuers and credential types load             -> else `ContentParsingError`
//!
//! A manager that fails stays registered (with `valid == false`) and is
//! recorded in `disabled_scheme_managers`; its siblings are still parsed.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info, warn};

use irma_core::{IdentifierSet, IssuerId, SchemeManagerId, SchemeManagerIndex};

use crate::authenticated;
use crate::configuration::{compact_hash, Configuration};
use crate::disk;
use crate::error::{
    ConfigurationError, ConfigurationResult, SchemeError, SchemeManagerError, SchemeResult,
};
use crate::public_key::PublicKey;
use crate::scheme::{
    decode, CredentialType, Issuer, SchemeManager, SchemeManagerStatus, DESCRIPTION_FILE,
    ISSUES_DIR, MIN_CREDENTIAL_TYPE_VERSION, MIN_ISSUER_VERSION, MIN_SCHEME_MANAGER_VERSION,
    PUBLIC_KEYS_DIR,
};
use crate::signature::{self, SignatureError, INDEX_FILE};

const KEY_EXTENSION: &str = ".xml";

/// Index path of `parts` joined below the configuration root
fn rel_path(parts: &[&str]) -> String {
    parts.join("/")
}

/// Record `status` on the manager when `result` is an error
fn at_status<T>(
    manager: &mut SchemeManager,
    status: SchemeManagerStatus,
    result: SchemeResult<T>,
) -> SchemeResult<T> {
    if result.is_err() {
        manager.status = status;
    }
    result
}

/// Reject index entries outside `<manager>/` or containing `.`, `..` or
/// empty components
fn check_index_paths(manager: &SchemeManagerId, index: &SchemeManagerIndex) -> SchemeResult<()> {
    let prefix = format!("{}/", manager.as_str());
    for path in index.paths() {
        let inside = path.starts_with(&prefix)
            && !path.contains('\\')
            && path
                .split('/')
                .all(|c| !c.is_empty() && c != "." && c != "..");
        if !inside {
            return Err(SchemeError::UntrustedPath {
                manager: manager.clone(),
                path: path.to_string(),
            });
        }
    }
    Ok(())
}

impl Configuration {
    /// Parse every scheme manager folder under the configuration root.
    ///
    /// Replaces all managers, issuers and credential types. The public-key
    /// cache is kept. Managers that fail are recorded in
    /// `disabled_scheme_managers`; only an unreadable root is an error.
    pub fn parse_folder(&mut self) -> ConfigurationResult<()> {
        self.clear();

        let folders =
            disk::subfolders(&self.path).map_err(|e| ConfigurationError::io(&self.path, e))?;

        for (name, dir) in folders {
            let manager = SchemeManager::new(SchemeManagerId::new(name));
            let id = manager.id.clone();
            if let Err(err) = self.parse_scheme_manager_folder(&dir, manager) {
                warn!(manager = %id, status = %err.status, error = %err.error, "disabling scheme manager");
                self.drop_cached_keys(&id);
                self.disabled_scheme_managers.insert(id, err);
            }
        }

        self.initialized = true;
        info!(
            scheme_managers = self.scheme_managers.len(),
            disabled = self.disabled_scheme_managers.len(),
            issuers = self.issuers.len(),
            credential_types = self.credential_types.len(),
            "parsed configuration"
        );
        Ok(())
    }

    /// Parse one scheme manager folder and register the manager, whatever
    /// the outcome.
    pub fn parse_scheme_manager_folder(
        &mut self,
        dir: &Path,
        mut manager: SchemeManager,
    ) -> Result<(), SchemeManagerError> {
        let result = self.parse_scheme_manager(dir, &mut manager);
        let id = manager.id.clone();
        let status = manager.status;
        self.scheme_managers.insert(id.clone(), manager);

        match result {
            Ok(()) => {
                debug!(manager = %id, "scheme manager valid");
                Ok(())
            }
            Err(error) => Err(SchemeManagerError {
                manager: id,
                status,
                error,
            }),
        }
    }

    fn parse_scheme_manager(&mut self, dir: &Path, manager: &mut SchemeManager) -> SchemeResult<()> {
        let name = manager.id.as_str().to_string();

        let description = dir.join(DESCRIPTION_FILE);
        if !description.is_file() {
            manager.status = SchemeManagerStatus::ParsingError;
            return Err(SchemeError::Structural { path: description });
        }

        // Base URL for updates, so that a manager failing below can still be
        // repaired; whatever it serves is verified against the local pk.pem
        let rel = rel_path(&[&name, DESCRIPTION_FILE]);
        if let Some(unverified) = fs::read(&description)
            .ok()
            .and_then(|bytes| decode::<SchemeManager>(&rel, &bytes).ok())
        {
            manager.url = unverified.url;
        }

        let index = self.load_index(&manager.id);
        let index = at_status(manager, SchemeManagerStatus::InvalidIndex, index)?;

        // The index is only attached once its signature and files check out
        let verified = self.check_scheme_manager(&manager.id, &index);
        at_status(manager, SchemeManagerStatus::InvalidSignature, verified)?;
        manager.index = index;

        let decoded = self.read_manager_description(manager, &name);
        let decoded = at_status(manager, SchemeManagerStatus::ParsingError, decoded)?;
        let index = std::mem::take(&mut manager.index);
        *manager = decoded;
        manager.index = index;

        if manager.version < MIN_SCHEME_MANAGER_VERSION {
            manager.status = SchemeManagerStatus::ParsingError;
            return Err(SchemeError::Version {
                kind: "scheme manager",
                found: manager.version,
                minimum: MIN_SCHEME_MANAGER_VERSION,
            });
        }

        let registered = self.parse_issuer_folders(manager, dir);
        let registered = at_status(manager, SchemeManagerStatus::ContentParsingError, registered)?;

        manager.status = SchemeManagerStatus::Valid;
        manager.valid = true;
        for id in &registered.issuers {
            if let Some(issuer) = self.issuers.get_mut(id) {
                issuer.valid = true;
            }
        }
        for id in &registered.credential_types {
            if let Some(cred) = self.credential_types.get_mut(id) {
                cred.valid = true;
            }
        }
        Ok(())
    }

    fn read_manager_description(&self, manager: &SchemeManager, name: &str) -> SchemeResult<SchemeManager> {
        let rel = rel_path(&[name, DESCRIPTION_FILE]);
        let decoded: SchemeManager = self
            .read_description(manager, &rel)?
            .ok_or_else(|| SchemeError::content(&rel, "description is not listed in the index"))?;

        if decoded.id != manager.id {
            return Err(SchemeError::content(
                &rel,
                format!("id {} does not match folder {}", decoded.id, name),
            ));
        }
        Ok(decoded)
    }

    /// Read and parse `<manager>/index`, rejecting entries that escape the
    /// manager folder
    pub(crate) fn load_index(&self, id: &SchemeManagerId) -> SchemeResult<SchemeManagerIndex> {
        let path = self.manager_dir(id).join(INDEX_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SchemeError::Structural { path })
            }
            Err(e) => return Err(SchemeError::io(path, e)),
        };

        let rel = rel_path(&[id.as_str(), INDEX_FILE]);
        let text = std::str::from_utf8(&bytes).map_err(|e| SchemeError::content(&rel, e))?;
        let index = SchemeManagerIndex::parse(text)?;
        check_index_paths(id, &index)?;
        Ok(index)
    }

    /// Check the manager's index signature, then authenticate every indexed
    /// file that exists on disk against `index`
    pub(crate) fn check_scheme_manager(
        &self,
        id: &SchemeManagerId,
        index: &SchemeManagerIndex,
    ) -> SchemeResult<()> {
        let dir = self.manager_dir(id);
        if !signature::verify_signature(&dir)? {
            return Err(SignatureError::Invalid.into());
        }

        for path in index.paths() {
            if !self.path.join(path).exists() {
                continue;
            }
            authenticated::read_authenticated(&self.path, index, path)?;
        }
        Ok(())
    }

    /// Verify a registered manager against the files currently on disk
    pub fn verify_scheme_manager(&self, id: &SchemeManagerId) -> ConfigurationResult<()> {
        let manager = self
            .scheme_managers
            .get(id)
            .ok_or_else(|| ConfigurationError::UnknownSchemeManager(id.clone()))?;
        Ok(self.check_scheme_manager(id, &manager.index)?)
    }

    /// Authenticated read and decode of a description; `None` when the
    /// file is missing or not listed in the index
    fn read_description<T: serde::de::DeserializeOwned>(
        &self,
        manager: &SchemeManager,
        rel: &str,
    ) -> SchemeResult<Option<T>> {
        if !self.path.join(rel).is_file() {
            return Ok(None);
        }
        match self.read_authenticated(manager, rel)? {
            Some(bytes) => Ok(Some(decode(rel, &bytes)?)),
            None => {
                warn!(path = rel, "skipping description not listed in the index");
                Ok(None)
            }
        }
    }

    /// Load the issuers (and their credential types) of a manager, returning
    /// what was registered
    fn parse_issuer_folders(
        &mut self,
        manager: &SchemeManager,
        dir: &Path,
    ) -> SchemeResult<IdentifierSet> {
        let mut registered = IdentifierSet::new();
        let folders = disk::subfolders(dir).map_err(|e| SchemeError::io(dir, e))?;

        for (name, issuer_dir) in folders {
            let rel = rel_path(&[manager.id.as_str(), &name, DESCRIPTION_FILE]);
            let Some(mut issuer) = self.read_description::<Issuer>(manager, &rel)? else {
                continue;
            };

            if issuer.version < MIN_ISSUER_VERSION {
                return Err(SchemeError::Version {
                    kind: "issuer",
                    found: issuer.version,
                    minimum: MIN_ISSUER_VERSION,
                });
            }
            if issuer.id != name || issuer.scheme_manager != manager.id.as_str() {
                return Err(SchemeError::content(
                    &rel,
                    format!(
                        "issuer {}.{} does not match its folder",
                        issuer.scheme_manager, issuer.id
                    ),
                ));
            }

            let id = issuer.identifier();
            issuer.valid = false;
            self.issuers.insert(id.clone(), issuer);
            registered.issuers.insert(id.clone());

            self.parse_credentials_folder(manager, &id, &issuer_dir.join(ISSUES_DIR), &mut registered)?;
        }
        Ok(registered)
    }

    fn parse_credentials_folder(
        &mut self,
        manager: &SchemeManager,
        issuer: &IssuerId,
        dir: &Path,
        registered: &mut IdentifierSet,
    ) -> SchemeResult<()> {
        if !dir.is_dir() {
            return Ok(());
        }
        let folders = disk::subfolders(dir).map_err(|e| SchemeError::io(dir, e))?;

        for (name, _) in folders {
            let rel = rel_path(&[
                manager.id.as_str(),
                issuer.name(),
                ISSUES_DIR,
                &name,
                DESCRIPTION_FILE,
            ]);
            let Some(mut cred) = self.read_description::<CredentialType>(manager, &rel)? else {
                continue;
            };

            if cred.version < MIN_CREDENTIAL_TYPE_VERSION {
                return Err(SchemeError::Version {
                    kind: "credential type",
                    found: cred.version,
                    minimum: MIN_CREDENTIAL_TYPE_VERSION,
                });
            }
            if cred.id != name || &cred.issuer_identifier() != issuer {
                return Err(SchemeError::content(
                    &rel,
                    format!("credential type {} does not match its folder", cred.identifier()),
                ));
            }

            let id = cred.identifier();
            let hash = compact_hash(&id);
            if let Some(existing) = self.compact_types.get(&hash) {
                if existing != &id {
                    return Err(SchemeError::content(
                        &rel,
                        format!("compact hash of {} collides with {}", id, existing),
                    ));
                }
            }

            cred.valid = false;
            self.compact_types.insert(hash, id.clone());
            self.credential_types.insert(id.clone(), cred);
            registered.credential_types.insert(id);
        }
        Ok(())
    }

    /// Public key `counter` of `issuer`, loading the issuer's keys on first
    /// request. `None` for an unknown epoch, an issuer of an unknown manager
    /// or a manager without a verified index.
    pub fn public_key(
        &mut self,
        issuer: &IssuerId,
        counter: u32,
    ) -> ConfigurationResult<Option<PublicKey>> {
        if !self.public_keys.contains_key(issuer) {
            let Some(manager) = self.scheme_managers.get(&issuer.scheme_manager_id()) else {
                return Ok(None);
            };
            if !manager.has_verified_index() {
                return Ok(None);
            }
            let keys = self.parse_keys_folder(manager, issuer)?;
            debug!(issuer = %issuer, keys = keys.len(), "loaded public keys");
            self.public_keys.insert(issuer.clone(), keys);
        }

        Ok(self
            .public_keys
            .get(issuer)
            .and_then(|keys| keys.get(&counter))
            .cloned())
    }

    /// Load `<manager>/<issuer>/PublicKeys/<counter>.xml`
    fn parse_keys_folder(
        &self,
        manager: &SchemeManager,
        issuer: &IssuerId,
    ) -> SchemeResult<BTreeMap<u32, PublicKey>> {
        let mut keys = BTreeMap::new();
        let dir = self
            .manager_dir(&manager.id)
            .join(issuer.name())
            .join(PUBLIC_KEYS_DIR);
        if !dir.is_dir() {
            return Ok(keys);
        }

        for (file, _) in disk::files(&dir).map_err(|e| SchemeError::io(&dir, e))? {
            let Some(counter) = file
                .strip_suffix(KEY_EXTENSION)
                .and_then(|stem| stem.parse::<u32>().ok())
            else {
                continue;
            };

            let rel = rel_path(&[manager.id.as_str(), issuer.name(), PUBLIC_KEYS_DIR, &file]);
            let Some(bytes) = self.read_authenticated(manager, &rel)? else {
                warn!(path = %rel, "skipping public key not listed in the index");
                continue;
            };

            let mut pk = PublicKey::from_xml(&rel, &bytes)?;
            if pk.counter != counter {
                warn!(path = %rel, counter = pk.counter, "public key counter does not match file name");
            }
            pk.issuer = Some(issuer.clone());
            keys.insert(counter, pk);
        }
        Ok(keys)
    }
}
