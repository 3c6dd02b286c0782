//! The scheme configuration aggregate
//!
//! [`Configuration`] owns everything parsed from a configuration root: the
//! scheme managers, their issuers and credential types, the record of
//! disabled managers, the lazily filled public-key cache and the compact
//! credential type index. Parsing lives in `parser`, synchronization in
//! `update` and asset seeding in `assets`; all extend this type.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use irma_core::{CredentialTypeId, IssuerId, SchemeManagerId};

use crate::authenticated;
use crate::disk;
use crate::error::{ConfigurationError, ConfigurationResult, SchemeManagerError, SchemeResult};
use crate::public_key::PublicKey;
use crate::scheme::{CredentialType, Issuer, SchemeManager};
use crate::settings::Settings;
use crate::signature;
use crate::transport::{HttpTransport, Transport};

/// Length of a compact credential type hash
pub const COMPACT_HASH_LENGTH: usize = 16;

/// First bytes of the SHA-256 of a credential type identifier
pub type CompactHash = [u8; COMPACT_HASH_LENGTH];

/// Compact hash of a credential type identifier string
pub fn compact_hash(id: &CredentialTypeId) -> CompactHash {
    let digest = Sha256::digest(id.as_str().as_bytes());
    let mut out = [0u8; COMPACT_HASH_LENGTH];
    out.copy_from_slice(&digest[..COMPACT_HASH_LENGTH]);
    out
}

/// Parsed scheme configuration rooted at a directory
pub struct Configuration {
    pub(crate) path: PathBuf,
    pub(crate) assets: Option<PathBuf>,
    pub(crate) scheme_managers: HashMap<SchemeManagerId, SchemeManager>,
    pub(crate) issuers: HashMap<IssuerId, Issuer>,
    pub(crate) credential_types: HashMap<CredentialTypeId, CredentialType>,
    pub(crate) disabled_scheme_managers: HashMap<SchemeManagerId, SchemeManagerError>,
    pub(crate) public_keys: HashMap<IssuerId, BTreeMap<u32, PublicKey>>,
    pub(crate) compact_types: HashMap<CompactHash, CredentialTypeId>,
    pub(crate) initialized: bool,
    pub(crate) transport: Arc<dyn Transport>,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("path", &self.path)
            .field("assets", &self.assets)
            .field("scheme_managers", &self.scheme_managers.len())
            .field("issuers", &self.issuers.len())
            .field("credential_types", &self.credential_types.len())
            .field("disabled_scheme_managers", &self.disabled_scheme_managers.len())
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl Configuration {
    /// Open the configuration at `path` using an HTTPS transport with
    /// default settings, seeding it from `assets` when that is newer.
    ///
    /// Nothing is parsed yet; call `parse_folder` next.
    pub fn new(path: impl Into<PathBuf>, assets: Option<PathBuf>) -> ConfigurationResult<Self> {
        let http = Settings::default().http;
        let transport = HttpTransport::new(&http.user_agent, http.timeout())?;
        Self::with_transport(path, assets, Arc::new(transport))
    }

    /// Like [`Configuration::new`] with an explicit transport
    pub fn with_transport(
        path: impl Into<PathBuf>,
        assets: Option<PathBuf>,
        transport: Arc<dyn Transport>,
    ) -> ConfigurationResult<Self> {
        let path = path.into();
        disk::ensure_directory_exists(&path).map_err(|e| ConfigurationError::io(&path, e))?;

        let mut conf = Self {
            path,
            assets,
            scheme_managers: HashMap::new(),
            issuers: HashMap::new(),
            credential_types: HashMap::new(),
            disabled_scheme_managers: HashMap::new(),
            public_keys: HashMap::new(),
            compact_types: HashMap::new(),
            initialized: false,
            transport,
        };

        if conf.assets.is_some() && !conf.is_up_to_date()? {
            info!(path = %conf.path.display(), "seeding configuration from assets");
            conf.copy_from_assets(false)?;
        }
        Ok(conf)
    }

    /// Build from loaded settings, with an HTTPS transport configured by them
    pub fn from_settings(settings: &Settings) -> ConfigurationResult<Self> {
        let transport =
            HttpTransport::new(&settings.http.user_agent, settings.http.timeout())?;
        Self::with_transport(
            settings.path.clone(),
            settings.assets.clone(),
            Arc::new(transport),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn assets(&self) -> Option<&Path> {
        self.assets.as_deref()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Whether `parse_folder` has completed at least once
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn scheme_manager(&self, id: &SchemeManagerId) -> Option<&SchemeManager> {
        self.scheme_managers.get(id)
    }

    pub fn scheme_managers(&self) -> impl Iterator<Item = &SchemeManager> {
        self.scheme_managers.values()
    }

    pub fn issuer(&self, id: &IssuerId) -> Option<&Issuer> {
        self.issuers.get(id)
    }

    pub fn issuers(&self) -> impl Iterator<Item = &Issuer> {
        self.issuers.values()
    }

    pub fn credential_type(&self, id: &CredentialTypeId) -> Option<&CredentialType> {
        self.credential_types.get(id)
    }

    pub fn credential_types(&self) -> impl Iterator<Item = &CredentialType> {
        self.credential_types.values()
    }

    /// Managers that failed to parse, with their final status and error
    pub fn disabled_scheme_managers(&self) -> &HashMap<SchemeManagerId, SchemeManagerError> {
        &self.disabled_scheme_managers
    }

    /// Whether the credential type, its issuer and its manager are all known
    pub fn contains(&self, cred: &CredentialTypeId) -> bool {
        let issuer = cred.issuer_id();
        self.scheme_managers.contains_key(&issuer.scheme_manager_id())
            && self.issuers.contains_key(&issuer)
            && self.credential_types.contains_key(cred)
    }

    pub fn credential_type_hash(&self, id: &CredentialTypeId) -> CompactHash {
        compact_hash(id)
    }

    /// Look up a credential type by its compact hash
    pub fn hash_to_credential_type(&self, hash: &[u8]) -> Option<&CredentialType> {
        let hash: CompactHash = hash.try_into().ok()?;
        self.compact_types
            .get(&hash)
            .and_then(|id| self.credential_types.get(id))
    }

    /// Read a file under a known manager, authenticated against its index.
    /// `None` when the file is not listed or the index was never verified.
    pub fn read_authenticated_file(
        &self,
        manager: &SchemeManagerId,
        rel: &str,
    ) -> ConfigurationResult<Option<Vec<u8>>> {
        let manager = self
            .scheme_managers
            .get(manager)
            .ok_or_else(|| ConfigurationError::UnknownSchemeManager(manager.clone()))?;
        if !manager.has_verified_index() {
            return Ok(None);
        }
        Ok(authenticated::read_authenticated(&self.path, &manager.index, rel)?)
    }

    pub(crate) fn read_authenticated(
        &self,
        manager: &SchemeManager,
        rel: &str,
    ) -> SchemeResult<Option<Vec<u8>>> {
        authenticated::read_authenticated(&self.path, &manager.index, rel)
    }

    /// Check the index signature of a manager folder on disk
    pub fn verify_signature(&self, id: &SchemeManagerId) -> ConfigurationResult<bool> {
        let dir = self.manager_dir(id);
        signature::verify_signature(&dir)
            .map_err(|e| ConfigurationError::Scheme(e.into()))
    }

    pub(crate) fn manager_dir(&self, id: &SchemeManagerId) -> PathBuf {
        self.path.join(id.as_str())
    }

    /// Drop every manager that is not valid, along with what it owns
    pub fn prune(&mut self) {
        let invalid: Vec<SchemeManagerId> = self
            .scheme_managers
            .values()
            .filter(|m| !m.valid)
            .map(|m| m.id.clone())
            .collect();

        for id in invalid {
            debug!(manager = %id, "pruning invalid scheme manager");
            self.forget_scheme_manager(&id);
        }
    }

    /// Remove a manager with its issuers, credential types and cached keys.
    /// With `from_storage` its folder is deleted as well.
    pub fn remove_scheme_manager(
        &mut self,
        id: &SchemeManagerId,
        from_storage: bool,
    ) -> ConfigurationResult<()> {
        if !self.scheme_managers.contains_key(id) && !self.disabled_scheme_managers.contains_key(id)
        {
            return Err(ConfigurationError::UnknownSchemeManager(id.clone()));
        }

        self.forget_scheme_manager(id);
        self.disabled_scheme_managers.remove(id);

        if from_storage {
            let dir = self.manager_dir(id);
            match fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(ConfigurationError::io(dir, e)),
            }
        }
        info!(manager = %id, from_storage, "removed scheme manager");
        Ok(())
    }

    fn forget_scheme_manager(&mut self, id: &SchemeManagerId) {
        self.credential_types
            .retain(|cred, _| &cred.scheme_manager_id() != id);
        self.compact_types
            .retain(|_, cred| &cred.scheme_manager_id() != id);
        self.issuers.retain(|issuer, _| &issuer.scheme_manager_id() != id);
        self.drop_cached_keys(id);
        self.scheme_managers.remove(id);
    }

    pub(crate) fn drop_cached_keys(&mut self, id: &SchemeManagerId) {
        self.public_keys
            .retain(|issuer, _| &issuer.scheme_manager_id() != id);
    }

    /// Reset everything parsed from disk. The public-key cache is kept.
    pub(crate) fn clear(&mut self) {
        self.scheme_managers.clear();
        self.issuers.clear();
        self.credential_types.clear();
        self.disabled_scheme_managers.clear();
        self.compact_types.clear();
    }
}
