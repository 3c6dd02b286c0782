//! Seeding a configuration from a read-only assets tree
//!
//! Both trees may carry a `timestamp` file holding unix seconds. The assets
//! are copied over the configuration when they are newer, or when the
//! configuration has no timestamp at all.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use tracing::info;

use irma_core::SchemeManagerId;

use crate::configuration::Configuration;
use crate::disk;
use crate::error::{ConfigurationError, ConfigurationResult};

pub const TIMESTAMP_FILE: &str = "timestamp";

/// Read `<dir>/timestamp`; `None` when the file does not exist
pub fn read_timestamp(dir: &Path) -> ConfigurationResult<Option<DateTime<Utc>>> {
    let path = dir.join(TIMESTAMP_FILE);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ConfigurationError::io(path, e)),
    };

    let seconds: i64 = text.trim().parse().map_err(|e| ConfigurationError::Timestamp {
        path: path.clone(),
        reason: format!("{}", e),
    })?;
    let time = Utc
        .timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| ConfigurationError::Timestamp {
            path,
            reason: format!("{} is out of range", seconds),
        })?;
    Ok(Some(time))
}

impl Configuration {
    /// Whether the configuration is at least as new as its assets
    pub fn is_up_to_date(&self) -> ConfigurationResult<bool> {
        let Some(assets) = self.assets.as_deref() else {
            return Ok(true);
        };
        let newest = read_timestamp(assets)?.ok_or_else(|| {
            ConfigurationError::MissingAssetsTimestamp {
                path: assets.to_path_buf(),
            }
        })?;

        Ok(match read_timestamp(&self.path)? {
            Some(current) => current >= newest,
            None => false,
        })
    }

    /// Copy the whole assets tree over the configuration, optionally
    /// reparsing afterwards
    pub fn copy_from_assets(&mut self, parse: bool) -> ConfigurationResult<()> {
        let Some(assets) = self.assets.clone() else {
            return Ok(());
        };
        disk::copy_directory(&assets, &self.path)
            .map_err(|e| ConfigurationError::io(&assets, e))?;
        info!(assets = %assets.display(), "copied configuration from assets");

        if parse {
            self.parse_folder()?;
        }
        Ok(())
    }

    /// Restore a single manager folder from the assets. Returns whether
    /// anything was copied.
    pub fn copy_manager_from_assets(&self, id: &SchemeManagerId) -> ConfigurationResult<bool> {
        let Some(assets) = self.assets.as_deref() else {
            return Ok(false);
        };
        let src = assets.join(id.as_str());
        if !src.is_dir() {
            return Ok(false);
        }

        disk::copy_directory(&src, &self.manager_dir(id))
            .map_err(|e| ConfigurationError::io(&src, e))?;
        info!(manager = %id, "restored scheme manager from assets");
        Ok(true)
    }

    /// Parse the configuration; when managers fail, restore them from the
    /// assets and parse once more
    pub fn parse_or_restore_folder(&mut self) -> ConfigurationResult<()> {
        self.parse_folder()?;

        let mut disabled: Vec<SchemeManagerId> =
            self.disabled_scheme_managers.keys().cloned().collect();
        disabled.sort();

        let mut restored = false;
        for id in &disabled {
            restored |= self.copy_manager_from_assets(id)?;
        }

        if restored {
            self.parse_folder()?;
        }
        Ok(())
    }
}
