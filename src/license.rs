use log::info;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LicenseError {
    #[error("invalid license key")]
    InvalidKey,

    #[error("failed to store license key: {0}")]
    Io(#[from] std::io::Error),
}

/// License-key gate: the dashboard opens once a valid key has been saved to
/// the license file.
#[derive(Debug, Clone)]
pub struct LicenseGate {
    path: PathBuf,
    valid_keys: HashSet<String>,
}

impl LicenseGate {
    pub fn new(path: impl Into<PathBuf>, valid_keys: impl IntoIterator<Item = String>) -> Self {
        LicenseGate {
            path: path.into(),
            valid_keys: valid_keys.into_iter().collect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_valid(&self, key: &str) -> bool {
        self.valid_keys.contains(key.trim())
    }

    /// True when the license file exists and holds a valid key.
    pub fn is_activated(&self) -> bool {
        match fs::read_to_string(&self.path) {
            Ok(saved) => self.is_valid(&saved),
            Err(_) => false,
        }
    }

    /// Validate `key` and persist it.
    pub fn activate(&self, key: &str) -> Result<(), LicenseError> {
        let key = key.trim();
        if !self.is_valid(key) {
            return Err(LicenseError::InvalidKey);
        }
        fs::write(&self.path, key)?;
        info!("license activated, key stored in {}", self.path.display());
        Ok(())
    }
}
