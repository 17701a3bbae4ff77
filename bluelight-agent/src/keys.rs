/*!
 * Trusted Keys
 * Flat file of device addresses that count as proximity keys
 */

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use crate::error::{AgentError, Result};

/// Ordered set of trusted device addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedKeys {
    addresses: Vec<String>,
}

impl TrustedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// One address per line. A missing file is an empty key set.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => {
                return Err(AgentError::Keys {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let keys: Self = content.lines().collect();
        debug!("Loaded {} trusted keys from {}", keys.len(), path.display());
        Ok(keys)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let wrap = |source| AgentError::Keys {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(wrap)?;
        }

        let mut content = String::new();
        for address in &self.addresses {
            content.push_str(address);
            content.push('\n');
        }
        fs::write(path, content).map_err(wrap)?;

        debug!("Saved {} trusted keys to {}", self.len(), path.display());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.addresses.iter().map(String::as_str)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.addresses.iter().any(|a| a == address)
    }

    pub fn insert(&mut self, address: &str) -> bool {
        let address = address.trim();
        if address.is_empty() || self.contains(address) {
            return false;
        }
        self.addresses.push(address.to_string());
        true
    }

    /// Add the address if absent, remove it otherwise. Returns whether it is
    /// now a key.
    pub fn toggle(&mut self, address: &str) -> bool {
        if self.contains(address) {
            self.addresses.retain(|a| a != address);
            false
        } else {
            self.insert(address)
        }
    }

    /// Forget keys whose device is no longer bonded. An empty `known` set
    /// leaves the keys alone; that is what an enumeration that has not
    /// finished yet looks like.
    pub fn retain_known<'a>(&mut self, known: impl IntoIterator<Item = &'a str>) {
        let known: Vec<&str> = known.into_iter().collect();
        if known.is_empty() {
            return;
        }
        self.addresses.retain(|a| known.contains(&a.as_str()));
    }
}

impl<'a> FromIterator<&'a str> for TrustedKeys {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut keys = Self::new();
        for address in iter {
            keys.insert(address);
        }
        keys
    }
}
