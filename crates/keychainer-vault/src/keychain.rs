//! Operation orchestrator.
//!
//! A [`Keychain`] pairs one immutable [`Configuration`] with a vault backend
//! and exposes the caller-facing operations. Each call compiles the bundle it
//! needs, makes one or two vault calls and maps any failure status through
//! [`map_status`]. Nothing is cached between calls.
//!
//! # Upsert is not atomic
//!
//! [`Keychain::set`] probes for the item and then either mutates or inserts.
//! Another writer may add or remove the same item between the two calls; the
//! add branch then fails with [`KeychainError::DuplicateItem`] and the
//! mutate branch with [`KeychainError::ItemNotFound`]. Callers sharing a
//! scope across processes must serialize writes themselves.

use std::fmt;
use std::sync::Arc;

use keychainer_core::bundle::{AttributeBundle, AttributeKey, MatchLimit};
use keychainer_core::decode::{ItemAttributes, decode};
use keychainer_core::query::{self, Action};
use keychainer_core::{Configuration, KeychainError, Result, VaultStatus, map_status};
use tracing::{debug, info};

use crate::backend::VaultBackend;
use crate::memory::MemoryVault;

// ---------------------------------------------------------------------------
// Secret record
// ---------------------------------------------------------------------------

/// A secret read back from the vault: key, payload and decoded attributes.
///
/// Records are only produced by [`Keychain`] reads.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretRecord {
    key: String,
    value: Vec<u8>,
    attributes: ItemAttributes,
}

impl SecretRecord {
    fn new(key: String, value: Vec<u8>, attributes: ItemAttributes) -> Self {
        Self {
            key,
            value,
            attributes,
        }
    }

    /// Account name the secret is stored under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Raw payload bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// The payload as UTF-8 text.
    pub fn value_string(&self) -> Result<&str> {
        std::str::from_utf8(&self.value).map_err(|e| KeychainError::ConversionError {
            reason: format!("payload for `{}` is not valid UTF-8: {e}", self.key),
        })
    }

    /// Attributes decoded from the same search result.
    pub fn attributes(&self) -> &ItemAttributes {
        &self.attributes
    }

    /// Consume the record, keeping only the payload.
    pub fn into_value(self) -> Vec<u8> {
        self.value
    }
}

impl fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretRecord")
            .field("key", &self.key)
            .field("value", &format_args!("<{} bytes>", self.value.len()))
            .field("attributes", &self.attributes)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Keychain
// ---------------------------------------------------------------------------

/// Caller-facing keychain operations for one configuration.
#[derive(Clone)]
pub struct Keychain {
    vault: Arc<dyn VaultBackend>,
    config: Configuration,
}

impl Keychain {
    /// A keychain over `vault` for `config`.
    pub fn new(vault: Arc<dyn VaultBackend>, config: Configuration) -> Self {
        Self { vault, config }
    }

    /// A keychain backed by a fresh [`MemoryVault`].
    pub fn in_memory(config: Configuration) -> Self {
        Self::new(Arc::new(MemoryVault::new()), config)
    }

    /// A keychain backed by [`platform_vault`](crate::platform_vault).
    pub fn platform(config: Configuration) -> Self {
        Self::new(crate::platform_vault(), config)
    }

    /// The configuration every call compiles from.
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// The same vault under a different configuration.
    pub fn with_config(&self, config: Configuration) -> Self {
        Self::new(Arc::clone(&self.vault), config)
    }

    // -- Writes -------------------------------------------------------------

    /// Store a new item. Fails with [`KeychainError::DuplicateItem`] if the
    /// key already exists in this scope.
    pub fn add(&self, key: &str, value: impl AsRef<[u8]>) -> Result<()> {
        debug!(key, family = %self.config.family(), "adding keychain item");
        let attributes = query::compile_for_key(&self.config, Action::Add, Some(key))?
            .with(AttributeKey::ValueData, value.as_ref());
        self.insert(key, &attributes)
    }

    /// Replace the payload and attributes of an existing item.
    ///
    /// The update bundles are compiled before the item is probed, so an
    /// invalid policy fails without touching the vault. A missing item fails
    /// with [`KeychainError::ItemNotFound`] and the vault is left untouched.
    pub fn update(&self, key: &str, value: impl AsRef<[u8]>) -> Result<()> {
        debug!(key, family = %self.config.family(), "updating keychain item");
        let (identity, changes) = self.update_bundles(key, value.as_ref())?;
        if !self.probe(key)? {
            return Err(map_status(VaultStatus::ITEM_NOT_FOUND));
        }
        self.mutate(key, &identity, &changes)
    }

    /// Best-effort upsert: update the item if the probe finds it, add it
    /// otherwise. Both branches are compiled before the probe runs.
    pub fn set(&self, key: &str, value: impl AsRef<[u8]>) -> Result<()> {
        let value = value.as_ref();
        let (identity, changes) = self.update_bundles(key, value)?;
        let attributes = query::compile_for_key(&self.config, Action::Add, Some(key))?
            .with(AttributeKey::ValueData, value);

        if self.probe(key)? {
            debug!(key, family = %self.config.family(), branch = "mutate", "upserting keychain item");
            self.mutate(key, &identity, &changes)
        } else {
            debug!(key, family = %self.config.family(), branch = "add", "upserting keychain item");
            self.insert(key, &attributes)
        }
    }

    /// Remove the item stored under `key`. Removing a missing item succeeds.
    pub fn delete(&self, key: &str) -> Result<()> {
        let identity = query::compile_for_key(&self.config, Action::Delete, Some(key))?;
        if self.erase(&identity)? {
            info!(key, family = %self.config.family(), "keychain item deleted");
        } else {
            debug!(key, family = %self.config.family(), "no keychain item to delete");
        }
        Ok(())
    }

    /// Remove every item in this configuration's scope.
    pub fn delete_all(&self) -> Result<()> {
        let identity = query::compile(&self.config, Action::Delete)?;
        if self.erase(&identity)? {
            info!(family = %self.config.family(), "keychain scope cleared");
        } else {
            debug!(family = %self.config.family(), "keychain scope already empty");
        }
        Ok(())
    }

    // -- Reads --------------------------------------------------------------

    /// Payload and attributes of the item stored under `key`.
    pub fn get(&self, key: &str) -> Result<Option<SecretRecord>> {
        debug!(key, family = %self.config.family(), "reading keychain item");
        let query = self
            .keyed_read(key)
            .with(AttributeKey::ReturnData, true)
            .with(AttributeKey::ReturnAttributes, true);

        let Some(row) = self.search(&query)?.into_iter().next() else {
            return Ok(None);
        };
        let value = payload(&row)?;
        Ok(Some(SecretRecord::new(
            key.to_owned(),
            value,
            decode(self.config.family(), &row),
        )))
    }

    /// Every item in this configuration's scope.
    pub fn get_all(&self) -> Result<Vec<SecretRecord>> {
        debug!(family = %self.config.family(), "reading all keychain items");
        let query = query::read_query(&self.config)
            .with(AttributeKey::MatchLimit, MatchLimit::All)
            .with(AttributeKey::ReturnData, true)
            .with(AttributeKey::ReturnAttributes, true);

        self.search(&query)?
            .into_iter()
            .map(|row| {
                let key = row
                    .text(AttributeKey::Account)
                    .ok_or_else(|| KeychainError::UnexpectedError {
                        reason: "search result has no account attribute".into(),
                    })?
                    .to_owned();
                let value = payload(&row)?;
                Ok(SecretRecord::new(key, value, decode(self.config.family(), &row)))
            })
            .collect()
    }

    /// Payload bytes only.
    pub fn get_data(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let query = self.keyed_read(key).with(AttributeKey::ReturnData, true);
        match self.search(&query)?.into_iter().next() {
            Some(row) => payload(&row).map(Some),
            None => Ok(None),
        }
    }

    /// Payload decoded as UTF-8 text.
    pub fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.get_data(key)?
            .map(|bytes| {
                String::from_utf8(bytes).map_err(|e| KeychainError::ConversionError {
                    reason: format!("payload for `{key}` is not valid UTF-8: {e}"),
                })
            })
            .transpose()
    }

    /// Decoded attributes only; the payload is not requested.
    pub fn attributes(&self, key: &str) -> Result<Option<ItemAttributes>> {
        let query = self
            .keyed_read(key)
            .with(AttributeKey::ReturnAttributes, true);
        Ok(self
            .search(&query)?
            .into_iter()
            .next()
            .map(|row| decode(self.config.family(), &row)))
    }

    /// Whether an item exists under `key`.
    ///
    /// Cancellation and suppressed-prompt failures are returned as errors
    /// rather than reported as `false`.
    pub fn contains(&self, key: &str) -> Result<bool> {
        let query = query::read_query(&self.config).with(AttributeKey::Account, key);
        match self.vault.search(&query) {
            Ok(_) => Ok(true),
            Err(VaultStatus::ITEM_NOT_FOUND) => Ok(false),
            Err(status) => Err(map_status(status)),
        }
    }

    // -- Internals ----------------------------------------------------------

    /// Existence probe shared by `update` and `set`. Asks for neither payload
    /// nor attributes.
    fn probe(&self, key: &str) -> Result<bool> {
        let query = query::probe_query(&self.config, key);
        let found = match self.vault.search(&query) {
            Ok(_) => true,
            Err(VaultStatus::ITEM_NOT_FOUND) => false,
            Err(status) => return Err(map_status(status)),
        };
        debug!(key, found, "probed keychain item");
        Ok(found)
    }

    /// Identity query and attribute changes for an update of `key`.
    fn update_bundles(&self, key: &str, value: &[u8]) -> Result<(AttributeBundle, AttributeBundle)> {
        let identity = query::compile_for_key(&self.config, Action::Update, Some(key))?;
        let changes =
            query::update_attributes(&self.config)?.with(AttributeKey::ValueData, value);
        Ok((identity, changes))
    }

    fn insert(&self, key: &str, attributes: &AttributeBundle) -> Result<()> {
        self.vault.insert(attributes).map_err(map_status)?;
        info!(key, family = %self.config.family(), "keychain item added");
        Ok(())
    }

    fn mutate(&self, key: &str, identity: &AttributeBundle, changes: &AttributeBundle) -> Result<()> {
        self.vault.mutate(identity, changes).map_err(map_status)?;
        info!(key, family = %self.config.family(), "keychain item updated");
        Ok(())
    }

    /// Erase matching items. Returns whether anything was removed; "not
    /// found" is not an error.
    fn erase(&self, identity: &AttributeBundle) -> Result<bool> {
        match self.vault.erase(identity) {
            Ok(()) => Ok(true),
            Err(VaultStatus::ITEM_NOT_FOUND) => Ok(false),
            Err(status) => Err(map_status(status)),
        }
    }

    fn keyed_read(&self, key: &str) -> AttributeBundle {
        query::read_query(&self.config)
            .with(AttributeKey::Account, key)
            .with(AttributeKey::MatchLimit, MatchLimit::One)
    }

    /// Search with "not found" folded into an empty result.
    fn search(&self, query: &AttributeBundle) -> Result<Vec<AttributeBundle>> {
        match self.vault.search(query) {
            Ok(rows) => Ok(rows),
            Err(VaultStatus::ITEM_NOT_FOUND) => Ok(Vec::new()),
            Err(status) => Err(map_status(status)),
        }
    }
}

impl fmt::Debug for Keychain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keychain")
            .field("config", &format_args!("{}", self.config))
            .finish_non_exhaustive()
    }
}

fn payload(row: &AttributeBundle) -> Result<Vec<u8>> {
    row.data(AttributeKey::ValueData)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| KeychainError::UnexpectedError {
            reason: "search result has no payload".into(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
