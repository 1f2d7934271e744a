//! The vault capability.
//!
//! A backend executes compiled attribute bundles against a secure store and
//! reports failures as raw [`VaultStatus`] codes. Turning those codes into
//! errors is left to the orchestrator, so backends stay free of policy.

use keychainer_core::{AttributeBundle, VaultStatus};

/// Result of a single vault call.
pub type VaultResult<T> = std::result::Result<T, VaultStatus>;

/// Abstraction over platform secure stores.
///
/// Implementations must be `Send + Sync` so one vault can back several
/// [`Keychain`](crate::Keychain) values across threads.
pub trait VaultBackend: Send + Sync {
    /// Find the items matching `query`.
    ///
    /// Each returned bundle carries only what the query's return terms asked
    /// for. With no match the call fails with
    /// [`VaultStatus::ITEM_NOT_FOUND`]; it never returns an empty vector for
    /// that case.
    fn search(&self, query: &AttributeBundle) -> VaultResult<Vec<AttributeBundle>>;

    /// Store a new item described by `attributes`.
    ///
    /// Fails with [`VaultStatus::DUPLICATE_ITEM`] when an item with the same
    /// identity already exists.
    fn insert(&self, attributes: &AttributeBundle) -> VaultResult<()>;

    /// Overwrite `changes` on every item matching `query`.
    fn mutate(&self, query: &AttributeBundle, changes: &AttributeBundle) -> VaultResult<()>;

    /// Remove every item matching `query`.
    fn erase(&self, query: &AttributeBundle) -> VaultResult<()>;
}
