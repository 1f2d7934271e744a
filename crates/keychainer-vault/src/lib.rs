//! Vault backends and the caller-facing keychain operations.
//!
//! [`Keychain`] pairs an immutable [`Configuration`](keychainer_core::Configuration)
//! with a [`VaultBackend`] and offers add, update, upsert, delete, read and
//! existence checks. Queries are compiled by `keychainer-core`; this crate
//! executes them.
//!
//! # Modules
//!
//! - [`backend`]: the vault capability trait.
//! - [`memory`]: in-memory vault with keychain matching semantics.
//! - [`apple`]: Keychain Services backend (macOS / iOS only).
//! - [`keychain`]: the operation orchestrator and decoded records.
//!
//! # Quick Start
//!
//! ```rust
//! use keychainer_core::Configuration;
//! use keychainer_vault::Keychain;
//!
//! # fn example() -> keychainer_core::Result<()> {
//! let keychain = Keychain::in_memory(Configuration::generic("com.example.mail")?);
//!
//! keychain.set("alice", "hunter2")?;
//! assert_eq!(keychain.get_string("alice")?.as_deref(), Some("hunter2"));
//!
//! keychain.delete("alice")?;
//! assert!(!keychain.contains("alice")?);
//! # Ok(())
//! # }
//! ```

#[cfg(any(target_os = "macos", target_os = "ios"))]
pub mod apple;
pub mod backend;
pub mod keychain;
pub mod memory;

#[cfg(any(target_os = "macos", target_os = "ios"))]
pub use apple::AppleKeychain;
pub use backend::{VaultBackend, VaultResult};
pub use keychain::{Keychain, SecretRecord};
pub use memory::{MemoryVault, PromptOutcome};

/// The preferred backend for the current platform.
///
/// Keychain Services on macOS and iOS, a [`MemoryVault`] elsewhere.
pub fn platform_vault() -> std::sync::Arc<dyn VaultBackend> {
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        tracing::info!("using Keychain Services vault");
        std::sync::Arc::new(AppleKeychain::new())
    }
    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    {
        tracing::info!("no platform keychain available, using in-memory vault");
        std::sync::Arc::new(MemoryVault::new())
    }
}
