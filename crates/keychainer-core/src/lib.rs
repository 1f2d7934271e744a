//! Configuration, policy and query compilation for platform keychains.
//!
//! This crate holds the pure half of keychainer: it turns an immutable
//! [`Configuration`] into the attribute bundles a vault understands, and
//! decodes the bundles a vault returns. It performs no keychain I/O; the
//! `keychainer-vault` crate supplies the backends and the orchestrator.
//!
//! # Modules
//!
//! - [`bundle`]: attribute keys, values and the ordered bundle map.
//! - [`policy`]: accessibility levels, authentication policies, access control.
//! - [`config`]: the immutable per-family configuration.
//! - [`query`]: compiles a configuration into read/add/update/delete bundles.
//! - [`decode`]: turns returned bundles into typed attributes.
//! - [`status`]: vault status codes and the status-to-error mapper.
//! - [`auth`]: opaque authentication-context handles.
//! - [`settings`]: TOML settings with environment overrides.
//! - [`error`]: unified error types.
//!
//! # Quick Start
//!
//! ```rust
//! use keychainer_core::policy::{Accessibility, AuthenticationPolicy};
//! use keychainer_core::query::{self, Action};
//! use keychainer_core::{AttributeKey, Configuration};
//!
//! # fn example() -> keychainer_core::Result<()> {
//! let config = Configuration::generic("com.example.mail")?
//!     .with_label("Mail")
//!     .with_authentication_policy(
//!         Accessibility::WhenUnlocked,
//!         AuthenticationPolicy::user_presence(),
//!     );
//!
//! let add = query::compile_for_key(&config, Action::Add, Some("alice"))?;
//! assert!(add.contains_key(AttributeKey::AccessControl));
//! assert_eq!(add.text(AttributeKey::Account), Some("alice"));
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod bundle;
pub mod config;
pub mod decode;
pub mod error;
pub mod policy;
pub mod query;
pub mod settings;
pub mod status;

// Re-export the most commonly used types at the crate root for convenience.
pub use auth::{AuthenticationContext, ContextHandle, PromptContext};
pub use bundle::{AttributeBundle, AttributeKey, AttributeValue, MatchLimit};
pub use config::{Configuration, Family, Scope};
pub use decode::{ItemAttributes, decode};
pub use error::{KeychainError, Result};
pub use policy::{AccessControl, Accessibility, AuthenticationPolicy, PolicyFlags, SynchronizationMode};
pub use settings::KeychainSettings;
pub use status::{VaultStatus, map_status};
