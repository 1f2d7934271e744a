//! Keychain error types.
//!
//! Every public API in the keychainer crates surfaces failures through
//! [`KeychainError`]. Vault status codes are turned into these variants in
//! exactly one place, [`crate::status::map_status`], so callers can match on
//! the variant instead of comparing raw integers.

use crate::status::VaultStatus;

/// Unified error type for keychain operations.
#[derive(Debug, thiserror::Error)]
pub enum KeychainError {
    // -- Vault outcomes -----------------------------------------------------
    /// An add targeted an identity that is already present.
    #[error("the item already exists in the keychain")]
    DuplicateItem,

    /// An update or existence probe found no matching identity.
    #[error("the item could not be found in the keychain")]
    ItemNotFound,

    /// The user dismissed the authentication prompt.
    #[error("the user canceled the authentication prompt")]
    UserCanceled,

    /// A read with suppressed authentication UI would have needed a prompt.
    #[error("user interaction is required but the authentication UI is suppressed")]
    InteractionRequired,

    /// Any other vault status, kept verbatim.
    #[error("keychain status {0}")]
    Status(VaultStatus),

    // -- Translation errors -------------------------------------------------
    /// Payload bytes could not be converted to or from text.
    #[error("conversion failed: {reason}")]
    ConversionError { reason: String },

    /// The accessibility / authentication-policy combination is illegal.
    #[error("invalid authentication policy: {reason}")]
    InvalidPolicy { reason: String },

    /// The vault answered with a shape that cannot be interpreted.
    #[error("unexpected keychain response: {reason}")]
    UnexpectedError { reason: String },

    // -- Configuration errors -----------------------------------------------
    /// A configuration value is missing or malformed.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// A family-specific builder was called on the other family.
    #[error("`{operation}` is only available on {expected} items, not {actual} items")]
    FamilyMismatch {
        operation: &'static str,
        expected: crate::config::Family,
        actual: crate::config::Family,
    },

    /// The settings file could not be read or parsed.
    #[error("settings error: {reason}")]
    Settings { reason: String },

    /// I/O error while reading a settings file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl KeychainError {
    /// Whether this error is an expected user action rather than a fault.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::UserCanceled)
    }
}

/// Convenience alias used throughout the keychainer crates.
pub type Result<T> = std::result::Result<T, KeychainError>;
