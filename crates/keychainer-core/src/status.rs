//! Vault status codes and their translation into [`KeychainError`].
//!
//! Backends report failures as small signed integers (the platform's
//! `OSStatus`). [`map_status`] is the only place where those integers become
//! typed errors, and the only place where such failures are logged.

use std::fmt;

use crate::error::KeychainError;

/// A raw status code returned by a vault backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VaultStatus(i32);

impl VaultStatus {
    pub const SUCCESS: Self = Self(0);
    pub const UNIMPLEMENTED: Self = Self(-4);
    pub const PARAM: Self = Self(-50);
    pub const ALLOCATE: Self = Self(-108);
    pub const USER_CANCELED: Self = Self(-128);
    pub const NOT_AVAILABLE: Self = Self(-25291);
    pub const AUTH_FAILED: Self = Self(-25293);
    pub const DUPLICATE_ITEM: Self = Self(-25299);
    pub const ITEM_NOT_FOUND: Self = Self(-25300);
    pub const INTERACTION_NOT_ALLOWED: Self = Self(-25308);
    pub const DECODE: Self = Self(-26275);
    pub const MISSING_ENTITLEMENT: Self = Self(-34018);

    /// Wrap a raw status code.
    pub const fn from_code(code: i32) -> Self {
        Self(code)
    }

    /// The raw status code.
    pub const fn code(self) -> i32 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Human-readable description of the status.
    pub fn message(self) -> &'static str {
        match self {
            Self::SUCCESS => "no error",
            Self::UNIMPLEMENTED => "function or operation not implemented",
            Self::PARAM => "one or more parameters passed to the function were not valid",
            Self::ALLOCATE => "failed to allocate memory",
            Self::USER_CANCELED => "user canceled the operation",
            Self::NOT_AVAILABLE => "no keychain is available",
            Self::AUTH_FAILED => "the user name or passphrase you entered is not correct",
            Self::DUPLICATE_ITEM => "the specified item already exists in the keychain",
            Self::ITEM_NOT_FOUND => "the specified item could not be found in the keychain",
            Self::INTERACTION_NOT_ALLOWED => "user interaction is not allowed",
            Self::DECODE => "unable to decode the provided data",
            Self::MISSING_ENTITLEMENT => "a required entitlement is missing",
            _ => "unknown keychain status",
        }
    }
}

impl fmt::Display for VaultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0, self.message())
    }
}

impl From<i32> for VaultStatus {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

/// Translate a vault status into a typed error, logging it once.
///
/// `UserCanceled` is a normal outcome of an authentication prompt and is
/// returned without being logged.
pub fn map_status(status: VaultStatus) -> KeychainError {
    let error = match status {
        VaultStatus::DUPLICATE_ITEM => KeychainError::DuplicateItem,
        VaultStatus::ITEM_NOT_FOUND => KeychainError::ItemNotFound,
        VaultStatus::USER_CANCELED => KeychainError::UserCanceled,
        VaultStatus::INTERACTION_NOT_ALLOWED => KeychainError::InteractionRequired,
        VaultStatus::DECODE => KeychainError::ConversionError {
            reason: status.message().to_string(),
        },
        other => KeychainError::Status(other),
    };

    if !error.is_cancellation() {
        tracing::warn!(
            status = status.code(),
            message = status.message(),
            "keychain operation failed"
        );
    }
    error
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::Layer;
    use tracing_subscriber::layer::{Context, SubscriberExt};

    use super::*;

    /// Records the level of every event it sees.
    #[derive(Clone, Default)]
    struct LevelRecorder(Arc<Mutex<Vec<Level>>>);

    impl<S: Subscriber> Layer<S> for LevelRecorder {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            self.0.lock().unwrap().push(*event.metadata().level());
        }
    }

    fn levels_logged_by(status: VaultStatus) -> Vec<Level> {
        let recorder = LevelRecorder::default();
        let subscriber = tracing_subscriber::registry().with(recorder.clone());
        tracing::subscriber::with_default(subscriber, || {
            map_status(status);
        });
        let levels = recorder.0.lock().unwrap().clone();
        levels
    }

    #[test]
    fn cancellation_is_not_logged() {
        assert!(levels_logged_by(VaultStatus::USER_CANCELED).is_empty());
    }

    #[test]
    fn failures_are_logged_once_as_warnings() {
        assert_eq!(levels_logged_by(VaultStatus::PARAM), vec![Level::WARN]);
        assert_eq!(levels_logged_by(VaultStatus::ITEM_NOT_FOUND), vec![Level::WARN]);
    }

    #[test]
    fn well_known_codes_map_to_typed_errors() {
        assert!(matches!(
            map_status(VaultStatus::DUPLICATE_ITEM),
            KeychainError::DuplicateItem
        ));
        assert!(matches!(
            map_status(VaultStatus::ITEM_NOT_FOUND),
            KeychainError::ItemNotFound
        ));
        assert!(matches!(
            map_status(VaultStatus::USER_CANCELED),
            KeychainError::UserCanceled
        ));
        assert!(matches!(
            map_status(VaultStatus::INTERACTION_NOT_ALLOWED),
            KeychainError::InteractionRequired
        ));
        assert!(matches!(
            map_status(VaultStatus::DECODE),
            KeychainError::ConversionError { .. }
        ));
    }

    #[test]
    fn unknown_codes_are_kept_verbatim() {
        match map_status(VaultStatus::from_code(-99999)) {
            KeychainError::Status(status) => {
                assert_eq!(status.code(), -99999);
                assert_eq!(status.message(), "unknown keychain status");
            }
            other => panic!("expected Status, got {other:?}"),
        }

        match map_status(VaultStatus::PARAM) {
            KeychainError::Status(status) => assert_eq!(status, VaultStatus::PARAM),
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn display_includes_code_and_message() {
        let text = KeychainError::Status(VaultStatus::AUTH_FAILED).to_string();
        assert!(text.contains("-25293"));
        assert!(text.contains("passphrase"));
    }

    #[test]
    fn only_cancellation_is_flagged() {
        assert!(KeychainError::UserCanceled.is_cancellation());
        assert!(!KeychainError::InteractionRequired.is_cancellation());
        assert!(!KeychainError::ItemNotFound.is_cancellation());
    }
}
