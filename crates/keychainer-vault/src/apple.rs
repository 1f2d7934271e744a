//! Keychain Services backend for macOS and iOS.
//!
//! Bundles are translated to `CFDictionary` values and handed to the
//! `SecItem*` calls exposed by `security-framework-sys`. Every Keychain
//! Services key and sentinel is a `CFString` whose contents are its short
//! code (`kSecAttrService` is `"svce"`), so keys are built from
//! [`AttributeKey::as_code`] and responses are mapped back through
//! [`AttributeKey::from_code`].

use chrono::{DateTime, Utc};
use core_foundation::array::{CFArray, CFArrayRef};
use core_foundation::base::{CFType, CFTypeRef, TCFType};
use core_foundation::boolean::CFBoolean;
use core_foundation::data::CFData;
use core_foundation::date::CFDate;
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::number::CFNumber;
use core_foundation::string::CFString;
use keychainer_core::{AccessControl, AttributeBundle, AttributeKey, AttributeValue, MatchLimit, VaultStatus};
use security_framework::access_control::SecAccessControl;
use security_framework::base::Error as SecurityError;
use security_framework_sys::access_control::SecAccessControlCreateWithFlags;
use security_framework_sys::keychain_item::{SecItemAdd, SecItemCopyMatching, SecItemDelete, SecItemUpdate};
use tracing::debug;

use crate::backend::{VaultBackend, VaultResult};

/// Seconds between the Unix epoch and the Core Foundation epoch (2001-01-01).
const CF_EPOCH_OFFSET: f64 = 978_307_200.0;

const MATCH_LIMIT_ONE: &str = "m_LimitOne";
const MATCH_LIMIT_ALL: &str = "m_LimitAll";
const SYNCHRONIZABLE_ANY: &str = "syna";
const AUTHENTICATION_UI_SKIP: &str = "u_AuthUISkip";

/// The current user's keychain, reached through Keychain Services.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppleKeychain;

impl AppleKeychain {
    pub fn new() -> Self {
        Self
    }
}

impl VaultBackend for AppleKeychain {
    fn search(&self, query: &AttributeBundle) -> VaultResult<Vec<AttributeBundle>> {
        let query = to_dictionary(query)?;
        let mut result: CFTypeRef = std::ptr::null();
        let status = unsafe { SecItemCopyMatching(query.as_concrete_TypeRef(), &mut result) };
        check("SecItemCopyMatching", status)?;

        if result.is_null() {
            return Ok(vec![AttributeBundle::new()]);
        }
        let result = unsafe { CFType::wrap_under_create_rule(result) };
        if result.type_of() == CFArray::<CFType>::type_id() {
            let rows = unsafe {
                CFArray::<CFType>::wrap_under_get_rule(result.as_CFTypeRef() as CFArrayRef)
            };
            Ok(rows.iter().map(|row| from_row(&row)).collect())
        } else {
            Ok(vec![from_row(&result)])
        }
    }

    fn insert(&self, attributes: &AttributeBundle) -> VaultResult<()> {
        let attributes = to_dictionary(attributes)?;
        let status = unsafe { SecItemAdd(attributes.as_concrete_TypeRef(), std::ptr::null_mut()) };
        check("SecItemAdd", status)
    }

    fn mutate(&self, query: &AttributeBundle, changes: &AttributeBundle) -> VaultResult<()> {
        let query = to_dictionary(query)?;
        let changes = to_dictionary(changes)?;
        let status =
            unsafe { SecItemUpdate(query.as_concrete_TypeRef(), changes.as_concrete_TypeRef()) };
        check("SecItemUpdate", status)
    }

    fn erase(&self, query: &AttributeBundle) -> VaultResult<()> {
        let query = to_dictionary(query)?;
        let status = unsafe { SecItemDelete(query.as_concrete_TypeRef()) };
        check("SecItemDelete", status)
    }
}

fn check(call: &'static str, status: i32) -> VaultResult<()> {
    if status == 0 {
        return Ok(());
    }
    let message = SecurityError::from_code(status).message();
    debug!(call, status, message = message.as_deref().unwrap_or(""), "keychain services call failed");
    Err(VaultStatus::from_code(status))
}

// ---------------------------------------------------------------------------
// Bundle -> CFDictionary
// ---------------------------------------------------------------------------

fn to_dictionary(bundle: &AttributeBundle) -> VaultResult<CFDictionary<CFType, CFType>> {
    let mut pairs = Vec::with_capacity(bundle.len());
    for (key, value) in bundle.iter() {
        if let Some(value) = to_cf(value)? {
            pairs.push((CFString::from_static_string(key.as_code()).as_CFType(), value));
        }
    }
    Ok(CFDictionary::from_CFType_pairs(&pairs))
}

fn to_cf(value: &AttributeValue) -> VaultResult<Option<CFType>> {
    let converted = match value {
        // Class and accessibility values are already platform codes.
        AttributeValue::Text(text) => CFString::new(text).as_CFType(),
        AttributeValue::Data(bytes) => CFData::from_buffer(bytes).as_CFType(),
        AttributeValue::Bool(flag) => CFBoolean::from(*flag).as_CFType(),
        AttributeValue::Integer(number) => CFNumber::from(*number).as_CFType(),
        AttributeValue::Date(date) => {
            let seconds = date.timestamp_millis() as f64 / 1000.0 - CF_EPOCH_OFFSET;
            CFDate::new(seconds).as_CFType()
        }
        AttributeValue::MatchLimit(MatchLimit::One) => {
            CFString::from_static_string(MATCH_LIMIT_ONE).as_CFType()
        }
        AttributeValue::MatchLimit(MatchLimit::All) => {
            CFString::from_static_string(MATCH_LIMIT_ALL).as_CFType()
        }
        AttributeValue::SynchronizableAny => {
            CFString::from_static_string(SYNCHRONIZABLE_ANY).as_CFType()
        }
        AttributeValue::AuthenticationUiSkip => {
            CFString::from_static_string(AUTHENTICATION_UI_SKIP).as_CFType()
        }
        AttributeValue::AccessControl(access) => create_access_control(access)?.as_CFType(),
        AttributeValue::AuthenticationContext(handle) => match handle.context().platform_handle() {
            // The context implementation vouches for the pointer being a live
            // LAContext.
            Some(raw) => unsafe { CFType::wrap_under_get_rule(raw as CFTypeRef) },
            None => return Ok(None),
        },
    };
    Ok(Some(converted))
}

/// Access control object for `access`.
///
/// The protection level goes in as its platform code so every
/// [`Accessibility`](keychainer_core::Accessibility) level is accepted.
fn create_access_control(access: &AccessControl) -> VaultResult<SecAccessControl> {
    let protection = CFString::from_static_string(access.accessibility().as_code());
    let flags = access.policy().platform_bits();
    let raw = unsafe {
        SecAccessControlCreateWithFlags(
            std::ptr::null(),
            protection.as_CFTypeRef(),
            flags as _,
            std::ptr::null_mut(),
        )
    };
    if raw.is_null() {
        debug!(flags, "access control rejected by keychain services");
        return Err(VaultStatus::PARAM);
    }
    Ok(unsafe { SecAccessControl::wrap_under_create_rule(raw) })
}

// ---------------------------------------------------------------------------
// CF response -> Bundle
// ---------------------------------------------------------------------------

/// One search row: an attribute dictionary, or bare payload data when only
/// the data was requested.
fn from_row(row: &CFType) -> AttributeBundle {
    if row.type_of() == CFDictionary::<CFType, CFType>::type_id() {
        let dictionary = unsafe {
            CFDictionary::<CFType, CFType>::wrap_under_get_rule(
                row.as_CFTypeRef() as CFDictionaryRef
            )
        };
        let (keys, values) = dictionary.get_keys_and_values();
        keys.into_iter()
            .zip(values)
            .filter_map(|(key, value)| {
                let key = unsafe { CFType::wrap_under_get_rule(key) };
                let value = unsafe { CFType::wrap_under_get_rule(value) };
                let key = AttributeKey::from_code(&key.downcast::<CFString>()?.to_string())?;
                Some((key, from_cf(key, &value)?))
            })
            .collect()
    } else if let Some(data) = row.downcast::<CFData>() {
        AttributeBundle::new().with(AttributeKey::ValueData, data.bytes())
    } else {
        AttributeBundle::new()
    }
}

fn from_cf(key: AttributeKey, value: &CFType) -> Option<AttributeValue> {
    let flag_key = matches!(
        key,
        AttributeKey::Synchronizable | AttributeKey::IsInvisible | AttributeKey::IsNegative
    );
    if let Some(text) = value.downcast::<CFString>() {
        Some(AttributeValue::Text(text.to_string()))
    } else if let Some(data) = value.downcast::<CFData>() {
        Some(AttributeValue::Data(data.bytes().to_vec()))
    } else if let Some(flag) = value.downcast::<CFBoolean>() {
        Some(AttributeValue::Bool(bool::from(flag)))
    } else if let Some(number) = value.downcast::<CFNumber>() {
        let number = number.to_i64()?;
        Some(if flag_key {
            AttributeValue::Bool(number != 0)
        } else {
            AttributeValue::Integer(number)
        })
    } else if let Some(date) = value.downcast::<CFDate>() {
        let millis = ((date.abs_time() + CF_EPOCH_OFFSET) * 1000.0).round() as i64;
        DateTime::<Utc>::from_timestamp_millis(millis).map(AttributeValue::Date)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Keychain;
    use keychainer_core::Configuration;
    use std::sync::Arc;

    fn test_keychain() -> Keychain {
        let service = format!("dev.keychainer.test.{}", std::process::id());
        Keychain::new(
            Arc::new(AppleKeychain::new()),
            Configuration::generic(service).unwrap(),
        )
    }

    #[test]
    fn dates_survive_the_cf_epoch_shift() {
        let date = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_123).unwrap();
        let cf = to_cf(&AttributeValue::Date(date)).unwrap().unwrap();
        assert_eq!(
            from_cf(AttributeKey::CreationDate, &cf),
            Some(AttributeValue::Date(date))
        );
    }

    #[test]
    fn sentinels_use_platform_codes() {
        let any = to_cf(&AttributeValue::SynchronizableAny).unwrap().unwrap();
        assert_eq!(any.downcast::<CFString>().unwrap().to_string(), "syna");

        let all = to_cf(&AttributeValue::MatchLimit(MatchLimit::All)).unwrap().unwrap();
        assert_eq!(all.downcast::<CFString>().unwrap().to_string(), "m_LimitAll");
    }

    #[test]
    fn access_control_is_created_for_valid_policies() {
        let access = AccessControl::new(
            keychainer_core::Accessibility::WhenUnlocked,
            keychainer_core::AuthenticationPolicy::user_presence(),
        )
        .unwrap();
        assert!(create_access_control(&access).is_ok());
    }

    #[test]
    fn numeric_flags_decode_as_booleans() {
        let one = CFNumber::from(1_i64).as_CFType();
        assert_eq!(
            from_cf(AttributeKey::Synchronizable, &one),
            Some(AttributeValue::Bool(true))
        );
        assert_eq!(
            from_cf(AttributeKey::Port, &one),
            Some(AttributeValue::Integer(1))
        );
    }

    #[test]
    #[ignore = "requires an unlocked login keychain, run manually with --ignored"]
    fn round_trip_against_keychain_services() {
        let kc = test_keychain();
        kc.delete_all().unwrap();

        kc.add("alice", "secret1").unwrap();
        assert_eq!(kc.get_string("alice").unwrap().as_deref(), Some("secret1"));

        kc.set("alice", "secret2").unwrap();
        assert_eq!(kc.get_string("alice").unwrap().as_deref(), Some("secret2"));
        assert!(kc.contains("alice").unwrap());

        kc.delete("alice").unwrap();
        assert!(!kc.contains("alice").unwrap());
        kc.delete("alice").unwrap();
    }
}
