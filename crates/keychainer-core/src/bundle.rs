//! Attribute bundles, the untyped wire format exchanged with a vault.
//!
//! A bundle maps an [`AttributeKey`] to an [`AttributeValue`]. Queries,
//! attributes to write, and rows returned by a vault are all bundles. The
//! typed accessors (`text`, `data`, `boolean`, ...) are total: a missing key
//! and a value of the wrong type both read as `None`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::auth::ContextHandle;
use crate::policy::AccessControl;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Every attribute the compiler or decoder reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeKey {
    // -- Item class ---------------------------------------------------------
    Class,

    // -- Common item attributes ---------------------------------------------
    Accessible,
    AccessControl,
    AccessGroup,
    Synchronizable,
    CreationDate,
    ModificationDate,
    Description,
    Comment,
    Creator,
    Type,
    Label,
    IsInvisible,
    IsNegative,
    Account,

    // -- Generic password ---------------------------------------------------
    Service,
    Generic,

    // -- Internet password --------------------------------------------------
    SecurityDomain,
    Server,
    Protocol,
    AuthenticationType,
    Port,
    Path,

    // -- Payload ------------------------------------------------------------
    ValueData,

    // -- Search and return terms --------------------------------------------
    MatchLimit,
    ReturnData,
    ReturnAttributes,
    UseAuthenticationUi,
    UseAuthenticationContext,
}

impl AttributeKey {
    const ALL: [Self; 29] = [
        Self::Class,
        Self::Accessible,
        Self::AccessControl,
        Self::AccessGroup,
        Self::Synchronizable,
        Self::CreationDate,
        Self::ModificationDate,
        Self::Description,
        Self::Comment,
        Self::Creator,
        Self::Type,
        Self::Label,
        Self::IsInvisible,
        Self::IsNegative,
        Self::Account,
        Self::Service,
        Self::Generic,
        Self::SecurityDomain,
        Self::Server,
        Self::Protocol,
        Self::AuthenticationType,
        Self::Port,
        Self::Path,
        Self::ValueData,
        Self::MatchLimit,
        Self::ReturnData,
        Self::ReturnAttributes,
        Self::UseAuthenticationUi,
        Self::UseAuthenticationContext,
    ];

    /// The platform's short code for this key.
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Accessible => "pdmn",
            Self::AccessControl => "accc",
            Self::AccessGroup => "agrp",
            Self::Synchronizable => "sync",
            Self::CreationDate => "cdat",
            Self::ModificationDate => "mdat",
            Self::Description => "desc",
            Self::Comment => "icmt",
            Self::Creator => "crtr",
            Self::Type => "type",
            Self::Label => "labl",
            Self::IsInvisible => "invi",
            Self::IsNegative => "nega",
            Self::Account => "acct",
            Self::Service => "svce",
            Self::Generic => "gena",
            Self::SecurityDomain => "sdmn",
            Self::Server => "srvr",
            Self::Protocol => "ptcl",
            Self::AuthenticationType => "atyp",
            Self::Port => "port",
            Self::Path => "path",
            Self::ValueData => "v_Data",
            Self::MatchLimit => "m_Limit",
            Self::ReturnData => "r_Data",
            Self::ReturnAttributes => "r_Attributes",
            Self::UseAuthenticationUi => "u_AuthUI",
            Self::UseAuthenticationContext => "u_AuthCtx",
        }
    }

    /// Parse a platform short code. Unknown codes yield `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_code() == code)
    }

    /// Whether the key describes the stored item, as opposed to steering a
    /// search or carrying the payload.
    pub fn is_item_attribute(&self) -> bool {
        !matches!(
            self,
            Self::ValueData
                | Self::MatchLimit
                | Self::ReturnData
                | Self::ReturnAttributes
                | Self::UseAuthenticationUi
                | Self::UseAuthenticationContext
        )
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// How many items a search may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchLimit {
    One,
    All,
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Data(Vec<u8>),
    Bool(bool),
    Integer(i64),
    Date(DateTime<Utc>),
    MatchLimit(MatchLimit),
    /// Match items regardless of their synchronization state.
    SynchronizableAny,
    /// Fail instead of showing an authentication prompt.
    AuthenticationUiSkip,
    AccessControl(AccessControl),
    AuthenticationContext(ContextHandle),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Data(value)
    }
}

impl From<&[u8]> for AttributeValue {
    fn from(value: &[u8]) -> Self {
        Self::Data(value.to_vec())
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}

impl From<MatchLimit> for AttributeValue {
    fn from(value: MatchLimit) -> Self {
        Self::MatchLimit(value)
    }
}

impl From<AccessControl> for AttributeValue {
    fn from(value: AccessControl) -> Self {
        Self::AccessControl(value)
    }
}

impl From<ContextHandle> for AttributeValue {
    fn from(value: ContextHandle) -> Self {
        Self::AuthenticationContext(value)
    }
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// Ordered mapping from attribute key to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeBundle {
    entries: BTreeMap<AttributeKey, AttributeValue>,
}

impl AttributeBundle {
    /// An empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing any previous value.
    pub fn insert(&mut self, key: AttributeKey, value: impl Into<AttributeValue>) {
        self.entries.insert(key, value.into());
    }

    /// Set `key` only when `value` is present.
    pub fn insert_opt<V: Into<AttributeValue>>(&mut self, key: AttributeKey, value: Option<V>) {
        if let Some(value) = value {
            self.insert(key, value);
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: AttributeKey, value: impl Into<AttributeValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Remove `key`, returning its previous value.
    pub fn remove(&mut self, key: AttributeKey) -> Option<AttributeValue> {
        self.entries.remove(&key)
    }

    /// Builder form of [`remove`](Self::remove).
    pub fn without(mut self, key: AttributeKey) -> Self {
        self.entries.remove(&key);
        self
    }

    /// The raw value stored under `key`.
    pub fn get(&self, key: AttributeKey) -> Option<&AttributeValue> {
        self.entries.get(&key)
    }

    /// Whether `key` is present, whatever its value.
    pub fn contains_key(&self, key: AttributeKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Number of attributes in the bundle.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bundle holds no attributes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Key-value pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (AttributeKey, &AttributeValue)> {
        self.entries.iter().map(|(key, value)| (*key, value))
    }

    /// Keys in key order.
    pub fn keys(&self) -> impl Iterator<Item = AttributeKey> + '_ {
        self.entries.keys().copied()
    }

    /// Merge `other` into `self`; on conflicting keys `other` wins.
    pub fn merge(mut self, other: AttributeBundle) -> Self {
        self.entries.extend(other.entries);
        self
    }

    /// Copy of the bundle restricted to keys accepted by `keep`.
    pub fn filtered(&self, keep: impl Fn(AttributeKey) -> bool) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(key, _)| keep(**key))
                .map(|(key, value)| (*key, value.clone()))
                .collect(),
        }
    }

    // -- Typed accessors ----------------------------------------------------
    //
    // Each accessor returns `None` when the key is absent or holds another kind.

    /// Text value of `key`.
    pub fn text(&self, key: AttributeKey) -> Option<&str> {
        match self.get(key)? {
            AttributeValue::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Byte value of `key`.
    pub fn data(&self, key: AttributeKey) -> Option<&[u8]> {
        match self.get(key)? {
            AttributeValue::Data(value) => Some(value),
            _ => None,
        }
    }

    /// Boolean value of `key`.
    pub fn boolean(&self, key: AttributeKey) -> Option<bool> {
        match self.get(key)? {
            AttributeValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Integer value of `key`.
    pub fn integer(&self, key: AttributeKey) -> Option<i64> {
        match self.get(key)? {
            AttributeValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Date value of `key`.
    pub fn date(&self, key: AttributeKey) -> Option<DateTime<Utc>> {
        match self.get(key)? {
            AttributeValue::Date(value) => Some(*value),
            _ => None,
        }
    }
}

impl FromIterator<(AttributeKey, AttributeValue)> for AttributeBundle {
    fn from_iter<I: IntoIterator<Item = (AttributeKey, AttributeValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for AttributeBundle {
    type Item = (AttributeKey, AttributeValue);
    type IntoIter = std::collections::btree_map::IntoIter<AttributeKey, AttributeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Renders keys and value kinds only; payload bytes are never printed.
impl fmt::Display for AttributeBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, (key, value)) in self.entries.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            match value {
                AttributeValue::Text(text) => write!(f, "{key}: {text:?}")?,
                AttributeValue::Data(bytes) => write!(f, "{key}: <{} bytes>", bytes.len())?,
                AttributeValue::Bool(flag) => write!(f, "{key}: {flag}")?,
                AttributeValue::Integer(number) => write!(f, "{key}: {number}")?,
                AttributeValue::Date(date) => write!(f, "{key}: {}", date.to_rfc3339())?,
                AttributeValue::MatchLimit(limit) => write!(f, "{key}: {limit:?}")?,
                AttributeValue::SynchronizableAny => write!(f, "{key}: any")?,
                AttributeValue::AuthenticationUiSkip => write!(f, "{key}: skip")?,
                AttributeValue::AccessControl(_) => write!(f, "{key}: <access control>")?,
                AttributeValue::AuthenticationContext(_) => write!(f, "{key}: <context>")?,
            }
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors_are_total() {
        let bundle = AttributeBundle::new()
            .with(AttributeKey::Account, "alice")
            .with(AttributeKey::Port, 443_i64)
            .with(AttributeKey::IsInvisible, true);

        assert_eq!(bundle.text(AttributeKey::Account), Some("alice"));
        assert_eq!(bundle.integer(AttributeKey::Port), Some(443));
        assert_eq!(bundle.boolean(AttributeKey::IsInvisible), Some(true));

        // Wrong type and missing key both read as absent.
        assert_eq!(bundle.integer(AttributeKey::Account), None);
        assert_eq!(bundle.text(AttributeKey::Label), None);
        assert_eq!(bundle.date(AttributeKey::CreationDate), None);
    }

    #[test]
    fn merge_prefers_right_hand_side() {
        let left = AttributeBundle::new()
            .with(AttributeKey::Label, "old")
            .with(AttributeKey::Comment, "kept");
        let right = AttributeBundle::new().with(AttributeKey::Label, "new");

        let merged = left.merge(right);
        assert_eq!(merged.text(AttributeKey::Label), Some("new"));
        assert_eq!(merged.text(AttributeKey::Comment), Some("kept"));
    }

    #[test]
    fn insert_opt_skips_none() {
        let mut bundle = AttributeBundle::new();
        bundle.insert_opt(AttributeKey::Label, None::<String>);
        bundle.insert_opt(AttributeKey::Comment, Some("c"));
        assert!(!bundle.contains_key(AttributeKey::Label));
        assert_eq!(bundle.len(), 1);
    }

    #[test]
    fn key_codes_roundtrip() {
        for key in AttributeKey::ALL {
            assert_eq!(AttributeKey::from_code(key.as_code()), Some(key));
        }
        assert_eq!(AttributeKey::from_code("zzzz"), None);
    }

    #[test]
    fn item_attributes_exclude_search_terms() {
        assert!(AttributeKey::Account.is_item_attribute());
        assert!(AttributeKey::Class.is_item_attribute());
        assert!(!AttributeKey::ReturnData.is_item_attribute());
        assert!(!AttributeKey::ValueData.is_item_attribute());
    }

    #[test]
    fn display_hides_payload() {
        let bundle = AttributeBundle::new()
            .with(AttributeKey::Account, "bob")
            .with(AttributeKey::ValueData, b"hunter2".as_slice());
        let text = bundle.to_string();
        assert!(text.contains("acct: \"bob\""));
        assert!(text.contains("v_Data: <7 bytes>"));
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn filtered_keeps_selected_keys() {
        let bundle = AttributeBundle::new()
            .with(AttributeKey::Account, "a")
            .with(AttributeKey::MatchLimit, MatchLimit::One);
        let items = bundle.filtered(|key| key.is_item_attribute());
        assert_eq!(items.keys().collect::<Vec<_>>(), vec![AttributeKey::Account]);
    }
}
