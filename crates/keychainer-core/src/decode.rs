//! Attribute decoder.
//!
//! Decoding is total: a missing key, a value of the wrong type or an
//! out-of-range number decodes to `None` for that field and never fails the
//! record.

use chrono::{DateTime, Utc};

use crate::bundle::{AttributeBundle, AttributeKey, AttributeValue};
use crate::config::Family;
use crate::policy::{Accessibility, InternetAuthenticationType, InternetProtocol};

/// Fields shared by both item families.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonAttributes {
    pub account: Option<String>,
    pub access_group: Option<String>,
    pub accessibility: Option<Accessibility>,
    pub creation_date: Option<DateTime<Utc>>,
    pub modification_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub comment: Option<String>,
    pub creator: Option<u32>,
    pub type_tag: Option<u32>,
    pub label: Option<String>,
    pub is_invisible: Option<bool>,
    pub is_negative: Option<bool>,
    pub synchronizable: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenericAttributes {
    pub common: CommonAttributes,
    pub service: Option<String>,
    pub generic_data: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkAttributes {
    pub common: CommonAttributes,
    pub security_domain: Option<String>,
    pub server: Option<String>,
    pub protocol: Option<InternetProtocol>,
    pub authentication_type: Option<InternetAuthenticationType>,
    pub port: Option<u16>,
    pub path: Option<String>,
}

/// Decoded attributes of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemAttributes {
    Generic(GenericAttributes),
    Network(NetworkAttributes),
}

impl ItemAttributes {
    pub fn family(&self) -> Family {
        match self {
            Self::Generic(_) => Family::Generic,
            Self::Network(_) => Family::Network,
        }
    }

    pub fn common(&self) -> &CommonAttributes {
        match self {
            Self::Generic(attrs) => &attrs.common,
            Self::Network(attrs) => &attrs.common,
        }
    }

    pub fn account(&self) -> Option<&str> {
        self.common().account.as_deref()
    }

    pub fn label(&self) -> Option<&str> {
        self.common().label.as_deref()
    }

    pub fn comment(&self) -> Option<&str> {
        self.common().comment.as_deref()
    }

    pub fn type_tag(&self) -> Option<u32> {
        self.common().type_tag
    }

    pub fn as_generic(&self) -> Option<&GenericAttributes> {
        match self {
            Self::Generic(attrs) => Some(attrs),
            Self::Network(_) => None,
        }
    }

    pub fn as_network(&self) -> Option<&NetworkAttributes> {
        match self {
            Self::Network(attrs) => Some(attrs),
            Self::Generic(_) => None,
        }
    }
}

/// Decode `bundle` as an item of `family`.
///
/// The family comes from the configuration that issued the query; a class
/// attribute in the bundle, if any, is not consulted.
pub fn decode(family: Family, bundle: &AttributeBundle) -> ItemAttributes {
    let common = decode_common(bundle);
    match family {
        Family::Generic => ItemAttributes::Generic(GenericAttributes {
            common,
            service: owned_text(bundle, AttributeKey::Service),
            generic_data: bundle.data(AttributeKey::Generic).map(<[u8]>::to_vec),
        }),
        Family::Network => ItemAttributes::Network(NetworkAttributes {
            common,
            security_domain: owned_text(bundle, AttributeKey::SecurityDomain),
            server: owned_text(bundle, AttributeKey::Server),
            protocol: bundle
                .text(AttributeKey::Protocol)
                .and_then(InternetProtocol::from_code),
            authentication_type: bundle
                .text(AttributeKey::AuthenticationType)
                .and_then(InternetAuthenticationType::from_code),
            port: bundle
                .integer(AttributeKey::Port)
                .and_then(|port| u16::try_from(port).ok()),
            path: owned_text(bundle, AttributeKey::Path),
        }),
    }
}

fn decode_common(bundle: &AttributeBundle) -> CommonAttributes {
    CommonAttributes {
        account: owned_text(bundle, AttributeKey::Account),
        access_group: owned_text(bundle, AttributeKey::AccessGroup),
        accessibility: decode_accessibility(bundle),
        creation_date: bundle.date(AttributeKey::CreationDate),
        modification_date: bundle.date(AttributeKey::ModificationDate),
        description: owned_text(bundle, AttributeKey::Description),
        comment: owned_text(bundle, AttributeKey::Comment),
        creator: four_char_code(bundle, AttributeKey::Creator),
        type_tag: four_char_code(bundle, AttributeKey::Type),
        label: owned_text(bundle, AttributeKey::Label),
        is_invisible: bundle.boolean(AttributeKey::IsInvisible),
        is_negative: bundle.boolean(AttributeKey::IsNegative),
        synchronizable: bundle.boolean(AttributeKey::Synchronizable),
    }
}

/// Plain `pdmn` code first, then the level carried by an access control.
fn decode_accessibility(bundle: &AttributeBundle) -> Option<Accessibility> {
    bundle
        .text(AttributeKey::Accessible)
        .and_then(Accessibility::from_code)
        .or_else(|| match bundle.get(AttributeKey::AccessControl) {
            Some(AttributeValue::AccessControl(access)) => Some(access.accessibility()),
            _ => None,
        })
}

fn owned_text(bundle: &AttributeBundle, key: AttributeKey) -> Option<String> {
    bundle.text(key).map(str::to_owned)
}

fn four_char_code(bundle: &AttributeBundle, key: AttributeKey) -> Option<u32> {
    bundle.integer(key).and_then(|code| u32::try_from(code).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{AccessControl, AuthenticationPolicy};
    use chrono::TimeZone;

    #[test]
    fn decodes_generic_fields() {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let bundle = AttributeBundle::new()
            .with(AttributeKey::Account, "alice")
            .with(AttributeKey::Service, "mail")
            .with(AttributeKey::Generic, b"opaque".as_slice())
            .with(AttributeKey::Label, "Mail password")
            .with(AttributeKey::Type, 0x6d61_696c_i64)
            .with(AttributeKey::Accessible, "aku")
            .with(AttributeKey::Synchronizable, false)
            .with(AttributeKey::CreationDate, created);

        let attrs = decode(Family::Generic, &bundle);
        let generic = attrs.as_generic().unwrap();
        assert_eq!(attrs.account(), Some("alice"));
        assert_eq!(generic.service.as_deref(), Some("mail"));
        assert_eq!(generic.generic_data.as_deref(), Some(b"opaque".as_slice()));
        assert_eq!(attrs.label(), Some("Mail password"));
        assert_eq!(attrs.type_tag(), Some(0x6d61_696c));
        assert_eq!(
            attrs.common().accessibility,
            Some(Accessibility::WhenUnlockedThisDeviceOnly)
        );
        assert_eq!(attrs.common().synchronizable, Some(false));
        assert_eq!(attrs.common().creation_date, Some(created));
        assert!(attrs.as_network().is_none());
    }

    #[test]
    fn decodes_network_fields() {
        let bundle = AttributeBundle::new()
            .with(AttributeKey::Account, "bob")
            .with(AttributeKey::Server, "example.com")
            .with(AttributeKey::Protocol, "htps")
            .with(AttributeKey::AuthenticationType, "form")
            .with(AttributeKey::Port, 443_i64)
            .with(AttributeKey::Path, "/login")
            .with(AttributeKey::SecurityDomain, "realm");

        let attrs = decode(Family::Network, &bundle);
        let network = attrs.as_network().unwrap();
        assert_eq!(attrs.family(), Family::Network);
        assert_eq!(network.server.as_deref(), Some("example.com"));
        assert_eq!(network.protocol, Some(InternetProtocol::Https));
        assert_eq!(
            network.authentication_type,
            Some(InternetAuthenticationType::HtmlForm)
        );
        assert_eq!(network.port, Some(443));
        assert_eq!(network.path.as_deref(), Some("/login"));
        assert_eq!(network.security_domain.as_deref(), Some("realm"));
    }

    #[test]
    fn mismatched_types_decode_to_absent() {
        let bundle = AttributeBundle::new()
            .with(AttributeKey::Account, 7_i64)
            .with(AttributeKey::Label, true)
            .with(AttributeKey::Port, 70_000_i64)
            .with(AttributeKey::Type, -1_i64)
            .with(AttributeKey::Protocol, "nope")
            .with(AttributeKey::Accessible, "zz");

        let attrs = decode(Family::Network, &bundle);
        assert_eq!(attrs.account(), None);
        assert_eq!(attrs.label(), None);
        assert_eq!(attrs.type_tag(), None);
        assert_eq!(attrs.common().accessibility, None);
        let network = attrs.as_network().unwrap();
        assert_eq!(network.port, None);
        assert_eq!(network.protocol, None);
    }

    #[test]
    fn empty_bundle_decodes_to_defaults() {
        let attrs = decode(Family::Generic, &AttributeBundle::new());
        assert_eq!(attrs, ItemAttributes::Generic(GenericAttributes::default()));
    }

    #[test]
    fn accessibility_falls_back_to_access_control() {
        let access = AccessControl::new(
            Accessibility::WhenUnlocked,
            AuthenticationPolicy::user_presence(),
        )
        .unwrap();
        let bundle = AttributeBundle::new().with(AttributeKey::AccessControl, access);
        let attrs = decode(Family::Generic, &bundle);
        assert_eq!(attrs.common().accessibility, Some(Accessibility::WhenUnlocked));
    }
}
