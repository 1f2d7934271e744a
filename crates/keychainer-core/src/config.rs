//! Immutable keychain configuration.
//!
//! A [`Configuration`] describes *which* items an operation targets (the
//! family and its scope) and *how* new items are protected (accessibility,
//! authentication policy, synchronization, descriptive attributes). The
//! logical secret key (the account) is supplied per operation and is never
//! stored here.
//!
//! Every `with_*` method borrows `self` and returns a new value, so a base
//! configuration can be shared and specialised without ever being changed:
//!
//! ```rust
//! use keychainer_core::config::Configuration;
//!
//! # fn example() -> keychainer_core::Result<()> {
//! let base = Configuration::generic("com.example.mail")?;
//! let work = base.with_label("work");
//! let personal = work.with_label("personal");
//!
//! assert_eq!(base.label(), None);
//! assert_eq!(work.label(), Some("work"));
//! assert_eq!(personal.label(), Some("personal"));
//! # Ok(())
//! # }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::auth::ContextHandle;
use crate::error::{KeychainError, Result};
use crate::policy::{
    Accessibility, AuthenticationPolicy, InternetAuthenticationType, InternetProtocol,
    SynchronizationMode,
};

// ---------------------------------------------------------------------------
// Family and scope
// ---------------------------------------------------------------------------

/// The two supported secret shapes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    /// Service-scoped secret ("generic password").
    #[default]
    Generic,
    /// Server-scoped secret ("internet password").
    Network,
}

impl Family {
    /// Platform code stored in the class attribute.
    pub fn class_code(&self) -> &'static str {
        match self {
            Self::Generic => "genp",
            Self::Network => "inet",
        }
    }

    /// Inverse of [`class_code`](Self::class_code).
    pub fn from_class_code(code: &str) -> Option<Self> {
        match code {
            "genp" => Some(Self::Generic),
            "inet" => Some(Self::Network),
            _ => None,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic => f.write_str("generic"),
            Self::Network => f.write_str("network"),
        }
    }
}

/// Identifying scope of a generic item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericScope {
    pub service: String,
    pub generic_data: Option<Vec<u8>>,
}

/// Identifying scope of a network item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkScope {
    pub server: String,
    pub protocol: Option<InternetProtocol>,
    pub authentication_type: Option<InternetAuthenticationType>,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub security_domain: Option<String>,
}

/// Family-specific scope; the variant is fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Generic(GenericScope),
    Network(NetworkScope),
}

impl Scope {
    /// The item family this scope belongs to.
    pub fn family(&self) -> Family {
        match self {
            Self::Generic(_) => Family::Generic,
            Self::Network(_) => Family::Network,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Immutable description of the items an operation works on.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    scope: Scope,
    access_group: Option<String>,
    accessibility: Accessibility,
    authentication_policy: Option<AuthenticationPolicy>,
    authentication_context: Option<ContextHandle>,
    skip_authentication_ui: Option<bool>,
    synchronizable: Option<bool>,
    match_any_synchronization: bool,
    label: Option<String>,
    comment: Option<String>,
    description: Option<String>,
    type_tag: Option<u32>,
}

impl Configuration {
    /// Configuration for service-scoped items.
    ///
    /// # Errors
    ///
    /// Returns [`KeychainError::InvalidConfiguration`] if `service` is empty.
    pub fn generic(service: impl Into<String>) -> Result<Self> {
        let service = non_empty("service", service.into())?;
        Ok(Self::from_scope(Scope::Generic(GenericScope {
            service,
            generic_data: None,
        })))
    }

    /// Configuration for server-scoped items.
    ///
    /// # Errors
    ///
    /// Returns [`KeychainError::InvalidConfiguration`] if `server` is empty.
    pub fn network(server: impl Into<String>) -> Result<Self> {
        let server = non_empty("server", server.into())?;
        Ok(Self::from_scope(Scope::Network(NetworkScope {
            server,
            protocol: None,
            authentication_type: None,
            port: None,
            path: None,
            security_domain: None,
        })))
    }

    fn from_scope(scope: Scope) -> Self {
        Self {
            scope,
            access_group: None,
            accessibility: Accessibility::default(),
            authentication_policy: None,
            authentication_context: None,
            skip_authentication_ui: None,
            synchronizable: None,
            match_any_synchronization: false,
            label: None,
            comment: None,
            description: None,
            type_tag: None,
        }
    }

    /// Copy of `self` with `change` applied to the copy.
    fn derive(&self, change: impl FnOnce(&mut Self)) -> Self {
        let mut next = self.clone();
        change(&mut next);
        next
    }

    // -- Accessors ----------------------------------------------------------

    /// Item family selected by the scope.
    pub fn family(&self) -> Family {
        self.scope.family()
    }

    /// Family-specific scope fields.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Access group shared between applications, if any.
    pub fn access_group(&self) -> Option<&str> {
        self.access_group.as_deref()
    }

    /// When stored items may be read. Defaults to after first unlock.
    pub fn accessibility(&self) -> Accessibility {
        self.accessibility
    }

    /// Policy attached to new items as an access control.
    pub fn authentication_policy(&self) -> Option<AuthenticationPolicy> {
        self.authentication_policy
    }

    /// Context passed along with reads so prompts can be reused.
    pub fn authentication_context(&self) -> Option<&ContextHandle> {
        self.authentication_context.as_ref()
    }

    /// Whether reads fail instead of prompting the user.
    pub fn skip_authentication_ui(&self) -> bool {
        self.skip_authentication_ui.unwrap_or(false)
    }

    /// The effective synchronization mode; `Any` takes precedence over an
    /// explicit boolean.
    pub fn synchronization_mode(&self) -> Option<SynchronizationMode> {
        if self.match_any_synchronization {
            return Some(SynchronizationMode::Any);
        }
        self.synchronizable.map(|synced| {
            if synced {
                SynchronizationMode::Synced
            } else {
                SynchronizationMode::LocalOnly
            }
        })
    }

    /// User-visible item label.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// User-editable comment.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Item kind description, such as "Web form password".
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Four-character type code.
    pub fn type_tag(&self) -> Option<u32> {
        self.type_tag
    }

    // -- Builders shared by both families -----------------------------------

    /// Share items through `access_group`.
    pub fn with_access_group(&self, access_group: impl Into<String>) -> Self {
        let access_group = access_group.into();
        self.derive(|c| c.access_group = Some(access_group))
    }

    /// Store new items at `accessibility`.
    pub fn with_accessibility(&self, accessibility: Accessibility) -> Self {
        self.derive(|c| c.accessibility = accessibility)
    }

    /// Protect new items with `policy` at the given accessibility level.
    ///
    /// The combination is validated when an add query is compiled.
    pub fn with_authentication_policy(
        &self,
        accessibility: Accessibility,
        policy: AuthenticationPolicy,
    ) -> Self {
        self.derive(|c| {
            c.accessibility = accessibility;
            c.authentication_policy = Some(policy);
        })
    }

    /// Attach `context` to reads and probes.
    pub fn with_authentication_context(&self, context: ContextHandle) -> Self {
        self.derive(|c| c.authentication_context = Some(context))
    }

    /// Fail reads of protected items instead of prompting.
    pub fn with_skip_authentication_ui(&self, skip: bool) -> Self {
        self.derive(|c| c.skip_authentication_ui = Some(skip))
    }

    /// Store and match only synchronized (`true`) or local (`false`) items.
    pub fn with_synchronizable(&self, synchronizable: bool) -> Self {
        self.derive(|c| c.synchronizable = Some(synchronizable))
    }

    /// Match items whatever their synchronization state.
    pub fn with_any_synchronization(&self) -> Self {
        self.derive(|c| c.match_any_synchronization = true)
    }

    /// Builder form of [`synchronization_mode`](Self::synchronization_mode).
    pub fn with_synchronization_mode(&self, mode: SynchronizationMode) -> Self {
        match mode.as_bool() {
            Some(synced) => self.derive(|c| {
                c.synchronizable = Some(synced);
                c.match_any_synchronization = false;
            }),
            None => self.with_any_synchronization(),
        }
    }

    /// Set the item label.
    pub fn with_label(&self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.derive(|c| c.label = Some(label))
    }

    /// Set the item comment.
    pub fn with_comment(&self, comment: impl Into<String>) -> Self {
        let comment = comment.into();
        self.derive(|c| c.comment = Some(comment))
    }

    /// Set the item kind description.
    pub fn with_description(&self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.derive(|c| c.description = Some(description))
    }

    /// Set the four-character type code.
    pub fn with_type_tag(&self, type_tag: u32) -> Self {
        self.derive(|c| c.type_tag = Some(type_tag))
    }

    // -- Generic-only builders ----------------------------------------------

    /// Replace the service.
    ///
    /// # Errors
    ///
    /// [`KeychainError::InvalidConfiguration`] for an empty service and
    /// [`KeychainError::FamilyMismatch`] on a network configuration.
    pub fn with_service(&self, service: impl Into<String>) -> Result<Self> {
        let service = non_empty("service", service.into())?;
        self.derive_generic("with_service", |scope| scope.service = service)
    }

    /// Attach application-defined bytes to the generic scope.
    pub fn with_generic_data(&self, data: impl Into<Vec<u8>>) -> Result<Self> {
        let data = data.into();
        self.derive_generic("with_generic_data", |scope| scope.generic_data = Some(data))
    }

    // -- Network-only builders ----------------------------------------------

    /// Replace the server together with its protocol and authentication
    /// type.
    pub fn with_server(
        &self,
        server: impl Into<String>,
        protocol: Option<InternetProtocol>,
        authentication_type: Option<InternetAuthenticationType>,
    ) -> Result<Self> {
        let server = non_empty("server", server.into())?;
        self.derive_network("with_server", |scope| {
            scope.server = server;
            scope.protocol = protocol;
            scope.authentication_type = authentication_type;
        })
    }

    /// Restrict to `port`.
    pub fn with_port(&self, port: u16) -> Result<Self> {
        self.derive_network("with_port", |scope| scope.port = Some(port))
    }

    /// Restrict to a path on the server.
    pub fn with_path(&self, path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        self.derive_network("with_path", |scope| scope.path = Some(path))
    }

    /// Restrict to an authentication realm.
    pub fn with_security_domain(&self, domain: impl Into<String>) -> Result<Self> {
        let domain = domain.into();
        self.derive_network("with_security_domain", |scope| {
            scope.security_domain = Some(domain)
        })
    }

    fn derive_generic(
        &self,
        operation: &'static str,
        change: impl FnOnce(&mut GenericScope),
    ) -> Result<Self> {
        let mut next = self.clone();
        match &mut next.scope {
            Scope::Generic(scope) => {
                change(scope);
                Ok(next)
            }
            Scope::Network(_) => Err(KeychainError::FamilyMismatch {
                operation,
                expected: Family::Generic,
                actual: Family::Network,
            }),
        }
    }

    fn derive_network(
        &self,
        operation: &'static str,
        change: impl FnOnce(&mut NetworkScope),
    ) -> Result<Self> {
        let mut next = self.clone();
        match &mut next.scope {
            Scope::Network(scope) => {
                change(scope);
                Ok(next)
            }
            Scope::Generic(_) => Err(KeychainError::FamilyMismatch {
                operation,
                expected: Family::Network,
                actual: Family::Generic,
            }),
        }
    }
}

fn non_empty(field: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        return Err(KeychainError::InvalidConfiguration {
            reason: format!("{field} must not be empty"),
        });
    }
    Ok(value)
}

/// One-line summary without secret material.
impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.family())?;
        match &self.scope {
            Scope::Generic(scope) => write!(f, "service: {}", scope.service)?,
            Scope::Network(scope) => {
                write!(f, "server: {}", scope.server)?;
                if let Some(protocol) = scope.protocol {
                    write!(f, ", protocol: {protocol:?}")?;
                }
                if let Some(port) = scope.port {
                    write!(f, ", port: {port}")?;
                }
            }
        }
        if let Some(group) = &self.access_group {
            write!(f, ", access_group: {group}")?;
        }
        write!(f, ", accessibility: {}", self.accessibility)?;
        if let Some(policy) = &self.authentication_policy {
            write!(f, ", policy: {:?}", policy.flags())?;
        }
        if let Some(mode) = self.synchronization_mode() {
            write!(f, ", synchronization: {mode:?}")?;
        }
        if let Some(label) = &self.label {
            write!(f, ", label: {label}")?;
        }
        f.write_str("}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PromptContext;
    use crate::policy::PolicyFlags;

    #[test]
    fn defaults() {
        let cfg = Configuration::generic("svc").unwrap();
        assert_eq!(cfg.family(), Family::Generic);
        assert_eq!(cfg.accessibility(), Accessibility::AfterFirstUnlock);
        assert!(cfg.authentication_policy().is_none());
        assert!(cfg.synchronization_mode().is_none());
        assert!(!cfg.skip_authentication_ui());
        assert!(cfg.label().is_none());
    }

    #[test]
    fn empty_scope_is_rejected() {
        assert!(matches!(
            Configuration::generic(""),
            Err(KeychainError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            Configuration::network("   "),
            Err(KeychainError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn with_calls_never_mutate_the_parent() {
        let base = Configuration::generic("svc").unwrap();
        let cfg_a = base.with_label("x");
        let cfg_b = cfg_a.with_label("y");

        assert_eq!(base.label(), None);
        assert_eq!(cfg_a.label(), Some("x"));
        assert_eq!(cfg_b.label(), Some("y"));
        assert_ne!(cfg_a, cfg_b);
    }

    #[test]
    fn same_chain_gives_equal_configurations() {
        let ctx = ContextHandle::new(PromptContext::new());
        let build = || {
            Configuration::generic("svc")
                .unwrap()
                .with_access_group("group")
                .with_label("l")
                .with_authentication_context(ctx.clone())
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn family_is_fixed() {
        let generic = Configuration::generic("svc").unwrap();
        let err = generic.with_port(443).unwrap_err();
        assert!(matches!(
            err,
            KeychainError::FamilyMismatch {
                expected: Family::Network,
                actual: Family::Generic,
                ..
            }
        ));

        let network = Configuration::network("example.com").unwrap();
        assert!(network.with_service("svc").is_err());
        assert_eq!(network.with_label("l").family(), Family::Network);
    }

    #[test]
    fn network_builders_fill_scope() {
        let cfg = Configuration::network("example.com")
            .unwrap()
            .with_server(
                "mail.example.com",
                Some(InternetProtocol::Imaps),
                Some(InternetAuthenticationType::Default),
            )
            .unwrap()
            .with_port(993)
            .unwrap()
            .with_path("/inbox")
            .unwrap()
            .with_security_domain("EXAMPLE")
            .unwrap();

        match cfg.scope() {
            Scope::Network(scope) => {
                assert_eq!(scope.server, "mail.example.com");
                assert_eq!(scope.protocol, Some(InternetProtocol::Imaps));
                assert_eq!(scope.port, Some(993));
                assert_eq!(scope.path.as_deref(), Some("/inbox"));
                assert_eq!(scope.security_domain.as_deref(), Some("EXAMPLE"));
            }
            Scope::Generic(_) => panic!("expected a network scope"),
        }
    }

    #[test]
    fn any_synchronization_wins_over_boolean() {
        let cfg = Configuration::generic("svc")
            .unwrap()
            .with_any_synchronization()
            .with_synchronizable(true);
        assert_eq!(cfg.synchronization_mode(), Some(SynchronizationMode::Any));

        let local = cfg.with_synchronization_mode(SynchronizationMode::LocalOnly);
        assert_eq!(
            local.synchronization_mode(),
            Some(SynchronizationMode::LocalOnly)
        );
    }

    #[test]
    fn policy_builder_sets_accessibility() {
        let cfg = Configuration::generic("svc").unwrap().with_authentication_policy(
            Accessibility::WhenPasscodeSetThisDeviceOnly,
            AuthenticationPolicy::new(PolicyFlags::USER_PRESENCE),
        );
        assert_eq!(
            cfg.accessibility(),
            Accessibility::WhenPasscodeSetThisDeviceOnly
        );
        assert!(cfg.authentication_policy().is_some());
    }

    #[test]
    fn display_is_a_summary() {
        let cfg = Configuration::generic("svc")
            .unwrap()
            .with_access_group("team.group")
            .with_label("work");
        let text = cfg.to_string();
        assert!(text.starts_with("generic{service: svc"));
        assert!(text.contains("access_group: team.group"));
        assert!(text.contains("label: work"));
    }
}
