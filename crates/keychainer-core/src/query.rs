//! Query compiler: turns a [`Configuration`] into action-specific bundles.
//!
//! Every function here is pure and deterministic. The only fallible step is
//! building the [`AccessControl`] artifact for an add, which rejects illegal
//! accessibility / policy combinations with
//! [`KeychainError::InvalidPolicy`](crate::error::KeychainError::InvalidPolicy).
//!
//! | Action   | Bundle                                                     |
//! |----------|------------------------------------------------------------|
//! | `Read`   | common query + UI-suppression term + context               |
//! | `Add`    | common query + access term + descriptive attributes        |
//! | `Update` | identity query (what to match)                             |
//! | `Delete` | identity query                                             |
//!
//! The identity query deliberately leaves out accessibility, policy, label
//! and comment so that an update or delete locates an item whatever its
//! protection settings are. The attributes written by an update come from
//! [`update_attributes`], which reuses the add fields.

use crate::bundle::{AttributeBundle, AttributeKey, AttributeValue};
use crate::config::{Configuration, Scope};
use crate::error::Result;
use crate::policy::{AccessControl, SynchronizationMode};

/// The four request shapes a vault understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Add,
    Update,
    Delete,
}

/// Compile the bundle for `action`.
///
/// For [`Action::Update`] this is the match query; use
/// [`update_attributes`] for the values to write.
pub fn compile(config: &Configuration, action: Action) -> Result<AttributeBundle> {
    match action {
        Action::Read => Ok(read_query(config)),
        Action::Add => add_query(config),
        Action::Update | Action::Delete => Ok(identity_query(config)),
    }
}

/// Compile the bundle for `action` and attach `key` as the account.
///
/// A `None` key leaves the account out, which matches every account in the
/// configured scope.
pub fn compile_for_key(
    config: &Configuration,
    action: Action,
    key: Option<&str>,
) -> Result<AttributeBundle> {
    let mut bundle = compile(config, action)?;
    bundle.insert_opt(AttributeKey::Account, key);
    Ok(bundle)
}

/// Class, access group, scope attributes, synchronization term, label and
/// comment.
pub fn common_query(config: &Configuration) -> AttributeBundle {
    let mut query = class_and_group(config);
    match config.scope() {
        Scope::Generic(scope) => {
            query.insert(AttributeKey::Service, scope.service.as_str());
            query.insert_opt(AttributeKey::Generic, scope.generic_data.clone());
        }
        Scope::Network(scope) => {
            query.insert(AttributeKey::Server, scope.server.as_str());
            query.insert_opt(AttributeKey::Path, scope.path.clone());
            query.insert_opt(AttributeKey::Port, scope.port.map(i64::from));
            query.insert_opt(AttributeKey::Protocol, scope.protocol.map(|p| p.as_code()));
            query.insert_opt(
                AttributeKey::AuthenticationType,
                scope.authentication_type.map(|t| t.as_code()),
            );
            query.insert_opt(AttributeKey::SecurityDomain, scope.security_domain.clone());
        }
    }
    insert_synchronization(&mut query, config);
    query.insert_opt(AttributeKey::Label, config.label());
    query.insert_opt(AttributeKey::Comment, config.comment());
    query
}

/// Minimal bundle that locates an item for update or delete.
pub fn identity_query(config: &Configuration) -> AttributeBundle {
    let mut query = class_and_group(config);
    match config.scope() {
        Scope::Generic(scope) => query.insert(AttributeKey::Service, scope.service.as_str()),
        Scope::Network(scope) => query.insert(AttributeKey::Server, scope.server.as_str()),
    }
    insert_synchronization(&mut query, config);
    query
}

/// Common query plus the terms that govern prompting during a search.
pub fn read_query(config: &Configuration) -> AttributeBundle {
    common_query(config).merge(search_only_terms(config))
}

/// Common query plus the access term and descriptive attributes.
pub fn add_query(config: &Configuration) -> Result<AttributeBundle> {
    let mut query = common_query(config).merge(access_term(config)?);
    query.insert_opt(AttributeKey::Description, config.description());
    query.insert_opt(AttributeKey::Type, config.type_tag().map(i64::from));
    Ok(query)
}

/// Attributes written by an update: the add fields that describe the item.
///
/// The class and the authentication context steer the request rather than
/// describe the item, and "any synchronization state" cannot be stored, so
/// those are left out.
pub fn update_attributes(config: &Configuration) -> Result<AttributeBundle> {
    let mut attributes = add_query(config)?;
    attributes.remove(AttributeKey::Class);
    attributes.remove(AttributeKey::UseAuthenticationContext);
    if matches!(
        attributes.get(AttributeKey::Synchronizable),
        Some(AttributeValue::SynchronizableAny)
    ) {
        attributes.remove(AttributeKey::Synchronizable);
    }
    Ok(attributes)
}

/// Existence probe for `key`: identity query plus the search-only terms.
///
/// Used by update and upsert before deciding which vault call to make.
pub fn probe_query(config: &Configuration, key: &str) -> AttributeBundle {
    identity_query(config)
        .merge(search_only_terms(config))
        .with(AttributeKey::Account, key)
}

/// Access-control artifact when a policy is set, plain accessibility
/// otherwise.
pub fn access_term(config: &Configuration) -> Result<AttributeBundle> {
    let mut term = AttributeBundle::new();
    match config.authentication_policy() {
        Some(policy) => {
            let access_control = AccessControl::new(config.accessibility(), policy)?;
            term.insert(AttributeKey::AccessControl, access_control);
            term.insert_opt(
                AttributeKey::UseAuthenticationContext,
                config.authentication_context().cloned(),
            );
        }
        None => term.insert(AttributeKey::Accessible, config.accessibility().as_code()),
    }
    Ok(term)
}

/// Terms only meaningful for searches: UI suppression and the context used
/// for any prompt the search triggers.
fn search_only_terms(config: &Configuration) -> AttributeBundle {
    let mut terms = AttributeBundle::new();
    if config.skip_authentication_ui() {
        terms.insert(
            AttributeKey::UseAuthenticationUi,
            AttributeValue::AuthenticationUiSkip,
        );
    }
    terms.insert_opt(
        AttributeKey::UseAuthenticationContext,
        config.authentication_context().cloned(),
    );
    terms
}

fn class_and_group(config: &Configuration) -> AttributeBundle {
    let mut bundle = AttributeBundle::new().with(AttributeKey::Class, config.family().class_code());
    bundle.insert_opt(AttributeKey::AccessGroup, config.access_group());
    bundle
}

fn insert_synchronization(bundle: &mut AttributeBundle, config: &Configuration) {
    match config.synchronization_mode() {
        Some(SynchronizationMode::Any) => {
            bundle.insert(AttributeKey::Synchronizable, AttributeValue::SynchronizableAny)
        }
        Some(mode) => bundle.insert_opt(AttributeKey::Synchronizable, mode.as_bool()),
        None => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
