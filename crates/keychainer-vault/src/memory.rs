//! In-memory vault with keychain matching semantics.
//!
//! [`MemoryVault`] stores items in a `Vec` behind a mutex and answers
//! queries the way the platform keychain does:
//!
//! - Every item attribute present in a query must match exactly.
//! - An absent synchronizable term matches only non-synchronized items; the
//!   "any" sentinel matches both.
//! - `insert` rejects an identity clash (class, access group, account,
//!   service or server, synchronizable) with `DUPLICATE_ITEM`.
//! - Searches that touch an item guarded by a user-interaction access control
//!   fail with `INTERACTION_NOT_ALLOWED` when the UI is suppressed, and
//!   otherwise "show a prompt" whose outcome is configurable.
//!
//! It is the backend used by the test suites and the fallback on platforms
//! without a native keychain.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use keychainer_core::{AttributeBundle, AttributeKey, AttributeValue, MatchLimit, VaultStatus};

use crate::backend::{VaultBackend, VaultResult};

/// Keys that together identify an item, besides the synchronizable flag.
const IDENTITY_KEYS: [AttributeKey; 5] = [
    AttributeKey::Class,
    AttributeKey::AccessGroup,
    AttributeKey::Account,
    AttributeKey::Service,
    AttributeKey::Server,
];

/// How a simulated authentication prompt is answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PromptOutcome {
    #[default]
    Approve,
    Cancel,
}

#[derive(Debug, Clone)]
struct StoredItem {
    attributes: AttributeBundle,
    data: Vec<u8>,
}

impl StoredItem {
    fn synchronizable(&self) -> bool {
        self.attributes
            .boolean(AttributeKey::Synchronizable)
            .unwrap_or(false)
    }

    fn requires_interaction(&self) -> bool {
        matches!(
            self.attributes.get(AttributeKey::AccessControl),
            Some(AttributeValue::AccessControl(access)) if access.requires_user_interaction()
        )
    }

    fn same_identity(&self, other: &StoredItem) -> bool {
        IDENTITY_KEYS
            .iter()
            .all(|&key| self.attributes.get(key) == other.attributes.get(key))
            && self.synchronizable() == other.synchronizable()
    }

    fn matches(&self, query: &AttributeBundle) -> bool {
        let sync_matches = match query.get(AttributeKey::Synchronizable) {
            Some(AttributeValue::SynchronizableAny) => true,
            Some(AttributeValue::Bool(wanted)) => self.synchronizable() == *wanted,
            Some(_) => false,
            None => !self.synchronizable(),
        };

        sync_matches
            && query
                .iter()
                .filter(|(key, _)| key.is_item_attribute() && *key != AttributeKey::Synchronizable)
                .all(|(key, value)| self.attributes.get(key) == Some(value))
    }

    /// The bundle a search returns for this item.
    fn project(&self, query: &AttributeBundle) -> AttributeBundle {
        let mut bundle = if query.boolean(AttributeKey::ReturnAttributes) == Some(true) {
            self.attributes.clone()
        } else {
            AttributeBundle::new()
        };
        if query.boolean(AttributeKey::ReturnData) == Some(true) {
            bundle.insert(AttributeKey::ValueData, self.data.clone());
        }
        bundle
    }
}

#[derive(Debug, Default)]
struct VaultState {
    items: Vec<StoredItem>,
    prompt_outcome: PromptOutcome,
    prompts_shown: usize,
}

impl VaultState {
    /// Run the simulated authentication for a search over `matched`.
    fn authenticate(&mut self, matched: &[usize], query: &AttributeBundle) -> VaultResult<()> {
        if !matched.iter().any(|&i| self.items[i].requires_interaction()) {
            return Ok(());
        }
        if matches!(
            query.get(AttributeKey::UseAuthenticationUi),
            Some(AttributeValue::AuthenticationUiSkip)
        ) {
            return Err(VaultStatus::INTERACTION_NOT_ALLOWED);
        }
        self.prompts_shown += 1;
        match self.prompt_outcome {
            PromptOutcome::Approve => Ok(()),
            PromptOutcome::Cancel => Err(VaultStatus::USER_CANCELED),
        }
    }

    fn matching(&self, query: &AttributeBundle) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.matches(query))
            .map(|(i, _)| i)
            .collect()
    }
}

/// A vault held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryVault {
    state: Mutex<VaultState>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every subsequent prompt with `outcome`.
    pub fn set_prompt_outcome(&self, outcome: PromptOutcome) {
        self.inspect().prompt_outcome = outcome;
    }

    /// Number of authentication prompts shown so far.
    pub fn prompts_shown(&self) -> usize {
        self.inspect().prompts_shown
    }

    pub fn len(&self) -> usize {
        self.inspect().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inspect().items.clear();
    }

    fn state(&self) -> VaultResult<MutexGuard<'_, VaultState>> {
        self.state.lock().map_err(|e| {
            tracing::error!(error = %e, "memory vault mutex poisoned");
            VaultStatus::NOT_AVAILABLE
        })
    }

    /// Lock for test inspection, recovering from poisoning.
    fn inspect(&self) -> MutexGuard<'_, VaultState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VaultBackend for MemoryVault {
    fn search(&self, query: &AttributeBundle) -> VaultResult<Vec<AttributeBundle>> {
        let mut state = self.state()?;
        let mut matched = state.matching(query);
        if matched.is_empty() {
            return Err(VaultStatus::ITEM_NOT_FOUND);
        }
        if !matches!(
            query.get(AttributeKey::MatchLimit),
            Some(AttributeValue::MatchLimit(MatchLimit::All))
        ) {
            matched.truncate(1);
        }
        state.authenticate(&matched, query)?;

        Ok(matched
            .into_iter()
            .map(|i| state.items[i].project(query))
            .collect())
    }

    fn insert(&self, attributes: &AttributeBundle) -> VaultResult<()> {
        if !attributes.contains_key(AttributeKey::Class) {
            return Err(VaultStatus::PARAM);
        }

        let now = Utc::now();
        let mut stored = attributes.filtered(|key| key.is_item_attribute());
        let synchronizable = attributes
            .boolean(AttributeKey::Synchronizable)
            .unwrap_or(false);
        stored.insert(AttributeKey::Synchronizable, synchronizable);
        stored.insert(AttributeKey::CreationDate, now);
        stored.insert(AttributeKey::ModificationDate, now);

        let item = StoredItem {
            attributes: stored,
            data: attributes
                .data(AttributeKey::ValueData)
                .map(<[u8]>::to_vec)
                .unwrap_or_default(),
        };

        let mut state = self.state()?;
        if state.items.iter().any(|existing| existing.same_identity(&item)) {
            return Err(VaultStatus::DUPLICATE_ITEM);
        }
        state.items.push(item);
        Ok(())
    }

    fn mutate(&self, query: &AttributeBundle, changes: &AttributeBundle) -> VaultResult<()> {
        let mut state = self.state()?;
        let matched = state.matching(query);
        if matched.is_empty() {
            return Err(VaultStatus::ITEM_NOT_FOUND);
        }

        let now = Utc::now();
        let mut updated = Vec::with_capacity(matched.len());
        for &i in &matched {
            let mut item = state.items[i].clone();
            for (key, value) in changes.iter() {
                match key {
                    AttributeKey::ValueData => {
                        if let AttributeValue::Data(bytes) = value {
                            item.data = bytes.clone();
                        }
                    }
                    AttributeKey::Accessible => {
                        item.attributes.remove(AttributeKey::AccessControl);
                        item.attributes.insert(key, value.clone());
                    }
                    AttributeKey::AccessControl => {
                        item.attributes.remove(AttributeKey::Accessible);
                        item.attributes.insert(key, value.clone());
                    }
                    AttributeKey::Synchronizable => {
                        if let AttributeValue::Bool(synced) = value {
                            item.attributes.insert(key, *synced);
                        }
                    }
                    AttributeKey::CreationDate | AttributeKey::Class => {}
                    key if key.is_item_attribute() => item.attributes.insert(key, value.clone()),
                    _ => {}
                }
            }
            item.attributes.insert(AttributeKey::ModificationDate, now);
            updated.push((i, item));
        }

        let clashes = updated.iter().any(|(_, item)| {
            state
                .items
                .iter()
                .enumerate()
                .any(|(j, other)| !matched.contains(&j) && other.same_identity(item))
        });
        if clashes {
            return Err(VaultStatus::DUPLICATE_ITEM);
        }

        for (i, item) in updated {
            state.items[i] = item;
        }
        Ok(())
    }

    fn erase(&self, query: &AttributeBundle) -> VaultResult<()> {
        let mut state = self.state()?;
        let before = state.items.len();
        state.items.retain(|item| !item.matches(query));
        if state.items.len() == before {
            return Err(VaultStatus::ITEM_NOT_FOUND);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keychainer_core::{AccessControl, Accessibility, AuthenticationPolicy};

    fn item(account: &str, data: &[u8]) -> AttributeBundle {
        AttributeBundle::new()
            .with(AttributeKey::Class, "genp")
            .with(AttributeKey::Service, "svc")
            .with(AttributeKey::Account, account)
            .with(AttributeKey::ValueData, data)
    }

    fn search_one(account: &str) -> AttributeBundle {
        AttributeBundle::new()
            .with(AttributeKey::Class, "genp")
            .with(AttributeKey::Service, "svc")
            .with(AttributeKey::Account, account)
            .with(AttributeKey::ReturnData, true)
            .with(AttributeKey::ReturnAttributes, true)
    }

    #[test]
    fn insert_then_search() {
        let vault = MemoryVault::new();
        vault.insert(&item("alice", b"pw")).unwrap();

        let found = vault.search(&search_one("alice")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].data(AttributeKey::ValueData), Some(b"pw".as_slice()));
        assert_eq!(found[0].text(AttributeKey::Account), Some("alice"));
        assert!(found[0].date(AttributeKey::CreationDate).is_some());
    }

    #[test]
    fn missing_item_is_not_found() {
        let vault = MemoryVault::new();
        assert_eq!(
            vault.search(&search_one("nobody")),
            Err(VaultStatus::ITEM_NOT_FOUND)
        );
        assert_eq!(
            vault.erase(&search_one("nobody")),
            Err(VaultStatus::ITEM_NOT_FOUND)
        );
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let vault = MemoryVault::new();
        vault.insert(&item("alice", b"one")).unwrap();
        assert_eq!(
            vault.insert(&item("alice", b"two")),
            Err(VaultStatus::DUPLICATE_ITEM)
        );
        // A different synchronization state is a different identity.
        vault
            .insert(&item("alice", b"synced").with(AttributeKey::Synchronizable, true))
            .unwrap();
        assert_eq!(vault.len(), 2);
    }

    #[test]
    fn absent_sync_term_matches_local_items_only() {
        let vault = MemoryVault::new();
        vault
            .insert(&item("alice", b"synced").with(AttributeKey::Synchronizable, true))
            .unwrap();

        assert_eq!(
            vault.search(&search_one("alice")),
            Err(VaultStatus::ITEM_NOT_FOUND)
        );
        let any = search_one("alice").with(
            AttributeKey::Synchronizable,
            AttributeValue::SynchronizableAny,
        );
        assert_eq!(vault.search(&any).unwrap().len(), 1);
    }

    #[test]
    fn match_limit_defaults_to_one() {
        let vault = MemoryVault::new();
        vault.insert(&item("a", b"1")).unwrap();
        vault.insert(&item("b", b"2")).unwrap();

        let scope = AttributeBundle::new()
            .with(AttributeKey::Class, "genp")
            .with(AttributeKey::Service, "svc");
        assert_eq!(vault.search(&scope).unwrap().len(), 1);
        let all = scope.with(AttributeKey::MatchLimit, MatchLimit::All);
        assert_eq!(vault.search(&all).unwrap().len(), 2);
    }

    #[test]
    fn mutate_rewrites_matching_items() {
        let vault = MemoryVault::new();
        vault.insert(&item("alice", b"old")).unwrap();

        let query = AttributeBundle::new()
            .with(AttributeKey::Class, "genp")
            .with(AttributeKey::Account, "alice");
        let changes = AttributeBundle::new()
            .with(AttributeKey::ValueData, b"new".as_slice())
            .with(AttributeKey::Label, "relabelled");
        vault.mutate(&query, &changes).unwrap();

        let found = vault.search(&search_one("alice")).unwrap();
        assert_eq!(found[0].data(AttributeKey::ValueData), Some(b"new".as_slice()));
        assert_eq!(found[0].text(AttributeKey::Label), Some("relabelled"));
    }

    #[test]
    fn protected_items_require_interaction() {
        let vault = MemoryVault::new();
        let access = AccessControl::new(
            Accessibility::WhenUnlocked,
            AuthenticationPolicy::user_presence(),
        )
        .unwrap();
        vault
            .insert(&item("alice", b"pw").with(AttributeKey::AccessControl, access))
            .unwrap();

        let skip = search_one("alice").with(
            AttributeKey::UseAuthenticationUi,
            AttributeValue::AuthenticationUiSkip,
        );
        assert_eq!(
            vault.search(&skip),
            Err(VaultStatus::INTERACTION_NOT_ALLOWED)
        );
        assert_eq!(vault.prompts_shown(), 0);

        assert!(vault.search(&search_one("alice")).is_ok());
        assert_eq!(vault.prompts_shown(), 1);

        vault.set_prompt_outcome(PromptOutcome::Cancel);
        assert_eq!(
            vault.search(&search_one("alice")),
            Err(VaultStatus::USER_CANCELED)
        );
    }

    #[test]
    fn insert_without_class_is_a_parameter_error() {
        let vault = MemoryVault::new();
        let bare = AttributeBundle::new().with(AttributeKey::Account, "x");
        assert_eq!(vault.insert(&bare), Err(VaultStatus::PARAM));
        assert!(vault.is_empty());
    }
}
