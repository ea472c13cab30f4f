//! Subscription registry: the live shared-attribute watch set
//!
//! Records which attribute keys the device expects pushed on change and
//! gates inbound pushes on an active subscription. Subscriptions never
//! survive a connection loss: the controller resets the registry on
//! disconnect and activates a fresh one after every reconnect.

use crate::attributes::{AttributeKey, AttributeSet};
use std::collections::BTreeSet;
use tracing::debug;

/// The set of watched attribute keys for the current connection
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    watched: BTreeSet<AttributeKey>,
    active: bool,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully established subscription
    ///
    /// Replaces any prior watch set wholesale; the transport-level
    /// subscribe must already have succeeded.
    pub fn activate(&mut self, keys: BTreeSet<AttributeKey>) {
        debug!(keys = keys.len(), "Subscription activated");
        self.watched = keys;
        self.active = true;
    }

    /// Drop the subscription on connection loss
    pub fn reset(&mut self) {
        if self.active {
            debug!("Subscription reset");
        }
        self.watched.clear();
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn watched(&self) -> &BTreeSet<AttributeKey> {
        &self.watched
    }

    /// Dispatch an inbound push
    ///
    /// Returns the full set unconditionally while a subscription is
    /// active — the consumer filters by key — and `None` when no
    /// subscription exists (push arrived outside a synced connection).
    pub fn filter_push<'a>(&self, set: &'a AttributeSet) -> Option<&'a AttributeSet> {
        if self.active {
            Some(set)
        } else {
            debug!("Dropping push without active subscription");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttributeValue;

    fn key(name: &str) -> AttributeKey {
        AttributeKey::new(name).unwrap()
    }

    fn watch(names: &[&str]) -> BTreeSet<AttributeKey> {
        names.iter().map(|n| key(n)).collect()
    }

    #[test]
    fn test_activate_records_watch_set() {
        let mut registry = SubscriptionRegistry::new();
        registry.activate(watch(&["ledState"]));

        assert!(registry.is_active());
        assert!(registry.watched().contains(&key("ledState")));
        assert_eq!(registry.watched().len(), 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut registry = SubscriptionRegistry::new();
        registry.activate(watch(&["ledState"]));
        registry.reset();

        assert!(!registry.is_active());
        assert!(registry.watched().is_empty());
    }

    #[test]
    fn test_reactivation_replaces_stale_set() {
        let mut registry = SubscriptionRegistry::new();
        registry.activate(watch(&["oldKey", "ledState"]));
        registry.reset();
        registry.activate(watch(&["ledState"]));

        // Exactly the configured watch set, nothing stale
        assert_eq!(registry.watched(), &watch(&["ledState"]));
    }

    #[test]
    fn test_push_dispatched_unfiltered_while_active() {
        let mut registry = SubscriptionRegistry::new();
        registry.activate(watch(&["ledState"]));

        let mut set = AttributeSet::new();
        set.insert(key("ledState"), AttributeValue::Bool(true));
        set.insert(key("unrelated"), AttributeValue::Bool(false));

        let dispatched = registry.filter_push(&set).expect("push should dispatch");
        assert_eq!(dispatched.len(), 2, "full set passes through; consumer filters");
    }

    #[test]
    fn test_push_dropped_without_subscription() {
        let registry = SubscriptionRegistry::new();
        let mut set = AttributeSet::new();
        set.insert(key("ledState"), AttributeValue::Bool(true));

        assert!(registry.filter_push(&set).is_none());
    }
}
