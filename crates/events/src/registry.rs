//! Registration store and order cache.
//!
//! Registrations for one event live in priority buckets:
//!
//! ```text
//! buckets: 1 => [a]        ordered: [a, c, d, b]
//!         10 => [c, d]
//!        100 => [b]
//! ```
//!
//! The flattened order is rebuilt on every add/remove, so a trigger only has
//! to clone an `Arc` to get a snapshot. An empty store keeps no ordered list
//! at all: "nothing registered" is a single `Option` check.

use std::collections::BTreeMap;
use std::sync::Arc;

use hookbus_core::Priority;

use crate::callback::SameCallback;

/// A callback together with the priority it was registered at.
#[derive(Debug, Clone)]
pub struct Registration<T> {
    pub callback: T,
    pub priority: Priority,
}

impl<T> Registration<T> {
    pub fn new(callback: T, priority: impl Into<Priority>) -> Self {
        Self {
            callback,
            priority: priority.into(),
        }
    }
}

/// A bare callback registers at [`Priority::DEFAULT`].
impl<T> From<T> for Registration<T> {
    fn from(callback: T) -> Self {
        Self::new(callback, Priority::DEFAULT)
    }
}

/// Priority-bucketed registrations of one kind for one event.
#[derive(Debug)]
pub(crate) struct Registry<T> {
    buckets: BTreeMap<Priority, Vec<T>>,
    ordered: Option<Arc<[T]>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            buckets: BTreeMap::new(),
            ordered: None,
        }
    }
}

impl<T> Registry<T>
where
    T: Clone + SameCallback,
{
    /// Append at the end of the registration's priority bucket.
    pub(crate) fn add(&mut self, registration: Registration<T>) {
        self.buckets
            .entry(registration.priority)
            .or_default()
            .push(registration.callback);
        self.recalculate();
    }

    /// Drop every registration of `callback`, at any priority.
    ///
    /// Returns how many were removed. Empty buckets are pruned.
    pub(crate) fn remove(&mut self, callback: &T) -> usize {
        let mut removed = 0;
        self.buckets.retain(|_, bucket| {
            let before = bucket.len();
            bucket.retain(|registered| !registered.same_callback(callback));
            removed += before - bucket.len();
            !bucket.is_empty()
        });

        if removed > 0 {
            self.recalculate();
        }
        removed
    }

    fn recalculate(&mut self) {
        self.ordered = if self.buckets.is_empty() {
            None
        } else {
            Some(self.buckets.values().flatten().cloned().collect())
        };
    }
}

impl<T> Registry<T> {
    /// Snapshot of the current dispatch order, `None` when empty.
    pub(crate) fn ordered(&self) -> Option<Arc<[T]>> {
        self.ordered.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.ordered.as_ref().map_or(0, |ordered| ordered.len())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ordered.is_none()
    }

    #[cfg(test)]
    fn priorities(&self) -> impl Iterator<Item = Priority> + '_ {
        self.buckets.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    /// Stand-in callback compared by its label.
    #[derive(Debug, Clone, PartialEq)]
    struct Cb(&'static str);

    impl SameCallback for Cb {
        fn same_callback(&self, other: &Self) -> bool {
            self.0 == other.0
        }
    }

    fn order(registry: &Registry<Cb>) -> Vec<&'static str> {
        registry
            .ordered()
            .map(|ordered| ordered.iter().map(|cb| cb.0).collect())
            .unwrap_or_default()
    }

    #[test]
    fn orders_by_priority_then_insertion() {
        let mut registry = Registry::default();
        registry.add(Registration::new(Cb("b"), 100));
        registry.add(Cb("c").into());
        registry.add(Registration::new(Cb("a"), 1));
        registry.add(Cb("d").into());

        assert_eq!(order(&registry), vec!["a", "c", "d", "b"]);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn removal_prunes_buckets_and_cache() {
        let mut registry = Registry::default();
        registry.add(Registration::new(Cb("a"), 1));
        registry.add(Cb("b").into());

        assert_eq!(registry.remove(&Cb("a")), 1);
        assert_eq!(registry.priorities().collect::<Vec<_>>(), vec![Priority::DEFAULT]);

        assert_eq!(registry.remove(&Cb("b")), 1);
        assert!(registry.is_empty());
        assert!(registry.ordered().is_none());
        assert_eq!(registry.priorities().count(), 0);
    }

    #[test]
    fn removes_every_registration_of_a_callback() {
        let mut registry = Registry::default();
        registry.add(Registration::new(Cb("a"), 1));
        registry.add(Cb("b").into());
        registry.add(Registration::new(Cb("a"), 50));

        assert_eq!(registry.remove(&Cb("a")), 2);
        assert_eq!(order(&registry), vec!["b"]);
    }

    #[test]
    fn removing_unknown_callback_is_a_noop() {
        let mut registry = Registry::default();
        registry.add(Cb("a").into());
        let before = registry.ordered().unwrap();

        assert_eq!(registry.remove(&Cb("zzz")), 0);
        assert!(Arc::ptr_eq(&before, &registry.ordered().unwrap()));
    }

    #[test]
    fn readding_goes_to_the_back_of_its_bucket() {
        let mut registry = Registry::default();
        registry.add(Cb("a").into());
        registry.add(Cb("b").into());
        registry.remove(&Cb("a"));
        registry.add(Cb("a").into());

        assert_eq!(order(&registry), vec!["b", "a"]);
    }

    #[test]
    fn snapshots_are_not_affected_by_later_mutation() {
        let mut registry = Registry::default();
        registry.add(Cb("a").into());
        let snapshot = registry.ordered().unwrap();

        registry.add(Registration::new(Cb("b"), 0));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(order(&registry), vec!["b", "a"]);
    }

    const NAMES: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

    #[derive(Debug, Clone)]
    enum Op {
        Add(usize, i32),
        Remove(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..NAMES.len(), -3i32..3).prop_map(|(name, priority)| Op::Add(name, priority)),
            (0..NAMES.len()).prop_map(Op::Remove),
        ]
    }

    proptest! {
        /// The order only reflects what is registered now, never how it got there.
        #[test]
        fn order_depends_only_on_live_registrations(ops in prop::collection::vec(op(), 0..40)) {
            let mut registry = Registry::default();
            // (priority, insertion sequence, name) of live registrations.
            let mut live: Vec<(i32, usize, &'static str)> = Vec::new();

            for (seq, op) in ops.into_iter().enumerate() {
                match op {
                    Op::Add(name, priority) => {
                        registry.add(Registration::new(Cb(NAMES[name]), priority));
                        live.push((priority, seq, NAMES[name]));
                    }
                    Op::Remove(name) => {
                        registry.remove(&Cb(NAMES[name]));
                        live.retain(|(_, _, n)| *n != NAMES[name]);
                    }
                }
            }

            live.sort();
            let expected: Vec<&'static str> = live.into_iter().map(|(_, _, name)| name).collect();
            prop_assert_eq!(order(&registry), expected);
            prop_assert_eq!(registry.is_empty(), registry.len() == 0);
        }
    }
}
