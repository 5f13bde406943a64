//! Rerunner registry.

use hookbus_core::RerunnerId;

use crate::callback::Rerunner;
use crate::Event;

/// Rerunners of one event, in registration order.
///
/// Ids are unique within an event. Registering an id that is already present
/// swaps the callback but keeps the original position.
#[derive(Debug)]
pub(crate) struct RerunnerRegistry<E: Event, C> {
    entries: Vec<Rerunner<E, C>>,
}

impl<E: Event, C> Default for RerunnerRegistry<E, C> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<E: Event, C> RerunnerRegistry<E, C> {
    pub(crate) fn insert(&mut self, rerunner: Rerunner<E, C>) {
        match self.entries.iter_mut().find(|existing| existing.id() == rerunner.id()) {
            Some(existing) => *existing = rerunner,
            None => self.entries.push(rerunner),
        }
    }

    /// Returns whether a rerunner with `id` was registered.
    pub(crate) fn remove(&mut self, id: &RerunnerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|rerunner| rerunner.id() != id);
        self.entries.len() != before
    }

    pub(crate) fn snapshot(&self) -> Vec<Rerunner<E, C>> {
        self.entries.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
