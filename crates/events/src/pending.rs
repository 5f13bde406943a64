//! Pending queue: triggers issued while the bus is paused.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use hookbus_core::DispatchResult;

use crate::bus::HookBus;
use crate::callback::{BoxFuture, Listener};
use crate::Event;

type Replay<C> = Box<dyn FnOnce(HookBus<C>) -> BoxFuture<DispatchResult<()>> + Send>;

/// A trigger deferred until the bus is started again.
///
/// The payload and the optional trigger callback are captured in a type-erased
/// replay closure so events of every type can share one FIFO queue.
pub(crate) struct PendingEvent<C> {
    event_name: &'static str,
    queued_at: DateTime<Utc>,
    replay: Replay<C>,
}

impl<C: Send + 'static> PendingEvent<C> {
    pub(crate) fn new<E: Event>(payload: E::Payload, callback: Option<Listener<E, C>>) -> Self {
        Self {
            event_name: E::NAME,
            queued_at: Utc::now(),
            replay: Box::new(move |bus: HookBus<C>| -> BoxFuture<DispatchResult<()>> {
                Box::pin(async move { bus.dispatch::<E>(payload, callback).await })
            }),
        }
    }
}

impl<C> PendingEvent<C> {
    pub(crate) fn event_name(&self) -> &'static str {
        self.event_name
    }

    pub(crate) fn summary(&self) -> PendingSummary {
        PendingSummary {
            event_name: self.event_name,
            queued_at: self.queued_at,
        }
    }

    /// Dispatch the deferred trigger on `bus`.
    pub(crate) fn replay(self, bus: HookBus<C>) -> BoxFuture<DispatchResult<()>> {
        (self.replay)(bus)
    }
}

impl<C> core::fmt::Debug for PendingEvent<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PendingEvent")
            .field("event_name", &self.event_name)
            .field("queued_at", &self.queued_at)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a queued trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PendingSummary {
    pub event_name: &'static str,
    pub queued_at: DateTime<Utc>,
}

/// FIFO buffer of deferred triggers.
#[derive(Debug)]
pub(crate) struct PendingQueue<C> {
    events: VecDeque<PendingEvent<C>>,
}

impl<C> Default for PendingQueue<C> {
    fn default() -> Self {
        Self {
            events: VecDeque::new(),
        }
    }
}

impl<C> PendingQueue<C> {
    pub(crate) fn push(&mut self, event: PendingEvent<C>) {
        self.events.push_back(event);
    }

    /// Drain the queue, leaving it empty for triggers issued during the flush.
    pub(crate) fn take(&mut self) -> VecDeque<PendingEvent<C>> {
        std::mem::take(&mut self.events)
    }

    /// Put an unfinished batch back ahead of anything queued since it was
    /// taken.
    pub(crate) fn restore_front(&mut self, mut batch: VecDeque<PendingEvent<C>>) {
        batch.append(&mut self.events);
        self.events = batch;
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn summaries(&self) -> Vec<PendingSummary> {
        self.events.iter().map(PendingEvent::summary).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::define_events! {
        Tick => u32,
    }

    fn names(queue: &PendingQueue<()>) -> Vec<&'static str> {
        queue.events.iter().map(PendingEvent::event_name).collect()
    }

    #[test]
    fn take_leaves_queue_empty() {
        let mut queue = PendingQueue::<()>::default();
        queue.push(PendingEvent::new::<Tick>(1, None));
        queue.push(PendingEvent::new::<Tick>(2, None));

        let batch = queue.take();

        assert_eq!(batch.len(), 2);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn restored_batch_goes_before_newer_events() {
        let mut queue = PendingQueue::<()>::default();
        queue.push(PendingEvent::new::<Tick>(1, None));
        let batch = queue.take();

        crate::define_events! {
            Late => (),
        }
        queue.push(PendingEvent::new::<Late>((), None));
        queue.restore_front(batch);

        assert_eq!(names(&queue), vec!["Tick", "Late"]);
    }

    #[test]
    fn summaries_report_name_and_time() {
        let before = Utc::now();
        let mut queue = PendingQueue::<()>::default();
        queue.push(PendingEvent::new::<Tick>(7, None));

        let summaries = queue.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].event_name, "Tick");
        assert!(summaries[0].queued_at >= before);
    }
}
