//! Timeline cursor over the scenario's event ordering.
//!
//! The cursor selects which prefix of history is in scope: everything from
//! the first event up to and including the current one. It is positioned
//! at the latest event on construction; [`TimelineCursor::unpositioned`]
//! builds one that sits before the first event until the first `next()`.

use tardis_types::EventId;

/// A clamped, seekable position in an ordered list of event IDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineCursor {
    ordering: Vec<EventId>,
    /// `None` only while unpositioned or when the timeline is empty.
    index: Option<usize>,
}

impl TimelineCursor {
    /// A cursor viewing the latest event of `ordering`.
    pub fn new(ordering: Vec<EventId>) -> Self {
        let index = ordering.len().checked_sub(1);
        Self { ordering, index }
    }

    /// A cursor that sits before the first event until `next()` is called.
    pub const fn unpositioned(ordering: Vec<EventId>) -> Self {
        Self {
            ordering,
            index: None,
        }
    }

    /// Step forward one event, stopping at the last.
    pub fn next(&mut self) {
        let Some(last) = self.last_index() else {
            return;
        };
        let next = self.index.map_or(0, |i| i.saturating_add(1));
        self.index = Some(next.min(last));
    }

    /// Step back one event, stopping at the first.
    pub fn previous(&mut self) {
        if self.ordering.is_empty() {
            return;
        }
        self.index = Some(self.index.map_or(0, |i| i.saturating_sub(1)));
    }

    /// Jump to `event_id`. Unknown IDs leave the cursor where it is.
    ///
    /// Returns whether the cursor moved to the requested event.
    pub fn go_to(&mut self, event_id: &EventId) -> bool {
        let Some(i) = self.ordering.iter().position(|id| id == event_id) else {
            return false;
        };
        self.index = Some(i);
        true
    }

    /// The event under the cursor.
    pub fn current(&self) -> Option<&EventId> {
        self.index.and_then(|i| self.ordering.get(i))
    }

    /// The current position, if positioned.
    pub const fn index(&self) -> Option<usize> {
        self.index
    }

    /// The event IDs from the start of the timeline up to and including
    /// the current one, in chronological order.
    pub fn events_up_to_current(&self) -> Vec<EventId> {
        self.index
            .and_then(|i| self.ordering.get(..=i))
            .map(<[EventId]>::to_vec)
            .unwrap_or_default()
    }

    /// The full ordering the cursor moves over.
    pub fn ordering(&self) -> &[EventId] {
        &self.ordering
    }

    /// Number of events in the timeline.
    pub fn len(&self) -> usize {
        self.ordering.len()
    }

    /// Whether the timeline has no events.
    pub fn is_empty(&self) -> bool {
        self.ordering.is_empty()
    }

    fn last_index(&self) -> Option<usize> {
        self.ordering.len().checked_sub(1)
    }
}
