//! Event journal shared by the in-memory providers.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// One provider call observed by a memory provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// A scope was opened.
    Opened {
        /// Scope number.
        scope: u64,
        /// Read-only flag applied at open.
        read_only: bool,
        /// Isolation level applied at open.
        isolation: Option<String>,
    },
    /// A scope was committed.
    Committed {
        /// Scope number.
        scope: u64,
    },
    /// A scope was rolled back.
    RolledBack {
        /// Scope number.
        scope: u64,
    },
    /// A scope was closed.
    Closed {
        /// Scope number.
        scope: u64,
    },
    /// An injected failure fired.
    Injected {
        /// Which operation failed.
        operation: &'static str,
    },
}

impl Event {
    /// Scope number the event belongs to, if any.
    pub fn scope(&self) -> Option<u64> {
        match self {
            Event::Opened { scope, .. }
            | Event::Committed { scope }
            | Event::RolledBack { scope }
            | Event::Closed { scope } => Some(*scope),
            Event::Injected { .. } => None,
        }
    }
}

/// Append-only, thread-safe log of provider events.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Journal {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, event: Event) {
        self.events.lock().push(event);
    }

    /// Snapshot of every event in order.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Events for one scope, in order.
    pub fn events_for(&self, scope: u64) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.scope() == Some(scope))
            .cloned()
            .collect()
    }

    /// Removes every event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Number of scopes opened.
    pub fn opens(&self) -> usize {
        self.count(|e| matches!(e, Event::Opened { .. }))
    }

    /// Number of commits.
    pub fn commits(&self) -> usize {
        self.count(|e| matches!(e, Event::Committed { .. }))
    }

    /// Number of rollbacks.
    pub fn rollbacks(&self) -> usize {
        self.count(|e| matches!(e, Event::RolledBack { .. }))
    }

    /// Number of close calls.
    pub fn closes(&self) -> usize {
        self.count(|e| matches!(e, Event::Closed { .. }))
    }

    /// Number of injected failures that fired.
    pub fn injected(&self) -> usize {
        self.count(|e| matches!(e, Event::Injected { .. }))
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    /// Checks that every opened scope was settled once and closed once.
    ///
    /// Returns a description of the first violation found.
    pub fn verify_lifecycles(&self) -> Result<(), String> {
        let events = self.events();
        for scope in events.iter().filter_map(|e| match e {
            Event::Opened { scope, .. } => Some(*scope),
            _ => None,
        }) {
            let own: Vec<_> = events.iter().filter(|e| e.scope() == Some(scope)).collect();
            let settled = own
                .iter()
                .filter(|e| matches!(e, Event::Committed { .. } | Event::RolledBack { .. }))
                .count();
            let closed = own.iter().filter(|e| matches!(e, Event::Closed { .. })).count();
            if settled > 1 {
                return Err(format!("scope {scope} settled {settled} times"));
            }
            if closed != 1 {
                return Err(format!("scope {scope} closed {closed} times"));
            }
            if !matches!(own.last(), Some(Event::Closed { .. })) {
                return Err(format!("scope {scope} used after close"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_kind() {
        let journal = Journal::new();
        journal.record(Event::Opened {
            scope: 1,
            read_only: false,
            isolation: None,
        });
        journal.record(Event::Committed { scope: 1 });
        journal.record(Event::Closed { scope: 1 });
        assert_eq!(journal.opens(), 1);
        assert_eq!(journal.commits(), 1);
        assert_eq!(journal.closes(), 1);
        assert_eq!(journal.events_for(1).len(), 3);
        assert!(journal.verify_lifecycles().is_ok());
    }

    #[test]
    fn detects_double_close() {
        let journal = Journal::new();
        journal.record(Event::Opened {
            scope: 1,
            read_only: false,
            isolation: None,
        });
        journal.record(Event::Closed { scope: 1 });
        journal.record(Event::Closed { scope: 1 });
        assert!(journal.verify_lifecycles().is_err());
    }

    #[test]
    fn serializes_tagged() {
        let json = serde_json::to_string(&Event::Committed { scope: 3 }).unwrap();
        assert_eq!(json, r#"{"event":"committed","scope":3}"#);
    }
}
