//! Lifecycle stages and the model event bus.
//!
//! Every write runs a fixed sequence of stages. At each stage the entity's
//! own hook runs first, then the bus publishes `"<prefix><stage>"` (by
//! default `"model:beforeCreate"` and so on) to its subscribers.
//!
//! Subscribers are synchronous and can veto `before*` stages by returning
//! [`Flow::Cancel`]. Observers that only want to look can [`EventBus::watch`]
//! instead and receive owned [`EventRecord`]s over a channel.
//!
//! # Usage
//!
//! ```rust
//! use rowmodel_core::{EventBus, Flow, Stage};
//!
//! let bus = EventBus::new();
//! bus.subscribe(|event| {
//!     if event.stage == Stage::BeforeDelete && event.model == "Invoice" {
//!         Flow::Cancel
//!     } else {
//!         Flow::Continue
//!     }
//! });
//! ```

use crate::value::Row;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Default event name prefix.
pub const DEFAULT_EVENT_PREFIX: &str = "model:";

/// A point in an entity's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Before a create or an update.
    BeforeSave,
    /// Before an insert.
    BeforeCreate,
    /// Before an update.
    BeforeUpdate,
    /// Before a delete.
    BeforeDelete,
    /// After an insert.
    AfterCreate,
    /// After an update.
    AfterUpdate,
    /// After a create or an update.
    AfterSave,
    /// After a delete.
    AfterDelete,
    /// After an entity is hydrated from a stored row.
    AfterFetch,
}

impl Stage {
    /// The stage name, e.g. `"beforeCreate"`.
    pub fn name(self) -> &'static str {
        match self {
            Stage::BeforeSave => "beforeSave",
            Stage::BeforeCreate => "beforeCreate",
            Stage::BeforeUpdate => "beforeUpdate",
            Stage::BeforeDelete => "beforeDelete",
            Stage::AfterCreate => "afterCreate",
            Stage::AfterUpdate => "afterUpdate",
            Stage::AfterSave => "afterSave",
            Stage::AfterDelete => "afterDelete",
            Stage::AfterFetch => "afterFetch",
        }
    }

    /// Returns true if the stage can veto its operation.
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            Stage::BeforeSave | Stage::BeforeCreate | Stage::BeforeUpdate | Stage::BeforeDelete
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a hook or subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    /// Let the operation proceed.
    #[default]
    Continue,
    /// Abort the operation. Ignored at non-cancellable stages.
    Cancel,
}

impl Flow {
    /// Returns true for [`Flow::Cancel`].
    pub fn is_cancel(self) -> bool {
        self == Flow::Cancel
    }
}

/// An event as seen by subscribers.
#[derive(Debug, Clone, Copy)]
pub struct ModelEvent<'a> {
    /// Name of the model class.
    pub model: &'static str,
    /// The lifecycle stage.
    pub stage: Stage,
    /// The entity's current field values.
    pub fields: &'a Row,
}

/// An owned copy of a published event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// Publication order, starting at 1.
    pub sequence: u64,
    /// Full event name, e.g. `"model:afterCreate"`.
    pub name: String,
    /// Name of the model class.
    pub model: &'static str,
    /// The lifecycle stage.
    pub stage: Stage,
    /// The entity's field values at publication time.
    pub fields: Row,
}

/// Identifies a subscription for [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&ModelEvent<'_>) -> Flow + Send + Sync>;

/// Synchronous publish/subscribe bus for lifecycle events.
///
/// The bus:
/// - Runs subscribers in registration order on the publishing thread
/// - Stops at the first subscriber that cancels
/// - Copies every event to watchers and a bounded history
/// - Is thread-safe
pub struct EventBus {
    prefix: String,
    subscribers: RwLock<Vec<(SubscriptionId, Handler)>>,
    watchers: RwLock<Vec<Sender<EventRecord>>>,
    history: RwLock<Vec<EventRecord>>,
    max_history: usize,
    next_id: AtomicU64,
    sequence: AtomicU64,
}

impl EventBus {
    /// Creates a bus with the default prefix and history size.
    pub fn new() -> Self {
        Self::with_options(DEFAULT_EVENT_PREFIX, 1024)
    }

    /// Creates a bus with a custom event prefix and history limit.
    pub fn with_options(prefix: impl Into<String>, max_history: usize) -> Self {
        Self {
            prefix: prefix.into(),
            subscribers: RwLock::new(Vec::new()),
            watchers: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            max_history,
            next_id: AtomicU64::new(1),
            sequence: AtomicU64::new(0),
        }
    }

    /// Full event name for a stage.
    pub fn event_name(&self, stage: Stage) -> String {
        format!("{}{}", self.prefix, stage.name())
    }

    /// Registers a subscriber.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ModelEvent<'_>) -> Flow + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, Arc::new(handler)));
        id
    }

    /// Removes a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Returns a receiver for owned copies of all future events.
    pub fn watch(&self) -> Receiver<EventRecord> {
        let (tx, rx) = mpsc::channel();
        self.watchers.write().push(tx);
        rx
    }

    /// Publishes an event.
    ///
    /// Returns the last subscriber result, or `None` when nobody is
    /// subscribed. Publishing stops at the first [`Flow::Cancel`].
    pub fn publish(&self, event: &ModelEvent<'_>) -> Option<Flow> {
        self.record(event);

        // Handlers may subscribe; never hold the lock while calling them.
        let handlers: Vec<Handler> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        let mut last = None;
        for handler in handlers {
            let flow = handler(event);
            last = Some(flow);
            if flow.is_cancel() {
                break;
            }
        }
        last
    }

    fn record(&self, event: &ModelEvent<'_>) {
        let record = EventRecord {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            name: self.event_name(event.stage),
            model: event.model,
            stage: event.stage,
            fields: event.fields.clone(),
        };

        if self.max_history > 0 {
            let mut history = self.history.write();
            history.push(record.clone());
            if history.len() > self.max_history {
                let to_remove = history.len() - self.max_history;
                history.drain(0..to_remove);
            }
        }

        let mut watchers = self.watchers.write();
        watchers.retain(|tx| tx.send(record.clone()).is_ok());
    }

    /// Returns up to `limit` of the most recent events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<EventRecord> {
        let history = self.history.read();
        let start = history.len().saturating_sub(limit);
        history[start..].to_vec()
    }

    /// Sequence number of the last published event, 0 if none.
    pub fn latest_sequence(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Returns the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns the number of live watchers.
    pub fn watcher_count(&self) -> usize {
        self.watchers.read().len()
    }

    /// Drops all recorded history.
    pub fn clear_history(&self) {
        self.history.write().clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("prefix", &self.prefix)
            .field("subscribers", &self.subscriber_count())
            .field("watchers", &self.watcher_count())
            .field("latest_sequence", &self.latest_sequence())
            .finish()
    }
}
