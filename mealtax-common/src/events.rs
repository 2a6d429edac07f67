//! Audit event types and in-process event bus
//!
//! Every audit event written by the classification pipeline is also
//! broadcast on an [`EventBus`] so that in-process observers (CLI progress,
//! tests) can follow a run without polling the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Audit events emitted around meal classification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A meal row was stored
    MealCreated { meal_id: String },

    /// Classification run started (before the extraction call)
    MealTaxonomyStarted { meal_id: String },

    /// Extraction call succeeded
    MealTaxonomyExtracted {
        meal_id: String,
        items: usize,
        prompt_version: String,
    },

    /// All items linked and persisted
    MealTaxonomyLinked {
        meal_id: String,
        items: usize,
        /// Score of the first-ranked category per item (0.0 when none)
        top1_scores: Vec<f64>,
        prompt_version: String,
    },

    /// Run aborted; nothing persisted for this run
    MealTaxonomyFailed {
        meal_id: String,
        error: String,
        prompt_version: String,
    },
}

impl AuditEvent {
    /// Stable event type string stored in `event_audit.event_type`
    pub fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::MealCreated { .. } => "meal_created",
            AuditEvent::MealTaxonomyStarted { .. } => "meal_taxonomy_started",
            AuditEvent::MealTaxonomyExtracted { .. } => "meal_taxonomy_extracted",
            AuditEvent::MealTaxonomyLinked { .. } => "meal_taxonomy_linked",
            AuditEvent::MealTaxonomyFailed { .. } => "meal_taxonomy_failed",
        }
    }

    /// Meal the event refers to
    pub fn meal_id(&self) -> &str {
        match self {
            AuditEvent::MealCreated { meal_id }
            | AuditEvent::MealTaxonomyStarted { meal_id }
            | AuditEvent::MealTaxonomyExtracted { meal_id, .. }
            | AuditEvent::MealTaxonomyLinked { meal_id, .. }
            | AuditEvent::MealTaxonomyFailed { meal_id, .. } => meal_id,
        }
    }

    /// Payload without the type tag, as stored in `event_audit.payload_json`
    pub fn payload(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(obj) = value.as_object_mut() {
            obj.remove("event_type");
        }
        value
    }
}

/// Audit event with its owner and timestamp
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub user_id: String,
    pub event: AuditEvent,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(user_id: impl Into<String>, event: AuditEvent) -> Self {
        Self {
            user_id: user_id.into(),
            event,
            timestamp: Utc::now(),
        }
    }
}

/// Broadcast bus for audit records
///
/// Cloning is cheap; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AuditRecord>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use mealtax_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<AuditRecord> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        record: AuditRecord,
    ) -> Result<usize, broadcast::error::SendError<AuditRecord>> {
        self.tx.send(record)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, record: AuditRecord) {
        let _ = self.tx.send(record);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
