//! Event types and EventBus for the NGO site services
//!
//! Events are broadcast on a `tokio::sync::broadcast` channel and can be
//! serialized for SSE transmission to the admin UI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Media slot service events
///
/// Slot coordinates are carried as their wire strings so that consumers do
/// not depend on the media crate's domain types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MediaEvent {
    /// An upload wizard moved between steps (drives the step indicator)
    WizardStepChanged {
        wizard_id: Uuid,
        old_step: String,
        new_step: String,
        timestamp: DateTime<Utc>,
    },

    /// Fractional blob upload progress (0.0 - 1.0)
    UploadProgress {
        wizard_id: Option<Uuid>,
        file_name: String,
        fraction: f64,
        timestamp: DateTime<Utc>,
    },

    /// A picture was created in a free slot
    PictureCreated {
        picture_id: Uuid,
        page: String,
        category: Option<String>,
        slot_number: u32,
        asset_url: String,
        timestamp: DateTime<Utc>,
    },

    /// An occupied slot's asset was replaced
    PictureReplaced {
        picture_id: Uuid,
        page: String,
        category: Option<String>,
        slot_number: u32,
        old_asset_url: String,
        new_asset_url: String,
        timestamp: DateTime<Utc>,
    },

    /// A picture was deleted, freeing its slot
    PictureDeleted {
        picture_id: Uuid,
        page: String,
        category: Option<String>,
        slot_number: u32,
        timestamp: DateTime<Utc>,
    },

    /// A create lost the race for a slot
    SlotConflict {
        wizard_id: Option<Uuid>,
        page: String,
        category: Option<String>,
        slot_number: u32,
        timestamp: DateTime<Utc>,
    },
}

impl MediaEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            MediaEvent::WizardStepChanged { .. } => "WizardStepChanged",
            MediaEvent::UploadProgress { .. } => "UploadProgress",
            MediaEvent::PictureCreated { .. } => "PictureCreated",
            MediaEvent::PictureReplaced { .. } => "PictureReplaced",
            MediaEvent::PictureDeleted { .. } => "PictureDeleted",
            MediaEvent::SlotConflict { .. } => "SlotConflict",
        }
    }
}

/// Broadcast bus for [`MediaEvent`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MediaEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    ///
    /// ```
    /// use ngo_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<MediaEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: MediaEvent,
    ) -> Result<usize, broadcast::error::SendError<MediaEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: MediaEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
