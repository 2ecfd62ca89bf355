//! Asynchronous device events.
//!
//! The device pushes notifications (ready, button presses, mesh traffic,
//! connection changes, firmware-update progress) on the same UART line as
//! command responses. The IO task decodes them into [`BeaconEvent`]s and
//! publishes them on an [`EventBus`] backed by a [`tokio::sync::broadcast`]
//! channel. Slow subscribers may miss events under heavy load.

use tokio::sync::broadcast;

use crate::types::{MeshAck, Response};

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Response to a remote-management request delivered over the mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    /// Opcode of the command the remote node answered.
    pub opcode: u8,
    /// The answer, decoded as if it came from the local device.
    pub value: Response,
    /// Undecoded mesh payload as received.
    pub raw: String,
}

/// An event emitted by the device.
#[derive(Debug, Clone, PartialEq)]
pub enum BeaconEvent {
    /// The device finished booting. Delivered after a short settle delay.
    Ready(bool),

    /// The user button changed state.
    Button {
        pressed: bool,
        /// Firmware-defined event code (click, long press, ...).
        event_type: u8,
    },

    /// A mesh node acknowledged a message sent from this device.
    MeshAck {
        /// Mesh address of the acknowledging node.
        src: u16,
        /// Type of the message that was acknowledged.
        msg_type: u8,
        success: bool,
        crc16: u16,
    },

    /// A user message arrived over the mesh.
    MeshUser {
        src: u16,
        msg_type: u8,
        text: String,
    },

    /// A remote-management answer arrived over the mesh.
    MeshRemoteManagement {
        src: u16,
        msg_type: u8,
        response: RemoteResponse,
    },

    /// A central connected or disconnected.
    Connected {
        connected: bool,
        mac_address: Option<String>,
    },

    /// Firmware update failed.
    DfuError { raw: String },

    /// Firmware update wrote a block.
    DfuWritten { control_value: u32 },

    /// A BLE scan report.
    BleScanReport { raw: String },

    /// Free-form message from the firmware.
    Message { raw: String },

    /// An unsolicited payload could not be decoded.
    Error { message: String },
}

/// Discriminant of a [`BeaconEvent`], used to filter subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ready,
    Button,
    MeshAck,
    MeshUser,
    MeshRemoteManagement,
    Connected,
    DfuError,
    DfuWritten,
    BleScanReport,
    Message,
    Error,
}

impl BeaconEvent {
    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            BeaconEvent::Ready(_) => EventKind::Ready,
            BeaconEvent::Button { .. } => EventKind::Button,
            BeaconEvent::MeshAck { .. } => EventKind::MeshAck,
            BeaconEvent::MeshUser { .. } => EventKind::MeshUser,
            BeaconEvent::MeshRemoteManagement { .. } => EventKind::MeshRemoteManagement,
            BeaconEvent::Connected { .. } => EventKind::Connected,
            BeaconEvent::DfuError { .. } => EventKind::DfuError,
            BeaconEvent::DfuWritten { .. } => EventKind::DfuWritten,
            BeaconEvent::BleScanReport { .. } => EventKind::BleScanReport,
            BeaconEvent::Message { .. } => EventKind::Message,
            BeaconEvent::Error { .. } => EventKind::Error,
        }
    }
}

impl From<MeshAck> for BeaconEvent {
    fn from(ack: MeshAck) -> Self {
        BeaconEvent::MeshAck {
            src: ack.src,
            msg_type: ack.msg_type,
            success: ack.success,
            crc16: ack.crc16,
        }
    }
}

/// Publish/subscribe hub for [`BeaconEvent`]s.
///
/// Cloning an `EventBus` yields another handle to the same channel.
/// Dropping a receiver unsubscribes it.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BeaconEvent>,
}

impl EventBus {
    /// Create a bus with [`DEFAULT_EVENT_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        EventBus { tx }
    }

    /// Subscribe to every event.
    pub fn subscribe(&self) -> broadcast::Receiver<BeaconEvent> {
        self.tx.subscribe()
    }

    /// Subscribe to the listed event kinds only.
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            kinds: kinds.to_vec(),
        }
    }

    /// Publish an event. Returns the number of subscribers that received it.
    pub fn publish(&self, event: BeaconEvent) -> usize {
        tracing::trace!(kind = ?event.kind(), "publishing event");
        self.tx.send(event).unwrap_or(0)
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A receiver that only yields events of selected kinds.
pub struct EventSubscription {
    rx: broadcast::Receiver<BeaconEvent>,
    kinds: Vec<EventKind>,
}

impl EventSubscription {
    /// Wait for the next matching event.
    ///
    /// Lagged notifications are skipped; `None` is returned once the bus is closed.
    pub async fn recv(&mut self) -> Option<BeaconEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.kinds.contains(&event.kind()) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
