//! Radio abstraction for both BLE roles.
//!
//! Commands go out through [`Radio`]; their outcomes and every other
//! platform callback come back as [`RadioEvent`]s on a channel that the
//! service drains in delivery order.

use crate::error::Result;
use crate::gatt::GattService;
use crate::types::PeerId;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    // Central role
    Discovered { peer: PeerId, rssi: i16 },
    Connected { peer: PeerId },
    ConnectFailed { peer: PeerId, reason: String },
    ServicesDiscovered { peer: PeerId, characteristic_found: bool },
    Notification { peer: PeerId, value: Vec<u8> },
    Disconnected { peer: PeerId },

    // Peripheral role
    Subscribed { peer: PeerId },
    Unsubscribed { peer: PeerId },
    WriteReceived { peer: PeerId, value: Vec<u8> },
    ReadRequested { peer: PeerId },
}

/// Platform-agnostic BLE operations.
///
/// Calls return once the request is handed to the radio stack; completion
/// is reported through [`RadioEvent`].
#[async_trait]
pub trait Radio: Send + Sync {
    async fn start_scan(&self) -> Result<()>;

    async fn stop_scan(&self) -> Result<()>;

    async fn connect(&self, peer: &PeerId) -> Result<()>;

    async fn disconnect(&self, peer: &PeerId) -> Result<()>;

    /// Reports `ServicesDiscovered`
    async fn discover_services(&self, peer: &PeerId) -> Result<()>;

    /// Subscribe to notifications on the payment characteristic
    async fn subscribe(&self, peer: &PeerId) -> Result<()>;

    /// Write to the remote payment characteristic
    async fn write(&self, peer: &PeerId, value: &[u8]) -> Result<()>;

    async fn start_advertising(&self, service: &GattService) -> Result<()>;

    async fn stop_advertising(&self) -> Result<()>;

    /// Push a characteristic value to a subscribed central
    async fn notify(&self, peer: &PeerId, value: &[u8]) -> Result<()>;

    /// Answer a central's read of the payment characteristic
    async fn respond_read(&self, peer: &PeerId, value: &[u8]) -> Result<()>;
}
