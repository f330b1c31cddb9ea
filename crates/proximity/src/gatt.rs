// GATT Role Manager - advertiser side of the payment characteristic

use crate::codec::{CodecError, Frame, MessageCodec};
use crate::types::{PaymentRequestFrame, PeerId};
use std::collections::BTreeSet;
use tracing::{debug, info};
use uuid::Uuid;

/// Custom service UUID for tap-to-pay handshakes
pub const PAYMENT_SERVICE_UUID: Uuid = Uuid::from_bytes([
    0x7a, 0x3e, 0x50, 0x00, 0x1c, 0x4b, 0x4e, 0x2a, 0x9f, 0x61, 0x2d, 0x8c, 0x5b, 0x0e, 0x77, 0xa1,
]);

/// Read/write/notify characteristic carrying protocol frames
pub const PAYMENT_CHARACTERISTIC_UUID: Uuid = Uuid::from_bytes([
    0x7a, 0x3e, 0x50, 0x01, 0x1c, 0x4b, 0x4e, 0x2a, 0x9f, 0x61, 0x2d, 0x8c, 0x5b, 0x0e, 0x77, 0xa1,
]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattService {
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
}

pub const PAYMENT_SERVICE: GattService = GattService {
    service_uuid: PAYMENT_SERVICE_UUID,
    characteristic_uuid: PAYMENT_CHARACTERISTIC_UUID,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattAction {
    Advertise(GattService),
    StopAdvertising,
    Notify { peer: PeerId, value: Vec<u8> },
    /// Reply to a read; empty when nothing is published
    RespondRead { peer: PeerId, value: Vec<u8> },
}

/// Sole owner of the published service and its characteristic value
pub struct GattRoleManager {
    service: GattService,
    advertising: bool,
    subscribers: BTreeSet<PeerId>,
    /// Frame published before anyone subscribed
    pending: Option<Vec<u8>>,
    /// Current characteristic value served to reads
    value: Option<Vec<u8>>,
}

impl GattRoleManager {
    pub fn new() -> Self {
        Self::with_service(PAYMENT_SERVICE)
    }

    pub fn with_service(service: GattService) -> Self {
        Self {
            service,
            advertising: false,
            subscribers: BTreeSet::new(),
            pending: None,
            value: None,
        }
    }

    pub fn service(&self) -> GattService {
        self.service
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn start_advertising(&mut self) -> Vec<GattAction> {
        if self.advertising {
            return Vec::new();
        }
        info!(service = %self.service.service_uuid, "Advertising payment service");
        self.advertising = true;
        vec![GattAction::Advertise(self.service)]
    }

    /// Publish a request: notify current subscribers, or hold it until the
    /// first one arrives.
    pub fn publish(&mut self, request: &PaymentRequestFrame) -> Result<Vec<GattAction>, CodecError> {
        let value = MessageCodec::encode(&Frame::Request(request.clone()))?;
        let mut actions = self.start_advertising();
        self.value = Some(value.clone());

        if self.subscribers.is_empty() {
            debug!(request_id = ?request.request_id, "No subscriber yet, holding request");
            self.pending = Some(value);
        } else {
            self.pending = None;
            actions.extend(self.subscribers.iter().map(|peer| GattAction::Notify {
                peer: peer.clone(),
                value: value.clone(),
            }));
        }
        Ok(actions)
    }

    pub fn on_subscribe(&mut self, peer: PeerId) -> Vec<GattAction> {
        debug!(peer = %peer, "Central subscribed");
        self.subscribers.insert(peer.clone());
        match self.pending.take() {
            Some(value) => {
                info!(peer = %peer, "Flushing held request to new subscriber");
                vec![GattAction::Notify { peer, value }]
            }
            None => Vec::new(),
        }
    }

    pub fn on_unsubscribe(&mut self, peer: &PeerId) {
        if self.subscribers.remove(peer) {
            debug!(peer = %peer, "Central unsubscribed");
        }
    }

    /// Decode a write from a central. Malformed data yields `None`.
    pub fn on_write(&mut self, peer: &PeerId, value: &[u8]) -> Option<Frame> {
        match MessageCodec::decode(value) {
            Ok(frame) => {
                debug!(peer = %peer, tag = frame.tag(), "Decoded write");
                Some(frame)
            }
            Err(e) => {
                debug!(peer = %peer, error = %e, "Dropping malformed write");
                None
            }
        }
    }

    pub fn on_read(&self, peer: PeerId) -> Vec<GattAction> {
        let value = self.value.clone().unwrap_or_default();
        debug!(peer = %peer, len = value.len(), "Serving characteristic read");
        vec![GattAction::RespondRead { peer, value }]
    }

    /// Stop advertising and forget any undelivered frame
    pub fn stop(&mut self) -> Vec<GattAction> {
        self.pending = None;
        self.value = None;
        self.subscribers.clear();
        if !self.advertising {
            return Vec::new();
        }
        info!("Stopped advertising payment service");
        self.advertising = false;
        vec![GattAction::StopAdvertising]
    }
}

impl Default for GattRoleManager {
    fn default() -> Self {
        Self::new()
    }
}
