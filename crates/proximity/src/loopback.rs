//! In-process radio medium.
//!
//! Every endpoint created from one [`LoopbackMedium`] can discover,
//! connect to and exchange frames with the others. Discovery runs on a
//! timer and reports each advertiser at a configurable signal strength,
//! which makes it possible to exercise the whole handshake without
//! Bluetooth hardware.

use crate::error::{ProximityError, Result};
use crate::gatt::GattService;
use crate::radio::{Radio, RadioEvent};
use crate::types::PeerId;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Signal strength reported for an endpoint unless overridden
pub const DEFAULT_LOOPBACK_RSSI: i16 = -20;

struct Endpoint {
    events: mpsc::UnboundedSender<RadioEvent>,
    rssi: i16,
    scanning: bool,
    advertising: Option<GattService>,
    links: HashSet<PeerId>,
    subscribers: HashSet<PeerId>,
}

impl Endpoint {
    fn send(&self, event: RadioEvent) {
        if self.events.send(event).is_err() {
            trace!("Loopback endpoint receiver dropped");
        }
    }
}

#[derive(Clone, Default)]
pub struct LoopbackMedium {
    endpoints: Arc<Mutex<HashMap<PeerId, Endpoint>>>,
}

impl LoopbackMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new endpoint named `id`
    pub async fn endpoint(
        &self,
        id: impl Into<PeerId>,
    ) -> (LoopbackRadio, mpsc::UnboundedReceiver<RadioEvent>) {
        let id = id.into();
        let (events, receiver) = mpsc::unbounded_channel();
        self.endpoints.lock().await.insert(
            id.clone(),
            Endpoint {
                events,
                rssi: DEFAULT_LOOPBACK_RSSI,
                scanning: false,
                advertising: None,
                links: HashSet::new(),
                subscribers: HashSet::new(),
            },
        );
        let radio = LoopbackRadio {
            id,
            medium: self.clone(),
        };
        (radio, receiver)
    }

    /// Set how strongly other endpoints hear `id`
    pub async fn set_rssi(&self, id: &str, rssi: i16) {
        if let Some(endpoint) = self.endpoints.lock().await.get_mut(id) {
            endpoint.rssi = rssi;
        }
    }

    /// Run one discovery round: every scanning endpoint hears every other
    /// advertising endpoint once.
    pub async fn tick(&self) {
        let endpoints = self.endpoints.lock().await;
        let advertisers: Vec<(&PeerId, i16)> = endpoints
            .iter()
            .filter(|(_, e)| e.advertising.is_some())
            .map(|(id, e)| (id, e.rssi))
            .collect();

        for (scanner_id, scanner) in endpoints.iter().filter(|(_, e)| e.scanning) {
            for (advertiser_id, rssi) in &advertisers {
                if *advertiser_id == scanner_id {
                    continue;
                }
                scanner.send(RadioEvent::Discovered {
                    peer: (*advertiser_id).clone(),
                    rssi: *rssi,
                });
            }
        }
    }

    /// Tick discovery every `period` until the returned task is aborted
    pub fn spawn_discovery(&self, period: Duration) -> JoinHandle<()> {
        let medium = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                medium.tick().await;
            }
        })
    }
}

/// One device on a [`LoopbackMedium`]
pub struct LoopbackRadio {
    id: PeerId,
    medium: LoopbackMedium,
}

impl LoopbackRadio {
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    async fn linked<T>(
        &self,
        peer: &PeerId,
        f: impl FnOnce(&mut HashMap<PeerId, Endpoint>) -> Result<T>,
    ) -> Result<T> {
        let mut endpoints = self.medium.endpoints.lock().await;
        let linked = endpoints
            .get(&self.id)
            .map(|e| e.links.contains(peer))
            .unwrap_or(false);
        if !linked {
            return Err(ProximityError::ConnectionFailed(format!(
                "{} is not connected to {}",
                self.id, peer
            )));
        }
        f(&mut endpoints)
    }

    async fn update_self(&self, f: impl FnOnce(&mut Endpoint)) -> Result<()> {
        let mut endpoints = self.medium.endpoints.lock().await;
        let endpoint = endpoints
            .get_mut(&self.id)
            .ok_or_else(|| ProximityError::BleError(format!("{} detached", self.id)))?;
        f(endpoint);
        Ok(())
    }
}

#[async_trait]
impl Radio for LoopbackRadio {
    async fn start_scan(&self) -> Result<()> {
        self.update_self(|e| e.scanning = true).await
    }

    async fn stop_scan(&self) -> Result<()> {
        self.update_self(|e| e.scanning = false).await
    }

    async fn connect(&self, peer: &PeerId) -> Result<()> {
        let mut endpoints = self.medium.endpoints.lock().await;
        let reachable = endpoints
            .get(peer)
            .map(|e| e.advertising.is_some())
            .unwrap_or(false);

        let event = if reachable {
            if let Some(remote) = endpoints.get_mut(peer) {
                remote.links.insert(self.id.clone());
            }
            RadioEvent::Connected { peer: peer.clone() }
        } else {
            RadioEvent::ConnectFailed {
                peer: peer.clone(),
                reason: "peer is not advertising".to_string(),
            }
        };

        let local = endpoints
            .get_mut(&self.id)
            .ok_or_else(|| ProximityError::BleError(format!("{} detached", self.id)))?;
        if reachable {
            local.links.insert(peer.clone());
        }
        debug!(from = %self.id, to = %peer, connected = reachable, "Loopback connect");
        local.send(event);
        Ok(())
    }

    async fn disconnect(&self, peer: &PeerId) -> Result<()> {
        let mut endpoints = self.medium.endpoints.lock().await;
        let was_linked = endpoints
            .get_mut(&self.id)
            .map(|e| e.links.remove(peer))
            .unwrap_or(false);
        if !was_linked {
            return Ok(());
        }

        if let Some(remote) = endpoints.get_mut(peer) {
            remote.links.remove(&self.id);
            remote.subscribers.remove(&self.id);
            remote.send(RadioEvent::Disconnected {
                peer: self.id.clone(),
            });
        }
        if let Some(local) = endpoints.get_mut(&self.id) {
            local.subscribers.remove(peer);
            local.send(RadioEvent::Disconnected { peer: peer.clone() });
        }
        debug!(from = %self.id, to = %peer, "Loopback disconnect");
        Ok(())
    }

    async fn discover_services(&self, peer: &PeerId) -> Result<()> {
        let id = self.id.clone();
        self.linked(peer, |endpoints| {
            let characteristic_found = endpoints
                .get(peer)
                .map(|e| e.advertising.is_some())
                .unwrap_or(false);
            if let Some(local) = endpoints.get(&id) {
                local.send(RadioEvent::ServicesDiscovered {
                    peer: peer.clone(),
                    characteristic_found,
                });
            }
            Ok(())
        })
        .await
    }

    async fn subscribe(&self, peer: &PeerId) -> Result<()> {
        let id = self.id.clone();
        self.linked(peer, |endpoints| {
            let remote = endpoints
                .get_mut(peer)
                .ok_or_else(|| ProximityError::PeerNotFound(peer.clone()))?;
            remote.subscribers.insert(id.clone());
            remote.send(RadioEvent::Subscribed { peer: id });
            Ok(())
        })
        .await
    }

    async fn write(&self, peer: &PeerId, value: &[u8]) -> Result<()> {
        let id = self.id.clone();
        self.linked(peer, |endpoints| {
            let remote = endpoints
                .get(peer)
                .ok_or_else(|| ProximityError::PeerNotFound(peer.clone()))?;
            remote.send(RadioEvent::WriteReceived {
                peer: id,
                value: value.to_vec(),
            });
            Ok(())
        })
        .await
    }

    async fn start_advertising(&self, service: &GattService) -> Result<()> {
        let service = *service;
        self.update_self(|e| e.advertising = Some(service)).await
    }

    async fn stop_advertising(&self) -> Result<()> {
        self.update_self(|e| e.advertising = None).await
    }

    async fn notify(&self, peer: &PeerId, value: &[u8]) -> Result<()> {
        let endpoints = self.medium.endpoints.lock().await;
        let subscribed = endpoints
            .get(&self.id)
            .map(|e| e.subscribers.contains(peer))
            .unwrap_or(false);
        if !subscribed {
            return Err(ProximityError::PeerNotFound(peer.clone()));
        }
        if let Some(remote) = endpoints.get(peer) {
            remote.send(RadioEvent::Notification {
                peer: self.id.clone(),
                value: value.to_vec(),
            });
        }
        Ok(())
    }

    async fn respond_read(&self, peer: &PeerId, value: &[u8]) -> Result<()> {
        self.linked(peer, |_| {
            trace!(to = %peer, len = value.len(), "Loopback read served");
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatt::PAYMENT_SERVICE;

    #[tokio::test]
    async fn test_tick_reports_advertisers_to_scanners() {
        let medium = LoopbackMedium::new();
        let (merchant, _merchant_rx) = medium.endpoint("merchant").await;
        let (customer, mut customer_rx) = medium.endpoint("customer").await;

        medium.tick().await;
        assert!(customer_rx.try_recv().is_err());

        merchant.start_advertising(&PAYMENT_SERVICE).await.unwrap();
        customer.start_scan().await.unwrap();
        medium.set_rssi("merchant", -12).await;
        medium.tick().await;

        assert_eq!(
            customer_rx.try_recv().unwrap(),
            RadioEvent::Discovered {
                peer: "merchant".to_string(),
                rssi: -12
            }
        );
    }

    #[tokio::test]
    async fn test_connect_subscribe_and_exchange() {
        let medium = LoopbackMedium::new();
        let (merchant, mut merchant_rx) = medium.endpoint("merchant").await;
        let (customer, mut customer_rx) = medium.endpoint("customer").await;
        let merchant_id = "merchant".to_string();
        let customer_id = "customer".to_string();

        merchant.start_advertising(&PAYMENT_SERVICE).await.unwrap();
        customer.connect(&merchant_id).await.unwrap();
        assert_eq!(
            customer_rx.try_recv().unwrap(),
            RadioEvent::Connected {
                peer: merchant_id.clone()
            }
        );

        customer.subscribe(&merchant_id).await.unwrap();
        assert_eq!(
            merchant_rx.try_recv().unwrap(),
            RadioEvent::Subscribed {
                peer: customer_id.clone()
            }
        );

        merchant.notify(&customer_id, b"hello").await.unwrap();
        assert_eq!(
            customer_rx.try_recv().unwrap(),
            RadioEvent::Notification {
                peer: merchant_id.clone(),
                value: b"hello".to_vec()
            }
        );

        customer.write(&merchant_id, b"reply").await.unwrap();
        assert!(matches!(
            merchant_rx.try_recv().unwrap(),
            RadioEvent::WriteReceived { value, .. } if value == b"reply"
        ));

        customer.disconnect(&merchant_id).await.unwrap();
        assert_eq!(
            merchant_rx.try_recv().unwrap(),
            RadioEvent::Disconnected { peer: customer_id }
        );
        assert!(customer.write(&merchant_id, b"late").await.is_err());
    }

    #[tokio::test]
    async fn test_connect_to_silent_peer_fails() {
        let medium = LoopbackMedium::new();
        let (_merchant, _merchant_rx) = medium.endpoint("merchant").await;
        let (customer, mut customer_rx) = medium.endpoint("customer").await;

        customer.connect(&"merchant".to_string()).await.unwrap();
        assert!(matches!(
            customer_rx.try_recv().unwrap(),
            RadioEvent::ConnectFailed { .. }
        ));
    }
}
