use crate::error::{ProximityError, Result};
use crate::gatt::{GattService, PAYMENT_CHARACTERISTIC_UUID, PAYMENT_SERVICE_UUID};
use crate::radio::{Radio, RadioEvent};
use crate::types::PeerId;
use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use dashmap::DashMap;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Central-role radio backed by the host Bluetooth adapter.
///
/// btleplug has no peripheral mode, so advertising and notify calls fail
/// with [`ProximityError::BleError`]. Use a platform radio for the
/// merchant side.
pub struct BtleplugRadio {
    adapter: Adapter,
    peripherals: Arc<DashMap<PeerId, Peripheral>>,
    events: mpsc::UnboundedSender<RadioEvent>,
    connect_timeout: Duration,
}

impl BtleplugRadio {
    /// Open the first adapter and start pumping its events
    pub async fn new(
        connect_timeout: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RadioEvent>)> {
        let manager = Manager::new().await.map_err(|e| {
            ProximityError::BleError(format!("Failed to create BLE manager: {}", e))
        })?;

        let adapters = manager.adapters().await.map_err(|e| {
            ProximityError::BleError(format!("Failed to get BLE adapters: {}", e))
        })?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| ProximityError::BleError("No BLE adapter found".to_string()))?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let radio = Self {
            adapter,
            peripherals: Arc::new(DashMap::new()),
            events: events_tx,
            connect_timeout,
        };
        radio.spawn_event_pump().await?;
        Ok((radio, events_rx))
    }

    async fn spawn_event_pump(&self) -> Result<()> {
        let mut stream = self.adapter.events().await.map_err(|e| {
            ProximityError::BleError(format!("Failed to subscribe to adapter events: {}", e))
        })?;
        let adapter = self.adapter.clone();
        let peripherals = Arc::clone(&self.peripherals);
        let events = self.events.clone();

        tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        let peripheral = match adapter.peripheral(&id).await {
                            Ok(p) => p,
                            Err(e) => {
                                debug!("Peripheral {:?} vanished: {}", id, e);
                                continue;
                            }
                        };
                        let properties = match peripheral.properties().await {
                            Ok(Some(p)) => p,
                            _ => continue,
                        };
                        if !properties.services.contains(&PAYMENT_SERVICE_UUID) {
                            continue;
                        }
                        // Devices without an RSSI reading are dropped by the filter
                        let rssi = properties.rssi.unwrap_or(crate::types::INVALID_RSSI);
                        let peer = format!("{:?}", id);
                        peripherals.insert(peer.clone(), peripheral);
                        if events.send(RadioEvent::Discovered { peer, rssi }).is_err() {
                            break;
                        }
                    }
                    CentralEvent::DeviceDisconnected(id) => {
                        let peer = format!("{:?}", id);
                        if peripherals.contains_key(&peer)
                            && events.send(RadioEvent::Disconnected { peer }).is_err()
                        {
                            break;
                        }
                    }
                    _ => {}
                }
            }
            debug!("BLE adapter event stream ended");
        });
        Ok(())
    }

    fn peripheral(&self, peer: &PeerId) -> Result<Peripheral> {
        self.peripherals
            .get(peer)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ProximityError::PeerNotFound(peer.clone()))
    }

    fn payment_characteristic(peripheral: &Peripheral) -> Option<Characteristic> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == PAYMENT_CHARACTERISTIC_UUID && c.service_uuid == PAYMENT_SERVICE_UUID)
    }

    fn emit(&self, event: RadioEvent) {
        if self.events.send(event).is_err() {
            debug!("Radio event receiver dropped");
        }
    }

    fn peripheral_role_unsupported(operation: &str) -> ProximityError {
        warn!("{} requires peripheral mode, which btleplug does not provide", operation);
        ProximityError::BleError(format!("{} not supported in central-only mode", operation))
    }
}

#[async_trait]
impl Radio for BtleplugRadio {
    async fn start_scan(&self) -> Result<()> {
        info!("Starting BLE scan");
        let filter = ScanFilter {
            services: vec![PAYMENT_SERVICE_UUID],
        };
        self.adapter
            .start_scan(filter)
            .await
            .map_err(|e| ProximityError::BleError(format!("Failed to start BLE scan: {}", e)))
    }

    async fn stop_scan(&self) -> Result<()> {
        info!("Stopping BLE scan");
        self.adapter
            .stop_scan()
            .await
            .map_err(|e| ProximityError::BleError(format!("Failed to stop BLE scan: {}", e)))
    }

    async fn connect(&self, peer: &PeerId) -> Result<()> {
        let peripheral = self.peripheral(peer)?;
        let events = self.events.clone();
        let connect_timeout = self.connect_timeout;
        let peer = peer.clone();

        tokio::spawn(async move {
            let event = match tokio::time::timeout(connect_timeout, peripheral.connect()).await {
                Ok(Ok(())) => RadioEvent::Connected { peer },
                Ok(Err(e)) => RadioEvent::ConnectFailed {
                    peer,
                    reason: e.to_string(),
                },
                Err(_) => {
                    let error =
                        ProximityError::Timeout(format!("connect after {:?}", connect_timeout));
                    RadioEvent::ConnectFailed {
                        peer,
                        reason: error.to_string(),
                    }
                }
            };
            let _ = events.send(event);
        });
        Ok(())
    }

    async fn disconnect(&self, peer: &PeerId) -> Result<()> {
        let peripheral = self.peripheral(peer)?;
        peripheral
            .disconnect()
            .await
            .map_err(|e| ProximityError::ConnectionFailed(format!("Disconnect failed: {}", e)))
    }

    async fn discover_services(&self, peer: &PeerId) -> Result<()> {
        let peripheral = self.peripheral(peer)?;
        peripheral.discover_services().await.map_err(|e| {
            ProximityError::ConnectionFailed(format!("Service discovery failed: {}", e))
        })?;
        let characteristic_found = Self::payment_characteristic(&peripheral).is_some();
        self.emit(RadioEvent::ServicesDiscovered {
            peer: peer.clone(),
            characteristic_found,
        });
        Ok(())
    }

    async fn subscribe(&self, peer: &PeerId) -> Result<()> {
        let peripheral = self.peripheral(peer)?;
        let characteristic = Self::payment_characteristic(&peripheral)
            .ok_or_else(|| ProximityError::ConnectionFailed("Payment characteristic missing".to_string()))?;

        let mut notifications = peripheral.notifications().await.map_err(|e| {
            ProximityError::BleError(format!("Failed to open notification stream: {}", e))
        })?;
        peripheral
            .subscribe(&characteristic)
            .await
            .map_err(|e| ProximityError::ConnectionFailed(format!("Subscribe failed: {}", e)))?;

        let events = self.events.clone();
        let peer = peer.clone();
        tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != PAYMENT_CHARACTERISTIC_UUID {
                    continue;
                }
                let event = RadioEvent::Notification {
                    peer: peer.clone(),
                    value: notification.value,
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            debug!(peer = %peer, "Notification stream closed");
        });
        Ok(())
    }

    async fn write(&self, peer: &PeerId, value: &[u8]) -> Result<()> {
        let peripheral = self.peripheral(peer)?;
        let characteristic = Self::payment_characteristic(&peripheral)
            .ok_or_else(|| ProximityError::ConnectionFailed("Payment characteristic missing".to_string()))?;
        peripheral
            .write(&characteristic, value, WriteType::WithResponse)
            .await
            .map_err(|e| {
                error!(peer = %peer, "BLE write failed: {}", e);
                ProximityError::BleError(format!("Write failed: {}", e))
            })
    }

    async fn start_advertising(&self, _service: &GattService) -> Result<()> {
        Err(Self::peripheral_role_unsupported("Advertising"))
    }

    async fn stop_advertising(&self) -> Result<()> {
        Ok(())
    }

    async fn notify(&self, _peer: &PeerId, _value: &[u8]) -> Result<()> {
        Err(Self::peripheral_role_unsupported("Notify"))
    }

    async fn respond_read(&self, _peer: &PeerId, _value: &[u8]) -> Result<()> {
        Err(Self::peripheral_role_unsupported("Read response"))
    }
}
