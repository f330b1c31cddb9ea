#![allow(dead_code)]

use async_trait::async_trait;
use proximity::gatt::GattService;
use proximity::session::{session_channels, SessionTimer, SessionWatchers};
use proximity::{
    HandshakeConfig, PaymentEvent, PaymentSessionManager, PeerId, ProximityError, Radio,
    RadioEvent, Result, WalletProvider,
};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    StartScan,
    StopScan,
    Connect(PeerId),
    Disconnect(PeerId),
    DiscoverServices(PeerId),
    Subscribe(PeerId),
    Write(PeerId, String),
    StartAdvertising,
    StopAdvertising,
    Notify(PeerId, String),
    RespondRead(PeerId, String),
}

/// Radio that records every command and never emits events on its own
#[derive(Default)]
pub struct MockRadio {
    calls: Mutex<Vec<RadioCall>>,
}

impl MockRadio {
    pub async fn calls(&self) -> Vec<RadioCall> {
        self.calls.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.calls.lock().await.clear();
    }

    pub async fn writes(&self) -> Vec<String> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|c| match c {
                RadioCall::Write(_, value) => Some(value),
                _ => None,
            })
            .collect()
    }

    pub async fn count(&self, call: &RadioCall) -> usize {
        self.calls().await.iter().filter(|c| *c == call).count()
    }

    async fn record(&self, call: RadioCall) -> Result<()> {
        self.calls.lock().await.push(call);
        Ok(())
    }
}

#[async_trait]
impl Radio for MockRadio {
    async fn start_scan(&self) -> Result<()> {
        self.record(RadioCall::StartScan).await
    }

    async fn stop_scan(&self) -> Result<()> {
        self.record(RadioCall::StopScan).await
    }

    async fn connect(&self, peer: &PeerId) -> Result<()> {
        self.record(RadioCall::Connect(peer.clone())).await
    }

    async fn disconnect(&self, peer: &PeerId) -> Result<()> {
        self.record(RadioCall::Disconnect(peer.clone())).await
    }

    async fn discover_services(&self, peer: &PeerId) -> Result<()> {
        self.record(RadioCall::DiscoverServices(peer.clone())).await
    }

    async fn subscribe(&self, peer: &PeerId) -> Result<()> {
        self.record(RadioCall::Subscribe(peer.clone())).await
    }

    async fn write(&self, peer: &PeerId, value: &[u8]) -> Result<()> {
        let text = String::from_utf8(value.to_vec())
            .map_err(|e| ProximityError::InternalError(e.to_string()))?;
        self.record(RadioCall::Write(peer.clone(), text)).await
    }

    async fn start_advertising(&self, _service: &GattService) -> Result<()> {
        self.record(RadioCall::StartAdvertising).await
    }

    async fn stop_advertising(&self) -> Result<()> {
        self.record(RadioCall::StopAdvertising).await
    }

    async fn notify(&self, peer: &PeerId, value: &[u8]) -> Result<()> {
        let text = String::from_utf8(value.to_vec())
            .map_err(|e| ProximityError::InternalError(e.to_string()))?;
        self.record(RadioCall::Notify(peer.clone(), text)).await
    }

    async fn respond_read(&self, peer: &PeerId, value: &[u8]) -> Result<()> {
        let text = String::from_utf8(value.to_vec())
            .map_err(|e| ProximityError::InternalError(e.to_string()))?;
        self.record(RadioCall::RespondRead(peer.clone(), text)).await
    }
}

/// Wallet that either always succeeds with a fixed hash or always fails
pub struct MockWallet {
    pub address: Option<String>,
    pub fail: bool,
    pub sent: AtomicUsize,
}

impl MockWallet {
    pub fn ok() -> Self {
        Self {
            address: Some("0xcustomer".to_string()),
            fail: false,
            sent: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::ok()
        }
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn send_transaction(&self, _amount: Decimal, _recipient: &str) -> anyhow::Result<String> {
        if self.fail {
            anyhow::bail!("insufficient funds");
        }
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok("0xhash".to_string())
    }

    fn current_address(&self) -> Option<String> {
        self.address.clone()
    }
}

pub struct Harness {
    pub session: PaymentSessionManager,
    pub radio: Arc<MockRadio>,
    pub wallet: Arc<MockWallet>,
    pub watchers: SessionWatchers,
    pub timers: mpsc::UnboundedReceiver<SessionTimer>,
}

impl Harness {
    pub fn new(wallet: MockWallet) -> Self {
        let radio = Arc::new(MockRadio::default());
        let wallet = Arc::new(wallet);
        let (outputs, watchers) = session_channels();
        let (timer_tx, timers) = mpsc::unbounded_channel();
        let session = PaymentSessionManager::new(
            HandshakeConfig::default(),
            radio.clone(),
            wallet.clone(),
            outputs,
            timer_tx,
        );
        Self {
            session,
            radio,
            wallet,
            watchers,
            timers,
        }
    }

    /// Scan, discover `peer` until connect-ready, and finish the link setup
    pub async fn link_up(&mut self, peer: &str) {
        self.session.start_scanning().await.unwrap();
        for _ in 0..4 {
            self.session
                .handle_radio_event(RadioEvent::Discovered {
                    peer: peer.to_string(),
                    rssi: -20,
                })
                .await;
        }
        self.session
            .handle_radio_event(RadioEvent::Connected {
                peer: peer.to_string(),
            })
            .await;
        self.session
            .handle_radio_event(RadioEvent::ServicesDiscovered {
                peer: peer.to_string(),
                characteristic_found: true,
            })
            .await;
    }

    pub async fn notify(&mut self, peer: &str, frame: &str) {
        self.session
            .handle_radio_event(RadioEvent::Notification {
                peer: peer.to_string(),
                value: frame.as_bytes().to_vec(),
            })
            .await;
    }

    /// Fire timers in deadline order until one matching `want` has been handled
    pub async fn fire_until(&mut self, want: impl Fn(&SessionTimer) -> bool) -> SessionTimer {
        loop {
            let timer = self.timers.recv().await.unwrap();
            self.session.handle_timer(timer).await;
            if want(&timer) {
                return timer;
            }
        }
    }

    pub fn drain_events(&mut self) -> Vec<PaymentEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.watchers.events.try_recv() {
            events.push(event);
        }
        events
    }
}
