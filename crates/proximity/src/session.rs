// Payment Session Manager - drives one payment exchange across both roles

use crate::codec::{Frame, MessageCodec, APPROVED, DECLINED, RESPONSE_TAG};
use crate::config::HandshakeConfig;
use crate::connection::{ConnectionController, LinkAction, LinkEvent};
use crate::dedup::DedupTracker;
use crate::error::{ErrorContext, ProximityError, Result};
use crate::gatt::{GattAction, GattRoleManager};
use crate::radio::{Radio, RadioEvent};
use crate::types::{
    ConnectionState, PaymentEvent, PaymentOutcome, PaymentRequestFrame, PaymentResponseFrame,
    PeerId, ProximitySample,
};
use crate::wallet::WalletProvider;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Where the local device is in the exchange
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    /// Advertiser holding a published request
    Broadcasting { request: PaymentRequestFrame },
    /// Scanner looking for a connect-ready advertiser
    Scanning,
    /// Scanner subscribed and waiting for a request
    Linked { peer: PeerId },
    /// A request is surfaced and needs approve/decline
    AwaitingDecision {
        peer: PeerId,
        request: PaymentRequestFrame,
    },
    /// Decision taken, response on its way
    Responding {
        peer: PeerId,
        request: PaymentRequestFrame,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Broadcasting { .. } => "broadcasting",
            SessionState::Scanning => "scanning",
            SessionState::Linked { .. } => "linked",
            SessionState::AwaitingDecision { .. } => "awaiting_decision",
            SessionState::Responding { .. } => "responding",
        }
    }

    fn in_scanner_exchange(&self) -> bool {
        matches!(
            self,
            SessionState::Linked { .. }
                | SessionState::AwaitingDecision { .. }
                | SessionState::Responding { .. }
        )
    }
}

/// Deferred work fed back into the session by its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTimer {
    /// Settle delay of teardown `seq` elapsed
    Settle { seq: u64 },
    /// No decision arrived for the request surfaced as `seq`
    DecisionTimeout { seq: u64 },
    /// Link `seq` became ready but never delivered a request
    LinkIdle { seq: u64 },
}

/// Sending half of everything the session publishes
pub struct SessionOutputs {
    pub events: mpsc::UnboundedSender<PaymentEvent>,
    pub received_message: watch::Sender<Option<Frame>>,
    pub connection_state: watch::Sender<ConnectionState>,
    pub in_range: watch::Sender<bool>,
}

/// Receiving half of [`SessionOutputs`]
pub struct SessionWatchers {
    pub events: mpsc::UnboundedReceiver<PaymentEvent>,
    pub received_message: watch::Receiver<Option<Frame>>,
    pub connection_state: watch::Receiver<ConnectionState>,
    pub in_range: watch::Receiver<bool>,
}

pub fn session_channels() -> (SessionOutputs, SessionWatchers) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (message_tx, message_rx) = watch::channel(None);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
    let (range_tx, range_rx) = watch::channel(false);
    (
        SessionOutputs {
            events: events_tx,
            received_message: message_tx,
            connection_state: state_tx,
            in_range: range_tx,
        },
        SessionWatchers {
            events: events_rx,
            received_message: message_rx,
            connection_state: state_rx,
            in_range: range_rx,
        },
    )
}

/// Top-level orchestrator for the tap-to-pay handshake.
///
/// Owns the link controller, the GATT role and the request gate. All inputs
/// (user commands, radio events, timers) must be fed in from one task; the
/// manager itself does no locking.
pub struct PaymentSessionManager {
    config: HandshakeConfig,
    radio: Arc<dyn Radio>,
    wallet: Arc<dyn WalletProvider>,
    controller: ConnectionController,
    gatt: GattRoleManager,
    dedup: Arc<DedupTracker>,
    outputs: SessionOutputs,
    timers: mpsc::UnboundedSender<SessionTimer>,
    state: SessionState,
    /// Incremented each time a request is surfaced for decision
    decision_seq: u64,
    /// Incremented each time a link becomes ready
    link_seq: u64,
    /// Incremented each time a teardown defers radio reuse
    settle_seq: u64,
    /// Radio reuse is deferred until `Settle` with this sequence fires
    settling: Option<u64>,
    /// The user asked to advertise; re-advertise after each answered request
    advertising_requested: bool,
}

impl PaymentSessionManager {
    pub fn new(
        config: HandshakeConfig,
        radio: Arc<dyn Radio>,
        wallet: Arc<dyn WalletProvider>,
        outputs: SessionOutputs,
        timers: mpsc::UnboundedSender<SessionTimer>,
    ) -> Self {
        Self {
            controller: ConnectionController::new(config.signal.clone()),
            gatt: GattRoleManager::new(),
            dedup: Arc::new(DedupTracker::new()),
            config,
            radio,
            wallet,
            outputs,
            timers,
            state: SessionState::Idle,
            decision_seq: 0,
            link_seq: 0,
            settle_seq: 0,
            settling: None,
            advertising_requested: false,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn dedup(&self) -> &Arc<DedupTracker> {
        &self.dedup
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.controller.state()
    }

    pub fn is_advertising(&self) -> bool {
        self.gatt.is_advertising()
    }

    pub fn is_scanning(&self) -> bool {
        self.controller.is_scanning()
    }

    // ---- User commands ----

    /// Enter continuous scanning. Connects automatically once a peer is
    /// stable and very close.
    pub async fn start_scanning(&mut self) -> Result<()> {
        if let SessionState::Broadcasting { .. } = self.state {
            return Err(ProximityError::InvalidState(
                "cannot scan while a payment request is being broadcast".to_string(),
            ));
        }
        if self.gatt.is_advertising() {
            self.advertising_requested = false;
            let actions = self.gatt.stop();
            self.apply_gatt_actions(actions).await;
        }

        self.settling = None;
        let mut actions = self.controller.start_scanning();
        if actions.is_empty()
            && self.state == SessionState::Idle
            && self.controller.state() == ConnectionState::Disconnected
        {
            // Already requested, but paused for the settle delay
            actions.push(LinkAction::StartScan);
        }
        self.apply_link_actions(actions).await;
        Ok(())
    }

    /// Leave continuous scanning. An established link is left alone.
    pub async fn stop_scanning(&mut self) -> Result<()> {
        let actions = self.controller.stop_scanning();
        if self.state == SessionState::Scanning {
            self.state = SessionState::Idle;
        }
        self.apply_link_actions(actions).await;
        Ok(())
    }

    /// Advertise the payment service without a request
    pub async fn start_advertising(&mut self) -> Result<()> {
        if self.state.in_scanner_exchange() {
            return Err(ProximityError::InvalidState(format!(
                "cannot advertise while {}",
                self.state.name()
            )));
        }
        self.leave_scanning().await;
        self.advertising_requested = true;
        self.settling = None;
        let actions = self.gatt.start_advertising();
        self.apply_gatt_actions(actions).await;
        Ok(())
    }

    /// Stop advertising and drop any published request
    pub async fn stop_advertising(&mut self) -> Result<()> {
        self.advertising_requested = false;
        let actions = self.gatt.stop();
        if let SessionState::Broadcasting { request } = &self.state {
            info!(request_id = ?request.request_id, "Payment request withdrawn");
            self.state = SessionState::Idle;
        }
        self.apply_gatt_actions(actions).await;
        Ok(())
    }

    /// Publish a payment request for the next subscribing scanner.
    ///
    /// Replaces any request already being broadcast.
    pub async fn broadcast_payment_request(
        &mut self,
        amount: Decimal,
        wallet_address: &str,
        note: Option<String>,
    ) -> Result<PaymentRequestFrame> {
        if self.state.in_scanner_exchange() {
            return Err(ProximityError::InvalidState(format!(
                "cannot broadcast while {}",
                self.state.name()
            )));
        }
        if amount <= Decimal::ZERO {
            return Err(ProximityError::InvalidInput(format!(
                "amount must be positive, got {}",
                amount
            )));
        }
        if wallet_address.trim().is_empty() {
            return Err(ProximityError::WalletUnavailable);
        }

        let request = PaymentRequestFrame::new(amount, wallet_address.trim(), note);
        let actions = self
            .gatt
            .publish(&request)
            .map_err(|e| ProximityError::InvalidInput(e.to_string()))?;

        self.leave_scanning().await;
        self.settling = None;
        self.outputs.received_message.send_replace(None);
        info!(
            request_id = ?request.request_id,
            amount = %request.amount,
            "Broadcasting payment request"
        );
        self.state = SessionState::Broadcasting {
            request: request.clone(),
        };
        self.apply_gatt_actions(actions).await;
        Ok(request)
    }

    /// Answer the request awaiting decision
    pub async fn send_payment_response(&mut self, approved: bool) -> Result<PaymentOutcome> {
        let (peer, request) = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::AwaitingDecision { peer, request } => (peer, request),
            other => {
                let message = format!("no request awaiting a decision ({})", other.name());
                self.state = other;
                return Err(ProximityError::InvalidState(message));
            }
        };

        self.state = SessionState::Responding {
            peer: peer.clone(),
            request: request.clone(),
        };

        let (response, outcome) = if approved {
            self.execute_payment(&peer, &request).await
        } else {
            info!(request_id = ?request.request_id, "Payment declined");
            (PaymentResponseFrame::declined(), PaymentOutcome::Declined)
        };

        self.finish_exchange(peer, request, response, outcome.clone())
            .await;
        Ok(outcome)
    }

    /// Drop the scanner link, if any
    pub async fn disconnect(&mut self) -> Result<()> {
        let actions = self.controller.disconnect();
        self.apply_link_actions(actions).await;
        Ok(())
    }

    /// Stop every role and release the radio
    pub async fn shutdown(&mut self) {
        let _ = self.stop_advertising().await;
        let _ = self.stop_scanning().await;
        let _ = self.disconnect().await;
        self.state = SessionState::Idle;
    }

    // ---- Inputs from the radio and timers ----

    pub async fn handle_radio_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::Discovered { peer, rssi } => {
                let actions = self.controller.handle(LinkEvent::Discovered {
                    peer,
                    sample: ProximitySample::now(rssi),
                });
                self.apply_link_actions(actions).await;
            }
            RadioEvent::Connected { peer } => {
                let actions = self.controller.handle(LinkEvent::Connected { peer });
                self.apply_link_actions(actions).await;
            }
            RadioEvent::ConnectFailed { peer, reason } => {
                debug!(peer = %peer, reason = %reason, "Radio reported connect failure");
                let actions = self.controller.handle(LinkEvent::ConnectFailed { peer });
                self.apply_link_actions(actions).await;
            }
            RadioEvent::ServicesDiscovered {
                peer,
                characteristic_found,
            } => {
                let actions = self.controller.handle(LinkEvent::ServicesDiscovered {
                    peer,
                    characteristic_found,
                });
                self.apply_link_actions(actions).await;
            }
            RadioEvent::Disconnected { peer } => {
                self.gatt.on_unsubscribe(&peer);
                let actions = self.controller.handle(LinkEvent::Disconnected { peer });
                self.apply_link_actions(actions).await;
            }
            RadioEvent::Notification { peer, value } => self.on_notification(peer, value).await,
            RadioEvent::Subscribed { peer } => {
                let actions = self.gatt.on_subscribe(peer);
                self.apply_gatt_actions(actions).await;
            }
            RadioEvent::Unsubscribed { peer } => self.gatt.on_unsubscribe(&peer),
            RadioEvent::WriteReceived { peer, value } => self.on_write(peer, value).await,
            RadioEvent::ReadRequested { peer } => {
                let actions = self.gatt.on_read(peer);
                self.apply_gatt_actions(actions).await;
            }
        }
    }

    pub async fn handle_timer(&mut self, timer: SessionTimer) {
        match timer {
            SessionTimer::Settle { seq } => self.on_settled(seq).await,
            SessionTimer::LinkIdle { seq } => self.on_link_idle(seq).await,
            SessionTimer::DecisionTimeout { seq } => {
                let expired = matches!(self.state, SessionState::AwaitingDecision { .. })
                    && seq == self.decision_seq;
                if !expired {
                    debug!(seq, "Ignoring stale decision timeout");
                    return;
                }
                if let SessionState::AwaitingDecision { peer, request } =
                    std::mem::replace(&mut self.state, SessionState::Idle)
                {
                    warn!(
                        peer = %peer,
                        request_id = ?request.request_id,
                        "No decision before timeout, declining"
                    );
                    self.state = SessionState::Responding {
                        peer: peer.clone(),
                        request: request.clone(),
                    };
                    self.finish_exchange(
                        peer,
                        request,
                        PaymentResponseFrame::declined(),
                        PaymentOutcome::TimedOut,
                    )
                    .await;
                }
            }
        }
    }

    // ---- Scanner side ----

    async fn on_notification(&mut self, peer: PeerId, value: Vec<u8>) {
        if self.controller.peer() != Some(&peer) || !self.controller.is_ready() {
            debug!(peer = %peer, "Notification outside an active link, ignoring");
            return;
        }

        let request = match MessageCodec::decode(&value) {
            Ok(Frame::Request(request)) => request,
            Ok(Frame::Response(_)) => {
                debug!(peer = %peer, "Scanner does not accept responses, ignoring");
                return;
            }
            Err(e) => {
                debug!(peer = %peer, error = %e, "Dropping malformed notification");
                return;
            }
        };

        self.accept_request(peer, request).await;
    }

    async fn accept_request(&mut self, peer: PeerId, request: PaymentRequestFrame) {
        match &self.state {
            SessionState::Linked { peer: linked } if *linked == peer => {}
            other => {
                debug!(
                    peer = %peer,
                    request_id = ?request.request_id,
                    state = other.name(),
                    "Not expecting a request, dropping"
                );
                return;
            }
        }

        let key = request.dedup_key();
        if !self.dedup.mark_if_new(&key) {
            // The advertiser is still publishing a request we already handled
            info!(peer = %peer, request_id = %key, "Request already processed, releasing link");
            self.begin_settle();
            let actions = self.controller.disconnect();
            self.apply_link_actions(actions).await;
            return;
        }

        info!(
            peer = %peer,
            request_id = %key,
            amount = %request.amount,
            "Payment request received"
        );
        self.decision_seq += 1;
        self.state = SessionState::AwaitingDecision {
            peer: peer.clone(),
            request: request.clone(),
        };
        self.outputs
            .received_message
            .send_replace(Some(Frame::Request(request.clone())));
        self.emit(PaymentEvent::RequestReceived { peer, request });
        self.schedule(
            SessionTimer::DecisionTimeout {
                seq: self.decision_seq,
            },
            self.config.decision_timeout,
        );
    }

    async fn execute_payment(
        &self,
        peer: &PeerId,
        request: &PaymentRequestFrame,
    ) -> (PaymentResponseFrame, PaymentOutcome) {
        match self
            .wallet
            .send_transaction(request.amount, &request.wallet_address)
            .await
        {
            Ok(hash) => {
                info!(request_id = ?request.request_id, tx = %hash, "Payment sent");
                let response = PaymentResponseFrame::approved(
                    request,
                    hash.clone(),
                    self.wallet.current_address(),
                );
                (
                    response,
                    PaymentOutcome::Approved {
                        transaction_hash: hash,
                    },
                )
            }
            Err(e) => {
                let error = ProximityError::TransactionFailed(e.to_string());
                let mut context = ErrorContext::new()
                    .with_peer_id(peer.as_str())
                    .with_state(self.state.name());
                if let Some(id) = &request.request_id {
                    context = context.with_request_id(id.as_str());
                }
                error.log_with_context(&context);
                (
                    PaymentResponseFrame::declined(),
                    PaymentOutcome::Failed {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }

    /// Write the response, report the outcome, then release the link
    async fn finish_exchange(
        &mut self,
        peer: PeerId,
        request: PaymentRequestFrame,
        response: PaymentResponseFrame,
        outcome: PaymentOutcome,
    ) {
        let bytes = encode_response_lossy(&response);
        if let Err(e) = self.radio.write(&peer, &bytes).await {
            warn!(peer = %peer, error = %e, "Failed to deliver payment response");
        }

        self.outputs.received_message.send_replace(None);
        self.emit(PaymentEvent::PaymentCompleted {
            request,
            outcome,
            completed_at: Utc::now(),
        });

        self.state = SessionState::Idle;
        self.begin_settle();
        let actions = self.controller.disconnect();
        self.apply_link_actions(actions).await;
    }

    fn on_link_closed(&mut self, peer: &PeerId) {
        match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::AwaitingDecision {
                peer: linked,
                request,
            } if linked == *peer => {
                warn!(peer = %peer, "Link lost before a decision was made");
                self.outputs.received_message.send_replace(None);
                self.emit(PaymentEvent::PaymentCompleted {
                    request,
                    outcome: PaymentOutcome::Failed {
                        reason: "link lost before a decision was made".to_string(),
                    },
                    completed_at: Utc::now(),
                });
            }
            SessionState::Linked { peer: linked } if linked == *peer => {}
            other => self.state = other,
        }
    }

    /// Release a link that was set up but never delivered a request
    async fn on_link_idle(&mut self, seq: u64) {
        let idle = matches!(self.state, SessionState::Linked { .. }) && seq == self.link_seq;
        if !idle {
            debug!(seq, "Ignoring stale link idle timer");
            return;
        }
        if let Some(peer) = self.controller.peer() {
            info!(peer = %peer, "No payment request on link, releasing it");
        }
        self.begin_settle();
        let actions = self.controller.disconnect();
        self.apply_link_actions(actions).await;
    }

    async fn leave_scanning(&mut self) {
        if !self.controller.is_scanning() {
            return;
        }
        let actions = self.controller.stop_scanning();
        if self.state == SessionState::Scanning {
            self.state = SessionState::Idle;
        }
        self.apply_link_actions(actions).await;
    }

    // ---- Advertiser side ----

    async fn on_write(&mut self, peer: PeerId, value: Vec<u8>) {
        let response = match self.gatt.on_write(&peer, &value) {
            Some(Frame::Response(response)) => response,
            Some(Frame::Request(_)) => {
                debug!(peer = %peer, "Advertiser does not accept requests, ignoring");
                return;
            }
            None => return,
        };

        let request = match &self.state {
            SessionState::Broadcasting { request } => request.clone(),
            other => {
                debug!(peer = %peer, state = other.name(), "Unsolicited response, ignoring");
                return;
            }
        };

        info!(
            peer = %peer,
            request_id = ?request.request_id,
            approved = response.approved,
            "Payment response received"
        );
        let actions = self.gatt.stop();
        self.apply_gatt_actions(actions).await;

        self.state = SessionState::Idle;
        self.outputs
            .received_message
            .send_replace(Some(Frame::Response(response.clone())));
        self.emit(PaymentEvent::ResponseReceived {
            response,
            received_at: Utc::now(),
        });

        if self.advertising_requested {
            let seq = self.begin_settle();
            self.schedule(SessionTimer::Settle { seq }, self.config.settle_delay);
        }
    }

    // ---- Effects ----

    async fn apply_link_actions(&mut self, actions: Vec<LinkAction>) {
        let mut queue: VecDeque<LinkAction> = actions.into();
        while let Some(action) = queue.pop_front() {
            match action {
                LinkAction::StartScan => self.start_radio_scan().await,
                LinkAction::StopScan => {
                    if let Err(e) = self.radio.stop_scan().await {
                        warn!(error = %e, "Failed to stop scan");
                    }
                }
                LinkAction::ResumeScan => {
                    if let Some(seq) = self.settling {
                        self.schedule(SessionTimer::Settle { seq }, self.config.settle_delay);
                    } else {
                        self.start_radio_scan().await;
                    }
                }
                LinkAction::Connect(peer) => {
                    if let Err(e) = self.radio.connect(&peer).await {
                        warn!(peer = %peer, error = %e, "Connect request failed");
                        queue.extend(self.controller.handle(LinkEvent::ConnectFailed { peer }));
                    }
                }
                LinkAction::DiscoverServices(peer) => {
                    if let Err(e) = self.radio.discover_services(&peer).await {
                        warn!(peer = %peer, error = %e, "Service discovery failed");
                        queue.extend(self.controller.handle(LinkEvent::ServicesDiscovered {
                            peer,
                            characteristic_found: false,
                        }));
                    }
                }
                LinkAction::Subscribe(peer) => {
                    if let Err(e) = self.radio.subscribe(&peer).await {
                        warn!(peer = %peer, error = %e, "Subscribe failed, dropping link");
                        queue.extend(self.controller.disconnect());
                    }
                }
                LinkAction::Disconnect(peer) => {
                    if let Err(e) = self.radio.disconnect(&peer).await {
                        debug!(peer = %peer, error = %e, "Disconnect request failed");
                    }
                }
                LinkAction::LinkReady(peer) => {
                    if matches!(self.state, SessionState::Idle | SessionState::Scanning) {
                        self.state = SessionState::Linked { peer };
                        self.link_seq += 1;
                        self.schedule(
                            SessionTimer::LinkIdle { seq: self.link_seq },
                            self.config.link_idle_timeout,
                        );
                    }
                }
                LinkAction::LinkClosed(peer) => self.on_link_closed(&peer),
                LinkAction::ProximityEntered(peer) => {
                    self.emit(PaymentEvent::ProximityEntered { peer })
                }
                LinkAction::InRangeChanged(in_range) => {
                    self.outputs.in_range.send_replace(in_range);
                }
            }
        }
        self.publish_connection_state();
    }

    async fn apply_gatt_actions(&mut self, actions: Vec<GattAction>) {
        for action in actions {
            let result = match &action {
                GattAction::Advertise(service) => self.radio.start_advertising(service).await,
                GattAction::StopAdvertising => self.radio.stop_advertising().await,
                GattAction::Notify { peer, value } => self.radio.notify(peer, value).await,
                GattAction::RespondRead { peer, value } => {
                    self.radio.respond_read(peer, value).await
                }
            };
            if let Err(e) = result {
                warn!(error = %e, action = ?action, "GATT operation failed");
            }
        }
    }

    async fn start_radio_scan(&mut self) {
        if let Err(e) = self.radio.start_scan().await {
            warn!(error = %e, "Failed to start scan");
            return;
        }
        if self.state == SessionState::Idle {
            self.state = SessionState::Scanning;
        }
    }

    /// Defer radio reuse until a fresh settle delay has elapsed
    fn begin_settle(&mut self) -> u64 {
        self.settle_seq += 1;
        self.settling = Some(self.settle_seq);
        self.settle_seq
    }

    /// Resume whichever role is still wanted once the radio has settled
    async fn on_settled(&mut self, seq: u64) {
        if self.settling != Some(seq) {
            debug!(seq, "Ignoring stale settle timer");
            return;
        }
        self.settling = None;
        if self.state != SessionState::Idle {
            return;
        }

        if self.controller.is_scanning()
            && self.controller.state() == ConnectionState::Disconnected
        {
            debug!("Settle delay elapsed, resuming scan");
            self.start_radio_scan().await;
        } else if self.advertising_requested && !self.gatt.is_advertising() {
            debug!("Settle delay elapsed, resuming advertising");
            let actions = self.gatt.start_advertising();
            self.apply_gatt_actions(actions).await;
        }
    }

    fn publish_connection_state(&self) {
        let current = self.controller.state();
        self.outputs.connection_state.send_if_modified(|state| {
            if *state == current {
                return false;
            }
            *state = current;
            true
        });
    }

    fn emit(&self, event: PaymentEvent) {
        if self.outputs.events.send(event).is_err() {
            debug!("Payment event receiver dropped");
        }
    }

    fn schedule(&self, timer: SessionTimer, delay: std::time::Duration) {
        let timers = self.timers.clone();
        let deadline = tokio::time::Instant::now() + delay;
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = timers.send(timer);
        });
    }
}

/// Encode a response, degrading to a bare outcome when a field cannot be
/// carried on the wire
fn encode_response_lossy(response: &PaymentResponseFrame) -> Vec<u8> {
    match MessageCodec::encode(&Frame::Response(response.clone())) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Response not encodable, sending outcome only");
            let outcome = if response.approved {
                APPROVED
            } else {
                DECLINED
            };
            format!("{}:{}", RESPONSE_TAG, outcome).into_bytes()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lossy_encoding_falls_back_to_outcome() {
        let response = PaymentResponseFrame {
            approved: true,
            transaction_hash: Some("0x:bad".to_string()),
            amount: None,
            sender: None,
            recipient: None,
            note: None,
        };
        assert_eq!(encode_response_lossy(&response), b"PAYMENT_RESPONSE:APPROVED".to_vec());
        assert_eq!(
            encode_response_lossy(&PaymentResponseFrame::declined()),
            b"PAYMENT_RESPONSE:DECLINED".to_vec()
        );
    }

    #[test]
    fn test_state_names() {
        assert_eq!(SessionState::Idle.name(), "idle");
        assert!(SessionState::Linked {
            peer: "p".to_string()
        }
        .in_scanner_exchange());
        assert!(!SessionState::Scanning.in_scanner_exchange());
    }
}
