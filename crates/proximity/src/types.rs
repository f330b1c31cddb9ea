use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

/// Unique identifier for a peer as reported by the radio
pub type PeerId = String;

/// RSSI value platforms report when no reading is available
pub const INVALID_RSSI: i16 = 127;

/// One signal-strength reading taken from a discovery event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximitySample {
    pub raw_strength: i16,
    pub timestamp: Instant,
}

impl ProximitySample {
    pub fn new(raw_strength: i16, timestamp: Instant) -> Self {
        Self {
            raw_strength,
            timestamp,
        }
    }

    pub fn now(raw_strength: i16) -> Self {
        Self::new(raw_strength, Instant::now())
    }
}

/// Low-pass estimate of the peer's signal strength
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothedProximity {
    pub value: f64,
    pub consecutive_stable_readings: u32,
}

/// State of the scanner's single logical link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

/// Payment request published by the advertiser.
///
/// Optional fields are either absent or non-empty; an empty note is
/// indistinguishable from no note on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequestFrame {
    pub amount: Decimal,
    pub wallet_address: String,
    pub note: Option<String>,
    pub request_id: Option<String>,
}

impl PaymentRequestFrame {
    /// Build a request with a freshly generated request id
    pub fn new(amount: Decimal, wallet_address: impl Into<String>, note: Option<String>) -> Self {
        Self {
            amount,
            wallet_address: wallet_address.into(),
            note: note.filter(|n| !n.is_empty()),
            request_id: Some(Uuid::new_v4().to_string()),
        }
    }

    /// Key used for at-most-once processing.
    ///
    /// Legacy frames carry no request id; they fall back to `amount:address`,
    /// so two legacy requests with the same amount and address collide.
    pub fn dedup_key(&self) -> String {
        match &self.request_id {
            Some(id) => id.clone(),
            None => format!("{}:{}", self.amount, self.wallet_address),
        }
    }
}

/// Answer sent by the scanner after the local pay/decline decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResponseFrame {
    pub approved: bool,
    pub transaction_hash: Option<String>,
    pub amount: Option<String>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub note: Option<String>,
}

impl PaymentResponseFrame {
    pub fn declined() -> Self {
        Self {
            approved: false,
            transaction_hash: None,
            amount: None,
            sender: None,
            recipient: None,
            note: None,
        }
    }

    /// Approved response mirroring the originating request
    pub fn approved(
        request: &PaymentRequestFrame,
        transaction_hash: impl Into<String>,
        sender: Option<String>,
    ) -> Self {
        Self {
            approved: true,
            transaction_hash: Some(transaction_hash.into()),
            amount: Some(request.amount.to_string()),
            sender: sender.filter(|s| !s.is_empty()),
            recipient: Some(request.wallet_address.clone()),
            note: request.note.clone(),
        }
    }
}

/// Terminal result of one payment exchange on the scanner side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome")]
pub enum PaymentOutcome {
    Approved { transaction_hash: String },
    Declined,
    TimedOut,
    Failed { reason: String },
}

impl PaymentOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, PaymentOutcome::Approved { .. })
    }
}

/// Notifications delivered to the UI collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PaymentEvent {
    /// Haptic cue: a peer just came into range
    ProximityEntered { peer: PeerId },
    /// A new request needs an approve/decline decision
    RequestReceived {
        peer: PeerId,
        request: PaymentRequestFrame,
    },
    /// The scanner finished an exchange and answered the advertiser
    PaymentCompleted {
        request: PaymentRequestFrame,
        outcome: PaymentOutcome,
        completed_at: DateTime<Utc>,
    },
    /// The advertiser got its answer and cleared the pending request
    ResponseReceived {
        response: PaymentResponseFrame,
        received_at: DateTime<Utc>,
    },
}
