pub mod types;
pub mod error;
pub mod config;
pub mod signal;
pub mod connection;
pub mod gatt;
pub mod codec;
pub mod dedup;
pub mod radio;
pub mod wallet;
pub mod session;
pub mod service;
pub mod ble;
pub mod loopback;

pub use types::*;
pub use error::{ProximityError, Result, ErrorContext, ErrorCategory};
pub use config::HandshakeConfig;
pub use signal::{SignalConfig, SignalFilter, ProximityDecision};
pub use connection::{ConnectionController, LinkAction, LinkEvent};
pub use gatt::{GattAction, GattRoleManager, GattService, PAYMENT_SERVICE};
pub use codec::{CodecError, Frame, MessageCodec};
pub use dedup::DedupTracker;
pub use radio::{Radio, RadioEvent};
pub use wallet::WalletProvider;
pub use session::{PaymentSessionManager, SessionState, SessionTimer};
pub use service::{ProximityService, ServiceHandle};
pub use ble::BtleplugRadio;
pub use loopback::{LoopbackMedium, LoopbackRadio};
