use crate::codec::CodecError;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ProximityError {
    #[error("BLE error: {0}")]
    BleError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] CodecError),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("No wallet address available")]
    WalletUnavailable,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Proximity service stopped")]
    ServiceStopped,

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, ProximityError>;

/// Context for error logging
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub peer_id: Option<String>,
    pub request_id: Option<String>,
    pub state: Option<String>,
    pub additional_info: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peer_id(mut self, peer_id: impl Into<String>) -> Self {
        self.peer_id = Some(peer_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.additional_info = Some(info.into());
        self
    }
}

impl ProximityError {
    /// Log error with structured context
    pub fn log_with_context(&self, context: &ErrorContext) {
        error!(
            error = %self,
            category = %self.category(),
            peer_id = ?context.peer_id,
            request_id = ?context.request_id,
            state = ?context.state,
            additional_info = ?context.additional_info,
            timestamp = %chrono::Utc::now(),
            "Proximity handshake error occurred"
        );
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            ProximityError::BleError(details) => {
                format!("Bluetooth error: {}. Please check your Bluetooth settings.", details)
            }
            ProximityError::ConnectionFailed(_) => {
                "Could not connect to the nearby device. Hold the phones closer and try again."
                    .to_string()
            }
            ProximityError::PeerNotFound(_) => {
                "The nearby device is no longer in range.".to_string()
            }
            ProximityError::InvalidInput(details) => {
                format!("Invalid input: {}. Please check your entry and try again.", details)
            }
            ProximityError::InvalidState(_) => {
                "That action is not available right now.".to_string()
            }
            ProximityError::MalformedFrame(_) => {
                "Received an unreadable payment message.".to_string()
            }
            ProximityError::TransactionFailed(reason) => {
                format!("Payment failed: {}. No funds were sent.", reason)
            }
            ProximityError::WalletUnavailable => {
                "No wallet is connected. Please connect a wallet first.".to_string()
            }
            ProximityError::Timeout(operation) => {
                format!("Operation timed out: {}. Please try again.", operation)
            }
            ProximityError::ServiceStopped => {
                "Tap to pay is turned off.".to_string()
            }
            ProximityError::InternalError(details) => {
                format!("An internal error occurred: {}. Please try again.", details)
            }
        }
    }

    /// Get error category for metrics and monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProximityError::BleError(_) => ErrorCategory::Radio,
            ProximityError::ConnectionFailed(_) => ErrorCategory::Connection,
            ProximityError::PeerNotFound(_) => ErrorCategory::Connection,
            ProximityError::InvalidInput(_) => ErrorCategory::Validation,
            ProximityError::InvalidState(_) => ErrorCategory::Validation,
            ProximityError::MalformedFrame(_) => ErrorCategory::Protocol,
            ProximityError::TransactionFailed(_) => ErrorCategory::Wallet,
            ProximityError::WalletUnavailable => ErrorCategory::Wallet,
            ProximityError::Timeout(_) => ErrorCategory::Timeout,
            ProximityError::ServiceStopped => ErrorCategory::Internal,
            ProximityError::InternalError(_) => ErrorCategory::Internal,
        }
    }
}

/// Error categories for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Radio,
    Connection,
    Validation,
    Protocol,
    Wallet,
    Timeout,
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Radio => write!(f, "radio"),
            ErrorCategory::Connection => write!(f, "connection"),
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Protocol => write!(f, "protocol"),
            ErrorCategory::Wallet => write!(f, "wallet"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_converts_to_protocol_category() {
        let err: ProximityError = CodecError::UnknownTag("HELLO".to_string()).into();
        assert_eq!(err.category(), ErrorCategory::Protocol);
        assert!(err.to_string().contains("HELLO"));
    }

    #[test]
    fn test_user_message_hides_internal_detail() {
        let err = ProximityError::ConnectionFailed("gatt status 133".to_string());
        assert!(!err.user_message().contains("133"));
    }

    #[test]
    fn test_error_context_builder() {
        let ctx = ErrorContext::new()
            .with_peer_id("merchant-1")
            .with_request_id("req-1")
            .with_state("Responding");
        assert_eq!(ctx.peer_id.as_deref(), Some("merchant-1"));
        assert_eq!(ctx.request_id.as_deref(), Some("req-1"));
        assert_eq!(ctx.state.as_deref(), Some("Responding"));
        assert!(ctx.additional_info.is_none());
    }
}
