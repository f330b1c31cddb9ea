//! Text wire protocol carried over the payment characteristic.
//!
//! ```text
//! PAYMENT_REQUEST:<amount>:<walletAddress>[:<note>[:<requestId>]]
//! PAYMENT_RESPONSE:<APPROVED|DECLINED>[:<txHash>:<amount>:<sender>:<recipient>:<note>]
//! ```
//!
//! Empty positional fields decode to `None`. Only trailing NUL padding is
//! stripped on decode; whitespace is field content. Encoding refuses values
//! that contain the delimiter or NUL, so anything this module encodes
//! decodes back to the same frame.

use crate::types::{PaymentRequestFrame, PaymentResponseFrame};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

pub const REQUEST_TAG: &str = "PAYMENT_REQUEST";
pub const RESPONSE_TAG: &str = "PAYMENT_RESPONSE";
pub const APPROVED: &str = "APPROVED";
pub const DECLINED: &str = "DECLINED";

const DELIMITER: char = ':';

/// Number of response fields after the outcome keyword
const RESPONSE_METADATA_FIELDS: usize = 5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("unknown frame tag: {0}")]
    UnknownTag(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("unexpected field count {count} for {tag}")]
    UnexpectedFieldCount { tag: &'static str, count: usize },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("unknown response outcome: {0}")]
    UnknownOutcome(String),

    #[error("field {0} contains the frame delimiter")]
    FieldContainsDelimiter(&'static str),

    #[error("field {0} contains a NUL byte")]
    FieldContainsNul(&'static str),
}

/// One complete protocol message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Frame {
    Request(PaymentRequestFrame),
    Response(PaymentResponseFrame),
}

impl Frame {
    pub fn tag(&self) -> &'static str {
        match self {
            Frame::Request(_) => REQUEST_TAG,
            Frame::Response(_) => RESPONSE_TAG,
        }
    }
}

pub struct MessageCodec;

impl MessageCodec {
    pub fn encode(frame: &Frame) -> Result<Vec<u8>, CodecError> {
        let text = match frame {
            Frame::Request(request) => Self::encode_request(request)?,
            Frame::Response(response) => Self::encode_response(response)?,
        };
        Ok(text.into_bytes())
    }

    pub fn encode_request(request: &PaymentRequestFrame) -> Result<String, CodecError> {
        if request.amount <= Decimal::ZERO {
            return Err(CodecError::InvalidAmount(request.amount.to_string()));
        }
        if request.wallet_address.is_empty() {
            return Err(CodecError::MissingField("wallet_address"));
        }
        check_field("wallet_address", &request.wallet_address)?;

        let note = non_empty(&request.note);
        let request_id = non_empty(&request.request_id);

        let mut fields = vec![
            REQUEST_TAG.to_string(),
            request.amount.to_string(),
            request.wallet_address.clone(),
        ];
        if note.is_some() || request_id.is_some() {
            let note = note.unwrap_or_default();
            check_field("note", note)?;
            fields.push(note.to_string());
        }
        if let Some(id) = request_id {
            check_field("request_id", id)?;
            fields.push(id.to_string());
        }

        Ok(fields.join(":"))
    }

    pub fn encode_response(response: &PaymentResponseFrame) -> Result<String, CodecError> {
        let outcome = if response.approved { APPROVED } else { DECLINED };
        let metadata = [
            ("transaction_hash", non_empty(&response.transaction_hash)),
            ("amount", non_empty(&response.amount)),
            ("sender", non_empty(&response.sender)),
            ("recipient", non_empty(&response.recipient)),
            ("note", non_empty(&response.note)),
        ];

        if metadata.iter().all(|(_, value)| value.is_none()) {
            return Ok(format!("{}:{}", RESPONSE_TAG, outcome));
        }

        let mut fields = vec![RESPONSE_TAG.to_string(), outcome.to_string()];
        for (name, value) in metadata {
            let value = value.unwrap_or_default();
            check_field(name, value)?;
            fields.push(value.to_string());
        }
        Ok(fields.join(":"))
    }

    pub fn decode(bytes: &[u8]) -> Result<Frame, CodecError> {
        let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
        Self::decode_str(text)
    }

    pub fn decode_str(text: &str) -> Result<Frame, CodecError> {
        let text = text.trim_end_matches('\0');
        let mut parts = text.split(DELIMITER);
        let tag = parts.next().unwrap_or_default();
        let fields: Vec<&str> = parts.collect();

        match tag {
            REQUEST_TAG => decode_request(&fields).map(Frame::Request),
            RESPONSE_TAG => decode_response(&fields).map(Frame::Response),
            other => Err(CodecError::UnknownTag(other.to_string())),
        }
    }
}

fn decode_request(fields: &[&str]) -> Result<PaymentRequestFrame, CodecError> {
    if fields.len() > 4 {
        return Err(CodecError::UnexpectedFieldCount {
            tag: REQUEST_TAG,
            count: fields.len(),
        });
    }

    let amount = fields.first().ok_or(CodecError::MissingField("amount"))?;
    let amount = parse_amount(amount)?;

    let wallet_address = fields
        .get(1)
        .filter(|a| !a.is_empty())
        .ok_or(CodecError::MissingField("wallet_address"))?;

    Ok(PaymentRequestFrame {
        amount,
        wallet_address: wallet_address.to_string(),
        note: optional(fields.get(2)),
        request_id: optional(fields.get(3)),
    })
}

fn decode_response(fields: &[&str]) -> Result<PaymentResponseFrame, CodecError> {
    if fields.len() > 1 + RESPONSE_METADATA_FIELDS {
        return Err(CodecError::UnexpectedFieldCount {
            tag: RESPONSE_TAG,
            count: fields.len(),
        });
    }

    let approved = match fields.first() {
        Some(&APPROVED) => true,
        Some(&DECLINED) => false,
        Some(other) => return Err(CodecError::UnknownOutcome(other.to_string())),
        None => return Err(CodecError::MissingField("outcome")),
    };

    Ok(PaymentResponseFrame {
        approved,
        transaction_hash: optional(fields.get(1)),
        amount: optional(fields.get(2)),
        sender: optional(fields.get(3)),
        recipient: optional(fields.get(4)),
        note: optional(fields.get(5)),
    })
}

fn parse_amount(raw: &str) -> Result<Decimal, CodecError> {
    let amount =
        Decimal::from_str(raw.trim()).map_err(|_| CodecError::InvalidAmount(raw.to_string()))?;
    if amount <= Decimal::ZERO {
        return Err(CodecError::InvalidAmount(raw.to_string()));
    }
    Ok(amount)
}

fn optional(field: Option<&&str>) -> Option<String> {
    field.filter(|f| !f.is_empty()).map(|f| f.to_string())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn check_field(name: &'static str, value: &str) -> Result<(), CodecError> {
    if value.contains(DELIMITER) {
        return Err(CodecError::FieldContainsDelimiter(name));
    }
    if value.contains('\0') {
        return Err(CodecError::FieldContainsNul(name));
    }
    Ok(())
}
