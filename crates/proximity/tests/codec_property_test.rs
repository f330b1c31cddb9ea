// Property-based tests for the wire codec

use proptest::prelude::*;
use proximity::{Frame, MessageCodec, PaymentRequestFrame, PaymentResponseFrame};
use rust_decimal::Decimal;

/// Field text including surrounding whitespace, which is content on the wire
fn field() -> impl Strategy<Value = String> {
    r"[A-Za-z0-9_.\- \t\r\n]{1,24}"
}

fn request_strategy() -> impl Strategy<Value = PaymentRequestFrame> {
    (
        1i64..=100_000_000i64,
        0u32..=6u32,
        field(),
        proptest::option::of(field()),
        proptest::option::of(field()),
    )
        .prop_map(|(mantissa, scale, wallet_address, note, request_id)| PaymentRequestFrame {
            amount: Decimal::new(mantissa, scale),
            wallet_address,
            note,
            request_id,
        })
}

fn response_strategy() -> impl Strategy<Value = PaymentResponseFrame> {
    (
        any::<bool>(),
        proptest::option::of(field()),
        proptest::option::of(field()),
        proptest::option::of(field()),
        proptest::option::of(field()),
        proptest::option::of(field()),
    )
        .prop_map(
            |(approved, transaction_hash, amount, sender, recipient, note)| PaymentResponseFrame {
                approved,
                transaction_hash,
                amount,
                sender,
                recipient,
                note,
            },
        )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Any request whose fields avoid the delimiter survives the wire
    #[test]
    fn prop_request_round_trip(request in request_strategy()) {
        let bytes = MessageCodec::encode(&Frame::Request(request.clone())).unwrap();
        let decoded = MessageCodec::decode(&bytes).unwrap();
        prop_assert_eq!(decoded, Frame::Request(request));
    }

    #[test]
    fn prop_response_round_trip(response in response_strategy()) {
        let bytes = MessageCodec::encode(&Frame::Response(response.clone())).unwrap();
        let decoded = MessageCodec::decode(&bytes).unwrap();
        prop_assert_eq!(decoded, Frame::Response(response));
    }

    /// Trailing NUL padding from fixed-size characteristic buffers is ignored
    #[test]
    fn prop_nul_padding_is_ignored(request in request_strategy(), padding in 0usize..32) {
        let mut bytes = MessageCodec::encode(&Frame::Request(request.clone())).unwrap();
        bytes.extend(std::iter::repeat(0u8).take(padding));
        prop_assert_eq!(MessageCodec::decode(&bytes).unwrap(), Frame::Request(request));
    }

    /// Arbitrary input never panics the decoder
    #[test]
    fn prop_decode_total(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
        let _ = MessageCodec::decode(&bytes);
    }

    /// A field carrying the delimiter is refused instead of corrupting the frame
    #[test]
    fn prop_delimiter_in_field_is_rejected(prefix in field(), suffix in field()) {
        let request = PaymentRequestFrame {
            amount: Decimal::ONE,
            wallet_address: format!("{}:{}", prefix, suffix),
            note: None,
            request_id: None,
        };
        prop_assert!(MessageCodec::encode(&Frame::Request(request)).is_err());
    }
}
