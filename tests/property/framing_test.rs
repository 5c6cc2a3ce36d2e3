// tests/property/framing_test.rs

//! Property-based tests for request framing
//! Tests that decoding does not depend on how the bytes are chunked

use bytes::BytesMut;
use opcgate::core::protocol::{GatewayCodec, Request};
use proptest::prelude::*;
use tokio_util::codec::Decoder;

fn request_strategy() -> impl Strategy<Value = (String, Request)> {
    let id = "[A-Za-z][A-Za-z0-9_.]{0,15}";
    prop_oneof![
        id.prop_map(|id| (format!("READ|{id}"), Request::Read { id })),
        (id, "-?[0-9]{1,6}").prop_map(|(id, value)| {
            (format!("WRITE|{id}|{value}"), Request::Write { id, value })
        }),
        Just(("GETCHANGED".to_string(), Request::GetChanged)),
    ]
}

proptest! {
    #[test]
    fn test_chunking_does_not_change_decoded_requests(
        requests in prop::collection::vec(request_strategy(), 1..20),
        crlf in any::<bool>(),
        chunk in 1..40usize,
    ) {
        let terminator = if crlf { "\r\n" } else { "\n" };
        let wire: String = requests
            .iter()
            .map(|(line, _)| format!("{line}{terminator}"))
            .collect();

        let mut codec = GatewayCodec::new(64);
        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        for piece in wire.as_bytes().chunks(chunk) {
            buf.extend_from_slice(piece);
            while let Some(item) = codec.decode(&mut buf).unwrap() {
                decoded.push(item.unwrap());
            }
        }
        prop_assert!(buf.is_empty());

        let expected: Vec<Request> = requests.into_iter().map(|(_, r)| r).collect();
        prop_assert_eq!(decoded, expected);
    }
}
