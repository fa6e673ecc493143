// tests/property/framing_test.rs

//! Property-based tests for client line framing and classification

use bytes::BytesMut;
use linebroker::core::protocol::{ClientLine, Inbound, LineCodec, META_PREFIX};
use proptest::prelude::*;
use tokio_util::codec::Decoder;

fn decode_all(codec: &mut LineCodec, chunks: &[&[u8]]) -> Vec<ClientLine> {
    let mut buf = BytesMut::new();
    let mut out = Vec::new();
    for chunk in chunks {
        buf.extend_from_slice(chunk);
        while let Some(item) = codec.decode(&mut buf).unwrap() {
            out.push(item);
        }
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_chunking_does_not_change_decoded_lines(
        lines in prop::collection::vec("[ -~]{0,40}", 0..10),
        split in any::<prop::sample::Index>(),
        max_length in 8usize..64
    ) {
        let input: String = lines.iter().map(|l| format!("{l}\r\n")).collect();
        let bytes = input.as_bytes();
        let at = if bytes.is_empty() { 0 } else { split.index(bytes.len()) };

        let whole = decode_all(&mut LineCodec::new(max_length), &[bytes]);
        let split = decode_all(&mut LineCodec::new(max_length), &[&bytes[..at], &bytes[at..]]);
        prop_assert_eq!(&whole, &split);
        prop_assert_eq!(whole.len(), lines.len());

        for (item, expected) in whole.iter().zip(&lines) {
            if expected.len() + 1 > max_length {
                prop_assert_eq!(item, &ClientLine::Overlong);
            } else {
                prop_assert_eq!(item, &ClientLine::Line(expected.clone()));
            }
        }
    }

    #[test]
    fn test_meta_lines_are_never_forwarded(suffix in "[A-Za-z]{0,12}") {
        let line = format!("{META_PREFIX}{suffix}");
        prop_assert!(!matches!(Inbound::parse(&line), Inbound::Forward(_)));
        let lower = line.to_ascii_lowercase();
        prop_assert!(!matches!(Inbound::parse(&lower), Inbound::Forward(_)));
    }

    #[test]
    fn test_plain_lines_are_forwarded_trimmed(command in "[A-Za-z0-9][A-Za-z0-9 ,]{0,30}[A-Za-z0-9]") {
        prop_assume!(!command.to_ascii_uppercase().starts_with(META_PREFIX));
        let padded = format!("  {command}\t");
        prop_assert_eq!(Inbound::parse(&padded), Inbound::Forward(command.as_str()));
    }
}
