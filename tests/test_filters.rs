//! Filter round-trip properties.

use proptest::prelude::*;

use pdf_forge::decoders::{decode_stream, decoder_for, encode_with_filter};

const REVERSIBLE: [&str; 5] = [
    "FlateDecode",
    "LZWDecode",
    "ASCIIHexDecode",
    "ASCII85Decode",
    "RunLengthDecode",
];

proptest! {
    #[test]
    fn prop_reversible_filters_round_trip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        for name in REVERSIBLE {
            let encoded = encode_with_filter(name, &data).unwrap();
            let decoded = decoder_for(name).unwrap().decode(&encoded).unwrap();
            prop_assert_eq!(&decoded, &data, "round trip failed for {}", name);
        }
    }

    #[test]
    fn prop_chained_pipeline_round_trips(data in proptest::collection::vec(any::<u8>(), 0..1024)) {
        // Flate innermost, then ASCII85 armouring, decoded outermost-first
        let flated = encode_with_filter("FlateDecode", &data).unwrap();
        let armoured = encode_with_filter("ASCII85Decode", &flated).unwrap();
        let filters = vec!["ASCII85Decode".to_string(), "FlateDecode".to_string()];
        prop_assert_eq!(decode_stream(&armoured, &filters).unwrap(), data);
    }

    #[test]
    fn prop_runlength_output_bounded(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        // Worst case adds one length byte per 128 literals plus EOD
        let encoded = encode_with_filter("RunLengthDecode", &data).unwrap();
        prop_assert!(encoded.len() <= data.len() + data.len() / 128 + 2);
    }
}

#[test]
fn test_unknown_filter_is_reported_by_name() {
    let err = decode_stream(b"x", &["Bogus".to_string()]).unwrap_err();
    assert!(format!("{}", err).contains("Bogus"));
}
