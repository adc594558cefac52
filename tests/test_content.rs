//! Content-stream engine over whole documents: inline images, resource
//! usage, and rewriting.

mod common;

use pdf_forge::content::{
    INLINE_IMAGE_OPERATOR, Operand, analyze_usage, parse_operations, serialize_operations,
};
use pdf_forge::{CancelToken, StrictPolicy, load_document};

#[test]
fn test_inline_image_through_document_pipeline() {
    let content = b"q\nBI\n/W 10 /H 10 /BPC 8 /CS /RGB\nID \x00\x01\x02\x03\nEI\nQ";
    let mut stream_body = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
    stream_body.extend_from_slice(content);
    stream_body.extend_from_slice(b"\nendstream");

    let pdf = common::assemble_pdf(
        "1.4",
        &[
            b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
            b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_vec(),
            b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 100 100] /Contents 4 0 R >>".to_vec(),
            stream_body,
        ],
    );

    let cancel = CancelToken::new();
    let doc = load_document(pdf, &StrictPolicy, &cancel).unwrap();
    let ops = parse_operations(&doc.pages[0].joined_contents()).unwrap();

    assert_eq!(ops.len(), 3);
    assert_eq!(ops[0].operator, "q");
    assert_eq!(ops[1].operator, INLINE_IMAGE_OPERATOR);
    assert_eq!(ops[2].operator, "Q");

    match &ops[1].operands[0] {
        Operand::InlineImage(image) => {
            assert_eq!(image.dict.get("W").unwrap().as_integer(), Some(10));
            assert_eq!(image.dict.get("H").unwrap().as_integer(), Some(10));
            assert_eq!(image.dict.get("BPC").unwrap().as_integer(), Some(8));
            assert_eq!(image.dict.get("CS").unwrap().as_name(), Some("RGB"));
            assert_eq!(image.data, vec![0x00, 0x01, 0x02, 0x03]);
        },
        other => panic!("expected inline image operand, got {:?}", other),
    }
}

#[test]
fn test_inline_image_survives_serialization() {
    let content = b"BI /W 2 /H 1 ID \xAA\xBB EI";
    let ops = parse_operations(content).unwrap();
    let bytes = serialize_operations(&ops);
    let reparsed = parse_operations(&bytes).unwrap();

    assert_eq!(reparsed.len(), 1);
    match (&ops[0].operands[0], &reparsed[0].operands[0]) {
        (Operand::InlineImage(before), Operand::InlineImage(after)) => {
            assert_eq!(before.data, after.data);
            assert_eq!(before.dict, after.dict);
        },
        _ => panic!("expected inline images on both sides"),
    }
}

#[test]
fn test_usage_analysis_on_lifted_page() {
    let cancel = CancelToken::new();
    let doc = load_document(common::one_page_pdf(), &StrictPolicy, &cancel).unwrap();
    let ops = parse_operations(&doc.pages[0].joined_contents()).unwrap();
    let usage = analyze_usage(&ops);

    assert!(usage.fonts.contains("F1"));
    assert_eq!(usage.shown_bytes("F1"), b"Hello");

    // The page's resource map covers every name the stream references
    for name in &usage.fonts {
        assert!(doc.pages[0].resources.fonts.contains_key(name));
    }
}
