//! Shared fixtures for integration tests: a synthetic TrueType font and
//! hand-assembled PDF byte streams.

#![allow(dead_code)]

use byteorder::{BigEndian, ByteOrder};

/// Build a small valid TrueType font.
///
/// Six glyphs: 0 is .notdef, 1-2 and 4-5 are simple glyphs with
/// distinguishable bodies, and glyph 3 is a composite referencing
/// glyph 2. Long loca, full hmtx, plus a cmap-like table that must
/// survive subsetting verbatim.
pub fn build_truetype() -> Vec<u8> {
    fn simple_glyph(fill: u8) -> Vec<u8> {
        let mut g = vec![0u8; 14];
        BigEndian::write_i16(&mut g[0..2], 1);
        g[10] = fill;
        g
    }
    fn composite_glyph(component: u16) -> Vec<u8> {
        let mut g = vec![0u8; 16];
        BigEndian::write_i16(&mut g[0..2], -1);
        BigEndian::write_u16(&mut g[10..12], 0x0001); // ARG_1_AND_2_ARE_WORDS
        BigEndian::write_u16(&mut g[12..14], component);
        g
    }

    let glyphs = vec![
        simple_glyph(0x10),
        simple_glyph(0x21),
        simple_glyph(0x32),
        composite_glyph(2),
        simple_glyph(0x54),
        simple_glyph(0x65),
    ];

    let mut glyf = Vec::new();
    let mut loca = vec![0u8; 0];
    loca.extend_from_slice(&0u32.to_be_bytes());
    for g in &glyphs {
        glyf.extend_from_slice(g);
        loca.extend_from_slice(&(glyf.len() as u32).to_be_bytes());
    }

    let mut head = vec![0u8; 54];
    BigEndian::write_u32(&mut head[0..4], 0x0001_0000);
    BigEndian::write_u32(&mut head[12..16], 0x5F0F_3CF5);
    BigEndian::write_u16(&mut head[18..20], 1000);
    BigEndian::write_i16(&mut head[50..52], 1); // long loca

    let mut maxp = vec![0u8; 32];
    BigEndian::write_u32(&mut maxp[0..4], 0x0001_0000);
    BigEndian::write_u16(&mut maxp[4..6], glyphs.len() as u16);

    let mut hhea = vec![0u8; 36];
    BigEndian::write_u32(&mut hhea[0..4], 0x0001_0000);
    BigEndian::write_u16(&mut hhea[34..36], glyphs.len() as u16);

    let mut hmtx = Vec::new();
    for i in 0..glyphs.len() {
        hmtx.extend_from_slice(&(600 + i as u16 * 10).to_be_bytes());
        hmtx.extend_from_slice(&(i as i16).to_be_bytes());
    }

    let cmap = vec![0xC0u8; 64];

    pdf_forge::fonts::sfnt::assemble(
        0x0001_0000,
        vec![
            (*b"glyf", glyf),
            (*b"loca", loca),
            (*b"head", head),
            (*b"maxp", maxp),
            (*b"hhea", hhea),
            (*b"hmtx", hmtx),
            (*b"cmap", cmap),
        ],
    )
    .unwrap()
}

/// Hand-assemble a classical-xref PDF from numbered object bodies.
///
/// `bodies[i]` becomes object `i + 1`; a matching xref table, trailer and
/// startxref are appended. The trailer names object 1 as /Root.
pub fn assemble_pdf(version: &str, bodies: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("%PDF-{}\n", version).as_bytes());

    let mut offsets = Vec::new();
    for (i, body) in bodies.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", bodies.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for off in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF",
            bodies.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

/// A one-page PDF with a single content stream showing text.
pub fn one_page_pdf() -> Vec<u8> {
    let content = b"BT /F1 12 Tf 72 720 Td (Hello) Tj ET";
    assemble_pdf(
        "1.4",
        &[
            b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
            b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_vec(),
            b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
              /Resources << /Font << /F1 5 0 R >> >> >>"
                .to_vec(),
            {
                let mut body =
                    format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
                body.extend_from_slice(content);
                body.extend_from_slice(b"\nendstream");
                body
            },
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_vec(),
        ],
    )
}
