//! PNG chunk codec.
//!
//! Just enough of the container format to add a text chunk to an encoded
//! image: CRC-32, chunk framing, and splicing before the IEND trailer.
//! Pixel data is never touched.

use std::sync::LazyLock;

use crate::error::RenderError;

/// PNG file signature.
pub const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Length of the IEND chunk: zero length, tag, CRC.
pub const IEND_LEN: usize = 12;

/// Chunk tag for international text.
pub const ITXT: [u8; 4] = *b"iTXt";

/// Language tag written into iTXt chunks.
pub const LANGUAGE: &str = "en";

const IEND: [u8; 4] = *b"IEND";

/// Reflected CRC-32 table for polynomial 0xEDB88320, built on first use.
static CRC_TABLE: LazyLock<[u32; 256]> = LazyLock::new(|| {
    let mut table = [0u32; 256];
    for (n, entry) in (0u32..).zip(table.iter_mut()) {
        let mut c = n;
        for _ in 0..8 {
            c = if c & 1 == 1 { 0xEDB8_8320 ^ (c >> 1) } else { c >> 1 };
        }
        *entry = c;
    }
    table
});

/// CRC-32 as used by PNG.
pub fn crc32(bytes: &[u8]) -> u32 {
    let table = &*CRC_TABLE;
    let mut crc = 0xFFFF_FFFFu32;
    for &b in bytes {
        crc = table[((crc ^ u32::from(b)) & 0xFF) as usize] ^ (crc >> 8);
    }
    crc ^ 0xFFFF_FFFF
}

/// Frame `payload` as a chunk: `len_be32 ‖ tag ‖ payload ‖ crc_be32(tag ‖ payload)`.
pub fn build_chunk(tag: [u8; 4], payload: &[u8]) -> Result<Vec<u8>, RenderError> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|&l| l <= 0x7FFF_FFFF)
        .ok_or_else(|| RenderError::malformed(format!("chunk payload of {} bytes", payload.len())))?;

    let mut chunk = Vec::with_capacity(payload.len() + 12);
    chunk.extend_from_slice(&len.to_be_bytes());
    chunk.extend_from_slice(&tag);
    chunk.extend_from_slice(payload);
    let crc = crc32(&chunk[4..]);
    chunk.extend_from_slice(&crc.to_be_bytes());
    Ok(chunk)
}

/// Insert `chunk` immediately before the final `trailer_len` bytes.
pub fn splice_before_trailer(
    container: &[u8],
    chunk: &[u8],
    trailer_len: usize,
) -> Result<Vec<u8>, RenderError> {
    let split = container.len().checked_sub(trailer_len).ok_or_else(|| {
        RenderError::malformed(format!(
            "container of {} bytes is shorter than its {trailer_len}-byte trailer",
            container.len()
        ))
    })?;

    let mut out = Vec::with_capacity(container.len() + chunk.len());
    out.extend_from_slice(&container[..split]);
    out.extend_from_slice(chunk);
    out.extend_from_slice(&container[split..]);
    Ok(out)
}

/// iTXt payload: `keyword NUL 0 0 language NUL (empty translated keyword) NUL text`.
pub fn itxt_payload(keyword: &str, language: &str, text: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(keyword.len() + language.len() + text.len() + 5);
    payload.extend_from_slice(keyword.as_bytes());
    payload.push(0);
    payload.push(0); // compression flag: uncompressed
    payload.push(0); // compression method
    payload.extend_from_slice(language.as_bytes());
    payload.push(0);
    payload.push(0);
    payload.extend_from_slice(text.as_bytes());
    payload
}

/// Add an iTXt `key`/`text` pair to an encoded PNG.
///
/// The stream must start with the PNG signature and end with IEND.
pub fn embed_metadata(png: &[u8], key: &str, text: &str) -> Result<Vec<u8>, RenderError> {
    if key.is_empty() || key.len() > 79 || key.bytes().any(|b| b == 0) {
        return Err(RenderError::malformed(format!("invalid iTXt keyword {key:?}")));
    }
    if png.len() < SIGNATURE.len() + IEND_LEN || png[..SIGNATURE.len()] != SIGNATURE {
        return Err(RenderError::malformed("missing PNG signature"));
    }
    let trailer = &png[png.len() - IEND_LEN..];
    if trailer[4..8] != IEND || trailer[..4] != [0, 0, 0, 0] {
        return Err(RenderError::malformed("stream does not end with IEND"));
    }

    let chunk = build_chunk(ITXT, &itxt_payload(key, LANGUAGE, text))?;
    splice_before_trailer(png, &chunk, IEND_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_reference_vectors() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
        assert_eq!(crc32(b"IEND"), 0xAE42_6082);
    }

    #[test]
    fn test_build_empty_iend_chunk() {
        let chunk = build_chunk(*b"IEND", &[]).unwrap();
        assert_eq!(
            chunk,
            [0, 0, 0, 0, b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82]
        );
    }

    #[test]
    fn test_build_chunk_layout() {
        let chunk = build_chunk(*b"tEXt", b"abc").unwrap();

        assert_eq!(&chunk[..4], &3u32.to_be_bytes());
        assert_eq!(&chunk[4..8], b"tEXt");
        assert_eq!(&chunk[8..11], b"abc");
        assert_eq!(&chunk[11..], &crc32(b"tEXtabc").to_be_bytes());
    }

    #[test]
    fn test_splice_preserves_trailer() {
        let container = b"HEADERBODY0123456789AB".to_vec();
        let chunk = b"CHUNK";

        let out = splice_before_trailer(&container, chunk, 12).unwrap();

        assert_eq!(out.len(), container.len() + chunk.len());
        assert_eq!(&out[out.len() - 12..], &container[container.len() - 12..]);
        assert_eq!(&out[..10], &container[..10]);
        assert_eq!(&out[10..15], chunk);
    }

    #[test]
    fn test_splice_rejects_short_container() {
        assert!(splice_before_trailer(b"short", b"x", 12).is_err());
    }

    #[test]
    fn test_itxt_payload_layout() {
        let payload = itxt_payload("Description", "en", "a <board>");
        assert_eq!(payload, b"Description\0\0\0en\0\0a <board>".to_vec());
    }

    #[test]
    fn test_embed_rejects_non_png() {
        let err = embed_metadata(b"GIF89a-not-a-png-at-all", "Description", "x").unwrap_err();
        assert!(matches!(err, RenderError::MalformedContainer { .. }));
    }

    #[test]
    fn test_embed_rejects_bad_keyword() {
        let mut png = SIGNATURE.to_vec();
        png.extend(build_chunk(*b"IEND", &[]).unwrap());

        assert!(embed_metadata(&png, "", "x").is_err());
        assert!(embed_metadata(&png, &"k".repeat(80), "x").is_err());
        assert!(embed_metadata(&png, "Description", "x").is_ok());
    }
}
