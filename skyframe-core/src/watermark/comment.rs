//! Watermark id side channel inside the image container.
//!
//! The watermark id is persisted as plain text in the container's comment
//! metadata (`SkyFrame {16 hex chars}`) so it can be recovered from the file
//! bytes alone, with no database at hand. JPEG files carry it in a COM
//! segment; PNG files are read via their `tEXt`/`iTXt` chunks. Extraction is
//! deliberately forgiving: truncated segments, missing comments, and junk
//! around the token all yield `None`, never an error.

/// Marker that precedes the watermark id in a comment segment.
pub const COMMENT_PREFIX: &str = "SkyFrame ";
/// Hex length of the embedded watermark id.
pub const WATERMARK_ID_LEN: usize = 16;

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Splice a COM segment carrying `comment` directly after the JPEG SOI marker.
///
/// The input must be a JPEG stream; the payload must fit a single segment
/// (two-byte length field).
pub(crate) fn insert_jpeg_comment(jpeg: &[u8], comment: &str) -> Option<Vec<u8>> {
    if !jpeg.starts_with(&JPEG_SOI) {
        return None;
    }
    let payload = comment.as_bytes();
    // The length field counts itself.
    let segment_len = payload.len().checked_add(2)?;
    if segment_len > usize::from(u16::MAX) {
        return None;
    }

    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&JPEG_SOI);
    out.extend_from_slice(&[0xFF, 0xFE]);
    out.extend_from_slice(&(segment_len as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&jpeg[2..]);
    Some(out)
}

/// Recover the embedded watermark id from file bytes, if present.
pub(crate) fn extract_comment_token(bytes: &[u8]) -> Option<String> {
    if bytes.starts_with(&JPEG_SOI) {
        scan_jpeg(bytes)
    } else if bytes.starts_with(&PNG_SIGNATURE) {
        scan_png(bytes)
    } else {
        None
    }
}

/// Walk JPEG marker segments up to the entropy-coded data, checking each COM
/// segment for the token. Bails out quietly on any structural damage.
fn scan_jpeg(bytes: &[u8]) -> Option<String> {
    let mut pos = 2usize;
    loop {
        if pos >= bytes.len() || bytes[pos] != 0xFF {
            return None;
        }
        // Skip fill bytes before the marker code.
        let mut marker_pos = pos + 1;
        while marker_pos < bytes.len() && bytes[marker_pos] == 0xFF {
            marker_pos += 1;
        }
        if marker_pos >= bytes.len() {
            return None;
        }
        let marker = bytes[marker_pos];

        // Standalone markers carry no length field.
        if marker == 0x01 || (0xD0..=0xD9).contains(&marker) {
            pos = marker_pos + 1;
            continue;
        }
        // SOS: comment segments always precede the scan data.
        if marker == 0xDA {
            return None;
        }
        if marker_pos + 2 >= bytes.len() {
            return None;
        }
        let length = usize::from(u16::from_be_bytes([bytes[marker_pos + 1], bytes[marker_pos + 2]]));
        if length < 2 {
            return None;
        }
        let data_start = marker_pos + 3;
        let data_end = marker_pos + 1 + length;
        if data_end > bytes.len() {
            // Truncated segment.
            return None;
        }
        if marker == 0xFE {
            if let Some(token) = find_token(&bytes[data_start..data_end]) {
                return Some(token);
            }
        }
        pos = data_end;
    }
}

/// Walk PNG chunks, checking textual chunks for the token.
fn scan_png(bytes: &[u8]) -> Option<String> {
    let mut pos = PNG_SIGNATURE.len();
    while pos + 8 <= bytes.len() {
        let length = u32::from_be_bytes(bytes[pos..pos + 4].try_into().ok()?) as usize;
        let chunk_type = &bytes[pos + 4..pos + 8];
        let data_start = pos + 8;
        let data_end = data_start.checked_add(length)?;
        if data_end > bytes.len() {
            return None;
        }
        if chunk_type == b"tEXt" || chunk_type == b"iTXt" {
            if let Some(token) = find_token(&bytes[data_start..data_end]) {
                return Some(token);
            }
        }
        if chunk_type == b"IEND" {
            return None;
        }
        // Skip past the CRC.
        pos = data_end.checked_add(4)?;
    }
    None
}

/// First `SkyFrame {hex}` token inside a segment, tolerating surrounding text.
fn find_token(data: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(data);
    let mut rest: &str = &text;
    while let Some(idx) = rest.find(COMMENT_PREFIX) {
        let tail = &rest[idx + COMMENT_PREFIX.len()..];
        let token: String = tail.chars().take(WATERMARK_ID_LEN).collect();
        if token.len() == WATERMARK_ID_LEN && token.chars().all(|c| c.is_ascii_hexdigit()) {
            return Some(token.to_ascii_lowercase());
        }
        rest = &rest[idx + COMMENT_PREFIX.len()..];
    }
    None
}
