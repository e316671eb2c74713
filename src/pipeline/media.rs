//! Media type detection for uploaded documents and photos.

pub const PDF: &str = "application/pdf";
pub const PNG: &str = "image/png";
pub const JPEG: &str = "image/jpeg";
pub const GIF: &str = "image/gif";

/// Detect the media type from magic bytes. Unrecognized input is treated as JPEG.
pub fn detect_media_type(bytes: &[u8]) -> &'static str {
    match bytes {
        // %PDF
        [0x25, 0x50, 0x44, 0x46, ..] => PDF,
        [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, ..] => PNG,
        [0xFF, 0xD8, ..] => JPEG,
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => GIF,
        _ => JPEG,
    }
}

/// Use the explicit media type when one was supplied, else sniff the bytes.
pub fn resolve(bytes: &[u8], explicit: Option<&str>) -> String {
    match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(mt) => mt.to_ascii_lowercase(),
        None => detect_media_type(bytes).to_string(),
    }
}

pub fn is_pdf(media_type: &str) -> bool {
    media_type == PDF
}

pub fn is_image(media_type: &str) -> bool {
    media_type.starts_with("image/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes() {
        assert_eq!(detect_media_type(b"%PDF-1.7\n"), PDF);
        assert_eq!(
            detect_media_type(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00]),
            PNG
        );
        assert_eq!(detect_media_type(&[0xFF, 0xD8, 0xFF, 0xE0]), JPEG);
        assert_eq!(detect_media_type(b"GIF89a...."), GIF);
        assert_eq!(detect_media_type(b"GIF87a"), GIF);
    }

    #[test]
    fn unknown_defaults_to_jpeg() {
        assert_eq!(detect_media_type(b"hello"), JPEG);
        assert_eq!(detect_media_type(&[]), JPEG);
        // truncated PNG header
        assert_eq!(detect_media_type(&[0x89, 0x50, 0x4E]), JPEG);
    }

    #[test]
    fn explicit_type_wins() {
        assert_eq!(resolve(b"%PDF", Some("Image/PNG")), "image/png");
        assert_eq!(resolve(b"%PDF", Some("  ")), PDF);
        assert_eq!(resolve(b"%PDF", None), PDF);
    }
}
