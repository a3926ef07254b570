use base64::Engine as _;

/// Base64 characters needed to cover the longest signature we sniff (12 bytes).
const SNIFF_CHARS: usize = 16;

/// Guess the MIME type of a base64 image from its magic bytes.
///
/// Undecodable or unknown payloads fall back to `image/jpeg`.
pub fn detect_image_mime(image_base64: &str) -> &'static str {
    let prefix: String = image_base64
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .take(SNIFF_CHARS)
        .collect();

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&prefix)
        .unwrap_or_default();

    match bytes.as_slice() {
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x89, 0x50, 0x4E, 0x47, ..] => "image/png",
        [0x47, 0x49, 0x46, 0x38, ..] => "image/gif",
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => "image/webp",
        _ => {
            tracing::debug!("Unrecognized image signature, assuming image/jpeg");
            "image/jpeg"
        }
    }
}

/// Wrap a base64 payload into a `data:` URL. Payloads that already are one pass through.
pub fn data_url(image_base64: &str) -> String {
    let trimmed = image_base64.trim();
    if trimmed.starts_with("data:") {
        return trimmed.to_string();
    }
    format!("data:{};base64,{}", detect_image_mime(trimmed), trimmed)
}
