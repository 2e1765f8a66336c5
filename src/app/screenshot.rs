use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

pub fn is_png(bytes: &[u8]) -> bool {
    bytes.len() > PNG_SIGNATURE.len() && bytes.starts_with(PNG_SIGNATURE)
}

/// Base64 of the PNG, the shape the UI layer consumes.
pub fn png_bytes_to_base64(bytes: &[u8]) -> Result<String, String> {
    if bytes.len() <= PNG_SIGNATURE.len() {
        return Err("Screenshot data is empty".to_string());
    }
    if !bytes.starts_with(PNG_SIGNATURE) {
        return Err("Screenshot data is not a PNG".to_string());
    }
    Ok(STANDARD.encode(bytes))
}
