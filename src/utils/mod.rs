//! Utility functions for peforge

use std::env;

/// Check if an environment variable is set to a truthy value
/// Accepts: "1", "true", "on", "yes", "t" (case insensitive)
pub fn is_env_true(key: &str) -> bool {
    match env::var(key) {
        Ok(val) => is_truthy(&val),
        Err(_) => false,
    }
}

/// Truthiness rule used for configuration strings
pub fn is_truthy(value: &str) -> bool {
    let val_lower = value.trim().to_lowercase();
    matches!(val_lower.as_str(), "1" | "true" | "on" | "yes" | "t")
}

/// Render bytes as `aa:bb:cc`, the way serial numbers are usually shown
pub fn colon_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Serde adapter writing byte buffers as lowercase hex strings
pub mod hex_bytes {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }
}

/// Serde adapter writing serial numbers as `aa:bb:cc`
pub mod serial_hex {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::colon_hex(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_truthy() {
        for v in ["1", "true", "ON", "Yes", "t", " true "] {
            assert!(is_truthy(v), "{v}");
        }
        for v in ["0", "false", "", "nope"] {
            assert!(!is_truthy(v), "{v}");
        }
    }

    #[test]
    fn test_colon_hex() {
        assert_eq!(colon_hex(&[0x01, 0xab, 0x00]), "01:ab:00");
        assert_eq!(colon_hex(&[]), "");
    }
}
