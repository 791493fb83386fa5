//! Local node identity: device UUID and short display name.

use std::fmt;

/// Maximum length of a short device name in bytes.
pub const SHORT_NAME_LEN: usize = 3;

/// A device name of at most [`SHORT_NAME_LEN`] bytes, e.g. `P` or `N12`.
///
/// Longer input is cut at the last character boundary that fits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShortName(String);

impl ShortName {
    /// Create a name, truncating to [`SHORT_NAME_LEN`] bytes.
    pub fn new(name: &str) -> Self {
        Self::truncated(name, SHORT_NAME_LEN)
    }

    /// Create a name truncated to `max` bytes (never more than [`SHORT_NAME_LEN`]).
    pub fn truncated(name: &str, max: usize) -> Self {
        let max = max.min(SHORT_NAME_LEN);
        let mut end = name.len().min(max);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        Self(name[..end].to_string())
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether no name has been assigned.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ShortName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for ShortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 128-bit device identifier announced while unprovisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceUuid(pub [u8; 16]);

impl DeviceUuid {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex of the first `n` bytes, as shown on the node display.
    pub fn short_hex(&self, n: usize) -> String {
        hex::encode(&self.0[..n.min(16)])
    }
}

impl fmt::Display for DeviceUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_hex(16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_truncates_to_three_bytes() {
        assert_eq!(ShortName::new("N123").as_str(), "N12");
        assert_eq!(ShortName::new("P").as_str(), "P");
        assert_eq!(ShortName::truncated("PROV", 1).as_str(), "P");
    }

    #[test]
    fn short_name_respects_char_boundaries() {
        // 'é' is two bytes; "aé" is three bytes, "aéb" is four.
        assert_eq!(ShortName::new("aéb").as_str(), "aé");
        assert_eq!(ShortName::new("éé").as_str(), "é");
    }

    #[test]
    fn uuid_short_hex() {
        let mut bytes = [0u8; 16];
        bytes[0] = 0xbb;
        bytes[1] = 0xaa;
        assert_eq!(DeviceUuid(bytes).short_hex(2), "bbaa");
        assert_eq!(DeviceUuid(bytes).short_hex(0), "");
        assert_eq!(DeviceUuid(bytes).short_hex(40), format!("bbaa{}", "00".repeat(14)));
    }
}
