//! 16-bit mesh addresses and the shared-prefix address template.
//!
//! Gossip messages carry a neighbour address as its last hexadecimal digit
//! only. The receiver rebuilds the full address by substituting that digit
//! into [`ADDRESS_PREFIX`]. Addresses that differ from the prefix in any other
//! nibble cannot be represented on the wire; this is a protocol limitation,
//! not a bug in the codec.

use std::fmt;

/// High-order bits every node address shares in a demo network.
pub const ADDRESS_PREFIX: u16 = 0x0000;

/// Bits of an address that travel on the wire.
pub const ADDRESS_SUFFIX_MASK: u16 = 0x000F;

/// A node address on the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeshAddress(pub u16);

impl MeshAddress {
    /// The address of a node that has not been provisioned yet.
    pub const UNASSIGNED: Self = Self(0x0000);

    /// Create an address from its raw value.
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Raw 16-bit value.
    pub const fn value(&self) -> u16 {
        self.0
    }

    /// Whether this is the unassigned sentinel.
    pub const fn is_unassigned(&self) -> bool {
        self.0 == Self::UNASSIGNED.0
    }

    /// Build an address from a suffix nibble using the shared prefix.
    pub const fn from_suffix(suffix: u8) -> Self {
        Self(ADDRESS_PREFIX | (suffix as u16 & ADDRESS_SUFFIX_MASK))
    }

    /// The low nibble that is sent on the wire.
    pub const fn suffix(&self) -> u8 {
        (self.0 & ADDRESS_SUFFIX_MASK) as u8
    }

    /// Last hex digit of the address as it appears in `0x%04x` form.
    pub fn suffix_digit(&self) -> char {
        // suffix() is always < 16
        char::from_digit(u32::from(self.suffix()), 16).unwrap_or('0')
    }

    /// Rebuild an address from a wire digit.
    ///
    /// A character that is not a hex digit yields [`MeshAddress::UNASSIGNED`],
    /// which every caller already treats as "ignore".
    pub fn from_suffix_digit(digit: char) -> Self {
        match digit.to_digit(16) {
            Some(nibble) => Self::from_suffix(nibble as u8),
            None => Self::UNASSIGNED,
        }
    }

    /// Whether the address round-trips through the one-digit wire form.
    pub const fn fits_prefix(&self) -> bool {
        self.0 & !ADDRESS_SUFFIX_MASK == ADDRESS_PREFIX
    }
}

impl From<u16> for MeshAddress {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl fmt::Display for MeshAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_digit_is_last_hex_char() {
        assert_eq!(MeshAddress(0x0003).suffix_digit(), '3');
        assert_eq!(MeshAddress(0x000b).suffix_digit(), 'b');
        assert_eq!(MeshAddress(0x00ab).suffix_digit(), 'b');
    }

    #[test]
    fn digit_reconstructs_within_prefix() {
        assert_eq!(MeshAddress::from_suffix_digit('7'), MeshAddress(0x0007));
        assert_eq!(MeshAddress::from_suffix_digit('A'), MeshAddress(0x000a));
        assert_eq!(MeshAddress::from_suffix_digit('N'), MeshAddress::UNASSIGNED);
    }

    #[test]
    fn addresses_outside_prefix_lose_high_nibbles() {
        let far = MeshAddress(0x0013);
        assert!(!far.fits_prefix());
        let rebuilt = MeshAddress::from_suffix_digit(far.suffix_digit());
        assert_eq!(rebuilt, MeshAddress(0x0003));
        assert_ne!(rebuilt, far);
    }

    #[test]
    fn display_matches_firmware_format() {
        assert_eq!(MeshAddress(0x0006).to_string(), "0x0006");
    }
}
