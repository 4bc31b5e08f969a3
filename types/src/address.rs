//! Contract addresses and token colors.

use {
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Length of an address in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Length of a token color in bytes.
pub const COLOR_LEN: usize = 32;

/// A 20-byte contract / account address on the value ledger.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Parse from a byte slice. Returns `None` on wrong length.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; ADDRESS_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// True for the all-zero address, which is never a valid contract.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// A 32-byte token color. The color of a committee's token doubles as the
/// identifier of its origin transaction on the value ledger.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Color([u8; COLOR_LEN]);

impl Color {
    /// The "new token" placeholder color. Never a valid committee color.
    pub const NEW: Color = Color([0u8; COLOR_LEN]);

    /// The reserved base-token color. Never a valid committee color.
    pub const IOTA: Color = Color([0xffu8; COLOR_LEN]);

    pub const fn new(bytes: [u8; COLOR_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; COLOR_LEN] {
        &self.0
    }

    /// Parse from a byte slice. Returns `None` on wrong length.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; COLOR_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// True iff this color may identify a committee: neither the
    /// placeholder nor the reserved base-token color.
    pub fn is_valid_committee_color(&self) -> bool {
        *self != Self::NEW && *self != Self::IOTA
    }
}

impl AsRef<[u8]> for Color {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Color({self})")
    }
}
