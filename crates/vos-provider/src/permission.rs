//! Permission bitmask (§3, §6).

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// A small bitmask of independent permission bits.
///
/// Persisted exactly as `read=1, write=2, execute=4` by the embedded-store
/// provider (§6), so the numeric values of [`Permission::READ`],
/// [`Permission::WRITE`], and [`Permission::EXECUTE`] are part of the public
/// contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Permission(u8);

impl Permission {
    pub const NONE: Permission = Permission(0);
    pub const READ: Permission = Permission(1);
    pub const WRITE: Permission = Permission(2);
    pub const EXECUTE: Permission = Permission(4);

    pub const RO: Permission = Permission(Self::READ.0);
    pub const RW: Permission = Permission(Self::READ.0 | Self::WRITE.0);
    pub const RX: Permission = Permission(Self::READ.0 | Self::EXECUTE.0);
    pub const RWX: Permission = Permission(Self::READ.0 | Self::WRITE.0 | Self::EXECUTE.0);

    /// Build a permission mask from its raw numeric encoding.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Permission(bits & 0b111)
    }

    /// The raw numeric encoding (§6).
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn can_read(self) -> bool {
        self.0 & Self::READ.0 != 0
    }

    #[must_use]
    pub const fn can_write(self) -> bool {
        self.0 & Self::WRITE.0 != 0
    }

    #[must_use]
    pub const fn can_execute(self) -> bool {
        self.0 & Self::EXECUTE.0 != 0
    }
}

impl BitOr for Permission {
    type Output = Permission;
    fn bitor(self, rhs: Self) -> Self::Output {
        Permission(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permission {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.can_read() { 'r' } else { '-' };
        let w = if self.can_write() { 'w' } else { '-' };
        let x = if self.can_execute() { 'x' } else { '-' };
        write!(f, "{r}{w}{x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_match_the_persisted_encoding() {
        assert_eq!(Permission::READ.bits(), 1);
        assert_eq!(Permission::WRITE.bits(), 2);
        assert_eq!(Permission::EXECUTE.bits(), 4);
        assert_eq!(Permission::RW.bits(), 3);
        assert_eq!(Permission::RX.bits(), 5);
        assert_eq!(Permission::RWX.bits(), 7);
    }

    #[test]
    fn queries() {
        assert!(Permission::RW.can_read());
        assert!(Permission::RW.can_write());
        assert!(!Permission::RW.can_execute());
        assert!(!Permission::NONE.can_read());
    }

    #[test]
    fn display_formats_like_ls() {
        assert_eq!(Permission::RWX.to_string(), "rwx");
        assert_eq!(Permission::RO.to_string(), "r--");
        assert_eq!(Permission::NONE.to_string(), "---");
    }
}
