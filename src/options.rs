//! Service options negotiated during Init.
//!
//! The client proposes the services it wants to use and the server answers
//! with the subset it can actually provide. The bit positions follow the
//! classic Z39.50 `Options` bit string so that logs remain recognisable.

use bitflags::bitflags;

bitflags! {
    /// Init option bits.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Options: u32 {
        /// Bit 0: Search service.
        const SEARCH = 1 << 0;
        /// Bit 1: Present service.
        const PRESENT = 1 << 1;
        /// Bit 2: Delete result set service.
        const DELETE_SET = 1 << 2;
        /// Bit 3: Resource report service.
        const RESOURCE_REPORT = 1 << 3;
        /// Bit 4: Trigger resource control.
        const TRIGGER_RESOURCE_CONTROL = 1 << 4;
        /// Bit 5: Resource control.
        const RESOURCE_CONTROL = 1 << 5;
        /// Bit 6: Access control.
        const ACCESS_CONTROL = 1 << 6;
        /// Bit 7: Scan service.
        const SCAN = 1 << 7;
        /// Bit 8: Sort service.
        const SORT = 1 << 8;
        /// Bit 10: Extended services.
        const EXTENDED_SERVICES = 1 << 10;
        /// Bit 11: Level-1 segmentation.
        const LEVEL1_SEGMENTATION = 1 << 11;
        /// Bit 12: Level-2 segmentation.
        const LEVEL2_SEGMENTATION = 1 << 12;
        /// Bit 13: Concurrent operations.
        const CONCURRENT_OPERATIONS = 1 << 13;
        /// Bit 14: Named result sets.
        const NAMED_RESULT_SETS = 1 << 14;
    }
}

impl Options {
    /// Services every backend gets for free: the engine implements them on top
    /// of the mandatory `search` and `fetch` capabilities.
    pub const BASELINE: Self = Self::SEARCH
        .union(Self::PRESENT)
        .union(Self::NAMED_RESULT_SETS)
        .union(Self::CONCURRENT_OPERATIONS);

    /// Reduce a client proposal to what the server offers.
    #[must_use]
    pub const fn negotiate(self, offered: Self) -> Self { self.intersection(offered) }

    /// Check whether the Scan service was agreed.
    #[must_use]
    pub const fn allows_scan(self) -> bool { self.contains(Self::SCAN) }

    /// Check whether the Sort service was agreed.
    #[must_use]
    pub const fn allows_sort(self) -> bool { self.contains(Self::SORT) }
}
