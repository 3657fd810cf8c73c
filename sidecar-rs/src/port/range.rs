/**
 * range.rs
 * Inclusive port interval scanned by the allocator
 *
 * Default range: [8000, 9000] (1001 ports)
 */

use serde::Serialize;
use std::ops::RangeInclusive;

use crate::errors::{Result, SidecarError};

pub const DEFAULT_START_PORT: u16 = 8000;
pub const DEFAULT_END_PORT: u16 = 9000;

/// Inclusive port range, validated on construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    /// Create a range `[start, end]`
    ///
    /// # Errors
    /// `InvalidRange` when `start > end`, `InvalidPort` when `start` is 0
    pub fn new(start: u16, end: u16) -> Result<Self> {
        if start > end {
            return Err(SidecarError::InvalidRange { start, end });
        }
        if start == 0 {
            return Err(SidecarError::InvalidPort(0));
        }
        Ok(PortRange { start, end })
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    /// Check if port is within this range
    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    /// Number of ports in the range (never zero)
    pub fn len(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// All ports in ascending order
    pub fn ports(&self) -> RangeInclusive<u16> {
        self.start..=self.end
    }
}

impl Default for PortRange {
    fn default() -> Self {
        PortRange {
            start: DEFAULT_START_PORT,
            end: DEFAULT_END_PORT,
        }
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}
