//! Inclusive port ranges.

use std::fmt;

use crate::error::RecordError;

/// PortRange is an inclusive `min..=max` range with `min <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRange {
    min: u16,
    max: u16,
}

impl PortRange {
    /// Create a range. Returns `None` when `min > max`.
    pub fn new(min: u16, max: u16) -> Option<Self> {
        (min <= max).then_some(Self { min, max })
    }

    /// A range covering one port.
    pub fn single(port: u16) -> Self {
        Self {
            min: port,
            max: port,
        }
    }

    /// Every port, 0-65535.
    pub fn all() -> Self {
        Self {
            min: 0,
            max: u16::MAX,
        }
    }

    /// Validate raw feed values for rule number `rule`.
    pub fn from_feed(rule: usize, min: i64, max: i64) -> Result<Self, RecordError> {
        let min_port =
            u16::try_from(min).map_err(|_| RecordError::PortOutOfRange { rule, port: min })?;
        let max_port =
            u16::try_from(max).map_err(|_| RecordError::PortOutOfRange { rule, port: max })?;
        Self::new(min_port, max_port).ok_or(RecordError::InvertedPortRange {
            rule,
            min: min_port,
            max: max_port,
        })
    }

    pub fn min(&self) -> u16 {
        self.min
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    #[inline]
    pub fn contains(&self, port: u16) -> bool {
        self.min <= port && port <= self.max
    }

    /// Whether this is the `*` range: every non-zero port.
    pub fn is_wildcard(&self) -> bool {
        self.min == 1 && self.max == u16::MAX
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_wildcard() {
            write!(f, "*")
        } else if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}-{}", self.min, self.max)
        }
    }
}
