//! Point identifiers

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a measured series.
///
/// Real points are non-negative; `-1` is reserved for blocks nobody owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PointId(i32);

impl PointId {
    /// Owner recorded on blocks that have not been handed out yet
    pub const UNALLOCATED: PointId = PointId(-1);

    /// Create an identifier for a real point
    pub fn new(id: i32) -> Result<Self> {
        if id < 0 {
            return Err(Error::Range(format!("point id {} is negative", id)));
        }
        Ok(Self(id))
    }

    /// Rebuild an identifier from a persisted record without validation
    pub(crate) fn from_raw(id: i32) -> Self {
        Self(id)
    }

    pub fn as_i32(&self) -> i32 {
        self.0
    }

    pub fn is_unallocated(&self) -> bool {
        *self == Self::UNALLOCATED
    }
}

impl Default for PointId {
    fn default() -> Self {
        Self::UNALLOCATED
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
