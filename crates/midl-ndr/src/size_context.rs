//! Per-structure array size context
//!
//! A conformant structure carries its array bounds as a prefix ahead of its
//! fixed fields while the elements come last. The decoded bounds are kept
//! here and handed explicitly to the element decoder.

use crate::{NdrError, NdrReader, Result};

/// Element count per array dimension, for one structure decode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SizeContext {
    dims: Vec<Option<u64>>,
}

impl SizeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Establish the count of `dimension`, e.g. from a sibling length field
    pub fn set(&mut self, dimension: usize, count: u64) {
        if self.dims.len() <= dimension {
            self.dims.resize(dimension + 1, None);
        }
        self.dims[dimension] = Some(count);
    }

    pub fn get(&self, dimension: usize) -> Result<u64> {
        self.dims
            .get(dimension)
            .copied()
            .flatten()
            .ok_or(NdrError::MissingSize { dimension })
    }

    pub fn is_set(&self, dimension: usize) -> bool {
        self.get(dimension).is_ok()
    }

    /// Read one size word per dimension into dimensions `0..dimensions`
    pub fn read_prefix(&mut self, r: &mut NdrReader, dimensions: usize) -> Result<()> {
        for dimension in 0..dimensions {
            let count = r.read_size()?;
            self.set(dimension, count);
        }
        Ok(())
    }

    pub fn sizes(&self, dimensions: usize) -> Result<Vec<u64>> {
        (0..dimensions).map(|d| self.get(d)).collect()
    }

    /// Total number of elements across `0..dimensions`
    pub fn element_count(&self, dimensions: usize) -> Result<u64> {
        let mut total: u64 = 1;
        for dimension in 0..dimensions {
            let count = self.get(dimension)?;
            total = total.checked_mul(count).ok_or(NdrError::SizeOutOfRange {
                size: count,
                limit: u64::MAX / total.max(1),
            })?;
        }
        Ok(total)
    }
}
