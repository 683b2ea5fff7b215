//! NDR array types
//!
//! NDR supports several array types:
//!
//! - Fixed arrays: size known at compile time
//! - Conformant arrays: size determined at runtime, transmitted as prefix
//! - Varying arrays: subset of elements transmitted
//! - Conformant varying arrays: both conformant and varying
//!
//! Conformant bounds are one size word per dimension (32-bit in NDR 2.0,
//! 64-bit in NDR64). Inside a conformant structure the bounds travel at the
//! start of the structure, so the free functions here split writing/reading
//! the bounds from writing/reading the elements. The typed containers are
//! for arrays whose bounds directly precede the elements (parameters and
//! pointer referents).

use crate::{NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter, Result, SizeContext};

/// Write one size word per dimension.
pub fn write_sizes(w: &mut NdrWriter, dimension_sizes: &[u64]) -> Result<()> {
    for &size in dimension_sizes {
        w.write_size(size)?;
    }
    Ok(())
}

/// Write exactly `count` elements: missing trailing elements are filled
/// with `T::default()`, surplus elements are dropped.
pub fn write_elements<T>(w: &mut NdrWriter, elements: &[T], count: u64) -> Result<()>
where
    T: NdrEncode + Default,
{
    let mut filler = None;
    for index in 0..count {
        match usize::try_from(index).ok().and_then(|i| elements.get(i)) {
            Some(element) => element.ndr_encode(w)?,
            None => filler.get_or_insert_with(T::default).ndr_encode(w)?,
        }
    }
    Ok(())
}

/// Write the size prefix for each dimension followed by the elements in
/// row-major order.
pub fn write_array<T>(w: &mut NdrWriter, elements: &[T], dimension_sizes: &[u64]) -> Result<()>
where
    T: NdrEncode + Default,
{
    write_sizes(w, dimension_sizes)?;
    let mut total: u64 = 1;
    for &size in dimension_sizes {
        total = total.checked_mul(size).ok_or(NdrError::SizeOutOfRange {
            size,
            limit: u64::MAX / total.max(1),
        })?;
    }
    write_elements(w, elements, total)
}

/// Decode the elements of dimensions `0..dimensions` whose counts are
/// already in `sizes`.
///
/// The total count times `T::ndr_min_size()` is checked against the
/// remaining buffer before anything is allocated.
pub fn read_elements<T, F>(
    r: &mut NdrReader,
    sizes: &SizeContext,
    dimensions: usize,
    mut decode: F,
) -> Result<Vec<T>>
where
    T: NdrDecode,
    F: FnMut(&mut NdrReader) -> Result<T>,
{
    let count = r.check_count(sizes.element_count(dimensions)?, T::ndr_min_size())?;
    let mut elements = Vec::with_capacity(count);
    for _ in 0..count {
        elements.push(decode(r)?);
    }
    Ok(elements)
}

/// Read the size prefix of each dimension into `sizes`, then the elements.
pub fn read_array<T, F>(
    r: &mut NdrReader,
    sizes: &mut SizeContext,
    dimensions: usize,
    decode: F,
) -> Result<(Vec<T>, Vec<u64>)>
where
    T: NdrDecode,
    F: FnMut(&mut NdrReader) -> Result<T>,
{
    sizes.read_prefix(r, dimensions)?;
    let elements = read_elements(r, sizes, dimensions, decode)?;
    Ok((elements, sizes.sizes(dimensions)?))
}

/// Write the `(offset, actual_count)` pair of a varying array.
pub fn write_variance(w: &mut NdrWriter, offset: u64, actual_count: u64) -> Result<()> {
    w.write_size(offset)?;
    w.write_size(actual_count)
}

/// Read `(offset, actual_count)` and check it fits within `max_count`.
pub fn read_variance(r: &mut NdrReader, max_count: u64) -> Result<(u64, u64)> {
    let offset = r.read_size()?;
    let actual_count = r.read_size()?;
    match offset.checked_add(actual_count) {
        Some(end) if end <= max_count => Ok((offset, actual_count)),
        _ => Err(NdrError::ConformanceMismatch {
            max_count,
            offset,
            actual_count,
        }),
    }
}

/// Fixed-size array
///
/// Wire format: just the elements (no size prefix)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedArray<T, const N: usize> {
    pub elements: [T; N],
}

impl<T: Default + Copy, const N: usize> Default for FixedArray<T, N> {
    fn default() -> Self {
        Self {
            elements: [T::default(); N],
        }
    }
}

impl<T, const N: usize> FixedArray<T, N> {
    pub fn new(elements: [T; N]) -> Self {
        Self { elements }
    }
}

impl<T: NdrEncode, const N: usize> NdrEncode for FixedArray<T, N> {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        for element in &self.elements {
            element.ndr_encode(w)?;
        }
        Ok(())
    }

    fn ndr_align() -> usize {
        T::ndr_align()
    }
}

impl<T: NdrDecode + Default + Copy, const N: usize> NdrDecode for FixedArray<T, N> {
    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        let mut elements = [T::default(); N];
        for element in &mut elements {
            *element = T::ndr_decode(r)?;
        }
        Ok(Self { elements })
    }

    fn ndr_align() -> usize {
        <T as NdrDecode>::ndr_align()
    }
}

/// Conformant array
///
/// Wire format: size word, then the elements
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConformantArray<T> {
    pub elements: Vec<T>,
}

impl<T> ConformantArray<T> {
    pub fn new(elements: Vec<T>) -> Self {
        Self { elements }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl<T> From<Vec<T>> for ConformantArray<T> {
    fn from(elements: Vec<T>) -> Self {
        Self::new(elements)
    }
}

impl<T: NdrEncode> NdrEncode for ConformantArray<T> {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        w.write_size(self.elements.len() as u64)?;
        for element in &self.elements {
            element.ndr_encode(w)?;
        }
        Ok(())
    }
}

impl<T: NdrDecode> NdrDecode for ConformantArray<T> {
    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        let mut sizes = SizeContext::new();
        let (elements, _) = read_array(r, &mut sizes, 1, T::ndr_decode)?;
        Ok(Self { elements })
    }
}

/// Varying array with a compile-time maximum of `N` elements
///
/// Wire format: offset, actual count, then the transmitted elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaryingArray<T, const N: usize> {
    pub offset: u64,
    pub elements: Vec<T>,
}

impl<T, const N: usize> Default for VaryingArray<T, N> {
    fn default() -> Self {
        Self {
            offset: 0,
            elements: Vec::new(),
        }
    }
}

impl<T, const N: usize> VaryingArray<T, N> {
    pub fn new(elements: Vec<T>) -> Self {
        Self::with_offset(0, elements)
    }

    pub fn with_offset(offset: u64, elements: Vec<T>) -> Self {
        Self { offset, elements }
    }
}

impl<T: NdrEncode, const N: usize> NdrEncode for VaryingArray<T, N> {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        let actual_count = self.elements.len() as u64;
        if self.offset + actual_count > N as u64 {
            return Err(NdrError::ConformanceMismatch {
                max_count: N as u64,
                offset: self.offset,
                actual_count,
            });
        }
        write_variance(w, self.offset, actual_count)?;
        for element in &self.elements {
            element.ndr_encode(w)?;
        }
        Ok(())
    }
}

impl<T: NdrDecode, const N: usize> NdrDecode for VaryingArray<T, N> {
    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        let (offset, actual_count) = read_variance(r, N as u64)?;
        let mut sizes = SizeContext::new();
        sizes.set(0, actual_count);
        let elements = read_elements(r, &sizes, 1, T::ndr_decode)?;
        Ok(Self { offset, elements })
    }
}

/// Conformant varying array
///
/// Wire format: max count, offset, actual count, then the transmitted elements
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConformantVaryingArray<T> {
    pub max_count: u64,
    pub offset: u64,
    pub elements: Vec<T>,
}

impl<T> ConformantVaryingArray<T> {
    pub fn new(elements: Vec<T>) -> Self {
        Self {
            max_count: elements.len() as u64,
            offset: 0,
            elements,
        }
    }

    pub fn with_max(max_count: u64, elements: Vec<T>) -> Self {
        Self {
            max_count,
            offset: 0,
            elements,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl<T: NdrEncode> NdrEncode for ConformantVaryingArray<T> {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        let actual_count = self.elements.len() as u64;
        if self.offset + actual_count > self.max_count {
            return Err(NdrError::ConformanceMismatch {
                max_count: self.max_count,
                offset: self.offset,
                actual_count,
            });
        }
        w.write_size(self.max_count)?;
        write_variance(w, self.offset, actual_count)?;
        for element in &self.elements {
            element.ndr_encode(w)?;
        }
        Ok(())
    }
}

impl<T: NdrDecode> NdrDecode for ConformantVaryingArray<T> {
    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        let max_count = r.read_size()?;
        let (offset, actual_count) = read_variance(r, max_count)?;
        let mut sizes = SizeContext::new();
        sizes.set(0, actual_count);
        let elements = read_elements(r, &sizes, 1, T::ndr_decode)?;
        Ok(Self {
            max_count,
            offset,
            elements,
        })
    }
}
