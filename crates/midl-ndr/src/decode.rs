//! NDR decoding: the [`NdrDecode`] trait and the [`NdrReader`] cursor
//!
//! The reader mirrors [`NdrWriter`](crate::NdrWriter): a non-null pointer
//! marker hands back an empty [`Referent`] slot and queues the decoder that
//! fills it. The slot is populated when the enclosing level calls
//! [`NdrReader::read_deferred`].

use std::collections::VecDeque;

use bytes::Bytes;

use crate::context::{NdrContext, TransferSyntax};
use crate::pointers::{PointerKind, Referent};
use crate::primitives::NdrScalar;
use crate::{NdrError, Result};

/// Trait for types that can be decoded from NDR format
pub trait NdrDecode: Sized {
    /// Decode a value at the reader's current position.
    fn ndr_decode(r: &mut NdrReader) -> Result<Self>;

    /// Get the NDR alignment requirement for this type
    fn ndr_align() -> usize {
        1
    }

    /// Fewest bytes one value occupies on the wire.
    ///
    /// Bounds declared element counts before allocation. A value is never
    /// narrower than its alignment.
    fn ndr_min_size() -> usize {
        Self::ndr_align()
    }
}

type DeferredRead = Box<dyn FnOnce(&mut NdrReader) -> Result<()>>;

/// Input cursor for a single NDR decode pass
pub struct NdrReader {
    buf: Bytes,
    pos: usize,
    ctx: NdrContext,
    levels: Vec<VecDeque<DeferredRead>>,
}

impl NdrReader {
    pub fn new(buf: Bytes) -> Self {
        Self::with_context(buf, NdrContext::default())
    }

    pub fn with_context(buf: Bytes, ctx: NdrContext) -> Self {
        Self {
            buf,
            pos: 0,
            ctx,
            levels: vec![VecDeque::new()],
        }
    }

    pub fn context(&self) -> &NdrContext {
        &self.ctx
    }

    pub fn syntax(&self) -> TransferSyntax {
        self.ctx.syntax
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.remaining() < needed {
            return Err(NdrError::UnexpectedEndOfBuffer {
                needed,
                have: self.remaining(),
            });
        }
        Ok(())
    }

    /// Skip padding up to the next multiple of `alignment`.
    ///
    /// Never fails; if the buffer ends inside the padding the cursor stops
    /// at the end and the next read reports the truncation.
    pub fn read_align(&mut self, alignment: usize) {
        let padding = NdrContext::align_padding(self.pos, alignment);
        self.pos += padding.min(self.remaining());
    }

    pub fn align_pointer(&mut self) {
        self.read_align(self.ctx.syntax.pointer_size());
    }

    /// Read an aligned little-endian scalar
    pub fn read_data<T: NdrScalar>(&mut self) -> Result<T> {
        self.read_align(T::WIDTH);
        self.ensure(T::WIDTH)?;
        let value = T::take(&self.buf[self.pos..self.pos + T::WIDTH]);
        self.pos += T::WIDTH;
        Ok(value)
    }

    /// Read `len` raw bytes without alignment
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.ensure(len)?;
        let bytes = self.buf.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(bytes)
    }

    /// Read an array size, offset or length word.
    ///
    /// Values above the context's `max_elements` are rejected.
    pub fn read_size(&mut self) -> Result<u64> {
        let size = match self.ctx.syntax {
            TransferSyntax::Ndr20 => self.read_data::<u32>()? as u64,
            TransferSyntax::Ndr64 => self.read_data::<u64>()?,
        };
        if size > self.ctx.max_elements {
            return Err(NdrError::SizeOutOfRange {
                size,
                limit: self.ctx.max_elements,
            });
        }
        Ok(size)
    }

    /// Validate `count` elements of at least `element_size` bytes each
    /// against the bytes left, before anything is allocated.
    pub fn check_count(&self, count: u64, element_size: usize) -> Result<usize> {
        let remaining = self.remaining();
        match count.checked_mul(element_size.max(1) as u64) {
            Some(needed) if needed <= remaining as u64 => {}
            _ => {
                return Err(NdrError::BufferOverflow {
                    declared: count,
                    remaining,
                })
            }
        }
        usize::try_from(count).map_err(|_| NdrError::SizeOutOfRange {
            size: count,
            limit: usize::MAX as u64,
        })
    }

    fn read_marker(&mut self) -> Result<u64> {
        match self.ctx.syntax {
            TransferSyntax::Ndr20 => Ok(self.read_data::<u32>()? as u64),
            TransferSyntax::Ndr64 => self.read_data::<u64>(),
        }
    }

    /// Queue a job on the current deferral level
    pub fn defer<F>(&mut self, job: F)
    where
        F: FnOnce(&mut NdrReader) -> Result<()> + 'static,
    {
        if self.levels.is_empty() {
            self.levels.push(VecDeque::new());
        }
        if let Some(level) = self.levels.last_mut() {
            level.push_back(Box::new(job));
        }
    }

    /// Read a pointer marker; for a non-null marker queue `decoder` and
    /// return the slot it will fill.
    pub fn read_pointer_with<T, F>(
        &mut self,
        kind: PointerKind,
        decoder: F,
    ) -> Result<Option<Referent<T>>>
    where
        T: 'static,
        F: FnOnce(&mut NdrReader) -> Result<T> + 'static,
    {
        let marker = self.read_marker()?;
        if marker == 0 {
            if !kind.is_nullable() {
                return Err(NdrError::NullReferencePointer);
            }
            return Ok(None);
        }
        let slot = Referent::pending();
        let target = slot.clone();
        self.defer(move |r| {
            let value = decoder(r)?;
            target.set(value)
        });
        Ok(Some(slot))
    }

    pub fn read_pointer<T>(&mut self, kind: PointerKind) -> Result<Option<Referent<T>>>
    where
        T: NdrDecode + 'static,
    {
        self.read_pointer_with(kind, T::ndr_decode)
    }

    /// Run the current deferral level in the order it was filled.
    pub fn read_deferred(&mut self) -> Result<()> {
        let jobs = match self.levels.last_mut() {
            Some(level) => std::mem::take(level),
            None => return Ok(()),
        };
        for job in jobs {
            self.levels.push(VecDeque::new());
            let result = job(self).and_then(|()| self.read_deferred());
            self.levels.pop();
            result?;
        }
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.levels.last().map_or(0, VecDeque::len)
    }
}

impl std::fmt::Debug for NdrReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NdrReader")
            .field("position", &self.pos)
            .field("remaining", &self.remaining())
            .field("syntax", &self.ctx.syntax)
            .field("pending", &self.pending())
            .finish()
    }
}

/// Decode a complete stub into `T`, running its deferred referents.
///
/// Bytes left over after decoding are ignored.
pub fn from_bytes<T: NdrDecode>(buf: Bytes, ctx: NdrContext) -> Result<T> {
    let mut r = NdrReader::with_context(buf, ctx);
    let value = T::ndr_decode(&mut r)?;
    r.read_deferred()?;
    Ok(value)
}
