//! NDR encoding: the [`NdrEncode`] trait and the [`NdrWriter`] wire buffer
//!
//! The writer owns the output buffer for one encode pass. Alignment is
//! computed from the start of that buffer, so a writer must be created fresh
//! for each stub (request or response body).
//!
//! # Deferred referents
//!
//! A non-null pointer writes only its referent id inline. The referent
//! itself is queued on the current deferral level and written when the
//! enclosing level calls [`NdrWriter::write_deferred`]. Each queued job runs
//! on a level of its own which is drained before the next sibling job, so
//! nested referents come out depth-first.

use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};

use crate::context::{NdrContext, TransferSyntax};
use crate::pointers::{PointerKind, Referent};
use crate::primitives::NdrScalar;
use crate::{NdrError, Result};

/// Trait for types that can be encoded to NDR format
pub trait NdrEncode {
    /// Encode this value at the writer's current position.
    ///
    /// Pointer referents are queued, not written; the caller owning the
    /// enclosing level flushes them with [`NdrWriter::write_deferred`].
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()>;

    /// Get the NDR alignment requirement for this type
    fn ndr_align() -> usize
    where
        Self: Sized,
    {
        1
    }
}

/// First referent id handed out for a non-null pointer
pub const FIRST_REFERENT_ID: u32 = 0x0002_0000;

type DeferredWrite = Box<dyn FnOnce(&mut NdrWriter) -> Result<()>>;

/// Output buffer for a single NDR encode pass
pub struct NdrWriter {
    buf: BytesMut,
    ctx: NdrContext,
    next_referent: u32,
    levels: Vec<VecDeque<DeferredWrite>>,
}

impl NdrWriter {
    pub fn new() -> Self {
        Self::with_context(NdrContext::default())
    }

    pub fn with_context(ctx: NdrContext) -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            ctx,
            next_referent: FIRST_REFERENT_ID,
            levels: vec![VecDeque::new()],
        }
    }

    pub fn context(&self) -> &NdrContext {
        &self.ctx
    }

    pub fn syntax(&self) -> TransferSyntax {
        self.ctx.syntax
    }

    /// Offset from the start of the stream
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// Bytes written so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Pad with zeros up to the next multiple of `alignment`
    pub fn write_align(&mut self, alignment: usize) {
        let padding = NdrContext::align_padding(self.buf.len(), alignment);
        self.buf.put_bytes(0, padding);
    }

    /// Align to the width of a pointer marker (4 in NDR 2.0, 8 in NDR64)
    pub fn align_pointer(&mut self) {
        self.write_align(self.ctx.syntax.pointer_size());
    }

    /// Write an aligned little-endian scalar
    pub fn write_data<T: NdrScalar>(&mut self, value: T) {
        self.write_align(T::WIDTH);
        value.put(&mut self.buf);
    }

    /// Write raw bytes without alignment
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    /// Write an array size, offset or length word.
    ///
    /// NDR 2.0 carries these as 32-bit values; larger sizes are rejected.
    pub fn write_size(&mut self, size: u64) -> Result<()> {
        match self.ctx.syntax {
            TransferSyntax::Ndr20 => {
                let size = u32::try_from(size).map_err(|_| NdrError::SizeOutOfRange {
                    size,
                    limit: u32::MAX as u64,
                })?;
                self.write_data(size);
            }
            TransferSyntax::Ndr64 => self.write_data(size),
        }
        Ok(())
    }

    fn write_marker(&mut self, marker: u32) {
        match self.ctx.syntax {
            TransferSyntax::Ndr20 => self.write_data(marker),
            TransferSyntax::Ndr64 => self.write_data(marker as u64),
        }
    }

    fn next_referent_id(&mut self) -> u32 {
        let id = self.next_referent;
        self.next_referent = self.next_referent.wrapping_add(4);
        id
    }

    /// Queue a job on the current deferral level
    pub fn defer<F>(&mut self, job: F)
    where
        F: FnOnce(&mut NdrWriter) -> Result<()> + 'static,
    {
        if self.levels.is_empty() {
            self.levels.push(VecDeque::new());
        }
        if let Some(level) = self.levels.last_mut() {
            level.push_back(Box::new(job));
        }
    }

    /// Write a pointer marker and queue `encoder` for the referent.
    ///
    /// # Panics
    ///
    /// Panics if `present` is false for a [`PointerKind::Ref`] pointer. A
    /// reference pointer must always point at data; nothing is written in
    /// that case.
    pub fn write_pointer_with<F>(&mut self, kind: PointerKind, present: bool, encoder: F)
    where
        F: FnOnce(&mut NdrWriter) -> Result<()> + 'static,
    {
        if !present {
            assert!(
                kind.is_nullable(),
                "null value encoded into a [ref] pointer"
            );
            self.write_marker(0);
            return;
        }
        let id = self.next_referent_id();
        self.write_marker(id);
        self.defer(encoder);
    }

    /// Write a pointer to an optional referent.
    ///
    /// An absent or not yet filled referent is a null pointer.
    ///
    /// # Panics
    ///
    /// Same contract as [`NdrWriter::write_pointer_with`].
    pub fn write_pointer<T>(&mut self, kind: PointerKind, referent: Option<&Referent<T>>)
    where
        T: NdrEncode + 'static,
    {
        let slot = referent.filter(|r| r.is_set()).cloned();
        let present = slot.is_some();
        self.write_pointer_with(kind, present, move |w| match slot {
            Some(slot) => slot.encode_referent(w),
            None => Ok(()),
        });
    }

    /// Flush the current deferral level in the order it was filled.
    pub fn write_deferred(&mut self) -> Result<()> {
        let jobs = match self.levels.last_mut() {
            Some(level) => std::mem::take(level),
            None => return Ok(()),
        };
        for job in jobs {
            self.levels.push(VecDeque::new());
            let result = job(self).and_then(|()| self.write_deferred());
            self.levels.pop();
            result?;
        }
        Ok(())
    }

    /// Number of jobs queued on the current level
    pub fn pending(&self) -> usize {
        self.levels.last().map_or(0, VecDeque::len)
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

impl Default for NdrWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NdrWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NdrWriter")
            .field("position", &self.buf.len())
            .field("syntax", &self.ctx.syntax)
            .field("levels", &self.levels.len())
            .field("pending", &self.pending())
            .finish()
    }
}

/// Encode `value` as a complete stub, flushing its deferred referents.
pub fn to_bytes<T: NdrEncode + ?Sized>(value: &T, ctx: NdrContext) -> Result<Bytes> {
    let mut w = NdrWriter::with_context(ctx);
    value.ndr_encode(&mut w)?;
    w.write_deferred()?;
    Ok(w.into_bytes())
}
