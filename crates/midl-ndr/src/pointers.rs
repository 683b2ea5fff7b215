//! NDR pointer types
//!
//! NDR supports three pointer semantics:
//!
//! - Reference (`[ref]`): never null
//! - Unique (`[unique]`): nullable, no aliasing
//! - Full (`[ptr]`): nullable; aliasing is not tracked, every full pointer
//!   is encoded independently like a unique pointer
//!
//! Embedded pointers are written as a referent id inline with the referent
//! deferred (see [`NdrWriter::write_deferred`]). On decode the referent is
//! delivered through a shared [`Referent`] slot once the deferral level runs.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::{NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter, Result};

/// Pointer semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Ref,
    Unique,
    Full,
}

impl PointerKind {
    pub fn is_nullable(self) -> bool {
        !matches!(self, PointerKind::Ref)
    }
}

/// Write-once slot holding a pointer's referent.
///
/// Encoders create it filled. Decoders receive it empty from
/// [`NdrReader::read_pointer`] and it is filled when the deferred decoder runs.
pub struct Referent<T>(Arc<OnceLock<T>>);

impl<T> Referent<T> {
    pub fn new(value: T) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(value);
        Self(Arc::new(cell))
    }

    pub fn pending() -> Self {
        Self(Arc::new(OnceLock::new()))
    }

    pub fn get(&self) -> Option<&T> {
        self.0.get()
    }

    pub fn is_set(&self) -> bool {
        self.0.get().is_some()
    }

    pub fn set(&self, value: T) -> Result<()> {
        self.0.set(value).map_err(|_| NdrError::ReferentAlreadySet)
    }

    /// Take the value out. Returns `None` if the slot is empty or still
    /// shared with a queued decoder.
    pub fn into_inner(self) -> Option<T> {
        Arc::try_unwrap(self.0).ok().and_then(OnceLock::into_inner)
    }
}

impl<T: NdrEncode> Referent<T> {
    pub(crate) fn encode_referent(&self, w: &mut NdrWriter) -> Result<()> {
        match self.get() {
            Some(value) => value.ndr_encode(w),
            None => Ok(()),
        }
    }
}

impl<T> Clone for Referent<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for Referent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("Referent").field(value).finish(),
            None => f.write_str("Referent(<pending>)"),
        }
    }
}

impl<T: PartialEq> PartialEq for Referent<T> {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

/// Reference pointer - never null
#[derive(Debug, Clone, PartialEq)]
pub struct RefPtr<T>(Referent<T>);

impl<T> RefPtr<T> {
    pub fn new(value: T) -> Self {
        Self(Referent::new(value))
    }

    /// The referent; `None` only before the deferred decode has run
    pub fn get(&self) -> Option<&T> {
        self.0.get()
    }

    pub fn into_inner(self) -> Option<T> {
        self.0.into_inner()
    }
}

impl<T: NdrEncode + 'static> NdrEncode for RefPtr<T> {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        w.write_pointer(PointerKind::Ref, Some(&self.0));
        Ok(())
    }
}

impl<T: NdrDecode + 'static> NdrDecode for RefPtr<T> {
    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        r.read_pointer(PointerKind::Ref)?
            .map(Self)
            .ok_or(NdrError::NullReferencePointer)
    }
}

macro_rules! nullable_pointer {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name<T>(Option<Referent<T>>);

        impl<T> $name<T> {
            pub fn new(value: T) -> Self {
                Self(Some(Referent::new(value)))
            }

            pub fn null() -> Self {
                Self(None)
            }

            pub fn is_null(&self) -> bool {
                self.0.is_none()
            }

            pub fn get(&self) -> Option<&T> {
                self.0.as_ref().and_then(Referent::get)
            }

            pub fn into_option(self) -> Option<T> {
                self.0.and_then(Referent::into_inner)
            }
        }

        impl<T> Default for $name<T> {
            fn default() -> Self {
                Self::null()
            }
        }

        impl<T> From<Option<T>> for $name<T> {
            fn from(value: Option<T>) -> Self {
                Self(value.map(Referent::new))
            }
        }

        impl<T: NdrEncode + 'static> NdrEncode for $name<T> {
            fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
                w.write_pointer($kind, self.0.as_ref());
                Ok(())
            }
        }

        impl<T: NdrDecode + 'static> NdrDecode for $name<T> {
            fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
                Ok(Self(r.read_pointer($kind)?))
            }
        }
    };
}

nullable_pointer!(
    /// Unique pointer - nullable, no aliasing
    UniquePtr,
    PointerKind::Unique
);

nullable_pointer!(
    /// Full pointer - nullable, encoded like a unique pointer
    FullPtr,
    PointerKind::Full
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{from_bytes, to_bytes, NdrContext};
    use bytes::Bytes;

    /// `{ a: u32, p1: *u32, b: u16, p2: *u64 }`
    #[derive(Debug, Default, PartialEq)]
    struct Mixed {
        a: u32,
        p1: UniquePtr<u32>,
        b: u16,
        p2: UniquePtr<u64>,
    }

    impl NdrEncode for Mixed {
        fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
            w.write_align(4);
            self.a.ndr_encode(w)?;
            self.p1.ndr_encode(w)?;
            self.b.ndr_encode(w)?;
            self.p2.ndr_encode(w)
        }
    }

    impl NdrDecode for Mixed {
        fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
            r.read_align(4);
            Ok(Self {
                a: u32::ndr_decode(r)?,
                p1: UniquePtr::ndr_decode(r)?,
                b: u16::ndr_decode(r)?,
                p2: UniquePtr::ndr_decode(r)?,
            })
        }
    }

    #[test]
    fn test_referents_follow_fixed_fields_in_order() {
        let value = Mixed {
            a: 1,
            p1: UniquePtr::new(0x11111111),
            b: 2,
            p2: UniquePtr::new(0x2222222222222222),
        };
        let bytes = to_bytes(&value, NdrContext::default()).unwrap();

        assert_eq!(
            bytes.as_ref(),
            &[
                0x01, 0x00, 0x00, 0x00, // a
                0x00, 0x00, 0x02, 0x00, // p1 marker
                0x02, 0x00, 0x00, 0x00, // b + pad
                0x04, 0x00, 0x02, 0x00, // p2 marker
                0x11, 0x11, 0x11, 0x11, // *p1
                0x00, 0x00, 0x00, 0x00, // pad to 8
                0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, // *p2
            ]
        );

        let decoded: Mixed = from_bytes(bytes, NdrContext::default()).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_null_pointer_consumes_only_marker() {
        let value = Mixed {
            a: 7,
            p1: UniquePtr::null(),
            b: 9,
            p2: UniquePtr::new(5),
        };
        let bytes = to_bytes(&value, NdrContext::default()).unwrap();
        // fixed part (16) + one 8-byte referent, no bytes for the null pointer
        assert_eq!(bytes.len(), 24);

        let mut r = NdrReader::new(bytes);
        let decoded = Mixed::ndr_decode(&mut r).unwrap();
        assert_eq!(r.position(), 16);
        assert_eq!(r.pending(), 1);
        r.read_deferred().unwrap();
        assert_eq!(r.remaining(), 0);

        assert!(decoded.p1.is_null());
        assert_eq!(decoded.p1.get(), None);
        assert_eq!(decoded.p2.get(), Some(&5));
    }

    #[test]
    fn test_nested_referents_depth_first() {
        struct Pair(UniquePtr<UniquePtr<u16>>, UniquePtr<u16>);
        impl NdrEncode for Pair {
            fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
                self.0.ndr_encode(w)?;
                self.1.ndr_encode(w)
            }
        }

        let value = Pair(UniquePtr::new(UniquePtr::new(0xBEEF)), UniquePtr::new(0x7));
        let bytes = to_bytes(&value, NdrContext::default()).unwrap();
        assert_eq!(
            bytes.as_ref(),
            &[
                0x00, 0x00, 0x02, 0x00, // outer marker
                0x04, 0x00, 0x02, 0x00, // tail marker
                0x08, 0x00, 0x02, 0x00, // *outer: inner marker
                0xEF, 0xBE, // **outer
                0x07, 0x00, // *tail
            ]
        );
    }

    #[test]
    fn test_ref_pointer_roundtrip() {
        let bytes = to_bytes(&RefPtr::new(99u32), NdrContext::default()).unwrap();
        assert_eq!(bytes.as_ref(), &[0x00, 0x00, 0x02, 0x00, 99, 0, 0, 0]);

        let decoded: RefPtr<u32> = from_bytes(bytes, NdrContext::default()).unwrap();
        assert_eq!(decoded.get(), Some(&99));
        assert_eq!(decoded.into_inner(), Some(99));
    }

    #[test]
    fn test_ref_pointer_null_marker_is_decode_error() {
        let err = from_bytes::<RefPtr<u32>>(Bytes::from_static(&[0; 4]), NdrContext::default())
            .unwrap_err();
        assert!(matches!(err, NdrError::NullReferencePointer));
    }

    #[test]
    #[should_panic(expected = "[ref] pointer")]
    fn test_null_ref_pointer_panics() {
        let mut w = NdrWriter::new();
        w.write_pointer::<u32>(PointerKind::Ref, None);
    }

    #[test]
    fn test_null_ref_pointer_writes_nothing() {
        let mut w = NdrWriter::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            w.write_pointer::<u32>(PointerKind::Ref, None);
        }));
        assert!(outcome.is_err());
        assert_eq!(w.position(), 0);
        assert_eq!(w.pending(), 0);
    }

    #[test]
    fn test_ndr64_markers_are_eight_bytes() {
        let bytes = to_bytes(&UniquePtr::new(1u32), NdrContext::ndr64()).unwrap();
        assert_eq!(
            bytes.as_ref(),
            &[0x00, 0x00, 0x02, 0x00, 0, 0, 0, 0, 1, 0, 0, 0]
        );
        let decoded: UniquePtr<u32> = from_bytes(bytes, NdrContext::ndr64()).unwrap();
        assert_eq!(decoded.into_option(), Some(1));
    }

    #[test]
    fn test_full_ptr_null() {
        let bytes = to_bytes(&FullPtr::<u32>::null(), NdrContext::default()).unwrap();
        assert_eq!(bytes.as_ref(), &[0, 0, 0, 0]);
        let decoded: FullPtr<u32> = from_bytes(bytes, NdrContext::default()).unwrap();
        assert!(decoded.is_null());
    }
}
