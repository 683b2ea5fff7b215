//! Enumerations, discriminated unions and context handles
//!
//! These follow the scalar rules with a few syntax-dependent twists:
//!
//! | Construct          | NDR 2.0                  | NDR64                        |
//! |--------------------|--------------------------|------------------------------|
//! | `enum`             | 16-bit, 0..=0x7FFF       | 32-bit                       |
//! | union arm          | aligned by its own data  | aligned to the union         |
//! | struct trailing gap| none                     | padded to struct alignment   |
//! | context handle     | 20 bytes, align 4        | 20 bytes, align 4            |
//!
//! A non-encapsulated union is written as its discriminant (`switch_is`
//! type) followed by the selected arm. Generated code picks the arm; the
//! helpers here only lay out the discriminant and padding.

use crate::context::TransferSyntax;
use crate::primitives::NdrScalar;
use crate::{NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter, Result};

/// Largest value an enum can carry in NDR 2.0
pub const MAX_ENUM16: i32 = 0x7FFF;

/// Write an `enum` value in the width of the writer's transfer syntax.
///
/// `[v1_enum]` types are plain 32-bit values and go through `write_data`.
pub fn write_enum(w: &mut NdrWriter, value: i32) -> Result<()> {
    match w.syntax() {
        TransferSyntax::Ndr20 => {
            if !(0..=MAX_ENUM16).contains(&value) {
                return Err(NdrError::InvalidEnumValue(value));
            }
            w.write_data(value as u16);
        }
        TransferSyntax::Ndr64 => w.write_data(value),
    }
    Ok(())
}

pub fn read_enum(r: &mut NdrReader) -> Result<i32> {
    match r.syntax() {
        TransferSyntax::Ndr20 => {
            let value = i32::from(r.read_data::<u16>()?);
            if value > MAX_ENUM16 {
                return Err(NdrError::InvalidEnumValue(value));
            }
            Ok(value)
        }
        TransferSyntax::Ndr64 => r.read_data(),
    }
}

/// Write a union discriminant.
pub fn write_switch<T: NdrScalar>(w: &mut NdrWriter, discriminant: T) {
    w.write_data(discriminant);
}

pub fn read_switch<T: NdrScalar>(r: &mut NdrReader) -> Result<T> {
    r.read_data()
}

/// Pad to the union's alignment before the discriminant and again before
/// the arm. Only NDR64 aligns union arms as a whole.
pub fn write_union_align(w: &mut NdrWriter, alignment: usize) {
    if w.syntax() == TransferSyntax::Ndr64 {
        w.write_align(alignment);
    }
}

pub fn read_union_align(r: &mut NdrReader, alignment: usize) {
    if r.syntax() == TransferSyntax::Ndr64 {
        r.read_align(alignment);
    }
}

/// Pad a structure to its alignment after its last member.
///
/// NDR64 structures occupy a multiple of their alignment; NDR 2.0 ones end
/// at their last byte.
pub fn write_trailing_gap(w: &mut NdrWriter, alignment: usize) {
    if w.syntax() == TransferSyntax::Ndr64 {
        w.write_align(alignment);
    }
}

pub fn read_trailing_gap(r: &mut NdrReader, alignment: usize) {
    if r.syntax() == TransferSyntax::Ndr64 {
        r.read_align(alignment);
    }
}

/// Context handle as it travels on the wire
///
/// Twenty bytes in both syntaxes: a 32-bit attributes word followed by the
/// server-assigned GUID, kept here as its raw wire bytes. All zero is the
/// null handle a server returns when it closes the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContextHandle {
    pub attributes: u32,
    pub uuid: [u8; 16],
}

impl ContextHandle {
    pub const SIZE: usize = 20;

    pub fn new(attributes: u32, uuid: [u8; 16]) -> Self {
        Self { attributes, uuid }
    }

    pub fn is_null(&self) -> bool {
        self.attributes == 0 && self.uuid == [0; 16]
    }
}

impl NdrEncode for ContextHandle {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        w.write_align(4);
        w.write_data(self.attributes);
        w.write_bytes(&self.uuid);
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for ContextHandle {
    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        r.read_align(4);
        let attributes = r.read_data()?;
        let mut uuid = [0; 16];
        uuid.copy_from_slice(&r.read_bytes(16)?);
        Ok(Self { attributes, uuid })
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_min_size() -> usize {
        Self::SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{from_bytes, to_bytes, NdrContext};
    use bytes::Bytes;

    /// `union switch(short level) { case 1: long small; case 2: hyper large; }`
    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Info {
        Small(i32),
        Large(i64),
    }

    impl NdrEncode for Info {
        fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
            write_union_align(w, 8);
            match self {
                Info::Small(v) => {
                    write_switch(w, 1i16);
                    write_union_align(w, 8);
                    w.write_data(*v);
                }
                Info::Large(v) => {
                    write_switch(w, 2i16);
                    write_union_align(w, 8);
                    w.write_data(*v);
                }
            }
            Ok(())
        }
    }

    impl NdrDecode for Info {
        fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
            read_union_align(r, 8);
            let level: i16 = read_switch(r)?;
            read_union_align(r, 8);
            match level {
                1 => Ok(Info::Small(r.read_data()?)),
                2 => Ok(Info::Large(r.read_data()?)),
                other => Err(NdrError::InvalidDiscriminant(i32::from(other))),
            }
        }
    }

    /// `struct { hyper id; short kind; }`
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Tagged {
        id: i64,
        kind: i32,
    }

    impl NdrEncode for Tagged {
        fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
            w.write_align(8);
            w.write_data(self.id);
            write_enum(w, self.kind)?;
            write_trailing_gap(w, 8);
            Ok(())
        }
    }

    impl NdrDecode for Tagged {
        fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
            r.read_align(8);
            let id = r.read_data()?;
            let kind = read_enum(r)?;
            read_trailing_gap(r, 8);
            Ok(Self { id, kind })
        }
    }

    #[test]
    fn test_enum_width_per_syntax() {
        let mut w = NdrWriter::new();
        write_enum(&mut w, 3).unwrap();
        assert_eq!(w.as_bytes(), &[3, 0]);

        let mut w = NdrWriter::with_context(NdrContext::ndr64());
        write_enum(&mut w, 3).unwrap();
        assert_eq!(w.as_bytes(), &[3, 0, 0, 0]);

        let mut r = NdrReader::with_context(Bytes::from_static(&[3, 0, 0, 0]), NdrContext::ndr64());
        assert_eq!(read_enum(&mut r).unwrap(), 3);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_enum16_range() {
        let mut w = NdrWriter::new();
        assert!(matches!(
            write_enum(&mut w, 0x8000),
            Err(NdrError::InvalidEnumValue(0x8000))
        ));
        assert!(matches!(
            write_enum(&mut w, -1),
            Err(NdrError::InvalidEnumValue(-1))
        ));
        assert_eq!(w.position(), 0);

        let mut r = NdrReader::new(Bytes::from_static(&[0x00, 0x80]));
        assert!(matches!(
            read_enum(&mut r),
            Err(NdrError::InvalidEnumValue(0x8000))
        ));

        // NDR64 carries the full 32 bits
        let mut w = NdrWriter::with_context(NdrContext::ndr64());
        write_enum(&mut w, 0x10000).unwrap();
        assert_eq!(w.as_bytes(), &[0, 0, 1, 0]);
    }

    #[test]
    fn test_union_arm_alignment() {
        let bytes = to_bytes(&Info::Small(5), NdrContext::default()).unwrap();
        assert_eq!(bytes.as_ref(), &[1, 0, 0, 0, 5, 0, 0, 0]);
        assert_eq!(
            from_bytes::<Info>(bytes, NdrContext::default()).unwrap(),
            Info::Small(5)
        );

        // NDR64 pads the discriminant out to the union's alignment
        let bytes = to_bytes(&Info::Small(5), NdrContext::ndr64()).unwrap();
        assert_eq!(bytes.as_ref(), &[1, 0, 0, 0, 0, 0, 0, 0, 5, 0, 0, 0]);
        assert_eq!(
            from_bytes::<Info>(bytes, NdrContext::ndr64()).unwrap(),
            Info::Small(5)
        );

        let bytes = to_bytes(&Info::Large(-2), NdrContext::ndr64()).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(
            from_bytes::<Info>(bytes, NdrContext::ndr64()).unwrap(),
            Info::Large(-2)
        );
    }

    #[test]
    fn test_unknown_discriminant() {
        let bytes = Bytes::from_static(&[9, 0, 0, 0, 0, 0, 0, 0]);
        let err = from_bytes::<Info>(bytes, NdrContext::default()).unwrap_err();
        assert!(matches!(err, NdrError::InvalidDiscriminant(9)));
    }

    #[test]
    fn test_trailing_gap() {
        let value = Tagged { id: 1, kind: 2 };

        let bytes = to_bytes(&value, NdrContext::default()).unwrap();
        assert_eq!(bytes.len(), 10);
        assert_eq!(from_bytes::<Tagged>(bytes, NdrContext::default()).unwrap(), value);

        let bytes = to_bytes(&value, NdrContext::ndr64()).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[8..], &[2, 0, 0, 0, 0, 0, 0, 0]);

        // the gap is consumed, so a following member lines up
        let mut r = NdrReader::with_context(bytes, NdrContext::ndr64());
        assert_eq!(Tagged::ndr_decode(&mut r).unwrap(), value);
        assert_eq!(r.position(), 16);
    }

    #[test]
    fn test_context_handle_layout() {
        let mut uuid = [0u8; 16];
        uuid[0] = 0xAA;
        uuid[15] = 0x55;
        let handle = ContextHandle::new(0, uuid);

        for ctx in [NdrContext::default(), NdrContext::ndr64()] {
            let mut w = NdrWriter::with_context(ctx);
            w.write_data(1u8);
            handle.ndr_encode(&mut w).unwrap();
            let bytes = w.into_bytes();
            assert_eq!(bytes.len(), 4 + ContextHandle::SIZE);
            assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
            assert_eq!(bytes[8], 0xAA);
            assert_eq!(bytes[23], 0x55);

            let mut r = NdrReader::with_context(bytes, ctx);
            assert_eq!(r.read_data::<u8>().unwrap(), 1);
            assert_eq!(ContextHandle::ndr_decode(&mut r).unwrap(), handle);
        }

        assert!(ContextHandle::default().is_null());
        assert!(!handle.is_null());
    }

    #[test]
    fn test_truncated_context_handle() {
        let bytes = Bytes::from_static(&[0; 12]);
        let err = from_bytes::<ContextHandle>(bytes, NdrContext::default()).unwrap_err();
        assert!(matches!(err, NdrError::UnexpectedEndOfBuffer { .. }));
    }
}
