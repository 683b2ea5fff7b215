//! NDR primitive type implementations
//!
//! NDR primitive types and their encodings:
//!
//! | MIDL Type     | Rust Type | Size | Alignment |
//! |---------------|-----------|------|-----------|
//! | boolean       | bool      | 1    | 1         |
//! | byte/char     | u8        | 1    | 1         |
//! | small         | i8        | 1    | 1         |
//! | short         | i16       | 2    | 2         |
//! | long/int      | i32       | 4    | 4         |
//! | hyper         | i64       | 8    | 8         |
//! | unsigned short| u16       | 2    | 2         |
//! | unsigned long | u32       | 4    | 4         |
//! | unsigned hyper| u64       | 8    | 8         |
//! | float         | f32       | 4    | 4         |
//! | double        | f64       | 8    | 8         |
//! | wchar_t       | u16       | 2    | 2         |
//! | error_status_t| u32       | 4    | 4         |
//!
//! Byte order is always little-endian.

use crate::{NdrDecode, NdrEncode, NdrReader, NdrWriter, Result};
use bytes::{Buf, BufMut, BytesMut};

/// A fixed-width scalar; its width is also its alignment.
pub trait NdrScalar: Copy {
    const WIDTH: usize;

    fn put(self, buf: &mut BytesMut);

    /// Decode from exactly `WIDTH` bytes
    fn take(bytes: &[u8]) -> Self;
}

macro_rules! impl_ndr_scalar {
    ($ty:ty, $width:expr, $put:ident, $get:ident) => {
        impl NdrScalar for $ty {
            const WIDTH: usize = $width;

            #[inline]
            fn put(self, buf: &mut BytesMut) {
                buf.$put(self);
            }

            #[inline]
            fn take(mut bytes: &[u8]) -> Self {
                bytes.$get()
            }
        }

        impl NdrEncode for $ty {
            fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
                w.write_data(*self);
                Ok(())
            }

            fn ndr_align() -> usize {
                $width
            }
        }

        impl NdrDecode for $ty {
            fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
                r.read_data()
            }

            fn ndr_align() -> usize {
                $width
            }
        }
    };
}

impl_ndr_scalar!(u8, 1, put_u8, get_u8);
impl_ndr_scalar!(i8, 1, put_i8, get_i8);
impl_ndr_scalar!(u16, 2, put_u16_le, get_u16_le);
impl_ndr_scalar!(i16, 2, put_i16_le, get_i16_le);
impl_ndr_scalar!(u32, 4, put_u32_le, get_u32_le);
impl_ndr_scalar!(i32, 4, put_i32_le, get_i32_le);
impl_ndr_scalar!(u64, 8, put_u64_le, get_u64_le);
impl_ndr_scalar!(i64, 8, put_i64_le, get_i64_le);
impl_ndr_scalar!(f32, 4, put_f32_le, get_f32_le);
impl_ndr_scalar!(f64, 8, put_f64_le, get_f64_le);

// boolean is a single byte; any non-zero value reads as true
impl NdrScalar for bool {
    const WIDTH: usize = 1;

    #[inline]
    fn put(self, buf: &mut BytesMut) {
        buf.put_u8(self as u8);
    }

    #[inline]
    fn take(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

impl NdrEncode for bool {
    fn ndr_encode(&self, w: &mut NdrWriter) -> Result<()> {
        w.write_data(*self);
        Ok(())
    }
}

impl NdrDecode for bool {
    fn ndr_decode(r: &mut NdrReader) -> Result<Self> {
        r.read_data()
    }
}
