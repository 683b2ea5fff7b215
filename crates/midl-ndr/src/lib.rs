//! NDR (Network Data Representation) runtime library
//!
//! This crate provides the wire codec used by DCE RPC stubs, implementing
//! the NDR 2.0 and NDR64 transfer syntaxes as specified in DCE RPC and
//! MS-RPCE.
//!
//! # NDR Wire Format
//!
//! NDR is the standard encoding for DCE RPC data. Key characteristics:
//! - Primitives are little-endian and align to their natural size (1, 2, 4, or 8 bytes)
//!   relative to the start of the stub
//! - Structures align to their largest member
//! - Conformant data (arrays with runtime-determined size) carries its bounds as a prefix
//! - Embedded pointers write a referent id inline; the referent follows the
//!   enclosing structure's fixed fields
//! - Strings are conformant varying arrays with null terminator
//! - Enums are 16-bit in NDR 2.0 and 32-bit in NDR64; NDR64 also pads union
//!   arms and structure tails to their alignment
//!
//! # Example
//!
//! ```
//! use midl_ndr::{from_bytes, to_bytes, NdrContext, UniquePtr};
//!
//! let value = UniquePtr::new(42u32);
//! let bytes = to_bytes(&value, NdrContext::default()).unwrap();
//! assert_eq!(bytes.as_ref(), &[0x00, 0x00, 0x02, 0x00, 42, 0, 0, 0]);
//!
//! let decoded: UniquePtr<u32> = from_bytes(bytes, NdrContext::default()).unwrap();
//! assert_eq!(decoded.get(), Some(&42));
//! ```

mod arrays;
mod constructed;
mod context;
mod decode;
mod encode;
mod error;
mod pointers;
mod primitives;
mod size_context;
mod strings;

pub use arrays::{
    read_array, read_elements, read_variance, write_array, write_elements, write_sizes,
    write_variance, ConformantArray, ConformantVaryingArray, FixedArray, VaryingArray,
};
pub use constructed::{
    read_enum, read_switch, read_trailing_gap, read_union_align, write_enum, write_switch,
    write_trailing_gap, write_union_align, ContextHandle, MAX_ENUM16,
};
pub use context::{NdrContext, TransferSyntax, DEFAULT_MAX_ELEMENTS};
pub use decode::{from_bytes, NdrDecode, NdrReader};
pub use encode::{to_bytes, NdrEncode, NdrWriter, FIRST_REFERENT_ID};
pub use error::{NdrError, Result};
pub use pointers::{FullPtr, PointerKind, RefPtr, Referent, UniquePtr};
pub use primitives::NdrScalar;
pub use size_context::SizeContext;
pub use strings::{NdrString, NdrWString};

/// Re-export bytes for convenience
pub use bytes::{Buf, BufMut, Bytes, BytesMut};
