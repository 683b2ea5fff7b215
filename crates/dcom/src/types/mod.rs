//! Core DCOM types (MS-DCOM 2.2)
//!
//! - Identifiers: IPID, CID
//! - ORPC headers: ORPCTHIS, ORPCTHAT and their extensions
//! - Errors and HRESULT codes

mod error;
mod identifiers;
mod orpc;

pub use error::{hresult, DcomError, HresultLookup, Result};
pub use identifiers::{generate_uuid, Cid, Ipid};
pub use orpc::{ComVersion, OrpcExtent, OrpcExtentArray, OrpcThat, OrpcThis};

/// Well-known interface UUIDs
pub mod iid {
    use dcerpc::Uuid;

    /// IUnknown interface UUID
    pub const IUNKNOWN: Uuid = Uuid::from_u128(0x00000000_0000_0000_c000_000000000046);
    /// IDispatch interface UUID
    pub const IDISPATCH: Uuid = Uuid::from_u128(0x00020400_0000_0000_c000_000000000046);
}
