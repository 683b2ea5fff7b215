//! ORPC (Object RPC) header types (MS-DCOM 2.2.13, 2.2.14)
//!
//! ORPCTHIS is the implicit first parameter of every ORPC request and
//! ORPCTHAT the implicit first parameter of every response. Both may carry
//! an extension array of opaque, GUID-tagged extents.

use super::identifiers::Cid;
use midl_ndr::{
    ConformantArray, NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter, UniquePtr,
};

/// COM version structure (MS-DCOM 2.2.11)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ComVersion {
    pub major: u16,
    pub minor: u16,
}

impl ComVersion {
    /// Size in bytes
    pub const SIZE: usize = 4;

    /// DCOM version 5.1 (Windows 2000)
    pub const DCOM_5_1: Self = Self { major: 5, minor: 1 };
    /// DCOM version 5.4 (Windows XP/2003)
    pub const DCOM_5_4: Self = Self { major: 5, minor: 4 };
    /// DCOM version 5.6 (Windows Vista)
    pub const DCOM_5_6: Self = Self { major: 5, minor: 6 };
    /// DCOM version 5.7 (Windows 7)
    pub const DCOM_5_7: Self = Self { major: 5, minor: 7 };

    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl NdrEncode for ComVersion {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        w.write_align(2);
        w.write_data(self.major);
        w.write_data(self.minor);
        Ok(())
    }

    fn ndr_align() -> usize {
        2
    }
}

impl NdrDecode for ComVersion {
    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        r.read_align(2);
        Ok(Self {
            major: r.read_data()?,
            minor: r.read_data()?,
        })
    }

    fn ndr_align() -> usize {
        2
    }
}

/// ORPC extension array entry
///
/// A conformant structure: the transmitted data length is `size` rounded
/// up to a multiple of 8 and travels as the structure's leading size word.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrpcExtent {
    /// Extension identifier
    pub id: dcerpc::Uuid,
    /// Significant bytes in `data`
    pub size: u32,
    pub data: Vec<u8>,
}

impl OrpcExtent {
    pub fn new(id: dcerpc::Uuid, data: Vec<u8>) -> Self {
        Self {
            id,
            size: data.len() as u32,
            data,
        }
    }

    /// Number of data bytes on the wire
    pub fn padded_size(&self) -> u32 {
        (self.size.saturating_add(7)) & !7
    }

    /// The significant bytes
    pub fn payload(&self) -> &[u8] {
        let end = (self.size as usize).min(self.data.len());
        &self.data[..end]
    }
}

impl NdrEncode for OrpcExtent {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        let padded = self.padded_size() as usize;
        w.write_size(padded as u64)?;
        w.write_align(4);
        self.id.ndr_encode(w)?;
        w.write_data(self.size);
        let take = padded.min(self.data.len());
        w.write_bytes(&self.data[..take]);
        w.write_bytes(&vec![0u8; padded - take]);
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for OrpcExtent {
    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        let padded = r.read_size()?;
        r.read_align(4);
        let id = dcerpc::Uuid::ndr_decode(r)?;
        let size: u32 = r.read_data()?;
        if u64::from(size) > padded {
            return Err(NdrError::ConformanceMismatch {
                max_count: padded,
                offset: 0,
                actual_count: u64::from(size),
            });
        }
        let len = r.check_count(padded, 1)?;
        let data = r.read_bytes(len)?.to_vec();
        Ok(Self { id, size, data })
    }

    fn ndr_align() -> usize {
        4
    }
}

/// ORPC extent array
///
/// The referenced array of extent pointers always has an even number of
/// slots; unused slots are null.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrpcExtentArray {
    /// Number of extents in use
    pub size: u32,
    pub reserved: u32,
    pub extents: UniquePtr<ConformantArray<UniquePtr<OrpcExtent>>>,
}

impl OrpcExtentArray {
    pub fn new(extents: Vec<OrpcExtent>) -> Self {
        let size = extents.len() as u32;
        let slots = ((size as usize) + 1) & !1;
        let mut elements: Vec<UniquePtr<OrpcExtent>> =
            extents.into_iter().map(UniquePtr::new).collect();
        elements.resize_with(slots, UniquePtr::null);
        let extents = if elements.is_empty() {
            UniquePtr::null()
        } else {
            UniquePtr::new(ConformantArray::new(elements))
        };
        Self {
            size,
            reserved: 0,
            extents,
        }
    }

    /// Non-null extents, in array order
    pub fn iter(&self) -> impl Iterator<Item = &OrpcExtent> {
        self.extents
            .get()
            .into_iter()
            .flat_map(|array| array.elements.iter())
            .filter_map(UniquePtr::get)
    }

    /// First extent tagged with `id`
    pub fn find(&self, id: &dcerpc::Uuid) -> Option<&OrpcExtent> {
        self.iter().find(|extent| extent.id == *id)
    }
}

impl NdrEncode for OrpcExtentArray {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        w.align_pointer();
        w.write_data(self.size);
        w.write_data(0u32);
        self.extents.ndr_encode(w)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for OrpcExtentArray {
    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        r.align_pointer();
        Ok(Self {
            size: r.read_data()?,
            reserved: r.read_data()?,
            extents: UniquePtr::ndr_decode(r)?,
        })
    }

    fn ndr_align() -> usize {
        4
    }
}

/// ORPCTHIS structure (MS-DCOM 2.2.13)
///
/// Sent with every ORPC request from client to server.
#[derive(Clone, Debug, PartialEq)]
pub struct OrpcThis {
    pub version: ComVersion,
    /// Zero for ORPC invocations
    pub flags: u32,
    pub reserved1: u32,
    /// Causality ID of the call chain
    pub cid: Cid,
    pub extensions: UniquePtr<OrpcExtentArray>,
}

impl OrpcThis {
    /// Encoded size in NDR 2.0 without extensions
    pub const MIN_SIZE: usize = 4 + 4 + 4 + 16 + 4;

    /// ORPCTHIS for a fresh causality chain
    pub fn new() -> Self {
        Self::with_causality(Cid::generate())
    }

    pub fn with_causality(cid: Cid) -> Self {
        Self {
            version: ComVersion::DCOM_5_7,
            flags: 0,
            reserved1: 0,
            cid,
            extensions: UniquePtr::null(),
        }
    }
}

impl Default for OrpcThis {
    fn default() -> Self {
        Self::new()
    }
}

impl NdrEncode for OrpcThis {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        w.align_pointer();
        self.version.ndr_encode(w)?;
        w.write_data(self.flags);
        w.write_data(0u32);
        self.cid.ndr_encode(w)?;
        self.extensions.ndr_encode(w)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for OrpcThis {
    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        r.align_pointer();
        Ok(Self {
            version: ComVersion::ndr_decode(r)?,
            flags: r.read_data()?,
            reserved1: r.read_data()?,
            cid: Cid::ndr_decode(r)?,
            extensions: UniquePtr::ndr_decode(r)?,
        })
    }

    fn ndr_align() -> usize {
        4
    }
}

/// ORPCTHAT structure (MS-DCOM 2.2.14)
///
/// Returned with every ORPC response from server to client.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrpcThat {
    /// Arbitrary, ignored on receipt
    pub flags: u32,
    pub extensions: UniquePtr<OrpcExtentArray>,
}

impl OrpcThat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extensions(extents: Vec<OrpcExtent>) -> Self {
        Self {
            flags: 0,
            extensions: UniquePtr::new(OrpcExtentArray::new(extents)),
        }
    }
}

impl NdrEncode for OrpcThat {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        w.align_pointer();
        w.write_data(self.flags);
        self.extensions.ndr_encode(w)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for OrpcThat {
    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        r.align_pointer();
        Ok(Self {
            flags: r.read_data()?,
            extensions: UniquePtr::ndr_decode(r)?,
        })
    }

    fn ndr_align() -> usize {
        4
    }
}
