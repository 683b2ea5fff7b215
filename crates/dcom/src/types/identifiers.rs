//! DCOM identifier types
//!
//! - IPID: Interface Pointer Identifier, selects the object an ORPC call
//!   is delivered to
//! - CID: Causality Identifier, ties a call to the chain of calls it is
//!   part of

use midl_ndr::{NdrDecode, NdrEncode, NdrReader, NdrWriter};
use std::fmt;

/// Generate a new random v4 UUID
pub fn generate_uuid() -> dcerpc::Uuid {
    dcerpc::Uuid::from_u128(uuid::Uuid::new_v4().as_u128())
}

/// Interface Pointer Identifier (16 bytes / UUID)
///
/// Uniquely identifies an interface pointer on a specific object.
/// On the wire it travels as the object UUID of the request PDU.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipid(pub dcerpc::Uuid);

impl Ipid {
    /// Size of IPID in bytes (16 bytes, same as UUID)
    pub const SIZE: usize = 16;

    pub fn new(uuid: dcerpc::Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a random IPID
    pub fn generate() -> Self {
        Self(generate_uuid())
    }

    pub fn nil() -> Self {
        Self(dcerpc::Uuid::NIL)
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    pub fn uuid(&self) -> &dcerpc::Uuid {
        &self.0
    }
}

impl Default for Ipid {
    fn default() -> Self {
        Self::nil()
    }
}

impl From<dcerpc::Uuid> for Ipid {
    fn from(uuid: dcerpc::Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Debug for Ipid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IPID({})", self.0)
    }
}

impl fmt::Display for Ipid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Causality Identifier
///
/// Generated by the client for each outgoing call and expected back,
/// unchanged, on the matching response.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Cid(pub dcerpc::Uuid);

impl Cid {
    pub fn new(uuid: dcerpc::Uuid) -> Self {
        Self(uuid)
    }

    pub fn generate() -> Self {
        Self(generate_uuid())
    }

    pub const fn from_u128(value: u128) -> Self {
        Self(dcerpc::Uuid::from_u128(value))
    }

    pub fn uuid(&self) -> &dcerpc::Uuid {
        &self.0
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CID({})", self.0)
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl NdrEncode for Cid {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        self.0.ndr_encode(w)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for Cid {
    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        Ok(Self(dcerpc::Uuid::ndr_decode(r)?))
    }

    fn ndr_align() -> usize {
        4
    }
}
