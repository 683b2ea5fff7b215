//! DCE RPC PDU (Protocol Data Unit) types
//!
//! This module implements the connection-oriented DCE RPC wire format as
//! defined in:
//! - DCE 1.1: Remote Procedure Call (C706)
//! - MS-RPCE: Remote Procedure Call Protocol Extensions
//!
//! DCE RPC PDU Header Format:
//! ```text
//! +--------+--------+--------+--------+
//! |  vers  |vers_min| ptype  | pflags |
//! +--------+--------+--------+--------+
//! |        data representation        |
//! +--------+--------+--------+--------+
//! |   frag_len      |   auth_len      |
//! +--------+--------+--------+--------+
//! |             call_id               |
//! +--------+--------+--------+--------+
//! ```
//!
//! Headers and bodies are themselves NDR and go through the same codec as
//! stub data. The header is 16 bytes, so body offsets keep the alignment
//! they would have relative to the start of the PDU.

use crate::error::{Result, RpcError};
use bytes::{Bytes, BytesMut};
use midl_ndr::{NdrContext, NdrDecode, NdrEncode, NdrReader, NdrWriter, TransferSyntax};

/// DCE RPC protocol version
pub const DCE_RPC_VERSION: u8 = 5;
/// DCE RPC protocol minor version
pub const DCE_RPC_VERSION_MINOR: u8 = 0;

/// DCE RPC packet types (connection-oriented subset)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Request PDU
    Request = 0,
    /// Response PDU
    Response = 2,
    /// Fault PDU
    Fault = 3,
    /// Bind PDU
    Bind = 11,
    /// Bind-ack PDU
    BindAck = 12,
    /// Bind-nak PDU
    BindNak = 13,
}

impl PacketType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Request),
            2 => Some(Self::Response),
            3 => Some(Self::Fault),
            11 => Some(Self::Bind),
            12 => Some(Self::BindAck),
            13 => Some(Self::BindNak),
            _ => None,
        }
    }
}

/// Packet flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketFlags(u8);

impl PacketFlags {
    /// First fragment
    pub const FIRST_FRAG: u8 = 0x01;
    /// Last fragment
    pub const LAST_FRAG: u8 = 0x02;
    /// Did not execute
    pub const DID_NOT_EXECUTE: u8 = 0x20;
    /// Object UUID present
    pub const OBJECT_UUID: u8 = 0x80;

    /// Create flags for a complete (non-fragmented) PDU
    pub fn complete() -> Self {
        Self(Self::FIRST_FRAG | Self::LAST_FRAG)
    }

    pub fn set(&mut self, flag: u8) -> &mut Self {
        self.0 |= flag;
        self
    }

    pub fn contains(&self, flag: u8) -> bool {
        (self.0 & flag) != 0
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }

    pub fn from_u8(value: u8) -> Self {
        Self(value)
    }
}

/// Data Representation Format Label
///
/// Only little-endian, ASCII, IEEE (`[0x10, 0, 0, 0]`) is supported; the
/// NDR codec has no big-endian mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRepresentation([u8; 4]);

impl DataRepresentation {
    pub fn ndr() -> Self {
        Self([0x10, 0x00, 0x00, 0x00])
    }

    /// Upper nibble of the first byte is the integer representation
    pub fn is_little_endian(&self) -> bool {
        (self.0[0] & 0xF0) != 0
    }

    pub fn as_bytes(&self) -> [u8; 4] {
        self.0
    }
}

impl Default for DataRepresentation {
    fn default() -> Self {
        Self::ndr()
    }
}

/// UUID structure (128 bits), laid out as the NDR `GUID` struct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, PartialOrd, Ord)]
pub struct Uuid {
    pub time_low: u32,
    pub time_mid: u16,
    pub time_hi_and_version: u16,
    pub clock_seq_hi_and_reserved: u8,
    pub clock_seq_low: u8,
    pub node: [u8; 6],
}

impl Uuid {
    /// Nil UUID (all zeros)
    pub const NIL: Self = Self::from_u128(0);

    /// Build from the 128-bit value of the textual form, read big-endian
    pub const fn from_u128(value: u128) -> Self {
        Self {
            time_low: (value >> 96) as u32,
            time_mid: (value >> 80) as u16,
            time_hi_and_version: (value >> 64) as u16,
            clock_seq_hi_and_reserved: (value >> 56) as u8,
            clock_seq_low: (value >> 48) as u8,
            node: [
                (value >> 40) as u8,
                (value >> 32) as u8,
                (value >> 24) as u8,
                (value >> 16) as u8,
                (value >> 8) as u8,
                value as u8,
            ],
        }
    }

    pub fn as_u128(&self) -> u128 {
        let mut value = ((self.time_low as u128) << 96)
            | ((self.time_mid as u128) << 80)
            | ((self.time_hi_and_version as u128) << 64)
            | ((self.clock_seq_hi_and_reserved as u128) << 56)
            | ((self.clock_seq_low as u128) << 48);
        for (i, byte) in self.node.iter().enumerate() {
            value |= (*byte as u128) << (40 - 8 * i);
        }
        value
    }

    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }

    /// Parse from string format "xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx"
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.len() != 36 {
            return None;
        }
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 5
            || parts[0].len() != 8
            || parts[1].len() != 4
            || parts[2].len() != 4
            || parts[3].len() != 4
            || parts[4].len() != 12
        {
            return None;
        }
        let hex: String = parts.concat();
        u128::from_str_radix(&hex, 16).ok().map(Self::from_u128)
    }
}

impl std::str::FromStr for Uuid {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| RpcError::InvalidPduData(format!("invalid UUID: {s}")))
    }
}

impl std::fmt::Display for Uuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.time_low,
            self.time_mid,
            self.time_hi_and_version,
            self.clock_seq_hi_and_reserved,
            self.clock_seq_low,
            self.node[0],
            self.node[1],
            self.node[2],
            self.node[3],
            self.node[4],
            self.node[5]
        )
    }
}

impl NdrEncode for Uuid {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        w.write_align(4);
        w.write_data(self.time_low);
        w.write_data(self.time_mid);
        w.write_data(self.time_hi_and_version);
        w.write_data(self.clock_seq_hi_and_reserved);
        w.write_data(self.clock_seq_low);
        w.write_bytes(&self.node);
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for Uuid {
    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        r.read_align(4);
        let time_low = r.read_data()?;
        let time_mid = r.read_data()?;
        let time_hi_and_version = r.read_data()?;
        let clock_seq_hi_and_reserved = r.read_data()?;
        let clock_seq_low = r.read_data()?;
        let mut node = [0u8; 6];
        node.copy_from_slice(&r.read_bytes(6)?);
        Ok(Self {
            time_low,
            time_mid,
            time_hi_and_version,
            clock_seq_hi_and_reserved,
            clock_seq_low,
            node,
        })
    }

    fn ndr_align() -> usize {
        4
    }
}

/// Syntax ID - interface UUID with version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyntaxId {
    pub uuid: Uuid,
    pub version: u32, // major in lower 16 bits, minor in upper 16 bits
}

impl SyntaxId {
    pub const fn new(uuid: Uuid, major: u16, minor: u16) -> Self {
        Self {
            uuid,
            version: (major as u32) | ((minor as u32) << 16),
        }
    }

    pub fn major_version(&self) -> u16 {
        self.version as u16
    }

    pub fn minor_version(&self) -> u16 {
        (self.version >> 16) as u16
    }

    /// The transfer syntax this identifier names, if it is one we speak
    pub fn transfer_syntax(&self) -> Option<TransferSyntax> {
        if *self == NDR20_SYNTAX {
            Some(TransferSyntax::Ndr20)
        } else if *self == NDR64_SYNTAX {
            Some(TransferSyntax::Ndr64)
        } else {
            None
        }
    }

    pub fn for_transfer_syntax(syntax: TransferSyntax) -> Self {
        match syntax {
            TransferSyntax::Ndr20 => NDR20_SYNTAX,
            TransferSyntax::Ndr64 => NDR64_SYNTAX,
        }
    }
}

impl std::fmt::Display for SyntaxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} v{}.{}",
            self.uuid,
            self.major_version(),
            self.minor_version()
        )
    }
}

impl NdrEncode for SyntaxId {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        self.uuid.ndr_encode(w)?;
        w.write_data(self.version);
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for SyntaxId {
    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        Ok(Self {
            uuid: Uuid::ndr_decode(r)?,
            version: r.read_data()?,
        })
    }

    fn ndr_align() -> usize {
        4
    }
}

/// NDR Transfer Syntax UUID
pub const NDR_SYNTAX_UUID: &str = "8a885d04-1ceb-11c9-9fe8-08002b104860";
pub const NDR_SYNTAX_VERSION: u32 = 2;
/// NDR64 Transfer Syntax UUID
pub const NDR64_SYNTAX_UUID: &str = "71710533-beba-4937-8319-b5dbef9ccc36";
pub const NDR64_SYNTAX_VERSION: u32 = 1;

pub const NDR20_SYNTAX: SyntaxId = SyntaxId::new(
    Uuid::from_u128(0x8a885d04_1ceb_11c9_9fe8_08002b104860),
    NDR_SYNTAX_VERSION as u16,
    0,
);
pub const NDR64_SYNTAX: SyntaxId = SyntaxId::new(
    Uuid::from_u128(0x71710533_beba_4937_8319_b5dbef9ccc36),
    NDR64_SYNTAX_VERSION as u16,
    0,
);

/// Common PDU header (16 bytes)
#[derive(Debug, Clone)]
pub struct PduHeader {
    /// RPC version (should be 5)
    pub version: u8,
    /// RPC minor version (0 or 1)
    pub version_minor: u8,
    /// Packet type
    pub packet_type: PacketType,
    /// Packet flags
    pub packet_flags: PacketFlags,
    /// Data representation
    pub data_rep: DataRepresentation,
    /// Total length of the PDU fragment
    pub frag_length: u16,
    /// Length of authentication data
    pub auth_length: u16,
    /// Call identifier
    pub call_id: u32,
}

impl PduHeader {
    /// PDU header size in bytes
    pub const SIZE: usize = 16;

    pub fn new(packet_type: PacketType, call_id: u32) -> Self {
        Self {
            version: DCE_RPC_VERSION,
            version_minor: DCE_RPC_VERSION_MINOR,
            packet_type,
            packet_flags: PacketFlags::complete(),
            data_rep: DataRepresentation::ndr(),
            frag_length: 0, // Will be set when encoding
            auth_length: 0,
            call_id,
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(RpcError::InvalidPduData(format!(
                "PDU header too short: {} bytes",
                data.len()
            )));
        }
        let mut r = NdrReader::new(Bytes::copy_from_slice(&data[..Self::SIZE]));
        let version = r.read_data::<u8>()?;
        let version_minor = r.read_data::<u8>()?;
        let ptype = r.read_data::<u8>()?;
        let packet_flags = PacketFlags::from_u8(r.read_data()?);
        let mut data_rep = [0u8; 4];
        data_rep.copy_from_slice(&r.read_bytes(4)?);

        if version != DCE_RPC_VERSION {
            return Err(RpcError::VersionMismatch {
                expected: DCE_RPC_VERSION,
                got: version,
            });
        }
        let packet_type =
            PacketType::from_u8(ptype).ok_or(RpcError::InvalidMessageType(ptype as i32))?;

        Ok(Self {
            version,
            version_minor,
            packet_type,
            packet_flags,
            data_rep: DataRepresentation(data_rep),
            frag_length: r.read_data()?,
            auth_length: r.read_data()?,
            call_id: r.read_data()?,
        })
    }
}

impl NdrEncode for PduHeader {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        w.write_data(self.version);
        w.write_data(self.version_minor);
        w.write_data(self.packet_type as u8);
        w.write_data(self.packet_flags.as_u8());
        w.write_bytes(&self.data_rep.as_bytes());
        w.write_data(self.frag_length);
        w.write_data(self.auth_length);
        w.write_data(self.call_id);
        Ok(())
    }
}

/// Context element for bind request
#[derive(Debug, Clone, PartialEq)]
pub struct ContextElement {
    pub context_id: u16,
    pub abstract_syntax: SyntaxId,
    pub transfer_syntaxes: Vec<SyntaxId>,
}

impl ContextElement {
    pub fn new(context_id: u16, abstract_syntax: SyntaxId, transfer_syntaxes: Vec<SyntaxId>) -> Self {
        Self {
            context_id,
            abstract_syntax,
            transfer_syntaxes,
        }
    }
}

impl NdrEncode for ContextElement {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        w.write_align(4);
        w.write_data(self.context_id);
        w.write_data(self.transfer_syntaxes.len() as u8);
        w.write_data(0u8); // reserved
        self.abstract_syntax.ndr_encode(w)?;
        for ts in &self.transfer_syntaxes {
            ts.ndr_encode(w)?;
        }
        Ok(())
    }
}

impl NdrDecode for ContextElement {
    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        r.read_align(4);
        let context_id = r.read_data()?;
        let count = r.read_data::<u8>()?;
        let _reserved = r.read_data::<u8>()?;
        let abstract_syntax = SyntaxId::ndr_decode(r)?;
        let mut transfer_syntaxes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            transfer_syntaxes.push(SyntaxId::ndr_decode(r)?);
        }
        Ok(Self {
            context_id,
            abstract_syntax,
            transfer_syntaxes,
        })
    }
}

/// Bind PDU
#[derive(Debug, Clone)]
pub struct BindPdu {
    pub header: PduHeader,
    pub max_xmit_frag: u16,
    pub max_recv_frag: u16,
    pub assoc_group_id: u32,
    pub context_list: Vec<ContextElement>,
}

impl BindPdu {
    /// Bind offering `transfer_syntaxes` for `interface` as context 0
    pub fn new(call_id: u32, interface: SyntaxId, transfer_syntaxes: Vec<SyntaxId>) -> Self {
        Self {
            header: PduHeader::new(PacketType::Bind, call_id),
            max_xmit_frag: 4280,
            max_recv_frag: 4280,
            assoc_group_id: 0,
            context_list: vec![ContextElement::new(0, interface, transfer_syntaxes)],
        }
    }
}

impl NdrEncode for BindPdu {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        w.write_data(self.max_xmit_frag);
        w.write_data(self.max_recv_frag);
        w.write_data(self.assoc_group_id);
        // p_cont_list_t
        w.write_data(self.context_list.len() as u8);
        w.write_data(0u8);
        w.write_data(0u16);
        for ctx in &self.context_list {
            ctx.ndr_encode(w)?;
        }
        Ok(())
    }
}

impl BindPdu {
    fn decode_body(header: PduHeader, r: &mut NdrReader) -> Result<Self> {
        let max_xmit_frag = r.read_data()?;
        let max_recv_frag = r.read_data()?;
        let assoc_group_id = r.read_data()?;
        let count = r.read_data::<u8>()?;
        let _reserved = r.read_data::<u8>()?;
        let _reserved2 = r.read_data::<u16>()?;
        let mut context_list = Vec::with_capacity(count as usize);
        for _ in 0..count {
            context_list.push(ContextElement::ndr_decode(r)?);
        }
        Ok(Self {
            header,
            max_xmit_frag,
            max_recv_frag,
            assoc_group_id,
            context_list,
        })
    }
}

/// Context result for bind acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ContextResult {
    Acceptance = 0,
    UserRejection = 1,
    ProviderRejection = 2,
}

impl ContextResult {
    fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::Acceptance,
            1 => Self::UserRejection,
            _ => Self::ProviderRejection,
        }
    }
}

/// Provider reasons attached to a rejected presentation context
pub mod provider_reason {
    pub const NOT_SPECIFIED: u16 = 0;
    pub const ABSTRACT_SYNTAX_NOT_SUPPORTED: u16 = 1;
    pub const PROPOSED_TRANSFER_SYNTAXES_NOT_SUPPORTED: u16 = 2;
    pub const LOCAL_LIMIT_EXCEEDED: u16 = 3;
}

/// One entry of the bind-ack result list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextResultEntry {
    pub result: ContextResult,
    pub reason: u16,
    pub transfer_syntax: SyntaxId,
}

impl ContextResultEntry {
    pub fn accept(transfer_syntax: SyntaxId) -> Self {
        Self {
            result: ContextResult::Acceptance,
            reason: provider_reason::NOT_SPECIFIED,
            transfer_syntax,
        }
    }

    pub fn reject(reason: u16) -> Self {
        Self {
            result: ContextResult::ProviderRejection,
            reason,
            transfer_syntax: SyntaxId::new(Uuid::NIL, 0, 0),
        }
    }
}

/// Bind acknowledgment PDU
#[derive(Debug, Clone)]
pub struct BindAckPdu {
    pub header: PduHeader,
    pub max_xmit_frag: u16,
    pub max_recv_frag: u16,
    pub assoc_group_id: u32,
    pub secondary_addr: String,
    pub results: Vec<ContextResultEntry>,
}

impl BindAckPdu {
    pub fn new(call_id: u32, assoc_group_id: u32, results: Vec<ContextResultEntry>) -> Self {
        Self {
            header: PduHeader::new(PacketType::BindAck, call_id),
            max_xmit_frag: 4280,
            max_recv_frag: 4280,
            assoc_group_id,
            secondary_addr: String::new(),
            results,
        }
    }

    fn decode_body(header: PduHeader, r: &mut NdrReader) -> Result<Self> {
        let max_xmit_frag = r.read_data()?;
        let max_recv_frag = r.read_data()?;
        let assoc_group_id = r.read_data()?;

        // Secondary address: length includes the null terminator
        let sec_addr_len = r.read_data::<u16>()? as usize;
        let mut sec_addr = r.read_bytes(sec_addr_len)?.to_vec();
        if sec_addr.last() == Some(&0) {
            sec_addr.pop();
        }
        let secondary_addr = String::from_utf8_lossy(&sec_addr).to_string();
        r.read_align(4);

        let count = r.read_data::<u8>()?;
        let _reserved = r.read_data::<u8>()?;
        let _reserved2 = r.read_data::<u16>()?;
        let mut results = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let result = ContextResult::from_u16(r.read_data()?);
            let reason = r.read_data()?;
            let transfer_syntax = SyntaxId::ndr_decode(r)?;
            results.push(ContextResultEntry {
                result,
                reason,
                transfer_syntax,
            });
        }

        Ok(Self {
            header,
            max_xmit_frag,
            max_recv_frag,
            assoc_group_id,
            secondary_addr,
            results,
        })
    }
}

impl NdrEncode for BindAckPdu {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        w.write_data(self.max_xmit_frag);
        w.write_data(self.max_recv_frag);
        w.write_data(self.assoc_group_id);

        let sec_addr = self.secondary_addr.as_bytes();
        w.write_data(sec_addr.len() as u16 + 1);
        w.write_bytes(sec_addr);
        w.write_data(0u8);
        w.write_align(4);

        // p_result_list_t
        w.write_data(self.results.len() as u8);
        w.write_data(0u8);
        w.write_data(0u16);
        for entry in &self.results {
            w.write_data(entry.result as u16);
            w.write_data(entry.reason);
            entry.transfer_syntax.ndr_encode(w)?;
        }
        Ok(())
    }
}

/// Reasons carried by a bind-nak
pub mod reject_reason {
    pub const NOT_SPECIFIED: u16 = 0;
    pub const TEMPORARY_CONGESTION: u16 = 1;
    pub const LOCAL_LIMIT_EXCEEDED: u16 = 2;
    pub const PROTOCOL_VERSION_NOT_SUPPORTED: u16 = 4;
}

/// Bind negative acknowledgment PDU
#[derive(Debug, Clone)]
pub struct BindNakPdu {
    pub header: PduHeader,
    pub reject_reason: u16,
    /// Supported (major, minor) protocol versions
    pub versions: Vec<(u8, u8)>,
}

impl BindNakPdu {
    pub fn new(call_id: u32, reject_reason: u16) -> Self {
        Self {
            header: PduHeader::new(PacketType::BindNak, call_id),
            reject_reason,
            versions: vec![(DCE_RPC_VERSION, DCE_RPC_VERSION_MINOR)],
        }
    }

    fn decode_body(header: PduHeader, r: &mut NdrReader) -> Result<Self> {
        let reject_reason = r.read_data()?;
        // The version list is optional on the wire
        let mut versions = Vec::new();
        if r.remaining() > 0 {
            let count = r.read_data::<u8>()?;
            for _ in 0..count {
                versions.push((r.read_data()?, r.read_data()?));
            }
        }
        Ok(Self {
            header,
            reject_reason,
            versions,
        })
    }
}

impl NdrEncode for BindNakPdu {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        w.write_data(self.reject_reason);
        w.write_data(self.versions.len() as u8);
        for (major, minor) in &self.versions {
            w.write_data(*major);
            w.write_data(*minor);
        }
        Ok(())
    }
}

/// Request PDU
#[derive(Debug, Clone)]
pub struct RequestPdu {
    pub header: PduHeader,
    pub alloc_hint: u32,
    pub context_id: u16,
    pub opnum: u16,
    pub object_uuid: Option<Uuid>,
    pub stub_data: Bytes,
}

impl RequestPdu {
    pub fn new(call_id: u32, opnum: u16, stub_data: Bytes) -> Self {
        Self {
            header: PduHeader::new(PacketType::Request, call_id),
            alloc_hint: stub_data.len() as u32,
            context_id: 0,
            opnum,
            object_uuid: None,
            stub_data,
        }
    }

    pub fn with_object(mut self, object: Uuid) -> Self {
        self.object_uuid = Some(object);
        self
    }

    fn decode_body(header: PduHeader, r: &mut NdrReader) -> Result<Self> {
        let alloc_hint = r.read_data()?;
        let context_id = r.read_data()?;
        let opnum = r.read_data()?;
        let object_uuid = if header.packet_flags.contains(PacketFlags::OBJECT_UUID) {
            Some(Uuid::ndr_decode(r)?)
        } else {
            None
        };
        let stub_data = r.read_bytes(r.remaining())?;
        Ok(Self {
            header,
            alloc_hint,
            context_id,
            opnum,
            object_uuid,
            stub_data,
        })
    }
}

impl NdrEncode for RequestPdu {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        w.write_data(self.alloc_hint);
        w.write_data(self.context_id);
        w.write_data(self.opnum);
        if let Some(ref uuid) = self.object_uuid {
            uuid.ndr_encode(w)?;
        }
        w.write_bytes(&self.stub_data);
        Ok(())
    }
}

/// Response PDU
#[derive(Debug, Clone)]
pub struct ResponsePdu {
    pub header: PduHeader,
    pub alloc_hint: u32,
    pub context_id: u16,
    pub cancel_count: u8,
    pub stub_data: Bytes,
}

impl ResponsePdu {
    pub fn new(call_id: u32, stub_data: Bytes) -> Self {
        Self {
            header: PduHeader::new(PacketType::Response, call_id),
            alloc_hint: stub_data.len() as u32,
            context_id: 0,
            cancel_count: 0,
            stub_data,
        }
    }

    fn decode_body(header: PduHeader, r: &mut NdrReader) -> Result<Self> {
        let alloc_hint = r.read_data()?;
        let context_id = r.read_data()?;
        let cancel_count = r.read_data()?;
        let _reserved = r.read_data::<u8>()?;
        let stub_data = r.read_bytes(r.remaining())?;
        Ok(Self {
            header,
            alloc_hint,
            context_id,
            cancel_count,
            stub_data,
        })
    }
}

impl NdrEncode for ResponsePdu {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        w.write_data(self.alloc_hint);
        w.write_data(self.context_id);
        w.write_data(self.cancel_count);
        w.write_data(0u8); // reserved
        w.write_bytes(&self.stub_data);
        Ok(())
    }
}

/// Fault status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FaultStatus {
    /// Operation number out of range
    OpRngError = 0x1c010002,
    /// Unknown interface
    UnkIf = 0x1c010003,
    /// Protocol error
    ProtoError = 0x1c01000b,
    /// General RPC error
    RpcError = 0x1c000000,
    /// Context mismatch
    ContextMismatch = 0x1c00001a,
    /// Stub data could not be unmarshalled (RPC_X_BAD_STUB_DATA)
    BadStubData = 0x000006f7,
    /// Object is not exported (RPC_E_DISCONNECTED style IPID miss)
    UnknownObject = 0x80010108,
}

/// Fault PDU
#[derive(Debug, Clone)]
pub struct FaultPdu {
    pub header: PduHeader,
    pub alloc_hint: u32,
    pub context_id: u16,
    pub cancel_count: u8,
    pub status: u32,
}

impl FaultPdu {
    pub fn new(call_id: u32, status: FaultStatus) -> Self {
        let mut header = PduHeader::new(PacketType::Fault, call_id);
        header.packet_flags.set(PacketFlags::DID_NOT_EXECUTE);
        Self {
            header,
            alloc_hint: 0,
            context_id: 0,
            cancel_count: 0,
            status: status as u32,
        }
    }

    fn decode_body(header: PduHeader, r: &mut NdrReader) -> Result<Self> {
        let alloc_hint = r.read_data()?;
        let context_id = r.read_data()?;
        let cancel_count = r.read_data()?;
        let _flags = r.read_data::<u8>()?;
        let status = r.read_data()?;
        Ok(Self {
            header,
            alloc_hint,
            context_id,
            cancel_count,
            status,
        })
    }
}

impl NdrEncode for FaultPdu {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        w.write_data(self.alloc_hint);
        w.write_data(self.context_id);
        w.write_data(self.cancel_count);
        w.write_data(0u8); // flags
        w.write_data(self.status);
        w.write_data(0u32); // reserved
        Ok(())
    }
}

/// Represents any supported DCE RPC PDU type
#[derive(Debug, Clone)]
pub enum Pdu {
    Bind(BindPdu),
    BindAck(BindAckPdu),
    BindNak(BindNakPdu),
    Request(RequestPdu),
    Response(ResponsePdu),
    Fault(FaultPdu),
}

impl Pdu {
    /// Decode a PDU from raw bytes
    pub fn decode(data: &Bytes) -> Result<Self> {
        let header = PduHeader::decode(data)?;
        if !header.data_rep.is_little_endian() {
            return Err(RpcError::InvalidPduData(
                "big-endian data representation is not supported".to_string(),
            ));
        }

        let end = (header.frag_length as usize).clamp(PduHeader::SIZE, data.len());
        let mut r = NdrReader::with_context(data.slice(PduHeader::SIZE..end), NdrContext::default());
        match header.packet_type {
            PacketType::Bind => Ok(Pdu::Bind(BindPdu::decode_body(header, &mut r)?)),
            PacketType::BindAck => Ok(Pdu::BindAck(BindAckPdu::decode_body(header, &mut r)?)),
            PacketType::BindNak => Ok(Pdu::BindNak(BindNakPdu::decode_body(header, &mut r)?)),
            PacketType::Request => Ok(Pdu::Request(RequestPdu::decode_body(header, &mut r)?)),
            PacketType::Response => Ok(Pdu::Response(ResponsePdu::decode_body(header, &mut r)?)),
            PacketType::Fault => Ok(Pdu::Fault(FaultPdu::decode_body(header, &mut r)?)),
        }
    }

    /// Encode the PDU to bytes, filling in the fragment length
    pub fn encode(&self) -> Result<Bytes> {
        let mut body = NdrWriter::new();
        let mut header = match self {
            Pdu::Bind(pdu) => {
                pdu.ndr_encode(&mut body)?;
                pdu.header.clone()
            }
            Pdu::BindAck(pdu) => {
                pdu.ndr_encode(&mut body)?;
                pdu.header.clone()
            }
            Pdu::BindNak(pdu) => {
                pdu.ndr_encode(&mut body)?;
                pdu.header.clone()
            }
            Pdu::Request(pdu) => {
                pdu.ndr_encode(&mut body)?;
                let mut header = pdu.header.clone();
                if pdu.object_uuid.is_some() {
                    header.packet_flags.set(PacketFlags::OBJECT_UUID);
                }
                header
            }
            Pdu::Response(pdu) => {
                pdu.ndr_encode(&mut body)?;
                pdu.header.clone()
            }
            Pdu::Fault(pdu) => {
                pdu.ndr_encode(&mut body)?;
                pdu.header.clone()
            }
        };

        let size = PduHeader::SIZE + body.position();
        header.frag_length = u16::try_from(size).map_err(|_| RpcError::PduTooLarge {
            size,
            max: u16::MAX as usize,
        })?;
        header.auth_length = 0;

        let mut w = NdrWriter::new();
        header.ndr_encode(&mut w)?;
        let mut buf = BytesMut::with_capacity(size);
        buf.extend_from_slice(w.as_bytes());
        buf.extend_from_slice(body.as_bytes());
        Ok(buf.freeze())
    }

    /// Get the call ID from the PDU header
    pub fn call_id(&self) -> u32 {
        self.header().call_id
    }

    pub fn header(&self) -> &PduHeader {
        match self {
            Pdu::Bind(pdu) => &pdu.header,
            Pdu::BindAck(pdu) => &pdu.header,
            Pdu::BindNak(pdu) => &pdu.header,
            Pdu::Request(pdu) => &pdu.header,
            Pdu::Response(pdu) => &pdu.header,
            Pdu::Fault(pdu) => &pdu.header,
        }
    }
}
