//! Error types for DCE RPC

use crate::dcerpc::SyntaxId;
use midl_ndr::NdrError;
use thiserror::Error;

/// RPC error types
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("NDR error: {0}")]
    Decode(#[from] NdrError),

    #[error("DCE RPC version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u8, got: u8 },

    #[error("interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("interface already registered: {0}")]
    DuplicateInterface(String),

    #[error("unknown operation {opnum} on {syntax}")]
    UnknownOperation { syntax: SyntaxId, opnum: u16 },

    #[error("operation {name} (opnum {opnum}) is not used on the wire")]
    NotUsedOnWire { name: String, opnum: u16 },

    #[error("invalid PDU: {0}")]
    InvalidPduData(String),

    #[error("invalid message type: {0}")]
    InvalidMessageType(i32),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("timeout")]
    Timeout,

    #[error("bind failed: {0}")]
    BindFailed(String),

    #[error("bind rejected: reason {reason}")]
    BindRejected { reason: u16 },

    #[error("fault: status 0x{0:08x}")]
    Fault(u32),

    #[error("context mismatch")]
    ContextMismatch,

    #[error("call ID mismatch: expected {expected}, got {got}")]
    CallIdMismatch { expected: u32, got: u32 },

    #[error("PDU too large: {size} bytes exceeds maximum {max}")]
    PduTooLarge { size: usize, max: usize },

    #[error("record too large: {size} bytes exceeds maximum {max}")]
    RecordTooLarge { size: usize, max: usize },

    #[error("call returned 0x{:08x}: {message}", *.code as u32)]
    ResultCode { code: i32, message: String },
}

pub type Result<T> = std::result::Result<T, RpcError>;
