//! DCOM error types

use super::identifiers::Cid;
use thiserror::Error;

/// Result type for DCOM operations
pub type Result<T> = std::result::Result<T, DcomError>;

/// DCOM-specific errors
#[derive(Error, Debug)]
pub enum DcomError {
    /// Underlying DCE RPC error
    #[error("DCE RPC error: {0}")]
    Rpc(#[from] dcerpc::RpcError),

    /// Envelope or parameter marshalling failed
    #[error("NDR error: {0}")]
    Ndr(#[from] midl_ndr::NdrError),

    /// The call names no object; nothing was sent
    #[error("ipid is missing")]
    MissingObjectAddress,

    /// The response does not belong to the request it answers
    #[error("causality mismatch: expected {expected}, got {got}")]
    CausalityMismatch { expected: Cid, got: Cid },

    /// The response carries a causality echo that does not decode
    #[error("invalid causality echo: {0}")]
    InvalidCausality(#[source] midl_ndr::NdrError),

    /// The remote method returned a failure HRESULT
    #[error("HRESULT 0x{:08x}: {message}", *.code as u32)]
    Hresult { code: i32, message: String },
}

impl DcomError {
    /// Protocol errors that leave the connection in an unknown state
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DcomError::CausalityMismatch { .. }
                | DcomError::InvalidCausality(_)
                | DcomError::Rpc(dcerpc::RpcError::CallIdMismatch { .. })
        )
    }
}

/// HRESULT codes commonly used in DCOM
pub mod hresult {
    /// Operation successful
    pub const S_OK: u32 = 0x00000000;
    /// Operation successful, returning false
    pub const S_FALSE: u32 = 0x00000001;
    /// Unspecified error
    pub const E_FAIL: u32 = 0x80004005;
    /// Invalid pointer
    pub const E_POINTER: u32 = 0x80004003;
    /// No such interface supported
    pub const E_NOINTERFACE: u32 = 0x80004002;
    /// Not implemented
    pub const E_NOTIMPL: u32 = 0x80004001;
    /// Out of memory
    pub const E_OUTOFMEMORY: u32 = 0x8007000E;
    /// Invalid argument
    pub const E_INVALIDARG: u32 = 0x80070057;
    /// Class not registered
    pub const REGDB_E_CLASSNOTREG: u32 = 0x80040154;
    /// Access denied
    pub const E_ACCESSDENIED: u32 = 0x80070005;
    /// Object or server not available
    pub const CO_E_OBJNOTCONNECTED: u32 = 0x800401FD;
    /// RPC server unavailable
    pub const RPC_E_SERVER_DIED: u32 = 0x80010007;
    /// Server is too busy
    pub const RPC_E_TOO_LATE: u32 = 0x80010119;
    /// Object is not exported
    pub const RPC_E_INVALID_OBJECT: u32 = 0x80010108;

    /// Short description of a known code
    pub fn describe(code: u32) -> Option<&'static str> {
        let text = match code {
            S_OK => "success",
            S_FALSE => "success, false",
            E_FAIL => "unspecified error",
            E_POINTER => "invalid pointer",
            E_NOINTERFACE => "no such interface supported",
            E_NOTIMPL => "not implemented",
            E_OUTOFMEMORY => "out of memory",
            E_INVALIDARG => "invalid argument",
            REGDB_E_CLASSNOTREG => "class not registered",
            E_ACCESSDENIED => "access denied",
            CO_E_OBJNOTCONNECTED => "object is not connected to server",
            RPC_E_SERVER_DIED => "remote server died",
            RPC_E_TOO_LATE => "call made too late",
            RPC_E_INVALID_OBJECT => "the requested object does not exist",
            _ => return None,
        };
        Some(text)
    }
}

/// [`dcerpc::ErrorLookup`] for the HRESULTs in [`hresult`]
#[derive(Debug, Clone, Copy, Default)]
pub struct HresultLookup;

impl dcerpc::ErrorLookup for HresultLookup {
    fn describe(&self, code: i32) -> Option<String> {
        hresult::describe(code as u32).map(str::to_string)
    }
}
