//! Typed operation contract
//!
//! An [`Operation`] binds an opnum and a method name to its request and
//! response parameter structures. Request and response types encode their
//! top-level parameters in order; the helpers here flush pointer referents
//! after the outermost value, so a complete stub comes out of a single call.

use crate::error::{Result, RpcError};
use bytes::Bytes;
use midl_ndr::{NdrContext, NdrDecode, NdrEncode, NdrReader, NdrWriter};
use thiserror::Error;
use tracing::debug;

/// Access to the trailing `i32` status every response carries
pub trait ResultCode {
    fn result_code(&self) -> i32;
    fn set_result_code(&mut self, code: i32);
}

/// A remote method: opnum, name and parameter types
pub trait Operation: Send + Sync + 'static {
    const OPNUM: u16;
    const NAME: &'static str;

    type Request: NdrEncode + NdrDecode + Send + 'static;
    type Response: NdrEncode + NdrDecode + ResultCode + Default + Send + 'static;

    fn operation_number() -> u16 {
        Self::OPNUM
    }

    fn operation_name() -> &'static str {
        Self::NAME
    }

    fn encode_request(w: &mut NdrWriter, request: &Self::Request) -> Result<()> {
        encode_top_level(w, request)
    }

    fn decode_request(r: &mut NdrReader) -> Result<Self::Request> {
        decode_top_level(r)
    }

    fn encode_response(w: &mut NdrWriter, response: &Self::Response) -> Result<()> {
        encode_top_level(w, response)
    }

    fn decode_response(r: &mut NdrReader) -> Result<Self::Response> {
        decode_top_level(r)
    }
}

fn encode_top_level<T: NdrEncode>(w: &mut NdrWriter, value: &T) -> Result<()> {
    value.ndr_encode(w)?;
    w.write_deferred()?;
    Ok(())
}

fn decode_top_level<T: NdrDecode>(r: &mut NdrReader) -> Result<T> {
    let value = T::ndr_decode(r)?;
    r.read_deferred()?;
    Ok(value)
}

/// Encode a request stub for `Op`
pub fn request_to_bytes<Op: Operation>(request: &Op::Request, ctx: NdrContext) -> Result<Bytes> {
    let mut w = NdrWriter::with_context(ctx);
    Op::encode_request(&mut w, request)?;
    Ok(w.into_bytes())
}

/// Encode a response stub for `Op`
pub fn response_to_bytes<Op: Operation>(response: &Op::Response, ctx: NdrContext) -> Result<Bytes> {
    let mut w = NdrWriter::with_context(ctx);
    Op::encode_response(&mut w, response)?;
    Ok(w.into_bytes())
}

/// Decode a request stub for `Op`. Trailing bytes are tolerated.
pub fn request_from_bytes<Op: Operation>(stub: Bytes, ctx: NdrContext) -> Result<Op::Request> {
    let mut r = NdrReader::with_context(stub, ctx);
    let request = Op::decode_request(&mut r)?;
    log_trailing(Op::NAME, &r);
    Ok(request)
}

/// Decode a response stub for `Op`. Trailing bytes are tolerated.
pub fn response_from_bytes<Op: Operation>(stub: Bytes, ctx: NdrContext) -> Result<Op::Response> {
    let mut r = NdrReader::with_context(stub, ctx);
    let response = Op::decode_response(&mut r)?;
    log_trailing(Op::NAME, &r);
    Ok(response)
}

fn log_trailing(name: &str, r: &NdrReader) {
    if r.remaining() > 0 {
        debug!(
            operation = name,
            trailing = r.remaining(),
            "ignoring trailing bytes after stub"
        );
    }
}

/// Failure reported by an operation handler.
///
/// The code travels back to the caller as the response's result code.
#[derive(Debug, Clone, Error)]
#[error("handler failed with 0x{:08x}: {message}", *.code as u32)]
pub struct HandlerError {
    pub code: i32,
    pub message: String,
}

impl HandlerError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn from_code(code: i32) -> Self {
        Self {
            code,
            message: String::new(),
        }
    }
}

/// Maps non-zero result codes to readable messages
pub trait ErrorLookup: Send + Sync {
    fn describe(&self, code: i32) -> Option<String>;
}

/// Lookup that knows no codes
#[derive(Debug, Clone, Copy, Default)]
pub struct NoErrorLookup;

impl ErrorLookup for NoErrorLookup {
    fn describe(&self, _code: i32) -> Option<String> {
        None
    }
}

/// Turn a non-zero result code into [`RpcError::ResultCode`]
pub fn check_result_code(code: i32, lookup: &dyn ErrorLookup) -> Result<()> {
    if code == 0 {
        return Ok(());
    }
    let message = lookup
        .describe(code)
        .unwrap_or_else(|| format!("unknown error 0x{:08x}", code as u32));
    Err(RpcError::ResultCode { code, message })
}
