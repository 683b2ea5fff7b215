//! ORPC envelope
//!
//! Every ORPC request carries an ORPCTHIS ahead of the method's own
//! parameters and every response an ORPCTHAT. The object the call is meant
//! for travels outside the stub, as the request's object UUID.
//!
//! The causality id the caller puts into ORPCTHIS comes back in an ORPCTHAT
//! extent tagged [`CAUSALITY_EXTENSION`]; a reply carrying a different id
//! answers some other request and the stream can no longer be trusted.

use crate::types::{Cid, DcomError, Ipid, OrpcExtent, OrpcThat, OrpcThis, Result};
use bytes::Bytes;
use dcerpc::{HandlerError, ResultCode, Uuid};
use futures::future::BoxFuture;
use futures::FutureExt;
use midl_ndr::{NdrContext, NdrDecode, NdrEncode, NdrReader, NdrWriter};
use std::future::Future;
use std::sync::Arc;
use tracing::{trace, warn};

/// Extension id of the ORPCTHAT extent echoing the request's causality id
pub const CAUSALITY_EXTENSION: Uuid = Uuid::from_u128(0x5f1d3e6a_8c1b_4f7e_9a3d_2b7c4e9f0a11);

/// Request parameters of an ORPC method
#[derive(Debug, Clone, PartialEq)]
pub struct OrpcCall<A> {
    pub this: OrpcThis,
    pub args: A,
}

impl<A> OrpcCall<A> {
    pub fn new(this: OrpcThis, args: A) -> Self {
        Self { this, args }
    }

    pub fn causality(&self) -> Cid {
        self.this.cid
    }

    /// Split into the causality id and the method's own parameters
    pub fn unwrap(self) -> (Cid, A) {
        (self.this.cid, self.args)
    }
}

impl<A: NdrEncode> NdrEncode for OrpcCall<A> {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        self.this.ndr_encode(w)?;
        w.write_deferred()?;
        self.args.ndr_encode(w)
    }
}

impl<A: NdrDecode> NdrDecode for OrpcCall<A> {
    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        let this = OrpcThis::ndr_decode(r)?;
        r.read_deferred()?;
        Ok(Self {
            this,
            args: A::ndr_decode(r)?,
        })
    }
}

/// Response parameters of an ORPC method
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrpcReturn<R> {
    pub that: OrpcThat,
    pub args: R,
}

impl<R> OrpcReturn<R> {
    pub fn new(that: OrpcThat, args: R) -> Self {
        Self { that, args }
    }

    /// Response to `this`, echoing its causality id
    pub fn echo(this: &OrpcThis, args: R) -> Self {
        Self {
            that: OrpcThat::with_extensions(vec![causality_extent(&this.cid)]),
            args,
        }
    }

    /// The echoed causality id, if the server sent one.
    ///
    /// A causality extent whose payload is not a GUID is an error, not an
    /// absent echo.
    pub fn causality(&self) -> midl_ndr::Result<Option<Cid>> {
        let extent = match self
            .that
            .extensions
            .get()
            .and_then(|extensions| extensions.find(&CAUSALITY_EXTENSION))
        {
            Some(extent) => extent,
            None => return Ok(None),
        };
        let mut r = NdrReader::with_context(
            Bytes::copy_from_slice(extent.payload()),
            NdrContext::default(),
        );
        Cid::ndr_decode(&mut r).map(Some)
    }
}

impl<R: ResultCode> ResultCode for OrpcReturn<R> {
    fn result_code(&self) -> i32 {
        self.args.result_code()
    }

    fn set_result_code(&mut self, code: i32) {
        self.args.set_result_code(code);
    }
}

impl<R: NdrEncode> NdrEncode for OrpcReturn<R> {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        self.that.ndr_encode(w)?;
        w.write_deferred()?;
        self.args.ndr_encode(w)
    }
}

impl<R: NdrDecode> NdrDecode for OrpcReturn<R> {
    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        let that = OrpcThat::ndr_decode(r)?;
        r.read_deferred()?;
        Ok(Self {
            that,
            args: R::ndr_decode(r)?,
        })
    }
}

fn causality_extent(cid: &Cid) -> OrpcExtent {
    // GUID layout, identical in both transfer syntaxes
    let mut w = NdrWriter::new();
    w.write_data(cid.0.time_low);
    w.write_data(cid.0.time_mid);
    w.write_data(cid.0.time_hi_and_version);
    w.write_data(cid.0.clock_seq_hi_and_reserved);
    w.write_data(cid.0.clock_seq_low);
    w.write_bytes(&cid.0.node);
    OrpcExtent::new(CAUSALITY_EXTENSION, w.into_bytes().to_vec())
}

/// Build the request envelope for a call on `ipid`.
///
/// Fails with [`DcomError::MissingObjectAddress`] when there is no object
/// to address; nothing has been sent at that point.
pub fn wrap<A>(causality: Cid, ipid: Option<Ipid>, args: A) -> Result<(Ipid, OrpcCall<A>)> {
    let ipid = ipid
        .filter(|ipid| !ipid.is_nil())
        .ok_or(DcomError::MissingObjectAddress)?;
    Ok((ipid, OrpcCall::new(OrpcThis::with_causality(causality), args)))
}

/// Check the response belongs to the call made with `expected` and return
/// its parameters.
///
/// A response without an echoed causality id is accepted; one whose echo
/// cannot be decoded is not.
pub fn unwrap_return<R>(expected: Cid, ret: OrpcReturn<R>) -> Result<R> {
    match ret.causality().map_err(DcomError::InvalidCausality)? {
        Some(got) if got != expected => Err(DcomError::CausalityMismatch { expected, got }),
        Some(_) => Ok(ret.args),
        None => {
            trace!(causality = %expected, "response carries no causality extent");
            Ok(ret.args)
        }
    }
}

/// Adapt a method body to an ORPC operation handler.
///
/// The body receives the causality id and the method's own parameters. The
/// response always echoes the request's causality id; a [`HandlerError`]
/// becomes the result code of an otherwise default response.
pub fn orpc_handler<A, R, F, Fut>(
    handler: F,
) -> impl Fn(OrpcCall<A>) -> BoxFuture<'static, std::result::Result<OrpcReturn<R>, HandlerError>>
       + Send
       + Sync
       + 'static
where
    A: Send + 'static,
    R: ResultCode + Default + Send + 'static,
    F: Fn(Cid, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
{
    let handler = Arc::new(handler);
    move |call: OrpcCall<A>| {
        let handler = Arc::clone(&handler);
        async move {
            let OrpcCall { this, args } = call;
            let args = match handler(this.cid, args).await {
                Ok(args) => args,
                Err(err) => {
                    warn!(causality = %this.cid, code = err.code, "ORPC method failed: {}", err.message);
                    let mut args = R::default();
                    args.set_result_code(err.code);
                    args
                }
            };
            Ok(OrpcReturn::echo(&this, args))
        }
        .boxed()
    }
}
