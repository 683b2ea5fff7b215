//! High-level DCOM client API
//!
//! [`OrpcClient`] makes ORPC calls over a DCE RPC connection: it builds the
//! ORPCTHIS envelope, addresses the call to an IPID, checks the causality
//! id of the reply and turns failure HRESULTs into errors.

use crate::envelope::{self, OrpcCall, OrpcReturn};
use crate::types::{Cid, DcomError, HresultLookup, Ipid, Result};
use dcerpc::{
    check_result_code, DceRpcClient, DceRpcClientConfig, ErrorLookup, Operation,
    PresentationContext, ResultCode, RpcError, SyntaxId,
};
use midl_ndr::{NdrDecode, NdrEncode};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, error};

/// ORPC client over one DCE RPC connection
pub struct OrpcClient<S = TcpStream> {
    rpc: Arc<DceRpcClient<S>>,
    lookup: Arc<dyn ErrorLookup>,
}

impl OrpcClient<TcpStream> {
    /// Connect to a DCOM server over TCP
    pub async fn connect(addr: SocketAddr, config: DceRpcClientConfig) -> Result<Self> {
        let rpc = DceRpcClient::connect(addr, config).await?;
        Ok(Self::new(Arc::new(rpc)))
    }
}

impl<S> OrpcClient<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(rpc: Arc<DceRpcClient<S>>) -> Self {
        Self {
            rpc,
            lookup: Arc::new(HresultLookup),
        }
    }

    /// Replace the table used to describe failure HRESULTs
    pub fn with_error_lookup(mut self, lookup: Arc<dyn ErrorLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn rpc(&self) -> &Arc<DceRpcClient<S>> {
        &self.rpc
    }

    /// Negotiate a presentation context for interface `iid`
    pub async fn bind(&self, iid: SyntaxId) -> Result<PresentationContext> {
        Ok(self.rpc.bind(iid).await?)
    }

    /// Call `Op` on the object `ipid` under a fresh causality id
    pub async fn call<Op, A, R>(
        &self,
        context: &PresentationContext,
        ipid: Option<Ipid>,
        args: A,
    ) -> Result<R>
    where
        Op: Operation<Request = OrpcCall<A>, Response = OrpcReturn<R>>,
        A: NdrEncode + NdrDecode + Send + 'static,
        R: NdrEncode + NdrDecode + ResultCode + Default + Send + 'static,
    {
        self.call_with_causality::<Op, A, R>(context, Cid::generate(), ipid, args)
            .await
    }

    /// Call `Op` on the object `ipid` as part of the causality chain `cid`.
    ///
    /// A missing IPID fails before anything is sent. The reply must echo
    /// `cid`; a non-zero result code becomes [`DcomError::Hresult`].
    pub async fn call_with_causality<Op, A, R>(
        &self,
        context: &PresentationContext,
        cid: Cid,
        ipid: Option<Ipid>,
        args: A,
    ) -> Result<R>
    where
        Op: Operation<Request = OrpcCall<A>, Response = OrpcReturn<R>>,
        A: NdrEncode + NdrDecode + Send + 'static,
        R: NdrEncode + NdrDecode + ResultCode + Default + Send + 'static,
    {
        let (ipid, request) = envelope::wrap(cid, ipid, args).map_err(|err| {
            debug!(operation = Op::NAME, "{}", err);
            err
        })?;
        debug!(operation = Op::NAME, %ipid, causality = %cid, "ORPC call");

        let reply = self.rpc.invoke::<Op>(context, Some(ipid.0), &request).await?;
        let args = envelope::unwrap_return(cid, reply).map_err(|err| {
            error!(operation = Op::NAME, "{}", err);
            err
        })?;

        match check_result_code(args.result_code(), self.lookup.as_ref()) {
            Ok(()) => Ok(args),
            Err(RpcError::ResultCode { code, message }) => {
                Err(DcomError::Hresult { code, message })
            }
            Err(other) => Err(other.into()),
        }
    }
}
