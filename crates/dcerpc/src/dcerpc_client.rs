//! DCE RPC Client
//!
//! A client for the connection-oriented DCE RPC protocol. One connection
//! carries any number of bound presentation contexts; calls on it are
//! serialized, each waiting for its own response or fault.

use crate::dcerpc::{BindPdu, ContextResult, Pdu, RequestPdu, SyntaxId, Uuid};
use crate::dcerpc_transport::{DceRpcTransport, DEFAULT_MAX_PDU_SIZE};
use crate::error::{Result, RpcError};
use crate::operation::{self, Operation};
use bytes::Bytes;
use midl_ndr::{NdrContext, TransferSyntax};
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Default time a call may take before it is abandoned
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// DCE RPC client configuration
#[derive(Debug, Clone)]
pub struct DceRpcClientConfig {
    pub call_timeout: Duration,
    pub max_pdu_size: usize,
    pub max_xmit_frag: u16,
    pub max_recv_frag: u16,
    /// Transfer syntaxes offered on bind, in order of preference
    pub transfer_syntaxes: Vec<TransferSyntax>,
}

impl Default for DceRpcClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_pdu_size: DEFAULT_MAX_PDU_SIZE,
            max_xmit_frag: 4280,
            max_recv_frag: 4280,
            transfer_syntaxes: vec![TransferSyntax::Ndr20],
        }
    }
}

/// An accepted presentation context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentationContext {
    pub context_id: u16,
    pub interface: SyntaxId,
    pub transfer_syntax: TransferSyntax,
}

impl PresentationContext {
    pub fn ndr_context(&self) -> NdrContext {
        NdrContext::with_syntax(self.transfer_syntax)
    }
}

struct Transports<S> {
    read: DceRpcTransport<ReadHalf<S>>,
    write: DceRpcTransport<WriteHalf<S>>,
}

/// DCE RPC Client for making calls to a DCE RPC server
pub struct DceRpcClient<S = TcpStream> {
    transports: Mutex<Transports<S>>,
    call_id_counter: AtomicU32,
    context_id_counter: AtomicU16,
    contexts: SyncMutex<HashMap<(Uuid, u16), PresentationContext>>,
    config: DceRpcClientConfig,
}

impl DceRpcClient<TcpStream> {
    /// Connect to a DCE RPC server over TCP
    pub async fn connect(addr: SocketAddr, config: DceRpcClientConfig) -> Result<Self> {
        let stream = tokio::time::timeout(config.call_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| RpcError::Timeout)??;
        stream.set_nodelay(true)?;
        debug!("Connected to {}", addr);
        Ok(Self::from_stream(stream, config))
    }
}

impl<S> DceRpcClient<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Create a client over an established stream (no contexts bound)
    pub fn from_stream(stream: S, config: DceRpcClientConfig) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            transports: Mutex::new(Transports {
                read: DceRpcTransport::new(reader).with_max_pdu_size(config.max_pdu_size),
                write: DceRpcTransport::new(writer).with_max_pdu_size(config.max_pdu_size),
            }),
            call_id_counter: AtomicU32::new(1),
            context_id_counter: AtomicU16::new(0),
            contexts: SyncMutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &DceRpcClientConfig {
        &self.config
    }

    fn next_call_id(&self) -> u32 {
        self.call_id_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// The context already negotiated for `interface`, if any
    pub fn context_for(&self, interface: &SyntaxId) -> Option<PresentationContext> {
        self.contexts
            .lock()
            .get(&(interface.uuid, interface.major_version()))
            .copied()
    }

    /// Negotiate a presentation context for `interface`.
    ///
    /// A context that is already bound is returned without a round trip.
    pub async fn bind(&self, interface: SyntaxId) -> Result<PresentationContext> {
        if let Some(context) = self.context_for(&interface) {
            return Ok(context);
        }

        let call_id = self.next_call_id();
        let context_id = self.context_id_counter.fetch_add(1, Ordering::SeqCst);
        let offered = self
            .config
            .transfer_syntaxes
            .iter()
            .map(|ts| SyntaxId::for_transfer_syntax(*ts))
            .collect::<Vec<_>>();
        let mut bind = BindPdu::new(call_id, interface, offered);
        bind.max_xmit_frag = self.config.max_xmit_frag;
        bind.max_recv_frag = self.config.max_recv_frag;
        bind.context_list[0].context_id = context_id;

        debug!(
            "Sending bind request: call_id={}, interface={}",
            call_id, interface
        );

        let pdu = self.round_trip(Pdu::Bind(bind), call_id).await?;

        let context = match pdu {
            Pdu::BindAck(ack) => {
                let entry = ack
                    .results
                    .first()
                    .ok_or_else(|| RpcError::BindFailed("no bind result".to_string()))?;
                if entry.result != ContextResult::Acceptance {
                    return Err(RpcError::BindFailed(format!(
                        "context rejected: {:?}, reason {}",
                        entry.result, entry.reason
                    )));
                }
                let transfer_syntax = entry.transfer_syntax.transfer_syntax().ok_or_else(|| {
                    RpcError::BindFailed(format!(
                        "server chose unknown transfer syntax {}",
                        entry.transfer_syntax
                    ))
                })?;

                debug!(
                    "Bind successful: max_xmit={}, max_recv={}, syntax={:?}",
                    ack.max_xmit_frag, ack.max_recv_frag, transfer_syntax
                );

                PresentationContext {
                    context_id,
                    interface,
                    transfer_syntax,
                }
            }
            Pdu::BindNak(nak) => {
                return Err(RpcError::BindRejected {
                    reason: nak.reject_reason,
                })
            }
            Pdu::Fault(fault) => return Err(RpcError::Fault(fault.status)),
            other => {
                return Err(RpcError::InvalidMessageType(
                    other.header().packet_type as i32,
                ))
            }
        };

        self.contexts
            .lock()
            .insert((interface.uuid, interface.major_version()), context);
        Ok(context)
    }

    /// Make an RPC call with marshalled stub data
    ///
    /// `object` travels as the request's object UUID.
    pub async fn call(
        &self,
        context: &PresentationContext,
        opnum: u16,
        object: Option<Uuid>,
        stub_data: Bytes,
    ) -> Result<Bytes> {
        let call_id = self.next_call_id();
        let mut request = RequestPdu::new(call_id, opnum, stub_data);
        request.context_id = context.context_id;
        request.object_uuid = object;

        debug!(
            "Sending request: call_id={}, opnum={}, stub_len={}",
            call_id,
            opnum,
            request.stub_data.len()
        );

        match self.round_trip(Pdu::Request(request), call_id).await? {
            Pdu::Response(response) => {
                trace!("Call succeeded: {} bytes result", response.stub_data.len());
                Ok(response.stub_data)
            }
            Pdu::Fault(fault) => Err(RpcError::Fault(fault.status)),
            other => Err(RpcError::InvalidMessageType(
                other.header().packet_type as i32,
            )),
        }
    }

    /// Call operation `Op`, marshalling in the context's transfer syntax
    pub async fn invoke<Op: Operation>(
        &self,
        context: &PresentationContext,
        object: Option<Uuid>,
        request: &Op::Request,
    ) -> Result<Op::Response> {
        let ctx = context.ndr_context();
        let stub = operation::request_to_bytes::<Op>(request, ctx)?;
        let reply = self.call(context, Op::OPNUM, object, stub).await?;
        operation::response_from_bytes::<Op>(reply, ctx)
    }

    /// Send `pdu` and wait for the reply carrying `call_id`
    async fn round_trip(&self, pdu: Pdu, call_id: u32) -> Result<Pdu> {
        let encoded = pdu.encode()?;
        tokio::time::timeout(self.config.call_timeout, self.exchange(&encoded, call_id))
            .await
            .map_err(|_| RpcError::Timeout)?
    }

    async fn exchange(&self, encoded: &[u8], call_id: u32) -> Result<Pdu> {
        let mut transports = self.transports.lock().await;
        transports.write.write_pdu(encoded).await?;
        loop {
            let reply = transports.read.read_pdu_decoded().await?;
            let got = reply.call_id();
            if got == call_id {
                return Ok(reply);
            }
            // A reply to a call that already timed out
            if got < call_id {
                warn!("Discarding late reply for call_id={}", got);
                continue;
            }
            return Err(RpcError::CallIdMismatch {
                expected: call_id,
                got,
            });
        }
    }
}
