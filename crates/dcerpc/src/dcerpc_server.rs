//! DCE RPC Server
//!
//! Connection-oriented server for the DCE RPC protocol.
//!
//! # Scalability Features
//!
//! - Each connection handled in a separate Tokio task
//! - Semaphore-based connection limiting
//! - Server statistics tracking
//! - Graceful shutdown support
//! - Immutable dispatch table shared by every connection

use crate::dcerpc::{
    provider_reason, reject_reason, BindAckPdu, BindNakPdu, BindPdu, ContextResultEntry,
    FaultPdu, FaultStatus, Pdu, RequestPdu, ResponsePdu, SyntaxId, NDR20_SYNTAX, NDR64_SYNTAX,
};
use crate::dcerpc_transport::DceRpcTransport;
use crate::error::{Result, RpcError};
use crate::registry::{CallContext, Dispatch};
use bytes::Bytes;
use midl_ndr::TransferSyntax;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// DCE RPC Server configuration
#[derive(Debug, Clone)]
pub struct DceRpcServerConfig {
    pub max_pdu_size: usize,
    pub max_connections: usize,
    pub max_xmit_frag: u16,
    pub max_recv_frag: u16,
}

impl Default for DceRpcServerConfig {
    fn default() -> Self {
        Self {
            max_pdu_size: 65536,
            max_connections: 10000,
            max_xmit_frag: 4280,
            max_recv_frag: 4280,
        }
    }
}

/// Server statistics
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_accepted: AtomicU64,
    pub connections_active: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub requests_received: AtomicU64,
    pub requests_processed: AtomicU64,
    pub requests_failed: AtomicU64,
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,
}

impl ServerStats {
    pub fn snapshot(&self) -> ServerStatsSnapshot {
        ServerStatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            requests_received: self.requests_received.load(Ordering::Relaxed),
            requests_processed: self.requests_processed.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of server statistics
#[derive(Debug, Clone)]
pub struct ServerStatsSnapshot {
    pub connections_accepted: u64,
    pub connections_active: u64,
    pub connections_rejected: u64,
    pub requests_received: u64,
    pub requests_processed: u64,
    pub requests_failed: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

/// Fault status reported for a failed call
pub fn fault_status_for(err: &RpcError) -> u32 {
    match err {
        RpcError::UnknownOperation { .. } | RpcError::NotUsedOnWire { .. } => {
            FaultStatus::OpRngError as u32
        }
        RpcError::InterfaceNotFound(_) => FaultStatus::UnkIf as u32,
        RpcError::Decode(_) => FaultStatus::BadStubData as u32,
        RpcError::ContextMismatch => FaultStatus::ContextMismatch as u32,
        RpcError::Fault(status) => *status,
        _ => FaultStatus::RpcError as u32,
    }
}

/// DCE RPC Server
///
/// Each accepted connection runs in its own Tokio task; a semaphore caps
/// the number of concurrent connections. Requests are handed to the
/// [`Dispatch`] implementation given at construction.
pub struct DceRpcServer {
    dispatch: Arc<dyn Dispatch>,
    config: DceRpcServerConfig,
    assoc_group_counter: AtomicU32,
    stats: Arc<ServerStats>,
}

impl DceRpcServer {
    pub fn new(dispatch: Arc<dyn Dispatch>) -> Self {
        Self::with_config(dispatch, DceRpcServerConfig::default())
    }

    pub fn with_config(dispatch: Arc<dyn Dispatch>, config: DceRpcServerConfig) -> Self {
        Self {
            dispatch,
            config,
            assoc_group_counter: AtomicU32::new(1),
            stats: Arc::new(ServerStats::default()),
        }
    }

    pub fn config(&self) -> &DceRpcServerConfig {
        &self.config
    }

    /// Get server statistics
    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    /// Run the server on the given address
    pub async fn run(&self, addr: SocketAddr) -> Result<()> {
        self.run_until(addr, std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F: Future<Output = ()>>(
        &self,
        addr: SocketAddr,
        shutdown: F,
    ) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Accept connections from an already bound listener until `shutdown`
    pub async fn serve<F: Future<Output = ()>>(
        &self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<()> {
        info!(
            "DCE RPC server listening on {} (max_connections: {})",
            listener.local_addr()?,
            self.config.max_connections
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_connections));

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Server shutting down gracefully");
                    // Wait for all connections to complete
                    let _ = semaphore.acquire_many(self.config.max_connections as u32).await;
                    info!("All connections closed");
                    return Ok(());
                }

                result = listener.accept() => {
                    let (stream, peer_addr) = result?;

                    let permit = match semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            self.stats.connections_rejected.fetch_add(1, Ordering::Relaxed);
                            warn!("Connection limit reached, rejecting connection from {}", peer_addr);
                            drop(stream);
                            continue;
                        }
                    };

                    self.stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
                    self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
                    debug!("Accepted connection from {}", peer_addr);

                    let connection = self.connection();
                    let stats = Arc::clone(&self.stats);

                    tokio::spawn(async move {
                        // Permit is held until this task completes
                        let _permit = permit;

                        let result = connection.run(stream).await;

                        stats.connections_active.fetch_sub(1, Ordering::Relaxed);

                        match result {
                            Ok(()) => debug!("Connection closed normally from {}", peer_addr),
                            Err(RpcError::ConnectionClosed) => {
                                debug!("Connection closed from {}", peer_addr);
                            }
                            Err(e) => {
                                warn!("Connection error from {}: {}", peer_addr, e);
                            }
                        }
                    });
                }
            }
        }
    }

    /// Serve one already established byte stream until the peer hangs up
    pub async fn serve_connection<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        match self.connection().run(stream).await {
            Err(RpcError::ConnectionClosed) => Ok(()),
            other => other,
        }
    }

    fn connection(&self) -> Connection {
        Connection {
            dispatch: Arc::clone(&self.dispatch),
            config: self.config.clone(),
            assoc_group_id: self.assoc_group_counter.fetch_add(1, Ordering::SeqCst),
            stats: Arc::clone(&self.stats),
            contexts: HashMap::new(),
        }
    }
}

/// A presentation context accepted on this connection
#[derive(Debug, Clone, Copy)]
struct BoundContext {
    interface: SyntaxId,
    transfer_syntax: TransferSyntax,
}

/// Per-connection state
struct Connection {
    dispatch: Arc<dyn Dispatch>,
    config: DceRpcServerConfig,
    assoc_group_id: u32,
    stats: Arc<ServerStats>,
    contexts: HashMap<u16, BoundContext>,
}

impl Connection {
    async fn run<S>(mut self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let mut read_transport =
            DceRpcTransport::new(reader).with_max_pdu_size(self.config.max_pdu_size);
        let mut write_transport =
            DceRpcTransport::new(writer).with_max_pdu_size(self.config.max_pdu_size);

        loop {
            let data = read_transport.read_pdu().await?;
            self.stats
                .bytes_received
                .fetch_add(data.len() as u64, Ordering::Relaxed);
            self.stats.requests_received.fetch_add(1, Ordering::Relaxed);

            let pdu = match Pdu::decode(&data) {
                Ok(pdu) => pdu,
                Err(RpcError::VersionMismatch { expected, got }) => {
                    warn!("Rejecting peer speaking version {} (want {})", got, expected);
                    let call_id = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);
                    let nak = BindNakPdu::new(call_id, reject_reason::PROTOCOL_VERSION_NOT_SUPPORTED);
                    self.send(&mut write_transport, Pdu::BindNak(nak)).await?;
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            match pdu {
                Pdu::Bind(bind) => {
                    debug!(
                        "Received bind: call_id={}, contexts={}",
                        bind.header.call_id,
                        bind.context_list.len()
                    );
                    let response = self.process_bind(&bind);
                    self.send(&mut write_transport, response).await?;
                    self.stats.requests_processed.fetch_add(1, Ordering::Relaxed);
                }

                Pdu::Request(request) => {
                    debug!(
                        "Received request: call_id={}, opnum={}, stub_len={}",
                        request.header.call_id,
                        request.opnum,
                        request.stub_data.len()
                    );
                    let response = self.process_request(request).await;
                    self.send(&mut write_transport, response).await?;
                }

                Pdu::BindAck(_) | Pdu::BindNak(_) | Pdu::Response(_) => {
                    warn!("Received unexpected client PDU");
                }

                Pdu::Fault(fault) => {
                    warn!("Received fault from client: 0x{:08x}", fault.status);
                }
            }
        }
    }

    async fn send<W>(&self, transport: &mut DceRpcTransport<W>, pdu: Pdu) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let call_id = pdu.call_id();
        let mut encoded = pdu.encode()?;
        if encoded.len() > self.config.max_pdu_size {
            warn!(
                "Response for call_id={} is {} bytes, over the {} byte limit",
                call_id,
                encoded.len(),
                self.config.max_pdu_size
            );
            encoded = Pdu::Fault(FaultPdu::new(call_id, FaultStatus::RpcError)).encode()?;
        }
        self.stats
            .bytes_sent
            .fetch_add(encoded.len() as u64, Ordering::Relaxed);
        transport.write_pdu(&encoded).await
    }

    fn process_bind(&mut self, bind: &BindPdu) -> Pdu {
        if bind.context_list.is_empty() {
            let nak = BindNakPdu::new(bind.header.call_id, reject_reason::NOT_SPECIFIED);
            return Pdu::BindNak(nak);
        }

        let mut results = Vec::with_capacity(bind.context_list.len());
        for context in &bind.context_list {
            if !self.dispatch.supports(&context.abstract_syntax) {
                debug!("Unsupported interface {}", context.abstract_syntax);
                results.push(ContextResultEntry::reject(
                    provider_reason::ABSTRACT_SYNTAX_NOT_SUPPORTED,
                ));
                continue;
            }

            // NDR 2.0 wins whenever the client offers it
            let chosen = [NDR20_SYNTAX, NDR64_SYNTAX]
                .into_iter()
                .find(|ts| context.transfer_syntaxes.contains(ts));

            match chosen.and_then(|ts| ts.transfer_syntax().map(|t| (ts, t))) {
                Some((syntax_id, transfer_syntax)) => {
                    debug!(
                        "Accepted context {}: {} over {:?}",
                        context.context_id, context.abstract_syntax, transfer_syntax
                    );
                    self.contexts.insert(
                        context.context_id,
                        BoundContext {
                            interface: context.abstract_syntax,
                            transfer_syntax,
                        },
                    );
                    results.push(ContextResultEntry::accept(syntax_id));
                }
                None => results.push(ContextResultEntry::reject(
                    provider_reason::PROPOSED_TRANSFER_SYNTAXES_NOT_SUPPORTED,
                )),
            }
        }

        let mut ack = BindAckPdu::new(bind.header.call_id, self.assoc_group_id, results);
        ack.max_xmit_frag = self.config.max_xmit_frag.min(bind.max_xmit_frag);
        ack.max_recv_frag = self.config.max_recv_frag.min(bind.max_recv_frag);
        Pdu::BindAck(ack)
    }

    async fn process_request(&self, request: RequestPdu) -> Pdu {
        let call_id = request.header.call_id;

        let bound = match self.contexts.get(&request.context_id) {
            Some(bound) => *bound,
            None => {
                self.stats.requests_failed.fetch_add(1, Ordering::Relaxed);
                return Pdu::Fault(FaultPdu::new(call_id, FaultStatus::ContextMismatch));
            }
        };

        let call = CallContext {
            syntax: bound.interface,
            opnum: request.opnum,
            object: request.object_uuid,
            transfer_syntax: bound.transfer_syntax,
            call_id,
        };

        match self.dispatch.dispatch(call, request.stub_data).await {
            Ok(result) => {
                self.stats.requests_processed.fetch_add(1, Ordering::Relaxed);
                let mut response = ResponsePdu::new(call_id, result);
                response.context_id = request.context_id;
                Pdu::Response(response)
            }
            Err(e) => {
                error!("Operation error: {}", e);
                self.stats.requests_failed.fetch_add(1, Ordering::Relaxed);
                let mut fault = FaultPdu::new(call_id, FaultStatus::RpcError);
                fault.status = fault_status_for(&e);
                fault.context_id = request.context_id;
                Pdu::Fault(fault)
            }
        }
    }
}
