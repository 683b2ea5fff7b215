//! High-level DCOM server API
//!
//! Objects are exported as interface dispatchers under an IPID. A request
//! is routed by the object UUID of its PDU: the IPID selects the dispatcher
//! and the opnum the method, with the IUnknown range resolved by the base
//! every DCOM interface derives from.

use crate::types::{iid, generate_uuid, Ipid, Result};
use async_trait::async_trait;
use bytes::Bytes;
use dcerpc::{
    CallContext, DceRpcServer, DceRpcServerConfig, Dispatch, FaultStatus, InterfaceBuilder,
    InterfaceDispatcher, RpcError, SyntaxId,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Opnums 0..3 belong to IUnknown
pub const IUNKNOWN_OPNUM_COUNT: u16 = 3;

/// IUnknown version 0.0
pub const IUNKNOWN_SYNTAX: SyntaxId = SyntaxId::new(iid::IUNKNOWN, 0, 0);

/// The IUnknown base dispatcher.
///
/// QueryInterface, AddRef and Release are handled through IRemUnknown and
/// never travel as ORPC calls on the object itself.
pub fn iunknown() -> InterfaceDispatcher {
    InterfaceBuilder::new("IUnknown", IUNKNOWN_SYNTAX)
        .not_used_on_wire(0, "QueryInterface")
        .not_used_on_wire(1, "AddRef")
        .not_used_on_wire(2, "Release")
        .build()
}

/// Exported objects, keyed by IPID
#[derive(Default)]
pub struct ObjectTable {
    objects: RwLock<HashMap<Ipid, Arc<InterfaceDispatcher>>>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `dispatcher` under `ipid`, returning what was exported there before
    pub fn export(
        &self,
        ipid: Ipid,
        dispatcher: Arc<InterfaceDispatcher>,
    ) -> Option<Arc<InterfaceDispatcher>> {
        debug!(%ipid, interface = dispatcher.name(), "exporting object");
        let previous = self.objects.write().insert(ipid, dispatcher);
        if previous.is_some() {
            warn!(%ipid, "replaced exported object");
        }
        previous
    }

    /// Export `dispatcher` under a fresh IPID
    pub fn export_new(&self, dispatcher: Arc<InterfaceDispatcher>) -> Ipid {
        let ipid = Ipid::new(generate_uuid());
        self.export(ipid, dispatcher);
        ipid
    }

    pub fn revoke(&self, ipid: &Ipid) -> Option<Arc<InterfaceDispatcher>> {
        let removed = self.objects.write().remove(ipid);
        if removed.is_some() {
            debug!(%ipid, "revoked object");
        }
        removed
    }

    pub fn lookup(&self, ipid: &Ipid) -> Option<Arc<InterfaceDispatcher>> {
        self.objects.read().get(ipid).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

fn same_interface(a: &SyntaxId, b: &SyntaxId) -> bool {
    a.uuid == b.uuid && a.major_version() == b.major_version()
}

#[async_trait]
impl Dispatch for ObjectTable {
    fn supports(&self, syntax: &SyntaxId) -> bool {
        self.objects
            .read()
            .values()
            .any(|dispatcher| same_interface(&dispatcher.syntax(), syntax))
    }

    async fn dispatch(&self, call: CallContext, stub: Bytes) -> dcerpc::Result<Bytes> {
        let unknown_object = RpcError::Fault(FaultStatus::UnknownObject as u32);
        let Some(ipid) = call.object.map(Ipid::from) else {
            warn!(opnum = call.opnum, "ORPC request without object UUID");
            return Err(unknown_object);
        };
        let Some(target) = self.lookup(&ipid) else {
            warn!(%ipid, opnum = call.opnum, "request for unknown object");
            return Err(unknown_object);
        };
        if !same_interface(&target.syntax(), &call.syntax) {
            warn!(%ipid, bound = %call.syntax, exported = %target.syntax(), "interface mismatch");
            return Err(RpcError::InterfaceNotFound(call.syntax.to_string()));
        }
        target.invoke(call.opnum, call.ndr_context(), stub).await
    }
}

/// DCOM Server configuration
#[derive(Clone, Debug)]
pub struct DcomServerConfig {
    /// Address to listen on for RPC connections
    pub rpc_addr: SocketAddr,
    pub rpc: DceRpcServerConfig,
}

impl Default for DcomServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([0, 0, 0, 0], 0)))
    }
}

impl DcomServerConfig {
    pub fn new(rpc_addr: SocketAddr) -> Self {
        Self {
            rpc_addr,
            rpc: DceRpcServerConfig::default(),
        }
    }
}

/// High-level DCOM server
///
/// Hosts an [`ObjectTable`] behind a DCE RPC server.
pub struct DcomServer {
    config: DcomServerConfig,
    objects: Arc<ObjectTable>,
    rpc_server: DceRpcServer,
}

impl DcomServer {
    pub fn new(config: DcomServerConfig) -> Self {
        let objects = Arc::new(ObjectTable::new());
        let dispatch: Arc<dyn Dispatch> = Arc::clone(&objects) as Arc<dyn Dispatch>;
        let rpc_server = DceRpcServer::with_config(dispatch, config.rpc.clone());
        Self {
            config,
            objects,
            rpc_server,
        }
    }

    pub fn with_addr(addr: SocketAddr) -> Self {
        Self::new(DcomServerConfig::new(addr))
    }

    pub fn config(&self) -> &DcomServerConfig {
        &self.config
    }

    pub fn objects(&self) -> &Arc<ObjectTable> {
        &self.objects
    }

    pub fn rpc_server(&self) -> &DceRpcServer {
        &self.rpc_server
    }

    /// Export an object under a fresh IPID
    pub fn export(&self, dispatcher: InterfaceDispatcher) -> Ipid {
        let name = dispatcher.name().to_string();
        let ipid = self.objects.export_new(Arc::new(dispatcher));
        info!("Exported {} as {}", name, ipid);
        ipid
    }

    /// Run the server (blocking)
    pub async fn run(&self) -> Result<()> {
        Ok(self.rpc_server.run(self.config.rpc_addr).await?)
    }

    /// Run until a shutdown signal
    pub async fn run_until<F: Future<Output = ()>>(&self, shutdown: F) -> Result<()> {
        Ok(self
            .rpc_server
            .run_until(self.config.rpc_addr, shutdown)
            .await?)
    }

    /// Serve an already bound listener until `shutdown`
    pub async fn serve<F: Future<Output = ()>>(
        &self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<()> {
        Ok(self.rpc_server.serve(listener, shutdown).await?)
    }

    /// Serve one established byte stream
    pub async fn serve_connection<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Ok(self.rpc_server.serve_connection(stream).await?)
    }
}
