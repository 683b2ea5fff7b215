//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Once};

use dcerpc::{DceRpcClient, DceRpcClientConfig, DceRpcServer, Dispatch};
use dcom::DcomServer;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

static INIT: Once = Once::new();

/// Install a test log subscriber once; filter with `RUST_LOG`
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A server running on an ephemeral local port; aborted on drop
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn spawn<F, Fut, E>(serve: F) -> std::io::Result<Self>
    where
        F: FnOnce(TcpListener, oneshot::Receiver<()>) -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: std::fmt::Display,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, rx) = oneshot::channel();
        let serving = serve(listener, rx);
        let handle = tokio::spawn(async move {
            if let Err(e) = serving.await {
                warn!("test server stopped: {}", e);
            }
        });
        Ok(Self {
            addr,
            shutdown: Some(tx),
            handle,
        })
    }

    /// Ask the server to stop accepting connections
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown();
        self.handle.abort();
    }
}

/// Serve `dispatch` over DCE RPC on 127.0.0.1
pub async fn start_rpc_server(dispatch: Arc<dyn Dispatch>) -> std::io::Result<TestServer> {
    let server = DceRpcServer::new(dispatch);
    TestServer::spawn(move |listener, rx| async move {
        server
            .serve(listener, async {
                let _ = rx.await;
            })
            .await
    })
    .await
}

/// Serve a DCOM server's exported objects on 127.0.0.1
pub async fn start_dcom_server(server: DcomServer) -> std::io::Result<TestServer> {
    TestServer::spawn(move |listener, rx| async move {
        server
            .serve(listener, async {
                let _ = rx.await;
            })
            .await
    })
    .await
}

pub async fn connect_client(addr: SocketAddr) -> dcerpc::Result<DceRpcClient> {
    DceRpcClient::connect(addr, DceRpcClientConfig::default()).await
}
