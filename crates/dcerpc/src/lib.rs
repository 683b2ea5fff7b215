//! DCE RPC (MS-RPC) connection-oriented client and server
//!
//! This crate carries typed operations over the DCE RPC wire protocol as
//! specified in DCE 1.1 RPC and MS-RPCE. Stub data is marshalled with
//! [`midl_ndr`].
//!
//! # Features
//!
//! - Connection-oriented PDUs (bind, bind-ack, bind-nak, request, response, fault)
//! - NDR 2.0 and NDR64 transfer syntax negotiation
//! - Typed [`Operation`] contract with an immutable [`Registry`] of interfaces
//! - Base-range delegation for derived interfaces
//! - Async server and client using Tokio
//!
//! # Example
//!
//! ```no_run
//! use dcerpc::{
//!     DceRpcClient, DceRpcClientConfig, DceRpcServer, InterfaceBuilder, Registry, SyntaxId, Uuid,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> dcerpc::Result<()> {
//!     let syntax = SyntaxId::new(Uuid::parse("12345678-1234-1234-1234-123456789012").unwrap(), 1, 0);
//!
//!     let registry = Registry::builder()
//!         .register(InterfaceBuilder::new("IExample", syntax).build())?
//!         .build();
//!     let server = DceRpcServer::new(Arc::new(registry));
//!     tokio::spawn(async move { server.run("127.0.0.1:12345".parse().unwrap()).await });
//!
//!     let client =
//!         DceRpcClient::connect("127.0.0.1:12345".parse().unwrap(), DceRpcClientConfig::default())
//!             .await?;
//!     let context = client.bind(syntax).await?;
//!     let _reply = client.call(&context, 0, None, bytes::Bytes::new()).await;
//!     Ok(())
//! }
//! ```

pub mod error;

pub mod dcerpc;
pub mod dcerpc_client;
pub mod dcerpc_server;
pub mod dcerpc_transport;
pub mod operation;
pub mod registry;

pub use error::{Result, RpcError};

pub use dcerpc::{
    provider_reason, reject_reason, BindAckPdu, BindNakPdu, BindPdu, ContextElement,
    ContextResult, ContextResultEntry, DataRepresentation, FaultPdu, FaultStatus, PacketFlags,
    PacketType, Pdu, PduHeader, RequestPdu, ResponsePdu, SyntaxId, Uuid, DCE_RPC_VERSION,
    DCE_RPC_VERSION_MINOR, NDR20_SYNTAX, NDR64_SYNTAX, NDR64_SYNTAX_UUID, NDR64_SYNTAX_VERSION,
    NDR_SYNTAX_UUID, NDR_SYNTAX_VERSION,
};
pub use dcerpc_client::{DceRpcClient, DceRpcClientConfig, PresentationContext, DEFAULT_CALL_TIMEOUT};
pub use dcerpc_server::{
    fault_status_for, DceRpcServer, DceRpcServerConfig, ServerStats, ServerStatsSnapshot,
};
pub use dcerpc_transport::{DceRpcTransport, DEFAULT_MAX_PDU_SIZE};
pub use operation::{
    check_result_code, request_from_bytes, request_to_bytes, response_from_bytes,
    response_to_bytes, ErrorLookup, HandlerError, NoErrorLookup, Operation, ResultCode,
};
pub use registry::{
    CallContext, CallState, CallTracker, Dispatch, InterfaceBuilder, InterfaceDispatcher,
    OperationDescriptor, Registry, RegistryBuilder,
};
