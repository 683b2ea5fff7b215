//! DCOM (Distributed Component Object Model) Object RPC
//!
//! This crate layers the ORPC conventions of MS-DCOM on top of the
//! [`dcerpc`] crate.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    DCOM Layer (this crate)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  OrpcClient           │  ORPC envelope    │  ObjectTable    │
//! │  - IPID addressing    │  - ORPCTHIS/THAT  │  - IPID routing │
//! │  - HRESULT mapping    │  - causality echo │  - IUnknown base│
//! ├─────────────────────────────────────────────────────────────┤
//! │                  DCE RPC Layer (dcerpc crate)               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! - **IPID**: Interface Pointer ID, selects the object a call is for
//! - **CID**: Causality ID, chosen per call and echoed on the response
//! - **ORPCTHIS / ORPCTHAT**: implicit first parameter of every request and
//!   response
//!
//! # Modules
//!
//! - [`types`]: Core DCOM data types
//! - [`envelope`]: Wrapping and unwrapping ORPC parameters

pub mod envelope;
pub mod types;

mod client;
mod server;

pub use client::OrpcClient;
pub use envelope::{
    orpc_handler, unwrap_return, wrap, OrpcCall, OrpcReturn, CAUSALITY_EXTENSION,
};
pub use server::{
    iunknown, DcomServer, DcomServerConfig, ObjectTable, IUNKNOWN_OPNUM_COUNT, IUNKNOWN_SYNTAX,
};
pub use types::{
    hresult, iid, Cid, ComVersion, DcomError, HresultLookup, Ipid, OrpcExtent, OrpcExtentArray,
    OrpcThat, OrpcThis, Result,
};

/// DCOM version supported by this implementation
pub const DCOM_VERSION: ComVersion = ComVersion::DCOM_5_7;
