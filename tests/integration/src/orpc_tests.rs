//! ORPC Tests - DCOM calls addressed to exported objects
//!
//! An `IProperties` object derives from IDispatch (opnums 0..7), which in
//! turn derives from IUnknown (opnums 0..3). Its own method is opnum 7:
//!
//! ```text
//! HRESULT GetProperty([in] ORPCTHIS *This, [in, string] wchar_t *Name,
//!                     [out] ORPCTHAT *That, [out] long *Enabled);
//! ```
//!
//! Tests cover the causality echo end to end, routing into the inherited
//! ranges, object addressing by IPID and the failure paths.

mod common;

use std::sync::Arc;

use common::*;
use dcerpc::{
    FaultStatus, HandlerError, InterfaceBuilder, InterfaceDispatcher, Operation, ResultCode,
    RpcError, SyntaxId, Uuid,
};
use dcom::{
    hresult, iid, iunknown, orpc_handler, Cid, DcomError, DcomServer, Ipid, OrpcCall,
    OrpcClient, OrpcReturn, OrpcThis, IUNKNOWN_OPNUM_COUNT,
};
use midl_ndr::{NdrDecode, NdrEncode, NdrReader, NdrWString, NdrWriter};
use std::net::SocketAddr;

const DISP_E_UNKNOWNNAME: u32 = 0x8002_0006;
const IDISPATCH_OPNUM_COUNT: u16 = 7;

const IDISPATCH_SYNTAX: SyntaxId = SyntaxId::new(iid::IDISPATCH, 0, 0);
const IPROPERTIES_SYNTAX: SyntaxId = SyntaxId::new(
    Uuid::from_u128(0x4e1a2b7c_93d0_4c55_8e1f_6a0b3c9d2e71),
    0,
    0,
);

/// Method without parameters of its own
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct NoArgs;

impl NdrEncode for NoArgs {
    fn ndr_encode(&self, _w: &mut NdrWriter) -> midl_ndr::Result<()> {
        Ok(())
    }
}

impl NdrDecode for NoArgs {
    fn ndr_decode(_r: &mut NdrReader) -> midl_ndr::Result<Self> {
        Ok(NoArgs)
    }
}

/// `[out] UINT *pctinfo` followed by the HRESULT
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct TypeInfoCount {
    count: u32,
    hr: i32,
}

impl NdrEncode for TypeInfoCount {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        w.write_data(self.count);
        w.write_data(self.hr);
        Ok(())
    }
}

impl NdrDecode for TypeInfoCount {
    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        Ok(Self {
            count: r.read_data()?,
            hr: r.read_data()?,
        })
    }
}

impl ResultCode for TypeInfoCount {
    fn result_code(&self) -> i32 {
        self.hr
    }

    fn set_result_code(&mut self, code: i32) {
        self.hr = code;
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct PropertyValue {
    enabled: i32,
    ret: i32,
}

impl NdrEncode for PropertyValue {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        w.write_data(self.enabled);
        w.write_data(self.ret);
        Ok(())
    }
}

impl NdrDecode for PropertyValue {
    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        Ok(Self {
            enabled: r.read_data()?,
            ret: r.read_data()?,
        })
    }
}

impl ResultCode for PropertyValue {
    fn result_code(&self) -> i32 {
        self.ret
    }

    fn set_result_code(&mut self, code: i32) {
        self.ret = code;
    }
}

struct GetTypeInfoCount;

impl Operation for GetTypeInfoCount {
    const OPNUM: u16 = 3;
    const NAME: &'static str = "GetTypeInfoCount";
    type Request = OrpcCall<NoArgs>;
    type Response = OrpcReturn<TypeInfoCount>;
}

struct GetProperty;

impl Operation for GetProperty {
    const OPNUM: u16 = 7;
    const NAME: &'static str = "GetProperty";
    type Request = OrpcCall<NdrWString>;
    type Response = OrpcReturn<PropertyValue>;
}

fn idispatch() -> InterfaceDispatcher {
    InterfaceBuilder::new("IDispatch", IDISPATCH_SYNTAX)
        .base(Arc::new(iunknown()), IUNKNOWN_OPNUM_COUNT)
        .operation::<GetTypeInfoCount, _, _>(orpc_handler(|_cid: Cid, _: NoArgs| async {
            Ok::<_, HandlerError>(TypeInfoCount { count: 0, hr: 0 })
        }))
        .not_used_on_wire(4, "GetTypeInfo")
        .not_used_on_wire(5, "GetIDsOfNames")
        .not_used_on_wire(6, "Invoke")
        .build()
}

fn properties(enabled: i32) -> InterfaceDispatcher {
    InterfaceBuilder::new("IProperties", IPROPERTIES_SYNTAX)
        .base(Arc::new(idispatch()), IDISPATCH_OPNUM_COUNT)
        .operation::<GetProperty, _, _>(orpc_handler(move |_cid: Cid, name: NdrWString| async move {
            match name.as_str() {
                "Enabled" => Ok(PropertyValue { enabled, ret: 0 }),
                other => Err(HandlerError::new(
                    DISP_E_UNKNOWNNAME as i32,
                    format!("no property {}", other),
                )),
            }
        }))
        .build()
}

fn local_server() -> DcomServer {
    DcomServer::with_addr(SocketAddr::from(([127, 0, 0, 1], 0)))
}

async fn start_with(enabled: &[i32]) -> (TestServer, Vec<Ipid>) {
    init_logging();
    let server = local_server();
    let ipids = enabled.iter().map(|&e| server.export(properties(e))).collect();
    (start_dcom_server(server).await.unwrap(), ipids)
}

/// Test: GetProperty round trip with causality 42
#[tokio::test]
async fn test_get_property_echoes_causality() {
    let (server, ipids) = start_with(&[1]).await;
    let ipid = ipids[0];

    let client = OrpcClient::connect(server.addr, Default::default())
        .await
        .unwrap();
    let context = client.bind(IPROPERTIES_SYNTAX).await.unwrap();

    let value: PropertyValue = client
        .call_with_causality::<GetProperty, _, _>(
            &context,
            Cid::from_u128(42),
            Some(ipid),
            NdrWString::new("Enabled"),
        )
        .await
        .unwrap();
    assert_eq!(value, PropertyValue { enabled: 1, ret: 0 });

    // the same call, inspecting the raw response envelope
    let request = OrpcCall::new(
        OrpcThis::with_causality(Cid::from_u128(42)),
        NdrWString::new("Enabled"),
    );
    let reply = client
        .rpc()
        .invoke::<GetProperty>(&context, Some(ipid.0), &request)
        .await
        .unwrap();
    assert_eq!(reply.causality().unwrap(), Some(Cid::from_u128(42)));
    assert_eq!(reply.args.enabled, 1);
    assert_eq!(reply.result_code(), 0);
}

/// Test: a failing method still echoes causality and maps to an HRESULT
#[tokio::test]
async fn test_method_failure_is_hresult() {
    let (server, ipids) = start_with(&[1]).await;
    let client = OrpcClient::connect(server.addr, Default::default())
        .await
        .unwrap();
    let context = client.bind(IPROPERTIES_SYNTAX).await.unwrap();

    let err = client
        .call::<GetProperty, _, PropertyValue>(&context, Some(ipids[0]), NdrWString::new("Visible"))
        .await
        .unwrap_err();
    match err {
        DcomError::Hresult { code, .. } => assert_eq!(code as u32, DISP_E_UNKNOWNNAME),
        other => panic!("unexpected {:?}", other),
    }

    let request = OrpcCall::new(
        OrpcThis::with_causality(Cid::from_u128(7)),
        NdrWString::new("Visible"),
    );
    let reply = client
        .rpc()
        .invoke::<GetProperty>(&context, Some(ipids[0].0), &request)
        .await
        .unwrap();
    assert_eq!(reply.causality().unwrap(), Some(Cid::from_u128(7)));
    assert_eq!(reply.result_code() as u32, DISP_E_UNKNOWNNAME);
}

/// Test: inherited opnums resolve through IDispatch and IUnknown
#[tokio::test]
async fn test_inherited_ranges() {
    let (server, ipids) = start_with(&[1]).await;
    let client = OrpcClient::connect(server.addr, Default::default())
        .await
        .unwrap();
    let context = client.bind(IPROPERTIES_SYNTAX).await.unwrap();

    let count: TypeInfoCount = client
        .call::<GetTypeInfoCount, _, _>(&context, Some(ipids[0]), NoArgs)
        .await
        .unwrap();
    assert_eq!(count.count, 0);

    // QueryInterface (0) and Invoke (6) never travel on the object
    for opnum in [0u16, 6] {
        let err = client
            .rpc()
            .call(&context, opnum, Some(ipids[0].0), Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Fault(status) if status == FaultStatus::OpRngError as u32));
    }
}

/// Test: the IPID selects between objects sharing one connection
#[tokio::test]
async fn test_objects_addressed_by_ipid() {
    let (server, ipids) = start_with(&[1, 0]).await;
    let client = OrpcClient::connect(server.addr, Default::default())
        .await
        .unwrap();
    let context = client.bind(IPROPERTIES_SYNTAX).await.unwrap();

    let mut seen = Vec::new();
    for ipid in &ipids {
        let value: PropertyValue = client
            .call::<GetProperty, _, _>(&context, Some(*ipid), NdrWString::new("Enabled"))
            .await
            .unwrap();
        seen.push(value.enabled);
    }
    assert_eq!(seen, vec![1, 0]);
}

/// Test: a call without an IPID fails before anything is sent
#[tokio::test]
async fn test_missing_ipid_not_sent() {
    init_logging();
    let server = local_server();
    server.export(properties(1));
    let stats = Arc::clone(server.rpc_server().stats());
    let server = start_dcom_server(server).await.unwrap();

    let client = OrpcClient::connect(server.addr, Default::default())
        .await
        .unwrap();
    let context = client.bind(IPROPERTIES_SYNTAX).await.unwrap();
    let before = stats.snapshot().requests_received;

    for ipid in [None, Some(Ipid::nil())] {
        let err = client
            .call::<GetProperty, _, PropertyValue>(&context, ipid, NdrWString::new("Enabled"))
            .await
            .unwrap_err();
        assert!(matches!(err, DcomError::MissingObjectAddress));
    }
    assert_eq!(stats.snapshot().requests_received, before);
}

/// Test: calls to an IPID nobody exported fault with RPC_E_INVALID_OBJECT
#[tokio::test]
async fn test_unknown_ipid_faults() {
    let (server, _ipids) = start_with(&[1]).await;
    let client = OrpcClient::connect(server.addr, Default::default())
        .await
        .unwrap();
    let context = client.bind(IPROPERTIES_SYNTAX).await.unwrap();

    let err = client
        .call::<GetProperty, _, PropertyValue>(
            &context,
            Some(Ipid::generate()),
            NdrWString::new("Enabled"),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DcomError::Rpc(RpcError::Fault(status)) if status == hresult::RPC_E_INVALID_OBJECT
    ));
    assert!(!err.is_fatal());
}
