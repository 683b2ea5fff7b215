//! Dispatch Tests - operation routing over a real TCP connection
//!
//! A derived interface delegates the opnums below its threshold to a base
//! interface. Calls are made by a client bound over loopback TCP and check:
//! - Routing into the base range and the derived range
//! - Fault statuses for unknown opnums and opnums not used on the wire
//! - Handler errors surfacing as result codes
//! - Bind rejection for an unregistered interface
//! - Both transfer syntaxes

mod common;

use std::sync::Arc;

use common::*;
use dcerpc::{
    check_result_code, DceRpcClient, DceRpcClientConfig, FaultStatus, HandlerError,
    InterfaceBuilder, NoErrorLookup, Operation, Registry, ResultCode, RpcError, SyntaxId, Uuid,
};
use midl_ndr::{NdrDecode, NdrEncode, NdrReader, NdrWriter, TransferSyntax};

const E_DIVIDE_BY_ZERO: i32 = 0x8002_0012_u32 as i32;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Operands {
    a: i32,
    b: i32,
}

impl NdrEncode for Operands {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        w.write_data(self.a);
        w.write_data(self.b);
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for Operands {
    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        Ok(Self {
            a: r.read_data()?,
            b: r.read_data()?,
        })
    }

    fn ndr_align() -> usize {
        4
    }
}

/// `[out] hyper *value, [out, retval] long`
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Answer {
    value: i64,
    status: i32,
}

impl NdrEncode for Answer {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        w.write_data(self.value);
        w.write_data(self.status);
        Ok(())
    }

    fn ndr_align() -> usize {
        8
    }
}

impl NdrDecode for Answer {
    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        Ok(Self {
            value: r.read_data()?,
            status: r.read_data()?,
        })
    }

    fn ndr_align() -> usize {
        8
    }
}

impl ResultCode for Answer {
    fn result_code(&self) -> i32 {
        self.status
    }

    fn set_result_code(&mut self, code: i32) {
        self.status = code;
    }
}

macro_rules! calc_op {
    ($name:ident, $opnum:expr) => {
        struct $name;

        impl Operation for $name {
            const OPNUM: u16 = $opnum;
            const NAME: &'static str = stringify!($name);
            type Request = Operands;
            type Response = Answer;
        }
    };
}

calc_op!(Version, 1);
calc_op!(Add, 3);
calc_op!(Divide, 4);
calc_op!(Shutdown, 2);
calc_op!(Missing, 99);

const BASE_SYNTAX: SyntaxId =
    SyntaxId::new(Uuid::from_u128(0x6bffd098_a112_3610_9833_46c3f87e345a), 1, 0);
const CALC_SYNTAX: SyntaxId =
    SyntaxId::new(Uuid::from_u128(0x12345778_1234_abcd_ef00_0123456789ac), 1, 0);

fn registry() -> Registry {
    let base = InterfaceBuilder::new("IBase", BASE_SYNTAX)
        .operation::<Version, _, _>(|_| async {
            Ok::<_, HandlerError>(Answer {
                value: 7,
                status: 0,
            })
        })
        .not_used_on_wire(2, "Shutdown")
        .build();

    let calc = InterfaceBuilder::new("ICalc", CALC_SYNTAX)
        .base(Arc::new(base), 3)
        .operation::<Add, _, _>(|ops: Operands| async move {
            Ok(Answer {
                value: ops.a as i64 + ops.b as i64,
                status: 0,
            })
        })
        .operation::<Divide, _, _>(|ops: Operands| async move {
            if ops.b == 0 {
                return Err(HandlerError::new(E_DIVIDE_BY_ZERO, "division by zero"));
            }
            Ok(Answer {
                value: (ops.a / ops.b) as i64,
                status: 0,
            })
        })
        .build();

    Registry::builder().register(calc).unwrap().build()
}

async fn start() -> TestServer {
    init_logging();
    start_rpc_server(Arc::new(registry())).await.unwrap()
}

/// Test: opnums below the threshold route to the base interface
#[tokio::test]
async fn test_routes_base_and_derived_opnums() {
    let server = start().await;
    let client = connect_client(server.addr).await.unwrap();
    let context = client.bind(CALC_SYNTAX).await.unwrap();

    let version = client
        .invoke::<Version>(&context, None, &Operands::default())
        .await
        .unwrap();
    assert_eq!(version, Answer { value: 7, status: 0 });

    let sum = client
        .invoke::<Add>(&context, None, &Operands { a: i32::MAX, b: 1 })
        .await
        .unwrap();
    assert_eq!(sum.value, i32::MAX as i64 + 1);
}

/// Test: an opnum nobody registered faults with the range error status
#[tokio::test]
async fn test_unknown_opnum_faults() {
    let server = start().await;
    let client = connect_client(server.addr).await.unwrap();
    let context = client.bind(CALC_SYNTAX).await.unwrap();

    let err = client
        .invoke::<Missing>(&context, None, &Operands::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Fault(status) if status == FaultStatus::OpRngError as u32));

    // the connection survives the fault
    let sum = client
        .invoke::<Add>(&context, None, &Operands { a: 2, b: 3 })
        .await
        .unwrap();
    assert_eq!(sum.value, 5);
}

/// Test: a reserved opnum in the base range is refused
#[tokio::test]
async fn test_not_used_on_wire_faults() {
    let server = start().await;
    let client = connect_client(server.addr).await.unwrap();
    let context = client.bind(CALC_SYNTAX).await.unwrap();

    let err = client
        .invoke::<Shutdown>(&context, None, &Operands::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Fault(status) if status == FaultStatus::OpRngError as u32));
}

/// Test: a handler error arrives as the response's result code
#[tokio::test]
async fn test_handler_error_becomes_result_code() {
    let server = start().await;
    let client = connect_client(server.addr).await.unwrap();
    let context = client.bind(CALC_SYNTAX).await.unwrap();

    let reply = client
        .invoke::<Divide>(&context, None, &Operands { a: 1, b: 0 })
        .await
        .unwrap();
    assert_eq!(reply.value, 0);
    assert_eq!(reply.result_code(), E_DIVIDE_BY_ZERO);

    match check_result_code(reply.result_code(), &NoErrorLookup) {
        Err(RpcError::ResultCode { code, message }) => {
            assert_eq!(code, E_DIVIDE_BY_ZERO);
            assert_eq!(message, "unknown error 0x80020012");
        }
        other => panic!("unexpected {:?}", other),
    }
}

/// Test: binding an interface the server does not host fails
#[tokio::test]
async fn test_bind_unknown_interface_fails() {
    let server = start().await;
    let client = connect_client(server.addr).await.unwrap();

    // the base is reachable only through the derived interface
    let err = client.bind(BASE_SYNTAX).await.unwrap_err();
    assert!(matches!(err, RpcError::BindFailed(_)));

    let context = client.bind(CALC_SYNTAX).await.unwrap();
    assert_eq!(context.interface, CALC_SYNTAX);
}

/// Test: the same calls work when NDR64 is negotiated
#[tokio::test]
async fn test_ndr64_client() {
    let server = start().await;
    let config = DceRpcClientConfig {
        transfer_syntaxes: vec![TransferSyntax::Ndr64],
        ..Default::default()
    };
    let client = DceRpcClient::connect(server.addr, config).await.unwrap();
    let context = client.bind(CALC_SYNTAX).await.unwrap();
    assert_eq!(context.transfer_syntax, TransferSyntax::Ndr64);

    let quotient = client
        .invoke::<Divide>(&context, None, &Operands { a: 42, b: -6 })
        .await
        .unwrap();
    assert_eq!(quotient, Answer { value: -7, status: 0 });
}

/// Test: several clients call concurrently
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clients() {
    let server = start().await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let addr = server.addr;
        handles.push(tokio::spawn(async move {
            let client = connect_client(addr).await.unwrap();
            let context = client.bind(CALC_SYNTAX).await.unwrap();
            let mut total = 0;
            for j in 0..10 {
                let reply = client
                    .invoke::<Add>(&context, None, &Operands { a: i, b: j })
                    .await
                    .unwrap();
                total += reply.value;
            }
            (i, total)
        }));
    }

    for handle in handles {
        let (i, total) = handle.await.unwrap();
        assert_eq!(total, 10 * i as i64 + 45);
    }
}
