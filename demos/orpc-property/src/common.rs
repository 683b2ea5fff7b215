//! Definitions shared between the property client and server

#![allow(dead_code)]

use dcerpc::{Operation, ResultCode, SyntaxId, Uuid};
use dcom::{OrpcCall, OrpcReturn};
use midl_ndr::{NdrDecode, NdrEncode, NdrReader, NdrWString, NdrWriter};

// =============================================================================
// IProperties
// =============================================================================

/// IID of IProperties
pub const IPROPERTIES_IID: Uuid = Uuid::from_u128(0x4e1a2b7c_93d0_4c55_8e1f_6a0b3c9d2e71);

pub const IPROPERTIES_SYNTAX: SyntaxId = SyntaxId::new(IPROPERTIES_IID, 0, 0);

/// IProperties derives from IDispatch, which owns opnums 0..7
pub const IDISPATCH_OPNUM_COUNT: u16 = 7;

/// `DISP_E_UNKNOWNNAME`
pub const DISP_E_UNKNOWNNAME: u32 = 0x8002_0006;

/// `[out] long *Value` followed by the HRESULT
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PropertyValue {
    pub value: i32,
    pub hr: i32,
}

impl NdrEncode for PropertyValue {
    fn ndr_encode(&self, w: &mut NdrWriter) -> midl_ndr::Result<()> {
        w.write_data(self.value);
        w.write_data(self.hr);
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for PropertyValue {
    fn ndr_decode(r: &mut NdrReader) -> midl_ndr::Result<Self> {
        Ok(Self {
            value: r.read_data()?,
            hr: r.read_data()?,
        })
    }

    fn ndr_align() -> usize {
        4
    }
}

impl ResultCode for PropertyValue {
    fn result_code(&self) -> i32 {
        self.hr
    }

    fn set_result_code(&mut self, code: i32) {
        self.hr = code;
    }
}

/// `HRESULT GetProperty([in, string] wchar_t *Name, [out] long *Value)`
pub struct GetProperty;

impl Operation for GetProperty {
    const OPNUM: u16 = 7;
    const NAME: &'static str = "GetProperty";
    type Request = OrpcCall<NdrWString>;
    type Response = OrpcReturn<PropertyValue>;
}

// =============================================================================
// Shared Constants
// =============================================================================

/// Default server address
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default RPC port
pub const DEFAULT_RPC_PORT: u16 = 12360;

/// Install the log subscriber; `RUST_LOG` overrides `default_level`
pub fn init_logging(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
