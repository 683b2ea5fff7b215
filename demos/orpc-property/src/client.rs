//! ORPC Property Client
//!
//! Reads properties from an IProperties object exported by
//! `property-server`.
//!
//! USAGE:
//!   property-client --ipid <IPID> [OPTIONS] [NAME]...
//!
//! EXAMPLES:
//!   property-client --ipid 1b4e28ba-2fa1-41d2-883f-0016d3cca427
//!   property-client --ipid <IPID> Enabled Level
//!   property-client --ipid <IPID> --causality 2a Enabled

mod common;

use clap::Parser;
use common::*;
use dcerpc::{DceRpcClientConfig, Uuid};
use dcom::{Cid, DcomError, Ipid, OrpcClient};
use midl_ndr::{NdrWString, TransferSyntax};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "property-client")]
#[command(version)]
#[command(about = "ORPC property client - reads properties from a remote object")]
struct Args {
    /// Host address to connect to
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port number to connect to
    #[arg(long, default_value_t = DEFAULT_RPC_PORT)]
    port: u16,

    /// IPID of the object, as printed by the server
    #[arg(long)]
    ipid: Uuid,

    /// Causality id to send, in hex; a random one per call by default
    #[arg(long, value_parser = parse_hex)]
    causality: Option<u128>,

    /// Offer NDR64 instead of NDR 2.0
    #[arg(long)]
    ndr64: bool,

    /// Call timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Properties to read
    #[arg(value_name = "NAME", default_values_t = vec!["Enabled".to_string()])]
    names: Vec<String>,
}

fn parse_hex(s: &str) -> Result<u128, String> {
    u128::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("warn");

    let args = Args::parse();
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    let config = DceRpcClientConfig {
        call_timeout: Duration::from_secs(args.timeout),
        transfer_syntaxes: if args.ndr64 {
            vec![TransferSyntax::Ndr64]
        } else {
            vec![TransferSyntax::Ndr20]
        },
        ..Default::default()
    };

    let client = OrpcClient::connect(addr, config).await?;
    let context = client.bind(IPROPERTIES_SYNTAX).await?;
    debug!(?context, "bound IProperties");

    let ipid = Some(Ipid::new(args.ipid));
    let mut failed = false;
    for name in &args.names {
        let cid = args.causality.map_or_else(Cid::generate, Cid::from_u128);
        let result = client
            .call_with_causality::<GetProperty, _, PropertyValue>(
                &context,
                cid,
                ipid,
                NdrWString::new(name.as_str()),
            )
            .await;
        match result {
            Ok(reply) => println!("{} = {}", name, reply.value),
            Err(DcomError::Hresult { code, message }) => {
                failed = true;
                eprintln!("{}: 0x{:08x} {}", name, code as u32, message);
            }
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                failed = true;
                eprintln!("{}: {}", name, e);
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
