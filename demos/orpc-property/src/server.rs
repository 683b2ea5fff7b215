//! ORPC Property Server
//!
//! Hosts IProperties objects and prints the IPID each one is exported
//! under. Clients address an object by passing that IPID.
//!
//! USAGE:
//!   property-server [OPTIONS] [NAME=VALUE]...
//!
//! EXAMPLES:
//!   property-server                          # One object with Enabled=1
//!   property-server Enabled=0 Level=3        # Custom properties
//!   property-server --objects 2 --port 9000  # Two objects on port 9000

mod common;

use clap::Parser;
use common::*;
use dcerpc::{HandlerError, InterfaceBuilder, InterfaceDispatcher, SyntaxId};
use dcom::{
    iid, iunknown, orpc_handler, Cid, DcomServer, DcomServerConfig, IUNKNOWN_OPNUM_COUNT,
};
use midl_ndr::NdrWString;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "property-server")]
#[command(version)]
#[command(about = "ORPC property server - exports IProperties objects")]
struct Args {
    /// Host address to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port number to listen on
    #[arg(long, default_value_t = DEFAULT_RPC_PORT)]
    port: u16,

    /// Maximum concurrent connections
    #[arg(long, default_value_t = 64)]
    max_connections: usize,

    /// Number of objects to export
    #[arg(long, default_value_t = 1)]
    objects: usize,

    /// Properties served by every object
    #[arg(value_name = "NAME=VALUE", value_parser = parse_property)]
    properties: Vec<(String, i32)>,
}

fn parse_property(s: &str) -> Result<(String, i32), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {:?}", s))?;
    let value = value
        .parse()
        .map_err(|e| format!("bad value for {}: {}", name, e))?;
    Ok((name.to_string(), value))
}

/// IDispatch methods are not served by these objects
fn idispatch() -> InterfaceDispatcher {
    InterfaceBuilder::new("IDispatch", SyntaxId::new(iid::IDISPATCH, 0, 0))
        .base(Arc::new(iunknown()), IUNKNOWN_OPNUM_COUNT)
        .not_used_on_wire(3, "GetTypeInfoCount")
        .not_used_on_wire(4, "GetTypeInfo")
        .not_used_on_wire(5, "GetIDsOfNames")
        .not_used_on_wire(6, "Invoke")
        .build()
}

fn properties_object(properties: Arc<HashMap<String, i32>>) -> InterfaceDispatcher {
    InterfaceBuilder::new("IProperties", IPROPERTIES_SYNTAX)
        .base(Arc::new(idispatch()), IDISPATCH_OPNUM_COUNT)
        .operation::<GetProperty, _, _>(orpc_handler(move |cid: Cid, name: NdrWString| {
            let properties = Arc::clone(&properties);
            async move {
                debug!(causality = %cid, name = name.as_str(), "GetProperty");
                match properties.get(name.as_str()) {
                    Some(&value) => {
                        info!("GetProperty({}) = {}", name.as_str(), value);
                        Ok(PropertyValue { value, hr: 0 })
                    }
                    None => Err(HandlerError::new(
                        DISP_E_UNKNOWNNAME as i32,
                        format!("unknown property {}", name.as_str()),
                    )),
                }
            }
        }))
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("info");

    let args = Args::parse();
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    let mut properties: HashMap<String, i32> = args.properties.into_iter().collect();
    if properties.is_empty() {
        properties.insert("Enabled".to_string(), 1);
    }
    let properties = Arc::new(properties);

    let mut config = DcomServerConfig::new(addr);
    config.rpc.max_connections = args.max_connections;
    let server = DcomServer::new(config);

    println!("========================================================");
    println!("         ORPC Property Server");
    println!("========================================================");
    println!("  Protocol:  DCE RPC / TCP (ORPC)");
    println!("  IID:       {}", IPROPERTIES_IID);
    println!("  Listening: {}", addr);
    println!("  Properties:");
    let mut names: Vec<_> = properties.iter().collect();
    names.sort();
    for (name, value) in names {
        println!("    {} = {}", name, value);
    }
    println!("  Objects:");
    for _ in 0..args.objects.max(1) {
        let ipid = server.export(properties_object(Arc::clone(&properties)));
        println!("    {}", ipid);
    }
    println!("========================================================");
    println!("  Press Ctrl+C to stop");
    println!("========================================================");
    println!();

    info!("Starting property server on {}", addr);
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
