//! Command-line client for a running echobus service.
//!
//! Arguments to `call` are parsed as JSON; anything that is not valid JSON
//! is sent as a plain string, so `echobus-client call s hello` and
//! `echobus-client call i 42` both do what they look like.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use echobus::BusClient;
use serde_json::Value;
use std::net::SocketAddr;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "echobus-client")]
#[command(about = "Call methods on an echobus service")]
struct Args {
    /// Host the service endpoint is bound to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port of the service endpoint
    #[arg(short, long)]
    port: u16,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Call a method with JSON arguments
    Call {
        method: String,
        args: Vec<String>,
    },
    /// Read a property
    Get { property: String },
    /// Write a property
    Set { property: String, value: String },
    /// Print the service's registered surface
    Introspect,
    /// Subscribe and print signals until interrupted
    Watch,
}

/// Parse an argument as JSON, falling back to a plain string.
fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("invalid host/port")?;
    let client = BusClient::connect(addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    match args.command {
        Command::Call { method, args } => {
            let call_args = args.iter().map(|a| parse_arg(a)).collect();
            let result = client.call(&method, call_args).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Get { property } => {
            let value = client.get_property(&property).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Set { property, value } => {
            client.set_property(&property, parse_arg(&value)).await?;
            println!("ok");
        }
        Command::Introspect => {
            let description = client.introspect().await?;
            println!("{}", serde_json::to_string_pretty(&description)?);
        }
        Command::Watch => {
            client.subscribe().await?;
            eprintln!("watching signals on {} (Ctrl-C to stop)", addr);
            while let Some(signal) = client.next_signal().await? {
                println!(
                    "{} {}",
                    signal.name,
                    serde_json::to_string(&signal.payload)?
                );
            }
        }
    }

    Ok(())
}
