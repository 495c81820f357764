//! Echobus server - publishes the typed echo object and serves it until
//! told to stop.
//!
//! The bound port is printed as `BUS_PORT={port}` on stdout so the test
//! harness driving this double can find the endpoint. The service runs
//! until `Quit()` arrives over the bus or the process receives Ctrl-C;
//! both paths go through the same shutdown token.

use anyhow::Result;
use clap::Parser;
use echobus::{echo_object, Service, ServiceConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "echobus-server")]
#[command(about = "Typed echo test-double service")]
struct Args {
    /// Well-known service name to publish under
    #[arg(long, default_value = "org.echobus.EchoServer")]
    service_name: String,

    /// Object path of the exposed object
    #[arg(long, default_value = "/org/echobus/EchoServer")]
    object_path: String,

    /// Interface name of the exposed object
    #[arg(long, default_value = "org.echobus.EchoServer")]
    interface_name: String,

    /// Host to bind the bus endpoint to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting echobus server");

    let config = ServiceConfig::new(args.service_name, args.object_path, args.interface_name)?;
    let mut service = Service::new(config, echo_object()?);

    let addr = service.start(&args.host, args.port).await?;

    // Print the port for the driving harness to read (intentional stdout)
    println!("BUS_PORT={}", addr.port());

    info!("echo service running on {}", addr);

    // Treat Ctrl-C exactly like a Quit() call
    let shutdown = service.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.request();
        }
    });

    service.run().await?;
    info!("echo service stopped");

    Ok(())
}
