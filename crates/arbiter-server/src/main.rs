//! Arbiter policy decision point - entry point.

use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use arbiter_server::{PdpConfig, PdpServer};

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("arbiter-pdp {}", arbiter_server::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"Arbiter - HTTP policy decision point

USAGE:
    arbiter-pdp [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    ARBITER_LISTEN_ADDR             Listen address (default: 0.0.0.0)
    ARBITER_LISTEN_PORT             Listen port (default: 9292)
    ARBITER_AUTH_MODE               authenticated | unauthenticated
    ARBITER_IDENTITY_URL            Keystone base URL
    ARBITER_IDENTITY_SERVICE_TOKEN  Token presented to Keystone
    ARBITER_POLICY_FILE             Policy rule file (TOML or JSON)
    ARBITER_PUBLIC_BASE_URL         Base URL for version discovery links
    ARBITER_LOG_LEVEL               Log filter (default: info)

EXAMPLES:
    # Run with configuration file
    arbiter-pdp --config /etc/arbiter/pdp.toml

    # Run with environment variables
    ARBITER_POLICY_FILE=/etc/arbiter/policy.json arbiter-pdp
"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PdpConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => PdpConfig::default(),
    }
    .with_env_overrides();

    config.validate().context("invalid configuration")?;

    arbiter_telemetry::init_telemetry(&config.telemetry_config())
        .context("failed to initialize telemetry")?;

    info!(
        version = arbiter_server::VERSION,
        config = ?args.config,
        listen = %format!("{}:{}", config.server.listen_addr, config.server.listen_port),
        auth_mode = %config.auth.mode,
        "starting Arbiter policy decision point"
    );

    let server = PdpServer::new(config).context("failed to create server")?;
    server.run().await.context("server error")?;

    Ok(())
}
