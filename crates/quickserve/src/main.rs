//! QuickServe - Entry point

use std::path::PathBuf;

use quickserve::config::{ConfigLoader, QuickServeConfig};
use quickserve::telemetry::init_telemetry;
use quickserve::QuickServe;
use tracing::{error, info};

/// Configuration file read when `--config` is not given.
const DEFAULT_CONFIG: &str = "quickserve.toml";

/// Prefix of environment overrides.
const ENV_PREFIX: &str = "QUICKSERVE";

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
                    println!("quickserve {}", quickserve::VERSION);
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
        r"QuickServe - Declarative REST and WebSocket API server

USAGE:
    quickserve [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
                           Defaults to ./quickserve.toml when present
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    QUICKSERVE_LOG_LEVEL          Log level (trace, debug, info, warn, error)
    QUICKSERVE_LOG_JSON           Emit JSON logs (true/false)
    QUICKSERVE_METRICS_ENABLED    Expose Prometheus metrics (true/false)
    QUICKSERVE_METRICS_ADDR       Metrics listen address
    QUICKSERVE_JWT_SECRET         Shared secret of the jwt strategy

A .env file in the working directory is loaded first.
"
    );
}

fn load_config(args: &Args) -> Result<QuickServeConfig, quickserve::config::ConfigError> {
    let loader = ConfigLoader::new().with_dotenv();
    let loader = match &args.config {
        Some(path) => loader.with_file(path)?,
        None => loader.with_optional_file(DEFAULT_CONFIG)?,
    };
    loader.with_env_prefix(ENV_PREFIX).load()
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_telemetry(&config.telemetry) {
        eprintln!("Failed to initialize telemetry: {e}");
        std::process::exit(1);
    }

    info!("Starting QuickServe v{}", quickserve::VERSION);
    for server in &config.servers {
        info!(
            server = %server.name,
            kind = server.kind.as_str(),
            addr = %server.addr(),
            "Configured server"
        );
    }

    let app = match QuickServe::from_config(config) {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to create servers: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.run().await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
