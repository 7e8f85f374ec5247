//! Script host - command-line front end
//!
//! Runs every script given on the command line concurrently, each in its
//! own WebAssembly runtime, and prints one notice per script plus a
//! summary line.
//!
//! # Usage
//!
//! ```bash
//! host a.wat b.wat
//! host a.wat --debug --debug-port 9229
//! host a.wat b.wat --debug --suspend
//! RUST_LOG=scripthost_core=debug host a.wat
//! ```

use anyhow::Result;
use clap::Parser;

use scripthost_core::debug::{DEFAULT_DEBUG_HOST, DEFAULT_DEBUG_PORT};
use scripthost_core::{
    DEFAULT_MEMORY_LIMIT, DEFAULT_STACK_QUOTA, DebugConfig, Host, HostConfig, InspectorService,
    RuntimeLimits, WasmEngine,
};

const USAGE: &str = "usage: host <script-path> [script-path ...]";

#[derive(Parser)]
#[command(name = "host")]
#[command(author, version, about = "Run scripts concurrently in isolated runtimes")]
struct Args {
    /// Script files (WebAssembly text format)
    paths: Vec<String>,

    /// Attach every script to a shared debug session
    #[arg(long, short = 'd')]
    debug: bool,

    /// Address the debug inspector binds to
    #[arg(long, default_value = DEFAULT_DEBUG_HOST)]
    debug_host: String,

    /// Port the debug inspector listens on (0 = any free port)
    #[arg(long, default_value_t = DEFAULT_DEBUG_PORT)]
    debug_port: u16,

    /// Hold each script before evaluation until a debug client resumes it
    #[arg(long, requires = "debug")]
    suspend: bool,

    /// Per-script memory limit in bytes
    #[arg(long, default_value_t = DEFAULT_MEMORY_LIMIT)]
    memory_limit: usize,

    /// Per-script stack quota in bytes
    #[arg(long, default_value_t = DEFAULT_STACK_QUOTA)]
    stack_quota: usize,
}

impl Args {
    fn host_config(&self) -> HostConfig {
        let config = HostConfig::default().with_limits(RuntimeLimits {
            memory_limit: self.memory_limit,
            stack_quota: self.stack_quota,
        });
        if !self.debug {
            return config;
        }
        config.with_debug(DebugConfig {
            bind_host: self.debug_host.clone(),
            port: self.debug_port,
            suspended: self.suspend,
        })
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.paths.is_empty() {
        println!("{}", USAGE);
        return Ok(());
    }

    // Logs go to stderr; stdout carries script output and notices
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = args.host_config();
    let engine = WasmEngine::new()?.with_debug_info(args.debug);

    let report = if args.debug {
        Host::with_debug_service(config, engine, InspectorService::new()).run(&args.paths)
    } else {
        Host::new(config, engine).run(&args.paths)
    };

    tracing::debug!(
        completed = report.completed(),
        failed = report.failed(),
        "host finished"
    );
    Ok(())
}
