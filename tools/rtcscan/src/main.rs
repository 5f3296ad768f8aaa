//! rtcscan runner entry point
//!
//! Runs loopback WebRTC diagnostics against the local network stack.
//!
//! # Usage
//!
//! ```bash
//! # Run every diagnostic with default settings
//! rtcscan
//!
//! # Relay connectivity only, TURN settings from a file
//! rtcscan --config ./rtcscan.toml --test relay-connectivity
//!
//! # Machine-readable output (JSONL report events on stdout, JSON logs on stderr)
//! RTCSCAN_TURN_URL=https://turn.example.org/turn?key= RTCSCAN_API_KEY=secret \
//!   rtcscan --test udp-enabled --test tcp-enabled --json
//! ```

mod report;

use clap::Parser;
use report::{has_failures, write_summary, ConsoleSink};
use rtcscan_core::config::ScanConfig;
use rtcscan_core::diagnostic::{run_diagnostic, MultiSink, ReportSink, TerminalSink, TracingSink};
use rtcscan_core::ice::IceConfigProvider;
use rtcscan_core::scenarios::{ScenarioContext, ScenarioKind};
use rtcscan_webrtc::{SyntheticMedia, WebRtcPeerFactory};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Loopback WebRTC diagnostics
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "RTCSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Diagnostic to run, repeatable. Runs all when omitted.
    #[arg(short, long = "test", value_name = "NAME", value_parser = parse_scenario)]
    tests: Vec<ScenarioKind>,

    /// Emit report events and logs as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Gather candidates on loopback interfaces too
    #[arg(long, default_value_t = false, env = "RTCSCAN_INCLUDE_LOOPBACK")]
    include_loopback: bool,

    /// Print the available diagnostics and exit
    #[arg(long, default_value_t = false)]
    list: bool,
}

fn parse_scenario(value: &str) -> Result<ScenarioKind, String> {
    value.parse::<ScenarioKind>().map_err(|e| e.to_string())
}

impl Args {
    /// Selected diagnostics in run order
    fn selected(&self) -> Vec<ScenarioKind> {
        if self.tests.is_empty() {
            ScenarioKind::ALL.to_vec()
        } else {
            self.tests.clone()
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    if args.list {
        for kind in ScenarioKind::ALL {
            println!("{}", kind);
        }
        return Ok(ExitCode::SUCCESS);
    }

    init_tracing(args.json);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> anyhow::Result<ExitCode> {
    let config = ScanConfig::load(args.config.as_ref())?;
    let selected = args.selected();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        tests = selected.len(),
        "rtcscan starting"
    );

    let ctx = Arc::new(
        ScenarioContext::new(
            Arc::new(WebRtcPeerFactory::new().with_loopback(args.include_loopback)),
            IceConfigProvider::from_settings(config.ice.clone()),
            config,
        )
        .with_media(Arc::new(SyntheticMedia::new())),
    );

    let console: Arc<dyn ReportSink> = if args.json {
        Arc::new(TerminalSink::stdout())
    } else {
        Arc::new(ConsoleSink::new(std::io::stdout()))
    };
    let sink: Arc<dyn ReportSink> = Arc::new(
        MultiSink::new()
            .with_sink(Arc::new(TracingSink))
            .with_sink(console),
    );

    let mut outcomes = Vec::with_capacity(selected.len());
    for kind in selected {
        let diagnostic = kind.build(Arc::clone(&ctx));
        outcomes.push(run_diagnostic(diagnostic.as_ref(), Arc::clone(&sink)).await);
    }

    if !args.json {
        write_summary(std::io::stdout(), &outcomes)?;
    }

    if has_failures(&outcomes) {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn init_tracing(json: bool) {
    // Initialize tracing with EnvFilter for RUST_LOG support
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
