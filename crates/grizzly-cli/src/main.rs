//! `grizzly-cli` – Grizzly Motion Safety node
//!
//! This binary is the entry point for the safety supervisor.  It:
//!
//! 1. Initialises logging (and OTLP export when configured).
//! 2. Loads `~/.grizzly/motion_safety.toml` (or `$GRIZZLY_CONFIG`), applies
//!    `GRIZZLY_*` overrides, and validates the result.
//! 3. Runs the motion safety node on an in-process event bus until **Ctrl-C**.
//!
//! `--print-config` prints the effective configuration as TOML and exits.

mod config;

use colored::Colorize;
use tracing::{error, info};

use grizzly_middleware::EventBus;
use grizzly_runtime::{MotionSafetyNode, init_tracing};
use grizzly_types::MotionError;

#[tokio::main]
async fn main() {
    let _guard = init_tracing("grizzly-motion-safety");

    if let Err(e) = run().await {
        error!(error = %e, "motion safety node failed");
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), MotionError> {
    let cfg = config::load()?;

    if std::env::args().skip(1).any(|arg| arg == "--print-config") {
        print!("{}", config::render(&cfg)?);
        return Ok(());
    }

    print_banner();
    info!(path = %config::config_path().display(), ?cfg, "configuration loaded");

    let bus = EventBus::default();
    let node = MotionSafetyNode::new(&cfg, bus)?;
    node.run(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
        }
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping motion safety node …".yellow().bold());
    })
    .await
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("  {} {}",
        "Grizzly Motion Safety".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Drive-by-wire safety supervisor");
    println!();
}
