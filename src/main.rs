use std::time::{Instant, SystemTime};

use below_import::{
    cli::{Cli, Commands},
    config::ENV_LOG,
};
use clap::Parser;
use tracing::info;

fn main() {
    init_logging();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("\nError: {e:#}\n");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = std::env::var(ENV_LOG)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .with_env_filter(filter)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Import(args) => {
            let start = Instant::now();
            let report = args.run(SystemTime::now())?;
            info!(
                elapsed = ?start.elapsed(),
                samples = report.samples,
                records = report.records,
                warnings = report.warnings,
                "done"
            );
            println!("=========================");
            println!("Imported metrics under prefix '{}'", report.prefix);
            println!("=========================");
            Ok(())
        }
    }
}
