use aisummary::cli::commands;
use aisummary::cli::{Cli, Commands};
use aisummary::config;
use aisummary::logging::init_logging;
use aisummary::{StructuredError, SummaryError};
use clap::Parser;
use std::io::{self, IsTerminal};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.quiet, cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let overrides = build_cli_overrides(&cli);

    let result = match &cli.command {
        Commands::Summarize(args) => commands::summarize::execute(args, cli.json, &overrides),
        Commands::Poll(args) => commands::poll::execute(args, cli.json, &overrides),
        Commands::Refresh(args) => commands::refresh::execute(args, cli.json, &overrides),
        Commands::Invalidate(args) => commands::invalidate::execute(args, cli.json, &overrides),
        Commands::Enqueue(args) => commands::enqueue::execute(args, cli.json, &overrides),
        Commands::Stats => commands::stats::execute(cli.json, &overrides),
        Commands::Estimate(args) => commands::estimate::execute(args, cli.json, &overrides),
        Commands::Rollup(args) => commands::rollup::execute(args, cli.json, &overrides),
        Commands::Config(args) => commands::config::execute(args, cli.json, &overrides),
    };

    if let Err(e) = result {
        handle_error(&e, cli.json);
    }
}

/// Handle errors with structured output support.
///
/// When --json is set or stdout is not a TTY, outputs structured JSON to stderr.
fn handle_error(err: &SummaryError, json_mode: bool) -> ! {
    let structured = StructuredError::from_error(err);
    let exit_code = structured.code.exit_code();

    if json_mode || !io::stdout().is_terminal() {
        let json = structured.to_json();
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string())
        );
    } else {
        let use_color = io::stderr().is_terminal();
        eprintln!("{}", structured.to_human(use_color));
    }

    std::process::exit(exit_code);
}

fn build_cli_overrides(cli: &Cli) -> config::CliOverrides {
    config::CliOverrides {
        db: cli.db.clone(),
        issues: cli.issues.clone(),
        config: cli.config.clone(),
        json: Some(cli.json),
        lock_timeout: cli.lock_timeout,
        max_depth: None,
    }
}
