//! Pronto command-line entry point.

use anyhow::{Context, Result};
use clap::{ColorChoice, Parser};
use pronto::cli::{self, Cli, Commands};
use pronto::config::ProntoConfig;

fn main() -> Result<()> {
    // Before any blocking work, so Ctrl+C during startup still exits
    cli::serve::setup_shutdown_handler()?;

    let cli = Cli::parse();

    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    pronto::logger::set_verbose(cli.verbose);

    let config = ProntoConfig::load(&cli)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("pronto-worker")
        .build()
        .context("failed to start async runtime")?;

    match &cli.command {
        Commands::Serve { .. } => cli::serve::serve(&config, &runtime),
        Commands::Build => cli::build::build_views(&config, &runtime),
        Commands::Render { args } => cli::render::render_view(&config, &runtime, args),
    }
}
