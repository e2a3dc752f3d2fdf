//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Pronto: on-demand component compiler and streaming page renderer
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path, searched upward from the current directory
    #[arg(short = 'C', long, global = true, default_value = "pronto.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Print cache hits, builds and request routing
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve views over HTTP, compiling on first request
    #[command(visible_alias = "s")]
    Serve {
        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long)]
        interface: Option<std::net::IpAddr>,

        /// Port number to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Keep a build session running and rebuild on change
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        watch: Option<bool>,
    },

    /// Compile every view once and report diagnostics
    #[command(visible_alias = "b")]
    Build,

    /// Render one view to stdout
    #[command(visible_alias = "r")]
    Render {
        #[command(flatten)]
        args: RenderArgs,
    },
}

/// Render command arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct RenderArgs {
    /// View name relative to `build.views` (`blog/post`), or a path to a view file
    #[arg(value_name = "VIEW")]
    pub view: String,

    /// Request state as a JSON object
    #[arg(short, long, value_name = "JSON")]
    pub state: Option<String>,

    /// Request URL exposed to the component as `$url`
    #[arg(short, long, default_value = "/")]
    pub url: String,

    /// Body only, without the document scaffold
    #[arg(long)]
    pub plain: bool,

    /// Inline the compiled stylesheet into the page
    #[arg(long)]
    pub inline_css: bool,
}
