//! Command-line interface.

mod generate;
mod serve;
mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use macrodesk::config::Config;

#[derive(Parser, Debug)]
#[command(name = "macrodesk", version, about = "Economic dashboard server and client")]
pub(crate) struct Cli {
    /// Config file (default: ~/.macrodesk/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Run the dashboard API server
    Serve {
        /// Bind address (IP)
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
        /// Directory with the dashboard frontend
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
    /// Keep local insight state in sync with a dashboard server
    Sync {
        /// Dashboard server URL
        #[arg(long)]
        server: Option<String>,
        /// Run one round and exit
        #[arg(long)]
        once: bool,
    },
    /// Generate one section (or `podcast`) directly and print it as JSON
    Generate {
        /// Section key, e.g. us_economy
        section: String,
    },
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("macrodesk=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_with_path(path),
        None => Config::load(),
    }
    .with_context(|| "Failed to load configuration")?;
    config.validate().with_context(|| "Invalid configuration")?;
    Ok(config)
}

/// Parse arguments and dispatch.
pub(crate) async fn run() -> Result<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Serve {
            bind,
            port,
            static_dir,
        } => serve::cmd_serve(config, bind, port, static_dir).await,
        Commands::Sync { server, once } => sync::cmd_sync(config, server, once).await,
        Commands::Generate { section } => generate::cmd_generate(config, &section).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_flags() {
        let cli = Cli::try_parse_from(["macrodesk", "serve", "--port", "8080", "--static-dir", "public"])
            .unwrap();
        match cli.command {
            Commands::Serve {
                bind,
                port,
                static_dir,
            } => {
                assert!(bind.is_none());
                assert_eq!(port, Some(8080));
                assert_eq!(static_dir, Some(PathBuf::from("public")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "macrodesk",
            "sync",
            "--once",
            "--log-format",
            "json",
            "--config",
            "/tmp/c.json",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
        assert!(matches!(cli.command, Commands::Sync { once: true, .. }));
    }

    #[test]
    fn test_generate_requires_section() {
        assert!(Cli::try_parse_from(["macrodesk", "generate"]).is_err());
    }
}
