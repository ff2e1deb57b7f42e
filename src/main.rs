use clap::{Parser, Subcommand};
use mcp_tool_server::Result;
use mcp_tool_server::commands::{listen, load_config, serve_stdio, show_config, show_config_path};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mcp-tool-server")]
#[command(about = "A JSON-RPC tool server speaking the Model Context Protocol")]
#[command(version)]
struct Cli {
    /// Path to the configuration file (defaults to ~/.mcp-tool-server/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server on stdio
    Serve,
    /// Accept WebSocket connections, one session per connection
    Listen {
        /// Address to bind, e.g. 127.0.0.1:8765
        addr: SocketAddr,
    },
    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve => {
            serve_stdio(load_config(config_path)?).await?;
        }
        Commands::Listen { addr } => {
            listen(load_config(config_path)?, addr).await?;
        }
        Commands::Config { show } => {
            if show {
                show_config(&load_config(config_path)?, config_path)?;
            } else {
                show_config_path(config_path)?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn serve_command() {
        let cli = Cli::try_parse_from(["mcp-tool-server", "serve"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Serve));
            assert!(!parsed.verbose);
            assert_eq!(parsed.config, None);
        }
    }

    #[test]
    fn listen_command_with_address() {
        let cli = Cli::try_parse_from(["mcp-tool-server", "listen", "127.0.0.1:8765"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Listen { addr } = parsed.command {
                assert_eq!(addr.port(), 8765);
            } else {
                panic!("expected listen command");
            }
        }
    }

    #[test]
    fn listen_rejects_bad_address() {
        let cli = Cli::try_parse_from(["mcp-tool-server", "listen", "not-an-address"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "mcp-tool-server",
            "serve",
            "--verbose",
            "--config",
            "/tmp/custom.toml",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(parsed.verbose);
            assert_eq!(parsed.config, Some(PathBuf::from("/tmp/custom.toml")));
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["mcp-tool-server", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["mcp-tool-server", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["mcp-tool-server", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
