//! Command-line flags for the gateway's single "serve" mode.
//!
//! Grounded on the teacher's `clap`-derive `Cli` struct, trimmed down from
//! its multi-subcommand agent CLI to the flat set of overrides a
//! long-running server process needs.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "mcp-router", version, about = "Routing gateway for the Model Context Protocol")]
pub struct Cli {
    /// Path to the server catalog JSON file.
    #[arg(long, env = "MCP_SERVERS_CONFIG", default_value = "configs/mcp-servers.json")]
    pub servers_config: PathBuf,

    /// Path to the enhancement rules JSON file.
    #[arg(long, env = "MCP_ENHANCEMENT_CONFIG", default_value = "configs/enhancement-rules.json")]
    pub enhancement_config: PathBuf,

    /// Override the bind address (host:port); defaults to env-derived settings.
    #[arg(long, env = "MCP_BIND")]
    pub bind: Option<String>,

    /// Override the tracing log level (e.g. "debug", "mcp_router=trace").
    #[arg(long, env = "MCP_LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
