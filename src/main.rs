mod api;
mod client;
mod commands;
mod config;
mod domain;
mod server;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "osd-registry", version, about = "Ceph cluster and OSD registry with a NetBox-compatible API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the registry server (REST + UI views + GraphQL)
    Serve {
        /// HTTP listen address (overrides config)
        #[arg(long)]
        http_addr: Option<String>,

        /// Log level (overrides config)
        #[arg(long)]
        log_level: Option<String>,

        /// Snapshot file to persist the registry to (overrides config)
        #[arg(long)]
        data_file: Option<PathBuf>,

        /// Path to config file (default: ~/.config/osd-registry/config.yaml)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Bulk-create OSDs from a YAML file (uses NETBOX_URL and NETBOX_TOKEN)
    Import {
        /// YAML document with `cluster` and `osds`
        file: PathBuf,
    },

    /// Query a registry's REST API
    Query {
        /// API base URL (defaults to NETBOX_URL, then http://localhost:8000)
        #[arg(long, global = true)]
        url: Option<String>,

        /// Output format (table or json)
        #[arg(long, global = true, default_value = "table")]
        format: String,

        #[command(subcommand)]
        command: commands::query::QueryCommands,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            http_addr,
            log_level,
            data_file,
            config,
        } => commands::serve::run(http_addr, log_level, data_file, config),
        Commands::Import { file } => commands::import::run(&file),
        Commands::Query {
            url,
            format,
            command,
        } => commands::query::run(url.as_deref(), &format, &command),
    }
}
