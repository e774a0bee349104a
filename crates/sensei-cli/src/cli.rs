use clap::{Parser, Subcommand, ValueEnum};

/// Output format for CLI commands
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

#[derive(Parser)]
#[command(name = "sensei")]
#[command(version, about = "Sake-Sensei memory maintenance tools")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Deployment region of the memory data plane
    #[arg(long, global = true, env = "AWS_REGION", default_value = "us-west-2")]
    pub region: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Delete all short-term events and long-term records from the store
    Purge {
        /// Memory store identifier
        #[arg(long, env = "SAKE_AGENT_MEMORY_ID", hide_env_values = true)]
        memory_id: String,
    },

    /// Resolve a user's stored preferences for a query
    Preferences {
        /// Memory store identifier
        #[arg(long, env = "SAKE_AGENT_MEMORY_ID", hide_env_values = true)]
        memory_id: String,

        /// Actor whose memory is searched
        #[arg(long, env = "SAKE_AGENT_ACTOR_ID", default_value = "default_user")]
        actor: String,

        /// Session to scope short-term search to (defaults per actor)
        #[arg(long, env = "SAKE_AGENT_SESSION_ID")]
        session: Option<String>,

        /// Search query
        #[arg(long, default_value = "日本酒の好み")]
        query: String,
    },

    /// Fetch live price quotes for a sake
    Price {
        /// Sake name to look up
        #[arg(long)]
        name: String,
    },
}
