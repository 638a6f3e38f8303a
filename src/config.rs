use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "shardsession")]
#[command(about = "Session-scoped backend resource manager for a sharding proxy", long_about = None)]
pub struct Config {
    #[arg(long, default_value = "info", env = "SHARDSESSION_LOG_LEVEL")]
    pub log_level: String,

    #[arg(long, default_value = "1024", env = "SHARDSESSION_MAX_SESSION_CONNECTIONS", help = "Maximum number of physical connections one session may hold across all data sources")]
    pub max_session_connections: usize,
}

impl Config {
    /// Get a configuration instance with all values resolved from the environment.
    /// This is a library crate, so the process command line is never consulted.
    pub fn load() -> Self {
        Config::parse_from(["shardsession"])
    }
}

// Global configuration instance
lazy_static::lazy_static! {
    pub static ref CONFIG: Config = Config::load();
}
