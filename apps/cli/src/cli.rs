use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "workshop", version, about = "Steam Workshop browser and downloader")]
pub struct Cli {
    #[arg(long, global = true, help = "Config file (defaults to the platform config dir)")]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, default_value = "info", help = "Log level or RUST_LOG-style filter")]
    pub log_level: String,
    #[arg(long, global = true, help = "Also write logs to this file")]
    pub log_file: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Popular Workshop-enabled games
    Games {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Search the game catalogue by name
    Search {
        query: String,
    },
    /// List Workshop items of a game
    Items {
        appid: u32,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        per_page: u32,
    },
    /// Show details of Workshop items
    Details {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Download Workshop items
    Download {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long, default_value_t = false)]
        extract: bool,
        #[arg(short, long, default_value_t = false, help = "Print per-chunk progress and speed")]
        verbose: bool,
    },
    /// Fetch a preview image into the cache and print its path
    Preview {
        url: String,
    },
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Log in to Steam Community (password from STEAM_PASSWORD or stdin)
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        guard_code: Option<String>,
        #[arg(long, default_value_t = false, help = "The guard code comes from the mobile authenticator")]
        two_factor: bool,
        #[arg(long, requires = "captcha_text")]
        captcha_gid: Option<String>,
        #[arg(long, requires = "captcha_gid")]
        captcha_text: Option<String>,
        #[arg(long, default_value_t = false, help = "Do not keep the session after this run")]
        no_remember: bool,
    },
    Logout,
    /// Check the configured Steam Web API key
    ValidateKey,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    Stats,
    Clear,
    Cleanup,
}
