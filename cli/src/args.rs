use std::path::PathBuf;

/// CLI entry point: run a pipeline from a JSON master config file (§6).
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "video-cascade", about = "Multi-stream video analytics cascade")]
pub struct Args {
    /// Path to the JSON master config file.
    #[arg(long)]
    pub config: PathBuf,

    /// Overrides the config file's `log-level` for this run.
    #[arg(long)]
    pub log_level: Option<String>,
}
