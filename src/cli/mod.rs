use clap::Parser;

pub mod config;
pub mod run;
pub mod version;

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(author = "Syscoin Developers")]
#[command(about = "Syscoin masternode governance agent", long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Bypass scheduler and sync/vote immediately
    #[arg(short = 'b', long = "bypass-scheduler")]
    pub bypass: bool,

    /// Print the version (Syscoin Sentinel vX.X.X) and exit
    #[arg(short = 'v', long)]
    pub version: bool,

    /// Path to config file (default: ~/.local/share/sentinel/sentinel.toml)
    #[arg(short = 'c', long)]
    pub config: Option<String>,
}

/// Returns the process exit code.
pub async fn execute(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    if cli.version {
        version::execute();
        return Ok(run::EXIT_OK);
    }
    run::execute(cli.config, cli.bypass).await
}
