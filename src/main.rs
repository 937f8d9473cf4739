use std::path::PathBuf;

use clap::Parser;
use letsfocus_lib::RunOptions;

/// Runs one focus session in the terminal, optionally with background music.
#[derive(Parser, Debug)]
#[command(name = "letsfocus")]
#[command(version)]
struct Cli {
    /// Session length in minutes (1-60)
    #[arg(short, long)]
    minutes: Option<u32>,

    /// Play background music during the session
    #[arg(long)]
    music: bool,

    /// Directory holding music1.mp3, music2.mp3, ...
    #[arg(long)]
    music_dir: Option<PathBuf>,

    /// Music volume between 0.0 and 1.0
    #[arg(long)]
    volume: Option<f32>,

    /// Settings file
    #[arg(long, default_value = "letsfocus.json", env = "LETSFOCUS_SETTINGS")]
    settings: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    letsfocus_lib::run(RunOptions {
        minutes: cli.minutes,
        music: cli.music,
        music_dir: cli.music_dir,
        volume: cli.volume,
        settings_path: cli.settings,
        verbose: cli.verbose,
    })
}
