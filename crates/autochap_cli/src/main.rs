use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use autochap_core::chapters::{
    parse_chapters, snap_chapter_file, write_chapters, FrameRate, KeyframeList,
};
use autochap_core::config::{ConfigManager, ConfigSection, Settings};
use autochap_core::logging::{init_tracing, LogLevel};
use autochap_core::orchestrator::{run_job, JobRequest, KeyframeSource, RunOutcome, Services};

/// Exit code for a run whose matches could not be laid out as chapters.
const EXIT_REJECTED: i32 = 2;

/// Automatic chapters from opening and ending themes.
#[derive(Parser)]
#[command(name = "autochap", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log debug output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Match themes against an episode and write its chapter file
    Run(RunArgs),
    /// Snap an existing chapter file to keyframes
    Snap(SnapArgs),
    /// Create a settings file, or reset sections of one to defaults
    Config(ConfigArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Episode file.
    #[arg(short, long)]
    input: PathBuf,

    /// Directory holding the theme and log folders (default: episode directory).
    #[arg(short, long)]
    work_path: Option<PathBuf>,

    /// Chapter file to write (default: <episode>.chapters.txt).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Settings file, created with defaults if missing.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Render correlation charts into the theme directory.
    #[arg(long)]
    charts: bool,

    /// Delete the theme directory afterwards.
    #[arg(long)]
    delete_themes: bool,

    /// SCXvid keyframe file; enables snapping.
    #[arg(long, conflicts_with = "probe_keyframes")]
    keyframes: Option<PathBuf>,

    /// Read keyframes from the episode with ffprobe; enables snapping.
    #[arg(long)]
    probe_keyframes: bool,

    /// Frame rate for keyframe timing, as N/D or decimal.
    #[arg(long)]
    fps: Option<FrameRate>,
}

#[derive(Args)]
struct SnapArgs {
    /// Chapter file to snap.
    #[arg(short, long)]
    input: PathBuf,

    /// SCXvid keyframe file.
    #[arg(short, long)]
    keyframes: PathBuf,

    /// Output file (default: <input>_snapped.txt).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Frame rate, as N/D or decimal.
    #[arg(long, default_value = "24000/1001")]
    fps: FrameRate,

    /// Search window in milliseconds (at most 1000).
    #[arg(long, default_value_t = 1000)]
    snap_ms: u32,
}

#[derive(Args)]
struct ConfigArgs {
    /// Settings file, created with defaults if missing.
    #[arg(short, long, default_value = "autochap.toml")]
    config: PathBuf,

    /// Section to reset to defaults (paths, logging, matching, chapters, snapping, download).
    #[arg(long)]
    reset: Vec<ConfigSection>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    });

    let result = match cli.command {
        Commands::Run(args) => run(args),
        Commands::Snap(args) => snap(args).map(|()| 0),
        Commands::Config(args) => config(args).map(|()| 0),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let mut manager = ConfigManager::new(path);
    manager
        .load_or_create()
        .with_context(|| format!("loading settings from {}", path.display()))?;
    Ok(manager.into_settings())
}

fn run(args: RunArgs) -> Result<i32> {
    let settings = load_settings(args.config.as_deref())?;

    let mut request = JobRequest::new(&args.input);
    if let Some(work_path) = args.work_path {
        request = request.with_work_path(work_path);
    }
    if let Some(output) = args.output {
        request = request.with_output(output);
    }
    request.charts = args.charts;
    request.delete_themes = args.delete_themes;
    request.frame_rate = args.fps;
    request.keyframes = match (args.keyframes, args.probe_keyframes) {
        (Some(path), _) => KeyframeSource::Scxvid(path),
        (None, true) => KeyframeSource::Probe,
        (None, false) => KeyframeSource::None,
    };

    match run_job(request, settings, Services::default())? {
        RunOutcome::ChaptersWritten(path) => {
            info!("Chapters written to {}", path.display());
            Ok(0)
        }
        RunOutcome::Rejected(reason) => {
            eprintln!("{}", reason);
            Ok(EXIT_REJECTED)
        }
    }
}

fn snap(args: SnapArgs) -> Result<()> {
    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let entries = parse_chapters(&text)?;
    if entries.is_empty() {
        bail!("{} has no chapters", args.input.display());
    }

    let keyframes = KeyframeList::load(&args.keyframes, args.fps)?;
    let (snapped, stats) = snap_chapter_file(&entries, &keyframes, args.snap_ms)?;

    let output = args.output.unwrap_or_else(|| snapped_path(&args.input));
    write_chapters(&output, &snapped)?;
    info!(
        "Snapped {} of {} chapters, written to {}",
        stats.moved,
        stats.total,
        output.display()
    );
    Ok(())
}

fn config(args: ConfigArgs) -> Result<()> {
    let mut manager = ConfigManager::new(&args.config);
    manager
        .load_or_create()
        .with_context(|| format!("loading settings from {}", args.config.display()))?;
    for section in args.reset {
        manager
            .reset_section(section)
            .with_context(|| format!("resetting [{}]", section.table_name()))?;
        info!("Reset [{}] to defaults", section.table_name());
    }
    info!("Settings at {}", manager.path().display());
    Ok(())
}

/// `<dir>/<stem>_snapped.txt` next to the input.
fn snapped_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "chapters".to_string());
    input.with_file_name(format!("{}_snapped.txt", stem))
}
