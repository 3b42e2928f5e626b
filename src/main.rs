//! Video Pages command line

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use video_pages::ffmpeg;
use video_pages::{
    ConversionReport, ConversionRequest, ConvertError, Converter, ConverterConfig, Result,
    SelectionMode, SubtitleTrack,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "video-pages";

/// Config file read when `--config` is not given
const DEFAULT_CONFIG: &str = "video-pages.toml";

#[derive(Parser, Debug)]
#[command(name = APP_NAME, version, about = "Turn videos into subtitled page documents")]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one or more videos into documents
    Convert {
        /// Video files
        #[arg(required = true)]
        videos: Vec<PathBuf>,

        /// SubRip subtitle file used for every video
        #[arg(short, long)]
        subtitles: Option<PathBuf>,

        /// Page selection policy
        #[arg(short, long, value_enum)]
        mode: Option<SelectionMode>,

        /// Print a JSON report per video
        #[arg(long)]
        json: bool,
    },

    /// Write a copy of a subtitle file with every timestamp moved
    Shift {
        /// Source SubRip file
        subtitles: PathBuf,

        /// Offset in milliseconds, may be negative
        #[arg(allow_negative_numbers = true)]
        delta_ms: i64,

        /// Destination file
        output: PathBuf,
    },

    /// Write the default configuration file
    ConfigInit {
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    init_logging(config.log_level.as_deref(), cli.log_json);
    tracing::info!("{} v{} starting", APP_NAME, VERSION);

    match cli.command {
        Command::Convert {
            videos,
            subtitles,
            mode,
            json,
        } => {
            ffmpeg::init()?;
            ffmpeg::install_log_filter();
            tracing::info!("FFmpeg version: {}", ffmpeg::version_info());

            let converter = Arc::new(Converter::new(config));
            convert_all(converter, videos, subtitles, mode, json).await
        }
        Command::Shift {
            subtitles,
            delta_ms,
            output,
        } => {
            let track = SubtitleTrack::load(&subtitles)?;
            track.shift_to_file(delta_ms, &output)?;
            tracing::info!("Shifted {} subtitles by {} ms into {:?}", track.len(), delta_ms, output);
            Ok(())
        }
        Command::ConfigInit { path } => {
            ConverterConfig::default().to_file(&path)?;
            tracing::info!("Wrote configuration to {:?}", path);
            Ok(())
        }
    }
}

/// Load configuration, falling back to defaults when the file is unusable
fn load_config(path: Option<&Path>) -> ConverterConfig {
    let explicit = path.is_some();
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG));

    if !explicit && !path.exists() {
        return ConverterConfig::default();
    }
    match ConverterConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            // Logging is not up yet
            eprintln!(
                "Failed to load config file {}: {}. Using defaults.",
                path.display(),
                e
            );
            ConverterConfig::default()
        }
    }
}

/// Convert every video on its own blocking worker.
///
/// Videos whose document would land on a path already claimed by an
/// earlier video are not converted.
async fn convert_all(
    converter: Arc<Converter>,
    videos: Vec<PathBuf>,
    subtitles: Option<PathBuf>,
    mode: Option<SelectionMode>,
    json: bool,
) -> Result<()> {
    let total = videos.len();
    let conflicts = converter.output_conflicts(&videos);
    let mut failed = 0usize;

    let mut handles = Vec::with_capacity(total);
    for video in videos {
        if let Some((output, earlier)) = conflicts.get(&video) {
            failed += 1;
            tracing::error!(
                "Skipping {:?}: {:?} is already written for {:?}",
                video,
                output,
                earlier
            );
            continue;
        }

        let converter = converter.clone();
        let request = ConversionRequest {
            video: Some(video.clone()),
            subtitles: subtitles.clone(),
            mode,
        };
        let handle = tokio::task::spawn_blocking(move || converter.convert(&request));
        handles.push((video, handle));
    }

    for (video, handle) in handles {
        let outcome = handle.await.map_err(|e| {
            ConvertError::InternalInconsistency(format!("conversion task failed: {}", e))
        })?;
        match outcome {
            Ok(Some(report)) => print_report(&report, json)?,
            Ok(None) => println!("{}: no output", video.display()),
            Err(e) => {
                failed += 1;
                tracing::error!("Conversion of {:?} failed: {}", video, e);
            }
        }
    }

    if failed > 0 {
        return Err(ConvertError::ConversionsFailed { failed, total });
    }
    Ok(())
}

fn print_report(report: &ConversionReport, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(report)
            .map_err(|e| ConvertError::InternalInconsistency(e.to_string()))?;
        println!("{}", line);
    } else {
        println!(
            "{}: {} page(s) -> {}",
            report.video.display(),
            report.pass.selection.pages,
            report.output.display()
        );
    }
    Ok(())
}

/// Filter used when `RUST_LOG` is unset. FFmpeg's own messages arrive on
/// the `ffmpeg` target and stay visible at warn.
fn default_directive(level: Option<&str>) -> String {
    format!("video_pages={},ffmpeg=warn", level.unwrap_or("info"))
}

/// Initialize logging with tracing
fn init_logging(level: Option<&str>, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive(level).into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
