use std::{fs, path::PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use framesync::{
    DatasetItem, DecodeOptions, Device, EncodeOptions, FfmpegLogLevel, FrameSource, ItemValue,
    VideoStream, encode_video_frames, match_frames, write_frame_images,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Value, json};
use tracing_subscriber::{EnvFilter, fmt};

#[cfg(not(feature = "rayon"))]
use framesync::resolve as resolve_item;
#[cfg(feature = "rayon")]
use framesync::resolve_parallel as resolve_item;

const CLI_AFTER_HELP: &str = "Examples:\n  framesync info videos/episode_000000.mp4 --json\n  framesync decode videos/episode_000000.mp4 --timestamps 0.05,1.55,2.85 --tolerance 0.06 --save-dir frames\n  framesync resolve items.json --keys observation.image --videos-dir data/videos --tolerance 1e-4\n  framesync encode frames videos/episode_000000.mp4 --fps 10\n  framesync completions zsh > _framesync";

#[derive(Debug, Parser)]
#[command(
    name = "framesync",
    version,
    about = "Retrieve timestamp-synchronized frames from dataset videos",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging output (overridden by RUST_LOG).
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar where supported.
    #[arg(long, global = true)]
    progress: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log every loaded and every chosen frame timestamp.
    #[arg(long, global = true)]
    log_loaded_timestamps: bool,

    /// Decode backend (cpu, cuda).
    #[arg(long, global = true, default_value = "cpu")]
    device: String,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print stream metadata for a video.
    #[command(
        about = "Print video metadata",
        after_help = "Examples:\n  framesync info video.mp4\n  framesync info video.mp4 --json"
    )]
    Info {
        /// Input video path.
        input: PathBuf,

        /// Output metadata as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the key frames of a video.
    #[command(about = "List key frames and GOP sizes")]
    Keyframes {
        /// Input video path.
        input: PathBuf,

        /// Output the key frame index as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Decode the frames closest to the given timestamps.
    #[command(
        about = "Decode frames at timestamps",
        after_help = "Examples:\n  framesync decode video.mp4 --timestamps 0.1,0.2 --tolerance 1e-4\n  framesync decode video.mp4 --timestamps 1.5 --tolerance 0.04 --save-dir out"
    )]
    Decode {
        /// Input video path.
        input: PathBuf,
        /// Comma-separated timestamps in seconds.
        #[arg(long)]
        timestamps: String,
        /// Maximum distance in seconds between a request and its frame (exclusive).
        #[arg(long)]
        tolerance: f64,
        /// Save matched frames as frame_000000.png, ... in this directory.
        #[arg(long)]
        save_dir: Option<PathBuf>,
        /// Output matches as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Resolve the video references of dataset items.
    #[command(
        about = "Resolve dataset item frame references",
        after_help = "The input file holds one JSON item or an array of items.\n\nExamples:\n  framesync resolve item.json --keys observation.image --videos-dir data/videos --tolerance 1e-4"
    )]
    Resolve {
        /// JSON file with one item object or an array of items.
        items: PathBuf,
        /// Comma-separated video keys to resolve.
        #[arg(long)]
        keys: String,
        /// Directory that holds the videos; stored paths are relative to its parent.
        #[arg(long)]
        videos_dir: PathBuf,
        /// Maximum distance in seconds between a request and its frame (exclusive).
        #[arg(long)]
        tolerance: f64,
        /// Output resolved shapes as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Encode a frame_%06d.png image sequence into a video.
    #[command(about = "Encode an image sequence")]
    Encode {
        /// Directory holding frame_000000.png, frame_000001.png, ...
        frames_dir: PathBuf,
        /// Output video path.
        output: PathBuf,
        /// Frames per second.
        #[arg(long)]
        fps: u32,
        /// Video codec.
        #[arg(long, default_value = "libx264")]
        vcodec: String,
        /// Pixel format.
        #[arg(long, default_value = "yuv444p")]
        pix_fmt: String,
        /// Replace the output if it already exists.
        #[arg(long)]
        overwrite: bool,
    },

    /// Generate shell completions.
    #[command(about = "Generate shell completion scripts")]
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

fn parse_timestamps(value: &str) -> Result<Vec<f64>, Box<dyn std::error::Error>> {
    let timestamps = value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<f64>()
                .map_err(|error| format!("invalid timestamp `{part}`: {error}"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if timestamps.is_empty() {
        return Err("--timestamps needs at least one value".into());
    }
    Ok(timestamps)
}

fn parse_keys(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn default_filter(global: &GlobalOptions) -> &'static str {
    if global.verbose {
        "debug"
    } else if global.log_loaded_timestamps {
        "info"
    } else {
        "warn"
    }
}

fn init_logging(global: &GlobalOptions) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(global)));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(level) = &global.log_level {
        let parsed: FfmpegLogLevel = level
            .parse()
            .map_err(|_| format!("unsupported --log-level: {level}"))?;
        framesync::set_ffmpeg_log_level(parsed);
    }
    Ok(())
}

fn decode_options(
    global: &GlobalOptions,
    tolerance: f64,
) -> Result<DecodeOptions, Box<dyn std::error::Error>> {
    let device: Device = global.device.parse()?;
    Ok(DecodeOptions::new(tolerance)
        .with_device(device)
        .with_log_loaded_timestamps(global.log_loaded_timestamps))
}

/// Shape summary of a resolved item value for display.
fn describe_value(value: &ItemValue) -> Value {
    match value {
        ItemValue::Frame(tensor) => {
            let (channels, height, width) = tensor.shape();
            json!({ "frame": [channels, height, width] })
        }
        ItemValue::Frames(tensors) => {
            let shape = tensors.first().map(|tensor| {
                let (channels, height, width) = tensor.shape();
                [channels, height, width]
            });
            json!({ "frames": tensors.len(), "shape": shape })
        }
        ItemValue::Reference(reference) => json!({ "unresolved": reference.timestamps() }),
        ItemValue::Other(other) => other.clone(),
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.global);
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Info { input, json } => {
            let stream = VideoStream::open(&input, cli.global.device.parse()?)?;
            let metadata = stream.metadata();
            if json {
                println!("{}", serde_json::to_string_pretty(metadata)?);
            } else {
                println!("Path: {}", input.display());
                println!(
                    "Video: {}x{} @ {:.2} fps, codec={}",
                    metadata.width, metadata.height, metadata.frames_per_second, metadata.codec
                );
                if let Some(pixel_format) = &metadata.pixel_format {
                    println!("Pixel format: {pixel_format}");
                }
                if metadata.start_seconds() > 0.0 {
                    println!("Start: {:.3}s", metadata.start_seconds());
                }
                println!("Duration: {:.3}s", metadata.duration_seconds());
                println!("Frames: {}", metadata.frame_count);
            }
        }
        Commands::Keyframes { input, json } => {
            let mut stream = VideoStream::open(&input, cli.global.device.parse()?)?;
            let index = stream.keyframes()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&index)?);
            } else {
                for keyframe in &index.keyframes {
                    match keyframe.timestamp {
                        Some(timestamp) => println!(
                            "packet {:>6}  {:>10.4}s  {} bytes",
                            keyframe.packet_number, timestamp, keyframe.size
                        ),
                        None => println!(
                            "packet {:>6}  {:>11}  {} bytes",
                            keyframe.packet_number, "no pts", keyframe.size
                        ),
                    }
                }
                println!(
                    "{} key frame(s) in {} packet(s), largest GOP {} packet(s)",
                    index.keyframes.len(),
                    index.total_video_packets,
                    index.max_gop_size
                );
            }
        }
        Commands::Decode {
            input,
            timestamps,
            tolerance,
            save_dir,
            json,
        } => {
            let requested = parse_timestamps(&timestamps)?;
            let options = decode_options(&cli.global, tolerance)?;
            let mut stream = VideoStream::open(&input, options.device())?;
            if cli.global.verbose {
                eprintln!(
                    "decoding {} request(s) from {} ({:.3}s)",
                    requested.len(),
                    input.display(),
                    stream.duration_seconds()
                );
            }
            let matches = match_frames(&mut stream, &requested, &options)?;

            if json {
                let payload: Vec<Value> = matches
                    .iter()
                    .map(|matched| {
                        json!({
                            "requested": matched.requested,
                            "matched": matched.matched,
                            "distance": matched.distance,
                            "width": matched.frame.width,
                            "height": matched.frame.height,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                for matched in &matches {
                    println!(
                        "{:>10.4}s -> {:>10.4}s  (off by {:.4}s)",
                        matched.requested, matched.matched, matched.distance
                    );
                }
            }

            if let Some(dir) = save_dir {
                let images = matches
                    .iter()
                    .map(|matched| matched.frame.to_image())
                    .collect::<Result<Vec<_>, _>>()?;
                let paths = write_frame_images(&images, &dir)?;
                println!(
                    "{} {}",
                    "success:".green().bold(),
                    format!("Saved {} frame(s) to {}", paths.len(), dir.display()).green()
                );
            }
        }
        Commands::Resolve {
            items,
            keys,
            videos_dir,
            tolerance,
            json,
        } => {
            let keys = parse_keys(&keys);
            if keys.is_empty() {
                return Err("--keys needs at least one key".into());
            }
            let options = decode_options(&cli.global, tolerance)?;
            let document: Value = serde_json::from_str(&fs::read_to_string(&items)?)?;
            let raw_items = match document {
                Value::Array(values) => values,
                single => vec![single],
            };

            let progress_bar = if cli.global.progress {
                let pb = ProgressBar::new(raw_items.len() as u64);
                let style = ProgressStyle::with_template(
                    "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}",
                )?;
                pb.set_style(style.progress_chars("##-"));
                Some(pb)
            } else {
                None
            };

            let mut summaries = Vec::with_capacity(raw_items.len());
            for raw in raw_items {
                let mut item = DatasetItem::from_json(raw, &keys)?;
                resolve_item(&mut item, &keys, &videos_dir, &options)?;

                let summary: serde_json::Map<String, Value> = keys
                    .iter()
                    .filter_map(|key| {
                        item.get(key)
                            .map(|value| (key.clone(), describe_value(value)))
                    })
                    .collect();
                summaries.push(Value::Object(summary));

                if let Some(pb) = &progress_bar {
                    pb.inc(1);
                }
            }

            if let Some(pb) = progress_bar {
                pb.finish_with_message("done");
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                for (index, summary) in summaries.iter().enumerate() {
                    println!("item {index}: {summary}");
                }
                println!(
                    "{} {}",
                    "success:".green().bold(),
                    format!("Resolved {} item(s)", summaries.len()).green()
                );
            }
        }
        Commands::Encode {
            frames_dir,
            output,
            fps,
            vcodec,
            pix_fmt,
            overwrite,
        } => {
            if output.exists() {
                if overwrite {
                    eprintln!(
                        "{} {}",
                        "warning:".yellow().bold(),
                        format!("overwriting {}", output.display()).yellow()
                    );
                } else {
                    return Err(format!(
                        "output already exists: {} (use --overwrite to replace)",
                        output.display()
                    )
                    .into());
                }
            }

            let mut options = EncodeOptions::new(fps)
                .with_video_codec(vcodec)
                .with_pixel_format(pix_fmt)
                .with_overwrite(overwrite);
            if let Some(level) = &cli.global.log_level {
                options = options.with_log_level(
                    level
                        .parse()
                        .map_err(|_| format!("unsupported --log-level: {level}"))?,
                );
            }
            encode_video_frames(&frames_dir, &output, &options)?;
            println!("{} {}", "saved".green().bold(), output.display());
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "framesync", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
