use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;
use videomorph_core::config::Config;
use videomorph_core::convert::{ConversionEvent, ConversionOptions, Converter};
use videomorph_core::doctor::{run_diagnostics, CheckStatus};
use videomorph_core::media::{format_duration, format_size, MediaList, Video};
use videomorph_core::paths::SysPaths;
use videomorph_core::probe::FfprobeRunner;
use videomorph_core::profile::{ConversionProfile, PresetAttr, ProfileDefaults, XmlProfileStore};

#[derive(Parser)]
#[command(
    name = "videomorph",
    version,
    about = "Convert video files with ffmpeg presets"
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert one or more files to a target quality
    Convert {
        /// Files to convert
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Target quality (preset name); defaults to the configured one
        #[arg(short, long)]
        quality: Option<String>,

        /// Output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Prefix output names with the quality tag
        #[arg(long)]
        tagged: bool,

        /// Burn in a sidecar .srt subtitle when one exists
        #[arg(long)]
        subtitles: bool,

        /// Delete each original after a successful conversion
        #[arg(long)]
        delete_original: bool,
    },

    /// Show metadata for a media file
    Probe {
        file: PathBuf,

        /// Print the raw probe maps as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage conversion profiles
    Profiles {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Check ffmpeg, ffprobe, profiles and output directory
    Doctor,
}

#[derive(Subcommand)]
enum ProfileAction {
    /// List qualities grouped by profile
    List,

    /// Show parameters and extension for a quality
    Show { quality: String },

    /// Add a preset to a profile
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        preset: String,
        #[arg(long, allow_hyphen_values = true)]
        params: String,
        #[arg(long)]
        extension: String,
    },

    /// Copy the profiles file into a directory
    Export { dir: PathBuf },

    /// Replace the profiles file with another one
    Import { file: PathBuf },

    /// Restore the default profiles
    Restore,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "videomorph=debug,videomorph_core=debug"
    } else {
        "videomorph=info,videomorph_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load().unwrap_or_default();
    let sys_paths = SysPaths::detect();
    let tools = config.library_paths();
    debug!(?tools, profiles = %sys_paths.user_profiles_file().display(), "resolved paths");

    match cli.command {
        Commands::Convert {
            files,
            quality,
            output_dir,
            tagged,
            subtitles,
            delete_original,
        } => {
            let ffmpeg = tools.ffmpeg.clone().context("ffmpeg not found; run `videomorph doctor`")?;
            let runner = FfprobeRunner::from_paths(&tools)?;
            let mut profile = ConversionProfile::new(open_store(&sys_paths)?);

            let quality = quality.unwrap_or_else(|| config.conversion.default_quality.clone());
            if profile.store().find_preset(&quality).is_none() {
                anyhow::bail!("Unknown quality: {quality}. See `videomorph profiles list`");
            }

            let mut options = ConversionOptions::from(&config.conversion);
            if let Some(dir) = output_dir {
                options.output_dir = dir;
            }
            options.tagged_output |= tagged;
            options.insert_subtitles |= subtitles;
            options.delete_original |= delete_original;

            let mut list = MediaList::new();
            for file in &files {
                match list.add_file(file, &runner, &quality).await {
                    Ok(_) => {}
                    Err(e) => eprintln!("Skipping {}: {e}", file.display()),
                }
            }
            if list.is_empty() {
                anyhow::bail!("Nothing to convert");
            }

            println!(
                "Converting {} file(s) to '{quality}' ({} total)",
                list.len(),
                format_duration(list.total_duration())
            );

            let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = cancel_tx.send(true);
                }
            });

            let converter = Converter::new(ffmpeg, options);
            let summary = converter
                .run_queue(&mut list, &mut profile, print_event, cancel_rx)
                .await?;

            println!(
                "\n{} converted, {} failed{}",
                summary.done,
                summary.failed,
                if summary.stopped { " (stopped)" } else { "" }
            );
        }

        Commands::Probe { file, json } => {
            let runner = FfprobeRunner::from_paths(&tools)?;
            let video = Video::probe(&file, &runner).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&video.info)?);
                return Ok(());
            }

            println!("File:       {}", video.name(true));
            println!("Format:     {}", video.format_name().unwrap_or("-"));
            println!(
                "Duration:   {}",
                video.duration().map(format_duration).unwrap_or_else(|| "-".into())
            );
            println!(
                "Size:       {}",
                video.size_bytes().map(format_size).unwrap_or_else(|| "-".into())
            );
            if let Some(rate) = video.bit_rate() {
                println!("Bitrate:    {} kb/s", rate / 1000);
            }
            if let Some((w, h)) = video.resolution() {
                println!("Resolution: {w}x{h}");
            }
            println!("Video:      {}", video.video_codec().unwrap_or("-"));
            println!("Audio:      {}", video.audio_codec().unwrap_or("-"));
            if video.has_subtitles() {
                println!("Subtitles:  {}", video.subtitle_language().unwrap_or("und"));
            }
            if !video.is_valid() {
                println!("\nWarning: no usable duration, this file cannot be converted");
            }
        }

        Commands::Profiles { action } => {
            let mut store = open_store(&sys_paths)?;
            match action {
                ProfileAction::List => {
                    for (profile, qualities) in store.qualities(config.locale) {
                        println!("{profile}");
                        for quality in qualities {
                            println!("  {quality}");
                        }
                    }
                }
                ProfileAction::Show { quality } => {
                    let preset = store
                        .find_preset(&quality)
                        .with_context(|| format!("Unknown quality: {quality}"))?;
                    println!("Name:       {}", preset.attr(PresetAttr::PresetName));
                    println!("Name (es):  {}", preset.attr(PresetAttr::PresetNameEs));
                    println!("Extension:  {}", preset.attr(PresetAttr::FileExtension));
                    println!("Params:     {}", preset.attr(PresetAttr::PresetParams));
                }
                ProfileAction::Add {
                    name,
                    preset,
                    params,
                    extension,
                } => {
                    store.add_profile(&name, &preset, &params, &extension)?;
                    println!("Added '{preset}' to {}", name.to_uppercase());
                }
                ProfileAction::Export { dir } => {
                    let path = store.export(&dir)?;
                    println!("Exported: {}", path.display());
                }
                ProfileAction::Import { file } => {
                    store.import(&file)?;
                    println!("Imported: {}", file.display());
                }
                ProfileAction::Restore => {
                    store.restore()?;
                    println!("Default profiles restored");
                }
            }
        }

        Commands::Doctor => {
            let report =
                run_diagnostics(&config, &tools, &sys_paths.user_profiles_file()).await;
            println!("=== VideoMorph System Diagnostics ===\n");
            for check in &report.checks {
                let icon = match check.status {
                    CheckStatus::Pass => "[PASS]",
                    CheckStatus::Warn => "[WARN]",
                    CheckStatus::Fail => "[FAIL]",
                };
                println!("{} {}: {}", icon, check.name, check.detail);
                if let Some(ref rec) = check.recommendation {
                    println!("       -> {rec}");
                }
            }
        }
    }

    Ok(())
}

fn open_store(sys_paths: &SysPaths) -> Result<XmlProfileStore> {
    let defaults = ProfileDefaults::new(sys_paths.system_profiles_file());
    let store = XmlProfileStore::open(sys_paths.user_profiles_file(), defaults)?;
    Ok(store)
}

fn print_event(event: ConversionEvent) {
    match event {
        ConversionEvent::Started { input, output, .. } => {
            println!("{} -> {}", input.display(), output.display());
        }
        ConversionEvent::Progress { percent, progress, .. } => {
            print!("\r  [{percent:5.1}%] time={} speed={}", progress.time, progress.speed);
            let _ = std::io::stdout().flush();
        }
        ConversionEvent::Finished { .. } => println!("\r  [100.0%] done"),
        ConversionEvent::Failed { error, .. } => println!("\n  failed: {error}"),
        ConversionEvent::Stopped { .. } => println!("\n  stopped"),
    }
}
