use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use verticut_core::{
    Config, FfmpegRunner, Mode, Pipeline, RunState, TrimRequest, check_ffmpeg, list_media,
};

#[derive(Parser, Debug)]
#[command(name = "verticut")]
#[command(about = "Trim, crop and merge videos into vertical clips using FFmpeg")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Folder with the source videos and images
    #[arg(long, global = true)]
    input: Option<PathBuf>,

    /// Folder for intermediate and final outputs
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Path of the trim descriptor (trim-results.json)
    #[arg(long, global = true)]
    trim_data: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the local HTTP server
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Process the trim descriptor once
    Run {
        /// Pipeline variant (see list-modes)
        #[arg(short, long, value_parser = parse_mode, default_value = "vertical")]
        mode: Mode,

        /// Skip the vertical crop
        #[arg(long)]
        no_vertical: bool,

        /// Skip screenshots and thumbnails
        #[arg(long)]
        no_screenshots: bool,

        /// Delete source files after a successful run
        #[arg(long)]
        remove_sources: bool,

        /// Tags appended to vertical file names (e.g. "#birds #nature")
        #[arg(long, default_value = "")]
        hashtags: String,

        /// Replace the soundtrack of vertical clips with this audio file
        #[arg(long)]
        music: Option<PathBuf>,

        /// Zoom-out: overlay a small preview of the first seconds
        #[arg(long)]
        picture_in_picture: bool,

        /// Hide progress bars
        #[arg(short, long)]
        quiet: bool,
    },

    /// List available pipeline modes
    ListModes,

    /// Print the media files in the input folder as JSON
    Files,
}

fn parse_mode(name: &str) -> Result<Mode, String> {
    name.parse()
}

fn require_ffmpeg() {
    match check_ffmpeg() {
        Ok(version) => {
            log::info!("FFmpeg version {} detected", version);
        }
        Err(e) => {
            eprintln!("Error: FFmpeg not found!");
            eprintln!("Please install FFmpeg to use this tool.");
            eprintln!();
            eprintln!("Installation instructions:");
            eprintln!("  Ubuntu/Debian: sudo apt install ffmpeg");
            eprintln!("  macOS:         brew install ffmpeg");
            eprintln!("  Windows:       Download from https://ffmpeg.org/download.html");
            eprintln!();
            eprintln!("Details: {}", e);
            std::process::exit(1);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let mut config = Config::from_env();
    if let Some(input) = args.input {
        config.input_folder = input;
    }
    if let Some(output) = args.output {
        config.output_folder = output;
    }
    if let Some(trim_data) = args.trim_data {
        config.trim_data_path = trim_data;
    }

    match args.command {
        Commands::ListModes => {
            println!("\nAvailable modes:");
            println!("{:-<50}", "");
            for (name, description) in Mode::list_all() {
                println!("{:<12} - {}", name, description);
            }
            println!("\nUsage: verticut run --mode zoom-in");
            Ok(())
        }

        Commands::Files => {
            let listing = list_media(&config.input_folder)?;
            let json =
                serde_json::to_string_pretty(&listing).context("Failed to serialize listing")?;
            println!("{}", json);
            Ok(())
        }

        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            require_ffmpeg();
            std::fs::create_dir_all(&config.input_folder)
                .context("Failed to create input folder")?;

            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(verticut_core::server::serve(config))
        }

        Commands::Run {
            mode,
            no_vertical,
            no_screenshots,
            remove_sources,
            hashtags,
            music,
            picture_in_picture,
            quiet,
        } => {
            require_ffmpeg();

            let request = TrimRequest::load(&config.trim_data_path)?;
            log::info!("Global video title: {}", request.all_videos_title);
            log::info!("Input: {:?}", config.input_folder);
            log::info!("Output: {:?}", config.output_folder);

            let mut pipeline = Pipeline::new(mode, &config.input_folder, &config.output_folder)
                .produce_vertical(!no_vertical)
                .produce_screenshots(!no_screenshots)
                .remove_source_files(remove_sources)
                .hashtags(&hashtags)
                .picture_in_picture(picture_in_picture);

            if let Some(music) = music {
                if !music.exists() {
                    anyhow::bail!("Music file does not exist: {:?}", music);
                }
                pipeline = pipeline.music(music);
            }

            let runner = FfmpegRunner::new().with_progress(!quiet);
            let report = pipeline.run(&request, &runner);

            if report.state == RunState::Failed {
                anyhow::bail!(
                    "Pipeline failed: {}",
                    report.error.unwrap_or_else(|| "unknown error".to_string())
                );
            }

            println!("\n✅ All videos processed ({} records)", report.videos.len());
            if let Some(merged) = &report.merged {
                println!("🎞️  Merged video: {:?}", merged);
            }
            println!("📁 Status written to: {:?}", pipeline.status_path());
            Ok(())
        }
    }
}
