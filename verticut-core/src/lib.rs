//! Verticut Core - vertical video pipeline on top of the FFmpeg CLI
//!
//! This library turns a JSON edit descriptor into social-media-ready clips by
//! driving the FFmpeg command-line tool, including:
//! - Trimming segments and cropping them to a centred 9:16 window
//! - Midpoint and last-frame screenshots, still-image intros
//! - Speed changes, reversal, overlays and soundtrack replacement
//! - Merging clips with the concat demuxer
//! - Resumable runs: every step skips outputs that already exist
//! - A small HTTP server for listing media and submitting edits

pub mod config;
pub mod error;
pub mod ffmpeg_wrapper;
pub mod geometry;
pub mod library;
pub mod modes;
pub mod pipeline;
pub mod request;
pub mod runner;
pub mod server;
pub mod steps;

// Re-export commonly used types at the crate root
pub use config::Config;
pub use error::{RequestError, ToolError};
pub use ffmpeg_wrapper::{FFmpegCommand, VideoInfo, check_ffmpeg, get_video_info};
pub use geometry::CropRect;
pub use library::{MediaListing, list_media};
pub use modes::Mode;
pub use pipeline::{Pipeline, RunReport, RunState};
pub use request::{TrimData, TrimRequest, sanitize_file_name};
pub use runner::{FfmpegRunner, Runner};
