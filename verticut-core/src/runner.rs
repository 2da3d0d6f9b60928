//! Execution seam between pipeline steps and the external tools.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use crate::ffmpeg_wrapper::{FFmpegCommand, VideoInfo, get_video_info};

/// Runs FFmpeg commands and probes media files.
pub trait Runner {
    /// Run one command to completion. `label` describes the step for progress output.
    fn run(&self, cmd: &FFmpegCommand, label: &str) -> Result<()>;

    fn probe(&self, path: &Path) -> Result<VideoInfo>;
}

/// Runs the real `ffmpeg`/`ffprobe` binaries.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    show_progress: bool,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw a terminal progress bar for every invocation.
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }
}

fn progress_bar(label: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(label.to_string());
    pb
}

impl Runner for FfmpegRunner {
    fn run(&self, cmd: &FFmpegCommand, label: &str) -> Result<()> {
        if !self.show_progress {
            let label = label.to_string();
            return cmd.execute(move |progress, _| {
                log::debug!("{}: {:.0}%", label, progress);
            });
        }

        let pb = progress_bar(label);
        let pb_clone = pb.clone();
        let label_owned = label.to_string();
        let result = cmd.execute(move |progress, _message| {
            pb_clone.set_position(progress as u64);
            pb_clone.set_message(label_owned.clone());
        });

        match &result {
            Ok(()) => pb.finish_with_message(format!("{label}: done")),
            Err(_) => pb.abandon_with_message(format!("{label}: failed")),
        }
        result
    }

    fn probe(&self, path: &Path) -> Result<VideoInfo> {
        get_video_info(path)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::RefCell;
    use std::path::PathBuf;

    /// Records every command and creates its output file instead of running FFmpeg.
    pub struct RecordingRunner {
        pub info: VideoInfo,
        pub calls: RefCell<Vec<(String, Vec<String>)>>,
        pub fail_on: Option<String>,
    }

    impl RecordingRunner {
        pub fn new() -> Self {
            Self {
                info: VideoInfo {
                    duration: 8.0,
                    width: 1920,
                    height: 1080,
                    fps: 30.0,
                    has_audio: true,
                },
                calls: RefCell::new(Vec::new()),
                fail_on: None,
            }
        }

        pub fn labels(&self) -> Vec<String> {
            self.calls.borrow().iter().map(|(l, _)| l.clone()).collect()
        }

        pub fn outputs(&self) -> Vec<PathBuf> {
            self.calls
                .borrow()
                .iter()
                .map(|(_, args)| PathBuf::from(args.last().cloned().unwrap_or_default()))
                .collect()
        }
    }

    impl Runner for RecordingRunner {
        fn run(&self, cmd: &FFmpegCommand, label: &str) -> Result<()> {
            self.calls
                .borrow_mut()
                .push((label.to_string(), cmd.args()));
            if self.fail_on.as_deref() == Some(label) {
                anyhow::bail!("simulated failure in {label}");
            }
            std::fs::write(cmd.output(), b"fake media")?;
            Ok(())
        }

        fn probe(&self, _path: &Path) -> Result<VideoInfo> {
            Ok(self.info.clone())
        }
    }
}
