//! Individual pipeline operations.
//!
//! Each step produces exactly one file. When that file already exists the
//! step logs a warning and returns its path without invoking FFmpeg, which is
//! what makes an interrupted run resumable.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::error::ToolError;
use crate::ffmpeg_wrapper::FFmpegCommand;
use crate::geometry::CropRect;
use crate::runner::Runner;

/// Frame rate of trimmed and sped-up clips.
pub const CLIP_FPS: u32 = 30;
/// Frame rate of still-image clips.
pub const STILL_FPS: u32 = 25;
pub const SCREENSHOT_SIZE: (u32, u32) = (1280, 720);
/// Distance from the end used when grabbing the last frame.
const LAST_FRAME_MARGIN: f64 = 0.1;
pub const FINAL_DIR: &str = "final";
pub const CONCAT_LIST: &str = "concat_list.txt";

/// Overlay fades in over [0, 1] s, out over [2, 3] s and is shown for [0, 4] s.
const OVERLAY_GRAPH: &[&str] = &[
    "[1:v]format=yuva420p,fade=t=in:st=0:d=1:alpha=1,fade=t=out:st=2:d=1:alpha=1[ovl]",
    "[0:v][ovl]overlay=x=(W-w)/2:y=H*0.25:enable='between(t,0,4)'[vout]",
];

/// Step executor bound to one output folder.
pub struct Steps<'a> {
    runner: &'a dyn Runner,
    output_folder: PathBuf,
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

fn already_exists(path: &Path) -> bool {
    if path.exists() {
        log::warn!("Skipping - already exists: {:?}", path);
        true
    } else {
        false
    }
}

/// Line for the concat demuxer list, with single quotes escaped.
pub fn concat_entry(path: &Path) -> String {
    format!("file '{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

impl<'a> Steps<'a> {
    pub fn new(runner: &'a dyn Runner, output_folder: impl AsRef<Path>) -> Self {
        Self {
            runner,
            output_folder: output_folder.as_ref().to_path_buf(),
        }
    }

    pub fn final_folder(&self) -> PathBuf {
        self.output_folder.join(FINAL_DIR)
    }

    /// `<output>/<name_prefix><input extension>`
    pub fn named(&self, input: &Path, name_prefix: &str) -> PathBuf {
        self.output_folder
            .join(format!("{}{}", name_prefix, extension_of(input)))
    }

    /// `<output>/<name>`
    pub fn file(&self, name: &str) -> PathBuf {
        self.output_folder.join(name)
    }

    /// Cut `duration` seconds starting at `start`, re-encoded at 30 fps.
    pub fn trim(&self, input: &Path, output: &Path, start: f64, duration: f64) -> Result<PathBuf> {
        if already_exists(output) {
            return Ok(output.to_path_buf());
        }
        let cmd = FFmpegCommand::new(input, output)
            .seek(start)
            .duration(duration)
            .fps(CLIP_FPS)
            .overwrite();
        self.runner.run(&cmd, "Trimming")?;
        Ok(output.to_path_buf())
    }

    /// Crop to the centred 9:16 window of a `width`x`height` source.
    pub fn crop_vertical(
        &self,
        input: &Path,
        output: &Path,
        width: u32,
        height: u32,
    ) -> Result<PathBuf> {
        if already_exists(output) {
            return Ok(output.to_path_buf());
        }
        let cmd = FFmpegCommand::new(input, output)
            .crop(CropRect::centered_vertical(width, height))
            .overwrite();
        self.runner.run(&cmd, "Vertical crop")?;
        Ok(output.to_path_buf())
    }

    pub fn trim_and_crop(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        duration: f64,
        (width, height): (u32, u32),
    ) -> Result<PathBuf> {
        if already_exists(output) {
            return Ok(output.to_path_buf());
        }
        let cmd = FFmpegCommand::new(input, output)
            .seek(start)
            .duration(duration)
            .crop(CropRect::centered_vertical(width, height))
            .overwrite();
        self.runner.run(&cmd, "Trim + vertical crop")?;
        Ok(output.to_path_buf())
    }

    pub fn speed_up(&self, input: &Path, output: &Path, factor: f64) -> Result<PathBuf> {
        if already_exists(output) {
            return Ok(output.to_path_buf());
        }
        let info = self.runner.probe(input)?;
        let cmd = FFmpegCommand::new(input, output)
            .speed(factor, info.has_audio)
            .fps(CLIP_FPS)
            .overwrite();
        self.runner.run(&cmd, &format!("Speeding up x{factor}"))?;
        Ok(output.to_path_buf())
    }

    /// Reverse video and audio into `<stem>__reverted<ext>` next to the input.
    pub fn reverse(&self, input: &Path) -> Result<PathBuf> {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let output = input.with_file_name(format!("{}__reverted{}", stem, extension_of(input)));
        if already_exists(&output) {
            return Ok(output);
        }
        let info = self.runner.probe(input)?;
        let cmd = FFmpegCommand::new(input, &output)
            .reverse(info.has_audio)
            .overwrite();
        self.runner.run(&cmd, "Reverting")?;
        log::info!("Reverted video saved to: {:?}", output);
        Ok(output)
    }

    fn grab_frame(
        &self,
        input: &Path,
        output: &Path,
        timestamp: f64,
        size: Option<(u32, u32)>,
    ) -> Result<PathBuf> {
        if already_exists(output) {
            return Ok(output.to_path_buf());
        }
        let mut cmd = FFmpegCommand::new(input, output).seek(timestamp);
        if let Some((w, h)) = size {
            cmd = cmd.scale(w as i32, h as i32);
        }
        let cmd = cmd.frames(1).no_audio().overwrite();
        self.runner.run(&cmd, "Screenshot")?;
        Ok(output.to_path_buf())
    }

    /// Grab one 1280x720 frame at `timestamp` seconds.
    pub fn screenshot(&self, input: &Path, output: &Path, timestamp: f64) -> Result<PathBuf> {
        self.grab_frame(input, output, timestamp, Some(SCREENSHOT_SIZE))
    }

    /// Grab one frame at the source resolution, for images cropped afterwards.
    pub fn full_frame(&self, input: &Path, output: &Path, timestamp: f64) -> Result<PathBuf> {
        self.grab_frame(input, output, timestamp, None)
    }

    /// Screenshot just before the end of the clip.
    pub fn screenshot_last_frame(&self, input: &Path, output: &Path) -> Result<PathBuf> {
        if already_exists(output) {
            return Ok(output.to_path_buf());
        }
        let info = self.runner.probe(input)?;
        if info.duration <= 0.0 || !info.duration.is_finite() {
            return Err(ToolError::BadDuration(input.display().to_string()).into());
        }
        let timestamp = (info.duration - LAST_FRAME_MARGIN).max(0.0);
        self.screenshot(input, output, timestamp)
    }

    /// Crop an image to the vertical window, replacing it.
    pub fn crop_still(&self, image: &Path, width: u32, height: u32) -> Result<PathBuf> {
        let stem = image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let scratch =
            image.with_file_name(format!("{}.vertical{}", stem, extension_of(image)));
        let cmd = FFmpegCommand::new(image, &scratch)
            .crop(CropRect::centered_vertical(width, height))
            .no_audio()
            .overwrite();
        self.runner.run(&cmd, "Cropping screenshot")?;
        std::fs::rename(&scratch, image)
            .with_context(|| format!("Failed to replace {:?}", image))?;
        Ok(image.to_path_buf())
    }

    /// Turn an image into a silent `seconds`-long clip.
    pub fn still_to_video(
        &self,
        image: &Path,
        output: &Path,
        seconds: f64,
        (width, height): (u32, u32),
    ) -> Result<PathBuf> {
        if already_exists(output) {
            return Ok(output.to_path_buf());
        }
        let cmd = FFmpegCommand::new(image, output)
            .loop_input()
            .duration(seconds)
            .video_codec("libx264")
            .pixel_format("yuv420p")
            .fps(STILL_FPS)
            .size(width, height)
            .overwrite();
        self.runner.run(&cmd, "Still to video")?;
        Ok(output.to_path_buf())
    }

    /// Join clips with the concat demuxer, without re-encoding.
    pub fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<PathBuf> {
        if inputs.is_empty() {
            anyhow::bail!("No videos provided to merge.");
        }
        if already_exists(output) {
            return Ok(output.to_path_buf());
        }

        // The demuxer resolves relative entries against the list file, so use absolute paths
        let mut lines = Vec::with_capacity(inputs.len());
        for input in inputs {
            let absolute = std::fs::canonicalize(input)
                .with_context(|| format!("Cannot merge missing clip {:?}", input))?;
            lines.push(concat_entry(&absolute));
        }

        let list_path = self.file(CONCAT_LIST);
        std::fs::write(&list_path, lines.join("\n"))
            .with_context(|| format!("Failed to write {:?}", list_path))?;

        let cmd = FFmpegCommand::new(&list_path, output)
            .concat_list()
            .stream_copy()
            .overwrite();
        self.runner.run(&cmd, "Merging")?;
        log::info!("Merged video saved to: {:?}", output);
        Ok(output.to_path_buf())
    }

    /// Fade a second clip in over the top quarter of the first.
    pub fn overlay(&self, base: &Path, overlay: &Path, output: &Path) -> Result<PathBuf> {
        if already_exists(output) {
            return Ok(output.to_path_buf());
        }
        let mut cmd = FFmpegCommand::to(output).input(base).input(overlay);
        for chain in OVERLAY_GRAPH {
            cmd = cmd.complex_filter(chain);
        }
        let cmd = cmd
            .map("[vout]")
            .map("0:a?")
            .video_codec("libx264")
            .pixel_format("yuv420p")
            .quality(23)
            .preset("veryfast")
            .overwrite();
        self.runner.run(&cmd, "Overlaying")?;
        Ok(output.to_path_buf())
    }

    /// Scale to one sixth and add a 10 px red border.
    pub fn shrink_with_border(&self, input: &Path, output: &Path) -> Result<PathBuf> {
        if already_exists(output) {
            return Ok(output.to_path_buf());
        }
        let cmd = FFmpegCommand::new(input, output)
            .video_filter("scale=iw/6:ih/6")
            .video_filter("pad=iw+20:ih+20:10:10:red")
            .overwrite();
        self.runner.run(&cmd, "Resizing + border")?;
        Ok(output.to_path_buf())
    }

    /// Replace the soundtrack with `music`, stopping at the shorter stream.
    pub fn add_music(&self, input: &Path, music: &Path, output: &Path) -> Result<PathBuf> {
        if already_exists(output) {
            return Ok(output.to_path_buf());
        }
        let cmd = FFmpegCommand::to(output)
            .input(input)
            .input(music)
            .map("0:v")
            .map("1:a")
            .video_codec("libx264")
            .audio_codec("aac")
            .quality(23)
            .preset("veryfast")
            .custom_args(["-shortest"])
            .overwrite();
        self.runner.run(&cmd, "Adding music")?;
        Ok(output.to_path_buf())
    }

    /// Copy finished files into `<output>/final/`.
    pub fn publish(&self, files: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let final_folder = self.final_folder();
        std::fs::create_dir_all(&final_folder)
            .with_context(|| format!("Failed to create {:?}", final_folder))?;

        let mut published = Vec::with_capacity(files.len());
        for file in files {
            let name = file
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Not a file: {:?}", file))?;
            let destination = final_folder.join(name);
            log::info!("Copying {:?} -> {:?}", file, destination);
            std::fs::copy(file, &destination)
                .with_context(|| format!("Failed to copy {:?}", file))?;
            published.push(destination);
        }
        Ok(published)
    }
}

/// Delete processed sources. Failures are logged and do not stop the run.
pub fn remove_sources(sources: &[PathBuf]) -> usize {
    let mut removed = 0;
    for source in sources {
        match std::fs::remove_file(source) {
            Ok(()) => {
                log::info!("Deleted source file: {:?}", source);
                removed += 1;
            }
            Err(e) => log::error!("Error deleting source file {:?}: {}", source, e),
        }
    }
    removed
}
