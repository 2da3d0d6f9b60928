use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::sync::mpsc;
use std::thread;

use crate::error::ToolError;
use crate::geometry::CropRect;

pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";

/// Lines of stderr kept for the error message when FFmpeg fails.
const STDERR_TAIL_LINES: usize = 12;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration: (\d{2}):(\d{2}):(\d{2})\.(\d{2})").expect("duration regex")
});
static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time=(\d{2}):(\d{2}):(\d{2})\.(\d{2})").expect("time regex")
});
static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ffmpeg version (\S+)").expect("version regex"));

#[derive(Debug, Clone)]
struct Input {
    path: PathBuf,
    options: Vec<String>,
}

/// FFmpeg command builder with fluent interface
///
/// Input options (`seek`, `loop_input`, `concat_list`) apply to the most
/// recently added input.
#[derive(Debug, Clone)]
pub struct FFmpegCommand {
    inputs: Vec<Input>,
    output: PathBuf,
    video_filters: Vec<String>,
    audio_filters: Vec<String>,
    filter_graph: Vec<String>,
    maps: Vec<String>,
    video_codec: Option<String>,
    audio_codec: Option<String>,
    quality: Option<u8>,
    preset: Option<String>,
    duration: Option<f64>,
    fps: Option<u32>,
    frames: Option<u32>,
    size: Option<(u32, u32)>,
    pixel_format: Option<String>,
    no_audio: bool,
    overwrite: bool,
    extra_args: Vec<String>,
}

fn format_seconds(secs: f64) -> String {
    format!("{:.3}", secs)
}

impl FFmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self::to(output).input(input)
    }

    /// Start a command with no inputs yet; add them with [`FFmpegCommand::input`].
    pub fn to(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            video_filters: Vec::new(),
            audio_filters: Vec::new(),
            filter_graph: Vec::new(),
            maps: Vec::new(),
            video_codec: None,
            audio_codec: None,
            quality: None,
            preset: None,
            duration: None,
            fps: None,
            frames: None,
            size: None,
            pixel_format: None,
            no_audio: false,
            overwrite: false,
            extra_args: Vec::new(),
        }
    }

    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.inputs.push(Input {
            path: path.as_ref().to_path_buf(),
            options: Vec::new(),
        });
        self
    }

    fn input_options(mut self, opts: &[&str]) -> Self {
        if let Some(last) = self.inputs.last_mut() {
            last.options.extend(opts.iter().map(|s| s.to_string()));
        }
        self
    }

    /// Seek the last input to `secs` before decoding (`-ss` as input option)
    pub fn seek(self, secs: f64) -> Self {
        let ts = format_seconds(secs);
        self.input_options(&["-ss", &ts])
    }

    /// Loop a still image input
    pub fn loop_input(self) -> Self {
        self.input_options(&["-loop", "1"])
    }

    /// Read the last input as a concat demuxer list
    pub fn concat_list(self) -> Self {
        self.input_options(&["-f", "concat", "-safe", "0"])
    }

    /// Limit output duration (`-t`)
    pub fn duration(mut self, secs: f64) -> Self {
        self.duration = Some(secs);
        self
    }

    /// Set output frame rate
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Stop after writing `count` video frames
    pub fn frames(mut self, count: u32) -> Self {
        self.frames = Some(count);
        self
    }

    /// Set output frame size
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.size = Some((width, height));
        self
    }

    /// Set video codec
    pub fn video_codec(mut self, codec: &str) -> Self {
        self.video_codec = Some(codec.to_string());
        self
    }

    /// Set audio codec
    pub fn audio_codec(mut self, codec: &str) -> Self {
        self.audio_codec = Some(codec.to_string());
        self
    }

    /// Copy all streams without re-encoding
    pub fn stream_copy(self) -> Self {
        self.custom_args(["-c", "copy"])
    }

    /// Set quality (CRF value, 0-51 for x264/x265)
    pub fn quality(mut self, crf: u8) -> Self {
        self.quality = Some(crf);
        self
    }

    /// Set encoding preset (ultrafast, veryfast, medium, slow, veryslow)
    pub fn preset(mut self, preset: &str) -> Self {
        self.preset = Some(preset.to_string());
        self
    }

    pub fn pixel_format(mut self, format: &str) -> Self {
        self.pixel_format = Some(format.to_string());
        self
    }

    /// Drop audio from the output
    pub fn no_audio(mut self) -> Self {
        self.no_audio = true;
        self
    }

    /// Enable overwrite without asking
    pub fn overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }

    /// Add a video filter
    pub fn video_filter(mut self, filter: &str) -> Self {
        self.video_filters.push(filter.to_string());
        self
    }

    /// Add a labelled filter graph chain. Outputs must be selected with [`FFmpegCommand::map`].
    pub fn complex_filter(mut self, chain: &str) -> Self {
        self.filter_graph.push(chain.to_string());
        self
    }

    /// Select a stream or graph label for the output
    pub fn map(mut self, spec: &str) -> Self {
        self.maps.push(spec.to_string());
        self
    }

    /// Set video speed (affects both video and audio)
    /// If has_audio is false, only video speed is adjusted
    pub fn speed(mut self, multiplier: f64, has_audio: bool) -> Self {
        if multiplier != 1.0 {
            self.video_filters
                .push(format!("setpts={:.4}*PTS", 1.0 / multiplier));

            // atempo only accepts 0.5..=2.0, so chain it for larger factors
            if has_audio {
                let mut current = multiplier;
                while current > 2.0 {
                    self.audio_filters.push("atempo=2.0".to_string());
                    current /= 2.0;
                }
                while current < 0.5 {
                    self.audio_filters.push("atempo=0.5".to_string());
                    current *= 2.0;
                }
                if current != 1.0 {
                    self.audio_filters.push(format!("atempo={:.4}", current));
                }
            }
        }
        self
    }

    /// Play the clip backwards
    pub fn reverse(mut self, has_audio: bool) -> Self {
        self.video_filters.push("reverse".to_string());
        if has_audio {
            self.audio_filters.push("areverse".to_string());
        }
        self
    }

    /// Scale video
    pub fn scale(mut self, width: i32, height: i32) -> Self {
        self.video_filters
            .push(format!("scale={}:{}", width, height));
        self
    }

    /// Crop video
    pub fn crop(mut self, rect: CropRect) -> Self {
        self.video_filters.push(rect.to_filter());
        self
    }

    /// Add custom FFmpeg arguments
    pub fn custom_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Full argument vector, without the program name
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        for input in &self.inputs {
            args.extend(input.options.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().into_owned());
        }

        // Simple per-stream filters become a graph on the first input
        let mut graph = self.filter_graph.clone();
        let has_video_filters = !self.video_filters.is_empty();
        let has_audio_filters = !self.audio_filters.is_empty() && !self.no_audio;

        if has_video_filters {
            graph.push(format!("[0:v]{}[v]", self.video_filters.join(",")));
        }
        if has_audio_filters {
            graph.push(format!("[0:a]{}[a]", self.audio_filters.join(",")));
        }

        if !graph.is_empty() {
            args.push("-filter_complex".to_string());
            args.push(graph.join("; "));
        }

        if !self.maps.is_empty() {
            for map in &self.maps {
                args.push("-map".to_string());
                args.push(map.clone());
            }
        } else if has_video_filters || has_audio_filters {
            args.push("-map".to_string());
            args.push(if has_video_filters { "[v]" } else { "0:v?" }.to_string());
            if !self.no_audio {
                args.push("-map".to_string());
                args.push(if has_audio_filters { "[a]" } else { "0:a?" }.to_string());
            }
        }

        if self.no_audio {
            args.push("-an".to_string());
        }

        if let Some(secs) = self.duration {
            args.push("-t".to_string());
            args.push(format_seconds(secs));
        }

        if let Some(ref codec) = self.video_codec {
            args.push("-c:v".to_string());
            args.push(codec.clone());
        }

        if let Some(ref codec) = self.audio_codec {
            args.push("-c:a".to_string());
            args.push(codec.clone());
        }

        if let Some(crf) = self.quality {
            args.push("-crf".to_string());
            args.push(crf.to_string());
        }

        if let Some(ref preset) = self.preset {
            args.push("-preset".to_string());
            args.push(preset.clone());
        }

        if let Some(ref format) = self.pixel_format {
            args.push("-pix_fmt".to_string());
            args.push(format.clone());
        }

        if let Some(fps) = self.fps {
            args.push("-r".to_string());
            args.push(fps.to_string());
        }

        if let Some((w, h)) = self.size {
            args.push("-s".to_string());
            args.push(format!("{}x{}", w, h));
        }

        if let Some(frames) = self.frames {
            args.push("-frames:v".to_string());
            args.push(frames.to_string());
        }

        args.extend(self.extra_args.iter().cloned());

        args.push(self.output.to_string_lossy().into_owned());
        args
    }

    /// Build the FFmpeg command
    pub fn build(&self) -> Command {
        let mut cmd = Command::new(FFMPEG);
        cmd.args(self.args());
        cmd
    }

    /// Execute the FFmpeg command with progress tracking
    pub fn execute<F>(&self, progress_callback: F) -> Result<()>
    where
        F: Fn(f64, String) + Send + 'static,
    {
        let mut cmd = self.build();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        log::info!("Executing FFmpeg for {:?}", self.output);
        log::debug!("Raw command: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|source| ToolError::NotFound {
            tool: FFMPEG,
            source,
        })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to capture stderr"))?;

        let (tx, rx) = mpsc::channel();

        // Parse progress from stderr on a separate thread
        let reader_thread = thread::spawn(move || {
            let reader = BufReader::new(stderr);
            let mut total_duration: Option<f64> = None;
            let mut all_output = String::new();

            for line in reader.lines().map_while(Result::ok) {
                all_output.push_str(&line);
                all_output.push('\n');

                if total_duration.is_none()
                    && let Some(caps) = DURATION_RE.captures(&line)
                {
                    total_duration = Some(captured_seconds(&caps));
                }

                if let Some(caps) = TIME_RE.captures(&line)
                    && let Some(duration) = total_duration
                    && duration > 0.0
                {
                    let progress = (captured_seconds(&caps) / duration * 100.0).min(100.0);
                    let _ = tx.send(progress);
                }
            }
            all_output
        });

        let progress_thread = thread::spawn(move || {
            while let Ok(progress) = rx.recv() {
                if progress > 0.0 {
                    progress_callback(progress, format!("Processing: {:.1}%", progress));
                }
            }
        });

        let status = child.wait().context("Failed to wait for FFmpeg process")?;

        let all_output = reader_thread
            .join()
            .unwrap_or_else(|_| String::from("Failed to get output"));
        let _ = progress_thread.join();

        if !status.success() {
            log::error!("FFmpeg failed with output:\n{}", all_output);
            return Err(ToolError::Failed {
                tool: FFMPEG,
                code: status.code(),
                tail: stderr_tail(&all_output),
            }
            .into());
        }

        Ok(())
    }
}

fn captured_seconds(caps: &regex::Captures<'_>) -> f64 {
    let hours: f64 = caps[1].parse().unwrap_or(0.0);
    let minutes: f64 = caps[2].parse().unwrap_or(0.0);
    let seconds: f64 = caps[3].parse().unwrap_or(0.0);
    let centis: f64 = caps[4].parse().unwrap_or(0.0);
    hours * 3600.0 + minutes * 60.0 + seconds + centis / 100.0
}

fn stderr_tail(output: &str) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Check if FFmpeg is available and return version info
pub fn check_ffmpeg() -> Result<String> {
    let output = Command::new(FFMPEG)
        .arg("-version")
        .output()
        .map_err(|source| ToolError::NotFound {
            tool: FFMPEG,
            source,
        })?;

    let version = String::from_utf8_lossy(&output.stdout);
    Ok(parse_version(&version))
}

fn parse_version(banner: &str) -> String {
    VERSION_RE
        .captures(banner)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Get video metadata using ffprobe
pub fn get_video_info(path: impl AsRef<Path>) -> Result<VideoInfo> {
    let path = path.as_ref();
    let output = Command::new(FFPROBE)
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .output()
        .map_err(|source| ToolError::NotFound {
            tool: FFPROBE,
            source,
        })?;

    if !output.status.success() {
        return Err(ToolError::Failed {
            tool: FFPROBE,
            code: output.status.code(),
            tail: stderr_tail(&String::from_utf8_lossy(&output.stderr)),
        }
        .into());
    }

    parse_probe_json(&String::from_utf8_lossy(&output.stdout))
        .with_context(|| format!("Failed to parse ffprobe output for {:?}", path))
}

fn parse_probe_json(json: &str) -> Result<VideoInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)?;

    let duration = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse().ok())
        .unwrap_or(0.0);

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    let fps = video
        .and_then(|s| s.r_frame_rate.as_deref())
        .and_then(|rate| {
            let (num, den) = rate.split_once('/')?;
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den != 0.0).then(|| num / den)
        })
        .unwrap_or(0.0);

    Ok(VideoInfo {
        duration,
        width: video.and_then(|s| s.width).unwrap_or(0),
        height: video.and_then(|s| s.height).unwrap_or(0),
        fps,
        has_audio: probe
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio")),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub has_audio: bool,
}
