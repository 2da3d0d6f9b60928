use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::RequestError;
use crate::geometry::CropRect;
use crate::modes::Mode;
use crate::request::{TrimData, TrimRequest};
use crate::runner::Runner;
use crate::steps::{self, Steps, concat_entry};

/// Written into the output folder after every run.
pub const STATUS_FILE: &str = "run-status.json";
pub const VERTICAL_LIST: &str = "verticalVideosList.txt";

/// Length of the still intro in [`Mode::Intro`].
const INTRO_SECONDS: f64 = 2.0;
/// Length of the picture-in-picture preview taken from the start of the source.
const PREVIEW_SECONDS: f64 = 3.0;
/// Shortened so the base cut never runs into the next keyframe.
const ZOOM_OUT_TRIM_MARGIN: f64 = 0.1;
const ZOOM_OUT_SCREENSHOT_AT: f64 = 1.0;
/// Shortest base cut FFmpeg can still express with millisecond precision.
const MIN_CUT: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    Produced,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoReport {
    pub filename: String,
    pub outcome: Outcome,
    pub outputs: Vec<PathBuf>,
}

/// Summary of one pipeline run, serialized as the run status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub title: String,
    pub mode: Mode,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub videos: Vec<VideoReport>,
    pub merged: Option<PathBuf>,
    pub published: Vec<PathBuf>,
    pub removed_sources: usize,
    pub error: Option<String>,
}

impl RunReport {
    pub fn started(title: &str, mode: Mode) -> Self {
        Self {
            title: title.to_string(),
            mode,
            state: RunState::Running,
            started_at: Utc::now(),
            finished_at: None,
            videos: Vec::new(),
            merged: None,
            published: Vec::new(),
            removed_sources: 0,
            error: None,
        }
    }

    fn record(&mut self, filename: &str, outcome: Outcome, outputs: Vec<PathBuf>) {
        self.videos.push(VideoReport {
            filename: filename.to_string(),
            outcome,
            outputs,
        });
    }
}

/// Files collected across records for the merge and publish phase.
#[derive(Default)]
struct Collected {
    horizontal: Vec<PathBuf>,
    vertical: Vec<PathBuf>,
    stills: Vec<PathBuf>,
}

pub struct Pipeline {
    mode: Mode,
    input_folder: PathBuf,
    output_folder: PathBuf,
    produce_vertical: bool,
    produce_screenshots: bool,
    remove_source_files: bool,
    hashtags: String,
    music: Option<PathBuf>,
    picture_in_picture: bool,
}

impl Pipeline {
    pub fn new(mode: Mode, input_folder: impl AsRef<Path>, output_folder: impl AsRef<Path>) -> Self {
        Self {
            mode,
            input_folder: input_folder.as_ref().to_path_buf(),
            output_folder: output_folder.as_ref().to_path_buf(),
            produce_vertical: true,
            produce_screenshots: true,
            remove_source_files: false,
            hashtags: String::new(),
            music: None,
            picture_in_picture: false,
        }
    }

    pub fn produce_vertical(mut self, enabled: bool) -> Self {
        self.produce_vertical = enabled;
        self
    }

    pub fn produce_screenshots(mut self, enabled: bool) -> Self {
        self.produce_screenshots = enabled;
        self
    }

    pub fn remove_source_files(mut self, enabled: bool) -> Self {
        self.remove_source_files = enabled;
        self
    }

    /// Tags appended to vertical file names, e.g. `#birds #nature`
    pub fn hashtags(mut self, tags: &str) -> Self {
        self.hashtags = tags.trim().to_string();
        self
    }

    /// Replace the soundtrack of every vertical clip with this file
    pub fn music(mut self, path: impl AsRef<Path>) -> Self {
        self.music = Some(path.as_ref().to_path_buf());
        self
    }

    /// Zoom-out only: overlay a shrunken preview of the source start on the base cut
    pub fn picture_in_picture(mut self, enabled: bool) -> Self {
        self.picture_in_picture = enabled;
        self
    }

    pub fn status_path(&self) -> PathBuf {
        self.output_folder.join(STATUS_FILE)
    }

    /// Run the whole descriptor. Errors are logged and recorded in the report
    /// rather than returned; the report is also written to the status file.
    pub fn run(&self, request: &TrimRequest, runner: &dyn Runner) -> RunReport {
        let mut report = RunReport::started(&request.all_videos_title, self.mode);
        log::info!(
            "Starting {} run for \"{}\" ({} videos)",
            self.mode,
            request.all_videos_title,
            request.videos.len()
        );

        match self.process(request, runner, &mut report) {
            Ok(()) => {
                report.state = RunState::Completed;
                log::info!("All videos processed.");
            }
            Err(e) => {
                log::error!("Error processing trim data: {:#}", e);
                report.state = RunState::Failed;
                report.error = Some(format!("{:#}", e));
            }
        }
        report.finished_at = Some(Utc::now());

        if let Err(e) = write_status(&self.status_path(), &report) {
            log::error!("Failed to write run status: {:#}", e);
        }
        report
    }

    /// Descriptor checks plus the requirements of the selected mode.
    pub fn validate(&self, request: &TrimRequest) -> Result<(), RequestError> {
        request.validate()?;
        if self.mode.requires_point_in_time()
            && let Some(data) = request.videos.iter().find(|d| d.point_in_time.is_none())
        {
            return Err(RequestError::MissingPointInTime {
                filename: data.filename.clone(),
            });
        }
        if self.mode == Mode::ZoomOut
            && let Some(data) = request
                .videos
                .iter()
                .find(|d| d.segment_duration() - ZOOM_OUT_TRIM_MARGIN < MIN_CUT)
        {
            return Err(RequestError::SegmentTooShort {
                filename: data.filename.clone(),
                duration: data.segment_duration(),
                minimum: ZOOM_OUT_TRIM_MARGIN,
            });
        }
        Ok(())
    }

    fn process(
        &self,
        request: &TrimRequest,
        runner: &dyn Runner,
        report: &mut RunReport,
    ) -> Result<()> {
        self.validate(request)?;

        std::fs::create_dir_all(&self.output_folder)
            .with_context(|| format!("Failed to create {:?}", self.output_folder))?;

        let steps = Steps::new(runner, &self.output_folder);
        let mut collected = Collected::default();
        let total = request.videos.len();

        for (index, data) in request.videos.iter().enumerate() {
            log::info!("[{}/{}] Processing: {}", index + 1, total, data.filename);
            let source = self.input_folder.join(&data.filename);

            let result = match self.mode {
                Mode::Trim => self.trim_only(&steps, &source, data),
                Mode::Vertical => self.vertical(&steps, &source, data),
                Mode::Intro => self.with_intro(&steps, &source, data),
                Mode::Horizontal => self.horizontal(&steps, &source, data, &mut collected),
                Mode::ZoomIn => self.zoom_in(&steps, &source, data, &mut collected),
                Mode::ZoomOut => self.zoom_out(&steps, &source, data, index + 1, &mut collected),
            };
            match result {
                Ok((outcome, outputs)) => report.record(&data.filename, outcome, outputs),
                Err(e) => {
                    report.record(&data.filename, Outcome::Failed, Vec::new());
                    return Err(e);
                }
            }
        }

        self.finish(&steps, request, &collected, report)?;

        if self.remove_source_files {
            let sources: Vec<PathBuf> = request
                .videos
                .iter()
                .map(|d| self.input_folder.join(&d.filename))
                .collect();
            report.removed_sources = steps::remove_sources(&sources);
        }
        Ok(())
    }

    fn vertical_name(&self, stem: &str) -> String {
        if self.hashtags.is_empty() {
            stem.to_string()
        } else {
            format!("{} {}", stem, self.hashtags)
        }
    }

    fn maybe_music(&self, steps: &Steps<'_>, vertical: PathBuf) -> Result<PathBuf> {
        match &self.music {
            Some(music) => {
                let stem = vertical
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let output = steps.named(&vertical, &format!("{stem} ___MUSIC"));
                steps.add_music(&vertical, music, &output)
            }
            None => Ok(vertical),
        }
    }

    fn trim_only(
        &self,
        steps: &Steps<'_>,
        source: &Path,
        data: &TrimData,
    ) -> Result<(Outcome, Vec<PathBuf>)> {
        let output = steps.file(&format!("{}.mp4", data.base_name()));
        if output.exists() {
            log::warn!("Skipping video - already exists: {:?}", output);
            return Ok((Outcome::Skipped, vec![output]));
        }
        require_source(source)?;
        steps.trim(source, &output, data.trim_start, data.segment_duration())?;
        log::info!("Video saved: {:?}", output);
        Ok((Outcome::Produced, vec![output]))
    }

    fn vertical(
        &self,
        steps: &Steps<'_>,
        source: &Path,
        data: &TrimData,
    ) -> Result<(Outcome, Vec<PathBuf>)> {
        let base = data.base_name();
        let clip = steps.file(&format!("{}.mp4", self.vertical_name(&base)));
        let still = steps.file(&format!("{base}.jpg"));

        if !clip.exists() || (self.produce_screenshots && !still.exists()) {
            require_source(source)?;
        }

        let mut outcome = Outcome::Skipped;
        if !clip.exists() {
            outcome = Outcome::Produced;
            steps.trim_and_crop(
                source,
                &clip,
                data.trim_start,
                data.segment_duration(),
                (data.video_width, data.video_height),
            )?;
            log::info!("Created vertical video: {:?}", clip);
        }
        let clip = self.maybe_music(steps, clip)?;

        let mut outputs = vec![clip];
        if self.produce_screenshots {
            if !still.exists() {
                outcome = Outcome::Produced;
            }
            steps.screenshot(source, &still, data.midpoint())?;
            outputs.push(still);
        }
        Ok((outcome, outputs))
    }

    fn with_intro(
        &self,
        steps: &Steps<'_>,
        source: &Path,
        data: &TrimData,
    ) -> Result<(Outcome, Vec<PathBuf>)> {
        let base = data.base_name();
        let clip = steps.file(&format!("VERTICAL {base}.mp4"));
        let still = steps.file(&format!("{base}_screenshot.jpg"));
        let still_clip = steps.file(&format!("{base}_screenshot_video.mp4"));
        let merged = steps.file(&format!("WITH_INTRO {}.mp4", self.vertical_name(&base)));

        if merged.exists() {
            log::warn!("Skipping merge - already exists: {:?}", merged);
            return Ok((Outcome::Skipped, vec![merged]));
        }
        require_source(source)?;

        steps.trim_and_crop(
            source,
            &clip,
            data.trim_start,
            data.segment_duration(),
            (data.video_width, data.video_height),
        )?;

        if !still.exists() {
            steps.full_frame(source, &still, data.midpoint())?;
            steps.crop_still(&still, data.video_width, data.video_height)?;
        }

        let rect = CropRect::centered_vertical(data.video_width, data.video_height);
        steps.still_to_video(&still, &still_clip, INTRO_SECONDS, (rect.width, rect.height))?;
        steps.concat(&[still_clip, clip.clone()], &merged)?;
        log::info!("Merged video created: {:?}", merged);

        let merged = self.maybe_music(steps, merged)?;
        Ok((Outcome::Produced, vec![clip, still, merged]))
    }

    fn horizontal(
        &self,
        steps: &Steps<'_>,
        source: &Path,
        data: &TrimData,
        collected: &mut Collected,
    ) -> Result<(Outcome, Vec<PathBuf>)> {
        let base = data.base_name();
        let horizontal = steps.file(&format!("{base}_HORIZONTAL.mp4"));
        let vertical = steps.file(&format!("{}_VERTICAL.mp4", self.vertical_name(&base)));
        let still = steps.file(&format!("{base}.jpg"));

        let finished = horizontal.exists()
            && (!self.produce_vertical || vertical.exists())
            && (!self.produce_screenshots || still.exists());
        if !finished {
            require_source(source)?;
        }

        steps.trim(source, &horizontal, data.trim_start, data.segment_duration())?;
        collected.horizontal.push(horizontal.clone());
        let mut outputs = vec![horizontal.clone()];

        if self.produce_vertical {
            steps.crop_vertical(&horizontal, &vertical, data.video_width, data.video_height)?;
            let vertical = self.maybe_music(steps, vertical)?;
            collected.vertical.push(vertical.clone());
            outputs.push(vertical);
        }

        if self.produce_screenshots {
            steps.screenshot(source, &still, data.midpoint())?;
            outputs.push(still);
        }

        let outcome = if finished {
            Outcome::Skipped
        } else {
            Outcome::Produced
        };
        Ok((outcome, outputs))
    }

    fn zoom_in(
        &self,
        steps: &Steps<'_>,
        source: &Path,
        data: &TrimData,
        collected: &mut Collected,
    ) -> Result<(Outcome, Vec<PathBuf>)> {
        let base = data.base_name();
        let point = data.point_in_time.ok_or_else(|| RequestError::MissingPointInTime {
            filename: data.filename.clone(),
        })?;

        let horizontal = steps.named(source, &format!("{base}_base"));
        let vertical = steps.named(source, &self.vertical_name(&base));
        let thumbnail = steps.file(&format!("{base}.jpg"));
        let last = if self.produce_vertical { &vertical } else { &horizontal };

        if last.exists() {
            log::warn!("Skipping video - already exists: {:?}", last);
            if horizontal.exists() {
                collected.horizontal.push(horizontal.clone());
            }
            return Ok((Outcome::Skipped, vec![last.clone()]));
        }
        require_source(source)?;

        let run_up = steps.trim(
            source,
            &steps.named(source, &format!("{base}_baseFirst")),
            data.trim_start,
            point - data.trim_start,
        )?;
        let run_up_fast = steps.speed_up(
            &run_up,
            &steps.named(source, &format!("{base}_baseFirst2xSpeeded")),
            2.0,
        )?;
        let rest = steps.trim(
            source,
            &steps.named(source, &format!("{base}_baseSecond")),
            point,
            data.trim_stop - point,
        )?;
        steps.concat(&[run_up_fast, rest], &horizontal)?;
        collected.horizontal.push(horizontal.clone());
        let mut outputs = vec![horizontal.clone()];

        if self.produce_vertical {
            steps.crop_vertical(&horizontal, &vertical, data.video_width, data.video_height)?;
            let vertical = self.maybe_music(steps, vertical)?;
            collected.vertical.push(vertical.clone());
            outputs.push(vertical);
        }

        if self.produce_screenshots {
            steps.screenshot_last_frame(&horizontal, &thumbnail)?;
            log::info!("Created screenshot: {:?}", thumbnail);
            collected.stills.push(thumbnail.clone());
            outputs.push(thumbnail);
        }

        Ok((Outcome::Produced, outputs))
    }

    fn zoom_out(
        &self,
        steps: &Steps<'_>,
        source: &Path,
        data: &TrimData,
        counter: usize,
        collected: &mut Collected,
    ) -> Result<(Outcome, Vec<PathBuf>)> {
        let base = data.base_name();
        let prefix = format!("{counter}_{base}");

        let horizontal = steps.named(source, &format!("{prefix}___FINAL___"));
        let vertical = steps.named(
            source,
            &format!("{} ___FINAL___VERTICAL", self.vertical_name(&prefix)),
        );
        let still = steps.file(&format!("{base}.jpg"));
        let last = if self.produce_vertical { &vertical } else { &horizontal };

        if last.exists() {
            log::warn!("Skipping video - already exists: {:?}", last);
            if horizontal.exists() {
                collected.horizontal.push(horizontal.clone());
            }
            return Ok((Outcome::Skipped, vec![last.clone()]));
        }
        require_source(source)?;

        let mut base_cut = steps.trim(
            source,
            &steps.named(source, &format!("{prefix}___BASE___")),
            data.trim_start,
            data.segment_duration() - ZOOM_OUT_TRIM_MARGIN,
        )?;

        if self.picture_in_picture {
            let preview = steps.trim(
                source,
                &steps.named(source, &format!("{prefix}___3SECONDS___")),
                0.0,
                PREVIEW_SECONDS,
            )?;
            let small = steps.shrink_with_border(
                &preview,
                &steps.named(source, &format!("{prefix}___3SECONDS_RESIZED___")),
            )?;
            base_cut = steps.overlay(
                &base_cut,
                &small,
                &steps.named(source, &format!("{prefix}___HORIZONTAL___")),
            )?;
        }

        let whole_fast = steps.speed_up(
            source,
            &steps.named(source, &format!("{prefix}___baseSpeededBy2")),
            2.0,
        )?;
        let rewind = steps.speed_up(
            &base_cut,
            &steps.named(source, &format!("{prefix}___baseSpeededBy6")),
            6.0,
        )?;
        let rewind = steps.reverse(&rewind)?;
        steps.concat(&[rewind, whole_fast], &horizontal)?;
        collected.horizontal.push(horizontal.clone());
        let mut outputs = vec![horizontal.clone()];

        if self.produce_vertical {
            steps.crop_vertical(&horizontal, &vertical, data.video_width, data.video_height)?;
            let vertical = self.maybe_music(steps, vertical)?;
            collected.vertical.push(vertical.clone());
            outputs.push(vertical);
        }

        if self.produce_screenshots {
            steps.screenshot(&base_cut, &still, ZOOM_OUT_SCREENSHOT_AT)?;
            log::info!("Created screenshot: {:?}", still);
            collected.stills.push(still.clone());
            outputs.push(still);
        }

        Ok((Outcome::Produced, outputs))
    }

    /// Merge the horizontal clips and copy deliverables into `final/`.
    fn finish(
        &self,
        steps: &Steps<'_>,
        request: &TrimRequest,
        collected: &Collected,
        report: &mut RunReport,
    ) -> Result<()> {
        let publishes = matches!(self.mode, Mode::ZoomIn | Mode::ZoomOut);
        let merges = matches!(self.mode, Mode::Horizontal | Mode::ZoomIn | Mode::ZoomOut);

        if publishes {
            report.published.extend(steps.publish(&collected.stills)?);
            report.published.extend(steps.publish(&collected.vertical)?);
        }

        if !merges {
            return Ok(());
        }

        if collected.horizontal.len() < 2 {
            log::info!(
                "Not enough horizontal videos to merge: {}",
                collected.horizontal.len()
            );
            return Ok(());
        }

        log::info!("Merging {} horizontal videos", collected.horizontal.len());
        let merged = steps.concat(
            &collected.horizontal,
            &steps.file(&format!("{}.mp4", request.merged_name())),
        )?;
        log::info!("Merged horizontal video created: {:?}", merged);

        if publishes {
            report.published.extend(steps.publish(std::slice::from_ref(&merged))?);

            if !collected.vertical.is_empty() {
                let list = steps.file(VERTICAL_LIST);
                let content: Vec<String> =
                    collected.vertical.iter().map(|p| concat_entry(p)).collect();
                std::fs::write(&list, content.join("\n"))
                    .with_context(|| format!("Failed to write {:?}", list))?;
                report.published.extend(steps.publish(&[list])?);
            }
        }
        report.merged = Some(merged);
        Ok(())
    }
}

fn require_source(source: &Path) -> Result<()> {
    if !source.exists() {
        anyhow::bail!("Source video not found: {:?}", source);
    }
    Ok(())
}

fn write_status(path: &Path, report: &RunReport) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::RecordingRunner;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        input: PathBuf,
        output: PathBuf,
    }

    fn fixture(files: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("inputFolder");
        let output = dir.path().join("outputFolder");
        std::fs::create_dir_all(&input).unwrap();
        for name in files {
            std::fs::write(input.join(name), b"source").unwrap();
        }
        Fixture {
            _dir: dir,
            input,
            output,
        }
    }

    fn record(filename: &str, name: &str) -> TrimData {
        TrimData {
            filename: filename.to_string(),
            custom_name: Some(name.to_string()),
            trim_start: 2.0,
            trim_stop: 8.0,
            point_in_time: Some(5.0),
            duration: Some(20.0),
            video_width: 1920,
            video_height: 1080,
        }
    }

    fn request(videos: Vec<TrimData>) -> TrimRequest {
        TrimRequest {
            all_videos_title: "Lake: day one".to_string(),
            videos,
        }
    }

    fn file_names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn trim_mode_names_output_after_custom_name() {
        let fx = fixture(&["a.mp4"]);
        let runner = RecordingRunner::new();
        let report = Pipeline::new(Mode::Trim, &fx.input, &fx.output)
            .run(&request(vec![record("a.mp4", "Heron")]), &runner);

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(runner.labels(), ["Trimming"]);
        assert!(fx.output.join("Heron.mp4").exists());
        assert!(fx.output.join(STATUS_FILE).exists());
    }

    #[test]
    fn vertical_mode_rerun_is_a_no_op() {
        let fx = fixture(&["a.mp4"]);
        let pipeline = Pipeline::new(Mode::Vertical, &fx.input, &fx.output);
        let req = request(vec![record("a.mp4", "Heron")]);

        let first = RecordingRunner::new();
        let report = pipeline.run(&req, &first);
        assert_eq!(first.labels(), ["Trim + vertical crop", "Screenshot"]);
        assert_eq!(report.videos[0].outcome, Outcome::Produced);
        assert_eq!(
            file_names(&first.outputs()),
            ["Heron.mp4", "Heron.jpg"]
        );

        let second = RecordingRunner::new();
        let report = pipeline.run(&req, &second);
        assert!(second.calls.borrow().is_empty());
        assert_eq!(report.videos[0].outcome, Outcome::Skipped);
    }

    #[test]
    fn screenshot_taken_at_segment_midpoint() {
        let fx = fixture(&["a.mp4"]);
        let runner = RecordingRunner::new();
        Pipeline::new(Mode::Vertical, &fx.input, &fx.output)
            .run(&request(vec![record("a.mp4", "Heron")]), &runner);
        let calls = runner.calls.borrow();
        let shot = &calls[1].1;
        assert_eq!(shot[..3], ["-y", "-ss", "5.000"]);
    }

    #[test]
    fn intro_mode_builds_still_and_merges() {
        let fx = fixture(&["a.mp4"]);
        let runner = RecordingRunner::new();
        let report = Pipeline::new(Mode::Intro, &fx.input, &fx.output)
            .run(&request(vec![record("a.mp4", "Heron")]), &runner);

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(
            runner.labels(),
            [
                "Trim + vertical crop",
                "Screenshot",
                "Cropping screenshot",
                "Still to video",
                "Merging"
            ]
        );
        assert!(fx.output.join("WITH_INTRO Heron.mp4").exists());

        let calls = runner.calls.borrow();
        // the frame is grabbed at source size so the 607x1080 crop fits
        assert!(!calls[1].1.iter().any(|a| a.contains("scale=")));
        assert!(calls[2].1.contains(&"[0:v]crop=607:1080:656:0[v]".to_string()));
        let still_args = &calls[3].1;
        assert!(still_args.windows(2).any(|w| w == ["-s", "607x1080"]));
    }

    #[test]
    fn intro_mode_rerun_is_a_no_op() {
        let fx = fixture(&["a.mp4"]);
        let pipeline = Pipeline::new(Mode::Intro, &fx.input, &fx.output);
        let req = request(vec![record("a.mp4", "Heron")]);
        pipeline.run(&req, &RecordingRunner::new());

        let second = RecordingRunner::new();
        let report = pipeline.run(&req, &second);
        assert_eq!(report.state, RunState::Completed);
        assert!(second.calls.borrow().is_empty());
        assert_eq!(report.videos[0].outcome, Outcome::Skipped);
        assert_eq!(
            file_names(&report.videos[0].outputs),
            ["WITH_INTRO Heron.mp4"]
        );
    }

    #[test]
    fn intro_mode_resumes_after_partial_run() {
        let fx = fixture(&["a.mp4"]);
        let pipeline = Pipeline::new(Mode::Intro, &fx.input, &fx.output);
        let req = request(vec![record("a.mp4", "Heron")]);
        pipeline.run(&req, &RecordingRunner::new());
        std::fs::remove_file(fx.output.join("WITH_INTRO Heron.mp4")).unwrap();

        let second = RecordingRunner::new();
        let report = pipeline.run(&req, &second);
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(second.labels(), ["Merging"]);
    }

    #[test]
    fn horizontal_mode_merges_multiple_clips() {
        let fx = fixture(&["a.mp4", "b.mp4"]);
        let runner = RecordingRunner::new();
        let report = Pipeline::new(Mode::Horizontal, &fx.input, &fx.output)
            .produce_screenshots(false)
            .run(
                &request(vec![record("a.mp4", "One"), record("b.mp4", "Two")]),
                &runner,
            );

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(
            runner.labels(),
            ["Trimming", "Vertical crop", "Trimming", "Vertical crop", "Merging"]
        );
        let merged = fx.output.join("Lake day one.mp4");
        assert_eq!(report.merged.as_deref(), Some(merged.as_path()));
        assert!(merged.exists());
        assert!(report.published.is_empty());
    }

    #[test]
    fn horizontal_mode_rerun_is_skipped_but_still_merged() {
        let fx = fixture(&["a.mp4", "b.mp4"]);
        let pipeline = Pipeline::new(Mode::Horizontal, &fx.input, &fx.output);
        let req = request(vec![record("a.mp4", "One"), record("b.mp4", "Two")]);
        pipeline.run(&req, &RecordingRunner::new());
        std::fs::remove_file(fx.output.join("Lake day one.mp4")).unwrap();

        let second = RecordingRunner::new();
        let report = pipeline.run(&req, &second);
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(second.labels(), ["Merging"]);
        assert!(report.videos.iter().all(|v| v.outcome == Outcome::Skipped));
    }

    #[test]
    fn single_clip_is_not_merged() {
        let fx = fixture(&["a.mp4"]);
        let runner = RecordingRunner::new();
        let report = Pipeline::new(Mode::Horizontal, &fx.input, &fx.output)
            .run(&request(vec![record("a.mp4", "One")]), &runner);
        assert!(report.merged.is_none());
        assert!(!runner.labels().contains(&"Merging".to_string()));
    }

    #[test]
    fn zoom_in_sequence_and_publish() {
        let fx = fixture(&["a.mp4", "b.mp4"]);
        let runner = RecordingRunner::new();
        let report = Pipeline::new(Mode::ZoomIn, &fx.input, &fx.output)
            .hashtags("#birds")
            .run(
                &request(vec![record("a.mp4", "One"), record("b.mp4", "Two")]),
                &runner,
            );

        assert_eq!(report.state, RunState::Completed, "{:?}", report.error);
        let per_record = [
            "Trimming",
            "Speeding up x2",
            "Trimming",
            "Merging",
            "Vertical crop",
            "Screenshot",
        ];
        let labels = runner.labels();
        assert_eq!(labels[..6], per_record);
        assert_eq!(labels[6..12], per_record);
        assert_eq!(labels[12], "Merging");

        let final_dir = fx.output.join("final");
        assert!(final_dir.join("One #birds.mp4").exists());
        assert!(final_dir.join("One.jpg").exists());
        assert!(final_dir.join("Lake day one.mp4").exists());
        assert!(final_dir.join(VERTICAL_LIST).exists());

        // run-up covers [trimStart, pointInTime)
        let calls = runner.calls.borrow();
        assert!(calls[0].1.windows(2).any(|w| w == ["-t", "3.000"]));
    }

    #[test]
    fn zoom_in_rerun_skips_records_and_merges_existing_clips() {
        let fx = fixture(&["a.mp4", "b.mp4"]);
        let pipeline =
            Pipeline::new(Mode::ZoomIn, &fx.input, &fx.output).remove_source_files(true);
        let req = request(vec![record("a.mp4", "One"), record("b.mp4", "Two")]);

        let first = pipeline.run(&req, &RecordingRunner::new());
        assert_eq!(first.removed_sources, 2);
        std::fs::remove_file(fx.output.join("Lake day one.mp4")).unwrap();

        let second = RecordingRunner::new();
        let report = pipeline.run(&req, &second);
        assert_eq!(report.state, RunState::Completed, "{:?}", report.error);
        assert!(report.videos.iter().all(|v| v.outcome == Outcome::Skipped));
        assert_eq!(second.labels(), ["Merging"]);

        let list = std::fs::read_to_string(fx.output.join(steps::CONCAT_LIST)).unwrap();
        assert!(list.contains("One_base.mp4"));
        assert!(list.contains("Two_base.mp4"));
        assert!(fx.output.join("final").join("Lake day one.mp4").exists());
    }

    #[test]
    fn zoom_in_requires_point_in_time() {
        let fx = fixture(&["a.mp4"]);
        let runner = RecordingRunner::new();
        let mut data = record("a.mp4", "One");
        data.point_in_time = None;
        let report = Pipeline::new(Mode::ZoomIn, &fx.input, &fx.output)
            .run(&request(vec![data]), &runner);

        assert_eq!(report.state, RunState::Failed);
        assert!(report.error.unwrap().contains("pointInTime"));
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn zoom_out_rewinds_then_plays_fast() {
        let fx = fixture(&["a.mp4"]);
        let runner = RecordingRunner::new();
        let report = Pipeline::new(Mode::ZoomOut, &fx.input, &fx.output)
            .produce_screenshots(false)
            .run(&request(vec![record("a.mp4", "One")]), &runner);

        assert_eq!(report.state, RunState::Completed, "{:?}", report.error);
        assert_eq!(
            runner.labels(),
            [
                "Trimming",
                "Speeding up x2",
                "Speeding up x6",
                "Reverting",
                "Merging",
                "Vertical crop"
            ]
        );
        assert_eq!(
            file_names(&runner.outputs()),
            [
                "1_One___BASE___.mp4",
                "1_One___baseSpeededBy2.mp4",
                "1_One___baseSpeededBy6.mp4",
                "1_One___baseSpeededBy6__reverted.mp4",
                "1_One___FINAL___.mp4",
                "1_One ___FINAL___VERTICAL.mp4"
            ]
        );
        // base cut stops 0.1s early
        let calls = runner.calls.borrow();
        assert!(calls[0].1.windows(2).any(|w| w == ["-t", "5.900"]));
        assert!(fx.output.join("final").join("1_One ___FINAL___VERTICAL.mp4").exists());
    }

    #[test]
    fn zoom_out_rerun_is_a_no_op() {
        let fx = fixture(&["a.mp4"]);
        let pipeline = Pipeline::new(Mode::ZoomOut, &fx.input, &fx.output);
        let req = request(vec![record("a.mp4", "One")]);
        pipeline.run(&req, &RecordingRunner::new());

        let second = RecordingRunner::new();
        let report = pipeline.run(&req, &second);
        assert_eq!(report.state, RunState::Completed);
        assert!(second.calls.borrow().is_empty());
        assert_eq!(report.videos[0].outcome, Outcome::Skipped);
    }

    #[test]
    fn zoom_out_rejects_segment_shorter_than_margin() {
        let fx = fixture(&["a.mp4"]);
        let runner = RecordingRunner::new();
        let mut data = record("a.mp4", "One");
        data.trim_start = 2.0;
        data.trim_stop = 2.05;
        data.point_in_time = None;
        let req = request(vec![data]);

        let pipeline = Pipeline::new(Mode::ZoomOut, &fx.input, &fx.output);
        assert!(matches!(
            pipeline.validate(&req),
            Err(RequestError::SegmentTooShort { .. })
        ));
        let report = pipeline.run(&req, &runner);
        assert_eq!(report.state, RunState::Failed);
        assert!(runner.calls.borrow().is_empty());

        // other modes have no margin to subtract
        assert!(Pipeline::new(Mode::Trim, &fx.input, &fx.output)
            .validate(&req)
            .is_ok());
    }

    #[test]
    fn zoom_out_picture_in_picture_overlays_preview() {
        let fx = fixture(&["a.mp4"]);
        let runner = RecordingRunner::new();
        Pipeline::new(Mode::ZoomOut, &fx.input, &fx.output)
            .produce_vertical(false)
            .produce_screenshots(false)
            .picture_in_picture(true)
            .run(&request(vec![record("a.mp4", "One")]), &runner);

        assert_eq!(
            runner.labels()[..4],
            ["Trimming", "Trimming", "Resizing + border", "Overlaying"]
        );
    }

    #[test]
    fn music_is_added_to_verticals() {
        let fx = fixture(&["a.mp4"]);
        let runner = RecordingRunner::new();
        let report = Pipeline::new(Mode::Vertical, &fx.input, &fx.output)
            .produce_screenshots(false)
            .music("music/1.mp3")
            .run(&request(vec![record("a.mp4", "Heron")]), &runner);

        assert_eq!(runner.labels(), ["Trim + vertical crop", "Adding music"]);
        assert_eq!(
            file_names(&report.videos[0].outputs),
            ["Heron ___MUSIC.mp4"]
        );
    }

    #[test]
    fn failing_step_stops_the_run() {
        let fx = fixture(&["a.mp4", "b.mp4"]);
        let mut runner = RecordingRunner::new();
        runner.fail_on = Some("Vertical crop".to_string());
        let report = Pipeline::new(Mode::Horizontal, &fx.input, &fx.output)
            .run(
                &request(vec![record("a.mp4", "One"), record("b.mp4", "Two")]),
                &runner,
            );

        assert_eq!(report.state, RunState::Failed);
        assert_eq!(runner.labels(), ["Trimming", "Vertical crop"]);
        assert_eq!(report.videos.len(), 1);
        assert_eq!(report.videos[0].outcome, Outcome::Failed);
        let status = std::fs::read_to_string(fx.output.join(STATUS_FILE)).unwrap();
        assert!(status.contains("\"state\": \"failed\""));
    }

    #[test]
    fn missing_source_fails_before_ffmpeg() {
        let fx = fixture(&[]);
        let runner = RecordingRunner::new();
        let report = Pipeline::new(Mode::Trim, &fx.input, &fx.output)
            .run(&request(vec![record("gone.mp4", "x")]), &runner);
        assert_eq!(report.state, RunState::Failed);
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn rerun_after_removing_sources_skips_finished_records() {
        let fx = fixture(&["a.mp4"]);
        let pipeline =
            Pipeline::new(Mode::Trim, &fx.input, &fx.output).remove_source_files(true);
        let req = request(vec![record("a.mp4", "Heron")]);

        let first = pipeline.run(&req, &RecordingRunner::new());
        assert_eq!(first.state, RunState::Completed);
        assert!(!fx.input.join("a.mp4").exists());

        let second = RecordingRunner::new();
        let report = pipeline.run(&req, &second);
        assert_eq!(report.state, RunState::Completed, "{:?}", report.error);
        assert_eq!(report.videos[0].outcome, Outcome::Skipped);
        assert!(second.calls.borrow().is_empty());
    }

    #[test]
    fn sources_removed_only_when_enabled() {
        let fx = fixture(&["a.mp4"]);
        let runner = RecordingRunner::new();
        let report = Pipeline::new(Mode::Trim, &fx.input, &fx.output)
            .remove_source_files(true)
            .run(&request(vec![record("a.mp4", "Heron")]), &runner);
        assert_eq!(report.removed_sources, 1);
        assert!(!fx.input.join("a.mp4").exists());
    }
}
