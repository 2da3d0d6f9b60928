//! The edit descriptor (`trim-results.json`) submitted by the browser UI.
//!
//! A descriptor names one or more source files inside the input folder and,
//! for each, the segment to keep plus the source dimensions needed to compute
//! the vertical crop. It is read once per pipeline run and never modified by
//! the run itself.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::RequestError;

const FORBIDDEN_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Remove characters that are not allowed in file names on common filesystems.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars().filter(|c| !FORBIDDEN_CHARS.contains(c)).collect()
}

/// One source video and the segment to cut from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrimData {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
    pub trim_start: f64,
    pub trim_stop: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_in_time: Option<f64>,
    /// Full length of the source, as reported by the browser player.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub video_width: u32,
    pub video_height: u32,
}

impl TrimData {
    pub fn segment_duration(&self) -> f64 {
        self.trim_stop - self.trim_start
    }

    pub fn midpoint(&self) -> f64 {
        self.trim_start + self.segment_duration() / 2.0
    }

    /// File-name stem used for everything produced from this record.
    pub fn base_name(&self) -> String {
        match self.custom_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => sanitize_file_name(name),
            _ => {
                let stem = Path::new(&self.filename)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                sanitize_file_name(&format!("trimmed_{stem}"))
            }
        }
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        let filename = self.filename.clone();

        if self.filename.is_empty()
            || self.filename.contains(['/', '\\'])
            || self.filename == ".."
        {
            return Err(RequestError::BadFilename(filename));
        }
        if self.trim_start < 0.0 {
            return Err(RequestError::NegativeStart {
                filename,
                start: self.trim_start,
            });
        }
        if self.trim_stop <= self.trim_start {
            return Err(RequestError::EmptySegment {
                filename,
                start: self.trim_start,
                stop: self.trim_stop,
            });
        }
        if let Some(point) = self.point_in_time
            && (point <= self.trim_start || point >= self.trim_stop)
        {
            return Err(RequestError::PointOutOfRange { filename, point });
        }
        if self.video_width == 0 || self.video_height == 0 {
            return Err(RequestError::ZeroDimensions {
                filename,
                width: self.video_width,
                height: self.video_height,
            });
        }
        Ok(())
    }
}

/// The whole descriptor: a title for merged output plus the ordered records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrimRequest {
    #[serde(default)]
    pub all_videos_title: String,
    pub videos: Vec<TrimData>,
}

/// Older descriptors were a bare array of records with no title.
#[derive(Deserialize)]
#[serde(untagged)]
enum AnyShape {
    Titled(TrimRequest),
    Bare(Vec<TrimData>),
}

impl TrimRequest {
    pub fn from_json(raw: &str) -> Result<Self> {
        let shape: AnyShape = serde_json::from_str(raw).context("Invalid trim descriptor JSON")?;
        Ok(match shape {
            AnyShape::Titled(request) => request,
            AnyShape::Bare(videos) => TrimRequest {
                all_videos_title: String::new(),
                videos,
            },
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read trim descriptor {:?}", path))?;
        Self::from_json(&raw)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write trim descriptor {:?}", path))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.videos.is_empty() {
            return Err(RequestError::Empty);
        }
        self.videos.iter().try_for_each(TrimData::validate)
    }

    /// Name of the merged horizontal video, falling back when no title was given.
    pub fn merged_name(&self) -> String {
        let title = sanitize_file_name(self.all_videos_title.trim());
        if title.is_empty() {
            "merged".to_string()
        } else {
            title
        }
    }
}
