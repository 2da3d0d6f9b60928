//! Listing of the media files waiting in the input folder.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

pub const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".avi", ".mkv", ".webm"];
pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp"];

/// URL prefix under which the input folder is served.
pub const INPUT_ROUTE: &str = "/inputFolder";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    /// Classify by lowercase extension, including the leading dot.
    pub fn from_extension(ext: &str) -> Option<Self> {
        if VIDEO_EXTENSIONS.contains(&ext) {
            Some(MediaKind::Video)
        } else if IMAGE_EXTENSIONS.contains(&ext) {
            Some(MediaKind::Image)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub name: String,
    pub size_bytes: u64,
    #[serde(rename = "sizeMB")]
    pub size_mb: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub extension: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MediaListing {
    pub videos: Vec<MediaFile>,
    pub images: Vec<MediaFile>,
}

fn size_in_mb(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / (1024.0 * 1024.0))
}

/// List videos and images directly inside `folder`, sorted by name.
pub fn list_media(folder: impl AsRef<Path>) -> Result<MediaListing> {
    let folder = folder.as_ref();
    let entries =
        std::fs::read_dir(folder).with_context(|| format!("Failed to read {:?}", folder))?;

    let mut listing = MediaListing::default();
    for entry in entries {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let extension = Path::new(&name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();

        let Some(kind) = MediaKind::from_extension(&extension) else {
            continue;
        };

        let modified = metadata.modified()?;
        // Not every filesystem records a birth time
        let created = metadata.created().unwrap_or(modified);

        let file = MediaFile {
            path: format!("{}/{}", INPUT_ROUTE, name),
            size_bytes: metadata.len(),
            size_mb: size_in_mb(metadata.len()),
            created_at: created.into(),
            modified_at: modified.into(),
            extension,
            name,
        };

        match kind {
            MediaKind::Video => listing.videos.push(file),
            MediaKind::Image => listing.images.push(file),
        }
    }

    listing.videos.sort_by(|a, b| a.name.cmp(&b.name));
    listing.images.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(listing)
}
