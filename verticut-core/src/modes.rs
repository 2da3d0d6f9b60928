use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Pipeline variants, from the plain trim up to the zoom effects
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", try_from = "String")]
pub enum Mode {
    /// Cut each segment, keep the original frame
    Trim,
    /// Cut and crop to 9:16 in one pass, plus a midpoint screenshot
    Vertical,
    /// Vertical clip preceded by a 2 second still of its midpoint
    Intro,
    /// Horizontal cut, vertical crop, screenshot, and one merged horizontal video
    Horizontal,
    /// Fast run-up to the point in time, then normal speed
    ZoomIn,
    /// Reversed 6x rewind followed by the whole source at 2x
    ZoomOut,
}

impl Mode {
    /// Get mode from string name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "trim" | "trims" => Some(Mode::Trim),
            "vertical" | "shorts" => Some(Mode::Vertical),
            "intro" | "with-intro" => Some(Mode::Intro),
            "horizontal" | "merge" => Some(Mode::Horizontal),
            "zoom-in" | "zoom_in" | "zoomin" => Some(Mode::ZoomIn),
            "zoom-out" | "zoom_out" | "zoomout" => Some(Mode::ZoomOut),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Trim => "trim",
            Mode::Vertical => "vertical",
            Mode::Intro => "intro",
            Mode::Horizontal => "horizontal",
            Mode::ZoomIn => "zoom-in",
            Mode::ZoomOut => "zoom-out",
        }
    }

    /// Get description of the mode
    pub fn description(&self) -> &'static str {
        match self {
            Mode::Trim => "Trim each video to its segment",
            Mode::Vertical => "Trim and crop to vertical, screenshot at the midpoint",
            Mode::Intro => "Vertical clip with a 2s screenshot intro",
            Mode::Horizontal => "Horizontal + vertical clips, screenshots, merged horizontal video",
            Mode::ZoomIn => "2x run-up to pointInTime, then normal speed; thumbnails from the last frame",
            Mode::ZoomOut => "Reversed 6x rewind followed by the source at 2x",
        }
    }

    /// Records must carry `pointInTime`
    pub fn requires_point_in_time(&self) -> bool {
        matches!(self, Mode::ZoomIn)
    }

    /// List all available modes
    pub fn list_all() -> Vec<(&'static str, &'static str)> {
        Mode::value_variants()
            .iter()
            .map(|m| (m.as_str(), m.description()))
            .collect()
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Mode::from_name(name).ok_or_else(|| {
            let known: Vec<&str> = Mode::value_variants().iter().map(|m| m.as_str()).collect();
            format!("unknown mode '{}' (expected one of: {})", name, known.join(", "))
        })
    }
}

impl TryFrom<String> for Mode {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
