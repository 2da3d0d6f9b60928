use thiserror::Error;

/// Problems found while validating an edit descriptor.
#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("descriptor has no videos")]
    Empty,

    #[error("{filename}: trimStop ({stop}) must be greater than trimStart ({start})")]
    EmptySegment {
        filename: String,
        start: f64,
        stop: f64,
    },

    #[error("{filename}: trimStart must not be negative (got {start})")]
    NegativeStart { filename: String, start: f64 },

    #[error("{filename}: pointInTime ({point}) must lie between trimStart and trimStop")]
    PointOutOfRange { filename: String, point: f64 },

    #[error("{filename}: segment of {duration:.3}s is too short for this mode (needs more than {minimum}s)")]
    SegmentTooShort {
        filename: String,
        duration: f64,
        minimum: f64,
    },

    #[error("{filename}: pointInTime is required for this mode")]
    MissingPointInTime { filename: String },

    #[error("{filename}: video dimensions must be non-zero (got {width}x{height})")]
    ZeroDimensions {
        filename: String,
        width: u32,
        height: u32,
    },

    #[error("invalid source filename: {0:?}")]
    BadFilename(String),
}

/// Failures of the external FFmpeg/ffprobe tools.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} not found. Please install FFmpeg.")]
    NotFound {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed with exit code {code:?}: {tail}")]
    Failed {
        tool: &'static str,
        code: Option<i32>,
        tail: String,
    },

    #[error("ffprobe reported an unusable duration for {0}")]
    BadDuration(String),
}
