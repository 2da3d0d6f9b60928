/// Width:height ratio of the vertical output.
pub const VERTICAL_ASPECT: (u32, u32) = (9, 16);

/// A crop rectangle in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

impl CropRect {
    /// Full-height 9:16 window centred horizontally in a `width`x`height` frame.
    ///
    /// Sources that are already narrower than 9:16 keep their full width.
    pub fn centered_vertical(width: u32, height: u32) -> Self {
        let (num, den) = VERTICAL_ASPECT;
        let target_width = (u64::from(height) * u64::from(num) / u64::from(den)) as u32;

        if target_width >= width {
            return Self {
                width,
                height,
                x: 0,
                y: 0,
            };
        }

        Self {
            width: target_width,
            height,
            x: (width - target_width) / 2,
            y: 0,
        }
    }

    /// FFmpeg `crop` filter expression.
    pub fn to_filter(&self) -> String {
        format!("crop={}:{}:{}:{}", self.width, self.height, self.x, self.y)
    }
}
