use crate::error::{Error, Result};
use std::path::PathBuf;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: i32,
    pub height: i32,
}

impl Dimensions {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    fn validate(&self, what: &str) -> Result<()> {
        if self.width <= 0 || self.height <= 0 {
            return Err(Error::Config(format!(
                "{what} must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

impl From<Dimensions> for opencv::core::Size {
    fn from(value: Dimensions) -> Self {
        opencv::core::Size::new(value.width, value.height)
    }
}

/// Settings for one run of the annotation loop.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub video_path: PathBuf,
    /// Where the emotion history is persisted.
    pub data_path: PathBuf,
    /// Size of the preview window.
    pub display_size: Dimensions,
    /// Every chart is stretched to this before being stitched next to the frame.
    pub chart_size: Dimensions,
    /// Working size the frame is resized to before annotation, `None` keeps it as decoded.
    pub frame_size: Option<Dimensions>,
    /// Flush the history every N frames.
    pub flush_every: u64,
    /// Consecutive decode failures after which the source counts as broken.
    pub max_decode_failures: u32,
    pub window_title: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            video_path: PathBuf::from("test.mp4"),
            data_path: PathBuf::from("./uploads/data.json"),
            display_size: Dimensions::new(1200, 400),
            chart_size: Dimensions::new(500, 500),
            frame_size: Some(Dimensions::new(700, 500)),
            flush_every: 1,
            max_decode_failures: 30,
            window_title: "Emotion Detection".to_string(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        self.display_size.validate("display size")?;
        self.chart_size.validate("chart size")?;
        if let Some(frame_size) = &self.frame_size {
            frame_size.validate("frame size")?;
        }
        if self.flush_every == 0 {
            return Err(Error::Config("flush cadence must be at least 1".into()));
        }
        if self.max_decode_failures == 0 {
            return Err(Error::Config(
                "decode failure limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
