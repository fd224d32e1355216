use crate::config::Dimensions;
use crate::error::{Error, Result};
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::{highgui, imgproc, videoio};
use std::path::Path;
use tracing::{info, warn};

/// Produces decoded frames.
pub trait FrameSource {
    /// `Ok(None)` at end of stream. [`Error::FrameDecode`] means only this frame is lost.
    fn next_frame(&mut self) -> Result<Option<Mat>>;
}

/// Frames decoded from a video file.
pub struct VideoFileSource {
    capture: videoio::VideoCapture,
}

impl VideoFileSource {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::SourceOpen(format!(
                "video file '{}' not found",
                path.display()
            )));
        }
        let path_str = path.to_str().ok_or_else(|| {
            Error::SourceOpen(format!("video path {path:?} is not valid UTF-8"))
        })?;
        let capture = videoio::VideoCapture::from_file(path_str, videoio::CAP_ANY)
            .map_err(|e| Error::SourceOpen(format!("{}: {e}", path.display())))?;
        let opened = videoio::VideoCapture::is_opened(&capture)?;
        if !opened {
            return Err(Error::SourceOpen(format!(
                "could not open video '{}'",
                path.display()
            )));
        }

        let fps = capture.get(videoio::CAP_PROP_FPS).unwrap_or_default();
        let frames = capture.get(videoio::CAP_PROP_FRAME_COUNT).unwrap_or_default();
        info!(path = %path.display(), fps, frames, "Opened video");
        Ok(Self { capture })
    }
}

impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        match self.capture.read(&mut frame) {
            Ok(true) if frame.empty() => Err(Error::FrameDecode(
                "decoder returned an empty frame".into(),
            )),
            Ok(true) => Ok(Some(frame)),
            Ok(false) => Ok(None),
            Err(e) => Err(Error::FrameDecode(e.to_string())),
        }
    }
}

impl Drop for VideoFileSource {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            warn!("Failed to release video capture: {}", e);
        }
    }
}

/// Where composite frames go, and where the user can ask to stop.
pub trait DisplaySink {
    fn show(&mut self, image: &Mat) -> Result<()>;

    /// Returns `true` once the user asked to stop.
    fn poll_cancel(&mut self) -> Result<bool>;
}

const KEY_ESC: i32 = 27;
const KEY_QUIT: i32 = 'q' as i32;

/// OpenCV highgui window. `q` or Esc stops the run.
pub struct WindowSink {
    title: String,
    size: Dimensions,
}

impl WindowSink {
    pub fn new(title: &str, size: Dimensions) -> Result<Self> {
        highgui::named_window_def(title)?;
        Ok(Self {
            title: title.to_string(),
            size,
        })
    }
}

impl DisplaySink for WindowSink {
    fn show(&mut self, image: &Mat) -> Result<()> {
        let mut scaled = Mat::default();
        imgproc::resize(
            image,
            &mut scaled,
            self.size.into(),
            0.0,
            0.0,
            imgproc::INTER_AREA,
        )?;
        highgui::imshow(&self.title, &scaled)?;
        Ok(())
    }

    fn poll_cancel(&mut self) -> Result<bool> {
        let key = highgui::poll_key()?;
        Ok(key & 0xFF == KEY_QUIT || key & 0xFF == KEY_ESC)
    }
}

impl Drop for WindowSink {
    fn drop(&mut self) {
        if let Err(e) = highgui::destroy_window(&self.title) {
            warn!("Failed to close window {}: {}", self.title, e);
        }
    }
}

/// Discards frames and never cancels.
#[derive(Debug, Default)]
pub struct HeadlessSink {
    shown: u64,
}

impl HeadlessSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> u64 {
        self.shown
    }
}

impl DisplaySink for HeadlessSink {
    fn show(&mut self, _image: &Mat) -> Result<()> {
        self.shown += 1;
        Ok(())
    }

    fn poll_cancel(&mut self) -> Result<bool> {
        Ok(false)
    }
}
