use crate::error::{Error, Result};
use opencv::core::{self, Mat, Rect};
use opencv::prelude::*;
use opencv::types::VectorOfRect;
use opencv::{imgproc, objdetect};
use std::path::Path;

const DEFAULT_CASCADE: &str = "haarcascades/haarcascade_frontalface_alt.xml";

/// One face located in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Identifier handed out by the locator. Only meaningful within its own session.
    pub person_id: String,
    pub bbox: Rect,
}

/// Finds faces in a frame.
pub trait FaceLocator {
    fn locate(&mut self, frame: &Mat) -> Result<Vec<Detection>>;
}

/// Haar cascade face locator.
///
/// Person ids are handed out as "1", "2", ... from left to right, so they
/// follow screen position rather than identity.
pub struct HaarFaceLocator {
    classifier: objdetect::CascadeClassifier,
}

impl HaarFaceLocator {
    /// Loads `cascade_path`, or OpenCV's bundled frontal face cascade when `None`.
    pub fn new(cascade_path: Option<&Path>) -> Result<Self> {
        let xml = match cascade_path {
            Some(path) => path
                .to_str()
                .ok_or_else(|| {
                    Error::ModelLoad(format!("cascade path {path:?} is not valid UTF-8"))
                })?
                .to_string(),
            None => core::find_file_def(DEFAULT_CASCADE)
                .map_err(|e| Error::ModelLoad(format!("{DEFAULT_CASCADE}: {e}")))?,
        };
        let classifier = objdetect::CascadeClassifier::new(&xml)
            .map_err(|e| Error::ModelLoad(format!("{xml}: {e}")))?;
        if classifier.empty()? {
            return Err(Error::ModelLoad(format!("cascade {xml} is empty")));
        }
        Ok(Self { classifier })
    }

    fn detect(&mut self, frame: &Mat) -> Result<VectorOfRect> {
        let gray = to_grayscale(frame)?;
        let mut faces = VectorOfRect::new();
        self.classifier.detect_multi_scale(
            &gray,
            &mut faces,
            1.1,
            5,
            objdetect::CASCADE_SCALE_IMAGE,
            core::Size {
                width: 30,
                height: 30,
            },
            core::Size {
                width: 0,
                height: 0,
            },
        )?;
        Ok(faces)
    }
}

impl FaceLocator for HaarFaceLocator {
    fn locate(&mut self, frame: &Mat) -> Result<Vec<Detection>> {
        let faces = self
            .detect(frame)
            .map_err(|e| Error::Detection(e.to_string()))?;
        let bounds = frame.size()?;
        let boxes = faces
            .into_iter()
            .filter_map(|face| clip_to(face, bounds))
            .collect();
        Ok(assign_ids(boxes))
    }
}

/// Orders boxes left to right (then top to bottom) and numbers them from 1.
pub fn assign_ids(mut boxes: Vec<Rect>) -> Vec<Detection> {
    boxes.sort_by_key(|b| (b.x, b.y));
    boxes
        .into_iter()
        .enumerate()
        .map(|(i, bbox)| Detection {
            person_id: (i + 1).to_string(),
            bbox,
        })
        .collect()
}

/// Intersection of `rect` with an image of `bounds`, `None` if nothing is left.
pub fn clip_to(rect: Rect, bounds: core::Size) -> Option<Rect> {
    let x0 = rect.x.max(0);
    let y0 = rect.y.max(0);
    let x1 = (rect.x + rect.width).min(bounds.width);
    let y1 = (rect.y + rect.height).min(bounds.height);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
}

/// Copies the region under `bbox` out of `frame`.
pub fn crop(frame: &Mat, bbox: Rect) -> Result<Mat> {
    let clipped = clip_to(bbox, frame.size()?).ok_or_else(|| {
        Error::InvalidImage(format!("box {bbox:?} lies outside the frame"))
    })?;
    let roi = Mat::roi(frame, clipped)?;
    Ok(roi.try_clone()?)
}

pub fn to_grayscale(image: &Mat) -> Result<Mat> {
    if image.channels() == 1 {
        return Ok(image.try_clone()?);
    }
    let mut gray: Mat = Mat::default();
    imgproc::cvt_color_def(image, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    Ok(gray)
}
