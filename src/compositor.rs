//! Stitches per-person charts to the right of a frame.

use crate::config::Dimensions;
use crate::error::{Error, Result};
use opencv::core::{self, Mat, Size, Vector};
use opencv::imgproc;
use opencv::prelude::*;

/// Fails with [`Error::InvalidImage`] if `image` has no pixels.
pub fn ensure_not_empty(image: &Mat, what: &str) -> Result<()> {
    if image.cols() <= 0 || image.rows() <= 0 {
        return Err(Error::InvalidImage(format!(
            "{what} is {}x{}",
            image.cols(),
            image.rows()
        )));
    }
    Ok(())
}

/// Builds `base | overlay_1 | ... | overlay_n`.
///
/// Every overlay is stretched to `target`, the resulting strip is stretched
/// vertically to the height of `base` when the two differ. With no overlays
/// the result is a copy of `base`. Inputs are never modified. Overlays must
/// already share the pixel format of `base`, see [`prepare_overlay`].
pub fn compose(base: &Mat, overlays: &[Mat], target: Dimensions) -> Result<Mat> {
    ensure_not_empty(base, "base frame")?;
    for (i, overlay) in overlays.iter().enumerate() {
        ensure_not_empty(overlay, &format!("overlay {i}"))?;
    }
    if target.width <= 0 || target.height <= 0 {
        return Err(Error::InvalidImage(format!(
            "overlay target is {}x{}",
            target.width, target.height
        )));
    }

    if overlays.is_empty() {
        return Ok(base.try_clone()?);
    }

    let mut resized: Vector<Mat> = Vector::new();
    for overlay in overlays {
        resized.push(stretch(overlay, target.into())?);
    }

    let mut strip = Mat::default();
    core::hconcat(&resized, &mut strip)?;

    if strip.rows() != base.rows() {
        strip = stretch(&strip, Size::new(strip.cols(), base.rows()))?;
    }

    let mut composite = Mat::default();
    core::hconcat2(base, &strip, &mut composite)?;
    Ok(composite)
}

fn stretch(image: &Mat, size: Size) -> Result<Mat> {
    if image.size()? == size {
        return Ok(image.try_clone()?);
    }
    let mut out = Mat::default();
    imgproc::resize(image, &mut out, size, 0.0, 0.0, imgproc::INTER_LINEAR)?;
    Ok(out)
}

/// Checks an overlay and converts it to the channel count of `reference` so
/// the two can be concatenated. Fails with [`Error::InvalidImage`] when the
/// overlay is empty or cannot be converted.
pub fn prepare_overlay(image: &Mat, reference: &Mat) -> Result<Mat> {
    ensure_not_empty(image, "overlay")?;
    if image.depth() != reference.depth() {
        return Err(Error::InvalidImage(format!(
            "overlay depth {} does not match frame depth {}",
            image.depth(),
            reference.depth()
        )));
    }
    let code = match (image.channels(), reference.channels()) {
        (from, to) if from == to => return Ok(image.try_clone()?),
        (1, 3) => imgproc::COLOR_GRAY2BGR,
        (4, 3) => imgproc::COLOR_BGRA2BGR,
        (3, 1) => imgproc::COLOR_BGR2GRAY,
        (4, 1) => imgproc::COLOR_BGRA2GRAY,
        (1, 4) => imgproc::COLOR_GRAY2BGRA,
        (3, 4) => imgproc::COLOR_BGR2BGRA,
        (from, to) => {
            return Err(Error::InvalidImage(format!(
                "cannot convert {from}-channel overlay to {to} channels"
            )))
        }
    };
    let mut out = Mat::default();
    imgproc::cvt_color_def(image, &mut out, code)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_32FC3, CV_8UC1, CV_8UC3};

    fn solid(rows: i32, cols: i32, value: f64) -> Mat {
        Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, Scalar::all(value)).unwrap()
    }

    #[test]
    fn width_grows_by_one_target_per_overlay() {
        let base = solid(500, 700, 10.0);
        let overlays = vec![solid(300, 300, 50.0), solid(120, 640, 90.0), solid(500, 500, 1.0)];
        let out = compose(&base, &overlays, Dimensions::new(200, 500)).unwrap();
        assert_eq!(out.cols(), 700 + 3 * 200);
        assert_eq!(out.rows(), 500);
    }

    #[test]
    fn strip_is_stretched_to_frame_height() {
        let base = solid(480, 640, 10.0);
        let overlays = vec![solid(100, 100, 50.0), solid(100, 100, 60.0)];
        let out = compose(&base, &overlays, Dimensions::new(250, 250)).unwrap();
        assert_eq!(out.rows(), 480);
        assert_eq!(out.cols(), 640 + 500);
    }

    #[test]
    fn no_overlays_returns_identical_frame() {
        let base = solid(40, 60, 123.0);
        let out = compose(&base, &[], Dimensions::new(10, 10)).unwrap();
        assert_eq!(out.size().unwrap(), base.size().unwrap());
        assert_eq!(out.data_bytes().unwrap(), base.data_bytes().unwrap());
    }

    #[test]
    fn base_pixels_are_kept_on_the_left() {
        let base = solid(20, 30, 77.0);
        let out = compose(&base, &[solid(5, 5, 200.0)], Dimensions::new(10, 20)).unwrap();
        assert_eq!(*out.at_2d::<core::Vec3b>(0, 0).unwrap(), core::Vec3b::all(77));
        assert_eq!(*out.at_2d::<core::Vec3b>(0, 35).unwrap(), core::Vec3b::all(200));
    }

    #[test]
    fn empty_overlay_is_rejected() {
        let base = solid(20, 30, 1.0);
        let err = compose(&base, &[solid(5, 5, 2.0), Mat::default()], Dimensions::new(10, 10))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
    }

    #[test]
    fn grayscale_overlay_is_converted() {
        let base = solid(20, 30, 1.0);
        let gray = Mat::new_rows_cols_with_default(8, 8, CV_8UC1, Scalar::all(9.0)).unwrap();
        let overlay = prepare_overlay(&gray, &base).unwrap();
        assert_eq!(overlay.channels(), 3);
        let out = compose(&base, &[overlay], Dimensions::new(10, 20)).unwrap();
        assert_eq!(out.channels(), 3);
        assert_eq!(out.cols(), 40);
    }

    #[test]
    fn unusable_overlays_are_rejected_before_composing() {
        let base = solid(20, 30, 1.0);
        let float = Mat::new_rows_cols_with_default(8, 8, CV_32FC3, Scalar::all(0.5)).unwrap();
        assert!(matches!(
            prepare_overlay(&float, &base),
            Err(Error::InvalidImage(_))
        ));
        assert!(matches!(
            prepare_overlay(&Mat::default(), &base),
            Err(Error::InvalidImage(_))
        ));
    }

    #[test]
    fn inputs_are_left_untouched() {
        let base = solid(20, 30, 5.0);
        let overlay = solid(8, 8, 6.0);
        let _ = compose(&base, &[overlay.clone()], Dimensions::new(10, 10)).unwrap();
        assert_eq!(base.size().unwrap(), Size::new(30, 20));
        assert_eq!(overlay.size().unwrap(), Size::new(8, 8));
    }
}
