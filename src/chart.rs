use crate::config::Dimensions;
use crate::emotion::{Emotion, EmotionDistribution};
use crate::error::{Error, Result};
use opencv::core::{self, Mat, Point, Vector};
use opencv::imgproc;
use opencv::prelude::*;
use std::f64::consts::PI;

/// Draws a chart image for one person's distribution.
pub trait ChartRenderer {
    fn render(&mut self, person_id: &str, distribution: &EmotionDistribution) -> Result<Mat>;
}

/// Radar chart with one spoke per emotion, rings at 25/50/75/100 percent.
pub struct PolarChartRenderer {
    size: Dimensions,
}

impl PolarChartRenderer {
    pub fn new(size: Dimensions) -> Result<Self> {
        if size.width < 100 || size.height < 100 {
            return Err(Error::Config(format!(
                "chart canvas must be at least 100x100, got {}x{}",
                size.width, size.height
            )));
        }
        Ok(Self { size })
    }

    fn center(&self) -> Point {
        Point::new(self.size.width / 2, self.size.height / 2 + 15)
    }

    fn radius(&self) -> f64 {
        (self.size.width.min(self.size.height) as f64 / 2.0 - 60.0).max(20.0)
    }

    /// Position of `emotion`'s spoke at `percent` of the full radius.
    fn spoke_point(&self, emotion: Emotion, percent: f64) -> Point {
        let angle = spoke_angle(emotion);
        let r = self.radius() * percent / 100.0;
        let center = self.center();
        Point::new(
            center.x + (r * angle.cos()).round() as i32,
            center.y - (r * angle.sin()).round() as i32,
        )
    }

    fn draw_grid(&self, canvas: &mut Mat) -> Result<()> {
        let center = self.center();
        for ring in [25.0, 50.0, 75.0, 100.0] {
            let radius = (self.radius() * ring / 100.0).round() as i32;
            imgproc::circle(
                canvas,
                center,
                radius,
                (200, 200, 200).into(),
                1,
                imgproc::LINE_AA,
                0,
            )?;
        }
        for emotion in Emotion::ALL {
            let end = self.spoke_point(emotion, 100.0);
            imgproc::line(canvas, center, end, (200, 200, 200).into(), 1, imgproc::LINE_AA, 0)?;

            let label_anchor = self.spoke_point(emotion, 115.0);
            let mut baseline = 0;
            let text_size = imgproc::get_text_size(
                emotion.as_str(),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.45,
                1,
                &mut baseline,
            )?;
            let origin = Point::new(
                label_anchor.x - text_size.width / 2,
                label_anchor.y + text_size.height / 2,
            );
            imgproc::put_text(
                canvas,
                emotion.as_str(),
                origin,
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.45,
                (40, 40, 40).into(),
                1,
                imgproc::LINE_AA,
                false,
            )?;
        }
        Ok(())
    }

    fn draw_distribution(
        &self,
        canvas: &mut Mat,
        distribution: &EmotionDistribution,
    ) -> Result<()> {
        let points: Vector<Point> = distribution
            .iter()
            .map(|(emotion, value)| self.spoke_point(emotion, value))
            .collect();
        let mut polygon: Vector<Vector<Point>> = Vector::new();
        polygon.push(points);

        // translucent fill
        let mut filled = canvas.try_clone()?;
        imgproc::fill_poly(
            &mut filled,
            &polygon,
            (230, 120, 30).into(),
            imgproc::LINE_AA,
            0,
            Point::default(),
        )?;
        let mut blended = Mat::default();
        core::add_weighted(&filled, 0.35, &*canvas, 0.65, 0.0, &mut blended, -1)?;
        *canvas = blended;

        imgproc::polylines(
            canvas,
            &polygon,
            true,
            (230, 120, 30).into(),
            2,
            imgproc::LINE_AA,
            0,
        )?;
        Ok(())
    }

    fn draw_title(
        &self,
        canvas: &mut Mat,
        person_id: &str,
        distribution: &EmotionDistribution,
    ) -> Result<()> {
        let (emotion, confidence) = distribution.dominant();
        let title = format!("Person {person_id}: {emotion} {confidence:.1}%");
        imgproc::put_text(
            canvas,
            &title,
            Point::new(10, 25),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.6,
            (40, 40, 40).into(),
            1,
            imgproc::LINE_AA,
            false,
        )?;
        Ok(())
    }
}

impl ChartRenderer for PolarChartRenderer {
    fn render(&mut self, person_id: &str, distribution: &EmotionDistribution) -> Result<Mat> {
        let mut canvas = Mat::new_rows_cols_with_default(
            self.size.height,
            self.size.width,
            core::CV_8UC3,
            (255, 255, 255).into(),
        )?;
        self.draw_grid(&mut canvas)?;
        self.draw_distribution(&mut canvas, distribution)?;
        self.draw_title(&mut canvas, person_id, distribution)?;
        Ok(canvas)
    }
}

/// Spokes start at twelve o'clock and go clockwise.
fn spoke_angle(emotion: Emotion) -> f64 {
    PI / 2.0 - emotion.index() as f64 * 2.0 * PI / Emotion::ALL.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_configured_canvas() {
        let mut renderer = PolarChartRenderer::new(Dimensions::new(320, 240)).unwrap();
        let dist =
            EmotionDistribution::from_pairs(&[(Emotion::Happy, 80.0), (Emotion::Neutral, 20.0)])
                .unwrap();
        let chart = renderer.render("1", &dist).unwrap();
        assert_eq!(chart.rows(), 240);
        assert_eq!(chart.cols(), 320);
        assert_eq!(chart.typ(), core::CV_8UC3);
    }

    #[test]
    fn first_spoke_points_up() {
        let renderer = PolarChartRenderer::new(Dimensions::new(400, 400)).unwrap();
        let center = renderer.center();
        let top = renderer.spoke_point(Emotion::Angry, 100.0);
        assert_eq!(top.x, center.x);
        assert!(top.y < center.y);
        assert_eq!(renderer.spoke_point(Emotion::Sad, 0.0), center);
    }

    #[test]
    fn tiny_canvas_is_rejected() {
        assert!(matches!(
            PolarChartRenderer::new(Dimensions::new(50, 50)),
            Err(Error::Config(_))
        ));
    }
}
