//! The per-frame loop: locate faces, classify them, draw, stitch charts, persist.

use crate::chart::ChartRenderer;
use crate::compositor::{compose, ensure_not_empty, prepare_overlay};
use crate::config::RunConfig;
use crate::detection::{crop, Detection, FaceLocator};
use crate::emotion::EmotionClassifier;
use crate::error::{Error, Result};
use crate::history::{EmotionHistory, HistoryRecorder, JsonSink};
use crate::video::{DisplaySink, FrameSource, VideoFileSource};
use opencv::core::{Mat, Point, Rect};
use opencv::imgproc;
use opencv::prelude::*;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Cancelled,
    /// The source broke, or too many frames in a row failed to decode.
    SourceFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped(StopReason),
}

/// What happened to one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// 1-based position in the stream.
    pub index: u64,
    pub detections: usize,
    pub classified: usize,
    pub skipped: usize,
}

/// An annotated frame with the charts to show next to it.
struct ProcessedFrame {
    composite: Mat,
    report: FrameReport,
}

/// Totals for a finished run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stop_reason: StopReason,
    pub frames_read: u64,
    pub frames_skipped: u64,
    pub detections: usize,
    pub classified: usize,
    pub history: EmotionHistory,
}

pub struct Pipeline<L, C, R> {
    locator: L,
    classifier: C,
    renderer: R,
    config: RunConfig,
    state: LoopState,
}

impl<L, C, R> Pipeline<L, C, R>
where
    L: FaceLocator,
    C: EmotionClassifier,
    R: ChartRenderer,
{
    pub fn new(config: RunConfig, locator: L, classifier: C, renderer: R) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            locator,
            classifier,
            renderer,
            config,
            state: LoopState::Idle,
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Opens the configured video and runs until it ends or the user cancels.
    pub fn run_video<D: DisplaySink>(&mut self, display: &mut D) -> Result<RunSummary> {
        let source = VideoFileSource::open(&self.config.video_path)?;
        self.run(source, display)
    }

    /// Runs the loop over an already opened source.
    ///
    /// Only failing to prepare the JSON sink is returned as an error, every
    /// per-frame failure is logged and skipped. The history file is written
    /// one last time however the loop ends.
    pub fn run<S, D>(&mut self, mut source: S, display: &mut D) -> Result<RunSummary>
    where
        S: FrameSource,
        D: DisplaySink,
    {
        let sink = JsonSink::create(&self.config.data_path)?;
        let mut recorder = HistoryRecorder::new(sink, self.config.flush_every);

        self.state = LoopState::Running;
        info!(data = %self.config.data_path.display(), "Processing started");

        let mut index = 0;
        let mut frames_read = 0;
        let mut frames_skipped = 0;
        let mut decode_failures = 0;
        let mut detections = 0;
        let mut classified = 0;

        let stop_reason = loop {
            index += 1;
            let frame = match source.next_frame() {
                Ok(Some(frame)) => {
                    decode_failures = 0;
                    frames_read += 1;
                    frame
                }
                Ok(None) => break StopReason::EndOfStream,
                Err(e) if !e.is_recoverable() => {
                    error!(frame = index, "Video source failed: {}", e);
                    break StopReason::SourceFailed;
                }
                Err(e) => {
                    decode_failures += 1;
                    frames_skipped += 1;
                    warn!(frame = index, "Skipping frame: {}", e);
                    if decode_failures >= self.config.max_decode_failures {
                        warn!(
                            failures = decode_failures,
                            "Giving up on video source after repeated decode failures"
                        );
                        break StopReason::SourceFailed;
                    }
                    continue;
                }
            };

            match self.process_frame(index, frame, recorder.history_mut()) {
                Ok(processed) => {
                    detections += processed.report.detections;
                    classified += processed.report.classified;
                    debug!(
                        frame = index,
                        detections = processed.report.detections,
                        classified = processed.report.classified,
                        skipped = processed.report.skipped,
                        "Frame processed"
                    );
                    if let Err(e) = display.show(&processed.composite) {
                        warn!(frame = index, "Failed to display frame: {}", e);
                    }
                }
                Err(e) => {
                    frames_skipped += 1;
                    warn!(frame = index, "Skipping frame: {}", e);
                }
            }

            if let Err(e) = recorder.end_frame() {
                warn!(frame = index, "Failed to write emotion history: {}", e);
            }

            match display.poll_cancel() {
                Ok(true) => break StopReason::Cancelled,
                Ok(false) => {}
                Err(e) => warn!(frame = index, "Failed to poll for cancel: {}", e),
            }
        };

        self.state = LoopState::Stopped(stop_reason);
        let history = recorder.finish()?;
        info!(
            ?stop_reason,
            frames_read,
            frames_skipped,
            people = history.len(),
            "Processing finished"
        );

        Ok(RunSummary {
            stop_reason,
            frames_read,
            frames_skipped,
            detections,
            classified,
            history,
        })
    }

    /// Annotates one frame, records every classified face in `history` and
    /// returns the frame with its charts stitched on.
    ///
    /// Errors mean the whole frame is lost and nothing is recorded for it. A
    /// single face that cannot be classified only loses its label, chart and
    /// history entry. A chart that cannot be stitched only loses the chart.
    fn process_frame(
        &mut self,
        index: u64,
        frame: Mat,
        history: &mut EmotionHistory,
    ) -> Result<ProcessedFrame> {
        let mut frame = self.resize_to_working_size(frame)?;
        let detections = self.locator.locate(&frame)?;

        // crop before drawing so boxes don't bleed into neighbouring faces
        let crops: Vec<Result<Mat>> = detections.iter().map(|d| crop(&frame, d.bbox)).collect();

        let mut report = FrameReport {
            index,
            detections: detections.len(),
            ..Default::default()
        };
        let mut overlays = Vec::with_capacity(detections.len());
        let mut classified = Vec::with_capacity(detections.len());

        for (detection, face) in detections.iter().zip(crops) {
            draw_box(&mut frame, detection.bbox)?;

            let distribution = match face.and_then(|face| self.classifier.classify(&face)) {
                Ok(distribution) => distribution,
                Err(e) => {
                    report.skipped += 1;
                    warn!(frame = index, person = %detection.person_id, "Skipping face: {}", e);
                    continue;
                }
            };

            let (emotion, confidence) = distribution.dominant();
            draw_label(
                &mut frame,
                detection,
                &format!("{}: {emotion} {confidence:.1}%", detection.person_id),
            )?;

            let chart = self
                .renderer
                .render(&detection.person_id, &distribution)
                .and_then(|chart| prepare_overlay(&chart, &frame));
            match chart {
                Ok(chart) => overlays.push(chart),
                Err(e) => {
                    warn!(frame = index, person = %detection.person_id, "Dropping chart: {}", e);
                }
            }

            classified.push((detection.person_id.as_str(), distribution));
        }

        let composite = compose(&frame, &overlays, self.config.chart_size)?;

        report.classified = classified.len();
        for (person_id, distribution) in classified {
            history.record(person_id, distribution);
        }
        Ok(ProcessedFrame { composite, report })
    }

    fn resize_to_working_size(&self, frame: Mat) -> Result<Mat> {
        ensure_not_empty(&frame, "frame").map_err(|e| Error::FrameDecode(e.to_string()))?;
        let Some(size) = self.config.frame_size else {
            return Ok(frame);
        };
        if frame.cols() == size.width && frame.rows() == size.height {
            return Ok(frame);
        }
        let mut resized = Mat::default();
        imgproc::resize(&frame, &mut resized, size.into(), 0.0, 0.0, imgproc::INTER_LINEAR)?;
        Ok(resized)
    }
}

fn draw_box(frame: &mut Mat, bbox: Rect) -> Result<()> {
    imgproc::rectangle(frame, bbox, (0, 255, 0).into(), 2, imgproc::LINE_8, 0)?;
    Ok(())
}

fn draw_label(frame: &mut Mat, detection: &Detection, text: &str) -> Result<()> {
    let bbox = detection.bbox;
    // inside the box when there is no room above it
    let y = if bbox.y > 20 { bbox.y - 8 } else { bbox.y + 20 };
    imgproc::put_text(
        frame,
        text,
        Point::new(bbox.x, y),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.6,
        (0, 255, 0).into(),
        2,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}
