pub mod chart;
pub mod compositor;
pub mod config;
pub mod detection;
pub mod emotion;
pub mod error;
pub mod history;
pub mod pipeline;
pub mod video;

pub use chart::{ChartRenderer, PolarChartRenderer};
pub use compositor::compose;
pub use config::{Dimensions, RunConfig};
pub use detection::{Detection, FaceLocator, HaarFaceLocator};
pub use emotion::{Emotion, EmotionClassifier, EmotionDistribution, OnnxEmotionClassifier};
pub use error::{Error, Result};
pub use history::{EmotionHistory, HistoryRecorder, JsonSink};
pub use pipeline::{FrameReport, LoopState, Pipeline, RunSummary, StopReason};
pub use video::{DisplaySink, FrameSource, HeadlessSink, VideoFileSource, WindowSink};
