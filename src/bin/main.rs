use anyhow::Context;
use clap::Parser;
use emotion_overlay::{
    Dimensions, Error, HaarFaceLocator, HeadlessSink, OnnxEmotionClassifier, Pipeline,
    PolarChartRenderer, RunConfig, RunSummary, WindowSink,
};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Annotate faces in a video with their emotions and plot them next to the frame.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Video file to process.
    #[arg(long, env = "EMOTION_OVERLAY_VIDEO", default_value = "test.mp4")]
    video: PathBuf,

    /// Preview window width.
    #[arg(long, env = "EMOTION_OVERLAY_WIDTH", default_value_t = 1200)]
    width: i32,

    /// Preview window height.
    #[arg(long, env = "EMOTION_OVERLAY_HEIGHT", default_value_t = 400)]
    height: i32,

    /// Width every chart is stretched to.
    #[arg(long, env = "EMOTION_OVERLAY_CHART_WIDTH", default_value_t = 500)]
    chart_width: i32,

    /// Height every chart is stretched to.
    #[arg(long, env = "EMOTION_OVERLAY_CHART_HEIGHT", default_value_t = 500)]
    chart_height: i32,

    /// JSON file the per-person emotion history is written to.
    #[arg(long, env = "EMOTION_OVERLAY_DATA", default_value = "./uploads/data.json")]
    data: PathBuf,

    /// Rewrite the JSON file every N frames.
    #[arg(long, env = "EMOTION_OVERLAY_FLUSH_EVERY", default_value_t = 1)]
    flush_every: u64,

    /// Haar cascade for face detection, defaults to the one shipped with OpenCV.
    #[arg(long, env = "EMOTION_OVERLAY_CASCADE")]
    cascade: Option<PathBuf>,

    /// ONNX emotion model with seven outputs.
    #[arg(long, env = "EMOTION_OVERLAY_MODEL", default_value = "models/emotion.onnx")]
    model: PathBuf,

    /// Square input size the emotion model expects.
    #[arg(long, env = "EMOTION_OVERLAY_INPUT_SIZE", default_value_t = 64)]
    input_size: i32,

    /// Run without a preview window.
    #[arg(long, env = "EMOTION_OVERLAY_HEADLESS")]
    headless: bool,

    /// Title of the preview window.
    #[arg(long, env = "EMOTION_OVERLAY_WINDOW_TITLE", default_value = "Emotion Detection")]
    window_title: String,
}

impl Args {
    fn run_config(&self) -> RunConfig {
        RunConfig {
            video_path: self.video.clone(),
            data_path: self.data.clone(),
            display_size: Dimensions::new(self.width, self.height),
            chart_size: Dimensions::new(self.chart_width, self.chart_height),
            flush_every: self.flush_every,
            window_title: self.window_title.clone(),
            ..Default::default()
        }
    }
}

fn setup_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(env_filter)
            .init();
    }
}

fn run(args: &Args) -> anyhow::Result<RunSummary> {
    let config = args.run_config();
    config.validate().context("Invalid arguments")?;

    let locator =
        HaarFaceLocator::new(args.cascade.as_deref()).context("Failed to load face detector")?;
    let classifier = OnnxEmotionClassifier::new(&args.model, args.input_size)
        .context("Failed to load emotion classifier")?;
    let renderer = PolarChartRenderer::new(config.chart_size)?;
    let display_size = config.display_size;
    let window_title = config.window_title.clone();

    let mut pipeline = Pipeline::new(config, locator, classifier, renderer)?;
    let summary = if args.headless {
        pipeline.run_video(&mut HeadlessSink::new())?
    } else {
        let mut window = WindowSink::new(&window_title, display_size)?;
        pipeline.run_video(&mut window)?
    };
    Ok(summary)
}

fn main() -> anyhow::Result<()> {
    setup_tracing();
    let args: Args = Args::parse();

    match run(&args) {
        Ok(summary) => {
            info!(
                stop_reason = ?summary.stop_reason,
                frames = summary.frames_read,
                skipped = summary.frames_skipped,
                faces = summary.classified,
                data = %args.data.display(),
                "Done"
            );
            Ok(())
        }
        Err(e) => {
            if let Some(Error::SourceOpen(reason)) = e.downcast_ref::<Error>() {
                error!("Cannot open video: {}", reason);
            } else {
                error!("{:#}", e);
            }
            Err(e)
        }
    }
}
