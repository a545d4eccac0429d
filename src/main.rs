#![warn(unused_extern_crates)]
use anyhow::{Error, Result};
use clap::{Args, Parser, ValueEnum};
use facetone::geometry;
use facetone::params::{Controls, DetailMode, FilterParameters};
use facetone::pipeline::Detector;
use facetone::scheduler::FrameScheduler;
use facetone::video::{FrameSource, ImageSink, ImageSource, OutputVideoStream, VideoFileSource};
use pollster::FutureExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct CmdArgs {
    /// Target frame rate
    #[arg(long, default_value = "30")]
    fps: u32,

    /// Delay (ms) between face landmark detections
    #[arg(long, default_value = "200")]
    detect_interval_ms: u64,

    /// Max threads used for pixel processing and inference
    #[arg(short, long)]
    max_threads: Option<usize>,

    /// Face landmark model (onnx) to locate the face region with
    #[arg(long, value_name = "FILE")]
    model: Option<PathBuf>,

    /// Minimum face presence score for a detection to count
    #[arg(long, default_value = "0.5")]
    face_threshold: f32,

    /// Outline the face region on every output frame
    #[arg(long)]
    trace: bool,

    #[command(flatten)]
    filter: FilterArgs,

    /// Read frames from a video file instead of the webcam
    #[arg(long, value_name = "FILE", conflicts_with = "input")]
    video: Option<PathBuf>,

    #[command(flatten)]
    out: Out,

    /// Process single input frame, reading from input path
    #[arg(short, long, requires = "output")]
    input: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[group(multiple = false)]
struct Out {
    /// Loopback device to write to. Displays in window if unset
    #[arg(group = "dest", short, long)]
    device: Option<String>,

    /// Process single input frame, writing to output path
    #[arg(group = "dest", short, long, requires = "input")]
    output: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Mode {
    Smooth,
    SharpenBlur,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Detail filter applied inside the face region
    #[arg(long, value_enum, default_value_t = Mode::Smooth)]
    mode: Mode,

    /// Detail strength 0. - 1. (sharpen-blur: 0.5 leaves detail untouched)
    #[arg(short, long, default_value = "0.5")]
    strength: f32,

    /// Added to every channel, 0. - 0.5
    #[arg(long, default_value = "0")]
    brightness: f32,

    /// Saturation multiplier, 0.5 - 2.
    #[arg(long, default_value = "1")]
    saturation: f32,

    /// Contrast around mid gray, 0.5 - 2.
    #[arg(long, default_value = "1")]
    contrast: f32,

    /// Hue shift in degrees, -90 - 90
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    hue: f32,

    /// Pass frames through untouched
    #[arg(long)]
    no_effect: bool,

    /// Apply the effect to the whole frame instead of the face region
    #[arg(long)]
    no_face_mask: bool,
}

impl From<&FilterArgs> for FilterParameters {
    fn from(a: &FilterArgs) -> FilterParameters {
        FilterParameters {
            detail_mode: match a.mode {
                Mode::Smooth => DetailMode::Smooth,
                Mode::SharpenBlur => DetailMode::SharpenBlur,
            },
            detail_strength: a.strength,
            brightness: a.brightness,
            saturation: a.saturation,
            contrast: a.contrast,
            hue: a.hue,
            effect_enabled: !a.no_effect,
            face_mask_enabled: !a.no_face_mask,
        }
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env();
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_env_filter(filter)
        .init();

    let args = CmdArgs::parse();

    let total_threads = num_cpus::get();
    let threads = args
        .max_threads
        .unwrap_or(total_threads)
        .clamp(1, total_threads.max(1));
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()?;
    debug!("Using {threads} threads");

    let controls = Controls::new(FilterParameters::from(&args.filter));

    let detector = load_detector(&args, threads)?;
    if detector.is_none() && controls.snapshot().face_mask_enabled {
        warn!("No face landmark model configured, applying effect to the whole frame");
        controls.update(|p| p.face_mask_enabled = false);
    }

    if let (Some(input), Some(output)) = (&args.input, &args.out.output) {
        // Process single image at file and exit
        return process_image(input, output, detector, &controls, args.trace);
    }

    let mut scheduler = match detector {
        Some(d) => {
            FrameScheduler::with_detector(d, Duration::from_millis(args.detect_interval_ms))?
        }
        None => FrameScheduler::new(),
    };
    scheduler.set_trace(args.trace);

    let (mut source, (width, height)) = open_source(&args)?;
    let mut output_stream = OutputVideoStream::new(width, height, args.out.device.clone())?;

    let frames = scheduler.run(source.as_mut(), &mut output_stream, &controls);
    info!("Processed {frames} frames");
    output_stream.close()?;

    Ok(())
}

fn process_image<D: Detector>(
    src: &Path,
    dest: &Path,
    detector: Option<D>,
    controls: &Controls,
    trace: bool,
) -> Result<()> {
    let mut source = ImageSource::open(src)?;
    let mut scheduler = FrameScheduler::new();
    scheduler.set_trace(trace);

    // No later frames to catch up on, so detect before processing
    if let (Some(mut detector), Some(img)) = (detector, source.peek()) {
        match detector.detect(img).block_on() {
            Ok(detection) => scheduler
                .shared_ellipse()
                .commit(geometry::face_ellipse(&detection)),
            Err(e) => warn!("Face detection failed, leaving image untouched: {e:?}"),
        }
    }

    let mut sink = ImageSink::new(dest.to_path_buf());
    match scheduler.run(&mut source, &mut sink, controls) {
        0 => Err(Error::msg(format!("Failed to write {dest:?}"))),
        _ => {
            info!("Result at {dest:?}");
            Ok(())
        }
    }
}

type OpenedSource = (Box<dyn FrameSource>, (u32, u32));

fn open_source(args: &CmdArgs) -> Result<OpenedSource> {
    match &args.video {
        Some(path) => {
            let source = VideoFileSource::open(path)?;
            let resolution = source.resolution();
            Ok((Box::new(source), resolution))
        }
        None => open_camera(args.fps),
    }
}

#[cfg(feature = "camera")]
fn open_camera(fps: u32) -> Result<OpenedSource> {
    let source = facetone::video::CameraSource::open(fps)?;
    let resolution = source.resolution();
    Ok((Box::new(source), resolution))
}

#[cfg(not(feature = "camera"))]
fn open_camera(_fps: u32) -> Result<OpenedSource> {
    Err(Error::msg(
        "Built without webcam support, pass --video <FILE> or enable the camera feature",
    ))
}

#[cfg(feature = "onnx")]
fn load_detector(
    args: &CmdArgs,
    threads: usize,
) -> Result<Option<facetone::pipeline::landmarks::MeshDetector>> {
    args.model
        .as_deref()
        .map(|path| {
            facetone::pipeline::landmarks::MeshDetector::new(path, threads, args.face_threshold)
        })
        .transpose()
}

#[cfg(not(feature = "onnx"))]
fn load_detector(
    args: &CmdArgs,
    _threads: usize,
) -> Result<Option<facetone::pipeline::FixedDetector>> {
    match &args.model {
        Some(path) => Err(Error::msg(format!(
            "Built without the onnx feature, cannot load {path:?} (threshold {})",
            args.face_threshold
        ))),
        None => Ok(None),
    }
}
