use anyhow::{Error, Result};
use image::{DynamicImage, EncodableLayout, RgbaImage};
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use tracing::{debug, error};

pub trait FrameSource {
    /// Next frame, `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<RgbaImage>>;
}

pub trait FrameSink {
    fn write_frame(&mut self, img: &RgbaImage) -> Result<()>;
}

/// Yields a single decoded image file once.
pub struct ImageSource {
    img: Option<RgbaImage>,
}

impl ImageSource {
    pub fn open(path: &Path) -> Result<Self> {
        let img: RgbaImage = image::open(path)?.into();
        Ok(Self { img: Some(img) })
    }

    /// The frame, if it has not been pulled yet.
    pub fn peek(&self) -> Option<&RgbaImage> {
        self.img.as_ref()
    }
}

impl FrameSource for ImageSource {
    fn next_frame(&mut self) -> Result<Option<RgbaImage>> {
        Ok(self.img.take())
    }
}

/// In memory frame queue.
#[derive(Debug, Default)]
pub struct MemorySource {
    frames: VecDeque<RgbaImage>,
}

impl MemorySource {
    pub fn new(frames: impl IntoIterator<Item = RgbaImage>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<RgbaImage>> {
        Ok(self.frames.pop_front())
    }
}

/// Collects every frame written to it.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub frames: Vec<RgbaImage>,
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, img: &RgbaImage) -> Result<()> {
        self.frames.push(img.clone());
        Ok(())
    }
}

/// Saves the most recent frame to an image file.
pub struct ImageSink {
    path: PathBuf,
}

impl ImageSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl FrameSink for ImageSink {
    fn write_frame(&mut self, img: &RgbaImage) -> Result<()> {
        let lossy = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));

        // jpeg has no alpha channel
        if lossy {
            DynamicImage::ImageRgba8(img.clone()).to_rgb8().save(&self.path)?;
        } else {
            img.save(&self.path)?;
        }
        Ok(())
    }
}

fn parse_dimensions(probe: &str) -> Result<(u32, u32)> {
    let line = probe.lines().next().unwrap_or_default().trim();
    let (w, h) = line
        .split_once('x')
        .ok_or_else(|| Error::msg(format!("Unexpected ffprobe output {line:?}")))?;

    Ok((w.trim().parse()?, h.trim().parse()?))
}

/// Decodes a video file to raw rgba frames through an ffmpeg subprocess.
pub struct VideoFileSource {
    decoder: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
}

impl VideoFileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let probe = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height",
                "-of",
                "csv=s=x:p=0",
            ])
            .arg(path)
            .stderr(Stdio::inherit())
            .output()?;
        if !probe.status.success() {
            return Err(Error::msg(format!("ffprobe failed for {path:?}")));
        }
        let (width, height) = parse_dimensions(&String::from_utf8_lossy(&probe.stdout))?;
        debug!("Decoding {path:?} at {width}x{height}");

        let mut decoder = Command::new("ffmpeg")
            .args(["-loglevel", "error", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgba", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        let stdout = decoder
            .stdout
            .take()
            .ok_or_else(|| Error::msg("ffmpeg stdout unavailable"))?;

        Ok(Self {
            decoder,
            stdout,
            width,
            height,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<RgbaImage>> {
        let mut buf = vec![0u8; self.width as usize * self.height as usize * 4];
        match self.stdout.read_exact(&mut buf) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        RgbaImage::from_raw(self.width, self.height, buf)
            .map(Some)
            .ok_or_else(|| Error::msg("Frame buffer size mismatch"))
    }
}

impl Drop for VideoFileSource {
    fn drop(&mut self) {
        if let Err(e) = self.decoder.kill() {
            debug!("ffmpeg decoder already gone: {e:?}");
        }
        let _ = self.decoder.wait();
    }
}

/// Pipes raw rgba frames into ffplay for display, or into ffmpeg writing a
/// v4l2 loopback device.
pub struct OutputVideoStream {
    output_proc: Child,
}

impl Drop for OutputVideoStream {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            error!("Failed to stop output process {e:?}");
        }
    }
}

impl OutputVideoStream {
    pub fn new(width: u32, height: u32, device: Option<String>) -> Result<Self> {
        let size = format!("{width}x{height}");
        let mut command = match device {
            Some(d) => {
                let device_path = format!("/dev/{d}");
                let mut command = Command::new("ffmpeg");
                command.args([
                    "-f",
                    "rawvideo",
                    "-pix_fmt",
                    "rgba",
                    "-s",
                    size.as_str(),
                    "-i",
                    "-",
                    "-map",
                    "0:v",
                    "-preset",
                    "fast",
                    "-vf",
                    "format=yuv420p",
                    "-f",
                    "v4l2",
                    device_path.as_str(),
                ]);
                command
            }
            None => {
                let mut command = Command::new("ffplay");
                command.args([
                    "-f",
                    "rawvideo",
                    "-pixel_format",
                    "rgba",
                    "-video_size",
                    size.as_str(),
                    "-fflags",
                    "nobuffer",
                    "-flags",
                    "low_delay",
                    "-autoexit",
                    "-",
                ]);
                command
            }
        };

        Self::spawn(command)
    }

    fn spawn(mut command: Command) -> Result<Self> {
        let output_proc = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()?;

        Ok(Self { output_proc })
    }

    /// Ends the stream and waits for the output process to exit.
    pub fn close(mut self) -> Result<ExitStatus> {
        self.finish()
    }

    fn finish(&mut self) -> Result<ExitStatus> {
        drop(self.output_proc.stdin.take());
        Ok(self.output_proc.wait()?)
    }
}

impl FrameSink for OutputVideoStream {
    fn write_frame(&mut self, img: &RgbaImage) -> Result<()> {
        if let Some(stdin) = self.output_proc.stdin.as_mut() {
            stdin.write_all(img.as_bytes())?;
        }

        Ok(())
    }
}

#[cfg(feature = "camera")]
pub use camera::CameraSource;

#[cfg(feature = "camera")]
mod camera {
    use super::FrameSource;
    use anyhow::{Error, Result};
    use image::RgbaImage;
    use nokhwa::{
        Camera, nokhwa_initialize,
        pixel_format::RgbAFormat,
        query,
        utils::{ApiBackend, RequestedFormat, RequestedFormatType},
    };
    use tracing::{debug, error};

    /// Webcam frames, last camera reported by the platform backend.
    pub struct CameraSource {
        camera: Camera,
    }

    impl CameraSource {
        pub fn open(fps: u32) -> Result<Self> {
            nokhwa_initialize(|granted| {
                debug!("User said {}", granted);
            });

            let cameras = query(ApiBackend::Auto)?;
            cameras
                .iter()
                .for_each(|cam| debug!("Found camera: {:?}", cam));

            let info = cameras
                .last()
                .ok_or_else(|| Error::msg("No camera found"))?;
            let mut camera = Camera::new(
                info.index().clone(),
                RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
            )?;

            camera.set_frame_rate(fps)?;
            camera.open_stream()?;
            Ok(Self { camera })
        }

        pub fn resolution(&self) -> (u32, u32) {
            let r = self.camera.resolution();
            (r.width(), r.height())
        }
    }

    impl FrameSource for CameraSource {
        fn next_frame(&mut self) -> Result<Option<RgbaImage>> {
            let frame = self.camera.frame()?;
            Ok(Some(frame.decode_image::<RgbAFormat>()?))
        }
    }

    impl Drop for CameraSource {
        fn drop(&mut self) {
            if let Err(e) = self.camera.stop_stream() {
                error!("Failed to stop camera stream {e:?}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn parses_probe_output() -> Result<()> {
        assert_eq!(parse_dimensions("1280x720\n")?, (1280, 720));
        assert!(parse_dimensions("garbage").is_err());
        assert!(parse_dimensions("").is_err());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn closing_output_stream_reaps_process() -> Result<()> {
        let mut stream = OutputVideoStream::spawn(Command::new("cat"))?;
        stream.write_frame(&RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255])))?;

        // cat only exits once its stdin is closed
        let status = stream.close()?;
        assert!(status.success());
        Ok(())
    }

    #[test]
    fn memory_source_drains_in_order() -> Result<()> {
        let a = RgbaImage::from_pixel(1, 1, Rgba([1, 2, 3, 4]));
        let b = RgbaImage::from_pixel(1, 1, Rgba([5, 6, 7, 8]));
        let mut source = MemorySource::new([a.clone(), b.clone()]);

        assert_eq!(source.next_frame()?, Some(a));
        assert_eq!(source.next_frame()?, Some(b));
        assert_eq!(source.next_frame()?, None);
        Ok(())
    }
}
