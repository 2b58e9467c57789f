// ffmpeg.rs — V4L2 camera streams read through an `ffmpeg` child process.
//
// ffmpeg writes a continuous sequence of binary PPM (P6) frames to stdout.
// A reader thread parses them and keeps only the newest one on a bounded
// channel, so grabbing a frame always returns the current picture.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use image::RgbImage;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::camera::{CameraBackend, FacingMode, StreamConstraints, VideoStream};
use super::CaptureError;
use crate::settings::Settings;

/// How long `open` waits for the device to deliver its first frame.
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(5);

type FrameResult = Result<RgbImage, String>;

pub struct FfmpegCamera {
    ffmpeg_path: PathBuf,
    front_device: PathBuf,
    back_device: PathBuf,
}

impl FfmpegCamera {
    pub fn new(
        ffmpeg_path: impl Into<PathBuf>,
        front_device: impl Into<PathBuf>,
        back_device: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            front_device: front_device.into(),
            back_device: back_device.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.ffmpeg_path,
            &settings.front_camera,
            &settings.back_camera,
        )
    }

    fn device_for(&self, facing: FacingMode) -> &Path {
        match facing {
            FacingMode::User => &self.front_device,
            FacingMode::Environment => &self.back_device,
        }
    }
}

impl CameraBackend for FfmpegCamera {
    fn open(&self, constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>, CaptureError> {
        let device = self.device_for(constraints.facing);
        probe_device(device)?;

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-f")
            .arg("video4linux2")
            .arg("-video_size")
            .arg(format!(
                "{}x{}",
                constraints.ideal_width, constraints.ideal_height
            ))
            .arg("-i")
            .arg(device)
            .arg("-an")
            .arg("-f")
            .arg("image2pipe")
            .arg("-c:v")
            .arg("ppm")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CaptureError::CameraUnavailable(format!(
                "ffmpeg not found at {}",
                self.ffmpeg_path.display()
            )),
            io::ErrorKind::PermissionDenied => {
                CaptureError::PermissionDenied(format!("cannot run {}", self.ffmpeg_path.display()))
            }
            _ => CaptureError::StreamError(format!("spawn ffmpeg: {e}")),
        })?;

        let stdout = match child.stdout.take() {
            Some(out) => out,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CaptureError::StreamError("failed to capture ffmpeg stdout".into()));
            }
        };

        let (tx, rx) = bounded(1);
        let drain = rx.clone();
        let reader = thread::spawn(move || frame_loop(BufReader::new(stdout), tx, drain));

        // A spawned ffmpeg may still exit at once on a device it cannot use.
        // Only a delivered frame counts as an open camera.
        let first = match rx.recv_timeout(FIRST_FRAME_TIMEOUT) {
            Ok(Ok(frame)) => frame,
            Ok(Err(reason)) => return Err(abandon(child, reader, device, &reason)),
            Err(RecvTimeoutError::Timeout) => {
                return Err(abandon(child, reader, device, "no frame before timeout"))
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(abandon(child, reader, device, "stream ended before the first frame"))
            }
        };

        log::info!(
            "Camera opened: {} ({}, ideal {}x{})",
            device.display(),
            constraints.facing.as_str(),
            constraints.ideal_width,
            constraints.ideal_height
        );

        Ok(Box::new(FfmpegStream {
            facing: constraints.facing,
            child: Some(child),
            reader: Some(reader),
            frames: rx,
            latest: Some(first),
        }))
    }

    fn name(&self) -> &str {
        "ffmpeg-v4l2"
    }
}

/// Tear down a stream that never became usable.
fn abandon(mut child: Child, reader: JoinHandle<()>, device: &Path, reason: &str) -> CaptureError {
    let _ = child.kill();
    let status = child.wait();
    let _ = reader.join();
    let exit = match status {
        Ok(status) => format!(", ffmpeg {status}"),
        Err(_) => String::new(),
    };
    log::error!("Camera {} failed to start: {}{}", device.display(), reason, exit);
    CaptureError::CameraUnavailable(format!("{}: {reason}{exit}", device.display()))
}

/// Open the device node once to tell "missing" apart from "not allowed".
fn probe_device(path: &Path) -> Result<(), CaptureError> {
    match std::fs::File::open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(CaptureError::CameraUnavailable(
            format!("no camera device at {}", path.display()),
        )),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            Err(CaptureError::PermissionDenied(path.display().to_string()))
        }
        Err(e) => Err(CaptureError::CameraUnavailable(format!(
            "{}: {e}",
            path.display()
        ))),
    }
}

struct FfmpegStream {
    facing: FacingMode,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    frames: Receiver<FrameResult>,
    latest: Option<RgbImage>,
}

impl VideoStream for FfmpegStream {
    fn facing(&self) -> FacingMode {
        self.facing
    }

    fn grab_frame(&mut self) -> Result<RgbImage, CaptureError> {
        if self.child.is_none() {
            return Err(CaptureError::CameraInactive);
        }

        let mut fresh = false;
        loop {
            match self.frames.try_recv() {
                Ok(frame) => {
                    self.latest = Some(frame.map_err(CaptureError::StreamError)?);
                    fresh = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) if fresh => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(CaptureError::StreamError("camera stream ended".into()))
                }
            }
        }

        self.latest
            .clone()
            .ok_or_else(|| CaptureError::StreamError("no frame from camera".into()))
    }

    fn is_live(&mut self) -> bool {
        let running = match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        };
        running && self.reader.as_ref().is_some_and(|r| !r.is_finished())
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            log::info!("Camera stream stopped ({})", self.facing.as_str());
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        self.latest = None;
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Parse frames until EOF, replacing any frame nobody has picked up yet.
fn frame_loop<R: BufRead>(mut input: R, tx: Sender<FrameResult>, drain: Receiver<FrameResult>) {
    loop {
        let item = match read_ppm_frame(&mut input) {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => break,
            Err(e) => Err(format!("bad frame from ffmpeg: {e}")),
        };
        let failed = item.is_err();

        if let Err(TrySendError::Full(item)) = tx.try_send(item) {
            let _ = drain.try_recv();
            let _ = tx.try_send(item);
        }
        if failed {
            break;
        }
    }
    log::debug!("Camera reader thread finished");
}

/// Read one binary PPM image. `Ok(None)` on a clean end of stream.
pub(crate) fn read_ppm_frame<R: BufRead>(input: &mut R) -> io::Result<Option<RgbImage>> {
    let magic = match read_token(input)? {
        Some(t) => t,
        None => return Ok(None),
    };
    if magic != "P6" {
        return Err(invalid(format!("expected P6, got {magic:?}")));
    }

    let width = read_number(input, "width")?;
    let height = read_number(input, "height")?;
    let maxval = read_number(input, "maxval")?;
    if maxval == 0 || maxval > 255 {
        return Err(invalid(format!("unsupported maxval {maxval}")));
    }

    let len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(3))
        .ok_or_else(|| invalid("frame too large".into()))?;
    let mut data = vec![0u8; len];
    input.read_exact(&mut data)?;

    RgbImage::from_raw(width, height, data)
        .map(Some)
        .ok_or_else(|| invalid("frame size mismatch".into()))
}

/// Next whitespace-delimited header token, skipping `#` comments. Consumes
/// exactly one whitespace byte after the token, which is where the PPM raster
/// starts after `maxval`.
fn read_token<R: BufRead>(input: &mut R) -> io::Result<Option<String>> {
    let mut token = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        if input.read(&mut byte)? == 0 {
            if token.is_empty() {
                return Ok(None);
            }
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        match byte[0] {
            b'#' if token.is_empty() => {
                let mut comment = Vec::new();
                input.read_until(b'\n', &mut comment)?;
            }
            b if b.is_ascii_whitespace() => {
                if !token.is_empty() {
                    return Ok(Some(String::from_utf8_lossy(&token).into_owned()));
                }
            }
            b => token.push(b),
        }
    }
}

fn read_number<R: BufRead>(input: &mut R, field: &str) -> io::Result<u32> {
    let token = read_token(input)?.ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
    token
        .parse()
        .map_err(|_| invalid(format!("bad {field} {token:?}")))
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ppm(w: u32, h: u32, fill: u8) -> Vec<u8> {
        let mut out = format!("P6\n{w} {h}\n255\n").into_bytes();
        out.extend(std::iter::repeat(fill).take((w * h * 3) as usize));
        out
    }

    #[test]
    fn reads_consecutive_frames() {
        let mut stream = ppm(4, 3, 10);
        stream.extend(ppm(2, 2, 200));
        let mut input = Cursor::new(stream);

        let first = read_ppm_frame(&mut input).unwrap().unwrap();
        assert_eq!(first.dimensions(), (4, 3));
        assert_eq!(first.get_pixel(0, 0).0, [10, 10, 10]);

        let second = read_ppm_frame(&mut input).unwrap().unwrap();
        assert_eq!(second.dimensions(), (2, 2));
        assert_eq!(second.get_pixel(1, 1).0, [200, 200, 200]);

        assert!(read_ppm_frame(&mut input).unwrap().is_none());
    }

    #[test]
    fn skips_header_comments() {
        let mut data = b"P6\n# made by a test\n1 1\n255\n".to_vec();
        data.extend([1, 2, 3]);
        let frame = read_ppm_frame(&mut Cursor::new(data)).unwrap().unwrap();
        assert_eq!(frame.get_pixel(0, 0).0, [1, 2, 3]);
    }

    #[test]
    fn raster_may_start_with_whitespace_bytes() {
        // 0x20 and 0x0A are valid pixel values right after the header.
        let mut data = b"P6 1 1 255\n".to_vec();
        data.extend([b' ', b'\n', 7]);
        let frame = read_ppm_frame(&mut Cursor::new(data)).unwrap().unwrap();
        assert_eq!(frame.get_pixel(0, 0).0, [b' ', b'\n', 7]);
    }

    #[test]
    fn truncated_raster_is_an_error() {
        let mut data = ppm(4, 4, 0);
        data.truncate(data.len() - 5);
        assert!(read_ppm_frame(&mut Cursor::new(data)).is_err());
    }

    #[test]
    fn rejects_other_formats() {
        let err = read_ppm_frame(&mut Cursor::new(b"P3\n1 1\n255\n0 0 0\n".to_vec())).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn frame_loop_keeps_only_the_newest_frame() {
        let mut stream = ppm(1, 1, 1);
        stream.extend(ppm(1, 1, 2));
        stream.extend(ppm(1, 1, 3));
        let (tx, rx) = bounded(1);
        frame_loop(Cursor::new(stream), tx, rx.clone());

        let frame = rx.try_recv().unwrap().unwrap();
        assert_eq!(frame.get_pixel(0, 0).0, [3, 3, 3]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn missing_device_is_unavailable() {
        let camera = FfmpegCamera::new("ffmpeg", "/nonexistent/video9", "/nonexistent/video9");
        let err = camera
            .open(&StreamConstraints::video_only(FacingMode::User, 640, 480))
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::CameraUnavailable(_)));
    }

    #[cfg(unix)]
    #[test]
    fn process_that_exits_at_once_is_unavailable() {
        let camera = FfmpegCamera::new("/bin/false", "/dev/null", "/dev/null");
        let err = camera
            .open(&StreamConstraints::video_only(FacingMode::Environment, 640, 480))
            .err()
            .unwrap();
        match err {
            CaptureError::CameraUnavailable(msg) => assert!(msg.contains("/dev/null")),
            other => panic!("expected CameraUnavailable, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn ended_stream_reports_itself_dead() {
        let mut child = Command::new("true").spawn().unwrap();
        let _ = child.wait();
        let (tx, rx) = bounded(1);
        let drain = rx.clone();
        let reader = thread::spawn(move || frame_loop(Cursor::new(ppm(2, 2, 9)), tx, drain));
        while !reader.is_finished() {
            thread::sleep(Duration::from_millis(5));
        }
        let mut stream = FfmpegStream {
            facing: FacingMode::User,
            child: Some(child),
            reader: Some(reader),
            frames: rx,
            latest: None,
        };

        // The last delivered frame is still handed out once.
        assert_eq!(stream.grab_frame().unwrap().get_pixel(0, 0).0, [9, 9, 9]);
        let err = stream.grab_frame().unwrap_err();
        assert!(err.to_string().contains("camera stream ended"));
        assert!(!stream.is_live());
        stream.stop();
        assert!(matches!(stream.grab_frame(), Err(CaptureError::CameraInactive)));
    }

    #[test]
    fn facing_picks_device() {
        let camera = FfmpegCamera::new("ffmpeg", "/dev/front", "/dev/back");
        assert_eq!(camera.device_for(FacingMode::User), Path::new("/dev/front"));
        assert_eq!(camera.device_for(FacingMode::Environment), Path::new("/dev/back"));
    }
}
