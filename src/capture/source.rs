// source.rs — The one place that owns "the current image": nothing, a live
// camera session, or a still image. Holding it as a single enum keeps a
// still image and a camera session from ever being current together.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use super::camera::{CameraBackend, FacingMode, StreamConstraints, VideoStream};
use super::{still, CaptureError};
use crate::payload::ImagePayload;
use crate::settings::Settings;

enum SourceState {
    Idle,
    CameraActive(Box<dyn VideoStream>),
    HasImage(ImagePayload),
}

/// Serializable snapshot of the source for the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SourceStatus {
    Idle,
    CameraActive { facing: FacingMode },
    HasImage,
}

pub struct CaptureSource {
    backend: Arc<dyn CameraBackend>,
    state: SourceState,
    /// Facing mode of the last successfully opened stream.
    facing: FacingMode,
    ideal_width: u32,
    ideal_height: u32,
    jpeg_quality: u8,
}

impl CaptureSource {
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self {
            backend,
            state: SourceState::Idle,
            facing: FacingMode::default(),
            ideal_width: 640,
            ideal_height: 480,
            jpeg_quality: 90,
        }
    }

    pub fn from_settings(backend: Arc<dyn CameraBackend>, settings: &Settings) -> Self {
        let mut source = Self::new(backend);
        source.ideal_width = settings.ideal_width;
        source.ideal_height = settings.ideal_height;
        source.jpeg_quality = settings.jpeg_quality;
        source
    }

    pub fn status(&self) -> SourceStatus {
        match &self.state {
            SourceState::Idle => SourceStatus::Idle,
            SourceState::CameraActive(stream) => SourceStatus::CameraActive {
                facing: stream.facing(),
            },
            SourceState::HasImage(_) => SourceStatus::HasImage,
        }
    }

    pub fn is_camera_active(&self) -> bool {
        matches!(self.state, SourceState::CameraActive(_))
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn current_image(&self) -> Option<&ImagePayload> {
        match &self.state {
            SourceState::HasImage(image) => Some(image),
            _ => None,
        }
    }

    /// Load an image file. On success any camera session is closed and the
    /// file becomes the current image; on failure nothing changes.
    pub async fn select_file(&mut self, path: impl AsRef<Path>) -> Result<ImagePayload, CaptureError> {
        let payload = still::read_image_file(path.as_ref()).await?;
        Ok(self.replace_with(payload))
    }

    /// Same as [`CaptureSource::select_file`] for bytes the UI already read.
    pub fn select_bytes(&mut self, bytes: Vec<u8>, origin: &str) -> Result<ImagePayload, CaptureError> {
        let payload = still::payload_from_bytes(bytes, origin)?;
        Ok(self.replace_with(payload))
    }

    /// Open a camera stream. An already-open stream is released first, so at
    /// most one device handle exists at any time. A still image is only
    /// discarded once the new stream is actually live.
    pub fn start_camera(&mut self, facing: FacingMode) -> Result<(), CaptureError> {
        self.release_camera();

        let constraints = StreamConstraints::video_only(facing, self.ideal_width, self.ideal_height);
        let stream = self.backend.open(&constraints).map_err(|e| {
            log::error!("Camera access error ({}): {}", self.backend.name(), e);
            e
        })?;

        self.facing = facing;
        self.state = SourceState::CameraActive(stream);
        Ok(())
    }

    /// Reopen the camera with the other sensor.
    pub fn switch_camera(&mut self) -> Result<FacingMode, CaptureError> {
        let next = self.facing.flipped();
        self.start_camera(next)?;
        log::info!("Switched camera to {}", next.as_str());
        Ok(next)
    }

    /// Close the camera if one is open. No-op otherwise.
    pub fn stop_camera(&mut self) {
        self.release_camera();
    }

    /// Snapshot the live stream into a JPEG, then close the stream.
    /// If the frame cannot be taken the session stays open, unless the
    /// stream itself has ended, in which case the source returns to idle.
    pub fn capture_frame(&mut self) -> Result<ImagePayload, CaptureError> {
        let SourceState::CameraActive(stream) = &mut self.state else {
            return Err(CaptureError::CameraInactive);
        };
        let frame = match stream.grab_frame() {
            Ok(frame) => frame,
            Err(e) => {
                if !stream.is_live() {
                    log::warn!("Camera stream ended: {}", e);
                    self.release_camera();
                }
                return Err(e);
            }
        };
        let payload = still::encode_jpeg(&frame, self.jpeg_quality)?;
        log::info!(
            "Captured {}x{} frame ({} bytes)",
            frame.width(),
            frame.height(),
            payload.len()
        );
        Ok(self.replace_with(payload))
    }

    /// Drop both the camera session and any still image.
    pub fn reset(&mut self) {
        self.release_camera();
        self.state = SourceState::Idle;
    }

    fn replace_with(&mut self, payload: ImagePayload) -> ImagePayload {
        self.release_camera();
        self.state = SourceState::HasImage(payload.clone());
        payload
    }

    fn release_camera(&mut self) {
        if let SourceState::CameraActive(stream) = &mut self.state {
            stream.stop();
            self.state = SourceState::Idle;
        }
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.release_camera();
    }
}
