// camera.rs — Device-facing seams for live video: what to ask for, and the
// handle that comes back.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::CaptureError;

/// Which sensor to use. Names follow the web `facingMode` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera, pointing at the user.
    User,
    /// Back camera, pointing away from the user.
    #[default]
    Environment,
}

impl FacingMode {
    pub fn flipped(self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FacingMode::User => "user",
            FacingMode::Environment => "environment",
        }
    }
}

/// What a stream request asks of the device. The resolution is a hint; the
/// backend may deliver whatever the sensor supports nearest to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub facing: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub audio: bool,
}

impl StreamConstraints {
    pub fn video_only(facing: FacingMode, ideal_width: u32, ideal_height: u32) -> Self {
        Self {
            facing,
            ideal_width,
            ideal_height,
            audio: false,
        }
    }
}

/// Something that can hand out camera streams.
pub trait CameraBackend: Send + Sync {
    /// Acquire a live stream. Fails with `CameraUnavailable` when the
    /// capability is missing and `PermissionDenied` when access is refused.
    fn open(&self, constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>, CaptureError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// A live device stream. Dropping it must release the device as well.
pub trait VideoStream: Send {
    fn facing(&self) -> FacingMode;

    /// The most recent frame, at the stream's native resolution.
    fn grab_frame(&mut self) -> Result<RgbImage, CaptureError>;

    /// False once the device has gone away and no further frames will come.
    fn is_live(&mut self) -> bool {
        true
    }

    /// Release the device. Calling it again is a no-op.
    fn stop(&mut self);
}
