/// The `capture` module produces the image that gets analysed: either a file
/// the user picked or a frame snapped from a live camera stream.
pub mod camera;
pub mod ffmpeg;
pub mod source;
pub mod still;

pub use camera::{CameraBackend, FacingMode, StreamConstraints, VideoStream};
pub use ffmpeg::FfmpegCamera;
pub use source::{CaptureSource, SourceStatus};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Camera access denied ({0}). Please allow camera permissions.")]
    PermissionDenied(String),
    #[error("Camera not available: {0}")]
    CameraUnavailable(String),
    #[error("Could not read image {origin}: {reason}")]
    UnreadableFile { origin: String, reason: String },
    #[error("No active camera session")]
    CameraInactive,
    #[error("Camera stream error: {0}")]
    StreamError(String),
}
