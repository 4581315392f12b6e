//! Define a general purpose DomeError enumeration.

use thiserror::Error;

pub type DomeResult<T> = std::result::Result<T, DomeError>;

/// Errors surfaced by the dome controller.
///
/// Command rejections (busy, parked) are deliberately not errors; they
/// are logged no-ops observable through the status accessors, matching a
/// caller that polls for completion and cannot receive asynchronous
/// failures. An encoder pulse with no known direction is fatal and
/// panics instead of returning a value here.
#[derive(Debug, Error)]
pub enum DomeError {
    #[error("dome is not calibrated, degrees per tick is unknown")]
    Uncalibrated,

    #[error("dome azimuth is unknown, home the dome first")]
    PositionUnknown,
}
