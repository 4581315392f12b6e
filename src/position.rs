//! Pure conversions between encoder ticks and azimuth degrees.
//!
//! The encoder is zeroed at the home position, so both conversions fold
//! in the offset between azimuth zero and the home azimuth. Nothing in
//! this module touches controller state.

use crate::error::{DomeError, DomeResult};

/// Normalize an angle in degrees to the range `[0, 360)`.
pub fn normalize_360(az: f64) -> f64 {
    az.rem_euclid(360.0)
}

/// Signed angular difference in degrees, normalized to `(-180, 180]`.
///
/// The sign gives the shortest rotation path: positive means CW.
pub fn wrap_180(delta: f64) -> f64 {
    let wrapped = delta.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Convert an azimuth in degrees to the equivalent encoder tick count.
pub fn az_to_ticks(az: f64, home_azimuth: f64, degrees_per_tick: Option<f64>) -> DomeResult<f64> {
    let degrees_per_tick = degrees_per_tick.ok_or(DomeError::Uncalibrated)?;
    let az_rel_to_home = normalize_360(az - home_azimuth);
    Ok(az_rel_to_home / degrees_per_tick)
}

/// Convert an encoder tick count to the equivalent azimuth in degrees.
pub fn ticks_to_az(ticks: i64, home_azimuth: f64, degrees_per_tick: Option<f64>) -> DomeResult<f64> {
    let degrees_per_tick = degrees_per_tick.ok_or(DomeError::Uncalibrated)?;
    Ok(normalize_360(home_azimuth + ticks as f64 * degrees_per_tick))
}
