//! Log-distance path-loss model.
//!
//! ```text
//! d = 10 ^ ((P_1m - rssi) / (10 * n))
//! ```
//!
//! with `P_1m = -59 dBm` (nRF52 transmit power measured at one metre) and
//! path-loss exponent `n = 2.7`.

/// Received power at one metre, in dBm.
pub const MEASURED_POWER_AT_1M: f64 = -59.0;

/// Environment factor. Free space is 2, cluttered indoor space up to 4.
pub const PATH_LOSS_EXPONENT: f64 = 2.7;

/// Below this estimated distance a node signals proximity.
pub const PROXIMITY_THRESHOLD_M: f64 = 2.0;

/// Estimate distance in metres from a signal-strength sample.
///
/// Finite and strictly positive for every `i8`; non-increasing as the
/// signal gets stronger.
pub fn estimate_distance(rssi: i8) -> f64 {
    let exponent = (MEASURED_POWER_AT_1M - f64::from(rssi)) / (10.0 * PATH_LOSS_EXPONENT);
    10f64.powf(exponent)
}

/// Whether an estimated distance should trigger a proximity indication.
pub fn is_proximate(distance_m: f64) -> bool {
    distance_m < PROXIMITY_THRESHOLD_M
}

/// Distance rounded to whole metres as carried by update messages.
///
/// Saturates at the bounds of `i8`.
pub fn rounded_metres(distance_m: f64) -> i8 {
    let rounded = distance_m.round();
    if rounded >= f64::from(i8::MAX) {
        i8::MAX
    } else if rounded <= f64::from(i8::MIN) {
        i8::MIN
    } else {
        rounded as i8
    }
}
