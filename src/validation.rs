//! Waveform parameter validation.
//!
//! A pure precondition gate: [`validate`] reports the first violated
//! constraint, [`buffer_size`] computes how many samples a waveform needs.

use crate::error::ParameterError;

/// Validates waveform parameters.
///
/// Constraints are checked in a fixed order and the first one violated is
/// returned: frequency > 0, amplitude > 0, duration > 0, sample_rate > 0,
/// frequency × 2 ≤ sample_rate.
///
/// # Arguments
///
/// * `frequency` - Frequency in Hz
/// * `amplitude` - Peak amplitude in volts
/// * `duration` - Duration in seconds
/// * `sample_rate` - Samples per second
///
/// # Returns
///
/// * `Ok(())` if every constraint holds.
/// * `Err(ParameterError)` naming the first violated constraint.
pub fn validate(
    frequency: f64,
    amplitude: f64,
    duration: f64,
    sample_rate: u32,
) -> Result<(), ParameterError> {
    if !is_positive(frequency) {
        return Err(ParameterError::FrequencyNotPositive);
    }
    if !is_positive(amplitude) {
        return Err(ParameterError::AmplitudeNotPositive);
    }
    if !is_positive(duration) {
        return Err(ParameterError::DurationNotPositive);
    }
    if sample_rate == 0 {
        return Err(ParameterError::SampleRateNotPositive);
    }
    if frequency * 2.0 > f64::from(sample_rate) {
        return Err(ParameterError::NyquistViolation {
            frequency,
            sample_rate,
        });
    }
    Ok(())
}

fn is_positive(value: f64) -> bool {
    // NaN compares false and is rejected with the sign check
    value > 0.0
}

/// Calculates the buffer size needed for a waveform.
///
/// Performs no validation; callers validate first. Negative or NaN products
/// saturate to zero, infinite ones to `usize::MAX`.
pub fn buffer_size(duration: f64, sample_rate: u32) -> usize {
    (duration * f64::from(sample_rate)).floor() as usize
}
