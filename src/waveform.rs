//! Waveform engine.
//!
//! Pure functions mapping a validated [`WaveformRequest`] to a [`Waveform`]:
//! an evenly spaced time grid over `[0, duration]` and the matching amplitudes
//! for one of four periodic shapes.
//!
//! # Shapes
//!
//! | Shape      | Formula                                      |
//! |------------|----------------------------------------------|
//! | `Sine`     | `A·sin(2πft)`                                |
//! | `Square`   | `A·sign(sin(2πft))`, `sign(0) = 0`           |
//! | `Triangle` | `A·(2·abs(2·(ft − ⌊0.5 + ft⌋)) − 1)`         |
//! | `Sawtooth` | `A·2·(ft − ⌊0.5 + ft⌋)`                      |
//!
//! # Example
//!
//! ```
//! use wavegen_daq::waveform::{generate, Shape, WaveformRequest};
//!
//! # fn main() -> wavegen_daq::Result<()> {
//! let request = WaveformRequest::new(Shape::Sine, 1.0, 1.0, 1.0, 1000)?;
//! let waveform = generate(&request)?;
//! assert_eq!(waveform.len(), 1000);
//! # Ok(())
//! # }
//! ```

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DaqError, Result};
use crate::validation::{buffer_size, validate};

/// Periodic waveform shape.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    /// Sinusoid starting at zero phase
    #[default]
    Sine,
    /// ±amplitude square wave following the sign of the sinusoid
    Square,
    /// Symmetric triangle starting at −amplitude
    Triangle,
    /// Rising ramp wrapped into [−amplitude, amplitude)
    Sawtooth,
}

impl Shape {
    /// All shapes, in display order.
    pub const ALL: [Shape; 4] = [Shape::Sine, Shape::Square, Shape::Triangle, Shape::Sawtooth];

    /// Lowercase identifier (`"sine"`, `"square"`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Self::Sine => "sine",
            Self::Square => "square",
            Self::Triangle => "triangle",
            Self::Sawtooth => "sawtooth",
        }
    }

    /// Capitalized label used in plot titles.
    pub fn label(self) -> &'static str {
        match self {
            Self::Sine => "Sine",
            Self::Square => "Square",
            Self::Triangle => "Triangle",
            Self::Sawtooth => "Sawtooth",
        }
    }

    /// Evaluate the shape at time `t` (seconds).
    pub fn sample(self, frequency: f64, amplitude: f64, t: f64) -> f64 {
        match self {
            Self::Sine => amplitude * (2.0 * PI * frequency * t).sin(),
            Self::Square => amplitude * sign((2.0 * PI * frequency * t).sin()),
            Self::Triangle => amplitude * (2.0 * (2.0 * wrapped_phase(frequency, t)).abs() - 1.0),
            Self::Sawtooth => amplitude * 2.0 * wrapped_phase(frequency, t),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Shape {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|shape| shape.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DaqError::InvalidRequest(format!("Unknown waveform shape '{s}'")))
    }
}

/// `f·t` wrapped into [−0.5, 0.5).
fn wrapped_phase(frequency: f64, t: f64) -> f64 {
    let cycles = frequency * t;
    cycles - (0.5 + cycles).floor()
}

/// Sign with `sign(0) = 0`, unlike [`f64::signum`].
fn sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// A validated, immutable waveform request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformRequest {
    shape: Shape,
    frequency: f64,
    amplitude: f64,
    duration: f64,
    sample_rate: u32,
}

impl WaveformRequest {
    /// Validate the parameters and build a request.
    pub fn new(
        shape: Shape,
        frequency: f64,
        amplitude: f64,
        duration: f64,
        sample_rate: u32,
    ) -> Result<Self> {
        validate(frequency, amplitude, duration, sample_rate)?;
        Ok(Self {
            shape,
            frequency,
            amplitude,
            duration,
            sample_rate,
        })
    }

    /// Waveform shape.
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Frequency in Hz.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Peak amplitude in volts.
    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Sample rate in samples per second.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples the generated waveform will contain.
    pub fn sample_count(&self) -> usize {
        buffer_size(self.duration, self.sample_rate)
    }
}

/// Generated waveform: time grid plus amplitudes of the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Shape the waveform was generated from
    pub shape: Shape,
    /// Sample instants in seconds, evenly spaced over `[0, duration]`
    pub times: Vec<f64>,
    /// Output voltages, one per sample instant
    pub amplitudes: Vec<f64>,
}

impl Waveform {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.amplitudes.len()
    }

    /// True if the waveform holds no samples.
    pub fn is_empty(&self) -> bool {
        self.amplitudes.is_empty()
    }

    /// Smallest and largest amplitude, if any.
    pub fn peak_to_peak(&self) -> Option<(f64, f64)> {
        self.amplitudes.iter().copied().fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}

/// `n` evenly spaced points over the closed interval `[start, end]`.
///
/// The last point is exactly `end`. `n == 1` yields `[start]`.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            let mut points: Vec<f64> = (0..n).map(|i| start + i as f64 * step).collect();
            points[n - 1] = end;
            points
        }
    }
}

/// Largest waveform [`generate`] will allocate, in samples.
pub const MAX_SAMPLES: usize = 10_000_000;

/// Generate the waveform described by `request`.
///
/// Fails with [`DaqError::InvalidRequest`] when `duration × sample_rate < 1`,
/// i.e. the waveform would hold zero samples, or when it is not finite or
/// exceeds [`MAX_SAMPLES`]. Both checks run before anything is allocated.
pub fn generate(request: &WaveformRequest) -> Result<Waveform> {
    let requested = request.duration * f64::from(request.sample_rate);
    if !requested.is_finite() || requested >= (MAX_SAMPLES + 1) as f64 {
        return Err(DaqError::InvalidRequest(format!(
            "duration {} s at {} S/s exceeds the limit of {MAX_SAMPLES} samples",
            request.duration, request.sample_rate
        )));
    }

    let n = request.sample_count();
    if n == 0 {
        return Err(DaqError::InvalidRequest(format!(
            "duration {} s at {} S/s yields no samples",
            request.duration, request.sample_rate
        )));
    }

    let times = linspace(0.0, request.duration, n);
    let amplitudes = times
        .iter()
        .map(|&t| request.shape.sample(request.frequency, request.amplitude, t))
        .collect();

    Ok(Waveform {
        shape: request.shape,
        times,
        amplitudes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-6;

    fn request(shape: Shape, frequency: f64, duration: f64, sample_rate: u32) -> WaveformRequest {
        WaveformRequest::new(shape, frequency, 1.0, duration, sample_rate).unwrap()
    }

    #[test]
    fn test_linspace_endpoints() {
        let points = linspace(0.0, 1.0, 5);
        assert_eq!(points, vec![0.0, 0.25, 0.5, 0.75, 1.0]);

        assert!(linspace(0.0, 1.0, 0).is_empty());
        assert_eq!(linspace(0.0, 2.0, 1), vec![0.0]);

        let points = linspace(0.0, 0.3, 7);
        assert_eq!(points[6], 0.3);
    }

    #[test]
    fn test_length_matches_buffer_size() {
        for shape in Shape::ALL {
            for (duration, rate) in [(1.0, 1000), (2.0, 500), (0.25, 44), (3.7, 100)] {
                let req = request(shape, 1.0, duration, rate);
                let wave = generate(&req).unwrap();
                assert_eq!(wave.times.len(), buffer_size(duration, rate));
                assert_eq!(wave.amplitudes.len(), wave.times.len());
            }
        }
    }

    #[test]
    fn test_time_grid_covers_duration() {
        let wave = generate(&request(Shape::Sine, 1.0, 2.0, 500)).unwrap();
        assert_eq!(wave.times[0], 0.0);
        assert_eq!(*wave.times.last().unwrap(), 2.0);
        assert!(wave.times.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_sine_phase_reference() {
        assert_eq!(Shape::Sine.sample(3.0, 2.5, 0.0), 0.0);
        let wave = generate(&request(Shape::Sine, 5.0, 1.0, 1000)).unwrap();
        assert_eq!(wave.amplitudes[0], 0.0);
    }

    #[test]
    fn test_square_values_pinned() {
        let amplitude = 2.0;
        let req = WaveformRequest::new(Shape::Square, 3.0, amplitude, 1.0, 1000).unwrap();
        let wave = generate(&req).unwrap();

        // Exact zero crossing at t = 0 maps to 0
        assert_eq!(wave.amplitudes[0], 0.0);
        for &v in &wave.amplitudes[1..] {
            assert!(v == amplitude || v == -amplitude, "unexpected square value {v}");
        }
        assert!(wave.amplitudes.contains(&amplitude));
        assert!(wave.amplitudes.contains(&-amplitude));
    }

    #[test]
    fn test_triangle_and_sawtooth_ranges() {
        let tri = generate(&request(Shape::Triangle, 2.0, 1.0, 1000)).unwrap();
        assert!(tri.amplitudes.iter().all(|v| (-1.0..=1.0).contains(v)));
        assert_eq!(tri.amplitudes[0], -1.0);

        let saw = generate(&request(Shape::Sawtooth, 2.0, 1.0, 1000)).unwrap();
        assert!(saw.amplitudes.iter().all(|v| (-1.0..1.0).contains(v)));
        assert_eq!(saw.amplitudes[0], 0.0);
    }

    #[test]
    fn test_triangle_and_sawtooth_periodic() {
        let frequency = 2.0;
        let period = 1.0 / frequency;
        for shape in [Shape::Triangle, Shape::Sawtooth] {
            for t in [0.01, 0.05, 0.13, 0.31, 0.42, 0.77] {
                let a = shape.sample(frequency, 1.5, t);
                let b = shape.sample(frequency, 1.5, t + period);
                assert!((a - b).abs() < 1e-9, "{shape} not periodic at t={t}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn test_periodic_on_sample_grid() {
        // 1001 points over 1 s gives a 1 ms step, so 5 Hz repeats every 200 samples
        let frequency = 5.0;
        let shift = 200;
        for shape in [Shape::Triangle, Shape::Sawtooth] {
            let wave = generate(&request(shape, frequency, 1.0, 1001)).unwrap();
            for i in 0..wave.len() - shift {
                let phase = wrapped_phase(frequency, wave.times[i]);
                if (phase.abs() - 0.5).abs() < 1e-6 {
                    // Sawtooth discontinuity
                    continue;
                }
                let diff = (wave.amplitudes[i] - wave.amplitudes[i + shift]).abs();
                assert!(diff < 1e-9, "{shape} sample {i} differs by {diff}");
            }
        }
    }

    #[test]
    fn test_sine_peak_and_trough() {
        let req = request(Shape::Sine, 1.0, 1.0, 1000);
        let wave = generate(&req).unwrap();
        assert_eq!(wave.len(), 1000);

        assert!((Shape::Sine.sample(1.0, 1.0, 0.25) - 1.0).abs() < TOLERANCE);
        assert!((Shape::Sine.sample(1.0, 1.0, 0.75) + 1.0).abs() < TOLERANCE);

        let (lo, hi) = wave.peak_to_peak().unwrap();
        assert!((hi - 1.0).abs() < 1e-5);
        assert!((lo + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_zero_samples_rejected() {
        let req = request(Shape::Sine, 1.0, 0.0005, 1000);
        let err = generate(&req).unwrap_err();
        assert!(matches!(err, DaqError::InvalidRequest(_)));
    }

    #[test]
    fn test_oversized_requests_rejected() {
        for duration in [f64::INFINITY, 1e300, 1e13] {
            let req = request(Shape::Sine, 1.0, duration, 1000);
            let err = generate(&req).unwrap_err();
            assert!(matches!(err, DaqError::InvalidRequest(_)), "{duration}: {err}");
        }

        let req = request(Shape::Sine, 1.0, 10_000.01, 1000);
        assert!(req.sample_count() > MAX_SAMPLES);
        assert!(generate(&req).is_err());
    }

    #[test]
    fn test_single_sample() {
        let req = request(Shape::Triangle, 1.0, 0.001, 1000);
        let wave = generate(&req).unwrap();
        assert_eq!(wave.times, vec![0.0]);
        assert_eq!(wave.amplitudes, vec![-1.0]);
    }

    #[test]
    fn test_request_validates() {
        let err = WaveformRequest::new(Shape::Sine, 600.0, 1.0, 1.0, 1000).unwrap_err();
        assert!(matches!(err, DaqError::InvalidParameter(_)));
    }

    #[test]
    fn test_shape_parsing() {
        assert_eq!("sine".parse::<Shape>().unwrap(), Shape::Sine);
        assert_eq!("Square".parse::<Shape>().unwrap(), Shape::Square);
        assert_eq!(" triangle ".parse::<Shape>().unwrap(), Shape::Triangle);
        assert_eq!("sawtooth".parse::<Shape>().unwrap(), Shape::Sawtooth);
        assert!("noise".parse::<Shape>().is_err());
        assert_eq!(Shape::Sawtooth.label(), "Sawtooth");
        assert_eq!(Shape::Square.to_string(), "square");
    }
}
