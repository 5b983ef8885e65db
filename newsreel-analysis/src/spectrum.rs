//! FFT frequency analyser for real-time visualization
//!
//! Mirrors the sampling model of a platform analyser node: the most recent
//! `fft_size` samples are windowed, transformed, smoothed over time and
//! mapped onto a decibel range before being quantized to bytes.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;
use thiserror::Error;

/// Analysis window used by visualizer connections
pub const DEFAULT_FFT_SIZE: usize = 256;

const MIN_FFT_SIZE: usize = 32;
const MAX_FFT_SIZE: usize = 32768;

/// Errors raised when configuring an analyser
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpectrumError {
    #[error("FFT size {0} must be a power of two between 32 and 32768")]
    InvalidFftSize(usize),
    #[error("Smoothing {0} must be within 0.0..=1.0")]
    InvalidSmoothing(f32),
    #[error("Decibel range [{0}, {1}] is empty")]
    InvalidDecibelRange(f32, f32),
}

/// Windowed FFT analyser producing byte and float frequency data
pub struct FrequencyAnalyser {
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Ring of the most recent mono samples
    history: Vec<f32>,
    write_pos: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
    /// Smoothed magnitude per bin (linear)
    smoothed: Vec<f32>,
    /// Pre-allocated FFT buffer to avoid allocation per sample call
    fft_buffer: Vec<Complex<f32>>,
}

impl FrequencyAnalyser {
    /// Create an analyser for the given window size
    pub fn new(fft_size: usize) -> Result<Self, SpectrumError> {
        if !fft_size.is_power_of_two() || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft_size) {
            return Err(SpectrumError::InvalidFftSize(fft_size));
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        // Blackman window
        let n = fft_size as f32;
        let window = (0..fft_size)
            .map(|i| {
                let x = i as f32 / n;
                0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
            })
            .collect();

        Ok(Self {
            fft_size,
            fft,
            window,
            history: vec![0.0; fft_size],
            write_pos: 0,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
            smoothed: vec![0.0; fft_size / 2],
            fft_buffer: vec![Complex::new(0.0, 0.0); fft_size],
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of frequency bins (half the window)
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn smoothing(&self) -> f32 {
        self.smoothing
    }

    /// Set the smoothing time constant (0.0 = none, 1.0 = frozen)
    pub fn set_smoothing(&mut self, smoothing: f32) -> Result<(), SpectrumError> {
        if !(0.0..=1.0).contains(&smoothing) {
            return Err(SpectrumError::InvalidSmoothing(smoothing));
        }
        self.smoothing = smoothing;
        Ok(())
    }

    pub fn decibel_range(&self) -> (f32, f32) {
        (self.min_decibels, self.max_decibels)
    }

    /// Set the decibel range mapped onto 0..=255
    pub fn set_decibel_range(&mut self, min: f32, max: f32) -> Result<(), SpectrumError> {
        if min >= max {
            return Err(SpectrumError::InvalidDecibelRange(min, max));
        }
        self.min_decibels = min;
        self.max_decibels = max;
        Ok(())
    }

    /// Append mono samples to the analysis history
    pub fn push_samples(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.history[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.fft_size;
        }
    }

    /// Run the FFT over the current window and fold it into the smoothed bins
    fn analyze(&mut self) {
        // Oldest sample first
        for i in 0..self.fft_size {
            let sample = self.history[(self.write_pos + i) % self.fft_size];
            self.fft_buffer[i] = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.fft_buffer);

        let norm = 1.0 / self.fft_size as f32;
        for (bin, prev) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.fft_buffer[bin].norm() * norm;
            let value = self.smoothing * *prev + (1.0 - self.smoothing) * magnitude;
            // Keep denormals and NaN out of the smoothed state
            *prev = if value.is_finite() { value } else { 0.0 };
        }
    }

    /// Sample the spectrum in decibels
    pub fn float_frequency_data(&mut self, out: &mut [f32]) {
        self.analyze();
        for (dst, &mag) in out.iter_mut().zip(self.smoothed.iter()) {
            *dst = linear_to_decibels(mag);
        }
    }

    /// Sample the spectrum quantized to bytes over the decibel range
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) {
        self.analyze();
        let range = self.max_decibels - self.min_decibels;
        for (dst, &mag) in out.iter_mut().zip(self.smoothed.iter()) {
            let db = linear_to_decibels(mag);
            let scaled = 255.0 * (db - self.min_decibels) / range;
            *dst = scaled.clamp(0.0, 255.0) as u8;
        }
    }

    /// Copy the current waveform, 128 being silence
    pub fn byte_time_domain_data(&self, out: &mut [u8]) {
        for (i, dst) in out.iter_mut().take(self.fft_size).enumerate() {
            let sample = self.history[(self.write_pos + i) % self.fft_size];
            *dst = (128.0 * (1.0 + sample)).clamp(0.0, 255.0) as u8;
        }
    }
}

fn linear_to_decibels(magnitude: f32) -> f32 {
    if magnitude <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * magnitude.log10()
    }
}
