//! Offline waveform data for a scrubbable visualizer.
//!
//! An [`AmplitudeEnvelope`] summarizes a whole track into fixed buckets
//! (peak and RMS per bucket). The frame helpers reproduce what a browser
//! analyser node reports at one playhead position: unsigned-byte
//! time-domain samples and a byte-scaled magnitude spectrum.

use crate::audio::DecodedAudio;
use crate::{Result, StylerError};
use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const MIN_DECIBELS: f32 = -100.0;
pub const MAX_DECIBELS: f32 = -30.0;

const MIN_FFT_SIZE: usize = 32;
const MAX_FFT_SIZE: usize = 32_768;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmplitudeEnvelope {
    pub sample_rate: u32,
    pub total_samples: usize,
    pub peaks: Vec<f32>,
    pub rms: Vec<f32>,
}

impl AmplitudeEnvelope {
    pub fn from_pcm(pcm: &[f32], sample_rate: u32, buckets: usize) -> Result<Self> {
        if buckets == 0 {
            return Err(StylerError::Invalid("bucket count must be at least 1".into()));
        }
        if sample_rate == 0 {
            return Err(StylerError::Invalid("sample rate must be positive".into()));
        }
        if pcm.is_empty() {
            return Err(StylerError::Invalid("no samples to summarize".into()));
        }
        let stats: Vec<(f32, f32)> = (0..buckets)
            .into_par_iter()
            .map(|b| {
                let start = b * pcm.len() / buckets;
                let end = (b + 1) * pcm.len() / buckets;
                bucket_stats(&pcm[start..end])
            })
            .collect();
        let (peaks, rms) = stats.into_iter().unzip();
        Ok(Self {
            sample_rate,
            total_samples: pcm.len(),
            peaks,
            rms,
        })
    }

    pub fn from_audio(audio: &DecodedAudio, buckets: usize) -> Result<Self> {
        Self::from_pcm(&audio.samples, audio.sample_rate, buckets)
    }

    pub fn buckets(&self) -> usize {
        self.peaks.len()
    }

    pub fn duration_secs(&self) -> f32 {
        self.total_samples as f32 / self.sample_rate as f32
    }

    /// Sample index for a playhead position, clamped into the track.
    pub fn sample_offset(&self, seconds: f32) -> usize {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        let offset = (seconds * self.sample_rate as f32).floor() as usize;
        offset.min(self.total_samples.saturating_sub(1))
    }

    /// Bucket under a playhead position, clamped into the track.
    pub fn bucket_at(&self, seconds: f32) -> usize {
        let offset = self.sample_offset(seconds);
        (offset * self.buckets() / self.total_samples).min(self.buckets() - 1)
    }

    /// Peaks scaled so the loudest bucket is 1.0.
    pub fn normalized_peaks(&self) -> Vec<f32> {
        let max = self.peaks.iter().copied().fold(0.0f32, f32::max);
        if max <= 0.0 {
            return vec![0.0; self.peaks.len()];
        }
        self.peaks.iter().map(|p| p / max).collect()
    }
}

fn bucket_stats(slice: &[f32]) -> (f32, f32) {
    if slice.is_empty() {
        return (0.0, 0.0);
    }
    let peak = slice.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    let mean_sq = slice.iter().map(|s| s * s).sum::<f32>() / slice.len() as f32;
    (peak, mean_sq.sqrt())
}

fn check_fft_size(fft_size: usize) -> Result<()> {
    if !fft_size.is_power_of_two() || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft_size) {
        return Err(StylerError::Invalid(format!(
            "fft size must be a power of two in {MIN_FFT_SIZE}..={MAX_FFT_SIZE}, got {fft_size}"
        )));
    }
    Ok(())
}

fn window_samples(pcm: &[f32], offset: usize, len: usize) -> impl Iterator<Item = f32> + '_ {
    (0..len).map(move |i| pcm.get(offset + i).copied().unwrap_or(0.0))
}

/// `fft_size` samples from `offset` as bytes centered on 128.
pub fn time_domain_frame(pcm: &[f32], offset: usize, fft_size: usize) -> Result<Vec<u8>> {
    check_fft_size(fft_size)?;
    Ok(window_samples(pcm, offset, fft_size)
        .map(|x| (128.0 * (1.0 + x)).clamp(0.0, 255.0) as u8)
        .collect())
}

/// Blackman-windowed magnitude spectrum from `offset`, `fft_size / 2` bins,
/// mapped from `MIN_DECIBELS..MAX_DECIBELS` onto `0..=255`.
pub fn frequency_frame(pcm: &[f32], offset: usize, fft_size: usize) -> Result<Vec<u8>> {
    check_fft_size(fft_size)?;
    let n = fft_size as f32;
    let two_pi = 2.0 * std::f32::consts::PI;
    let mut buf: Vec<Complex<f32>> = window_samples(pcm, offset, fft_size)
        .enumerate()
        .map(|(i, s)| {
            let t = i as f32 / n;
            let w = 0.42 - 0.5 * (two_pi * t).cos() + 0.08 * (2.0 * two_pi * t).cos();
            Complex { re: s * w, im: 0.0 }
        })
        .collect();
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_size);
    fft.process(&mut buf);
    let range = MAX_DECIBELS - MIN_DECIBELS;
    Ok(buf[..fft_size / 2]
        .iter()
        .map(|c| {
            let magnitude = c.norm() / n;
            let db = if magnitude > 0.0 {
                20.0 * magnitude.log10()
            } else {
                f32::NEG_INFINITY
            };
            (255.0 * (db - MIN_DECIBELS) / range).clamp(0.0, 255.0) as u8
        })
        .collect())
}

/// Mirrored text waveform, one column per bucket, `height` rows.
///
/// The playhead bucket, if any, is drawn as a full-height `|`.
pub fn render_ascii(
    envelope: &AmplitudeEnvelope,
    height: usize,
    playhead: Option<usize>,
) -> Vec<String> {
    if height == 0 {
        return Vec::new();
    }
    let amps = envelope.normalized_peaks();
    let half = height as f32 / 2.0;
    (0..height)
        .map(|row| {
            let distance = (row as f32 + 0.5 - half).abs() / half;
            amps.iter()
                .enumerate()
                .map(|(b, &a)| {
                    if playhead == Some(b) {
                        '|'
                    } else if distance <= a {
                        '█'
                    } else {
                        ' '
                    }
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize, amp: f32) -> Vec<f32> {
        let step = 2.0 * std::f32::consts::PI * freq / sample_rate as f32;
        (0..len).map(|i| amp * (step * i as f32).sin()).collect()
    }

    #[test]
    fn envelope_tracks_loud_and_quiet_halves() {
        let mut pcm = vec![0.1f32; 1000];
        pcm.extend(vec![-0.8f32; 1000]);
        let env = AmplitudeEnvelope::from_pcm(&pcm, 1000, 4).unwrap();
        assert_eq!(env.buckets(), 4);
        assert!((env.peaks[0] - 0.1).abs() < 1e-6);
        assert!((env.peaks[3] - 0.8).abs() < 1e-6);
        assert!((env.rms[3] - 0.8).abs() < 1e-5);
        assert!((env.duration_secs() - 2.0).abs() < 1e-6);
        let norm = env.normalized_peaks();
        assert!((norm[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn more_buckets_than_samples_pads_with_silence() {
        let env = AmplitudeEnvelope::from_pcm(&[0.5, -0.25], 10, 5).unwrap();
        assert_eq!(env.buckets(), 5);
        assert_eq!(env.peaks.iter().filter(|&&p| p > 0.0).count(), 2);
    }

    #[test]
    fn rejects_degenerate_input() {
        assert!(AmplitudeEnvelope::from_pcm(&[0.1], 44_100, 0).is_err());
        assert!(AmplitudeEnvelope::from_pcm(&[], 44_100, 10).is_err());
        assert!(AmplitudeEnvelope::from_pcm(&[0.1], 0, 10).is_err());
    }

    #[test]
    fn scrub_positions_clamp_into_track() {
        let env = AmplitudeEnvelope::from_pcm(&vec![0.2; 4000], 1000, 8).unwrap();
        assert_eq!(env.sample_offset(-3.0), 0);
        assert_eq!(env.sample_offset(f32::NAN), 0);
        assert_eq!(env.sample_offset(1.5), 1500);
        assert_eq!(env.sample_offset(99.0), 3999);
        assert_eq!(env.bucket_at(0.0), 0);
        assert_eq!(env.bucket_at(2.0), 4);
        assert_eq!(env.bucket_at(99.0), 7);
    }

    #[test]
    fn time_domain_frame_is_centered_and_padded() {
        let frame = time_domain_frame(&[0.0, 1.0, -1.0, 0.5], 0, 32).unwrap();
        assert_eq!(frame.len(), 32);
        assert_eq!(&frame[..4], &[128, 255, 0, 192]);
        assert!(frame[4..].iter().all(|&b| b == 128));
        assert!(time_domain_frame(&[0.0], 0, 100).is_err());
    }

    #[test]
    fn frequency_frame_peaks_at_tone_bin() {
        let sample_rate = 48_000;
        let bin = 64;
        let freq = bin as f32 * sample_rate as f32 / DEFAULT_FFT_SIZE as f32;
        let pcm = sine(freq, sample_rate, DEFAULT_FFT_SIZE * 2, 1.0);
        let frame = frequency_frame(&pcm, 0, DEFAULT_FFT_SIZE).unwrap();
        assert_eq!(frame.len(), DEFAULT_FFT_SIZE / 2);
        assert_eq!(frame[bin], 255);
        assert!(frame[500] < frame[bin]);

        let silent = frequency_frame(&vec![0.0; 64], 0, 64).unwrap();
        assert!(silent.iter().all(|&b| b == 0));
    }

    #[test]
    fn ascii_render_has_requested_shape() {
        let env = AmplitudeEnvelope::from_pcm(&[0.0, 0.0, 1.0, 1.0], 4, 2).unwrap();
        let rows = render_ascii(&env, 5, None);
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| r.chars().count() == 2));
        // loud bucket fills every row, silent bucket only the center line
        assert!(rows.iter().all(|r| r.ends_with('█')));
        assert_eq!(rows[2], "██");
        assert_eq!(rows[0], " █");

        let with_head = render_ascii(&env, 3, Some(0));
        assert!(with_head.iter().all(|r| r.starts_with('|')));
        assert!(render_ascii(&env, 0, None).is_empty());
    }
}
