//! Speech featurizer: WAV loading and log-mel feature extraction.

use crate::config::SpeechConfig;
use crate::error::{AudioError, Result};
use hound::{SampleFormat, WavReader};
use ndarray::Array2;
use rustfft::{FftPlanner, num_complex::Complex};
use std::f32::consts::PI;
use std::path::Path;

/// Log-mel-spectrogram extractor over a declared [`SpeechConfig`].
///
/// The pipeline core only consumes the declared output shape; the signal
/// processing itself (preemphasis, windowed STFT, mel filterbank, log
/// compression, per-feature normalization) is self-contained here.
#[derive(Clone, Debug)]
pub struct SpeechFeaturizer {
    config: SpeechConfig,
}

impl SpeechFeaturizer {
    pub fn new(config: SpeechConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    /// Feature width per frame, for model input-shape plumbing.
    pub fn feature_dim(&self) -> usize {
        self.config.n_mels
    }

    /// Number of frames produced for a sample count.
    pub fn frame_count(&self, samples: usize) -> usize {
        if samples < self.config.win_length {
            0
        } else {
            (samples - self.config.win_length) / self.config.hop_length + 1
        }
    }

    /// Load a WAV file and extract features.
    pub fn extract(&self, path: impl AsRef<Path>) -> Result<Array2<f32>> {
        let audio = self.read_audio_mono(path)?;
        Ok(self.features(&audio))
    }

    /// Load a WAV file as mono f32 samples at the configured rate.
    ///
    /// Stereo is downmixed; any other channel layout and any mismatched
    /// sample rate are rejected.
    pub fn read_audio_mono(&self, path: impl AsRef<Path>) -> Result<Vec<f32>> {
        let mut reader = WavReader::open(path)?;
        let spec = reader.spec();

        if spec.sample_rate != self.config.sample_rate {
            return Err(AudioError::InvalidSampleRate {
                expected: self.config.sample_rate,
                got: spec.sample_rate,
            }
            .into());
        }
        if spec.channels == 0 || spec.channels > 2 {
            return Err(AudioError::InvalidChannels(spec.channels).into());
        }

        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader.samples::<f32>().collect::<hound::Result<_>>()?,
            SampleFormat::Int => reader
                .samples::<i16>()
                .map(|s| s.map(|s| s as f32 / i16::MAX as f32))
                .collect::<hound::Result<_>>()?,
        };

        if spec.channels == 2 {
            return Ok(samples
                .chunks(2)
                .map(|pair| pair.iter().sum::<f32>() / pair.len() as f32)
                .collect());
        }

        Ok(samples)
    }

    /// Extract log-mel features from raw samples: `(frames, n_mels)`.
    pub fn features(&self, audio: &[f32]) -> Array2<f32> {
        let frames = self.frame_count(audio.len());
        if frames == 0 {
            return Array2::zeros((0, self.config.n_mels));
        }

        let emphasized = preemphasize(audio, self.config.preemphasis);
        let power = self.power_spectrogram(&emphasized, frames);
        let filterbank = mel_filterbank(
            self.config.n_fft,
            self.config.n_mels,
            self.config.sample_rate as usize,
        );

        let mut mel = filterbank.dot(&power).mapv(|x| x.max(1e-10).ln()).t().to_owned();

        if self.config.normalize_per_feature {
            normalize_columns(&mut mel);
        }

        mel
    }

    /// Hann-windowed STFT power spectrogram: `(freq_bins, frames)`.
    fn power_spectrogram(&self, audio: &[f32], frames: usize) -> Array2<f32> {
        let SpeechConfig {
            n_fft,
            hop_length,
            win_length,
            ..
        } = self.config;

        let window = hann_window(win_length);
        let freq_bins = n_fft / 2 + 1;
        let mut power = Array2::<f32>::zeros((freq_bins, frames));

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n_fft);
        let mut frame = vec![Complex::new(0.0, 0.0); n_fft];

        for t in 0..frames {
            let start = t * hop_length;
            frame.fill(Complex::new(0.0, 0.0));
            for (i, w) in window.iter().enumerate().take(audio.len() - start) {
                frame[i] = Complex::new(audio[start + i] * w, 0.0);
            }

            fft.process(&mut frame);

            for (k, bin) in frame.iter().take(freq_bins).enumerate() {
                power[[k, t]] = bin.norm_sqr();
            }
        }

        power
    }
}

/// `y[i] = x[i] - coef * x[i-1]`
fn preemphasize(audio: &[f32], coef: f32) -> Vec<f32> {
    let mut out = Vec::with_capacity(audio.len());
    if let Some(&first) = audio.first() {
        out.push(first);
        out.extend(
            audio
                .windows(2)
                .map(|pair| pair[1] - coef * pair[0]),
        );
    }
    out
}

fn hann_window(length: usize) -> Vec<f32> {
    (0..length)
        .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / (length as f32 - 1.0)).cos())
        .collect()
}

fn hz_to_mel(freq: f32) -> f32 {
    2595.0 * (1.0 + freq / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filterbank: `(n_mels, freq_bins)`.
fn mel_filterbank(n_fft: usize, n_mels: usize, sample_rate: usize) -> Array2<f32> {
    let freq_bins = n_fft / 2 + 1;
    let mut filterbank = Array2::<f32>::zeros((n_mels, freq_bins));

    let max_mel = hz_to_mel(sample_rate as f32 / 2.0);
    let mel_points: Vec<f32> = (0..=n_mels + 1)
        .map(|i| mel_to_hz(max_mel * i as f32 / (n_mels + 1) as f32))
        .collect();

    let bin_width = sample_rate as f32 / n_fft as f32;

    for (m, row) in filterbank.rows_mut().into_iter().enumerate() {
        let (left, center, right) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);

        for (k, weight) in row.into_iter().enumerate() {
            let freq = k as f32 * bin_width;
            if freq >= left && freq <= center && center > left {
                *weight = (freq - left) / (center - left);
            } else if freq > center && freq <= right && right > center {
                *weight = (right - freq) / (right - center);
            }
        }
    }

    filterbank
}

/// Normalize each feature dimension to mean 0, std 1.
fn normalize_columns(features: &mut Array2<f32>) {
    let frames = features.nrows();
    if frames == 0 {
        return;
    }

    for mut column in features.columns_mut() {
        let mean = column.iter().sum::<f32>() / frames as f32;
        let variance = column.iter().map(|&x| (x - mean).powi(2)).sum::<f32>() / frames as f32;
        let std = variance.sqrt().max(1e-10);
        column.mapv_inplace(|x| (x - mean) / std);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavWriter;
    use std::path::PathBuf;

    fn write_wav(name: &str, sample_rate: u32, channels: u16, samples: &[f32]) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for &sample in samples {
            writer.write_sample((sample * 32767.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    fn featurizer() -> SpeechFeaturizer {
        SpeechFeaturizer::new(SpeechConfig::default())
    }

    #[test]
    fn reads_mono_16khz() {
        let path = write_wav("voxrec_speech_mono.wav", 16000, 1, &[0.1, 0.2, 0.3]);

        let audio = featurizer().read_audio_mono(&path).unwrap();

        assert_eq!(audio.len(), 3);
        for (expected, actual) in [0.1, 0.2, 0.3].iter().zip(&audio) {
            assert!((expected - actual).abs() < 0.01);
        }

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn downmixes_stereo() {
        let path = write_wav("voxrec_speech_stereo.wav", 16000, 2, &[0.2, 0.4, 0.6, 0.8]);

        let audio = featurizer().read_audio_mono(&path).unwrap();

        assert_eq!(audio.len(), 2);
        assert!((audio[0] - 0.3).abs() < 0.01);
        assert!((audio[1] - 0.7).abs() < 0.01);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_wrong_sample_rate() {
        let path = write_wav("voxrec_speech_44k.wav", 44100, 1, &[0.0, 0.1]);

        let result = featurizer().read_audio_mono(&path);

        assert!(matches!(result, Err(crate::error::Error::Audio(_))));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_surround_channels() {
        let path = write_wav("voxrec_speech_surround.wav", 16000, 6, &[0.0; 12]);

        let result = featurizer().read_audio_mono(&path);

        assert!(matches!(
            result,
            Err(crate::error::Error::Audio(AudioError::InvalidChannels(6)))
        ));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn frame_count_matches_feature_rows() {
        let featurizer = featurizer();
        let audio = vec![0.01f32; 1600];

        let features = featurizer.features(&audio);

        // (1600 - 400) / 160 + 1 = 8 frames of 80 mels
        assert_eq!(featurizer.frame_count(audio.len()), 8);
        assert_eq!(features.shape(), &[8, 80]);
    }

    #[test]
    fn short_input_yields_no_frames() {
        let featurizer = featurizer();

        assert_eq!(featurizer.frame_count(10), 0);
        assert_eq!(featurizer.features(&[0.0; 10]).nrows(), 0);
    }

    #[test]
    fn normalization_centers_features() {
        let config = SpeechConfig {
            n_mels: 8,
            ..SpeechConfig::default()
        };
        let featurizer = SpeechFeaturizer::new(config);
        let audio: Vec<f32> = (0..3200).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();

        let features = featurizer.features(&audio);

        for column in features.columns() {
            let mean = column.iter().sum::<f32>() / column.len() as f32;
            assert!(mean.abs() < 1e-3, "column mean {mean} not centered");
        }
    }
}
