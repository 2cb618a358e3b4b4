//! Explicit configuration structs for each pipeline component.
//!
//! Every component takes an enumerated config with named fields and
//! documented defaults instead of an opaque bag of keyword arguments,
//! so the configuration surface is independently testable.

use crate::error::{ConfigError, PathError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Mel-spectrogram extraction parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Required input sample rate in Hz
    pub sample_rate: u32,
    /// Number of mel filterbank channels
    pub n_mels: usize,
    /// FFT size
    pub n_fft: usize,
    /// Analysis window length in samples
    pub win_length: usize,
    /// Hop between successive frames in samples
    pub hop_length: usize,
    /// Preemphasis coefficient
    pub preemphasis: f32,
    /// Normalize each feature dimension to zero mean, unit variance
    pub normalize_per_feature: bool,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            n_mels: 80,
            n_fft: 512,
            win_length: 400,
            hop_length: 160,
            preemphasis: 0.97,
            normalize_per_feature: true,
        }
    }
}

/// Vocabulary and text featurizer parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Character alphabet for the char featurizer
    pub alphabet: Vec<char>,
    /// Token table size targeted by subword training (reserved ids included)
    pub target_vocab_size: usize,
    /// Cap on corpus characters scanned during subword training
    pub max_corpus_chars: Option<usize>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            alphabet: default_alphabet(),
            target_vocab_size: 1000,
            max_corpus_chars: None,
        }
    }
}

/// English lowercase letters, space, and apostrophe.
fn default_alphabet() -> Vec<char> {
    let mut alphabet: Vec<char> = ('a'..='z').collect();
    alphabet.push(' ');
    alphabet.push('\'');
    alphabet
}

/// Top-level pipeline configuration persisted as JSON.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub speech: SpeechConfig,
    pub decoder: DecoderConfig,
}

impl PipelineConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| PathError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config)
    }
}
