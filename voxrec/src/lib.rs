//! voxrec: ASR dataset preparation and sharded record pipeline.
//!
//! This crate turns tab-separated transcript manifests into balanced,
//! crash-safe shard sets of serialized training examples, and loads them
//! back as lazily featurized batch streams.
//!
//! # Architecture
//!
//! The pipeline is built from independently testable components:
//!
//! - [`manifest::Manifest`]: Parses transcript files into corpus entries
//! - [`vocab::Vocabulary`]: Builds char, subword, or sentencepiece token tables
//! - [`text::TextFeaturizer`]: Encodes transcripts into token-id sequences
//! - [`speech::SpeechFeaturizer`]: Extracts log-mel features from WAV audio
//! - [`shard::create_records`]: Writes balanced shard sets with a commit marker
//! - [`dataset::ShardDataset`] / [`dataset::SliceDataset`]: Batch loaders
//!
//! # Quick Start
//!
//! ```ignore
//! use voxrec::config::PipelineConfig;
//! use voxrec::context::RunContext;
//! use voxrec::manifest::{Manifest, Stage};
//! use voxrec::shard::{create_records, ShardSpec};
//! use voxrec::text::TextFeaturizer;
//! use voxrec::vocab::Vocabulary;
//!
//! let config = PipelineConfig::default();
//! let manifest = Manifest::read_files(&transcripts, false)?;
//! let text = TextFeaturizer::new(Vocabulary::from_alphabet(&config.decoder.alphabet));
//!
//! let spec = ShardSpec {
//!     records_dir: "records".into(),
//!     shard_count: 16,
//!     shuffle: true,
//!     stage: Stage::Train,
//! };
//! create_records(&manifest, &text, &spec, &RunContext::with_seed(42))?;
//! ```

pub mod config;
pub mod context;
pub mod dataset;
pub mod error;
pub mod manifest;
pub mod record;
pub mod shard;
pub mod speech;
pub mod text;
pub mod vocab;
