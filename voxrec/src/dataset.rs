//! Dataset loaders: shard sets and raw manifest slices back into batches.
//!
//! [`ShardDataset`] reads a committed shard set; [`SliceDataset`] reads
//! manifest rows directly, featurizing transcripts on the fly. Both yield
//! the same lazy batch stream and share the per-stage length metadata
//! used to compute step counts without re-scanning records.

use crate::error::{DatasetError, MetadataMissingError, Result};
use crate::manifest::{Manifest, Stage};
use crate::record::{self, Record};
use crate::shard::{ShardSetManifest, shard_file_path};
use crate::speech::SpeechFeaturizer;
use crate::text::TextFeaturizer;
use hound::WavReader;
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Per-stage length summary persisted by the compute-lengths pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMetadata {
    pub num_records: u64,
    pub max_input_frames: u64,
    pub min_input_frames: u64,
    pub max_label_length: u64,
}

/// Metadata file location for a stage under a path prefix.
pub fn metadata_path(prefix: &Path, stage: Stage) -> PathBuf {
    PathBuf::from(format!("{}.{stage}.metadata.json", prefix.display()))
}

/// Read persisted stage metadata.
///
/// An absent or unusable file both surface as [`MetadataMissingError`];
/// callers that can afford a full scan treat it as recoverable.
pub fn read_metadata(prefix: &Path, stage: Stage) -> Result<StageMetadata> {
    let path = metadata_path(prefix, stage);
    let missing = || MetadataMissingError(path.clone());

    let contents = fs::read_to_string(&path).map_err(|_| missing())?;
    let metadata = serde_json::from_str(&contents).map_err(|_| missing())?;
    Ok(metadata)
}

fn write_metadata(prefix: &Path, stage: Stage, metadata: &StageMetadata) -> Result<()> {
    let path = metadata_path(prefix, stage);
    let contents = serde_json::to_string_pretty(metadata).expect("metadata serializes");
    fs::write(&path, contents).map_err(DatasetError::Io)?;
    tracing::info!(path = %path.display(), records = metadata.num_records, "wrote stage metadata");
    Ok(())
}

/// One featurized training example.
#[derive(Clone, Debug)]
pub struct Example {
    /// Log-mel features, `(frames, n_mels)`
    pub features: Array2<f32>,
    pub labels: Vec<u32>,
}

/// A batch of featurized examples.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    pub examples: Vec<Example>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Zero-padded feature tensor `(batch, max_frames, n_mels)` with the
    /// true frame count per example.
    pub fn padded_features(&self, n_mels: usize) -> (Array3<f32>, Vec<usize>) {
        let lengths: Vec<usize> = self.examples.iter().map(|e| e.features.nrows()).collect();
        let max_frames = lengths.iter().copied().max().unwrap_or(0);

        let mut padded = Array3::zeros((self.examples.len(), max_frames, n_mels));
        for (b, example) in self.examples.iter().enumerate() {
            padded
                .slice_mut(ndarray::s![b, ..example.features.nrows(), ..])
                .assign(&example.features);
        }

        (padded, lengths)
    }

    /// Padded label matrix `(batch, max_len)` with the true label length
    /// per example.
    pub fn padded_labels(&self, pad: u32) -> (Array2<u32>, Vec<usize>) {
        let lengths: Vec<usize> = self.examples.iter().map(|e| e.labels.len()).collect();
        let max_len = lengths.iter().copied().max().unwrap_or(0);

        let mut padded = Array2::from_elem((self.examples.len(), max_len), pad);
        for (b, example) in self.examples.iter().enumerate() {
            for (i, &id) in example.labels.iter().enumerate() {
                padded[[b, i]] = id;
            }
        }

        (padded, lengths)
    }
}

/// Frames the speech featurizer would produce for a WAV, from its header.
fn wav_frames(speech: &SpeechFeaturizer, path: &Path) -> Result<u64> {
    let reader = WavReader::open(path)?;
    let samples = reader.duration() as usize;
    Ok(speech.frame_count(samples) as u64)
}

/// Sequential record reader over the shard files of one stage.
struct RecordIter {
    shards: Vec<PathBuf>,
    index: usize,
    reader: Option<BufReader<File>>,
}

impl RecordIter {
    fn new(shards: Vec<PathBuf>) -> Self {
        Self {
            shards,
            index: 0,
            reader: None,
        }
    }

    /// Restart from the first shard. Does not re-validate the set.
    fn rewind(&mut self) {
        self.index = 0;
        self.reader = None;
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            if self.reader.is_none() {
                let Some(path) = self.shards.get(self.index) else {
                    return Ok(None);
                };
                let file = File::open(path).map_err(DatasetError::Io)?;
                let mut reader = BufReader::new(file);
                match record::check_header(&mut reader) {
                    Ok(true) => {}
                    Ok(false) => {
                        return Err(DatasetError::CorruptShard {
                            shard: path.clone(),
                            reason: "bad magic".to_string(),
                        }
                        .into());
                    }
                    Err(e) => {
                        return Err(DatasetError::CorruptShard {
                            shard: path.clone(),
                            reason: e.to_string(),
                        }
                        .into());
                    }
                }
                self.reader = Some(reader);
            }

            let reader = self.reader.as_mut().expect("reader opened above");
            match Record::read_from(reader) {
                Ok(Some(record)) => return Ok(Some(record)),
                Ok(None) => {
                    self.reader = None;
                    self.index += 1;
                }
                Err(e) => {
                    let shard = self.shards[self.index].clone();
                    return Err(DatasetError::CorruptShard {
                        shard,
                        reason: e.to_string(),
                    }
                    .into());
                }
            }
        }
    }
}

/// Loader over a committed shard set for one stage.
pub struct ShardDataset {
    records_dir: PathBuf,
    stage: Stage,
    speech: SpeechFeaturizer,
    set: ShardSetManifest,
    metadata: Option<StageMetadata>,
    indefinite: bool,
}

impl ShardDataset {
    /// Open the shard set for a stage, refusing uncommitted or partial sets.
    pub fn open(records_dir: impl Into<PathBuf>, stage: Stage, speech: SpeechFeaturizer) -> Result<Self> {
        let records_dir = records_dir.into();
        let set = ShardSetManifest::load_committed(&records_dir, stage).ok_or_else(|| {
            DatasetError::IncompleteShardSet {
                stage: stage.as_str().to_string(),
                dir: records_dir.clone(),
            }
        })?;

        Ok(Self {
            records_dir,
            stage,
            speech,
            set,
            metadata: None,
            indefinite: false,
        })
    }

    /// Cycle batches without re-reading validation state each pass.
    pub fn indefinite(mut self, on: bool) -> Self {
        self.indefinite = on;
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn record_count(&self) -> u64 {
        self.set.total_records
    }

    pub fn metadata(&self) -> Option<&StageMetadata> {
        self.metadata.as_ref()
    }

    /// Steps per epoch for a batch size, preferring loaded metadata.
    pub fn total_steps(&self, batch_size: usize) -> u64 {
        let records = self
            .metadata
            .map(|m| m.num_records)
            .unwrap_or(self.set.total_records);
        records.div_ceil(batch_size as u64)
    }

    fn shard_paths(&self) -> Vec<PathBuf> {
        (0..self.set.shard_count)
            .map(|i| shard_file_path(&self.records_dir, self.stage, i, self.set.shard_count))
            .collect()
    }

    /// Lazy, restartable batch stream.
    pub fn batches(&self, batch_size: usize) -> Batches<'_> {
        Batches {
            records: RecordIter::new(self.shard_paths()),
            speech: &self.speech,
            batch_size: batch_size.max(1),
            indefinite: self.indefinite,
            saw_record_since_rewind: false,
        }
    }

    /// Full scan recomputing and overwriting the stage metadata.
    pub fn update_lengths(&mut self, prefix: &Path) -> Result<StageMetadata> {
        let mut records = RecordIter::new(self.shard_paths());
        let mut metadata = scan_start();

        while let Some(record) = records.next_record()? {
            let frames = wav_frames(&self.speech, &record.audio_path)?;
            scan_step(&mut metadata, frames, record.label_len() as u64);
        }

        let metadata = scan_finish(metadata);
        write_metadata(prefix, self.stage, &metadata)?;
        self.metadata = Some(metadata);
        Ok(metadata)
    }

    /// Load previously computed stage metadata.
    pub fn load_metadata(&mut self, prefix: &Path) -> Result<()> {
        self.metadata = Some(read_metadata(prefix, self.stage)?);
        Ok(())
    }
}

/// Lazy batch iterator over shard records.
pub struct Batches<'a> {
    records: RecordIter,
    speech: &'a SpeechFeaturizer,
    batch_size: usize,
    indefinite: bool,
    saw_record_since_rewind: bool,
}

impl Batches<'_> {
    fn load_example(&self, record: &Record) -> Result<Example> {
        let features = self.speech.extract(&record.audio_path)?;
        Ok(Example {
            features,
            labels: record.labels.clone(),
        })
    }
}

impl Iterator for Batches<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut examples = Vec::with_capacity(self.batch_size);

        while examples.len() < self.batch_size {
            match self.records.next_record() {
                Ok(Some(record)) => {
                    self.saw_record_since_rewind = true;
                    match self.load_example(&record) {
                        Ok(example) => examples.push(example),
                        Err(e) => return Some(Err(e)),
                    }
                }
                Ok(None) => {
                    if self.indefinite && self.saw_record_since_rewind {
                        self.saw_record_since_rewind = false;
                        self.records.rewind();
                        continue;
                    }
                    break;
                }
                Err(e) => return Some(Err(e)),
            }
        }

        if examples.is_empty() {
            None
        } else {
            Some(Ok(Batch { examples }))
        }
    }
}

/// Loader over raw manifest rows, featurizing transcripts on the fly.
pub struct SliceDataset {
    manifest: Manifest,
    stage: Stage,
    speech: SpeechFeaturizer,
    text: TextFeaturizer,
    metadata: Option<StageMetadata>,
    indefinite: bool,
}

impl SliceDataset {
    pub fn new(
        manifest: Manifest,
        stage: Stage,
        speech: SpeechFeaturizer,
        text: TextFeaturizer,
    ) -> Self {
        Self {
            manifest,
            stage,
            speech,
            text,
            metadata: None,
            indefinite: false,
        }
    }

    pub fn indefinite(mut self, on: bool) -> Self {
        self.indefinite = on;
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn record_count(&self) -> u64 {
        self.manifest.len() as u64
    }

    pub fn total_steps(&self, batch_size: usize) -> u64 {
        let records = self
            .metadata
            .map(|m| m.num_records)
            .unwrap_or(self.manifest.len() as u64);
        records.div_ceil(batch_size as u64)
    }

    pub fn batches(&self, batch_size: usize) -> SliceBatches<'_> {
        SliceBatches {
            dataset: self,
            batch_size: batch_size.max(1),
            position: 0,
        }
    }

    pub fn update_lengths(&mut self, prefix: &Path) -> Result<StageMetadata> {
        let mut metadata = scan_start();

        for entry in &self.manifest.entries {
            let frames = wav_frames(&self.speech, &entry.audio_path)?;
            let label_len = self.text.encode(&entry.transcript).len() as u64;
            scan_step(&mut metadata, frames, label_len);
        }

        let metadata = scan_finish(metadata);
        write_metadata(prefix, self.stage, &metadata)?;
        self.metadata = Some(metadata);
        Ok(metadata)
    }

    pub fn load_metadata(&mut self, prefix: &Path) -> Result<()> {
        self.metadata = Some(read_metadata(prefix, self.stage)?);
        Ok(())
    }
}

/// Lazy batch iterator over manifest rows.
pub struct SliceBatches<'a> {
    dataset: &'a SliceDataset,
    batch_size: usize,
    position: usize,
}

impl Iterator for SliceBatches<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.dataset.manifest.len();
        if total == 0 {
            return None;
        }
        if !self.dataset.indefinite && self.position >= total {
            return None;
        }

        let mut examples = Vec::with_capacity(self.batch_size);
        while examples.len() < self.batch_size {
            if self.position >= total {
                if self.dataset.indefinite {
                    self.position = 0;
                } else {
                    break;
                }
            }

            let entry = &self.dataset.manifest.entries[self.position];
            self.position += 1;

            let features = match self.dataset.speech.extract(&entry.audio_path) {
                Ok(features) => features,
                Err(e) => return Some(Err(e)),
            };
            examples.push(Example {
                features,
                labels: self.dataset.text.encode(&entry.transcript),
            });
        }

        if examples.is_empty() {
            None
        } else {
            Some(Ok(Batch { examples }))
        }
    }
}

fn scan_start() -> StageMetadata {
    StageMetadata {
        num_records: 0,
        max_input_frames: 0,
        min_input_frames: u64::MAX,
        max_label_length: 0,
    }
}

fn scan_step(metadata: &mut StageMetadata, frames: u64, label_len: u64) {
    metadata.num_records += 1;
    metadata.max_input_frames = metadata.max_input_frames.max(frames);
    metadata.min_input_frames = metadata.min_input_frames.min(frames);
    metadata.max_label_length = metadata.max_label_length.max(label_len);
}

fn scan_finish(mut metadata: StageMetadata) -> StageMetadata {
    if metadata.num_records == 0 {
        metadata.min_input_frames = 0;
    }
    metadata
}
