//! Record shard writer: balanced, crash-safe shard sets.
//!
//! A shard set for a stage is `shard_count` record files plus a JSON
//! shard-set manifest written last, after every shard has been flushed.
//! The manifest is the commit marker: a stage without one (or whose
//! per-shard counts disagree with the files on disk) is treated as
//! absent, so a run that dies mid-write can never leave a set a loader
//! would accept, and a retry starts clean.
//!
//! Callers must not run two creation jobs against the same records
//! directory and stage concurrently; each shard file is owned exclusively
//! by one writer for the duration of a run.

use crate::context::RunContext;
use crate::error::{ConfigError, PathError, Result, ShardWriteError};
use crate::manifest::{Manifest, Stage};
use crate::record::{self, Record};
use crate::text::TextFeaturizer;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Shard set sizing and placement.
#[derive(Clone, Debug)]
pub struct ShardSpec {
    pub records_dir: PathBuf,
    pub shard_count: usize,
    pub shuffle: bool,
    pub stage: Stage,
}

impl ShardSpec {
    pub fn shard_path(&self, index: usize) -> PathBuf {
        shard_file_path(&self.records_dir, self.stage, index, self.shard_count)
    }

    pub fn set_manifest_path(&self) -> PathBuf {
        set_manifest_path(&self.records_dir, self.stage)
    }
}

pub fn shard_file_path(dir: &std::path::Path, stage: Stage, index: usize, count: usize) -> PathBuf {
    dir.join(format!("{stage}.{:05}-of-{count:05}.rec", index + 1))
}

pub fn set_manifest_path(dir: &std::path::Path, stage: Stage) -> PathBuf {
    dir.join(format!("{stage}.shards.json"))
}

/// Commit marker for a completed shard set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShardSetManifest {
    pub stage: String,
    pub shard_count: usize,
    pub records_per_shard: Vec<u64>,
    pub total_records: u64,
}

impl ShardSetManifest {
    /// Load and validate the commit marker for a stage.
    ///
    /// Returns `None` unless the marker parses, is internally consistent,
    /// and every shard file it names holds exactly the record count the
    /// marker claims. A shard truncated or tampered with after commit
    /// fails the count and the whole set is treated as absent.
    pub fn load_committed(dir: &std::path::Path, stage: Stage) -> Option<Self> {
        let contents = fs::read_to_string(set_manifest_path(dir, stage)).ok()?;
        let set: Self = serde_json::from_str(&contents).ok()?;

        if set.stage != stage.as_str()
            || set.records_per_shard.len() != set.shard_count
            || set.records_per_shard.iter().sum::<u64>() != set.total_records
        {
            return None;
        }

        for (index, &claimed) in set.records_per_shard.iter().enumerate() {
            let path = shard_file_path(dir, stage, index, set.shard_count);
            if shard_record_count(&path) != Some(claimed) {
                return None;
            }
        }

        Some(set)
    }

    fn save(&self, path: &std::path::Path) -> std::io::Result<()> {
        let contents = serde_json::to_string_pretty(self).expect("shard manifest serializes");
        fs::write(path, contents)
    }
}

/// Count the records in a shard file.
///
/// `None` if the file is unreadable, carries a foreign header, or ends
/// mid-record.
fn shard_record_count(path: &std::path::Path) -> Option<u64> {
    let file = File::open(path).ok()?;
    let mut reader = std::io::BufReader::new(file);

    if !record::check_header(&mut reader).ok()? {
        return None;
    }

    let mut count = 0;
    loop {
        match Record::read_from(&mut reader) {
            Ok(Some(_)) => count += 1,
            Ok(None) => return Some(count),
            Err(_) => return None,
        }
    }
}

/// What a creation run did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CreateOutcome {
    /// A valid shard set already existed; nothing was written
    Skipped,
    /// A fresh shard set was committed
    Written { records: usize, shards: usize },
}

/// Create the shard set for a stage from a corpus manifest.
///
/// Re-running against an already committed set is a no-op. Any mid-write
/// failure discards the partial set for the stage before returning.
pub fn create_records(
    manifest: &Manifest,
    text: &TextFeaturizer,
    spec: &ShardSpec,
    ctx: &RunContext,
) -> Result<CreateOutcome> {
    if spec.shard_count == 0 {
        return Err(ConfigError::InvalidShardCount(0).into());
    }

    if let Some(existing) = ShardSetManifest::load_committed(&spec.records_dir, spec.stage) {
        if existing.shard_count == spec.shard_count {
            tracing::info!(
                stage = %spec.stage,
                dir = %spec.records_dir.display(),
                records = existing.total_records,
                "shard set already complete, skipping"
            );
            return Ok(CreateOutcome::Skipped);
        }
    }

    // Every audio reference must resolve before the first shard opens.
    for entry in &manifest.entries {
        if !entry.audio_path.is_file() {
            return Err(PathError::NotFound(entry.audio_path.clone()).into());
        }
    }

    let mut records: Vec<Record> = manifest
        .entries
        .iter()
        .map(|entry| Record {
            audio_path: entry.audio_path.clone(),
            duration: entry.duration.unwrap_or(0.0),
            labels: text.encode(&entry.transcript),
        })
        .collect();

    if spec.shuffle {
        records.shuffle(&mut ctx.rng());
    }

    fs::create_dir_all(&spec.records_dir).map_err(|source| ShardWriteError::CreateDir {
        dir: spec.records_dir.clone(),
        source,
    })?;
    clear_stage(spec);

    let count = records.len();
    let set = write_with_cleanup(records.into_iter().map(Ok), spec)?;

    tracing::info!(
        stage = %spec.stage,
        records = set.total_records,
        shards = set.shard_count,
        "shard set committed"
    );

    Ok(CreateOutcome::Written {
        records: count,
        shards: spec.shard_count,
    })
}

/// Write a shard set, discarding every partial artifact on failure.
pub(crate) fn write_with_cleanup<I>(records: I, spec: &ShardSpec) -> Result<ShardSetManifest>
where
    I: Iterator<Item = Result<Record>>,
{
    match write_shard_set(records, spec) {
        Ok(set) => Ok(set),
        Err(e) => {
            discard_partial(spec);
            Err(e)
        }
    }
}

fn write_shard_set<I>(records: I, spec: &ShardSpec) -> Result<ShardSetManifest>
where
    I: Iterator<Item = Result<Record>>,
{
    let shard_err = |shard: PathBuf| {
        move |source: std::io::Error| ShardWriteError::Io { shard, source }
    };

    let mut writers = Vec::with_capacity(spec.shard_count);
    for index in 0..spec.shard_count {
        let path = spec.shard_path(index);
        let file = File::create(&path).map_err(shard_err(path.clone()))?;
        let mut writer = BufWriter::new(file);
        record::write_header(&mut writer).map_err(shard_err(path.clone()))?;
        writers.push((path, writer));
    }

    let mut counts = vec![0u64; spec.shard_count];
    for (n, record) in records.enumerate() {
        let record = record?;
        let slot = n % spec.shard_count;
        let (path, writer) = &mut writers[slot];
        record
            .write_to(writer)
            .map_err(shard_err(path.clone()))?;
        counts[slot] += 1;
    }

    for (path, mut writer) in writers {
        writer.flush().map_err(shard_err(path))?;
    }

    let set = ShardSetManifest {
        stage: spec.stage.as_str().to_string(),
        shard_count: spec.shard_count,
        total_records: counts.iter().sum(),
        records_per_shard: counts,
    };

    let marker = spec.set_manifest_path();
    set.save(&marker).map_err(|source| ShardWriteError::Commit {
        path: marker,
        source,
    })?;

    Ok(set)
}

/// Remove every shard file and marker the stage left behind, whatever
/// shard count produced them. A regeneration with a new count must not
/// leave the old count's files next to the fresh set.
fn clear_stage(spec: &ShardSpec) {
    let Ok(entries) = fs::read_dir(&spec.records_dir) else {
        return;
    };

    let shard_prefix = format!("{}.", spec.stage);
    let marker = format!("{}.shards.json", spec.stage);

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name == marker || (name.starts_with(&shard_prefix) && name.ends_with(".rec")) {
            fs::remove_file(entry.path()).ok();
        }
    }
}

/// Remove every artifact of a failed run so a retry starts clean.
fn discard_partial(spec: &ShardSpec) {
    tracing::warn!(
        stage = %spec.stage,
        dir = %spec.records_dir.display(),
        "discarding partial shard set"
    );

    fs::remove_file(spec.set_manifest_path()).ok();
    for index in 0..spec.shard_count {
        fs::remove_file(spec.shard_path(index)).ok();
    }
}
