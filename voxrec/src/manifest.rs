//! Transcript manifest parsing.
//!
//! A manifest is one or more tab-separated transcript files with a
//! `PATH\tDURATION\tTRANSCRIPT` header row, each data row naming an audio
//! file, an optional duration in seconds, and its transcript.

use crate::error::{ManifestError, PathError, Result};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Dataset stage. Stages never share shard sets or metadata.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Stage {
    Train,
    Eval,
    Test,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Train => "train",
            Stage::Eval => "eval",
            Stage::Test => "test",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "train" => Ok(Stage::Train),
            "eval" => Ok(Stage::Eval),
            "test" => Ok(Stage::Test),
            other => Err(format!("unknown stage '{other}' (expected train, eval, or test)")),
        }
    }
}

/// One corpus row: audio file, optional duration, transcript.
#[derive(Clone, Debug, PartialEq)]
pub struct ManifestEntry {
    pub audio_path: PathBuf,
    pub duration: Option<f32>,
    pub transcript: String,
}

/// Ordered corpus manifest read from transcript files.
#[derive(Clone, Debug, Default)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
    /// Malformed rows skipped under the skip policy
    pub skipped: usize,
}

impl Manifest {
    /// Read one or more transcript files, preserving file and row order.
    ///
    /// Malformed rows fail the read unless `skip_malformed` is set, in
    /// which case they are counted and logged.
    pub fn read_files(paths: &[PathBuf], skip_malformed: bool) -> Result<Self> {
        let mut manifest = Self::default();

        for path in paths {
            if !path.is_file() {
                return Err(PathError::NotFound(path.clone()).into());
            }
            manifest.read_one(path, skip_malformed)?;
        }

        Ok(manifest)
    }

    fn read_one(&mut self, path: &Path, skip_malformed: bool) -> Result<()> {
        let file = File::open(path).map_err(|source| PathError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);

        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| PathError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;

            if index == 0 && is_header(&line) {
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }

            match parse_row(&line) {
                Some(entry) => self.entries.push(entry),
                None if skip_malformed => {
                    self.skipped += 1;
                    tracing::warn!(
                        file = %path.display(),
                        line = index + 1,
                        "skipping malformed manifest row"
                    );
                }
                None => {
                    return Err(ManifestError::MalformedRow {
                        file: path.to_path_buf(),
                        line: index + 1,
                    }
                    .into());
                }
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_header(line: &str) -> bool {
    line.starts_with("PATH") && line.contains("TRANSCRIPT")
}

fn parse_row(line: &str) -> Option<ManifestEntry> {
    let mut columns = line.splitn(3, '\t');
    let path = columns.next()?;
    let duration = columns.next()?;
    let transcript = columns.next()?;

    if path.is_empty() || transcript.is_empty() {
        return None;
    }

    let duration = if duration.is_empty() {
        None
    } else {
        Some(duration.parse().ok()?)
    };

    Some(ManifestEntry {
        audio_path: PathBuf::from(path),
        duration,
        transcript: transcript.to_string(),
    })
}
