//! Create subcommand - write the shard set for a stage.

use crate::featurizer::{self, VocabArgs};
use eyre::Result;
use std::path::PathBuf;
use voxrec::config::PipelineConfig;
use voxrec::context::RunContext;
use voxrec::manifest::{Manifest, Stage};
use voxrec::shard::{CreateOutcome, ShardSpec, create_records};
use voxrec::text::TextFeaturizer;

/// CLI arguments for shard set creation.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Transcript manifest files (tab-separated)
    #[arg(required = true)]
    pub transcripts: Vec<PathBuf>,

    /// Dataset stage the shard set belongs to
    #[arg(short, long, default_value = "train")]
    pub stage: Stage,

    /// Directory the shard files are written into
    #[arg(short = 'd', long, default_value = "records")]
    pub records_dir: PathBuf,

    /// Number of shard files
    #[arg(long, default_value_t = 16)]
    pub shards: usize,

    /// Shuffle records before assigning them to shards
    #[arg(long)]
    pub shuffle: bool,

    /// Seed for reproducible shuffling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Skip malformed manifest rows instead of failing
    #[arg(long)]
    pub skip_malformed: bool,

    /// Pipeline configuration JSON
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub vocab: VocabArgs,
}

/// Resolved configuration for shard set creation.
#[derive(Debug)]
pub struct Config {
    pub transcripts: Vec<PathBuf>,
    pub spec: ShardSpec,
    pub skip_malformed: bool,
    pub text: TextFeaturizer,
    pub ctx: RunContext,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        let pipeline = match &args.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };

        let text = featurizer::resolve(&args.vocab, &pipeline.decoder)?;

        let ctx = match args.seed {
            Some(seed) => RunContext::with_seed(seed),
            None => RunContext::new(),
        };

        Ok(Self {
            transcripts: args.transcripts,
            spec: ShardSpec {
                records_dir: args.records_dir,
                shard_count: args.shards,
                shuffle: args.shuffle,
                stage: args.stage,
            },
            skip_malformed: args.skip_malformed,
            text,
            ctx,
        })
    }
}

pub fn execute(config: Config) -> Result<()> {
    let manifest = Manifest::read_files(&config.transcripts, config.skip_malformed)?;

    tracing::info!(
        entries = manifest.len(),
        skipped = manifest.skipped,
        stage = %config.spec.stage,
        "manifest loaded"
    );

    let outcome = create_records(&manifest, &config.text, &config.spec, &config.ctx)?;

    match outcome {
        CreateOutcome::Skipped => {
            println!(
                "shard set for '{}' already complete in {}",
                config.spec.stage,
                config.spec.records_dir.display()
            );
        }
        CreateOutcome::Written { records, shards } => {
            println!(
                "wrote {records} records across {shards} shards to {}",
                config.spec.records_dir.display()
            );
        }
    }

    Ok(())
}
