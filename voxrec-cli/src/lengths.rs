//! Lengths subcommand - scan a shard set and persist its length metadata.

use eyre::Result;
use std::path::PathBuf;
use voxrec::config::PipelineConfig;
use voxrec::dataset::ShardDataset;
use voxrec::manifest::Stage;
use voxrec::speech::SpeechFeaturizer;

/// CLI arguments for the length scan.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Directory holding the shard set
    #[arg(short = 'd', long, default_value = "records")]
    pub records_dir: PathBuf,

    /// Stage whose shard set is scanned
    #[arg(short, long, default_value = "train")]
    pub stage: Stage,

    /// Metadata path prefix (default: <records-dir>/lengths)
    #[arg(short, long)]
    pub prefix: Option<PathBuf>,

    /// Pipeline configuration JSON
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Resolved configuration for the length scan.
#[derive(Debug)]
pub struct Config {
    pub records_dir: PathBuf,
    pub stage: Stage,
    pub prefix: PathBuf,
    pub speech: SpeechFeaturizer,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        let pipeline = match &args.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };

        let prefix = args
            .prefix
            .unwrap_or_else(|| args.records_dir.join("lengths"));

        Ok(Self {
            records_dir: args.records_dir,
            stage: args.stage,
            prefix,
            speech: SpeechFeaturizer::new(pipeline.speech),
        })
    }
}

pub fn execute(config: Config) -> Result<()> {
    let mut dataset = ShardDataset::open(&config.records_dir, config.stage, config.speech)?;

    let metadata = dataset.update_lengths(&config.prefix)?;

    println!(
        "{} records: input frames {}..{}, max label length {}",
        metadata.num_records,
        metadata.min_input_frames,
        metadata.max_input_frames,
        metadata.max_label_length
    );

    Ok(())
}
