//! Vocab subcommand - train and persist a subword vocabulary.

use eyre::Result;
use std::path::PathBuf;
use voxrec::config::PipelineConfig;
use voxrec::vocab::{VocabKind, Vocabulary};

/// CLI arguments for vocabulary training.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Transcript manifest files forming the training corpus
    #[arg(required = true)]
    pub transcripts: Vec<PathBuf>,

    /// Vocabulary kind to train
    #[arg(short, long, default_value = "subword")]
    pub kind: VocabKind,

    /// Output vocabulary file
    #[arg(short, long, default_value = "vocab.json")]
    pub output: PathBuf,

    /// Target token table size (reserved ids included)
    #[arg(long)]
    pub vocab_size: Option<usize>,

    /// Pipeline configuration JSON
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Resolved configuration for vocabulary training.
#[derive(Debug)]
pub struct Config {
    pub transcripts: Vec<PathBuf>,
    pub kind: VocabKind,
    pub output: PathBuf,
    pub decoder: voxrec::config::DecoderConfig,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        let pipeline = match &args.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };

        let mut decoder = pipeline.decoder;
        if let Some(size) = args.vocab_size {
            decoder.target_vocab_size = size;
        }

        Ok(Self {
            transcripts: args.transcripts,
            kind: args.kind,
            output: args.output,
            decoder,
        })
    }
}

pub fn execute(config: Config) -> Result<()> {
    tracing::info!(
        kind = ?config.kind,
        target = config.decoder.target_vocab_size,
        corpus_files = config.transcripts.len(),
        "training vocabulary"
    );

    let vocab = Vocabulary::build(&config.transcripts, config.kind, &config.decoder)?;
    vocab.save(&config.output)?;

    println!(
        "wrote {} tokens to {}",
        vocab.len(),
        config.output.display()
    );

    Ok(())
}
