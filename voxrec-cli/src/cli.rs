//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use eyre::Result;

#[derive(Debug, Parser)]
#[command(name = "voxrec")]
#[command(about = "ASR dataset preparation and sharded record tools")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write the shard set for a stage from transcript manifests
    Create(crate::create::Args),

    /// Train and persist a subword vocabulary from transcript manifests
    Vocab(crate::vocab::Args),

    /// Scan a shard set and persist its length metadata
    Lengths(crate::lengths::Args),
}

/// Execute CLI command - separated for testing.
pub fn run_cli(cli: Cli) -> Result<()> {
    tracing::debug!(?cli, "parsed arguments");

    match cli.command {
        Commands::Create(args) => crate::create::execute(args.try_into()?),
        Commands::Vocab(args) => crate::vocab::execute(args.try_into()?),
        Commands::Lengths(args) => crate::lengths::execute(args.try_into()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use voxrec::manifest::Stage;
    use voxrec::vocab::VocabKind;

    #[test]
    fn parses_create_command() {
        let cli = Cli::parse_from(["voxrec", "create", "train.tsv"]);

        match &cli.command {
            Commands::Create(args) => {
                assert_eq!(args.transcripts, vec![PathBuf::from("train.tsv")]);
                assert_eq!(args.stage, Stage::Train);
                assert_eq!(args.shards, 16);
                assert!(!args.shuffle);
                assert!(args.seed.is_none());
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn parses_create_with_options() {
        let cli = Cli::parse_from([
            "voxrec", "create", "a.tsv", "b.tsv", "--stage", "eval", "--shards", "4", "--shuffle",
            "--seed", "42", "-d", "/data/records",
        ]);

        match &cli.command {
            Commands::Create(args) => {
                assert_eq!(args.transcripts.len(), 2);
                assert_eq!(args.stage, Stage::Eval);
                assert_eq!(args.shards, 4);
                assert!(args.shuffle);
                assert_eq!(args.seed, Some(42));
                assert_eq!(args.records_dir, PathBuf::from("/data/records"));
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn create_requires_a_transcript() {
        assert!(Cli::try_parse_from(["voxrec", "create"]).is_err());
    }

    #[test]
    fn parses_vocab_command() {
        let cli = Cli::parse_from([
            "voxrec",
            "vocab",
            "train.tsv",
            "--kind",
            "sentencepiece",
            "--vocab-size",
            "256",
        ]);

        match &cli.command {
            Commands::Vocab(args) => {
                assert_eq!(args.kind, VocabKind::SentencePiece);
                assert_eq!(args.vocab_size, Some(256));
                assert_eq!(args.output, PathBuf::from("vocab.json"));
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn parses_lengths_command() {
        let cli = Cli::parse_from(["voxrec", "lengths", "-d", "records", "--stage", "test"]);

        match &cli.command {
            Commands::Lengths(args) => {
                assert_eq!(args.records_dir, PathBuf::from("records"));
                assert_eq!(args.stage, Stage::Test);
                assert!(args.prefix.is_none());
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn rejects_unknown_stage() {
        assert!(Cli::try_parse_from(["voxrec", "create", "t.tsv", "--stage", "validation"]).is_err());
    }
}
