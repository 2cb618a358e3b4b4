//! Text featurizer selection shared by the subcommands.
//!
//! The selection chain mirrors how prepared corpora are laid out on disk:
//! an explicit sentencepiece vocabulary always wins, a subword vocabulary
//! is used when its file exists, and the character alphabet from the
//! pipeline config is the fallback.

use eyre::Result;
use std::path::PathBuf;
use voxrec::config::DecoderConfig;
use voxrec::text::TextFeaturizer;
use voxrec::vocab::Vocabulary;

/// Vocabulary selection flags shared by the subcommands.
#[derive(clap::Args, Clone, Debug)]
pub struct VocabArgs {
    /// Trained sentencepiece vocabulary file (must exist when given)
    #[arg(long)]
    pub sentencepiece: Option<PathBuf>,

    /// Trained subword vocabulary file (used when it exists)
    #[arg(long)]
    pub subwords: Option<PathBuf>,
}

/// Resolve the text featurizer from the selection flags.
pub fn resolve(args: &VocabArgs, config: &DecoderConfig) -> Result<TextFeaturizer> {
    if let Some(path) = &args.sentencepiece {
        tracing::info!(path = %path.display(), "using sentencepiece vocabulary");
        return Ok(TextFeaturizer::new(Vocabulary::load(path)?));
    }

    if let Some(path) = &args.subwords {
        if path.is_file() {
            tracing::info!(path = %path.display(), "using subword vocabulary");
            return Ok(TextFeaturizer::new(Vocabulary::load(path)?));
        }
        tracing::warn!(
            path = %path.display(),
            "subword vocabulary not found, falling back to characters"
        );
    }

    tracing::info!(chars = config.alphabet.len(), "using character vocabulary");
    Ok(TextFeaturizer::new(Vocabulary::from_alphabet(&config.alphabet)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxrec::vocab::VocabKind;

    fn no_flags() -> VocabArgs {
        VocabArgs {
            sentencepiece: None,
            subwords: None,
        }
    }

    #[test]
    fn defaults_to_character_vocabulary() {
        let featurizer = resolve(&no_flags(), &DecoderConfig::default()).unwrap();

        assert_eq!(featurizer.vocabulary().kind(), VocabKind::Char);
        // blank + 28 chars + unknown
        assert_eq!(featurizer.num_classes(), 30);
    }

    #[test]
    fn absent_subword_file_falls_back_to_characters() {
        let args = VocabArgs {
            sentencepiece: None,
            subwords: Some(PathBuf::from("/nonexistent/subwords.json")),
        };

        let featurizer = resolve(&args, &DecoderConfig::default()).unwrap();

        assert_eq!(featurizer.vocabulary().kind(), VocabKind::Char);
    }

    #[test]
    fn sentencepiece_must_exist() {
        let args = VocabArgs {
            sentencepiece: Some(PathBuf::from("/nonexistent/sp.json")),
            subwords: None,
        };

        assert!(resolve(&args, &DecoderConfig::default()).is_err());
    }

    #[test]
    fn existing_subword_file_is_loaded() {
        let path = std::env::temp_dir().join("voxrec_featurizer_subwords.json");
        let vocab = Vocabulary::from_pieces(
            VocabKind::Subword,
            vec!["the".to_string(), "##s".to_string()],
        );
        vocab.save(&path).unwrap();

        let args = VocabArgs {
            sentencepiece: None,
            subwords: Some(path.clone()),
        };
        let featurizer = resolve(&args, &DecoderConfig::default()).unwrap();

        assert_eq!(featurizer.vocabulary().kind(), VocabKind::Subword);

        std::fs::remove_file(path).ok();
    }
}
