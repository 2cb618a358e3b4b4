//! Vocabulary construction and persistence.
//!
//! A [`Vocabulary`] is an ordered token table with two reserved entries:
//! blank at id 0 and unknown at the last id. Char vocabularies come
//! straight from a configured alphabet; subword and sentencepiece
//! vocabularies are trained from a corpus with a deterministic pair-merge
//! algorithm, so rebuilding from the same corpus and config yields the
//! same tokens with the same ids.

use crate::config::DecoderConfig;
use crate::error::{Result, VocabBuildError};
use crate::manifest::Manifest;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Reserved blank id, also the start-token convention for downstream models.
pub const BLANK_ID: u32 = 0;

/// Token string for the reserved blank id.
pub const BLANK_TOKEN: &str = "<blank>";

/// Token string for the reserved unknown id.
pub const UNKNOWN_TOKEN: &str = "<unk>";

/// Word-boundary marker used by the sentencepiece kind.
pub const WORD_MARKER: char = '\u{2581}';

/// Continuation prefix used by the subword kind.
pub const CONTINUATION: &str = "##";

/// Segmentation kind backing a vocabulary.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VocabKind {
    Char,
    Subword,
    SentencePiece,
}

impl FromStr for VocabKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "char" => Ok(VocabKind::Char),
            "subword" => Ok(VocabKind::Subword),
            "sentencepiece" => Ok(VocabKind::SentencePiece),
            other => Err(format!(
                "unknown vocabulary kind '{other}' (expected char, subword, or sentencepiece)"
            )),
        }
    }
}

/// Persisted vocabulary file layout.
#[derive(Serialize, Deserialize)]
struct VocabFile {
    kind: VocabKind,
    tokens: Vec<String>,
}

/// Ordered token table. Immutable after construction.
#[derive(Clone, Debug)]
pub struct Vocabulary {
    kind: VocabKind,
    tokens: Vec<String>,
    index: HashMap<String, u32>,
    max_token_chars: usize,
}

impl Vocabulary {
    /// Build a vocabulary of the given kind.
    ///
    /// Char vocabularies ignore `corpus_files` entirely; subword and
    /// sentencepiece kinds scan the transcripts of every reachable corpus
    /// file and train to `config.target_vocab_size`.
    pub fn build(corpus_files: &[PathBuf], kind: VocabKind, config: &DecoderConfig) -> Result<Self> {
        match kind {
            VocabKind::Char => Ok(Self::from_alphabet(&config.alphabet)),
            VocabKind::Subword | VocabKind::SentencePiece => {
                let corpus = read_corpus(corpus_files, config.max_corpus_chars)?;
                let pieces = train_pieces(&corpus, kind, config.target_vocab_size)?;
                Ok(Self::from_pieces(kind, pieces))
            }
        }
    }

    /// Char vocabulary over a fixed alphabet.
    pub fn from_alphabet(alphabet: &[char]) -> Self {
        let pieces = alphabet.iter().map(|c| c.to_string()).collect();
        Self::from_pieces(VocabKind::Char, pieces)
    }

    /// Build a table from non-reserved pieces, adding blank and unknown.
    pub fn from_pieces(kind: VocabKind, pieces: Vec<String>) -> Self {
        let mut tokens = Vec::with_capacity(pieces.len() + 2);
        tokens.push(BLANK_TOKEN.to_string());
        tokens.extend(pieces);
        tokens.push(UNKNOWN_TOKEN.to_string());
        Self::from_tokens(kind, tokens)
    }

    fn from_tokens(kind: VocabKind, tokens: Vec<String>) -> Self {
        let index = tokens
            .iter()
            .enumerate()
            .map(|(id, token)| (token.clone(), id as u32))
            .collect();
        let max_token_chars = tokens
            .iter()
            .map(|t| t.chars().count())
            .max()
            .unwrap_or(1);
        Self {
            kind,
            tokens,
            index,
            max_token_chars,
        }
    }

    pub fn kind(&self) -> VocabKind {
        self.kind
    }

    /// Full table size, reserved ids included.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn unknown_id(&self) -> u32 {
        self.tokens.len() as u32 - 1
    }

    pub fn id_of(&self, token: &str) -> Option<u32> {
        self.index.get(token).copied()
    }

    pub fn token_of(&self, id: u32) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Longest token length in chars, for bounded prefix matching.
    pub fn max_token_chars(&self) -> usize {
        self.max_token_chars
    }

    /// Persist the table as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = VocabFile {
            kind: self.kind,
            tokens: self.tokens.clone(),
        };
        let contents = serde_json::to_string_pretty(&file).expect("vocabulary serializes");
        fs::write(path, contents).map_err(|source| VocabBuildError::Save {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), tokens = self.tokens.len(), "saved vocabulary");
        Ok(())
    }

    /// Load a previously persisted table.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let load_err = |reason: String| VocabBuildError::Load {
            path: path.to_path_buf(),
            reason,
        };

        let contents = fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let file: VocabFile =
            serde_json::from_str(&contents).map_err(|e| load_err(e.to_string()))?;

        if file.tokens.len() < 2 {
            return Err(load_err("fewer than two tokens".to_string()).into());
        }
        if file.tokens.first().map(String::as_str) != Some(BLANK_TOKEN)
            || file.tokens.last().map(String::as_str) != Some(UNKNOWN_TOKEN)
        {
            return Err(load_err("reserved tokens out of place".to_string()).into());
        }

        Ok(Self::from_tokens(file.kind, file.tokens))
    }
}

/// Collect transcripts from reachable corpus files, up to `max_chars`.
fn read_corpus(corpus_files: &[PathBuf], max_chars: Option<usize>) -> Result<Vec<String>> {
    let mut transcripts = Vec::new();
    let mut total_chars = 0usize;
    let mut reachable = 0usize;

    'files: for path in corpus_files {
        if !path.is_file() {
            tracing::warn!(path = %path.display(), "corpus file unreachable, skipping");
            continue;
        }
        reachable += 1;

        let manifest = Manifest::read_files(std::slice::from_ref(path), true)?;
        for entry in manifest.entries {
            total_chars += entry.transcript.chars().count();
            transcripts.push(entry.transcript);
            if matches!(max_chars, Some(cap) if total_chars >= cap) {
                break 'files;
            }
        }
    }

    if reachable == 0 {
        return Err(VocabBuildError::NoCorpus.into());
    }

    Ok(transcripts)
}

/// Train non-reserved subword pieces from transcripts.
///
/// Pair-merge training: start from per-character symbols, repeatedly merge
/// the most frequent adjacent pair (ties broken lexicographically), stop
/// when the piece inventory reaches the target or no pair repeats. Final
/// ids follow frequency rank, again with lexicographic tie-breaking, so
/// the result depends only on corpus and config.
fn train_pieces(corpus: &[String], kind: VocabKind, target_vocab_size: usize) -> Result<Vec<String>> {
    // BTreeMap keeps word iteration order deterministic.
    let mut word_freq: BTreeMap<&str, u64> = BTreeMap::new();
    for transcript in corpus {
        for word in transcript.split_whitespace() {
            *word_freq.entry(word).or_insert(0) += 1;
        }
    }

    if word_freq.is_empty() {
        return Err(VocabBuildError::EmptyCorpus.into());
    }

    let mut words: Vec<(Vec<String>, u64)> = word_freq
        .iter()
        .map(|(word, freq)| (split_symbols(word, kind), *freq))
        .collect();

    // Two slots are reserved for blank and unknown.
    let target = target_vocab_size.saturating_sub(2).max(1);

    while piece_inventory(&words).len() < target {
        let Some(((left, right), count)) = best_pair(&words) else {
            break;
        };
        if count < 2 {
            break;
        }
        merge_pair(&mut words, &left, &right, kind);
    }

    let mut ranked: Vec<(String, u64)> = piece_inventory(&words).into_iter().collect();
    ranked.sort_by(|(a_tok, a_cnt), (b_tok, b_cnt)| {
        Reverse(a_cnt).cmp(&Reverse(b_cnt)).then(a_tok.cmp(b_tok))
    });
    ranked.truncate(target);

    Ok(ranked.into_iter().map(|(token, _)| token).collect())
}

fn split_symbols(word: &str, kind: VocabKind) -> Vec<String> {
    let mut symbols = Vec::with_capacity(word.chars().count());
    for (i, c) in word.chars().enumerate() {
        let symbol = match (kind, i) {
            (VocabKind::SentencePiece, 0) => format!("{WORD_MARKER}{c}"),
            (VocabKind::Subword, i) if i > 0 => format!("{CONTINUATION}{c}"),
            _ => c.to_string(),
        };
        symbols.push(symbol);
    }
    symbols
}

/// Weighted frequency of every symbol currently present.
fn piece_inventory(words: &[(Vec<String>, u64)]) -> BTreeMap<String, u64> {
    let mut inventory = BTreeMap::new();
    for (symbols, freq) in words {
        for symbol in symbols {
            *inventory.entry(symbol.clone()).or_insert(0) += freq;
        }
    }
    inventory
}

/// Most frequent adjacent symbol pair, ties broken lexicographically.
fn best_pair(words: &[(Vec<String>, u64)]) -> Option<((String, String), u64)> {
    let mut counts: HashMap<(String, String), u64> = HashMap::new();
    for (symbols, freq) in words {
        for pair in symbols.windows(2) {
            let key = (pair[0].clone(), pair[1].clone());
            *counts.entry(key).or_insert(0) += freq;
        }
    }

    counts
        .into_iter()
        .max_by(|(a_pair, a_cnt), (b_pair, b_cnt)| a_cnt.cmp(b_cnt).then(b_pair.cmp(a_pair)))
}

fn merge_pair(words: &mut [(Vec<String>, u64)], left: &str, right: &str, kind: VocabKind) {
    let merged = join_symbols(left, right, kind);

    for (symbols, _) in words.iter_mut() {
        let mut i = 0;
        while i + 1 < symbols.len() {
            if symbols[i] == left && symbols[i + 1] == right {
                symbols[i] = merged.clone();
                symbols.remove(i + 1);
            } else {
                i += 1;
            }
        }
    }
}

fn join_symbols(left: &str, right: &str, kind: VocabKind) -> String {
    match kind {
        VocabKind::Subword => format!("{left}{}", right.strip_prefix(CONTINUATION).unwrap_or(right)),
        _ => format!("{left}{right}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::fs;

    fn write_corpus(name: &str, transcripts: &[&str]) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut contents = String::from("PATH\tDURATION\tTRANSCRIPT\n");
        for (i, t) in transcripts.iter().enumerate() {
            contents.push_str(&format!("clip{i}.wav\t1.0\t{t}\n"));
        }
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn char_vocabulary_reserves_blank_and_unknown() {
        let vocab = Vocabulary::from_alphabet(&['a', 'b', 'c']);

        assert_eq!(vocab.len(), 5);
        assert_eq!(vocab.token_of(BLANK_ID), Some(BLANK_TOKEN));
        assert_eq!(vocab.id_of("a"), Some(1));
        assert_eq!(vocab.id_of("b"), Some(2));
        assert_eq!(vocab.id_of("c"), Some(3));
        assert_eq!(vocab.unknown_id(), 4);
        assert_eq!(vocab.token_of(4), Some(UNKNOWN_TOKEN));
    }

    #[test]
    fn char_build_ignores_corpus() {
        let config = DecoderConfig {
            alphabet: vec!['x', 'y'],
            ..DecoderConfig::default()
        };

        let vocab = Vocabulary::build(&[], VocabKind::Char, &config).unwrap();

        assert_eq!(vocab.len(), 4);
        assert_eq!(vocab.kind(), VocabKind::Char);
    }

    #[test]
    fn subword_training_is_deterministic() {
        let corpus = write_corpus(
            "voxrec_vocab_corpus.tsv",
            &["the cat sat", "the cat ran", "the dog sat"],
        );
        let config = DecoderConfig {
            target_vocab_size: 16,
            ..DecoderConfig::default()
        };

        let a = Vocabulary::build(std::slice::from_ref(&corpus), VocabKind::Subword, &config)
            .unwrap();
        let b = Vocabulary::build(std::slice::from_ref(&corpus), VocabKind::Subword, &config)
            .unwrap();

        assert_eq!(a.tokens(), b.tokens());
        assert!(a.len() <= 16);
        // "the" occurs three times, so its pieces merge into one token
        assert!(a.id_of("the").is_some());

        fs::remove_file(corpus).ok();
    }

    #[test]
    fn sentencepiece_pieces_carry_word_marker() {
        let corpus = write_corpus("voxrec_vocab_sp.tsv", &["aa aa aa bb"]);
        let config = DecoderConfig {
            target_vocab_size: 12,
            ..DecoderConfig::default()
        };

        let vocab =
            Vocabulary::build(std::slice::from_ref(&corpus), VocabKind::SentencePiece, &config)
                .unwrap();

        assert!(vocab.id_of("\u{2581}aa").is_some());

        fs::remove_file(corpus).ok();
    }

    #[test]
    fn save_load_round_trip() {
        let vocab = Vocabulary::from_alphabet(&['a', 'b']);
        let path = std::env::temp_dir().join("voxrec_vocab_roundtrip.json");

        vocab.save(&path).unwrap();
        let loaded = Vocabulary::load(&path).unwrap();

        assert_eq!(loaded.kind(), VocabKind::Char);
        assert_eq!(loaded.tokens(), vocab.tokens());

        fs::remove_file(path).ok();
    }

    #[test]
    fn load_rejects_misplaced_reserved_tokens() {
        let path = std::env::temp_dir().join("voxrec_vocab_badfile.json");
        fs::write(&path, r#"{"kind":"char","tokens":["a","b"]}"#).unwrap();

        let result = Vocabulary::load(&path);

        assert!(matches!(
            result,
            Err(Error::Vocab(VocabBuildError::Load { .. }))
        ));

        fs::remove_file(path).ok();
    }

    #[test]
    fn unreachable_corpus_is_vocab_build_error() {
        let config = DecoderConfig::default();
        let missing = vec![PathBuf::from("/nonexistent/corpus.tsv")];

        let result = Vocabulary::build(&missing, VocabKind::Subword, &config);

        assert!(matches!(
            result,
            Err(Error::Vocab(VocabBuildError::NoCorpus))
        ));
    }

    #[test]
    fn empty_corpus_is_vocab_build_error() {
        let corpus = write_corpus("voxrec_vocab_empty.tsv", &[]);
        let config = DecoderConfig::default();

        let result = Vocabulary::build(std::slice::from_ref(&corpus), VocabKind::Subword, &config);

        assert!(matches!(
            result,
            Err(Error::Vocab(VocabBuildError::EmptyCorpus))
        ));

        fs::remove_file(corpus).ok();
    }
}
