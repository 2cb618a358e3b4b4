//! Text featurizer: transcripts to token-id sequences and back.
//!
//! One polymorphic encode/decode capability over the tagged vocabulary
//! kinds. `decode(encode(s))` is an identity for any transcript composed
//! solely of vocabulary-coverable tokens (word-separating whitespace is
//! normalized to single spaces for the subword kinds). Input the
//! vocabulary cannot cover maps to the reserved unknown id; encoding
//! never fails.

use crate::vocab::{BLANK_ID, CONTINUATION, VocabKind, Vocabulary, WORD_MARKER};

/// Transcript encoder/decoder over a held vocabulary.
#[derive(Clone, Debug)]
pub struct TextFeaturizer {
    vocab: Vocabulary,
}

impl TextFeaturizer {
    pub fn new(vocab: Vocabulary) -> Self {
        Self { vocab }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Output dimension for alignment losses: the full table size, with
    /// blank and unknown already reserved inside it.
    pub fn num_classes(&self) -> usize {
        self.vocab.len()
    }

    /// Reserved blank id.
    pub fn blank(&self) -> u32 {
        BLANK_ID
    }

    /// Leading token for models that prepend a start symbol.
    pub fn prepend_id(&self) -> u32 {
        BLANK_ID
    }

    pub fn unknown_id(&self) -> u32 {
        self.vocab.unknown_id()
    }

    /// Encode a transcript into token ids. Never fails: uncoverable input
    /// becomes the unknown id.
    pub fn encode(&self, transcript: &str) -> Vec<u32> {
        match self.vocab.kind() {
            VocabKind::Char => transcript
                .chars()
                .map(|c| {
                    let mut buf = [0u8; 4];
                    self.vocab
                        .id_of(c.encode_utf8(&mut buf))
                        .unwrap_or_else(|| self.vocab.unknown_id())
                })
                .collect(),
            VocabKind::Subword => {
                let mut ids = Vec::new();
                for word in transcript.split_whitespace() {
                    self.encode_word(word, &mut ids);
                }
                ids
            }
            VocabKind::SentencePiece => {
                let mut ids = Vec::new();
                for word in transcript.split_whitespace() {
                    let marked = format!("{WORD_MARKER}{word}");
                    self.encode_greedy(&marked, &mut ids);
                }
                ids
            }
        }
    }

    /// Decode token ids back into a transcript. Reserved ids are dropped.
    pub fn decode(&self, ids: &[u32]) -> String {
        let tokens = ids
            .iter()
            .filter(|&&id| id != BLANK_ID && id != self.vocab.unknown_id())
            .filter_map(|&id| self.vocab.token_of(id));

        match self.vocab.kind() {
            VocabKind::Char => tokens.collect(),
            VocabKind::Subword => {
                let mut out = String::new();
                for token in tokens {
                    match token.strip_prefix(CONTINUATION) {
                        Some(rest) => out.push_str(rest),
                        None => {
                            if !out.is_empty() {
                                out.push(' ');
                            }
                            out.push_str(token);
                        }
                    }
                }
                out
            }
            VocabKind::SentencePiece => {
                let joined: String = tokens.collect();
                let spaced = joined.replace(WORD_MARKER, " ");
                spaced.trim_start().to_string()
            }
        }
    }

    /// Wordpiece-style segmentation: plain form at the word start,
    /// `##`-prefixed continuations after it.
    fn encode_word(&self, word: &str, ids: &mut Vec<u32>) {
        let chars: Vec<char> = word.chars().collect();
        let mut pos = 0;
        let mut continuation = false;

        while pos < chars.len() {
            let matched = self.longest_match(&chars[pos..], continuation);
            match matched {
                Some((id, consumed)) => {
                    ids.push(id);
                    pos += consumed;
                }
                None => {
                    ids.push(self.vocab.unknown_id());
                    pos += 1;
                }
            }
            continuation = true;
        }
    }

    /// Greedy longest-prefix segmentation over a marker-joined word.
    fn encode_greedy(&self, text: &str, ids: &mut Vec<u32>) {
        let chars: Vec<char> = text.chars().collect();
        let mut pos = 0;

        while pos < chars.len() {
            match self.longest_match(&chars[pos..], false) {
                Some((id, consumed)) => {
                    ids.push(id);
                    pos += consumed;
                }
                None => {
                    ids.push(self.vocab.unknown_id());
                    // swallow the marker together with its first character
                    pos += if chars[pos] == WORD_MARKER && pos + 1 < chars.len() {
                        2
                    } else {
                        1
                    };
                }
            }
        }
    }

    /// Longest vocabulary token matching a prefix of `chars`, returning
    /// its id and the number of source chars consumed.
    fn longest_match(&self, chars: &[char], continuation: bool) -> Option<(u32, usize)> {
        let max_len = self.vocab.max_token_chars().min(chars.len());

        for len in (1..=max_len).rev() {
            let piece: String = chars[..len].iter().collect();
            let candidate = if continuation {
                format!("{CONTINUATION}{piece}")
            } else {
                piece
            };
            if let Some(id) = self.vocab.id_of(&candidate) {
                return Some((id, len));
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecoderConfig;
    use crate::vocab::UNKNOWN_TOKEN;

    fn char_featurizer(alphabet: &[char]) -> TextFeaturizer {
        TextFeaturizer::new(Vocabulary::from_alphabet(alphabet))
    }

    #[test]
    fn char_encode_yields_consecutive_non_blank_ids() {
        let featurizer = char_featurizer(&['a', 'b', 'c']);

        let ids = featurizer.encode("abc");

        assert_eq!(ids, vec![1, 2, 3]);
        assert!(ids.iter().all(|&id| id != featurizer.blank()));
    }

    #[test]
    fn char_unknown_maps_to_reserved_id() {
        let featurizer = char_featurizer(&['a', 'b', 'c']);

        let ids = featurizer.encode("axc");

        assert_eq!(ids, vec![1, featurizer.unknown_id(), 3]);
    }

    #[test]
    fn char_round_trip_identity() {
        let featurizer = char_featurizer(&DecoderConfig::default().alphabet);

        for transcript in ["hello world", "it's a test", "abc"] {
            assert_eq!(featurizer.decode(&featurizer.encode(transcript)), transcript);
        }
    }

    #[test]
    fn num_classes_counts_reserved_ids() {
        let featurizer = char_featurizer(&['a', 'b', 'c']);

        // blank + 3 letters + unknown
        assert_eq!(featurizer.num_classes(), 5);
        assert_eq!(featurizer.blank(), 0);
        assert_eq!(featurizer.prepend_id(), 0);
    }

    #[test]
    fn subword_round_trip_identity() {
        let vocab = Vocabulary::from_pieces(
            VocabKind::Subword,
            vec![
                "the".to_string(),
                "cat".to_string(),
                "s".to_string(),
                "##at".to_string(),
                "##s".to_string(),
            ],
        );
        let featurizer = TextFeaturizer::new(vocab);

        for transcript in ["the cat", "the cats", "sat"] {
            assert_eq!(featurizer.decode(&featurizer.encode(transcript)), transcript);
        }
    }

    #[test]
    fn subword_unknown_piece_does_not_fail() {
        let vocab = Vocabulary::from_pieces(VocabKind::Subword, vec!["the".to_string()]);
        let featurizer = TextFeaturizer::new(vocab);

        let ids = featurizer.encode("the zoo");

        assert_eq!(ids[0], featurizer.vocabulary().id_of("the").unwrap());
        assert!(ids[1..].iter().all(|&id| id == featurizer.unknown_id()));
    }

    #[test]
    fn sentencepiece_round_trip_identity() {
        let vocab = Vocabulary::from_pieces(
            VocabKind::SentencePiece,
            vec![
                "\u{2581}the".to_string(),
                "\u{2581}c".to_string(),
                "at".to_string(),
                "s".to_string(),
            ],
        );
        let featurizer = TextFeaturizer::new(vocab);

        for transcript in ["the cat", "the cats cats"] {
            assert_eq!(featurizer.decode(&featurizer.encode(transcript)), transcript);
        }
    }

    #[test]
    fn decode_drops_blank_and_unknown() {
        let featurizer = char_featurizer(&['a', 'b']);
        let unk = featurizer.unknown_id();

        let text = featurizer.decode(&[0, 1, unk, 2, 0]);

        assert_eq!(text, "ab");
        assert_eq!(featurizer.vocabulary().token_of(unk), Some(UNKNOWN_TOKEN));
    }

    #[test]
    fn trained_subword_vocabulary_round_trips_corpus_words() {
        let corpus = std::env::temp_dir().join("voxrec_text_corpus.tsv");
        std::fs::write(
            &corpus,
            "PATH\tDURATION\tTRANSCRIPT\na.wav\t1.0\tthe quick brown fox\nb.wav\t1.0\tthe lazy dog\n",
        )
        .unwrap();

        let config = DecoderConfig {
            target_vocab_size: 64,
            ..DecoderConfig::default()
        };
        let vocab = Vocabulary::build(
            std::slice::from_ref(&corpus),
            VocabKind::SentencePiece,
            &config,
        )
        .unwrap();
        let featurizer = TextFeaturizer::new(vocab);

        for transcript in ["the quick brown fox", "the lazy dog", "quick dog"] {
            assert_eq!(featurizer.decode(&featurizer.encode(transcript)), transcript);
        }

        std::fs::remove_file(corpus).ok();
    }
}
