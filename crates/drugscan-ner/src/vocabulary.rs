//! Fixed word lists used by the matcher: stopwords, excluded abbreviations,
//! and the common-language reference vocabulary.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use tracing::{info, warn};

use crate::Result;

/// Dosage units and clinical abbreviations that collide with short drug names.
/// A candidate equal to one of these never matches.
const EXCLUDE_WORDS: &[&str] = &[
    "ml", "mg", "dl", "cc", "mcg", "gm", "nacl", "tbis", "tbi", "ptsd", "ppd", "relaxing",
    "bp", "copd",
];

/// English stopwords. Fuzzy matching is never attempted on these.
const STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
    "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his",
    "himself", "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself",
    "they", "them", "their", "theirs", "themselves", "what", "which", "who", "whom", "this",
    "that", "that'll", "these", "those", "am", "is", "are", "was", "were", "be", "been",
    "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an", "the",
    "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by", "for",
    "with", "about", "against", "between", "into", "through", "during", "before", "after",
    "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over", "under",
    "again", "further", "then", "once", "here", "there", "when", "where", "why", "how",
    "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no",
    "nor", "not", "only", "own", "same", "so", "than", "too", "very", "s", "t", "can",
    "will", "just", "don", "don't", "should", "should've", "now", "d", "ll", "m", "o", "re",
    "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn", "didn't", "doesn",
    "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn", "isn't", "ma",
    "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan", "shan't",
    "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't", "wouldn",
    "wouldn't",
];

const COMMON_WORDS: &str = include_str!("../data/common_words.txt");

fn exclude_set() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| EXCLUDE_WORDS.iter().copied().collect())
}

fn stopword_set() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

/// `word` is expected lower-cased.
pub fn is_excluded(word: &str) -> bool {
    exclude_set().contains(word)
}

/// `word` is expected lower-cased.
pub fn is_stopword(word: &str) -> bool {
    stopword_set().contains(word)
}

/// Where the reference vocabulary comes from.
#[derive(Debug, Clone, Default)]
pub enum VocabularySource {
    /// Word list bundled with the crate.
    #[default]
    Embedded,
    /// Newline-separated word list on disk.
    Path(PathBuf),
    /// Caller-supplied words.
    Words(Arc<Vec<String>>),
}

impl VocabularySource {
    pub fn words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Words(Arc::new(words.into_iter().map(Into::into).collect()))
    }

    /// Whether this is the small bundled list rather than a full dictionary.
    pub fn is_embedded(&self) -> bool {
        matches!(self, Self::Embedded)
    }

    /// Read the vocabulary as lower-cased, trimmed, non-empty words.
    pub fn load(&self) -> Result<Vec<String>> {
        let words = match self {
            Self::Embedded => {
                warn!(
                    "Using the bundled common-word list as reference vocabulary; \
                     set vocabulary_path to a full English word list for reliable disambiguation"
                );
                parse_word_list(COMMON_WORDS)
            }
            Self::Path(path) => {
                let content = std::fs::read_to_string(path)?;
                let words = parse_word_list(&content);
                info!(path = %path.display(), words = words.len(), "Loaded reference vocabulary");
                words
            }
            Self::Words(words) => words
                .iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        };
        Ok(words)
    }
}

fn parse_word_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.trim().to_lowercase())
        .filter(|line| !line.is_empty())
        .collect()
}
