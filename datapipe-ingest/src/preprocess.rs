//! Text normalization applied before embedding, plus near-duplicate removal.

use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Cosine similarity above which two texts count as duplicates.
pub const DUPLICATE_THRESHOLD: f64 = 0.9;

/// NLTK English stopword corpus.
const ENGLISH_STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
    "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his", "himself",
    "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself", "they", "them",
    "their", "theirs", "themselves", "what", "which", "who", "whom", "this", "that", "that'll",
    "these", "those", "am", "is", "are", "was", "were", "be", "been", "being", "have", "has",
    "had", "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
    "because", "as", "until", "while", "of", "at", "by", "for", "with", "about", "against",
    "between", "into", "through", "during", "before", "after", "above", "below", "to", "from",
    "up", "down", "in", "out", "on", "off", "over", "under", "again", "further", "then", "once",
    "here", "there", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more",
    "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
    "too", "very", "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
    "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn",
    "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn",
    "isn't", "ma", "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan",
    "shan't", "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't",
    "wouldn", "wouldn't",
];

/// Lowercases, strips punctuation and digit runs, collapses whitespace and
/// drops English stopwords.
#[derive(Debug, Clone)]
pub struct TextPreprocessor {
    non_word: Regex,
    digits: Regex,
    /// Terms of two or more word characters, as counted for TF-IDF
    term: Regex,
    stopwords: HashSet<&'static str>,
}

impl Default for TextPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextPreprocessor {
    pub fn new() -> Self {
        Self {
            non_word: Regex::new(r"[^\w\s]").unwrap(),
            digits: Regex::new(r"\d+").unwrap(),
            term: Regex::new(r"\b\w\w+\b").unwrap(),
            stopwords: ENGLISH_STOPWORDS.iter().copied().collect(),
        }
    }

    /// Lowercase, remove punctuation and digits, collapse whitespace.
    pub fn clean_text(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        let no_punct = self.non_word.replace_all(&lowered, "");
        let no_digits = self.digits.replace_all(&no_punct, "");
        no_digits.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn remove_stopwords(&self, text: &str) -> String {
        text.split_whitespace()
            .filter(|word| !self.stopwords.contains(word))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Full normalization chain used by the vectorization pass.
    pub fn preprocess(&self, text: &str) -> String {
        self.remove_stopwords(&self.clean_text(text))
    }

    /// Drop texts whose TF-IDF cosine similarity to an earlier kept text is
    /// above [`DUPLICATE_THRESHOLD`]. Order of the survivors is preserved.
    ///
    /// Weights use smoothed idf, `ln((1 + n) / (1 + df)) + 1`, over lowercased
    /// terms, and every vector is L2-normalized.
    pub fn deduplicate_texts(&self, texts: &[String]) -> Vec<String> {
        let vectors = self.tfidf_vectors(texts);
        let mut dropped = vec![false; texts.len()];
        let mut unique = Vec::new();

        for i in 0..texts.len() {
            if dropped[i] {
                continue;
            }
            unique.push(texts[i].clone());
            for j in (i + 1)..texts.len() {
                if !dropped[j] && cosine(&vectors[i], &vectors[j]) > DUPLICATE_THRESHOLD {
                    dropped[j] = true;
                }
            }
        }

        if unique.len() < texts.len() {
            tracing::debug!(
                "Dropped {} near-duplicate texts",
                texts.len() - unique.len()
            );
        }
        unique
    }

    fn tfidf_vectors(&self, texts: &[String]) -> Vec<HashMap<String, f64>> {
        let counts: Vec<HashMap<String, f64>> = texts
            .iter()
            .map(|text| {
                let lowered = text.to_lowercase();
                let mut tf = HashMap::new();
                for term in self.term.find_iter(&lowered) {
                    *tf.entry(term.as_str().to_string()).or_insert(0.0) += 1.0;
                }
                tf
            })
            .collect();

        let mut df: HashMap<&str, f64> = HashMap::new();
        for tf in &counts {
            for term in tf.keys() {
                *df.entry(term.as_str()).or_insert(0.0) += 1.0;
            }
        }

        let n = texts.len() as f64;
        counts
            .iter()
            .map(|tf| {
                let mut weights: HashMap<String, f64> = tf
                    .iter()
                    .map(|(term, count)| {
                        let idf = ((1.0 + n) / (1.0 + df[term.as_str()])).ln() + 1.0;
                        (term.clone(), count * idf)
                    })
                    .collect();
                let norm = weights.values().map(|w| w * w).sum::<f64>().sqrt();
                if norm > 0.0 {
                    weights.values_mut().for_each(|w| *w /= norm);
                }
                weights
            })
            .collect()
    }
}

fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(term, w)| large.get(term).map(|v| w * v))
        .sum()
}
