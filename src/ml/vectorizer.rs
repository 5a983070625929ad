// src/ml/vectorizer.rs
//! TF-IDF bag-of-words features for story titles.
//!
//! Fitting learns a vocabulary and per-term inverse document frequencies from
//! the training titles and returns them as an immutable [`FittedTfidf`]. The
//! fitted value is the only way to transform further titles, so test and
//! inference rows always use the training column layout.
//!
//! Weighting follows the usual smoothed formulation:
//! `idf(t) = ln((1 + n) / (1 + df(t))) + 1`, rows L2-normalised.

use log::{debug, warn};
use ndarray::{Array1, Array2};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Unicode word tokens of at least two characters.
static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("token pattern is a valid regex"));

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TfidfVectorizer {
    pub lowercase: bool,
    /// Use `1 + ln(tf)` instead of raw counts.
    pub sublinear_tf: bool,
}

impl Default for TfidfVectorizer {
    fn default() -> Self {
        Self {
            lowercase: true,
            sublinear_tf: false,
        }
    }
}

impl TfidfVectorizer {
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let text = if self.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        TOKEN_PATTERN
            .find_iter(&text)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// Learns the vocabulary from `titles` and returns it together with the
    /// transformed training matrix.
    pub fn fit_transform(&self, titles: &[String]) -> (FittedTfidf, Array2<f64>) {
        let fitted = self.fit(titles);
        let matrix = fitted.transform(titles);
        (fitted, matrix)
    }

    pub fn fit(&self, titles: &[String]) -> FittedTfidf {
        let mut document_frequency: BTreeMap<String, usize> = BTreeMap::new();
        for title in titles {
            let unique: HashSet<String> = self.tokenize(title).into_iter().collect();
            for term in unique {
                *document_frequency.entry(term).or_insert(0) += 1;
            }
        }

        if document_frequency.is_empty() {
            warn!(
                "TF-IDF fitted on {} titles produced an empty vocabulary",
                titles.len()
            );
        }

        let n_documents = titles.len() as f64;
        let mut vocabulary = HashMap::with_capacity(document_frequency.len());
        let mut idf = Array1::zeros(document_frequency.len());
        // BTreeMap iteration gives lexicographic column order
        for (column, (term, df)) in document_frequency.into_iter().enumerate() {
            idf[column] = ((1.0 + n_documents) / (1.0 + df as f64)).ln() + 1.0;
            vocabulary.insert(term, column);
        }
        debug!(
            "TF-IDF vocabulary: {} terms from {} titles",
            vocabulary.len(),
            titles.len()
        );

        FittedTfidf {
            settings: *self,
            vocabulary,
            idf,
        }
    }
}

/// Vocabulary and IDF weights learned from a training corpus. Never mutated
/// after fitting.
#[derive(Debug, Clone)]
pub struct FittedTfidf {
    settings: TfidfVectorizer,
    vocabulary: HashMap<String, usize>,
    idf: Array1<f64>,
}

impl FittedTfidf {
    pub fn n_features(&self) -> usize {
        self.idf.len()
    }

    pub fn vocabulary(&self) -> &HashMap<String, usize> {
        &self.vocabulary
    }

    pub fn column_of(&self, term: &str) -> Option<usize> {
        self.vocabulary.get(term).copied()
    }

    pub fn idf(&self) -> &Array1<f64> {
        &self.idf
    }

    /// One row per title, one column per vocabulary term. Terms never seen
    /// during fitting are ignored; a title with no known terms is a zero row.
    pub fn transform(&self, titles: &[String]) -> Array2<f64> {
        let mut matrix = Array2::zeros((titles.len(), self.n_features()));

        for (row_idx, title) in titles.iter().enumerate() {
            let mut counts: HashMap<usize, f64> = HashMap::new();
            for token in self.settings.tokenize(title) {
                if let Some(&column) = self.vocabulary.get(&token) {
                    *counts.entry(column).or_insert(0.0) += 1.0;
                }
            }

            let mut row = matrix.row_mut(row_idx);
            for (column, tf) in counts {
                let tf = if self.settings.sublinear_tf {
                    1.0 + tf.ln()
                } else {
                    tf
                };
                row[column] = tf * self.idf[column];
            }

            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row.mapv_inplace(|v| v / norm);
            }
        }

        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titles(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_tokenizer_drops_single_characters_and_lowercases() {
        let v = TfidfVectorizer::default();
        assert_eq!(
            v.tokenize("Show HN: A Rust DB, v2 & I"),
            vec!["show", "hn", "rust", "db", "v2"]
        );
    }

    #[test]
    fn test_known_weights() {
        let (fitted, matrix) = TfidfVectorizer::default().fit_transform(&titles(&["the cat", "the dog"]));

        assert_eq!(fitted.column_of("cat"), Some(0));
        assert_eq!(fitted.column_of("dog"), Some(1));
        assert_eq!(fitted.column_of("the"), Some(2));

        // ln(3/2) + 1 for "cat", ln(3/3) + 1 for "the", then L2 normalised
        assert!((matrix[[0, 0]] - 0.814_802_47).abs() < 1e-6);
        assert!((matrix[[0, 2]] - 0.579_738_67).abs() < 1e-6);
        assert_eq!(matrix[[0, 1]], 0.0);
    }

    #[test]
    fn test_transform_reproduces_fit_matrix() {
        let train = titles(&[
            "Show HN: a tiny database",
            "Rust async internals",
            "Ask HN: favourite database",
        ]);
        let (fitted, fit_matrix) = TfidfVectorizer::default().fit_transform(&train);
        let again = fitted.transform(&train);

        assert_eq!(fit_matrix.dim(), again.dim());
        assert_eq!(fit_matrix, again);
    }

    #[test]
    fn test_column_count_is_stable_and_oov_is_ignored() {
        let (fitted, train_matrix) =
            TfidfVectorizer::default().fit_transform(&titles(&["rust compiler", "rust borrow checker"]));
        let other = fitted.transform(&titles(&["completely unseen words", "rust", ""]));

        assert_eq!(other.ncols(), train_matrix.ncols());
        assert_eq!(other.nrows(), 3);
        assert!(other.row(0).iter().all(|&v| v == 0.0));
        let rust = fitted.column_of("rust").unwrap();
        assert!((other[[1, rust]] - 1.0).abs() < 1e-12);
        assert!(other.row(2).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_rows_are_unit_length() {
        let (_, matrix) = TfidfVectorizer::default()
            .fit_transform(&titles(&["one two three", "two three four four"]));
        for row in matrix.rows() {
            assert!((row.dot(&row).sqrt() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_empty_corpus_gives_empty_vocabulary() {
        let (fitted, matrix) = TfidfVectorizer::default().fit_transform(&[]);
        assert_eq!(fitted.n_features(), 0);
        assert_eq!(matrix.dim(), (0, 0));
        assert_eq!(fitted.transform(&titles(&["anything"])).dim(), (1, 0));
    }

    #[test]
    fn test_sublinear_tf_dampens_repeats() {
        let corpus = titles(&["go go go go", "rust"]);
        let plain = TfidfVectorizer::default().fit(&corpus);
        let sublinear = TfidfVectorizer {
            sublinear_tf: true,
            ..TfidfVectorizer::default()
        }
        .fit(&corpus);
        // single-term rows normalise to 1 either way; the mix changes with two terms
        let sample = titles(&["go go go go rust"]);
        let go = plain.column_of("go").unwrap();
        assert!(sublinear.transform(&sample)[[0, go]] < plain.transform(&sample)[[0, go]]);
    }
}
