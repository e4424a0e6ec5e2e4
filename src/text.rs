//! Turning free-text item descriptions into TF-IDF term weights.
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Debug;

use sprs::CsMat;

use super::matrix::csr_from_rows;
use super::FittingError;

/// Stop-word policy applied after tokenization.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum StopWords {
    /// Keep every token.
    None,
    /// Drop the built-in English stop-word list.
    English,
    /// Drop the given words (matched case-insensitively).
    Custom(Vec<String>),
}

impl StopWords {
    fn to_set(&self) -> HashSet<String> {
        match self {
            StopWords::None => HashSet::new(),
            StopWords::English => ENGLISH_STOP_WORDS.iter().map(|x| x.to_string()).collect(),
            StopWords::Custom(words) => words.iter().map(|x| x.to_lowercase()).collect(),
        }
    }
}

/// Anything that maps a corpus to an item by term weight matrix.
pub trait TextVectorizer: Debug {
    /// Fit on `corpus` and return the document by term matrix (one row per
    /// document, in corpus order) together with the vocabulary, where
    /// column `j` of the matrix corresponds to `vocabulary[j]`.
    fn fit_transform(
        &self,
        corpus: &[&str],
        stop_words: &StopWords,
    ) -> Result<(CsMat<f32>, Vec<String>), FittingError>;
}

/// TF-IDF vectorizer.
///
/// Documents are lowercased and split into tokens of at least two
/// alphanumeric (or underscore) characters. Term frequencies are raw
/// counts, idf is smoothed as `ln((1 + n) / (1 + df)) + 1`, and every
/// non-empty row is L2-normalized. The vocabulary is sorted
/// alphabetically.
#[derive(Clone, Copy, Debug, Default)]
pub struct TfIdfVectorizer;

impl TfIdfVectorizer {
    /// Create a new vectorizer.
    pub fn new() -> Self {
        TfIdfVectorizer
    }
}

fn tokenize<'a>(document: &'a str) -> impl Iterator<Item = String> + 'a {
    document
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.chars().count() >= 2)
        .map(|token| token.to_lowercase())
}

impl TextVectorizer for TfIdfVectorizer {
    fn fit_transform(
        &self,
        corpus: &[&str],
        stop_words: &StopWords,
    ) -> Result<(CsMat<f32>, Vec<String>), FittingError> {
        if corpus.is_empty() {
            return Err(FittingError::EmptyCorpus);
        }

        let stop_words = stop_words.to_set();

        let counts: Vec<BTreeMap<String, f32>> = corpus
            .iter()
            .map(|document| {
                let mut counts = BTreeMap::new();
                for token in tokenize(document).filter(|x| !stop_words.contains(x)) {
                    *counts.entry(token).or_insert(0.0) += 1.0;
                }
                counts
            })
            .collect();

        let mut document_frequencies: BTreeMap<&str, usize> = BTreeMap::new();
        for document in &counts {
            for term in document.keys() {
                *document_frequencies.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        if document_frequencies.is_empty() {
            return Err(FittingError::EmptyVocabulary);
        }

        let num_documents = corpus.len() as f32;
        let vocabulary: Vec<String> = document_frequencies.keys().map(|x| x.to_string()).collect();
        let columns: HashMap<&str, usize> = document_frequencies
            .keys()
            .enumerate()
            .map(|(idx, &term)| (term, idx))
            .collect();
        let idf: Vec<f32> = document_frequencies
            .values()
            .map(|&df| ((1.0 + num_documents) / (1.0 + df as f32)).ln() + 1.0)
            .collect();

        let rows = counts.iter().map(|document| {
            let mut row: Vec<(usize, f32)> = document
                .iter()
                .filter_map(|(term, &count)| {
                    columns
                        .get(term.as_str())
                        .map(|&col| (col, count * idf[col]))
                })
                .collect();

            let norm = row.iter().map(|&(_, x)| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for entry in &mut row {
                    entry.1 /= norm;
                }
            }

            row
        });

        let matrix = csr_from_rows(vocabulary.len(), rows);

        Ok((matrix, vocabulary))
    }
}

static ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst",
    "amoungst", "amount", "an", "and", "another", "any", "anyhow", "anyone", "anything", "anyway",
    "anywhere", "are", "around", "as", "at", "back", "be", "became", "because", "become",
    "becomes", "becoming", "been", "before", "beforehand", "behind", "being", "below", "beside",
    "besides", "between", "beyond", "bill", "both", "bottom", "but", "by", "call", "can",
    "cannot", "cant", "co", "con", "could", "couldnt", "cry", "de", "describe", "detail", "do",
    "done", "down", "due", "during", "each", "eg", "eight", "either", "eleven", "else",
    "elsewhere", "empty", "enough", "etc", "even", "ever", "every", "everyone", "everything",
    "everywhere", "except", "few", "fifteen", "fifty", "fill", "find", "fire", "first", "five",
    "for", "former", "formerly", "forty", "found", "four", "from", "front", "full", "further",
    "get", "give", "go", "had", "has", "hasnt", "have", "he", "hence", "her", "here",
    "hereafter", "hereby", "herein", "hereupon", "hers", "herself", "him", "himself", "his",
    "how", "however", "hundred", "i", "ie", "if", "in", "inc", "indeed", "interest", "into",
    "is", "it", "its", "itself", "keep", "last", "latter", "latterly", "least", "less", "ltd",
    "made", "many", "may", "me", "meanwhile", "might", "mill", "mine", "more", "moreover",
    "most", "mostly", "move", "much", "must", "my", "myself", "name", "namely", "neither",
    "never", "nevertheless", "next", "nine", "no", "nobody", "none", "noone", "nor", "not",
    "nothing", "now", "nowhere", "of", "off", "often", "on", "once", "one", "only", "onto", "or",
    "other", "others", "otherwise", "our", "ours", "ourselves", "out", "over", "own", "part",
    "per", "perhaps", "please", "put", "rather", "re", "same", "see", "seem", "seemed",
    "seeming", "seems", "serious", "several", "she", "should", "show", "side", "since",
    "sincere", "six", "sixty", "so", "some", "somehow", "someone", "something", "sometime",
    "sometimes", "somewhere", "still", "such", "system", "take", "ten", "than", "that", "the",
    "their", "them", "themselves", "then", "thence", "there", "thereafter", "thereby",
    "therefore", "therein", "thereupon", "these", "they", "thick", "thin", "third", "this",
    "those", "though", "three", "through", "throughout", "thru", "thus", "to", "together", "too",
    "top", "toward", "towards", "twelve", "twenty", "two", "un", "under", "until", "up", "upon",
    "us", "very", "via", "was", "we", "well", "were", "what", "whatever", "when", "whence",
    "whenever", "where", "whereafter", "whereas", "whereby", "wherein", "whereupon", "wherever",
    "whether", "which", "while", "whither", "who", "whoever", "whole", "whom", "whose", "why",
    "will", "with", "within", "without", "would", "yet", "you", "your", "yours", "yourself",
    "yourselves",
];

#[cfg(test)]
mod tests {
    use super::super::matrix::sparse_row;
    use super::*;

    fn row_norm(matrix: &CsMat<f32>, row: usize) -> f32 {
        sparse_row(matrix, row).values.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn tfidf_weights() {
        let (matrix, vocabulary) = TfIdfVectorizer::new()
            .fit_transform(&["The cat sat", "the dog sat"], &StopWords::English)
            .unwrap();

        assert_eq!(vocabulary, vec!["cat", "dog", "sat"]);
        assert_eq!(matrix.shape(), (2, 3));

        for row in 0..2 {
            assert!((row_norm(&matrix, row) - 1.0).abs() < 1e-6);
        }

        let cat = *matrix.get(0, 0).unwrap();
        let sat = *matrix.get(0, 2).unwrap();
        assert!(cat > sat);
        assert_eq!(matrix.get(0, 1), None);
    }

    #[test]
    fn short_tokens_and_punctuation() {
        let (_, vocabulary) = TfIdfVectorizer::new()
            .fit_transform(&["A space-station, x y!", "Space_Opera"], &StopWords::None)
            .unwrap();

        assert_eq!(vocabulary, vec!["space", "space_opera", "station"]);
    }

    #[test]
    fn custom_stop_words() {
        let (_, vocabulary) = TfIdfVectorizer::new()
            .fit_transform(
                &["alien invasion", "alien comedy"],
                &StopWords::Custom(vec!["Alien".to_owned()]),
            )
            .unwrap();

        assert_eq!(vocabulary, vec!["comedy", "invasion"]);
    }

    #[test]
    fn empty_inputs() {
        let vectorizer = TfIdfVectorizer::new();

        assert_eq!(
            vectorizer.fit_transform(&[], &StopWords::English).unwrap_err(),
            FittingError::EmptyCorpus
        );
        assert_eq!(
            vectorizer
                .fit_transform(&["the and of", "a"], &StopWords::English)
                .unwrap_err(),
            FittingError::EmptyVocabulary
        );
    }

    #[test]
    fn documents_without_terms_get_empty_rows() {
        let (matrix, _) = TfIdfVectorizer::new()
            .fit_transform(&["drama", "the"], &StopWords::English)
            .unwrap();

        assert_eq!(matrix.shape(), (2, 1));
        assert!(sparse_row(&matrix, 1).is_empty());
    }
}
