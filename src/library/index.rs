use std::collections::HashMap;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "me", "my",
    "of", "on", "or", "some", "songs", "the", "to", "with",
];

/// Sparse L2-normalised term vector
pub(crate) type TermVector = HashMap<String, f64>;

/// TF-IDF index over one document per song, using smoothed idf
/// `ln((1 + n) / (1 + df)) + 1`.
#[derive(Debug, Clone, Default)]
pub(crate) struct TfIdfIndex {
    idf: HashMap<String, f64>,
    documents: Vec<TermVector>,
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
}

fn normalize(vector: &mut TermVector) {
    let norm = vector.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for value in vector.values_mut() {
            *value /= norm;
        }
    }
}

impl TfIdfIndex {
    pub(crate) fn build(corpus: &[String]) -> Self {
        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        let mut term_counts = Vec::with_capacity(corpus.len());

        for text in corpus {
            let mut counts: HashMap<String, f64> = HashMap::new();
            for token in tokenize(text) {
                *counts.entry(token).or_insert(0.0) += 1.0;
            }
            for term in counts.keys() {
                *document_frequency.entry(term.clone()).or_insert(0) += 1;
            }
            term_counts.push(counts);
        }

        let n = corpus.len() as f64;
        let idf: HashMap<String, f64> = document_frequency
            .into_iter()
            .map(|(term, df)| (term, ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0))
            .collect();

        let documents = term_counts
            .into_iter()
            .map(|counts| {
                let mut vector: TermVector = counts
                    .into_iter()
                    .map(|(term, tf)| {
                        let weight = tf * idf.get(&term).copied().unwrap_or(0.0);
                        (term, weight)
                    })
                    .collect();
                normalize(&mut vector);
                vector
            })
            .collect();

        Self { idf, documents }
    }

    /// Vectorize free text against the fitted vocabulary; unknown terms are dropped
    pub(crate) fn vectorize(&self, text: &str) -> TermVector {
        let mut vector = TermVector::new();
        for token in tokenize(text) {
            if let Some(idf) = self.idf.get(&token) {
                *vector.entry(token).or_insert(0.0) += idf;
            }
        }
        normalize(&mut vector);
        vector
    }

    /// Document indices ordered by cosine similarity, ties in corpus order
    pub(crate) fn rank(&self, query: &TermVector) -> Vec<usize> {
        let mut scored: Vec<(usize, f64)> = self
            .documents
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                let dot = query
                    .iter()
                    .map(|(term, q)| q * doc.get(term).copied().unwrap_or(0.0))
                    .sum::<f64>();
                (i, dot)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.into_iter().map(|(i, _)| i).collect()
    }
}
