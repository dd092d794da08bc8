//! Interest segment: TF-IDF weighting over a vocabulary learned from the
//! population's interest lists.
//!
//! Each user's interest list is one document. The vocabulary keeps the most
//! frequent terms of the corpus; terms shared by most users get a lower
//! inverse-document-frequency weight than rarer, more distinguishing ones.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lowercase and split into word tokens of at least two characters
#[inline]
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|s| s.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

/// Tokens of a whole interest list
fn document_tokens(interests: &[String]) -> Vec<String> {
    tokenize(&interests.join(" "))
}

/// Term vocabulary with per-slot idf weights
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    // term -> slot, slots assigned in alphabetical term order
    slots: BTreeMap<String, usize>,
    // slot -> idf
    idf: Vec<f64>,
    documents: usize,
}

impl Vocabulary {
    /// Learn a vocabulary of at most `max_terms` terms.
    ///
    /// Empty interest lists are not documents. Returns `None` when the corpus
    /// yields no usable term.
    pub fn fit<'a, I>(corpus: I, max_terms: usize) -> Option<Self>
    where
        I: IntoIterator<Item = &'a [String]>,
    {
        let mut term_counts: AHashMap<String, usize> = AHashMap::new();
        let mut doc_freqs: AHashMap<String, usize> = AHashMap::new();
        let mut documents = 0usize;

        for interests in corpus {
            if interests.is_empty() {
                continue;
            }
            documents += 1;

            let tokens = document_tokens(interests);
            let mut seen: Vec<&String> = Vec::with_capacity(tokens.len());
            for token in &tokens {
                *term_counts.entry(token.clone()).or_insert(0) += 1;
                if !seen.contains(&token) {
                    seen.push(token);
                    *doc_freqs.entry(token.clone()).or_insert(0) += 1;
                }
            }
        }

        if term_counts.is_empty() || max_terms == 0 {
            return None;
        }

        // Most frequent first, alphabetical among equals
        let mut ranked: Vec<(String, usize)> = term_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(max_terms);

        let mut selected: Vec<String> = ranked.into_iter().map(|(term, _)| term).collect();
        selected.sort();

        let n = documents as f64;
        let idf = selected
            .iter()
            .map(|term| {
                let df = doc_freqs.get(term).copied().unwrap_or(0) as f64;
                ((1.0 + n) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        let slots = selected
            .into_iter()
            .enumerate()
            .map(|(slot, term)| (term, slot))
            .collect();

        Some(Self {
            slots,
            idf,
            documents,
        })
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of non-empty interest lists the vocabulary was fitted on
    #[inline]
    pub fn documents(&self) -> usize {
        self.documents
    }

    #[inline]
    pub fn slot(&self, term: &str) -> Option<usize> {
        self.slots.get(term).copied()
    }

    #[inline]
    pub fn idf(&self, term: &str) -> Option<f64> {
        self.slot(term).map(|slot| self.idf[slot])
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Write the L2-normalised tf-idf weights of `interests` into `out`.
    /// Slots beyond the vocabulary size stay zero.
    pub fn transform_into(&self, interests: &[String], out: &mut [f32]) {
        out.fill(0.0);

        let mut weights = vec![0.0f64; self.len()];
        for token in document_tokens(interests) {
            if let Some(slot) = self.slot(&token) {
                weights[slot] += self.idf[slot];
            }
        }

        let norm = weights.iter().map(|w| w * w).sum::<f64>().sqrt();
        if norm == 0.0 {
            return;
        }

        for (slot, weight) in weights.into_iter().enumerate() {
            if let Some(cell) = out.get_mut(slot) {
                *cell = (weight / norm) as f32;
            }
        }
    }
}
