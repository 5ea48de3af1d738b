//! Collocation Statistics
//!
//! Windowed co-occurrence counting over a token corpus with derived
//! association measures:
//!
//! - PMI / NPMI, undefined (`None`, never 0) when any required count is zero
//! - Dunning log-likelihood-ratio (G²) significance gating
//! - `top_collocations` - significance-filtered, PMI-ranked neighbors
//!
//! Indexing is a chunked, cancellable batch job run outside the interactive
//! request path. Readers hold an immutable snapshot through
//! `CollocationHandle`; a reindex builds a fresh index and swaps it in
//! atomically instead of mutating in place.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{COLLOCATION_WINDOW, SIGNIFICANCE_THRESHOLD};

// ==================== Index ====================

/// Immutable co-occurrence statistics built in a batch pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollocationIndex {
    unigrams: HashMap<String, u64>,
    /// Keyed by canonically ordered (lesser, greater) token pair
    #[serde(with = "pair_entries")]
    pairs: HashMap<(String, String), u64>,
    total_tokens: u64,
    total_pairs: u64,
}

/// JSON maps need string keys, so pair counts travel as a list of
/// (first, second, count) entries.
mod pair_entries {
    use std::collections::HashMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        map: &HashMap<(String, String), u64>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let entries: Vec<(&str, &str, u64)> = map
            .iter()
            .map(|((first, second), count)| (first.as_str(), second.as_str(), *count))
            .collect();
        entries.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<(String, String), u64>, D::Error> {
        let entries = Vec::<(String, String, u64)>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|(first, second, count)| ((first, second), count))
            .collect())
    }
}

/// One ranked collocation neighbor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collocation {
    pub token: String,
    pub pmi: f64,
    pub npmi: f64,
    pub significance: f64,
    pub pair_count: u64,
}

fn pair_key(w1: &str, w2: &str) -> (String, String) {
    if w1 <= w2 {
        (w1.to_string(), w2.to_string())
    } else {
        (w2.to_string(), w1.to_string())
    }
}

impl CollocationIndex {
    pub fn token_count(&self, token: &str) -> u64 {
        self.unigrams.get(token).copied().unwrap_or(0)
    }

    pub fn pair_count(&self, w1: &str, w2: &str) -> u64 {
        self.pairs.get(&pair_key(w1, w2)).copied().unwrap_or(0)
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    /// Pointwise mutual information in bits. `None` when the pair was never
    /// observed or either marginal is zero: no data is not zero association.
    pub fn pmi(&self, w1: &str, w2: &str) -> Option<f64> {
        let joint = self.pair_count(w1, w2);
        let c1 = self.token_count(w1);
        let c2 = self.token_count(w2);
        if joint == 0 || c1 == 0 || c2 == 0 || self.total_pairs == 0 || self.total_tokens == 0 {
            return None;
        }
        let p_pair = joint as f64 / self.total_pairs as f64;
        let p1 = c1 as f64 / self.total_tokens as f64;
        let p2 = c2 as f64 / self.total_tokens as f64;
        Some((p_pair / (p1 * p2)).log2())
    }

    /// Normalized PMI, bounded to [-1, 1].
    pub fn npmi(&self, w1: &str, w2: &str) -> Option<f64> {
        let pmi = self.pmi(w1, w2)?;
        let p_pair = self.pair_count(w1, w2) as f64 / self.total_pairs as f64;
        let denom = -p_pair.log2();
        if denom <= 0.0 {
            // Pair probability of 1: perfect association by definition
            return Some(1.0);
        }
        Some((pmi / denom).clamp(-1.0, 1.0))
    }

    /// Dunning G² log-likelihood ratio for the pair's contingency table.
    /// `None` without an observed co-occurrence.
    pub fn log_likelihood_ratio(&self, w1: &str, w2: &str) -> Option<f64> {
        let joint = self.pair_count(w1, w2);
        let c1 = self.token_count(w1);
        let c2 = self.token_count(w2);
        if joint == 0 || c1 == 0 || c2 == 0 || self.total_pairs == 0 {
            return None;
        }

        let n = self.total_pairs as f64;
        let a = joint as f64;
        let b = (c1 as f64 - a).max(0.0);
        let c = (c2 as f64 - a).max(0.0);
        let d = (n - a - b - c).max(0.0);

        fn xlx(x: f64) -> f64 {
            if x > 0.0 {
                x * x.ln()
            } else {
                0.0
            }
        }

        let g2 = 2.0
            * (xlx(a) + xlx(b) + xlx(c) + xlx(d) + xlx(n)
                - xlx(a + b)
                - xlx(c + d)
                - xlx(a + c)
                - xlx(b + d));
        Some(g2.max(0.0))
    }

    /// Whether a pair passes the G² significance gate (p < 0.05).
    pub fn is_significant(&self, w1: &str, w2: &str) -> bool {
        self.log_likelihood_ratio(w1, w2)
            .map(|g2| g2 >= SIGNIFICANCE_THRESHOLD)
            .unwrap_or(false)
    }

    /// Top-k collocations for a word: significance-filtered, sorted by PMI
    /// descending, ties broken by token so output is reproducible.
    pub fn top_collocations(&self, word: &str, k: usize) -> Vec<Collocation> {
        let mut out: Vec<Collocation> = self
            .pairs
            .keys()
            .filter_map(|(first, second)| {
                let other = if first == word {
                    second
                } else if second == word {
                    first
                } else {
                    return None;
                };
                let significance = self.log_likelihood_ratio(word, other)?;
                if significance < SIGNIFICANCE_THRESHOLD {
                    return None;
                }
                Some(Collocation {
                    token: other.clone(),
                    pmi: self.pmi(word, other)?,
                    npmi: self.npmi(word, other)?,
                    significance,
                    pair_count: self.pair_count(word, other),
                })
            })
            .collect();

        out.sort_by(|a, b| {
            b.pmi
                .partial_cmp(&a.pmi)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.token.cmp(&b.token))
        });
        out.truncate(k);
        out
    }
}

// ==================== Builder ====================

/// Cancellation token shared with whoever scheduled the batch job.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Chunked batch builder. Feed one document (or sentence) per call; windows
/// do not cross chunk boundaries. O(tokens × windowSize) overall.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    window: usize,
    index: CollocationIndex,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new(COLLOCATION_WINDOW)
    }
}

impl IndexBuilder {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            index: CollocationIndex::default(),
        }
    }

    /// Accumulate counts for one chunk of tokens.
    pub fn feed_chunk<S: AsRef<str>>(&mut self, tokens: &[S]) {
        for token in tokens {
            *self
                .index
                .unigrams
                .entry(token.as_ref().to_string())
                .or_insert(0) += 1;
        }
        self.index.total_tokens += tokens.len() as u64;

        for i in 0..tokens.len() {
            let end = (i + self.window + 1).min(tokens.len());
            for j in (i + 1)..end {
                let key = pair_key(tokens[i].as_ref(), tokens[j].as_ref());
                *self.index.pairs.entry(key).or_insert(0) += 1;
                self.index.total_pairs += 1;
            }
        }
    }

    /// Feed chunks until exhausted or cancelled. Returns `true` when every
    /// chunk was processed; a cancelled build should be discarded, not
    /// swapped in.
    pub fn feed_all<S, C, I>(&mut self, chunks: I, cancel: &CancelToken) -> bool
    where
        S: AsRef<str>,
        C: AsRef<[S]>,
        I: IntoIterator<Item = C>,
    {
        for chunk in chunks {
            if cancel.is_cancelled() {
                return false;
            }
            self.feed_chunk(chunk.as_ref());
        }
        true
    }

    pub fn finish(self) -> CollocationIndex {
        self.index
    }
}

/// One-shot convenience build over a single token sequence.
pub fn build_index<S: AsRef<str>>(tokens: &[S], window: usize) -> CollocationIndex {
    let mut builder = IndexBuilder::new(window);
    builder.feed_chunk(tokens);
    builder.finish()
}

// ==================== Shared Handle ====================

/// Explicitly owned, passed-by-handle index. Concurrent reads are cheap
/// (clone of an `Arc` snapshot); a reindex swaps the whole snapshot
/// atomically so readers never observe a half-built index.
#[derive(Debug, Default)]
pub struct CollocationHandle {
    inner: RwLock<Arc<CollocationIndex>>,
}

impl CollocationHandle {
    pub fn new(index: CollocationIndex) -> Self {
        Self {
            inner: RwLock::new(Arc::new(index)),
        }
    }

    /// Current immutable snapshot.
    pub fn snapshot(&self) -> Arc<CollocationIndex> {
        self.inner.read().clone()
    }

    /// Replace the snapshot after a rebuild.
    pub fn swap(&self, index: CollocationIndex) {
        let tokens = index.total_tokens;
        *self.inner.write() = Arc::new(index);
        debug!(total_tokens = tokens, "collocation index swapped");
    }
}

// ==================== Tests ====================
