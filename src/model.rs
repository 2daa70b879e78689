//! Online variational Bayes LDA.
//!
//! The pipeline treats this as a capability: `fit(corpus) -> model`,
//! `update(model, corpus) -> model`, `infer(model, doc) -> distribution`.
//! Mini-batch updates blend fresh sufficient statistics into a topics×vocab
//! weight matrix with a decaying learning rate, so an `update` run continues
//! where the loaded model's update counter left off.
//!
//! Determinism: initialization draws from a seeded `StdRng`, document E-steps
//! run on a fixed-size worker pool but are accumulated in document order, and
//! every arithmetic path is order-stable. For a fixed seed, corpus, and
//! dictionary the fitted matrix and inferred distributions are reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::ThreadPool;
use rayon::prelude::*;

use crate::config::TrainingParams;
use crate::constants::model as consts;
use crate::dictionary::{BowDocument, Dictionary};
use crate::errors::PipelineError;
use crate::types::{Token, TokenId};

/// Scalar model state persisted alongside the weight matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelState {
    /// Symmetric document-topic prior.
    pub alpha: f64,
    /// Symmetric topic-word prior.
    pub eta: f64,
    /// Learning-rate decay exponent.
    pub decay: f64,
    /// Learning-rate offset.
    pub offset: f64,
    /// Mini-batch size used for fitting and updating.
    pub chunk_size: usize,
    /// Passes over the corpus per fit/update call.
    pub num_passes: usize,
    /// Completed mini-batch updates across the model's lifetime.
    pub updates: u64,
    /// Seed the weight matrix was initialized from.
    pub seed: u64,
}

/// A fitted topic model over a fixed vocabulary.
#[derive(Debug)]
pub struct OnlineLda {
    num_topics: usize,
    vocab: Vec<Token>,
    /// Topic-word weights, row-major `num_topics × vocab.len()`.
    lambda: Vec<f64>,
    state: ModelState,
}

impl OnlineLda {
    /// Fit a fresh model over `docs` encoded against `dictionary`.
    pub fn fit(
        dictionary: &Dictionary,
        docs: &[BowDocument],
        params: TrainingParams,
        seed: u64,
        pool: &ThreadPool,
    ) -> Self {
        let vocab = dictionary.tokens();
        let num_topics = params.num_topics;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut lambda = vec![0.0; num_topics * vocab.len()];
        for value in lambda.iter_mut() {
            // Jitter around 1.0 breaks topic symmetry deterministically.
            *value = 1.0 + rng.random::<f64>();
        }
        let prior = 1.0 / num_topics as f64;
        let mut model = Self {
            num_topics,
            vocab,
            lambda,
            state: ModelState {
                alpha: prior,
                eta: prior,
                decay: consts::DECAY,
                offset: consts::OFFSET,
                chunk_size: params.chunk_size,
                num_passes: params.num_passes,
                updates: 0,
                seed,
            },
        };
        model.train(docs, pool);
        model
    }

    /// Reassemble a model from persisted parts.
    pub fn from_saved(
        state: ModelState,
        num_topics: usize,
        vocab: Vec<Token>,
        lambda: Vec<f64>,
    ) -> Result<Self, PipelineError> {
        if lambda.len() != num_topics * vocab.len() {
            return Err(PipelineError::Schema(format!(
                "topic-word matrix has {} entries, expected {} topics x {} tokens",
                lambda.len(),
                num_topics,
                vocab.len()
            )));
        }
        Ok(Self {
            num_topics,
            vocab,
            lambda,
            state,
        })
    }

    /// Incorporate `docs` (encoded against this model's own vocabulary) via
    /// further online updates. Topic count and vocabulary never change.
    pub fn update(&mut self, docs: &[BowDocument], pool: &ThreadPool) {
        self.train(docs, pool);
    }

    /// Topic distribution for one document with a zero minimum-probability
    /// floor: all `K` slots are explicit, even near zero.
    pub fn infer(&self, doc: &BowDocument) -> Vec<f64> {
        let exp_elogbeta = self.exp_expected_log_beta();
        let (gamma, _) = self.doc_e_step(doc, &exp_elogbeta);
        normalize(gamma)
    }

    /// Topic distributions for every document, in document order.
    pub fn infer_all(&self, docs: &[BowDocument], pool: &ThreadPool) -> Vec<Vec<f64>> {
        let exp_elogbeta = self.exp_expected_log_beta();
        pool.install(|| {
            docs.par_iter()
                .map(|doc| normalize(self.doc_e_step(doc, &exp_elogbeta).0))
                .collect()
        })
    }

    /// Topic count `K`.
    pub fn num_topics(&self) -> usize {
        self.num_topics
    }

    /// The vocabulary this model was trained against, in id order.
    ///
    /// Authoritative for `update` runs; the current run's freshly observed
    /// vocabulary never replaces it.
    pub fn vocab(&self) -> &[Token] {
        &self.vocab
    }

    /// Persisted scalar state.
    pub fn state(&self) -> ModelState {
        self.state
    }

    /// Raw topic-word weights, row-major.
    pub fn lambda(&self) -> &[f64] {
        &self.lambda
    }

    /// Expected log topic-word probabilities (the auxiliary bundle array).
    pub fn expected_log_beta(&self) -> Vec<f64> {
        let vocab_size = self.vocab.len();
        let mut out = vec![0.0; self.lambda.len()];
        if vocab_size == 0 {
            return out;
        }
        for topic in 0..self.num_topics {
            let row = &self.lambda[topic * vocab_size..(topic + 1) * vocab_size];
            let psi_total = digamma(row.iter().sum());
            for (idx, &value) in row.iter().enumerate() {
                out[topic * vocab_size + idx] = digamma(value) - psi_total;
            }
        }
        out
    }

    /// Top `limit` terms of one topic as `(token id, probability)` pairs,
    /// heaviest first, ties broken by id for stable output.
    pub fn topic_terms(&self, topic: usize, limit: usize) -> Vec<(TokenId, f64)> {
        let vocab_size = self.vocab.len();
        if vocab_size == 0 || topic >= self.num_topics {
            return Vec::new();
        }
        let row = &self.lambda[topic * vocab_size..(topic + 1) * vocab_size];
        let total: f64 = row.iter().sum();
        let mut weighted: Vec<(TokenId, f64)> = row
            .iter()
            .enumerate()
            .map(|(idx, &value)| (idx as TokenId, value / total))
            .collect();
        weighted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0)));
        weighted.truncate(limit);
        weighted
    }

    fn train(&mut self, docs: &[BowDocument], pool: &ThreadPool) {
        if docs.is_empty() || self.vocab.is_empty() {
            return;
        }
        let total_docs = docs.len();
        for _ in 0..self.state.num_passes {
            for chunk in docs.chunks(self.state.chunk_size) {
                let sstats = self.e_step(chunk, pool);
                self.m_step(&sstats, chunk.len(), total_docs);
            }
        }
    }

    /// Batch E-step: per-document variational inference on the worker pool,
    /// accumulated into sufficient statistics in document order.
    fn e_step(&self, docs: &[BowDocument], pool: &ThreadPool) -> Vec<f64> {
        let vocab_size = self.vocab.len();
        let exp_elogbeta = self.exp_expected_log_beta();
        let per_doc: Vec<(Vec<f64>, Vec<(usize, Vec<f64>)>)> = pool.install(|| {
            docs.par_iter()
                .map(|doc| self.doc_e_step(doc, &exp_elogbeta))
                .collect()
        });
        let mut sstats = vec![0.0; self.num_topics * vocab_size];
        for (_, contributions) in per_doc {
            for (word, per_topic) in contributions {
                for (topic, value) in per_topic.iter().enumerate() {
                    sstats[topic * vocab_size + word] += value;
                }
            }
        }
        sstats
    }

    /// Variational inference for one document.
    ///
    /// Returns the document's gamma vector and, per word, its per-topic
    /// expected count contribution.
    fn doc_e_step(
        &self,
        doc: &BowDocument,
        exp_elogbeta: &[f64],
    ) -> (Vec<f64>, Vec<(usize, Vec<f64>)>) {
        let k = self.num_topics;
        let vocab_size = self.vocab.len();
        let ids: Vec<usize> = doc.iter().map(|(id, _)| *id as usize).collect();
        let counts: Vec<f64> = doc.iter().map(|(_, count)| f64::from(*count)).collect();

        let mut gamma = vec![1.0; k];
        let mut exp_elogtheta = exp_dirichlet_expectation(&gamma);
        let mut phinorm = vec![0.0; ids.len()];

        for _ in 0..consts::MAX_GAMMA_ITERATIONS {
            fill_phinorm(&mut phinorm, &ids, &exp_elogtheta, exp_elogbeta, vocab_size);
            let last_gamma = gamma.clone();
            for topic in 0..k {
                let mut dot = 0.0;
                for (w_idx, &word) in ids.iter().enumerate() {
                    dot += counts[w_idx] * exp_elogbeta[topic * vocab_size + word]
                        / phinorm[w_idx];
                }
                gamma[topic] = self.state.alpha + exp_elogtheta[topic] * dot;
            }
            exp_elogtheta = exp_dirichlet_expectation(&gamma);
            let mean_change: f64 = gamma
                .iter()
                .zip(&last_gamma)
                .map(|(current, last)| (current - last).abs())
                .sum::<f64>()
                / k as f64;
            if mean_change < consts::GAMMA_CONVERGENCE {
                break;
            }
        }

        // Final normalizers must match the final theta expectation.
        fill_phinorm(&mut phinorm, &ids, &exp_elogtheta, exp_elogbeta, vocab_size);
        let mut contributions = Vec::with_capacity(ids.len());
        for (w_idx, &word) in ids.iter().enumerate() {
            let mut per_topic = vec![0.0; k];
            for (topic, slot) in per_topic.iter_mut().enumerate() {
                *slot = counts[w_idx] * exp_elogtheta[topic]
                    * exp_elogbeta[topic * vocab_size + word]
                    / phinorm[w_idx];
            }
            contributions.push((word, per_topic));
        }
        (gamma, contributions)
    }

    /// Blend batch sufficient statistics into the weight matrix.
    fn m_step(&mut self, sstats: &[f64], batch_len: usize, total_docs: usize) {
        if batch_len == 0 {
            return;
        }
        let rho = (self.state.offset + self.state.updates as f64).powf(-self.state.decay);
        let scale = total_docs as f64 / batch_len as f64;
        let eta = self.state.eta;
        for (value, stat) in self.lambda.iter_mut().zip(sstats) {
            let hat = eta + scale * stat;
            *value = (1.0 - rho) * *value + rho * hat;
        }
        self.state.updates += 1;
    }

    fn exp_expected_log_beta(&self) -> Vec<f64> {
        self.expected_log_beta()
            .into_iter()
            .map(f64::exp)
            .collect()
    }
}

/// Build the fixed-size worker pool for the model's parallel inner loop.
pub fn worker_pool(workers: usize) -> Result<ThreadPool, PipelineError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|err| PipelineError::Configuration(format!("worker pool: {err}")))
}

fn fill_phinorm(
    phinorm: &mut [f64],
    ids: &[usize],
    exp_elogtheta: &[f64],
    exp_elogbeta: &[f64],
    vocab_size: usize,
) {
    for (w_idx, &word) in ids.iter().enumerate() {
        let mut total = 0.0;
        for (topic, &theta) in exp_elogtheta.iter().enumerate() {
            total += theta * exp_elogbeta[topic * vocab_size + word];
        }
        phinorm[w_idx] = total + consts::PHI_EPSILON;
    }
}

fn exp_dirichlet_expectation(gamma: &[f64]) -> Vec<f64> {
    let psi_total = digamma(gamma.iter().sum());
    gamma
        .iter()
        .map(|&value| (digamma(value) - psi_total).exp())
        .collect()
}

fn normalize(values: Vec<f64>) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        let uniform = 1.0 / values.len().max(1) as f64;
        return vec![uniform; values.len()];
    }
    values.into_iter().map(|value| value / total).collect()
}

/// Digamma via the standard shift-then-asymptotic-series expansion.
fn digamma(mut x: f64) -> f64 {
    let mut result = 0.0;
    while x < 6.0 {
        result -= 1.0 / x;
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    result + x.ln() - 0.5 * inv
        - inv2 * (1.0 / 12.0 - inv2 * (1.0 / 120.0 - inv2 / 252.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dictionary(tokens: &[&str]) -> Dictionary {
        Dictionary::from_ordered_tokens(tokens.iter().map(|token| (*token).to_string()))
    }

    fn small_params() -> TrainingParams {
        TrainingParams {
            num_topics: 2,
            chunk_size: 10,
            num_passes: 5,
            workers: 2,
        }
    }

    fn docs() -> Vec<BowDocument> {
        vec![
            vec![(0, 3), (1, 1)],
            vec![(0, 1), (2, 2)],
            vec![(1, 2), (2, 1)],
            vec![(0, 2)],
        ]
    }

    #[test]
    fn digamma_matches_reference_values() {
        assert!((digamma(1.0) - (-0.577_215_664_9)).abs() < 1e-8);
        assert!((digamma(0.5) - (-1.963_510_026_0)).abs() < 1e-8);
        assert!((digamma(6.0) - 1.706_117_668_4).abs() < 1e-8);
    }

    #[test]
    fn fit_is_reproducible_for_a_fixed_seed() {
        let dict = dictionary(&["alpha", "beta", "gamma"]);
        let pool = worker_pool(2).unwrap();
        let first = OnlineLda::fit(&dict, &docs(), small_params(), 1, &pool);
        let second = OnlineLda::fit(&dict, &docs(), small_params(), 1, &pool);
        assert_eq!(first.lambda(), second.lambda());
        assert_eq!(first.infer(&docs()[0]), second.infer(&docs()[0]));
    }

    #[test]
    fn infer_yields_full_width_normalized_distributions() {
        let dict = dictionary(&["alpha", "beta", "gamma"]);
        let pool = worker_pool(2).unwrap();
        let model = OnlineLda::fit(&dict, &docs(), small_params(), 1, &pool);
        for doc in docs() {
            let distribution = model.infer(&doc);
            assert_eq!(distribution.len(), 2);
            assert!(distribution.iter().all(|&value| value >= 0.0));
            let total: f64 = distribution.iter().sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn empty_document_infers_a_uniform_distribution() {
        let dict = dictionary(&["alpha", "beta"]);
        let pool = worker_pool(1).unwrap();
        let model = OnlineLda::fit(&dict, &docs()[..1], small_params(), 1, &pool);
        let distribution = model.infer(&Vec::new());
        assert_eq!(distribution.len(), 2);
        assert!((distribution[0] - distribution[1]).abs() < 1e-9);
    }

    #[test]
    fn update_advances_the_update_counter_and_keeps_vocab() {
        let dict = dictionary(&["alpha", "beta", "gamma"]);
        let pool = worker_pool(2).unwrap();
        let mut model = OnlineLda::fit(&dict, &docs(), small_params(), 1, &pool);
        let fitted_updates = model.state().updates;
        model.update(&[vec![(0, 1), (1, 1)]], &pool);
        assert!(model.state().updates > fitted_updates);
        assert_eq!(model.vocab(), dict.tokens().as_slice());
        assert_eq!(model.num_topics(), 2);
    }

    #[test]
    fn from_saved_rejects_mismatched_matrix_dimensions() {
        let state = ModelState {
            alpha: 0.5,
            eta: 0.5,
            decay: consts::DECAY,
            offset: consts::OFFSET,
            chunk_size: 10,
            num_passes: 1,
            updates: 0,
            seed: 1,
        };
        let err = OnlineLda::from_saved(
            state,
            2,
            vec!["alpha".to_string(), "beta".to_string()],
            vec![0.0; 3],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn topic_terms_are_normalized_and_ordered() {
        let dict = dictionary(&["alpha", "beta", "gamma"]);
        let pool = worker_pool(1).unwrap();
        let model = OnlineLda::fit(&dict, &docs(), small_params(), 1, &pool);
        let terms = model.topic_terms(0, 2);
        assert_eq!(terms.len(), 2);
        assert!(terms[0].1 >= terms[1].1);
        let full = model.topic_terms(0, usize::MAX);
        let total: f64 = full.iter().map(|(_, weight)| weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}
