// src/sentiment.rs
//! Bag-of-words logistic sentiment classifier.
//!
//! `SentimentModel` holds trained weights and is shared read-only. A
//! `SentimentEngine` wraps the model together with a reusable feature buffer,
//! so one engine must only be driven by one caller at a time; the scorer pool
//! hands every worker its own.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::scorer_pool::{EngineFactory, Scorer};

const EPOCHS: usize = 300;
const LEARNING_RATE: f32 = 0.5;
const L2: f32 = 1e-3;
const NEGATION_WINDOW: usize = 3;

/// Built-in book-review corpus the service is trained on at startup.
pub const SEED_CORPUS: &[(&str, bool)] = &[
    ("I loved this book, it was amazing and inspiring", true),
    ("Great story, wonderful characters", true),
    ("Absolutely fantastic and engaging", true),
    ("Terrible writing, very boring", false),
    ("I hated this, waste of time", false),
    ("Bad plot and weak ending", false),
    ("Brilliant and thought-provoking", true),
    ("Not good, very disappointing", false),
    ("Enjoyable and well written", true),
    ("Mediocre at best, not recommended", false),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SentimentLabel {
    Positive,
    Negative,
}

impl SentimentLabel {
    pub fn from_bool(positive: bool) -> Self {
        if positive {
            SentimentLabel::Positive
        } else {
            SentimentLabel::Negative
        }
    }
}

/// Classifier output: `score` is the probability of the positive class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub score: f32,
    pub label: SentimentLabel,
}

#[derive(Debug, Clone)]
pub struct SentimentModel {
    weights: HashMap<String, f32>,
    bias: f32,
}

impl SentimentModel {
    /// Train on labelled samples. Fixed sample order, epochs and learning rate:
    /// the same corpus always yields the same weights.
    pub fn train(samples: &[(&str, bool)]) -> anyhow::Result<Self> {
        if samples.is_empty() {
            anyhow::bail!("cannot train sentiment model on an empty corpus");
        }

        let mut buf = Vec::new();
        let encoded: Vec<(Vec<String>, f32)> = samples
            .iter()
            .map(|(text, positive)| {
                featurize(text, &mut buf);
                (buf.clone(), if *positive { 1.0 } else { 0.0 })
            })
            .collect();

        let mut model = Self {
            weights: HashMap::new(),
            bias: 0.0,
        };

        for _ in 0..EPOCHS {
            for (features, target) in &encoded {
                let p = model.probability(features);
                let grad = p - target;
                let norm = feature_norm(features.len());
                for f in features {
                    let w = model.weights.entry(f.clone()).or_insert(0.0);
                    *w -= LEARNING_RATE * (grad * norm + L2 * *w);
                }
                model.bias -= LEARNING_RATE * grad;
            }
        }

        tracing::info!(
            samples = samples.len(),
            vocabulary = model.weights.len(),
            "sentiment model trained"
        );
        Ok(model)
    }

    /// Model trained on [`SEED_CORPUS`].
    pub fn seeded() -> anyhow::Result<Self> {
        Self::train(SEED_CORPUS)
    }

    pub fn vocabulary_len(&self) -> usize {
        self.weights.len()
    }

    /// `features` must be sorted and deduplicated (see [`featurize`]).
    fn probability(&self, features: &[String]) -> f32 {
        let norm = feature_norm(features.len());
        let z = features
            .iter()
            .filter_map(|f| self.weights.get(f))
            .fold(self.bias, |acc, w| acc + w * norm);
        sigmoid(z)
    }
}

/// Stateful per-worker engine over a shared model.
#[derive(Debug)]
pub struct SentimentEngine {
    model: Arc<SentimentModel>,
    scratch: Vec<String>,
}

impl SentimentEngine {
    pub fn new(model: Arc<SentimentModel>) -> Self {
        Self {
            model,
            scratch: Vec::with_capacity(64),
        }
    }
}

impl Scorer for SentimentEngine {
    fn predict(&mut self, text: &str) -> Prediction {
        featurize(text, &mut self.scratch);
        let score = self.model.probability(&self.scratch).clamp(0.0, 1.0);
        Prediction {
            score,
            label: SentimentLabel::from_bool(score >= 0.5),
        }
    }
}

impl EngineFactory for Arc<SentimentModel> {
    type Engine = SentimentEngine;

    fn build(&self) -> anyhow::Result<SentimentEngine> {
        Ok(SentimentEngine::new(Arc::clone(self)))
    }
}

/// Fill `out` with the sorted, deduplicated feature set of `text`.
/// Tokens within the negation window after a negator get a `not_` prefix.
fn featurize(text: &str, out: &mut Vec<String>) {
    out.clear();
    let tokens: Vec<String> = tokenize(text).collect();
    for (i, tok) in tokens.iter().enumerate() {
        if is_negator(tok) {
            out.push(tok.clone());
            continue;
        }
        let negated =
            (1..=NEGATION_WINDOW).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
        if negated {
            out.push(format!("not_{tok}"));
        } else {
            out.push(tok.clone());
        }
    }
    out.sort_unstable();
    out.dedup();
}

/// Alphanumeric tokens, lower-case.
fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(tok, "not" | "no" | "never" | "cannot" | "without" | "nor")
}

fn feature_norm(n: usize) -> f32 {
    if n == 0 {
        0.0
    } else {
        1.0 / (n as f32).sqrt()
    }
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}
