// src/scorer_pool.rs
//! Per-worker cache of scoring engines.
//!
//! Engines are expensive to build and unsafe to share, so the pool keeps one
//! slot per scoring-pool worker (keyed by `rayon::current_thread_index`) plus a
//! single shared slot for callers that are not pool workers. A slot is built on
//! first use and kept for the life of the process. Only the owning worker ever
//! locks a worker slot, so those locks are never contended.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use metrics::gauge;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::error::ScoringError;
use crate::sentiment::Prediction;

/// A stateful classifier; one caller at a time.
pub trait Scorer: Send {
    fn predict(&mut self, text: &str) -> Prediction;
}

/// Builds engines for the pool. Called at most once per slot.
pub trait EngineFactory: Send + Sync {
    type Engine: Scorer + 'static;

    fn build(&self) -> anyhow::Result<Self::Engine>;
}

/// Dedicated scoring threads, separate from the request-dispatch pool so
/// handlers blocked on the pipeline can never starve their own fan-out.
pub fn build_scoring_pool(workers: usize) -> anyhow::Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("books-score-{i}"))
        .build()
        .context("building scoring thread pool")
}

pub struct ScorerPool<F: EngineFactory> {
    factory: F,
    workers: Box<[OnceCell<Mutex<F::Engine>>]>,
    detached: OnceCell<Mutex<F::Engine>>,
    built: AtomicUsize,
}

impl<F: EngineFactory> ScorerPool<F> {
    /// `workers` must match the thread count of the rayon pool scoring runs on.
    pub fn new(factory: F, workers: usize) -> Self {
        let workers = (0..workers.max(1))
            .map(|_| OnceCell::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            factory,
            workers,
            detached: OnceCell::new(),
            built: AtomicUsize::new(0),
        }
    }

    pub fn worker_slots(&self) -> usize {
        self.workers.len()
    }

    /// Number of engines constructed so far.
    pub fn engines_built(&self) -> usize {
        self.built.load(Ordering::Relaxed)
    }

    /// Score `text` with the calling worker's own engine.
    pub fn score(&self, text: &str) -> Result<Prediction, ScoringError> {
        let slot = match rayon::current_thread_index() {
            Some(idx) if idx < self.workers.len() => &self.workers[idx],
            Some(idx) => {
                tracing::warn!(
                    worker = idx,
                    slots = self.workers.len(),
                    "worker index outside scorer pool, using shared engine"
                );
                &self.detached
            }
            None => &self.detached,
        };

        let engine = slot.get_or_try_init(|| self.build_engine())?;
        let mut engine = engine.lock();
        Ok(engine.predict(text))
    }

    fn build_engine(&self) -> Result<Mutex<F::Engine>, ScoringError> {
        let engine = self
            .factory
            .build()
            .map_err(|e| ScoringError::EngineInit(format!("{e:#}")))?;
        let n = self.built.fetch_add(1, Ordering::Relaxed) + 1;
        gauge!("books_scoring_engines").set(n as f64);
        tracing::debug!(
            worker = ?rayon::current_thread_index(),
            engines = n,
            "scoring engine built"
        );
        Ok(Mutex::new(engine))
    }
}
