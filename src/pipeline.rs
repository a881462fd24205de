// src/pipeline.rs
//! Fetch → filter → parallel score → merge, delivered to a blocked caller.
//!
//! `PipelineExecutor::execute` is the synchronous bridge: it spawns the catalog
//! fetch on the tokio runtime, fans qualifying records out onto the rayon
//! scoring pool and parks the calling thread on a [`CompletionGate`] until one
//! terminal outcome exists. Three paths can complete a run (fetch failure,
//! aggregate success, aggregate failure) plus a supervisor for a fetch task
//! that dies; the gate keeps only the first.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;

use crate::catalog::{CatalogClient, RawRecord};
use crate::error::{PipelineError, ScoringError};
use crate::gate::CompletionGate;
use crate::scorer_pool::{EngineFactory, ScorerPool};
use crate::sentiment::{SentimentLabel, SentimentModel};

pub const NO_TITLE: &str = "(no title)";
pub const UNKNOWN_AUTHORS: &str = "(unknown)";

/// A catalog record enriched with its sentiment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredRecord {
    pub title: String,
    pub authors: String,
    pub description: String,
    pub sentiment_score: f32,
    pub sentiment_label: SentimentLabel,
}

/// Exactly one of these is produced per run. An empty `Success` is a success.
#[derive(Debug)]
pub enum PipelineOutcome {
    Success(Vec<ScoredRecord>),
    Failure(PipelineError),
}

impl PipelineOutcome {
    pub fn into_result(self) -> Result<Vec<ScoredRecord>, PipelineError> {
        match self {
            PipelineOutcome::Success(v) => Ok(v),
            PipelineOutcome::Failure(e) => Err(e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Success(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Fetching,
    Filtering,
    Scoring,
    Merging,
    Terminal,
}

type Gate = Arc<CompletionGate<PipelineOutcome>>;

pub struct PipelineExecutor<F: EngineFactory + 'static = Arc<SentimentModel>> {
    catalog: Arc<dyn CatalogClient>,
    scorers: Arc<ScorerPool<F>>,
    scoring_pool: Arc<rayon::ThreadPool>,
    runtime: Handle,
}

impl<F: EngineFactory + 'static> Clone for PipelineExecutor<F> {
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
            scorers: Arc::clone(&self.scorers),
            scoring_pool: Arc::clone(&self.scoring_pool),
            runtime: self.runtime.clone(),
        }
    }
}

impl<F: EngineFactory + 'static> PipelineExecutor<F> {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        scorers: Arc<ScorerPool<F>>,
        scoring_pool: Arc<rayon::ThreadPool>,
        runtime: Handle,
    ) -> Self {
        Self {
            catalog,
            scorers,
            scoring_pool,
            runtime,
        }
    }

    pub fn scorers(&self) -> &ScorerPool<F> {
        &self.scorers
    }

    /// Run one request to completion, blocking the calling thread.
    ///
    /// Must not be called from a tokio async worker or from a scoring-pool
    /// thread: the former would stall the fetch, the latter would starve the
    /// fan-out. Use `spawn_blocking` from async code.
    pub fn execute(&self, query: &str, max: u32) -> PipelineOutcome {
        let t0 = Instant::now();
        let gate: Gate = Arc::new(CompletionGate::new());

        trace_stage(query, PipelineStage::Fetching);
        let fetch = self.runtime.spawn({
            let this = self.clone();
            let gate = Arc::clone(&gate);
            let query = query.to_string();
            async move {
                match this.catalog.search(&query, max).await {
                    Ok(records) => this.fan_out(&query, records, gate),
                    Err(e) => {
                        gate.release(PipelineOutcome::Failure(PipelineError::Upstream(e)));
                    }
                }
            }
        });

        // A fetch task that panics never reaches the gate on its own.
        self.runtime.spawn({
            let gate = Arc::clone(&gate);
            async move {
                if let Err(join_err) = fetch.await {
                    gate.release(PipelineOutcome::Failure(PipelineError::Internal(format!(
                        "fetch task ended abnormally: {join_err}"
                    ))));
                }
            }
        });

        let outcome = gate.wait();
        trace_stage(query, PipelineStage::Terminal);

        histogram!("books_pipeline_duration_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        match &outcome {
            PipelineOutcome::Success(v) => {
                counter!("books_records_scored_total").increment(v.len() as u64);
            }
            PipelineOutcome::Failure(e) => {
                counter!("books_pipeline_failures_total", "kind" => e.kind()).increment(1);
            }
        }
        outcome
    }

    fn fan_out(&self, query: &str, records: Vec<RawRecord>, gate: Gate) {
        trace_stage(query, PipelineStage::Filtering);
        let fetched = records.len();
        counter!("books_records_fetched_total").increment(fetched as u64);
        let qualifying: Vec<RawRecord> = records
            .into_iter()
            .filter(RawRecord::has_description)
            .collect();

        tracing::debug!(
            target: "pipeline",
            %query,
            fetched,
            qualifying = qualifying.len(),
            "filtered catalog records"
        );

        if qualifying.is_empty() {
            gate.release(PipelineOutcome::Success(Vec::new()));
            return;
        }

        trace_stage(query, PipelineStage::Scoring);
        let fan_in = Arc::new(FanIn::new(qualifying.len(), gate, query));
        for record in qualifying {
            let scorers = Arc::clone(&self.scorers);
            let fan_in = Arc::clone(&fan_in);
            self.scoring_pool.spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| score_record(&scorers, record)))
                    .unwrap_or_else(|panic| Err(ScoringError::Panicked(panic_message(&*panic))));
                fan_in.complete(result);
            });
        }
    }
}

/// Counting barrier over the scoring tasks of one run.
struct FanIn {
    remaining: AtomicUsize,
    results: Mutex<Vec<ScoredRecord>>,
    failure: Mutex<Option<ScoringError>>,
    gate: Gate,
    query: String,
}

impl FanIn {
    fn new(tasks: usize, gate: Gate, query: &str) -> Self {
        Self {
            remaining: AtomicUsize::new(tasks),
            results: Mutex::new(Vec::with_capacity(tasks)),
            failure: Mutex::new(None),
            gate,
            query: query.to_string(),
        }
    }

    fn complete(&self, result: Result<ScoredRecord, ScoringError>) {
        match result {
            Ok(rec) => self.results.lock().push(rec),
            Err(e) => {
                tracing::warn!(target: "pipeline", query = %self.query, error = %e, "scoring task failed");
                self.failure.lock().get_or_insert(e);
            }
        }

        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        trace_stage(&self.query, PipelineStage::Merging);
        let outcome = match self.failure.lock().take() {
            Some(e) => PipelineOutcome::Failure(PipelineError::Scoring(e)),
            None => PipelineOutcome::Success(std::mem::take(&mut *self.results.lock())),
        };
        self.gate.release(outcome);
    }
}

fn score_record<F: EngineFactory>(
    scorers: &ScorerPool<F>,
    record: RawRecord,
) -> Result<ScoredRecord, ScoringError> {
    let description = record.description.unwrap_or_default();
    let prediction = scorers.score(&description)?;
    Ok(ScoredRecord {
        title: record.title.unwrap_or_else(|| NO_TITLE.to_string()),
        authors: join_authors(record.authors.as_deref()),
        description,
        sentiment_score: prediction.score,
        sentiment_label: prediction.label,
    })
}

/// `", "`-joined author list, or `(unknown)` when there is none.
pub fn join_authors(authors: Option<&[String]>) -> String {
    match authors {
        Some(a) if !a.is_empty() => a.join(", "),
        _ => UNKNOWN_AUTHORS.to_string(),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn trace_stage(query: &str, stage: PipelineStage) {
    tracing::debug!(target: "pipeline", %query, ?stage, "stage");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authors_join_or_unknown() {
        assert_eq!(join_authors(None), "(unknown)");
        assert_eq!(join_authors(Some(&[])), "(unknown)");
        let a = vec!["Ann".to_string(), "Bob".to_string()];
        assert_eq!(join_authors(Some(&a)), "Ann, Bob");
    }

    #[test]
    fn scored_record_serializes_camel_case() {
        let rec = ScoredRecord {
            title: "T".into(),
            authors: "A".into(),
            description: "D".into(),
            sentiment_score: 0.75,
            sentiment_label: SentimentLabel::Positive,
        };
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["sentimentScore"], 0.75);
        assert_eq!(v["sentimentLabel"], "Positive");
        assert_eq!(v["title"], "T");
    }

    #[test]
    fn panic_payloads_are_readable() {
        let p = catch_unwind(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(panic_message(&*p), "boom 1");
        let p = catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(&*p), "static");
    }
}
