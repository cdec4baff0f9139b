// 🔗 Integration Pipeline - validate, fetch, reconcile, score, assemble
//
// One synchronous pipeline per identifier. Batches fan identifiers out over
// a bounded pool of scoped worker threads; a failure or panic for one
// identifier is recorded against that identifier only.

use crate::assembler::{IntegrationResult, ResultAssembler, View};
use crate::cache::ResultCache;
use crate::config::IntegrationConfig;
use crate::db::SqliteSink;
use crate::error::{exit_codes, IntegrationError, PersistenceWarning};
use crate::generator::SyntheticGenerator;
use crate::identifier::TaxIdentifier;
use crate::persistence::{FileSink, ResultSink};
use crate::provider::{EnterpriseProvider, InsuranceProvider};
use crate::reconciliation::FieldReconciler;
use crate::retry::RetryPolicy;
use crate::stats::SessionStatistics;
use crate::upstream::{
    EnterpriseSource, HttpEnterpriseSource, HttpInsuranceSource, InsuranceSource, OfflineSource,
};
use anyhow::Context;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Successful outcome for one identifier
#[derive(Debug, Clone)]
pub struct IntegrationOutcome {
    pub result: Arc<IntegrationResult>,
    pub warnings: Vec<PersistenceWarning>,
    pub cache_hit: bool,
}

impl IntegrationOutcome {
    pub fn to_json(&self, view: View) -> serde_json::Value {
        let mut value = self.result.view(view);
        if let serde_json::Value::Object(map) = &mut value {
            map.insert("cache_hit".to_string(), self.cache_hit.into());
            if !self.warnings.is_empty() {
                map.insert(
                    "warnings".to_string(),
                    serde_json::to_value(&self.warnings).unwrap_or_default(),
                );
            }
        }
        value
    }
}

// ============================================================================
// BATCH REPORT
// ============================================================================

#[derive(Debug)]
pub struct BatchEntry {
    pub input: String,
    pub outcome: Result<IntegrationOutcome, IntegrationError>,
}

#[derive(Debug)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
    pub elapsed: Duration,
}

#[derive(Debug, Serialize)]
struct FailureView<'a> {
    input: &'a str,
    success: bool,
    error_kind: &'static str,
    error: String,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }

    /// Successes over inputs; an empty batch counts as fully successful
    pub fn success_ratio(&self) -> f64 {
        if self.entries.is_empty() {
            1.0
        } else {
            self.succeeded() as f64 / self.entries.len() as f64
        }
    }

    /// Internal faults outrank invalid input
    pub fn exit_code(&self) -> u8 {
        self.entries
            .iter()
            .filter_map(|e| e.outcome.as_ref().err())
            .map(IntegrationError::exit_code)
            .max()
            .unwrap_or(exit_codes::EXIT_SUCCESS)
    }

    pub fn summary(&self) -> String {
        format!(
            "Batch: {} identifiers, {} succeeded, {} failed ({:.1}% success) in {}ms",
            self.entries.len(),
            self.succeeded(),
            self.failed(),
            self.success_ratio() * 100.0,
            self.elapsed.as_millis()
        )
    }

    pub fn to_json(&self, view: View) -> serde_json::Value {
        let results: Vec<serde_json::Value> = self
            .entries
            .iter()
            .map(|entry| match &entry.outcome {
                Ok(outcome) => outcome.to_json(view),
                Err(err) => serde_json::to_value(FailureView {
                    input: &entry.input,
                    success: false,
                    error_kind: err.kind(),
                    error: err.to_string(),
                })
                .unwrap_or_default(),
            })
            .collect();

        serde_json::json!({
            "total": self.entries.len(),
            "succeeded": self.succeeded(),
            "failed": self.failed(),
            "success_ratio": self.success_ratio(),
            "elapsed_ms": self.elapsed.as_millis() as u64,
            "results": results,
        })
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct IntegrationEngine {
    enterprise: EnterpriseProvider,
    insurance: InsuranceProvider,
    reconciler: FieldReconciler,
    assembler: ResultAssembler,
    cache: Option<ResultCache>,
    workers: usize,
}

impl IntegrationEngine {
    /// Wire live sources, retry policies, cache and sinks from a config
    pub fn from_config(config: &IntegrationConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let enterprise: Arc<dyn EnterpriseSource> = if config.enterprise.enabled {
            Arc::new(
                HttpEnterpriseSource::new(&config.enterprise.base_url)
                    .context("Failed to build enterprise client")?,
            )
        } else {
            Arc::new(OfflineSource)
        };
        let insurance: Arc<dyn InsuranceSource> = if config.insurance.enabled {
            Arc::new(
                HttpInsuranceSource::new(&config.insurance.base_url)
                    .context("Failed to build insurance client")?,
            )
        } else {
            Arc::new(OfflineSource)
        };

        let mut engine = Self::assemble_engine(
            EnterpriseProvider::new(enterprise, config.enterprise_policy()),
            InsuranceProvider::new(insurance, config.insurance_policy()),
        )?
        .with_workers(config.batch.workers);

        if config.cache.enabled {
            engine = engine.with_cache(Duration::from_secs(config.cache.ttl_seconds));
        }

        if config.persistence.enabled {
            engine = engine.with_sink(Arc::new(FileSink::new(&config.persistence.output_dir)));
            if let Some(path) = &config.persistence.sqlite_path {
                let sink = SqliteSink::open(path)
                    .with_context(|| format!("Failed to open result database {}", path.display()))?;
                engine = engine.with_sink(Arc::new(sink));
            }
        }

        info!(
            enterprise_live = config.enterprise.enabled,
            insurance_live = config.insurance.enabled,
            cache = config.cache.enabled,
            sinks = engine.assembler.sink_count(),
            workers = engine.workers,
            "integration engine ready"
        );
        Ok(engine)
    }

    /// Engine over caller-supplied sources sharing one retry policy
    pub fn with_sources(
        enterprise: Arc<dyn EnterpriseSource>,
        insurance: Arc<dyn InsuranceSource>,
        policy: RetryPolicy,
    ) -> Result<Self, IntegrationError> {
        Self::assemble_engine(
            EnterpriseProvider::new(enterprise, policy.clone()),
            InsuranceProvider::new(insurance, policy),
        )
    }

    /// Both sources disabled; every result is synthetic
    pub fn offline() -> Result<Self, IntegrationError> {
        Self::with_sources(
            Arc::new(OfflineSource),
            Arc::new(OfflineSource),
            RetryPolicy::no_retry(Duration::from_secs(1)),
        )
    }

    fn assemble_engine(
        enterprise: EnterpriseProvider,
        insurance: InsuranceProvider,
    ) -> Result<Self, IntegrationError> {
        Ok(IntegrationEngine {
            enterprise,
            insurance,
            reconciler: FieldReconciler::new()?,
            assembler: ResultAssembler::new(),
            cache: None,
            workers: 4,
        })
    }

    pub fn with_cache(mut self, ttl: Duration) -> Self {
        self.cache = Some(ResultCache::new(ttl));
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.assembler = std::mem::take(&mut self.assembler).with_sink(sink);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Use a different synthetic anchor date on both providers
    pub fn with_generator(mut self, generator: SyntheticGenerator) -> Self {
        self.enterprise = self.enterprise.with_generator(generator.clone());
        self.insurance = self.insurance.with_generator(generator);
        self
    }

    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }

    /// Run the full pipeline for one raw identifier
    pub fn process(
        &self,
        raw: &str,
        stats: &SessionStatistics,
        view: View,
    ) -> Result<IntegrationOutcome, IntegrationError> {
        let started = Instant::now();
        let outcome = self.run(raw, view);

        match &outcome {
            Ok(out) => stats.record_success(
                out.result.enterprise.provenance(),
                out.result.insurance.provenance(),
                started.elapsed(),
                out.cache_hit,
            ),
            Err(err) => {
                if err.is_user_error() {
                    warn!(input = raw, error = %err, "identifier rejected");
                } else {
                    error!(input = raw, kind = err.kind(), error = %err, "integration aborted");
                }
                stats.record_failure(err, started.elapsed());
            }
        }

        outcome
    }

    fn run(&self, raw: &str, view: View) -> Result<IntegrationOutcome, IntegrationError> {
        let started = Instant::now();
        let id = TaxIdentifier::parse(raw)?;

        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(&id)) {
            debug!(mst = %id, run_id = %cached.run_id, "served from cache");
            return Ok(IntegrationOutcome {
                result: cached,
                warnings: Vec::new(),
                cache_hit: true,
            });
        }

        let enterprise = self.enterprise.fetch(&id);
        let insurance = self.insurance.fetch(&id)?;
        let profile = self.reconciler.reconcile(&enterprise, &insurance);
        let result = self
            .assembler
            .assemble(id.clone(), enterprise, insurance, profile, started.elapsed());
        let warnings = self.assembler.publish(&result, view);

        info!(
            mst = %id,
            run_id = %result.run_id,
            enterprise = result.enterprise.provenance().as_str(),
            insurance = result.insurance.provenance().as_str(),
            confidence = result.integration_confidence,
            risk = result.risk.tier.as_str(),
            warnings = warnings.len(),
            "integration complete"
        );

        let result = Arc::new(result);
        if let Some(cache) = &self.cache {
            cache.insert(id, Arc::clone(&result));
        }

        Ok(IntegrationOutcome {
            result,
            warnings,
            cache_hit: false,
        })
    }

    /// Process identifiers on the worker pool, keeping input order
    pub fn process_batch(
        &self,
        inputs: &[String],
        stats: &SessionStatistics,
        view: View,
    ) -> BatchReport {
        let started = Instant::now();
        let next = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<Result<IntegrationOutcome, IntegrationError>>>> =
            Mutex::new((0..inputs.len()).map(|_| None).collect());
        let workers = self.workers.min(inputs.len()).max(1);

        info!(identifiers = inputs.len(), workers, "batch started");

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(raw) = inputs.get(index) else {
                        break;
                    };
                    let outcome = self.process_isolated(raw, stats, view);
                    let mut slots = slots.lock().unwrap_or_else(|e| e.into_inner());
                    slots[index] = Some(outcome);
                });
            }
        });

        let slots = slots.into_inner().unwrap_or_else(|e| e.into_inner());
        let entries = inputs
            .iter()
            .zip(slots)
            .map(|(input, slot)| BatchEntry {
                input: input.clone(),
                outcome: slot.unwrap_or_else(|| {
                    Err(IntegrationError::Internal("identifier was never processed".to_string()))
                }),
            })
            .collect();

        let report = BatchReport {
            entries,
            elapsed: started.elapsed(),
        };
        info!("{}", report.summary());
        report
    }

    fn process_isolated(
        &self,
        raw: &str,
        stats: &SessionStatistics,
        view: View,
    ) -> Result<IntegrationOutcome, IntegrationError> {
        let started = Instant::now();
        match panic::catch_unwind(AssertUnwindSafe(|| self.process(raw, stats, view))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                let err = IntegrationError::Internal(format!("pipeline panicked: {}", message));
                error!(input = raw, error = %err, "worker recovered from panic");
                stats.record_failure(&err, started.elapsed());
                Err(err)
            }
        }
    }
}
