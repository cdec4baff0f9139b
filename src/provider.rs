// 🏢 Data Providers - live lookup with deterministic fallback
//
// A provider never fails because an upstream is down. Any failure, timeout
// or unacceptable payload gives way to the synthetic generator and the
// result is tagged accordingly.

use crate::error::{IntegrationError, UpstreamUnavailable};
use crate::generator::SyntheticGenerator;
use crate::identifier::TaxIdentifier;
use crate::retry::{with_deadline, RetryPolicy};
use crate::source::{EnterpriseRecord, InsuranceRecordSet, Sourced, MAX_AMOUNT_VND};
use crate::upstream::{EnterpriseSource, InsuranceSource};
use std::sync::Arc;
use tracing::{info, warn};

// ============================================================================
// ENTERPRISE PROVIDER
// ============================================================================

pub struct EnterpriseProvider {
    source: Arc<dyn EnterpriseSource>,
    policy: RetryPolicy,
    generator: SyntheticGenerator,
}

impl EnterpriseProvider {
    pub fn new(source: Arc<dyn EnterpriseSource>, policy: RetryPolicy) -> Self {
        EnterpriseProvider {
            source,
            policy,
            generator: SyntheticGenerator::new(),
        }
    }

    pub fn with_generator(mut self, generator: SyntheticGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn fetch(&self, id: &TaxIdentifier) -> Sourced<EnterpriseRecord> {
        let live = self.policy.run("enterprise", |_, timeout| {
            let source = Arc::clone(&self.source);
            let owned = id.clone();
            let record = with_deadline(timeout, move || source.fetch(&owned, timeout))?;
            let missing = record.missing_required();
            if missing.is_empty() {
                Ok(record)
            } else {
                Err(UpstreamUnavailable::Incomplete(missing.join(", ")))
            }
        });

        match live {
            Ok(record) => {
                info!(mst = %id, source = "enterprise", provenance = "live", "registry record accepted");
                Sourced::Live(record)
            }
            Err(err) => {
                log_fallback(id, "enterprise", &err);
                Sourced::Synthetic(self.generator.enterprise(id))
            }
        }
    }
}

// ============================================================================
// INSURANCE PROVIDER
// ============================================================================

pub struct InsuranceProvider {
    source: Arc<dyn InsuranceSource>,
    policy: RetryPolicy,
    generator: SyntheticGenerator,
}

impl InsuranceProvider {
    pub fn new(source: Arc<dyn InsuranceSource>, policy: RetryPolicy) -> Self {
        InsuranceProvider {
            source,
            policy,
            generator: SyntheticGenerator::new(),
        }
    }

    pub fn with_generator(mut self, generator: SyntheticGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Only fails when a generated set breaks referential integrity
    pub fn fetch(
        &self,
        id: &TaxIdentifier,
    ) -> Result<Sourced<InsuranceRecordSet>, IntegrationError> {
        let live = self.policy.run("insurance", |_, timeout| {
            let source = Arc::clone(&self.source);
            let owned = id.clone();
            let set = with_deadline(timeout, move || source.fetch(&owned, timeout))?;
            accept_live_set(&set)?;
            Ok(set)
        });

        match live {
            Ok(set) => {
                info!(
                    mst = %id,
                    source = "insurance",
                    provenance = "live",
                    employees = set.employees.len(),
                    "insurance record set accepted"
                );
                Ok(Sourced::Live(set))
            }
            Err(err) => {
                log_fallback(id, "insurance", &err);
                let set = self.generator.insurance(id);
                set.verify_integrity()?;
                Ok(Sourced::Synthetic(set))
            }
        }
    }
}

/// Live sets need at least one employee, ids on every employee, amounts
/// within MAX_AMOUNT_VND, and resolvable employee references
fn accept_live_set(set: &InsuranceRecordSet) -> Result<(), UpstreamUnavailable> {
    if set.employees.is_empty() {
        return Err(UpstreamUnavailable::Incomplete("no employees".to_string()));
    }
    if set.employees.iter().any(|e| e.employee_id.trim().is_empty()) {
        return Err(UpstreamUnavailable::Incomplete(
            "employee without id".to_string(),
        ));
    }
    if let Some((record, amount)) = set.out_of_range_amount() {
        return Err(UpstreamUnavailable::Incomplete(format!(
            "{} carries amount {} beyond {} VND",
            record, amount, MAX_AMOUNT_VND
        )));
    }
    set.verify_integrity()
        .map_err(|e| UpstreamUnavailable::Incomplete(e.to_string()))
}

fn log_fallback(id: &TaxIdentifier, source: &str, err: &UpstreamUnavailable) {
    match err {
        UpstreamUnavailable::Disabled => {
            info!(mst = %id, source, provenance = "synthetic", "live access disabled, using synthetic data")
        }
        _ => {
            warn!(mst = %id, source, provenance = "synthetic", error = %err, "live lookup failed, using synthetic data")
        }
    }
}
