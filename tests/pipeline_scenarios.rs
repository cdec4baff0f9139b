// End-to-end scenarios over the integration engine with stubbed upstreams

use anyhow::bail;
use chrono::NaiveDate;
use mst_integration::{
    exit_codes, Contribution, Employee, EmploymentStatus, EnterpriseRecord, EnterpriseSource,
    FileSink, InsuranceRecordSet, InsuranceSource, IntegrationEngine, IntegrationError,
    IntegrationResult, OfflineSource, Provenance, ResultSink, RetryPolicy, SessionStatistics,
    SqliteSink, TaxIdentifier, UpstreamUnavailable, View,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Stub upstreams
// ============================================================================

struct RegistryStub;

impl EnterpriseSource for RegistryStub {
    fn fetch(&self, id: &TaxIdentifier, _: Duration) -> Result<EnterpriseRecord, UpstreamUnavailable> {
        Ok(EnterpriseRecord {
            tax_code: id.to_string(),
            name: "Công ty TNHH Thương mại Hà Nội".to_string(),
            address: "12  Tràng Tiền,   Hoàn Kiếm, Hà Nội".to_string(),
            sector: "Bán buôn".to_string(),
            company_type: "TNHH".to_string(),
            phone: "0243 8251234".to_string(),
            registration_date: "2020-03-15".to_string(),
            expiry_date: "2030-03-15".to_string(),
            revenue: Some(12_500_000_000.0),
            province: "Hà Nội".to_string(),
            ..Default::default()
        })
    }
}

struct InsuranceStub;

impl InsuranceSource for InsuranceStub {
    fn fetch(&self, id: &TaxIdentifier, _: Duration) -> Result<InsuranceRecordSet, UpstreamUnavailable> {
        let employees: Vec<Employee> = (1..=4)
            .map(|n| Employee {
                employee_id: format!("E{}_{}", n, id),
                full_name: format!("Nhân viên {}", n),
                position: "Nhân viên".to_string(),
                salary: 12_000_000 + n * 1_000_000,
                start_date: "2023-01-01".to_string(),
                status: EmploymentStatus::Active,
            })
            .collect();
        let contributions = employees
            .iter()
            .map(|e| Contribution {
                contribution_id: format!("C_{}", e.employee_id),
                employee_id: e.employee_id.clone(),
                amount: e.salary * 85 / 1000,
                date: "2024-12-15".to_string(),
                contribution_type: "BHXH".to_string(),
            })
            .collect();

        Ok(InsuranceRecordSet {
            snapshot_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            employees,
            contributions,
            claims: Vec::new(),
            hospitals: Vec::new(),
        })
    }
}

/// Times out a fixed number of times, then answers
struct SlowRegistry {
    failures: u32,
    calls: AtomicU32,
}

impl EnterpriseSource for SlowRegistry {
    fn fetch(&self, id: &TaxIdentifier, timeout: Duration) -> Result<EnterpriseRecord, UpstreamUnavailable> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(UpstreamUnavailable::Timeout(timeout));
        }
        RegistryStub.fetch(id, timeout)
    }
}

/// Live set whose contribution points at nobody
struct OrphanInsurance;

impl InsuranceSource for OrphanInsurance {
    fn fetch(&self, id: &TaxIdentifier, timeout: Duration) -> Result<InsuranceRecordSet, UpstreamUnavailable> {
        let mut set = InsuranceStub.fetch(id, timeout)?;
        set.contributions[0].employee_id = "GHOST".to_string();
        Ok(set)
    }
}

/// Live set with salaries large enough to overflow an i64 total
struct InflatedInsurance;

impl InsuranceSource for InflatedInsurance {
    fn fetch(&self, id: &TaxIdentifier, timeout: Duration) -> Result<InsuranceRecordSet, UpstreamUnavailable> {
        let mut set = InsuranceStub.fetch(id, timeout)?;
        set.employees.truncate(3);
        set.contributions.truncate(3);
        for employee in &mut set.employees {
            employee.salary = i64::MAX / 2;
        }
        Ok(set)
    }
}

/// Never answers within any sensible deadline
struct HangingRegistry;

impl EnterpriseSource for HangingRegistry {
    fn fetch(&self, id: &TaxIdentifier, timeout: Duration) -> Result<EnterpriseRecord, UpstreamUnavailable> {
        std::thread::sleep(Duration::from_secs(5));
        RegistryStub.fetch(id, timeout)
    }
}

struct BrokenSink;

impl ResultSink for BrokenSink {
    fn name(&self) -> &str {
        "broken"
    }

    fn persist(&self, _: &IntegrationResult, _: View) -> anyhow::Result<()> {
        bail!("disk full")
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::ZERO, Duration::from_secs(2))
}

fn inputs(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn offline_identifier_is_fully_synthetic_with_high_confidence() {
    let engine = IntegrationEngine::offline().unwrap();
    let stats = SessionStatistics::new();

    let outcome = engine.process("0101234567", &stats, View::Summary).unwrap();
    let result = &outcome.result;

    assert_eq!(result.enterprise.provenance(), Provenance::Synthetic);
    assert_eq!(result.insurance.provenance(), Provenance::Synthetic);
    assert_eq!(result.live_data_percentage, 0.0);
    assert!(
        (90.0..=100.0).contains(&result.integration_confidence),
        "confidence {} outside 90-100",
        result.integration_confidence
    );

    let summary = outcome.to_json(View::Summary);
    assert_eq!(summary["mst"], "0101234567");
    assert_eq!(summary["cache_hit"], false);

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.successes, 1);
    assert_eq!(snapshot.enterprise.synthetic, 1);
    assert_eq!(snapshot.insurance.synthetic, 1);

    println!("✅ Test passed: {}", result.summary());
}

#[test]
fn batch_with_one_malformed_identifier() {
    let engine = IntegrationEngine::offline().unwrap();
    let stats = SessionStatistics::new();

    let report = engine.process_batch(&inputs(&["0101234567", "12", "0312345678"]), &stats, View::Summary);

    assert!(report.entries[0].outcome.is_ok());
    assert!(matches!(
        report.entries[1].outcome,
        Err(IntegrationError::InvalidFormat { .. })
    ));
    assert!(report.entries[2].outcome.is_ok());
    assert!((report.success_ratio() - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(report.exit_code(), exit_codes::EXIT_INVALID_INPUT);

    // The failure does not leak into its neighbours
    let alone = engine.process("0312345678", &SessionStatistics::new(), View::Summary).unwrap();
    let batched = report.entries[2].outcome.as_ref().unwrap();
    assert_eq!(alone.result.enterprise, batched.result.enterprise);
    assert_eq!(alone.result.insurance, batched.result.insurance);

    assert_eq!(stats.snapshot().invalid_inputs, 1);
    println!("✅ Test passed: {}", report.summary());
}

#[test]
fn live_sources_are_used_when_available() {
    let engine =
        IntegrationEngine::with_sources(Arc::new(RegistryStub), Arc::new(InsuranceStub), fast_policy())
            .unwrap();
    let stats = SessionStatistics::new();

    let outcome = engine.process("0101234567", &stats, View::Detailed).unwrap();
    let result = &outcome.result;

    assert!(result.enterprise.is_live());
    assert!(result.insurance.is_live());
    assert_eq!(result.live_data_percentage, 100.0);
    assert_eq!(result.company_name(), "Công ty TNHH Thương mại Hà Nội");
    assert_eq!(result.workforce.total_employees, 4);
    assert_eq!(result.compliance.sub_scores.contribution, 1.0);

    let detailed = outcome.to_json(View::Detailed);
    assert!(detailed.get("profile").is_some());
    assert_eq!(stats.snapshot().enterprise.live, 1);
}

#[test]
fn timeouts_are_retried_before_falling_back() {
    let registry = Arc::new(SlowRegistry {
        failures: 2,
        calls: AtomicU32::new(0),
    });
    let engine = IntegrationEngine::with_sources(registry.clone(), Arc::new(OfflineSource), fast_policy())
        .unwrap();

    let outcome = engine.process("0101234567", &SessionStatistics::new(), View::Summary).unwrap();
    assert!(outcome.result.enterprise.is_live());
    assert!(!outcome.result.insurance.is_live());
    assert_eq!(registry.calls.load(Ordering::SeqCst), 3);

    let exhausted = Arc::new(SlowRegistry {
        failures: 10,
        calls: AtomicU32::new(0),
    });
    let engine = IntegrationEngine::with_sources(exhausted.clone(), Arc::new(OfflineSource), fast_policy())
        .unwrap();
    let outcome = engine.process("0101234567", &SessionStatistics::new(), View::Summary).unwrap();
    assert!(!outcome.result.enterprise.is_live());
    assert_eq!(exhausted.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn live_set_with_orphan_reference_falls_back() {
    let engine =
        IntegrationEngine::with_sources(Arc::new(RegistryStub), Arc::new(OrphanInsurance), fast_policy())
            .unwrap();

    let outcome = engine.process("0101234567", &SessionStatistics::new(), View::Summary).unwrap();
    assert_eq!(outcome.result.insurance.provenance(), Provenance::Synthetic);
    outcome.result.insurance.record().verify_integrity().unwrap();
}

#[test]
fn oversized_live_amounts_fall_back_instead_of_overflowing() {
    let engine =
        IntegrationEngine::with_sources(Arc::new(RegistryStub), Arc::new(InflatedInsurance), fast_policy())
            .unwrap();

    let outcome = engine.process("0101234567", &SessionStatistics::new(), View::Full).unwrap();
    let result = &outcome.result;

    assert!(result.enterprise.is_live());
    assert_eq!(result.insurance.provenance(), Provenance::Synthetic);
    assert!(result.workforce.average_salary > 0.0);
    assert!(result.contributions.total_amount >= 0);
}

#[test]
fn hanging_registry_is_abandoned_at_the_deadline() {
    let policy = RetryPolicy::new(3, Duration::ZERO, Duration::from_millis(300));
    let engine =
        IntegrationEngine::with_sources(Arc::new(HangingRegistry), Arc::new(InsuranceStub), policy).unwrap();

    let started = std::time::Instant::now();
    let outcome = engine.process("0101234567", &SessionStatistics::new(), View::Summary).unwrap();

    assert_eq!(outcome.result.enterprise.provenance(), Provenance::Synthetic);
    assert!(outcome.result.insurance.is_live());
    assert!(started.elapsed() < Duration::from_secs(3), "waited {:?}", started.elapsed());
}

#[test]
fn cached_result_is_served_unchanged() {
    let engine = IntegrationEngine::offline().unwrap().with_cache(Duration::from_secs(300));
    let stats = SessionStatistics::new();

    let first = engine.process("0101234567", &stats, View::Summary).unwrap();
    let second = engine.process("010-123-4567", &stats, View::Summary).unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert!(Arc::ptr_eq(&first.result, &second.result));
    assert_eq!(stats.snapshot().cache_hits, 1);
}

#[test]
fn persistence_failure_becomes_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let engine = IntegrationEngine::offline()
        .unwrap()
        .with_sink(Arc::new(FileSink::new(dir.path())))
        .with_sink(Arc::new(BrokenSink));

    let outcome = engine.process("0312345678", &SessionStatistics::new(), View::Full).unwrap();

    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].sink, "broken");
    assert!(outcome.warnings[0].message.contains("disk full"));

    let stem = FileSink::stem(&outcome.result);
    assert!(dir.path().join(format!("{}.json", stem)).exists());
    assert!(dir.path().join(format!("{}.md", stem)).exists());
    assert!(dir.path().join(format!("{}_employees.csv", stem)).exists());

    let json = outcome.to_json(View::Summary);
    assert_eq!(json["warnings"][0]["sink"], "broken");
}

#[test]
fn sqlite_sink_stores_each_run() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(SqliteSink::open(&dir.path().join("results.db")).unwrap());
    let engine = IntegrationEngine::offline().unwrap().with_sink(sink.clone());

    engine.process("0101234567", &SessionStatistics::new(), View::Summary).unwrap();
    engine.process("0101234567", &SessionStatistics::new(), View::Summary).unwrap();

    let stored = sink
        .with_connection(|conn| mst_integration::db::get_results_for_mst(conn, "0101234567"))
        .unwrap();
    assert_eq!(stored.len(), 2);
}
