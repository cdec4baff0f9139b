// 📦 Result Assembler - one immutable result, three read-only views
//
// The assembler scores, analyzes and packages a reconciled profile into an
// IntegrationResult. Views are projections of that same value; none of them
// recomputes anything.

use crate::compliance::{ComplianceAnalyzer, ComplianceAssessment, RiskAssessment, RiskTier};
use crate::data_quality::{data_quality_score, DatasetQualityReport, QualityScorer};
use crate::error::PersistenceWarning;
use crate::identifier::TaxIdentifier;
use crate::persistence::ResultSink;
use crate::reconciliation::ReconciledProfile;
use crate::source::{EnterpriseRecord, InsuranceRecordSet, Sourced};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

// ============================================================================
// VIEWS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Full,
    #[default]
    Summary,
    Detailed,
}

impl View {
    pub fn as_str(&self) -> &'static str {
        match self {
            View::Full => "full",
            View::Summary => "summary",
            View::Detailed => "detailed",
        }
    }
}

impl FromStr for View {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(View::Full),
            "summary" => Ok(View::Summary),
            "detailed" => Ok(View::Detailed),
            other => Err(format!(
                "unknown view {:?} (expected full, summary or detailed)",
                other
            )),
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SUMMARIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryBands {
    pub below_10m: usize,
    pub from_10m_to_20m: usize,
    pub from_20m: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkforceSummary {
    pub total_employees: usize,
    pub active_employees: usize,
    pub inactive_employees: usize,
    /// Inactive share of all employees, in [0, 1]
    pub turnover_rate: f64,
    pub average_salary: f64,
    pub min_salary: i64,
    pub max_salary: i64,
    pub median_salary: f64,
    pub salary_bands: SalaryBands,
}

impl WorkforceSummary {
    pub fn from_records(set: &InsuranceRecordSet) -> Self {
        let total = set.employees.len();
        let active = set.active_employees();

        let mut salaries: Vec<i64> = set.employees.iter().map(|e| e.salary).collect();
        salaries.sort_unstable();

        let average_salary = if total > 0 {
            salaries.iter().map(|s| *s as f64).sum::<f64>() / total as f64
        } else {
            0.0
        };

        let median_salary = match total {
            0 => 0.0,
            n if n % 2 == 1 => salaries[n / 2] as f64,
            n => (salaries[n / 2 - 1] as f64 + salaries[n / 2] as f64) / 2.0,
        };

        WorkforceSummary {
            total_employees: total,
            active_employees: active,
            inactive_employees: total - active,
            turnover_rate: if total > 0 {
                (total - active) as f64 / total as f64
            } else {
                0.0
            },
            average_salary,
            min_salary: salaries.first().copied().unwrap_or(0),
            max_salary: salaries.last().copied().unwrap_or(0),
            median_salary,
            salary_bands: SalaryBands {
                below_10m: salaries.iter().filter(|s| **s < 10_000_000).count(),
                from_10m_to_20m: salaries
                    .iter()
                    .filter(|s| (10_000_000..20_000_000).contains(*s))
                    .count(),
                from_20m: salaries.iter().filter(|s| **s >= 20_000_000).count(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionSummary {
    pub contribution_count: usize,
    pub total_amount: i64,
    pub average_amount: f64,
    pub contributing_employees: usize,
    pub claim_count: usize,
    pub total_claim_amount: i64,
    pub approved_claims: usize,
}

impl ContributionSummary {
    pub fn from_records(set: &InsuranceRecordSet) -> Self {
        let count = set.contributions.len();
        let total = set.total_contribution_amount();
        let contributors: HashSet<&str> = set
            .contributions
            .iter()
            .map(|c| c.employee_id.as_str())
            .collect();

        ContributionSummary {
            contribution_count: count,
            total_amount: total,
            average_amount: if count > 0 {
                total as f64 / count as f64
            } else {
                0.0
            },
            contributing_employees: contributors.len(),
            claim_count: set.claims.len(),
            total_claim_amount: set.total_claim_amount(),
            approved_claims: set
                .claims
                .iter()
                .filter(|c| c.status == crate::source::ClaimStatus::Approved)
                .count(),
        }
    }
}

// ============================================================================
// INTEGRATION RESULT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct IntegrationResult {
    pub run_id: String,
    pub mst: TaxIdentifier,
    pub enterprise: Sourced<EnterpriseRecord>,
    pub insurance: Sourced<InsuranceRecordSet>,
    pub profile: ReconciledProfile,
    pub enterprise_quality: DatasetQualityReport,
    pub insurance_quality: DatasetQualityReport,
    pub compliance: ComplianceAssessment,
    pub risk: RiskAssessment,
    pub workforce: WorkforceSummary,
    pub contributions: ContributionSummary,
    pub recommendations: Vec<String>,
    /// In [0, 100]
    pub integration_confidence: f64,
    /// In [0, 100]
    pub data_quality_score: f64,
    /// Share of the two sources served live, in [0, 100]
    pub live_data_percentage: f64,
    pub generated_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl IntegrationResult {
    pub fn company_name(&self) -> &str {
        self.profile
            .text("company_name")
            .unwrap_or(self.enterprise.record().name.as_str())
    }

    pub fn summary(&self) -> String {
        format!(
            "{} {}: confidence {:.1}, compliance {:.1}, risk {:.1} ({}), {:.0}% live",
            self.mst,
            self.company_name(),
            self.integration_confidence,
            self.compliance.score,
            self.risk.score,
            self.risk.tier.as_str(),
            self.live_data_percentage
        )
    }

    /// JSON projection of this result
    pub fn view(&self, view: View) -> Value {
        match view {
            View::Full => self.full_view(),
            View::Summary => self.summary_view(),
            View::Detailed => self.detailed_view(),
        }
    }

    fn full_view(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        if let Value::Object(map) = &mut value {
            map.insert("success".to_string(), json!(true));
            map.insert("view".to_string(), json!(View::Full.as_str()));
        }
        value
    }

    fn summary_view(&self) -> Value {
        json!({
            "success": true,
            "view": View::Summary.as_str(),
            "run_id": self.run_id,
            "mst": self.mst,
            "company_name": self.company_name(),
            "provenance": {
                "enterprise": self.enterprise.provenance(),
                "insurance": self.insurance.provenance(),
            },
            "employee_count": self.workforce.total_employees,
            "active_employee_count": self.workforce.active_employees,
            "integration_confidence": self.integration_confidence,
            "data_quality_score": self.data_quality_score,
            "compliance_score": self.compliance.score,
            "risk_score": self.risk.score,
            "risk_tier": self.risk.tier,
            "live_data_percentage": self.live_data_percentage,
            "generated_at": self.generated_at,
        })
    }

    fn detailed_view(&self) -> Value {
        let mut value = self.summary_view();
        if let Value::Object(map) = &mut value {
            map.insert("view".to_string(), json!(View::Detailed.as_str()));
            map.insert("profile".to_string(), json!(self.profile));
            map.insert(
                "quality".to_string(),
                json!({
                    "enterprise": self.enterprise_quality,
                    "insurance": self.insurance_quality,
                }),
            );
            map.insert("compliance".to_string(), json!(self.compliance));
            map.insert("risk".to_string(), json!(self.risk));
            map.insert("workforce".to_string(), json!(self.workforce));
            map.insert("contributions".to_string(), json!(self.contributions));
            map.insert("recommendations".to_string(), json!(self.recommendations));
            map.insert("elapsed_ms".to_string(), json!(self.elapsed_ms));
        }
        value
    }
}

// ============================================================================
// ASSEMBLER
// ============================================================================

pub struct ResultAssembler {
    scorer: QualityScorer,
    analyzer: ComplianceAnalyzer,
    sinks: Vec<Arc<dyn ResultSink>>,
}

impl ResultAssembler {
    pub fn new() -> Self {
        ResultAssembler {
            scorer: QualityScorer::new(),
            analyzer: ComplianceAnalyzer::new(),
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn assemble(
        &self,
        mst: TaxIdentifier,
        enterprise: Sourced<EnterpriseRecord>,
        insurance: Sourced<InsuranceRecordSet>,
        profile: ReconciledProfile,
        elapsed: Duration,
    ) -> IntegrationResult {
        let enterprise_quality = self.scorer.score_enterprise(&enterprise);
        let insurance_quality = self.scorer.score_insurance(&insurance);
        let integration_confidence =
            self.scorer
                .integration_confidence(&enterprise_quality, &insurance_quality, &profile);

        let as_of = insurance.record().snapshot_date;
        let (compliance, risk) = self.analyzer.analyze(&profile, insurance.record(), as_of);

        let workforce = WorkforceSummary::from_records(insurance.record());
        let contributions = ContributionSummary::from_records(insurance.record());

        let live_sources = [enterprise.is_live(), insurance.is_live()]
            .iter()
            .filter(|live| **live)
            .count();

        let mut result = IntegrationResult {
            run_id: Uuid::new_v4().to_string(),
            mst,
            data_quality_score: data_quality_score(enterprise_quality.score, insurance_quality.score),
            enterprise,
            insurance,
            profile,
            enterprise_quality,
            insurance_quality,
            compliance,
            risk,
            workforce,
            contributions,
            recommendations: Vec::new(),
            integration_confidence,
            live_data_percentage: live_sources as f64 / 2.0 * 100.0,
            generated_at: Utc::now(),
            elapsed_ms: elapsed.as_millis() as u64,
        };
        result.recommendations = recommendations(&result);
        result
    }

    /// Hand the result to every sink. Failures come back as warnings.
    pub fn publish(&self, result: &IntegrationResult, view: View) -> Vec<PersistenceWarning> {
        let mut warnings = Vec::new();

        for sink in &self.sinks {
            if let Err(e) = sink.persist(result, view) {
                let warning = PersistenceWarning {
                    sink: sink.name().to_string(),
                    message: format!("{:#}", e),
                };
                warn!(mst = %result.mst, sink = sink.name(), error = %warning.message, "persistence failed");
                warnings.push(warning);
            }
        }

        warnings
    }
}

impl Default for ResultAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Follow-up actions drawn from quality, compliance, risk and provenance
pub fn recommendations(result: &IntegrationResult) -> Vec<String> {
    let mut out = Vec::new();

    if !result.enterprise.is_live() {
        out.push("Connect the business registry API to replace synthetic company data".to_string());
    }
    if !result.insurance.is_live() {
        out.push("Connect the social insurance system to replace synthetic employee data".to_string());
    }
    if result.enterprise_quality.needs_review || result.insurance_quality.needs_review {
        out.push("Improve source data quality before relying on this profile".to_string());
    }
    if result.compliance.score < 80.0 {
        out.push(format!(
            "Raise overall compliance, currently {:.1}/100",
            result.compliance.score
        ));
    }
    if result.compliance.sub_scores.contribution < 1.0 {
        out.push("Bring social insurance contributions up to date for all employees".to_string());
    }
    if result.workforce.turnover_rate > 0.2 {
        out.push("Reduce employee turnover, currently above 20%".to_string());
    }
    if result.workforce.total_employees > 0 && result.workforce.average_salary < 15_000_000.0 {
        out.push("Review salary levels, the average is below 15,000,000 VND".to_string());
    }
    if result.risk.tier == RiskTier::High {
        out.push("Prioritise mitigation of high risk".to_string());
    }
    out.extend(result.risk.mitigations.iter().cloned());

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::SyntheticGenerator;
    use crate::reconciliation::FieldReconciler;
    use crate::source::{Employee, EmploymentStatus};

    fn assemble(raw: &str) -> IntegrationResult {
        let id = TaxIdentifier::parse(raw).unwrap();
        let generator = SyntheticGenerator::new();
        let enterprise = Sourced::Synthetic(generator.enterprise(&id));
        let insurance = Sourced::Synthetic(generator.insurance(&id));
        let profile = FieldReconciler::new().unwrap().reconcile(&enterprise, &insurance);
        ResultAssembler::new().assemble(id, enterprise, insurance, profile, Duration::from_millis(12))
    }

    #[test]
    fn test_view_parsing() {
        assert_eq!("FULL".parse::<View>(), Ok(View::Full));
        assert_eq!(" detailed ".parse::<View>(), Ok(View::Detailed));
        assert!("everything".parse::<View>().is_err());
        assert_eq!(View::default(), View::Summary);
    }

    #[test]
    fn test_synthetic_result_scores() {
        let result = assemble("0101234567");

        assert_eq!(result.live_data_percentage, 0.0);
        assert!((90.0..=100.0).contains(&result.integration_confidence));
        assert!((result.data_quality_score - 95.0).abs() < 1e-9);
        assert_eq!(result.elapsed_ms, 12);
        assert!(!result.recommendations.is_empty());

        println!("✅ Test passed: {}", result.summary());
    }

    #[test]
    fn test_views_are_projections_of_one_result() {
        let result = assemble("0312345678");

        let full = result.view(View::Full);
        let summary = result.view(View::Summary);
        let detailed = result.view(View::Detailed);

        for view in [&full, &summary, &detailed] {
            assert_eq!(view["success"], json!(true));
            assert_eq!(view["mst"], json!("0312345678"));
            assert_eq!(view["run_id"], json!(result.run_id));
        }

        assert_eq!(summary["provenance"]["enterprise"], json!("synthetic"));
        assert!(summary.get("profile").is_none());
        assert_eq!(detailed["profile"], full["profile"]);
        assert_eq!(full["insurance"]["provenance"], json!("synthetic"));
        assert_eq!(
            detailed["workforce"]["total_employees"],
            summary["employee_count"]
        );

        // headline scores are the same numbers in every view
        for view in [&summary, &detailed] {
            assert_eq!(view["integration_confidence"], full["integration_confidence"]);
            assert_eq!(view["data_quality_score"], full["data_quality_score"]);
            assert_eq!(view["compliance_score"], full["compliance"]["score"]);
            assert_eq!(view["risk_score"], full["risk"]["score"]);
            assert_eq!(view["live_data_percentage"], full["live_data_percentage"]);
        }
        assert_eq!(detailed["compliance"]["score"], detailed["compliance_score"]);
    }

    #[test]
    fn test_workforce_summary() {
        let employee = |id: &str, salary: i64, status: EmploymentStatus| Employee {
            employee_id: id.to_string(),
            salary,
            status,
            ..Default::default()
        };
        let set = InsuranceRecordSet {
            snapshot_date: crate::generator::default_anchor(),
            employees: vec![
                employee("A", 8_000_000, EmploymentStatus::Active),
                employee("B", 12_000_000, EmploymentStatus::Active),
                employee("C", 20_000_000, EmploymentStatus::Inactive),
                employee("D", 40_000_000, EmploymentStatus::Active),
            ],
            contributions: vec![],
            claims: vec![],
            hospitals: vec![],
        };

        let summary = WorkforceSummary::from_records(&set);
        assert_eq!(summary.active_employees, 3);
        assert_eq!(summary.turnover_rate, 0.25);
        assert_eq!(summary.median_salary, 16_000_000.0);
        assert_eq!(summary.min_salary, 8_000_000);
        assert_eq!(summary.max_salary, 40_000_000);
        assert_eq!(
            summary.salary_bands,
            SalaryBands { below_10m: 1, from_10m_to_20m: 1, from_20m: 2 }
        );
    }

    #[test]
    fn test_summaries_survive_huge_amounts() {
        let employee = |id: &str| Employee {
            employee_id: id.to_string(),
            salary: i64::MAX / 2,
            status: EmploymentStatus::Active,
            ..Default::default()
        };
        let contribution = |id: &str, employee_id: &str| crate::source::Contribution {
            contribution_id: id.to_string(),
            employee_id: employee_id.to_string(),
            amount: i64::MAX / 2,
            date: "2024-12-01".to_string(),
            contribution_type: "social_insurance".to_string(),
        };
        let set = InsuranceRecordSet {
            snapshot_date: crate::generator::default_anchor(),
            employees: vec![employee("A"), employee("B"), employee("C")],
            contributions: vec![contribution("C1", "A"), contribution("C2", "B"), contribution("C3", "C")],
            claims: vec![],
            hospitals: vec![],
        };

        let workforce = WorkforceSummary::from_records(&set);
        assert!(workforce.average_salary > 0.0);
        assert!(workforce.median_salary > 0.0);

        let contributions = ContributionSummary::from_records(&set);
        assert_eq!(contributions.total_amount, i64::MAX);
        assert!(contributions.average_amount > 0.0);
    }
}
