// 📋 Compliance & Risk Analyzer
//
// A pure function of the reconciled profile, the insurance record set and
// an `as_of` date. Three sub-scores in [0, 1]:
//
//   registration: 1 when the six registry fields are present and the
//                 registration is not expired at as_of; otherwise
//                 present/6, halved when expired
//   contribution: share of employees with a contribution in the 365 days
//                 ending at as_of
//   employee:     share of employees with complete required fields
//
//   compliance = 100 × (0.3·registration + 0.4·contribution + 0.3·employee)
//   risk       = 100 − compliance + penalties (capped at 30), clamped
//
// Raising any sub-score never raises risk.

use crate::data_quality::clamp_score;
use crate::reconciliation::ReconciledProfile;
use crate::source::InsuranceRecordSet;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const REGISTRATION_WEIGHT: f64 = 0.3;
pub const CONTRIBUTION_WEIGHT: f64 = 0.4;
pub const EMPLOYEE_WEIGHT: f64 = 0.3;

pub const LOOKBACK_DAYS: i64 = 365;

/// Canonical fields a complete registration carries
pub const REGISTRATION_FIELDS: [&str; 6] = [
    "tax_code",
    "company_name",
    "registered_address",
    "business_sector",
    "registration_date",
    "expiry_date",
];

pub const LOW_RISK_BELOW: f64 = 30.0;
pub const HIGH_RISK_ABOVE: f64 = 70.0;

const MAX_PENALTY: f64 = 30.0;
const TURNOVER_THRESHOLD: f64 = 0.2;
const COVERAGE_THRESHOLD: f64 = 0.8;
const LOW_SALARY_VND: f64 = 10_000_000.0;

// ============================================================================
// ASSESSMENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub registration: f64,
    pub contribution: f64,
    pub employee: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceAssessment {
    pub score: f64,
    pub sub_scores: SubScores,
    pub issues: Vec<String>,
    pub as_of: NaiveDate,
    pub registration_expired: bool,
}

impl ComplianceAssessment {
    pub fn is_compliant(&self) -> bool {
        self.score >= 80.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// low < 30 ≤ medium ≤ 70 < high
    pub fn from_score(score: f64) -> Self {
        if score < LOW_RISK_BELOW {
            RiskTier::Low
        } else if score <= HIGH_RISK_ABOVE {
            RiskTier::Medium
        } else {
            RiskTier::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub description: String,
    pub penalty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub tier: RiskTier,
    pub factors: Vec<RiskFactor>,
    pub mitigations: Vec<String>,
}

// ============================================================================
// ANALYZER
// ============================================================================

pub struct ComplianceAnalyzer;

impl ComplianceAnalyzer {
    pub fn new() -> Self {
        ComplianceAnalyzer
    }

    pub fn analyze(
        &self,
        profile: &ReconciledProfile,
        insurance: &InsuranceRecordSet,
        as_of: NaiveDate,
    ) -> (ComplianceAssessment, RiskAssessment) {
        let compliance = self.assess_compliance(profile, insurance, as_of);
        let risk = self.assess_risk(&compliance, profile, insurance);
        (compliance, risk)
    }

    pub fn assess_compliance(
        &self,
        profile: &ReconciledProfile,
        insurance: &InsuranceRecordSet,
        as_of: NaiveDate,
    ) -> ComplianceAssessment {
        let mut issues = Vec::new();

        let missing: Vec<&str> = REGISTRATION_FIELDS
            .iter()
            .copied()
            .filter(|f| profile.get(f).map_or(true, |v| v.value.is_null()))
            .collect();
        let expired = registration_expired(profile, as_of);

        let present = (REGISTRATION_FIELDS.len() - missing.len()) as f64;
        let mut registration = if missing.is_empty() {
            1.0
        } else {
            present / REGISTRATION_FIELDS.len() as f64
        };
        if expired {
            registration /= 2.0;
            issues.push(format!("Business registration expired before {}", as_of));
        }
        if !missing.is_empty() {
            issues.push(format!("Registration fields missing: {}", missing.join(", ")));
        }

        let contribution = contribution_coverage(insurance, as_of);
        if contribution < 1.0 {
            issues.push(format!(
                "{:.0}% of employees have no contribution in the last {} days",
                (1.0 - contribution) * 100.0,
                LOOKBACK_DAYS
            ));
        }

        let employee = employee_completeness(insurance);
        if employee < 1.0 {
            issues.push(format!(
                "{:.0}% of employee records are incomplete",
                (1.0 - employee) * 100.0
            ));
        }

        let sub_scores = SubScores {
            registration,
            contribution,
            employee,
        };

        ComplianceAssessment {
            score: compliance_score(&sub_scores),
            sub_scores,
            issues,
            as_of,
            registration_expired: expired,
        }
    }

    pub fn assess_risk(
        &self,
        compliance: &ComplianceAssessment,
        profile: &ReconciledProfile,
        insurance: &InsuranceRecordSet,
    ) -> RiskAssessment {
        let mut factors = Vec::new();
        let mut mitigations = Vec::new();

        let mut add = |name: &str, description: String, penalty: f64, mitigation: &str| {
            factors.push(RiskFactor {
                name: name.to_string(),
                description,
                penalty,
            });
            mitigations.push(mitigation.to_string());
        };

        if let Some(turnover) = profile.number("turnover_rate") {
            if turnover > TURNOVER_THRESHOLD {
                add(
                    "high_turnover",
                    format!("Employee turnover at {:.0}%", turnover * 100.0),
                    10.0,
                    "Review retention and confirm departures were deregistered",
                );
            }
        }

        let coverage = compliance.sub_scores.contribution;
        if coverage < COVERAGE_THRESHOLD {
            add(
                "low_contribution_coverage",
                format!("Only {:.0}% of employees have recent contributions", coverage * 100.0),
                15.0,
                "Reconcile payroll against social insurance contributions",
            );
        }

        if let Some(salary) = profile.number("average_salary") {
            if salary < LOW_SALARY_VND {
                add(
                    "low_average_salary",
                    format!("Average salary {:.0} VND is below 10,000,000 VND", salary),
                    5.0,
                    "Verify declared salaries against regional minimum wage",
                );
            }
        }

        if insurance.contributions.is_empty() {
            add(
                "no_contributions",
                "No contribution records on file".to_string(),
                10.0,
                "Register employees for social insurance",
            );
        }

        if compliance.registration_expired {
            add(
                "registration_expired",
                "Business registration has expired".to_string(),
                10.0,
                "Renew the business registration",
            );
        }

        let penalty: f64 = factors.iter().map(|f| f.penalty).sum::<f64>().min(MAX_PENALTY);
        let score = risk_score(compliance.score, penalty);

        RiskAssessment {
            score,
            tier: RiskTier::from_score(score),
            factors,
            mitigations,
        }
    }
}

impl Default for ComplianceAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

pub fn compliance_score(sub: &SubScores) -> f64 {
    clamp_score(
        100.0
            * (REGISTRATION_WEIGHT * sub.registration.clamp(0.0, 1.0)
                + CONTRIBUTION_WEIGHT * sub.contribution.clamp(0.0, 1.0)
                + EMPLOYEE_WEIGHT * sub.employee.clamp(0.0, 1.0)),
    )
}

pub fn risk_score(compliance_score: f64, penalty: f64) -> f64 {
    clamp_score(100.0 - compliance_score + penalty.clamp(0.0, MAX_PENALTY))
}

fn parse_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()
}

fn registration_expired(profile: &ReconciledProfile, as_of: NaiveDate) -> bool {
    profile
        .text("expiry_date")
        .and_then(parse_date)
        .map_or(false, |expiry| expiry < as_of)
}

/// Share of employees with at least one contribution in (as_of − 365d, as_of]
pub fn contribution_coverage(insurance: &InsuranceRecordSet, as_of: NaiveDate) -> f64 {
    if insurance.employees.is_empty() {
        return 0.0;
    }

    let window_start = as_of - Duration::days(LOOKBACK_DAYS);
    let covered: HashSet<&str> = insurance
        .contributions
        .iter()
        .filter(|c| {
            parse_date(&c.date).map_or(false, |d| d > window_start && d <= as_of)
        })
        .map(|c| c.employee_id.as_str())
        .collect();

    let count = insurance
        .employees
        .iter()
        .filter(|e| covered.contains(e.employee_id.as_str()))
        .count();
    count as f64 / insurance.employees.len() as f64
}

/// Share of employees with id, name, position, positive salary and a
/// parseable start date
pub fn employee_completeness(insurance: &InsuranceRecordSet) -> f64 {
    if insurance.employees.is_empty() {
        return 0.0;
    }

    let complete = insurance
        .employees
        .iter()
        .filter(|e| {
            !e.employee_id.trim().is_empty()
                && !e.full_name.trim().is_empty()
                && !e.position.trim().is_empty()
                && e.salary > 0
                && parse_date(&e.start_date).is_some()
        })
        .count();
    complete as f64 / insurance.employees.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::SyntheticGenerator;
    use crate::identifier::TaxIdentifier;
    use crate::reconciliation::FieldReconciler;
    use crate::source::{Contribution, Employee, Sourced};

    fn fixture() -> (ReconciledProfile, InsuranceRecordSet) {
        let id = TaxIdentifier::parse("0101234567").unwrap();
        let generator = SyntheticGenerator::new();
        let enterprise = Sourced::Synthetic(generator.enterprise(&id));
        let insurance = Sourced::Synthetic(generator.insurance(&id));
        let profile = FieldReconciler::new().unwrap().reconcile(&enterprise, &insurance);
        (profile, insurance.record().clone())
    }

    fn employee(id: &str) -> Employee {
        Employee {
            employee_id: id.to_string(),
            full_name: "Lê Minh Sơn".to_string(),
            position: "Kỹ sư".to_string(),
            salary: 18_000_000,
            start_date: "2022-03-01".to_string(),
            ..Default::default()
        }
    }

    fn contribution(employee_id: &str, date: &str) -> Contribution {
        Contribution {
            contribution_id: format!("C-{}-{}", employee_id, date),
            employee_id: employee_id.to_string(),
            amount: 1_530_000,
            date: date.to_string(),
            contribution_type: "social_insurance".to_string(),
        }
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(RiskTier::from_score(0.0), RiskTier::Low);
        assert_eq!(RiskTier::from_score(29.99), RiskTier::Low);
        assert_eq!(RiskTier::from_score(30.0), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(70.0), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(70.01), RiskTier::High);
    }

    #[test]
    fn test_synthetic_profile_assessment() {
        let (profile, insurance) = fixture();
        let (compliance, risk) = ComplianceAnalyzer::new().analyze(&profile, &insurance, insurance.snapshot_date);

        assert_eq!(compliance.sub_scores.registration, 1.0);
        assert_eq!(compliance.sub_scores.employee, 1.0);
        assert!(!compliance.registration_expired);
        assert!((0.0..=100.0).contains(&compliance.score));
        assert!((0.0..=100.0).contains(&risk.score));
        assert_eq!(risk.tier, RiskTier::from_score(risk.score));
        assert_eq!(risk.factors.len(), risk.mitigations.len());
    }

    #[test]
    fn test_contribution_window() {
        let as_of = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let set = InsuranceRecordSet {
            snapshot_date: as_of,
            employees: vec![employee("A"), employee("B"), employee("C"), employee("D")],
            contributions: vec![
                contribution("A", "2024-12-01"),
                contribution("B", "2024-01-02"),
                // exactly 365 days back is outside the window
                contribution("C", "2024-01-02"),
                contribution("C", "2023-12-01"),
            ],
            claims: vec![],
            hospitals: vec![],
        };

        // 2024 is a leap year: 2024-01-02 is 365 days before 2025-01-01
        assert_eq!(contribution_coverage(&set, as_of), 0.25);
    }

    #[test]
    fn test_expired_registration_halves_and_penalizes() {
        let (mut profile, insurance) = fixture();
        if let Some(field) = profile.fields.get_mut("expiry_date") {
            field.value = serde_json::json!("2020-01-01");
        }

        let analyzer = ComplianceAnalyzer::new();
        let (compliance, risk) = analyzer.analyze(&profile, &insurance, insurance.snapshot_date);

        assert!(compliance.registration_expired);
        assert_eq!(compliance.sub_scores.registration, 0.5);
        assert!(risk.factors.iter().any(|f| f.name == "registration_expired"));
    }

    #[test]
    fn test_registration_expiring_on_assessment_date_is_still_valid() {
        let (mut profile, insurance) = fixture();
        let as_of = insurance.snapshot_date;
        let analyzer = ComplianceAnalyzer::new();

        let mut set_expiry = |date: NaiveDate| {
            if let Some(field) = profile.fields.get_mut("expiry_date") {
                field.value = serde_json::json!(date.format("%Y-%m-%d").to_string());
            }
            analyzer.assess_compliance(&profile, &insurance, as_of)
        };

        let on_the_day = set_expiry(as_of);
        assert!(!on_the_day.registration_expired);
        assert_eq!(on_the_day.sub_scores.registration, 1.0);

        let day_before = set_expiry(as_of - Duration::days(1));
        assert!(day_before.registration_expired);
        assert_eq!(day_before.sub_scores.registration, 0.5);
    }

    #[test]
    fn test_penalties_are_capped() {
        let (profile, mut insurance) = fixture();
        insurance.contributions.clear();
        for e in insurance.employees.iter_mut() {
            e.salary = 5_000_000;
        }

        let mut profile = profile;
        if let Some(field) = profile.fields.get_mut("average_salary") {
            field.value = serde_json::json!(5_000_000.0);
        }
        if let Some(field) = profile.fields.get_mut("expiry_date") {
            field.value = serde_json::json!("2020-01-01");
        }

        let analyzer = ComplianceAnalyzer::new();
        let (compliance, risk) = analyzer.analyze(&profile, &insurance, insurance.snapshot_date);

        let raw: f64 = risk.factors.iter().map(|f| f.penalty).sum();
        assert!(raw > MAX_PENALTY);
        assert_eq!(risk.score, risk_score(compliance.score, MAX_PENALTY));
        assert_eq!(risk.tier, RiskTier::High);
    }

    #[test]
    fn test_more_coverage_never_lowers_compliance() {
        let low = SubScores { registration: 1.0, contribution: 0.5, employee: 1.0 };
        let high = SubScores { contribution: 0.9, ..low.clone() };
        assert!(compliance_score(&high) >= compliance_score(&low));
        assert!(risk_score(compliance_score(&high), 0.0) <= risk_score(compliance_score(&low), 0.0));
    }
}
