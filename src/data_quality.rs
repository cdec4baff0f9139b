// ✅ Quality & Confidence Scorer - per-dataset quality and overall confidence
//
// Each dataset is scored as a weighted average of "present and well-formed"
// checks, multiplied by the dataset's source quality (100 live, 95
// synthetic). Integration confidence blends both dataset scores with
// reconciliation coverage:
//
//   confidence = 0.4·E + 0.4·I + 0.2·(coverage·100)
//
// Every score is clamped to [0, 100].

use crate::reconciliation::ReconciledProfile;
use crate::source::{EnterpriseRecord, InsuranceRecordSet, Provenance, Sourced};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const ENTERPRISE_WEIGHT: f64 = 0.4;
pub const INSURANCE_WEIGHT: f64 = 0.4;
pub const COVERAGE_WEIGHT: f64 = 0.2;

/// Insurance section weights: employees, contributions, claims, hospitals
pub const SECTION_WEIGHTS: [f64; 4] = [0.3, 0.3, 0.2, 0.2];

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub rule_name: String,
    pub field: String,
    pub message: String,
    /// Share of the check satisfied, in [0, 1]
    pub score: f64,
    pub weight: f64,
    pub severity: Severity,
}

impl ValidationResult {
    pub fn pass(rule_name: &str, field: &str, message: &str, weight: f64) -> Self {
        ValidationResult {
            passed: true,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            message: message.to_string(),
            score: 1.0,
            weight,
            severity: Severity::Info,
        }
    }

    pub fn fail(rule_name: &str, field: &str, message: &str, weight: f64, severity: Severity) -> Self {
        ValidationResult {
            passed: false,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            message: message.to_string(),
            score: 0.0,
            weight,
            severity,
        }
    }

    /// Section check: passes only when every record is well-formed
    fn ratio(rule_name: &str, field: &str, good: usize, total: usize, weight: f64) -> Self {
        if total == 0 {
            return ValidationResult::fail(
                rule_name,
                field,
                &format!("No {} records", field),
                weight,
                Severity::Warning,
            );
        }

        let score = good as f64 / total as f64;
        let message = format!("{}/{} {} records well-formed", good, total, field);
        if good == total {
            ValidationResult::pass(rule_name, field, &message, weight)
        } else {
            ValidationResult {
                score,
                ..ValidationResult::fail(rule_name, field, &message, weight, Severity::Warning)
            }
        }
    }
}

// ============================================================================
// QUALITY REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetQualityReport {
    pub dataset: String,
    pub provenance: Provenance,
    pub source_quality: f64,
    /// Weighted share of checks passed, in [0, 1]
    pub completeness: f64,
    /// completeness × source_quality, in [0, 100]
    pub score: f64,
    pub validations: Vec<ValidationResult>,
    pub issues: Vec<QualityIssue>,
    pub passed_count: usize,
    pub failed_count: usize,
    pub needs_review: bool,
}

impl DatasetQualityReport {
    pub fn summary(&self) -> String {
        format!(
            "{} quality: {:.1}/100 ({} source), Issues: {} ({} critical)",
            self.dataset,
            self.score,
            self.provenance.as_str(),
            self.issues.len(),
            self.issues
                .iter()
                .filter(|i| i.severity == Severity::Critical)
                .count()
        )
    }

    pub fn is_high_quality(&self) -> bool {
        self.score >= 80.0
    }

    pub fn has_critical_issues(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub field: String,
    pub issue: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Required information is missing or invalid
    Warning,  // Data is questionable or incomplete
    Info,     // Optional information is missing
}

// ============================================================================
// QUALITY SCORER
// ============================================================================

pub struct QualityScorer {
    /// Dataset scores below this need review
    review_threshold: f64,
}

impl QualityScorer {
    pub fn new() -> Self {
        QualityScorer {
            review_threshold: 70.0,
        }
    }

    pub fn score_enterprise(&self, sourced: &Sourced<EnterpriseRecord>) -> DatasetQualityReport {
        let record = sourced.record();
        let checks = vec![
            (check_tax_code(&record.tax_code), "Use the 10 or 13 digit MST"),
            (
                check_present("name", "company_name", &record.name, 2.0, Severity::Critical),
                "Registry record must carry the company name",
            ),
            (
                check_present("address", "registered_address", &record.address, 1.5, Severity::Critical),
                "Registry record must carry the registered address",
            ),
            (
                check_present("sector", "business_sector", &record.sector, 1.0, Severity::Warning),
                "Add the business sector",
            ),
            (
                check_present("company_type", "company_type", &record.company_type, 0.5, Severity::Info),
                "Add the company type",
            ),
            (check_phone(&record.phone), "Phone numbers have 9 to 11 digits"),
            (check_website(&record.website), "Website should be an http(s) URL"),
            (
                check_registration_dates(&record.registration_date, &record.expiry_date),
                "Registration dates must be YYYY-MM-DD with expiry after registration",
            ),
            (check_revenue(record.revenue), "Revenue should be a positive amount"),
            (check_bank_account(&record.bank_account), "Bank accounts have 8 to 19 digits"),
            (
                check_present("province", "province", &record.province, 0.5, Severity::Info),
                "Add the province",
            ),
        ];

        self.build_report("enterprise", sourced.provenance(), sourced.quality(), checks)
    }

    pub fn score_insurance(&self, sourced: &Sourced<InsuranceRecordSet>) -> DatasetQualityReport {
        let set = sourced.record();
        let [w_employees, w_contributions, w_claims, w_hospitals] = SECTION_WEIGHTS;

        let employees_ok = set
            .employees
            .iter()
            .filter(|e| {
                !e.employee_id.trim().is_empty()
                    && !e.full_name.trim().is_empty()
                    && e.salary > 0
                    && parse_date(&e.start_date).is_some()
            })
            .count();

        let contributions_ok = set
            .contributions
            .iter()
            .filter(|c| c.amount > 0 && parse_date(&c.date).is_some())
            .count();

        let claims_ok = set
            .claims
            .iter()
            .filter(|c| c.amount > 0 && parse_date(&c.date).is_some())
            .count();

        let hospitals_ok = set
            .hospitals
            .iter()
            .filter(|h| !h.name.trim().is_empty() && !h.address.trim().is_empty())
            .count();

        let checks = vec![
            (
                ValidationResult::ratio("employees_well_formed", "employees", employees_ok, set.employees.len(), w_employees),
                "Employees need id, name, positive salary and start date",
            ),
            (
                ValidationResult::ratio("contributions_well_formed", "contributions", contributions_ok, set.contributions.len(), w_contributions),
                "Contributions need a positive amount and a date",
            ),
            (
                ValidationResult::ratio("claims_well_formed", "claims", claims_ok, set.claims.len(), w_claims),
                "Claims need a positive amount and a date",
            ),
            (
                ValidationResult::ratio("hospitals_well_formed", "hospitals", hospitals_ok, set.hospitals.len(), w_hospitals),
                "Registered hospitals need a name and an address",
            ),
        ];

        self.build_report("insurance", sourced.provenance(), sourced.quality(), checks)
    }

    /// Blend of both dataset scores and reconciliation coverage, in [0, 100]
    pub fn integration_confidence(
        &self,
        enterprise: &DatasetQualityReport,
        insurance: &DatasetQualityReport,
        profile: &ReconciledProfile,
    ) -> f64 {
        integration_confidence(enterprise.score, insurance.score, profile.coverage())
    }

    fn build_report(
        &self,
        dataset: &str,
        provenance: Provenance,
        source_quality: f64,
        checks: Vec<(ValidationResult, &str)>,
    ) -> DatasetQualityReport {
        let mut validations = Vec::new();
        let mut issues = Vec::new();

        for (result, recommendation) in checks {
            if !result.passed {
                issues.push(QualityIssue {
                    severity: result.severity.clone(),
                    field: result.field.clone(),
                    issue: result.message.clone(),
                    recommendation: recommendation.to_string(),
                });
            }
            validations.push(result);
        }

        let total_weight: f64 = validations.iter().map(|v| v.weight).sum();
        let completeness = if total_weight > 0.0 {
            validations.iter().map(|v| v.weight * v.score).sum::<f64>() / total_weight
        } else {
            0.0
        };
        let score = clamp_score(completeness * source_quality);
        let passed_count = validations.iter().filter(|v| v.passed).count();

        DatasetQualityReport {
            dataset: dataset.to_string(),
            provenance,
            source_quality,
            completeness,
            score,
            failed_count: validations.len() - passed_count,
            passed_count,
            validations,
            issues,
            needs_review: score < self.review_threshold,
        }
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic in each input; result clamped to [0, 100]
pub fn integration_confidence(enterprise: f64, insurance: f64, coverage: f64) -> f64 {
    clamp_score(
        ENTERPRISE_WEIGHT * clamp_score(enterprise)
            + INSURANCE_WEIGHT * clamp_score(insurance)
            + COVERAGE_WEIGHT * coverage.clamp(0.0, 1.0) * 100.0,
    )
}

pub fn data_quality_score(enterprise: f64, insurance: f64) -> f64 {
    clamp_score((enterprise + insurance) / 2.0)
}

pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

// ============================================================================
// VALIDATION RULES
// ============================================================================

fn parse_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()
}

fn digit_count(text: &str) -> usize {
    text.chars().filter(|c| c.is_ascii_digit()).count()
}

fn check_present(rule: &str, field: &str, value: &str, weight: f64, severity: Severity) -> ValidationResult {
    if value.trim().is_empty() {
        ValidationResult::fail(
            &format!("{}_missing", rule),
            field,
            &format!("{} is empty", field),
            weight,
            severity,
        )
    } else {
        ValidationResult::pass(&format!("{}_present", rule), field, &format!("{} present", field), weight)
    }
}

fn check_tax_code(tax_code: &str) -> ValidationResult {
    let digits_only = tax_code.chars().all(|c| c.is_ascii_digit());
    if digits_only && (tax_code.len() == 10 || tax_code.len() == 13) {
        ValidationResult::pass("tax_code_valid", "tax_code", "Tax code is well-formed", 2.0)
    } else {
        ValidationResult::fail(
            "tax_code_invalid",
            "tax_code",
            &format!("Tax code {:?} is not 10 or 13 digits", tax_code),
            2.0,
            Severity::Critical,
        )
    }
}

fn check_phone(phone: &str) -> ValidationResult {
    let digits = digit_count(phone);
    if (9..=11).contains(&digits) {
        ValidationResult::pass("phone_valid", "contact_phone", "Phone number well-formed", 1.0)
    } else if phone.trim().is_empty() {
        ValidationResult::fail("phone_missing", "contact_phone", "Phone number is empty", 1.0, Severity::Warning)
    } else {
        ValidationResult::fail(
            "phone_invalid",
            "contact_phone",
            &format!("Phone number has {} digits", digits),
            1.0,
            Severity::Warning,
        )
    }
}

fn check_website(website: &str) -> ValidationResult {
    let website = website.trim();
    if website.starts_with("http://") || website.starts_with("https://") {
        ValidationResult::pass("website_valid", "company_website", "Website is a URL", 0.5)
    } else if website.is_empty() {
        ValidationResult::fail("website_missing", "company_website", "Website is empty", 0.5, Severity::Info)
    } else {
        ValidationResult::fail(
            "website_invalid",
            "company_website",
            &format!("Website {:?} is not an http(s) URL", website),
            0.5,
            Severity::Info,
        )
    }
}

fn check_registration_dates(registered: &str, expiry: &str) -> ValidationResult {
    match (parse_date(registered), parse_date(expiry)) {
        (Some(from), Some(until)) if until >= from => ValidationResult::pass(
            "registration_dates_valid",
            "registration_date",
            "Registration dates well-formed",
            1.0,
        ),
        (Some(_), Some(_)) => ValidationResult::fail(
            "registration_dates_inverted",
            "expiry_date",
            "Expiry date precedes registration date",
            1.0,
            Severity::Warning,
        ),
        _ => ValidationResult::fail(
            "registration_dates_invalid",
            "registration_date",
            "Registration or expiry date missing or not YYYY-MM-DD",
            1.0,
            Severity::Warning,
        ),
    }
}

fn check_revenue(revenue: Option<f64>) -> ValidationResult {
    match revenue {
        Some(r) if r.is_finite() && r > 0.0 => {
            ValidationResult::pass("revenue_valid", "annual_revenue", "Revenue is positive", 0.5)
        }
        Some(_) => ValidationResult::fail(
            "revenue_invalid",
            "annual_revenue",
            "Revenue is not a positive amount",
            0.5,
            Severity::Info,
        ),
        None => ValidationResult::fail("revenue_missing", "annual_revenue", "Revenue is missing", 0.5, Severity::Info),
    }
}

fn check_bank_account(account: &str) -> ValidationResult {
    let account = account.trim();
    let digits = digit_count(account);
    if digits == account.len() && (8..=19).contains(&digits) {
        ValidationResult::pass("bank_account_valid", "bank_account", "Bank account well-formed", 0.5)
    } else if account.is_empty() {
        ValidationResult::fail("bank_account_missing", "bank_account", "Bank account is empty", 0.5, Severity::Info)
    } else {
        ValidationResult::fail(
            "bank_account_invalid",
            "bank_account",
            "Bank account is not 8 to 19 digits",
            0.5,
            Severity::Info,
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
