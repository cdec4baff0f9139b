// 📥 Source records - what the two upstreams hand us
//
// Both providers return a `Sourced<R>`: the record plus where it came from.
// Downstream code reads `fields()` and `quality()` and never needs to branch
// on provenance.

use crate::error::IntegrationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

/// Quality of a record served by the live upstream
pub const LIVE_SOURCE_QUALITY: f64 = 100.0;

/// Fixed discount applied to generated records
pub const SYNTHETIC_SOURCE_QUALITY: f64 = 95.0;

/// Named source fields, ordered for stable output
pub type FieldMap = BTreeMap<&'static str, Value>;

// ============================================================================
// PROVENANCE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Live,
    Synthetic,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Live => "live",
            Provenance::Synthetic => "synthetic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceSide {
    Enterprise,
    Insurance,
}

impl SourceSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceSide::Enterprise => "enterprise",
            SourceSide::Insurance => "insurance",
        }
    }
}

/// Anything that can expose itself as a flat map of named fields
pub trait SourceRecord {
    fn fields(&self) -> FieldMap;
}

/// A record tagged with its origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provenance", content = "record", rename_all = "lowercase")]
pub enum Sourced<R> {
    Live(R),
    Synthetic(R),
}

impl<R> Sourced<R> {
    pub fn record(&self) -> &R {
        match self {
            Sourced::Live(r) | Sourced::Synthetic(r) => r,
        }
    }

    pub fn provenance(&self) -> Provenance {
        match self {
            Sourced::Live(_) => Provenance::Live,
            Sourced::Synthetic(_) => Provenance::Synthetic,
        }
    }

    /// source_quality in [0,100]
    pub fn quality(&self) -> f64 {
        match self {
            Sourced::Live(_) => LIVE_SOURCE_QUALITY,
            Sourced::Synthetic(_) => SYNTHETIC_SOURCE_QUALITY,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Sourced::Live(_))
    }
}

impl<R: SourceRecord> Sourced<R> {
    pub fn fields(&self) -> FieldMap {
        self.record().fields()
    }
}

impl<R: Serialize> Sourced<R> {
    /// SHA-256 over the serialized record; equal records give equal hashes
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        format!("{:x}", hasher.finalize())
    }
}

fn insert_text(fields: &mut FieldMap, name: &'static str, value: &str) {
    let trimmed = value.trim();
    if !trimmed.is_empty() {
        fields.insert(name, Value::String(trimmed.to_string()));
    }
}

// ============================================================================
// ENTERPRISE RECORD (commercial registry)
// ============================================================================

/// Registry record. Field names on the wire follow the registry API; every
/// field may be missing in a live payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnterpriseRecord {
    #[serde(rename = "MST", default)]
    pub tax_code: String,

    #[serde(rename = "TenDoanhNghiep", default)]
    pub name: String,

    #[serde(rename = "DiaChi", default)]
    pub address: String,

    #[serde(rename = "NganhNghe", default)]
    pub sector: String,

    #[serde(rename = "LoaiHinh", default)]
    pub company_type: String,

    #[serde(rename = "SoDienThoai", default)]
    pub phone: String,

    #[serde(rename = "Website", default)]
    pub website: String,

    /// Registration date (YYYY-MM-DD)
    #[serde(rename = "NgayCap", default)]
    pub registration_date: String,

    /// Registration expiry date (YYYY-MM-DD)
    #[serde(rename = "NgayHetHan", default)]
    pub expiry_date: String,

    /// Annual revenue in VND
    #[serde(rename = "DoanhThu", default)]
    pub revenue: Option<f64>,

    #[serde(rename = "SoNganHang", default)]
    pub bank_account: String,

    #[serde(rename = "TinhThanh", default)]
    pub province: String,

    #[serde(rename = "QuanHuyen", default)]
    pub district: String,

    #[serde(rename = "PhuongXa", default)]
    pub ward: String,
}

impl EnterpriseRecord {
    /// Required fields that a live payload must carry to be accepted
    pub const REQUIRED_FIELDS: [&'static str; 3] = ["name", "address", "sector"];

    /// Names of required fields that are empty
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.address.trim().is_empty() {
            missing.push("address");
        }
        if self.sector.trim().is_empty() {
            missing.push("sector");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_required().is_empty()
    }
}

impl SourceRecord for EnterpriseRecord {
    fn fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        insert_text(&mut fields, "tax_code", &self.tax_code);
        insert_text(&mut fields, "name", &self.name);
        insert_text(&mut fields, "address", &self.address);
        insert_text(&mut fields, "sector", &self.sector);
        insert_text(&mut fields, "company_type", &self.company_type);
        insert_text(&mut fields, "phone", &self.phone);
        insert_text(&mut fields, "website", &self.website);
        insert_text(&mut fields, "registration_date", &self.registration_date);
        insert_text(&mut fields, "expiry_date", &self.expiry_date);
        if let Some(revenue) = self.revenue.filter(|r| r.is_finite()) {
            fields.insert("revenue", json!(revenue));
        }
        insert_text(&mut fields, "bank_account", &self.bank_account);
        insert_text(&mut fields, "province", &self.province);
        insert_text(&mut fields, "district", &self.district);
        insert_text(&mut fields, "ward", &self.ward);
        fields
    }
}

// ============================================================================
// INSURANCE RECORD SET (social insurance)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmploymentStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Employee {
    pub employee_id: String,
    pub full_name: String,
    pub position: String,
    /// Monthly salary in VND
    pub salary: i64,
    pub start_date: String,
    pub status: EmploymentStatus,
}

impl Employee {
    pub fn is_active(&self) -> bool {
        self.status == EmploymentStatus::Active
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Contribution {
    pub contribution_id: String,
    pub employee_id: String,
    /// Amount in VND
    pub amount: i64,
    pub date: String,
    pub contribution_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Approved,
    #[default]
    Pending,
    Rejected,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Claim {
    pub claim_id: String,
    pub employee_id: String,
    pub claim_type: String,
    /// Amount in VND
    pub amount: i64,
    pub date: String,
    pub status: ClaimStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hospital {
    pub hospital_id: String,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub specialties: Vec<String>,
}

/// Wire shape of the insurance upstream response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InsurancePayload {
    pub employees: Vec<Employee>,
    pub contributions: Vec<Contribution>,
    pub claims: Vec<Claim>,
    pub hospitals: Vec<Hospital>,
}

/// Largest salary or amount a live set may carry, in VND
pub const MAX_AMOUNT_VND: i64 = 1_000_000_000_000;

/// Sum that pins at the i64 bounds instead of wrapping
pub fn saturating_total(values: impl IntoIterator<Item = i64>) -> i64 {
    values.into_iter().fold(0, i64::saturating_add)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsuranceRecordSet {
    /// Date the set describes; the compliance lookback window ends here
    pub snapshot_date: NaiveDate,
    pub employees: Vec<Employee>,
    pub contributions: Vec<Contribution>,
    pub claims: Vec<Claim>,
    pub hospitals: Vec<Hospital>,
}

impl InsuranceRecordSet {
    pub fn from_payload(payload: InsurancePayload, snapshot_date: NaiveDate) -> Self {
        InsuranceRecordSet {
            snapshot_date,
            employees: payload.employees,
            contributions: payload.contributions,
            claims: payload.claims,
            hospitals: payload.hospitals,
        }
    }

    pub fn active_employees(&self) -> usize {
        self.employees.iter().filter(|e| e.is_active()).count()
    }

    pub fn total_contribution_amount(&self) -> i64 {
        saturating_total(self.contributions.iter().map(|c| c.amount))
    }

    pub fn total_claim_amount(&self) -> i64 {
        saturating_total(self.claims.iter().map(|c| c.amount))
    }

    /// First salary or amount whose magnitude exceeds MAX_AMOUNT_VND
    pub fn out_of_range_amount(&self) -> Option<(&str, i64)> {
        let salaries = self
            .employees
            .iter()
            .map(|e| (e.employee_id.as_str(), e.salary));
        let contributions = self
            .contributions
            .iter()
            .map(|c| (c.contribution_id.as_str(), c.amount));
        let claims = self.claims.iter().map(|c| (c.claim_id.as_str(), c.amount));

        salaries
            .chain(contributions)
            .chain(claims)
            .find(|(_, amount)| amount.unsigned_abs() > MAX_AMOUNT_VND as u64)
    }

    /// Every contribution and claim must reference a known employee
    pub fn verify_integrity(&self) -> Result<(), IntegrationError> {
        let known: HashSet<&str> = self
            .employees
            .iter()
            .map(|e| e.employee_id.as_str())
            .collect();

        for contribution in &self.contributions {
            if !known.contains(contribution.employee_id.as_str()) {
                return Err(IntegrationError::ReferentialIntegrityViolation {
                    dataset: "contributions".to_string(),
                    record_id: contribution.contribution_id.clone(),
                    employee_id: contribution.employee_id.clone(),
                });
            }
        }

        for claim in &self.claims {
            if !known.contains(claim.employee_id.as_str()) {
                return Err(IntegrationError::ReferentialIntegrityViolation {
                    dataset: "claims".to_string(),
                    record_id: claim.claim_id.clone(),
                    employee_id: claim.employee_id.clone(),
                });
            }
        }

        Ok(())
    }
}

impl SourceRecord for InsuranceRecordSet {
    fn fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("employee_count", json!(self.employees.len()));
        fields.insert("active_employee_count", json!(self.active_employees()));
        fields.insert("contribution_count", json!(self.contributions.len()));
        fields.insert(
            "total_contribution_amount",
            json!(self.total_contribution_amount()),
        );
        fields.insert("claim_count", json!(self.claims.len()));
        fields.insert("hospital_count", json!(self.hospitals.len()));

        if !self.employees.is_empty() {
            let total: f64 = self.employees.iter().map(|e| e.salary as f64).sum();
            fields.insert(
                "average_salary",
                json!(total / self.employees.len() as f64),
            );
        }
        fields
    }
}
