// 🗺️ Field Mapping Table - how source fields become canonical fields
//
// The table is static and read-only. Direct entries copy a source field;
// derived entries run a named transform over canonical fields declared
// earlier in the table. A direct entry may name a fallback transform that
// fills the target when the source omits it. `validate_table` runs once per
// reconciler.

use crate::error::IntegrationError;
use crate::source::SourceSide::{self, Enterprise, Insurance};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;

// ============================================================================
// TYPES
// ============================================================================

/// A pure function over already-reconciled canonical fields
pub struct DerivedTransform {
    pub name: &'static str,
    /// Canonical fields the transform reads, in argument order
    pub inputs: &'static [&'static str],
    pub apply: fn(&[&Value]) -> Option<Value>,
}

impl std::fmt::Debug for DerivedTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedTransform")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum MappingKind {
    Direct,
    Derived(&'static DerivedTransform),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingKindTag {
    Direct,
    Derived,
}

impl MappingKind {
    pub fn tag(&self) -> MappingKindTag {
        match self {
            MappingKind::Direct => MappingKindTag::Direct,
            MappingKind::Derived(_) => MappingKindTag::Derived,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub side: SourceSide,
    /// Source field for direct entries; derived entries repeat the target
    pub source_field: &'static str,
    pub target_field: &'static str,
    pub kind: MappingKind,
    /// Declared confidence in (0, 1]
    pub confidence: f64,
    /// Derives the target when a direct source field is absent
    pub fallback: Option<&'static DerivedTransform>,
}

impl FieldMapping {
    const fn direct(
        side: SourceSide,
        source_field: &'static str,
        target_field: &'static str,
        confidence: f64,
    ) -> Self {
        FieldMapping {
            side,
            source_field,
            target_field,
            kind: MappingKind::Direct,
            confidence,
            fallback: None,
        }
    }

    const fn direct_or(
        side: SourceSide,
        source_field: &'static str,
        target_field: &'static str,
        confidence: f64,
        fallback: &'static DerivedTransform,
    ) -> Self {
        FieldMapping {
            side,
            source_field,
            target_field,
            kind: MappingKind::Direct,
            confidence,
            fallback: Some(fallback),
        }
    }

    const fn derived(
        side: SourceSide,
        transform: &'static DerivedTransform,
        target_field: &'static str,
        confidence: f64,
    ) -> Self {
        FieldMapping {
            side,
            source_field: target_field,
            target_field,
            kind: MappingKind::Derived(transform),
            confidence,
            fallback: None,
        }
    }

    /// Human-readable rule, e.g. `enterprise.name` or `employer_id(tax_code)`
    pub fn rule(&self) -> String {
        match self.kind {
            MappingKind::Direct => format!("{}.{}", self.side.as_str(), self.source_field),
            MappingKind::Derived(t) => transform_rule(t),
        }
    }

    /// Every transform this entry may run, primary or fallback
    pub fn transforms(&self) -> impl Iterator<Item = &'static DerivedTransform> {
        let primary = match self.kind {
            MappingKind::Derived(t) => Some(t),
            MappingKind::Direct => None,
        };
        primary.into_iter().chain(self.fallback)
    }
}

pub fn transform_rule(transform: &DerivedTransform) -> String {
    format!("{}({})", transform.name, transform.inputs.join(", "))
}

// ============================================================================
// TRANSFORMS
// ============================================================================

/// Payroll share paid as social insurance
const CONTRIBUTION_RATE: f64 = 0.085;

fn employer_id(args: &[&Value]) -> Option<Value> {
    let tax_code = args.first()?.as_str()?;
    Some(json!(format!("VSS-{}", tax_code)))
}

fn uppercase(args: &[&Value]) -> Option<Value> {
    Some(json!(args.first()?.as_str()?.to_uppercase()))
}

fn collapse_whitespace(args: &[&Value]) -> Option<Value> {
    let text = args.first()?.as_str()?;
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(json!(collapsed))
    }
}

fn implied_payroll(args: &[&Value]) -> Option<Value> {
    let total = args.first()?.as_f64()?;
    Some(json!((total / CONTRIBUTION_RATE).round()))
}

fn average_contribution(args: &[&Value]) -> Option<Value> {
    let total = args.first()?.as_f64()?;
    let count = args.get(1)?.as_f64()?;
    if count > 0.0 {
        Some(json!((total / count).round()))
    } else {
        None
    }
}

fn turnover_rate(args: &[&Value]) -> Option<Value> {
    let total = args.first()?.as_f64()?;
    let active = args.get(1)?.as_f64()?;
    if total > 0.0 {
        Some(json!(((total - active) / total).clamp(0.0, 1.0)))
    } else {
        None
    }
}

// ----------------------------------------------------------------------------
// Locations named in a free-text address
// ----------------------------------------------------------------------------

pub static KNOWN_PROVINCES: &[&str] = &[
    "Hà Nội",
    "TP Hồ Chí Minh",
    "Đà Nẵng",
    "Hải Phòng",
    "Cần Thơ",
    "Bình Dương",
    "Đồng Nai",
    "Khánh Hòa",
    "Quảng Ninh",
    "Thừa Thiên Huế",
];

pub static KNOWN_DISTRICTS: &[&str] = &[
    "Quận 1",
    "Quận 2",
    "Quận 3",
    "Quận 7",
    "Quận Ba Đình",
    "Quận Cầu Giấy",
    "Quận Đống Đa",
    "Quận Hoàn Kiếm",
    "Quận Thanh Xuân",
    "Huyện Đông Anh",
    "Huyện Gia Lâm",
];

pub static KNOWN_WARDS: &[&str] = &[
    "Phường 1",
    "Phường 2",
    "Phường 3",
    "Phường Hàng Bạc",
    "Phường Hàng Gai",
    "Phường Lý Thái Tổ",
    "Phường Phúc Xá",
    "Phường Tràng Tiền",
];

const ADMIN_PREFIXES: &[&str] = &["TP ", "Quận ", "Huyện ", "Phường "];

/// Canonical entry of `known` named by one comma-separated address part.
/// Parts are compared whole, case-insensitively, with or without the
/// administrative prefix; numbered units need their prefix.
pub fn locate(address: &str, known: &[&'static str]) -> Option<&'static str> {
    address.rsplit(',').find_map(|part| {
        let part = part.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        if part.is_empty() {
            return None;
        }
        known.iter().copied().find(|entry| {
            let full = entry.to_lowercase();
            let bare = ADMIN_PREFIXES
                .iter()
                .find_map(|prefix| entry.strip_prefix(prefix))
                .filter(|rest| !rest.chars().all(|c| c.is_ascii_digit()))
                .map(str::to_lowercase);
            part == full || bare.as_deref() == Some(part.as_str())
        })
    })
}

fn province_from_address(args: &[&Value]) -> Option<Value> {
    locate(args.first()?.as_str()?, KNOWN_PROVINCES).map(|p| json!(p))
}

fn district_from_address(args: &[&Value]) -> Option<Value> {
    locate(args.first()?.as_str()?, KNOWN_DISTRICTS).map(|d| json!(d))
}

fn ward_from_address(args: &[&Value]) -> Option<Value> {
    locate(args.first()?.as_str()?, KNOWN_WARDS).map(|w| json!(w))
}

pub static PROVINCE_FROM_ADDRESS: DerivedTransform = DerivedTransform {
    name: "province_from_address",
    inputs: &["registered_address"],
    apply: province_from_address,
};

pub static DISTRICT_FROM_ADDRESS: DerivedTransform = DerivedTransform {
    name: "district_from_address",
    inputs: &["registered_address"],
    apply: district_from_address,
};

pub static WARD_FROM_ADDRESS: DerivedTransform = DerivedTransform {
    name: "ward_from_address",
    inputs: &["registered_address"],
    apply: ward_from_address,
};

pub static EMPLOYER_ID: DerivedTransform = DerivedTransform {
    name: "employer_id",
    inputs: &["tax_code"],
    apply: employer_id,
};

pub static EMPLOYER_NAME: DerivedTransform = DerivedTransform {
    name: "uppercase",
    inputs: &["company_name"],
    apply: uppercase,
};

pub static EMPLOYER_ADDRESS: DerivedTransform = DerivedTransform {
    name: "collapse_whitespace",
    inputs: &["registered_address"],
    apply: collapse_whitespace,
};

pub static IMPLIED_PAYROLL: DerivedTransform = DerivedTransform {
    name: "implied_payroll",
    inputs: &["total_contribution_amount"],
    apply: implied_payroll,
};

pub static AVERAGE_CONTRIBUTION: DerivedTransform = DerivedTransform {
    name: "average_contribution",
    inputs: &["total_contribution_amount", "contribution_count"],
    apply: average_contribution,
};

pub static TURNOVER_RATE: DerivedTransform = DerivedTransform {
    name: "turnover_rate",
    inputs: &["employee_count", "active_employee_count"],
    apply: turnover_rate,
};

/// Every transform a derived mapping may name
pub static TRANSFORMS: &[&DerivedTransform] = &[
    &EMPLOYER_ID,
    &EMPLOYER_NAME,
    &EMPLOYER_ADDRESS,
    &IMPLIED_PAYROLL,
    &AVERAGE_CONTRIBUTION,
    &TURNOVER_RATE,
    &PROVINCE_FROM_ADDRESS,
    &DISTRICT_FROM_ADDRESS,
    &WARD_FROM_ADDRESS,
];

pub fn transform(name: &str) -> Option<&'static DerivedTransform> {
    TRANSFORMS.iter().copied().find(|t| t.name == name)
}

// ============================================================================
// THE TABLE
// ============================================================================

pub static FIELD_MAPPINGS: &[FieldMapping] = &[
    // Registry
    FieldMapping::direct(Enterprise, "tax_code", "tax_code", 1.0),
    FieldMapping::direct(Enterprise, "name", "company_name", 1.0),
    FieldMapping::direct(Enterprise, "address", "registered_address", 0.9),
    FieldMapping::direct(Enterprise, "phone", "contact_phone", 0.8),
    FieldMapping::direct(Enterprise, "website", "company_website", 0.7),
    FieldMapping::direct(Enterprise, "sector", "business_sector", 0.9),
    FieldMapping::direct(Enterprise, "company_type", "company_type", 0.8),
    FieldMapping::direct(Enterprise, "revenue", "annual_revenue", 0.7),
    FieldMapping::direct_or(Enterprise, "province", "province", 0.9, &PROVINCE_FROM_ADDRESS),
    FieldMapping::direct_or(Enterprise, "district", "district", 0.8, &DISTRICT_FROM_ADDRESS),
    FieldMapping::direct_or(Enterprise, "ward", "ward", 0.8, &WARD_FROM_ADDRESS),
    FieldMapping::direct(Enterprise, "bank_account", "bank_account", 0.7),
    FieldMapping::direct(Enterprise, "registration_date", "registration_date", 0.8),
    FieldMapping::direct(Enterprise, "expiry_date", "expiry_date", 0.8),
    // Social insurance
    FieldMapping::direct(Insurance, "employee_count", "employee_count", 0.95),
    FieldMapping::direct(Insurance, "active_employee_count", "active_employee_count", 0.9),
    FieldMapping::direct(Insurance, "contribution_count", "contribution_count", 0.9),
    FieldMapping::direct(Insurance, "total_contribution_amount", "total_contribution_amount", 0.85),
    FieldMapping::direct(Insurance, "claim_count", "claim_count", 0.85),
    FieldMapping::direct(Insurance, "hospital_count", "hospital_count", 0.8),
    FieldMapping::direct(Insurance, "average_salary", "average_salary", 0.85),
    // Cross-source identity
    FieldMapping::derived(Enterprise, &EMPLOYER_ID, "employer_id", 0.9),
    FieldMapping::derived(Enterprise, &EMPLOYER_NAME, "employer_name", 0.9),
    FieldMapping::derived(Enterprise, &EMPLOYER_ADDRESS, "employer_address", 0.8),
    // Workforce metrics
    FieldMapping::derived(Insurance, &IMPLIED_PAYROLL, "implied_insured_payroll", 0.6),
    FieldMapping::derived(Insurance, &AVERAGE_CONTRIBUTION, "average_contribution", 0.8),
    FieldMapping::derived(Insurance, &TURNOVER_RATE, "turnover_rate", 0.8),
];

/// Check a mapping table before it is used
pub fn validate_table(table: &[FieldMapping]) -> Result<(), IntegrationError> {
    let mut targets: HashSet<&str> = HashSet::new();

    for (index, mapping) in table.iter().enumerate() {
        let entry = format!("entry {} ({})", index, mapping.target_field);

        if !(mapping.confidence > 0.0 && mapping.confidence <= 1.0) {
            return Err(IntegrationError::MappingTableCorrupt(format!(
                "{}: confidence {} outside (0, 1]",
                entry, mapping.confidence
            )));
        }

        if mapping.source_field.is_empty() || mapping.target_field.is_empty() {
            return Err(IntegrationError::MappingTableCorrupt(format!(
                "{}: empty field name",
                entry
            )));
        }

        for t in mapping.transforms() {
            if transform(t.name).is_none() {
                return Err(IntegrationError::MappingTableCorrupt(format!(
                    "{}: unknown transform {}",
                    entry, t.name
                )));
            }
            if t.inputs.is_empty() {
                return Err(IntegrationError::MappingTableCorrupt(format!(
                    "{}: transform {} has no inputs",
                    entry, t.name
                )));
            }
            if let Some(missing) = t.inputs.iter().find(|i| !targets.contains(*i)) {
                return Err(IntegrationError::MappingTableCorrupt(format!(
                    "{}: input {} is not mapped before it is used",
                    entry, missing
                )));
            }
        }

        if !targets.insert(mapping.target_field) {
            return Err(IntegrationError::MappingTableCorrupt(format!(
                "{}: duplicate target",
                entry
            )));
        }
    }

    Ok(())
}
