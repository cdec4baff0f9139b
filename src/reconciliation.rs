// ⚖️ Field Reconciler - merge both sources into one canonical profile
//
// Walks the mapping table in order. Direct entries copy a source field,
// derived entries read fields reconciled earlier in the same walk. A direct
// entry whose source field is absent runs its fallback transform, if any,
// and is scored as derived.
//
// Confidence:
//   direct:  declared × source_quality / 100
//   derived: min(declared, min(input confidences)) × source_quality / 100
//
// so a derived field is never more trusted than what it was built from.

use crate::error::IntegrationError;
use crate::mapping::{
    transform_rule, validate_table, DerivedTransform, FieldMapping, MappingKind, MappingKindTag,
    FIELD_MAPPINGS,
};
use crate::source::{
    EnterpriseRecord, FieldMap, InsuranceRecordSet, Provenance, SourceSide, Sourced,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// RECONCILED PROFILE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledField {
    pub value: Value,
    /// In [0, 1]
    pub confidence: f64,
    pub provenance: Provenance,
    pub side: SourceSide,
    pub kind: MappingKindTag,
    pub rule: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledProfile {
    pub fields: BTreeMap<String, ReconciledField>,
    pub mapped: usize,
    pub total: usize,
    /// Targets left absent, in table order
    pub unmapped: Vec<String>,
}

impl ReconciledProfile {
    /// Share of mapping entries that produced a value, in [0, 1]
    pub fn coverage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.mapped as f64 / self.total as f64
        }
    }

    pub fn get(&self, field: &str) -> Option<&ReconciledField> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(|f| f.value.as_str())
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(|f| f.value.as_f64())
    }

    pub fn confidence(&self, field: &str) -> Option<f64> {
        self.get(field).map(|f| f.confidence)
    }

    /// Mean confidence over mapped fields
    pub fn average_confidence(&self) -> f64 {
        if self.fields.is_empty() {
            return 0.0;
        }
        self.fields.values().map(|f| f.confidence).sum::<f64>() / self.fields.len() as f64
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciled {}/{} fields ({:.1}% coverage), average confidence {:.2}",
            self.mapped,
            self.total,
            self.coverage() * 100.0,
            self.average_confidence()
        )
    }
}

// ============================================================================
// FIELD RECONCILER
// ============================================================================

pub struct FieldReconciler {
    table: &'static [FieldMapping],
}

impl FieldReconciler {
    /// Reconciler over the built-in mapping table
    pub fn new() -> Result<Self, IntegrationError> {
        Self::with_table(FIELD_MAPPINGS)
    }

    pub fn with_table(table: &'static [FieldMapping]) -> Result<Self, IntegrationError> {
        validate_table(table)?;
        Ok(FieldReconciler { table })
    }

    pub fn table(&self) -> &'static [FieldMapping] {
        self.table
    }

    pub fn reconcile(
        &self,
        enterprise: &Sourced<EnterpriseRecord>,
        insurance: &Sourced<InsuranceRecordSet>,
    ) -> ReconciledProfile {
        let enterprise_fields = enterprise.fields();
        let insurance_fields = insurance.fields();

        let mut fields: BTreeMap<String, ReconciledField> = BTreeMap::new();
        let mut unmapped = Vec::new();

        for mapping in self.table {
            let (source, quality, provenance) = match mapping.side {
                SourceSide::Enterprise => (
                    &enterprise_fields,
                    enterprise.quality(),
                    enterprise.provenance(),
                ),
                SourceSide::Insurance => (
                    &insurance_fields,
                    insurance.quality(),
                    insurance.provenance(),
                ),
            };

            match resolve(mapping, source, &fields) {
                Some(resolved) => {
                    let confidence = (resolved.confidence * quality / 100.0).clamp(0.0, 1.0);
                    let (kind, rule) = match resolved.fallback {
                        Some(t) => (MappingKindTag::Derived, transform_rule(t)),
                        None => (mapping.kind.tag(), mapping.rule()),
                    };
                    fields.insert(
                        mapping.target_field.to_string(),
                        ReconciledField {
                            value: resolved.value,
                            confidence,
                            provenance,
                            side: mapping.side,
                            kind,
                            rule,
                        },
                    );
                }
                None => unmapped.push(mapping.target_field.to_string()),
            }
        }

        ReconciledProfile {
            mapped: fields.len(),
            total: self.table.len(),
            fields,
            unmapped,
        }
    }
}

/// Value and pre-quality confidence for one mapping entry
struct Resolved {
    value: Value,
    confidence: f64,
    /// Set when a direct entry was filled by its fallback transform
    fallback: Option<&'static DerivedTransform>,
}

fn resolve(
    mapping: &FieldMapping,
    source: &FieldMap,
    reconciled: &BTreeMap<String, ReconciledField>,
) -> Option<Resolved> {
    match mapping.kind {
        MappingKind::Direct => match source.get(mapping.source_field) {
            Some(value) => Some(Resolved {
                value: value.clone(),
                confidence: mapping.confidence,
                fallback: None,
            }),
            None => {
                let transform = mapping.fallback?;
                let (value, confidence) = derive(transform, mapping.confidence, reconciled)?;
                Some(Resolved {
                    value,
                    confidence,
                    fallback: Some(transform),
                })
            }
        },
        MappingKind::Derived(transform) => {
            let (value, confidence) = derive(transform, mapping.confidence, reconciled)?;
            Some(Resolved {
                value,
                confidence,
                fallback: None,
            })
        }
    }
}

/// Run a transform; confidence is capped by the weakest input
fn derive(
    transform: &DerivedTransform,
    declared: f64,
    reconciled: &BTreeMap<String, ReconciledField>,
) -> Option<(Value, f64)> {
    let inputs: Vec<&ReconciledField> = transform
        .inputs
        .iter()
        .map(|name| reconciled.get(*name))
        .collect::<Option<_>>()?;

    let values: Vec<&Value> = inputs.iter().map(|f| &f.value).collect();
    let value = (transform.apply)(&values)?;

    let weakest_input = inputs
        .iter()
        .map(|f| f.confidence)
        .fold(f64::INFINITY, f64::min);
    Some((value, declared.min(weakest_input)))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::SyntheticGenerator;
    use crate::identifier::TaxIdentifier;

    fn synthetic_pair() -> (Sourced<EnterpriseRecord>, Sourced<InsuranceRecordSet>) {
        let id = TaxIdentifier::parse("0101234567").unwrap();
        let generator = SyntheticGenerator::new();
        (
            Sourced::Synthetic(generator.enterprise(&id)),
            Sourced::Synthetic(generator.insurance(&id)),
        )
    }

    #[test]
    fn test_full_coverage_for_synthetic_records() {
        let (enterprise, insurance) = synthetic_pair();
        let profile = FieldReconciler::new().unwrap().reconcile(&enterprise, &insurance);

        assert_eq!(profile.total, FIELD_MAPPINGS.len());
        assert_eq!(profile.mapped, profile.total);
        assert!(profile.unmapped.is_empty());
        assert_eq!(profile.coverage(), 1.0);

        assert_eq!(profile.text("employer_id"), Some("VSS-0101234567"));
        println!("✅ Test passed: {}", profile.summary());
    }

    #[test]
    fn test_direct_confidence_scales_with_quality() {
        let (enterprise, insurance) = synthetic_pair();
        let reconciler = FieldReconciler::new().unwrap();

        let synthetic = reconciler.reconcile(&enterprise, &insurance);
        let live = reconciler.reconcile(
            &Sourced::Live(enterprise.record().clone()),
            &Sourced::Live(insurance.record().clone()),
        );

        assert_eq!(live.confidence("company_name"), Some(1.0));
        assert!((synthetic.confidence("company_name").unwrap() - 0.95).abs() < 1e-9);
        assert!((synthetic.confidence("registered_address").unwrap() - 0.855).abs() < 1e-9);
        assert_eq!(synthetic.get("tax_code").unwrap().provenance, Provenance::Synthetic);
    }

    #[test]
    fn test_derived_confidence_bounded_by_inputs() {
        let (enterprise, insurance) = synthetic_pair();
        let profile = FieldReconciler::new().unwrap().reconcile(&enterprise, &insurance);

        for mapping in FIELD_MAPPINGS {
            if let MappingKind::Derived(transform) = mapping.kind {
                let derived = profile.confidence(mapping.target_field).unwrap();
                for input in transform.inputs {
                    assert!(derived <= profile.confidence(input).unwrap());
                }
            }
        }
    }

    #[test]
    fn test_location_filled_from_address_when_registry_omits_it() {
        let (enterprise, insurance) = synthetic_pair();
        let mut record = enterprise.record().clone();
        record.address = "Số 5, Phố Hàng Bạc, Phường Hàng Bạc, Quận Hoàn Kiếm, Hà Nội".to_string();
        record.province.clear();
        record.district.clear();
        record.ward.clear();

        let reconciler = FieldReconciler::new().unwrap();
        let insurance = Sourced::Live(insurance.record().clone());
        let profile = reconciler.reconcile(&Sourced::Live(record.clone()), &insurance);

        assert_eq!(profile.text("province"), Some("Hà Nội"));
        assert_eq!(profile.text("district"), Some("Quận Hoàn Kiếm"));
        assert_eq!(profile.text("ward"), Some("Phường Hàng Bạc"));
        assert!(profile.unmapped.is_empty());

        let address = profile.confidence("registered_address").unwrap();
        for target in ["province", "district", "ward"] {
            let field = profile.get(target).unwrap();
            assert_eq!(field.kind, MappingKindTag::Derived);
            assert!(field.confidence <= address, "{} above address", target);
        }
        assert_eq!(
            profile.get("province").unwrap().rule,
            "province_from_address(registered_address)"
        );

        // a registry value wins over the address
        record.province = "Đà Nẵng".to_string();
        let profile = reconciler.reconcile(&Sourced::Live(record), &insurance);
        let province = profile.get("province").unwrap();
        assert_eq!(province.value, serde_json::json!("Đà Nẵng"));
        assert_eq!(province.kind, MappingKindTag::Direct);
        assert_eq!(province.rule, "enterprise.province");
    }

    #[test]
    fn test_unrecognised_address_leaves_location_absent() {
        let (enterprise, insurance) = synthetic_pair();
        let mut record = enterprise.record().clone();
        record.address = "Số 9, Lê Lợi, Huế".to_string();
        record.province.clear();
        record.district.clear();
        record.ward.clear();

        let profile = FieldReconciler::new()
            .unwrap()
            .reconcile(&Sourced::Live(record), &insurance);

        assert!(!profile.contains("province"));
        assert_eq!(profile.unmapped, vec!["province", "district", "ward"]);
    }

    #[test]
    fn test_missing_source_field_leaves_target_absent() {
        let (enterprise, insurance) = synthetic_pair();
        let mut record = enterprise.record().clone();
        record.address = "   ".to_string();
        record.website.clear();

        let profile = FieldReconciler::new()
            .unwrap()
            .reconcile(&Sourced::Live(record), &insurance);

        assert!(!profile.contains("registered_address"));
        // derived from the missing address
        assert!(!profile.contains("employer_address"));
        assert!(!profile.contains("company_website"));
        assert_eq!(profile.mapped, profile.total - 3);
        assert_eq!(
            profile.unmapped,
            vec!["registered_address", "company_website", "employer_address"]
        );
    }

    #[test]
    fn test_corrupt_table_is_rejected() {
        static BAD: &[FieldMapping] = &[FieldMapping {
            side: SourceSide::Enterprise,
            source_field: "name",
            target_field: "company_name",
            kind: MappingKind::Direct,
            confidence: 2.0,
            fallback: None,
        }];

        match FieldReconciler::with_table(BAD) {
            Err(err) => assert_eq!(err.kind(), "mapping_table_corrupt"),
            Ok(_) => panic!("corrupt table accepted"),
        }
    }
}
