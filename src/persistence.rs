// 💾 Persistence collaborators - where finished results go
//
// Sinks receive a finished result and the requested view. A sink failure
// is reported back as a warning by the assembler and never affects the
// result itself.

use crate::assembler::{IntegrationResult, View};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub trait ResultSink: Send + Sync {
    /// Short name used in warnings and logs
    fn name(&self) -> &str;

    fn persist(&self, result: &IntegrationResult, view: View) -> Result<()>;
}

// ============================================================================
// FILE SINK
// ============================================================================

/// Writes `<mst>_<run>.json`, `<mst>_<run>.md` and `<mst>_<run>_employees.csv`
pub struct FileSink {
    output_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct EmployeeRow<'a> {
    employee_id: &'a str,
    full_name: &'a str,
    position: &'a str,
    salary: i64,
    start_date: &'a str,
    status: &'a str,
    contributions: usize,
    provenance: &'a str,
}

impl FileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        FileSink {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// File stem shared by the three outputs of one run
    pub fn stem(result: &IntegrationResult) -> String {
        let run = result.run_id.split('-').next().unwrap_or(&result.run_id);
        format!("{}_{}", result.mst, run)
    }

    fn write_json(&self, stem: &str, result: &IntegrationResult, view: View) -> Result<PathBuf> {
        let path = self.output_dir.join(format!("{}.json", stem));
        let json = serde_json::to_string_pretty(&result.view(view))
            .context("Failed to serialize result")?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    fn write_report(&self, stem: &str, result: &IntegrationResult) -> Result<PathBuf> {
        let path = self.output_dir.join(format!("{}.md", stem));
        fs::write(&path, markdown_report(result))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    fn write_roster(&self, stem: &str, result: &IntegrationResult) -> Result<PathBuf> {
        let path = self.output_dir.join(format!("{}_employees.csv", stem));
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let set = result.insurance.record();
        let provenance = result.insurance.provenance().as_str();
        for employee in &set.employees {
            let contributions = set
                .contributions
                .iter()
                .filter(|c| c.employee_id == employee.employee_id)
                .count();
            writer
                .serialize(EmployeeRow {
                    employee_id: &employee.employee_id,
                    full_name: &employee.full_name,
                    position: &employee.position,
                    salary: employee.salary,
                    start_date: &employee.start_date,
                    status: if employee.is_active() { "active" } else { "inactive" },
                    contributions,
                    provenance,
                })
                .context("Failed to write employee row")?;
        }

        writer.flush().context("Failed to flush employee roster")?;
        Ok(path)
    }
}

impl ResultSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn persist(&self, result: &IntegrationResult, view: View) -> Result<()> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create output directory {}", self.output_dir.display())
        })?;

        let stem = Self::stem(result);
        self.write_json(&stem, result, view)?;
        self.write_report(&stem, result)?;
        self.write_roster(&stem, result)?;

        tracing::debug!(mst = %result.mst, dir = %self.output_dir.display(), "result written to disk");
        Ok(())
    }
}

/// Human-readable report of one result
pub fn markdown_report(result: &IntegrationResult) -> String {
    let mut md = String::new();
    let profile = &result.profile;
    let field = |name: &str| -> String {
        match profile.get(name).map(|f| &f.value) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "n/a".to_string(),
        }
    };

    let _ = writeln!(md, "# MST integration report: {}", result.mst);
    let _ = writeln!(md);
    let _ = writeln!(md, "- **Run:** {}", result.run_id);
    let _ = writeln!(md, "- **Generated:** {}", result.generated_at.to_rfc3339());
    let _ = writeln!(
        md,
        "- **Sources:** enterprise {}, insurance {} ({:.0}% live)",
        result.enterprise.provenance().as_str(),
        result.insurance.provenance().as_str(),
        result.live_data_percentage
    );
    let _ = writeln!(md);

    let _ = writeln!(md, "## Company");
    let _ = writeln!(md);
    let _ = writeln!(md, "- **Name:** {}", field("company_name"));
    let _ = writeln!(md, "- **Address:** {}", field("registered_address"));
    let _ = writeln!(md, "- **Sector:** {}", field("business_sector"));
    let _ = writeln!(md, "- **Type:** {}", field("company_type"));
    let _ = writeln!(md, "- **Registered:** {} (expires {})", field("registration_date"), field("expiry_date"));
    let _ = writeln!(md);

    let workforce = &result.workforce;
    let _ = writeln!(md, "## Workforce");
    let _ = writeln!(md);
    let _ = writeln!(
        md,
        "- **Employees:** {} ({} active, turnover {:.1}%)",
        workforce.total_employees,
        workforce.active_employees,
        workforce.turnover_rate * 100.0
    );
    let _ = writeln!(md, "- **Average salary:** {:.0} VND", workforce.average_salary);
    let _ = writeln!(md, "- **Median salary:** {:.0} VND", workforce.median_salary);
    let _ = writeln!(
        md,
        "- **Contributions:** {} totalling {} VND",
        result.contributions.contribution_count, result.contributions.total_amount
    );
    let _ = writeln!(md);

    let _ = writeln!(md, "## Scores");
    let _ = writeln!(md);
    let _ = writeln!(md, "| Metric | Value |");
    let _ = writeln!(md, "|---|---|");
    let _ = writeln!(md, "| Integration confidence | {:.1} |", result.integration_confidence);
    let _ = writeln!(md, "| Data quality | {:.1} |", result.data_quality_score);
    let _ = writeln!(md, "| Compliance | {:.1} |", result.compliance.score);
    let _ = writeln!(md, "| Risk | {:.1} ({}) |", result.risk.score, result.risk.tier.as_str());
    let _ = writeln!(md, "| Field coverage | {}/{} |", profile.mapped, profile.total);
    let _ = writeln!(md);

    if !result.compliance.issues.is_empty() {
        let _ = writeln!(md, "## Compliance issues");
        let _ = writeln!(md);
        for issue in &result.compliance.issues {
            let _ = writeln!(md, "- {}", issue);
        }
        let _ = writeln!(md);
    }

    if !result.recommendations.is_empty() {
        let _ = writeln!(md, "## Recommendations");
        let _ = writeln!(md);
        for (i, rec) in result.recommendations.iter().enumerate() {
            let _ = writeln!(md, "{}. {}", i + 1, rec);
        }
    }

    md
}
