//! Composite thread report.
//!
//! All sections are read inside one snapshot, so a write committing while the
//! report runs cannot leave coverage, gaps and integrity disagreeing.

use crate::core::error::ThreadError;
use crate::core::output::markdown_table;
use crate::core::store::Store;
use crate::core::time;
use crate::thread::coverage::{self, CoverageReport, RequirementChain};
use crate::thread::gaps::{self, Gap};
use crate::thread::integrity::{self, IntegrityReport};
use crate::thread::links::{self, LinkStats};
use crate::thread::orphans::{self, OrphanEntity, OrphanReport};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadReport {
    pub project_id: String,
    pub generated_at: String,
    pub stats: LinkStats,
    pub coverage: CoverageReport,
    pub requirements: Vec<RequirementChain>,
    pub orphans: OrphanReport,
    pub gaps: Vec<Gap>,
    pub integrity: IntegrityReport,
}

pub fn generate_report(store: &Store, project_id: &str) -> Result<ThreadReport, ThreadError> {
    store.with_snapshot(|conn| {
        let requirements = coverage::requirement_chains_conn(conn, project_id)?;
        Ok(ThreadReport {
            project_id: project_id.to_string(),
            generated_at: time::now_epoch_z(),
            stats: links::link_stats_conn(conn, project_id)?,
            coverage: coverage::coverage_with_chains(conn, project_id, &requirements)?,
            orphans: orphans::orphans_conn(conn, project_id)?,
            gaps: gaps::gaps_conn(conn, project_id)?,
            integrity: integrity::validate_conn(conn, project_id)?,
            requirements,
        })
    })
}

fn orphan_section(out: &mut String, title: &str, entities: &[OrphanEntity]) {
    out.push_str(&format!("### {} ({})\n\n", title, entities.len()));
    if entities.is_empty() {
        out.push_str("None.\n\n");
        return;
    }
    for e in entities {
        if e.label == e.entity_id {
            out.push_str(&format!("- `{}`\n", e.entity_id));
        } else {
            out.push_str(&format!("- `{}` {}\n", e.entity_id, e.label));
        }
    }
    out.push('\n');
}

impl ThreadReport {
    /// Markdown rendering, framed by `banner` when one is given.
    pub fn to_markdown(&self, banner: Option<&str>) -> String {
        let mut out = String::new();
        if let Some(banner) = banner {
            out.push_str(&format!("{}\n\n", banner));
        }
        out.push_str(&format!("# Digital Thread Report: {}\n\n", self.project_id));
        out.push_str(&format!("Generated: {}\n\n", self.generated_at));

        out.push_str("## Links\n\n");
        out.push_str(&format!(
            "{} links ({} auto-linked)\n\n",
            self.stats.total, self.stats.auto_linked
        ));
        if !self.stats.by_endpoint_types.is_empty() {
            let rows: Vec<Vec<String>> = self
                .stats
                .by_endpoint_types
                .iter()
                .map(|(k, v)| vec![k.clone(), v.to_string()])
                .collect();
            out.push_str(&markdown_table(&["Endpoints", "Links"], &rows));
            out.push('\n');
        }

        let c = &self.coverage;
        out.push_str("## Coverage\n\n");
        let rows = vec![
            vec![
                "Requirement -> model".to_string(),
                format!("{:.2}%", c.requirement_coverage),
                format!("{}/{}", c.counts.requirements_modeled, c.counts.requirements_total),
            ],
            vec![
                "Model block -> code".to_string(),
                format!("{:.2}%", c.model_coverage),
                format!("{}/{}", c.counts.blocks_implemented, c.counts.blocks_total),
            ],
            vec![
                "Code -> test".to_string(),
                format!("{:.2}%", c.test_coverage),
                format!("{}/{}", c.counts.code_modules_tested, c.counts.code_modules_total),
            ],
            vec![
                "Control linked".to_string(),
                format!("{:.2}%", c.control_coverage),
                format!("{}/{}", c.counts.controls_linked, c.counts.controls_total),
            ],
            vec![
                "Thread completeness".to_string(),
                format!("{:.2}%", c.overall_thread_completeness),
                format!("{}/{}", c.counts.requirements_complete, c.counts.requirements_total),
            ],
        ];
        out.push_str(&markdown_table(&["Metric", "Coverage", "Count"], &rows));
        out.push('\n');

        if !self.requirements.is_empty() {
            out.push_str("### Requirement chains\n\n");
            let rows: Vec<Vec<String>> = self
                .requirements
                .iter()
                .map(|r| {
                    let path = r
                        .path
                        .as_ref()
                        .map(|p| format!("{} -> {} -> {}", p.model_id, p.code_id, p.test_ids.join(", ")))
                        .unwrap_or_else(|| "-".to_string());
                    vec![
                        r.requirement_id.clone(),
                        r.label.clone(),
                        if r.complete { "complete" } else { "incomplete" }.to_string(),
                        path,
                    ]
                })
                .collect();
            out.push_str(&markdown_table(&["Requirement", "Title", "Status", "Path"], &rows));
            out.push('\n');
        }

        out.push_str("## Orphans\n\n");
        orphan_section(&mut out, "Requirements without model", &self.orphans.requirements_without_model);
        orphan_section(&mut out, "Blocks without code", &self.orphans.blocks_without_code);
        orphan_section(&mut out, "Code without tests", &self.orphans.code_without_tests);
        orphan_section(&mut out, "Controls without links", &self.orphans.controls_without_links);

        out.push_str(&format!("## Gaps ({})\n\n", self.gaps.len()));
        if self.gaps.is_empty() {
            out.push_str("None.\n\n");
        } else {
            let rows: Vec<Vec<String>> = self
                .gaps
                .iter()
                .map(|g| vec![g.gap_type.clone(), g.description.clone(), g.missing_link.clone()])
                .collect();
            out.push_str(&markdown_table(&["Gap", "Description", "Missing"], &rows));
            out.push('\n');
        }

        let i = &self.integrity;
        out.push_str("## Integrity\n\n");
        out.push_str(&format!(
            "Valid: {} ({} links checked; {} errors, {} warnings, {} info)\n\n",
            if i.valid { "yes" } else { "no" },
            i.links_checked,
            i.errors,
            i.warnings,
            i.infos
        ));
        if !i.findings.is_empty() {
            let rows: Vec<Vec<String>> = i
                .findings
                .iter()
                .map(|f| vec![f.severity.as_str().to_string(), f.check.clone(), f.message.clone()])
                .collect();
            out.push_str(&markdown_table(&["Severity", "Check", "Message"], &rows));
            out.push('\n');
        }

        if let Some(banner) = banner {
            out.push_str(&format!("{}\n", banner));
        }
        out
    }
}
