//! CLI struct definitions and dispatch for the `dthread` binary.

use crate::core::config::{self, KeywordPolicy, ThreadConfig};
use crate::core::db;
use crate::core::error::ThreadError;
use crate::core::output::render_table;
use crate::core::store::Store;
use crate::thread::integrity::{IntegrityReport, Severity};
use crate::thread::links::{self, LinkFilter};
use crate::thread::trace::{self, TraceNode};
use crate::thread::types::{Link, NewLink};
use crate::thread::{autolink, coverage, gaps, integrity, orphans, report};

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

const MAX_CELL: usize = 60;

#[derive(Parser, Debug)]
#[clap(
    name = "dthread",
    version = env!("CARGO_PKG_VERSION"),
    about = "Digital thread engine: trace requirements through models, code, tests, and compliance controls."
)]
pub struct Cli {
    /// Project whose links are read or written.
    #[clap(long, global = true)]
    pub project_id: Option<String>,
    /// Emit JSON on stdout instead of text.
    #[clap(long, global = true)]
    pub json: bool,
    /// Explicit config file (defaults to `.dthread/config.toml`).
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,
    /// Database path, overriding config and environment.
    #[clap(long, global = true)]
    pub db: Option<PathBuf>,
    /// Raise log verbosity to debug.
    #[clap(long, short = 'v', global = true)]
    pub verbose: bool,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug)]
pub struct EntityArgs {
    /// Entity type, e.g. `doors_requirement` or `code_module`.
    #[clap(long)]
    pub entity_type: String,
    #[clap(long)]
    pub entity_id: String,
    /// Maximum hops from the origin (defaults to config `default_max_depth`).
    #[clap(long)]
    pub max_depth: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the workspace, config, and link table
    Init {
        /// Also create empty external artifact tables (for local experiments)
        #[clap(long)]
        with_external_tables: bool,
    },
    /// Create or re-assert a typed link
    CreateLink {
        #[clap(long)]
        source_type: String,
        #[clap(long)]
        source_id: String,
        #[clap(long)]
        target_type: String,
        #[clap(long)]
        target_id: String,
        #[clap(long)]
        link_type: String,
        #[clap(long, default_value_t = 1.0)]
        confidence: f64,
        #[clap(long)]
        evidence: Option<String>,
    },
    /// Delete a link by id
    DeleteLink {
        #[clap(long)]
        link_id: String,
    },
    /// Show one link
    GetLink {
        #[clap(long)]
        link_id: String,
    },
    /// List links, optionally filtered
    ListLinks {
        #[clap(long)]
        source_type: Option<String>,
        #[clap(long)]
        target_type: Option<String>,
        #[clap(long)]
        link_type: Option<String>,
        /// Match either endpoint id
        #[clap(long)]
        entity_id: Option<String>,
    },
    /// Follow links from an entity toward its targets
    TraceForward(EntityArgs),
    /// Follow links into an entity back toward its sources
    TraceBackward(EntityArgs),
    /// Forward and backward trace from one entity
    FullThread(EntityArgs),
    /// Coverage percentages for the project
    Coverage,
    /// Entities missing their expected links
    Orphans,
    /// Broken single-hop chains
    Gaps,
    /// Infer links from naming conventions
    AutoLink,
    /// Infer model-to-control links from keywords
    AutoLinkControls {
        /// Override the configured keyword policy
        #[clap(long, value_enum)]
        keyword_policy: Option<KeywordPolicy>,
    },
    /// Full thread report (Markdown, or JSON with --json)
    Report {
        /// Write the report to a file instead of stdout
        #[clap(long)]
        output: Option<PathBuf>,
    },
    /// Integrity checks; exits non-zero when the thread is invalid
    Validate,
}

struct Ctx {
    config: ThreadConfig,
    root: PathBuf,
    json: bool,
    project_id: Option<String>,
}

impl Ctx {
    fn project(&self) -> Result<&str, ThreadError> {
        self.project_id
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ThreadError::Validation("--project-id is required".to_string()))
    }

    fn store(&self) -> Result<Store, ThreadError> {
        Store::from_config(&self.config)
    }

    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<(), ThreadError> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            print!("{}", text());
        }
        Ok(())
    }
}

/// Banner goes to stderr under `--json` so stdout stays parseable.
fn print_banner(banner: &str, json: bool) {
    if json {
        eprintln!("{}", banner);
    } else {
        println!("{}", banner.bold());
    }
}

pub fn dispatch(cli: Cli) -> Result<(), ThreadError> {
    let cwd = std::env::current_dir()?;
    let root = config::find_workspace_root(&cwd);
    let mut cfg = ThreadConfig::load(&root, cli.config.as_deref())?;
    if let Some(db) = cli.db {
        cfg.db_path = if db.is_relative() { cwd.join(db) } else { db };
    }
    tracing::debug!(db = %cfg.db_path.display(), root = %root.display(), "resolved configuration");

    let ctx = Ctx {
        config: cfg,
        root,
        json: cli.json,
        project_id: cli.project_id,
    };

    print_banner(&ctx.config.banner, ctx.json);
    let result = run_command(&ctx, cli.command);
    print_banner(&ctx.config.banner, ctx.json);
    result
}

fn run_command(ctx: &Ctx, command: Command) -> Result<(), ThreadError> {
    match command {
        Command::Init {
            with_external_tables,
        } => run_init(ctx, with_external_tables),
        Command::CreateLink {
            source_type,
            source_id,
            target_type,
            target_id,
            link_type,
            confidence,
            evidence,
        } => {
            let project_id = ctx.project()?;
            let store = ctx.store()?;
            let new = NewLink {
                project_id,
                source_type: &source_type,
                source_id: &source_id,
                target_type: &target_type,
                target_id: &target_id,
                link_type: &link_type,
                evidence: evidence.as_deref(),
                confidence,
                actor: &ctx.config.actor,
            };
            let id = links::create_link(&store, &new)?;
            ctx.emit(&serde_json::json!({ "link_id": id }), || {
                format!("{} {}\n", "created".green(), id)
            })
        }
        Command::DeleteLink { link_id } => {
            let project_id = ctx.project()?;
            let store = ctx.store()?;
            let deleted = links::delete_link(&store, project_id, &link_id, &ctx.config.actor)?;
            ctx.emit(
                &serde_json::json!({ "link_id": link_id, "deleted": deleted }),
                || {
                    if deleted {
                        format!("{} {}\n", "deleted".green(), link_id)
                    } else {
                        format!("{} no link {} in project {}\n", "▸".yellow(), link_id, project_id)
                    }
                },
            )
        }
        Command::GetLink { link_id } => {
            let project_id = ctx.project()?;
            let store = ctx.store()?;
            let link = links::get_link(&store, project_id, &link_id)?
                .ok_or_else(|| ThreadError::NotFound(format!("link {}", link_id)))?;
            ctx.emit(&link, || links_table(std::slice::from_ref(&link)))
        }
        Command::ListLinks {
            source_type,
            target_type,
            link_type,
            entity_id,
        } => {
            let project_id = ctx.project()?;
            let store = ctx.store()?;
            let filter = LinkFilter {
                source_type,
                target_type,
                link_type,
                entity_id,
            };
            let found = links::list_links(&store, project_id, &filter)?;
            ctx.emit(&found, || links_table(&found))
        }
        Command::TraceForward(args) => {
            let project_id = ctx.project()?;
            let store = ctx.store()?;
            let depth = args.max_depth.unwrap_or(ctx.config.default_max_depth);
            let tree =
                trace::trace_forward(&store, project_id, &args.entity_type, &args.entity_id, depth)?;
            ctx.emit(&tree, || {
                let mut out = format!(
                    "{}:{} ({})  {} nodes, {} entities\n",
                    tree.origin.entity_type,
                    tree.origin.entity_id,
                    tree.origin.label,
                    tree.node_count,
                    tree.entity_count
                );
                render_tree(&mut out, &tree.children, 1, "-->");
                out
            })
        }
        Command::TraceBackward(args) => {
            let project_id = ctx.project()?;
            let store = ctx.store()?;
            let depth = args.max_depth.unwrap_or(ctx.config.default_max_depth);
            let tree =
                trace::trace_backward(&store, project_id, &args.entity_type, &args.entity_id, depth)?;
            ctx.emit(&tree, || {
                let mut out = format!(
                    "{}:{} ({})  {} nodes, {} entities\n",
                    tree.origin.entity_type,
                    tree.origin.entity_id,
                    tree.origin.label,
                    tree.node_count,
                    tree.entity_count
                );
                render_tree(&mut out, &tree.children, 1, "<--");
                out
            })
        }
        Command::FullThread(args) => {
            let project_id = ctx.project()?;
            let store = ctx.store()?;
            let depth = args.max_depth.unwrap_or(ctx.config.default_max_depth);
            let thread =
                trace::full_thread(&store, project_id, &args.entity_type, &args.entity_id, depth)?;
            ctx.emit(&thread, || {
                let mut out = format!(
                    "{}:{} ({})\n",
                    thread.origin.entity_type, thread.origin.entity_id, thread.origin.label
                );
                out.push_str(&format!("{}\n", "upstream".bold()));
                render_tree(&mut out, &thread.backward, 1, "<--");
                out.push_str(&format!("{}\n", "downstream".bold()));
                render_tree(&mut out, &thread.forward, 1, "-->");
                out
            })
        }
        Command::Coverage => {
            let project_id = ctx.project()?;
            let store = ctx.store()?;
            let cov = coverage::compute_coverage(&store, project_id)?;
            ctx.emit(&cov, || {
                let c = &cov.counts;
                let rows = vec![
                    vec![
                        "requirement_coverage".to_string(),
                        format!("{:.2}", cov.requirement_coverage),
                        format!("{}/{}", c.requirements_modeled, c.requirements_total),
                    ],
                    vec![
                        "model_coverage".to_string(),
                        format!("{:.2}", cov.model_coverage),
                        format!("{}/{}", c.blocks_implemented, c.blocks_total),
                    ],
                    vec![
                        "test_coverage".to_string(),
                        format!("{:.2}", cov.test_coverage),
                        format!("{}/{}", c.code_modules_tested, c.code_modules_total),
                    ],
                    vec![
                        "control_coverage".to_string(),
                        format!("{:.2}", cov.control_coverage),
                        format!("{}/{}", c.controls_linked, c.controls_total),
                    ],
                    vec![
                        "overall_thread_completeness".to_string(),
                        format!("{:.2}", cov.overall_thread_completeness),
                        format!("{}/{}", c.requirements_complete, c.requirements_total),
                    ],
                ];
                render_table(&["METRIC", "PERCENT", "COUNT"], &rows, MAX_CELL)
            })
        }
        Command::Orphans => {
            let project_id = ctx.project()?;
            let store = ctx.store()?;
            let found = orphans::find_orphans(&store, project_id)?;
            ctx.emit(&found, || {
                let mut rows = Vec::new();
                for (category, entities) in [
                    ("requirements_without_model", &found.requirements_without_model),
                    ("blocks_without_code", &found.blocks_without_code),
                    ("code_without_tests", &found.code_without_tests),
                    ("controls_without_links", &found.controls_without_links),
                ] {
                    for e in entities {
                        rows.push(vec![category.to_string(), e.entity_id.clone(), e.label.clone()]);
                    }
                }
                if rows.is_empty() {
                    return format!("{} no orphans\n", "✓".green());
                }
                render_table(&["CATEGORY", "ID", "LABEL"], &rows, MAX_CELL)
            })
        }
        Command::Gaps => {
            let project_id = ctx.project()?;
            let store = ctx.store()?;
            let found = gaps::detect_gaps(&store, project_id)?;
            ctx.emit(&found, || {
                if found.is_empty() {
                    return format!("{} no gaps\n", "✓".green());
                }
                let rows: Vec<Vec<String>> = found
                    .iter()
                    .map(|g| vec![g.gap_type.clone(), g.missing_link.clone(), g.description.clone()])
                    .collect();
                render_table(&["GAP", "MISSING", "DESCRIPTION"], &rows, MAX_CELL)
            })
        }
        Command::AutoLink => {
            let project_id = ctx.project()?;
            let store = ctx.store()?;
            let summary = autolink::auto_link_by_name(&store, project_id, &ctx.config.actor)?;
            ctx.emit(&summary, || autolink_text(&summary))
        }
        Command::AutoLinkControls { keyword_policy } => {
            let project_id = ctx.project()?;
            let store = ctx.store()?;
            let policy = keyword_policy.unwrap_or(ctx.config.keyword_policy);
            let summary =
                autolink::auto_link_controls(&store, project_id, policy, &ctx.config.actor)?;
            ctx.emit(&summary, || autolink_text(&summary))
        }
        Command::Report { output } => {
            let project_id = ctx.project()?;
            let store = ctx.store()?;
            let rep = report::generate_report(&store, project_id)?;
            // On stdout the dispatcher already frames the output with the banner.
            let framing = output.as_ref().map(|_| ctx.config.banner.as_str());
            let rendered = if ctx.json {
                serde_json::to_string_pretty(&rep)?
            } else {
                rep.to_markdown(framing)
            };
            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        if !parent.as_os_str().is_empty() {
                            fs::create_dir_all(parent)?;
                        }
                    }
                    fs::write(&path, rendered)?;
                    tracing::info!(path = %path.display(), "report written");
                    if !ctx.json {
                        println!("{} {}", "wrote".green(), path.display());
                    }
                }
                None => println!("{}", rendered),
            }
            Ok(())
        }
        Command::Validate => {
            let project_id = ctx.project()?;
            let store = ctx.store()?;
            let rep = integrity::validate_integrity(&store, project_id)?;
            ctx.emit(&rep, || integrity_text(&rep))?;
            if rep.valid {
                Ok(())
            } else {
                Err(ThreadError::Validation(format!(
                    "thread for project '{}' is invalid ({} errors, {} cycle findings)",
                    project_id,
                    rep.errors,
                    rep.by_check(integrity::CHECK_CYCLE).len()
                )))
            }
        }
    }
}

fn run_init(ctx: &Ctx, with_external_tables: bool) -> Result<(), ThreadError> {
    let dir = ctx.root.join(config::WORKSPACE_DIR);
    fs::create_dir_all(&dir)?;
    let config_path = dir.join(config::CONFIG_FILE);
    let wrote_config = if config_path.exists() {
        false
    } else {
        let body = toml::to_string_pretty(&ThreadConfig::default())
            .map_err(|e| ThreadError::Config(e.to_string()))?;
        fs::write(&config_path, body)?;
        true
    };

    let store = ctx.store()?;
    if with_external_tables {
        store.with_write(db::apply_external_schema)?;
    }

    ctx.emit(
        &serde_json::json!({
            "root": ctx.root,
            "db_path": store.db_path,
            "config": config_path,
            "config_created": wrote_config,
            "external_tables": with_external_tables,
        }),
        || {
            let mut out = String::new();
            out.push_str(&format!("  {} {}\n", "●".bright_green(), store.db_path.display()));
            let marker = if wrote_config { "●".bright_green() } else { "▸".bright_yellow() };
            out.push_str(&format!("  {} {}\n", marker, config_path.display()));
            if with_external_tables {
                out.push_str(&format!("  {} external artifact tables\n", "●".bright_green()));
            }
            out
        },
    )
}

fn links_table(found: &[Link]) -> String {
    if found.is_empty() {
        return "no links\n".to_string();
    }
    let rows: Vec<Vec<String>> = found
        .iter()
        .map(|l| {
            vec![
                l.id.clone(),
                format!("{}:{}", l.source_type, l.source_id),
                l.link_type.clone(),
                format!("{}:{}", l.target_type, l.target_id),
                format!("{:.2}", l.confidence),
                l.evidence.clone().unwrap_or_default(),
            ]
        })
        .collect();
    render_table(
        &["ID", "SOURCE", "TYPE", "TARGET", "CONF", "EVIDENCE"],
        &rows,
        MAX_CELL,
    )
}

fn render_tree(out: &mut String, nodes: &[TraceNode], indent: usize, arrow: &str) {
    // Explicit stack keeps deep threads off the call stack.
    let mut stack: Vec<(&TraceNode, usize)> = nodes.iter().rev().map(|n| (n, indent)).collect();
    while let Some((node, level)) = stack.pop() {
        out.push_str(&format!(
            "{}{} [{} {:.2}] {}:{} ({})\n",
            "  ".repeat(level),
            arrow,
            node.link_type,
            node.confidence,
            node.entity_type,
            node.entity_id,
            node.label
        ));
        stack.extend(node.children.iter().rev().map(|c| (c, level + 1)));
    }
}

fn autolink_text(summary: &autolink::AutoLinkSummary) -> String {
    let mut out = format!(
        "{} {}: {} created, {} skipped\n",
        "●".bright_green(),
        summary.strategy,
        summary.created,
        summary.skipped
    );
    for l in &summary.links {
        out.push_str(&format!(
            "    {}:{} --[{}]--> {}:{}  ({})\n",
            l.source_type, l.source_id, l.link_type, l.target_type, l.target_id, l.matched_on
        ));
    }
    out
}

fn severity_marker(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Error => "✗ error".red().bold(),
        Severity::Warning => "⚠ warning".yellow(),
        Severity::Info => "ℹ info".blue(),
    }
}

fn integrity_text(rep: &IntegrityReport) -> String {
    let mut out = String::new();
    let status = if rep.valid {
        "✓ valid".green().bold()
    } else {
        "✗ invalid".red().bold()
    };
    out.push_str(&format!(
        "{} ({} links checked: {} errors, {} warnings, {} info)\n",
        status, rep.links_checked, rep.errors, rep.warnings, rep.infos
    ));
    for f in &rep.findings {
        out.push_str(&format!("  {} [{}] {}\n", severity_marker(f.severity), f.check, f.message));
    }
    out
}
