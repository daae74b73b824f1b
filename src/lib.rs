//! dthread: a digital thread engine
//!
//! **dthread keeps a typed, persistent link graph between lifecycle artifacts**:
//! DOORS requirements, SysML model elements, code modules, test files, NIST
//! controls, STIG rules, and compliance artifacts.
//!
//! # Core Principles
//!
//! - **Project-scoped**: every link belongs to exactly one project
//! - **Replace, never merge**: re-asserting a link replaces the stored row
//! - **Degrade, don't fail**: missing external tables and rows fall back to raw ids
//! - **Audited**: every mutation is reported to an audit sink, best effort
//!
//! # Architecture
//!
//! ## Storage
//!
//! Links live in the `digital_thread_links` table of a SQLite database. The
//! requirement, model, control, and rule tables beside it are owned elsewhere
//! and are only ever read.
//!
//! ## Engine
//!
//! - `links`: create, delete, query, and summarize links
//! - `trace`: forward/backward breadth-first traversal into trees
//! - `coverage`: stage-by-stage coverage percentages and full-chain completeness
//! - `orphans` / `gaps`: entities and hops missing their expected links
//! - `integrity`: type validity, dangling references, cycles, duplicates
//! - `autolink`: name and keyword heuristics that propose links
//! - `report`: all of the above as one Markdown or JSON document
//!
//! # Examples
//!
//! ```bash
//! dthread init --with-external-tables
//! dthread --project-id P1 create-link --source-type doors_requirement --source-id R1 \
//!     --target-type sysml_element --target-id M1 --link-type satisfies
//! dthread --project-id P1 trace-forward --entity-type doors_requirement --entity-id R1
//! dthread --project-id P1 validate
//! ```

pub mod cli;
pub mod core;
pub mod thread;

pub use crate::core::error::ThreadError;

/// Resolve configuration and run one parsed invocation.
pub fn run(cli: cli::Cli) -> Result<(), ThreadError> {
    cli::dispatch(cli)
}
