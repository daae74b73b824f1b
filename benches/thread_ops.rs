use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use dthread::core::store::Store;
use dthread::thread::integrity::{self, NodeKey};
use dthread::thread::{coverage, trace};
use rusqlite::params;
use std::time::Duration;
use tempfile::TempDir;

const PROJECT: &str = "BENCH";

/// `chains` requirement -> model -> code -> test chains, every code module
/// also mapped to a shared control, plus a fan-in of refinements onto the
/// first model element.
fn seed(chains: usize) -> (TempDir, Store) {
    let tmp = TempDir::new().unwrap();
    let store = Store::open_unaudited(&tmp.path().join("bench.db")).unwrap();
    store
        .with_write(|conn| {
            let mut stmt = conn.prepare(
                "INSERT INTO digital_thread_links(
                     id, project_id, source_type, source_id, target_type, target_id,
                     link_type, confidence, evidence, created_by, created_at)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, 1.0, NULL, 'bench', '1700000000Z')",
            )?;
            let mut n = 0;
            let mut add = |st: &str, sid: &str, tt: &str, tid: &str, lt: &str| {
                n += 1;
                stmt.execute(params![format!("DL_{n:08}"), PROJECT, st, sid, tt, tid, lt])
                    .map(|_| ())
            };
            for i in 0..chains {
                let (r, m, c, t) = (
                    format!("R{i}"),
                    format!("M{i}"),
                    format!("src/mod_{i}.rs"),
                    format!("tests/mod_{i}.rs"),
                );
                add("doors_requirement", &r, "sysml_element", &m, "satisfies")?;
                add("sysml_element", &m, "code_module", &c, "implements")?;
                add("code_module", &c, "test_file", &t, "verifies")?;
                add("code_module", &c, "nist_control", "AC-2", "maps_to")?;
                if i > 0 {
                    add("sysml_element", &m, "sysml_element", "M0", "refines")?;
                }
            }
            Ok(())
        })
        .unwrap();
    (tmp, store)
}

fn bench_trace(c: &mut Criterion) {
    let mut group = c.benchmark_group("trace");
    group.measurement_time(Duration::from_secs(5));

    for chains in [50usize, 500] {
        let (_tmp, store) = seed(chains);
        group.bench_with_input(BenchmarkId::new("forward_from_requirement", chains), &chains, |b, _| {
            b.iter(|| {
                black_box(trace::trace_forward(&store, PROJECT, "doors_requirement", "R1", 10).unwrap())
            });
        });
        group.bench_with_input(BenchmarkId::new("backward_fan_in", chains), &chains, |b, _| {
            b.iter(|| black_box(trace::trace_backward(&store, PROJECT, "sysml_element", "M0", 10).unwrap()));
        });
    }

    group.finish();
}

fn bench_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("analysis");
    group.measurement_time(Duration::from_secs(5));

    let (_tmp, store) = seed(500);
    group.bench_function("validate_integrity_500", |b| {
        b.iter(|| black_box(integrity::validate_integrity(&store, PROJECT).unwrap()));
    });
    group.bench_function("requirement_chains_500", |b| {
        b.iter(|| black_box(coverage::requirement_chains(&store, PROJECT).unwrap()));
    });

    group.finish();
}

fn bench_cycle_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("cycle_edges");

    for len in [1_000usize, 100_000] {
        let ids: Vec<String> = (0..len).map(|i| i.to_string()).collect();
        let mut edges: Vec<(NodeKey<'_>, NodeKey<'_>)> = ids
            .windows(2)
            .map(|w| (("sysml_element", w[0].as_str()), ("sysml_element", w[1].as_str())))
            .collect();
        edges.push((("sysml_element", ids[len - 1].as_str()), ("sysml_element", ids[0].as_str())));

        group.bench_with_input(BenchmarkId::new("ring", len), &edges, |b, edges| {
            b.iter(|| black_box(integrity::cycle_edges(edges)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_trace, bench_analysis, bench_cycle_detection);
criterion_main!(benches);
