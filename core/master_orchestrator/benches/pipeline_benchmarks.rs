//! Benchmarks the two pure, synchronous C2/C3 stages — the only parts of
//! the pipeline that don't depend on a collaborator round-trip and so are
//! worth measuring in isolation. End-to-end latency is dominated by the LLM
//! and action-exec calls, which criterion can't usefully benchmark without
//! turning this into an integration test.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use master_orchestrator::planner;
use master_orchestrator::safety::{Policy, Validator};

const PLAN_JSON: &str = r#"{
    "intent": "open firefox and search the web",
    "actions": [
        {"type": "system_action", "tool": "open_app", "arguments": {"name": "firefox"}},
        {"type": "query_action", "tool": "search_web", "arguments": {"query": "rust async"}}
    ],
    "requires_confirmation": false,
    "estimated_duration_s": 3
}"#;

const FENCED_PLAN: &str = "Sure, here's the plan:\n```json\n";

fn bench_parse_bare(c: &mut Criterion) {
    c.bench_function("planner::parse bare json", |b| {
        b.iter(|| planner::parse(black_box(PLAN_JSON)));
    });
}

fn bench_parse_fenced(c: &mut Criterion) {
    let text = format!("{FENCED_PLAN}{PLAN_JSON}\n```");
    c.bench_function("planner::parse fenced json", |b| {
        b.iter(|| planner::parse(black_box(&text)));
    });
}

fn bench_validate(c: &mut Criterion) {
    let validator = Validator::new(
        Policy::default_policy(),
        vec!["open_app".to_string(), "search_web".to_string()],
        true,
        5,
    );
    let plan = planner::parse(PLAN_JSON);

    c.bench_function("safety::Validator::validate", |b| {
        b.iter(|| validator.validate(black_box(&plan)));
    });
}

criterion_group!(benches, bench_parse_bare, bench_parse_fenced, bench_validate);
criterion_main!(benches);
