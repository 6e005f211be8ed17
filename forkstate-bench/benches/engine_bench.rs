//! State machine engine benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use forkstate_core::{ActionRegistry, MachineDefinition, StateMachine, StateMachineEngine};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// Global counter to ensure unique instance IDs across all benchmark iterations
static INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn flat_definition() -> Value {
    serde_json::json!({
        "states": ["idle", "busy", "stopped"],
        "initial": "idle",
        "finals": ["stopped"],
        "transitions": [
            {"from": "idle", "event": "START", "to": "busy"},
            {"from": "busy", "event": "PAUSE", "to": "idle"},
            {"from": ["idle", "busy"], "event": "STOP", "to": "stopped"},
        ]
    })
}

/// Fork into `regions` parallel regions of two states each, then join.
fn fork_join_definition(regions: usize) -> Value {
    let mut states = vec![
        serde_json::json!("idle"),
        serde_json::json!({"id": "fork", "role": "fork"}),
        serde_json::json!("work"),
        serde_json::json!({"id": "join", "role": "join"}),
        serde_json::json!("done"),
    ];
    let mut transitions = vec![
        serde_json::json!({"from": "idle", "event": "GO", "to": "fork"}),
        serde_json::json!({"from": "fork", "to": "work"}),
        serde_json::json!({"from": "work", "to": "join"}),
        serde_json::json!({"from": "join", "to": "done"}),
    ];
    for r in 0..regions {
        states.push(serde_json::json!({
            "id": format!("r{}_busy", r), "parent": "work", "region": format!("r{}", r), "kind": "initial"
        }));
        states.push(serde_json::json!({
            "id": format!("r{}_done", r), "parent": "work", "region": format!("r{}", r), "kind": "end"
        }));
        transitions.push(serde_json::json!({
            "from": format!("r{}_busy", r), "event": format!("FINISH_{}", r), "to": format!("r{}_done", r)
        }));
    }
    serde_json::json!({
        "states": states,
        "initial": "idle",
        "finals": ["done"],
        "transitions": transitions,
    })
}

fn bench_parse_definition(c: &mut Criterion) {
    let mut group = c.benchmark_group("definition_parse");

    let flat = flat_definition();
    group.bench_function("flat", |b| {
        b.iter(|| black_box(MachineDefinition::from_json("flat", &flat).unwrap()))
    });

    for regions in [2, 8] {
        let def = fork_join_definition(regions);
        group.bench_with_input(BenchmarkId::new("fork_join", regions), &def, |b, def| {
            b.iter(|| black_box(MachineDefinition::from_json("fork_join", def).unwrap()))
        });
    }

    group.finish();
}

fn bench_send_event_flat(c: &mut Criterion) {
    let mut group = c.benchmark_group("machine_send_event");

    let def = Arc::new(MachineDefinition::from_json("flat", &flat_definition()).unwrap());
    let mut machine = StateMachine::new(def, &ActionRegistry::new()).unwrap();
    machine.start().unwrap();

    group.throughput(Throughput::Elements(2));
    group.bench_function("flat_cycle", |b| {
        b.iter(|| {
            black_box(machine.send_event("START").unwrap());
            black_box(machine.send_event("PAUSE").unwrap());
        })
    });

    group.throughput(Throughput::Elements(1));
    group.bench_function("unmatched", |b| {
        b.iter(|| black_box(machine.send_event("UNKNOWN").unwrap()))
    });

    group.finish();
}

fn bench_fork_join_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("machine_fork_join");

    for regions in [2, 8] {
        let def = Arc::new(
            MachineDefinition::from_json("fork_join", &fork_join_definition(regions)).unwrap(),
        );
        let events: Vec<String> = (0..regions).map(|r| format!("FINISH_{}", r)).collect();

        group.throughput(Throughput::Elements(regions as u64 + 1));
        group.bench_with_input(BenchmarkId::new("regions", regions), &events, |b, events| {
            b.iter(|| {
                let mut machine = StateMachine::new(Arc::clone(&def), &ActionRegistry::new()).unwrap();
                machine.start().unwrap();
                machine.send_event("GO").unwrap();
                for event in events {
                    machine.send_event(event).unwrap();
                }
                black_box(machine.is_completed())
            })
        });
    }

    group.finish();
}

fn bench_engine_instances(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_instances");

    let engine = StateMachineEngine::new();
    engine.put_machine("flat", &flat_definition()).unwrap();

    group.throughput(Throughput::Elements(1));
    group.bench_function("create", |b| {
        b.iter(|| {
            let id = INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed);
            black_box(
                engine
                    .create_instance(Some(format!("inst-{}", id).as_str()), "flat")
                    .unwrap(),
            )
        });
    });

    // Pre-create started instances
    for i in 0..1000 {
        let id = format!("event-inst-{}", i);
        engine.create_instance(Some(id.as_str()), "flat").unwrap();
        engine.start_instance(&id).unwrap();
    }

    group.bench_function("send_event", |b| {
        let mut id = 0usize;
        let mut flip = false;
        b.iter(|| {
            id = (id + 1) % 1000;
            if id == 0 {
                flip = !flip;
            }
            let event = if flip { "PAUSE" } else { "START" };
            black_box(engine.send_event(&format!("event-inst-{}", id), event).unwrap())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_parse_definition,
    bench_send_event_flat,
    bench_fork_join_cycle,
    bench_engine_instances,
);

criterion_main!(benches);
