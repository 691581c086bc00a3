//! Dispatch loop benchmarks.
//!
//! Measures the per-step cost of the engine's mainloop over trivially
//! yielding tasks, and the enqueue/dequeue path of `Engine::add`.

#![allow(missing_docs)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use statemux::{Engine, RunReason, Task, TaskCx};
use std::sync::Arc;

/// A task that finishes after `steps` dispatches.
fn counting_task(steps: usize) -> Arc<Task> {
    let mut remaining = steps;
    Task::new(move |cx: &TaskCx<'_>, _reason: RunReason| {
        remaining -= 1;
        if remaining == 0 {
            cx.finish();
        }
    })
}

fn bench_mainloop_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("mainloop_drain");
    for task_count in [1usize, 16, 256] {
        group.throughput(Throughput::Elements(task_count as u64 * 8));
        group.bench_with_input(
            BenchmarkId::from_parameter(task_count),
            &task_count,
            |b, &task_count| {
                b.iter_batched(
                    || {
                        let engine = Engine::with_max_duration("bench", 1_000);
                        for _ in 0..task_count {
                            counting_task(8).run_on(&engine);
                        }
                        // A frame-sleeping keeper stops mainloop from
                        // parking once the counting tasks drain.
                        Task::new(|cx: &TaskCx<'_>, _reason: RunReason| cx.yield_frames(1))
                            .run_on(&engine);
                        engine
                    },
                    |engine| engine.mainloop(),
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }
    group.finish();
}

fn bench_add_dedup(c: &mut Criterion) {
    c.bench_function("add_already_queued", |b| {
        let engine = Engine::new("bench-add");
        let task = Task::new(|_cx: &TaskCx<'_>, _reason: RunReason| {});
        task.run_on(&engine);
        b.iter(|| engine.add(task.clone()));
    });
}

criterion_group!(benches, bench_mainloop_drain, bench_add_dedup);
criterion_main!(benches);
