use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use desk_sim::clock::EventQueue;
use desk_sim::events::{Arrival, Event};

const EVENT_COUNTS: &[usize] = &[128, 1_024, 8_192, 65_536];

fn build_events(count: usize) -> Vec<(f64, Event)> {
    (0..count)
        .map(|idx| {
            // interleave so the heap has to reorder
            let time = ((idx * 7_919) % count) as f64 * 0.5;
            let event = if idx % 2 == 0 {
                Event::ClientArrival(Arrival::at(time))
            } else {
                Event::ChatComplete {
                    counsellor: idx % 8,
                    client: idx,
                }
            };
            (time, event)
        })
        .collect()
}

fn bench_engine_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_queue");

    for &count in EVENT_COUNTS {
        group.bench_with_input(BenchmarkId::new("push_pop", count), &count, |b, &count| {
            b.iter_batched(
                || build_events(count),
                |events| {
                    let mut queue = EventQueue::new(0.0, f64::MAX);
                    for (time, event) in events {
                        queue.schedule_at(time, event).expect("future event");
                    }
                    while let Some(event) = queue.pop() {
                        black_box(event);
                    }
                },
                BatchSize::SmallInput,
            );
        });
        group.bench_with_input(
            BenchmarkId::new("push_cancel_pop", count),
            &count,
            |b, &count| {
                b.iter_batched(
                    || build_events(count),
                    |events| {
                        let mut queue = EventQueue::new(0.0, f64::MAX);
                        for (idx, (time, event)) in events.into_iter().enumerate() {
                            let id = queue.schedule_at(time, event).expect("future event");
                            // reneges are usually cancelled by a pickup
                            if idx % 3 == 0 {
                                queue.cancel(id);
                            }
                        }
                        while let Some(event) = queue.pop() {
                            black_box(event);
                        }
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_engine_queue);
criterion_main!(benches);
