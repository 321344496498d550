//! Sequence player benchmarks: per-tick sweep and table sorting.
//!
//! The sweep runs once per main cycle, so it must stay well inside the
//! 1 ms period even with a full table.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use acs_common::consts::{MAX_ENDPOINTS, MAX_EVENTS};
use acs_common::sequence::{Mode, SequenceEvent};
use acs_control_unit::sequence::SequencePlayer;
use acs_control_unit::sequence::player::sort_events;

/// `n` events spread over endpoints, 10 ms apart, in reverse order.
fn timeline(n: usize) -> Vec<SequenceEvent> {
    (0..n)
        .rev()
        .map(|i| SequenceEvent {
            time_ms: (i as u32) * 10,
            endpoint_id: (i % MAX_ENDPOINTS) as u8 + 1,
            position: (i as i32) * 100,
            velocity: 1000,
            accel: 500,
            mode: if i % 4 == 0 { Mode::Velocity } else { Mode::Position },
        })
        .collect()
}

fn bench_advance(c: &mut Criterion) {
    let mut group = c.benchmark_group("player_advance");

    for n in [16, 128, MAX_EVENTS] {
        let mut player = SequencePlayer::new();
        player.load(&timeline(n));
        let loop_ms = player.loop_length_ms();

        group.bench_with_input(BenchmarkId::new("events", n), &n, |b, _| {
            let mut now_ms = 0u32;
            b.iter(|| {
                now_ms = now_ms.wrapping_add(1) % (loop_ms * 2);
                let handed = player.advance(black_box(now_ms), |ev| {
                    black_box(ev);
                });
                black_box(handed);
            });
        });
    }

    group.finish();
}

fn bench_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort_events");

    for n in [16, 128, MAX_EVENTS] {
        let reversed = timeline(n);
        group.bench_with_input(BenchmarkId::new("reversed", n), &n, |b, _| {
            b.iter(|| {
                let mut events = reversed.clone();
                sort_events(black_box(&mut events));
                black_box(events);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_advance, bench_sort);
criterion_main!(benches);
