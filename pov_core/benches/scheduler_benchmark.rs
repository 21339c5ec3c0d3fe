use criterion::{criterion_group, criterion_main, Criterion};
use pov_common::time::{Duration, Instant};
use pov_core::{RevolutionState, SlotScheduler};

fn steady_state() -> RevolutionState {
    RevolutionState {
        last_pulse_t: Instant::from_micros(1_000_000),
        last_raw_interval: Duration::from_micros(20_000),
        smoothed_interval: Duration::from_micros(20_000),
        rev_count: 30,
        rotating: true,
        warmup_done: true,
        slot_width_units: 15,
    }
}

fn next_slot(c: &mut Criterion) {
    let state = steady_state();
    let mut scheduler = SlotScheduler::new();
    let mut now = Instant::from_micros(1_000_000);

    c.bench_function("scheduler next()", |b| {
        b.iter(|| {
            now = now + Duration::from_micros(833);
            scheduler.next(&state, now)
        })
    });
}

criterion_group!(benches, next_slot);
criterion_main!(benches);
