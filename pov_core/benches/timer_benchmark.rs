use criterion::{criterion_group, criterion_main, Criterion};
use pov_common::config::RotorConfig;
use pov_common::time::Instant;
use pov_core::RevolutionTimer;

fn add_pulse_steady_state(c: &mut Criterion) {
    let timer = RevolutionTimer::new(RotorConfig::default());
    let mut t_us: u64 = 0;
    for _ in 0..30 {
        timer.add_pulse(Instant::from_micros(t_us));
        t_us += 20_000;
    }

    c.bench_function("add_pulse steady 20ms interval", |b| {
        b.iter(|| {
            t_us += 20_000;
            timer.add_pulse(Instant::from_micros(t_us));
        })
    });
}

fn snapshot_under_contention(c: &mut Criterion) {
    let timer = RevolutionTimer::new(RotorConfig::default());
    timer.add_pulse(Instant::from_micros(0));
    timer.add_pulse(Instant::from_micros(20_000));

    c.bench_function("snapshot", |b| {
        b.iter(|| timer.snapshot())
    });
}

criterion_group!(benches, add_pulse_steady_state, snapshot_under_contention);
criterion_main!(benches);
