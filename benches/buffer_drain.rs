use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use move_sync::core::quantize::Route;
use move_sync::core::vec3::Vec3;
use move_sync::game::buffer::{drain, DrainOutcome};
use move_sync::game::collision::{Aabb, Terrain};
use move_sync::game::config::{MovementConfig, SyncConfig};
use move_sync::game::moves::Move;
use move_sync::game::state::{ActorId, MoveState, MovementActor};
use move_sync::FIXED_DELTA;

/// Queue `count` walking moves along +z, each arriving in a burst of 0..3.
fn jittered_stream(seed: u64, count: usize) -> Vec<Vec<Move>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bursts = Vec::new();
    let mut z = 0.0;
    let mut sent = 0;
    while sent < count {
        let n = rng.gen_range(0..3).min(count - sent);
        let burst = (0..n)
            .map(|_| {
                z += 0.08;
                Move::new(Route(0), MoveState::Walking, Vec3::new(0.0, 0.0, z), 0)
            })
            .collect();
        sent += n;
        bursts.push(burst);
    }
    bursts
}

/// One drain per burst, then drain until the buffer waits. An overflow
/// stands in for the forced reset `step_remote` would issue.
fn run_stream(actor: &mut MovementActor, env: &Terrain, sync: &SyncConfig, bursts: &[Vec<Move>]) {
    for burst in bursts {
        actor.pending.extend(burst.iter().copied());
        if black_box(drain(actor, env, sync, true, FIXED_DELTA)) == DrainOutcome::Overflow {
            actor.pending.clear();
        }
    }
    // a tail below min_move_buffer stays queued
    loop {
        match drain(actor, env, sync, true, FIXED_DELTA) {
            DrainOutcome::Waiting => break,
            DrainOutcome::Overflow => actor.pending.clear(),
            outcome => {
                black_box(outcome);
            }
        }
    }
}

fn bench_drain(c: &mut Criterion) {
    let config = MovementConfig::default();
    let sync = SyncConfig::default();
    let open = Terrain::flat(0.0);
    let walled = Terrain::flat(0.0)
        .with_solid(Aabb::new(Vec3::new(-5.0, 0.0, 4.0), Vec3::new(5.0, 3.0, 5.0)));
    let bursts = jittered_stream(7, 500);

    c.bench_function("drain_jittered_500", |b| {
        b.iter(|| {
            let mut actor = MovementActor::new(ActorId(1), Vec3::ZERO, 0.0, &config);
            run_stream(&mut actor, &open, &sync, black_box(&bursts));
        })
    });

    c.bench_function("drain_jittered_500_walled", |b| {
        b.iter(|| {
            let mut actor = MovementActor::new(ActorId(1), Vec3::ZERO, 0.0, &config);
            run_stream(&mut actor, &walled, &sync, black_box(&bursts));
        })
    });
}

criterion_group!(benches, bench_drain);
criterion_main!(benches);
