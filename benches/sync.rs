//! Benchmarks for the per-snapshot and per-frame hot paths
//!
//! Run with: cargo bench --bench sync

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hush_sync::game::constants::room::MAX_PLAYERS;
use hush_sync::game::state::{AiState, PlayerEntry, Room, RoomPatch, RoomStatus};
use hush_sync::game::systems::ai::AiEngine;
use hush_sync::game::systems::capture::{apply_caught, living_pool};
use hush_sync::game::world::LocalWorld;
use hush_sync::net::protocol::{self, PeerMessage};
use hush_sync::sync::controller::evaluate_host_rules;
use hush_sync::util::vec3::Vec3;
use rand::Rng;

/// An in-game room with `count` players, every other one caught
fn create_room_with_players(count: usize) -> Room {
    let mut rng = rand::thread_rng();
    let mut room = Room::new(
        "bench".into(),
        "Bench".into(),
        PlayerEntry::new("p0", "P0"),
        Vec3::new(rng.gen_range(-9.0..9.0), 1.0, rng.gen_range(-9.0..9.0)),
    );
    for i in 1..count {
        room.players.push(PlayerEntry::new(format!("p{}", i), format!("P{}", i)));
    }
    for i in (1..count).step_by(2) {
        room.caught_players.push(format!("p{}", i));
    }
    room.status = RoomStatus::InGame;
    room.threat_level = 5;
    room.last_noise_maker = Some(format!("p{}", count - 1));
    room
}

fn bench_host_rules(c: &mut Criterion) {
    let mut group = c.benchmark_group("host_rules");

    for count in 1..=MAX_PLAYERS {
        let room = create_room_with_players(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("evaluate", count), &room, |b, room| {
            b.iter(|| black_box(evaluate_host_rules(black_box(room))))
        });
    }
    group.finish();
}

fn bench_patch_apply(c: &mut Criterion) {
    let room = create_room_with_players(MAX_PLAYERS);
    let patch = RoomPatch::start_hunting("p0");

    c.bench_function("patch_apply_start_hunting", |b| {
        b.iter(|| {
            let mut room = room.clone();
            black_box(patch.apply(&mut room))
        })
    });
}

fn bench_ai_step(c: &mut Criterion) {
    let mut ai = AiEngine::new();
    ai.state = AiState::Hunting;
    ai.target_uid = Some("p0".into());
    let far = Vec3::new(9.0, 1.0, 9.0);

    c.bench_function("ai_step_pursuit", |b| {
        b.iter(|| {
            ai.position = Vec3::new(-9.0, 1.25, -9.0);
            black_box(ai.step(black_box(1.0 / 60.0), Some(far)))
        })
    });
}

fn bench_snapshot_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_derivation");

    for count in 1..=MAX_PLAYERS {
        let room = create_room_with_players(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("apply", count), &room, |b, room| {
            b.iter(|| {
                let mut world = LocalWorld::new("p0".into(), &room.players, room.key_position);
                world.ai.reconcile(&room.ai);
                let hidden = apply_caught(&mut world, &room.caught_players);
                let departed = world.sync_roster(&room.players);
                black_box((hidden, departed, living_pool(&world)))
            })
        });
    }
    group.finish();
}

fn bench_peer_codec(c: &mut Criterion) {
    let message = PeerMessage::position(Vec3::new(3.5, 1.0, -2.25), 1.2);
    let text = protocol::encode(&message).unwrap_or_default();

    c.bench_function("peer_encode_position", |b| {
        b.iter(|| black_box(protocol::encode(black_box(&message))))
    });
    c.bench_function("peer_decode_position", |b| {
        b.iter(|| black_box(protocol::decode(black_box(&text))))
    });
}

criterion_group!(
    benches,
    bench_host_rules,
    bench_patch_apply,
    bench_ai_step,
    bench_snapshot_derivation,
    bench_peer_codec,
);
criterion_main!(benches);
