//! Match store throughput: pairing and combat under the collection lock.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use skirmish::game::combat::damage;
use skirmish::{GameAction, MatchStore, Matchmaker, MemoryProfiles, PlayerId};

fn profiles(n: usize) -> Arc<MemoryProfiles> {
    let profiles = MemoryProfiles::new();
    for i in 0..n {
        profiles
            .register(PlayerId::new(format!("p{i}")), format!("player {i}"))
            .unwrap();
    }
    Arc::new(profiles)
}

fn bench_damage(c: &mut Criterion) {
    c.bench_function("damage", |b| {
        b.iter(|| damage(black_box(15), black_box(9)))
    });
}

fn bench_auto_match(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let profiles = profiles(1_000);

    c.bench_function("auto_match_1000_players", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mm = Matchmaker::new(Arc::new(MatchStore::new(profiles.clone())));
                for i in 0..1_000 {
                    mm.auto_match(&PlayerId::new(format!("p{i}"))).await.unwrap();
                }
                black_box(mm.store().match_count().await)
            })
        })
    });
}

fn bench_attack(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let store = MatchStore::new(profiles(2));
    let (p0, p1) = (PlayerId::new("p0"), PlayerId::new("p1"));
    let id = rt.block_on(async {
        let m = store.create_match(&p0).await.unwrap();
        store.join_match(m.id, &p1).await.unwrap();
        m.id
    });

    c.bench_function("attack_then_snapshot", |b| {
        b.iter(|| {
            rt.block_on(async {
                // Health bottoms out quickly; NotPlaying is part of the hot path too.
                let _ = store
                    .process_action(id, GameAction::attack(p0.clone(), p1.clone()))
                    .await;
                black_box(store.get_match(id).await.unwrap().revision)
            })
        })
    });
}

criterion_group!(benches, bench_damage, bench_auto_match, bench_attack);
criterion_main!(benches);
