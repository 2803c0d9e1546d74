//! Decision engine benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;
use warden_authz::{
    engine::decision, urn, AuthenticatedUser, AuthzEngine, EngineConfig, Group, MemoryRepository,
    Policy, Statement, User,
};

fn resource(i: usize) -> String {
    format!("urn:ews:example:org1:resource/items/{}", i)
}

fn create_statements(count: usize) -> Vec<Statement> {
    (0..count)
        .map(|i| {
            let pattern = format!("urn:ews:example:org1:resource/items/{}*", i % 50);
            if i % 10 == 9 {
                Statement::deny(&["item:delete"], &[&pattern])
            } else {
                Statement::allow(&["item:*"], &[&pattern])
            }
        })
        .collect()
}

async fn seeded_engine(policy_count: usize) -> AuthzEngine<MemoryRepository> {
    let repo = MemoryRepository::new();
    let user = repo.put_user(User::new("alice", "/")).await.unwrap();
    let group = repo.put_group(Group::new("org1", "team", "/")).await.unwrap();
    repo.add_member(&group.id, &user.id).await.unwrap();

    for (i, statement) in create_statements(policy_count).into_iter().enumerate() {
        let policy = repo
            .put_policy(Policy::new("org1", format!("p{}", i), "/", vec![statement]))
            .await
            .unwrap();
        repo.attach_policy(&group.id, &policy.id).await.unwrap();
    }

    AuthzEngine::with_config(
        Arc::new(repo),
        EngineConfig {
            enable_metrics: false,
        },
    )
}

fn bench_get_authorized_resources(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let user = AuthenticatedUser::user("alice");
    let candidates: Vec<String> = (0..100).map(resource).collect();

    let mut group = c.benchmark_group("get_authorized_resources");

    for policy_count in [10, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::new("policies", policy_count),
            policy_count,
            |b, &count| {
                let engine = rt.block_on(seeded_engine(count));

                b.to_async(&rt).iter(|| async {
                    let allowed = engine
                        .get_authorized_resources(&user, black_box("item:get"), &candidates)
                        .await
                        .unwrap();
                    black_box(allowed);
                });
            },
        );
    }

    group.finish();
}

fn bench_admin_bypass(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = rt.block_on(seeded_engine(0));
    let admin = AuthenticatedUser::admin("admin");
    let candidates: Vec<String> = (0..100).map(resource).collect();

    c.bench_function("admin_bypass", |b| {
        b.to_async(&rt).iter(|| async {
            let allowed = engine
                .get_authorized_resources(&admin, "item:get", black_box(&candidates))
                .await
                .unwrap();
            black_box(allowed);
        });
    });
}

fn bench_decision(c: &mut Criterion) {
    let statements = create_statements(100);
    let target = resource(42);

    c.bench_function("decision_evaluate", |b| {
        b.iter(|| {
            black_box(decision::evaluate(
                &statements,
                black_box("item:get"),
                black_box(&target),
            ))
        });
    });
}

fn bench_urn_matching(c: &mut Criterion) {
    let pattern = "urn:ews:example:org1:resource/items/*";
    let candidate = resource(12345);

    c.bench_function("urn_matches", |b| {
        b.iter(|| black_box(urn::matches(black_box(pattern), black_box(&candidate))));
    });
}

criterion_group!(
    benches,
    bench_get_authorized_resources,
    bench_admin_bypass,
    bench_decision,
    bench_urn_matching
);
criterion_main!(benches);
