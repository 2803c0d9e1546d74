//! Decision engine tests
//!
//! Covers the full pipeline over the in-memory repository:
//! validation → admin bypass → user → groups → policies → per-candidate decision

use async_trait::async_trait;
use proptest::prelude::*;
use std::sync::Arc;
use warden_authz::{
    error::{AuthzError, Result},
    model::{Group, GroupId, Policy, ProxyResource, Statement, User},
    AuthenticatedUser, AuthzEngine, MemoryRepository, Repository,
};

const ORG: &str = "org1";

fn urn(path: &str) -> String {
    format!("urn:ews:example:{}:resource/{}", ORG, path)
}

fn candidates(paths: &[&str]) -> Vec<String> {
    paths.iter().map(|p| urn(p)).collect()
}

/// Repository with one user `alice` in one group carrying the given policies
async fn repo_with_policies(policies: Vec<Vec<Statement>>) -> MemoryRepository {
    let repo = MemoryRepository::new();
    let user = repo.put_user(User::new("alice", "/")).await.unwrap();
    let group = repo.put_group(Group::new(ORG, "team", "/")).await.unwrap();
    repo.add_member(&group.id, &user.id).await.unwrap();

    for (i, statements) in policies.into_iter().enumerate() {
        let policy = repo
            .put_policy(Policy::new(ORG, format!("policy-{}", i), "/", statements))
            .await
            .unwrap();
        repo.attach_policy(&group.id, &policy.id).await.unwrap();
    }

    repo
}

fn alice() -> AuthenticatedUser {
    AuthenticatedUser::user("alice")
}

// ============================================================================
// ADMIN BYPASS
// ============================================================================

#[tokio::test]
async fn test_admin_receives_all_candidates_in_order() {
    let engine = AuthzEngine::new(Arc::new(MemoryRepository::new()));
    let input = candidates(&["b", "a", "c/d"]);

    let allowed = engine
        .get_authorized_resources(&AuthenticatedUser::admin("root"), "item:get", &input)
        .await
        .unwrap();

    assert_eq!(allowed, input);
}

#[tokio::test]
async fn test_admin_request_is_still_validated() {
    let engine = AuthzEngine::new(Arc::new(MemoryRepository::new()));

    let err = engine
        .get_authorized_resources(
            &AuthenticatedUser::admin("root"),
            "item:get",
            &[urn("items/*")],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AuthzError::InvalidParameter(_)));
}

proptest! {
    #[test]
    fn prop_admin_bypass_returns_input_unchanged(paths in prop::collection::vec("[a-z0-9]{1,8}(/[a-z0-9]{1,8}){0,3}", 0..16)) {
        let input: Vec<String> = paths.iter().map(|p| urn(p)).collect();

        let allowed = tokio_test::block_on(async {
            let engine = AuthzEngine::new(Arc::new(MemoryRepository::new()));
            engine
                .get_authorized_resources(&AuthenticatedUser::admin("root"), "item:get", &input)
                .await
                .unwrap()
        });

        prop_assert_eq!(allowed, input);
    }
}

// ============================================================================
// DEFAULT DENY
// ============================================================================

#[tokio::test]
async fn test_unknown_identity_gets_empty_result() {
    let engine = AuthzEngine::new(Arc::new(MemoryRepository::new()));

    let allowed = engine
        .get_authorized_resources(&AuthenticatedUser::user("ghost"), "item:get", &candidates(&["a"]))
        .await
        .unwrap();

    assert!(allowed.is_empty());
}

#[tokio::test]
async fn test_user_without_groups_gets_empty_result() {
    let repo = MemoryRepository::new();
    repo.put_user(User::new("alice", "/")).await.unwrap();
    let engine = AuthzEngine::new(Arc::new(repo));

    let allowed = engine
        .get_authorized_resources(&alice(), "item:get", &candidates(&["a", "b"]))
        .await
        .unwrap();

    assert!(allowed.is_empty());
}

#[tokio::test]
async fn test_unmatched_candidates_are_denied() {
    let repo = repo_with_policies(vec![vec![Statement::allow(
        &["item:get"],
        &[&urn("public/*")],
    )]])
    .await;
    let engine = AuthzEngine::new(Arc::new(repo));

    let allowed = engine
        .get_authorized_resources(&alice(), "item:get", &candidates(&["public/a", "private/a"]))
        .await
        .unwrap();
    assert_eq!(allowed, candidates(&["public/a"]));

    let allowed = engine
        .get_authorized_resources(&alice(), "item:delete", &candidates(&["public/a"]))
        .await
        .unwrap();
    assert!(allowed.is_empty());
}

// ============================================================================
// DENY OVERRIDES ALLOW
// ============================================================================

#[tokio::test]
async fn test_deny_in_other_policy_overrides_allow() {
    let repo = repo_with_policies(vec![
        vec![Statement::allow(&["item:*"], &[&urn("*")])],
        vec![Statement::deny(&["item:get"], &[&urn("secret/*")])],
    ])
    .await;
    let engine = AuthzEngine::new(Arc::new(repo));

    let allowed = engine
        .get_authorized_resources(
            &alice(),
            "item:get",
            &candidates(&["open/1", "secret/1", "open/2"]),
        )
        .await
        .unwrap();

    assert_eq!(allowed, candidates(&["open/1", "open/2"]));
    assert!(engine
        .is_authorized(&alice(), "item:list", &urn("secret/1"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_deny_through_second_group() {
    let repo = repo_with_policies(vec![vec![Statement::allow(&["*"], &[&urn("*")])]]).await;

    let user = repo.get_user_by_external_id("alice").await.unwrap().unwrap();
    let auditors = repo.put_group(Group::new("org2", "auditors", "/")).await.unwrap();
    repo.add_member(&auditors.id, &user.id).await.unwrap();
    let deny = repo
        .put_policy(Policy::new(
            "org2",
            "no-delete",
            "/",
            vec![Statement::deny(&["item:delete"], &[&urn("*")])],
        ))
        .await
        .unwrap();
    repo.attach_policy(&auditors.id, &deny.id).await.unwrap();

    let engine = AuthzEngine::new(Arc::new(repo));
    assert!(!engine
        .is_authorized(&alice(), "item:delete", &urn("a"))
        .await
        .unwrap());
    assert!(engine
        .is_authorized(&alice(), "item:get", &urn("a"))
        .await
        .unwrap());
}

// ============================================================================
// RESULT SHAPE
// ============================================================================

#[tokio::test]
async fn test_result_preserves_order_and_duplicates() {
    let repo = repo_with_policies(vec![vec![Statement::allow(&["item:get"], &[&urn("*")])]]).await;
    let engine = AuthzEngine::new(Arc::new(repo));
    let input = candidates(&["z", "a", "z", "m"]);

    let allowed = engine
        .get_authorized_resources(&alice(), "item:get", &input)
        .await
        .unwrap();

    assert_eq!(allowed, input);
}

#[tokio::test]
async fn test_empty_candidates_yield_empty_result() {
    let repo = repo_with_policies(vec![vec![Statement::allow(&["item:get"], &[&urn("*")])]]).await;
    let engine = AuthzEngine::new(Arc::new(repo));

    let allowed = engine
        .get_authorized_resources(&alice(), "item:get", &[])
        .await
        .unwrap();

    assert!(allowed.is_empty());
}

#[tokio::test]
async fn test_policy_update_is_visible_on_next_request() {
    let repo = repo_with_policies(vec![vec![Statement::allow(&["item:get"], &[&urn("*")])]]).await;
    let engine = AuthzEngine::new(Arc::new(repo.clone()));
    assert!(engine.is_authorized(&alice(), "item:get", &urn("a")).await.unwrap());

    let user = repo.get_user_by_external_id("alice").await.unwrap().unwrap();
    let groups = repo.get_groups_for_user(&user.id, None).await.unwrap();
    let ids: Vec<GroupId> = groups.into_iter().map(|g| g.id).collect();
    let policy = repo.get_policies_for_groups(&ids).await.unwrap().remove(0);
    repo.update_policy_statements(
        &policy.id,
        vec![Statement::deny(&["item:get"], &[&urn("*")])],
    )
    .await
    .unwrap();

    assert!(!engine.is_authorized(&alice(), "item:get", &urn("a")).await.unwrap());
}

// ============================================================================
// INVALID PARAMETERS
// ============================================================================

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let repo = repo_with_policies(vec![vec![Statement::allow(&["item:get"], &[&urn("*")])]]).await;
    let engine = AuthzEngine::new(Arc::new(repo));

    let cases: Vec<(&str, Vec<String>)> = vec![
        ("item:*", candidates(&["a"])),
        ("", candidates(&["a"])),
        ("noverb", candidates(&["a"])),
        ("item:get", vec!["not-a-urn".to_string()]),
        ("item:get", vec![urn("a/*")]),
        ("item:get", vec![urn("a"), urn("b*c")]),
    ];

    for (action, input) in cases {
        let err = engine
            .get_authorized_resources(&alice(), action, &input)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMETER", "action={} input={:?}", action, input);
    }
}

// ============================================================================
// REPOSITORY FAILURES
// ============================================================================

struct FailingRepository;

#[async_trait]
impl Repository for FailingRepository {
    async fn get_user_by_external_id(&self, _external_id: &str) -> Result<Option<User>> {
        Err(AuthzError::Internal("connection refused".to_string()))
    }

    async fn get_groups_for_user(&self, _user_id: &str, _org: Option<&str>) -> Result<Vec<Group>> {
        Err(AuthzError::Internal("connection refused".to_string()))
    }

    async fn get_policies_for_groups(&self, _group_ids: &[GroupId]) -> Result<Vec<Policy>> {
        Err(AuthzError::Internal("connection refused".to_string()))
    }

    async fn get_proxy_resources(&self) -> Result<Vec<ProxyResource>> {
        Err(AuthzError::Internal("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_repository_failure_is_internal_error() {
    let engine = AuthzEngine::new(Arc::new(FailingRepository));

    let err = engine
        .get_authorized_resources(&alice(), "item:get", &candidates(&["a"]))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::Internal(_)));

    let metrics = engine.get_metrics().await.unwrap();
    assert_eq!(metrics.error_count, 1);
}

#[tokio::test]
async fn test_admin_never_touches_repository() {
    let engine = AuthzEngine::new(Arc::new(FailingRepository));

    let allowed = engine
        .get_authorized_resources(&AuthenticatedUser::admin("root"), "item:get", &candidates(&["a"]))
        .await
        .unwrap();

    assert_eq!(allowed.len(), 1);
}

// ============================================================================
// METRICS
// ============================================================================

#[tokio::test]
async fn test_metrics_track_outcomes() {
    let repo = repo_with_policies(vec![vec![Statement::allow(&["item:get"], &[&urn("a")])]]).await;
    let engine = AuthzEngine::new(Arc::new(repo));

    engine
        .get_authorized_resources(&alice(), "item:get", &candidates(&["a", "b"]))
        .await
        .unwrap();
    engine
        .get_authorized_resources(&AuthenticatedUser::admin("root"), "item:get", &candidates(&["c"]))
        .await
        .unwrap();

    let metrics = engine.get_metrics().await.unwrap();
    assert_eq!(metrics.total_requests, 2);
    assert_eq!(metrics.admin_bypasses, 1);
    assert_eq!(metrics.resources_allowed, 2);
    assert_eq!(metrics.resources_denied, 1);

    let text = engine.export_metrics().await.unwrap();
    assert!(text.contains("warden_authz_requests_total 2"));
}
