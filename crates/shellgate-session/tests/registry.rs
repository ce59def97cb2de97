//! Integration test: registry lifecycle.
//!
//! Tests: create -> get -> list -> duplicate rejection -> capacity
//!        eviction -> TTL expiry -> remove -> disconnect_all
//! No network peer is involved; sessions stay in the unconnected state.

use shellgate_policy::PolicyEngine;
use shellgate_session::{PasswordBroker, SessionRegistry};
use shellgate_types::config::GatewayConfig;
use shellgate_types::PermissibilityLevel;
use std::sync::Arc;

fn registry_with(max_sessions: usize, ttl_hours: u64) -> SessionRegistry {
    let mut config = GatewayConfig::default();
    config.security.max_sessions = max_sessions;
    config.security.session_ttl_hours = ttl_hours;
    SessionRegistry::new(
        Arc::new(config),
        Arc::new(PolicyEngine::with_defaults(PermissibilityLevel::Medium)),
        Arc::new(PasswordBroker::new()),
    )
}

#[tokio::test]
async fn test_create_get_remove() {
    let registry = registry_with(10, 8);

    let session = registry
        .create_session("s1", "host-a", 22, "admin")
        .await
        .unwrap();
    assert_eq!(session.id(), "s1");

    // get returns the same session object
    let fetched = registry.get_session("s1").await.unwrap();
    assert!(Arc::ptr_eq(&session, &fetched));

    assert!(registry.remove_session("s1").await.unwrap());
    assert!(registry.get_session("s1").await.is_none());

    // removing again finds nothing
    assert!(!registry.remove_session("s1").await.unwrap());
}

#[tokio::test]
async fn test_duplicate_id_rejected() {
    let registry = registry_with(10, 8);
    registry
        .create_session("dup", "host-a", 22, "admin")
        .await
        .unwrap();
    let err = registry
        .create_session("dup", "host-b", 22, "admin")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already exists"));
    assert_eq!(registry.session_count().await, 1);
}

#[tokio::test]
async fn test_capacity_eviction_removes_earliest_created() {
    let registry = registry_with(2, 8);

    registry.create_session("s1", "h", 22, "u").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    registry.create_session("s2", "h", 22, "u").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    registry.create_session("s3", "h", 22, "u").await.unwrap();

    assert!(registry.get_session("s1").await.is_none());
    assert!(registry.get_session("s2").await.is_some());
    assert!(registry.get_session("s3").await.is_some());
    assert_eq!(registry.session_count().await, 2);
}

#[tokio::test]
async fn test_population_never_exceeds_max() {
    let registry = registry_with(3, 8);
    for i in 0..10 {
        registry
            .create_session(&format!("s{i}"), "h", 22, "u")
            .await
            .unwrap();
        assert!(registry.session_count().await <= 3);
    }
}

#[tokio::test]
async fn test_ttl_expiry() {
    // Zero TTL: every session is expired as soon as it exists.
    let registry = registry_with(10, 0);
    registry.create_session("s1", "h", 22, "u").await.unwrap();
    registry.create_session("s2", "h", 22, "u").await.unwrap();

    let removed = registry.cleanup_expired().await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(registry.session_count().await, 0);

    // Long TTL: nothing expires.
    let registry = registry_with(10, 8);
    registry.create_session("s1", "h", 22, "u").await.unwrap();
    assert_eq!(registry.cleanup_expired().await.unwrap(), 0);
    assert_eq!(registry.session_count().await, 1);
}

#[tokio::test]
async fn test_list_sessions_snapshot() {
    let registry = registry_with(10, 8);
    registry
        .create_session("alpha", "host-a", 22, "admin")
        .await
        .unwrap();
    registry
        .create_session("beta", "host-b", 2222, "deploy")
        .await
        .unwrap();

    let mut infos = registry.list_sessions().await;
    infos.sort_by(|a, b| a.session_id.cmp(&b.session_id));
    assert_eq!(infos.len(), 2);
    assert_eq!(infos[0].session_id, "alpha");
    assert_eq!(infos[0].host, "host-a");
    assert!(!infos[0].connected);
    assert_eq!(infos[1].session_id, "beta");
    assert_eq!(infos[1].port, 2222);
    assert_eq!(infos[1].username, "deploy");
}

#[tokio::test]
async fn test_disconnect_all() {
    let registry = registry_with(10, 8);
    for i in 0..4 {
        registry
            .create_session(&format!("s{i}"), "h", 22, "u")
            .await
            .unwrap();
    }
    assert_eq!(registry.disconnect_all().await, 4);
    assert_eq!(registry.session_count().await, 0);
}
