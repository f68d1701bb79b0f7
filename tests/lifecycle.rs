//! Start/stop behaviour of the DNS subsystem against a recording store.

mod common;

use std::sync::Arc;

use corectld_dns::error::DnsError;
use corectld_dns::record::{RecordValue, Registrar, TeardownPolicy};
use corectld_dns::store::KvStore;

use common::*;

async fn stored(store: &RecordingStore, key: &str) -> Option<RecordValue> {
    store
        .get(key)
        .await
        .unwrap()
        .map(|raw| RecordValue::decode(&raw).unwrap())
}

#[tokio::test]
async fn test_end_to_end_bootstrap_records() {
    let store = RecordingStore::new();
    let server = test_server(&store);

    server
        .start("coreos.local", "127.0.0.1:5354", &[])
        .await
        .unwrap();

    let forward = stored(&store, FORWARD_KEY).await.expect("forward record");
    assert_eq!(forward.host, "10.0.2.2");
    assert_eq!(forward.ttl, 20);

    let reverse = stored(&store, REVERSE_KEY).await.expect("reverse record");
    assert_eq!(reverse.host, "corectld.coreos.local");
    assert_eq!(reverse.ttl, 20);

    let alias = stored(&store, ALIAS_KEY).await.expect("alias record");
    assert_eq!(alias.host, "10.0.2.2");

    server.stop().await;

    assert!(stored(&store, FORWARD_KEY).await.is_none());
    assert!(stored(&store, REVERSE_KEY).await.is_none());
    assert!(!server.is_running().await);
}

#[tokio::test]
async fn test_start_twice_registers_once() {
    let store = RecordingStore::new();
    let server = test_server(&store);

    server.start("coreos.local", "127.0.0.1:0", &[]).await.unwrap();
    let after_first = store.set_count();
    let addr = server.listen_addr().await;

    server.start("coreos.local", "127.0.0.1:0", &[]).await.unwrap();

    assert_eq!(after_first, 3);
    assert_eq!(store.set_count(), 3);
    assert_eq!(server.listen_addr().await, addr);

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_starts_register_once() {
    let store = RecordingStore::new();
    let server = Arc::new(test_server(&store));

    let a = {
        let server = server.clone();
        tokio::spawn(async move { server.start("coreos.local", "127.0.0.1:0", &[]).await })
    };
    let b = {
        let server = server.clone();
        tokio::spawn(async move { server.start("coreos.local", "127.0.0.1:0", &[]).await })
    };

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();
    assert_eq!(store.set_count(), 3);

    server.stop().await;
}

#[tokio::test]
async fn test_start_aborts_when_bootstrap_write_fails() {
    let store = RecordingStore::failing_set(1);
    let server = test_server(&store);

    let result = server.start("coreos.local", "127.0.0.1:0", &[]).await;

    assert!(matches!(result, Err(DnsError::Registration(_))));
    assert!(!server.is_running().await);
    // forward failed, so the reverse write was never attempted
    assert_eq!(store.calls(), vec![Call::Set(FORWARD_KEY.to_string())]);
}

#[tokio::test]
async fn test_alias_failure_rolls_back_host_records() {
    // third set is the alias forward record
    let store = RecordingStore::failing_set(3);
    let server = test_server(&store);

    let result = server.start("coreos.local", "127.0.0.1:0", &[]).await;
    assert!(matches!(result, Err(DnsError::Registration(_))));
    assert!(!server.is_running().await);

    server.stop().await;

    assert!(store.memory().is_empty(), "left behind: {:?}", store.memory().keys());
    assert!(store.calls().contains(&Call::Delete(FORWARD_KEY.to_string())));
    assert!(store.calls().contains(&Call::Delete(REVERSE_KEY.to_string())));
}

#[tokio::test]
async fn test_start_after_stop_starts_again() {
    let store = RecordingStore::new();
    let server = test_server(&store);

    server.start("coreos.local", "127.0.0.1:0", &[]).await.unwrap();
    server.stop().await;
    server.start("coreos.local", "127.0.0.1:0", &[]).await.unwrap();

    assert!(server.is_running().await);
    assert_eq!(store.set_count(), 6);
    server.stop().await;
}

#[tokio::test]
async fn test_stop_swallows_teardown_errors() {
    let store = RecordingStore::failing_delete(FORWARD_KEY);
    let server = test_server(&store);

    server.start("coreos.local", "127.0.0.1:0", &[]).await.unwrap();
    server.stop().await;

    assert!(!server.is_running().await);
    // a second stop is a no-op
    server.stop().await;
}

#[tokio::test]
async fn test_register_forward_failure_skips_reverse() {
    let store = RecordingStore::failing_set(1);
    let registrar = Registrar::new(Arc::new(store.clone()), LOCAL_DOMAIN, 20);

    let result = registrar.register("corectld", HOST_IP).await;

    assert!(matches!(result, Err(DnsError::Registration(_))));
    assert_eq!(store.calls().len(), 1);
}

#[tokio::test]
async fn test_register_reverse_failure_is_reported() {
    let store = RecordingStore::failing_set(2);
    let registrar = Registrar::new(Arc::new(store.clone()), LOCAL_DOMAIN, 20);

    let result = registrar.register("corectld", HOST_IP).await;

    assert!(result.is_err());
    assert_eq!(
        store.calls(),
        vec![
            Call::Set(FORWARD_KEY.to_string()),
            Call::Set(REVERSE_KEY.to_string()),
        ]
    );
}

#[tokio::test]
async fn test_unregister_is_fail_fast() {
    let store = RecordingStore::failing_delete(FORWARD_KEY);
    let registrar = Registrar::new(Arc::new(store.clone()), LOCAL_DOMAIN, 20);

    registrar.register("corectld", HOST_IP).await.unwrap();
    let result = registrar.unregister("corectld", HOST_IP).await;

    assert!(result.is_err());
    assert!(!store.calls().contains(&Call::Delete(REVERSE_KEY.to_string())));
}

#[tokio::test]
async fn test_teardown_policies() {
    let store = RecordingStore::failing_delete(FORWARD_KEY);
    let registrar = Registrar::new(Arc::new(store.clone()), LOCAL_DOMAIN, 20);

    let strict = registrar
        .teardown("corectld", Some(HOST_IP), TeardownPolicy::FailFast)
        .await;
    assert!(strict.is_err());

    let lenient = registrar
        .teardown("corectld", Some(HOST_IP), TeardownPolicy::BestEffort)
        .await;
    assert!(lenient.is_ok());
}

#[tokio::test]
async fn test_register_unregister_round_trip() {
    let store = RecordingStore::new();
    let registrar = Registrar::new(Arc::new(store.clone()), LOCAL_DOMAIN, 20);

    for (host, ip) in [("vm-a", "192.168.64.2"), ("vm-b", "192.168.64.3")] {
        let ip = ip.parse().unwrap();
        registrar.register(host, ip).await.unwrap();
        registrar.unregister(host, ip).await.unwrap();
    }

    assert!(store.memory().is_empty());
}
