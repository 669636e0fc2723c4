mod common;

use common::{eventually, eventually_async, paired_tenant, Harness};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tether_gateway::event::{LoggedOutEvent, PairSuccess};
use tether_gateway::{PairingEvent, ProtocolEvent, SessionError, SessionState, SupervisorConfig};
use tether_store::{TenantId, TenantRecord, TenantStore};

#[tokio::test]
async fn test_second_start_is_rejected() {
    let harness = Harness::new(vec![paired_tenant(1, "All")]);
    let tenant = TenantId(1);

    harness.supervisor.start(tenant, Some("1@s.test".into())).unwrap();
    let second = harness.supervisor.start(tenant, Some("1@s.test".into()));

    assert!(matches!(second, Err(SessionError::AlreadyRunning(TenantId(1)))));
    assert_eq!(harness.supervisor.registry().len(), 1);
}

#[tokio::test]
async fn test_pairing_timeout_clears_entry_and_artifact() {
    let harness = Harness::new(vec![TenantRecord::new(2, "token-2")]);
    let tenant = TenantId(2);

    let entry = harness.supervisor.start(tenant, None).unwrap();
    assert!(eventually(|| entry.state() == SessionState::AwaitingPairing).await);

    let session = harness.connector.session(tenant);
    session.pairing(PairingEvent::Code("2@first-code".into())).await;
    let store = &harness.store;
    assert!(
        eventually_async(|| async move { store.pairing_code(tenant).await.unwrap().is_some() })
            .await
    );
    assert_eq!(
        harness.supervisor.pairing_artifact(tenant).await.unwrap(),
        "2@first-code"
    );

    session.pairing(PairingEvent::Timeout).await;
    let registry = harness.supervisor.registry();
    assert!(eventually(|| !registry.exists(tenant)).await);
    assert!(harness.store.pairing_code(tenant).await.unwrap().is_none());
    assert_eq!(session.disconnects.load(Ordering::SeqCst), 1);
    assert!(entry.state().is_finished());

    harness.supervisor.start(tenant, None).unwrap();
    assert!(harness.supervisor.registry().exists(tenant));
}

#[tokio::test]
async fn test_pairing_success_connects_and_persists_identity() {
    let harness = Harness::new(vec![TenantRecord::new(3, "token-3")]);
    let tenant = TenantId(3);

    let entry = harness.supervisor.start(tenant, None).unwrap();
    assert!(eventually(|| entry.state() == SessionState::AwaitingPairing).await);

    let session = harness.connector.session(tenant);
    session.pairing(PairingEvent::Code("2@code".into())).await;
    session
        .emit(ProtocolEvent::PairSuccess(PairSuccess {
            id: "333@s.test".into(),
            business_name: String::new(),
            platform: "android".into(),
        }))
        .await;
    session.pairing(PairingEvent::Success).await;

    assert!(eventually(|| entry.state() == SessionState::Connected).await);
    let harness_ref = &harness;
    assert!(eventually_async(|| async move { harness_ref.record(tenant).await.connected }).await);

    let record = harness.record(tenant).await;
    assert_eq!(record.identity.as_deref(), Some("333@s.test"));
    assert!(record.pairing_code.is_none());

    let cached = harness.supervisor.cache().peek_by_id(tenant).unwrap();
    assert_eq!(cached.identity.as_deref(), Some("333@s.test"));
    assert!(matches!(
        harness.supervisor.pairing_artifact(tenant).await,
        Err(SessionError::AlreadyLoggedIn(_))
    ));
}

#[tokio::test]
async fn test_stop_without_session_changes_nothing() {
    let harness = Harness::new(vec![paired_tenant(4, "Message").with_connected(true)]);
    let tenant = TenantId(4);
    let before = harness.record(tenant).await;

    assert!(matches!(
        harness.supervisor.stop(tenant).await,
        Err(SessionError::NoSession(TenantId(4)))
    ));
    assert!(matches!(
        harness.supervisor.logout(tenant).await,
        Err(SessionError::NoSession(_))
    ));
    assert!(matches!(
        harness.supervisor.status(tenant),
        Err(SessionError::NoSession(_))
    ));

    assert_eq!(harness.record(tenant).await, before);
    assert!(harness.supervisor.registry().is_empty());
}

#[tokio::test]
async fn test_stop_requires_paired_session() {
    let harness = Harness::new(vec![TenantRecord::new(5, "token-5")]);
    let tenant = TenantId(5);

    let entry = harness.supervisor.start(tenant, None).unwrap();
    assert!(eventually(|| entry.state() == SessionState::AwaitingPairing).await);

    assert!(matches!(
        harness.supervisor.stop(tenant).await,
        Err(SessionError::NotLoggedIn(_))
    ));
    assert!(harness.supervisor.registry().exists(tenant));
}

#[tokio::test]
async fn test_stop_tears_down_and_clears_subscriptions() {
    let harness = Harness::new(vec![paired_tenant(6, "Message")]);
    let tenant = TenantId(6);

    let entry = harness.supervisor.start(tenant, Some("6@s.test".into())).unwrap();
    assert!(eventually(|| entry.state() == SessionState::Connected).await);
    assert_eq!(
        harness.supervisor.status(tenant).unwrap(),
        tether_gateway::SessionStatus {
            connected: true,
            paired: true
        }
    );

    harness.supervisor.stop(tenant).await.unwrap();

    let registry = harness.supervisor.registry();
    assert!(eventually(|| !registry.exists(tenant)).await);
    assert!(eventually(|| entry.state() == SessionState::Idle).await);

    let record = harness.record(tenant).await;
    assert!(!record.connected);
    assert_eq!(record.events, "");
    assert_eq!(record.identity.as_deref(), Some("6@s.test"));

    // signal after teardown is a no-op
    assert!(!entry.cancel().signal());
}

#[tokio::test]
async fn test_logout_invalidates_identity() {
    let harness = Harness::new(vec![paired_tenant(7, "All")]);
    let tenant = TenantId(7);

    let entry = harness.supervisor.start(tenant, Some("7@s.test".into())).unwrap();
    assert!(eventually(|| entry.state() == SessionState::Connected).await);

    harness.supervisor.logout(tenant).await.unwrap();

    let registry = harness.supervisor.registry();
    assert!(
        eventually(|| !registry.exists(tenant) && entry.state() == SessionState::LoggedOut).await
    );

    let record = harness.record(tenant).await;
    assert!(record.identity.is_none());
    assert!(!record.connected);
    assert!(harness
        .supervisor
        .cache()
        .peek_by_id(tenant)
        .unwrap()
        .identity
        .is_none());
}

#[tokio::test]
async fn test_logged_out_event_signals_once() {
    let harness = Harness::new(vec![paired_tenant(8, "All").with_connected(true)]);
    let tenant = TenantId(8);

    let entry = harness.supervisor.start(tenant, Some("8@s.test".into())).unwrap();
    assert!(eventually(|| entry.state() == SessionState::Connected).await);

    let session = harness.connector.session(tenant);
    let logged_out = ProtocolEvent::LoggedOut(LoggedOutEvent {
        reason: "device removed".into(),
        on_connect: false,
    });
    session.emit(logged_out.clone()).await;

    let registry = harness.supervisor.registry();
    assert!(
        eventually(|| !registry.exists(tenant) && entry.state() == SessionState::LoggedOut).await
    );
    assert!(entry.cancel().is_signaled());
    assert_eq!(session.disconnects.load(Ordering::SeqCst), 1);

    // the channel is gone; a repeated event must not fault
    session.emit(logged_out).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(session.disconnects.load(Ordering::SeqCst), 1);

    let record = harness.record(tenant).await;
    assert!(!record.connected);
    assert!(record.identity.is_none());
}

#[tokio::test]
async fn test_connect_failure_is_fatal_to_start() {
    let harness = Harness::new(vec![paired_tenant(9, "All")]);
    let tenant = TenantId(9);
    harness.connector.fail_connect.store(true, Ordering::SeqCst);

    let result = harness
        .supervisor
        .start_session(tenant, &["Message"], false)
        .await;
    assert!(matches!(result, Err(SessionError::FailedToConnect(TenantId(9)))));

    let registry = harness.supervisor.registry();
    assert!(eventually(|| !registry.exists(tenant)).await);
}

#[tokio::test]
async fn test_synchronous_start_waits_for_transport() {
    let harness = Harness::new(vec![
        paired_tenant(10, ""),
        TenantRecord::new(11, "token-11"),
    ]);

    let subs = harness
        .supervisor
        .start_session(TenantId(10), &["Presence", "Bogus"], false)
        .await
        .unwrap();
    assert_eq!(subs.to_stored(), "Presence");
    assert_eq!(harness.record(TenantId(10)).await.events, "Presence");
    assert!(harness.connector.session(TenantId(10)).is_connected_now());

    // unpaired tenants are ready once the pairing code can be shown
    harness
        .supervisor
        .start_session::<&str>(TenantId(11), &[], false)
        .await
        .unwrap();
    assert_eq!(harness.record(TenantId(11)).await.events, "All");
    assert_eq!(
        harness.supervisor.registry().get(TenantId(11)).unwrap().state(),
        SessionState::AwaitingPairing
    );

    assert!(matches!(
        harness
            .supervisor
            .start_session(TenantId(10), &["Message"], true)
            .await,
        Err(SessionError::AlreadyRunning(_))
    ));
    assert!(matches!(
        harness
            .supervisor
            .start_session::<&str>(TenantId(99), &[], true)
            .await,
        Err(SessionError::TenantNotFound(_))
    ));
}

#[tokio::test]
async fn test_ready_wait_reflects_session_state() {
    let harness = Harness::with_config(
        vec![paired_tenant(12, "All")],
        SupervisorConfig {
            connect_wait: Duration::from_millis(50),
            media_download_timeout: Duration::from_secs(1),
            ..SupervisorConfig::default()
        },
    );
    let tenant = TenantId(12);

    let entry = harness.supervisor.start(tenant, Some("12@s.test".into())).unwrap();
    assert!(eventually(|| entry.state() == SessionState::Connected).await);
    harness.supervisor.wait_ready(&entry).await.unwrap();

    // a torn-down session is never ready again
    entry.cancel().signal();
    let registry = harness.supervisor.registry();
    assert!(eventually(|| !registry.exists(tenant)).await);
    assert!(matches!(
        harness.supervisor.wait_ready(&entry).await,
        Err(SessionError::FailedToConnect(_))
    ));
}

#[tokio::test]
async fn test_resume_restarts_connected_tenants() {
    let harness = Harness::new(vec![
        paired_tenant(20, "Message").with_connected(true),
        paired_tenant(21, "All").with_connected(true),
        paired_tenant(22, "All"),
    ]);

    let started = harness.supervisor.resume_sessions().await.unwrap();
    assert_eq!(started, 2);
    assert_eq!(
        harness.supervisor.registry().tenants(),
        vec![TenantId(20), TenantId(21)]
    );

    let cached = harness.supervisor.cache().peek_by_id(TenantId(20)).unwrap();
    assert_eq!(cached.webhook_url, "https://hooks.test/20");
    assert!(harness.supervisor.cache().peek_by_id(TenantId(22)).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_for_distinct_tenants() {
    let records: Vec<TenantRecord> = (100..200).map(|id| paired_tenant(id, "All")).collect();
    let harness = Harness::new(records);

    let mut handles = Vec::new();
    for id in 100..200u64 {
        let supervisor = harness.supervisor.clone();
        handles.push(tokio::spawn(async move {
            supervisor.start(TenantId(id), Some(format!("{}@s.test", id)))
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let tenants = harness.supervisor.registry().tenants();
    assert_eq!(tenants.len(), 100);
    assert_eq!(tenants, (100..200).map(TenantId).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_starts_for_one_tenant() {
    let harness = Harness::new(vec![paired_tenant(300, "All")]);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let supervisor = harness.supervisor.clone();
        handles.push(tokio::spawn(async move {
            supervisor.start(TenantId(300), Some("300@s.test".into()))
        }));
    }

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(SessionError::AlreadyRunning(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(harness.supervisor.registry().len(), 1);
}

#[tokio::test]
async fn test_subscription_change_writes_through() {
    let harness = Harness::new(vec![paired_tenant(20, "All")]);
    let tenant = TenantId(20);

    let subscriptions = harness
        .supervisor
        .set_subscriptions(tenant, &["Presence", "Nope", "Presence", "Message"])
        .await
        .unwrap();
    assert_eq!(subscriptions.to_stored(), "Presence,Message");

    assert_eq!(harness.record(tenant).await.events, "Presence,Message");
    let cached = harness.supervisor.cache().peek_by_id(tenant).unwrap();
    assert_eq!(cached.subscriptions, subscriptions);
}

#[tokio::test]
async fn test_events_from_replaced_session_leave_new_session_alone() {
    let harness = Harness::new(vec![paired_tenant(30, "All").with_connected(true)]);
    let tenant = TenantId(30);

    let first = harness.supervisor.start(tenant, Some("30@s.test".into())).unwrap();
    assert!(eventually(|| first.state() == SessionState::Connected).await);
    let old_session = harness.connector.session(tenant);

    harness.supervisor.stop(tenant).await.unwrap();
    assert!(eventually(|| first.state() == SessionState::Idle).await);

    let second = harness.supervisor.start(tenant, Some("30@s.test".into())).unwrap();
    assert!(eventually(|| second.state() == SessionState::Connected).await);

    old_session
        .emit(ProtocolEvent::LoggedOut(LoggedOutEvent {
            reason: "late".into(),
            on_connect: false,
        }))
        .await;
    old_session
        .emit(ProtocolEvent::PairSuccess(PairSuccess {
            id: "30@stale".into(),
            business_name: String::new(),
            platform: "test".into(),
        }))
        .await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(second.state(), SessionState::Connected);
    assert!(!second.cancel().is_signaled());
    assert!(harness.supervisor.registry().exists(tenant));
    let record = harness.record(tenant).await;
    assert_eq!(record.identity.as_deref(), Some("30@s.test"));
    assert!(record.connected);
}

#[tokio::test]
async fn test_rejected_start_keeps_running_subscriptions() {
    let harness = Harness::new(vec![paired_tenant(31, "All")]);
    let tenant = TenantId(31);

    harness
        .supervisor
        .start_session(tenant, &["Message"], false)
        .await
        .unwrap();

    let second = harness
        .supervisor
        .start_session(tenant, &["Presence"], true)
        .await;
    assert!(matches!(second, Err(SessionError::AlreadyRunning(_))));

    assert_eq!(harness.record(tenant).await.events, "Message");
    let cached = harness.supervisor.cache().peek_by_id(tenant).unwrap();
    assert_eq!(cached.subscriptions.to_stored(), "Message");
}

#[tokio::test]
async fn test_failed_resume_keeps_connected_flag() {
    let harness = Harness::new(vec![paired_tenant(32, "All").with_connected(true)]);
    let tenant = TenantId(32);
    harness.connector.fail_connect.store(true, Ordering::SeqCst);

    assert_eq!(harness.supervisor.resume_sessions().await.unwrap(), 1);
    let registry = harness.supervisor.registry();
    assert!(eventually(|| !registry.exists(tenant)).await);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(harness.record(tenant).await.connected);

    // the next restart tries again
    harness.connector.fail_connect.store(false, Ordering::SeqCst);
    assert_eq!(harness.supervisor.resume_sessions().await.unwrap(), 1);
}
