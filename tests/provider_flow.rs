//! End-to-end tests: relation events through the controller to MySQL state.
//!
//! These tests verify that:
//! - A joined relation gets its databases, a login and grants, and sees them published
//! - A broken relation loses its login, and its databases with autodelete
//! - Only the leader acts
//! - An unready backend delays the pass instead of failing it
//! - Credentials are stable across restarts that share a store

#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]
#![forbid(clippy::panic)]

use std::collections::BTreeSet;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use mysql_provider::serve::{OutputLine, serve_lines};
use provider_reconciler::{
    Controller, ControllerConfig, CredentialStore, InMemoryCredentialStore, InMemoryGateway,
    ProviderData, ReconcilerBuilder,
};
use provider_relation::{DATA_KEY, DATABASES_KEY, DataBag, InMemoryTransport, RelationId};
use tokio::io::AsyncReadExt;
use tokio::time::timeout;

type TestResult = Result<(), Box<dyn std::error::Error>>;

struct Harness {
    gateway: Arc<InMemoryGateway>,
    store: Arc<InMemoryCredentialStore>,
    transport: Arc<InMemoryTransport>,
    controller: Controller,
}

fn harness(leader: bool, autodelete: bool) -> Result<Harness, Box<dyn std::error::Error>> {
    harness_with(
        Arc::new(InMemoryGateway::new()),
        Arc::new(InMemoryCredentialStore::new()),
        leader,
        autodelete,
    )
}

fn harness_with(
    gateway: Arc<InMemoryGateway>,
    store: Arc<InMemoryCredentialStore>,
    leader: bool,
    autodelete: bool,
) -> Result<Harness, Box<dyn std::error::Error>> {
    let reconciler = ReconcilerBuilder::new()
        .with_gateway(gateway.clone())
        .with_store(store.clone())
        .autodelete(autodelete)
        .grace_delay(Duration::from_secs(20))
        .build()?;
    let transport = Arc::new(InMemoryTransport::new("10.0.0.4", leader));
    let controller = Controller::new(
        Arc::new(reconciler),
        transport.clone(),
        ControllerConfig::default(),
    );
    Ok(Harness {
        gateway,
        store,
        transport,
        controller,
    })
}

/// Feed `input` through `serve_lines` and collect the output lines.
async fn serve(harness: Harness, input: &str) -> Result<Vec<OutputLine>, Box<dyn std::error::Error>> {
    let (writer, mut reader) = tokio::io::duplex(65_536);
    serve_lines(
        harness.controller,
        harness.transport,
        Cursor::new(input.as_bytes().to_vec()),
        writer,
    )
    .await?;

    let mut output = String::new();
    reader.read_to_string(&mut output).await?;
    output
        .lines()
        .map(|line| serde_json::from_str(line).map_err(Into::into))
        .collect()
}

fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|name| (*name).to_string()).collect()
}

/// Test that a joined relation is fully provisioned.
///
/// # GIVEN
/// A ready backend with `app1` already present
///
/// # WHEN
/// Relation 3 joins asking for `app1` and `app2`
///
/// # THEN
/// `app2` is created, `user_3` is granted both, and the consumer sees the
/// confirmed list and its credentials
#[tokio::test]
async fn test_join_provisions_databases_and_credentials() -> TestResult {
    let gateway = Arc::new(InMemoryGateway::with_databases(["app1"]));
    let h = harness_with(gateway, Arc::new(InMemoryCredentialStore::new()), true, false)?;
    let gateway = h.gateway.clone();

    let output = serve(
        h,
        r#"{"kind":"joined","relation_id":3,"app":"wordpress","data":{"databases":"[\"app2\",\"app1\"]"}}"#,
    )
    .await?;

    assert_eq!(output.len(), 1, "one publication expected: {output:?}");
    let Some(line) = output.first() else {
        return Err("missing publication".into());
    };
    assert_eq!(line.relation_id, RelationId::new(3));
    assert_eq!(line.data.get(DATABASES_KEY), Some(r#"["app1","app2"]"#));

    let data: Option<ProviderData> = line.data.get_json(DATA_KEY)?;
    let Some(data) = data else {
        return Err("missing credentials".into());
    };
    assert_eq!(data.credentials.username, "user_3");
    assert_eq!(data.credentials.address.as_deref(), Some("10.0.0.4"));
    assert_eq!(data.credentials.password.len(), 16);

    assert_eq!(gateway.database_names().await, names(&["app1", "app2"]));
    assert_eq!(gateway.grants_of("user_3").await, names(&["app1", "app2"]));
    assert_eq!(
        gateway.password_of("user_3").await.as_deref(),
        Some(data.credentials.password.as_str())
    );
    Ok(())
}

/// Test that teardown with autodelete removes everything the relation got.
///
/// # GIVEN
/// An autodelete provider and a provisioned relation
///
/// # WHEN
/// The relation breaks
///
/// # THEN
/// The login, the stored credential and the databases are gone
#[tokio::test]
async fn test_broken_relation_with_autodelete_drops_everything() -> TestResult {
    let h = harness(true, true)?;
    let gateway = h.gateway.clone();
    let store = h.store.clone();

    let input = [
        r#"{"kind":"joined","relation_id":7,"data":{"databases":"[\"shop\"]"}}"#,
        r#"{"kind":"broken","relation_id":7}"#,
    ]
    .join("\n");
    let output = serve(h, &input).await?;

    assert_eq!(output.len(), 1);
    assert!(!gateway.has_user("user_7").await);
    assert!(gateway.database_names().await.is_empty());
    assert!(store.get(RelationId::new(7)).await?.is_none());
    Ok(())
}

/// Test that teardown without autodelete keeps the databases.
#[tokio::test]
async fn test_broken_relation_keeps_databases_by_default() -> TestResult {
    let h = harness(true, false)?;
    let gateway = h.gateway.clone();

    let input = [
        r#"{"kind":"joined","relation_id":8,"data":{"databases":"[\"shop\"]"}}"#,
        r#"{"kind":"broken","relation_id":8}"#,
    ]
    .join("\n");
    serve(h, &input).await?;

    assert!(!gateway.has_user("user_8").await);
    assert_eq!(gateway.database_names().await, names(&["shop"]));
    Ok(())
}

/// Test that a follower unit never touches the backend.
#[tokio::test]
async fn test_follower_does_nothing() -> TestResult {
    let h = harness(false, true)?;
    let gateway = h.gateway.clone();

    let input = [
        r#"{"kind":"joined","relation_id":2,"data":{"databases":"[\"app\"]"}}"#,
        r#"{"kind":"changed","relation_id":2,"data":{"databases":"[\"app\",\"more\"]"}}"#,
        r#"{"kind":"broken","relation_id":2}"#,
    ]
    .join("\n");
    let output = serve(h, &input).await?;

    assert!(output.is_empty());
    assert!(gateway.mutations().await.is_empty());
    Ok(())
}

/// Test that invalid input lines are skipped and valid ones still processed.
#[tokio::test]
async fn test_bad_lines_are_skipped() -> TestResult {
    let h = harness(true, false)?;

    let input = [
        "not json",
        r#"{"kind":"changed","relation_id":40,"data":{}}"#,
        "",
        r#"{"kind":"joined","relation_id":4,"data":{"databases":"[\"a\"]"}}"#,
    ]
    .join("\n");
    let output = serve(h, &input).await?;

    let relations: Vec<RelationId> = output.iter().map(|line| line.relation_id).collect();
    assert_eq!(relations, vec![RelationId::new(4)]);
    Ok(())
}

/// Test that an unready backend gets a grace period before the pass runs.
///
/// # GIVEN
/// A backend that is not ready when the relation joins
///
/// # WHEN
/// The backend becomes ready within the grace period
///
/// # THEN
/// The relation is provisioned by the grace recheck
#[tokio::test(start_paused = true)]
async fn test_unready_backend_is_rechecked_after_grace() -> TestResult {
    let h = harness(true, false)?;
    let gateway = h.gateway.clone();
    let transport = h.transport.clone();
    let mut publications = transport.subscribe();
    let stopper = h.controller.stopper();
    let mut controller = h.controller;

    gateway.set_ready(false).await;
    let handle = tokio::spawn(async move { controller.run().await });

    let bag: DataBag = [(DATABASES_KEY, r#"["late"]"#)].into_iter().collect();
    transport.join(RelationId::new(5), None, bag).await?;

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(publications.try_recv().is_err(), "nothing before the recheck");
    assert!(gateway.mutations().await.is_empty());

    gateway.set_ready(true).await;
    let publication = timeout(Duration::from_secs(60), publications.recv()).await??;
    assert_eq!(publication.relation_id, RelationId::new(5));
    assert_eq!(gateway.database_names().await, names(&["late"]));

    stopper.stop();
    handle.await??;
    Ok(())
}

/// Test that a restarted provider reissues the same credentials.
///
/// # GIVEN
/// A relation provisioned by one controller
///
/// # WHEN
/// A new controller sharing the credential store sees the relation again
///
/// # THEN
/// The published password is unchanged
#[tokio::test]
async fn test_credentials_survive_restart() -> TestResult {
    let gateway = Arc::new(InMemoryGateway::new());
    let store = Arc::new(InMemoryCredentialStore::new());
    let input = r#"{"kind":"joined","relation_id":11,"data":{"databases":"[\"db\"]"}}"#;

    let first = serve(harness_with(gateway.clone(), store.clone(), true, false)?, input).await?;
    let second = serve(harness_with(gateway, store, true, false)?, input).await?;

    let password = |lines: &[OutputLine]| -> Option<String> {
        let line = lines.first()?;
        let data: ProviderData = line.data.get_json(DATA_KEY).ok()??;
        Some(data.credentials.password)
    };
    assert!(password(&first).is_some());
    assert_eq!(password(&first), password(&second));
    Ok(())
}

/// Test that a relation provisioned before a restart can still be torn down.
///
/// # GIVEN
/// An autodelete provider that provisioned relation 11, then restarted with
/// the same backend and credential store
///
/// # WHEN
/// The relation breaks, with the provider data published before the restart
///
/// # THEN
/// The login, the stored credential and the databases are gone
#[tokio::test]
async fn test_broken_after_restart_tears_down() -> TestResult {
    let gateway = Arc::new(InMemoryGateway::new());
    let store = Arc::new(InMemoryCredentialStore::new());

    let joined = r#"{"kind":"joined","relation_id":11,"data":{"databases":"[\"db\"]"}}"#;
    let first = serve(harness_with(gateway.clone(), store.clone(), true, true)?, joined).await?;
    let Some(published) = first.first() else {
        return Err("missing publication".into());
    };
    assert!(store.get(RelationId::new(11)).await?.is_some());

    let broken = serde_json::json!({
        "kind": "broken",
        "relation_id": 11,
        "provider": published.data,
    })
    .to_string();
    let second = serve(harness_with(gateway.clone(), store.clone(), true, true)?, &broken).await?;

    assert!(second.is_empty());
    assert!(!gateway.has_user("user_11").await);
    assert!(gateway.database_names().await.is_empty());
    assert!(store.get(RelationId::new(11)).await?.is_none());
    Ok(())
}

/// Test that a restarted provider without the published data refuses to
/// guess what to tear down.
#[tokio::test]
async fn test_broken_after_restart_without_provider_data_keeps_state() -> TestResult {
    let gateway = Arc::new(InMemoryGateway::new());
    let store = Arc::new(InMemoryCredentialStore::new());

    let joined = r#"{"kind":"joined","relation_id":12,"data":{"databases":"[\"db\"]"}}"#;
    serve(harness_with(gateway.clone(), store.clone(), true, true)?, joined).await?;
    let broken = r#"{"kind":"broken","relation_id":12}"#;
    serve(harness_with(gateway.clone(), store.clone(), true, true)?, broken).await?;

    assert!(gateway.has_user("user_12").await);
    assert_eq!(gateway.database_names().await, names(&["db"]));
    assert!(store.get(RelationId::new(12)).await?.is_some());
    Ok(())
}
