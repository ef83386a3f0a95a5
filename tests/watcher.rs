mod common;

use clustercache::error::Error;
use clustercache::k8s::cache::errors::resource_expired_response;
use clustercache::k8s::cache::{
    KindWatcher, ResourceKind, ResourceWatcher, UpdateEvent, WatchState, WatcherConfig,
};
use common::{MockSource, eventually, fast_config, node, zone_of};
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::serde_json::{self, json};
use kube::ResourceExt;
use kube::api::WatchEvent;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn node_watcher(source: &Arc<MockSource<Node>>) -> Arc<ResourceWatcher<Node>> {
    Arc::new(ResourceWatcher::new(
        ResourceKind::Nodes,
        source.clone(),
        fast_config(),
    ))
}

fn names(watcher: &ResourceWatcher<Node>) -> Vec<String> {
    let mut names: Vec<String> = watcher.get_all().iter().map(|n| n.name_any()).collect();
    names.sort();
    names
}

/// Record every hook event as `(action, name)`
fn record(watcher: &ResourceWatcher<Node>) -> Arc<Mutex<Vec<(&'static str, String)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    watcher.set_update_handler(Arc::new(move |event: &UpdateEvent<Node>| {
        let action = match event {
            UpdateEvent::Added(_) => "added",
            UpdateEvent::Modified(_) => "modified",
            UpdateEvent::Deleted(_) => "deleted",
        };
        sink.lock()
            .unwrap()
            .push((action, event.object().name_any()));
    }));
    seen
}

#[tokio::test]
async fn test_warm_up_loads_listing() {
    let source = MockSource::new(vec![node("n1", "1", &[]), node("n2", "2", &[])]);
    let watcher = node_watcher(&source);
    assert_eq!(watcher.state(), WatchState::Uninitialized);

    watcher.warm_up(&CancellationToken::new()).await.unwrap();

    assert_eq!(watcher.state(), WatchState::Active);
    assert_eq!(names(&watcher), vec!["n1", "n2"]);
    assert_eq!(watcher.resource_version().as_deref(), Some("101"));
    assert!(watcher.get("n1").is_some());
}

#[tokio::test]
async fn test_failed_warm_up_leaves_kind_empty() {
    let source = MockSource::<Node>::failing();
    let watcher = node_watcher(&source);

    let err = watcher.warm_up(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, Error::WarmUp { kind: ResourceKind::Nodes, .. }));
    assert!(watcher.is_empty());
    assert_eq!(watcher.state(), WatchState::Uninitialized);
}

#[tokio::test]
async fn test_cancelled_warm_up_leaves_kind_empty() {
    let source = MockSource::<Node>::hanging();
    let watcher = node_watcher(&source);
    let cancel = CancellationToken::new();

    let warm = {
        let watcher = watcher.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { watcher.warm_up(&cancel).await })
    };
    source.list_started.notified().await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(2), warm)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(Error::WarmUpCancelled(ResourceKind::Nodes))));
    assert!(watcher.is_empty());
    assert_eq!(watcher.state(), WatchState::Uninitialized);
    assert_eq!(watcher.resource_version(), None);
}

#[tokio::test]
async fn test_update_then_delete_leaves_other_node() {
    let source = MockSource::new(vec![
        node("n1", "1", &[("zone", "a")]),
        node("n2", "2", &[("zone", "a")]),
    ]);
    let watcher = node_watcher(&source);
    watcher.warm_up(&CancellationToken::new()).await.unwrap();
    let seen = record(&watcher);

    let events = source.open_stream();
    let stop = CancellationToken::new();
    let task = watcher.clone().spawn_run(stop.clone());

    events
        .send(Ok(WatchEvent::Modified(node("n1", "3", &[("zone", "b")]))))
        .unwrap();
    assert!(eventually(|| watcher.get("n1").as_deref().and_then(zone_of).as_deref() == Some("b")).await);

    events.send(Ok(WatchEvent::Deleted(node("n1", "4", &[])))).unwrap();
    assert!(eventually(|| watcher.len() == 1).await);

    assert_eq!(names(&watcher), vec!["n2"]);
    assert_eq!(watcher.resource_version().as_deref(), Some("4"));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![("modified", "n1".to_string()), ("deleted", "n1".to_string())]
    );

    stop.cancel();
    task.await.unwrap();
    assert_eq!(watcher.state(), WatchState::Stopped);
}

#[tokio::test]
async fn test_same_events_give_same_store() {
    async fn replay() -> Vec<(String, Option<String>)> {
        let source = MockSource::new(vec![node("n1", "1", &[("zone", "a")])]);
        let watcher = node_watcher(&source);
        watcher.warm_up(&CancellationToken::new()).await.unwrap();
        source.queue_events(vec![
            Ok(WatchEvent::Added(node("n2", "2", &[("zone", "a")]))),
            Ok(WatchEvent::Modified(node("n1", "3", &[("zone", "c")]))),
            Ok(WatchEvent::Deleted(node("n2", "4", &[]))),
            Ok(WatchEvent::Added(node("n3", "5", &[("zone", "b")]))),
        ]);

        let stop = CancellationToken::new();
        let task = watcher.clone().spawn_run(stop.clone());
        assert!(eventually(|| watcher.resource_version().as_deref() == Some("5")).await);
        stop.cancel();
        task.await.unwrap();

        let mut state: Vec<_> = watcher
            .get_all()
            .iter()
            .map(|n| (n.name_any(), zone_of(n)))
            .collect();
        state.sort();
        state
    }

    let first = replay().await;
    assert_eq!(first, replay().await);
    assert_eq!(
        first,
        vec![
            ("n1".to_string(), Some("c".to_string())),
            ("n3".to_string(), Some("b".to_string())),
        ]
    );
}

#[tokio::test]
async fn test_snapshot_is_not_affected_by_later_events() {
    let source = MockSource::new(vec![node("n1", "1", &[])]);
    let watcher = node_watcher(&source);
    watcher.warm_up(&CancellationToken::new()).await.unwrap();

    let before = watcher.get_all();
    let events = source.open_stream();
    let stop = CancellationToken::new();
    let task = watcher.clone().spawn_run(stop.clone());

    events.send(Ok(WatchEvent::Added(node("n2", "2", &[])))).unwrap();
    assert!(eventually(|| watcher.len() == 2).await);

    assert_eq!(before.len(), 1);
    assert_eq!(watcher.get_all().len(), 2);

    stop.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_expired_version_relists_and_replaces_store() {
    let source = MockSource::new(vec![node("n1", "1", &[])]);
    let watcher = node_watcher(&source);
    watcher.warm_up(&CancellationToken::new()).await.unwrap();
    let seen = record(&watcher);

    source.set_items(vec![node("n2", "7", &[])]);
    source.queue_events(vec![Ok(WatchEvent::Error(resource_expired_response(
        "too old resource version",
    )))]);

    let stop = CancellationToken::new();
    let task = watcher.clone().spawn_run(stop.clone());

    assert!(eventually(|| source.watch_count() == 2).await);
    assert_eq!(source.list_count(), 2);
    assert_eq!(source.watched_versions(), vec!["101", "102"]);
    assert_eq!(names(&watcher), vec!["n2"]);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![("modified", "n2".to_string()), ("deleted", "n1".to_string())]
    );

    stop.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_transient_error_resumes_without_relist() {
    let source = MockSource::new(vec![node("n1", "1", &[])]);
    let watcher = node_watcher(&source);
    watcher.warm_up(&CancellationToken::new()).await.unwrap();

    source.queue_events(vec![Err(Error::Custom("connection reset".to_string()))]);

    let stop = CancellationToken::new();
    let task = watcher.clone().spawn_run(stop.clone());

    assert!(eventually(|| source.watch_count() == 2).await);
    assert_eq!(source.list_count(), 1);
    assert_eq!(source.watched_versions(), vec!["101", "101"]);
    assert_eq!(names(&watcher), vec!["n1"]);

    stop.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_bookmark_advances_resource_version() {
    let source = MockSource::new(vec![node("n1", "1", &[])]);
    let watcher = node_watcher(&source);
    watcher.warm_up(&CancellationToken::new()).await.unwrap();

    let bookmark: WatchEvent<Node> = serde_json::from_value(json!({
        "type": "BOOKMARK",
        "object": {
            "apiVersion": "v1",
            "kind": "Node",
            "metadata": { "resourceVersion": "150" }
        }
    }))
    .unwrap();
    source.queue_events(vec![Ok(bookmark)]);

    let stop = CancellationToken::new();
    let task = watcher.clone().spawn_run(stop.clone());

    assert!(eventually(|| source.watch_count() == 2).await);
    assert_eq!(source.watched_versions(), vec!["101", "150"]);
    assert_eq!(watcher.len(), 1);

    stop.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_expired_version_when_opening_watch_relists() {
    let source = MockSource::new(vec![node("n1", "1", &[])]);
    let watcher = node_watcher(&source);
    watcher.warm_up(&CancellationToken::new()).await.unwrap();

    source.set_items(vec![node("n2", "7", &[]), node("n3", "8", &[])]);
    source.fail_next_watch(Error::Kube(kube::Error::Api(resource_expired_response(
        "too old resource version",
    ))));

    let stop = CancellationToken::new();
    let task = watcher.clone().spawn_run(stop.clone());

    assert!(eventually(|| source.watch_count() == 2).await);
    assert_eq!(source.list_count(), 2);
    assert_eq!(source.watched_versions(), vec!["101", "102"]);
    assert_eq!(names(&watcher), vec!["n2", "n3"]);
    assert_eq!(watcher.state(), WatchState::Active);

    stop.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_no_event_applied_after_stop() {
    for i in 0..50 {
        let source = MockSource::new(vec![node("n1", "1", &[])]);
        let watcher = node_watcher(&source);
        watcher.warm_up(&CancellationToken::new()).await.unwrap();

        let events = source.open_stream();
        let stop = CancellationToken::new();
        let task = watcher.clone().spawn_run(stop.clone());
        assert!(eventually(|| source.watch_count() == 1).await);

        stop.cancel();
        // The receiver may already be gone
        let _ = events.send(Ok(WatchEvent::Added(node(&format!("late{i}"), "2", &[]))));
        task.await.unwrap();

        assert_eq!(names(&watcher), vec!["n1"], "iteration {i}");
        assert_eq!(watcher.state(), WatchState::Stopped);
    }
}

#[tokio::test]
async fn test_new_session_waits_for_previous_loop() {
    let source = MockSource::new(vec![node("n1", "1", &[])]);
    let watcher = node_watcher(&source);
    watcher.warm_up(&CancellationToken::new()).await.unwrap();

    let first_stop = CancellationToken::new();
    let first = watcher.clone().spawn_run(first_stop.clone());
    assert!(eventually(|| watcher.loops_started() == 1).await);

    let second_stop = CancellationToken::new();
    let second = watcher.clone().spawn_run(second_stop.clone());
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(watcher.loops_started(), 1);

    first_stop.cancel();
    first.await.unwrap();
    assert!(eventually(|| watcher.loops_started() == 2).await);
    assert_eq!(watcher.state(), WatchState::Active);

    second_stop.cancel();
    second.await.unwrap();
}

#[tokio::test]
async fn test_closed_stream_reopens_after_restart_delay() {
    let source = MockSource::new(vec![node("n1", "1", &[])]);
    let watcher = Arc::new(ResourceWatcher::new(
        ResourceKind::Nodes,
        source.clone(),
        WatcherConfig {
            restart_delay: Duration::from_millis(300),
            ..fast_config()
        },
    ));
    watcher.warm_up(&CancellationToken::new()).await.unwrap();
    source.queue_events(Vec::new());
    source.queue_events(Vec::new());

    let stop = CancellationToken::new();
    let task = watcher.clone().spawn_run(stop.clone());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(source.watch_count(), 1);
    assert!(eventually(|| source.watch_count() == 2).await);

    stop.cancel();
    task.await.unwrap();
    assert!(source.watch_count() <= 3);
}

#[tokio::test]
async fn test_cleared_handler_is_not_called() {
    let source = MockSource::new(vec![node("n1", "1", &[])]);
    let watcher = node_watcher(&source);
    watcher.warm_up(&CancellationToken::new()).await.unwrap();
    let seen = record(&watcher);
    watcher.clear_update_handler();

    let events = source.open_stream();
    let stop = CancellationToken::new();
    let task = watcher.clone().spawn_run(stop.clone());
    events.send(Ok(WatchEvent::Added(node("n2", "2", &[])))).unwrap();
    assert!(eventually(|| watcher.len() == 2).await);

    assert!(seen.lock().unwrap().is_empty());

    stop.cancel();
    task.await.unwrap();
}
