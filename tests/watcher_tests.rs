use stagehand::domain::ContainerRecord;
use stagehand::infra::CatalogStore;
use stagehand::services::{CancelToken, WatchConfig, WatchOutcome, Watcher, watch_service};
use stagehand::test_support::{MockRuntime, exited_err, exited_ok, running};
use std::time::Duration;

fn fast_config() -> WatchConfig {
    WatchConfig {
        retry_max: 3,
        retry_delay: Duration::ZERO,
        poll_delay: Duration::ZERO,
    }
}

fn target() -> ContainerRecord {
    ContainerRecord::new("service-demo-1.2", "c1")
}

#[test]
fn normal_exit_ends_the_watch() {
    let runtime = MockRuntime::new();
    runtime.push_inspect("c1", running());
    runtime.push_inspect("c1", exited_ok());

    let mut watcher = Watcher::new(&runtime, target(), fast_config());
    let outcome = watcher.run(&CancelToken::new()).unwrap();

    assert_eq!(outcome, WatchOutcome::Stopped);
    assert_eq!(
        runtime.get_commands(),
        vec!["start:c1", "inspect:c1", "inspect:c1"]
    );
}

#[test]
fn abnormal_exit_restarts_exactly_once_before_the_next_inspect() {
    let runtime = MockRuntime::new();
    runtime.push_inspect("c1", running());
    runtime.push_inspect("c1", exited_err("oom killed"));
    runtime.push_inspect("c1", exited_ok());

    let mut watcher = Watcher::new(&runtime, target(), fast_config());
    let outcome = watcher.run(&CancelToken::new()).unwrap();

    assert_eq!(outcome, WatchOutcome::Stopped);
    assert_eq!(
        runtime.get_commands(),
        vec![
            "start:c1",
            "inspect:c1",
            "inspect:c1",
            "restart:c1",
            "inspect:c1",
        ]
    );
}

#[test]
fn three_inspect_failures_then_success_does_not_abort() {
    let runtime = MockRuntime::new();
    runtime.push_inspect("c1", running());
    for _ in 0..3 {
        runtime.push_inspect_error("c1", "daemon hiccup");
    }
    runtime.push_inspect("c1", exited_ok());

    let mut watcher = Watcher::new(&runtime, target(), fast_config());
    let outcome = watcher.run(&CancelToken::new()).unwrap();
    assert_eq!(outcome, WatchOutcome::Stopped);
}

#[test]
fn four_consecutive_inspect_failures_abort() {
    let runtime = MockRuntime::new();
    runtime.push_inspect("c1", running());
    for _ in 0..4 {
        runtime.push_inspect_error("c1", "daemon gone");
    }

    let mut watcher = Watcher::new(&runtime, target(), fast_config());
    let err = watcher.run(&CancelToken::new()).unwrap_err();
    assert!(format!("{err:#}").contains("inspect retries exhausted"));
    // The fourth failure aborts without draining the rest of the budget.
    assert_eq!(runtime.command_count("restart:"), 0);
}

#[test]
fn a_success_restores_the_full_retry_budget() {
    let runtime = MockRuntime::new();
    runtime.push_inspect("c1", running());
    // Two failure streaks of three, separated by a success. Neither
    // streak exhausts the budget on its own.
    for _ in 0..3 {
        runtime.push_inspect_error("c1", "streak one");
    }
    runtime.push_inspect("c1", running());
    for _ in 0..3 {
        runtime.push_inspect_error("c1", "streak two");
    }
    runtime.push_inspect("c1", exited_ok());

    let mut watcher = Watcher::new(&runtime, target(), fast_config());
    assert_eq!(watcher.run(&CancelToken::new()).unwrap(), WatchOutcome::Stopped);
}

#[test]
fn cancellation_stops_the_container_exactly_once() {
    let runtime = MockRuntime::new();
    let token = CancelToken::new();
    // First inspect ends the wait phase; idle observations keep the
    // monitor loop spinning until the token trips.
    runtime.cancel_after_inspects(token.clone(), 3);

    let mut watcher = Watcher::new(&runtime, target(), fast_config());
    let outcome = watcher.run(&token).unwrap();

    assert_eq!(outcome, WatchOutcome::Cancelled);
    assert_eq!(runtime.command_count("stop:"), 1);
    assert_eq!(runtime.command_count("restart:"), 0);
    // The stop is the final runtime call of the session.
    assert_eq!(runtime.get_commands().last().unwrap(), "stop:c1");
}

#[test]
fn watch_resolves_the_container_through_the_catalog() {
    let store = CatalogStore::open_in_memory().unwrap();
    store.init_tables().unwrap();
    let record = ContainerRecord::new("service-demo-1.2", "c1");
    store.put(std::slice::from_ref(&record)).unwrap();

    let runtime = MockRuntime::new();
    runtime.push_inspect("c1", running());
    runtime.push_inspect("c1", exited_ok());

    let outcome = watch_service(
        &runtime,
        &store,
        "service-demo-1.2",
        &CancelToken::new(),
        fast_config(),
    )
    .unwrap();
    assert_eq!(outcome, WatchOutcome::Stopped);
    assert_eq!(runtime.command_count("start:c1"), 1);
}

#[test]
fn watching_an_uncatalogued_name_fails() {
    let store = CatalogStore::open_in_memory().unwrap();
    store.init_tables().unwrap();
    let runtime = MockRuntime::new();

    let err = watch_service(
        &runtime,
        &store,
        "ghost",
        &CancelToken::new(),
        fast_config(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("no catalogued container named"));
    assert!(runtime.get_commands().is_empty());
}
