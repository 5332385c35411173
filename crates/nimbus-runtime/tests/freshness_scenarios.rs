//! End-to-end freshness scenarios: stores on a mock transport, updaters and
//! services on a lab clock.

use std::rc::Rc;

use nimbus_core::{CellError, DependencyId, Duration, FieldType, LabClock, Scheduler, Value};
use nimbus_model::{
    Collection, Endpoint, FieldSpec, HttpStore, MockTransport, Model, ModelError, Schema,
    SyncOutcome, SyncStatus,
};
use nimbus_runtime::{
    DependencyService, FetchingLiveUpdater, IntervalStrategy, LiveUpdater, PollingLiveUpdater,
    RuntimeContext, Service, StaleAfterStrategy, UpdateTrigger, UpdaterState,
};
use serde_json::json;

struct World {
    clock: LabClock,
    scheduler: Scheduler,
    mock: MockTransport,
}

impl World {
    fn new() -> Self {
        let clock = LabClock::new();
        let scheduler = Scheduler::lab(&clock);
        Self {
            clock,
            scheduler,
            mock: MockTransport::new(),
        }
    }

    fn store(&self, resource: &str) -> Rc<HttpStore> {
        Rc::new(
            HttpStore::builder(
                Endpoint::new("/proxy").segment(resource),
                self.mock.shared(),
                &self.scheduler,
            )
            .timeout(Duration::from_secs(10))
            .build(),
        )
    }
}

fn volume_schema() -> Rc<Schema> {
    Schema::builder("volume")
        .field(FieldSpec::new("id", FieldType::Number).required())
        .field(FieldSpec::new("size", FieldType::Number).required().default_value(0))
        .field(FieldSpec::new("name", FieldType::String))
        .build()
        .unwrap()
}

fn ids(collection: &Collection) -> Vec<String> {
    collection.with_models(|models| models.iter().filter_map(Model::id).collect())
}

#[test]
fn polled_listing_drops_vanished_members() {
    let world = World::new();
    let volumes = Collection::new(&volume_schema()).with_store(world.store("volumes"));
    let poller = PollingLiveUpdater::new(
        Rc::new(volumes.clone()),
        &world.scheduler,
        Duration::from_millis(500),
    );

    poller.start();
    world
        .mock
        .respond_ok(json!([{"id": 1, "size": 10}, {"id": 2, "size": 20}]));
    assert_eq!(ids(&volumes), ["1", "2"]);
    let kept = volumes.get("2").unwrap();

    world.scheduler.advance(Duration::from_millis(500));
    world.mock.respond_ok(json!([{"id": 2, "size": 25}]));
    assert_eq!(ids(&volumes), ["2"]);
    assert!(volumes.get("2").unwrap().same_as(&kept));
    assert_eq!(kept.get("size").unwrap(), Value::from(25));
    assert_eq!(volumes.status(), SyncStatus::Synced);
}

#[test]
fn polling_fetches_once_before_the_first_interval() {
    let world = World::new();
    let volumes = Collection::new(&volume_schema()).with_store(world.store("volumes"));
    let poller = PollingLiveUpdater::new(
        Rc::new(volumes),
        &world.scheduler,
        Duration::from_millis(1_000),
    );

    poller.start();
    assert_eq!(world.mock.request_count(), 1);
    world.scheduler.advance(Duration::from_millis(9_000));
    assert_eq!(world.mock.request_count(), 1, "next cycle waits for completion");

    world.mock.respond_ok(json!([]));
    world.scheduler.advance(Duration::from_millis(999));
    assert_eq!(world.mock.request_count(), 1);
    world.scheduler.advance(Duration::from_millis(1));
    assert_eq!(world.mock.request_count(), 2);
}

#[test]
fn timeout_returns_updater_to_idle_and_drops_late_reply() {
    let world = World::new();
    let model = Model::new(&volume_schema())
        .unwrap()
        .with_store(world.store("volumes"));
    let updater = FetchingLiveUpdater::new(Rc::new(model.clone()));

    assert_eq!(updater.update(), UpdateTrigger::Started);
    assert_eq!(updater.update(), UpdateTrigger::InFlight);
    world.scheduler.advance(Duration::from_secs(10));
    assert_eq!(updater.state(), UpdaterState::Idle);
    assert_eq!(updater.last_outcome(), Some(SyncOutcome::TimedOut));

    world.mock.respond_ok(json!({"id": 7, "size": 1}));
    assert_eq!(model.get("id").unwrap(), Value::Null);
    assert_eq!(model.status(), SyncStatus::TimedOut);
}

#[test]
fn disposed_updater_ignores_late_completion() {
    let world = World::new();
    let model = Model::new(&volume_schema())
        .unwrap()
        .with_store(world.store("volumes"));
    let updater = FetchingLiveUpdater::new(Rc::new(model.clone()));
    let seen = Rc::new(std::cell::Cell::new(0));
    let s = Rc::clone(&seen);
    updater.on_complete(move |_| s.set(s.get() + 1));

    updater.update();
    updater.dispose();
    world.mock.respond_ok(json!({"id": 3, "size": 4}));
    assert_eq!(seen.get(), 0);
    // The target itself still applies the response.
    assert_eq!(model.get("id").unwrap(), Value::from(3));
}

#[test]
fn required_number_rejects_null_and_keeps_default() {
    let model = Model::new(&volume_schema()).unwrap();
    assert_eq!(model.get("size").unwrap(), Value::from(0));
    let err = model.set("size", Value::Null).unwrap_err();
    assert!(matches!(err, ModelError::Cell(CellError::NullViolation { .. })));
    assert_eq!(model.get("size").unwrap(), Value::from(0));
}

#[test]
fn service_drives_mixed_dependencies() {
    let world = World::new();
    let context = RuntimeContext::new(&world.scheduler);
    context.bind_url("/proxy/volumes", IntervalStrategy::from_millis(2_000));
    let service = DependencyService::new(&context);

    let volumes = Collection::new(&volume_schema()).with_store(world.store("volumes"));
    let quota = Model::new(&volume_schema())
        .unwrap()
        .with_store(world.store("quota"));
    let volumes_key = service.register(volumes.clone()).unwrap();
    let quota_key = service.register(quota).unwrap();
    assert_eq!(quota_key, DependencyId::from_url("/proxy/quota"));

    service.update();
    assert_eq!(world.mock.request_count(), 2);
    assert!(service.is_polling(&volumes_key));
    assert!(!service.is_polling(&quota_key));
    assert!(!service.is_loaded());

    world.mock.respond_ok(json!([{"id": 1, "size": 3}]));
    world.mock.respond_ok(json!({"id": 9, "size": 100}));
    assert!(service.is_loaded());
    assert!(!service.is_error());

    world.scheduler.advance(Duration::from_millis(2_000));
    assert_eq!(world.mock.requests()[2].url, "/proxy/volumes");
    world.mock.respond_next(Ok(nimbus_model::HttpResponse::new(
        503,
        json!({"message": "maintenance"}),
    )));
    assert!(service.is_error());
    assert_eq!(service.status(&volumes_key), Some(SyncStatus::Failed));
    assert_eq!(volumes.len(), 1, "failed sync keeps the last listing");
}

#[test]
fn stale_after_polls_only_when_stale() {
    let world = World::new();
    let context = RuntimeContext::new(&world.scheduler);
    context.bind_url(
        "/proxy/volumes",
        StaleAfterStrategy::new(Duration::from_secs(60), &world.scheduler),
    );
    let service = DependencyService::new(&context);
    let volumes = Collection::new(&volume_schema()).with_store(world.store("volumes"));
    let key = service.register(volumes).unwrap();

    service.update();
    assert!(service.is_polling(&key));
    world.mock.respond_ok(json!([]));

    world.clock.advance(Duration::from_secs(30));
    service.update();
    assert!(!service.is_polling(&key), "fresh data stops the poller");
    assert_eq!(world.mock.request_count(), 1);

    world.clock.advance(Duration::from_secs(30));
    service.update();
    assert!(service.is_polling(&key));
    assert_eq!(world.mock.request_count(), 2);
}

#[test]
fn rebound_listing_keeps_a_single_fetch_in_flight() {
    let world = World::new();
    let context = RuntimeContext::new(&world.scheduler);
    let service = DependencyService::new(&context);
    let volumes = Collection::new(&volume_schema()).with_store(world.store("volumes"));
    let key = service.register(volumes.clone()).unwrap();

    service.update();
    context.bind_url("/proxy/volumes", IntervalStrategy::from_millis(1_000));
    service.update();
    assert!(service.is_polling(&key));
    assert_eq!(world.mock.request_count(), 1);
    assert_eq!(world.mock.pending_count(), 1);

    world.mock.respond_ok(json!([{"id": 1, "size": 3}]));
    world.scheduler.advance(Duration::from_millis(1_000));
    assert_eq!(world.mock.request_count(), 2);
    assert_eq!(volumes.len(), 1);
}
