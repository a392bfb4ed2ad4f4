//! Integration tests for shard routing.

use rowmodel_core::query::{Conditions, Params};
use rowmodel_core::{
    row, Entity, MetadataProvider, Model, ModelError, ModelMetadata, Orm, OrmConfig, Route,
    RouteContext, RouteTarget, Value,
};
use rowmodel_testkit::prelude::*;
use std::sync::Arc;

fn order(t: &TestOrm, tenant: i64, total: i64) -> Entity<Order> {
    let mut order = t.orm.entity::<Order>();
    order
        .assign(&row! { "tenant" => tenant, "total" => total, "status" => "open" }, None)
        .unwrap();
    order
}

#[test]
fn writes_follow_the_tenant() {
    init_tracing();
    let t = TestOrm::new();

    let mut seven = order(&t, 7, 100);
    seven.create().unwrap();
    let mut eight = order(&t, 8, 250);
    eight.create().unwrap();

    let sources: Vec<String> = t.spy.calls().iter().map(|c| c.source().to_string()).collect();
    assert_eq!(sources, ["orders_7", "orders_8"]);
    // Each shard has its own identity sequence.
    assert_eq!(seven.get("id"), &Value::Integer(1));
    assert_eq!(eight.get("id"), &Value::Integer(1));
    assert_eq!(t.memory().len("orders_7"), 1);
    assert_eq!(t.memory().len("orders_8"), 1);
}

#[test]
fn missing_tenant_fails_before_io() {
    let t = TestOrm::new();
    let mut order = t.orm.entity::<Order>().with("total", 5).unwrap();

    let err = order.create().unwrap_err();
    assert!(matches!(
        err,
        ModelError::ShardingFailed {
            model: "Order",
            target: RouteTarget::Source,
            operation: "create",
        }
    ));
    assert!(err.is_local());
    assert_eq!(t.spy.call_count(), 0);
}

#[test]
fn sharding_failure_precedes_events() {
    let t = TestOrm::new();
    let rx = t.orm.events().watch();

    let mut order = t.orm.entity::<Order>().with("total", 5).unwrap();
    assert!(order.create().is_err());
    assert!(rx.try_recv().is_err());
}

#[test]
fn entity_update_and_delete_route_by_fields() {
    let t = TestOrm::new();
    let mut order = order(&t, 7, 100);
    order.create().unwrap();
    t.spy.reset();

    order.set("status", "paid").unwrap();
    order.update().unwrap();
    order.delete().unwrap();

    let calls = t.spy.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.source() == "orders_7"));
    assert!(t.memory().is_empty("orders_7"));
}

#[test]
fn bulk_writes_route_by_conditions() {
    let t = TestOrm::new();
    order(&t, 7, 100).create().unwrap();
    order(&t, 7, 300).create().unwrap();
    order(&t, 9, 100).create().unwrap();
    t.spy.reset();

    let repo = t.orm.repository::<Order>();
    let paid = repo
        .update_all(
            &row! { "status" => "paid" },
            &Conditions::new().eq("tenant", 7).gt("total", 200),
        )
        .unwrap();
    assert_eq!(paid, 1);
    assert_eq!(t.spy.last_call().unwrap().source(), "orders_7");

    let removed = repo
        .delete_all(&Conditions::new().eq("tenant", 9))
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(t.spy.last_call().unwrap().source(), "orders_9");
    assert_eq!(t.memory().len("orders_7"), 2);
}

#[test]
fn bulk_values_can_carry_the_route() {
    let t = TestOrm::new();
    order(&t, 8, 100).create().unwrap();

    let affected = t
        .orm
        .repository::<Order>()
        .update_all(
            &row! { "tenant" => 8, "status" => "void" },
            &Conditions::new().eq("status", "open"),
        )
        .unwrap();
    assert_eq!(affected, 1);
    assert_eq!(t.spy.last_call().unwrap().source(), "orders_8");
}

#[test]
fn bulk_without_tenant_fails() {
    let t = TestOrm::new();

    let err = t
        .orm
        .repository::<Order>()
        .delete_all(&Conditions::new().eq("status", "open"))
        .unwrap_err();
    assert!(matches!(
        err,
        ModelError::ShardingFailed {
            operation: "deleteAll",
            ..
        }
    ));
    assert_eq!(t.spy.call_count(), 0);
}

#[test]
fn reads_route_by_equality_filters() {
    let t = TestOrm::new();
    order(&t, 7, 100).create().unwrap();
    order(&t, 8, 250).create().unwrap();
    order(&t, 8, 50).create().unwrap();
    t.spy.reset();

    let repo = t.orm.repository::<Order>();
    let found = repo.find(Params::new().where_eq("tenant", 8)).unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(t.spy.last_call().unwrap().source(), "orders_8");

    let count = repo.count(Params::new().where_eq("tenant", 7), None).unwrap();
    assert_eq!(count, 1);
    assert_eq!(t.spy.last_call().unwrap().source(), "orders_7");

    let raw = repo
        .exists(Params::new().filter_with("[tenant]=:tenant", row! { "tenant" => 8 }))
        .unwrap_err();
    // The memory connection does not evaluate raw filters, but it was asked.
    assert!(raw.is_storage());
    assert_eq!(t.spy.last_call().unwrap().source(), "orders_8");
}

#[test]
fn shard_for_resolves_without_io() {
    let t = TestOrm::new();
    let shard = t
        .orm
        .repository::<Order>()
        .shard_for(&row! { "tenant" => 9 }, "find")
        .unwrap();

    assert_eq!(shard.connection, "db");
    assert_eq!(shard.source, "orders_9");
    assert_eq!(t.spy.call_count(), 0);
}

#[test]
fn table_prefix_applies_to_derived_sources() {
    let t = TestOrm::with_config(OrmConfig::new().table_prefix("app_"));
    t.orm
        .entity::<Robot>()
        .with("name", "R2-D2")
        .unwrap()
        .create()
        .unwrap();
    t.orm.entity::<Order>()
        .with("tenant", 7)
        .unwrap()
        .create()
        .unwrap();

    let sources: Vec<String> = t.spy.calls().iter().map(|c| c.source().to_string()).collect();
    // Explicit routes are used as given.
    assert_eq!(sources, ["app_robot", "orders_7"]);
}

#[test]
fn configured_default_connection() {
    let t = TestOrm::with_config(OrmConfig::new().default_connection("primary"));
    let id = t.seed_robot("Bender", "mechanical", 1999);

    let shard = t.orm.repository::<Robot>().shard_for(&row! {}, "find").unwrap();
    assert_eq!(shard.connection, "primary");
    assert!(t.orm.repository::<Robot>().exists(id).unwrap());
}

/// Archived robots live on their own connection.
struct Archived;

impl Model for Archived {
    const NAME: &'static str = "Archived";

    fn connection(_context: &RouteContext<'_>) -> Route {
        Route::to("archive")
    }
}

fn archive_metadata() -> Arc<dyn MetadataProvider> {
    let registry = fixture_metadata();
    registry
        .register_model::<Archived>(ModelMetadata::new(["id", "name"]).primary_key(["id"]))
        .unwrap();
    Arc::new(registry)
}

#[test]
fn unregistered_connection_is_reported() {
    let orm = Orm::builder()
        .metadata(archive_metadata())
        .build()
        .unwrap();

    let err = orm
        .entity::<Archived>()
        .with("name", "C-3PO")
        .unwrap()
        .create()
        .unwrap_err();
    assert!(matches!(err, ModelError::UnknownConnection { ref name } if name == "archive"));
}

#[test]
fn models_route_to_their_own_connection() {
    let main = Arc::new(SpyConnection::new(fixture_memory()));
    let archive = Arc::new(SpyConnection::default());
    let orm = Orm::builder()
        .connection("db", main.clone())
        .connection("archive", archive.clone())
        .metadata(archive_metadata())
        .build()
        .unwrap();

    orm.entity::<Archived>()
        .with("id", 1)
        .unwrap()
        .with("name", "C-3PO")
        .unwrap()
        .create()
        .unwrap();

    assert_eq!(main.call_count(), 0);
    assert_eq!(archive.inserts(), 1);
    assert_eq!(archive.memory().rows("archived")[0]["name"], Value::from("C-3PO"));
}
