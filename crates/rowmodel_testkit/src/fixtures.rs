//! Fixture models and the test harness.
//!
//! | model | primary key | notes |
//! |---|---|---|
//! | [`Robot`] | `id` (auto-increment) | default routing |
//! | [`Order`] | `id` (auto-increment) | source `orders_<tenant>`, no route without a tenant |
//! | [`Counter`] | `name`, `day` | composite key |
//! | [`AuditLog`] | none | never exists |
//! | [`Gadget`] | `id` (auto-increment) | hooks that stamp, cancel, revert and fetch |

use crate::spy::SpyConnection;
use rowmodel_core::{
    Connection, Entity, Flow, MetadataRegistry, Model, ModelMetadata, Orm, OrmConfig, Route,
    RouteContext, Value,
};
use rowmodel_memory::MemoryConnection;
use std::sync::Arc;

/// Tenants whose order sources have an identity column.
pub const ORDER_TENANTS: [i64; 3] = [7, 8, 9];

/// A plain model with default routing.
#[derive(Debug)]
pub struct Robot;

impl Model for Robot {
    const NAME: &'static str = "Robot";
}

/// An order, sharded by tenant into `orders_<tenant>`.
#[derive(Debug)]
pub struct Order;

impl Order {
    /// Physical source of a tenant's orders.
    pub fn source_for(tenant: i64) -> String {
        format!("orders_{tenant}")
    }
}

impl Model for Order {
    const NAME: &'static str = "Order";

    fn source(context: &RouteContext<'_>) -> Route {
        context
            .get("tenant")
            .and_then(Value::to_i64)
            .map(Order::source_for)
            .into()
    }
}

/// A per-day hit counter keyed by `(name, day)`.
#[derive(Debug)]
pub struct Counter;

impl Model for Counter {
    const NAME: &'static str = "Counter";
}

/// An append-only log without a primary key.
#[derive(Debug)]
pub struct AuditLog;

impl Model for AuditLog {
    const NAME: &'static str = "AuditLog";
}

/// A model whose hooks do things.
///
/// - `before_save` stamps `stamp` with `"saved"`
/// - `before_create` cancels when `name` is `"forbidden"`
/// - `before_update` cancels when `name` is `"frozen"` and restores the
///   stored name when `name` is `"undo"`
/// - `before_delete` cancels when `locked` is true
/// - `after_fetch` sets the transient field `fetched`
#[derive(Debug)]
pub struct Gadget;

impl Model for Gadget {
    const NAME: &'static str = "Gadget";

    fn transient_fields() -> &'static [&'static str] {
        &["fetched"]
    }

    fn before_save(entity: &mut Entity<Self>) -> Flow {
        match entity.set("stamp", "saved") {
            Ok(()) => Flow::Continue,
            Err(_) => Flow::Cancel,
        }
    }

    fn before_create(entity: &mut Entity<Self>) -> Flow {
        cancel_if(entity.get("name") == &Value::from("forbidden"))
    }

    fn before_update(entity: &mut Entity<Self>) -> Flow {
        if entity.get("name") == &Value::from("undo") {
            if let Some(stored) = entity.snapshot().and_then(|s| s.get("name")).cloned() {
                entity.set("name", stored).expect("name is an attribute");
            }
        }
        cancel_if(entity.get("name") == &Value::from("frozen"))
    }

    fn before_delete(entity: &mut Entity<Self>) -> Flow {
        cancel_if(entity.get("locked") == &Value::Bool(true))
    }

    fn after_fetch(entity: &mut Entity<Self>) {
        entity.set("fetched", true).expect("fetched is transient");
    }
}

fn cancel_if(cancel: bool) -> Flow {
    if cancel {
        Flow::Cancel
    } else {
        Flow::Continue
    }
}

/// Metadata for every fixture model.
pub fn fixture_metadata() -> MetadataRegistry {
    let registry = MetadataRegistry::new();
    registry
        .register_model::<Robot>(
            ModelMetadata::new(["id", "name", "type", "year"])
                .primary_key(["id"])
                .auto_increment("id"),
        )
        .expect("Robot metadata");
    registry
        .register_model::<Order>(
            ModelMetadata::new(["id", "tenant", "total", "status"])
                .primary_key(["id"])
                .auto_increment("id"),
        )
        .expect("Order metadata");
    registry
        .register_model::<Counter>(ModelMetadata::new(["name", "day", "hits"]).primary_key(["name", "day"]))
        .expect("Counter metadata");
    registry
        .register_model::<AuditLog>(ModelMetadata::new(["message", "level"]))
        .expect("AuditLog metadata");
    registry
        .register_model::<Gadget>(
            ModelMetadata::new(["id", "name", "locked", "stamp"])
                .primary_key(["id"])
                .auto_increment("id"),
        )
        .expect("Gadget metadata");
    registry
}

/// A memory connection with identity columns for the fixture sources.
pub fn fixture_memory() -> MemoryConnection {
    let mut memory = MemoryConnection::new()
        .with_auto_increment("robot", "id")
        .with_auto_increment("gadget", "id");
    for tenant in ORDER_TENANTS {
        memory = memory.with_auto_increment(Order::source_for(tenant), "id");
    }
    memory
}

/// An [`Orm`] over a [`SpyConnection`] registered as the default connection.
pub struct TestOrm {
    /// The runtime context.
    pub orm: Orm,
    /// The default connection.
    pub spy: Arc<SpyConnection>,
}

impl TestOrm {
    /// Creates a harness with the default configuration.
    pub fn new() -> Self {
        Self::with_config(OrmConfig::default())
    }

    /// Creates a harness with a custom configuration.
    ///
    /// The spy is registered under the configured default connection name.
    pub fn with_config(config: OrmConfig) -> Self {
        let spy = Arc::new(SpyConnection::new(fixture_memory()));
        let connection: Arc<dyn Connection> = spy.clone();
        let orm = Orm::builder()
            .connection(config.default_connection.clone(), connection)
            .config(config)
            .metadata(Arc::new(fixture_metadata()))
            .build()
            .expect("Failed to build test orm");
        Self { orm, spy }
    }

    /// The memory connection behind the spy.
    pub fn memory(&self) -> &MemoryConnection {
        self.spy.memory()
    }

    /// Inserts a robot directly and returns its id.
    pub fn seed_robot(&self, name: &str, kind: &str, year: i64) -> i64 {
        let mut robot = self.orm.entity::<Robot>();
        robot.set("name", name).expect("name");
        robot.set("type", kind).expect("type");
        robot.set("year", year).expect("year");
        robot.create().expect("Failed to seed robot");
        self.spy.reset();
        robot.get("id").as_integer().expect("Robot id")
    }
}

impl Default for TestOrm {
    fn default() -> Self {
        Self::new()
    }
}
