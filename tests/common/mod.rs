//! # Shared fixture suite
//!
//! Factories and preload blocks used by the integration tests: users (one
//! explicit id, one automatic), a skill that belongs to a user, and two
//! single-fixture tables.

#![allow(dead_code)]

use std::sync::Arc;

use fixture_preload::prelude::*;
use fixture_preload::Catalog;

pub const TABLES: [&str; 4] = ["users", "skills", "preloads", "assets"];

/// Installs a test-writer subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn factories() -> Factories {
    let mut factories = Factories::new();
    factories
        .sequence("email", |n| Value::from(format!("john{}@doe.com", n)))
        .define("user", "users", |f| {
            f.value("name", "John Doe")
                .attr("email", |ctx| ctx.generate("email"))
                .value("invitations", 0)
                .required("email");
        })
        .define("skill", "skills", |f| {
            f.value("name", "Ruby")
                .attr("user", |ctx| ctx.fixture("users", "john").map(Value::from));
        })
        .define("preload", "preloads", |f| {
            f.value("name", "My Preload");
        })
        .define("asset", "assets", |f| {
            f.value("name", "Some asset");
        });
    factories
}

pub fn registry() -> PreloadRegistry {
    let mut registry = PreloadRegistry::new();
    registry
        .register("users", |d| {
            d.define_with_id("ivan", 1, |ctx| ctx.create("user", attrs! {}))
                .define_auto("john", |ctx| ctx.create("user", attrs! {}));
        })
        .register("skills", |d| {
            d.define_auto("ruby", |ctx| {
                let john = ctx.fixture("users", "john")?;
                ctx.create("skill", attrs! { "user" => john })
            });
        })
        .register("preloads", |d| {
            d.define_auto("my", |ctx| ctx.create("preload", attrs! {}));
        })
        .register("assets", |d| {
            d.define_auto("asset", |ctx| ctx.create("asset", attrs! {}));
        });
    registry
}

pub fn catalog() -> Arc<Catalog> {
    Arc::new(
        registry()
            .seal(Config::default())
            .expect("suite declarations are consistent"),
    )
}

pub fn session_for(catalog: Arc<Catalog>) -> FixtureSession {
    FixtureSession::new(
        catalog,
        Arc::new(factories()),
        Box::new(MemoryStorage::with_tables(TABLES)),
    )
    .expect("storage has every managed table")
}

pub fn session() -> FixtureSession {
    init_tracing();
    session_for(catalog())
}
