//! Cleanup between tests and configuration of the identifier table.

mod common;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use fixture_preload::prelude::*;
use fixture_preload::{identifiers, AutoIds, DuplicatePolicy, ErrorKind};

#[cfg(test)]
mod cleanup_tests {
    use super::*;

    #[test]
    fn truncates_tables_between_tests() {
        let mut session = common::session();
        session.get("users", "john").unwrap();
        assert_eq!(session.count("users").unwrap(), 1);

        session.clean().unwrap();
        assert_eq!(session.count("users").unwrap(), 0);
        assert!(session.cache().is_empty());
        assert_eq!(session.materialized(), 0);
        assert_eq!(session.count("schema_migrations").unwrap(), 1);
    }

    #[test]
    fn changes_do_not_survive_the_test() {
        let mut session = common::session();
        {
            let mut test = session.scope();
            let john = test.get("users", "john").unwrap();
            john.increment("invitations").unwrap();
            test.save(&john).unwrap();
            assert_eq!(test.get("users", "john").unwrap().get("invitations"), Some(Value::Int(1)));
        }
        {
            let mut test = session.scope();
            let john = test.get("users", "john").unwrap();
            assert_eq!(john.get("invitations"), Some(Value::Int(0)));
            assert!(!john.is_frozen());
        }
    }

    #[test]
    fn destroyed_fixture_comes_back_next_test() {
        let mut session = common::session();
        let first = {
            let mut test = session.scope();
            let john = test.get("users", "john").unwrap();
            test.destroy(&john).unwrap();
            john
        };
        let second = session.get("users", "john").unwrap();
        assert!(first.is_frozen());
        assert!(!second.is_frozen());
        assert!(!second.same_as(&first));
        assert_eq!(second.id(), first.id());
    }

    #[test]
    fn ids_are_stable_across_clean_cycles() {
        let mut session = common::session();
        let mut seen = Vec::new();
        for _ in 0..3 {
            let mut test = session.scope();
            let ivan = test.get("users", "ivan").unwrap();
            let john = test.get("users", "john").unwrap();
            seen.push((ivan.id().unwrap(), john.id().unwrap()));
            test.finish().unwrap();
        }
        assert!(seen.iter().all(|ids| *ids == (RecordId::new(1), RecordId::new(2))));
    }

    #[test]
    fn ad_hoc_records_never_take_fixture_ids() {
        let mut session = common::session();
        let extra = session.create("user", attrs! { "name" => "Jane" }).unwrap();
        assert!(extra.id().unwrap() > RecordId::new(2));

        let john = session.get("users", "john").unwrap();
        assert_eq!(john.id(), Some(RecordId::new(2)));
        assert_eq!(session.count("users").unwrap(), 2);
    }

    #[test]
    fn panicking_test_is_still_cleaned() {
        let mut session = common::session();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut test = session.scope();
            test.get("skills", "ruby").unwrap();
            panic!("assertion failed inside the test");
        }));
        assert!(outcome.is_err());
        assert_eq!(session.count("users").unwrap(), 0);
        assert_eq!(session.count("skills").unwrap(), 0);
        assert!(session.cache().is_empty());
    }

    #[test]
    fn reload_reads_the_stored_row() {
        let mut session = common::session();
        let john = session.get("users", "john").unwrap();
        john.set("name", "Changed").unwrap();
        session.reload(&john).unwrap();
        assert_eq!(john.get("name"), Some(Value::from("John Doe")));

        session.destroy(&john).unwrap();
        let err = session.reload(&john).unwrap_err();
        assert!(matches!(err, FixtureError::MissingRow { .. }));
    }
}

#[cfg(test)]
mod reserved_table_tests {
    use super::*;

    fn registry_with_reserved() -> PreloadRegistry {
        let mut registry = common::registry();
        registry
            .register("schema_migrations", |d| {
                d.define_auto("version", |ctx| ctx.create("user", attrs! {}));
            })
            .register("internal_metadata", |_| {});
        registry
    }

    #[test]
    fn ignores_reserved_table_names() {
        let catalog = Arc::new(registry_with_reserved().seal(Config::default()).unwrap());
        let mut session = common::session_for(catalog);

        assert!(session.accessor("schema_migrations").is_none());
        assert!(session.accessors().is_excluded("internal_metadata"));
        let err = session.get("schema_migrations", "version").unwrap_err();
        assert!(matches!(err, FixtureError::ReservedTable { .. }));
        assert!(!session
            .cleaner()
            .tables()
            .iter()
            .any(|t| t == "schema_migrations"));

        session.clean().unwrap();
        assert_eq!(session.count("schema_migrations").unwrap(), 1);
    }

    #[test]
    fn unknown_tables_are_reported() {
        let mut session = common::session();
        let err = session.get("comments", "first").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(matches!(err, FixtureError::UnknownTable { .. }));
    }

    #[test]
    fn extra_tables_are_truncated_too() {
        let catalog = Arc::new(
            common::registry()
                .seal(Config::default().with_extra_table("audit"))
                .unwrap(),
        );
        let mut storage = MemoryStorage::with_tables(common::TABLES);
        storage.create_table("audit");
        storage.insert("audit", None, attrs! { "event" => "login" }).unwrap();
        let mut session =
            FixtureSession::new(catalog, Arc::new(common::factories()), Box::new(storage)).unwrap();

        assert!(session.accessor("audit").is_none());
        session.clean().unwrap();
        assert_eq!(session.count("audit").unwrap(), 0);
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn hashed_ids_follow_the_fixture_name() {
        let config = Config::from_yaml_str("auto_ids:\n  strategy: hashed\n  ceiling: 1000000\n").unwrap();
        let catalog = Arc::new(common::registry().seal(config).unwrap());
        let expected = identifiers::hashed_id("john", 1_000_000);
        assert_eq!(catalog.id_for("users", "john").unwrap(), expected);
        assert_eq!(catalog.id_for("users", "ivan").unwrap(), RecordId::new(1));

        let mut session = common::session_for(catalog);
        let john = session.get("users", "john").unwrap();
        assert_eq!(john.id(), Some(expected));
    }

    #[test]
    fn sequential_ids_can_start_elsewhere() {
        let config = Config::default().with_auto_ids(AutoIds::Sequential { start: 100 });
        let catalog = common::registry().seal(config).unwrap();
        assert_eq!(catalog.id_for("users", "john").unwrap(), RecordId::new(100));
        assert_eq!(catalog.id_for("skills", "ruby").unwrap(), RecordId::new(100));
    }

    #[test]
    fn duplicate_names_follow_the_policy() {
        let mut registry = common::registry();
        registry.register("users", |d| {
            d.define_auto("john", |ctx| ctx.create("user", attrs! { "name" => "Second John" }));
        });
        let err = registry.clone().seal(Config::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Declaration);

        let catalog = registry
            .seal(Config::default().with_duplicates(DuplicatePolicy::Overwrite))
            .unwrap();
        let mut session = common::session_for(Arc::new(catalog));
        let john = session.get("users", "john").unwrap();
        assert_eq!(john.get("name"), Some(Value::from("Second John")));
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        let err = Config::from_json_str(r#"{ "auto_id": "sequential" }"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn explicit_ids_must_fit_a_signed_column() {
        let mut registry = common::registry();
        registry.register("assets", |d| {
            d.define_with_id("root", u64::MAX, |ctx| ctx.create("asset", attrs! {}));
        });
        let err = registry.seal(Config::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Declaration);
        assert!(matches!(err, FixtureError::IdOutOfRange { ref table, .. } if table == "assets"));
    }

    #[test]
    fn largest_id_still_opens_a_session() {
        let mut registry = common::registry();
        registry.register("assets", |d| {
            d.define_with_id("root", RecordId::MAX.get(), |ctx| ctx.create("asset", attrs! {}));
        });
        let catalog = Arc::new(registry.seal(Config::default()).unwrap());
        let mut session = common::session_for(catalog);

        let root = session.get("assets", "root").unwrap();
        assert_eq!(root.id(), Some(RecordId::MAX));
        let err = session.create("asset", attrs! {}).unwrap_err();
        assert!(matches!(err, FixtureError::IdsExhausted { .. }));

        session.clean().unwrap();
        assert_eq!(session.get("assets", "root").unwrap().id(), Some(RecordId::MAX));
    }
}
