//! Integration tests for the finder, aggregate and bulk facade.

use rowmodel_core::query::{AggregateArg, Conditions, Filter, Operator, Params, QuerySpec};
use rowmodel_core::{row, ModelError, Value};
use rowmodel_testkit::prelude::*;

/// Three robots with ids 1..=3.
fn robots() -> TestOrm {
    init_tracing();
    let t = TestOrm::new();
    t.seed_robot("Astro Boy", "mechanical", 1952);
    t.seed_robot("Bender", "mechanical", 1999);
    t.seed_robot("Robotina", "virtual", 1972);
    t
}

fn names<M: rowmodel_core::Model>(entities: &[rowmodel_core::Entity<M>]) -> Vec<String> {
    entities
        .iter()
        .map(|e| e.get("name").as_text().unwrap_or_default().to_string())
        .collect()
}

fn last_query(t: &TestOrm) -> QuerySpec {
    match t.spy.last_call() {
        Some(Call::Query(spec)) => spec,
        other => panic!("expected a query, got {other:?}"),
    }
}

#[test]
fn find_returns_hydrated_entities() {
    let t = robots();
    let repo = t.orm.repository::<Robot>();

    let all = repo.find(()).unwrap();
    assert_eq!(names(&all), ["Astro Boy", "Bender", "Robotina"]);
    assert!(all.iter().all(|r| r.changed_fields().unwrap().is_empty()));
    assert_eq!(last_query(&t).columns, ["id", "name", "type", "year"]);

    let mechanical = repo
        .find(Params::new().where_eq("type", "mechanical"))
        .unwrap();
    assert_eq!(names(&mechanical), ["Astro Boy", "Bender"]);

    let by_year = repo
        .find_all(Params::new().order("year DESC"))
        .unwrap();
    assert_eq!(names(&by_year), ["Bender", "Robotina", "Astro Boy"]);
}

#[test]
fn find_with_columns_and_keys() {
    let t = robots();

    let found = t
        .orm
        .repository::<Robot>()
        .find(Params::new().columns(["id", "name"]).in_keys([1, 3]))
        .unwrap();

    assert_eq!(names(&found), ["Astro Boy", "Robotina"]);
    assert_eq!(found[0].snapshot(), Some(&row! { "id" => 1, "name" => "Astro Boy" }));
    let spec = last_query(&t);
    assert_eq!(spec.columns, ["id", "name"]);
    assert_eq!(
        spec.filters,
        [Filter::In {
            field: "id".into(),
            values: vec![Value::Integer(1), Value::Integer(3)],
        }]
    );
}

#[test]
fn find_first_variants() {
    let t = robots();
    let repo = t.orm.repository::<Robot>();

    let first = repo
        .find_first(Params::new().where_eq("type", "mechanical").order("year DESC"))
        .unwrap()
        .unwrap();
    assert_eq!(first.get("name"), &Value::from("Bender"));
    assert_eq!(last_query(&t).limit, Some(1));

    let by_key = repo.find_first(3).unwrap().unwrap();
    assert_eq!(by_key.get("name"), &Value::from("Robotina"));

    assert!(repo.find_first(42).unwrap().is_none());
    assert!(repo
        .find_first(Params::new().where_eq("type", "android"))
        .unwrap()
        .is_none());
}

#[test]
fn find_by_id_restricts_fields() {
    let t = robots();

    let robot = t
        .orm
        .repository::<Robot>()
        .find_by_id(2, Some(&["name"][..]))
        .unwrap()
        .unwrap();

    assert_eq!(robot.fields(), &row! { "name" => "Bender" });
    let spec = last_query(&t);
    assert_eq!(spec.columns, ["name"]);
    assert_eq!(spec.limit, Some(1));
}

#[test]
fn key_lookups_validate_their_input() {
    let t = robots();

    let err = t
        .orm
        .repository::<Robot>()
        .find_by_id(vec![1, 2], None)
        .unwrap_err();
    assert!(matches!(err, ModelError::InvalidArgument { model: "Robot", .. }));

    let err = t.orm.repository::<Counter>().find_by_id(1, None).unwrap_err();
    assert!(matches!(err, ModelError::SchemaError { model: "Counter", .. }));

    let err = t.orm.repository::<Counter>().exists(1).unwrap_err();
    assert!(matches!(err, ModelError::SchemaError { .. }));

    let err = t.orm.repository::<AuditLog>().exists(1).unwrap_err();
    assert!(matches!(err, ModelError::SchemaError { .. }));

    assert_eq!(t.spy.call_count(), 0);
}

#[test]
fn exists_variants() {
    let t = robots();
    let repo = t.orm.repository::<Robot>();

    assert!(repo.exists(1).unwrap());
    assert!(!repo.exists(9).unwrap());
    assert!(repo.exists(Value::from(2)).unwrap());
    assert!(repo
        .exists(Conditions::new().eq("name", "Bender"))
        .unwrap());
    assert!(!repo
        .exists(Params::new().where_eq("type", "android"))
        .unwrap());

    let spec = last_query(&t);
    assert_eq!(spec.columns, ["id"]);
    assert_eq!(spec.limit, Some(1));
}

#[test]
fn aggregates_and_exists_honour_key_lists() {
    let t = robots();
    let repo = t.orm.repository::<Robot>();

    assert_eq!(repo.count(Params::new().in_keys([99]), None).unwrap(), 0);
    assert_eq!(repo.count(Params::new().in_keys([1, 3]), None).unwrap(), 2);
    assert_eq!(
        repo.sum("year", Params::new().in_keys([1, 2])).unwrap(),
        Value::Integer(3951)
    );
    assert_eq!(
        last_query(&t).filters,
        [Filter::In {
            field: "id".into(),
            values: vec![Value::Integer(1), Value::Integer(2)],
        }]
    );

    assert!(!repo.exists(Params::new().in_keys([99])).unwrap());
    assert!(repo
        .exists(Params::new().where_eq("type", "virtual").in_keys([3]))
        .unwrap());
    assert_eq!(last_query(&t).filters.len(), 2);
}

#[test]
fn text_is_a_raw_filter() {
    let t = robots();

    let err = t
        .orm
        .repository::<Robot>()
        .find_first("[year] > 1960")
        .unwrap_err();
    assert!(err.is_storage());

    let spec = last_query(&t);
    assert_eq!(
        spec.filters,
        [Filter::Raw {
            expression: "[year] > 1960".into(),
            binds: row! {},
        }]
    );
}

#[test]
fn count_rows_and_values() {
    let t = robots();
    let repo = t.orm.repository::<Robot>();

    assert_eq!(repo.count((), None).unwrap(), 3);
    assert_eq!(
        repo.count(Params::new().where_eq("type", "mechanical"), None)
            .unwrap(),
        2
    );
    assert_eq!(repo.count((), Some("year")).unwrap(), 3);

    let spec = last_query(&t);
    assert_eq!(spec.aggregates.len(), 1);
    assert_eq!(spec.aggregates[0].expression(), "COUNT([year])");
    assert_eq!(spec.aggregates[0].alias, "row_count");
}

#[test]
fn numeric_aggregates() {
    let t = robots();
    let repo = t.orm.repository::<Robot>();

    assert_eq!(repo.sum("year", ()).unwrap(), Value::Integer(5923));
    assert_eq!(repo.max("year", ()).unwrap(), Value::Integer(1999));
    assert_eq!(repo.min("name", ()).unwrap(), Value::from("Astro Boy"));
    let avg = repo.avg("year", ()).unwrap().unwrap();
    assert!((avg - 5923.0 / 3.0).abs() < 1e-9);

    let virtual_sum = repo
        .sum("year", Params::new().where_eq("type", "virtual"))
        .unwrap();
    assert_eq!(virtual_sum, Value::Integer(1972));
}

#[test]
fn aggregates_over_nothing() {
    let t = robots();
    let repo = t.orm.repository::<Robot>();
    let none = || Params::new().where_eq("type", "android");

    assert_eq!(repo.count(none(), None).unwrap(), 0);
    assert_eq!(repo.sum("year", none()).unwrap(), Value::Null);
    assert_eq!(repo.max("year", none()).unwrap(), Value::Null);
    assert_eq!(repo.avg("year", none()).unwrap(), None);
}

#[test]
fn aggregate_expressions_pass_through() {
    let t = robots();
    let repo = t.orm.repository::<Robot>();

    t.spy.push_query_result(vec![row! { "summary" => 5923 }]);
    assert_eq!(repo.sum("[year]", ()).unwrap(), Value::Integer(5923));
    let spec = last_query(&t);
    assert_eq!(spec.aggregates[0].expression(), "SUM([year])");

    t.spy.push_query_result(vec![row! { "summary" => 11846 }]);
    repo.sum("year * 2", ()).unwrap();
    let spec = last_query(&t);
    assert_eq!(spec.aggregates[0].argument, AggregateArg::Raw("year * 2".into()));
    assert_eq!(spec.aggregates[0].expression(), "SUM(year * 2)");
}

#[test]
fn aggregate_results_are_coerced() {
    let t = robots();
    let repo = t.orm.repository::<Robot>();

    t.spy.push_query_result(vec![row! { "row_count" => "12" }]);
    assert_eq!(repo.count((), None).unwrap(), 12);

    t.spy.push_query_result(vec![row! { "average" => "2.5" }]);
    assert_eq!(repo.avg("year", ()).unwrap(), Some(2.5));

    t.spy.push_query_result(vec![row! { "row_count" => "many" }]);
    let err = repo.count((), None).unwrap_err();
    assert!(err.is_storage());

    t.spy.push_query_result(vec![row! { "row_count" => "1e30" }]);
    assert!(repo.count((), None).unwrap_err().is_storage());

    t.spy.push_query_result(Vec::new());
    assert_eq!(repo.count((), None).unwrap(), 0);
}

#[test]
fn update_by_id_filters_data() {
    let t = robots();
    let repo = t.orm.repository::<Robot>();

    let data = row! { "name" => "Bender B.", "year" => 3000, "type" => (), "color" => "grey" };
    let affected = repo.update_by_id(2, &data, Some(&["name", "type"][..])).unwrap();
    assert_eq!(affected, 1);

    match t.spy.last_call().unwrap() {
        Call::Update {
            values, predicate, ..
        } => {
            assert_eq!(values, row! { "name" => "Bender B." });
            assert_eq!(predicate.to_sql(), "[id]=:id");
        }
        other => panic!("unexpected call {other:?}"),
    }
    let bender = repo.find_by_id(2, None).unwrap().unwrap();
    assert_eq!(bender.get("year"), &Value::Integer(1999));

    let err = repo
        .update_by_id(2, &row! { "color" => "grey" }, None)
        .unwrap_err();
    assert!(matches!(err, ModelError::ValidationFailed { .. }));
}

#[test]
fn delete_by_id_removes_one_row() {
    let t = robots();
    let repo = t.orm.repository::<Robot>();

    assert_eq!(repo.delete_by_id(1).unwrap(), 1);
    assert_eq!(repo.delete_by_id(1).unwrap(), 0);
    assert_eq!(t.memory().len("robot"), 2);

    let err = repo.delete_by_id(Value::Array(Vec::new())).unwrap_err();
    assert!(matches!(err, ModelError::InvalidArgument { .. }));
}

#[test]
fn update_all_with_legacy_tokens() {
    let t = robots();
    let conditions = Conditions::parse_tokens([
        ("year>", Value::from(1960)),
        ("type", Value::from("mechanical")),
    ])
    .unwrap();
    assert_eq!(conditions.iter().next().unwrap().op, Operator::Gt);

    let affected = t
        .orm
        .repository::<Robot>()
        .update_all(&row! { "type" => "retired" }, &conditions)
        .unwrap();

    assert_eq!(affected, 1);
    match t.spy.last_call().unwrap() {
        Call::Update { predicate, .. } => {
            assert_eq!(predicate.to_sql(), "[year]>:year AND [type]=:type");
        }
        other => panic!("unexpected call {other:?}"),
    }
    assert_eq!(
        t.orm
            .repository::<Robot>()
            .count(Params::new().where_eq("type", "retired"), None)
            .unwrap(),
        1
    );
}

#[test]
fn delete_all_binds_repeated_columns() {
    let t = robots();

    let deleted = t
        .orm
        .repository::<Robot>()
        .delete_all(&Conditions::new().gte("year", 1950).lt("year", 1980))
        .unwrap();

    assert_eq!(deleted, 2);
    match t.spy.last_call().unwrap() {
        Call::Delete { predicate, .. } => {
            assert_eq!(predicate.to_sql(), "[year]>=:year AND [year]<:year_1");
            assert_eq!(
                predicate.binds(),
                &row! { "year" => 1950, "year_1" => 1980 }
            );
        }
        other => panic!("unexpected call {other:?}"),
    }
    assert_eq!(t.memory().rows("robot")[0]["name"], Value::from("Bender"));
}

#[test]
fn bulk_operations_need_conditions() {
    let t = robots();
    let repo = t.orm.repository::<Robot>();

    let err = repo.delete_all(&Conditions::new()).unwrap_err();
    assert!(matches!(err, ModelError::InvalidArgument { .. }));

    let err = repo
        .update_all(&row! {}, &Conditions::new().eq("id", 1))
        .unwrap_err();
    assert!(matches!(err, ModelError::ValidationFailed { .. }));

    assert_eq!(t.spy.call_count(), 0);
    assert_eq!(t.memory().len("robot"), 3);
}
