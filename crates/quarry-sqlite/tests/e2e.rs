//! End-to-end tests against an in-memory database.

#![allow(missing_docs, clippy::float_cmp)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use quarry::{Error, ModuloSharding, Session, SessionExt, ShardKey, entity, lit, record};
use quarry_sqlite::{ConnectOptions, SqliteSession};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

entity! {
    table = "User",
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct User {
        pub id: i64 => "Id" [primary_key, identity],
        pub name: String => "Name",
        pub age: i32 => "Age",
    }
}

entity! {
    table = "Order",
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Order {
        pub id: i64 => "Id" [primary_key, identity],
        pub user_id: i64 => "UserId",
        pub total: f64 => "Total",
        pub placed_at: DateTime<Utc> => "PlacedAt",
    }
}

const SCHEMA: &str = r#"
    CREATE TABLE "User" (
        "Id" INTEGER PRIMARY KEY AUTOINCREMENT,
        "Name" TEXT NOT NULL UNIQUE,
        "Age" INTEGER NOT NULL
    );
    CREATE TABLE "Order" (
        "Id" INTEGER PRIMARY KEY AUTOINCREMENT,
        "UserId" INTEGER NOT NULL,
        "Total" REAL NOT NULL,
        "PlacedAt" TEXT NOT NULL
    );
"#;

fn session() -> Arc<dyn Session> {
    let _ = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_test_writer().try_init();

    let sqlite = SqliteSession::connect_with(ConnectOptions::default()).expect("connect");
    sqlite.execute_batch(SCHEMA).expect("create schema");
    Arc::new(sqlite)
}

fn user(name: &str, age: i32) -> User {
    User {
        id: 0,
        name: name.to_string(),
        age,
    }
}

fn seed(session: &Arc<dyn Session>) -> Vec<User> {
    let users = session.table::<User>().unwrap();
    let mut people = vec![user("Ann", 30), user("Bob", 17), user("Cid", 45), user("Dee", 30)];
    users.insert_many(&mut people).unwrap();
    people
}

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
}

#[test]
fn insert_then_query() {
    let session = session();
    let users = session.table::<User>().unwrap();

    let mut ann = user("Ann", 30);
    assert_eq!(users.insert(&mut ann).unwrap(), 1);
    assert_eq!(ann.id, 1);

    let mut bob = user("Bob", 17);
    users.insert(&mut bob).unwrap();
    assert_eq!(bob.id, 2);

    let adults = users.query().filter(|u| u.col("age").ge(18)).to_list().unwrap();
    assert_eq!(adults, vec![ann.clone()]);

    let first = users.query().order_by_desc(|u| u.col("age")).first().unwrap();
    assert_eq!(first, Some(ann));
    assert_eq!(users.query().count().unwrap(), 2);
}

#[test]
fn ordering_paging_projection() {
    let session = session();
    seed(&session);
    let users = session.table::<User>().unwrap();

    let names: Vec<String> = users
        .query()
        .order_by_desc(|u| u.col("age"))
        .then_by(|u| u.col("name"))
        .paging(1, 2)
        .select(|u| u.col("name"))
        .to_list()
        .unwrap();
    assert_eq!(names, vec!["Ann".to_string(), "Dee".to_string()]);

    let ages: Vec<i32> = users.query().select(|u| u.col("age")).distinct().to_list().unwrap();
    assert_eq!(ages.len(), 3);

    let page = users.query().order_by(|u| u.col("name")).page(1, 3).to_list().unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].name, "Dee");
}

#[test]
fn filtering_a_page_nests() {
    let session = session();
    seed(&session);
    let users = session.table::<User>().unwrap();

    // the oldest three, then only those called A*
    let found = users
        .query()
        .order_by_desc(|u| u.col("age"))
        .paging(0, 3)
        .select::<User>(|u| u.value())
        .filter(|u| u.col("name").starts_with("A"))
        .to_list()
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Ann");

    let paged = users.query().order_by(|u| u.col("age")).paging(0, 2).select::<User>(|u| u.value());
    assert_eq!(paged.count().unwrap(), 2);
}

#[test]
fn like_wildcards_match_literally() {
    let session = session();
    let users = session.table::<User>().unwrap();
    users.insert(&mut user("50%_off", 1)).unwrap();
    users.insert(&mut user("5000 off", 2)).unwrap();

    let found = users.query().filter(|u| u.col("name").contains("0%_o")).to_list().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "50%_off");

    let found = users.query().filter(|u| u.col("name").ends_with("off")).count().unwrap();
    assert_eq!(found, 2);
}

#[test]
fn update_and_delete() {
    let session = session();
    let people = seed(&session);
    let users = session.table::<User>().unwrap();

    let bob = people[1].id;
    let affected = users.update_with(|u| record([("age", u.col("age") + 1)]), |u| u.col("id").eq(bob)).unwrap();
    assert_eq!(affected, 1);
    let bob = users.query().filter(|u| u.col("id").eq(bob)).first().unwrap().unwrap();
    assert_eq!(bob.age, 18);

    let mut renamed = bob.clone();
    renamed.name = "Robert".to_string();
    users.update_entity(&renamed).unwrap();
    assert_eq!(users.query().filter(|u| u.col("name").eq("Robert")).count().unwrap(), 1);

    let refused = users.delete(|_| lit(true));
    assert!(matches!(refused, Err(Error::Usage(_))));
    assert_eq!(users.query().count().unwrap(), 4);

    assert_eq!(users.delete(|u| u.col("age").eq(30)).unwrap(), 2);
    assert_eq!(users.query().count().unwrap(), 2);
}

#[test]
fn failed_batch_rolls_back() {
    let session = session();
    let users = session.table::<User>().unwrap();

    // "Name" is unique
    let mut batch = vec![user("Ann", 30), user("Ann", 31)];
    let result = users.insert_many(&mut batch);
    assert!(matches!(result, Err(Error::Execution(_))));

    assert_eq!(users.query().count().unwrap(), 0);
    assert!(session.transaction().is_none());
}

#[test]
fn explicit_transaction_spans_inserts() {
    let session = session();
    let users = session.table::<User>().unwrap();

    let tx = session.begin().unwrap();
    users.insert(&mut user("Ann", 30)).unwrap();
    users.insert_many(&mut [user("Bob", 17)]).unwrap();
    tx.rollback().unwrap();

    assert_eq!(users.query().count().unwrap(), 0);
}

#[derive(Debug, Deserialize, PartialEq)]
struct Spend {
    name: String,
    orders: i64,
    spent: f64,
}

fn place(session: &Arc<dyn Session>, people: &[User]) {
    let orders = session.table::<Order>().unwrap();
    let mut placed = vec![
        Order {
            id: 0,
            user_id: people[0].id,
            total: 40.0,
            placed_at: at(1),
        },
        Order {
            id: 0,
            user_id: people[0].id,
            total: 80.0,
            placed_at: at(5),
        },
        Order {
            id: 0,
            user_id: people[2].id,
            total: 15.5,
            placed_at: at(9),
        },
    ];
    orders.insert_many(&mut placed).unwrap();
}

#[test]
fn joins_and_aggregates() {
    let session = session();
    let people = seed(&session);
    place(&session, &people);
    let users = session.table::<User>().unwrap();
    let orders = session.table::<Order>().unwrap();

    let spend: Vec<Spend> = users
        .query()
        .join(&orders.query(), |u, o| o.col("user_id").eq(u.col("id")))
        .unwrap()
        .group_by(|u, _| u.col("name"))
        .having(|_, o| o.col("total").sum().gt(20.0))
        .order_by(|u, _| u.col("name"))
        .select(|u, o| record([("name", u.col("name")), ("orders", o.col("id").count()), ("spent", o.col("total").sum())]))
        .to_list()
        .unwrap();

    assert_eq!(
        spend,
        vec![Spend {
            name: "Ann".to_string(),
            orders: 2,
            spent: 120.0
        }]
    );

    let buyers = users.query().left_join(&orders.query(), |u, o| o.col("user_id").eq(u.col("id"))).unwrap().count();
    // Ann twice, Bob, Cid, Dee once each
    assert_eq!(buyers.unwrap(), 5);
}

#[test]
fn correlated_subqueries() {
    let session = session();
    let people = seed(&session);
    place(&session, &people);
    let users = session.table::<User>().unwrap();
    let orders = session.table::<Order>().unwrap();

    let buyers = users
        .query()
        .filter(|u| orders.query().filter(|o| o.col("user_id").eq(u.col("id"))).exists())
        .order_by(|u| u.col("name"))
        .select::<String>(|u| u.col("name"))
        .to_list()
        .unwrap();
    assert_eq!(buyers, vec!["Ann".to_string(), "Cid".to_string()]);

    let idle = users
        .query()
        .filter(|u| !orders.query().select::<i64>(|o| o.col("user_id")).contains(u.col("id")))
        .count()
        .unwrap();
    assert_eq!(idle, 2);

    let recent = orders.query().filter(|o| o.col("placed_at").gt(at(3))).to_list().unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].placed_at, at(5));
}

#[test]
fn union_of_queries() {
    let session = session();
    seed(&session);
    let users = session.table::<User>().unwrap();

    let minors = users.query().filter(|u| u.col("age").lt(18));
    let seniors = users.query().filter(|u| u.col("age").gt(40));
    let found = minors.union(&seniors).unwrap().to_list().unwrap();

    let mut names: Vec<_> = found.into_iter().map(|u| u.name).collect();
    names.sort();
    assert_eq!(names, vec!["Bob".to_string(), "Cid".to_string()]);
}

#[test]
fn sharded_tables() {
    let sqlite = SqliteSession::connect_with(ConnectOptions::default())
        .expect("connect")
        .with_shard_strategy(ModuloSharding { shards: 2 });
    sqlite
        .execute_batch(
            r#"CREATE TABLE "User_0" ("Id" INTEGER PRIMARY KEY AUTOINCREMENT, "Name" TEXT NOT NULL, "Age" INTEGER NOT NULL);
               CREATE TABLE "User_1" ("Id" INTEGER PRIMARY KEY AUTOINCREMENT, "Name" TEXT NOT NULL, "Age" INTEGER NOT NULL);"#,
        )
        .expect("create schema");
    let session: Arc<dyn Session> = Arc::new(sqlite);

    let even = session.table_for::<User>(&ShardKey::new(&4).unwrap()).unwrap();
    let odd = session.table_for::<User>(&ShardKey::new(&7).unwrap()).unwrap();
    even.insert(&mut user("Ann", 30)).unwrap();
    odd.insert(&mut user("Bob", 17)).unwrap();
    odd.insert(&mut user("Cid", 45)).unwrap();

    assert_eq!(even.query().count().unwrap(), 1);
    assert_eq!(odd.query().count().unwrap(), 2);
}
