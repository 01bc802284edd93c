//! Integration tests for tables: mutations and shard routing.

#![allow(missing_docs)]

mod common;

use common::{RecordingSession, User, assert_sql_contains, row, shared};
use quarry::{
    ColumnSchema, DataType, DataTypeTag, Entity, EntitySchema, Error, ModuloSharding, SessionExt, ShardKey,
    ShardStrategy, lit, record,
};
use serde::{Deserialize, Serialize};

fn ann() -> User {
    User {
        id: 0,
        name: "Ann".to_string(),
        age: 30,
    }
}

#[test]
fn insert_writes_back_identity() {
    let recorder = RecordingSession::new();
    let users = shared(&recorder).table::<User>().unwrap();

    recorder.push_rows(vec![row(&[("", DataType::Int64(Some(42)))])]);
    let mut user = ann();
    let affected = users.insert(&mut user).unwrap();

    assert_eq!(affected, 1);
    assert_eq!(user.id, 42);

    let statements = recorder.statements();
    assert_eq!(statements.len(), 2);
    assert_eq!(statements[0].sql, "INSERT INTO [User] ([Name], [Age]) VALUES (@p0, @p1)");
    assert_eq!(statements[0].params[0].value, DataType::Str(Some("Ann".to_string())));
    assert_eq!(statements[0].params[1].value, DataType::Int32(Some(30)));
    assert_eq!(statements[1].sql, "SELECT CAST(SCOPE_IDENTITY() AS BIGINT)");

    // the identity lookup reuses the inserting connection
    assert_eq!(recorder.events(), vec!["connect Write".to_string()]);
}

#[test]
fn insert_many_runs_in_one_transaction() {
    let recorder = RecordingSession::new();
    let users = shared(&recorder).table::<User>().unwrap();

    recorder.push_rows(vec![row(&[("", DataType::Int64(Some(1)))])]);
    recorder.push_rows(vec![row(&[("", DataType::Int64(Some(2)))])]);
    let mut batch = vec![ann(), User { name: "Bob".to_string(), ..ann() }];
    let affected = users.insert_many(&mut batch).unwrap();

    assert_eq!(affected, 2);
    assert_eq!(batch.iter().map(|user| user.id).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(recorder.events(), vec!["begin".to_string(), "commit".to_string()]);
}

#[test]
fn update_with_column_reference() {
    let recorder = RecordingSession::new();
    let users = shared(&recorder).table::<User>().unwrap();

    let affected = users.update_with(|u| record([("age", u.col("age") + 1)]), |u| u.col("id").eq(7_i64)).unwrap();
    assert_eq!(affected, 1);

    let statement = recorder.last();
    assert_eq!(statement.sql, "UPDATE [User] SET [Age]=[Age]+@p0 WHERE [Id]=@p1");
    assert_eq!(statement.params[0].value, DataType::Int32(Some(1)));
    assert_eq!(statement.params[1].value, DataType::Int64(Some(7)));
}

#[derive(Serialize)]
struct Rename {
    name: String,
}

#[test]
fn update_from_partial_value() {
    let recorder = RecordingSession::new();
    let users = shared(&recorder).table::<User>().unwrap();

    users.update(&Rename { name: "Annie".to_string() }, |u| u.col("name").eq("Ann")).unwrap();
    assert_eq!(recorder.last().sql, "UPDATE [User] SET [Name]=@p0 WHERE [Name]=@p1");

    users.update_map([("age", 31)], |u| u.col("name").eq("Annie")).unwrap();
    assert_eq!(recorder.last().sql, "UPDATE [User] SET [Age]=@p0 WHERE [Name]=@p1");
}

#[test]
fn update_entity_filters_by_key() {
    let recorder = RecordingSession::new();
    let users = shared(&recorder).table::<User>().unwrap();

    let user = User { id: 5, ..ann() };
    users.update_entity(&user).unwrap();

    let statement = recorder.last();
    assert_eq!(statement.sql, "UPDATE [User] SET [Name]=@p0, [Age]=@p1 WHERE [Id]=@p2");
    assert_eq!(statement.params[2].value, DataType::Int64(Some(5)));
}

#[test]
fn update_guards() {
    let recorder = RecordingSession::new();
    let users = shared(&recorder).table::<User>().unwrap();

    let everyone = users.update_with(|_| record([("age", lit(0))]), |_| lit(true));
    assert!(matches!(everyone, Err(Error::Usage(_))));

    let identity = users.update_map([("id", 9_i64)], |u| u.col("id").eq(1_i64));
    assert!(matches!(identity, Err(Error::Usage(_))));

    let unknown = users.update_map([("email", "a@b.c")], |u| u.col("id").eq(1_i64));
    assert!(matches!(unknown, Err(Error::Usage(_))));

    let nothing = users.update_map(Vec::<(String, i32)>::new(), |u| u.col("id").eq(1_i64));
    assert!(matches!(nothing, Err(Error::Usage(_))));

    assert!(recorder.statements().is_empty());
}

#[test]
fn delete_guards() {
    let recorder = RecordingSession::new();
    let users = shared(&recorder).table::<User>().unwrap();

    let result = users.delete(|u| u.col("age").ge(0).or(lit(true)));
    assert!(matches!(result, Err(Error::Usage(_))));
    assert!(recorder.statements().is_empty());

    users.delete(|u| u.col("age").lt(18)).unwrap();
    assert_eq!(recorder.last().sql, "DELETE FROM [User] WHERE [Age]<@p0");

    // nothing matches, but the statement is still valid
    users.delete(|_| lit(false)).unwrap();
    assert_eq!(recorder.last().sql, "DELETE FROM [User] WHERE 1=0");
}

#[test]
fn modulo_sharding_suffixes_table() {
    let recorder = RecordingSession::sharded(ModuloSharding { shards: 4 });
    let session = shared(&recorder);

    let users = session.table_for::<User>(&ShardKey::new(&10).unwrap()).unwrap();
    assert_eq!(users.name(), "User_2");
    assert_eq!(users.schema().table(), "User");

    let query = users.query().filter(|u| u.col("age").gt(18)).build().unwrap();
    assert_sql_contains(&query.sql, &["FROM User_2 t0"]);

    users.delete(|u| u.col("id").eq(3_i64)).unwrap();
    assert_eq!(recorder.last().sql, "DELETE FROM [User_2] WHERE [Id]=@p0");

    let unsharded = session.table::<User>().unwrap();
    assert_eq!(unsharded.name(), "User");
}

#[derive(Debug)]
struct Regional;

impl ShardStrategy for Regional {
    fn connection_shard(&self, key: &ShardKey) -> String {
        key.0.as_str().map(|region| format!(" _{region} ")).unwrap_or_default()
    }

    fn table_partition(&self, _table: &str, _key: &ShardKey) -> String {
        "_2026".to_string()
    }
}

#[test]
fn shard_suffixes_are_trimmed() {
    let recorder = RecordingSession::sharded(Regional);
    let session = shared(&recorder);

    let users = session.table_for::<User>(&ShardKey::new(&"eu").unwrap()).unwrap();
    assert_eq!(users.name(), "User_2026");

    users.query().to_list().unwrap();
    let statement = recorder.last();
    assert_eq!(statement.shard, "_eu");
    assert_sql_contains(&statement.sql, &["FROM User_2026 t0"]);

    // related tables share the key
    let orders = users.related::<common::Order>().unwrap();
    assert_eq!(orders.name(), "Order_2026");
}

#[derive(Debug, Serialize, Deserialize)]
struct Note {
    id: i64,
    title: String,
    status: Option<String>,
}

impl Entity for Note {
    const TABLE: &'static str = "Note";

    fn schema() -> quarry::Result<EntitySchema> {
        EntitySchema::builder("Note")
            .column(ColumnSchema::new("id", DataTypeTag::Int64).primary_key().identity())
            .column(ColumnSchema::new("title", DataTypeTag::Text).max_length(8))
            .column(ColumnSchema::new("status", DataTypeTag::Text).required(false).default_value("draft"))
            .build()
    }
}

fn note(title: &str, status: Option<&str>) -> Note {
    Note {
        id: 0,
        title: title.to_string(),
        status: status.map(str::to_string),
    }
}

#[test]
fn insert_fills_column_defaults() {
    let recorder = RecordingSession::new();
    let notes = shared(&recorder).table::<Note>().unwrap();

    recorder.push_rows(vec![row(&[("", DataType::Int64(Some(3)))])]);
    notes.insert(&mut note("todo", None)).unwrap();
    let statement = &recorder.statements()[0];
    assert_eq!(statement.sql, "INSERT INTO [Note] ([title], [status]) VALUES (@p0, @p1)");
    assert_eq!(statement.params[1].value, DataType::Str(Some("draft".to_string())));

    recorder.push_rows(vec![row(&[("", DataType::Int64(Some(4)))])]);
    notes.insert(&mut note("todo", Some("done"))).unwrap();
    assert_eq!(recorder.statements()[2].params[1].value, DataType::Str(Some("done".to_string())));
}

#[test]
fn over_long_text_is_refused() {
    let recorder = RecordingSession::new();
    let notes = shared(&recorder).table::<Note>().unwrap();

    let result = notes.insert(&mut note("far too long", None));
    assert!(matches!(result, Err(Error::Usage(message)) if message.contains("at most 8")));

    let result = notes.update_map([("title", "far too long")], |n| n.col("id").eq(1_i64));
    assert!(matches!(result, Err(Error::Usage(_))));

    // nothing reached the database
    assert!(recorder.statements().is_empty());

    notes.update_map([("title", "short")], |n| n.col("id").eq(1_i64)).unwrap();
    assert_eq!(recorder.last().sql, "UPDATE [Note] SET [title]=@p0 WHERE [id]=@p1");
}
