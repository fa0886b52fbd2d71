use std::sync::{Arc, Mutex};

use leanorm::prelude::*;
use leanorm::{Dialect, Row, SchemaIntrospector};
use leanorm_core::{CapabilityError, CapabilityErrorKind, TransactionError, TransactionErrorKind};
use leanorm_sqlite::SqliteConnection;

/// Passes everything through to SQLite and keeps the SQL it saw.
struct CountingExecutor {
    inner: Arc<SqliteConnection>,
    seen: Mutex<Vec<String>>,
}

impl CountingExecutor {
    fn statements(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    fn selects(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|sql| sql.starts_with("SELECT"))
            .collect()
    }

    fn clear(&self) {
        self.seen.lock().unwrap().clear();
    }

    fn record(&self, sql: &str) {
        self.seen.lock().unwrap().push(sql.to_string());
    }
}

impl Executor for CountingExecutor {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.record(sql);
        self.inner.query(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.record(sql);
        self.inner.execute(sql, params)
    }

    fn last_insert_id(&self, sequence: Option<&str>) -> Result<Value> {
        self.inner.last_insert_id(sequence)
    }

    fn begin(&self) -> Result<()> {
        self.record("BEGIN");
        self.inner.begin()
    }

    fn commit(&self) -> Result<()> {
        self.record("COMMIT");
        self.inner.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.record("ROLLBACK");
        self.inner.rollback()
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }
}

const SCHEMA: &str = "
    CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE posts (
        id INTEGER PRIMARY KEY,
        author_id INTEGER,
        title TEXT NOT NULL,
        views INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE comments (id INTEGER PRIMARY KEY, post_id INTEGER NOT NULL, body TEXT);
    CREATE TABLE tags (id INTEGER PRIMARY KEY, label TEXT NOT NULL);
    CREATE TABLE post_tags (post_id INTEGER NOT NULL, tag_id INTEGER NOT NULL);

    INSERT INTO authors (id, name) VALUES (1, 'Ada'), (2, 'Grace');
    INSERT INTO posts (id, author_id, title, views) VALUES
        (1, 1, 'First', 10),
        (2, 2, 'Second', 20),
        (3, 1, 'Third', 30);
    INSERT INTO comments (post_id, body) VALUES
        (1, 'a'), (1, 'b'), (3, 'c');
    INSERT INTO tags (id, label) VALUES (1, 'rust'), (2, 'sql');
    INSERT INTO post_tags (post_id, tag_id) VALUES (1, 1), (1, 2), (2, 2);
";

struct Fixture {
    exec: Arc<CountingExecutor>,
    db: Arc<Database>,
}

fn fixture() -> Fixture {
    let conn = Arc::new(SqliteConnection::open_memory().expect("open sqlite memory db"));
    conn.execute_raw(SCHEMA).expect("create schema");

    let exec = Arc::new(CountingExecutor {
        inner: Arc::clone(&conn),
        seen: Mutex::new(Vec::new()),
    });
    let introspector: Arc<dyn SchemaIntrospector> = conn;
    let db = Arc::new(Database::new(exec.clone(), introspector));

    db.register(
        ModelDef::new("posts")
            .relation(RelationDef::belongs_to("author", "authors", "id", "author_id"))
            .relation(
                RelationDef::has_many("comments", "comments", "post_id", "id")
                    .constraints(FetchParams::new().order_by(["id"])),
            )
            .relation(RelationDef::has_many_through(
                "tags",
                "tags",
                "id",
                "id",
                JoinTable::new("post_tags", "post_id", "tag_id"),
            )),
    );
    db.register(ModelDef::new("authors").read_only());

    Fixture { exec, db }
}

fn by_id(id: i64) -> FetchParams {
    FetchParams::new().filter(Conditions::new().and("id", Operator::Eq, id))
}

#[test]
fn eager_load_runs_one_query_per_relation() {
    let fx = fixture();
    let posts = fx.db.model("posts").unwrap();
    fx.exec.clear();

    let all = posts
        .fetch_all(&FetchParams::new().order_by(["id"]).include(["comments"]))
        .unwrap();

    let selects = fx.exec.selects();
    assert_eq!(selects.len(), 2, "{selects:?}");
    assert_eq!(
        selects[1],
        "SELECT comments.* FROM comments WHERE comments.post_id IN (1, 2, 3) ORDER BY id"
    );

    let counts: Vec<usize> = all
        .iter()
        .map(|(_, post)| post.get_related("comments").map_or(usize::MAX, Related::len))
        .collect();
    assert_eq!(counts, [2, 0, 1]);

    let first = all.get(0_usize).unwrap();
    let bodies: Vec<Value> = first
        .get_related("comments")
        .and_then(Related::as_many)
        .unwrap()
        .col_values("body");
    assert_eq!(bodies, [Value::from("a"), Value::from("b")]);
}

#[test]
fn lazy_relation_loads_on_first_get_only() {
    let fx = fixture();
    let posts = fx.db.model("posts").unwrap();
    let mut post = posts.fetch_one(&by_id(2)).unwrap().unwrap();
    fx.exec.clear();

    let author_name = post
        .get("author")
        .unwrap()
        .related()
        .and_then(Related::as_one_read_only)
        .and_then(|author| author.data().get("name").cloned());
    assert_eq!(author_name, Some(Value::from("Grace")));

    post.get("author").unwrap();
    assert_eq!(fx.exec.selects().len(), 1);
}

#[test]
fn through_relation_groups_by_owner() {
    let fx = fixture();
    let posts = fx.db.model("posts").unwrap();
    let rows = posts
        .fetch_array(&FetchParams::new().order_by(["id"]).include(["tags"]))
        .unwrap();

    let labels: Vec<Vec<Value>> = rows
        .iter()
        .map(|row| {
            row.related
                .get("tags")
                .and_then(Related::as_many)
                .map(|tags| tags.col_values("label"))
                .unwrap_or_default()
        })
        .collect();
    assert_eq!(labels.len(), 3);
    assert_eq!(labels[0].len(), 2);
    assert_eq!(labels[1], [Value::from("sql")]);
    assert!(labels[2].is_empty());

    // the carried owner key never leaks into the related records
    let first_tag = rows[0].related["tags"].as_many().unwrap().get(0_usize).unwrap();
    assert!(first_tag.data().keys().all(|k| k == "id" || k == "label"));
}

#[test]
fn record_lifecycle() {
    let fx = fixture();
    let posts = fx.db.model("posts").unwrap();

    let mut post = posts.create_new_record();
    assert!(post.is_new());
    let outcome = post
        .save(Some(
            [
                ("author_id".to_string(), Value::from(1)),
                ("title".to_string(), Value::from("Fourth")),
            ]
            .into_iter()
            .collect(),
        ))
        .unwrap();
    assert_eq!(outcome, SaveOutcome::Inserted);
    assert!(!post.is_new());
    assert_eq!(post.primary_key_value().as_i64(), Some(4));
    // default filled in by the database and read back
    assert_eq!(post.data().get("views").and_then(Value::as_i64), Some(0));
    assert!(!post.is_changed_any());

    post.set("views", 5);
    assert!(post.is_changed("views"));
    assert_eq!(post.save(None).unwrap(), SaveOutcome::Updated);
    assert_eq!(post.save(None).unwrap(), SaveOutcome::NothingToSave);

    let views = posts
        .fetch_value(&by_id(4).cols(["views"]))
        .unwrap()
        .and_then(|v| v.as_i64());
    assert_eq!(views, Some(5));

    assert_eq!(post.delete(true).unwrap(), 1);
    assert!(post.data().is_empty());
    assert!(posts.fetch_one(&by_id(4)).unwrap().is_none());
}

#[test]
fn numeric_strings_do_not_count_as_changes() {
    let fx = fixture();
    let posts = fx.db.model("posts").unwrap();
    let mut post = posts.fetch_one(&by_id(1)).unwrap().unwrap();

    post.set("views", "10");
    assert!(!post.is_changed("views"));
    post.set("views", "10.5");
    assert!(post.is_changed("views"));
}

#[test]
fn read_only_records_refuse_writes() {
    let fx = fixture();
    let authors = fx.db.model("authors").unwrap();
    let mut all = authors.fetch_all_read_only(&FetchParams::new()).unwrap();
    assert_eq!(all.len(), 2);

    let ada = all.get_mut(0_usize).unwrap();
    let err = ada.try_set("name", Value::from("Lovelace")).unwrap_err();
    assert!(matches!(
        err,
        Error::Capability(CapabilityError {
            kind: CapabilityErrorKind::UnsupportedOperation,
            ..
        })
    ));
    assert!(all.delete_all().is_err());
    assert_eq!(
        authors.fetch_col(&FetchParams::new().cols(["name"])).unwrap().len(),
        2
    );
}

#[test]
fn grouped_save_rejects_foreign_records_before_any_sql() {
    let fx = fixture();
    let posts = fx.db.model("posts").unwrap();
    let comments = fx.db.model("comments").unwrap();

    let mut batch = posts.create_new_collection::<Record>();
    let mut post = posts.create_new_record();
    post.set("title", "Batch");
    batch.push(post);
    let mut stray = comments.create_new_record();
    stray.set("post_id", 1);
    batch.push(stray);
    fx.exec.clear();

    let err = batch.save_all(true).unwrap_err();
    assert!(matches!(
        err,
        Error::Capability(CapabilityError {
            kind: CapabilityErrorKind::TableMismatch,
            ..
        })
    ));
    assert!(fx.exec.statements().is_empty());
}

#[test]
fn grouped_save_writes_one_insert_per_column_set() {
    let fx = fixture();
    let posts = fx.db.model("posts").unwrap();

    let mut batch = posts.create_new_collection::<Record>();
    for title in ["x", "y"] {
        let mut post = posts.create_new_record();
        post.set("title", title);
        batch.push(post);
    }
    fx.exec.clear();

    assert!(batch.save_all(true).unwrap().is_success());
    assert_eq!(
        fx.exec.statements(),
        [
            "INSERT INTO posts (title) VALUES (?1), (?2)",
            "SELECT posts.* FROM posts WHERE id IN (4, 5)",
        ]
    );
    assert!(batch.iter().all(|(_, r)| !r.is_new() && !r.is_changed_any()));
    let ids: Vec<Option<i64>> = batch.col_values("id").iter().map(Value::as_i64).collect();
    assert_eq!(ids, [Some(4), Some(5)]);
    // defaults come back with the stored rows
    let views: Vec<Option<i64>> = batch.col_values("views").iter().map(Value::as_i64).collect();
    assert_eq!(views, [Some(0), Some(0)]);

    let count_rows = || {
        posts
            .fetch_value(&FetchParams::new().cols(["COUNT(*)"]))
            .unwrap()
            .and_then(|v| v.as_i64())
    };
    assert_eq!(count_rows(), Some(5));

    fx.exec.clear();
    assert!(batch.save_all(true).unwrap().is_success());
    let mut first = batch.get(0_usize).unwrap().clone();
    assert_eq!(first.save(None).unwrap(), SaveOutcome::NothingToSave);
    assert!(fx.exec.statements().is_empty());
    assert_eq!(count_rows(), Some(5));
}

#[test]
fn grouped_save_skips_empty_new_records() {
    let fx = fixture();
    let posts = fx.db.model("posts").unwrap();

    let mut batch = posts.create_new_collection::<Record>();
    batch.push(posts.create_new_record());
    fx.exec.clear();

    assert!(batch.save_all(true).unwrap().is_success());
    assert!(fx.exec.statements().is_empty());
    assert!(batch.get(0_usize).unwrap().is_new());
}

#[test]
fn column_fetches() {
    let fx = fixture();
    let posts = fx.db.model("posts").unwrap();

    let titles = posts
        .fetch_col(&FetchParams::new().cols(["title"]).order_by(["id"]))
        .unwrap();
    assert_eq!(titles, ["First", "Second", "Third"].map(Value::from));

    let pairs = posts
        .fetch_pairs(&FetchParams::new().cols(["id", "views"]).order_by(["id"]))
        .unwrap();
    assert_eq!(pairs.keys().collect::<Vec<_>>(), ["1", "2", "3"]);
    assert_eq!(pairs["3"].as_i64(), Some(30));

    let top = posts
        .fetch_value(&FetchParams::new().cols(["title"]).order_by(["views DESC"]))
        .unwrap();
    assert_eq!(top, Some(Value::from("Third")));

    assert!(posts.fetch_col(&FetchParams::new()).is_err());
}

#[test]
fn transactional_save_commits_and_refuses_nesting() {
    let fx = fixture();
    let posts = fx.db.model("posts").unwrap();
    let mut post = posts.fetch_one(&by_id(1)).unwrap().unwrap();
    fx.exec.clear();

    post.set("title", "Renamed");
    assert_eq!(post.save_in_transaction(None).unwrap(), SaveOutcome::Updated);
    let statements = fx.exec.statements();
    assert_eq!(statements.first().map(String::as_str), Some("BEGIN"));
    assert_eq!(statements.last().map(String::as_str), Some("COMMIT"));

    fx.db.executor().begin().unwrap();
    post.set("title", "Again");
    let err = post.save_in_transaction(None).unwrap_err();
    assert!(matches!(
        err,
        Error::Transaction(TransactionError {
            kind: TransactionErrorKind::NestedNotSupported,
            ..
        })
    ));
    fx.db.executor().rollback().unwrap();
}

#[test]
fn failed_commit_rolls_back_and_restores_the_record() {
    let conn = Arc::new(SqliteConnection::open_memory().expect("open sqlite memory db"));
    conn.execute_raw(
        "PRAGMA foreign_keys = ON;
         CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
         CREATE TABLE posts (
             id INTEGER PRIMARY KEY,
             author_id INTEGER REFERENCES authors(id) DEFERRABLE INITIALLY DEFERRED,
             title TEXT NOT NULL
         );",
    )
    .expect("create schema");
    let db = Arc::new(Database::from_connection(Arc::clone(&conn)));
    let posts = db.model("posts").unwrap();

    let mut post = posts.create_new_record();
    post.set("author_id", 99);
    post.set("title", "Orphan");
    let err = post.save_in_transaction(None).unwrap_err();
    assert!(err.is_persistence());
    assert!(!conn.in_transaction());
    assert!(post.is_new());
    assert!(post.primary_key_value().is_blank());
    assert!(post.initial_data().is_empty());

    conn.execute("INSERT INTO authors (id, name) VALUES (99, 'Late')", &[])
        .unwrap();
    assert_eq!(post.save_in_transaction(None).unwrap(), SaveOutcome::Inserted);
    assert_eq!(post.primary_key_value().as_i64(), Some(1));
    let count = posts
        .fetch_value(&FetchParams::new().cols(["COUNT(*)"]))
        .unwrap()
        .and_then(|v| v.as_i64());
    assert_eq!(count, Some(1));
}
