use gridlite_model::{Column, Table, TableKind};
use gridlite_storage::{mutate, Document, StorageError};
use rusqlite::types::Value;
use rusqlite::Connection;
use tempfile::NamedTempFile;

fn doc_with(seed: &str) -> Document {
    let conn = Connection::open_in_memory().expect("open db");
    conn.execute_batch(seed).expect("seed db");
    Document::open_connection(conn).expect("open document")
}

fn column_names(doc: &Document, table: &str) -> Vec<String> {
    doc.table(table)
        .expect("table")
        .columns
        .iter()
        .map(|c| c.name.clone())
        .collect()
}

#[test]
fn add_column_lands_at_the_end_of_the_position_range() {
    let mut doc = doc_with("CREATE TABLE employee (name text, department_id int);");
    doc.add_column("employee", "employed_since", None)
        .expect("add column");

    assert_eq!(
        column_names(&doc, "employee"),
        ["name", "department_id", "employed_since"]
    );
    let added = doc
        .table("employee")
        .expect("table")
        .column("employed_since")
        .expect("column")
        .clone();
    assert_eq!(added.position, 2);

    // Non-formula columns must exist physically too.
    doc.execute_data(
        "INSERT INTO employee (name, employed_since) VALUES ('ada', '1980-01-01')",
        [],
    )
    .expect("insert into new column");
}

#[test]
fn formula_columns_exist_only_in_the_catalog() {
    let mut doc = doc_with("CREATE TABLE sale (amount int); INSERT INTO sale VALUES (2);");
    doc.add_column("sale", "doubled", Some("amount * 2"))
        .expect("add formula column");

    let physical = doc
        .query_rows("SELECT count(*) FROM pragma_table_info('sale') WHERE name = 'doubled'", [])
        .expect("table_info");
    assert_eq!(physical, [vec![Value::Integer(0)]]);

    let raw = doc
        .query_rows("SELECT doubled FROM \"sale_raw\"", [])
        .expect("raw view");
    assert_eq!(raw, [vec![Value::Integer(4)]]);
}

#[test]
fn default_column_names_pick_the_next_free_suffix() {
    // A fresh document starts with table1 (col1, col2, col3).
    let mut doc = Document::create_in_memory().expect("create document");
    let name = doc
        .add_column_with_default_name("table1", "col")
        .expect("add default-named column");
    assert_eq!(name, "col4");

    doc.drop_column("table1", "col2").expect("drop col2");
    let name = doc
        .add_column_with_default_name("table1", "col")
        .expect("add another");
    assert_eq!(name, "col2");
}

#[test]
fn rename_column_preserves_data_and_updates_the_catalog() {
    let mut doc = doc_with(
        "CREATE TABLE t (x int, y text);
         INSERT INTO t (x, y) VALUES (1, 'p'), (2, 'q');",
    );
    doc.rename_column("t", 0, "z").expect("rename x to z");

    assert_eq!(column_names(&doc, "t"), ["z", "y"]);
    assert_eq!(
        doc.table("t").expect("table").column_at(0).map(|c| c.name.as_str()),
        Some("z")
    );

    let rows = doc
        .query_rows("SELECT z, y FROM t ORDER BY rowid", [])
        .expect("query renamed table");
    assert_eq!(
        rows,
        [
            vec![Value::Integer(1), Value::Text("p".to_string())],
            vec![Value::Integer(2), Value::Text("q".to_string())],
        ]
    );
}

#[test]
fn rename_column_tx_leaves_the_commit_to_the_caller() {
    let tmp = NamedTempFile::new().expect("tmp file");
    let path = tmp.path();
    {
        let conn = Connection::open(path).expect("open raw db");
        conn.execute_batch("CREATE TABLE employee (name text, department_id int);")
            .expect("create table");
    }
    drop(Document::open_path(path).expect("bootstrap catalog"));

    let mut table = Table::new("employee", TableKind::Table);
    table.columns = vec![Column::new("name", 0), Column::new("department_id", 1)];

    let mut conn = Connection::open(path).expect("reopen raw db");

    // Rolled back: nothing changes.
    {
        let tx = conn.transaction().expect("begin");
        mutate::rename_column_tx(&tx, &table, 0, "emp_name").expect("rename inside tx");
        let renamed: i64 = tx
            .query_row(
                "SELECT count(*) FROM gridlite_column
                 WHERE table_name = 'employee' AND name = 'emp_name'",
                [],
                |row| row.get(0),
            )
            .expect("catalog inside tx");
        assert_eq!(renamed, 1);
        // Dropped without commit.
    }
    let still_old: i64 = conn
        .query_row(
            "SELECT count(*) FROM gridlite_column WHERE table_name = 'employee' AND name = 'name'",
            [],
            |row| row.get(0),
        )
        .expect("catalog after rollback");
    assert_eq!(still_old, 1);

    // Committed: both the physical table and the catalog change.
    {
        let tx = conn.transaction().expect("begin");
        mutate::rename_column_tx(&tx, &table, 0, "emp_name").expect("rename inside tx");
        tx.commit().expect("commit");
    }
    let table_sql: String = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE name = 'employee'",
            [],
            |row| row.get(0),
        )
        .expect("table sql");
    assert_eq!(table_sql, "CREATE TABLE \"employee\" (\"emp_name\", \"department_id\")");
}

#[test]
fn dropping_a_physical_column_rewrites_the_table() {
    let mut doc = doc_with(
        "CREATE TABLE t (a int, b int, c int);
         INSERT INTO t (a, b, c) VALUES (1, 2, 3);",
    );
    doc.drop_column("t", "b").expect("drop b");

    assert_eq!(column_names(&doc, "t"), ["a", "c"]);
    let positions: Vec<i64> = doc
        .table("t")
        .expect("table")
        .columns
        .iter()
        .map(|c| c.position)
        .collect();
    assert_eq!(positions, [0, 1]);

    let physical = doc
        .query_rows("SELECT count(*) FROM pragma_table_info('t') WHERE name = 'b'", [])
        .expect("table_info");
    assert_eq!(physical, [vec![Value::Integer(0)]]);

    let rows = doc
        .query_rows("SELECT a, c FROM t", [])
        .expect("surviving data");
    assert_eq!(rows, [vec![Value::Integer(1), Value::Integer(3)]]);
}

#[test]
fn dropping_a_formula_column_only_touches_the_catalog() {
    let mut doc = doc_with("CREATE TABLE t (a int);");
    doc.add_column("t", "b", Some("a + 1")).expect("add formula");
    doc.drop_column("t", "b").expect("drop formula column");

    assert_eq!(column_names(&doc, "t"), ["a"]);
    let physical = doc
        .query_rows("SELECT count(*) FROM pragma_table_info('t')", [])
        .expect("table_info");
    assert_eq!(physical, [vec![Value::Integer(1)]]);
}

#[test]
fn rename_table_updates_both_catalog_relations() {
    let mut doc = doc_with(
        "CREATE TABLE employee (name text);
         INSERT INTO employee (name) VALUES ('ada');",
    );
    doc.rename_table("employee", "staff").expect("rename table");

    assert!(doc.table("employee").is_err());
    assert_eq!(column_names(&doc, "staff"), ["name"]);

    let orphans = doc
        .query_rows(
            "SELECT count(*) FROM gridlite_column WHERE table_name = 'employee'",
            [],
        )
        .expect("orphan check");
    assert_eq!(orphans, [vec![Value::Integer(0)]]);

    let rows = doc
        .query_rows("SELECT name FROM \"staff_formatted\"", [])
        .expect("formatted view under new name");
    assert_eq!(rows, [vec![Value::Text("ada".to_string())]]);
}

#[test]
fn drop_table_cascades_its_column_rows() {
    let mut doc = doc_with(
        "CREATE TABLE a (x int);
         CREATE TABLE b (y int);",
    );
    doc.drop_table("a").expect("drop table");

    let names: Vec<&str> = doc.tables().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["b"]);

    let remaining = doc
        .query_rows("SELECT count(*) FROM gridlite_column WHERE table_name = 'a'", [])
        .expect("cascade check");
    assert_eq!(remaining, [vec![Value::Integer(0)]]);
}

#[test]
fn set_source_picks_up_added_and_removed_columns() {
    let mut doc = doc_with(
        "CREATE TABLE base (a int, b int);
         INSERT INTO base (a, b) VALUES (1, 2);
         CREATE VIEW v AS SELECT a FROM base;",
    );
    assert_eq!(doc.table("v").expect("view").kind, TableKind::View);
    assert_eq!(column_names(&doc, "v"), ["a"]);

    doc.set_source("v", "SELECT a, b FROM base").expect("widen view");
    assert_eq!(column_names(&doc, "v"), ["a", "b"]);

    doc.set_source("v", "SELECT b AS c FROM base").expect("replace view");
    assert_eq!(column_names(&doc, "v"), ["c"]);
    assert_eq!(
        doc.table("v").expect("view").columns[0].position,
        0
    );
}

#[test]
fn invalid_view_source_leaves_the_previous_view_intact() {
    let mut doc = doc_with(
        "CREATE TABLE base (a int);
         INSERT INTO base (a) VALUES (1);
         CREATE VIEW v AS SELECT a FROM base;",
    );

    let result = doc.set_source("v", "SELEC nonsense FROM");
    assert!(matches!(result, Err(StorageError::Sqlite(_))));

    // The old view still answers queries and the catalog is unchanged.
    let rows = doc.query_rows("SELECT a FROM v", []).expect("old view");
    assert_eq!(rows, [vec![Value::Integer(1)]]);
    assert_eq!(column_names(&doc, "v"), ["a"]);
}

#[test]
fn column_width_is_persisted_in_the_catalog() {
    let mut doc = doc_with("CREATE TABLE t (a int);");
    doc.set_column_width("t", "a", Some(120)).expect("set width");
    assert_eq!(
        doc.table("t").expect("table").column("a").expect("column").width,
        Some(120)
    );

    doc.set_column_width("t", "a", None).expect("clear width");
    assert_eq!(
        doc.table("t").expect("table").column("a").expect("column").width,
        None
    );
}

#[test]
fn renaming_a_view_recreates_it_under_the_new_name() {
    let mut doc = doc_with(
        "CREATE TABLE base (a int);
         INSERT INTO base (a) VALUES (5);
         CREATE VIEW v AS SELECT a FROM base;",
    );
    doc.rename_table("v", "w").expect("rename view");

    let rows = doc.query_rows("SELECT a FROM w", []).expect("renamed view");
    assert_eq!(rows, [vec![Value::Integer(5)]]);
    assert!(doc.table("v").is_err());
    assert_eq!(column_names(&doc, "w"), ["a"]);
}

#[test]
fn renaming_a_view_whose_name_contains_as_keeps_its_body() {
    // A pre-existing user view; its quoted name contains " as ", which must
    // not be mistaken for the AS keyword of the CREATE statement.
    let mut doc = doc_with(
        "CREATE TABLE base (a int);
         INSERT INTO base (a) VALUES (9);
         CREATE VIEW \"totals as of\" AS SELECT a FROM base;",
    );
    doc.rename_table("totals as of", "totals").expect("rename view");

    let rows = doc.query_rows("SELECT a FROM totals", []).expect("renamed view");
    assert_eq!(rows, [vec![Value::Integer(9)]]);
    assert_eq!(column_names(&doc, "totals"), ["a"]);
}
