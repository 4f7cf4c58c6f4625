//! End-to-end tests: declared models, live SQLite databases and the
//! migration runner working together.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use oxide_reconcile::prelude::*;

async fn create_test_adapter() -> SqlxAdapter {
    SqlxAdapter::connect("sqlite::memory:", 1)
        .await
        .expect("Failed to create in-memory SQLite pool")
}

/// Runs generated statements, skipping comments.
async fn apply(db: &SqlxAdapter, statements: &[String]) {
    let mut schema = Schema::new();
    for sql in statements.iter().filter(|s| !s.starts_with("--")) {
        schema.raw(sql.clone());
    }
    schema.execute(db).await.unwrap();
}

fn users_model() -> ModelInfo {
    resolve_model_schema(
        &ModelDeclaration::new("users")
            .field("id", serial().primary_key())
            .field("name", text().not_null())
            .field("email", text().unique()),
    )
}

/// An adapter that only records what it is asked to run.
struct DocumentStore {
    calls: Mutex<Vec<String>>,
}

impl DatabaseAdapter for DocumentStore {
    fn backend(&self) -> Backend {
        Backend::Document
    }

    async fn raw(&self, sql: &str, _params: &[SqlValue]) -> Result<RawResult> {
        self.calls.lock().unwrap().push(sql.to_string());
        Ok(RawResult::default())
    }
}

// ================================================================
// Reconciliation
// ================================================================

#[tokio::test]
async fn test_scenario_a_create_users() {
    let db = create_test_adapter().await;
    let models = vec![users_model()];

    let live = introspect_schema(&db, &models).await.unwrap();
    let ops = diff_schema(&models, &live, Dialect::Sqlite);
    assert_eq!(ops.len(), 1);
    assert!(matches!(ops[0], DiffOperation::CreateTable { .. }));

    let sql = generate_migration_sql(&ops, Dialect::Sqlite);
    assert!(sql.up[0].starts_with("CREATE TABLE IF NOT EXISTS \"users\" ("));
    assert_eq!(sql.down[0], "DROP TABLE IF EXISTS \"users\"");
}

#[tokio::test]
async fn test_scenario_b_drop_legacy_column() {
    let db = create_test_adapter().await;
    db.raw(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT UNIQUE, \
         legacy_col TEXT)",
        &[],
    )
    .await
    .unwrap();

    let models = vec![users_model()];
    let live = introspect_schema(&db, &models).await.unwrap();
    let ops = diff_schema(&models, &live, Dialect::Sqlite);
    assert_eq!(ops.len(), 1);
    assert!(matches!(
        &ops[0],
        DiffOperation::DropColumn { column, .. } if column.name == "legacy_col"
    ));

    let sqlite = generate_migration_sql(&ops, Dialect::Sqlite);
    assert!(sqlite.up[0].starts_with("-- WARNING"));
    assert_eq!(sqlite.up[1], "ALTER TABLE \"users\" DROP COLUMN \"legacy_col\"");

    let postgres = generate_migration_sql(&ops, Dialect::Postgres);
    assert_eq!(
        postgres.up,
        vec!["ALTER TABLE \"users\" DROP COLUMN \"legacy_col\"".to_string()]
    );

    apply(&db, &sqlite.up).await;
    let live = introspect_schema(&db, &models).await.unwrap();
    assert!(diff_schema(&models, &live, Dialect::Sqlite).is_empty());
}

#[tokio::test]
async fn test_generated_table_introspects_equivalent() {
    let db = create_test_adapter().await;

    let mut declaration = ModelDeclaration::new("everything").field("id", serial().primary_key());
    for field_type in FieldType::ALL {
        declaration = declaration.field(
            format!("col_{field_type}"),
            FieldBuilder::new(field_type),
        );
    }
    let model = resolve_model_schema(&declaration);

    let ops = diff_schema(std::slice::from_ref(&model), &LiveSchema::new(), Dialect::Sqlite);
    apply(&db, &generate_migration_sql(&ops, Dialect::Sqlite).up).await;

    let columns = introspect_table(&db, "everything").await.unwrap().unwrap();
    assert_eq!(columns.len(), model.schema.len());
    for (name, field) in &model.schema {
        let live = columns.iter().find(|c| &c.name == name).unwrap();
        assert!(
            types_match(field.field_type, &live.column_type, Dialect::Sqlite),
            "{name}: declared {} vs live {}",
            field.field_type,
            live.column_type
        );
    }
}

#[tokio::test]
async fn test_diff_reaches_fixed_point() {
    let db = create_test_adapter().await;
    db.raw("CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT)", &[])
        .await
        .unwrap();

    let models = vec![
        users_model(),
        resolve_model_schema(
            &ModelDeclaration::new("posts")
                .field("id", serial().primary_key())
                .field("title", text())
                .field("views", integer().not_null().default(0_i64))
                .with_soft_deletes(),
        ),
    ];

    let live = introspect_schema(&db, &models).await.unwrap();
    let ops = diff_schema(&models, &live, Dialect::Sqlite);
    // One create_table for users, two add_column for posts.
    assert_eq!(ops.len(), 3);

    apply(&db, &generate_migration_sql(&ops, Dialect::Sqlite).up).await;

    let live = introspect_schema(&db, &models).await.unwrap();
    assert!(diff_schema(&models, &live, Dialect::Sqlite).is_empty());
}

#[tokio::test]
async fn test_generated_down_reverts_up() {
    let db = create_test_adapter().await;
    let models = vec![users_model()];

    let live = introspect_schema(&db, &models).await.unwrap();
    let ops = diff_schema(&models, &live, Dialect::Sqlite);
    let sql = generate_migration_sql(&ops, Dialect::Sqlite);

    apply(&db, &sql.up).await;
    assert_eq!(list_tables(&db).await.unwrap(), vec!["users"]);
    apply(&db, &sql.down).await;
    assert!(list_tables(&db).await.unwrap().is_empty());
}

// ================================================================
// Runner
// ================================================================

fn create_table_migration(table: &'static str) -> MigrationModule {
    MigrationModule::new(move |schema| {
        schema.create(table, |t| {
            t.add("id", serial().primary_key());
        });
        Ok(())
    })
    .with_down(move |schema| {
        schema.drop_if_exists(table);
        Ok(())
    })
}

#[tokio::test]
async fn test_up_is_idempotent() {
    let db = create_test_adapter().await;
    let mut registry = MigrationRegistry::new();
    registry.add(1, "a", create_table_migration("a")).unwrap();
    registry.add(2, "b", create_table_migration("b")).unwrap();
    let runner = MigrationRunner::new(&db, registry);

    assert_eq!(runner.up().await.unwrap().len(), 2);
    assert!(runner.up().await.unwrap().is_empty());
    assert!(runner.pending().await.unwrap().is_empty());

    let rows = db
        .raw("SELECT COUNT(*) AS n FROM _migrations", &[])
        .await
        .unwrap()
        .rows;
    assert_eq!(rows[0].integer("n"), Some(2));
}

#[tokio::test]
async fn test_missing_down_leaves_applied_set_unchanged() {
    let db = create_test_adapter().await;
    let mut registry = MigrationRegistry::new();
    registry.add(1, "a", create_table_migration("a")).unwrap();
    registry
        .add(
            2,
            "forward_only",
            MigrationModule::new(|schema| {
                schema.raw("CREATE TABLE forward_only (id INTEGER)");
                Ok(())
            }),
        )
        .unwrap();
    let runner = MigrationRunner::new(&db, registry);
    runner.up().await.unwrap();

    let before = runner.applied().await.unwrap();
    let err = runner.down().await.unwrap_err();
    assert!(matches!(err, MigrateError::MissingDown { id: 2, .. }));
    assert_eq!(runner.applied().await.unwrap(), before);
    assert!(introspect_table(&db, "forward_only").await.unwrap().is_some());
}

#[tokio::test]
async fn test_scenario_c_down_to() {
    let db = create_test_adapter().await;
    let calls = Arc::new(Mutex::new(Vec::new()));

    let mut registry = MigrationRegistry::new();
    for id in 1..=3 {
        let calls = Arc::clone(&calls);
        registry
            .add(
                id,
                &format!("step_{id}"),
                MigrationModule::new(|_| Ok(())).with_down(move |_| {
                    calls.lock().unwrap().push(id);
                    Ok(())
                }),
            )
            .unwrap();
    }
    let runner = MigrationRunner::new(&db, registry);
    runner.up().await.unwrap();

    let rolled_back = runner.down_to(1).await.unwrap();
    assert_eq!(rolled_back.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 2]);
    assert_eq!(*calls.lock().unwrap(), vec![3, 2]);
    assert_eq!(runner.applied().await.unwrap().into_iter().collect::<Vec<_>>(), vec![1]);
}

#[tokio::test]
async fn test_down_all() {
    let db = create_test_adapter().await;
    let mut registry = MigrationRegistry::new();
    registry.add(1, "a", create_table_migration("a")).unwrap();
    registry.add(2, "b", create_table_migration("b")).unwrap();
    let runner = MigrationRunner::new(&db, registry);
    runner.up().await.unwrap();

    assert_eq!(runner.down_all().await.unwrap().len(), 2);
    assert!(runner.applied().await.unwrap().is_empty());
    assert!(list_tables(&db).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failing_migration_stops_the_run() {
    let db = create_test_adapter().await;
    let up_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&up_calls);

    let mut registry = MigrationRegistry::new();
    registry.add(1, "a", create_table_migration("a")).unwrap();
    registry
        .add(
            2,
            "broken",
            MigrationModule::new(|schema| {
                schema.raw("CREATE TABLE broken (id INTEGER)");
                schema.raw("THIS IS NOT SQL");
                Ok(())
            }),
        )
        .unwrap();
    registry
        .add(
            3,
            "never",
            MigrationModule::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();
    let runner = MigrationRunner::new(&db, registry);

    let err = runner.up().await.unwrap_err();
    assert!(matches!(err, MigrateError::Database(_)));
    assert_eq!(up_calls.load(Ordering::SeqCst), 0);
    assert_eq!(runner.applied().await.unwrap().into_iter().collect::<Vec<_>>(), vec![1]);
    // Statements before the failure are not rolled back.
    assert!(introspect_table(&db, "broken").await.unwrap().is_some());
    assert_eq!(
        runner.pending().await.unwrap().iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![2, 3]
    );
}

#[tokio::test]
async fn test_sql_directory_round_trip() {
    let db = create_test_adapter().await;
    let dir = tempfile::tempdir().unwrap();

    let models = vec![users_model()];
    let live = introspect_schema(&db, &models).await.unwrap();
    let ops = diff_schema(&models, &live, Dialect::Sqlite);
    let sql = generate_migration_sql(&ops, Dialect::Sqlite);

    let existing = discover_migrations(dir.path()).unwrap();
    let filename = next_migration_filename(&existing, "users", "sql");
    assert_eq!(filename, "0001_users.sql");
    std::fs::write(
        dir.path().join(&filename),
        generate_sql_migration_file(&sql.up, &sql.down),
    )
    .unwrap();

    let mut registry = MigrationRegistry::new();
    registry.load_dir(dir.path()).unwrap();
    let runner = MigrationRunner::new(&db, registry);

    runner.up().await.unwrap();
    let live = introspect_schema(&db, &models).await.unwrap();
    assert!(diff_schema(&models, &live, Dialect::Sqlite).is_empty());

    runner.down().await.unwrap();
    assert!(list_tables(&db).await.unwrap().is_empty());
}

// ================================================================
// Document backend
// ================================================================

#[tokio::test]
async fn test_document_backend_fails_fast() {
    let store = DocumentStore {
        calls: Mutex::new(Vec::new()),
    };

    let mut schema = Schema::new();
    schema.raw("SELECT 1");
    assert!(matches!(
        schema.execute(&store).await,
        Err(MigrateError::Unsupported(_))
    ));

    let runner = MigrationRunner::new(&store, MigrationRegistry::new());
    assert!(matches!(runner.up().await, Err(MigrateError::Unsupported(_))));
    assert!(matches!(
        introspect_table(&store, "users").await,
        Err(MigrateError::Unsupported(_))
    ));
    assert!(matches!(
        list_tables(&store).await,
        Err(MigrateError::Unsupported(_))
    ));

    assert!(store.calls.lock().unwrap().is_empty());
}
