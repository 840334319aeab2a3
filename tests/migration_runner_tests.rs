use serde_json::json;
use std::sync::Arc;
use walletdb::{
    CURRENT_SCHEMA_VERSION, DbError, FieldEncryption, InMemoryStorage, MigrationRunner, MigrationTable, ReadOptions, RecordKey,
    RecordMiddleware, StorageEngine, StoreConfig, StoreImage, TableSchema, WALLET_TABLES, default_encrypted_fields,
    record_from_json, wallet_migrations, wallet_schema_history,
};

fn wallet_image(version: u32) -> StoreImage {
    let schema = wallet_schema_history().schema_at(version).unwrap();
    StoreImage::create("walletdb", version, &schema).unwrap()
}

fn runner(engine: &Arc<InMemoryStorage>) -> MigrationRunner {
    MigrationRunner::for_wallet(engine.clone(), &StoreConfig::default()).unwrap()
}

fn commits(versions: impl IntoIterator<Item = u32>) -> Vec<(String, u32)> {
    versions.into_iter().map(|v| ("walletdb".to_string(), v)).collect()
}

#[tokio::test]
async fn test_fresh_store_has_all_tables_and_runs_no_steps() {
    let engine = Arc::new(InMemoryStorage::new());
    let ready = runner(&engine).initialize().await.unwrap();

    assert_eq!(ready.report.installed_version, None);
    assert!(ready.report.executed_steps.is_empty());
    assert!(ready.report.opened_versions.is_empty());
    assert_eq!(ready.connection.version().await, CURRENT_SCHEMA_VERSION);

    let tables = ready.connection.table_names().await;
    assert_eq!(tables.len(), 16);
    for table in WALLET_TABLES {
        assert!(tables.iter().any(|t| t == table), "missing table {}", table);
    }
    assert_eq!(engine.commit_history().await, commits([10]));
}

#[tokio::test]
async fn test_current_store_runs_no_steps() {
    let engine = Arc::new(InMemoryStorage::new());
    engine.install(wallet_image(10)).await;

    let ready = runner(&engine).initialize().await.unwrap();
    assert_eq!(ready.report.installed_version, Some(10));
    assert!(ready.report.executed_steps.is_empty());
    assert!(!ready.report.upgraded());
    assert!(engine.commit_history().await.is_empty());
}

#[tokio::test]
async fn test_upgrade_from_two_opens_every_version() {
    let engine = Arc::new(InMemoryStorage::new());
    engine.install(wallet_image(2)).await;

    let ready = runner(&engine).initialize().await.unwrap();
    assert_eq!(ready.report.opened_versions, (3..=10).collect::<Vec<_>>());
    assert_eq!(ready.report.executed_steps, vec![3, 6, 8, 9, 10]);
    assert_eq!(engine.commit_history().await, commits(3..=10));
    assert_eq!(ready.connection.version().await, 10);
    assert_eq!(ready.connection.table_names().await.len(), 16);
}

#[tokio::test]
async fn test_executed_steps_match_pending_range() {
    let table = wallet_migrations().unwrap();
    for installed in 1..CURRENT_SCHEMA_VERSION {
        let engine = Arc::new(InMemoryStorage::new());
        engine.install(wallet_image(installed)).await;

        let expected: Vec<u32> = table
            .steps_between(installed, CURRENT_SCHEMA_VERSION)
            .iter()
            .map(|s| s.version)
            .collect();
        let ready = runner(&engine).initialize().await.unwrap();
        assert_eq!(ready.report.executed_steps, expected, "installed {}", installed);
    }
}

#[tokio::test]
async fn test_newer_store_is_rejected_untouched() {
    let engine = Arc::new(InMemoryStorage::new());
    let mut image = StoreImage::new("walletdb", 11);
    image.create_table(TableSchema::parse("users", "++id, &email").unwrap()).unwrap();
    engine.install(image).await;

    let err = runner(&engine).initialize().await.err().unwrap();
    assert!(matches!(err, DbError::VersionRegression { installed: 11, target: 10 }));
    assert!(err.is_version_regression());
    assert!(engine.commit_history().await.is_empty());

    let stored = engine.load("walletdb").await.unwrap().unwrap();
    assert_eq!(stored.version(), 11);
    assert_eq!(stored.table_names(), vec!["users"]);
}

#[tokio::test]
async fn test_second_initialize_is_a_no_op() {
    let engine = Arc::new(InMemoryStorage::new());
    engine.install(wallet_image(4)).await;

    let first = runner(&engine).initialize().await.unwrap();
    assert_eq!(first.report.executed_steps, vec![6, 8, 9, 10]);
    first.connection.close().await.unwrap();
    engine.clear_commit_history().await;

    let second = runner(&engine).initialize().await.unwrap();
    assert_eq!(second.report.installed_version, Some(10));
    assert!(second.report.executed_steps.is_empty());
    assert!(engine.commit_history().await.is_empty());
}

#[tokio::test]
async fn test_resume_after_six_never_reruns_earlier_steps() {
    let engine = Arc::new(InMemoryStorage::new());
    let mut image = wallet_image(6);
    // Step 3 would lowercase this; it must not run again.
    image
        .table_mut("users")
        .unwrap()
        .put(record_from_json(json!({"email": "Mixed@Case.io"})).unwrap())
        .unwrap();
    image
        .table_mut("contacts")
        .unwrap()
        .put(record_from_json(json!({"name": "Dana", "type": "exchange"})).unwrap())
        .unwrap();
    engine.install(image).await;

    let ready = runner(&engine).initialize().await.unwrap();
    assert_eq!(ready.report.opened_versions, vec![7, 8, 9, 10]);
    assert_eq!(ready.report.executed_steps, vec![8, 9, 10]);

    let users = ready.connection.all("users").await.unwrap();
    assert_eq!(users[0]["email"], json!("Mixed@Case.io"));
    let contacts = ready.connection.all("contacts").await.unwrap();
    assert_eq!(contacts[0]["type"], json!("exchange"));
}

#[tokio::test]
async fn test_email_lowercased_at_three_and_kept_after() {
    let engine = Arc::new(InMemoryStorage::new());
    let mut image = wallet_image(2);
    image
        .table_mut("users")
        .unwrap()
        .put(record_from_json(json!({"email": "User@Example.COM", "name": "Uma"})).unwrap())
        .unwrap();
    image
        .table_mut("contacts")
        .unwrap()
        .put(record_from_json(json!({"name": "Eve"})).unwrap())
        .unwrap();
    image
        .table_mut("transactions")
        .unwrap()
        .put(record_from_json(json!({"hash": "0xabc", "walletId": 1})).unwrap())
        .unwrap();
    engine.install(image).await;

    let ready = runner(&engine).initialize().await.unwrap();
    let conn = &ready.connection;

    let found = conn
        .find_by_index("users", "email", &json!("user@example.com"))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["name"], json!("Uma"));

    let contacts = conn.all("contacts").await.unwrap();
    assert_eq!(contacts[0]["type"], json!("regular"));
    assert_eq!(conn.count("transactions").await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_step_leaves_previous_version_and_retry_resumes() {
    let engine = Arc::new(InMemoryStorage::new());
    let mut image = wallet_image(6);
    image
        .table_mut("transactions")
        .unwrap()
        .put(record_from_json(json!({"hash": "0x1", "walletId": 1})).unwrap())
        .unwrap();
    engine.install(image).await;

    let mut failing = MigrationTable::new(CURRENT_SCHEMA_VERSION);
    failing
        .add_fn_step(8, "always fails", |tx| {
            tx.clear("transactions")?;
            Err(DbError::ExecutionError("disk full".into()))
        })
        .unwrap();
    let err = runner(&engine)
        .with_migrations(failing)
        .initialize()
        .await
        .err()
        .unwrap();
    assert!(matches!(err, DbError::StepExecution { version: 8, .. }));

    // Version 7 was committed; nothing of version 8 was.
    assert_eq!(engine.installed_version("walletdb").await.unwrap(), Some(7));
    let stored = engine.load("walletdb").await.unwrap().unwrap();
    assert_eq!(stored.table("transactions").unwrap().count(), 1);
    assert!(!stored.table("transactions").unwrap().schema().is_indexed("chain"));

    let ready = runner(&engine).initialize().await.unwrap();
    assert_eq!(ready.report.installed_version, Some(7));
    assert_eq!(ready.report.executed_steps, vec![8, 9, 10]);
    assert_eq!(ready.connection.count("transactions").await.unwrap(), 0);
}

#[tokio::test]
async fn test_encrypted_settings_survive_web3_mfa_step() {
    let encryption = FieldEncryption::new("hunter2", default_encrypted_fields());
    let settings = encryption
        .before_write(
            "userSettings",
            record_from_json(json!({"userId": 1, "pinHash": "pin-hash", "totpSecret": "JBSWY3DP"})).unwrap(),
        )
        .unwrap();
    let stored_pin = settings["pinHash"].clone();

    let engine = Arc::new(InMemoryStorage::new());
    let mut image = wallet_image(9);
    image.table_mut("userSettings").unwrap().put(settings).unwrap();
    engine.install(image).await;

    let config = StoreConfig::default().encryption_key("hunter2");
    let ready = MigrationRunner::for_wallet(engine.clone(), &config)
        .unwrap()
        .initialize()
        .await
        .unwrap();
    assert_eq!(ready.report.executed_steps, vec![10]);

    let key = RecordKey::Integer(1);
    let raw = ready
        .connection
        .get_with("userSettings", &key, ReadOptions::raw())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(raw["pinHash"], stored_pin);
    assert_eq!(raw["mfaRequireOnWeb3Requests"], json!(false));

    let plain = ready.connection.get("userSettings", &key).await.unwrap().unwrap();
    assert_eq!(plain["pinHash"], json!("pin-hash"));
    assert_eq!(plain["totpSecret"], json!("JBSWY3DP"));
}

#[tokio::test]
async fn test_status_reports_pending_steps() {
    let engine = Arc::new(InMemoryStorage::new());
    engine.install(wallet_image(7)).await;

    let status = runner(&engine).status().await.unwrap();
    assert_eq!(status.installed_version, Some(7));
    assert_eq!(status.target_version, 10);
    let versions: Vec<u32> = status.pending_steps.iter().map(|(v, _)| *v).collect();
    assert_eq!(versions, vec![8, 9, 10]);
    assert!(engine.commit_history().await.is_empty());
}
