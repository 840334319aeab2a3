use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use walletdb::storage::catalog::CATALOG_FILE;
use walletdb::storage::persistence::{DatabaseSnapshot, SNAPSHOT_FILE, SnapshotManager, WAL_FILE, WalEntry};
use walletdb::{
    DurabilityMode, FileStorage, RecordKey, StorageEngine, StoreConfig, StoreImage, WalletDb, record_from_json,
    wallet_schema_history,
};

fn config(dir: &TempDir) -> StoreConfig {
    StoreConfig::default()
        .data_dir(dir.path())
        .durability(DurabilityMode::Sync)
}

#[tokio::test]
async fn test_fresh_store_layout_on_disk() {
    let dir = TempDir::new().unwrap();
    let db = WalletDb::open(config(&dir)).await.unwrap();
    assert!(db.report().is_fresh());
    db.close().await.unwrap();

    assert!(dir.path().join(CATALOG_FILE).exists());
    assert!(dir.path().join("walletdb").join(SNAPSHOT_FILE).exists());

    let storage = FileStorage::open(dir.path(), DurabilityMode::Sync).unwrap();
    let databases = storage.databases().await.unwrap();
    assert_eq!(databases.len(), 1);
    assert_eq!(databases[0].name, "walletdb");
    assert_eq!(databases[0].version, 10);
}

#[tokio::test]
async fn test_writes_survive_reopen_through_wal() {
    let dir = TempDir::new().unwrap();
    {
        let db = WalletDb::open(config(&dir)).await.unwrap();
        let conn = db.connection();
        conn.put("wallets", record_from_json(json!({"address": "0xabc", "chain": "eth"})).unwrap())
            .await
            .unwrap();
        conn.put("history", record_from_json(json!({"walletId": 1, "timestamp": 1700000000})).unwrap())
            .await
            .unwrap();
        // Dropped without close: only the WAL holds these writes.
    }
    assert!(fs::metadata(dir.path().join("walletdb").join(WAL_FILE)).unwrap().len() > 0);

    let db = WalletDb::open(config(&dir)).await.unwrap();
    assert_eq!(db.report().installed_version, Some(10));
    let wallet = db
        .connection()
        .get("wallets", &RecordKey::Integer(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(wallet["address"], json!("0xabc"));
    assert_eq!(db.connection().count("history").await.unwrap(), 1);
}

#[tokio::test]
async fn test_upgrade_on_disk_from_version_two() {
    let dir = TempDir::new().unwrap();
    {
        let storage = FileStorage::open(dir.path(), DurabilityMode::Sync).unwrap();
        let schema = wallet_schema_history().schema_at(2).unwrap();
        let mut image = StoreImage::create("walletdb", 2, &schema).unwrap();
        image
            .table_mut("users")
            .unwrap()
            .put(record_from_json(json!({"email": "Ops@Wallet.IO"})).unwrap())
            .unwrap();
        storage.commit_version(&image).await.unwrap();
    }

    let db = WalletDb::open(config(&dir)).await.unwrap();
    assert_eq!(db.report().executed_steps, vec![3, 6, 8, 9, 10]);
    db.close().await.unwrap();

    let storage = FileStorage::open(dir.path(), DurabilityMode::Sync).unwrap();
    assert_eq!(storage.installed_version("walletdb").await.unwrap(), Some(10));
    let image = storage.load("walletdb").await.unwrap().unwrap();
    let users = image.table("users").unwrap().records();
    assert_eq!(users[0]["email"], json!("ops@wallet.io"));
    assert_eq!(image.table_names().len(), 16);
}

#[tokio::test]
async fn test_crash_between_snapshot_and_wal_truncate_keeps_migrated_data() {
    let dir = TempDir::new().unwrap();
    {
        let storage = FileStorage::open(dir.path(), DurabilityMode::Sync).unwrap();
        let schema = wallet_schema_history().schema_at(2).unwrap();
        storage
            .commit_version(&StoreImage::create("walletdb", 2, &schema).unwrap())
            .await
            .unwrap();
        storage
            .append(
                "walletdb",
                &WalEntry::Put {
                    table: "users".to_string(),
                    record: record_from_json(json!({"id": 1, "email": "User@Example.COM"})).unwrap(),
                },
            )
            .await
            .unwrap();
    }

    // Version 3 snapshot lands on disk, then the process dies before the WAL is truncated.
    let schema = wallet_schema_history().schema_at(3).unwrap();
    let mut migrated = StoreImage::create("walletdb", 3, &schema).unwrap();
    migrated
        .table_mut("users")
        .unwrap()
        .put(record_from_json(json!({"id": 1, "email": "user@example.com"})).unwrap())
        .unwrap();
    SnapshotManager::new(dir.path().join("walletdb").join(SNAPSHOT_FILE))
        .save(&DatabaseSnapshot::new(migrated, 2))
        .unwrap();
    assert!(fs::metadata(dir.path().join("walletdb").join(WAL_FILE)).unwrap().len() > 0);

    let db = WalletDb::open(config(&dir)).await.unwrap();
    assert_eq!(db.report().installed_version, Some(3));
    assert_eq!(db.report().executed_steps, vec![6, 8, 9, 10]);
    let user = db
        .connection()
        .get("users", &RecordKey::Integer(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user["email"], json!("user@example.com"));
}

#[tokio::test]
async fn test_secrets_are_ciphertext_on_disk() {
    let dir = TempDir::new().unwrap();
    let db = WalletDb::open(config(&dir).encryption_key("s3cret-pass")).await.unwrap();
    db.connection()
        .put(
            "wallets",
            record_from_json(json!({"address": "0x1", "privateKey": "plaintext-private-key"})).unwrap(),
        )
        .await
        .unwrap();
    db.close().await.unwrap();

    let snapshot = fs::read(dir.path().join("walletdb").join(SNAPSHOT_FILE)).unwrap();
    let needle = b"plaintext-private-key";
    assert!(!snapshot.windows(needle.len()).any(|w| w == needle));

    let reopened = WalletDb::open(config(&dir).encryption_key("s3cret-pass")).await.unwrap();
    let wallet = reopened
        .connection()
        .get("wallets", &RecordKey::Integer(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(wallet["privateKey"], json!("plaintext-private-key"));

    let wrong = WalletDb::open(config(&dir).encryption_key("other")).await.unwrap();
    assert!(wrong.connection().get("wallets", &RecordKey::Integer(1)).await.is_err());
}

#[tokio::test]
async fn test_newer_store_on_disk_is_not_modified() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(FileStorage::open(dir.path(), DurabilityMode::Sync).unwrap());
    storage.commit_version(&StoreImage::new("walletdb", 12)).await.unwrap();
    let snapshot_path = dir.path().join("walletdb").join(SNAPSHOT_FILE);
    let before = fs::read(&snapshot_path).unwrap();

    let err = WalletDb::open_with_engine(storage.clone(), config(&dir)).await.err().unwrap();
    assert!(err.is_version_regression());
    assert_eq!(fs::read(&snapshot_path).unwrap(), before);
    assert_eq!(storage.installed_version("walletdb").await.unwrap(), Some(12));
}

#[tokio::test]
async fn test_reset_removes_store() {
    let dir = TempDir::new().unwrap();
    WalletDb::open(config(&dir)).await.unwrap().close().await.unwrap();

    let storage = FileStorage::open(dir.path(), DurabilityMode::Sync).unwrap();
    storage.delete_database("walletdb").await.unwrap();
    assert_eq!(storage.installed_version("walletdb").await.unwrap(), None);
    assert!(!dir.path().join("walletdb").exists());

    let db = WalletDb::open(config(&dir)).await.unwrap();
    assert!(db.report().is_fresh());
}
