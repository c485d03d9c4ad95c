//! Integration tests for the localization sync engine.
//!
//! These tests exercise whole workflows through the worker: translation
//! sweeps against a mocked completion endpoint, exports uploaded to a
//! mocked storage collaborator, environment migration, and import.

use tempfile::TempDir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use locsync::export::ExportFormat;
use locsync::import::ImportFormat;
use locsync::migration::MigrationEvent;
use locsync::model::{Key, Language, Resource};
use locsync::store::collections;
use locsync::{Config, QueueEvent, Store, Worker};

// ==================== Test Helpers ====================

fn test_config(server: &MockServer) -> Config {
    let mut config = Config::for_tests();
    config.completion_api_url = format!("{}/v1/chat/completions", server.uri());
    config.notification_url = format!("{}/notify", server.uri());
    config.storage_url = server.uri();
    config
}

fn seed_languages(store: &Store, tenant: &str) {
    let mut en = Language::new("en-US", "English", tenant);
    en.is_default = true;
    store.save_language(&en).expect("Should save language");
    store
        .save_language(&Language::new("fr-FR", "French", tenant))
        .expect("Should save language");
}

fn seed_key(store: &Store, tenant: &str, name: &str, english: &str) -> Key {
    let mut key = Key::new(name, "mod-1", tenant, "alice");
    key.put_resource(Resource::new("en-US", english));
    store.save_key(&key).expect("Should save key");
    key
}

fn chat_reply(content: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    })
}

async fn mount_notify(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/notify"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

// ==================== Translation ====================

#[tokio::test]
async fn translate_all_fills_gaps_from_the_default_language() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("Bonjour")))
        .mount(&server)
        .await;

    let store = Store::in_memory().unwrap();
    seed_languages(&store, "tenant-a");
    let key = seed_key(&store, "tenant-a", "greeting", "Hello");
    // A key with no default value never reaches the completion endpoint
    seed_key(&store, "tenant-a", "untranslatable", "");

    let worker = Worker::new(&test_config(&server), store.clone());
    worker
        .handle(QueueEvent::TranslateAll {
            tenant: "tenant-a".to_string(),
            connection_id: "conn-1".to_string(),
            user_id: "alice".to_string(),
        })
        .await;

    let translated = store.get_key("tenant-a", &key.id).unwrap().unwrap();
    assert_eq!(translated.resource("fr-FR").unwrap().value, "Bonjour");
    assert!(!translated.is_partially_translated);

    // Each translation writes an audit entry
    assert!(store.count("tenant-a", collections::KEY_TIMELINES).unwrap() >= 1);
}

#[tokio::test]
async fn translate_key_survives_completion_outage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = Store::in_memory().unwrap();
    seed_languages(&store, "tenant-a");
    let key = seed_key(&store, "tenant-a", "greeting", "Hello");

    let mut config = test_config(&server);
    config.max_concurrent_completions = 1;
    let worker = Worker::new(&config, store.clone());
    worker
        .handle(QueueEvent::TranslateKey {
            tenant: "tenant-a".to_string(),
            key_id: key.id.clone(),
            connection_id: "conn-1".to_string(),
            user_id: "alice".to_string(),
        })
        .await;

    let untouched = store.get_key("tenant-a", &key.id).unwrap().unwrap();
    assert!(untouched.is_partially_translated);
    assert!(!untouched.resource("fr-FR").unwrap().is_filled());
    // The default language text is still intact
    assert_eq!(untouched.resource("en-US").unwrap().value, "Hello");
}

#[tokio::test]
async fn translate_all_event_notifies_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("Bonjour")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = Store::in_memory().unwrap();
    seed_languages(&store, "tenant-a");
    seed_key(&store, "tenant-a", "greeting", "Hello");

    let worker = Worker::new(&test_config(&server), store);
    worker
        .handle(QueueEvent::TranslateAll {
            tenant: "tenant-a".to_string(),
            connection_id: "conn-1".to_string(),
            user_id: "alice".to_string(),
        })
        .await;

    let notify = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.url.path() == "/notify")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&notify.body).unwrap();
    assert_eq!(body["responseKey"], "translateAllFinished");
    assert_eq!(body["responseValue"], "completed");
    assert_eq!(body["connectionId"], "conn-1");
}

// ==================== Export ====================

#[tokio::test]
async fn export_event_uploads_csv_and_notifies_completion() {
    let server = MockServer::start().await;
    mount_notify(&server).await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "file-42" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Store::in_memory().unwrap();
    seed_languages(&store, "tenant-a");
    let mut key = seed_key(&store, "tenant-a", "greeting", "Hello");
    key.put_resource(Resource::new("fr-FR", "Bonjour"));
    store.save_key(&key).unwrap();

    let worker = Worker::new(&test_config(&server), store);
    worker
        .handle(QueueEvent::GenerateExportFiles {
            tenant: "tenant-a".to_string(),
            format: ExportFormat::Csv,
            connection_id: "conn-1".to_string(),
            user_id: "alice".to_string(),
        })
        .await;

    let uploads: Vec<_> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/files")
        .collect();
    assert_eq!(uploads.len(), 1);

    let body = String::from_utf8(uploads[0].body.clone()).unwrap();
    assert!(body.starts_with("ItemId,ModuleId,Value,Module,KeyName,en-US,fr-FR,fr-FR_CharacterLength"));
    assert!(body.contains("Bonjour"));
}

#[tokio::test]
async fn xliff_export_excludes_keys_without_default_value() {
    let server = MockServer::start().await;
    mount_notify(&server).await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "file-43" })),
        )
        .mount(&server)
        .await;

    let store = Store::in_memory().unwrap();
    seed_languages(&store, "tenant-a");

    let module = locsync::model::Module::new("checkout", "tenant-a", "alice");
    store.save_module(&module).unwrap();
    let mut with_source = Key::new("cart.total", &module.id, "tenant-a", "alice");
    with_source.put_resource(Resource::new("en-US", "Total"));
    store.save_key(&with_source).unwrap();
    let mut without_source = Key::new("cart.hidden", &module.id, "tenant-a", "alice");
    without_source.put_resource(Resource::new("fr-FR", "Caché"));
    store.save_key(&without_source).unwrap();

    let worker = Worker::new(&test_config(&server), store);
    worker
        .handle(QueueEvent::GenerateExportFiles {
            tenant: "tenant-a".to_string(),
            format: ExportFormat::Xliff,
            connection_id: "conn-1".to_string(),
            user_id: "alice".to_string(),
        })
        .await;

    let uploads: Vec<_> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/files")
        .collect();
    assert_eq!(uploads.len(), 1);

    use std::io::Read;
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(uploads[0].body.clone())).unwrap();
    let mut xlf = String::new();
    archive
        .by_name("fr-FR.xlf")
        .unwrap()
        .read_to_string(&mut xlf)
        .unwrap();
    assert!(xlf.contains("cart.total"));
    assert!(!xlf.contains("cart.hidden"));
}

// ==================== Migration ====================

#[tokio::test]
async fn migration_event_copies_environment_and_records_tracker() {
    let server = MockServer::start().await;
    mount_notify(&server).await;

    let store = Store::in_memory().unwrap();
    let a = seed_key(&store, "dev", "a", "A");
    seed_key(&store, "dev", "b", "B");
    seed_key(&store, "dev", "c", "C");

    // One key already exists in the target with stale content
    let mut stale = a.clone();
    stale.tenant = "prod".to_string();
    stale.put_resource(Resource::new("en-US", "stale"));
    store.save_key(&stale).unwrap();

    let worker = Worker::new(&test_config(&server), store.clone());
    worker
        .handle(QueueEvent::MigrateEnvironment(MigrationEvent {
            tracker_id: "tracker-1".to_string(),
            source_tenant: "dev".to_string(),
            target_tenant: "prod".to_string(),
            project_key: "dev".to_string(),
            targeted_project_key: "prod".to_string(),
            overwrite: true,
            connection_id: "conn-1".to_string(),
            user_id: "alice".to_string(),
        }))
        .await;

    assert_eq!(store.list_keys("prod").unwrap().len(), 3);
    let overwritten = store.get_key("prod", &a.id).unwrap().unwrap();
    assert_eq!(overwritten.resource("en-US").unwrap().value, "A");

    let tracker = store.get_tracker("root", "tracker-1").unwrap().unwrap();
    assert!(tracker.language_service.unwrap().is_completed);

    // Timeline: one entry per migrated key, in the target tenant
    assert_eq!(store.count("prod", collections::KEY_TIMELINES).unwrap(), 3);
}

#[tokio::test]
async fn insert_only_migration_redelivery_writes_nothing_new() {
    let server = MockServer::start().await;
    mount_notify(&server).await;

    let store = Store::in_memory().unwrap();
    seed_key(&store, "dev", "a", "A");
    seed_key(&store, "dev", "b", "B");

    let worker = Worker::new(&test_config(&server), store.clone());
    let event = QueueEvent::MigrateEnvironment(MigrationEvent {
        tracker_id: "tracker-2".to_string(),
        source_tenant: "dev".to_string(),
        target_tenant: "prod".to_string(),
        project_key: "dev".to_string(),
        targeted_project_key: "prod".to_string(),
        overwrite: false,
        connection_id: String::new(),
        user_id: String::new(),
    });

    worker.handle(event.clone()).await;
    assert_eq!(store.list_keys("prod").unwrap().len(), 2);
    assert_eq!(store.count("prod", collections::KEY_TIMELINES).unwrap(), 2);

    // Redelivery: everything already exists, so no writes and no new
    // timeline entries
    worker.handle(event).await;
    assert_eq!(store.list_keys("prod").unwrap().len(), 2);
    assert_eq!(store.count("prod", collections::KEY_TIMELINES).unwrap(), 2);
}

// ==================== Import ====================

#[tokio::test]
async fn import_event_roundtrips_a_json_export() {
    let server = MockServer::start().await;
    mount_notify(&server).await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "file-44" })),
        )
        .mount(&server)
        .await;

    let store = Store::in_memory().unwrap();
    seed_languages(&store, "tenant-a");
    let module = locsync::model::Module::new("checkout", "tenant-a", "alice");
    store.save_module(&module).unwrap();
    let mut key = Key::new("cart.total", &module.id, "tenant-a", "alice");
    key.put_resource(Resource::new("en-US", "Total"));
    key.put_resource(Resource::new("fr-FR", "Totale"));
    key.routes = vec!["/cart".to_string()];
    store.save_key(&key).unwrap();

    let worker = Worker::new(&test_config(&server), store.clone());
    worker
        .handle(QueueEvent::GenerateExportFiles {
            tenant: "tenant-a".to_string(),
            format: ExportFormat::Json,
            connection_id: "conn-1".to_string(),
            user_id: "alice".to_string(),
        })
        .await;

    let exported = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.url.path() == "/files")
        .unwrap()
        .body;

    // Import into a fresh tenant
    worker
        .handle(QueueEvent::ImportFile {
            tenant: "tenant-b".to_string(),
            format: ImportFormat::Json,
            bytes: exported,
            connection_id: "conn-1".to_string(),
            user_id: "alice".to_string(),
        })
        .await;

    let modules = store.list_modules("tenant-b").unwrap();
    assert_eq!(modules.len(), 1);
    let imported = store
        .find_key_by_name("tenant-b", &modules[0].id, "cart.total")
        .unwrap()
        .unwrap();
    assert_eq!(imported.resource("en-US").unwrap().value, "Total");
    assert_eq!(imported.resource("fr-FR").unwrap().value, "Totale");
    assert_eq!(imported.routes, vec!["/cart"]);
}

// ==================== Persistence ====================

#[tokio::test]
async fn store_survives_reopen_from_disk() {
    let temp_dir = TempDir::new().expect("Should create temp dir");
    let db_path = temp_dir.path().join("locsync.db");
    let db_path = db_path.to_str().unwrap();

    let key_id;
    {
        let store = Store::new(db_path).unwrap();
        seed_languages(&store, "tenant-a");
        key_id = seed_key(&store, "tenant-a", "greeting", "Hello").id;
    }

    let reopened = Store::new(db_path).unwrap();
    let key = reopened.get_key("tenant-a", &key_id).unwrap().unwrap();
    assert_eq!(key.resource("en-US").unwrap().value, "Hello");
    assert_eq!(reopened.list_languages("tenant-a").unwrap().len(), 2);
}
