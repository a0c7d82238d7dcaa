use std::env;
use std::path::PathBuf;
use std::time::Duration;

use futures::channel::oneshot;
use futures::channel::oneshot::Sender;
use kernel::{
    CopyState, CopyStatus, DirectoryProperties, ErrorBody, ErrorCode, FileProperties, FileRange,
    ItemKind, ListPage, MetadataBody, ShareItem, ShareProperties, ShareStats,
};
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde_json::json;
use server::config::ServerConfig;
use test_context::{test_context, AsyncTestContext};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ\
                            abcdefghijklmnopqrstuvwxyz\
                            0123456789_";
const DB_LEN: usize = 20;
const ACCOUNT: &str = "devstoreaccount1";

struct FshareAsyncContext {
    db: PathBuf,
    base: String,
    client: Client,
    shutdown: Sender<()>,
    join: JoinHandle<()>,
}

impl FshareAsyncContext {
    async fn remove_db(db_path: PathBuf) {
        tokio::fs::remove_file(db_path.clone())
            .await
            .unwrap_or_default();
        let base_db_file = db_path.as_os_str().to_str().unwrap().to_owned();
        let chm_file = base_db_file.clone() + "-shm";
        let wal_file = base_db_file + "-wal";
        tokio::fs::remove_file(chm_file).await.unwrap_or_default();
        tokio::fs::remove_file(wal_file).await.unwrap_or_default();
    }

    fn url(&self, tail: &str) -> String {
        format!("{}/api/{ACCOUNT}{tail}", self.base)
    }

    async fn create_share(&self, share: &str) {
        let response = self
            .client
            .put(self.url(&format!("/shares/{share}")))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    async fn create_directory(&self, share: &str, path: &str) -> reqwest::Response {
        self.client
            .put(self.url(&format!("/shares/{share}/directory")))
            .query(&[("path", path)])
            .json(&json!({}))
            .send()
            .await
            .unwrap()
    }

    async fn create_file(&self, share: &str, path: &str, length: u64) -> reqwest::Response {
        self.client
            .put(self.url(&format!("/shares/{share}/file")))
            .query(&[("path", path)])
            .json(&json!({ "length": length }))
            .send()
            .await
            .unwrap()
    }

    async fn upload(&self, share: &str, path: &str, offset: u64, data: Vec<u8>) -> reqwest::Response {
        self.client
            .put(self.url(&format!("/shares/{share}/file/range")))
            .query(&[("path", path), ("offset", offset.to_string().as_str())])
            .body(data)
            .send()
            .await
            .unwrap()
    }

    async fn file_properties(&self, share: &str, path: &str) -> FileProperties {
        self.client
            .get(self.url(&format!("/shares/{share}/file/properties")))
            .query(&[("path", path)])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}

async fn error_code(response: reqwest::Response) -> ErrorCode {
    let body: ErrorBody = response.json().await.unwrap();
    body.code
}

impl AsyncTestContext for FshareAsyncContext {
    async fn setup() -> FshareAsyncContext {
        let tmp_dir = env::temp_dir();
        let db_file: String = (10..DB_LEN)
            .map(|_| {
                let idx = rand::thread_rng().gen_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect();

        let config = ServerConfig {
            data_dir: tmp_dir,
            data_file: db_file + ".db",
            port: 0,
            copy_delay: Duration::from_millis(50),
        };
        let db = config.database_path();
        if db.exists() {
            FshareAsyncContext::remove_db(db.clone()).await;
        }
        server::init_database(&db).expect("Database file cannot be created");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        println!("port `{port}` is used");

        let (send, recv) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server::serve(listener, &config, async {
                recv.await.unwrap_or_default();
            })
            .await
            .unwrap();
        });

        FshareAsyncContext {
            db,
            base: format!("http://127.0.0.1:{port}"),
            client: Client::new(),
            shutdown: send,
            join: task,
        }
    }

    async fn teardown(self) {
        self.shutdown.send(()).unwrap_or_default();
        self.join.await.unwrap_or_default();
        FshareAsyncContext::remove_db(self.db).await;
    }
}

#[test_context(FshareAsyncContext)]
#[tokio::test]
async fn create_share_twice_conflicts(ctx: &mut FshareAsyncContext) {
    // Arrange
    ctx.create_share("s1").await;

    // Act
    let response = ctx
        .client
        .put(ctx.url("/shares/s1"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(response).await, ErrorCode::ShareAlreadyExists);
}

#[test_context(FshareAsyncContext)]
#[tokio::test]
async fn create_share_with_quota_and_metadata(ctx: &mut FshareAsyncContext) {
    // Arrange
    let body = json!({ "quota": 10, "metadata": { "owner": "ops" } });

    // Act
    let created: ShareProperties = ctx
        .client
        .put(ctx.url("/shares/s1"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let shares: Vec<ShareItem> = ctx
        .client
        .get(ctx.url(""))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Assert
    assert_eq!(created.quota, 10);
    assert_eq!(created.metadata["owner"], "ops");
    assert_eq!(shares.len(), 1);
    assert_eq!(shares[0].name, "s1");
    assert_eq!(shares[0].etag, created.etag);
}

#[test_context(FshareAsyncContext)]
#[tokio::test]
async fn invalid_share_name_rejected(ctx: &mut FshareAsyncContext) {
    // Act
    let response = ctx
        .client
        .put(ctx.url("/shares/Bad_Name"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, ErrorCode::InvalidResourceName);
}

#[test_context(FshareAsyncContext)]
#[tokio::test]
async fn missing_share_not_found(ctx: &mut FshareAsyncContext) {
    // Act
    let response = ctx.client.get(ctx.url("/shares/nope")).send().await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(response).await, ErrorCode::ShareNotFound);
}

#[test_context(FshareAsyncContext)]
#[tokio::test]
async fn stale_etag_fails_metadata_update(ctx: &mut FshareAsyncContext) {
    // Arrange
    ctx.create_share("s1").await;
    let before: ShareProperties = ctx
        .client
        .get(ctx.url("/shares/s1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let body = json!({ "metadata": { "k": "v1" } });
    ctx.client
        .put(ctx.url("/shares/s1/metadata"))
        .header("If-Match", &before.etag)
        .json(&body)
        .send()
        .await
        .unwrap();

    // Act
    let stale = ctx
        .client
        .put(ctx.url("/shares/s1/metadata"))
        .header("If-Match", &before.etag)
        .json(&json!({ "metadata": { "k": "v2" } }))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(stale.status(), StatusCode::PRECONDITION_FAILED);
    let metadata: MetadataBody = ctx
        .client
        .get(ctx.url("/shares/s1/metadata"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(metadata.metadata["k"], "v1");
}

#[test_context(FshareAsyncContext)]
#[tokio::test]
async fn directory_lifecycle(ctx: &mut FshareAsyncContext) {
    // Arrange
    ctx.create_share("s1").await;
    let created = ctx.create_directory("s1", "d1").await;
    let duplicate = ctx.create_directory("s1", "d1").await;
    ctx.create_file("s1", "d1/f1", 10).await;

    // Act
    let not_empty = ctx
        .client
        .delete(ctx.url("/shares/s1/directory"))
        .query(&[("path", "d1")])
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(created.status(), StatusCode::CREATED);
    let properties: DirectoryProperties = created.json().await.unwrap();
    assert_eq!(properties.path, "d1");
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
    assert_eq!(not_empty.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(not_empty).await, ErrorCode::DirectoryNotEmpty);
}

#[test_context(FshareAsyncContext)]
#[tokio::test]
async fn directory_without_parent_not_found(ctx: &mut FshareAsyncContext) {
    // Arrange
    ctx.create_share("s1").await;

    // Act
    let response = ctx.create_directory("s1", "a/b").await;

    // Assert
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(response).await, ErrorCode::ParentNotFound);
}

#[test_context(FshareAsyncContext)]
#[tokio::test]
async fn list_pages_with_marker(ctx: &mut FshareAsyncContext) {
    // Arrange
    ctx.create_share("s1").await;
    ctx.create_directory("s1", "b").await;
    ctx.create_file("s1", "a", 1).await;
    ctx.create_file("s1", "c", 2).await;

    // Act
    let first: ListPage = ctx
        .client
        .get(ctx.url("/shares/s1/list"))
        .query(&[("maxresults", "2")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let marker = first.next_marker.clone().unwrap();
    let second: ListPage = ctx
        .client
        .get(ctx.url("/shares/s1/list"))
        .query(&[("maxresults", "2"), ("marker", marker.as_str())])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Assert
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.items[1].kind, ItemKind::Directory);
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].length, Some(2));
    assert!(second.next_marker.is_none());
}

#[test_context(FshareAsyncContext)]
#[tokio::test]
async fn sparse_ranges_and_zero_fill(ctx: &mut FshareAsyncContext) {
    // Arrange
    ctx.create_share("s1").await;
    ctx.create_directory("s1", "d1").await;
    ctx.create_file("s1", "d1/f1", 8192).await;
    ctx.upload("s1", "d1/f1", 0, vec![0xAA; 1024]).await;
    ctx.upload("s1", "d1/f1", 4096, vec![0xBB; 1536]).await;

    // Act
    let cleared = ctx
        .client
        .delete(ctx.url("/shares/s1/file/range"))
        .query(&[("path", "d1/f1"), ("offset", "4608"), ("length", "512")])
        .send()
        .await
        .unwrap();
    let ranges: Vec<FileRange> = ctx
        .client
        .get(ctx.url("/shares/s1/file/ranges"))
        .query(&[("path", "d1/f1")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let content = ctx
        .client
        .get(ctx.url("/shares/s1/file"))
        .query(&[("path", "d1/f1")])
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();

    // Assert
    assert_eq!(cleared.status(), StatusCode::OK);
    assert_eq!(
        ranges,
        vec![
            FileRange::new(0, 1023),
            FileRange::new(4096, 4607),
            FileRange::new(5120, 5631)
        ]
    );
    assert_eq!(content.len(), 8192);
    assert!(content[1024..4096].iter().all(|b| *b == 0));
    assert!(content[4608..5120].iter().all(|b| *b == 0));
    assert!(content[5120..5632].iter().all(|b| *b == 0xBB));
}

#[test_context(FshareAsyncContext)]
#[tokio::test]
async fn upload_past_length_not_satisfiable(ctx: &mut FshareAsyncContext) {
    // Arrange
    ctx.create_share("s1").await;
    ctx.create_file("s1", "f1", 100).await;

    // Act
    let response = ctx.upload("s1", "f1", 90, vec![1; 20]).await;

    // Assert
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(error_code(response).await, ErrorCode::InvalidRange);
}

#[test_context(FshareAsyncContext)]
#[tokio::test]
async fn partial_download(ctx: &mut FshareAsyncContext) {
    // Arrange
    ctx.create_share("s1").await;
    ctx.create_file("s1", "f1", 16).await;
    ctx.upload("s1", "f1", 4, b"abcd".to_vec()).await;

    // Act
    let response = ctx
        .client
        .get(ctx.url("/shares/s1/file"))
        .query(&[("path", "f1"), ("offset", "3"), ("length", "6")])
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    let content = response.bytes().await.unwrap();
    assert_eq!(&content[..], b"\0abcd\0");
}

#[test_context(FshareAsyncContext)]
#[tokio::test]
async fn headers_replaced_as_a_whole(ctx: &mut FshareAsyncContext) {
    // Arrange
    ctx.create_share("s1").await;
    ctx.create_file("s1", "f1", 3).await;
    ctx.client
        .put(ctx.url("/shares/s1/file/properties"))
        .query(&[("path", "f1")])
        .json(&json!({ "content_type": "text/plain", "content_language": "en" }))
        .send()
        .await
        .unwrap();

    // Act
    ctx.client
        .put(ctx.url("/shares/s1/file/properties"))
        .query(&[("path", "f1")])
        .json(&json!({ "content_type": "text/csv" }))
        .send()
        .await
        .unwrap();
    let properties = ctx.file_properties("s1", "f1").await;

    // Assert
    assert_eq!(properties.headers.content_type.as_deref(), Some("text/csv"));
    assert_eq!(properties.headers.content_language, None);
}

#[test_context(FshareAsyncContext)]
#[tokio::test]
async fn share_stats_sum_declared_lengths(ctx: &mut FshareAsyncContext) {
    // Arrange
    ctx.create_share("s1").await;
    ctx.create_file("s1", "f1", 100).await;
    ctx.create_file("s1", "f2", 28).await;

    // Act
    let stats: ShareStats = ctx
        .client
        .get(ctx.url("/shares/s1/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Assert
    assert_eq!(stats.usage_bytes, 128);
    assert_eq!(stats.file_count, 2);
}

#[test_context(FshareAsyncContext)]
#[tokio::test]
async fn copy_completes_then_abort_is_too_late(ctx: &mut FshareAsyncContext) {
    // Arrange
    ctx.create_share("s1").await;
    ctx.create_file("s1", "src", 8).await;
    ctx.upload("s1", "src", 0, b"copyme!!".to_vec()).await;

    // Act
    let started: CopyState = ctx
        .client
        .put(ctx.url("/shares/s1/file/copy"))
        .query(&[("path", "dst")])
        .json(&json!({ "source": { "share": "s1", "path": "src" } }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let mut status = started.status;
    for _ in 0..100 {
        let properties = ctx.file_properties("s1", "dst").await;
        status = properties.copy.unwrap().status;
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let abort = ctx
        .client
        .delete(ctx.url("/shares/s1/file/copy"))
        .query(&[("path", "dst"), ("copy_id", started.id.as_str())])
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(started.status, CopyStatus::Pending);
    assert_eq!(status, CopyStatus::Success);
    assert_eq!(abort.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(abort).await, ErrorCode::NoPendingCopyOperation);
    let content = ctx
        .client
        .get(ctx.url("/shares/s1/file"))
        .query(&[("path", "dst")])
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(&content[..], b"copyme!!");
}

#[test_context(FshareAsyncContext)]
#[tokio::test]
async fn openapi_document_served(ctx: &mut FshareAsyncContext) {
    // Act
    let response = ctx
        .client
        .get(format!("{}/api-docs/openapi.json", ctx.base))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let doc: serde_json::Value = response.json().await.unwrap();
    assert!(doc["paths"]["/api/{account}/shares/{share}/file/range"].is_object());
}
