use std::sync::Arc;

use httpmock::prelude::*;
use klinesync_core::{DatasetStore, StoreConfig, SyncError};
use klinesync_hub::HubStore;
use klinesync_mock::ManualClock;

fn config(server: &MockServer, token: Option<&str>) -> StoreConfig {
    StoreConfig {
        endpoint: server.base_url(),
        repo_id: "alice/ohlcv".into(),
        revision: "main".into(),
        path_prefix: "klines".into(),
        token: token.map(str::to_string),
    }
}

fn store(server: &MockServer) -> HubStore {
    HubStore::new_raw(&config(server, Some("hf_test"))).expect("store")
}

#[tokio::test]
async fn download_returns_bytes_and_missing_files_are_none() {
    let server = MockServer::start_async().await;
    let found = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/datasets/alice/ohlcv/resolve/main/klines/BTCUSDT/BTC_15m.parquet")
                .header("authorization", "Bearer hf_test");
            then.status(200).body("PAR1");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/datasets/alice/ohlcv/resolve/main/klines/ETHUSDT/ETH_1h.parquet");
            then.status(404);
        })
        .await;

    let s = store(&server);
    let got = s
        .download("klines/BTCUSDT/BTC_15m.parquet")
        .await
        .expect("download");
    found.assert_async().await;
    assert_eq!(got.as_deref(), Some(&b"PAR1"[..]));

    let missing = s
        .download("klines/ETHUSDT/ETH_1h.parquet")
        .await
        .expect("download");
    assert!(missing.is_none());
}

const PAR1_OID: &str = "fbc62d3b511368ee275ddc74117d8689b430e1427220e25d30816201d89ca7b6";

async fn preupload_answers<'a>(server: &'a MockServer, mode: &str) -> httpmock::Mock<'a> {
    let body = format!(
        r#"{{"files":[{{"path":"klines/BTCUSDT/BTC_15m.parquet","uploadMode":"{mode}","shouldIgnore":false}}]}}"#
    );
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/datasets/alice/ohlcv/preupload/main")
                .header("authorization", "Bearer hf_test")
                .body_includes("\"path\":\"klines/BTCUSDT/BTC_15m.parquet\"")
                .body_includes("\"sample\":\"UEFSMQ==\"")
                .body_includes("\"size\":4");
            then.status(200).body(body);
        })
        .await
}

async fn upload_par1(server: &MockServer) -> Result<(), SyncError> {
    store(server)
        .upload(
            "klines/BTCUSDT/BTC_15m.parquet",
            bytes::Bytes::from_static(b"PAR1"),
            "Update BTCUSDT 15m at 2024-01-01T00:00:00Z",
        )
        .await
}

#[tokio::test]
async fn regular_uploads_inline_base64_in_the_commit() {
    let server = MockServer::start_async().await;
    let pre = preupload_answers(&server, "regular").await;
    let commit = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/datasets/alice/ohlcv/commit/main")
                .header("authorization", "Bearer hf_test")
                .header("content-type", "application/x-ndjson")
                .body_includes("\"key\":\"header\"")
                .body_includes("Update BTCUSDT 15m")
                .body_includes("\"key\":\"file\"")
                .body_includes("\"encoding\":\"base64\"")
                .body_includes("UEFSMQ==");
            then.status(200).body(r#"{"success":true}"#);
        })
        .await;

    upload_par1(&server).await.expect("upload");
    pre.assert_async().await;
    commit.assert_async().await;
}

#[tokio::test]
async fn lfs_uploads_push_the_object_then_commit_a_pointer() {
    let server = MockServer::start_async().await;
    preupload_answers(&server, "lfs").await;
    let batch_body = serde_json::json!({
        "objects": [{
            "oid": PAR1_OID,
            "size": 4,
            "actions": {
                "upload": {
                    "href": server.url("/storage/object"),
                    "header": { "x-amz-meta": "1" },
                },
                "verify": {
                    "href": server.url("/lfs/verify"),
                    "header": {},
                },
            },
        }],
    });
    let batch = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/datasets/alice/ohlcv.git/info/lfs/objects/batch")
                .header("authorization", "Bearer hf_test")
                .header("accept", "application/vnd.git-lfs+json")
                .body_includes("\"operation\":\"upload\"")
                .body_includes(PAR1_OID);
            then.status(200).body(batch_body.to_string());
        })
        .await;
    let put = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/storage/object")
                .header("x-amz-meta", "1")
                .body("PAR1");
            then.status(200);
        })
        .await;
    let verify = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/lfs/verify")
                .header("authorization", "Bearer hf_test")
                .body_includes(PAR1_OID)
                .body_includes("\"size\":4");
            then.status(200);
        })
        .await;
    let commit = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/datasets/alice/ohlcv/commit/main")
                .body_includes("\"key\":\"lfsFile\"")
                .body_includes("\"algo\":\"sha256\"")
                .body_includes(PAR1_OID)
                .body_excludes("UEFSMQ==");
            then.status(200);
        })
        .await;

    upload_par1(&server).await.expect("upload");
    batch.assert_async().await;
    put.assert_async().await;
    verify.assert_async().await;
    commit.assert_async().await;
}

#[tokio::test]
async fn lfs_objects_already_stored_are_not_pushed_again() {
    let server = MockServer::start_async().await;
    preupload_answers(&server, "lfs").await;
    server
        .mock_async(|when, then| {
            when.method(POST).path_includes("/info/lfs/objects/batch");
            then.status(200)
                .body(format!(r#"{{"objects":[{{"oid":"{PAR1_OID}","size":4}}]}}"#));
        })
        .await;
    let put = server
        .mock_async(|when, then| {
            when.method(PUT);
            then.status(200);
        })
        .await;
    let commit = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/datasets/alice/ohlcv/commit/main")
                .body_includes("lfsFile");
            then.status(200);
        })
        .await;

    upload_par1(&server).await.expect("upload");
    put.assert_calls_async(0).await;
    commit.assert_async().await;
}

#[tokio::test]
async fn large_lfs_objects_go_up_in_parts() {
    let server = MockServer::start_async().await;
    preupload_answers(&server, "lfs").await;
    let batch_body = serde_json::json!({
        "objects": [{
            "oid": PAR1_OID,
            "size": 4,
            "actions": {
                "upload": {
                    "href": server.url("/lfs/complete"),
                    "header": {
                        "chunk_size": "3",
                        "00002": server.url("/parts/2"),
                        "00001": server.url("/parts/1"),
                    },
                },
            },
        }],
    });
    server
        .mock_async(|when, then| {
            when.method(POST).path_includes("/info/lfs/objects/batch");
            then.status(200).body(batch_body.to_string());
        })
        .await;
    let first = server
        .mock_async(|when, then| {
            when.method(PUT).path("/parts/1").body("PAR");
            then.status(200).header("etag", "\"e1\"");
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(PUT).path("/parts/2").body("1");
            then.status(200).header("etag", "\"e2\"");
        })
        .await;
    let complete = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/lfs/complete")
                .body_includes(PAR1_OID)
                .body_includes("\"partNumber\":1")
                .body_includes("\"partNumber\":2")
                .body_includes("e1")
                .body_includes("e2");
            then.status(200);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/datasets/alice/ohlcv/commit/main");
            then.status(200);
        })
        .await;

    upload_par1(&server).await.expect("upload");
    first.assert_async().await;
    second.assert_async().await;
    complete.assert_async().await;
}

#[tokio::test]
async fn ignored_paths_are_rejected_without_a_commit() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/datasets/alice/ohlcv/preupload/main");
            then.status(200).body(
                r#"{"files":[{"path":"klines/BTCUSDT/BTC_15m.parquet","uploadMode":"regular","shouldIgnore":true}]}"#,
            );
        })
        .await;
    let commit = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/datasets/alice/ohlcv/commit/main");
            then.status(200);
        })
        .await;

    let err = upload_par1(&server).await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidArg(_)));
    commit.assert_calls_async(0).await;
}

#[tokio::test]
async fn rejected_lfs_objects_are_not_retried() {
    let server = MockServer::start_async().await;
    preupload_answers(&server, "lfs").await;
    server
        .mock_async(|when, then| {
            when.method(POST).path_includes("/info/lfs/objects/batch");
            then.status(200).body(format!(
                r#"{{"objects":[{{"oid":"{PAR1_OID}","size":4,"error":{{"code":422,"message":"size mismatch"}}}}]}}"#
            ));
        })
        .await;

    let err = upload_par1(&server).await.unwrap_err();
    assert!(matches!(err, SyncError::Data(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn delete_posts_a_deleted_file_operation() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/datasets/alice/ohlcv/commit/main")
                .body_includes("deletedFile")
                .body_includes("klines/BTCUSDT/BTC_15m.parquet");
            then.status(200);
        })
        .await;
    store(&server)
        .delete("klines/BTCUSDT/BTC_15m.parquet", "Delete klines/BTCUSDT/BTC_15m.parquet")
        .await
        .expect("delete");
    m.assert_async().await;
}

#[tokio::test]
async fn list_keeps_files_and_follows_next_links() {
    let server = MockServer::start_async().await;
    let next = server.url("/tree-page-2");
    let first = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/datasets/alice/ohlcv/tree/main/klines")
                .query_param("recursive", "true");
            then.status(200)
                .header("link", format!("<{next}>; rel=\"next\""))
                .body(
                    r#"[
                        {"type":"directory","path":"klines/BTCUSDT"},
                        {"type":"file","path":"klines/BTCUSDT/BTC_15m.parquet"}
                    ]"#,
                );
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(GET).path("/tree-page-2");
            then.status(200)
                .body(r#"[{"type":"file","path":"klines/ETHUSDT/ETH_1h.parquet"}]"#);
        })
        .await;

    let paths = store(&server).list("klines").await.expect("list");
    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(
        paths,
        vec![
            "klines/BTCUSDT/BTC_15m.parquet".to_string(),
            "klines/ETHUSDT/ETH_1h.parquet".to_string(),
        ]
    );
}

#[tokio::test]
async fn listing_a_missing_prefix_is_empty() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/datasets/alice/ohlcv/tree/main/klines");
            then.status(404);
        })
        .await;
    assert!(store(&server).list("klines").await.expect("list").is_empty());
}

#[tokio::test]
async fn status_codes_map_onto_the_error_taxonomy() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path_includes("/resolve/main/limited");
            then.status(429).header("Retry-After", "30");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path_includes("/resolve/main/denied");
            then.status(401).body("invalid token");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path_includes("/resolve/main/broken");
            then.status(503);
        })
        .await;

    let s = store(&server);
    let err = s.download("limited/a.parquet").await.unwrap_err();
    assert_eq!(err, SyncError::rate_limited("hub", Some(30_000)));

    let err = s.download("denied/a.parquet").await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidArg(_)));
    assert!(!err.is_retryable());

    let err = s.download("broken/a.parquet").await.unwrap_err();
    assert!(matches!(err, SyncError::Remote { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn anonymous_requests_carry_no_authorization() {
    let server = MockServer::start_async().await;
    let authed = server
        .mock_async(|when, then| {
            when.method(GET).header_exists("authorization");
            then.status(500);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path_includes("/resolve/main/");
            then.status(200).body("x");
        })
        .await;

    let s = HubStore::new_raw(&config(&server, None)).expect("store");
    assert!(s.download("a.parquet").await.expect("download").is_some());
    authed.assert_calls_async(0).await;
}

#[test]
fn malformed_repo_ids_are_rejected() {
    for repo_id in ["", "no-slash", "/name", "owner/", "a/b/c"] {
        let cfg = StoreConfig {
            repo_id: repo_id.into(),
            ..StoreConfig::default()
        };
        let err = HubStore::new_raw(&cfg).err().expect("error");
        assert!(matches!(err, SyncError::InvalidArg(_)), "{repo_id:?}");
    }
}

#[test]
fn rate_limited_builder_stacks_retry_outside_the_limiter() {
    let clock = Arc::new(ManualClock::new(0));
    let (builder, limiter) =
        HubStore::rate_limited(&StoreConfig::default(), clock).expect("builder");
    assert_eq!(builder.layer_names(), vec!["Retry", "RateLimit"]);
    assert_eq!(limiter.config().limit, 300);
    let built = builder.build();
    assert_eq!(built.name(), "hub");
}
