//! Catalog API integration tests.
//!
//! Tests HTTP endpoints against a [`TestHarness`] server running on a
//! random port with an in-memory SQLite database and a tempdir media root.

mod common;

use std::time::Duration;

use common::TestHarness;

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_200() {
    let (_harness, addr) = TestHarness::with_server().await;

    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

// ---------------------------------------------------------------------------
// Catalog CRUD
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_videos_empty() {
    let (_harness, addr) = TestHarness::with_server().await;

    let resp = reqwest::get(format!("http://{addr}/api/videos"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert!(body.is_empty());
}

#[tokio::test]
async fn create_video_registers_and_runs_post_upload() {
    let (harness, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/videos"))
        .json(&serde_json::json!({
            "source_path": "videos/new.mp4",
            "title": "Fresh Upload",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["title"], "Fresh Upload");
    let video_id = vf_core::VideoId::from(body["id"].as_i64().unwrap());

    // The post-upload pipeline runs in the background. The probe fails (the
    // source does not exist), but a preview row with default parameters is
    // still created.
    let mut preview = None;
    for _ in 0..50 {
        let conn = vf_db::pool::get_conn(&harness.ctx.db).unwrap();
        preview = vf_db::queries::previews::get_preview_by_video(&conn, video_id).unwrap();
        if preview.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let preview = preview.expect("post-upload pipeline never created a preview");
    assert_eq!(preview.start_offset, 0);
    assert_eq!(preview.preview_duration, 120);

    let resp = reqwest::get(format!("http://{addr}/api/videos"))
        .await
        .unwrap();
    let body: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(body.len(), 1);
}

#[tokio::test]
async fn create_video_requires_source_path() {
    let (_harness, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/videos"))
        .json(&serde_json::json!({ "source_path": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn delete_video_removes_row_and_derived_media() {
    let (harness, addr) = TestHarness::with_server().await;
    let video = harness.seed_video();

    // Derived artifacts on disk.
    harness.seed_playlist(video.id, "#EXTM3U\n");
    harness.seed_segment(video.id, vf_core::Resolution::P720, "segment_000.mp4", b"x");
    let index_dir = harness.ctx.config.media.index_dir(video.id);
    let transcode_root = harness.ctx.config.media.video_transcode_dir(video.id);
    assert!(index_dir.exists());
    assert!(transcode_root.exists());

    let client = reqwest::Client::new();
    let resp = client
        .delete(format!("http://{addr}/api/videos/{}", video.id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    assert!(!index_dir.exists());
    assert!(!transcode_root.exists());

    let conn = vf_db::pool::get_conn(&harness.ctx.db).unwrap();
    assert!(vf_db::queries::videos::get_video(&conn, video.id)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn delete_unknown_video_is_404() {
    let (_harness, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .delete(format!("http://{addr}/api/videos/9999"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

// ---------------------------------------------------------------------------
// Preview retranscode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retranscode_preview_resets_state() {
    let (harness, addr) = TestHarness::with_server().await;
    let video = harness.seed_video();

    let preview_id = {
        let conn = vf_db::pool::get_conn(&harness.ctx.db).unwrap();
        let (preview, _) =
            vf_db::queries::previews::get_or_create_preview(&conn, video.id, 60, 120).unwrap();
        vf_db::queries::previews::set_preview_status(
            &conn,
            preview.id,
            vf_core::PreviewStatus::Failed,
            Some("old failure"),
        )
        .unwrap();
        preview.id
    };

    let client = reqwest::Client::new();
    let resp = client
        .post(format!(
            "http://{addr}/api/videos/{}/preview/retranscode",
            video.id
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "pending");

    let conn = vf_db::pool::get_conn(&harness.ctx.db).unwrap();
    let preview = vf_db::queries::previews::get_preview(&conn, preview_id)
        .unwrap()
        .unwrap();
    assert!(preview.error_message.is_none());
    assert!(!preview.is_transcoded);
}

// ---------------------------------------------------------------------------
// Thumbnails
// ---------------------------------------------------------------------------

#[tokio::test]
async fn thumbnail_served_when_present() {
    let (harness, addr) = TestHarness::with_server().await;
    let video = harness.seed_video();

    let thumb_path = harness.ctx.config.media.thumbnail_path(video.id);
    std::fs::create_dir_all(thumb_path.parent().unwrap()).unwrap();
    std::fs::write(&thumb_path, b"jpeg-bytes").unwrap();

    let resp = reqwest::get(format!(
        "http://{addr}/thumbnail/video_{}/thumbnail.jpg",
        video.id
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/jpeg");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"jpeg-bytes");
}

#[tokio::test]
async fn thumbnail_missing_is_404_and_bad_dir_is_400() {
    let (harness, addr) = TestHarness::with_server().await;
    let video = harness.seed_video();

    let resp = reqwest::get(format!(
        "http://{addr}/thumbnail/video_{}/thumbnail.jpg",
        video.id
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = reqwest::get(format!("http://{addr}/thumbnail/nonsense/thumbnail.jpg"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}
