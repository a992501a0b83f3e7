#![cfg(feature = "web")]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use sheetdesk::app::{AppState, router};
use sheetdesk::config::Settings;
use sheetdesk::dialogs::NoticeBuffer;
use sheetdesk::storage::FileStore;
use sheetdesk::{RecordStore, Session};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "sheetdesk-test-boundary";

fn app(dir: &TempDir) -> Router {
    let settings = Settings {
        data_dir: dir.path().join("data"),
        static_dir: dir.path().join("static"),
        ..Settings::default()
    };
    let store = RecordStore::open(FileStore::new(&settings.data_dir)).unwrap();
    let session = Session::new(store, NoticeBuffer::new()).with_page_size(2);
    router(AppState::new(session), &settings)
}

fn upload_request(file_name: &str, contents: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
         Content-Type: text/csv\r\n\r\n\
         {contents}\r\n\
         --{BOUNDARY}--\r\n"
    );
    Request::builder()
        .method("POST")
        .uri("/api/datasets")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn with_method(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

const MEMBERS: &str = "MEMBER,NAME,EMAIL\n1,Ann,ann@x.org\n2,Bob,bob@x.org\n3,Cid,cid@x.org";

#[tokio::test]
async fn upload_then_page_through_rows() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);

    let (status, body) = send(&app, upload_request("m.csv", MEMBERS)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["replaced"], json!(false));
    assert_eq!(body["notices"][0]["body"], json!("File has been uploaded."));

    let (_, body) = send(&app, get("/api/datasets")).await;
    assert_eq!(body["data"]["active"], json!("m.csv"));

    let (status, body) = send(&app, get("/api/rows?sort=NAME-DESC&page=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_pages"], json!(2));
    assert_eq!(body["data"]["rows"][0]["record"]["NAME"], json!("Ann"));
    assert_eq!(body["data"]["rows"][0]["row"], json!(0));

    let (status, body) = send(&app, get("/api/rows?sort=NAME-SIDEWAYS")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], json!("error"));
}

#[tokio::test]
async fn bad_upload_reports_failure() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);

    let (status, body) = send(&app, upload_request("m.xlsx", "not a workbook")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["notices"][0]["body"], json!("Failed to process the file."));
}

#[tokio::test]
async fn edits_and_deletes_need_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    send(&app, upload_request("m.csv", MEMBERS)).await;

    let edit = json!({ "record": { "NAME": "Bobby" }, "confirmed": false });
    let (_, body) = send(&app, with_method("PUT", "/api/rows/1", Some(edit))).await;
    assert_eq!(body["data"]["applied"], json!(false));

    let edit = json!({ "record": { "NAME": "Bobby" }, "confirmed": true });
    let (_, body) = send(&app, with_method("PUT", "/api/rows/1", Some(edit))).await;
    assert_eq!(body["data"]["applied"], json!(true));

    let (_, body) = send(&app, get("/api/rows?filter=bobby")).await;
    assert_eq!(body["data"]["total_matches"], json!(1));

    let edit = json!({ "record": { "NAME": "Robert", "NICKNAME": "Rob" }, "confirmed": true });
    let (status, body) = send(&app, with_method("PUT", "/api/rows/1", Some(edit))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["applied"], json!(true));
    let (_, body) = send(&app, get("/api/rows?filter=robert")).await;
    assert_eq!(body["data"]["rows"][0]["record"].get("NICKNAME"), None);

    let (_, body) = send(&app, with_method("DELETE", "/api/rows/0?confirmed=true", None)).await;
    assert_eq!(body["data"]["removed"], json!(1));

    let (status, _) = send(&app, with_method("DELETE", "/api/rows/9?confirmed=true", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn export_downloads_named_attachment() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    send(&app, upload_request("m.csv", MEMBERS)).await;

    let response = app.clone().oneshot(get("/api/datasets/m.csv/export")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"m.csv\""
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.starts_with(b"MEMBER,NAME,EMAIL\n1,Ann,"));

    let (status, _) = send(&app, get("/api/datasets/missing.csv/export")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_dataset_clears_the_active_pointer() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    send(&app, upload_request("m.csv", MEMBERS)).await;

    let (_, body) = send(&app, with_method("DELETE", "/api/datasets/m.csv", None)).await;
    assert_eq!(body["data"]["applied"], json!(false));

    let (_, body) = send(&app, with_method("DELETE", "/api/datasets/m.csv?confirmed=true", None)).await;
    assert_eq!(body["data"]["applied"], json!(true));

    let (_, body) = send(&app, get("/api/datasets")).await;
    assert_eq!(body["data"]["active"], Value::Null);
    assert_eq!(body["data"]["datasets"], json!([]));
}

#[tokio::test]
async fn mail_draft_for_a_row() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    send(&app, upload_request("m.csv", MEMBERS)).await;

    let (_, body) = send(&app, get("/api/rows/2/mail")).await;
    assert_eq!(body["data"]["to"], json!("cid@x.org"));
    assert_eq!(body["data"]["member"], json!("3"));

    let mut draft = body["data"].clone();
    draft["subject"] = json!("Renewal");
    let (_, body) = send(&app, with_method("POST", "/api/mail", Some(draft))).await;
    assert!(body["data"].as_str().unwrap().contains("Subject: Renewal"));
    assert_eq!(body["notices"][0]["title"], json!("Info"));
}
