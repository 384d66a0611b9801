//! HTTP API tests against a server bound to an ephemeral port.

mod common;

use std::sync::Arc;

use common::{pipeline_with, test_config, ScriptedModel, PHOTOSYNTHESIS};
use docqa::server;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use tempfile::TempDir;

async fn start_server(tmp: &TempDir) -> String {
    let pipeline = Arc::new(pipeline_with(
        test_config(tmp),
        Arc::new(ScriptedModel::new("photosynthesis")),
    ));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        server::serve(listener, pipeline).await.unwrap();
    });
    format!("http://{}", addr)
}

fn file_form(name: &str, bytes: &[u8]) -> Form {
    Form::new().part("file", Part::bytes(bytes.to_vec()).file_name(name.to_string()))
}

#[tokio::test]
async fn test_health() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;

    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_session_lifecycle() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/sessions", base))
        .multipart(file_form("biology.txt", PHOTOSYNTHESIS.as_bytes()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created: Value = resp.json().await.unwrap();
    let id = created["session_id"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{}/sessions/{}/query", base, id))
        .json(&json!({ "question": "What is photosynthesis?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let answer: Value = resp.json().await.unwrap();
    assert_eq!(answer["session_id"], id.as_str());
    assert!(answer["answer"]
        .as_str()
        .unwrap()
        .to_lowercase()
        .contains("photosynthesis"));

    let history: Value = client
        .get(format!("{}/sessions/{}/history", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let turns = history["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0]["role"], "user");
    assert_eq!(turns[0]["text"], "What is photosynthesis?");
    assert_eq!(turns[1]["role"], "assistant");

    let resp = client
        .delete(format!("{}/sessions/{}", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .post(format!("{}/sessions/{}/query", base, id))
        .json(&json!({ "question": "What is photosynthesis?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"]["code"], "session_not_found");
}

#[tokio::test]
async fn test_upload_form_with_default_question_and_follow_up() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/upload", base))
        .multipart(file_form("biology.txt", PHOTOSYNTHESIS.as_bytes()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let first: Value = resp.json().await.unwrap();
    let id = first["session_id"].as_str().unwrap().to_string();
    assert!(first["answer"].is_string());

    let form = Form::new()
        .text("session_id", id.clone())
        .text("query", "What are its products?");
    let resp = client
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let second: Value = resp.json().await.unwrap();
    assert_eq!(second["session_id"], id.as_str());
    assert!(second["answer"].as_str().unwrap().contains("glucose"));
}

#[tokio::test]
async fn test_upload_accepts_trailing_slash() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;

    let form = file_form("biology.txt", PHOTOSYNTHESIS.as_bytes())
        .text("query", "What is chlorophyll?");
    let resp = reqwest::Client::new()
        .post(format!("{}/upload/", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["session_id"].is_string());
    assert!(body["answer"].as_str().unwrap().contains("Chlorophyll"));
}

#[tokio::test]
async fn test_error_statuses() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/sessions", base))
        .multipart(file_form("table.csv", b"a,b\n"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 415);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"]["code"], "unsupported_format");

    let resp = client
        .post(format!("{}/sessions", base))
        .multipart(file_form("blank.txt", b"   \n\n  "))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);

    let resp = client
        .post(format!("{}/sessions", base))
        .multipart(Form::new().text("query", "hello"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .get(format!("{}/sessions/unknown/history", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
