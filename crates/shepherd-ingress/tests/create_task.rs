mod common;

use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn healthz_reports_ok_on_both_surfaces() {
    let app = TestApp::spawn().await;

    let public = app.client.get(format!("{}/healthz", app.public_url)).send().await.unwrap();
    assert_eq!(public.status(), 200);

    let internal = app.client.get(format!("{}/healthz", app.internal_url)).send().await.unwrap();
    assert_eq!(internal.status(), 200);
}

#[tokio::test]
async fn create_task_rejects_empty_repo_url() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(format!("{}/tasks", app.public_url))
        .json(&json!({
            "repo": { "url": "" },
            "task": { "description": "fix the bug" },
            "callbackURL": "https://adapter.example/callback",
            "runner": { "sandboxTemplateName": "default" },
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn create_task_rejects_empty_description() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(format!("{}/tasks", app.public_url))
        .json(&json!({
            "repo": { "url": "https://github.com/acme/widgets" },
            "task": { "description": "" },
            "callbackURL": "https://adapter.example/callback",
            "runner": { "sandboxTemplateName": "default" },
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn create_task_rejects_missing_callback_url() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(format!("{}/tasks", app.public_url))
        .json(&json!({
            "repo": { "url": "https://github.com/acme/widgets" },
            "task": { "description": "fix the bug" },
            "callbackURL": "",
            "runner": { "sandboxTemplateName": "default" },
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn create_task_rejects_invalid_runner_timeout() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(format!("{}/tasks", app.public_url))
        .json(&json!({
            "repo": { "url": "https://github.com/acme/widgets" },
            "task": { "description": "fix the bug" },
            "callbackURL": "https://adapter.example/callback",
            "runner": { "sandboxTemplateName": "default", "timeout": "not-a-duration" },
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn create_task_rejects_oversize_context() {
    let app = TestApp::spawn().await;

    // Incompressible ASCII barely shrinks under gzip, so the base64 form
    // stays close to the input size and crosses MAX_ENCODED_CONTEXT_BYTES.
    let mut seed: u64 = 0x243f6a8885a308d3;
    let huge_context: String = (0..2_000_000)
        .map(|_| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            (b'a' + (seed % 26) as u8) as char
        })
        .collect();

    let response = app
        .client
        .post(format!("{}/tasks", app.public_url))
        .json(&json!({
            "repo": { "url": "https://github.com/acme/widgets" },
            "task": { "description": "fix the bug", "context": huge_context },
            "callbackURL": "https://adapter.example/callback",
            "runner": { "sandboxTemplateName": "default" },
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 413);
}
