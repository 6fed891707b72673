mod common;

use common::TestApp;

#[tokio::test]
async fn task_data_rejects_missing_authorization_header() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(format!("{}/tasks/some-task/data", app.internal_url))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn task_token_rejects_missing_authorization_header() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(format!("{}/tasks/some-task/token", app.internal_url))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn task_data_rejects_malformed_authorization_header() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(format!("{}/tasks/some-task/data", app.internal_url))
        .header("Authorization", "not-a-bearer-token")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
}
