use serde::Serialize;

#[derive(Debug, Serialize)]
struct AssignmentPayload<'a> {
    #[serde(rename = "taskID")]
    task_id: &'a str,
    #[serde(rename = "apiURL")]
    api_url: &'a str,
}

/// Outcome of a single runner-assignment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    /// 200 or 409 — the runner holds (or already held) this task.
    Assigned,
    /// Any other response or transport failure; caller requeues with backoff.
    Retry,
}

/// `POST http://{service_fqdn}:8888/task` with the minted bearer token.
/// A single attempt per reconcile; the caller owns retry/backoff policy.
pub async fn assign_runner(
    http: &reqwest::Client,
    service_fqdn: &str,
    token: &str,
    task_id: &str,
    internal_api_url: &str,
) -> AssignOutcome {
    post_assignment(http, &format!("http://{service_fqdn}:8888/task"), token, task_id, internal_api_url).await
}

async fn post_assignment(
    http: &reqwest::Client,
    url: &str,
    token: &str,
    task_id: &str,
    internal_api_url: &str,
) -> AssignOutcome {
    let result = http
        .post(url)
        .bearer_auth(token)
        .timeout(std::time::Duration::from_secs(10))
        .json(&AssignmentPayload {
            task_id,
            api_url: internal_api_url,
        })
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() || response.status().as_u16() == 409 => AssignOutcome::Assigned,
        Ok(response) => {
            tracing::warn!(status = %response.status(), %url, "runner assignment rejected");
            AssignOutcome::Retry
        }
        Err(err) => {
            tracing::warn!(error = %err, %url, "runner assignment unreachable");
            AssignOutcome::Retry
        }
    }
}

#[cfg(test)]
fn test_url(server: &wiremock::MockServer) -> String {
    format!("{}/task", server.uri())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn a_200_response_is_treated_as_assigned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/task"))
            .and(header("authorization", "Bearer tok-123"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let outcome = post_assignment(
            &reqwest::Client::new(),
            &test_url(&server),
            "tok-123",
            "task-1",
            "http://ingress.internal",
        )
        .await;
        assert_eq!(outcome, AssignOutcome::Assigned);
    }

    #[tokio::test]
    async fn a_409_response_is_treated_as_already_assigned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/task"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let outcome = post_assignment(&reqwest::Client::new(), &test_url(&server), "tok", "task-1", "http://x").await;
        assert_eq!(outcome, AssignOutcome::Assigned);
    }

    #[tokio::test]
    async fn a_500_response_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/task"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let outcome = post_assignment(&reqwest::Client::new(), &test_url(&server), "tok", "task-1", "http://x").await;
        assert_eq!(outcome, AssignOutcome::Retry);
    }

    #[tokio::test]
    async fn an_unreachable_host_is_retried() {
        // Port 8888 is appended by `assign_runner` itself; nothing listens
        // there in the test sandbox, so the connection is refused.
        let outcome = assign_runner(&reqwest::Client::new(), "127.0.0.1", "tok", "task-1", "http://x").await;
        assert_eq!(outcome, AssignOutcome::Retry);
    }
}
