use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize)]
pub struct CallbackPayload<'a> {
    #[serde(rename = "taskID")]
    pub task_id: &'a str,
    pub event: &'a str,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<CallbackDetails>,
}

#[derive(Debug, Serialize)]
pub struct CallbackDetails {
    #[serde(skip_serializing_if = "Option::is_none", rename = "pr_url")]
    pub pr_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Mirrors `shepherd-ingress`'s signing+send logic: duplicated rather
/// than shared because the watcher and ingress are independent binaries with
/// no common dependency between them besides `shepherd-types`.
pub async fn send_signed_callback(
    http: &reqwest::Client,
    callback_url: &str,
    shared_secret: &str,
    payload: &CallbackPayload<'_>,
) -> bool {
    let body = match serde_json::to_vec(payload) {
        Ok(body) => body,
        Err(err) => {
            tracing::error!(error = %err, "failed to serialise callback payload");
            return false;
        }
    };
    let signature = sign(shared_secret, &body);

    let result = http
        .post(callback_url)
        .header("Content-Type", "application/json")
        .header("X-Shepherd-Signature", format!("sha256={signature}"))
        .timeout(std::time::Duration::from_secs(10))
        .body(body)
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => true,
        Ok(response) => {
            tracing::warn!(status = %response.status(), %callback_url, "adapter callback rejected");
            false
        }
        Err(err) => {
            tracing::warn!(error = %err, %callback_url, "adapter callback unreachable");
            false
        }
    }
}

fn sign(shared_secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(shared_secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_and_keyed() {
        let body = b"{\"taskID\":\"task-abc\"}";
        let sig1 = sign("secret-a", body);
        let sig2 = sign("secret-a", body);
        let sig3 = sign("secret-b", body);
        assert_eq!(sig1, sig2);
        assert_ne!(sig1, sig3);
    }
}
