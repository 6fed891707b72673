use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client, ResourceExt};
use shepherd_types::naming::generate_token;
use shepherd_types::task_record::labels;
use shepherd_types::TaskRecord;

use crate::claim::owner_reference;
use crate::error::ReconcileError;

/// Mints a fresh bearer token for a newly assigned runner, replacing
/// any previously issued Secret so a stale, undelivered token cannot
/// authenticate after a controller crash and retry.
pub async fn mint_and_store_token(client: &Client, task: &TaskRecord) -> Result<String, ReconcileError> {
    let namespace = task.namespace().unwrap_or_default();
    let secrets: Api<Secret> = Api::namespaced(client.clone(), &namespace);
    let secret_name = format!("{}-token", task.name_any());

    if secrets.get_opt(&secret_name).await?.is_some() {
        let _ = secrets.delete(&secret_name, &DeleteParams::default()).await;
    }

    let material = generate_token();
    let mut labels_map = BTreeMap::new();
    labels_map.insert(labels::TASK.to_string(), task.name_any());
    labels_map.insert(labels::TYPE.to_string(), labels::TASK_TOKEN.to_string());

    let mut data = BTreeMap::new();
    data.insert("token-hash".to_string(), ByteString(material.hash_hex.into_bytes()));

    let secret = Secret {
        metadata: kube::api::ObjectMeta {
            name: Some(secret_name),
            namespace: Some(namespace),
            labels: Some(labels_map),
            owner_references: Some(vec![owner_reference(task)]),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    };

    secrets.create(&PostParams::default(), &secret).await?;
    Ok(material.plaintext)
}
