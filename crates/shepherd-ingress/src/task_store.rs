use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use shepherd_types::TaskRecord;

use crate::error::AppError;

pub fn api(client: &Client, namespace: &str) -> Api<TaskRecord> {
    Api::namespaced(client.clone(), namespace)
}

pub async fn get(client: &Client, namespace: &str, name: &str) -> Result<TaskRecord, AppError> {
    api(client, namespace)
        .get_opt(name)
        .await?
        .ok_or_else(|| AppError::not_found(format!("task {name} not found")))
}

pub async fn list(client: &Client, namespace: &str, list_params: kube::api::ListParams) -> Result<Vec<TaskRecord>, AppError> {
    let list = api(client, namespace).list(&list_params).await?;
    Ok(list.items)
}

/// Applies `mutate` to the current status and patches it, retrying on
/// optimistic-concurrency conflicts: a
/// losing writer refetches and re-applies its intended change against the
/// latest resource version.
pub async fn patch_status<F>(
    client: &Client,
    namespace: &str,
    name: &str,
    mut mutate: F,
) -> Result<TaskRecord, AppError>
where
    F: FnMut(&mut TaskRecord),
{
    let api = api(client, namespace);
    loop {
        let mut current = get(client, namespace, name).await?;
        mutate(&mut current);
        let patch = json!({ "status": current.status });
        match api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(updated) => return Ok(updated),
            Err(kube::Error::Api(err)) if err.code == 409 => continue,
            Err(err) => return Err(AppError::from(err)),
        }
    }
}
