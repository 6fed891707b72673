use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("model error: {0}")]
    Model(#[from] shepherd_types::ModelError),
    #[error("runner unreachable: {0}")]
    Runner(#[from] reqwest::Error),
}
