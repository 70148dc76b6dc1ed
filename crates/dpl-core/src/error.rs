use thiserror::Error;

/// Everything that can halt a deployment run. None of these are retried by the engine.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("network `{network}` has no account for role `{role}`")]
    UnknownRole { network: String, role: String },

    #[error("network `{network}` defines no credentials")]
    NoCredentials { network: String },

    #[error("step `{step}` references `{reference}`, which no earlier step deploys")]
    UnresolvedReference { step: String, reference: String },

    #[error("steps form a dependency cycle: {}", .steps.join(" -> "))]
    CyclicDependency { steps: Vec<String> },

    #[error("step name `{0}` is declared more than once")]
    DuplicateStep(String),

    #[error("artifact store failure for {network}/{artifact}: {source:#}")]
    StorePersistence {
        network: String,
        artifact: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("cannot compile `{contract}`: {cause}")]
    Compile { contract: String, cause: String },

    #[error("deployment of step `{step}` failed: {cause}")]
    DeploymentFailed { step: String, cause: String },
}

impl DeployError {
    pub fn store(network: &str, artifact: &str, source: anyhow::Error) -> Self {
        DeployError::StorePersistence { network: network.to_string(), artifact: artifact.to_string(), source }
    }

    /// Step named by the error itself, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            DeployError::UnresolvedReference { step, .. } | DeployError::DeploymentFailed { step, .. } => Some(step),
            DeployError::DuplicateStep(step) => Some(step),
            _ => None,
        }
    }
}
