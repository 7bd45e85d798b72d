use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A bad policy must fail loud, not silently match nothing.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("kubernetes api error: {0}")]
    Api(#[from] kube::Error),

    /// Normalized "not found" / "gone" outcome. Expected during prune and
    /// discovery of heterogeneous clusters, never a failure by itself.
    #[error("object not found")]
    NotFound,

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("object store error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Per-item failures of a deletion loop, collected so one stuck object
    /// does not block deletion of unrelated objects.
    #[error("{}", display_aggregate(.0))]
    Aggregate(Vec<Error>),
}

impl Error {
    pub fn bad_regex(pattern: &str, e: regex::Error) -> Self {
        Error::Config(format!("invalid regex {pattern:?}: {e}"))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}

fn display_aggregate(errors: &[Error]) -> String {
    let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    format!("{} errors: {}", errors.len(), msgs.join("; "))
}
