use logrelay_types::DeliveryErr;
use thiserror::Error;

#[derive(Error, Debug)]
/// Errors of the Elasticsearch sink.
pub enum ElasticErr {
    #[error("Configuration Error: {0}")]
    Config(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Elasticsearch answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to format index name: {0}")]
    IndexName(#[from] time::error::Format),
}

impl ElasticErr {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<ElasticErr> for DeliveryErr {
    fn from(err: ElasticErr) -> Self {
        if err.is_transient() {
            DeliveryErr::Unavailable(err.to_string())
        } else {
            match err {
                ElasticErr::Status { .. } => DeliveryErr::Rejected(err.to_string()),
                err => DeliveryErr::sink(err),
            }
        }
    }
}
