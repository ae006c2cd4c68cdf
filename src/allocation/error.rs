use thiserror::Error;

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("invalid allocation endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("allocation API token is empty")]
    MissingToken,
    #[error("allocation request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("allocation rejected ({status}): {body}")]
    Status { status: u16, body: String },
}
