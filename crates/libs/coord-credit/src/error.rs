use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] coord_core::Error),

    #[error("Serde JSON Error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("no grant with operationId \"{0}\" found for this principal")]
    GrantNotFound(String),

    #[error("cannot revoke grant \"{0}\": balance is already negative (credits already spent)")]
    RevocationRefused(String),
}

pub type Result<T> = core::result::Result<T, Error>;
