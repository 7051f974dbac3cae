use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::error::BridgeError),
}

pub type Result<T> = std::result::Result<T, MetadataError>;
