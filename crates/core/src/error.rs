use thiserror::Error;

use crate::config::ConfigValidationError;

#[derive(Error, Debug)]
pub enum Error {
  #[error("Validation: {0}")]
  Validation(String),

  #[error("Config: {0}")]
  Config(#[from] ConfigValidationError),

  #[error("Config parse: {0}")]
  ConfigParse(#[from] toml::de::Error),

  #[error("Serialization: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("IO: {0}")]
  Io(#[from] std::io::Error),
}

impl Error {
  pub fn validation(msg: impl Into<String>) -> Self {
    Self::Validation(msg.into())
  }
}

pub type Result<T> = std::result::Result<T, Error>;
