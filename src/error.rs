use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Error, Debug)]
pub enum SimError {
  // Experiment configuration, fatal for the experiment only
  #[error("configuration error for network {network}: {parameter}: {reason}")]
  Config {
    network: String,
    parameter: String,
    reason: String,
  },

  // Tensor geometry, fatal for the layer
  #[error("geometry error in network {network}, layer {layer}: {reason}")]
  Geometry {
    network: String,
    layer: String,
    reason: String,
  },

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("TOML parse error: {0}")]
  Toml(#[from] toml::de::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("settings error: {0}")]
  Settings(#[from] config::ConfigError),
}

impl SimError {
  pub fn config(network: impl Into<String>, parameter: impl Into<String>, reason: impl Into<String>) -> Self {
    SimError::Config {
      network: network.into(),
      parameter: parameter.into(),
      reason: reason.into(),
    }
  }

  pub fn geometry(network: impl Into<String>, layer: impl Into<String>, reason: impl Into<String>) -> Self {
    SimError::Geometry {
      network: network.into(),
      layer: layer.into(),
      reason: reason.into(),
    }
  }
}
