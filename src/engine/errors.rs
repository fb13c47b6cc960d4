use std::time::Duration;

use crate::engine::config::BridgeConfigError;
use crate::engine::surface::SurfaceId;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Engine adapter '{0}' is not available")]
    AdapterUnavailable(String),

    #[error("Engine instance could not be created: {0}")]
    InstanceCreation(#[source] anyhow::Error),

    #[error("Engine adapter rejected resize: {0}")]
    ResizeFailed(#[source] anyhow::Error),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid surface dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Surface limit exceeded")]
    SurfaceLimitExceeded,

    #[error("Surface not found: {0}")]
    SurfaceNotFound(SurfaceId),

    #[error("Pump thread is not running")]
    PumpStopped,

    #[error("Pump thread did not reply within {0:?}")]
    Timeout(Duration),

    #[error("Pump thread could not be spawned: {0}")]
    PumpSpawn(#[source] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] BridgeConfigError),
}
