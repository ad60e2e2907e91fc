use serde::Deserialize;

use crate::error::{BootstrapError, Result};
use crate::tags::TagSpec;
use crate::volume::VolumeSpec;

/// Instance user data, keyed under a top-level `bootstrap` object.
#[derive(Debug, Deserialize)]
pub struct UserData {
    pub bootstrap: InstructionPayload,
}

/// The declarative bootstrap instructions for this instance. Read once
/// at process start and immutable thereafter.
#[derive(Debug, Default, Deserialize)]
pub struct InstructionPayload {
    #[serde(default)]
    pub bucket_name: Option<String>,
    #[serde(default)]
    pub bundle_name: Option<String>,
    #[serde(default)]
    pub app_vol: Option<VolumeSpec>,
    #[serde(default)]
    pub metadata: Option<TagSpec>,
    #[serde(default)]
    pub services: Option<Vec<String>>,
}

impl InstructionPayload {
    pub fn parse(user_data: &str) -> Result<Self> {
        let data: UserData = serde_json::from_str(user_data)
            .map_err(|e| BootstrapError::config(format!("invalid user data JSON: {e}")))?;
        Ok(data.bootstrap)
    }

    /// Both `bucket_name` and `bundle_name` are required for any
    /// bundle-based bootstrap; absence of either is a hard stop before
    /// any network call.
    pub fn bundle_source(&self) -> Result<(&str, &str)> {
        match (self.bucket_name.as_deref(), self.bundle_name.as_deref()) {
            (Some(bucket), Some(bundle)) => Ok((bucket, bundle)),
            (None, _) => Err(BootstrapError::config(
                "user data is missing bootstrap.bucket_name",
            )),
            (_, None) => Err(BootstrapError::config(
                "user data is missing bootstrap.bundle_name",
            )),
        }
    }
}
