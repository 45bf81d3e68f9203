use serde::{Deserialize, Serialize};

fn default_channel() -> String {
    wbak_config::DEFAULT_CHANNEL.to_string()
}

/// Runtime knobs. Every field falls back to its compiled-in default when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreSettings {
    /// Delay before an emptied parent stage is deleted automatically. Zero is allowed.
    pub settle_delay_ms: u64,
    pub device_poll_secs: u64,
    pub root_poll_secs: u64,
    pub resource_timeout_secs: u64,
    pub channel: String,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: wbak_config::DEFAULT_SETTLE_DELAY_MS,
            device_poll_secs: wbak_config::DEFAULT_DEVICE_POLL_SECS,
            root_poll_secs: wbak_config::DEFAULT_ROOT_POLL_SECS,
            resource_timeout_secs: wbak_config::DEFAULT_RESOURCE_TIMEOUT_SECS,
            channel: default_channel(),
        }
    }
}

impl CoreSettings {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let settings: CoreSettings = serde_json::from_str(json)?;
        Ok(settings)
    }

    pub fn settle_delay_ms(&self) -> u64 {
        wbak_config::clamp_settle_delay_ms(self.settle_delay_ms)
    }
}

/// Properties of the attached device, filled from `get_device_properties`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(rename = "ro.product.manufacturer", default)]
    pub manufacturer: String,
    #[serde(rename = "ro.product.model", default)]
    pub model: String,
    #[serde(rename = "net.hostname", default)]
    pub hostname: String,
    #[serde(skip)]
    pub serial: String,
}

/// What the device pollers and probes have reported so far.
#[derive(Debug, Clone, Default)]
pub struct DeviceStatus {
    pub serial: String,
    pub info: Option<DeviceInfo>,
    pub rooted: Option<bool>,
    pub insecure_installed: Option<bool>,
    pub(crate) remind_insecure: bool,
}

/// Values offered by `get_users` / `get_imei`; the operator picks one when there are several.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialCandidates {
    pub users: Vec<String>,
    pub imeis: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

/// Human-facing message for the operator's output pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: Severity,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_settings_fall_back_to_defaults() {
        let s = CoreSettings::from_json_str(r#"{"settle_delay_ms": 0}"#).unwrap();
        assert_eq!(s.settle_delay_ms(), 0);
        assert_eq!(s.channel, "android");
        assert_eq!(s.resource_timeout_secs, 1_800);
    }

    #[test]
    fn oversized_settle_delay_is_clamped() {
        let s = CoreSettings {
            settle_delay_ms: u64::MAX,
            ..Default::default()
        };
        assert_eq!(s.settle_delay_ms(), wbak_config::MAX_SETTLE_DELAY_MS);
    }

    #[test]
    fn device_properties_use_android_keys() {
        let info: DeviceInfo = serde_json::from_value(serde_json::json!({
            "ro.product.manufacturer": "Xiaomi",
            "ro.product.model": "MI 6",
            "net.hostname": "android-1"
        }))
        .unwrap();
        assert_eq!(info.model, "MI 6");
        assert!(info.serial.is_empty());
    }
}
