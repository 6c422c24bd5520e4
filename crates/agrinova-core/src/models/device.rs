//! Device binding domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    Web,
    Android,
    Ios,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Web => "WEB",
            Platform::Android => "ANDROID",
            Platform::Ios => "IOS",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "WEB" => Ok(Platform::Web),
            "ANDROID" => Ok(Platform::Android),
            "IOS" => Ok(Platform::Ios),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// Hardware/software description reported by the mobile app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceInfo {
    pub model: String,
    pub os_version: String,
    pub app_version: String,
    pub brand: Option<String>,
    pub build_number: Option<String>,
    pub device_name: Option<String>,
}

impl DeviceInfo {
    /// Placeholder used when a device is auto-bound without a report.
    pub fn unknown() -> Self {
        Self {
            model: "Unknown".into(),
            os_version: "Unknown".into(),
            app_version: "Unknown".into(),
            brand: None,
            build_number: None,
            device_name: None,
        }
    }
}

/// Lifecycle state derived from the binding flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Bound,
    Trusted,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceBinding {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: String,
    /// Immutable once bound; compared exactly on every use.
    pub device_fingerprint: String,
    pub platform: Platform,
    pub device_info: DeviceInfo,
    pub biometric_hash: Option<String>,
    pub is_trusted: bool,
    pub is_authorized: bool,
    pub last_seen_at: DateTime<Utc>,
    pub authorized_by: Option<Uuid>,
    pub authorized_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceBinding {
    /// A binding backs token operations only while authorized and not
    /// revoked.
    pub fn can_issue_tokens(&self) -> bool {
        self.is_authorized && self.revoked_at.is_none()
    }

    pub fn state(&self) -> BindingState {
        if !self.can_issue_tokens() {
            BindingState::Revoked
        } else if self.is_trusted {
            BindingState::Trusted
        } else {
            BindingState::Bound
        }
    }

    pub fn fingerprint_matches(&self, fingerprint: &str) -> bool {
        self.device_fingerprint == fingerprint
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeviceBinding {
    pub user_id: Uuid,
    pub device_id: String,
    pub device_fingerprint: String,
    pub platform: Platform,
    pub device_info: DeviceInfo,
    pub biometric_hash: Option<String>,
    pub is_trusted: bool,
}
