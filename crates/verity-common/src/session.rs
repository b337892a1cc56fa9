use crate::mock::MockPolicy;
use serde::{Deserialize, Serialize};

/// Viewport dimensions for a session's page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Optional device emulation applied to a session before its first
/// navigation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEmulation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub touch: bool,
    #[serde(default)]
    pub mobile: bool,
}

/// Configuration for one isolated browsing context.
///
/// Two sessions created from the same handle share nothing: storage, cookies
/// and mock rules are all per-session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceEmulation>,
    /// Per-session override of the harness-wide mock policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_policy: Option<MockPolicy>,
}

impl SessionConfig {
    /// Desktop defaults, matching the common 1280x720 verification viewport.
    pub fn desktop() -> Self {
        Self::default()
    }

    /// Phone-sized viewport with touch emulation.
    pub fn mobile() -> Self {
        Self {
            viewport: Viewport {
                width: 375,
                height: 812,
            },
            device: Some(DeviceEmulation {
                user_agent: None,
                touch: true,
                mobile: true,
            }),
            mock_policy: None,
        }
    }
}
