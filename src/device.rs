//! Push-notification device identities attached to guardian sessions.
//!
//! A missing device token never blocks a login: the session is issued
//! without a device and only notification delivery suffers.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{DeviceClaim, DevicePlatform, GuardianId, RegisteredDevice};

const MAX_DEVICE_NAME_CHARS: usize = 100;

pub fn register(
    guardian_id: GuardianId,
    claim: &DeviceClaim,
    now: DateTime<Utc>,
) -> Option<RegisteredDevice> {
    let device_token = claim.device_token.trim();
    if device_token.is_empty() {
        log::warn!(
            "Guardian {} logged in without a push token, notifications disabled",
            guardian_id
        );
        return None;
    }

    let device_name = claim
        .device_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| name.chars().take(MAX_DEVICE_NAME_CHARS).collect());

    Some(RegisteredDevice {
        guardian_id,
        device_token: device_token.to_string(),
        device_type: claim.device_type,
        device_name,
        registered_at: now,
    })
}

/// Where the client gets its push token from (FCM, APNs, ...).
#[async_trait]
pub trait PushTokenSource: Send + Sync {
    async fn push_token(&self) -> anyhow::Result<String>;
}

/// Builds the device claim for a login, giving the push token source at
/// most `wait` to answer. On timeout or failure the claim carries an empty
/// token and the login goes ahead.
pub async fn collect_claim(
    source: &dyn PushTokenSource,
    device_type: DevicePlatform,
    device_name: Option<String>,
    wait: Duration,
) -> DeviceClaim {
    let device_token = match tokio::time::timeout(wait, source.push_token()).await {
        Ok(Ok(token)) => token,
        Ok(Err(err)) => {
            log::warn!("Could not fetch push token: {}", err);
            String::new()
        }
        Err(_) => {
            log::warn!("Push token not available after {:?}, continuing without it", wait);
            String::new()
        }
    };

    DeviceClaim {
        device_token,
        device_type,
        device_name,
    }
}
