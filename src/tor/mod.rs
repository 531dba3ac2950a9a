mod control;

pub(crate) use control::TorController;

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::TorSection;
use crate::metrics::consts::TOR_IDENTITY_RENEWALS;

/// Coordinates identity rotation between concurrent workers.
///
/// A rotation opens a cooldown window. Workers asking to rotate while a
/// renewal is in flight or inside the window are ignored, and
/// `wait_if_cooldown` parks callers until the new circuits are up.
#[derive(Debug)]
pub(crate) struct TorRotator {
    controller: TorController,
    cooldown: Duration,
    request_timeout: Duration,
    rotation: Mutex<()>,
    cooldown_until: Mutex<Option<Instant>>,
}

impl TorRotator {
    pub(crate) fn new(section: &TorSection) -> Self {
        Self {
            controller: TorController {
                address: format!("{}:{}", section.control_host, section.control_port),
                auth: section.auth.clone(),
            },
            cooldown: Duration::from_millis(section.cooldown_ms),
            request_timeout: section.request_timeout(),
            rotation: Mutex::new(()),
            cooldown_until: Mutex::new(None),
        }
    }

    /// Returns whether this call performed the rotation.
    pub(crate) async fn rotate(&self) -> bool {
        let Ok(_rotation) = self.rotation.try_lock() else {
            tracing::debug!("Tor rotation already in progress, skipping.");
            return false;
        };
        if self.cooldown_until.lock().await.is_some_and(|until| until > Instant::now()) {
            tracing::debug!("Tor identity renewed recently, skipping.");
            return false;
        }

        tracing::info!("Requesting new Tor identity.");
        match tokio::time::timeout(self.request_timeout, self.controller.renew_identity()).await {
            Ok(Ok(())) => {
                metrics::counter!(TOR_IDENTITY_RENEWALS).increment(1);
                *self.cooldown_until.lock().await = Some(Instant::now() + self.cooldown);
                true
            }
            Ok(Err(error)) => {
                tracing::warn!(?error, "Failed to renew Tor identity.");
                false
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "Tor control port did not answer in time."
                );
                false
            }
        }
    }

    /// Never waits on an in-flight renewal, only on an opened window.
    pub(crate) async fn wait_if_cooldown(&self) {
        let until = *self.cooldown_until.lock().await;
        if let Some(until) = until {
            tokio::time::sleep_until(until).await;
        }
    }
}
