use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::{config::VolumeConfig, error::VolumeError};

/// Receiver output volume, as a percentage
#[async_trait]
pub trait VolumeController: Send + Sync {
    async fn get_vol_pct(&self) -> Result<u8, VolumeError>;
    async fn set_vol_pct(&self, vol_pct: u8) -> Result<(), VolumeError>;
}

/// Validate an untrusted volume percentage from a request body
pub fn checked_vol_pct(value: i64) -> Result<u8, VolumeError> {
    u8::try_from(value)
        .ok()
        .filter(|pct| *pct <= 100)
        .ok_or(VolumeError::OutOfRange(value))
}

/// [`VolumeController`] driving an ALSA simple mixer control through `amixer`.
///
/// `-M` selects the mapped (perceptual) volume scale, which is what a
/// slider in the UI should move along.
pub struct AmixerVolumeController {
    config: VolumeConfig,
    timeout: Duration,
}

impl AmixerVolumeController {
    pub fn new(config: VolumeConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("amixer");
        if let Some(card) = self.config.card {
            cmd.arg("-c").arg(card.to_string());
        }
        cmd.arg("-M").args(args).kill_on_drop(true);
        cmd
    }

    async fn run(&self, args: &[&str]) -> Result<String, VolumeError> {
        let output = tokio::time::timeout(self.timeout, self.command(args).output())
            .await
            .map_err(|_| VolumeError::Timeout(self.timeout))?
            .map_err(VolumeError::Spawn)?;

        if !output.status.success() {
            return Err(VolumeError::ExitStatus {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl VolumeController for AmixerVolumeController {
    async fn get_vol_pct(&self) -> Result<u8, VolumeError> {
        let stdout = self.run(&["get", &self.config.mixer_control]).await?;
        parse_amixer_pct(&stdout).ok_or(VolumeError::Parse)
    }

    async fn set_vol_pct(&self, vol_pct: u8) -> Result<(), VolumeError> {
        let level = format!("{}%", vol_pct.min(100));
        debug!("Setting mixer {} to {}", self.config.mixer_control, level);
        self.run(&["set", &self.config.mixer_control, &level]).await?;
        Ok(())
    }
}

/// Extract the first `[NN%]` field from `amixer get` output
fn parse_amixer_pct(output: &str) -> Option<u8> {
    output.lines().find_map(|line| {
        let start = line.find('[')?;
        let rest = &line[start + 1..];
        let end = rest.find("%]")?;
        rest[..end].trim().parse().ok()
    })
}
