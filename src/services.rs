use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::ServiceError;

/// Restarts the OS services the controller depends on
#[async_trait]
pub trait ServiceManager: Send + Sync {
    async fn restart(&self, unit: &str) -> Result<(), ServiceError>;
}

/// Restart each unit in order, stopping at the first failure
pub async fn restart_all(
    manager: &dyn ServiceManager,
    units: &[String],
) -> Result<(), ServiceError> {
    for unit in units {
        manager.restart(unit).await?;
    }
    Ok(())
}

/// [`ServiceManager`] that shells out to `systemctl`
pub struct SystemctlServiceManager {
    use_sudo: bool,
    timeout: Duration,
}

impl SystemctlServiceManager {
    pub fn new(use_sudo: bool, timeout: Duration) -> Self {
        Self { use_sudo, timeout }
    }

    fn command(&self, unit: &str) -> Command {
        let mut cmd = if self.use_sudo {
            let mut cmd = Command::new("sudo");
            cmd.args(["-n", "systemctl"]);
            cmd
        } else {
            Command::new("systemctl")
        };
        cmd.args(["restart", unit]).kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ServiceManager for SystemctlServiceManager {
    async fn restart(&self, unit: &str) -> Result<(), ServiceError> {
        info!("Restarting {}", unit);

        let output = tokio::time::timeout(self.timeout, self.command(unit).output())
            .await
            .map_err(|_| ServiceError::Timeout {
                unit: unit.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|source| ServiceError::Spawn {
                unit: unit.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ServiceError::ExitStatus {
                unit: unit.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!("Restarted {}", unit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingManager {
        fail_on: Option<&'static str>,
        restarted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ServiceManager for RecordingManager {
        async fn restart(&self, unit: &str) -> Result<(), ServiceError> {
            self.restarted.lock().unwrap().push(unit.to_string());
            if self.fail_on == Some(unit) {
                return Err(ServiceError::ExitStatus {
                    unit: unit.to_string(),
                    code: Some(1),
                    stderr: "failed".to_string(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_restart_all_stops_at_first_failure() {
        let manager = RecordingManager {
            fail_on: Some("b.service"),
            restarted: Mutex::new(Vec::new()),
        };
        let units = vec![
            "a.service".to_string(),
            "b.service".to_string(),
            "c.service".to_string(),
        ];

        let result = restart_all(&manager, &units).await;

        assert!(matches!(result, Err(ServiceError::ExitStatus { .. })));
        assert_eq!(*manager.restarted.lock().unwrap(), vec!["a.service", "b.service"]);
    }

    #[test]
    fn test_command_uses_sudo_non_interactively() {
        let manager = SystemctlServiceManager::new(true, Duration::from_secs(1));
        let cmd = manager.command("bluetooth.service");
        let std_cmd = cmd.as_std();

        assert_eq!(std_cmd.get_program(), "sudo");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, ["-n", "systemctl", "restart", "bluetooth.service"]);
    }

    #[test]
    fn test_command_without_sudo() {
        let manager = SystemctlServiceManager::new(false, Duration::from_secs(1));
        let cmd = manager.command("bt-speaker.service");

        assert_eq!(cmd.as_std().get_program(), "systemctl");
    }
}
