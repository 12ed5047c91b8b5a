//! In-process stand-in for the RF switch, for running without hardware.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::Switch;

/// Records the last port set and always succeeds.
pub struct MockSwitch {
    port: Mutex<String>,
}

impl MockSwitch {
    pub fn new() -> Self {
        Self {
            port: Mutex::new("unknown".to_string()),
        }
    }
}

impl Default for MockSwitch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Switch for MockSwitch {
    async fn set_port(&self, name: &str) -> Result<()> {
        *self.port.lock().await = name.to_string();
        Ok(())
    }

    async fn current(&self) -> String {
        self.port.lock().await.clone()
    }
}
