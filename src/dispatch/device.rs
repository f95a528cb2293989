use serde::Serialize;
use std::time::Duration;

use crate::error::DeviceError;

/// A connected output device. Connection lifecycle is owned elsewhere.
pub trait LightDevice: Send + Sync {
    fn name(&self) -> &str;

    /// Pulse brightness to `level` over `duration`.
    fn pulse_brightness(&self, level: u8, duration: Duration) -> Result<(), DeviceError>;
}

/// Logs every command instead of driving hardware.
pub struct LogDevice;

impl LightDevice for LogDevice {
    fn name(&self) -> &str {
        "log"
    }

    fn pulse_brightness(&self, level: u8, duration: Duration) -> Result<(), DeviceError> {
        log::info!("pulse -> {:3} over {}ms", level, duration.as_millis());
        Ok(())
    }
}

#[derive(Serialize)]
struct PulseCommand {
    command: &'static str,
    brightness: u8,
    duration_ms: u64,
}

/// Posts pulse commands as JSON to a light controller's HTTP endpoint.
pub struct HttpLightDevice {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpLightDevice {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DeviceError> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl LightDevice for HttpLightDevice {
    fn name(&self) -> &str {
        &self.url
    }

    fn pulse_brightness(&self, level: u8, duration: Duration) -> Result<(), DeviceError> {
        let command = PulseCommand {
            command: "pulse",
            brightness: level,
            duration_ms: duration.as_millis() as u64,
        };
        let response = self.client.post(&self.url).json(&command).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeviceError::Status(status.as_u16()));
        }
        Ok(())
    }
}
