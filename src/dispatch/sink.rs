use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::device::LightDevice;
use super::Pulse;

/// Forwards pulses to a device at most once per debounce window.
///
/// A pulse is dropped, not queued, when the window has not elapsed or the
/// previous command is still in flight. Commands run on a detached thread
/// so the caller never waits on device I/O; failures are logged and
/// forgotten.
pub struct DebouncedSink {
    device: Arc<dyn LightDevice>,
    debounce: Duration,
    pulse_duration: Duration,
    last_accepted: Option<Instant>,
    in_flight: Arc<AtomicBool>,
}

impl DebouncedSink {
    pub fn new(device: Arc<dyn LightDevice>, debounce: Duration, pulse_duration: Duration) -> Self {
        Self {
            device,
            debounce,
            pulse_duration,
            last_accepted: None,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Returns whether the pulse was accepted for dispatch.
    pub fn offer(&mut self, pulse: &Pulse, now: Instant) -> bool {
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < self.debounce {
                log::trace!("Debounced pulse at {:.3}s", pulse.time);
                return false;
            }
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::trace!("Dropped pulse at {:.3}s, previous command in flight", pulse.time);
            return false;
        }

        self.last_accepted = Some(now);
        let device = Arc::clone(&self.device);
        let in_flight = Arc::clone(&self.in_flight);
        let level = pulse.brightness;
        let duration = self.pulse_duration;

        let spawned = std::thread::Builder::new()
            .name("beatlight-pulse".into())
            .spawn(move || {
                if let Err(err) = device.pulse_brightness(level, duration) {
                    log::warn!("Pulse to {} failed: {}", device.name(), err);
                }
                in_flight.store(false, Ordering::Release);
            });
        if let Err(err) = spawned {
            log::warn!("Could not spawn pulse dispatch: {}", err);
            self.in_flight.store(false, Ordering::Release);
        }
        true
    }
}

#[cfg(test)]
pub(crate) mod test_devices {
    use super::*;
    use crate::error::DeviceError;
    use crossbeam_channel::Receiver;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct Recording {
        pub levels: Mutex<Vec<u8>>,
    }

    impl LightDevice for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn pulse_brightness(&self, level: u8, _: Duration) -> Result<(), DeviceError> {
            self.levels.lock().unwrap().push(level);
            Ok(())
        }
    }

    pub struct Failing;

    impl LightDevice for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn pulse_brightness(&self, _: u8, _: Duration) -> Result<(), DeviceError> {
            Err(DeviceError::Unavailable("unplugged".into()))
        }
    }

    /// Holds each command until the test releases it.
    pub struct Gated {
        pub release: Receiver<()>,
    }

    impl LightDevice for Gated {
        fn name(&self) -> &str {
            "gated"
        }

        fn pulse_brightness(&self, _: u8, _: Duration) -> Result<(), DeviceError> {
            let _ = self.release.recv();
            Ok(())
        }
    }

    pub fn settle(sink: &DebouncedSink) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while sink.is_in_flight() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(!sink.is_in_flight(), "dispatch never finished");
    }
}
