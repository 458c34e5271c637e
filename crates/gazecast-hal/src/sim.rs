//! In-process simulated eye-tracker driver for tests and headless runs.
//!
//! [`SimDriver`] implements [`EyeTrackerDriver`] over a scripted set of
//! devices.  It is cheaply cloneable: every clone shares the same state, so
//! a test can hand one clone to a
//! [`DeviceConnection`][crate::connection::DeviceConnection] and keep another
//! to inject samples, break the transport, and inspect what was created and
//! destroyed.
//!
//! # Example
//!
//! ```rust
//! use gazecast_hal::connection::{ConnectionConfig, DeviceConnection};
//! use gazecast_hal::sim::SimDriver;
//! use gazecast_types::{ConnectionState, RawGazeSample};
//! use std::time::Instant;
//!
//! let driver = SimDriver::new().with_device("tobii-prp://sim-0", "wearable");
//! let mut connection = DeviceConnection::new(Box::new(driver.clone()), ConnectionConfig::default());
//! connection.open().expect("sim device must open");
//! assert_eq!(connection.state(), ConnectionState::Connected);
//!
//! driver.queue_sample(RawGazeSample { timestamp_us: 42, ..RawGazeSample::default() });
//! let sample = connection.tick(Instant::now());
//! assert_eq!(sample.map(|s| s.timestamp_us), Some(42));
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use gazecast_types::RawGazeSample;
use parking_lot::Mutex;

use crate::driver::{
    ContextHandle, DeviceCreateError, DeviceHandle, DeviceInfo, DriverCapability, DriverError,
    EyeTrackerDriver, LicenseValidation, SampleCallback,
};

// ────────────────────────────────────────────────────────────────────────────
// Scripted devices
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct SimDevice {
    url: String,
    integration_type: String,
}

struct OpenDevice {
    url: String,
    callback: Option<SampleCallback>,
}

#[derive(Default)]
struct SimState {
    devices: Vec<SimDevice>,
    next_handle: u64,
    contexts: HashSet<u64>,
    open_devices: HashMap<u64, OpenDevice>,
    pending: VecDeque<RawGazeSample>,

    required_license: Option<String>,
    convergence_supported: bool,
    fail_context: bool,
    fail_device_info: bool,
    transport_down: bool,
    process_error: Option<DriverError>,

    reconnect_attempts: usize,
    destroyed_devices: Vec<String>,
    destroyed_contexts: usize,
}

impl SimState {
    fn allocate(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimDriver
// ────────────────────────────────────────────────────────────────────────────

/// Scripted [`EyeTrackerDriver`] backed by shared in-memory state.
#[derive(Clone, Default)]
pub struct SimDriver {
    state: Arc<Mutex<SimState>>,
}

impl SimDriver {
    /// A driver with no attached devices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device.  Devices are enumerated in the order they were added.
    pub fn with_device(self, url: impl Into<String>, integration_type: impl Into<String>) -> Self {
        self.state.lock().devices.push(SimDevice {
            url: url.into(),
            integration_type: integration_type.into(),
        });
        self
    }

    /// Reject device creation unless `token` is among the supplied licenses.
    pub fn with_required_license(self, token: impl Into<String>) -> Self {
        self.state.lock().required_license = Some(token.into());
        self
    }

    /// Whether devices report convergence distance themselves.
    pub fn with_convergence_support(self, supported: bool) -> Self {
        self.state.lock().convergence_supported = supported;
        self
    }

    /// Make [`EyeTrackerDriver::create_context`] fail.
    pub fn with_failing_context(self) -> Self {
        self.state.lock().fail_context = true;
        self
    }

    /// Make [`EyeTrackerDriver::device_info`] fail.
    pub fn with_failing_device_info(self) -> Self {
        self.state.lock().fail_device_info = true;
        self
    }

    /// Queue a sample for delivery during the next `process_callbacks`.
    pub fn queue_sample(&self, sample: RawGazeSample) {
        self.state.lock().pending.push_back(sample);
    }

    /// Deliver a sample immediately to every subscriber, as a transport
    /// thread would.
    pub fn deliver_now(&self, sample: RawGazeSample) {
        let mut state = self.state.lock();
        for device in state.open_devices.values_mut() {
            if let Some(callback) = device.callback.as_mut() {
                callback(sample);
            }
        }
    }

    /// While down, `process_callbacks` and `reconnect` fail with
    /// [`DriverError::ConnectionFailed`].
    pub fn set_transport_down(&self, down: bool) {
        self.state.lock().transport_down = down;
    }

    /// Make every `process_callbacks` fail with `error` (without delivering
    /// queued samples) until cleared with `None`.  An outage set through
    /// [`set_transport_down`][Self::set_transport_down] takes precedence.
    pub fn set_process_error(&self, error: Option<DriverError>) {
        self.state.lock().process_error = error;
    }

    pub fn reconnect_attempts(&self) -> usize {
        self.state.lock().reconnect_attempts
    }

    /// URLs of devices destroyed so far, in order.
    pub fn destroyed_devices(&self) -> Vec<String> {
        self.state.lock().destroyed_devices.clone()
    }

    pub fn destroyed_contexts(&self) -> usize {
        self.state.lock().destroyed_contexts
    }

    /// URLs of devices currently open.
    pub fn open_devices(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut urls: Vec<String> = state.open_devices.values().map(|d| d.url.clone()).collect();
        urls.sort();
        urls
    }

    pub fn live_contexts(&self) -> usize {
        self.state.lock().contexts.len()
    }
}

impl EyeTrackerDriver for SimDriver {
    fn create_context(&mut self) -> Result<ContextHandle, DriverError> {
        let mut state = self.state.lock();
        if state.fail_context {
            return Err(DriverError::Internal("sim context creation disabled".to_string()));
        }
        let handle = state.allocate();
        state.contexts.insert(handle);
        Ok(ContextHandle(handle))
    }

    fn enumerate_devices(&mut self, context: ContextHandle) -> Result<Vec<String>, DriverError> {
        let state = self.state.lock();
        if !state.contexts.contains(&context.0) {
            return Err(DriverError::InvalidParameter("unknown context".to_string()));
        }
        Ok(state.devices.iter().map(|d| d.url.clone()).collect())
    }

    fn create_device(
        &mut self,
        context: ContextHandle,
        url: &str,
        licenses: &[String],
    ) -> Result<DeviceHandle, DeviceCreateError> {
        let mut state = self.state.lock();
        if !state.contexts.contains(&context.0) {
            return Err(DeviceCreateError {
                error: DriverError::InvalidParameter("unknown context".to_string()),
                license_results: Vec::new(),
            });
        }
        if !state.devices.iter().any(|d| d.url == url) {
            return Err(DeviceCreateError {
                error: DriverError::NoDevice,
                license_results: Vec::new(),
            });
        }
        if let Some(required) = state.required_license.as_deref()
            && !licenses.iter().any(|l| l == required)
        {
            let license_results = licenses
                .iter()
                .map(|_| LicenseValidation::InvalidApplicationSignature)
                .collect();
            return Err(DeviceCreateError {
                error: DriverError::Internal("license validation failed".to_string()),
                license_results,
            });
        }

        let handle = state.allocate();
        state.open_devices.insert(
            handle,
            OpenDevice {
                url: url.to_string(),
                callback: None,
            },
        );
        Ok(DeviceHandle(handle))
    }

    fn device_info(&mut self, device: DeviceHandle) -> Result<DeviceInfo, DriverError> {
        let state = self.state.lock();
        if state.fail_device_info {
            return Err(DriverError::Internal("sim device info disabled".to_string()));
        }
        let open = state.open_devices.get(&device.0).ok_or(DriverError::NoDevice)?;
        let scripted = state
            .devices
            .iter()
            .find(|d| d.url == open.url)
            .ok_or(DriverError::NoDevice)?;
        Ok(DeviceInfo {
            integration_type: scripted.integration_type.clone(),
            model: "SimTracker".to_string(),
            serial_number: format!("SIM-{:04}", device.0),
        })
    }

    fn capability_supported(
        &mut self,
        device: DeviceHandle,
        capability: DriverCapability,
    ) -> Result<bool, DriverError> {
        let state = self.state.lock();
        if !state.open_devices.contains_key(&device.0) {
            return Err(DriverError::NoDevice);
        }
        Ok(match capability {
            DriverCapability::ConvergenceDistance => state.convergence_supported,
        })
    }

    fn subscribe_samples(
        &mut self,
        device: DeviceHandle,
        callback: SampleCallback,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        let open = state
            .open_devices
            .get_mut(&device.0)
            .ok_or(DriverError::NoDevice)?;
        open.callback = Some(callback);
        Ok(())
    }

    fn process_callbacks(&mut self, device: DeviceHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        if state.transport_down {
            return Err(DriverError::ConnectionFailed);
        }
        if let Some(e) = state.process_error.clone() {
            return Err(e);
        }
        let pending: Vec<RawGazeSample> = state.pending.drain(..).collect();
        let open = state
            .open_devices
            .get_mut(&device.0)
            .ok_or(DriverError::NoDevice)?;
        if let Some(callback) = open.callback.as_mut() {
            for sample in pending {
                callback(sample);
            }
        }
        Ok(())
    }

    fn reconnect(&mut self, device: DeviceHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.reconnect_attempts += 1;
        if !state.open_devices.contains_key(&device.0) {
            return Err(DriverError::NoDevice);
        }
        if state.transport_down {
            return Err(DriverError::ConnectionFailed);
        }
        Ok(())
    }

    fn destroy_device(&mut self, device: DeviceHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        let open = state
            .open_devices
            .remove(&device.0)
            .ok_or(DriverError::NoDevice)?;
        state.destroyed_devices.push(open.url);
        Ok(())
    }

    fn destroy_context(&mut self, context: ContextHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        if !state.contexts.remove(&context.0) {
            return Err(DriverError::InvalidParameter("unknown context".to_string()));
        }
        state.destroyed_contexts += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn enumerates_in_insertion_order() {
        let mut driver = SimDriver::new()
            .with_device("sim://a", "remote")
            .with_device("sim://b", "wearable");
        let ctx = driver.create_context().unwrap();
        assert_eq!(
            driver.enumerate_devices(ctx).unwrap(),
            vec!["sim://a".to_string(), "sim://b".to_string()]
        );
    }

    #[test]
    fn license_rejection_reports_every_token() {
        let mut driver = SimDriver::new()
            .with_device("sim://a", "wearable")
            .with_required_license("good");
        let ctx = driver.create_context().unwrap();
        let licenses = vec!["bad-1".to_string(), "bad-2".to_string()];
        let err = driver.create_device(ctx, "sim://a", &licenses).unwrap_err();
        assert_eq!(err.license_results.len(), 2);

        let licenses = vec!["good".to_string()];
        assert!(driver.create_device(ctx, "sim://a", &licenses).is_ok());
    }

    #[test]
    fn queued_samples_fire_inside_process_callbacks() {
        let mut driver = SimDriver::new().with_device("sim://a", "wearable");
        let ctx = driver.create_context().unwrap();
        let dev = driver.create_device(ctx, "sim://a", &[]).unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        driver
            .subscribe_samples(
                dev,
                Box::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        driver.queue_sample(RawGazeSample::default());
        driver.queue_sample(RawGazeSample::default());
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        driver.process_callbacks(dev).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn transport_down_fails_process_and_reconnect() {
        let mut driver = SimDriver::new().with_device("sim://a", "wearable");
        let ctx = driver.create_context().unwrap();
        let dev = driver.create_device(ctx, "sim://a", &[]).unwrap();
        driver.set_transport_down(true);
        assert_eq!(driver.process_callbacks(dev), Err(DriverError::ConnectionFailed));
        assert_eq!(driver.reconnect(dev), Err(DriverError::ConnectionFailed));
        driver.set_transport_down(false);
        assert!(driver.reconnect(dev).is_ok());
        assert_eq!(driver.reconnect_attempts(), 2);
    }

    #[test]
    fn destroy_tracks_devices_and_contexts() {
        let mut driver = SimDriver::new().with_device("sim://a", "wearable");
        let ctx = driver.create_context().unwrap();
        let dev = driver.create_device(ctx, "sim://a", &[]).unwrap();
        driver.destroy_device(dev).unwrap();
        driver.destroy_context(ctx).unwrap();
        assert_eq!(driver.destroyed_devices(), vec!["sim://a".to_string()]);
        assert_eq!(driver.destroyed_contexts(), 1);
        assert_eq!(driver.live_contexts(), 0);
        assert!(driver.destroy_device(dev).is_err());
    }
}
