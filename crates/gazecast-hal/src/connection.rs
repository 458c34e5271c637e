//! [`DeviceConnection`] – lifecycle of the link to one eye-tracking device.
//!
//! # States
//!
//! ```text
//! Disconnected ──open()──▶ Connected ──transport failure──▶ Reconnecting
//!       ▲                      ▲                                  │
//!       │                      └────────reconnect succeeds────────┘
//!       └───────────────────────close() from any state
//! ```
//!
//! While `Reconnecting`, at most one reconnect attempt is made per
//! [`ConnectionConfig::reconnect_interval`], however fast the host ticks.
//! Samples are only read in `Connected`.
//!
//! Samples delivered by the driver land in a [`SampleMailbox`]; each
//! [`tick`][DeviceConnection::tick] hands back at most the newest one.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gazecast_types::{ConnectionState, GazeError, RawGazeSample};
use tracing::{debug, error, info, warn};

use crate::driver::{
    ContextHandle, DeviceHandle, DriverCapability, DriverError, EyeTrackerDriver,
    LicenseValidation,
};
use crate::mailbox::SampleMailbox;

/// `process_callbacks` calls slower than this are reported.
const SLOW_PROCESS_THRESHOLD: Duration = Duration::from_millis(1);

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ConnectionConfig {
    /// Only devices of this integration type are accepted (case-insensitive).
    pub integration_type: String,
    /// License tokens handed to the driver on device creation.
    pub licenses: Vec<String>,
    pub reconnect_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            integration_type: "wearable".to_string(),
            licenses: Vec::new(),
            reconnect_interval: Duration::from_millis(500),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("integration_type", &self.integration_type)
            .field("licenses", &format_args!("[{} redacted]", self.licenses.len()))
            .field("reconnect_interval", &self.reconnect_interval)
            .finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// DeviceConnection
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Session {
    context: ContextHandle,
    device: DeviceHandle,
    url: String,
    convergence_supported: bool,
}

/// Owns the driver context and device for one eye tracker.
pub struct DeviceConnection {
    driver: Box<dyn EyeTrackerDriver>,
    config: ConnectionConfig,
    session: Option<Session>,
    state: ConnectionState,
    mailbox: Arc<SampleMailbox>,
    last_reconnect_attempt: Option<Instant>,
    received_sample: bool,
}

impl DeviceConnection {
    pub fn new(driver: Box<dyn EyeTrackerDriver>, config: ConnectionConfig) -> Self {
        Self {
            driver,
            config,
            session: None,
            state: ConnectionState::Disconnected,
            mailbox: Arc::new(SampleMailbox::new()),
            last_reconnect_attempt: None,
            received_sample: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// URL of the connected device.
    pub fn url(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.url.as_str())
    }

    /// Whether the device reports convergence distance itself.  Resolved
    /// once per [`open`][Self::open].
    pub fn convergence_supported(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.convergence_supported)
    }

    /// Whether the last [`tick`][Self::tick] produced a sample.
    pub fn received_sample_this_tick(&self) -> bool {
        self.received_sample
    }

    pub fn mailbox(&self) -> &Arc<SampleMailbox> {
        &self.mailbox
    }

    /// Open the first attached device whose integration type matches.
    ///
    /// Every driver resource acquired along a failing path is released
    /// before returning.
    ///
    /// # Errors
    ///
    /// - [`GazeError::AlreadyOpen`] if a device is already open.
    /// - [`GazeError::ContextCreation`] / [`GazeError::Enumeration`] when
    ///   the driver cannot start.
    /// - [`GazeError::NoDeviceFound`] when nothing is attached.
    /// - [`GazeError::DeviceCreation`], [`GazeError::DeviceInfo`] or
    ///   [`GazeError::Subscription`] when a device fails mid-setup; the
    ///   search stops there.
    /// - [`GazeError::NoMatchingDevice`] when no device has the configured
    ///   integration type.
    pub fn open(&mut self) -> Result<(), GazeError> {
        if self.session.is_some() {
            return Err(GazeError::AlreadyOpen);
        }
        let started = Instant::now();

        let context = self.driver.create_context().map_err(|e| {
            error!(error = %e, "failed to create eye tracker API context");
            GazeError::ContextCreation(e.to_string())
        })?;

        let session = match self.connect_first_matching(context) {
            Ok(session) => session,
            Err(e) => {
                self.destroy_context_logged(context);
                return Err(e);
            }
        };

        info!(
            url = %session.url,
            convergence_supported = session.convergence_supported,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "connected to eye tracker"
        );
        self.session = Some(session);
        self.state = ConnectionState::Connected;
        self.last_reconnect_attempt = None;
        Ok(())
    }

    fn connect_first_matching(&mut self, context: ContextHandle) -> Result<Session, GazeError> {
        let urls = self.driver.enumerate_devices(context).map_err(|e| {
            error!(error = %e, "failed to enumerate eye trackers");
            GazeError::Enumeration(e.to_string())
        })?;

        if urls.is_empty() {
            warn!("no eye trackers found");
            return Err(GazeError::NoDeviceFound);
        }

        for url in urls {
            let device = match self
                .driver
                .create_device(context, &url, &self.config.licenses)
            {
                Ok(device) => device,
                Err(e) => {
                    error!(url = %url, error = %e, "failed to create eye tracker device");
                    self.log_license_failures(&e.license_results);
                    return Err(GazeError::DeviceCreation {
                        url,
                        details: e.error.to_string(),
                    });
                }
            };

            let info = match self.driver.device_info(device) {
                Ok(info) => info,
                Err(e) => {
                    error!(url = %url, error = %e, "failed to read eye tracker device info");
                    self.destroy_device_logged(device);
                    return Err(GazeError::DeviceInfo(e.to_string()));
                }
            };

            if !info
                .integration_type
                .eq_ignore_ascii_case(&self.config.integration_type)
            {
                debug!(
                    url = %url,
                    integration_type = %info.integration_type,
                    wanted = %self.config.integration_type,
                    "skipping eye tracker with different integration type"
                );
                self.destroy_device_logged(device);
                continue;
            }

            let mailbox = Arc::clone(&self.mailbox);
            if let Err(e) = self
                .driver
                .subscribe_samples(device, Box::new(move |sample| mailbox.post(sample)))
            {
                error!(url = %url, error = %e, "failed to subscribe to gaze samples");
                self.destroy_device_logged(device);
                return Err(GazeError::Subscription(e.to_string()));
            }

            let convergence_supported = self
                .driver
                .capability_supported(device, DriverCapability::ConvergenceDistance)
                .unwrap_or_else(|e| {
                    warn!(url = %url, error = %e, "could not query convergence capability");
                    false
                });

            return Ok(Session {
                context,
                device,
                url,
                convergence_supported,
            });
        }

        warn!(
            integration_type = %self.config.integration_type,
            "no eye tracker with matching integration type"
        );
        Err(GazeError::NoMatchingDevice {
            integration_type: self.config.integration_type.clone(),
        })
    }

    fn log_license_failures(&self, results: &[LicenseValidation]) {
        for (index, result) in results.iter().enumerate() {
            if *result != LicenseValidation::Ok {
                error!(license_index = index, result = ?result, "license validation failed");
            }
        }
    }

    /// Advance the connection one tick.
    ///
    /// In `Connected`, pumps the driver and returns the newest sample
    /// delivered since the previous tick.  In `Reconnecting`, makes a
    /// throttled reconnect attempt and returns `None`.  Never fails: driver
    /// errors are logged and folded into the state machine.
    pub fn tick(&mut self, now: Instant) -> Option<RawGazeSample> {
        self.received_sample = false;
        let device = self.session.as_ref()?.device;

        match self.state {
            ConnectionState::Disconnected => None,
            ConnectionState::Reconnecting => {
                self.try_reconnect(device, now);
                None
            }
            ConnectionState::Connected => {
                let started = Instant::now();
                let result = self.driver.process_callbacks(device);
                let elapsed = started.elapsed();
                if elapsed > SLOW_PROCESS_THRESHOLD {
                    warn!(
                        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                        "processing eye tracker callbacks took longer than expected"
                    );
                }

                match result {
                    Ok(()) => {}
                    Err(DriverError::ConnectionFailed) => {
                        info!(
                            url = self.url().unwrap_or_default(),
                            "eye tracker connection lost, reconnecting"
                        );
                        self.state = ConnectionState::Reconnecting;
                        self.last_reconnect_attempt = Some(now);
                        self.mailbox.clear();
                        return None;
                    }
                    Err(e) => {
                        error!(error = %e, "failed to process eye tracker callbacks");
                    }
                }

                let sample = self.mailbox.take();
                self.received_sample = sample.is_some();
                sample
            }
        }
    }

    fn try_reconnect(&mut self, device: DeviceHandle, now: Instant) {
        if let Some(last) = self.last_reconnect_attempt
            && now.saturating_duration_since(last) < self.config.reconnect_interval
        {
            return;
        }
        self.last_reconnect_attempt = Some(now);

        match self.driver.reconnect(device) {
            Ok(()) => {
                info!(url = self.url().unwrap_or_default(), "eye tracker reconnected");
                self.state = ConnectionState::Connected;
            }
            Err(e) => debug!(error = %e, "eye tracker reconnect attempt failed"),
        }
    }

    /// Release the device and the driver context.  Idempotent.
    ///
    /// Destroy failures are logged and do not stop the remaining teardown.
    pub fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.destroy_device_logged(session.device);
        self.destroy_context_logged(session.context);
        self.mailbox.clear();
        self.state = ConnectionState::Disconnected;
        self.received_sample = false;
        info!(url = %session.url, "disconnected from eye tracker");
    }

    fn destroy_device_logged(&mut self, device: DeviceHandle) {
        if let Err(e) = self.driver.destroy_device(device) {
            error!(error = %e, "failed to destroy eye tracker device");
        }
    }

    fn destroy_context_logged(&mut self, context: ContextHandle) {
        if let Err(e) = self.driver.destroy_context(context) {
            error!(error = %e, "failed to destroy eye tracker API context");
        }
    }
}

impl Drop for DeviceConnection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for DeviceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConnection")
            .field("config", &self.config)
            .field("session", &self.session)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimDriver;

    fn sample(ts: u64) -> RawGazeSample {
        RawGazeSample {
            timestamp_us: ts,
            ..RawGazeSample::default()
        }
    }

    fn connect(driver: &SimDriver) -> DeviceConnection {
        let mut conn = DeviceConnection::new(Box::new(driver.clone()), ConnectionConfig::default());
        conn.open().unwrap();
        conn
    }

    #[test]
    fn open_selects_first_matching_device() {
        let driver = SimDriver::new()
            .with_device("sim://remote", "remote")
            .with_device("sim://headset", "Wearable");
        let conn = connect(&driver);

        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(conn.url(), Some("sim://headset"));
        assert_eq!(driver.destroyed_devices(), vec!["sim://remote".to_string()]);
        assert_eq!(driver.open_devices(), vec!["sim://headset".to_string()]);
    }

    #[test]
    fn open_twice_is_rejected() {
        let driver = SimDriver::new().with_device("sim://a", "wearable");
        let mut conn = connect(&driver);
        assert_eq!(conn.open(), Err(GazeError::AlreadyOpen));
    }

    #[test]
    fn no_devices_releases_context() {
        let driver = SimDriver::new();
        let mut conn = DeviceConnection::new(Box::new(driver.clone()), ConnectionConfig::default());
        assert_eq!(conn.open(), Err(GazeError::NoDeviceFound));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(driver.live_contexts(), 0);
    }

    #[test]
    fn no_matching_device_releases_everything() {
        let driver = SimDriver::new()
            .with_device("sim://a", "remote")
            .with_device("sim://b", "desktop");
        let mut conn = DeviceConnection::new(Box::new(driver.clone()), ConnectionConfig::default());
        let err = conn.open().unwrap_err();
        assert!(matches!(err, GazeError::NoMatchingDevice { .. }));
        assert!(driver.open_devices().is_empty());
        assert_eq!(driver.live_contexts(), 0);
        assert_eq!(driver.destroyed_devices().len(), 2);
    }

    #[test]
    fn context_failure_is_reported() {
        let driver = SimDriver::new()
            .with_device("sim://a", "wearable")
            .with_failing_context();
        let mut conn = DeviceConnection::new(Box::new(driver), ConnectionConfig::default());
        assert!(matches!(conn.open(), Err(GazeError::ContextCreation(_))));
    }

    #[test]
    fn device_info_failure_destroys_device_and_context() {
        let driver = SimDriver::new()
            .with_device("sim://a", "wearable")
            .with_failing_device_info();
        let mut conn = DeviceConnection::new(Box::new(driver.clone()), ConnectionConfig::default());
        assert!(matches!(conn.open(), Err(GazeError::DeviceInfo(_))));
        assert_eq!(driver.destroyed_devices(), vec!["sim://a".to_string()]);
        assert_eq!(driver.live_contexts(), 0);
    }

    #[test]
    fn license_failure_aborts_search() {
        let driver = SimDriver::new()
            .with_device("sim://a", "wearable")
            .with_required_license("valid-token");
        let config = ConnectionConfig {
            licenses: vec!["expired-token".to_string()],
            ..ConnectionConfig::default()
        };
        let mut conn = DeviceConnection::new(Box::new(driver.clone()), config);
        assert!(matches!(conn.open(), Err(GazeError::DeviceCreation { .. })));
        assert_eq!(driver.live_contexts(), 0);
    }

    #[test]
    fn convergence_capability_resolved_at_open() {
        let driver = SimDriver::new()
            .with_device("sim://a", "wearable")
            .with_convergence_support(true);
        let conn = connect(&driver);
        assert!(conn.convergence_supported());
    }

    #[test]
    fn tick_returns_newest_sample_only() {
        let driver = SimDriver::new().with_device("sim://a", "wearable");
        let mut conn = connect(&driver);
        let now = Instant::now();

        driver.queue_sample(sample(1));
        driver.queue_sample(sample(2));
        assert_eq!(conn.tick(now).map(|s| s.timestamp_us), Some(2));
        assert!(conn.received_sample_this_tick());

        assert!(conn.tick(now).is_none());
        assert!(!conn.received_sample_this_tick());
    }

    #[test]
    fn samples_from_transport_thread_are_picked_up() {
        let driver = SimDriver::new().with_device("sim://a", "wearable");
        let mut conn = connect(&driver);
        driver.deliver_now(sample(9));
        assert_eq!(conn.tick(Instant::now()).map(|s| s.timestamp_us), Some(9));
    }

    #[test]
    fn transport_failure_enters_reconnecting_and_drops_samples() {
        let driver = SimDriver::new().with_device("sim://a", "wearable");
        let mut conn = connect(&driver);
        driver.deliver_now(sample(1));
        driver.set_transport_down(true);

        assert!(conn.tick(Instant::now()).is_none());
        assert_eq!(conn.state(), ConnectionState::Reconnecting);
        assert!(!conn.mailbox().has_pending());
    }

    #[test]
    fn other_processing_errors_stay_connected() {
        let driver = SimDriver::new().with_device("sim://a", "wearable");
        let mut conn = connect(&driver);
        driver.deliver_now(sample(5));
        driver.set_process_error(Some(DriverError::Internal("driver hiccup".to_string())));

        assert_eq!(conn.tick(Instant::now()).map(|s| s.timestamp_us), Some(5));
        assert_eq!(conn.state(), ConnectionState::Connected);

        driver.set_process_error(Some(DriverError::NotSupported));
        assert!(conn.tick(Instant::now()).is_none());
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(driver.reconnect_attempts(), 0);

        driver.set_process_error(None);
        driver.queue_sample(sample(6));
        assert_eq!(conn.tick(Instant::now()).map(|s| s.timestamp_us), Some(6));
    }

    #[test]
    fn reconnect_attempts_are_throttled() {
        let driver = SimDriver::new().with_device("sim://a", "wearable");
        let mut conn = connect(&driver);
        driver.set_transport_down(true);

        let t0 = Instant::now();
        conn.tick(t0);
        assert_eq!(conn.state(), ConnectionState::Reconnecting);

        // 90 Hz for just under half a second: no attempt yet.
        for i in 1..45 {
            conn.tick(t0 + Duration::from_micros(11_111 * i));
        }
        assert_eq!(driver.reconnect_attempts(), 0);

        conn.tick(t0 + Duration::from_millis(500));
        assert_eq!(driver.reconnect_attempts(), 1);

        // A full second at 1 kHz allows exactly two more attempts.
        for ms in 501..=1500 {
            conn.tick(t0 + Duration::from_millis(ms));
        }
        assert_eq!(driver.reconnect_attempts(), 3);
    }

    #[test]
    fn successful_reconnect_resumes_sampling() {
        let driver = SimDriver::new().with_device("sim://a", "wearable");
        let mut conn = connect(&driver);
        driver.set_transport_down(true);
        let t0 = Instant::now();
        conn.tick(t0);

        driver.set_transport_down(false);
        conn.tick(t0 + Duration::from_millis(600));
        assert_eq!(conn.state(), ConnectionState::Connected);

        driver.queue_sample(sample(77));
        let got = conn.tick(t0 + Duration::from_millis(611));
        assert_eq!(got.map(|s| s.timestamp_us), Some(77));
    }

    #[test]
    fn close_is_idempotent_and_releases_resources() {
        let driver = SimDriver::new().with_device("sim://a", "wearable");
        let mut conn = connect(&driver);
        conn.close();
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(driver.destroyed_devices(), vec!["sim://a".to_string()]);
        assert_eq!(driver.destroyed_contexts(), 1);
        assert!(conn.tick(Instant::now()).is_none());
    }

    #[test]
    fn drop_closes_connection() {
        let driver = SimDriver::new().with_device("sim://a", "wearable");
        {
            let _conn = connect(&driver);
        }
        assert!(driver.open_devices().is_empty());
        assert_eq!(driver.live_contexts(), 0);
    }

    #[test]
    fn debug_redacts_licenses() {
        let config = ConnectionConfig {
            licenses: vec!["secret-token".to_string()],
            ..ConnectionConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("redacted"));
    }
}
