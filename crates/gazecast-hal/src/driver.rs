//! [`EyeTrackerDriver`] – the narrow contract to the native eye-tracker
//! driver.
//!
//! Production builds implement this trait over the vendor's foreign-function
//! interface; tests and the CLI use [`SimDriver`][crate::sim::SimDriver].
//! The rest of the pipeline only ever talks to the trait, so the connection
//! state machine can be exercised without hardware.

use gazecast_types::RawGazeSample;
use thiserror::Error;

/// Opaque handle to a driver API context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(pub u64);

/// Opaque handle to an open device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u64);

/// Static information about a device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    /// Integration type, e.g. `"wearable"` for a head-mounted tracker.
    pub integration_type: String,
    pub model: String,
    pub serial_number: String,
}

/// Optional driver features probed once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverCapability {
    /// The device reports convergence distance in its sample stream.
    ConvergenceDistance,
}

/// Per-token outcome of license validation during device creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseValidation {
    Ok,
    Tampered,
    InvalidApplicationSignature,
    NonsignedApplication,
    Expired,
    PreMature,
    InvalidProcessName,
    InvalidSerialNumber,
    InvalidModel,
}

/// Status codes reported by the driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The transport to the device has been lost.  Recoverable through
    /// [`EyeTrackerDriver::reconnect`].
    #[error("connection failed")]
    ConnectionFailed,

    #[error("no device")]
    NoDevice,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("not supported")]
    NotSupported,

    #[error("internal driver error: {0}")]
    Internal(String),
}

/// Failure from [`EyeTrackerDriver::create_device`], carrying the
/// validation result of every supplied license token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error}")]
pub struct DeviceCreateError {
    pub error: DriverError,
    /// One entry per supplied token, in order.  May be empty when the
    /// failure happened before validation.
    pub license_results: Vec<LicenseValidation>,
}

/// Invoked by the driver for every delivered sample, possibly from a
/// transport thread.
pub type SampleCallback = Box<dyn FnMut(RawGazeSample) + Send + 'static>;

/// Native eye-tracker driver.
///
/// Every call is synchronous and bounded by the driver.  Handles are only
/// valid between their create and destroy calls.
pub trait EyeTrackerDriver: Send {
    fn create_context(&mut self) -> Result<ContextHandle, DriverError>;

    /// URLs of every locally attached device.
    fn enumerate_devices(&mut self, context: ContextHandle) -> Result<Vec<String>, DriverError>;

    fn create_device(
        &mut self,
        context: ContextHandle,
        url: &str,
        licenses: &[String],
    ) -> Result<DeviceHandle, DeviceCreateError>;

    fn device_info(&mut self, device: DeviceHandle) -> Result<DeviceInfo, DriverError>;

    fn capability_supported(
        &mut self,
        device: DeviceHandle,
        capability: DriverCapability,
    ) -> Result<bool, DriverError>;

    /// Register `callback` for the device's gaze stream.
    fn subscribe_samples(
        &mut self,
        device: DeviceHandle,
        callback: SampleCallback,
    ) -> Result<(), DriverError>;

    /// Pump pending driver work.  Subscribed callbacks may fire from inside
    /// this call.
    ///
    /// # Errors
    ///
    /// [`DriverError::ConnectionFailed`] signals a transport failure.
    fn process_callbacks(&mut self, device: DeviceHandle) -> Result<(), DriverError>;

    fn reconnect(&mut self, device: DeviceHandle) -> Result<(), DriverError>;

    fn destroy_device(&mut self, device: DeviceHandle) -> Result<(), DriverError>;

    fn destroy_context(&mut self, context: ContextHandle) -> Result<(), DriverError>;
}
