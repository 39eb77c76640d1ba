//! Backend interface
//!
//! These traits mirror the vtables of libinsane's C API (`struct lis_api`,
//! `struct lis_item`, `struct lis_option_descriptor` and
//! `struct lis_scan_session`). Implementations return raw [`ErrorCode`]s;
//! the adapter types in this crate turn them into [`Error`]s, run the
//! warm-up retry loop and manage handle lifetimes.
//!
//! Two implementations ship with the crate: the FFI driver over the real
//! library (feature `libinsane`) and [`MockScanner`](crate::mock::MockScanner).
//!
//! [`Error`]: crate::Error

use crate::device::{DeviceDescriptor, DeviceLocations, ItemKind};
use crate::option::{OptionInfo, SetFlags};
use crate::session::ScanParameters;
use crate::value::Value;
use crate::ErrorCode;

/// Result of a driver call: `Err` carries any code other than `Ok`.
pub type DriverResult<T> = std::result::Result<T, ErrorCode>;

/// Entry point of a backend (`struct lis_api`).
pub trait Driver {
    /// Name of the backend implementation.
    fn base_name(&self) -> String;

    fn list_devices(&self, locations: DeviceLocations) -> DriverResult<Vec<DeviceDescriptor>>;

    /// Open a device. The returned handle must be closed exactly once.
    fn get_device(&self, dev_id: &str) -> DriverResult<Box<dyn ItemHandle>>;

    /// Release the backend. Called exactly once; cannot fail.
    fn cleanup(&self);
}

/// A scanner or one of its sources (`struct lis_item`).
pub trait ItemHandle {
    fn name(&self) -> String;

    fn kind(&self) -> ItemKind;

    /// Children stay valid until the root item is closed; they are never
    /// closed themselves.
    fn get_children(&self) -> DriverResult<Vec<Box<dyn ItemHandle>>>;

    /// Options stay valid until the item is closed.
    fn get_options(&self) -> DriverResult<Vec<Box<dyn OptionHandle>>>;

    /// Set an option from its textual representation (`lis_set_option()`).
    fn set_option(&self, name: &str, value: &str) -> DriverResult<()>;

    fn scan_start(&self) -> DriverResult<Box<dyn SessionHandle>>;

    fn close(&self);
}

/// One configurable parameter of an item (`struct lis_option_descriptor`).
pub trait OptionHandle {
    fn info(&self) -> OptionInfo;

    fn get_value(&self) -> DriverResult<Value>;

    fn set_value(&self, value: &Value) -> DriverResult<SetFlags>;
}

/// A running scan (`struct lis_scan_session`).
pub trait SessionHandle {
    fn get_scan_parameters(&mut self) -> DriverResult<ScanParameters>;

    fn end_of_feed(&mut self) -> bool;

    fn end_of_page(&mut self) -> bool;

    /// Read the next chunk of image data into `buf`.
    ///
    /// A device that is not ready yet answers `Err(ErrorCode::WarmingUp)`
    /// without producing any byte.
    fn scan_read(&mut self, buf: &mut [u8]) -> DriverResult<usize>;

    fn cancel(&mut self);
}
