//! Safe Rust adapter over libinsane
//!
//! [libinsane](https://gitlab.gnome.org/World/OpenPaperwork/libinsane)
//! talks to scanners through SANE, WIA and TWAIN behind one C API made of
//! function pointers, out-parameters and tagged unions. This crate wraps
//! that API into owned handles, iterators and `Result`s:
//!
//! - [`Api`] lists and opens devices,
//! - [`Device`] owns an open scanner and closes it exactly once,
//! - [`Source`] and [`OptionDescriptor`] borrow their device,
//! - [`ScanSession`] reads pages, waiting for warming-up lamps.
//!
//! The real library is behind the `libinsane` cargo feature. Without it the
//! crate still builds and can be driven through [`mock::MockScanner`] or
//! any other [`Driver`](driver::Driver).
//!
//! ```
//! use lisrs::mock::MockScanner;
//! use lisrs::{Api, ApiConfig};
//! use std::io::Read;
//!
//! let api = Api::with_driver(MockScanner::demo(), ApiConfig::new())?;
//! let device = api.get_device("mock:demo")?;
//! let feeder = device
//!     .source("Automatic Document Feeder")?
//!     .ok_or_else(|| lisrs::Error::SourceNotFound("feeder".into()))?;
//! feeder.set_option("resolution", "300")?;
//!
//! let mut session = feeder.scan_start()?;
//! let mut pages = 0;
//! while !session.end_of_feed() {
//!     let image = session.page_reader()?.image()?;
//!     assert_eq!(image.width(), 120);
//!     pages += 1;
//! }
//! assert_eq!(pages, 3);
//! # Ok::<(), lisrs::Error>(())
//! ```

pub mod api;
pub mod bmp;
pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod logging;
pub mod mock;
pub mod option;
pub mod output;
pub mod page;
pub mod session;
pub mod source;
pub mod value;

#[cfg(feature = "libinsane")]
pub mod ffi;

// Re-export main types
pub use api::Api;
pub use config::{ApiConfig, RetryPolicy, Sleeper, ThreadSleeper};
pub use device::{Device, DeviceDescriptor, DeviceLocations, ItemKind, SourceInfo};
pub use error::{Error, ErrorCode, Result};
pub use logging::{set_library_log_level, set_library_sink, LogLevel, LogSink, TracingSink};
pub use option::{
    Capabilities, Constraint, OptionDescriptor, OptionInfo, Options, SetFlags, ValueRange,
};
pub use output::{OutputFormat, PdfWriter};
pub use page::PageReader;
pub use session::{ScanParameters, ScanSession};
pub use source::{Item, Source, Sources};
pub use value::{ImageFormat, Unit, Value, ValueType};
