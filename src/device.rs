//! Scanners and their descriptors

use crate::config::ApiConfig;
use crate::driver::ItemHandle;
use crate::logging::LogLevel;
use crate::option::OptionDescriptor;
use crate::source::Item;
use crate::Result;
use std::fmt::{self, Display};
use std::ops::Deref;
use std::rc::Rc;

/// What an item is (`enum lis_item_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ItemKind {
    #[default]
    Unidentified = 0,
    Device = 1,
    Flatbed = 2,
    Adf = 3,
}

impl ItemKind {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => Self::Device,
            2 => Self::Flatbed,
            3 => Self::Adf,
            _ => Self::Unidentified,
        }
    }
}

impl Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unidentified => "unidentified",
            Self::Device => "device",
            Self::Flatbed => "flatbed",
            Self::Adf => "adf",
        })
    }
}

/// Which devices to look for (`enum lis_device_locations`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceLocations {
    #[default]
    Any = 0,
    /// Skip network scanners.
    LocalOnly = 1,
}

/// A scanner found by [`Api::list_devices`](crate::Api::list_devices).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceDescriptor {
    /// Identifier to pass to [`Api::get_device`](crate::Api::get_device).
    pub dev_id: String,
    pub vendor: String,
    pub model: String,
    /// Free-form device type ("flatbed scanner", ...).
    pub type_: String,
}

impl Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.dev_id, self.vendor, self.model)
    }
}

/// Name and kind of a paper source, detached from any open device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub name: String,
    pub kind: ItemKind,
}

/// An open scanner.
///
/// The device is closed exactly once: by [`close`](Self::close), by
/// [`iterate_options`](Self::iterate_options), or when dropped. Everything
/// derived from it (sources, options, scan sessions) borrows it.
pub struct Device<'api> {
    id: String,
    item: Item<'api>,
    closed: bool,
}

impl<'api> Device<'api> {
    pub(crate) fn new(id: &str, handle: Box<dyn ItemHandle>, config: Rc<ApiConfig>) -> Self {
        Device {
            id: id.to_string(),
            item: Item::new(handle, config),
            closed: false,
        }
    }

    /// The identifier the device was opened with.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn close(mut self) {
        self.close_once();
    }

    /// Visit every option of the device, then close it.
    ///
    /// Returning `false` from `f` stops before the next option. The device
    /// is closed whether the iteration ran to the end, stopped early or
    /// failed to fetch the options.
    pub fn iterate_options<F>(mut self, f: F) -> Result<()>
    where
        F: FnMut(&OptionDescriptor<'_>) -> bool,
    {
        let result = self.item.for_each_option(f);
        self.close_once();
        result
    }

    fn close_once(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.item.config().sink().log(
            LogLevel::Debug,
            &format!("closing device '{}'", self.id),
        );
        self.item.handle().close();
    }
}

impl<'api> Deref for Device<'api> {
    type Target = Item<'api>;

    fn deref(&self) -> &Self::Target {
        &self.item
    }
}

impl Drop for Device<'_> {
    fn drop(&mut self) {
        self.close_once();
    }
}

impl fmt::Debug for Device<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, MockItem, MockOption, MockScanner};
    use crate::{Api, ApiConfig, ErrorCode};

    fn scanner() -> MockScanner {
        MockScanner::new().device(
            MockDevice::new("mock:0")
                .option(MockOption::integer("resolution", 300))
                .option(MockOption::string("mode", "Color"))
                .option(MockOption::boolean("preview", false))
                .source(MockItem::flatbed("Flatbed")),
        )
    }

    #[test]
    fn test_item_kind_from_raw() {
        assert_eq!(ItemKind::from_raw(2), ItemKind::Flatbed);
        assert_eq!(ItemKind::from_raw(3), ItemKind::Adf);
        assert_eq!(ItemKind::from_raw(42), ItemKind::Unidentified);
        assert_eq!(ItemKind::Adf.to_string(), "adf");
    }

    #[test]
    fn test_drop_closes_once() {
        let mock = scanner();
        let api = Api::with_driver(mock.clone(), ApiConfig::new()).unwrap();
        {
            let device = api.get_device("mock:0").unwrap();
            assert_eq!(device.id(), "mock:0");
        }
        assert_eq!(mock.open_count(), 1);
        assert_eq!(mock.close_count(), 1);
    }

    #[test]
    fn test_explicit_close_is_not_repeated_by_drop() {
        let mock = scanner();
        let api = Api::with_driver(mock.clone(), ApiConfig::new()).unwrap();
        api.get_device("mock:0").unwrap().close();
        assert_eq!(mock.close_count(), 1);
        assert_eq!(mock.double_closes(), 0);
    }

    #[test]
    fn test_iterate_options_closes_after_full_walk() {
        let mock = scanner();
        let api = Api::with_driver(mock.clone(), ApiConfig::new()).unwrap();
        let mut names = Vec::new();
        api.get_device("mock:0")
            .unwrap()
            .iterate_options(|opt| {
                names.push(opt.name().to_string());
                true
            })
            .unwrap();
        assert_eq!(names, ["resolution", "mode", "preview"]);
        assert_eq!(mock.close_count(), 1);
    }

    #[test]
    fn test_iterate_options_closes_after_early_stop() {
        let mock = scanner();
        let api = Api::with_driver(mock.clone(), ApiConfig::new()).unwrap();
        let mut visited = 0;
        api.get_device("mock:0")
            .unwrap()
            .iterate_options(|_| {
                visited += 1;
                false
            })
            .unwrap();
        assert_eq!(visited, 1);
        assert_eq!(mock.close_count(), 1);
    }

    #[test]
    fn test_iterate_options_closes_when_fetch_fails() {
        let mock = MockScanner::new().device(
            MockDevice::new("mock:0").options_error(ErrorCode::IoError),
        );
        let api = Api::with_driver(mock.clone(), ApiConfig::new()).unwrap();
        let err = api
            .get_device("mock:0")
            .unwrap()
            .iterate_options(|_| true)
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::IoError));
        assert!(err.to_string().contains("'iterate_options'"));
        assert_eq!(mock.close_count(), 1);
        assert_eq!(mock.double_closes(), 0);
    }
}
