//! Library entry point

use crate::config::ApiConfig;
use crate::device::{Device, DeviceDescriptor, DeviceLocations, SourceInfo};
use crate::driver::{Driver, DriverResult};
use crate::logging::LogLevel;
use crate::source::Source;
use crate::{Error, Result};
use std::fmt;
use std::rc::Rc;

/// A connection to a scanner backend.
///
/// Created with [`Api::connect`] (or [`Api::safebet`] when linked against
/// libinsane). The backend is cleaned up exactly once, by
/// [`cleanup`](Self::cleanup) or on drop. Devices borrow the `Api` and must
/// be gone before it is.
///
/// ```
/// use lisrs::mock::{MockDevice, MockItem, MockScanner};
/// use lisrs::{Api, ApiConfig};
///
/// let scanner = MockScanner::new()
///     .device(MockDevice::new("mock:0").source(MockItem::flatbed("Flatbed")));
/// let api = Api::with_driver(scanner, ApiConfig::new())?;
/// for dev in api.list_devices()? {
///     let sources = api.list_sources(&dev.dev_id)?;
///     assert_eq!(sources[0].name, "Flatbed");
/// }
/// # Ok::<(), lisrs::Error>(())
/// ```
pub struct Api {
    driver: Box<dyn Driver>,
    config: Rc<ApiConfig>,
    cleaned: bool,
}

impl Api {
    /// Apply the environment toggles of `config`, then initialize the
    /// backend with `init`.
    pub fn connect<I>(config: ApiConfig, init: I) -> Result<Self>
    where
        I: FnOnce() -> DriverResult<Box<dyn Driver>>,
    {
        config.apply_environment();
        let driver = init().map_err(|code| Error::lis(code, "get_api"))?;
        Ok(Self::from_parts(driver, config))
    }

    /// Wrap an already initialized backend.
    pub fn with_driver<D>(driver: D, config: ApiConfig) -> Result<Self>
    where
        D: Driver + 'static,
    {
        Self::connect(config, || Ok(Box::new(driver) as Box<dyn Driver>))
    }

    /// Connect to every backend libinsane supports on this platform,
    /// wrapped in its recommended workarounds and normalizers.
    ///
    /// The library's own log messages go to the sink of `config` from now
    /// on, for the whole process.
    #[cfg(feature = "libinsane")]
    pub fn safebet(config: ApiConfig) -> Result<Self> {
        crate::logging::set_library_sink(Some(config.shared_sink()));
        Self::connect(config, crate::ffi::LibInsane::safebet)
    }

    fn from_parts(driver: Box<dyn Driver>, config: ApiConfig) -> Self {
        config
            .sink()
            .log(LogLevel::Debug, &format!("connected to '{}'", driver.base_name()));
        Api {
            driver,
            config: Rc::new(config),
            cleaned: false,
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn base_name(&self) -> String {
        self.driver.base_name()
    }

    /// Every scanner the backend can see. No scanner is not an error.
    pub fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        self.list_devices_at(DeviceLocations::Any)
    }

    pub fn list_devices_at(&self, locations: DeviceLocations) -> Result<Vec<DeviceDescriptor>> {
        let devices = self
            .driver
            .list_devices(locations)
            .map_err(|code| Error::lis(code, "list_devices"))?;
        self.config.sink().log(
            LogLevel::Debug,
            &format!("{} device(s) found", devices.len()),
        );
        Ok(devices)
    }

    pub fn find_device(&self, dev_id: &str) -> Result<Option<DeviceDescriptor>> {
        Ok(self
            .list_devices()?
            .into_iter()
            .find(|dev| dev.dev_id == dev_id))
    }

    /// Open a scanner.
    pub fn get_device(&self, dev_id: &str) -> Result<Device<'_>> {
        self.open(dev_id, "get_device")
    }

    fn open(&self, dev_id: &str, operation: &'static str) -> Result<Device<'_>> {
        let handle = self
            .driver
            .get_device(dev_id)
            .map_err(|code| Error::lis(code, operation))?;
        self.config
            .sink()
            .log(LogLevel::Debug, &format!("device '{dev_id}' opened"));
        Ok(Device::new(dev_id, handle, Rc::clone(&self.config)))
    }

    /// Name and kind of every paper source of a device.
    ///
    /// The device is opened for the duration of the call and closed before
    /// returning, on success and on failure alike.
    pub fn list_sources(&self, dev_id: &str) -> Result<Vec<SourceInfo>> {
        let device = self.open(dev_id, "list_sources")?;
        let infos = device
            .handle()
            .get_children()
            .map(|children| {
                children
                    .iter()
                    .map(|child| SourceInfo {
                        name: child.name(),
                        kind: child.kind(),
                    })
                    .collect::<Vec<_>>()
            })
            .map_err(|code| Error::lis(code, "list_sources"));
        device.close();
        infos
    }

    /// Call `f` on each paper source until it returns `false`.
    ///
    /// With `existing` set, its sources are visited and the device stays
    /// open. Otherwise `dev_id` is opened for the visit and closed
    /// afterwards, including when `f` stops early or the sources cannot be
    /// fetched.
    pub fn iterate_sources<F>(
        &self,
        dev_id: &str,
        existing: Option<&Device<'_>>,
        f: F,
    ) -> Result<()>
    where
        F: FnMut(&Source<'_>) -> bool,
    {
        if let Some(device) = existing {
            return device.for_each_source(f);
        }
        let device = self.open(dev_id, "iterate_sources")?;
        let result = device.for_each_source(f);
        device.close();
        result
    }

    /// Release the backend. Dropping the `Api` does the same.
    pub fn cleanup(mut self) {
        self.cleanup_once();
    }

    fn cleanup_once(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;
        self.config.sink().log(LogLevel::Debug, "cleaning up");
        self.driver.cleanup();
    }
}

impl Drop for Api {
    fn drop(&mut self) {
        self.cleanup_once();
    }
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("base_name", &self.driver.base_name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ItemKind;
    use crate::mock::{MockDevice, MockItem, MockScanner};
    use crate::ErrorCode;

    fn two_devices() -> MockScanner {
        MockScanner::new()
            .device(
                MockDevice::new("mock:0")
                    .vendor("Brother")
                    .model("MFC-7360N")
                    .source(MockItem::flatbed("FlatBed"))
                    .source(MockItem::adf("Automatic Document Feeder(left aligned)")),
            )
            .device(MockDevice::new("mock:1").source(MockItem::flatbed("Flatbed")))
    }

    #[test]
    fn test_connect_failure_names_get_api() {
        let err = Api::connect(ApiConfig::new(), || Err(ErrorCode::AccessDenied)).unwrap_err();
        let text = err.to_string();
        let prefix = format!("Error {} in 'get_api' ", ErrorCode::AccessDenied.as_raw());
        assert!(text.starts_with(&prefix));
        assert_eq!(err.code(), Some(ErrorCode::AccessDenied));
    }

    #[test]
    fn test_connect_applies_environment_first() {
        let key = "LISRS_TEST_CONNECT_TOGGLE";
        let config = ApiConfig::new().env(key, "1");
        let mut seen = None;
        let _ = Api::connect(config, || {
            seen = std::env::var(key).ok();
            Err(ErrorCode::Unsupported)
        });
        assert_eq!(seen.as_deref(), Some("1"));
    }

    #[test]
    fn test_zero_devices_is_empty_not_error() {
        let api = Api::with_driver(MockScanner::new(), ApiConfig::new()).unwrap();
        assert!(api.list_devices().unwrap().is_empty());
        assert_eq!(api.find_device("mock:0").unwrap(), None);
    }

    #[test]
    fn test_list_devices_descriptors() {
        let api = Api::with_driver(two_devices(), ApiConfig::new()).unwrap();
        let devices = api.list_devices().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].vendor, "Brother");
        assert_eq!(devices[0].model, "MFC-7360N");
        assert_eq!(api.find_device("mock:1").unwrap().unwrap().dev_id, "mock:1");
    }

    #[test]
    fn test_list_devices_failure() {
        let mock = two_devices();
        mock.fail_list_devices(ErrorCode::IoError);
        let api = Api::with_driver(mock, ApiConfig::new()).unwrap();
        let err = api.list_devices().unwrap_err();
        assert!(err.to_string().contains("in 'list_devices'"));
    }

    #[test]
    fn test_unknown_device() {
        let api = Api::with_driver(two_devices(), ApiConfig::new()).unwrap();
        let err = api.get_device("mock:9").unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidValue));
        assert!(err.to_string().contains("'get_device'"));
    }

    #[test]
    fn test_list_sources_closes_device() {
        let mock = two_devices();
        let api = Api::with_driver(mock.clone(), ApiConfig::new()).unwrap();
        let sources = api.list_sources("mock:0").unwrap();
        assert_eq!(
            sources,
            [
                SourceInfo {
                    name: "FlatBed".into(),
                    kind: ItemKind::Flatbed
                },
                SourceInfo {
                    name: "Automatic Document Feeder(left aligned)".into(),
                    kind: ItemKind::Adf
                },
            ]
        );
        assert_eq!(mock.open_count(), 1);
        assert_eq!(mock.close_count(), 1);
    }

    #[test]
    fn test_list_sources_closes_device_when_children_fail() {
        let mock = MockScanner::new()
            .device(MockDevice::new("mock:0").children_error(ErrorCode::DeviceBusy));
        let api = Api::with_driver(mock.clone(), ApiConfig::new()).unwrap();
        let err = api.list_sources("mock:0").unwrap_err();
        assert!(err.to_string().contains("'list_sources'"));
        assert_eq!(mock.close_count(), 1);
    }

    #[test]
    fn test_iterate_sources_closes_only_what_it_opened() {
        let mock = two_devices();
        let api = Api::with_driver(mock.clone(), ApiConfig::new()).unwrap();

        let mut count = 0;
        api.iterate_sources("mock:0", None, |_| {
            count += 1;
            false
        })
        .unwrap();
        assert_eq!(count, 1);
        assert_eq!(mock.close_count(), 1);

        let device = api.get_device("mock:0").unwrap();
        let mut names = Vec::new();
        api.iterate_sources("ignored", Some(&device), |s| {
            names.push(s.name());
            true
        })
        .unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(mock.close_count(), 1);
        drop(device);
        assert_eq!(mock.close_count(), 2);
    }

    #[test]
    fn test_iterate_sources_failure_closes_resolved_device() {
        let mock = MockScanner::new()
            .device(MockDevice::new("mock:0").children_error(ErrorCode::IoError));
        let api = Api::with_driver(mock.clone(), ApiConfig::new()).unwrap();
        let err = api.iterate_sources("mock:0", None, |_| true).unwrap_err();
        assert!(err.to_string().contains("'iterate_sources'"));
        assert_eq!(mock.close_count(), 1);

        let err = api.iterate_sources("nope", None, |_| true).unwrap_err();
        assert!(err.to_string().contains("'iterate_sources'"));
        assert_eq!(mock.open_count(), 1);
    }

    #[test]
    fn test_cleanup_runs_once() {
        let mock = two_devices();
        Api::with_driver(mock.clone(), ApiConfig::new()).unwrap().cleanup();
        assert_eq!(mock.cleanup_count(), 1);

        drop(Api::with_driver(mock.clone(), ApiConfig::new()).unwrap());
        assert_eq!(mock.cleanup_count(), 2);
    }
}
