//! Items: scanners and their paper sources

use crate::config::ApiConfig;
use crate::device::{ItemKind, SourceInfo};
use crate::driver::ItemHandle;
use crate::logging::LogLevel;
use crate::option::{OptionDescriptor, Options};
use crate::session::ScanSession;
use crate::{Error, Result};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

/// A scanner or one of its paper sources (`struct lis_item`).
///
/// An `Item` never closes its handle: the root item is owned and closed
/// by a [`Device`](crate::Device), children are released with it.
pub struct Item<'a> {
    handle: Box<dyn ItemHandle>,
    config: Rc<ApiConfig>,
    _parent: PhantomData<&'a ()>,
}

/// A paper source (flatbed, automatic document feeder, ...) of a device.
pub type Source<'dev> = Item<'dev>;

impl<'a> Item<'a> {
    pub(crate) fn new(handle: Box<dyn ItemHandle>, config: Rc<ApiConfig>) -> Self {
        Item {
            handle,
            config,
            _parent: PhantomData,
        }
    }

    pub(crate) fn handle(&self) -> &dyn ItemHandle {
        self.handle.as_ref()
    }

    pub(crate) fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn name(&self) -> String {
        self.handle.name()
    }

    pub fn kind(&self) -> ItemKind {
        self.handle.kind()
    }

    pub fn info(&self) -> SourceInfo {
        SourceInfo {
            name: self.name(),
            kind: self.kind(),
        }
    }

    /// Children of this item, in the order the backend reports them.
    pub fn sources(&self) -> Result<Sources<'_>> {
        let children = self
            .handle
            .get_children()
            .map_err(|code| Error::lis(code, "iterate_sources"))?;
        Ok(Sources {
            children: children.into_iter(),
            config: Rc::clone(&self.config),
            _parent: PhantomData,
        })
    }

    /// Call `f` on each child until it returns `false`.
    pub fn for_each_source<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&Source<'_>) -> bool,
    {
        for source in self.sources()? {
            if !f(&source) {
                break;
            }
        }
        Ok(())
    }

    /// The first child called `name`, if any.
    pub fn source(&self, name: &str) -> Result<Option<Source<'_>>> {
        Ok(self.sources()?.find(|source| source.name() == name))
    }

    /// Options of this item. Nothing is closed when the iterator is
    /// dropped.
    pub fn options(&self) -> Result<Options<'_>> {
        let handles = self
            .handle
            .get_options()
            .map_err(|code| Error::lis(code, "iterate_options"))?;
        Ok(Options::new(handles, Rc::clone(&self.config)))
    }

    /// Call `f` on each option until it returns `false`.
    pub fn for_each_option<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&OptionDescriptor<'_>) -> bool,
    {
        for option in self.options()? {
            if !f(&option) {
                break;
            }
        }
        Ok(())
    }

    pub fn option(&self, name: &str) -> Result<OptionDescriptor<'_>> {
        self.options()?
            .find(|opt| opt.name() == name)
            .ok_or_else(|| Error::OptionNotFound(name.to_string()))
    }

    /// Set an option from its text form; the backend converts it to the
    /// option's declared type.
    pub fn set_option(&self, name: &str, value: &str) -> Result<()> {
        self.config
            .sink()
            .log(LogLevel::Debug, &format!("setting option {name}={value}"));
        self.handle
            .set_option(name, value)
            .map_err(|code| Error::lis(code, "set_option"))
    }

    pub fn scan_start(&self) -> Result<ScanSession<'_>> {
        let session = self
            .handle
            .scan_start()
            .map_err(|code| Error::lis(code, "scan_start"))?;
        Ok(ScanSession::new(session, Rc::clone(&self.config)))
    }
}

impl fmt::Debug for Item<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

/// Children of an item, produced lazily. Cannot be restarted.
pub struct Sources<'a> {
    children: std::vec::IntoIter<Box<dyn ItemHandle>>,
    config: Rc<ApiConfig>,
    _parent: PhantomData<&'a ()>,
}

impl<'a> Iterator for Sources<'a> {
    type Item = Source<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.children
            .next()
            .map(|handle| Item::new(handle, Rc::clone(&self.config)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.children.size_hint()
    }
}

impl ExactSizeIterator for Sources<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, MockItem, MockOption, MockScanner};
    use crate::value::Value;
    use crate::{Api, ErrorCode};

    fn scanner() -> MockScanner {
        MockScanner::new().device(
            MockDevice::new("mock:0")
                .source(
                    MockItem::flatbed("Flatbed")
                        .option(MockOption::integer("resolution", 150).range(75, 600, 75))
                        .option(MockOption::string("mode", "Color").list(&["Color", "Gray"])),
                )
                .source(MockItem::adf("Automatic Document Feeder"))
                .source(MockItem::adf("Duplex")),
        )
    }

    #[test]
    fn test_sources_in_order() {
        let api = Api::with_driver(scanner(), ApiConfig::new()).unwrap();
        let device = api.get_device("mock:0").unwrap();
        let infos: Vec<SourceInfo> = device.sources().unwrap().map(|s| s.info()).collect();
        assert_eq!(infos.len(), 3);
        assert_eq!(infos[0].name, "Flatbed");
        assert_eq!(infos[0].kind, ItemKind::Flatbed);
        assert_eq!(infos[2].name, "Duplex");
    }

    #[test]
    fn test_for_each_source_stops() {
        let api = Api::with_driver(scanner(), ApiConfig::new()).unwrap();
        let device = api.get_device("mock:0").unwrap();
        let mut seen = Vec::new();
        device
            .for_each_source(|s| {
                seen.push(s.name());
                seen.len() < 2
            })
            .unwrap();
        assert_eq!(seen, ["Flatbed", "Automatic Document Feeder"]);
    }

    #[test]
    fn test_source_by_name() {
        let api = Api::with_driver(scanner(), ApiConfig::new()).unwrap();
        let device = api.get_device("mock:0").unwrap();
        assert_eq!(device.source("Duplex").unwrap().unwrap().kind(), ItemKind::Adf);
        assert!(device.source("Transparency").unwrap().is_none());
    }

    #[test]
    fn test_set_option_is_coerced_and_read_back() {
        let api = Api::with_driver(scanner(), ApiConfig::new()).unwrap();
        let device = api.get_device("mock:0").unwrap();
        let flatbed = device.source("Flatbed").unwrap().unwrap();

        flatbed.set_option("resolution", "300").unwrap();
        flatbed.set_option("mode", "Gray").unwrap();
        assert_eq!(
            flatbed.option("resolution").unwrap().get_value().unwrap(),
            Value::Integer(300)
        );
        assert_eq!(
            flatbed.option("mode").unwrap().get_value().unwrap(),
            Value::String("Gray".into())
        );
    }

    #[test]
    fn test_set_option_rejects_bad_values() {
        let api = Api::with_driver(scanner(), ApiConfig::new()).unwrap();
        let device = api.get_device("mock:0").unwrap();
        let flatbed = device.source("Flatbed").unwrap().unwrap();

        for (name, value) in [("resolution", "abc"), ("resolution", "310"), ("mode", "Sepia")] {
            let err = flatbed.set_option(name, value).unwrap_err();
            assert_eq!(err.code(), Some(ErrorCode::InvalidValue), "{name}={value}");
            assert!(err.to_string().contains("'set_option'"));
        }
        assert!(matches!(
            flatbed.option("contrast"),
            Err(Error::OptionNotFound(_))
        ));
    }

    #[test]
    fn test_scan_start_failure() {
        let mock = MockScanner::new().device(
            MockDevice::new("mock:0")
                .source(MockItem::adf("Feeder").start_error(ErrorCode::NoDocs)),
        );
        let api = Api::with_driver(mock, ApiConfig::new()).unwrap();
        let device = api.get_device("mock:0").unwrap();
        let feeder = device.source("Feeder").unwrap().unwrap();
        let err = feeder.scan_start().unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NoDocs));
        assert!(err.to_string().contains("'scan_start'"));
    }
}
