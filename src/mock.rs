//! In-memory scanner backend
//!
//! [`MockScanner`] implements [`Driver`] over a scripted set of devices.
//! Everything a real scanner can do to a caller is available: option
//! tables with constraints, injected errors, warm-up delays, multi-page
//! feeds. A journal of opened, closed and misused handles makes ownership
//! rules checkable from tests.
//!
//! ```
//! use lisrs::mock::{MockDevice, MockItem, MockOption, MockScanner};
//! use lisrs::{Api, ApiConfig, Value};
//!
//! let scanner = MockScanner::new().device(
//!     MockDevice::new("mock:0").source(
//!         MockItem::flatbed("Flatbed").option(MockOption::integer("resolution", 150)),
//!     ),
//! );
//! let api = Api::with_driver(scanner.clone(), ApiConfig::new())?;
//! {
//!     let device = api.get_device("mock:0")?;
//!     let flatbed = device.source("Flatbed")?.expect("flatbed");
//!     flatbed.set_option("resolution", "300")?;
//!     assert_eq!(flatbed.option("resolution")?.get_value()?, Value::Integer(300));
//! }
//! assert_eq!(scanner.close_count(), 1);
//! # Ok::<(), lisrs::Error>(())
//! ```

use crate::config::Sleeper;
use crate::device::{DeviceDescriptor, DeviceLocations, ItemKind};
use crate::driver::{Driver, DriverResult, ItemHandle, OptionHandle, SessionHandle};
use crate::logging::{self, LogLevel, LogSink};
use crate::option::{Capabilities, Constraint, OptionInfo, SetFlags, ValueRange};
use crate::session::ScanParameters;
use crate::value::{ImageFormat, Unit, Value};
use crate::ErrorCode;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Mutex;
use std::time::Duration;

/// Default number of bytes a mock session hands out per read.
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Counters of what callers did with the mock's handles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Journal {
    /// Devices successfully opened.
    pub opened: usize,
    /// Devices closed.
    pub closed: usize,
    /// Close calls on an already closed device.
    pub double_closes: usize,
    /// Close calls on child items, which must never be closed.
    pub source_closes: usize,
    /// Calls on a handle whose device was already closed.
    pub uses_after_close: usize,
    pub cleanups: usize,
    pub cancels: usize,
    pub reads: usize,
}

#[derive(Default)]
struct State {
    devices: Vec<Rc<DeviceNode>>,
    list_error: Option<ErrorCode>,
    journal: Journal,
}

struct DeviceNode {
    descriptor: DeviceDescriptor,
    root: Rc<ItemNode>,
}

struct ItemNode {
    name: String,
    kind: ItemKind,
    options: RefCell<Vec<MockOption>>,
    children: Vec<Rc<ItemNode>>,
    options_error: Option<ErrorCode>,
    children_error: Option<ErrorCode>,
    start_error: Option<ErrorCode>,
    read_error: Option<ErrorCode>,
    warm_ups: usize,
    pages: Vec<Vec<u8>>,
    params: Option<ScanParameters>,
    chunk_size: usize,
}

/// A scripted scanner backend. Clones share the same state.
#[derive(Clone, Default)]
pub struct MockScanner {
    state: Rc<RefCell<State>>,
}

impl MockScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(self, device: MockDevice) -> Self {
        let node = DeviceNode {
            descriptor: DeviceDescriptor {
                dev_id: device.id,
                vendor: device.vendor,
                model: device.model,
                type_: device.type_,
            },
            root: Rc::new(device.root.build()),
        };
        self.state.borrow_mut().devices.push(Rc::new(node));
        self
    }

    /// Make every following `list_devices` call fail with `code`.
    pub fn fail_list_devices(&self, code: ErrorCode) {
        self.state.borrow_mut().list_error = Some(code);
    }

    pub fn journal(&self) -> Journal {
        self.state.borrow().journal
    }

    pub fn open_count(&self) -> usize {
        self.journal().opened
    }

    pub fn close_count(&self) -> usize {
        self.journal().closed
    }

    pub fn double_closes(&self) -> usize {
        self.journal().double_closes
    }

    pub fn source_closes(&self) -> usize {
        self.journal().source_closes
    }

    pub fn cleanup_count(&self) -> usize {
        self.journal().cleanups
    }

    pub fn cancel_count(&self) -> usize {
        self.journal().cancels
    }

    pub fn read_calls(&self) -> usize {
        self.journal().reads
    }

    /// A flatbed and a feeder with a few pages, for trying tools out
    /// without hardware.
    pub fn demo() -> Self {
        let (width, height) = (120, 170);
        let page = |shade: u8| {
            gray_bmp(width, height, |x, y| {
                shade.wrapping_add(((x + y) % 64) as u8)
            })
        };
        let params = ScanParameters {
            format: ImageFormat::Bmp,
            width,
            height,
            image_size: 0,
        };
        let options = || {
            vec![
                MockOption::integer("resolution", 150)
                    .title("Scan resolution")
                    .desc("Sets the resolution of the scanned image.")
                    .unit(Unit::Dpi)
                    .range(75, 600, 75),
                MockOption::string("mode", "Gray")
                    .title("Scan mode")
                    .desc("Selects the scan mode (e.g., lineart, monochrome, or color).")
                    .list(&["Color", "Gray", "Lineart"]),
                MockOption::double("br-x", 215.9)
                    .title("Bottom-right x")
                    .desc("Bottom-right x position of scan area.")
                    .unit(Unit::Mm)
                    .double_range(0.0, 215.9, 0.0),
                MockOption::boolean("preview", false).title("Preview"),
                MockOption::integer("lamp-warmup", 0)
                    .unit(Unit::Microsecond)
                    .capabilities(Capabilities::AUTOMATIC | Capabilities::INACTIVE),
            ]
        };
        let mut flatbed = MockItem::flatbed("Flatbed")
            .params(params)
            .page(page(96));
        let mut feeder = MockItem::adf("Automatic Document Feeder").params(params);
        for option in options() {
            flatbed = flatbed.option(option.clone());
            feeder = feeder.option(option);
        }
        for shade in [0, 64, 128] {
            feeder = feeder.page(page(shade));
        }
        MockScanner::new().device(
            MockDevice::new("mock:demo")
                .vendor("Lisrs")
                .model("Demo Scanner")
                .type_("flatbed scanner")
                .source(flatbed)
                .source(feeder),
        )
    }
}

impl Driver for MockScanner {
    fn base_name(&self) -> String {
        "mock".to_string()
    }

    fn list_devices(&self, _locations: DeviceLocations) -> DriverResult<Vec<DeviceDescriptor>> {
        let state = self.state.borrow();
        if let Some(code) = state.list_error {
            return Err(code);
        }
        Ok(state
            .devices
            .iter()
            .map(|dev| dev.descriptor.clone())
            .collect())
    }

    fn get_device(&self, dev_id: &str) -> DriverResult<Box<dyn ItemHandle>> {
        let mut state = self.state.borrow_mut();
        let node = state
            .devices
            .iter()
            .find(|dev| dev.descriptor.dev_id == dev_id)
            .map(|dev| Rc::clone(&dev.root))
            .ok_or(ErrorCode::InvalidValue)?;
        state.journal.opened += 1;
        logging::library_message(LogLevel::Debug, &format!("mock: opening '{dev_id}'"));
        Ok(Box::new(MockItemHandle {
            state: Rc::clone(&self.state),
            node,
            open: Rc::new(Cell::new(true)),
            is_root: true,
        }))
    }

    fn cleanup(&self) {
        self.state.borrow_mut().journal.cleanups += 1;
    }
}

/// Builder for a scanner.
#[derive(Debug, Clone)]
pub struct MockDevice {
    id: String,
    vendor: String,
    model: String,
    type_: String,
    root: MockItem,
}

impl MockDevice {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        MockDevice {
            root: MockItem::new(id.clone(), ItemKind::Device),
            id,
            vendor: "Mock".to_string(),
            model: "Scanner".to_string(),
            type_: String::new(),
        }
    }

    pub fn vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn type_(mut self, type_: impl Into<String>) -> Self {
        self.type_ = type_.into();
        self
    }

    pub fn source(mut self, source: MockItem) -> Self {
        self.root = self.root.source(source);
        self
    }

    pub fn option(mut self, option: MockOption) -> Self {
        self.root = self.root.option(option);
        self
    }

    pub fn options_error(mut self, code: ErrorCode) -> Self {
        self.root = self.root.options_error(code);
        self
    }

    pub fn children_error(mut self, code: ErrorCode) -> Self {
        self.root = self.root.children_error(code);
        self
    }
}

/// Builder for an item: a paper source, or the root of a [`MockDevice`].
#[derive(Debug, Clone)]
pub struct MockItem {
    name: String,
    kind: ItemKind,
    options: Vec<MockOption>,
    children: Vec<MockItem>,
    options_error: Option<ErrorCode>,
    children_error: Option<ErrorCode>,
    start_error: Option<ErrorCode>,
    read_error: Option<ErrorCode>,
    warm_ups: usize,
    pages: Vec<Vec<u8>>,
    params: Option<ScanParameters>,
    chunk_size: usize,
}

impl MockItem {
    pub fn new(name: impl Into<String>, kind: ItemKind) -> Self {
        MockItem {
            name: name.into(),
            kind,
            options: Vec::new(),
            children: Vec::new(),
            options_error: None,
            children_error: None,
            start_error: None,
            read_error: None,
            warm_ups: 0,
            pages: Vec::new(),
            params: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn flatbed(name: impl Into<String>) -> Self {
        Self::new(name, ItemKind::Flatbed)
    }

    pub fn adf(name: impl Into<String>) -> Self {
        Self::new(name, ItemKind::Adf)
    }

    pub fn source(mut self, child: MockItem) -> Self {
        self.children.push(child);
        self
    }

    pub fn option(mut self, option: MockOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn options_error(mut self, code: ErrorCode) -> Self {
        self.options_error = Some(code);
        self
    }

    pub fn children_error(mut self, code: ErrorCode) -> Self {
        self.children_error = Some(code);
        self
    }

    pub fn start_error(mut self, code: ErrorCode) -> Self {
        self.start_error = Some(code);
        self
    }

    /// Every read fails with `code` once the warm-ups are over.
    pub fn read_error(mut self, code: ErrorCode) -> Self {
        self.read_error = Some(code);
        self
    }

    /// Answer the first `count` reads of each session with `WarmingUp`.
    pub fn warm_ups(mut self, count: usize) -> Self {
        self.warm_ups = count;
        self
    }

    /// Append a page to the feed.
    pub fn page(mut self, data: Vec<u8>) -> Self {
        self.pages.push(data);
        self
    }

    /// Parameters reported for every page. When unset, pages are reported
    /// as BMP data of unknown dimensions.
    pub fn params(mut self, params: ScanParameters) -> Self {
        self.params = Some(params);
        self
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    fn build(self) -> ItemNode {
        ItemNode {
            name: self.name,
            kind: self.kind,
            options: RefCell::new(self.options),
            children: self
                .children
                .into_iter()
                .map(|child| Rc::new(child.build()))
                .collect(),
            options_error: self.options_error,
            children_error: self.children_error,
            start_error: self.start_error,
            read_error: self.read_error,
            warm_ups: self.warm_ups,
            pages: self.pages,
            params: self.params,
            chunk_size: self.chunk_size,
        }
    }
}

/// Builder for an option.
#[derive(Debug, Clone)]
pub struct MockOption {
    info: OptionInfo,
    value: Value,
    get_error: Option<ErrorCode>,
}

impl MockOption {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        MockOption {
            info: OptionInfo::new(name, value.value_type()),
            value,
            get_error: None,
        }
    }

    pub fn integer(name: impl Into<String>, value: i32) -> Self {
        Self::new(name, Value::Integer(value))
    }

    pub fn double(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, Value::Double(value))
    }

    pub fn boolean(name: impl Into<String>, value: bool) -> Self {
        Self::new(name, Value::Bool(value))
    }

    pub fn string(name: impl Into<String>, value: &str) -> Self {
        Self::new(name, Value::String(value.to_string()))
    }

    pub fn title(mut self, title: &str) -> Self {
        self.info.title = title.to_string();
        self
    }

    pub fn desc(mut self, desc: &str) -> Self {
        self.info.desc = desc.to_string();
        self
    }

    pub fn unit(mut self, unit: Unit) -> Self {
        self.info.unit = unit;
        self
    }

    pub fn capabilities(mut self, caps: Capabilities) -> Self {
        self.info.capabilities = caps;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.info.capabilities |= Capabilities::INACTIVE;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.info.capabilities.remove(Capabilities::SW_SELECT);
        self
    }

    pub fn range(mut self, min: i32, max: i32, interval: i32) -> Self {
        self.info.constraint = Constraint::Range(ValueRange {
            min: Value::Integer(min),
            max: Value::Integer(max),
            interval: Value::Integer(interval),
        });
        self
    }

    pub fn double_range(mut self, min: f64, max: f64, interval: f64) -> Self {
        self.info.constraint = Constraint::Range(ValueRange {
            min: Value::Double(min),
            max: Value::Double(max),
            interval: Value::Double(interval),
        });
        self
    }

    pub fn list(mut self, values: &[&str]) -> Self {
        self.info.constraint =
            Constraint::List(values.iter().map(|v| Value::String(v.to_string())).collect());
        self
    }

    pub fn values(mut self, values: Vec<Value>) -> Self {
        self.info.constraint = Constraint::List(values);
        self
    }

    /// Make `get_value` fail with `code`.
    pub fn get_error(mut self, code: ErrorCode) -> Self {
        self.get_error = Some(code);
        self
    }

    fn assign(&mut self, value: Value) -> DriverResult<()> {
        if !self.info.is_writable() {
            return Err(ErrorCode::Unsupported);
        }
        if value.value_type() != self.info.value_type || !self.info.constraint.allows(&value) {
            return Err(ErrorCode::InvalidValue);
        }
        self.value = value;
        Ok(())
    }
}

struct MockItemHandle {
    state: Rc<RefCell<State>>,
    node: Rc<ItemNode>,
    open: Rc<Cell<bool>>,
    is_root: bool,
}

impl MockItemHandle {
    fn check_open(&self) -> DriverResult<()> {
        check_open(&self.state, &self.open)
    }
}

fn check_open(state: &RefCell<State>, open: &Cell<bool>) -> DriverResult<()> {
    if open.get() {
        Ok(())
    } else {
        state.borrow_mut().journal.uses_after_close += 1;
        Err(ErrorCode::Impossible)
    }
}

impl ItemHandle for MockItemHandle {
    fn name(&self) -> String {
        self.node.name.clone()
    }

    fn kind(&self) -> ItemKind {
        self.node.kind
    }

    fn get_children(&self) -> DriverResult<Vec<Box<dyn ItemHandle>>> {
        self.check_open()?;
        if let Some(code) = self.node.children_error {
            return Err(code);
        }
        Ok(self
            .node
            .children
            .iter()
            .map(|child| {
                Box::new(MockItemHandle {
                    state: Rc::clone(&self.state),
                    node: Rc::clone(child),
                    open: Rc::clone(&self.open),
                    is_root: false,
                }) as Box<dyn ItemHandle>
            })
            .collect())
    }

    fn get_options(&self) -> DriverResult<Vec<Box<dyn OptionHandle>>> {
        self.check_open()?;
        if let Some(code) = self.node.options_error {
            return Err(code);
        }
        let count = self.node.options.borrow().len();
        Ok((0..count)
            .map(|index| {
                Box::new(MockOptionHandle {
                    state: Rc::clone(&self.state),
                    node: Rc::clone(&self.node),
                    open: Rc::clone(&self.open),
                    index,
                }) as Box<dyn OptionHandle>
            })
            .collect())
    }

    fn set_option(&self, name: &str, value: &str) -> DriverResult<()> {
        self.check_open()?;
        let mut options = self.node.options.borrow_mut();
        let option = options
            .iter_mut()
            .find(|opt| opt.info.name == name)
            .ok_or(ErrorCode::InvalidValue)?;
        let parsed =
            Value::parse(option.info.value_type, value).map_err(|_| ErrorCode::InvalidValue)?;
        option.assign(parsed)?;
        logging::library_message(
            LogLevel::Debug,
            &format!("mock: {}: {name}={value}", self.node.name),
        );
        Ok(())
    }

    fn scan_start(&self) -> DriverResult<Box<dyn SessionHandle>> {
        self.check_open()?;
        if let Some(code) = self.node.start_error {
            return Err(code);
        }
        Ok(Box::new(MockSession {
            state: Rc::clone(&self.state),
            node: Rc::clone(&self.node),
            warm_ups: self.node.warm_ups,
            page: 0,
            offset: 0,
            page_done: false,
            cancelled: false,
        }))
    }

    fn close(&self) {
        let mut state = self.state.borrow_mut();
        if !self.is_root {
            state.journal.source_closes += 1;
        } else if self.open.replace(false) {
            state.journal.closed += 1;
        } else {
            state.journal.double_closes += 1;
        }
    }
}

struct MockOptionHandle {
    state: Rc<RefCell<State>>,
    node: Rc<ItemNode>,
    open: Rc<Cell<bool>>,
    index: usize,
}

impl OptionHandle for MockOptionHandle {
    fn info(&self) -> OptionInfo {
        self.node.options.borrow()[self.index].info.clone()
    }

    fn get_value(&self) -> DriverResult<Value> {
        check_open(&self.state, &self.open)?;
        let options = self.node.options.borrow();
        let option = &options[self.index];
        match option.get_error {
            Some(code) => Err(code),
            None => Ok(option.value.clone()),
        }
    }

    fn set_value(&self, value: &Value) -> DriverResult<SetFlags> {
        check_open(&self.state, &self.open)?;
        self.node.options.borrow_mut()[self.index].assign(value.clone())?;
        Ok(SetFlags::empty())
    }
}

struct MockSession {
    state: Rc<RefCell<State>>,
    node: Rc<ItemNode>,
    warm_ups: usize,
    page: usize,
    offset: usize,
    page_done: bool,
    cancelled: bool,
}

impl SessionHandle for MockSession {
    fn get_scan_parameters(&mut self) -> DriverResult<ScanParameters> {
        let size = self.node.pages.get(self.page).map_or(0, Vec::len);
        Ok(self.node.params.unwrap_or(ScanParameters {
            format: ImageFormat::Bmp,
            width: 0,
            height: 0,
            image_size: size,
        }))
    }

    fn end_of_feed(&mut self) -> bool {
        let pages = self.node.pages.len();
        self.cancelled || self.page >= pages || (self.page_done && self.page + 1 >= pages)
    }

    fn end_of_page(&mut self) -> bool {
        self.cancelled || self.page_done || self.page >= self.node.pages.len()
    }

    fn scan_read(&mut self, buf: &mut [u8]) -> DriverResult<usize> {
        self.state.borrow_mut().journal.reads += 1;
        if self.cancelled {
            return Err(ErrorCode::Cancelled);
        }
        if self.warm_ups > 0 {
            self.warm_ups -= 1;
            return Err(ErrorCode::WarmingUp);
        }
        if let Some(code) = self.node.read_error {
            return Err(code);
        }
        if self.page_done {
            self.page += 1;
            self.offset = 0;
            self.page_done = false;
        }
        let data = self.node.pages.get(self.page).ok_or(ErrorCode::NoDocs)?;
        let n = buf
            .len()
            .min(self.node.chunk_size)
            .min(data.len() - self.offset);
        buf[..n].copy_from_slice(&data[self.offset..self.offset + n]);
        self.offset += n;
        if self.offset == data.len() {
            self.page_done = true;
        }
        Ok(n)
    }

    fn cancel(&mut self) {
        self.cancelled = true;
        self.state.borrow_mut().journal.cancels += 1;
    }
}

/// Encode an 8-bit grayscale bottom-up BMP, the layout scanners produce
/// when raw normalization is off.
pub fn gray_bmp<F>(width: u32, height: u32, pixel: F) -> Vec<u8>
where
    F: Fn(u32, u32) -> u8,
{
    let palette_size = 256 * 4;
    let offset = crate::bmp::HEADER_SIZE + palette_size;
    let stride = (width as usize).div_ceil(4) * 4;
    let data_size = stride * height as usize;

    let mut out = Vec::with_capacity(offset + data_size);
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&((offset + data_size) as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(offset as u32).to_le_bytes());
    out.extend_from_slice(&40u32.to_le_bytes());
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&8u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(data_size as u32).to_le_bytes());
    out.extend_from_slice(&2835u32.to_le_bytes());
    out.extend_from_slice(&2835u32.to_le_bytes());
    out.extend_from_slice(&256u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    for level in 0..=255u8 {
        out.extend_from_slice(&[level, level, level, 0]);
    }
    for y in (0..height).rev() {
        let start = out.len();
        out.extend((0..width).map(|x| pixel(x, y)));
        out.resize(start + stride, 0);
    }
    out
}

/// [`LogSink`] that keeps every message.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<(LogLevel, String)> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.messages().iter().filter(|(l, _)| *l == level).count()
    }
}

impl LogSink for RecordingSink {
    fn log(&self, level: LogLevel, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((level, message.to_string()));
        }
    }
}

/// [`Sleeper`] that records the requested pauses and returns at once.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    durations: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn calls(&self) -> usize {
        self.durations().len()
    }

    pub fn durations(&self) -> Vec<Duration> {
        self.durations
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut durations) = self.durations.lock() {
            durations.push(duration);
        }
    }
}
