//! Scan option descriptors

use crate::config::ApiConfig;
use crate::driver::OptionHandle;
use crate::logging::LogLevel;
use crate::value::{Unit, Value, ValueType};
use crate::{Error, Result};
use std::fmt::{self, Display};
use std::marker::PhantomData;
use std::rc::Rc;

bitflags::bitflags! {
    /// Option capabilities (`LIS_CAP_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u32 {
        /// Emulated by libinsane or by the backend.
        const EMULATED = 1 << 0;
        /// Can be set automatically by the driver.
        const AUTOMATIC = 1 << 1;
        /// Can be set by a hardware switch.
        const HW_SELECT = 1 << 2;
        /// Read/write; can be set by software.
        const SW_SELECT = 1 << 3;
        /// Requires another option to be set to a specific value first.
        const INACTIVE = 1 << 4;
    }
}

bitflags::bitflags! {
    /// Side effects reported after setting an option (`LIS_SET_FLAG_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SetFlags: u32 {
        /// The value was rounded to the closest supported one.
        const INEXACT = 1 << 0;
        const MUST_RELOAD_OPTIONS = 1 << 1;
        const MUST_RELOAD_PARAMS = 1 << 2;
    }
}

/// Range of accepted numeric values.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    pub min: Value,
    pub max: Value,
    pub interval: Value,
}

/// Restriction on the values an option accepts.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Constraint {
    #[default]
    None,
    Range(ValueRange),
    List(Vec<Value>),
}

impl Constraint {
    /// Raw `enum lis_constraint_type` value.
    pub fn kind(&self) -> i32 {
        match self {
            Constraint::None => 0,
            Constraint::Range(_) => 1,
            Constraint::List(_) => 2,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Constraint::None => "None",
            Constraint::Range(_) => "Range",
            Constraint::List(_) => "List",
        }
    }

    /// Whether `value` satisfies the constraint.
    pub fn allows(&self, value: &Value) -> bool {
        match self {
            Constraint::None => true,
            Constraint::List(values) => values.contains(value),
            Constraint::Range(range) => {
                let (Some(v), Some(min), Some(max)) =
                    (value.as_f64(), range.min.as_f64(), range.max.as_f64())
                else {
                    return false;
                };
                if v < min || v > max {
                    return false;
                }
                match (value, &range.min, &range.interval) {
                    (Value::Integer(v), Value::Integer(min), Value::Integer(step)) if *step > 1 => {
                        (i64::from(*v) - i64::from(*min)) % i64::from(*step) == 0
                    }
                    _ => true,
                }
            }
        }
    }
}

impl Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::None => f.write_str("None"),
            Constraint::Range(r) => write!(
                f,
                "Range (min: {}, max: {}, interval: {})",
                r.min, r.max, r.interval
            ),
            Constraint::List(values) if values.is_empty() => f.write_str("List"),
            Constraint::List(values) => {
                let joined: Vec<String> = values.iter().map(Value::to_string).collect();
                write!(f, "List ({})", joined.join(","))
            }
        }
    }
}

/// Static description of an option, copied out of the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionInfo {
    /// Identifier (ex: "source", "resolution").
    pub name: String,
    /// Human readable title, usually in English.
    pub title: String,
    /// Human readable description, usually in English.
    pub desc: String,
    pub capabilities: Capabilities,
    pub value_type: ValueType,
    /// Only meaningful for integers and doubles.
    pub unit: Unit,
    pub constraint: Constraint,
}

impl OptionInfo {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        OptionInfo {
            name: name.into(),
            title: String::new(),
            desc: String::new(),
            capabilities: Capabilities::SW_SELECT,
            value_type,
            unit: Unit::None,
            constraint: Constraint::None,
        }
    }

    pub fn is_readable(&self) -> bool {
        !self.capabilities.contains(Capabilities::INACTIVE)
    }

    pub fn is_writable(&self) -> bool {
        self.capabilities.contains(Capabilities::SW_SELECT)
    }
}

/// An option of an open item.
///
/// Borrows the item it came from: descriptors are only valid while the
/// item is open.
pub struct OptionDescriptor<'item> {
    handle: Box<dyn OptionHandle>,
    info: OptionInfo,
    config: Rc<ApiConfig>,
    _item: PhantomData<&'item ()>,
}

impl<'item> OptionDescriptor<'item> {
    pub(crate) fn new(handle: Box<dyn OptionHandle>, config: Rc<ApiConfig>) -> Self {
        let info = handle.info();
        OptionDescriptor {
            handle,
            info,
            config,
            _item: PhantomData,
        }
    }

    pub fn info(&self) -> &OptionInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn title(&self) -> &str {
        &self.info.title
    }

    pub fn desc(&self) -> &str {
        &self.info.desc
    }

    pub fn capabilities(&self) -> Capabilities {
        self.info.capabilities
    }

    pub fn value_type(&self) -> ValueType {
        self.info.value_type
    }

    pub fn unit(&self) -> Unit {
        self.info.unit
    }

    pub fn constraint(&self) -> &Constraint {
        &self.info.constraint
    }

    pub fn is_readable(&self) -> bool {
        self.info.is_readable()
    }

    pub fn is_writable(&self) -> bool {
        self.info.is_writable()
    }

    /// Read the current value.
    ///
    /// The returned value is owned by the caller; nothing is retained by the
    /// adapter on either path.
    pub fn get_value(&self) -> Result<Value> {
        if !self.is_readable() {
            return Err(Error::OptionNotReadable(self.info.name.clone()));
        }
        self.handle
            .get_value()
            .map_err(|code| Error::lis(code, "get_value"))
    }

    pub fn set_value(&self, value: &Value) -> Result<SetFlags> {
        let flags = self
            .handle
            .set_value(value)
            .map_err(|code| Error::lis(code, "set_value"))?;
        self.config.sink().log(
            LogLevel::Debug,
            &format!("option '{}' set to {value} ({flags:?})", self.info.name),
        );
        Ok(flags)
    }

    fn format_caps(&self) -> String {
        let names: Vec<&str> = self
            .info
            .capabilities
            .iter_names()
            .map(|(name, _)| name)
            .collect();
        format!("[{}]", names.join(","))
    }
}

impl fmt::Debug for OptionDescriptor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionDescriptor")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl Display for OptionDescriptor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({};{})", self.info.name, self.info.title, self.info.desc)?;
        writeln!(
            f,
            "Caps: {} {}",
            self.info.capabilities.bits(),
            self.format_caps()
        )?;
        writeln!(
            f,
            "Type: {} ({})",
            self.info.value_type as i32, self.info.value_type
        )?;
        writeln!(f, "Units: {} ({})", self.info.unit as i32, self.info.unit)?;
        writeln!(f, "Constraint: {}", self.info.constraint)?;
        if self.is_readable() {
            match self.get_value() {
                Ok(value) => writeln!(f, "Value: {value}")?,
                Err(err) => writeln!(f, "{err}")?,
            }
        }
        Ok(())
    }
}

/// Options of an item, produced one descriptor per `next()`.
///
/// The list is fetched once; the iterator cannot be restarted.
pub struct Options<'item> {
    handles: std::vec::IntoIter<Box<dyn OptionHandle>>,
    config: Rc<ApiConfig>,
    _item: PhantomData<&'item ()>,
}

impl<'item> Options<'item> {
    pub(crate) fn new(handles: Vec<Box<dyn OptionHandle>>, config: Rc<ApiConfig>) -> Self {
        Options {
            handles: handles.into_iter(),
            config,
            _item: PhantomData,
        }
    }
}

impl<'item> Iterator for Options<'item> {
    type Item = OptionDescriptor<'item>;

    fn next(&mut self) -> Option<Self::Item> {
        self.handles
            .next()
            .map(|handle| OptionDescriptor::new(handle, Rc::clone(&self.config)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.handles.size_hint()
    }
}

impl ExactSizeIterator for Options<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(min: i32, max: i32, interval: i32) -> Constraint {
        Constraint::Range(ValueRange {
            min: Value::Integer(min),
            max: Value::Integer(max),
            interval: Value::Integer(interval),
        })
    }

    #[test]
    fn test_range_constraint_honors_interval() {
        let c = range(75, 600, 25);
        assert!(c.allows(&Value::Integer(75)));
        assert!(c.allows(&Value::Integer(300)));
        assert!(!c.allows(&Value::Integer(310)));
        assert!(!c.allows(&Value::Integer(625)));
        assert!(!c.allows(&Value::String("300".into())));
    }

    #[test]
    fn test_double_range_ignores_interval() {
        let c = Constraint::Range(ValueRange {
            min: Value::Double(-100.0),
            max: Value::Double(100.0),
            interval: Value::Double(0.5),
        });
        assert!(c.allows(&Value::Double(12.3)));
        assert!(!c.allows(&Value::Double(100.5)));
    }

    #[test]
    fn test_list_constraint() {
        let c = Constraint::List(vec![
            Value::String("Color".into()),
            Value::String("Gray".into()),
        ]);
        assert!(c.allows(&Value::String("Gray".into())));
        assert!(!c.allows(&Value::String("Lineart".into())));
        assert_eq!(c.to_string(), "List (Color,Gray)");
        assert_eq!(c.kind(), 2);
    }

    #[test]
    fn test_constraint_display() {
        assert_eq!(Constraint::None.to_string(), "None");
        assert_eq!(
            range(1, 10, 1).to_string(),
            "Range (min: 1, max: 10, interval: 1)"
        );
    }

    #[test]
    fn test_readable_and_writable_come_from_capabilities() {
        let mut info = OptionInfo::new("resolution", ValueType::Integer);
        assert!(info.is_readable());
        assert!(info.is_writable());

        info.capabilities = Capabilities::INACTIVE | Capabilities::AUTOMATIC;
        assert!(!info.is_readable());
        assert!(!info.is_writable());
    }
}
