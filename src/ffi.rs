//! FFI bindings to the C libinsane library
//!
//! Layouts follow `libinsane/capi.h`, `log.h`, `error.h`, `safebet.h` and
//! `util.h`. The [`LibInsane`] driver implements the crate's driver traits
//! on top of them; nothing else in the crate touches a raw pointer.

use crate::device::{DeviceDescriptor, DeviceLocations, ItemKind};
use crate::driver::{Driver, DriverResult, ItemHandle, OptionHandle, SessionHandle};
use crate::logging::{self, LogLevel};
use crate::option::{Capabilities, Constraint, OptionInfo, SetFlags, ValueRange};
use crate::session::ScanParameters;
use crate::value::{ImageFormat, Unit, Value, ValueType};
use crate::ErrorCode;
use libc::{c_char, c_double, c_int, c_uint, c_void, size_t};
use std::ffi::{CStr, CString};
use std::ptr::{self, NonNull};
use std::sync::Once;

#[allow(non_camel_case_types)]
pub type lis_error = c_uint;

#[repr(C)]
#[allow(non_camel_case_types)]
pub struct lis_api {
    pub base_name: *const c_char,
    pub cleanup: Option<unsafe extern "C" fn(*mut lis_api)>,
    pub list_devices: Option<
        unsafe extern "C" fn(
            *mut lis_api,
            c_int,
            *mut *mut *mut lis_device_descriptor,
        ) -> lis_error,
    >,
    pub get_device:
        Option<unsafe extern "C" fn(*mut lis_api, *const c_char, *mut *mut lis_item) -> lis_error>,
}

#[repr(C)]
#[allow(non_camel_case_types)]
pub struct lis_device_descriptor {
    pub impl_: *mut lis_api,
    pub dev_id: *mut c_char,
    pub vendor: *mut c_char,
    pub model: *mut c_char,
    pub type_: *mut c_char,
}

#[repr(C)]
#[allow(non_camel_case_types)]
pub struct lis_item {
    pub name: *const c_char,
    pub type_: c_int,
    pub get_children:
        Option<unsafe extern "C" fn(*mut lis_item, *mut *mut *mut lis_item) -> lis_error>,
    pub get_options: Option<
        unsafe extern "C" fn(*mut lis_item, *mut *mut *mut lis_option_descriptor) -> lis_error,
    >,
    pub scan_start:
        Option<unsafe extern "C" fn(*mut lis_item, *mut *mut lis_scan_session) -> lis_error>,
    pub close: Option<unsafe extern "C" fn(*mut lis_item)>,
}

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(non_camel_case_types)]
pub union lis_value {
    pub boolean: c_int,
    pub integer: c_int,
    pub dbl: c_double,
    pub string: *const c_char,
    pub format: c_int,
}

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(non_camel_case_types)]
pub struct lis_value_range {
    pub min: lis_value,
    pub max: lis_value,
    pub interval: lis_value,
}

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(non_camel_case_types)]
pub struct lis_value_list {
    pub nb_values: c_int,
    pub values: *mut lis_value,
}

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(non_camel_case_types)]
pub union lis_possible {
    pub range: lis_value_range,
    pub list: lis_value_list,
}

#[repr(C)]
#[allow(non_camel_case_types)]
pub struct lis_value_desc {
    pub type_: c_int,
    pub unit: c_int,
}

#[repr(C)]
#[allow(non_camel_case_types)]
pub struct lis_constraint {
    pub type_: c_int,
    pub possible: lis_possible,
}

#[repr(C)]
#[allow(non_camel_case_types)]
pub struct lis_option_fns {
    pub get_value:
        Option<unsafe extern "C" fn(*mut lis_option_descriptor, *mut lis_value) -> lis_error>,
    pub set_value: Option<
        unsafe extern "C" fn(*mut lis_option_descriptor, lis_value, *mut c_int) -> lis_error,
    >,
}

#[repr(C)]
#[allow(non_camel_case_types)]
pub struct lis_option_descriptor {
    pub name: *const c_char,
    pub title: *const c_char,
    pub desc: *const c_char,
    pub capabilities: c_int,
    pub value: lis_value_desc,
    pub constraint: lis_constraint,
    pub fn_: lis_option_fns,
}

#[repr(C)]
#[derive(Default)]
#[allow(non_camel_case_types)]
pub struct lis_scan_parameters {
    pub format: c_int,
    pub width: c_int,
    pub height: c_int,
    pub image_size: size_t,
}

#[repr(C)]
#[allow(non_camel_case_types)]
pub struct lis_scan_session {
    pub get_scan_parameters:
        Option<unsafe extern "C" fn(*mut lis_scan_session, *mut lis_scan_parameters) -> lis_error>,
    pub end_of_feed: Option<unsafe extern "C" fn(*mut lis_scan_session) -> c_int>,
    pub end_of_page: Option<unsafe extern "C" fn(*mut lis_scan_session) -> c_int>,
    pub scan_read:
        Option<unsafe extern "C" fn(*mut lis_scan_session, *mut c_void, *mut size_t) -> lis_error>,
    pub cancel: Option<unsafe extern "C" fn(*mut lis_scan_session)>,
}

#[allow(non_camel_case_types)]
pub type lis_log_callback = extern "C" fn(c_int, *const c_char);

#[repr(C)]
#[allow(non_camel_case_types)]
pub struct lis_log_callbacks {
    pub callbacks: [Option<lis_log_callback>; 4],
}

extern "C" {
    pub fn lis_safebet(impl_: *mut *mut lis_api) -> lis_error;
    pub fn lis_strerror(err: lis_error) -> *const c_char;
    pub fn lis_set_option(item: *mut lis_item, opt_name: *const c_char, opt_value: *const c_char)
        -> lis_error;
    pub fn lis_set_log_callbacks(callbacks: *const lis_log_callbacks);
}

extern "C" fn log_proxy(level: c_int, msg: *const c_char) {
    // SAFETY: libinsane hands over a NUL-terminated message valid for the
    // duration of the callback.
    let message = unsafe { string_from(msg) };
    logging::library_message(LogLevel::from_raw(level), &message);
}

static LOG_CALLBACKS: lis_log_callbacks = lis_log_callbacks {
    callbacks: [Some(log_proxy); 4],
};

static INSTALL_LOG_CALLBACKS: Once = Once::new();

fn install_log_callbacks() {
    INSTALL_LOG_CALLBACKS.call_once(|| {
        // SAFETY: the table is a static and outlives the library.
        unsafe { lis_set_log_callbacks(&LOG_CALLBACKS) };
    });
}

/// Description of an error code, as libinsane words it.
pub(crate) fn strerror(code: ErrorCode) -> String {
    // SAFETY: lis_strerror returns a static string or NULL.
    let text = unsafe { string_from(lis_strerror(code.as_raw())) };
    if text.is_empty() {
        code.builtin_description()
    } else {
        text
    }
}

unsafe fn string_from(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// Pointers of a NULL-terminated array.
unsafe fn null_terminated<T>(array: *mut *mut T) -> Vec<*mut T> {
    let mut out = Vec::new();
    if array.is_null() {
        return out;
    }
    let mut i = 0;
    while !(*array.add(i)).is_null() {
        out.push(*array.add(i));
        i += 1;
    }
    out
}

fn check(err: lis_error) -> DriverResult<()> {
    match ErrorCode::from_raw(err) {
        ErrorCode::Ok => Ok(()),
        code => Err(code),
    }
}

fn c_string(text: &str) -> DriverResult<CString> {
    CString::new(text).map_err(|_| ErrorCode::InvalidValue)
}

unsafe fn value_from(value_type: ValueType, raw: &lis_value) -> Value {
    match value_type {
        ValueType::Bool => Value::Bool(raw.boolean != 0),
        ValueType::Integer => Value::Integer(raw.integer),
        ValueType::Double => Value::Double(raw.dbl),
        ValueType::String => Value::String(string_from(raw.string)),
        ValueType::ImageFormat => ImageFormat::from_raw(raw.format)
            .map(Value::ImageFormat)
            .unwrap_or(Value::Integer(raw.format)),
    }
}

unsafe fn constraint_from(value_type: ValueType, constraint: &lis_constraint) -> Constraint {
    match constraint.type_ {
        1 => {
            let range = constraint.possible.range;
            Constraint::Range(ValueRange {
                min: value_from(value_type, &range.min),
                max: value_from(value_type, &range.max),
                interval: value_from(value_type, &range.interval),
            })
        }
        2 => {
            let list = constraint.possible.list;
            let count = usize::try_from(list.nb_values).unwrap_or(0);
            if list.values.is_null() || count == 0 {
                return Constraint::List(Vec::new());
            }
            let values = std::slice::from_raw_parts(list.values, count);
            Constraint::List(values.iter().map(|v| value_from(value_type, v)).collect())
        }
        _ => Constraint::None,
    }
}

/// The real libinsane backend, as set up by `lis_safebet()`.
pub struct LibInsane {
    api: NonNull<lis_api>,
}

impl LibInsane {
    pub fn safebet() -> DriverResult<Box<dyn Driver>> {
        install_log_callbacks();
        let mut api: *mut lis_api = ptr::null_mut();
        // SAFETY: lis_safebet fills `api` on success.
        check(unsafe { lis_safebet(&mut api) })?;
        let api = NonNull::new(api).ok_or(ErrorCode::InternalUnknownError)?;
        Ok(Box::new(LibInsane { api }))
    }

    fn raw(&self) -> &lis_api {
        // SAFETY: the pointer stays valid until cleanup, which consumes
        // the owning Api.
        unsafe { self.api.as_ref() }
    }
}

impl Driver for LibInsane {
    fn base_name(&self) -> String {
        unsafe { string_from(self.raw().base_name) }
    }

    fn list_devices(&self, locations: DeviceLocations) -> DriverResult<Vec<DeviceDescriptor>> {
        let f = self.raw().list_devices.ok_or(ErrorCode::InternalNotImplemented)?;
        let mut infos: *mut *mut lis_device_descriptor = ptr::null_mut();
        unsafe {
            check(f(self.api.as_ptr(), locations as c_int, &mut infos))?;
            Ok(null_terminated(infos)
                .into_iter()
                .map(|dev| DeviceDescriptor {
                    dev_id: string_from((*dev).dev_id),
                    vendor: string_from((*dev).vendor),
                    model: string_from((*dev).model),
                    type_: string_from((*dev).type_),
                })
                .collect())
        }
    }

    fn get_device(&self, dev_id: &str) -> DriverResult<Box<dyn ItemHandle>> {
        let f = self.raw().get_device.ok_or(ErrorCode::InternalNotImplemented)?;
        let id = c_string(dev_id)?;
        let mut item: *mut lis_item = ptr::null_mut();
        check(unsafe { f(self.api.as_ptr(), id.as_ptr(), &mut item) })?;
        let item = NonNull::new(item).ok_or(ErrorCode::InternalUnknownError)?;
        Ok(Box::new(FfiItem { item }))
    }

    fn cleanup(&self) {
        if let Some(f) = self.raw().cleanup {
            unsafe { f(self.api.as_ptr()) };
        }
    }
}

struct FfiItem {
    item: NonNull<lis_item>,
}

impl FfiItem {
    fn raw(&self) -> &lis_item {
        // SAFETY: items stay valid until their root is closed; the adapter
        // types borrow the root for as long as any child is alive.
        unsafe { self.item.as_ref() }
    }
}

impl ItemHandle for FfiItem {
    fn name(&self) -> String {
        unsafe { string_from(self.raw().name) }
    }

    fn kind(&self) -> ItemKind {
        ItemKind::from_raw(self.raw().type_)
    }

    fn get_children(&self) -> DriverResult<Vec<Box<dyn ItemHandle>>> {
        let f = self.raw().get_children.ok_or(ErrorCode::InternalNotImplemented)?;
        let mut children: *mut *mut lis_item = ptr::null_mut();
        unsafe {
            check(f(self.item.as_ptr(), &mut children))?;
            Ok(null_terminated(children)
                .into_iter()
                .filter_map(NonNull::new)
                .map(|item| Box::new(FfiItem { item }) as Box<dyn ItemHandle>)
                .collect())
        }
    }

    fn get_options(&self) -> DriverResult<Vec<Box<dyn OptionHandle>>> {
        let f = self.raw().get_options.ok_or(ErrorCode::InternalNotImplemented)?;
        let mut options: *mut *mut lis_option_descriptor = ptr::null_mut();
        unsafe {
            check(f(self.item.as_ptr(), &mut options))?;
            Ok(null_terminated(options)
                .into_iter()
                .filter_map(NonNull::new)
                .map(|opt| Box::new(FfiOption { opt }) as Box<dyn OptionHandle>)
                .collect())
        }
    }

    fn set_option(&self, name: &str, value: &str) -> DriverResult<()> {
        let name = c_string(name)?;
        let value = c_string(value)?;
        check(unsafe { lis_set_option(self.item.as_ptr(), name.as_ptr(), value.as_ptr()) })
    }

    fn scan_start(&self) -> DriverResult<Box<dyn SessionHandle>> {
        let f = self.raw().scan_start.ok_or(ErrorCode::InternalNotImplemented)?;
        let mut session: *mut lis_scan_session = ptr::null_mut();
        check(unsafe { f(self.item.as_ptr(), &mut session) })?;
        let session = NonNull::new(session).ok_or(ErrorCode::InternalUnknownError)?;
        Ok(Box::new(FfiSession { session }))
    }

    fn close(&self) {
        if let Some(f) = self.raw().close {
            unsafe { f(self.item.as_ptr()) };
        }
    }
}

struct FfiOption {
    opt: NonNull<lis_option_descriptor>,
}

impl FfiOption {
    fn raw(&self) -> &lis_option_descriptor {
        unsafe { self.opt.as_ref() }
    }

    fn value_type(&self) -> DriverResult<ValueType> {
        ValueType::from_raw(self.raw().value.type_).ok_or(ErrorCode::InternalUnknownError)
    }
}

impl OptionHandle for FfiOption {
    fn info(&self) -> OptionInfo {
        let raw = self.raw();
        let value_type = ValueType::from_raw(raw.value.type_).unwrap_or(ValueType::Integer);
        unsafe {
            OptionInfo {
                name: string_from(raw.name),
                title: string_from(raw.title),
                desc: string_from(raw.desc),
                capabilities: Capabilities::from_bits_truncate(raw.capabilities as u32),
                value_type,
                unit: Unit::from_raw(raw.value.unit),
                constraint: constraint_from(value_type, &raw.constraint),
            }
        }
    }

    fn get_value(&self) -> DriverResult<Value> {
        let f = self.raw().fn_.get_value.ok_or(ErrorCode::InternalNotImplemented)?;
        let value_type = self.value_type()?;
        let mut raw = lis_value { integer: 0 };
        unsafe {
            check(f(self.opt.as_ptr(), &mut raw))?;
            Ok(value_from(value_type, &raw))
        }
    }

    fn set_value(&self, value: &Value) -> DriverResult<SetFlags> {
        let f = self.raw().fn_.set_value.ok_or(ErrorCode::InternalNotImplemented)?;
        // Keeps the string alive across the call.
        let text;
        let raw = match value {
            Value::Bool(v) => lis_value { boolean: c_int::from(*v) },
            Value::Integer(v) => lis_value { integer: *v },
            Value::Double(v) => lis_value { dbl: *v },
            Value::String(v) => {
                text = c_string(v)?;
                lis_value { string: text.as_ptr() }
            }
            Value::ImageFormat(v) => lis_value { format: v.as_raw() },
        };
        let mut flags: c_int = 0;
        check(unsafe { f(self.opt.as_ptr(), raw, &mut flags) })?;
        Ok(SetFlags::from_bits_truncate(flags as u32))
    }
}

struct FfiSession {
    session: NonNull<lis_scan_session>,
}

impl FfiSession {
    fn raw(&self) -> &lis_scan_session {
        unsafe { self.session.as_ref() }
    }
}

impl SessionHandle for FfiSession {
    fn get_scan_parameters(&mut self) -> DriverResult<ScanParameters> {
        let f = self.raw().get_scan_parameters.ok_or(ErrorCode::InternalNotImplemented)?;
        let mut params = lis_scan_parameters::default();
        check(unsafe { f(self.session.as_ptr(), &mut params) })?;
        Ok(ScanParameters {
            format: ImageFormat::from_raw(params.format)
                .ok_or(ErrorCode::InternalImgFormatNotSupported)?,
            width: u32::try_from(params.width).unwrap_or(0),
            height: u32::try_from(params.height).unwrap_or(0),
            image_size: params.image_size,
        })
    }

    fn end_of_feed(&mut self) -> bool {
        match self.raw().end_of_feed {
            Some(f) => unsafe { f(self.session.as_ptr()) != 0 },
            None => true,
        }
    }

    fn end_of_page(&mut self) -> bool {
        match self.raw().end_of_page {
            Some(f) => unsafe { f(self.session.as_ptr()) != 0 },
            None => true,
        }
    }

    fn scan_read(&mut self, buf: &mut [u8]) -> DriverResult<usize> {
        let f = self.raw().scan_read.ok_or(ErrorCode::InternalNotImplemented)?;
        let mut size: size_t = buf.len();
        let err = unsafe { f(self.session.as_ptr(), buf.as_mut_ptr().cast(), &mut size) };
        let result = check(err);
        if result == Err(ErrorCode::WarmingUp) {
            debug_assert_eq!(size, 0, "no data while warming up");
        }
        result.map(|()| size.min(buf.len()))
    }

    fn cancel(&mut self) {
        if let Some(f) = self.raw().cancel {
            unsafe { f(self.session.as_ptr()) };
        }
    }
}
