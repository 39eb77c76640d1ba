//! Error types and handling

use std::fmt;

/// Bit set on every libinsane status code that denotes a failure.
pub const ERROR_FLAG: u32 = 1 << 30;

/// Status codes reported by libinsane (`enum lis_error`).
///
/// `Ok` and `WarmingUp` are statuses, everything else carries
/// [`ERROR_FLAG`]. Codes this crate does not know are kept verbatim in
/// `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Ok,
    WarmingUp,
    DeviceBusy,
    Cancelled,
    InvalidValue,
    IoError,
    HwIsLocked,
    NoDocs,
    Jammed,
    CoverOpen,
    Unsupported,
    AccessDenied,
    NoMem,
    Unknown,
    InternalImgFormatNotSupported,
    InternalNotImplemented,
    InternalUnknownError,
    Impossible,
    Other(u32),
}

impl ErrorCode {
    const FLAGGED: [Self; 16] = [
        Self::DeviceBusy,
        Self::Cancelled,
        Self::InvalidValue,
        Self::IoError,
        Self::HwIsLocked,
        Self::NoDocs,
        Self::Jammed,
        Self::CoverOpen,
        Self::Unsupported,
        Self::AccessDenied,
        Self::NoMem,
        Self::Unknown,
        Self::InternalImgFormatNotSupported,
        Self::InternalNotImplemented,
        Self::InternalUnknownError,
        Self::Impossible,
    ];

    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Ok,
            1 => Self::WarmingUp,
            _ if raw & ERROR_FLAG != 0 => {
                let index = (raw & !ERROR_FLAG) as usize;
                match index.checked_sub(1).and_then(|i| Self::FLAGGED.get(i)) {
                    Some(code) => *code,
                    None => Self::Other(raw),
                }
            }
            _ => Self::Other(raw),
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            Self::Ok => 0,
            Self::WarmingUp => 1,
            Self::Other(raw) => raw,
            flagged => {
                let position = Self::FLAGGED
                    .iter()
                    .position(|c| *c == flagged)
                    .unwrap_or_default();
                ERROR_FLAG | (position as u32 + 1)
            }
        }
    }

    /// True for failures, false for `Ok` and transient statuses like warm-up.
    pub fn is_error(self) -> bool {
        self.as_raw() & ERROR_FLAG != 0
    }

    /// Human readable description, as libinsane's `lis_strerror()` gives it.
    pub fn description(self) -> String {
        #[cfg(feature = "libinsane")]
        {
            crate::ffi::strerror(self)
        }
        #[cfg(not(feature = "libinsane"))]
        {
            self.builtin_description()
        }
    }

    pub(crate) fn builtin_description(self) -> String {
        let text = match self {
            Self::Ok => "Success",
            Self::WarmingUp => "Device is warming up",
            Self::DeviceBusy => "Device is busy",
            Self::Cancelled => "Operation has been cancelled",
            Self::InvalidValue => "Invalid value",
            Self::IoError => "I/O Error",
            Self::HwIsLocked => "Hardware is locked",
            Self::NoDocs => "No more document in the feeder",
            Self::Jammed => "Paper jammed in the feeder",
            Self::CoverOpen => "Cover is open",
            Self::Unsupported => "Operation not supported",
            Self::AccessDenied => "Access denied",
            Self::NoMem => "Out of memory",
            Self::Unknown => "Unknown error",
            Self::InternalImgFormatNotSupported => "Image format not supported",
            Self::InternalNotImplemented => "Not implemented",
            Self::InternalUnknownError => "Internal unknown error",
            Self::Impossible => "Impossible case",
            Self::Other(raw) => return format!("Unknown error code {raw}"),
        };
        text.to_string()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_raw())
    }
}

/// Errors returned by every fallible operation of the adapter.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A libinsane call failed; `operation` names the adapter entry point.
    #[error("Error {code} in '{operation}' {description}")]
    Lis {
        code: ErrorCode,
        operation: &'static str,
        description: String,
    },

    #[error("cannot read the option '{0}'")]
    OptionNotReadable(String),

    #[error("option '{0}' not found")]
    OptionNotFound(String),

    #[error("invalid {value_type} value '{value}'")]
    InvalidValue { value: String, value_type: String },

    #[error("paper source '{0}' not found")]
    SourceNotFound(String),

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("bmp: {0}")]
    Bmp(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("pdf: {0}")]
    Pdf(#[from] lopdf::Error),
}

impl Error {
    /// Wrap a libinsane code, formatting its description.
    pub fn lis(code: ErrorCode, operation: &'static str) -> Self {
        Error::Lis {
            code,
            operation,
            description: code.description(),
        }
    }

    /// The libinsane code, if this error came from the library.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Error::Lis { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
