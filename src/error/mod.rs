use std::{fmt, time::Duration};

/// Represents errors that can occur during a scan or one of its memory operations
#[derive(Debug)]
pub enum MemOpError {
    /// The process handle could not be acquired within the timeout
    TimeoutReached(Option<Duration>),
    /// The region descriptor covering `address` could not be queried.
    ///
    /// Fatal to a scan: enumeration stops and the matches gathered so far are kept.
    RegionQuery {
        address: usize,
        source: anyhow::Error,
    },
    /// A region could not be read for a reason other than a partial copy.
    ///
    /// Fatal to the region only.
    RegionRead {
        address: usize,
        size: usize,
        source: anyhow::Error,
    },
    /// Malformed pattern input, raised before any region is touched
    InvalidPattern(String),
    /// WinAPI errors
    #[cfg(windows)]
    WinAPI(windows_result::Error),
    /// Generic error that wraps an anyhow::Error
    Other(anyhow::Error),
}

impl MemOpError {
    /// Creates a new `MemOpError::Other` from anything that implements `std::error::Error`
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        MemOpError::Other(anyhow::Error::new(error))
    }

    pub fn invalid_pattern(reason: impl Into<String>) -> Self {
        MemOpError::InvalidPattern(reason.into())
    }

    /// Returns true if this is a `TimeoutReached` error
    pub fn is_timeout(&self) -> bool {
        matches!(self, MemOpError::TimeoutReached(_))
    }

    /// Returns true if this is a `RegionQuery` error
    pub fn is_region_query(&self) -> bool {
        matches!(self, MemOpError::RegionQuery { .. })
    }

    /// Returns true if this is a `RegionRead` error
    pub fn is_region_read(&self) -> bool {
        matches!(self, MemOpError::RegionRead { .. })
    }

    /// Returns true if this is an `InvalidPattern` error
    pub fn is_invalid_pattern(&self) -> bool {
        matches!(self, MemOpError::InvalidPattern(_))
    }

    /// Converts this error to its underlying root cause string
    pub fn root_cause_string(&self) -> String {
        match self {
            MemOpError::TimeoutReached(Some(t)) => {
                format!("Handle could not be acquired within timeout \"{:#?}\".", t)
            }
            MemOpError::TimeoutReached(None) => {
                "Handle could not be acquired within timeout.".to_string()
            }
            MemOpError::RegionQuery { address, source } => {
                format!("Querying the region at {address:#X} failed with: \"{source:#}\"")
            }
            MemOpError::RegionRead {
                address,
                size,
                source,
            } => {
                format!(
                    "Reading {size:#X} bytes from region {address:#X} failed with: \"{source:#}\""
                )
            }
            MemOpError::InvalidPattern(reason) => format!("Invalid pattern: {reason}"),
            #[cfg(windows)]
            MemOpError::WinAPI(api_err) => {
                format!(
                    "Windows API call failed with: \"Windows Error: {:08X} - {}\"",
                    api_err.code().0,
                    api_err
                )
            }
            MemOpError::Other(err) => format!("{:#}", err),
        }
    }
}

impl fmt::Display for MemOpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemOpError: \"{}\"", &self.root_cause_string())
    }
}

impl std::error::Error for MemOpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MemOpError::RegionQuery { source, .. } | MemOpError::RegionRead { source, .. } => {
                Some(&**source)
            }
            #[cfg(windows)]
            MemOpError::WinAPI(err) => Some(err),
            MemOpError::Other(err) => err.source(),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for MemOpError {
    fn from(err: anyhow::Error) -> Self {
        MemOpError::Other(err)
    }
}

impl From<std::num::ParseIntError> for MemOpError {
    fn from(err: std::num::ParseIntError) -> Self {
        MemOpError::InvalidPattern(err.to_string())
    }
}

impl From<regex::Error> for MemOpError {
    fn from(err: regex::Error) -> Self {
        MemOpError::InvalidPattern(err.to_string())
    }
}

#[cfg(windows)]
impl From<windows_result::Error> for MemOpError {
    fn from(err: windows_result::Error) -> Self {
        MemOpError::WinAPI(err)
    }
}

pub type MemOpResult<T> = Result<T, MemOpError>;

/// Extension trait to add anyhow-like methods to MemOpResult
pub trait MemOpResultExt<T> {
    /// Add context to an error
    fn context<C>(self, context: C) -> MemOpResult<T>
    where
        C: fmt::Display + Send + Sync + 'static;

    /// Add context to an error with a lazy closure
    fn with_context<C, F>(self, f: F) -> MemOpResult<T>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> MemOpResultExt<T> for MemOpResult<T> {
    fn context<C>(self, context: C) -> MemOpResult<T>
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        self.with_context(|| context)
    }

    fn with_context<C, F>(self, f: F) -> MemOpResult<T>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|err| match err {
            MemOpError::Other(inner) => MemOpError::Other(inner.context(f())),
            MemOpError::RegionQuery { address, source } => MemOpError::RegionQuery {
                address,
                source: source.context(f()),
            },
            MemOpError::RegionRead {
                address,
                size,
                source,
            } => MemOpError::RegionRead {
                address,
                size,
                source: source.context(f()),
            },
            // Pattern and timeout errors are matched on by callers; keep their variant.
            other @ (MemOpError::InvalidPattern(_) | MemOpError::TimeoutReached(_)) => other,
            #[cfg(windows)]
            MemOpError::WinAPI(api_err) => {
                MemOpError::Other(anyhow::Error::new(api_err).context(f()))
            }
        })
    }
}

impl<T> MemOpResultExt<T> for Option<T> {
    fn context<C>(self, context: C) -> MemOpResult<T>
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| MemOpError::Other(anyhow::anyhow!("{}", context)))
    }

    fn with_context<C, F>(self, f: F) -> MemOpResult<T>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| MemOpError::Other(anyhow::anyhow!("{}", f())))
    }
}

// Allow macro-based error creation, similar to anyhow::anyhow!
#[macro_export]
macro_rules! memop_err {
    ($msg:literal $(,)?) => {
        $crate::MemOpError::Other(anyhow::anyhow!($msg))
    };
    ($err:expr $(,)?) => {
        $crate::MemOpError::Other(anyhow::anyhow!($err))
    };
    ($fmt:literal, $($arg:tt)*) => {
        $crate::MemOpError::Other(anyhow::anyhow!($fmt, $($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_region_variants() {
        let res: MemOpResult<()> = Err(MemOpError::RegionRead {
            address: 0x1000,
            size: 0x10,
            source: anyhow::anyhow!("access denied"),
        });

        let err = res.context("scanning heap").unwrap_err();
        assert!(err.is_region_read());
        assert!(err.root_cause_string().contains("0x1000"));
    }

    #[test]
    fn pattern_errors_stay_pattern_errors() {
        let res: MemOpResult<()> = Err(MemOpError::invalid_pattern("empty"));
        assert!(res.context("compile").unwrap_err().is_invalid_pattern());
    }

    #[test]
    fn option_context() {
        let none: Option<u8> = None;
        let err = none.context("missing byte").unwrap_err();
        assert_eq!(err.to_string(), "MemOpError: \"missing byte\"");
    }
}
