//! Error type and helpers shared across the sequery crates.

use std::fmt;

pub type Result<T, E = QueryError> = std::result::Result<T, E>;

/// Error type used throughout the engine.
///
/// Errors are message-first. Anything that needs to be matched on
/// programmatically should happen before the error is constructed.
#[derive(Debug)]
pub struct QueryError {
    /// Message describing the error.
    pub msg: String,
    /// Optional source of the error.
    pub source: Option<Box<dyn std::error::Error + 'static>>,
}

impl QueryError {
    pub fn new(msg: impl Into<String>) -> Self {
        QueryError {
            msg: msg.into(),
            source: None,
        }
    }

    pub fn with_source(
        msg: impl Into<String>,
        source: Box<dyn std::error::Error + 'static>,
    ) -> Self {
        QueryError {
            msg: msg.into(),
            source: Some(source),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)?;
        if let Some(source) = &self.source {
            write!(f, "\nError source: {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref())
    }
}

/// Return early with a "Not implemented" error.
#[macro_export]
macro_rules! not_implemented {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        return Err($crate::QueryError::new(format!("Not implemented: {msg}")));
    }};
}

pub trait ResultExt<T> {
    /// Wrap an error with additional context.
    fn context(self, msg: &'static str) -> Result<T>;

    /// Wrap an error with additional context produced lazily.
    fn context_fn<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: std::error::Error + 'static,
{
    fn context(self, msg: &'static str) -> Result<T> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(QueryError::with_source(msg, Box::new(e))),
        }
    }

    fn context_fn<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(QueryError::with_source(f(), Box::new(e))),
        }
    }
}

pub trait OptionExt<T> {
    /// Convert a None into an error indicating a required value was
    /// missing.
    fn required(self, what: &'static str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required(self, what: &'static str) -> Result<T> {
        match self {
            Some(v) => Ok(v),
            None => Err(QueryError::new(format!("Missing required value: {what}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_wraps_source() {
        let r: Result<(), std::io::Error> = Err(std::io::Error::other("underlying"));
        let e = r.context("outer context").unwrap_err();
        assert_eq!("outer context", e.msg);
        assert!(e.source.is_some());
    }

    #[test]
    fn required_missing() {
        let v: Option<i32> = None;
        let e = v.required("thing").unwrap_err();
        assert!(e.msg.contains("thing"));
    }
}
