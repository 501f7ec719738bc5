// Copyright 2026 alcove Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error type shared by all alcove components.

use std::{
    backtrace::{Backtrace, BacktraceStatus},
    borrow::Cow,
    fmt::{Debug, Display},
    sync::Arc,
};

/// The category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Raised by a caller-supplied component, e.g. a loader.
    External,
    /// An in-flight computation was dropped before it produced an outcome.
    ChannelClosed,
    /// A spawned task was cancelled before completion.
    TaskCancelled,
    /// A spawned task could not be joined.
    Join,
    /// An operation the component chose not to implement.
    Unsupported,
}

impl ErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::External => "external",
            ErrorKind::ChannelClosed => "channel closed",
            ErrorKind::TaskCancelled => "task cancelled",
            ErrorKind::Join => "join",
            ErrorKind::Unsupported => "unsupported",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error returned by all fallible alcove operations.
///
/// An error carries a kind, a message, optional key/value context, and an
/// optional source. The source and the captured backtrace are
/// reference-counted: one load failure is broadcast by clone to every caller
/// coalesced onto the same in-flight computation, so cloning must stay cheap.
///
/// `Display` renders a single line:
///
/// ```shell
/// load failed (external); key=42; caused by: connection reset
/// ```
///
/// `Debug` appends the backtrace when one was captured (`RUST_BACKTRACE=1`).
#[derive(Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Cow<'static, str>,
    context: Vec<(&'static str, String)>,
    source: Option<Arc<anyhow::Error>>,
    backtrace: Option<Arc<Backtrace>>,
}

impl Error {
    /// Create a new error. Attach a source with [`Error::with_source`].
    ///
    /// ```rust
    /// # use alcove_common::error::{Error, ErrorKind};
    /// let io_error = std::io::Error::other("connection reset");
    /// Error::new(ErrorKind::External, "load failed").with_source(io_error);
    /// ```
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        let backtrace = Backtrace::capture();
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
            source: None,
            backtrace: (backtrace.status() == BacktraceStatus::Captured).then(|| Arc::new(backtrace)),
        }
    }

    /// Attach a key/value context pair.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Attach the underlying source error.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "the source error has been set");
        self.source = Some(Arc::new(source.into()));
        self
    }

    /// The error category.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The attached context pairs, in attachment order.
    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// The captured backtrace, if backtraces are enabled.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_deref()
    }

    /// The underlying source error.
    pub fn source(&self) -> Option<&anyhow::Error> {
        self.source.as_deref()
    }

    /// Downcast the source error to a concrete type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source.as_deref().and_then(|source| source.downcast_ref::<E>())
    }

    /// Wrap an error raised by a caller-supplied component.
    pub fn external(source: impl Into<anyhow::Error>) -> Self {
        Error::new(ErrorKind::External, "").with_source(source)
    }

    /// An [`ErrorKind::Unsupported`] error for an operation a component chose
    /// not to implement.
    pub fn unsupported(operation: &'static str) -> Self {
        Error::new(ErrorKind::Unsupported, "operation is not implemented").with_context("operation", operation)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.message.is_empty() {
            true => write!(f, "{} error", self.kind)?,
            false => write!(f, "{} ({})", self.message, self.kind)?,
        }
        for (key, value) in self.context.iter() {
            write!(f, "; {key}={value}")?;
        }
        if let Some(source) = &self.source {
            write!(f, "; caused by: {source}")?;
        }
        Ok(())
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)?;
        if let Some(backtrace) = &self.backtrace {
            write!(f, "\n\nbacktrace:\n{backtrace}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|source| source.as_ref().as_ref())
    }
}

/// Result type for alcove.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<Error>();
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    #[test]
    fn test_display_single_line() {
        let err = Error::new(ErrorKind::External, "load failed")
            .with_context("key", "k1")
            .with_context("attempt", 2)
            .with_source(std::io::Error::other("connection reset"));

        assert_eq!(
            err.to_string(),
            "load failed (external); key=k1; attempt=2; caused by: connection reset"
        );
    }

    #[test]
    fn test_display_without_message() {
        let err = Error::external(TestError("offline".into()));
        assert_eq!(err.to_string(), "external error; caused by: TestError: offline");
    }

    #[test]
    fn test_downcast_source() {
        let inner = TestError("the answer is 42".to_string());
        let err = Error::external(inner.clone());
        assert_eq!(err.downcast_ref::<TestError>(), Some(&inner));
        assert!(err.downcast_ref::<std::io::Error>().is_none());
    }

    #[test]
    fn test_clone_shares_source() {
        let err = Error::external(TestError("shared".into()));
        let cloned = err.clone();

        assert_eq!(err.kind(), cloned.kind());
        assert_eq!(err.to_string(), cloned.to_string());
        assert!(cloned.downcast_ref::<TestError>().is_some());
    }

    #[test]
    fn test_unsupported_context() {
        let err = Error::unsupported("load_all");
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert_eq!(err.context(), &[("operation", "load_all".to_string())]);
    }
}
