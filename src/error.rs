use std::process::ExitStatus;

use thiserror::Error;

/// Errors reported by dialog calls.
///
/// The `Display` text of an error is what [`Context::get_error`] returns
/// after the failing call.
///
/// [`Context::get_error`]: crate::Context::get_error
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to allocate {0}")]
    Allocation(&'static str),
    #[error("failed to initialize the dialog toolkit: {0}")]
    ToolkitInit(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error("non-local item cannot be used as a local path: {0}")]
    NonLocal(String),
}

/// Failures of the underlying native toolkit.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("dialog helper exited with {status}: {stderr}")]
    Helper { status: ExitStatus, stderr: String },
    #[error("{0}")]
    Message(&'static str),
    #[cfg(windows)]
    #[error("{context}: {source}")]
    Com {
        context: &'static str,
        #[source]
        source: windows::core::Error,
    },
}

/// Failures of the X11 focus workaround. These are logged, never returned
/// from a dialog call.
#[cfg(all(unix, feature = "x11"))]
#[derive(Debug, Error)]
pub enum X11Error {
    #[error("connect: {0}")]
    Connect(#[from] x11rb::errors::ConnectError),
    #[error("connection: {0}")]
    Connection(#[from] x11rb::errors::ConnectionError),
    #[error("reply: {0}")]
    Reply(#[from] x11rb::errors::ReplyError),
    #[error("resource ids exhausted")]
    IdsExhausted,
    #[error("no such screen")]
    NoScreen,
}

impl Error {
    /// Wraps an I/O failure as a platform error with a fixed description.
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Error::Platform(PlatformError::Io { context, source })
    }

    /// A platform failure without a native source.
    pub(crate) fn platform(message: &'static str) -> Self {
        Error::Platform(PlatformError::Message(message))
    }

    #[cfg(windows)]
    pub(crate) fn com(context: &'static str, source: windows::core::Error) -> Self {
        Error::Platform(PlatformError::Com { context, source })
    }
}

#[cfg(all(unix, feature = "x11"))]
impl From<x11rb::errors::ReplyOrIdError> for X11Error {
    fn from(e: x11rb::errors::ReplyOrIdError) -> Self {
        match e {
            x11rb::errors::ReplyOrIdError::ConnectionError(e) => X11Error::Connection(e),
            x11rb::errors::ReplyOrIdError::X11Error(e) => X11Error::Reply(e.into()),
            x11rb::errors::ReplyOrIdError::IdsExhausted => X11Error::IdsExhausted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display_names_the_step() {
        let err = Error::io(
            "failed to read helper output",
            std::io::Error::other("broken pipe"),
        );
        assert_eq!(err.to_string(), "failed to read helper output: broken pipe");
    }

    #[test]
    fn platform_message_is_transparent() {
        let err = Error::platform("dialog returned no selected items");
        assert_eq!(err.to_string(), "dialog returned no selected items");
    }
}
