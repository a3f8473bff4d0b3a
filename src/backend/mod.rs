#[cfg(unix)]
pub(crate) mod helper;
pub mod scripted;
#[cfg(unix)]
pub(crate) mod url;
#[cfg(windows)]
pub(crate) mod win32;
#[cfg(all(unix, feature = "x11"))]
pub(crate) mod x11;

use std::path::Path;

use bitflags::bitflags;

use crate::{
    error::Error,
    extract::NativeItem,
    filter::{CompiledFilter, FilterId},
    path_set::PathSet,
    session::DialogKind,
};

/// A dialog toolkit initialized for the current thread.
pub(crate) trait Toolkit {
    type Dialog: NativeDialog;

    fn create_dialog(&mut self, kind: DialogKind) -> Result<Self::Dialog, Error>;

    /// Processes whatever events the toolkit has queued, without blocking.
    fn drain_events(&mut self);
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub(crate) struct DialogOptions: u8 {
        const MULTIPLE          = 0x01;
        const CONFIRM_OVERWRITE = 0x02;
        const FOLDERS           = 0x04;
    }
}

/// What the native dialog reported during one pump of the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DialogEvent {
    /// The user pressed the accept button; the dialog waits for
    /// [`NativeDialog::confirm_accept`] before it completes.
    AcceptRequested,
    Accepted,
    Cancelled,
}

/// One native dialog object.
pub(crate) trait NativeDialog {
    fn set_options(&mut self, options: DialogOptions) -> Result<(), Error>;
    fn add_filter(&mut self, filter: &CompiledFilter) -> Result<FilterId, Error>;
    /// Returns `Ok(false)` when `path` is missing or cannot be opened.
    fn set_folder(&mut self, path: &Path) -> Result<bool, Error>;
    fn set_current_name(&mut self, name: &str) -> Result<(), Error>;
    fn current_name(&self) -> Result<String, Error>;
    fn current_filter(&self) -> Option<FilterId>;
    /// Whether the toolkit appends the active filter's extension itself.
    fn auto_extension(&self) -> bool {
        false
    }
    /// Makes the dialog visible and brings it to the foreground.
    fn present(&mut self) -> Result<(), Error>;
    /// Runs the toolkit's event loop until it has something to report.
    fn pump(&mut self) -> Result<Option<DialogEvent>, Error>;
    fn confirm_accept(&mut self) -> Result<(), Error>;
    fn selected_item(&mut self) -> Result<NativeItem, Error>;
    fn selected_items(&mut self) -> Result<PathSet, Error>;
    fn destroy(&mut self);
}

/// Type-erased toolkit: the platform's native one or a scripted one.
pub(crate) enum AnyToolkit {
    #[cfg(unix)]
    Helper(helper::HelperToolkit),
    #[cfg(windows)]
    Win32(win32::Win32Toolkit),
    Scripted(scripted::ScriptedToolkit),
}

pub(crate) enum AnyDialog {
    #[cfg(unix)]
    Helper(helper::HelperDialog),
    #[cfg(windows)]
    Win32(win32::Win32Dialog),
    Scripted(scripted::ScriptedDialog),
}

macro_rules! dispatch {
    ($self:expr, $d:ident => $call:expr) => {
        match $self {
            #[cfg(unix)]
            AnyDialog::Helper($d) => $call,
            #[cfg(windows)]
            AnyDialog::Win32($d) => $call,
            AnyDialog::Scripted($d) => $call,
        }
    };
}

impl Toolkit for AnyToolkit {
    type Dialog = AnyDialog;

    fn create_dialog(&mut self, kind: DialogKind) -> Result<AnyDialog, Error> {
        match self {
            #[cfg(unix)]
            AnyToolkit::Helper(t) => t.create_dialog(kind).map(AnyDialog::Helper),
            #[cfg(windows)]
            AnyToolkit::Win32(t) => t.create_dialog(kind).map(AnyDialog::Win32),
            AnyToolkit::Scripted(t) => t.create_dialog(kind).map(AnyDialog::Scripted),
        }
    }

    fn drain_events(&mut self) {
        match self {
            #[cfg(unix)]
            AnyToolkit::Helper(t) => t.drain_events(),
            #[cfg(windows)]
            AnyToolkit::Win32(t) => t.drain_events(),
            AnyToolkit::Scripted(t) => t.drain_events(),
        }
    }
}

impl NativeDialog for AnyDialog {
    fn set_options(&mut self, options: DialogOptions) -> Result<(), Error> {
        dispatch!(self, d => d.set_options(options))
    }

    fn add_filter(&mut self, filter: &CompiledFilter) -> Result<FilterId, Error> {
        dispatch!(self, d => d.add_filter(filter))
    }

    fn set_folder(&mut self, path: &Path) -> Result<bool, Error> {
        dispatch!(self, d => d.set_folder(path))
    }

    fn set_current_name(&mut self, name: &str) -> Result<(), Error> {
        dispatch!(self, d => d.set_current_name(name))
    }

    fn current_name(&self) -> Result<String, Error> {
        dispatch!(self, d => d.current_name())
    }

    fn current_filter(&self) -> Option<FilterId> {
        dispatch!(self, d => d.current_filter())
    }

    fn auto_extension(&self) -> bool {
        dispatch!(self, d => d.auto_extension())
    }

    fn present(&mut self) -> Result<(), Error> {
        dispatch!(self, d => d.present())
    }

    fn pump(&mut self) -> Result<Option<DialogEvent>, Error> {
        dispatch!(self, d => d.pump())
    }

    fn confirm_accept(&mut self) -> Result<(), Error> {
        dispatch!(self, d => d.confirm_accept())
    }

    fn selected_item(&mut self) -> Result<NativeItem, Error> {
        dispatch!(self, d => d.selected_item())
    }

    fn selected_items(&mut self) -> Result<PathSet, Error> {
        dispatch!(self, d => d.selected_items())
    }

    fn destroy(&mut self) {
        dispatch!(self, d => d.destroy())
    }
}

/// Initializes the toolkit native to the target platform.
pub(crate) fn platform_toolkit() -> Result<AnyToolkit, Error> {
    #[cfg(windows)]
    return win32::Win32Toolkit::init().map(AnyToolkit::Win32);

    #[cfg(unix)]
    return helper::HelperToolkit::init().map(AnyToolkit::Helper);

    #[cfg(not(any(unix, windows)))]
    Err(Error::ToolkitInit(
        "no native dialog toolkit for this platform".into(),
    ))
}
