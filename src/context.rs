use std::{
    marker::PhantomData,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    backend::{self, AnyToolkit},
    error::Error,
    filter::FilterDescriptor,
    path_set::PathSet,
    scripted::ScriptedToolkit,
    session::{self, DialogKind, DialogRequest},
};

/// Outcome of a dialog that did not fail.
#[derive(Debug)]
pub enum Response<T> {
    Okay(T),
    Cancel,
}

impl<T> Response<T> {
    pub fn status(&self) -> Status {
        match self {
            Response::Okay(_) => Status::Okay,
            Response::Cancel => Status::Cancel,
        }
    }

    pub fn okay(self) -> Option<T> {
        match self {
            Response::Okay(value) => Some(value),
            Response::Cancel => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        match self {
            Response::Okay(value) => Response::Okay(f(value)),
            Response::Cancel => Response::Cancel,
        }
    }
}

/// Three-way result code of a dialog call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Error,
    Okay,
    Cancel,
}

impl Status {
    pub fn of<T>(result: &Result<Response<T>, Error>) -> Self {
        match result {
            Ok(response) => response.status(),
            Err(_) => Status::Error,
        }
    }

    /// Process exit code used by the `nfd` binary.
    pub fn exit_code(self) -> i32 {
        match self {
            Status::Okay => 0,
            Status::Cancel => 1,
            Status::Error => 100,
        }
    }
}

/// What an accepted [`DialogRequest`] produced.
#[derive(Debug)]
pub enum Selection {
    Path(PathBuf),
    Paths(PathSet),
}

/// An initialized dialog toolkit plus the message of the last failure.
///
/// A context belongs to the thread that created it. Dialogs are modal:
/// each call blocks until the user closes the dialog, and only one dialog
/// can be open at a time.
pub struct Context {
    toolkit: AnyToolkit,
    last_error: Option<String>,
    _not_send: PhantomData<*const ()>,
}

impl Context {
    /// Initializes the platform's dialog toolkit for the calling thread.
    pub fn init() -> Result<Self, Error> {
        let toolkit = backend::platform_toolkit()?;
        debug!("dialog toolkit initialized");
        Ok(Self::with_toolkit(toolkit))
    }

    /// A context backed by a [`ScriptedToolkit`] instead of the screen.
    pub fn scripted(toolkit: ScriptedToolkit) -> Self {
        Self::with_toolkit(AnyToolkit::Scripted(toolkit))
    }

    fn with_toolkit(toolkit: AnyToolkit) -> Self {
        Self {
            toolkit,
            last_error: None,
            _not_send: PhantomData,
        }
    }

    /// Shuts the toolkit down. Dropping the context does the same.
    pub fn quit(self) {}

    /// Asks the user for one existing file.
    pub fn open_dialog(
        &mut self,
        filters: &[FilterDescriptor],
        default_path: Option<&Path>,
    ) -> Result<Response<PathBuf>, Error> {
        let request = request(DialogKind::OpenSingle, filters, default_path, None);
        self.run_path(&request)
    }

    /// Asks the user for one or more existing files.
    pub fn open_dialog_multiple(
        &mut self,
        filters: &[FilterDescriptor],
        default_path: Option<&Path>,
    ) -> Result<Response<PathSet>, Error> {
        let request = request(DialogKind::OpenMultiple, filters, default_path, None);
        let result = session::run(&mut self.toolkit, &request, |s| s.extract_paths());
        self.record(result)
    }

    /// Asks the user where to save a file.
    ///
    /// If the user types a name without an extension, the first extension of
    /// the active filter is appended before the dialog closes.
    pub fn save_dialog(
        &mut self,
        filters: &[FilterDescriptor],
        default_path: Option<&Path>,
        default_name: Option<&str>,
    ) -> Result<Response<PathBuf>, Error> {
        let request = request(DialogKind::Save, filters, default_path, default_name);
        self.run_path(&request)
    }

    /// Asks the user for a folder.
    pub fn pick_folder(&mut self, default_path: Option<&Path>) -> Result<Response<PathBuf>, Error> {
        let request = request(DialogKind::PickFolder, &[], default_path, None);
        self.run_path(&request)
    }

    /// Shows the dialog `request` describes.
    pub fn run(&mut self, request: &DialogRequest) -> Result<Response<Selection>, Error> {
        match request.kind() {
            DialogKind::OpenMultiple => {
                let result = session::run(&mut self.toolkit, request, |s| s.extract_paths());
                self.record(result).map(|r| r.map(Selection::Paths))
            }
            _ => self.run_path(request).map(|r| r.map(Selection::Path)),
        }
    }

    /// Message of the last failed call, or `""` if there is none.
    pub fn get_error(&self) -> &str {
        self.last_error.as_deref().unwrap_or("")
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    fn run_path(&mut self, request: &DialogRequest) -> Result<Response<PathBuf>, Error> {
        let result = session::run(&mut self.toolkit, request, |s| s.extract_path());
        self.record(result)
    }

    /// Keeps the error slot in step with a finished call: a failure stores
    /// its message, a success clears it, a cancel leaves it alone.
    fn record<T>(&mut self, result: Result<Response<T>, Error>) -> Result<Response<T>, Error> {
        match &result {
            Ok(Response::Okay(_)) => self.last_error = None,
            Ok(Response::Cancel) => {}
            Err(e) => {
                warn!(error = %e, "dialog failed");
                self.last_error = Some(e.to_string());
            }
        }
        result
    }
}

fn request(
    kind: DialogKind,
    filters: &[FilterDescriptor],
    default_path: Option<&Path>,
    default_name: Option<&str>,
) -> DialogRequest {
    let mut request = DialogRequest::new(kind).filters(filters.iter().cloned());
    if let Some(path) = default_path {
        request = request.default_path(path);
    }
    if let Some(name) = default_name {
        request = request.default_name(name);
    }
    request
}
