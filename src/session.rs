//! One dialog invocation, from creating the native dialog to destroying it.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::{
    backend::{DialogEvent, DialogOptions, NativeDialog, Toolkit},
    enforce,
    error::Error,
    extract,
    filter::{self, FilterDescriptor, FilterExtensionIndex},
    path_set::PathSet,
    Response,
};

/// The kind of file dialog to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    OpenSingle,
    OpenMultiple,
    Save,
    PickFolder,
}

impl DialogKind {
    pub fn title(self) -> &'static str {
        match self {
            DialogKind::OpenSingle => "Open File",
            DialogKind::OpenMultiple => "Open Files",
            DialogKind::Save => "Save File",
            DialogKind::PickFolder => "Select folder",
        }
    }

    pub(crate) fn options(self) -> DialogOptions {
        match self {
            DialogKind::OpenMultiple => DialogOptions::MULTIPLE,
            DialogKind::Save => DialogOptions::CONFIRM_OVERWRITE,
            DialogKind::PickFolder => DialogOptions::FOLDERS,
            DialogKind::OpenSingle => DialogOptions::empty(),
        }
    }

    fn has_filters(self) -> bool {
        self != DialogKind::PickFolder
    }
}

/// Everything needed to show one dialog.
///
/// # Example
///
/// ```no_run
/// use nfd::{Context, DialogRequest, Selection};
///
/// let mut ctx = Context::init().unwrap();
/// let request = DialogRequest::save()
///     .filter("Source code", "c,cpp,cc")
///     .filter("Headers", "h,hpp")
///     .default_name("Untitled.c");
/// if let nfd::Response::Okay(Selection::Path(path)) = ctx.run(&request).unwrap() {
///     println!("{}", path.display());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DialogRequest {
    kind: DialogKind,
    filters: Vec<FilterDescriptor>,
    default_path: Option<PathBuf>,
    default_name: Option<String>,
}

impl DialogRequest {
    pub fn new(kind: DialogKind) -> Self {
        Self {
            kind,
            filters: Vec::new(),
            default_path: None,
            default_name: None,
        }
    }

    pub fn open() -> Self {
        Self::new(DialogKind::OpenSingle)
    }

    pub fn open_multiple() -> Self {
        Self::new(DialogKind::OpenMultiple)
    }

    pub fn save() -> Self {
        Self::new(DialogKind::Save)
    }

    pub fn pick_folder() -> Self {
        Self::new(DialogKind::PickFolder)
    }

    /// Adds a filter; `spec` lists extensions without dots, e.g. `"png,jpg"`.
    /// Ignored by folder pickers.
    pub fn filter(mut self, name: &str, spec: &str) -> Self {
        self.filters.push(FilterDescriptor::new(name, spec));
        self
    }

    pub fn filters<I, F>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FilterDescriptor>,
    {
        self.filters.extend(filters.into_iter().map(Into::into));
        self
    }

    /// Folder the dialog starts in. A missing folder is ignored.
    pub fn default_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_path = Some(path.into());
        self
    }

    /// Name pre-filled in a save dialog.
    pub fn default_name(mut self, name: impl Into<String>) -> Self {
        self.default_name = Some(name.into());
        self
    }

    pub fn kind(&self) -> DialogKind {
        self.kind
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Configured,
    Shown,
    Accepted,
    Cancelled,
    Failed,
}

/// Owns one native dialog. Dropping the session destroys the dialog, with
/// the toolkit's event queue drained before and after.
pub(crate) struct DialogSession<'t, T: Toolkit> {
    toolkit: &'t mut T,
    dialog: T::Dialog,
    kind: DialogKind,
    state: State,
    extensions: FilterExtensionIndex,
}

impl<'t, T: Toolkit> DialogSession<'t, T> {
    pub(crate) fn create(toolkit: &'t mut T, kind: DialogKind) -> Result<Self, Error> {
        let dialog = toolkit.create_dialog(kind)?;
        trace!(?kind, "dialog created");
        Ok(Self {
            toolkit,
            dialog,
            kind,
            state: State::Created,
            extensions: FilterExtensionIndex::default(),
        })
    }

    pub(crate) fn configure(&mut self, request: &DialogRequest) -> Result<(), Error> {
        debug_assert_eq!(self.state, State::Created);

        self.dialog.set_options(self.kind.options())?;

        if self.kind.has_filters() {
            let compiled = filter::compile(&request.filters)?;
            self.extensions = filter::attach(&mut self.dialog, &compiled)?;
        }

        if let Some(path) = non_empty_path(request.default_path.as_deref()) {
            if !self.dialog.set_folder(path)? {
                debug!(path = %path.display(), "default path not accessible, ignoring");
            }
        }

        if self.kind == DialogKind::Save {
            if let Some(name) = request.default_name.as_deref().filter(|n| !n.is_empty()) {
                self.dialog.set_current_name(name)?;
            }
        }

        self.state = State::Configured;
        trace!(kind = ?self.kind, "dialog configured");
        Ok(())
    }

    /// Shows the dialog and pumps the toolkit until the user responds.
    /// Returns `true` when the dialog was accepted.
    pub(crate) fn show(&mut self) -> Result<bool, Error> {
        debug_assert_eq!(self.state, State::Configured);

        self.dialog.present()?;
        self.state = State::Shown;

        loop {
            match self.dialog.pump()? {
                None => continue,
                Some(DialogEvent::AcceptRequested) => {
                    if self.kind == DialogKind::Save && !self.dialog.auto_extension() {
                        enforce::apply(&mut self.dialog, &self.extensions)?;
                    }
                    self.dialog.confirm_accept()?;
                }
                Some(DialogEvent::Accepted) => {
                    self.state = State::Accepted;
                    trace!(kind = ?self.kind, "dialog accepted");
                    return Ok(true);
                }
                Some(DialogEvent::Cancelled) => {
                    self.state = State::Cancelled;
                    trace!(kind = ?self.kind, "dialog cancelled");
                    return Ok(false);
                }
            }
        }
    }

    pub(crate) fn extract_path(&mut self) -> Result<Response<PathBuf>, Error> {
        debug_assert_eq!(self.state, State::Accepted);
        match extract::single_path(&mut self.dialog, self.kind)? {
            Some(path) => Ok(Response::Okay(path)),
            None => {
                self.state = State::Cancelled;
                Ok(Response::Cancel)
            }
        }
    }

    pub(crate) fn extract_paths(&mut self) -> Result<Response<PathSet>, Error> {
        debug_assert_eq!(self.state, State::Accepted);
        extract::path_set(&mut self.dialog).map(Response::Okay)
    }
}

impl<T: Toolkit> Drop for DialogSession<'_, T> {
    fn drop(&mut self) {
        self.toolkit.drain_events();
        self.dialog.destroy();
        self.toolkit.drain_events();
        trace!(kind = ?self.kind, state = ?self.state, "dialog destroyed");
    }
}

fn non_empty_path(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| !p.as_os_str().is_empty())
}

/// Runs a complete dialog: create, configure, show, and on accept
/// `extract`. The dialog is destroyed on every path out of this function.
pub(crate) fn run<T, R>(
    toolkit: &mut T,
    request: &DialogRequest,
    extract: impl FnOnce(&mut DialogSession<'_, T>) -> Result<Response<R>, Error>,
) -> Result<Response<R>, Error>
where
    T: Toolkit,
{
    let mut session = DialogSession::create(toolkit, request.kind)?;

    let result = drive(&mut session, request, extract);
    if result.is_err() {
        session.state = State::Failed;
    }
    result
}

fn drive<T, R>(
    session: &mut DialogSession<'_, T>,
    request: &DialogRequest,
    extract: impl FnOnce(&mut DialogSession<'_, T>) -> Result<Response<R>, Error>,
) -> Result<Response<R>, Error>
where
    T: Toolkit,
{
    session.configure(request)?;
    if !session.show()? {
        return Ok(Response::Cancel);
    }
    extract(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::scripted::{Action, Event, ScriptedItem, ScriptedToolkit};

    #[test]
    fn destroy_is_bracketed_by_drains() {
        let mut toolkit = ScriptedToolkit::new().script([Action::Cancel]);
        let journal = toolkit.journal();

        let result = run(&mut toolkit, &DialogRequest::open(), |s| s.extract_path()).unwrap();
        assert!(matches!(result, Response::Cancel));

        let events = journal.events();
        let tail = &events[events.len() - 3..];
        assert_eq!(tail, [Event::Drained, Event::Destroyed, Event::Drained]);
    }

    #[test]
    fn configure_failure_still_destroys() {
        let mut toolkit = ScriptedToolkit::new()
            .fail_folder("/broken")
            .script([Action::Accept]);
        let journal = toolkit.journal();

        let request = DialogRequest::open().default_path("/broken");
        let err = run(&mut toolkit, &request, |s| s.extract_path()).unwrap_err();
        assert!(matches!(err, Error::Platform(_)));

        let events = journal.events();
        assert!(!events.contains(&Event::Presented));
        assert_eq!(events.last(), Some(&Event::Drained));
        assert!(events.contains(&Event::Destroyed));
    }

    #[test]
    fn invalid_filter_aborts_before_show() {
        let mut toolkit = ScriptedToolkit::new().script([Action::Accept]);
        let journal = toolkit.journal();

        let request = DialogRequest::open().filter("Broken", "png,,jpg");
        let err = run(&mut toolkit, &request, |s| s.extract_path()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(journal.dialogs()[0].filters.is_empty());
        assert!(journal.events().contains(&Event::Destroyed));
    }

    #[test]
    fn folder_picker_gets_no_filters() {
        let dir = tempfile::tempdir().unwrap();
        let mut toolkit = ScriptedToolkit::new().script([
            Action::Select(vec![ScriptedItem::local(dir.path())]),
            Action::Accept,
        ]);
        let journal = toolkit.journal();

        let request = DialogRequest::pick_folder().filter("Ignored", "txt");
        let result = run(&mut toolkit, &request, |s| s.extract_path()).unwrap();
        match result {
            Response::Okay(path) => assert_eq!(path, dir.path()),
            Response::Cancel => panic!("cancelled"),
        }
        assert!(journal.dialogs()[0].filters.is_empty());
    }

    #[test]
    fn save_enables_overwrite_confirmation() {
        assert!(DialogKind::Save.options().contains(DialogOptions::CONFIRM_OVERWRITE));
        assert!(DialogKind::OpenMultiple.options().contains(DialogOptions::MULTIPLE));
        assert!(DialogKind::PickFolder.options().contains(DialogOptions::FOLDERS));
        assert!(DialogKind::OpenSingle.options().is_empty());
    }
}
