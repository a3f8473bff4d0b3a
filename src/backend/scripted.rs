//! A toolkit that plays back a fixed list of user actions instead of
//! showing anything on screen.
//!
//! Every call the library makes on it is recorded in a [`Journal`], so
//! tests can check what a real dialog would have been told.
//!
//! ```
//! use nfd::{scripted::{Action, ScriptedToolkit}, Context, Response};
//!
//! let toolkit = ScriptedToolkit::new().script([Action::Cancel]);
//! let mut ctx = Context::scripted(toolkit);
//! assert!(matches!(ctx.open_dialog(&[], None).unwrap(), Response::Cancel));
//! ```

use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt,
    io::{self, Read},
    path::{Path, PathBuf},
    rc::Rc,
};

use tracing::trace;

use crate::{
    backend::{DialogEvent, DialogOptions, NativeDialog, Toolkit},
    error::Error,
    extract::{NativeItem, RemoteSource},
    filter::{CompiledFilter, FilterId},
    path_set::PathSet,
    session::DialogKind,
};

/// One simulated user interaction.
#[derive(Debug, Clone)]
pub enum Action {
    /// Replaces the text of the file name field.
    TypeName(String),
    /// Activates the filter at this position in the dialog's filter list.
    SelectFilter(usize),
    /// Selects items, in this order.
    Select(Vec<ScriptedItem>),
    /// Presses the accept button.
    Accept,
    /// Closes the dialog without accepting.
    Cancel,
}

impl Action {
    fn ends_dialog(&self) -> bool {
        matches!(self, Action::Accept | Action::Cancel)
    }
}

/// An item the simulated user can select.
#[derive(Debug, Clone)]
pub struct ScriptedItem(NativeItem);

impl ScriptedItem {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self(NativeItem::Local(path.into()))
    }

    /// An item that is not on the local filesystem, e.g. on a remote share.
    /// Opening it yields `contents`.
    pub fn remote(uri: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self(NativeItem::Remote(Rc::new(RemoteBytes {
            uri: uri.into(),
            contents: contents.into(),
        })))
    }
}

struct RemoteBytes {
    uri: String,
    contents: Vec<u8>,
}

impl RemoteSource for RemoteBytes {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.contents.as_slice()))
    }
}

/// Toolkit-level happenings, in the order they occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Created,
    Presented,
    Drained,
    Destroyed,
}

/// What one dialog was configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogRecord {
    pub kind: DialogKind,
    pub title: String,
    pub multiple: bool,
    pub confirm_overwrite: bool,
    /// Display names of the filters, in the order they were added.
    pub filters: Vec<String>,
    pub folder: Option<PathBuf>,
    /// Every value written into the name field by the library.
    pub names: Vec<String>,
    /// The name field at the moment the dialog accepted.
    pub accepted_name: Option<String>,
}

/// Shared record of everything a [`ScriptedToolkit`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct Journal(Rc<RefCell<JournalEntries>>);

#[derive(Debug, Default)]
struct JournalEntries {
    events: Vec<Event>,
    dialogs: Vec<DialogRecord>,
}

impl Journal {
    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().events.clone()
    }

    pub fn dialogs(&self) -> Vec<DialogRecord> {
        self.0.borrow().dialogs.clone()
    }

    fn event(&self, event: Event) {
        trace!(?event, "scripted toolkit");
        self.0.borrow_mut().events.push(event);
    }

    fn open(&self, kind: DialogKind) -> usize {
        let mut entries = self.0.borrow_mut();
        entries.events.push(Event::Created);
        entries.dialogs.push(DialogRecord {
            kind,
            title: kind.title().to_string(),
            multiple: false,
            confirm_overwrite: false,
            filters: Vec::new(),
            folder: None,
            names: Vec::new(),
            accepted_name: None,
        });
        entries.dialogs.len() - 1
    }

    fn update(&self, dialog: usize, f: impl FnOnce(&mut DialogRecord)) {
        if let Some(record) = self.0.borrow_mut().dialogs.get_mut(dialog) {
            f(record);
        }
    }
}

/// Deterministic stand-in for a native toolkit.
///
/// Each dialog takes actions from the front of the script up to and
/// including the first [`Action::Accept`] or [`Action::Cancel`].
#[derive(Default)]
pub struct ScriptedToolkit {
    script: VecDeque<Action>,
    failing_folder: Option<PathBuf>,
    journal: Journal,
}

impl ScriptedToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.script.extend(actions);
        self
    }

    /// Makes setting `path` as the start folder fail with a platform error.
    pub fn fail_folder(mut self, path: impl Into<PathBuf>) -> Self {
        self.failing_folder = Some(path.into());
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

impl fmt::Debug for ScriptedToolkit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedToolkit")
            .field("remaining_actions", &self.script.len())
            .finish_non_exhaustive()
    }
}

impl Toolkit for ScriptedToolkit {
    type Dialog = ScriptedDialog;

    fn create_dialog(&mut self, kind: DialogKind) -> Result<ScriptedDialog, Error> {
        let mut actions = VecDeque::new();
        while let Some(action) = self.script.pop_front() {
            let last = action.ends_dialog();
            actions.push_back(action);
            if last {
                break;
            }
        }

        Ok(ScriptedDialog {
            record: self.journal.open(kind),
            journal: self.journal.clone(),
            kind,
            actions,
            failing_folder: self.failing_folder.clone(),
            filter_count: 0,
            active_filter: None,
            folder: None,
            name: String::new(),
            selection: Vec::new(),
            confirmed: false,
        })
    }

    fn drain_events(&mut self) {
        self.journal.event(Event::Drained);
    }
}

pub(crate) struct ScriptedDialog {
    record: usize,
    journal: Journal,
    kind: DialogKind,
    actions: VecDeque<Action>,
    failing_folder: Option<PathBuf>,
    filter_count: usize,
    active_filter: Option<usize>,
    folder: Option<PathBuf>,
    name: String,
    selection: Vec<ScriptedItem>,
    confirmed: bool,
}

impl NativeDialog for ScriptedDialog {
    fn set_options(&mut self, options: DialogOptions) -> Result<(), Error> {
        self.journal.update(self.record, |r| {
            r.multiple = options.contains(DialogOptions::MULTIPLE);
            r.confirm_overwrite = options.contains(DialogOptions::CONFIRM_OVERWRITE);
        });
        Ok(())
    }

    fn add_filter(&mut self, filter: &CompiledFilter) -> Result<FilterId, Error> {
        let id = FilterId(self.filter_count);
        self.filter_count += 1;
        self.active_filter.get_or_insert(0);
        self.journal
            .update(self.record, |r| r.filters.push(filter.display_name().to_string()));
        Ok(id)
    }

    fn set_folder(&mut self, path: &Path) -> Result<bool, Error> {
        if self.failing_folder.as_deref() == Some(path) {
            return Err(Error::platform("scripted toolkit refused the folder"));
        }
        if !path.is_dir() {
            return Ok(false);
        }
        self.folder = Some(path.to_path_buf());
        self.journal
            .update(self.record, |r| r.folder = Some(path.to_path_buf()));
        Ok(true)
    }

    fn set_current_name(&mut self, name: &str) -> Result<(), Error> {
        self.name = name.to_string();
        self.journal
            .update(self.record, |r| r.names.push(name.to_string()));
        Ok(())
    }

    fn current_name(&self) -> Result<String, Error> {
        Ok(self.name.clone())
    }

    fn current_filter(&self) -> Option<FilterId> {
        self.active_filter.map(FilterId)
    }

    fn present(&mut self) -> Result<(), Error> {
        self.journal.event(Event::Presented);
        Ok(())
    }

    fn pump(&mut self) -> Result<Option<DialogEvent>, Error> {
        if self.confirmed {
            return Ok(Some(DialogEvent::Accepted));
        }

        let Some(action) = self.actions.pop_front() else {
            return Err(Error::platform("scripted dialog ran out of actions"));
        };
        trace!(?action, "scripted action");

        match action {
            Action::TypeName(name) => self.name = name,
            Action::SelectFilter(index) => {
                if index >= self.filter_count {
                    return Err(Error::platform("scripted filter index out of range"));
                }
                self.active_filter = Some(index);
            }
            Action::Select(items) => self.selection = items,
            Action::Accept => return Ok(Some(DialogEvent::AcceptRequested)),
            Action::Cancel => return Ok(Some(DialogEvent::Cancelled)),
        }
        Ok(None)
    }

    fn confirm_accept(&mut self) -> Result<(), Error> {
        self.confirmed = true;
        let name = self.name.clone();
        self.journal
            .update(self.record, |r| r.accepted_name = Some(name));
        Ok(())
    }

    fn selected_item(&mut self) -> Result<NativeItem, Error> {
        if let Some(ScriptedItem(item)) = self.selection.first() {
            return Ok(item.clone());
        }
        if self.kind == DialogKind::Save && !self.name.is_empty() {
            let folder = self.folder.clone().unwrap_or_default();
            return Ok(NativeItem::Local(folder.join(&self.name)));
        }
        Err(Error::platform("scripted dialog has no selection"))
    }

    fn selected_items(&mut self) -> Result<PathSet, Error> {
        let items = self
            .selection
            .iter()
            .map(|ScriptedItem(item)| item.clone())
            .collect();
        Ok(PathSet::model(items))
    }

    fn destroy(&mut self) {
        self.journal.event(Event::Destroyed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_dialog_takes_its_own_actions() {
        let mut toolkit = ScriptedToolkit::new().script([
            Action::TypeName("a".into()),
            Action::Cancel,
            Action::Accept,
        ]);

        let first = toolkit.create_dialog(DialogKind::Save).unwrap();
        assert_eq!(first.actions.len(), 2);
        let second = toolkit.create_dialog(DialogKind::OpenSingle).unwrap();
        assert_eq!(second.actions.len(), 1);
        let third = toolkit.create_dialog(DialogKind::OpenSingle).unwrap();
        assert!(third.actions.is_empty());
    }

    #[test]
    fn accept_waits_for_confirmation() {
        let mut toolkit = ScriptedToolkit::new().script([Action::Accept]);
        let mut dialog = toolkit.create_dialog(DialogKind::OpenSingle).unwrap();

        assert_eq!(dialog.pump().unwrap(), Some(DialogEvent::AcceptRequested));
        assert!(dialog.pump().is_err());

        let mut toolkit = ScriptedToolkit::new().script([Action::Accept]);
        let mut dialog = toolkit.create_dialog(DialogKind::OpenSingle).unwrap();
        dialog.pump().unwrap();
        dialog.confirm_accept().unwrap();
        assert_eq!(dialog.pump().unwrap(), Some(DialogEvent::Accepted));
    }

    #[test]
    fn missing_folder_is_tolerated() {
        let mut toolkit = ScriptedToolkit::new();
        let mut dialog = toolkit.create_dialog(DialogKind::OpenSingle).unwrap();
        assert!(!dialog.set_folder(Path::new("/does/not/exist/anywhere")).unwrap());

        let dir = tempfile::tempdir().unwrap();
        assert!(dialog.set_folder(dir.path()).unwrap());
        assert_eq!(toolkit.journal().dialogs()[0].folder.as_deref(), Some(dir.path()));
    }

    #[test]
    fn save_without_selection_joins_folder_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut toolkit = ScriptedToolkit::new();
        let mut dialog = toolkit.create_dialog(DialogKind::Save).unwrap();
        dialog.set_folder(dir.path()).unwrap();
        dialog.set_current_name("notes.txt").unwrap();

        match dialog.selected_item().unwrap() {
            NativeItem::Local(path) => assert_eq!(path, dir.path().join("notes.txt")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn first_filter_is_active_by_default() {
        let mut toolkit = ScriptedToolkit::new().script([Action::SelectFilter(3)]);
        let mut dialog = toolkit.create_dialog(DialogKind::Save).unwrap();
        assert_eq!(dialog.current_filter(), None);

        for filter in crate::filter::compile(&[("Text", "txt").into()]).unwrap() {
            dialog.add_filter(&filter).unwrap();
        }
        assert_eq!(dialog.current_filter(), Some(FilterId(0)));
        assert!(dialog.pump().is_err());
    }
}
