//! Common Item Dialogs (`IFileOpenDialog`, `IFileSaveDialog`) through COM.

use std::{
    borrow::Cow,
    ffi::OsString,
    marker::PhantomData,
    os::windows::ffi::OsStringExt,
    path::{Path, PathBuf},
};

use tracing::{debug, trace};
use windows::{
    core::{HSTRING, PCWSTR, PWSTR},
    Win32::{
        Foundation::{
            ERROR_CANCELLED, ERROR_FILE_NOT_FOUND, ERROR_INVALID_DRIVE, ERROR_PATH_NOT_FOUND,
            HWND, RPC_E_CHANGED_MODE,
        },
        System::Com::{
            CoCreateInstance, CoInitializeEx, CoTaskMemFree, CoUninitialize, CLSCTX_ALL,
            COINIT_APARTMENTTHREADED, COINIT_DISABLE_OLE1DDE,
        },
        UI::{
            Shell::{
                Common::COMDLG_FILTERSPEC, FileOpenDialog, FileSaveDialog, IFileDialog,
                IFileOpenDialog, IFileSaveDialog, IShellItem, IShellItemArray,
                SHCreateItemFromParsingName, FILEOPENDIALOGOPTIONS, FOS_ALLOWMULTISELECT,
                FOS_FORCEFILESYSTEM, FOS_OVERWRITEPROMPT, FOS_PICKFOLDERS, SIGDN_FILESYSPATH,
            },
            WindowsAndMessaging::{
                DispatchMessageW, GetForegroundWindow, GetWindowThreadProcessId, PeekMessageW,
                TranslateMessage, MSG, PM_REMOVE,
            },
        },
    },
};

use super::{DialogEvent, DialogOptions, NativeDialog, Toolkit};
use crate::{
    error::Error,
    extract::NativeItem,
    filter::{CompiledFilter, FilterId},
    path_set::{IndexedPaths, PathSet},
    session::DialogKind,
};

const CATCH_ALL_SPEC: &str = "*.*";

pub(crate) struct Win32Toolkit {
    /// Whether this toolkit's `CoInitializeEx` must be balanced on drop.
    owns_com: bool,
    _not_send: PhantomData<*const ()>,
}

impl Win32Toolkit {
    pub(crate) fn init() -> Result<Self, Error> {
        let hr = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED | COINIT_DISABLE_OLE1DDE) };
        // A thread already running a multithreaded apartment still works.
        let owns_com = if hr == RPC_E_CHANGED_MODE {
            debug!("COM already initialized with another concurrency model");
            false
        } else {
            hr.ok()
                .map_err(|e| Error::ToolkitInit(format!("failed to initialize COM: {e}")))?;
            true
        };

        Ok(Self {
            owns_com,
            _not_send: PhantomData,
        })
    }
}

impl Drop for Win32Toolkit {
    fn drop(&mut self) {
        if self.owns_com {
            unsafe { CoUninitialize() };
        }
    }
}

impl Toolkit for Win32Toolkit {
    type Dialog = Win32Dialog;

    fn create_dialog(&mut self, kind: DialogKind) -> Result<Win32Dialog, Error> {
        let handle = unsafe {
            match kind {
                DialogKind::Save => CoCreateInstance(&FileSaveDialog, None, CLSCTX_ALL).map(Handle::Save),
                _ => CoCreateInstance(&FileOpenDialog, None, CLSCTX_ALL).map(Handle::Open),
            }
        }
        .map_err(|e| Error::com("failed to create file dialog", e))?;

        unsafe { handle.dialog().SetTitle(&HSTRING::from(kind.title())) }
            .map_err(|e| Error::com("failed to set dialog title", e))?;

        Ok(Win32Dialog {
            handle,
            filters: Vec::new(),
            default_extension: None,
            state: State::Pending,
        })
    }

    fn drain_events(&mut self) {
        let mut msg = MSG::default();
        unsafe {
            while PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_REMOVE).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }
}

enum Handle {
    Open(IFileOpenDialog),
    Save(IFileSaveDialog),
}

impl Handle {
    fn dialog(&self) -> &IFileDialog {
        match self {
            Handle::Open(d) => d,
            Handle::Save(d) => d,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Pending,
    Shown,
    Confirmed,
    Closed,
}

pub(crate) struct Win32Dialog {
    handle: Handle,
    /// Display name and `;`-joined patterns of each filter, kept alive for
    /// `SetFileTypes`.
    filters: Vec<(HSTRING, HSTRING)>,
    default_extension: Option<HSTRING>,
    state: State,
}

impl NativeDialog for Win32Dialog {
    fn set_options(&mut self, options: DialogOptions) -> Result<(), Error> {
        let dialog = self.handle.dialog();
        let mut flags: FILEOPENDIALOGOPTIONS = unsafe { dialog.GetOptions() }
            .map_err(|e| Error::com("failed to read dialog options", e))?;

        flags |= FOS_FORCEFILESYSTEM;
        if options.contains(DialogOptions::FOLDERS) {
            flags |= FOS_PICKFOLDERS;
        }
        if options.contains(DialogOptions::MULTIPLE) {
            flags |= FOS_ALLOWMULTISELECT;
        }
        if options.contains(DialogOptions::CONFIRM_OVERWRITE) {
            flags |= FOS_OVERWRITEPROMPT;
        }

        unsafe { dialog.SetOptions(flags) }.map_err(|e| Error::com("failed to set dialog options", e))
    }

    fn add_filter(&mut self, filter: &CompiledFilter) -> Result<FilterId, Error> {
        let spec = if filter.is_catch_all() {
            CATCH_ALL_SPEC.to_string()
        } else {
            filter.patterns().join(";")
        };
        if self.default_extension.is_none() {
            self.default_extension = filter.first_extension().map(HSTRING::from);
        }

        let id = FilterId(self.filters.len());
        self.filters
            .push((HSTRING::from(filter.display_name()), HSTRING::from(spec)));
        Ok(id)
    }

    fn set_folder(&mut self, path: &Path) -> Result<bool, Error> {
        let wide = HSTRING::from(path.as_os_str());
        let item: IShellItem = match unsafe { SHCreateItemFromParsingName(&wide, None) } {
            Ok(item) => item,
            Err(e) if is_missing_path(&e) => return Ok(false),
            Err(e) => return Err(Error::com("failed to create shell item for default folder", e)),
        };

        unsafe { self.handle.dialog().SetFolder(&item) }
            .map_err(|e| Error::com("failed to set default folder", e))?;
        Ok(true)
    }

    fn set_current_name(&mut self, name: &str) -> Result<(), Error> {
        unsafe { self.handle.dialog().SetFileName(&HSTRING::from(name)) }
            .map_err(|e| Error::com("failed to set file name", e))
    }

    fn current_name(&self) -> Result<String, Error> {
        let name = unsafe { self.handle.dialog().GetFileName() }
            .map_err(|e| Error::com("failed to read file name", e))?;
        Ok(take_wide(name).to_string_lossy().into_owned())
    }

    fn current_filter(&self) -> Option<FilterId> {
        let index = unsafe { self.handle.dialog().GetFileTypeIndex() }.ok()?;
        // The index is 1-based; 0 means no filter is active.
        index.checked_sub(1).map(|i| FilterId(i as usize))
    }

    /// `SetDefaultExtension` makes the dialog append the active filter's
    /// extension itself.
    fn auto_extension(&self) -> bool {
        true
    }

    fn present(&mut self) -> Result<(), Error> {
        let dialog = self.handle.dialog();
        if !self.filters.is_empty() {
            let specs: Vec<COMDLG_FILTERSPEC> = self
                .filters
                .iter()
                .map(|(name, spec)| COMDLG_FILTERSPEC {
                    pszName: PCWSTR::from_raw(name.as_ptr()),
                    pszSpec: PCWSTR::from_raw(spec.as_ptr()),
                })
                .collect();
            unsafe {
                dialog
                    .SetFileTypes(&specs)
                    .map_err(|e| Error::com("failed to set file types", e))?;
                dialog
                    .SetFileTypeIndex(1)
                    .map_err(|e| Error::com("failed to select file type", e))?;
            }
        }
        if let Some(ext) = &self.default_extension {
            unsafe { dialog.SetDefaultExtension(ext) }
                .map_err(|e| Error::com("failed to set default extension", e))?;
        }
        Ok(())
    }

    fn pump(&mut self) -> Result<Option<DialogEvent>, Error> {
        match self.state {
            State::Pending => {}
            State::Confirmed => return Ok(Some(DialogEvent::Accepted)),
            State::Shown | State::Closed => {
                return Err(Error::platform("file dialog is not waiting for input"));
            }
        }

        self.state = State::Shown;
        let owner = owner_window();
        trace!(owner = ?owner.0, "showing file dialog");

        // Show runs its own modal loop and only returns once the user is done.
        match unsafe { self.handle.dialog().Show(owner) } {
            Ok(()) => Ok(Some(DialogEvent::AcceptRequested)),
            Err(e) if e.code() == ERROR_CANCELLED.to_hresult() => {
                self.state = State::Closed;
                Ok(Some(DialogEvent::Cancelled))
            }
            Err(e) => {
                self.state = State::Closed;
                Err(Error::com("failed to show file dialog", e))
            }
        }
    }

    fn confirm_accept(&mut self) -> Result<(), Error> {
        self.state = State::Confirmed;
        Ok(())
    }

    fn selected_item(&mut self) -> Result<NativeItem, Error> {
        let item = unsafe {
            match &self.handle {
                Handle::Open(d) => d.GetResult(),
                Handle::Save(d) => d.GetResult(),
            }
        }
        .map_err(|e| Error::com("failed to get selected item", e))?;
        file_system_path(&item).map(NativeItem::Local)
    }

    fn selected_items(&mut self) -> Result<PathSet, Error> {
        let Handle::Open(dialog) = &self.handle else {
            return Err(Error::platform("save dialogs have no multiple selection"));
        };
        let items = unsafe { dialog.GetResults() }
            .map_err(|e| Error::com("failed to get selected items", e))?;
        Ok(PathSet::shell_items(ShellItems(items)))
    }

    fn destroy(&mut self) {
        self.state = State::Closed;
    }
}

/// The selection of an open dialog, resolved to paths one item at a time.
pub(crate) struct ShellItems(IShellItemArray);

impl IndexedPaths for ShellItems {
    fn len(&self) -> Result<usize, Error> {
        unsafe { self.0.GetCount() }
            .map(|n| n as usize)
            .map_err(|e| Error::com("failed to count selected items", e))
    }

    fn path_at(&self, index: usize) -> Result<Cow<'_, Path>, Error> {
        let item = unsafe { self.0.GetItemAt(index as u32) }
            .map_err(|e| Error::com("failed to get selected item", e))?;
        file_system_path(&item).map(Cow::Owned)
    }
}

fn file_system_path(item: &IShellItem) -> Result<PathBuf, Error> {
    let name = unsafe { item.GetDisplayName(SIGDN_FILESYSPATH) }
        .map_err(|e| Error::com("could not get file path for selected item", e))?;
    Ok(PathBuf::from(take_wide(name)))
}

/// Copies a COM-allocated string and frees it.
fn take_wide(s: PWSTR) -> OsString {
    if s.is_null() {
        return OsString::new();
    }
    let owned = OsString::from_wide(unsafe { s.as_wide() });
    unsafe { CoTaskMemFree(Some(s.0 as *const _)) };
    owned
}

fn is_missing_path(e: &windows::core::Error) -> bool {
    [ERROR_FILE_NOT_FOUND, ERROR_PATH_NOT_FOUND, ERROR_INVALID_DRIVE]
        .iter()
        .any(|code| e.code() == code.to_hresult())
}

/// The foreground window, if this process owns it, so the dialog opens
/// modal to the window the user was working in.
fn owner_window() -> HWND {
    unsafe {
        let window = GetForegroundWindow();
        let mut pid = 0;
        GetWindowThreadProcessId(window, Some(&mut pid));
        if pid == std::process::id() {
            window
        } else {
            HWND::default()
        }
    }
}
