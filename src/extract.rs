//! Turning the native dialog's selected items into filesystem paths.

use std::{
    fmt,
    io::{self, Read},
    path::PathBuf,
    rc::Rc,
};

use tracing::{debug, warn};

use crate::{
    backend::NativeDialog,
    error::Error,
    path_set::PathSet,
    session::DialogKind,
};

/// A selected item whose contents live somewhere other than the local
/// filesystem (a remote share, a virtual folder, ...).
pub(crate) trait RemoteSource {
    fn uri(&self) -> &str;
    fn open(&self) -> io::Result<Box<dyn Read + '_>>;
}

/// One selected item as the toolkit reports it.
#[derive(Clone)]
pub(crate) enum NativeItem {
    Local(PathBuf),
    Remote(Rc<dyn RemoteSource>),
}

impl fmt::Debug for NativeItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeItem::Local(path) => f.debug_tuple("Local").field(path).finish(),
            NativeItem::Remote(src) => f.debug_tuple("Remote").field(&src.uri()).finish(),
        }
    }
}

impl NativeItem {
    /// Resolves an item picked for reading. Non-local items are copied into
    /// a local temporary file whose path is returned.
    pub(crate) fn into_readable_path(self) -> Result<PathBuf, Error> {
        match self {
            NativeItem::Local(path) => Ok(path),
            NativeItem::Remote(src) => materialize(src.as_ref()),
        }
    }

    /// Resolves an item picked as a target (save location, folder). A
    /// non-local target cannot be replaced by a local copy.
    pub(crate) fn into_target_path(self) -> Result<PathBuf, Error> {
        match self {
            NativeItem::Local(path) => Ok(path),
            NativeItem::Remote(src) => Err(Error::NonLocal(src.uri().to_string())),
        }
    }
}

/// Copies a remote item into a fresh local temporary file.
///
/// The file keeps the remote name's extension and is not deleted
/// afterwards; it belongs to the caller like any other selected path.
pub(crate) fn materialize(src: &dyn RemoteSource) -> Result<PathBuf, Error> {
    let suffix = remote_extension(src.uri())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();

    let mut file = tempfile::Builder::new()
        .prefix("nfd-")
        .suffix(&suffix)
        .tempfile()
        .map_err(|e| Error::io("failed to create local copy", e))?;

    let mut reader = src
        .open()
        .map_err(|e| Error::io("failed to open non-local item", e))?;
    let copied = io::copy(&mut reader, file.as_file_mut())
        .map_err(|e| Error::io("failed to copy non-local item", e))?;

    let (_, path) = file
        .keep()
        .map_err(|e| Error::io("failed to keep local copy", e.error))?;
    debug!(uri = src.uri(), path = %path.display(), bytes = copied, "materialized non-local item");

    Ok(path)
}

fn remote_extension(uri: &str) -> Option<&str> {
    let name = uri
        .split(['?', '#'])
        .next()?
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())?;
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then_some(ext)
}

/// Extracts the single path of an accepted Open, Save or PickFolder dialog.
///
/// Returns `Ok(None)` when the selection is a non-local save or folder
/// target, which is reported to the caller as a cancelled dialog.
pub(crate) fn single_path<D: NativeDialog + ?Sized>(
    dialog: &mut D,
    kind: DialogKind,
) -> Result<Option<PathBuf>, Error> {
    let item = dialog.selected_item()?;
    let resolved = match kind {
        DialogKind::OpenSingle | DialogKind::OpenMultiple => item.into_readable_path(),
        DialogKind::Save | DialogKind::PickFolder => item.into_target_path(),
    };

    match resolved {
        Ok(path) if path.as_os_str().is_empty() => {
            Err(Error::platform("could not get file path for selected item"))
        }
        Ok(path) => Ok(Some(path)),
        Err(Error::NonLocal(uri)) => {
            warn!(%uri, ?kind, "non-local target selected, treating as cancel");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Wraps the accepted multi-selection without resolving its paths.
pub(crate) fn path_set<D: NativeDialog + ?Sized>(dialog: &mut D) -> Result<PathSet, Error> {
    let set = dialog.selected_items()?;
    if set.count()? == 0 {
        return Err(Error::platform("dialog returned no selected items"));
    }
    Ok(set)
}
