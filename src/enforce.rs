//! Appending the active filter's extension to a save dialog's file name.

use tracing::debug;

use crate::{backend::NativeDialog, error::Error, filter::FilterExtensionIndex};

/// Runs right before a save dialog accepts. If the typed name has no `.`
/// and the active filter has an extension, writes `<name>.<ext>` back into
/// the dialog. Returns whether the name changed.
pub(crate) fn apply<D: NativeDialog + ?Sized>(
    dialog: &mut D,
    index: &FilterExtensionIndex,
) -> Result<bool, Error> {
    let name = dialog.current_name()?;
    let extension = dialog.current_filter().and_then(|id| index.extension(id));

    let Some(corrected) = with_extension(&name, extension) else {
        return Ok(false);
    };
    debug!(%name, %corrected, "appending filter extension");
    dialog.set_current_name(&corrected)?;
    Ok(true)
}

fn with_extension(name: &str, extension: Option<&str>) -> Option<String> {
    if name.is_empty() || name.contains('.') {
        return None;
    }
    extension.map(|ext| format!("{name}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_when_no_dot() {
        assert_eq!(with_extension("report", Some("csv")).as_deref(), Some("report.csv"));
    }

    #[test]
    fn keeps_names_that_already_have_a_dot() {
        assert_eq!(with_extension("Untitled.c", Some("h")), None);
        assert_eq!(with_extension("archive.", Some("zip")), None);
        assert_eq!(with_extension(".profile", Some("sh")), None);
    }

    #[test]
    fn leaves_empty_name_alone() {
        assert_eq!(with_extension("", Some("csv")), None);
    }

    #[test]
    fn catch_all_has_no_extension() {
        assert_eq!(with_extension("report", None), None);
    }
}
