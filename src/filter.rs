//! Filter compilation: portable `(name, "ext1,ext2")` descriptors into the
//! per-dialog native filter list.

use std::{collections::HashMap, ops::Range};

use crate::{backend::NativeDialog, error::Error};

/// Display name of the filter appended after the caller's filters.
pub const CATCH_ALL_NAME: &str = "All files";
const CATCH_ALL_PATTERN: &str = "*";

/// One selectable file-type category.
///
/// `spec` is a comma-separated list of extensions without leading dots,
/// e.g. `"png,jpg"`. Every extension must be non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDescriptor {
    pub name: String,
    pub spec: String,
}

impl FilterDescriptor {
    pub fn new(name: impl Into<String>, spec: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: spec.into(),
        }
    }
}

impl From<(&str, &str)> for FilterDescriptor {
    fn from((name, spec): (&str, &str)) -> Self {
        Self::new(name, spec)
    }
}

/// Handle of a filter once it has been added to a native dialog.
///
/// The value is the filter's position in the dialog's filter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterId(pub(crate) usize);

impl FilterId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A filter ready to be handed to a native dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFilter {
    name: String,
    display_name: String,
    patterns: Vec<String>,
    spec: String,
    first_extension: Option<Range<usize>>,
}

impl CompiledFilter {
    fn catch_all() -> Self {
        Self {
            name: CATCH_ALL_NAME.to_string(),
            display_name: CATCH_ALL_NAME.to_string(),
            patterns: vec![CATCH_ALL_PATTERN.to_string()],
            spec: String::new(),
            first_extension: None,
        }
    }

    /// The caller-supplied name, without the pattern suffix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable name, e.g. `Image files (*.png, *.jpg)`.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Glob patterns in the order the extensions were given.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn first_extension(&self) -> Option<&str> {
        self.first_extension.clone().map(|r| &self.spec[r])
    }

    pub fn is_catch_all(&self) -> bool {
        self.first_extension.is_none()
    }
}

/// Compiles `descriptors` into native filters.
///
/// The result always holds `descriptors.len() + 1` filters; the last one is
/// the catch-all matching every file.
pub fn compile(descriptors: &[FilterDescriptor]) -> Result<Vec<CompiledFilter>, Error> {
    let mut compiled = Vec::new();
    compiled
        .try_reserve_exact(descriptors.len() + 1)
        .map_err(|_| Error::Allocation("filter list"))?;

    for descriptor in descriptors {
        compiled.push(compile_one(descriptor)?);
    }
    compiled.push(CompiledFilter::catch_all());

    Ok(compiled)
}

fn compile_one(descriptor: &FilterDescriptor) -> Result<CompiledFilter, Error> {
    let token_count = descriptor.spec.split(',').count();
    let mut patterns = Vec::new();
    patterns
        .try_reserve_exact(token_count)
        .map_err(|_| Error::Allocation("filter patterns"))?;

    let mut first_extension = None;
    let mut start = 0;
    for token in descriptor.spec.split(',') {
        if token.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "filter \"{}\" has an empty extension in \"{}\"",
                descriptor.name, descriptor.spec
            )));
        }
        if first_extension.is_none() {
            first_extension = Some(start..start + token.len());
        }
        start += token.len() + 1;
        patterns.push(format!("*.{token}"));
    }

    let display_name = format!("{} ({})", descriptor.name, patterns.join(", "));

    Ok(CompiledFilter {
        name: descriptor.name.clone(),
        display_name,
        patterns,
        spec: descriptor.spec.clone(),
        first_extension,
    })
}

/// Maps native filter handles to the first extension of their filter.
///
/// Only the extension enforcer of save dialogs reads it.
#[derive(Debug, Default)]
pub(crate) struct FilterExtensionIndex {
    entries: HashMap<FilterId, String>,
}

impl FilterExtensionIndex {
    pub(crate) fn extension(&self, id: FilterId) -> Option<&str> {
        self.entries.get(&id).map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Adds `filters` to `dialog` in order and indexes their first extensions.
pub(crate) fn attach<D: NativeDialog + ?Sized>(
    dialog: &mut D,
    filters: &[CompiledFilter],
) -> Result<FilterExtensionIndex, Error> {
    let mut index = FilterExtensionIndex::default();
    for filter in filters {
        let id = dialog.add_filter(filter)?;
        if let Some(ext) = filter.first_extension() {
            index.entries.insert(id, ext.to_string());
        }
    }
    Ok(index)
}
