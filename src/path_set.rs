//! The result of a multi-selection open dialog.
//!
//! Every backend hands its native collection over as-is: zenity-style
//! helpers produce a singly linked list of paths, URL-speaking helpers and
//! the scripted toolkit an indexed item model, and Windows an
//! `IShellItemArray`. [`PathSet`] puts one
//! interface over all three.

use std::{
    borrow::Cow,
    cell::OnceCell,
    fmt,
    path::{Path, PathBuf},
};

use crate::{error::Error, extract::NativeItem};

/// Collections that support random access by index.
pub(crate) trait IndexedPaths {
    fn len(&self) -> Result<usize, Error>;
    fn path_at(&self, index: usize) -> Result<Cow<'_, Path>, Error>;
}

/// Paths selected in a multi-selection dialog.
///
/// Dropping the set (or calling [`free`](Self::free)) releases the native
/// collection; enumerators and borrowed paths cannot outlive it.
pub struct PathSet {
    inner: Collection,
}

enum Collection {
    Linked(LinkedPaths),
    Model(ItemModel),
    #[cfg(windows)]
    ShellItems(crate::backend::win32::ShellItems),
}

impl PathSet {
    pub(crate) fn linked(paths: LinkedPaths) -> Self {
        Self {
            inner: Collection::Linked(paths),
        }
    }

    pub(crate) fn model(items: Vec<NativeItem>) -> Self {
        Self {
            inner: Collection::Model(ItemModel {
                copies: items.iter().map(|_| OnceCell::new()).collect(),
                items,
            }),
        }
    }

    #[cfg(windows)]
    pub(crate) fn shell_items(items: crate::backend::win32::ShellItems) -> Self {
        Self {
            inner: Collection::ShellItems(items),
        }
    }

    /// Number of selected paths.
    pub fn count(&self) -> Result<usize, Error> {
        match &self.inner {
            Collection::Linked(list) => Ok(list.len()),
            Collection::Model(model) => model.len(),
            #[cfg(windows)]
            Collection::ShellItems(items) => items.len(),
        }
    }

    /// The path at `index`, in the order the dialog reported the selection.
    ///
    /// Takes O(`index`) on the linked-list backend; use
    /// [`enumerator`](Self::enumerator) for sequential access.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`count`](Self::count).
    pub fn get_at(&self, index: usize) -> Result<Cow<'_, Path>, Error> {
        match &self.inner {
            Collection::Linked(list) => match list.nth(index) {
                Some(path) => Ok(Cow::Borrowed(path)),
                None => out_of_range(index, list.len()),
            },
            Collection::Model(model) => checked_at(model, index),
            #[cfg(windows)]
            Collection::ShellItems(items) => checked_at(items, index),
        }
    }

    /// A fresh forward-only cursor over the selected paths.
    pub fn enumerator(&self) -> PathEnumerator<'_> {
        let cursor = match &self.inner {
            Collection::Linked(list) => Cursor::Linked(list.head.as_deref()),
            Collection::Model(model) => Cursor::indexed(model),
            #[cfg(windows)]
            Collection::ShellItems(items) => Cursor::indexed(items),
        };
        PathEnumerator { cursor }
    }

    /// Releases the native collection.
    pub fn free(self) {}
}

impl fmt::Debug for PathSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backend = match &self.inner {
            Collection::Linked(_) => "linked",
            Collection::Model(_) => "model",
            #[cfg(windows)]
            Collection::ShellItems(_) => "shell-items",
        };
        f.debug_struct("PathSet").field("backend", &backend).finish_non_exhaustive()
    }
}

impl<'a> IntoIterator for &'a PathSet {
    type Item = Result<Cow<'a, Path>, Error>;
    type IntoIter = PathEnumerator<'a>;

    fn into_iter(self) -> PathEnumerator<'a> {
        self.enumerator()
    }
}

fn checked_at<'a>(paths: &'a dyn IndexedPaths, index: usize) -> Result<Cow<'a, Path>, Error> {
    let len = paths.len()?;
    if index >= len {
        return out_of_range(index, len);
    }
    paths.path_at(index)
}

fn out_of_range<T>(index: usize, len: usize) -> T {
    panic!("path set index {index} out of range for {len} paths")
}

/// Forward-only, single-pass cursor over a [`PathSet`].
///
/// Yields `None` once every path has been produced. A failure to resolve
/// a path is yielded once and ends the enumeration.
pub struct PathEnumerator<'a> {
    cursor: Cursor<'a>,
}

enum Cursor<'a> {
    Linked(Option<&'a PathNode>),
    Indexed {
        paths: &'a dyn IndexedPaths,
        next: usize,
        len: Option<usize>,
    },
    Done,
}

impl<'a> Cursor<'a> {
    fn indexed(paths: &'a dyn IndexedPaths) -> Self {
        Cursor::Indexed {
            paths,
            next: 0,
            len: None,
        }
    }
}

impl<'a> Iterator for PathEnumerator<'a> {
    type Item = Result<Cow<'a, Path>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.cursor {
            Cursor::Linked(node) => {
                let current = (*node)?;
                *node = current.next.as_deref();
                Some(Ok(Cow::Borrowed(current.path.as_path())))
            }
            Cursor::Indexed { paths, next, len } => {
                let paths: &'a dyn IndexedPaths = *paths;
                let total = match *len {
                    Some(total) => total,
                    None => match paths.len() {
                        Ok(total) => *len.insert(total),
                        Err(e) => {
                            self.cursor = Cursor::Done;
                            return Some(Err(e));
                        }
                    },
                };
                if *next >= total {
                    self.cursor = Cursor::Done;
                    return None;
                }
                let index = *next;
                *next += 1;
                let item = paths.path_at(index);
                if item.is_err() {
                    self.cursor = Cursor::Done;
                }
                Some(item)
            }
            Cursor::Done => None,
        }
    }
}

/// A singly linked list of owned paths, in selection order.
#[derive(Default)]
pub(crate) struct LinkedPaths {
    head: Option<Box<PathNode>>,
}

struct PathNode {
    path: PathBuf,
    next: Option<Box<PathNode>>,
}

impl LinkedPaths {
    fn len(&self) -> usize {
        let mut len = 0;
        let mut node = self.head.as_deref();
        while let Some(n) = node {
            len += 1;
            node = n.next.as_deref();
        }
        len
    }

    fn nth(&self, index: usize) -> Option<&Path> {
        let mut node = self.head.as_deref();
        for _ in 0..index {
            node = node?.next.as_deref();
        }
        node.map(|n| n.path.as_path())
    }
}

impl FromIterator<PathBuf> for LinkedPaths {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        // Prepend, then reverse in place so the list keeps the input order.
        let mut head = None;
        for path in iter {
            head = Some(Box::new(PathNode { path, next: head }));
        }

        let mut reversed = None;
        while let Some(mut node) = head {
            head = node.next.take();
            node.next = reversed;
            reversed = Some(node);
        }
        Self { head: reversed }
    }
}

impl Drop for LinkedPaths {
    fn drop(&mut self) {
        // Unlink iteratively; recursive drop of a long list overflows the stack.
        let mut node = self.head.take();
        while let Some(mut n) = node {
            node = n.next.take();
        }
    }
}

/// An indexed list of native items, resolved one at a time on access.
/// A non-local item is copied once; later reads return the same copy.
struct ItemModel {
    items: Vec<NativeItem>,
    copies: Vec<OnceCell<PathBuf>>,
}

impl IndexedPaths for ItemModel {
    fn len(&self) -> Result<usize, Error> {
        Ok(self.items.len())
    }

    fn path_at(&self, index: usize) -> Result<Cow<'_, Path>, Error> {
        let remote = match &self.items[index] {
            NativeItem::Local(path) => return Ok(Cow::Borrowed(path.as_path())),
            remote => remote,
        };
        let copy = &self.copies[index];
        if let Some(path) = copy.get() {
            return Ok(Cow::Borrowed(path));
        }
        let path = remote.clone().into_readable_path()?;
        Ok(Cow::Borrowed(copy.get_or_init(|| path)))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::Cell,
        io::{self, Read},
        rc::Rc,
    };

    use super::*;
    use crate::extract::RemoteSource;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    fn collect(set: &PathSet) -> Vec<PathBuf> {
        set.enumerator().map(|p| p.unwrap().into_owned()).collect()
    }

    struct Remote {
        uri: &'static str,
        opened: Cell<usize>,
    }

    impl Remote {
        fn new(uri: &'static str) -> Rc<Self> {
            Rc::new(Self {
                uri,
                opened: Cell::new(0),
            })
        }
    }

    impl RemoteSource for Remote {
        fn uri(&self) -> &str {
            self.uri
        }

        fn open(&self) -> io::Result<Box<dyn Read + '_>> {
            self.opened.set(self.opened.get() + 1);
            Ok(Box::new(&b"remote"[..]))
        }
    }

    #[test]
    fn linked_list_keeps_selection_order() {
        let input = paths(&["/a/3.txt", "/a/1.txt", "/a/2.txt"]);
        let set = PathSet::linked(input.iter().cloned().collect());
        assert_eq!(set.count().unwrap(), 3);
        for (i, expected) in input.iter().enumerate() {
            assert_eq!(set.get_at(i).unwrap(), expected.as_path());
        }
        assert_eq!(collect(&set), input);
    }

    #[test]
    fn count_is_stable_across_reads() {
        let set = PathSet::linked(paths(&["/x", "/y"]).into_iter().collect());
        let first = set.count().unwrap();
        let _ = set.get_at(1).unwrap();
        let _ = set.get_at(0).unwrap();
        assert_eq!(set.count().unwrap(), first);
        assert_eq!(set.count().unwrap(), 2);
    }

    #[test]
    fn enumerator_ends_and_stays_ended() {
        let set = PathSet::model(vec![NativeItem::Local("/only".into())]);
        let mut cursor = set.enumerator();
        assert_eq!(cursor.next().unwrap().unwrap(), Path::new("/only"));
        assert!(cursor.next().is_none());
        assert!(cursor.next().is_none());

        // A new cursor starts over.
        assert_eq!(collect(&set), paths(&["/only"]));
    }

    #[test]
    fn model_materializes_remote_items_lazily() {
        let remote = Remote::new("sftp://host/remote.txt");
        let set = PathSet::model(vec![
            NativeItem::Local("/local.txt".into()),
            NativeItem::Remote(remote.clone()),
        ]);
        assert_eq!(set.count().unwrap(), 2);
        assert!(matches!(set.get_at(0).unwrap(), Cow::Borrowed(_)));
        assert_eq!(remote.opened.get(), 0);

        let copy = set.get_at(1).unwrap().into_owned();
        assert_eq!(copy.extension().and_then(|e| e.to_str()), Some("txt"));
        assert_eq!(std::fs::read(&copy).unwrap(), b"remote");
        std::fs::remove_file(copy).unwrap();
    }

    #[test]
    fn remote_item_is_copied_once() {
        let remote = Remote::new("sftp://host/data.csv");
        let set = PathSet::model(vec![NativeItem::Remote(remote.clone())]);

        let first = set.get_at(0).unwrap().into_owned();
        assert_eq!(set.get_at(0).unwrap(), first.as_path());
        assert_eq!(collect(&set), [first.clone()]);
        assert_eq!(collect(&set), [first.clone()]);
        assert_eq!(remote.opened.get(), 1);
        std::fs::remove_file(first).unwrap();
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn linked_index_past_end_panics() {
        let set = PathSet::linked(paths(&["/a"]).into_iter().collect());
        let _ = set.get_at(1);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn model_index_past_end_panics() {
        let set = PathSet::model(Vec::new());
        let _ = set.get_at(0);
    }

    #[test]
    fn long_list_drops_without_recursion() {
        let set = PathSet::linked((0..200_000).map(|i| PathBuf::from(format!("/f{i}"))).collect());
        assert_eq!(set.count().unwrap(), 200_000);
        set.free();
    }
}
