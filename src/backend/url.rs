//! URLs printed by helpers that report selections as URLs (`kdialog
//! --get*url`). `file:` URLs become local paths; anything else stays a
//! remote item, fetched on demand with `kioclient cat` or `gio cat`.

use std::{
    ffi::OsString,
    io::{self, Read},
    os::unix::ffi::OsStringExt,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    rc::Rc,
};

use tracing::debug;

use crate::extract::{NativeItem, RemoteSource};

/// Programs that stream a URL to stdout as `<program> cat <url>`.
pub(crate) const FETCHERS: [&str; 3] = ["kioclient", "kioclient5", "gio"];

/// Turns one printed URL into a selected item. `fetcher` reads remote
/// items; without one they fail when opened.
pub(crate) fn item(url: &str, fetcher: Option<&Path>) -> NativeItem {
    match file_path(url) {
        Some(path) => NativeItem::Local(path),
        None => NativeItem::Remote(Rc::new(RemoteUrl {
            url: url.to_string(),
            fetcher: fetcher.map(Path::to_path_buf),
        })),
    }
}

/// The local path of a `file:` URL, or `None` for every other URL.
fn file_path(url: &str) -> Option<PathBuf> {
    let rest = url.strip_prefix("file://")?;
    let path = match rest.find('/')? {
        0 => rest,
        // Any other host names a different machine.
        at if &rest[..at] == "localhost" => &rest[at..],
        _ => return None,
    };
    Some(PathBuf::from(OsString::from_vec(percent_decode(path.as_bytes()))))
}

fn percent_decode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] == b'%' {
            let hi = input.get(i + 1).and_then(hex_digit);
            let lo = input.get(i + 2).and_then(hex_digit);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(input[i]);
        i += 1;
    }
    out
}

fn hex_digit(b: &u8) -> Option<u8> {
    char::from(*b).to_digit(16).map(|d| d as u8)
}

struct RemoteUrl {
    url: String,
    fetcher: Option<PathBuf>,
}

impl RemoteSource for RemoteUrl {
    fn uri(&self) -> &str {
        &self.url
    }

    fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        let Some(fetcher) = &self.fetcher else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no URL fetcher found (tried {})", FETCHERS.join(", ")),
            ));
        };
        debug!(fetcher = %fetcher.display(), url = %self.url, "fetching non-local item");

        let output = Command::new(fetcher)
            .arg("cat")
            .arg(&self.url)
            .stdin(Stdio::null())
            .output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(io::Error::other(format!(
                "{} exited with {}: {}",
                fetcher.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(Box::new(io::Cursor::new(output.stdout)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_urls_are_local_paths() {
        assert_eq!(file_path("file:///home/me/a%20b.txt"), Some(PathBuf::from("/home/me/a b.txt")));
        assert_eq!(file_path("file://localhost/etc/hosts"), Some(PathBuf::from("/etc/hosts")));
        assert_eq!(
            file_path("file:///tmp/two%0Alines").map(PathBuf::into_os_string),
            Some(OsString::from("/tmp/two\nlines"))
        );
    }

    #[test]
    fn other_urls_are_not_local() {
        assert_eq!(file_path("sftp://host/home/me/a.txt"), None);
        assert_eq!(file_path("file://fileserver/share/a.txt"), None);
        assert_eq!(file_path("file:relative"), None);
    }

    #[test]
    fn malformed_escapes_are_kept() {
        assert_eq!(percent_decode(b"100%"), b"100%");
        assert_eq!(percent_decode(b"%zz%41"), b"%zzA");
        assert_eq!(percent_decode(b"%ff"), [0xff]);
    }

    #[test]
    fn remote_without_fetcher_fails_to_open() {
        let NativeItem::Remote(src) = item("smb://server/share/a.txt", None) else {
            panic!("expected a remote item");
        };
        assert_eq!(src.uri(), "smb://server/share/a.txt");
        let err = src.open().err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
