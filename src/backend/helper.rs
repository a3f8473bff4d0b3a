//! Dialogs shown by an external helper program, which renders them with the
//! desktop's own toolkit. Two command-line dialects are spoken: zenity's
//! (`zenity`, `qarma`, `zenity-rs`), which prints local paths, and
//! kdialog's, which prints URLs that may point off the local filesystem.

use std::{
    env,
    ffi::{OsStr, OsString},
    io::{self, Read},
    mem,
    os::{
        fd::AsRawFd,
        unix::{ffi::OsStrExt, fs::PermissionsExt},
    },
    path::{Path, PathBuf},
    process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio},
    time::Duration,
};
#[cfg(feature = "x11")]
use std::rc::Rc;

use tracing::{debug, trace};

#[cfg(feature = "x11")]
use super::x11::Focus;
use super::{url, DialogEvent, DialogOptions, NativeDialog, Toolkit};
use crate::{
    error::{Error, PlatformError},
    extract::NativeItem,
    filter::{CompiledFilter, FilterId},
    path_set::PathSet,
    session::DialogKind,
};

/// Environment variable naming the helper program to run.
pub(crate) const HELPER_ENV: &str = "NFD_HELPER";
/// Helpers tried in order when [`HELPER_ENV`] is unset.
const HELPERS: [&str; 4] = ["zenity", "qarma", "kdialog", "zenity-rs"];

const POLL_INTERVAL_MS: i32 = 50;
/// Pumps spent looking for the helper's window before giving up on it.
#[cfg(feature = "x11")]
const RAISE_ATTEMPTS: u32 = 60;

/// Both dialects exit with 1 on cancel; zenity uses 255 for a closed window.
const EXIT_CANCEL: i32 = 1;
const EXIT_CLOSED: i32 = 255;

/// Joins paths in zenity's multi-selection output. The helper prints
/// canonical paths, which never contain an empty component.
const SEPARATOR: &str = "\n//\n";

/// The command-line dialect of a helper program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    Zenity,
    KDialog,
}

impl Protocol {
    fn of(program: &Path) -> Self {
        match program.file_name().and_then(OsStr::to_str) {
            Some(name) if name.starts_with("kdialog") => Protocol::KDialog,
            _ => Protocol::Zenity,
        }
    }
}

pub(crate) struct HelperToolkit {
    program: PathBuf,
    protocol: Protocol,
    /// Reads remote URLs; only looked up for URL-speaking helpers.
    fetcher: Option<PathBuf>,
    #[cfg(feature = "x11")]
    focus: Option<Rc<Focus>>,
}

impl HelperToolkit {
    pub(crate) fn init() -> Result<Self, Error> {
        let has_x11 = env::var_os("DISPLAY").is_some_and(|d| !d.is_empty());
        let has_wayland = env::var_os("WAYLAND_DISPLAY").is_some_and(|d| !d.is_empty());
        if !has_x11 && !has_wayland {
            return Err(Error::ToolkitInit(
                "no graphical display (DISPLAY and WAYLAND_DISPLAY are unset)".into(),
            ));
        }

        let search = env::var_os("PATH").unwrap_or_default();
        let program = find_helper(&search)?;
        let protocol = Protocol::of(&program);
        let fetcher = match protocol {
            Protocol::KDialog => url::FETCHERS
                .iter()
                .find_map(|name| resolve(OsStr::new(name), &search)),
            Protocol::Zenity => None,
        };
        debug!(program = %program.display(), ?protocol, ?fetcher, "using dialog helper");

        Ok(Self {
            program,
            protocol,
            fetcher,
            #[cfg(feature = "x11")]
            focus: has_x11.then(connect_focus).flatten(),
        })
    }
}

#[cfg(feature = "x11")]
fn connect_focus() -> Option<Rc<Focus>> {
    match Focus::connect() {
        Ok(focus) => Some(Rc::new(focus)),
        Err(e) => {
            debug!(error = %e, "X11 unavailable, dialogs will not be raised");
            None
        }
    }
}

fn find_helper(search: &OsStr) -> Result<PathBuf, Error> {
    if let Some(requested) = env::var_os(HELPER_ENV).filter(|v| !v.is_empty()) {
        return resolve(&requested, search).ok_or_else(|| {
            Error::ToolkitInit(format!(
                "{HELPER_ENV} names {:?}, which is not an executable",
                requested
            ))
        });
    }

    HELPERS
        .iter()
        .find_map(|name| resolve(OsStr::new(name), search))
        .ok_or_else(|| {
            Error::ToolkitInit(format!(
                "no dialog helper found (tried {}); install one or set {HELPER_ENV}",
                HELPERS.join(", ")
            ))
        })
}

/// Resolves `program` like a shell would: names containing a `/` are used
/// as-is, anything else is looked up in `search`.
fn resolve(program: &OsStr, search: &OsStr) -> Option<PathBuf> {
    let program = Path::new(program);
    if program.components().count() > 1 {
        return is_executable(program).then(|| program.to_path_buf());
    }
    env::split_paths(search)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

impl Toolkit for HelperToolkit {
    type Dialog = HelperDialog;

    fn create_dialog(&mut self, kind: DialogKind) -> Result<HelperDialog, Error> {
        Ok(HelperDialog {
            program: self.program.clone(),
            protocol: self.protocol,
            fetcher: self.fetcher.clone(),
            kind,
            options: DialogOptions::empty(),
            filters: Vec::new(),
            folder: None,
            name: String::new(),
            phase: Phase::Setup,
            #[cfg(feature = "x11")]
            focus: self.focus.clone(),
        })
    }

    fn drain_events(&mut self) {
        #[cfg(feature = "x11")]
        if let Some(focus) = &self.focus {
            focus.drain_events();
        }
    }
}

pub(crate) struct HelperDialog {
    program: PathBuf,
    protocol: Protocol,
    fetcher: Option<PathBuf>,
    kind: DialogKind,
    options: DialogOptions,
    filters: Vec<CompiledFilter>,
    folder: Option<PathBuf>,
    name: String,
    phase: Phase,
    #[cfg(feature = "x11")]
    focus: Option<Rc<Focus>>,
}

enum Phase {
    Setup,
    Running(Running),
    /// The helper exited after the user accepted; the selection awaits
    /// [`NativeDialog::confirm_accept`].
    Responded(Output),
    Confirmed(Output),
    Closed,
}

/// What the helper printed when the user accepted.
enum Output {
    /// Local paths, as zenity prints them.
    Paths(Vec<PathBuf>),
    /// Items parsed from URLs, as kdialog prints them.
    Items(Vec<NativeItem>),
}

impl Default for Output {
    fn default() -> Self {
        Output::Paths(Vec::new())
    }
}

impl Output {
    fn first(&self) -> Option<NativeItem> {
        match self {
            Output::Paths(paths) => paths.first().cloned().map(NativeItem::Local),
            Output::Items(items) => items.first().cloned(),
        }
    }

    fn rename_first(&mut self, name: &str) -> Result<(), Error> {
        let path = match self {
            Output::Paths(paths) => paths.first_mut(),
            Output::Items(items) => match items.first_mut() {
                Some(NativeItem::Local(path)) => Some(path),
                Some(NativeItem::Remote(src)) => return Err(Error::NonLocal(src.uri().to_string())),
                None => None,
            },
        };
        if let Some(path) = path {
            path.set_file_name(name);
        }
        Ok(())
    }

    fn into_path_set(self) -> PathSet {
        match self {
            Output::Paths(paths) => PathSet::linked(paths.into_iter().collect()),
            Output::Items(items) => PathSet::model(items),
        }
    }
}

struct Running {
    child: Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    out: Vec<u8>,
    err: Vec<u8>,
    #[cfg(feature = "x11")]
    raise_attempts: u32,
}

impl HelperDialog {
    fn arguments(&self) -> Vec<OsString> {
        match self.protocol {
            Protocol::Zenity => self.zenity_arguments(),
            Protocol::KDialog => self.kdialog_arguments(),
        }
    }

    fn zenity_arguments(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--file-selection".into(),
            format!("--title={}", self.kind.title()).into(),
        ];

        if self.options.contains(DialogOptions::MULTIPLE) {
            args.push("--multiple".into());
            args.push(format!("--separator={SEPARATOR}").into());
        }
        if self.options.contains(DialogOptions::FOLDERS) {
            args.push("--directory".into());
        }
        if self.kind == DialogKind::Save {
            args.push("--save".into());
            if self.options.contains(DialogOptions::CONFIRM_OVERWRITE) {
                args.push("--confirm-overwrite".into());
            }
        }

        if let Some(start) = self.start_location() {
            let mut arg = OsString::from("--filename=");
            arg.push(start);
            args.push(arg);
        }

        args.extend(self.filters.iter().map(|f| {
            OsString::from(format!("--file-filter={} | {}", label(f), f.patterns().join(" ")))
        }));
        args
    }

    /// kdialog takes positional arguments after the mode: the start
    /// location, then the filter. Its save dialog always confirms
    /// overwrites.
    fn kdialog_arguments(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--title".into(), self.kind.title().into()];

        let mode = if self.options.contains(DialogOptions::FOLDERS) {
            "--getexistingdirectoryurl"
        } else if self.kind == DialogKind::Save {
            "--getsaveurl"
        } else {
            "--getopenurl"
        };
        args.push(mode.into());
        args.push(self.start_location().unwrap_or_else(|| ".".into()));

        if !self.filters.is_empty() && !self.options.contains(DialogOptions::FOLDERS) {
            let filters: Vec<String> = self
                .filters
                .iter()
                .map(|f| format!("{}|{}", f.patterns().join(" "), label(f)))
                .collect();
            args.push(filters.join("\n").into());
        }

        if self.options.contains(DialogOptions::MULTIPLE) {
            args.push("--multiple".into());
            args.push("--separate-output".into());
        }
        args
    }

    /// The helper takes the start folder and the pre-filled name as one
    /// path; a trailing `/` selects a folder without naming a file.
    fn start_location(&self) -> Option<OsString> {
        match (&self.folder, self.name.is_empty()) {
            (Some(folder), false) => Some(folder.join(&self.name).into_os_string()),
            (Some(folder), true) => {
                let mut path = folder.clone().into_os_string();
                if !path.as_bytes().ends_with(b"/") {
                    path.push("/");
                }
                Some(path)
            }
            (None, false) => Some(self.name.clone().into()),
            (None, true) => None,
        }
    }

    fn parse(&self, out: &[u8]) -> Output {
        match self.protocol {
            Protocol::Zenity => Output::Paths(parse_paths(out)),
            Protocol::KDialog => Output::Items(
                out.split(|&b| b == b'\n')
                    .map(|line| String::from_utf8_lossy(line))
                    .filter(|line| !line.trim().is_empty())
                    .map(|line| url::item(line.trim(), self.fetcher.as_deref()))
                    .collect(),
            ),
        }
    }

    fn output(&mut self) -> Result<&mut Output, Error> {
        match &mut self.phase {
            Phase::Responded(out) | Phase::Confirmed(out) => Ok(out),
            _ => Err(Error::platform("dialog helper has not returned a selection")),
        }
    }
}

/// Both dialects split a filter on `|`, so it cannot appear in a label.
fn label(filter: &CompiledFilter) -> String {
    filter.display_name().replace('|', "\u{a6}")
}

impl NativeDialog for HelperDialog {
    fn set_options(&mut self, options: DialogOptions) -> Result<(), Error> {
        self.options = options;
        Ok(())
    }

    fn add_filter(&mut self, filter: &CompiledFilter) -> Result<FilterId, Error> {
        let id = FilterId(self.filters.len());
        self.filters.push(filter.clone());
        Ok(id)
    }

    fn set_folder(&mut self, path: &Path) -> Result<bool, Error> {
        if !path.is_dir() {
            return Ok(false);
        }
        self.folder = Some(path.to_path_buf());
        Ok(true)
    }

    fn set_current_name(&mut self, name: &str) -> Result<(), Error> {
        match &mut self.phase {
            Phase::Responded(out) => out.rename_first(name),
            _ => {
                self.name = name.to_string();
                Ok(())
            }
        }
    }

    fn current_name(&self) -> Result<String, Error> {
        match &self.phase {
            Phase::Responded(out) | Phase::Confirmed(out) => Ok(match out.first() {
                Some(NativeItem::Local(path)) => path
                    .file_name()
                    // Names that are not UTF-8 are left exactly as chosen.
                    .and_then(OsStr::to_str)
                    .unwrap_or_default()
                    .to_string(),
                _ => String::new(),
            }),
            _ => Ok(self.name.clone()),
        }
    }

    /// Neither dialect reports the filter active when the user accepted,
    /// and the helper has already confirmed any overwrite of the name it
    /// printed, so no extension is ever appended afterwards.
    fn current_filter(&self) -> Option<FilterId> {
        None
    }

    fn present(&mut self) -> Result<(), Error> {
        let args = self.arguments();
        trace!(program = %self.program.display(), ?args, "starting dialog helper");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::io("failed to start dialog helper", e))?;

        self.phase = Phase::Running(Running {
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
            child,
            out: Vec::new(),
            err: Vec::new(),
            #[cfg(feature = "x11")]
            raise_attempts: 0,
        });
        Ok(())
    }

    fn pump(&mut self) -> Result<Option<DialogEvent>, Error> {
        let running = match &mut self.phase {
            Phase::Running(running) => running,
            Phase::Confirmed(_) => return Ok(Some(DialogEvent::Accepted)),
            Phase::Setup | Phase::Responded(_) | Phase::Closed => {
                return Err(Error::platform("dialog helper is not running"));
            }
        };

        running.wait_for_output(POLL_INTERVAL_MS)?;

        #[cfg(feature = "x11")]
        if let Some(focus) = &self.focus {
            running.raise(focus);
        }

        let status = running
            .child
            .try_wait()
            .map_err(|e| Error::io("failed to wait for dialog helper", e))?;
        let Some(status) = status else {
            return Ok(None);
        };

        running.finish_output()?;
        debug!(%status, "dialog helper exited");

        match status.code() {
            Some(0) => {
                let out = mem::take(&mut running.out);
                self.phase = Phase::Responded(self.parse(&out));
                Ok(Some(DialogEvent::AcceptRequested))
            }
            Some(EXIT_CANCEL | EXIT_CLOSED) => {
                self.phase = Phase::Closed;
                Ok(Some(DialogEvent::Cancelled))
            }
            _ => {
                let err = helper_failure(status, &running.err);
                self.phase = Phase::Closed;
                Err(err)
            }
        }
    }

    fn confirm_accept(&mut self) -> Result<(), Error> {
        let out = mem::take(self.output()?);
        self.phase = Phase::Confirmed(out);
        Ok(())
    }

    fn selected_item(&mut self) -> Result<NativeItem, Error> {
        self.output()?
            .first()
            .ok_or_else(|| Error::platform("could not get file path for selected item"))
    }

    fn selected_items(&mut self) -> Result<PathSet, Error> {
        Ok(mem::take(self.output()?).into_path_set())
    }

    fn destroy(&mut self) {
        if let Phase::Running(running) = &mut self.phase {
            let _ = running.child.kill();
            let _ = running.child.wait();
        }
        self.phase = Phase::Closed;
    }
}

impl Running {
    /// Waits up to `timeout_ms` for the helper to write something and
    /// collects it, so a long selection cannot fill the pipe and stall it.
    fn wait_for_output(&mut self, timeout_ms: i32) -> Result<(), Error> {
        let mut fds = Vec::with_capacity(2);
        if let Some(pipe) = &self.stdout {
            fds.push(pollfd(pipe.as_raw_fd()));
        }
        if let Some(pipe) = &self.stderr {
            fds.push(pollfd(pipe.as_raw_fd()));
        }
        if fds.is_empty() {
            std::thread::sleep(Duration::from_millis(timeout_ms as u64));
            return Ok(());
        }

        // SAFETY: `fds` is a valid, initialized array of `fds.len()` entries.
        let ready = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(Error::io("failed to wait for dialog helper", err));
        }

        for fd in fds.iter().filter(|fd| fd.revents != 0) {
            if self.stdout.as_ref().is_some_and(|p| p.as_raw_fd() == fd.fd) {
                read_some(&mut self.stdout, &mut self.out)?;
            } else {
                read_some(&mut self.stderr, &mut self.err)?;
            }
        }
        Ok(())
    }

    fn finish_output(&mut self) -> Result<(), Error> {
        if let Some(mut pipe) = self.stdout.take() {
            pipe.read_to_end(&mut self.out)
                .map_err(|e| Error::io("failed to read dialog helper output", e))?;
        }
        if let Some(mut pipe) = self.stderr.take() {
            pipe.read_to_end(&mut self.err)
                .map_err(|e| Error::io("failed to read dialog helper output", e))?;
        }
        Ok(())
    }

    #[cfg(feature = "x11")]
    fn raise(&mut self, focus: &Focus) {
        if self.raise_attempts >= RAISE_ATTEMPTS {
            return;
        }
        self.raise_attempts += 1;

        match focus.find_window(self.child.id()) {
            Ok(Some(window)) => {
                self.raise_attempts = RAISE_ATTEMPTS;
                match focus.activate(window) {
                    Ok(()) => trace!(window, "raised dialog window"),
                    Err(e) => debug!(error = %e, "failed to raise dialog window"),
                }
            }
            Ok(None) => {}
            Err(e) => {
                self.raise_attempts = RAISE_ATTEMPTS;
                debug!(error = %e, "failed to look up dialog window");
            }
        }
    }
}

fn pollfd(fd: libc::c_int) -> libc::pollfd {
    libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    }
}

/// Reads what is available from a pipe that polled ready, closing it at EOF.
fn read_some<R: Read>(pipe: &mut Option<R>, buf: &mut Vec<u8>) -> Result<(), Error> {
    let Some(reader) = pipe else {
        return Ok(());
    };
    let mut chunk = [0u8; 4096];
    match reader.read(&mut chunk) {
        Ok(0) => *pipe = None,
        Ok(n) => buf.extend_from_slice(&chunk[..n]),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
        Err(e) => return Err(Error::io("failed to read dialog helper output", e)),
    }
    Ok(())
}

/// Splits zenity's output into paths, in order. The output ends with one
/// newline; paths themselves may contain newlines.
fn parse_paths(out: &[u8]) -> Vec<PathBuf> {
    let out = out.strip_suffix(b"\n").unwrap_or(out);
    split_on(out, SEPARATOR.as_bytes())
        .into_iter()
        .filter(|path| !path.is_empty())
        .map(|path| PathBuf::from(OsStr::from_bytes(path)))
        .collect()
}

fn split_on<'a>(mut rest: &'a [u8], separator: &[u8]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();
    while let Some(at) = rest.windows(separator.len()).position(|w| w == separator) {
        parts.push(&rest[..at]);
        rest = &rest[at + separator.len()..];
    }
    parts.push(rest);
    parts
}

fn helper_failure(status: ExitStatus, stderr: &[u8]) -> Error {
    let stderr = String::from_utf8_lossy(stderr).trim().to_string();
    Error::Platform(PlatformError::Helper { status, stderr })
}

#[cfg(test)]
mod tests {
    use std::{
        borrow::Cow,
        fs,
        sync::{Mutex, MutexGuard},
    };

    use super::*;
    use crate::{
        enforce, filter,
        session::{self, DialogRequest},
        Response,
    };

    // Writing a script while another test forks makes exec fail with ETXTBSY.
    static SCRIPTS: Mutex<()> = Mutex::new(());

    fn serial() -> MutexGuard<'static, ()> {
        SCRIPTS.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn toolkit(program: &Path, protocol: Protocol) -> HelperToolkit {
        HelperToolkit {
            program: program.to_path_buf(),
            protocol,
            fetcher: None,
            #[cfg(feature = "x11")]
            focus: None,
        }
    }

    fn dialog(kind: DialogKind, program: &Path) -> HelperDialog {
        let mut toolkit = toolkit(program, Protocol::of(program));
        let mut dialog = toolkit.create_dialog(kind).unwrap();
        dialog.options = kind.options();
        dialog
    }

    fn script_named(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn script(dir: &Path, body: &str) -> PathBuf {
        script_named(dir, "helper.sh", body)
    }

    fn wait(dialog: &mut HelperDialog) -> Result<DialogEvent, Error> {
        loop {
            if let Some(event) = dialog.pump()? {
                return Ok(event);
            }
        }
    }

    fn save_through(program: &Path, dir: &Path) -> Response<PathBuf> {
        let mut toolkit = toolkit(program, Protocol::Zenity);
        let request = DialogRequest::save()
            .filter("CSV", "csv")
            .default_path(dir);
        session::run(&mut toolkit, &request, |s| s.extract_path()).unwrap()
    }

    #[test]
    fn save_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dialog(DialogKind::Save, Path::new("zenity"));
        for f in filter::compile(&[("Source code", "c,cpp").into()]).unwrap() {
            d.add_filter(&f).unwrap();
        }
        assert!(d.set_folder(dir.path()).unwrap());
        d.set_current_name("Untitled.c").unwrap();

        let args = d.arguments();
        assert_eq!(args[0], "--file-selection");
        assert_eq!(args[1], "--title=Save File");
        assert!(args.contains(&"--save".into()));
        assert!(args.contains(&"--confirm-overwrite".into()));
        let mut start = OsString::from("--filename=");
        start.push(dir.path().join("Untitled.c"));
        assert!(args.contains(&start));
        assert!(args.contains(&"--file-filter=Source code (*.c, *.cpp) | *.c *.cpp".into()));
        assert!(args.contains(&"--file-filter=All files | *".into()));
    }

    #[test]
    fn folder_and_multiple_arguments() {
        let d = dialog(DialogKind::PickFolder, Path::new("zenity"));
        let args = d.arguments();
        assert!(args.contains(&"--directory".into()));
        assert!(!args.iter().any(|a| a.as_bytes().starts_with(b"--filename")));

        let d = dialog(DialogKind::OpenMultiple, Path::new("zenity"));
        let args = d.arguments();
        assert!(args.contains(&"--multiple".into()));
        assert!(args.contains(&"--separator=\n//\n".into()));
    }

    #[test]
    fn bar_in_filter_name_does_not_split_the_filter() {
        let mut d = dialog(DialogKind::OpenSingle, Path::new("zenity"));
        for f in filter::compile(&[("Logs | traces", "log").into()]).unwrap() {
            d.add_filter(&f).unwrap();
        }
        let args = d.arguments();
        assert!(args.contains(&"--file-filter=Logs \u{a6} traces (*.log) | *.log".into()));
        let filters = args.iter().filter(|a| a.as_bytes().starts_with(b"--file-filter="));
        assert!(filters.clone().all(|a| a.as_bytes().iter().filter(|&&b| b == b'|').count() == 1));
        assert_eq!(filters.count(), 2);
    }

    #[test]
    fn kdialog_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dialog(DialogKind::OpenMultiple, Path::new("/usr/bin/kdialog"));
        assert_eq!(d.protocol, Protocol::KDialog);
        for f in filter::compile(&[("Images | raw", "png,jpg").into()]).unwrap() {
            d.add_filter(&f).unwrap();
        }
        assert!(d.set_folder(dir.path()).unwrap());

        let mut start = dir.path().as_os_str().to_os_string();
        start.push("/");
        let expected: Vec<OsString> = vec![
            "--title".into(),
            "Open Files".into(),
            "--getopenurl".into(),
            start,
            "*.png *.jpg|Images \u{a6} raw (*.png, *.jpg)\n*|All files".into(),
            "--multiple".into(),
            "--separate-output".into(),
        ];
        assert_eq!(d.arguments(), expected);

        let d = dialog(DialogKind::PickFolder, Path::new("kdialog"));
        assert_eq!(
            d.arguments(),
            ["--title", "Select folder", "--getexistingdirectoryurl", "."].map(OsString::from)
        );
        let d = dialog(DialogKind::Save, Path::new("kdialog"));
        assert_eq!(d.arguments()[2], "--getsaveurl");
    }

    #[test]
    fn start_folder_gets_trailing_slash() {
        let mut d = dialog(DialogKind::OpenSingle, Path::new("zenity"));
        d.folder = Some(PathBuf::from("/home/user"));
        assert_eq!(d.start_location(), Some(OsString::from("/home/user/")));
    }

    #[test]
    fn missing_folder_is_not_used() {
        let mut d = dialog(DialogKind::OpenSingle, Path::new("zenity"));
        assert!(!d.set_folder(Path::new("/no/such/folder/here")).unwrap());
        assert_eq!(d.start_location(), None);
    }

    #[test]
    fn output_keeps_order_and_bytes() {
        let paths = parse_paths(b"/b/2.txt\n//\n/a/1.txt\n//\n/c/\xff.bin\n");
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[0], Path::new("/b/2.txt"));
        assert_eq!(paths[1], Path::new("/a/1.txt"));
        assert_eq!(paths[2].as_os_str().as_bytes(), b"/c/\xff.bin");
        assert!(parse_paths(b"").is_empty());
        assert!(parse_paths(b"\n").is_empty());
    }

    #[test]
    fn newlines_inside_paths_survive() {
        let paths = parse_paths(b"/tmp/two\nlines.txt\n//\n/tmp/ends\n\n");
        assert_eq!(
            paths,
            [PathBuf::from("/tmp/two\nlines.txt"), PathBuf::from("/tmp/ends\n")]
        );
        assert_eq!(parse_paths(b"/tmp/a\nb\n"), [PathBuf::from("/tmp/a\nb")]);
    }

    #[test]
    fn protocol_follows_program_name() {
        assert_eq!(Protocol::of(Path::new("/usr/bin/kdialog")), Protocol::KDialog);
        assert_eq!(Protocol::of(Path::new("zenity")), Protocol::Zenity);
        assert_eq!(Protocol::of(Path::new("/opt/qarma")), Protocol::Zenity);
    }

    #[test]
    fn resolve_searches_path() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let exe = script(dir.path(), "exit 0");
        let plain = dir.path().join("not-executable");
        fs::write(&plain, "").unwrap();

        let search = env::join_paths([Path::new("/nonexistent"), dir.path()]).unwrap();
        assert_eq!(resolve(OsStr::new("helper.sh"), &search), Some(exe.clone()));
        assert_eq!(resolve(exe.as_os_str(), OsStr::new("")), Some(exe));
        assert_eq!(resolve(OsStr::new("not-executable"), &search), None);
        assert_eq!(resolve(OsStr::new("missing"), &search), None);
    }

    #[test]
    fn accepted_selection_is_read_from_helper() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "printf '/tmp/b.txt\\n//\\n/tmp/a.txt\\n'");
        let mut d = dialog(DialogKind::OpenMultiple, &program);

        d.present().unwrap();
        assert_eq!(wait(&mut d).unwrap(), DialogEvent::AcceptRequested);
        d.confirm_accept().unwrap();
        assert_eq!(d.pump().unwrap(), Some(DialogEvent::Accepted));

        let set = d.selected_items().unwrap();
        assert_eq!(set.count().unwrap(), 2);
        assert_eq!(set.get_at(0).unwrap(), Path::new("/tmp/b.txt"));
        assert_eq!(set.get_at(1).unwrap(), Path::new("/tmp/a.txt"));
    }

    #[test]
    fn no_filter_is_reported_as_active() {
        let mut d = dialog(DialogKind::Save, Path::new("zenity"));
        let compiled = filter::compile(&[("CSV", "csv").into()]).unwrap();
        let index = filter::attach(&mut d, &compiled).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(d.current_filter(), None);
    }

    #[test]
    fn save_keeps_the_name_the_helper_confirmed() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("report.csv");
        fs::write(&existing, "kept").unwrap();
        let chosen = dir.path().join("report");
        let program = script(dir.path(), &format!("echo '{}'", chosen.display()));

        match save_through(&program, dir.path()) {
            Response::Okay(path) => assert_eq!(path, chosen),
            Response::Cancel => panic!("cancelled"),
        }
        assert_eq!(fs::read(&existing).unwrap(), b"kept");
    }

    #[test]
    fn save_under_any_filter_keeps_a_bare_name() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let chosen = dir.path().join("Makefile");
        let program = script(dir.path(), &format!("echo '{}'", chosen.display()));

        match save_through(&program, dir.path()) {
            Response::Okay(path) => assert_eq!(path, chosen),
            Response::Cancel => panic!("cancelled"),
        }

        let mut d = dialog(DialogKind::Save, &program);
        let compiled = filter::compile(&[("CSV", "csv").into()]).unwrap();
        let index = filter::attach(&mut d, &compiled).unwrap();
        d.present().unwrap();
        assert_eq!(wait(&mut d).unwrap(), DialogEvent::AcceptRequested);
        assert_eq!(d.current_name().unwrap(), "Makefile");
        assert!(!enforce::apply(&mut d, &index).unwrap());
    }

    #[test]
    fn kdialog_urls_become_local_and_remote_items() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let fetcher = script_named(dir.path(), "gio", "printf 'remote body'");
        let program = script_named(
            dir.path(),
            "kdialog",
            "printf 'file:///tmp/a%%20b.txt\\nsftp://host/notes.md\\n'",
        );
        let mut d = dialog(DialogKind::OpenMultiple, &program);
        d.fetcher = Some(fetcher);

        d.present().unwrap();
        assert_eq!(wait(&mut d).unwrap(), DialogEvent::AcceptRequested);
        d.confirm_accept().unwrap();

        let set = d.selected_items().unwrap();
        assert_eq!(set.count().unwrap(), 2);
        assert!(matches!(set.get_at(0).unwrap(), Cow::Borrowed(p) if p == Path::new("/tmp/a b.txt")));

        let copy = set.get_at(1).unwrap().into_owned();
        assert_eq!(copy.extension().and_then(|e| e.to_str()), Some("md"));
        assert_eq!(fs::read(&copy).unwrap(), b"remote body");
        assert_eq!(set.get_at(1).unwrap(), copy.as_path());
        fs::remove_file(copy).unwrap();
    }

    #[test]
    fn kdialog_remote_save_target_is_a_cancel() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let program = script_named(dir.path(), "kdialog", "echo 'sftp://host/out.txt'");
        let mut toolkit = toolkit(&program, Protocol::KDialog);

        let result = session::run(&mut toolkit, &DialogRequest::save(), |s| s.extract_path()).unwrap();
        assert!(matches!(result, Response::Cancel));
    }

    #[test]
    fn cancel_and_close_exit_codes() {
        let _serial = serial();
        for code in [1, 255] {
            let dir = tempfile::tempdir().unwrap();
            let program = script(dir.path(), &format!("exit {code}"));
            let mut d = dialog(DialogKind::OpenSingle, &program);
            d.present().unwrap();
            assert_eq!(wait(&mut d).unwrap(), DialogEvent::Cancelled);
        }
    }

    #[test]
    fn other_exit_codes_report_stderr() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "echo 'cannot open display' >&2; exit 3");
        let mut d = dialog(DialogKind::OpenSingle, &program);
        d.present().unwrap();

        let err = wait(&mut d).unwrap_err();
        assert!(err.to_string().contains("cannot open display"), "{err}");
    }

    #[test]
    fn destroy_stops_a_running_helper() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "exec sleep 30");
        let mut d = dialog(DialogKind::OpenSingle, &program);
        d.present().unwrap();
        assert_eq!(d.pump().unwrap(), None);

        d.destroy();
        assert!(matches!(d.phase, Phase::Closed));
        assert!(d.pump().is_err());
    }
}
