//! Bringing the helper's dialog window to the foreground on X11.
//!
//! Window managers with focus-stealing prevention leave a freshly mapped
//! dialog behind the window the user was working in. Asking the window
//! manager to activate it with a current server timestamp gets around that.

use x11rb::{
    connection::Connection as _,
    protocol::{
        xproto::{
            AtomEnum, ClientMessageEvent, ConfigureWindowAux, ConnectionExt as _,
            CreateWindowAux, EventMask, PropMode, StackMode, Window, WindowClass,
        },
        Event,
    },
    rust_connection::RustConnection,
    wrapper::ConnectionExt as _,
    COPY_FROM_PARENT,
};

use crate::error::X11Error;

x11rb::atom_manager! {
    pub Atoms: AtomCookie {
        _NET_ACTIVE_WINDOW,
        _NET_CLIENT_LIST,
        _NET_WM_PID,
    }
}

/// `_NET_ACTIVE_WINDOW` source indication for a normal application.
const SOURCE_APPLICATION: u32 = 1;

pub(crate) struct Focus {
    conn: RustConnection,
    atoms: Atoms,
    root: Window,
    /// Unmapped window used only to obtain server timestamps.
    clock: Window,
}

impl Focus {
    pub(crate) fn connect() -> Result<Self, X11Error> {
        let (conn, screen) = x11rb::connect(None)?;
        let atoms = Atoms::new(&conn)?.reply()?;
        let root = conn
            .setup()
            .roots
            .get(screen)
            .map(|s| s.root)
            .ok_or(X11Error::NoScreen)?;

        let clock = conn.generate_id()?;
        conn.create_window(
            COPY_FROM_PARENT as u8,
            clock,
            root,
            -1,
            -1,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            COPY_FROM_PARENT,
            &CreateWindowAux::new().event_mask(EventMask::PROPERTY_CHANGE),
        )?
        .check()?;

        Ok(Self {
            conn,
            atoms,
            root,
            clock,
        })
    }

    /// The X server's current time, read from the `PropertyNotify` that a
    /// zero-length append to a property of our own window generates.
    fn server_time(&self) -> Result<u32, X11Error> {
        self.conn
            .change_property8(
                PropMode::APPEND,
                self.clock,
                AtomEnum::WM_NAME,
                AtomEnum::STRING,
                &[],
            )?
            .check()?;

        loop {
            if let Event::PropertyNotify(ev) = self.conn.wait_for_event()? {
                if ev.window == self.clock {
                    return Ok(ev.time);
                }
            }
        }
    }

    /// Finds the top-level window owned by process `pid`.
    pub(crate) fn find_window(&self, pid: u32) -> Result<Option<Window>, X11Error> {
        let clients = self
            .conn
            .get_property(
                false,
                self.root,
                self.atoms._NET_CLIENT_LIST,
                AtomEnum::WINDOW,
                0,
                u32::from(u16::MAX),
            )?
            .reply()?;
        let Some(windows) = clients.value32() else {
            return Ok(None);
        };

        for window in windows {
            let cookie = self.conn.get_property(
                false,
                window,
                self.atoms._NET_WM_PID,
                AtomEnum::CARDINAL,
                0,
                1,
            )?;
            // Windows can disappear between listing and querying them.
            let Ok(owner) = cookie.reply() else {
                continue;
            };
            if owner.value32().and_then(|mut v| v.next()) == Some(pid) {
                return Ok(Some(window));
            }
        }
        Ok(None)
    }

    /// Asks the window manager to activate `window` and raises it.
    pub(crate) fn activate(&self, window: Window) -> Result<(), X11Error> {
        let time = self.server_time()?;

        self.conn
            .send_event(
                false,
                self.root,
                EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
                ClientMessageEvent::new(
                    32,
                    window,
                    self.atoms._NET_ACTIVE_WINDOW,
                    [SOURCE_APPLICATION, time, 0, 0, 0],
                ),
            )?
            .check()?;
        self.conn.configure_window(
            window,
            &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
        )?;
        self.conn.flush()?;
        Ok(())
    }

    /// Discards whatever events are queued on the connection.
    pub(crate) fn drain_events(&self) {
        while let Ok(Some(_)) = self.conn.poll_for_event() {}
    }
}

impl Drop for Focus {
    fn drop(&mut self) {
        let _ = self.conn.destroy_window(self.clock);
        let _ = self.conn.flush();
    }
}
