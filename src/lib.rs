//! nfd - Native file dialogs behind one synchronous interface.
//!
//! Four dialogs are offered: open one file, open several files, save a file
//! and pick a folder. Each call blocks until the user closes the dialog and
//! returns [`Response::Okay`] with the selection or [`Response::Cancel`].
//!
//! On Windows the Common Item Dialogs are used. Elsewhere the dialogs are
//! shown by a zenity-compatible helper (`zenity`, `qarma` or `zenity-rs`,
//! or whatever `NFD_HELPER` names), so they look like the desktop's own.
//!
//! # Example
//!
//! ```no_run
//! use nfd::{Context, FilterDescriptor, Response};
//!
//! let mut ctx = Context::init().unwrap();
//! let filters = [FilterDescriptor::new("Image files", "png,jpg")];
//! match ctx.open_dialog(&filters, None) {
//!     Ok(Response::Okay(path)) => println!("{}", path.display()),
//!     Ok(Response::Cancel) => println!("cancelled"),
//!     Err(e) => eprintln!("error: {e}"),
//! }
//! ```

pub(crate) mod backend;
mod context;
mod enforce;
pub mod error;
mod extract;
pub mod filter;
pub mod logging;
mod path_set;
mod session;

pub use backend::scripted;
pub use context::{Context, Response, Selection, Status};
pub use error::Error;
pub use filter::{CompiledFilter, FilterDescriptor, compile};
pub use path_set::{PathEnumerator, PathSet};
pub use session::{DialogKind, DialogRequest};
