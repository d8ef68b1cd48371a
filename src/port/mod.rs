//! Middleware port boundary
//!
//! The connection core never talks to the middleware directly. It asks a
//! [`PortLocator`] to turn a [`StreamIdentity`] into a [`PortHandle`], and
//! asks the handle for a [`StreamReader`] that drains samples into a
//! reusable buffer.
//!
//! Resolution is a cheap, repeatable query: "producer not running yet" is a
//! normal `Ok(None)`, only malformed identities are errors.

pub mod error;
pub mod identity;
pub mod locator;

pub use error::{LocateError, ReadError};
pub use identity::StreamIdentity;
pub use locator::{PortHandle, PortLocator, ReaderPolicy, StreamReader};
