//! Domain types shared by discovery, the session and the relay protocol.
//!
//! Nothing in this module performs I/O.  The types here are plain values
//! that are created at the edges (a transport enumerating resources, a
//! network handler reading a line) and passed inward.

pub mod command;
pub mod resource;

pub use command::{Command, CommandKind};
pub use resource::ResourceDescriptor;
