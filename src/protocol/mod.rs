//! Protocol module for store commands and server metadata

pub mod command;
pub mod parser;

pub use command::{Command, Response};
pub use parser::{Parser, ServerVersion};
