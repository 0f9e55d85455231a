use crate::core::Structure;
use std::path::Path;

mod gro_handler;

pub use gro_handler::{dotplace, GroFileHandler, GroHandlerError};

impl Structure {
    /// Reads a structure from a GRO file
    pub fn from_file(fname: impl AsRef<Path>) -> Result<Self, GroHandlerError> {
        GroFileHandler::open(fname)?.read()
    }

    /// Writes the structure to a GRO file
    pub fn save(&self, fname: impl AsRef<Path>) -> Result<(), GroHandlerError> {
        GroFileHandler::create(fname)?.write(self)
    }
}
