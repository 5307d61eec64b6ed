//! Storage helpers shared by the settings layer

pub mod file_io;
