//! Concrete reading sinks.

pub mod console;
pub mod file;
pub mod http;

pub use console::{ConsoleConfig, ConsoleFormat, ConsoleSink};
pub use file::{FileConfig, FileFormat, FileSink};
pub use http::{HttpConfig, HttpSink};
