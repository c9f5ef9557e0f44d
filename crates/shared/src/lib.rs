// jmx-shared - primitives shared by the JMXV asset codecs and tools
//
// Byte cursor, code page text, error kinds, logging and config.

pub mod config;
pub mod error;
pub mod log;
pub mod util;

pub use error::{FormatError, Result};
pub use util::byte_cursor::{ByteCursor, SeekOrigin};
