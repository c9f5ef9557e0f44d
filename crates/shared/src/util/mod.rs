pub mod byte_cursor;
pub mod codepage;
