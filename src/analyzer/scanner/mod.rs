pub mod file_scanner;

pub use file_scanner::{FileScanner, ScannedFile, relative_posix};
