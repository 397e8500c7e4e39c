// File browsing module
// Directory listing and the current selection for the browser screen

pub mod scanner;

pub use scanner::{DirectoryBrowser, Entry, FileSelection, Selection};
