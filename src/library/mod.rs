// Library module
// Finds playable audio files in the selected music folder

pub mod scanner;

pub use scanner::DirectoryScanner;
