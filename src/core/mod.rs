// Radar core module
// Scanner abstraction shared by the task pipeline

pub mod scanner_trait;

pub use scanner_trait::{Scanner, ScannerBuilder, ScannerFactory, ScannerOption, MIN_SCANNER_RATE};
