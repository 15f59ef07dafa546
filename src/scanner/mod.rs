//! Port scanning strategies
//!
//! Both scanners are built through [`ScannerFactory`](crate::core::ScannerFactory)
//! and report every probe through the task's probe sink.

pub mod connect;
pub mod syn;

pub use connect::ConnectScanner;
pub use syn::SynScanner;
