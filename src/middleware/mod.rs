//! HTTP middleware: request logging, request ids and error formatting

pub mod error;
pub mod logging;
