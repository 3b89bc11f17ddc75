//! Shared vocabulary for the Harlequin runtime.
//!
//! This crate holds the types every runtime layer agrees on: result codes,
//! value type tags, limits, the exception taxonomy and the host report sink.
//!
//! # Overview
//!
//! - [`HqError`] / [`ErrorCode`] - API errors with stable integer codes
//! - [`ValueType`] - Closed set of runtime value tags
//! - [`ExceptionSeverity`] / [`StandardException`] - Script exception taxonomy
//! - [`ReportSink`] - Host message callback with a minimum level
//! - [`constants`] - Register counts, stack limits and collector defaults
//!
//! # Examples
//!
//! ```
//! use core_types::{ErrorCode, HqError, HqResult, StandardException, ValueType};
//!
//! fn checked_register(index: usize) -> HqResult<usize> {
//!     if index >= core_types::constants::IO_REGISTER_COUNT {
//!         return Err(HqError::new(ErrorCode::InvalidArg, "register out of range"));
//!     }
//!     Ok(index)
//! }
//!
//! assert!(checked_register(3).is_ok());
//! assert_eq!(checked_register(48).unwrap_err().code(), ErrorCode::InvalidArg);
//! assert_eq!(ValueType::Uint16.name(), "uint16");
//! assert_eq!(
//!     StandardException::TypeError.class_name(),
//!     "Harlequin.System.Exception.TypeError"
//! );
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod constants;
mod error;
mod exception;
mod report;
mod value;

pub use error::{ErrorCode, HqError, HqResult};
pub use exception::{ExceptionSeverity, StandardException};
pub use report::{default_report_callback, MessageType, ReportCallback, ReportConfig, ReportSink};
pub use value::ValueType;
