//! Contract compliance tests for core_types
//!
//! These tests pin the public vocabulary shared by the runtime components.

use core_types::constants::*;
use core_types::{
    ErrorCode, ExceptionSeverity, HqError, MessageType, ReportSink, StandardException, ValueType,
};

#[cfg(test)]
mod constants_contract_tests {
    use super::*;

    /// Contract: register and stack limits
    #[test]
    fn contract_execution_limits() {
        assert_eq!(FRAME_STACK_SIZE, 1024);
        assert_eq!(VALUE_STACK_SIZE, 64);
        assert_eq!(IO_REGISTER_COUNT, 48);
    }

    /// Contract: collector thread and scheduling defaults
    #[test]
    fn contract_gc_defaults() {
        assert_eq!(THREAD_MINIMUM_STACK_SIZE, 262_144);
        assert_eq!(THREAD_DEFAULT_STACK_SIZE, 1_048_576);
        assert!(THREAD_DEFAULT_STACK_SIZE >= THREAD_MINIMUM_STACK_SIZE);
        assert_eq!(GC_DEFAULT_TIME_SLICE_MS, 8);
        assert_eq!(GC_DEFAULT_TIME_WAIT_MS, 3);
    }

    /// Contract: module blobs start with a magic and a version
    #[test]
    fn contract_module_header() {
        assert_eq!(&MODULE_MAGIC, b"HQMD");
        assert_eq!(MODULE_VERSION, 1);
    }
}

#[cfg(test)]
mod error_contract_tests {
    use super::*;

    /// Contract: HqError::new(code, message) exposes both parts
    #[test]
    fn contract_error_parts() {
        let err = HqError::new(ErrorCode::OutOfRange, "index 9");
        assert_eq!(err.code(), ErrorCode::OutOfRange);
        assert_eq!(err.message(), "index 9");
    }

    /// Contract: the no-function code is shared with hosts as -17
    #[test]
    fn contract_script_no_function_code() {
        assert_eq!(ErrorCode::ScriptNoFunction.code(), -17);
        assert_eq!(ErrorCode::from_code(-17), Some(ErrorCode::ScriptNoFunction));
    }
}

#[cfg(test)]
mod taxonomy_contract_tests {
    use super::*;

    /// Contract: standard exceptions are a closed enum
    #[test]
    fn contract_standard_exception_kinds() {
        let names: Vec<_> = StandardException::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(
            names,
            vec!["RuntimeError", "TypeError", "DivideByZeroError", "IndexOutOfRangeError"]
        );
    }

    /// Contract: severity is either recoverable or fatal
    #[test]
    fn contract_severity_variants() {
        let _ = ExceptionSeverity::Recoverable;
        let _ = ExceptionSeverity::Fatal;
    }

    /// Contract: value tags cover null, numbers, strings, containers, functions and natives
    #[test]
    fn contract_value_type_set() {
        assert_eq!(ValueType::ALL.len(), 17);
        assert_eq!(ValueType::ALL[0], ValueType::Null);
        assert_eq!(ValueType::ALL[16], ValueType::Native);
    }

    /// Contract: report sink defaults to no callback at Info level
    #[test]
    fn contract_report_sink_default() {
        let sink = ReportSink::default();
        assert_eq!(sink.level(), MessageType::Info);
    }
}
