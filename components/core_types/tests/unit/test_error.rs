//! Unit tests for HqError and ErrorCode

use core_types::{ErrorCode, HqError, HqResult};

#[cfg(test)]
mod error_code_tests {
    use super::*;

    #[test]
    fn test_error_code_values_are_stable() {
        assert_eq!(ErrorCode::UnspecifiedFailure.code(), -1);
        assert_eq!(ErrorCode::InvalidArg.code(), -2);
        assert_eq!(ErrorCode::InvalidType.code(), -3);
        assert_eq!(ErrorCode::InvalidData.code(), -4);
        assert_eq!(ErrorCode::InvalidRange.code(), -5);
        assert_eq!(ErrorCode::InvalidOperation.code(), -6);
        assert_eq!(ErrorCode::BadAllocation.code(), -7);
        assert_eq!(ErrorCode::Duplicate.code(), -8);
        assert_eq!(ErrorCode::NonExistent.code(), -9);
        assert_eq!(ErrorCode::OutOfRange.code(), -10);
        assert_eq!(ErrorCode::Mismatch.code(), -11);
        assert_eq!(ErrorCode::FailedToOpenFile.code(), -12);
        assert_eq!(ErrorCode::FailedToParseFile.code(), -13);
        assert_eq!(ErrorCode::StreamEnd.code(), -14);
        assert_eq!(ErrorCode::StackEmpty.code(), -15);
        assert_eq!(ErrorCode::StackFull.code(), -16);
        assert_eq!(ErrorCode::ScriptNoFunction.code(), -17);
        assert_eq!(ErrorCode::UnknownId.code(), -18);
        assert_eq!(ErrorCode::NoWrite.code(), -19);
        assert_eq!(ErrorCode::NotImplemented.code(), -99);
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::ScriptNoFunction.to_string(), "no script function");
        assert_eq!(ErrorCode::Mismatch.to_string(), "mismatch");
    }
}

#[cfg(test)]
mod hq_error_tests {
    use super::*;

    fn fails() -> HqResult<()> {
        Err(HqError::new(ErrorCode::StreamEnd, "needed 4 bytes"))
    }

    fn propagates() -> HqResult<u32> {
        fails()?;
        Ok(1)
    }

    #[test]
    fn test_error_propagates_with_question_mark() {
        let err = propagates().unwrap_err();
        assert_eq!(err.code(), ErrorCode::StreamEnd);
        assert_eq!(err.message(), "needed 4 bytes");
    }

    #[test]
    fn test_error_display_includes_code_label() {
        let err = HqError::new(ErrorCode::Duplicate, "module main");
        assert_eq!(err.to_string(), "key already exists: module main");
    }

    #[test]
    fn test_error_is_std_error() {
        let err: Box<dyn std::error::Error> = Box::new(HqError::from(ErrorCode::NoWrite));
        assert_eq!(err.to_string(), "write not permitted: write not permitted");
    }

    #[test]
    fn test_error_equality() {
        let a = HqError::new(ErrorCode::InvalidArg, "x");
        let b = HqError::new(ErrorCode::InvalidArg, "x");
        let c = HqError::new(ErrorCode::InvalidArg, "y");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
