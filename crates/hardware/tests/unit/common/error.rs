//! # Error Policy Tests
//!
//! Covers the relaxed/strict consistency-check policy, the assertion macro and
//! the driver-facing status codes.

use rmt_model::common::{AddressError, BfStatus, ModelError, ModelResult, config_check};
use rstest::rstest;

fn checked(value: u32) -> ModelResult<u32> {
    rmt_model::model_assert!(value < 16, "test", "value {value} out of range");
    Ok(value * 2)
}

#[test]
fn test_config_check_relaxed_only_warns() {
    assert_eq!(config_check(true, "test", "mismatch".to_string()), Ok(()));
}

#[test]
fn test_config_check_strict_fails() {
    let err = config_check(false, "mau::sram", "rows disagree".to_string()).unwrap_err();
    assert_eq!(
        err,
        ModelError::Config {
            context: "mau::sram",
            detail: "rows disagree".to_string()
        }
    );
    assert_eq!(err.to_string(), "configuration check failed in mau::sram: rows disagree");
}

#[test]
fn test_model_assert_returns_invariant_error() {
    assert_eq!(checked(3), Ok(6));
    match checked(20) {
        Err(ModelError::Invariant { context, detail }) => {
            assert_eq!(context, "test");
            assert_eq!(detail, "value 20 out of range");
        }
        other => panic!("expected invariant failure, got {other:?}"),
    }
}

#[test]
fn test_address_error_converts() {
    let err: ModelError = AddressError::HighBitsSet(1 << 50).into();
    assert!(matches!(err, ModelError::Address(AddressError::HighBitsSet(_))));
    assert!(err.to_string().contains("above bit 41"));
}

#[rstest]
#[case(BfStatus::Success, 0)]
#[case(BfStatus::NotReady, 1)]
#[case(BfStatus::NoSysResources, 2)]
#[case(BfStatus::InvalidArg, 3)]
#[case(BfStatus::AlreadyExists, 4)]
#[case(BfStatus::ObjectNotFound, 6)]
#[case(BfStatus::Unexpected, 19)]
fn test_status_codes(#[case] status: BfStatus, #[case] code: i32) {
    assert_eq!(status as i32, code);
}

#[test]
fn test_status_into_result() {
    assert!(BfStatus::Success.is_ok());
    assert_eq!(BfStatus::Success.into_result(), Ok(()));
    assert_eq!(BfStatus::InvalidArg.into_result(), Err(BfStatus::InvalidArg));
    assert!(!BfStatus::NotReady.is_ok());
}
