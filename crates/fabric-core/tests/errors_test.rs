use fabric_core::errors::*;

#[test]
fn l3_conflict_error_carries_oid() {
    let err = L3Error::ConflictError { oid: "concept/1".into() };
    assert!(err.to_string().contains("concept/1"));
}

#[test]
fn outbox_exhausted_carries_id() {
    let err = OutboxError::OutboxExhausted { id: 42 };
    assert!(err.to_string().contains("42"));
}

#[test]
fn promotion_failure_reason_keys_match_original_source_test_suite() {
    assert_eq!(PromotionFailureReason::MissingVector.as_key(), "missing_vector");
    assert_eq!(
        PromotionFailureReason::CoordinatorPutFailed.as_key(),
        "coordinator_put_failed"
    );
    assert_eq!(
        PromotionFailureReason::CoordinatorPutRejected.as_key(),
        "coordinator_put_rejected"
    );
    assert_eq!(PromotionFailureReason::L2PutFailed.as_key(), "l2_put_failed");
}

#[test]
fn subsystem_errors_convert_into_fabric_error() {
    let vector_err: FabricError = VectorError::DimensionMismatch { expected: 8, actual: 4 }.into();
    assert!(vector_err.to_string().contains('8'));

    let coord_err: FabricError = CoordinatorError::CoordinatorStopped.into();
    assert!(matches!(coord_err, FabricError::Coordinator(CoordinatorError::CoordinatorStopped)));
}

#[test]
fn configuration_error_helper_wraps_message() {
    let err = FabricError::configuration("l1.vector_dim must be > 0");
    assert!(err.to_string().contains("vector_dim"));
}
