use almanac::{AlmanacError, Result};

#[test]
fn test_error_display() {
    let err = AlmanacError::CacheFull { capacity: 50 };
    assert!(err.to_string().contains("50"));

    let err = AlmanacError::LanguageNotFound("cn".to_string());
    assert!(err.to_string().contains("cn"));
}

#[test]
fn construction_error_names_the_kind() {
    struct SkillTable;
    let err = AlmanacError::construction::<SkillTable>("bad row");
    match &err {
        AlmanacError::Construction { kind, message } => {
            assert!(kind.ends_with("SkillTable"));
            assert_eq!(message, "bad row");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("bad row"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(AlmanacError::NoRuntime)
    }
    assert!(returns_error().is_err());
}

// ============================================================================
// Retriable error classification
// ============================================================================

#[test]
fn retriable_errors() {
    assert!(AlmanacError::CacheFull { capacity: 1 }.is_retriable());
    assert!(AlmanacError::construction::<u8>("x").is_retriable());
}

#[test]
fn permanent_errors() {
    assert!(!AlmanacError::LanguageNotFound("xx".into()).is_retriable());
    assert!(!AlmanacError::Configuration("bad".into()).is_retriable());
    assert!(!AlmanacError::NoRuntime.is_retriable());
    assert!(!AlmanacError::KindMismatch("T").is_retriable());
}
