use crate::types::CacheError;

/// Returns true when `error` indicates the remote backend's transport or
/// data-access layer is unavailable, i.e. the failure modes that justify
/// serving from the local tier.
///
/// The set is fixed and deliberately narrow: a loader failure or a
/// serialization mismatch is a real bug and must surface to the caller
/// instead of being masked by a degraded read.
pub fn is_infrastructure_failure(error: &CacheError) -> bool {
    matches!(
        error,
        CacheError::ConnectionFailure(_)
            | CacheError::SystemFailure(_)
            | CacheError::DataAccess(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_kinds() {
        assert!(is_infrastructure_failure(&CacheError::ConnectionFailure(
            "refused".to_string()
        )));
        assert!(is_infrastructure_failure(&CacheError::SystemFailure(
            "LOADING".to_string()
        )));
        assert!(is_infrastructure_failure(&CacheError::DataAccess(
            "WRONGTYPE".to_string()
        )));
    }

    #[test]
    fn test_non_infrastructure_kinds() {
        assert!(!is_infrastructure_failure(&CacheError::Loader {
            key: "k".to_string(),
            reason: "boom".to_string(),
        }));
        assert!(!is_infrastructure_failure(&CacheError::Serialization(
            "bad frame".to_string()
        )));
        assert!(!is_infrastructure_failure(&CacheError::Configuration(
            "missing url".to_string()
        )));
        assert!(!is_infrastructure_failure(&CacheError::Internal(
            "bug".to_string()
        )));
    }
}
