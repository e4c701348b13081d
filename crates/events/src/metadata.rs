//! Correlation id tracking for event emission.

use std::sync::OnceLock;
use uuid::Uuid;

/// Correlation ID for the current process.
static CORRELATION_ID: OnceLock<Uuid> = OnceLock::new();

/// Get or create the correlation ID shared by every event of this process.
#[must_use]
pub fn correlation_id() -> Uuid {
    *CORRELATION_ID.get_or_init(Uuid::new_v4)
}

/// Set the correlation ID for the current process.
///
/// Only the first call wins; returns `false` if an id was already set.
pub fn set_correlation_id(id: Uuid) -> bool {
    CORRELATION_ID.set(id).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_consistency() {
        let id1 = correlation_id();
        let id2 = correlation_id();
        assert_eq!(id1, id2);
        assert!(!set_correlation_id(Uuid::new_v4()));
    }
}
