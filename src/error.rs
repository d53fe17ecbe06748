use thiserror::Error;

/// Closed error taxonomy returned by every core operation.
///
/// Supplier codes and transport failures are mapped into these variants at
/// the client boundary; nothing above the boundary inspects raw payloads.
#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Room inventory no longer available for booking code {booking_code}")]
    InventoryUnavailable { booking_code: String },

    #[error("Price or cancellation policy changed and has not been acknowledged")]
    PriceChangeNotAcknowledged,

    #[error("Supplier rejected the commit: {0}")]
    CommitFailed(String),

    #[error("Commit outcome unknown: {0}")]
    CommitUnknown(String),

    #[error("Booking not found: {0}")]
    BookingNotFound(String),

    #[error("Invalid booking identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Cancellation not allowed for booking {0}")]
    CancellationNotAllowed(String),

    #[error("Booking {0} is already cancelled")]
    AlreadyCancelled(String),

    #[error("Cancellation failed: {0}")]
    CancellationFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Supplier error {code}: {message}")]
    SupplierError { code: String, message: String },

    #[error("Invalid session phase: expected {expected}, found {found}")]
    InvalidPhase { expected: String, found: String },

    #[error("Another transition is in flight for this session")]
    TransitionInFlight,
}

impl BookingError {
    /// Transport-level failures are the only retryable class. Supplier
    /// rejections (4xx-class) and local validation failures never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BookingError::NetworkError(_) | BookingError::Timeout(_)
        )
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        BookingError::ValidationError(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_retryable() {
        assert!(BookingError::NetworkError("connection reset".into()).is_retryable());
        assert!(BookingError::Timeout(5000).is_retryable());
    }

    #[test]
    fn supplier_rejections_are_not_retryable() {
        assert!(!BookingError::InventoryUnavailable {
            booking_code: "BC-1".into()
        }
        .is_retryable());
        assert!(!BookingError::CommitFailed("rejected".into()).is_retryable());
        assert!(!BookingError::ValidationError("bad dates".into()).is_retryable());
        assert!(!BookingError::SupplierError {
            code: "ERR-42".into(),
            message: "unmapped".into()
        }
        .is_retryable());
    }
}
