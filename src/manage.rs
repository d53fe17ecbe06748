// Booking management service. Operates on already-committed bookings and is
// fully decoupled from any in-flight session: retrieval and cancellation are
// independent, side-effect-isolated supplier calls.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::client::SupplierApi;
use crate::error::BookingError;
use crate::model::{BookingSummary, CancellationOutcome, CommittedBooking};
use crate::supplier::{
    BookingDetailRequest, BookingListRequest, CancelRequest, CancelResponse,
};

const RANGE_DATE_FMT: &str = "%Y-%m-%d";

#[derive(Debug, Clone)]
pub struct ManagementConfig {
    /// How long a retrieved booking detail may be served from cache.
    pub detail_cache_ttl: Duration,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            detail_cache_ttl: Duration::from_secs(60),
        }
    }
}

/// Identifier for a detail lookup. Exactly one of the two is required.
#[derive(Debug, Clone, Default)]
pub struct BookingLookup {
    pub confirmation_number: Option<String>,
    pub booking_reference_id: Option<String>,
}

impl BookingLookup {
    pub fn by_confirmation(confirmation: impl Into<String>) -> Self {
        Self {
            confirmation_number: Some(confirmation.into()),
            booking_reference_id: None,
        }
    }

    pub fn by_reference(reference: impl Into<String>) -> Self {
        Self {
            confirmation_number: None,
            booking_reference_id: Some(reference.into()),
        }
    }

    fn validate(&self) -> Result<(), BookingError> {
        match (&self.confirmation_number, &self.booking_reference_id) {
            (Some(_), Some(_)) => Err(BookingError::InvalidIdentifier(
                "supply exactly one of confirmation number or booking reference".to_string(),
            )),
            (None, None) => Err(BookingError::InvalidIdentifier(
                "an identifier is required".to_string(),
            )),
            (Some(id), None) | (None, Some(id)) if id.trim().is_empty() => Err(
                BookingError::InvalidIdentifier("identifier must not be empty".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

/// Success requires the supplier status code *and* the cancellation-status
/// string to both indicate success; either alone is insufficient. Missing
/// numeric fields default to zero.
fn interpret_cancel_response(
    confirmation: &str,
    response: CancelResponse,
) -> Result<CancellationOutcome, BookingError> {
    let status = response.cancellation_status.to_ascii_lowercase();
    let status_ok = matches!(status.as_str(), "cancelled" | "canceled" | "success");

    if response.status_code == 200 && status_ok {
        return Ok(CancellationOutcome {
            success: true,
            cancellation_status: response.cancellation_status,
            refund_amount: response.refund_amount.unwrap_or(0.0),
            cancellation_charge: response.cancellation_charge.unwrap_or(0.0),
            message: response.message.unwrap_or_default(),
        });
    }

    match status.as_str() {
        "notallowed" | "not_allowed" => {
            Err(BookingError::CancellationNotAllowed(confirmation.to_string()))
        }
        "alreadycancelled" | "already_cancelled" => {
            Err(BookingError::AlreadyCancelled(confirmation.to_string()))
        }
        _ => Err(BookingError::CancellationFailed(
            response
                .message
                .unwrap_or_else(|| response.cancellation_status),
        )),
    }
}

pub struct BookingManagementService {
    supplier: Arc<dyn SupplierApi>,
    config: ManagementConfig,
    detail_cache: DashMap<String, (CommittedBooking, Instant)>,
}

impl BookingManagementService {
    pub fn new(supplier: Arc<dyn SupplierApi>, config: ManagementConfig) -> Self {
        Self {
            supplier,
            config,
            detail_cache: DashMap::new(),
        }
    }

    /// Retrieves a committed booking by exactly one identifier.
    pub async fn get_booking_details(
        &self,
        lookup: BookingLookup,
    ) -> Result<CommittedBooking, BookingError> {
        lookup.validate()?;

        if let Some(confirmation) = &lookup.confirmation_number {
            if let Some(entry) = self.detail_cache.get(confirmation) {
                let (booking, stored_at) = entry.value();
                if stored_at.elapsed() <= self.config.detail_cache_ttl {
                    debug!(confirmation, "serving booking detail from cache");
                    return Ok(booking.clone());
                }
            }
        }

        let response = self
            .supplier
            .booking_detail(BookingDetailRequest {
                confirmation_number: lookup.confirmation_number.clone(),
                booking_reference_id: lookup.booking_reference_id.clone(),
            })
            .await?;
        let booking = CommittedBooking::try_from(response)?;
        self.detail_cache.insert(
            booking.confirmation_number.clone(),
            (booking.clone(), Instant::now()),
        );
        Ok(booking)
    }

    /// Resolves the outcome of an ambiguous commit by looking the booking up
    /// under the client reference that was submitted with it. `Ok` means the
    /// supplier did process the commit; `BookingNotFound` means it did not
    /// and the caller may safely restart from selection.
    pub async fn resume_status(
        &self,
        client_reference: &str,
    ) -> Result<CommittedBooking, BookingError> {
        self.get_booking_details(BookingLookup::by_reference(client_reference))
            .await
    }

    /// Lists committed bookings whose stay window intersects the range.
    /// Dates must be strict `YYYY-MM-DD` and `from` must not be after `to`.
    pub async fn get_bookings_by_date_range(
        &self,
        from_date: &str,
        to_date: &str,
    ) -> Result<Vec<BookingSummary>, BookingError> {
        let from = NaiveDate::parse_from_str(from_date, RANGE_DATE_FMT).map_err(|_| {
            BookingError::validation(format!("from date '{}' is not YYYY-MM-DD", from_date))
        })?;
        let to = NaiveDate::parse_from_str(to_date, RANGE_DATE_FMT).map_err(|_| {
            BookingError::validation(format!("to date '{}' is not YYYY-MM-DD", to_date))
        })?;
        if from > to {
            return Err(BookingError::validation(format!(
                "from date {} is after to date {}",
                from, to
            )));
        }

        let response = self
            .supplier
            .bookings_by_date(BookingListRequest {
                from_date: from_date.to_string(),
                to_date: to_date.to_string(),
            })
            .await?;

        response
            .bookings
            .into_iter()
            .map(BookingSummary::try_from)
            .collect()
    }

    /// Cancels a committed booking and computes the refund outcome.
    pub async fn cancel_booking(
        &self,
        confirmation_number: &str,
    ) -> Result<CancellationOutcome, BookingError> {
        if confirmation_number.trim().is_empty() {
            return Err(BookingError::InvalidIdentifier(
                "confirmation number must not be empty".to_string(),
            ));
        }

        let response = self
            .supplier
            .cancel(CancelRequest {
                confirmation_number: confirmation_number.to_string(),
            })
            .await?;

        // The supplier has been consulted; whatever the verdict, any cached
        // detail for this booking may now show a stale status.
        self.detail_cache.remove(confirmation_number);

        let outcome = interpret_cancel_response(confirmation_number, response)?;
        info!(confirmation = confirmation_number, refund = outcome.refund_amount,
            "booking cancelled");
        Ok(outcome)
    }
}
