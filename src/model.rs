// Internal domain types. Supplier payload shapes never leak into these;
// everything here is produced by the boundary transforms in `supplier`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BookingError;

/// One requested room: occupancy the search was made for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRequest {
    pub adults: u32,
    pub children: u32,
    pub children_ages: Vec<u8>,
}

/// Immutable search input. Validated before any supplier call is made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub city_code: String,
    pub nationality: String,
    pub rooms: Vec<RoomRequest>,
}

impl SearchCriteria {
    /// Rejects criteria the supplier must never see: inverted or past stay
    /// dates, zero-adult rooms, child-age lists disagreeing with the count.
    pub fn validate(&self, today: NaiveDate) -> Result<(), BookingError> {
        if self.check_out <= self.check_in {
            return Err(BookingError::validation(format!(
                "check-out {} must be after check-in {}",
                self.check_out, self.check_in
            )));
        }
        if self.check_in < today {
            return Err(BookingError::validation(format!(
                "check-in {} is in the past",
                self.check_in
            )));
        }
        if self.city_code.trim().is_empty() {
            return Err(BookingError::validation("city code is required"));
        }
        if self.rooms.is_empty() {
            return Err(BookingError::validation("at least one room is required"));
        }
        for (idx, room) in self.rooms.iter().enumerate() {
            if room.adults < 1 {
                return Err(BookingError::validation(format!(
                    "room {} must have at least one adult",
                    idx + 1
                )));
            }
            if room.children_ages.len() != room.children as usize {
                return Err(BookingError::validation(format!(
                    "room {}: {} child ages given for {} children",
                    idx + 1,
                    room.children_ages.len(),
                    room.children
                )));
            }
        }
        Ok(())
    }
}

/// Price breakdown as shown to the user. `offered` is the amount the
/// reconciliation step compares against the supplier's re-quoted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub base: f64,
    pub tax: f64,
    pub discount: f64,
    pub published: f64,
    pub offered: f64,
    pub currency: String,
}

/// A supplier-returned, price-bearing hotel offer. `booking_code` is an
/// opaque supplier token echoed back verbatim in later calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotelResult {
    pub booking_code: String,
    pub hotel_name: String,
    pub address: String,
    pub star_rating: u8,
    pub room_type: String,
    pub meal_plan: String,
    pub amenities: Vec<String>,
    pub available_rooms: u32,
    pub price: Price,
    pub refundable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuestType {
    Adult,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    pub title: String,
    pub first_name: String,
    pub last_name: String,
    pub guest_type: GuestType,
}

/// Guest roster for one room, ordered as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomGuests {
    pub guests: Vec<Guest>,
}

/// Per-room guest details captured before commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub rooms: Vec<RoomGuests>,
    pub contact_email: String,
    pub contact_phone: String,
}

/// Normalized booking status. Supplier strings are mapped case-insensitively;
/// anything outside the closed set is surfaced as a `SupplierError` upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Confirmed,
    Pending,
    Cancelled,
    Failed,
}

impl BookingStatus {
    /// Case-insensitive supplier mapping. "vouchered" is this supplier's
    /// word for a confirmed, voucher-issued booking.
    pub fn from_supplier(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "confirmed" | "vouchered" => Some(BookingStatus::Confirmed),
            "pending" => Some(BookingStatus::Pending),
            "cancelled" | "canceled" => Some(BookingStatus::Cancelled),
            "failed" => Some(BookingStatus::Failed),
            _ => None,
        }
    }
}

/// Durable record of a committed booking, owned by the management service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedBooking {
    pub confirmation_number: String,
    pub booking_reference_id: String,
    pub booking_id: i64,
    pub status: BookingStatus,
    pub hotel_name: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub total_fare: f64,
    pub currency: String,
    pub rooms: Vec<RoomGuests>,
    pub booked_on: DateTime<Utc>,
    pub voucher_url: Option<String>,
}

/// Listing row for date-range queries. No guest roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingSummary {
    pub confirmation_number: String,
    pub hotel_name: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub total_fare: f64,
    pub currency: String,
    pub status: BookingStatus,
}

/// Result of one cancellation attempt. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationOutcome {
    pub success: bool,
    pub cancellation_status: String,
    pub refund_amount: f64,
    pub cancellation_charge: f64,
    pub message: String,
}
