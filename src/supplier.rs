// Supplier wire shapes and the boundary transforms into internal types.
//
// The supplier speaks PascalCase JSON; nothing outside this module touches
// that casing. Each transform is a pure function so the mapping can be
// tested field by field.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BookingError;
use crate::model::{
    BookingStatus, BookingSummary, CommittedBooking, CustomerDetails, Guest, GuestType,
    HotelResult, Price, RoomGuests, SearchCriteria,
};

const WIRE_DATE_FMT: &str = "%Y-%m-%d";

// ---------------------------------------------------------------------------
// Requests

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AvailabilityRequest {
    pub start_date: String,
    pub end_date: String,
    pub destination: String,
    pub nationality: String,
    pub room_candidates: Vec<WireRoomCandidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireRoomCandidate {
    pub adults: u32,
    pub children: u32,
    pub child_ages: Vec<u8>,
}

impl From<&SearchCriteria> for AvailabilityRequest {
    fn from(criteria: &SearchCriteria) -> Self {
        AvailabilityRequest {
            start_date: criteria.check_in.format(WIRE_DATE_FMT).to_string(),
            end_date: criteria.check_out.format(WIRE_DATE_FMT).to_string(),
            destination: criteria.city_code.clone(),
            nationality: criteria.nationality.clone(),
            room_candidates: criteria
                .rooms
                .iter()
                .map(|room| WireRoomCandidate {
                    adults: room.adults,
                    children: room.children,
                    child_ages: room.children_ages.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PreBookRequest {
    pub booking_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BookRequest {
    pub booking_code: String,
    pub client_reference: String,
    pub total_fare: f64,
    pub currency: String,
    pub email: String,
    pub phone: String,
    pub rooms: Vec<WireRoomGuests>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireRoomGuests {
    pub paxes: Vec<WirePax>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WirePax {
    pub title: String,
    pub name: String,
    pub surname: String,
    #[serde(rename = "Type")]
    pub pax_type: String,
}

/// Guest roster in supplier casing. Adults travel as "AD", children as "CH".
pub fn paxes_from_details(details: &CustomerDetails) -> Vec<WireRoomGuests> {
    details
        .rooms
        .iter()
        .map(|room| WireRoomGuests {
            paxes: room
                .guests
                .iter()
                .map(|guest| WirePax {
                    title: guest.title.clone(),
                    name: guest.first_name.clone(),
                    surname: guest.last_name.clone(),
                    pax_type: match guest.guest_type {
                        GuestType::Adult => "AD".to_string(),
                        GuestType::Child => "CH".to_string(),
                    },
                })
                .collect(),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BookingDetailRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_reference_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BookingListRequest {
    pub from_date: String,
    pub to_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CancelRequest {
    pub confirmation_number: String,
}

// ---------------------------------------------------------------------------
// Responses

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AvailabilityResponse {
    pub search_id: String,
    pub hotels: Vec<WireHotelOffer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireHotelOffer {
    pub booking_code: String,
    pub hotel_name: String,
    pub address: String,
    pub star_rating: u8,
    pub room_type: String,
    pub meal_plan: String,
    #[serde(default)]
    pub amenities: Vec<String>,
    pub available_rooms: u32,
    pub price: WirePrice,
    pub refundable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WirePrice {
    pub base: f64,
    pub tax: f64,
    #[serde(default)]
    pub discount: f64,
    pub published_price: f64,
    pub offered_price: f64,
    pub currency: String,
}

impl From<WirePrice> for Price {
    fn from(wire: WirePrice) -> Self {
        Price {
            base: wire.base,
            tax: wire.tax,
            discount: wire.discount,
            published: wire.published_price,
            offered: wire.offered_price,
            currency: wire.currency,
        }
    }
}

impl From<WireHotelOffer> for HotelResult {
    fn from(wire: WireHotelOffer) -> Self {
        HotelResult {
            booking_code: wire.booking_code,
            hotel_name: wire.hotel_name,
            address: wire.address,
            star_rating: wire.star_rating,
            room_type: wire.room_type,
            meal_plan: wire.meal_plan,
            amenities: wire.amenities,
            available_rooms: wire.available_rooms,
            price: wire.price.into(),
            refundable: wire.refundable,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HotelDetailResponse {
    pub hotel: WireHotelOffer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PreBookResponse {
    pub status: String,
    pub booking_code: String,
    pub price: WirePrice,
    pub refundable: bool,
}

impl PreBookResponse {
    /// "OK" is the supplier's only success status for pre-book.
    pub fn is_available(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BookResponse {
    pub status: String,
    pub confirmation_number: String,
    pub booking_reference_id: String,
    pub booking_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BookingDetailResponse {
    pub confirmation_number: String,
    pub booking_reference_id: String,
    pub booking_id: i64,
    pub status: String,
    pub hotel_name: String,
    pub check_in: String,
    pub check_out: String,
    pub total_fare: f64,
    pub currency: String,
    #[serde(default)]
    pub rooms: Vec<WireRoomGuests>,
    pub booked_on: String,
    #[serde(default)]
    pub voucher_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BookingListResponse {
    pub bookings: Vec<WireBookingSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireBookingSummary {
    pub confirmation_number: String,
    pub hotel_name: String,
    pub check_in: String,
    pub check_out: String,
    pub total_fare: f64,
    pub currency: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CancelResponse {
    pub status_code: u16,
    pub cancellation_status: String,
    #[serde(default)]
    pub refund_amount: Option<f64>,
    #[serde(default)]
    pub cancellation_charge: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Fallible transforms

fn malformed(field: &str, detail: impl std::fmt::Display) -> BookingError {
    BookingError::SupplierError {
        code: "MALFORMED_PAYLOAD".to_string(),
        message: format!("{}: {}", field, detail),
    }
}

fn parse_wire_date(field: &str, raw: &str) -> Result<NaiveDate, BookingError> {
    NaiveDate::parse_from_str(raw, WIRE_DATE_FMT).map_err(|e| malformed(field, e))
}

pub(crate) fn normalize_status(raw: &str) -> Result<BookingStatus, BookingError> {
    BookingStatus::from_supplier(raw).ok_or_else(|| BookingError::SupplierError {
        code: raw.to_string(),
        message: "unmapped supplier booking status".to_string(),
    })
}

fn guests_from_wire(rooms: Vec<WireRoomGuests>) -> Vec<RoomGuests> {
    rooms
        .into_iter()
        .map(|room| RoomGuests {
            guests: room
                .paxes
                .into_iter()
                .map(|pax| Guest {
                    title: pax.title,
                    first_name: pax.name,
                    last_name: pax.surname,
                    guest_type: if pax.pax_type.eq_ignore_ascii_case("ch") {
                        GuestType::Child
                    } else {
                        GuestType::Adult
                    },
                })
                .collect(),
        })
        .collect()
}

impl TryFrom<BookingDetailResponse> for CommittedBooking {
    type Error = BookingError;

    fn try_from(wire: BookingDetailResponse) -> Result<Self, BookingError> {
        Ok(CommittedBooking {
            status: normalize_status(&wire.status)?,
            check_in: parse_wire_date("CheckIn", &wire.check_in)?,
            check_out: parse_wire_date("CheckOut", &wire.check_out)?,
            booked_on: wire
                .booked_on
                .parse::<DateTime<Utc>>()
                .map_err(|e| malformed("BookedOn", e))?,
            confirmation_number: wire.confirmation_number,
            booking_reference_id: wire.booking_reference_id,
            booking_id: wire.booking_id,
            hotel_name: wire.hotel_name,
            total_fare: wire.total_fare,
            currency: wire.currency,
            rooms: guests_from_wire(wire.rooms),
            voucher_url: wire.voucher_url,
        })
    }
}

impl TryFrom<WireBookingSummary> for BookingSummary {
    type Error = BookingError;

    fn try_from(wire: WireBookingSummary) -> Result<Self, BookingError> {
        Ok(BookingSummary {
            status: normalize_status(&wire.status)?,
            check_in: parse_wire_date("CheckIn", &wire.check_in)?,
            check_out: parse_wire_date("CheckOut", &wire.check_out)?,
            confirmation_number: wire.confirmation_number,
            hotel_name: wire.hotel_name,
            total_fare: wire.total_fare,
            currency: wire.currency,
        })
    }
}
