// Hotel booking orchestration core.
//
// Drives a client-side booking session against an external hotel supplier:
// search and filter availability, lock a price, capture guest details,
// commit, then manage or cancel the committed booking.

pub mod client;
pub mod error;
pub mod manage;
pub mod model;
pub mod search;
pub mod session;
pub mod supplier;

// Re-export the types most callers need.
pub use client::{ClientConfig, RemoteSupplierClient, RetryConfig, SupplierApi};
pub use error::BookingError;
pub use manage::{BookingLookup, BookingManagementService, ManagementConfig};
pub use model::{
    BookingStatus, BookingSummary, CancellationOutcome, CommittedBooking, CustomerDetails, Guest,
    GuestType, HotelResult, Price, RoomGuests, RoomRequest, SearchCriteria,
};
pub use search::{
    filter_results, sort_results, HotelFilters, SearchEngine, SearchEngineConfig, SearchOutcome,
    SortKey,
};
pub use session::{
    BookingFlow, BookingSession, CommitOutcome, InMemorySessionStore, PriceChange,
    PriceLockOutcome, SessionPhase, SessionStore,
};
