// Booking session state machine.
//
// One `BookingFlow` owns one booking-in-progress. Phase ordering is strict:
// Idle -> Selected -> PriceLocked -> DetailsCaptured -> Committed, with an
// absorbing Failed state. Supplier I/O happens only inside `lock_price` and
// `commit`; every other transition is pure state mutation. A tokio mutex
// guards the session so a second transition started while one is in flight
// fails with `TransitionInFlight` instead of interleaving.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::client::SupplierApi;
use crate::error::BookingError;
use crate::model::{BookingStatus, CustomerDetails, HotelResult, Price, SearchCriteria};
use crate::supplier::{normalize_status, paxes_from_details, BookRequest, PreBookRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Idle,
    Selected,
    PriceLocked,
    DetailsCaptured,
    Committed,
    Failed,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Committed | SessionPhase::Failed)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Old and new values surfaced to the caller when the supplier re-quotes
/// during price lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceChange {
    pub previous_offered: f64,
    pub current_offered: f64,
    pub previously_refundable: bool,
    pub currently_refundable: bool,
}

impl PriceChange {
    pub fn is_change(&self) -> bool {
        self.previous_offered != self.current_offered
            || self.previously_refundable != self.currently_refundable
    }
}

/// The single mutable booking-in-progress. Serializable so a caller can park
/// it in short-lived storage and rehydrate without re-deriving the phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingSession {
    pub session_id: String,
    pub phase: SessionPhase,
    pub criteria: SearchCriteria,
    pub selected: Option<HotelResult>,
    pub locked_booking_code: Option<String>,
    pub locked_price: Option<Price>,
    pub locked_refundable: Option<bool>,
    pub price_or_policy_changed: bool,
    pub price_change: Option<PriceChange>,
    /// Client-minted idempotency reference submitted with commit, so an
    /// ambiguous outcome can later be resolved by querying booking status.
    pub client_reference: String,
    pub details: Option<CustomerDetails>,
    pub confirmation_number: Option<String>,
    pub booking_reference_id: Option<String>,
    pub booking_id: Option<i64>,
    pub last_transition_at: DateTime<Utc>,
}

impl BookingSession {
    pub fn new(criteria: SearchCriteria) -> Self {
        Self {
            session_id: format!("SES-{:08X}", rand::random::<u32>()),
            phase: SessionPhase::Idle,
            criteria,
            selected: None,
            locked_booking_code: None,
            locked_price: None,
            locked_refundable: None,
            price_or_policy_changed: false,
            price_change: None,
            client_reference: format!("REF-{:08X}", rand::random::<u32>()),
            details: None,
            confirmation_number: None,
            booking_reference_id: None,
            booking_id: None,
            last_transition_at: Utc::now(),
        }
    }

    /// True when the session sat in a non-terminal phase longer than the
    /// caller's inactivity window.
    pub fn is_stale(&self, window: Duration, now: DateTime<Utc>) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        let elapsed = now.signed_duration_since(self.last_transition_at);
        elapsed.num_milliseconds() > window.as_millis() as i64
    }

    fn touch(&mut self) {
        self.last_transition_at = Utc::now();
    }

    fn expect_phase(&self, expected: SessionPhase) -> Result<(), BookingError> {
        if self.phase != expected {
            return Err(BookingError::InvalidPhase {
                expected: expected.to_string(),
                found: self.phase.to_string(),
            });
        }
        Ok(())
    }

    fn reset_to_idle(&mut self) {
        self.phase = SessionPhase::Idle;
        self.selected = None;
        self.locked_booking_code = None;
        self.locked_price = None;
        self.locked_refundable = None;
        self.price_or_policy_changed = false;
        self.price_change = None;
        self.details = None;
        self.touch();
    }
}

/// Result of a successful price lock, including the reconciliation verdict.
#[derive(Debug, Clone)]
pub struct PriceLockOutcome {
    pub locked_price: Price,
    pub refundable: bool,
    pub price_or_policy_changed: bool,
    pub change: Option<PriceChange>,
}

/// Durable identifiers returned by a successful commit.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub confirmation_number: String,
    pub booking_reference_id: String,
    pub booking_id: i64,
    pub status: BookingStatus,
}

/// Drives one `BookingSession` through the booking protocol.
pub struct BookingFlow {
    supplier: Arc<dyn SupplierApi>,
    session: Mutex<BookingSession>,
}

impl BookingFlow {
    pub fn new(supplier: Arc<dyn SupplierApi>, criteria: SearchCriteria) -> Self {
        Self {
            supplier,
            session: Mutex::new(BookingSession::new(criteria)),
        }
    }

    /// Rehydrates a previously serialized session; the stored phase is
    /// trusted, not re-derived.
    pub fn from_session(supplier: Arc<dyn SupplierApi>, session: BookingSession) -> Self {
        Self {
            supplier,
            session: Mutex::new(session),
        }
    }

    /// Clone of the current session state, for inspection or persistence.
    /// Waits for any in-flight transition to finish.
    pub async fn snapshot(&self) -> BookingSession {
        self.session.lock().await.clone()
    }

    fn acquire(&self) -> Result<tokio::sync::MutexGuard<'_, BookingSession>, BookingError> {
        self.session
            .try_lock()
            .map_err(|_| BookingError::TransitionInFlight)
    }

    /// Idle -> Selected. Pure; no supplier call.
    pub async fn select(&self, result: HotelResult) -> Result<(), BookingError> {
        let mut session = self.acquire()?;
        session.expect_phase(SessionPhase::Idle)?;
        if result.booking_code.trim().is_empty() {
            return Err(BookingError::validation(
                "selected result has an empty booking code",
            ));
        }
        session.selected = Some(result);
        session.phase = SessionPhase::Selected;
        session.touch();
        Ok(())
    }

    /// Selected -> PriceLocked (or Failed on supplier rejection). Calls the
    /// supplier pre-book operation and reconciles the returned price and
    /// cancellation terms against what was shown at selection time. A price
    /// or policy change still advances the phase; the caller decides whether
    /// to acknowledge or abandon. Transport errors leave the session in
    /// Selected so the lock can be retried before any commit.
    pub async fn lock_price(&self) -> Result<PriceLockOutcome, BookingError> {
        let mut session = self.acquire()?;
        session.expect_phase(SessionPhase::Selected)?;
        let selected = session
            .selected
            .clone()
            .ok_or_else(|| BookingError::validation("no result selected"))?;

        let response = match self
            .supplier
            .pre_book(PreBookRequest {
                booking_code: selected.booking_code.clone(),
            })
            .await
        {
            Ok(response) => response,
            Err(err) if err.is_retryable() => return Err(err),
            Err(err) => {
                warn!(session_id = %session.session_id, %err, "price lock rejected");
                session.phase = SessionPhase::Failed;
                session.touch();
                return Err(err);
            }
        };

        if !response.is_available() {
            session.phase = SessionPhase::Failed;
            session.touch();
            return Err(BookingError::InventoryUnavailable {
                booking_code: selected.booking_code,
            });
        }

        let locked_price = Price::from(response.price);
        let change = PriceChange {
            previous_offered: selected.price.offered,
            current_offered: locked_price.offered,
            previously_refundable: selected.refundable,
            currently_refundable: response.refundable,
        };
        let changed = change.is_change();

        session.locked_booking_code = Some(response.booking_code);
        session.locked_price = Some(locked_price.clone());
        session.locked_refundable = Some(response.refundable);
        session.price_or_policy_changed = changed;
        session.price_change = changed.then(|| change.clone());
        session.phase = SessionPhase::PriceLocked;
        session.touch();

        if changed {
            info!(session_id = %session.session_id,
                previous = change.previous_offered, current = change.current_offered,
                "supplier re-quoted during price lock");
        }

        Ok(PriceLockOutcome {
            locked_price,
            refundable: response.refundable,
            price_or_policy_changed: changed,
            change: changed.then_some(change),
        })
    }

    /// Caller accepts the re-quoted price/terms. Clears the gate on commit
    /// without re-locking. Valid once a lock is held.
    pub async fn acknowledge_price_change(&self) -> Result<(), BookingError> {
        let mut session = self.acquire()?;
        if !matches!(
            session.phase,
            SessionPhase::PriceLocked | SessionPhase::DetailsCaptured
        ) {
            return Err(BookingError::InvalidPhase {
                expected: SessionPhase::PriceLocked.to_string(),
                found: session.phase.to_string(),
            });
        }
        session.price_or_policy_changed = false;
        session.touch();
        Ok(())
    }

    /// PriceLocked -> DetailsCaptured. Validates the roster against the room
    /// composition that produced the session; rejection leaves the phase
    /// unchanged.
    pub async fn capture_details(&self, details: CustomerDetails) -> Result<(), BookingError> {
        let mut session = self.acquire()?;
        session.expect_phase(SessionPhase::PriceLocked)?;

        if details.rooms.len() != session.criteria.rooms.len() {
            return Err(BookingError::validation(format!(
                "guest details cover {} rooms but the search asked for {}",
                details.rooms.len(),
                session.criteria.rooms.len()
            )));
        }
        for (idx, (room_guests, requested)) in
            details.rooms.iter().zip(&session.criteria.rooms).enumerate()
        {
            let expected = (requested.adults + requested.children) as usize;
            if room_guests.guests.len() != expected {
                return Err(BookingError::validation(format!(
                    "room {}: {} guests supplied, {} expected",
                    idx + 1,
                    room_guests.guests.len(),
                    expected
                )));
            }
            let adults = room_guests
                .guests
                .iter()
                .filter(|g| g.guest_type == crate::model::GuestType::Adult)
                .count();
            if adults < 1 {
                return Err(BookingError::validation(format!(
                    "room {} has no adult guest",
                    idx + 1
                )));
            }
        }

        session.details = Some(details);
        session.phase = SessionPhase::DetailsCaptured;
        session.touch();
        Ok(())
    }

    /// DetailsCaptured -> Committed (or Failed). Submits the locked booking
    /// code, never the original one, together with the client reference and
    /// fare total. Never retried here: a failed commit moves the session to
    /// Failed and the caller must restart from selection with a fresh lock.
    /// Transport-level failures surface as `CommitUnknown` because the
    /// supplier may have processed the request.
    pub async fn commit(&self) -> Result<CommitOutcome, BookingError> {
        let mut session = self.acquire()?;
        session.expect_phase(SessionPhase::DetailsCaptured)?;

        if session.price_or_policy_changed {
            return Err(BookingError::PriceChangeNotAcknowledged);
        }

        let locked_code = session
            .locked_booking_code
            .clone()
            .ok_or_else(|| BookingError::validation("no locked booking code"))?;
        let locked_price = session
            .locked_price
            .clone()
            .ok_or_else(|| BookingError::validation("no locked price"))?;
        let details = session
            .details
            .clone()
            .ok_or_else(|| BookingError::validation("no customer details"))?;

        let request = BookRequest {
            booking_code: locked_code,
            client_reference: session.client_reference.clone(),
            total_fare: locked_price.offered,
            currency: locked_price.currency.clone(),
            email: details.contact_email.clone(),
            phone: details.contact_phone.clone(),
            rooms: paxes_from_details(&details),
        };

        match self.supplier.book(request).await {
            Ok(response) => {
                session.confirmation_number = Some(response.confirmation_number.clone());
                session.booking_reference_id = Some(response.booking_reference_id.clone());
                session.booking_id = Some(response.booking_id);
                session.phase = SessionPhase::Committed;
                session.touch();
                info!(session_id = %session.session_id,
                    confirmation = %response.confirmation_number, "booking committed");
                // Identifiers and the Committed phase are stored first: the
                // booking exists even when the status string is unmapped.
                let status = normalize_status(&response.status)?;
                Ok(CommitOutcome {
                    confirmation_number: response.confirmation_number,
                    booking_reference_id: response.booking_reference_id,
                    booking_id: response.booking_id,
                    status,
                })
            }
            Err(err) => {
                session.phase = SessionPhase::Failed;
                session.touch();
                let mapped = match err {
                    e @ BookingError::CommitFailed(_) => e,
                    e if e.is_retryable() => BookingError::CommitUnknown(e.to_string()),
                    e => BookingError::CommitFailed(e.to_string()),
                };
                warn!(session_id = %session.session_id, %mapped, "commit did not complete");
                Err(mapped)
            }
        }
    }

    /// Discards the in-flight session. No supplier call; valid from any
    /// phase before Committed.
    pub async fn abandon(&self) -> Result<(), BookingError> {
        let mut session = self.acquire()?;
        if session.phase == SessionPhase::Committed {
            return Err(BookingError::InvalidPhase {
                expected: "any phase before Committed".to_string(),
                found: session.phase.to_string(),
            });
        }
        session.reset_to_idle();
        Ok(())
    }

    /// Caller-driven enforcement of the inactivity window: a stale
    /// non-terminal session transitions to Failed. Returns whether it fired.
    pub async fn expire_if_stale(&self, window: Duration) -> Result<bool, BookingError> {
        let mut session = self.acquire()?;
        if session.is_stale(window, Utc::now()) {
            session.phase = SessionPhase::Failed;
            session.touch();
            return Ok(true);
        }
        Ok(false)
    }
}

/// Capability the core depends on for parking sessions; keyed by the user
/// context, so putting a new session discards the previous uncommitted one.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<BookingSession>;
    fn put(&self, key: &str, session: &BookingSession);
    fn clear(&self, key: &str);
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, BookingSession>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, key: &str) -> Option<BookingSession> {
        self.sessions.get(key).map(|entry| entry.clone())
    }

    fn put(&self, key: &str, session: &BookingSession) {
        self.sessions.insert(key.to_string(), session.clone());
    }

    fn clear(&self, key: &str) {
        self.sessions.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{offer, BookMode, MockSupplier, PreBookMode};
    use crate::model::{Guest, GuestType, RoomGuests, RoomRequest};
    use std::sync::atomic::Ordering;

    fn criteria() -> SearchCriteria {
        SearchCriteria {
            check_in: "2024-03-15".parse().unwrap(),
            check_out: "2024-03-18".parse().unwrap(),
            city_code: "BOM".to_string(),
            nationality: "IN".to_string(),
            rooms: vec![RoomRequest {
                adults: 2,
                children: 0,
                children_ages: vec![],
            }],
        }
    }

    fn adult(first: &str) -> Guest {
        Guest {
            title: "Mr".to_string(),
            first_name: first.to_string(),
            last_name: "Mehta".to_string(),
            guest_type: GuestType::Adult,
        }
    }

    fn two_adults() -> CustomerDetails {
        CustomerDetails {
            rooms: vec![RoomGuests {
                guests: vec![adult("Arun"), adult("Nisha")],
            }],
            contact_email: "arun@example.com".to_string(),
            contact_phone: "+91-9000000000".to_string(),
        }
    }

    fn supplier_with(offered: f64) -> Arc<MockSupplier> {
        Arc::new(
            MockSupplier::new()
                .with_search_results(vec![offer("BC-LUX", "Sea Crest Palace", 5, offered)]),
        )
    }

    async fn select_luxury(flow: &BookingFlow, supplier: &MockSupplier) {
        let result = HotelResult::from(supplier.search_hotels.lock()[0].clone());
        flow.select(result).await.unwrap();
    }

    #[tokio::test]
    async fn happy_path_reaches_committed() {
        let supplier = supplier_with(340.0);
        let flow = BookingFlow::new(supplier.clone(), criteria());

        select_luxury(&flow, &supplier).await;

        let lock = flow.lock_price().await.unwrap();
        assert!(!lock.price_or_policy_changed);
        assert_eq!(lock.locked_price.offered, 340.0);

        flow.capture_details(two_adults()).await.unwrap();

        let outcome = flow.commit().await.unwrap();
        assert!(!outcome.confirmation_number.is_empty());
        assert_eq!(outcome.status, BookingStatus::Confirmed);

        let session = flow.snapshot().await;
        assert_eq!(session.phase, SessionPhase::Committed);
        assert_eq!(
            session.locked_booking_code.as_deref(),
            Some("LOCKED-BC-LUX")
        );
    }

    #[tokio::test]
    async fn commit_from_early_phase_fails_without_side_effects() {
        let supplier = supplier_with(340.0);
        let flow = BookingFlow::new(supplier.clone(), criteria());

        // From Idle.
        assert!(matches!(
            flow.commit().await,
            Err(BookingError::InvalidPhase { .. })
        ));
        // From Selected.
        select_luxury(&flow, &supplier).await;
        assert!(matches!(
            flow.commit().await,
            Err(BookingError::InvalidPhase { .. })
        ));

        assert_eq!(supplier.calls.book.load(Ordering::SeqCst), 0);
        assert_eq!(flow.snapshot().await.phase, SessionPhase::Selected);
    }

    #[tokio::test]
    async fn select_rejects_empty_booking_code() {
        let supplier = supplier_with(340.0);
        let flow = BookingFlow::new(supplier.clone(), criteria());

        let mut result = HotelResult::from(supplier.search_hotels.lock()[0].clone());
        result.booking_code = String::new();
        assert!(matches!(
            flow.select(result).await,
            Err(BookingError::ValidationError(_))
        ));
        assert_eq!(flow.snapshot().await.phase, SessionPhase::Idle);
    }

    #[tokio::test]
    async fn price_change_gates_commit_until_acknowledged() {
        let supplier = supplier_with(210.0);
        supplier.set_prebook_mode("BC-LUX", PreBookMode::Reprice(200.0));
        let flow = BookingFlow::new(supplier.clone(), criteria());

        select_luxury(&flow, &supplier).await;

        let lock = flow.lock_price().await.unwrap();
        assert!(lock.price_or_policy_changed);
        let change = lock.change.unwrap();
        assert_eq!(change.previous_offered, 210.0);
        assert_eq!(change.current_offered, 200.0);
        // The machine still advances; the decision is the caller's.
        assert_eq!(flow.snapshot().await.phase, SessionPhase::PriceLocked);

        flow.capture_details(two_adults()).await.unwrap();
        assert!(matches!(
            flow.commit().await,
            Err(BookingError::PriceChangeNotAcknowledged)
        ));
        // Refusal is a gate, not a failure.
        assert_eq!(flow.snapshot().await.phase, SessionPhase::DetailsCaptured);
        assert_eq!(supplier.calls.book.load(Ordering::SeqCst), 0);

        flow.acknowledge_price_change().await.unwrap();
        assert!(flow.commit().await.is_ok());
    }

    #[tokio::test]
    async fn policy_change_alone_sets_the_flag() {
        let supplier = supplier_with(340.0);
        supplier.set_prebook_mode("BC-LUX", PreBookMode::PolicyChange);
        let flow = BookingFlow::new(supplier.clone(), criteria());

        select_luxury(&flow, &supplier).await;
        let lock = flow.lock_price().await.unwrap();
        assert!(lock.price_or_policy_changed);
        let change = lock.change.unwrap();
        assert!(change.previously_refundable);
        assert!(!change.currently_refundable);
        assert_eq!(change.previous_offered, change.current_offered);
    }

    #[tokio::test]
    async fn sold_out_lock_moves_session_to_failed() {
        let supplier = supplier_with(340.0);
        supplier.set_prebook_mode("BC-LUX", PreBookMode::SoldOut);
        let flow = BookingFlow::new(supplier.clone(), criteria());

        select_luxury(&flow, &supplier).await;
        let err = flow.lock_price().await.unwrap_err();
        assert!(matches!(err, BookingError::InventoryUnavailable { .. }));
        assert!(!err.is_retryable());
        assert_eq!(flow.snapshot().await.phase, SessionPhase::Failed);
    }

    #[tokio::test]
    async fn transport_failure_during_lock_keeps_session_selected() {
        let supplier = supplier_with(340.0);
        let flow = BookingFlow::new(supplier.clone(), criteria());

        select_luxury(&flow, &supplier).await;
        supplier.fail_next_requests(1);
        assert!(flow.lock_price().await.unwrap_err().is_retryable());
        // Lock may be retried before any commit has been attempted.
        assert_eq!(flow.snapshot().await.phase, SessionPhase::Selected);
        assert!(flow.lock_price().await.is_ok());
    }

    #[tokio::test]
    async fn roster_mismatch_is_rejected_without_phase_change() {
        let supplier = supplier_with(340.0);
        let flow = BookingFlow::new(supplier.clone(), criteria());

        select_luxury(&flow, &supplier).await;
        flow.lock_price().await.unwrap();

        // One guest supplied for a two-adult room.
        let short = CustomerDetails {
            rooms: vec![RoomGuests {
                guests: vec![adult("Arun")],
            }],
            contact_email: "arun@example.com".to_string(),
            contact_phone: "+91-9000000000".to_string(),
        };
        assert!(matches!(
            flow.capture_details(short).await,
            Err(BookingError::ValidationError(_))
        ));
        assert_eq!(flow.snapshot().await.phase, SessionPhase::PriceLocked);

        // A room with only child-typed guests is also rejected.
        let no_adult = CustomerDetails {
            rooms: vec![RoomGuests {
                guests: vec![
                    Guest {
                        title: "Ms".to_string(),
                        first_name: "Diya".to_string(),
                        last_name: "Mehta".to_string(),
                        guest_type: GuestType::Child,
                    },
                    Guest {
                        title: "Ms".to_string(),
                        first_name: "Riya".to_string(),
                        last_name: "Mehta".to_string(),
                        guest_type: GuestType::Child,
                    },
                ],
            }],
            contact_email: "arun@example.com".to_string(),
            contact_phone: "+91-9000000000".to_string(),
        };
        assert!(matches!(
            flow.capture_details(no_adult).await,
            Err(BookingError::ValidationError(_))
        ));
        assert_eq!(flow.snapshot().await.phase, SessionPhase::PriceLocked);
    }

    #[tokio::test]
    async fn commit_uses_locked_code_and_client_reference() {
        let supplier = supplier_with(340.0);
        let flow = BookingFlow::new(supplier.clone(), criteria());

        select_luxury(&flow, &supplier).await;
        flow.lock_price().await.unwrap();
        flow.capture_details(two_adults()).await.unwrap();

        let reference = flow.snapshot().await.client_reference.clone();
        let outcome = flow.commit().await.unwrap();
        assert_eq!(outcome.booking_reference_id, reference);
    }

    #[tokio::test]
    async fn rejected_commit_fails_session_definitively() {
        let supplier = supplier_with(340.0);
        supplier.set_book_mode(BookMode::Reject("rate expired".to_string()));
        let flow = BookingFlow::new(supplier.clone(), criteria());

        select_luxury(&flow, &supplier).await;
        flow.lock_price().await.unwrap();
        flow.capture_details(two_adults()).await.unwrap();

        assert!(matches!(
            flow.commit().await,
            Err(BookingError::CommitFailed(_))
        ));
        let session = flow.snapshot().await;
        assert_eq!(session.phase, SessionPhase::Failed);
        assert!(session.confirmation_number.is_none());

        // No automatic retry: a second commit attempt is a phase error.
        assert!(matches!(
            flow.commit().await,
            Err(BookingError::InvalidPhase { .. })
        ));
        assert_eq!(supplier.calls.book.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unmapped_commit_status_surfaces_raw_code() {
        let supplier = supplier_with(340.0);
        supplier.set_book_mode(BookMode::ConfirmWithStatus("On-Request".to_string()));
        let flow = BookingFlow::new(supplier.clone(), criteria());

        select_luxury(&flow, &supplier).await;
        flow.lock_price().await.unwrap();
        flow.capture_details(two_adults()).await.unwrap();

        match flow.commit().await {
            Err(BookingError::SupplierError { code, .. }) => assert_eq!(code, "On-Request"),
            other => panic!("expected SupplierError, got {:?}", other),
        }

        // The booking went through; the session keeps its identifiers.
        let session = flow.snapshot().await;
        assert_eq!(session.phase, SessionPhase::Committed);
        assert!(session.confirmation_number.is_some());
    }

    #[tokio::test]
    async fn transport_failure_during_commit_is_unknown_outcome() {
        let supplier = supplier_with(340.0);
        supplier.set_book_mode(BookMode::Transport);
        let flow = BookingFlow::new(supplier.clone(), criteria());

        select_luxury(&flow, &supplier).await;
        flow.lock_price().await.unwrap();
        flow.capture_details(two_adults()).await.unwrap();

        assert!(matches!(
            flow.commit().await,
            Err(BookingError::CommitUnknown(_))
        ));
        assert_eq!(flow.snapshot().await.phase, SessionPhase::Failed);
    }

    #[tokio::test]
    async fn abandon_discards_without_supplier_call() {
        let supplier = supplier_with(340.0);
        let flow = BookingFlow::new(supplier.clone(), criteria());

        select_luxury(&flow, &supplier).await;
        flow.lock_price().await.unwrap();
        let calls_before = supplier.calls.pre_book.load(Ordering::SeqCst);

        flow.abandon().await.unwrap();
        let session = flow.snapshot().await;
        assert_eq!(session.phase, SessionPhase::Idle);
        assert!(session.selected.is_none());
        assert!(session.locked_booking_code.is_none());
        assert_eq!(supplier.calls.pre_book.load(Ordering::SeqCst), calls_before);
    }

    #[tokio::test]
    async fn abandon_after_commit_is_rejected() {
        let supplier = supplier_with(340.0);
        let flow = BookingFlow::new(supplier.clone(), criteria());

        select_luxury(&flow, &supplier).await;
        flow.lock_price().await.unwrap();
        flow.capture_details(two_adults()).await.unwrap();
        flow.commit().await.unwrap();

        assert!(matches!(
            flow.abandon().await,
            Err(BookingError::InvalidPhase { .. })
        ));
    }

    #[tokio::test]
    async fn concurrent_transition_is_rejected() {
        let supplier = supplier_with(340.0);
        supplier.set_delay(Duration::from_millis(100));
        let flow = Arc::new(BookingFlow::new(supplier.clone(), criteria()));

        select_luxury(&flow, &supplier).await;

        let locking = {
            let flow = flow.clone();
            tokio::spawn(async move { flow.lock_price().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(matches!(
            flow.capture_details(two_adults()).await,
            Err(BookingError::TransitionInFlight)
        ));
        locking.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn session_rehydrates_from_serialized_state() {
        let supplier = supplier_with(340.0);
        let flow = BookingFlow::new(supplier.clone(), criteria());

        select_luxury(&flow, &supplier).await;
        flow.lock_price().await.unwrap();

        let serialized = serde_json::to_string(&flow.snapshot().await).unwrap();
        drop(flow);

        let parked: BookingSession = serde_json::from_str(&serialized).unwrap();
        assert_eq!(parked.phase, SessionPhase::PriceLocked);

        let resumed = BookingFlow::from_session(supplier, parked);
        resumed.capture_details(two_adults()).await.unwrap();
        assert!(resumed.commit().await.is_ok());
    }

    #[tokio::test]
    async fn stale_session_can_be_expired_by_caller() {
        let supplier = supplier_with(340.0);
        let flow = BookingFlow::new(supplier.clone(), criteria());
        select_luxury(&flow, &supplier).await;

        assert!(!flow.expire_if_stale(Duration::from_secs(600)).await.unwrap());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(flow.expire_if_stale(Duration::from_millis(0)).await.unwrap());
        assert_eq!(flow.snapshot().await.phase, SessionPhase::Failed);
    }

    #[test]
    fn store_replaces_uncommitted_session_for_same_user() {
        let store = InMemorySessionStore::new();
        let first = BookingSession::new(criteria());
        store.put("user-1", &first);

        let second = BookingSession::new(criteria());
        store.put("user-1", &second);

        let active = store.get("user-1").unwrap();
        assert_eq!(active.session_id, second.session_id);

        store.clear("user-1");
        assert!(store.get("user-1").is_none());
    }
}
