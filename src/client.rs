// Supplier API client: the only place network I/O happens.
//
// Transient transport failures are retried with bounded exponential backoff
// and jitter, but only for operations the supplier treats as idempotent
// (search, detail, pre-book, booking reads). Book and cancel are sent at
// most once per call.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::BookingError;
use crate::supplier::{
    AvailabilityRequest, AvailabilityResponse, BookRequest, BookResponse, BookingDetailRequest,
    BookingDetailResponse, BookingListRequest, BookingListResponse, CancelRequest, CancelResponse,
    HotelDetailResponse, PreBookRequest, PreBookResponse,
};

/// Boundary trait for the external Hotel Supplier API. Everything above this
/// trait works with wire types from `supplier` and errors from `error`.
#[async_trait]
pub trait SupplierApi: Send + Sync {
    async fn search(&self, request: AvailabilityRequest)
        -> Result<AvailabilityResponse, BookingError>;

    async fn hotel_detail(&self, booking_code: &str) -> Result<HotelDetailResponse, BookingError>;

    async fn pre_book(&self, request: PreBookRequest) -> Result<PreBookResponse, BookingError>;

    async fn book(&self, request: BookRequest) -> Result<BookResponse, BookingError>;

    async fn booking_detail(
        &self,
        request: BookingDetailRequest,
    ) -> Result<BookingDetailResponse, BookingError>;

    async fn bookings_by_date(
        &self,
        request: BookingListRequest,
    ) -> Result<BookingListResponse, BookingError>;

    async fn cancel(&self, request: CancelRequest) -> Result<CancelResponse, BookingError>;
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
    pub retry: RetryConfig,
}

/// Exponential backoff with jitter to avoid thundering-herd resubmission.
pub fn calculate_backoff(retry_attempt: u32, config: &RetryConfig) -> Duration {
    let base_backoff_ms = (config.initial_backoff_ms as f64
        * config.backoff_multiplier.powf(retry_attempt as f64))
    .min(config.max_backoff_ms as f64);

    let jitter = rand::random::<f64>() * config.jitter_factor * base_backoff_ms;
    let backoff_ms = base_backoff_ms * (1.0 - config.jitter_factor / 2.0) + jitter;

    Duration::from_millis(backoff_ms as u64)
}

/// Runs `operation` until it succeeds, a non-retryable error surfaces, or
/// the retry cap is reached. Only transport-class errors are resent.
async fn retry_with_backoff<T, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, BookingError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, BookingError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < config.max_retries => {
                let backoff = calculate_backoff(attempt, config);
                debug!(attempt, backoff_ms = backoff.as_millis() as u64, %err,
                    "retrying supplier call");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Structured error body the supplier returns on non-2xx responses.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SupplierErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

/// Maps a supplier HTTP status and error code into the local taxonomy. 5xx
/// is treated as transient; unmapped 4xx codes surface with the raw code
/// preserved for diagnostics.
fn map_supplier_error(status: u16, code: &str, message: String) -> BookingError {
    if status >= 500 {
        return BookingError::NetworkError(format!("supplier {}: {}", status, message));
    }
    match code {
        "BOOKING_NOT_FOUND" => BookingError::BookingNotFound(message),
        "INVALID_REFERENCE" => BookingError::InvalidIdentifier(message),
        "CANCEL_NOT_ALLOWED" => BookingError::CancellationNotAllowed(message),
        "ALREADY_CANCELLED" => BookingError::AlreadyCancelled(message),
        "BOOK_REJECTED" => BookingError::CommitFailed(message),
        _ => BookingError::SupplierError {
            code: code.to_string(),
            message,
        },
    }
}

/// HTTP-backed supplier client.
pub struct RemoteSupplierClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl RemoteSupplierClient {
    pub fn new(config: ClientConfig) -> Result<Self, BookingError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| BookingError::NetworkError(e.to_string()))?;
        Ok(Self { http, config })
    }

    async fn post_once<B, R>(&self, path: &str, body: &B) -> Result<R, BookingError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let response = self
            .http
            .post(&url)
            .header("X-Api-Key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BookingError::Timeout(self.config.timeout_ms)
                } else {
                    BookingError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response
                .json::<SupplierErrorBody>()
                .await
                .unwrap_or_else(|_| SupplierErrorBody {
                    code: format!("HTTP_{}", status),
                    message: String::new(),
                });
            warn!(path, status, code = %body.code, "supplier rejected request");
            return Err(map_supplier_error(status, &body.code, body.message));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| BookingError::SupplierError {
                code: "MALFORMED_PAYLOAD".to_string(),
                message: e.to_string(),
            })
    }

    /// Retry wrapper for operations that are safe to resend.
    async fn post_with_retry<B, R>(&self, path: &str, body: &B) -> Result<R, BookingError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        retry_with_backoff(&self.config.retry, || self.post_once(path, body)).await
    }
}

#[async_trait]
impl SupplierApi for RemoteSupplierClient {
    async fn search(
        &self,
        request: AvailabilityRequest,
    ) -> Result<AvailabilityResponse, BookingError> {
        self.post_with_retry("/hotels/availability", &request).await
    }

    async fn hotel_detail(&self, booking_code: &str) -> Result<HotelDetailResponse, BookingError> {
        self.post_with_retry(
            "/hotels/detail",
            &serde_json::json!({ "BookingCode": booking_code }),
        )
        .await
    }

    async fn pre_book(&self, request: PreBookRequest) -> Result<PreBookResponse, BookingError> {
        self.post_with_retry("/hotels/prebook", &request).await
    }

    // Never retried: the supplier does not guarantee book is idempotent.
    async fn book(&self, request: BookRequest) -> Result<BookResponse, BookingError> {
        self.post_once("/hotels/book", &request).await
    }

    async fn booking_detail(
        &self,
        request: BookingDetailRequest,
    ) -> Result<BookingDetailResponse, BookingError> {
        self.post_with_retry("/bookings/detail", &request).await
    }

    async fn bookings_by_date(
        &self,
        request: BookingListRequest,
    ) -> Result<BookingListResponse, BookingError> {
        self.post_with_retry("/bookings/list", &request).await
    }

    async fn cancel(&self, request: CancelRequest) -> Result<CancelResponse, BookingError> {
        self.post_once("/bookings/cancel", &request).await
    }
}
