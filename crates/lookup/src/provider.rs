use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The designated "no valid IP" sentinel: a known failure, distinct from
/// "not yet fetched".
pub const NO_IP: &str = "N/A";

/// One resolved network identity snapshot. Immutable once constructed;
/// a new fetch produces a new record, never a patched one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub ip: String,
    /// Two-letter lowercase country code, or "??" when geolocation failed.
    pub country_code: String,
    pub city: String,
    pub isp: String,
}

impl LocationRecord {
    /// Degraded record for when the bare IP resolved but geolocation did not.
    pub fn partial(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            country_code: "??".into(),
            city: "N/A".into(),
            isp: "N/A".into(),
        }
    }
}

/// What one lookup cycle resolves to: the bare external IP plus optional
/// geolocation detail. `location: None` means the detail lookup failed even
/// though the IP itself succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupReply {
    pub ip: String,
    pub location: Option<LocationRecord>,
}

impl LookupReply {
    /// Reply carrying full geolocation detail.
    pub fn full(record: LocationRecord) -> Self {
        Self {
            ip: record.ip.clone(),
            location: Some(record),
        }
    }

    /// IP-only reply (geolocation degraded away).
    pub fn bare(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            location: None,
        }
    }
}

/// Error type for lookup operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LookupError {
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("all lookup services exhausted")]
    ServicesExhausted,
}

/// Trait for external IP / geolocation providers.
///
/// `fetch` must resolve within the caller's timeout or the scheduler treats
/// the cycle as failed; it must never hang indefinitely.
pub trait LocationProvider: Send + Sync {
    fn name(&self) -> &str;

    fn fetch(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<LookupReply, LookupError>> + Send + '_>>;
}

/// Mock provider for testing. Returns whatever result was last set, and
/// counts fetches.
pub struct MockProvider {
    current: Mutex<Result<LookupReply, LookupError>>,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(result: Result<LookupReply, LookupError>) -> Self {
        Self {
            current: Mutex::new(result),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn ok(reply: LookupReply) -> Self {
        Self::new(Ok(reply))
    }

    pub fn failing() -> Self {
        Self::new(Err(LookupError::RequestFailed("mock failure".into())))
    }

    /// Swap what subsequent fetches return.
    pub fn set(&self, result: Result<LookupReply, LookupError>) {
        *self.current.lock().unwrap() = result;
    }

    pub fn set_ok(&self, reply: LookupReply) {
        self.set(Ok(reply));
    }

    pub fn set_err(&self) {
        self.set(Err(LookupError::RequestFailed("mock failure".into())));
    }

    /// Number of fetches issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LocationProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn fetch(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<LookupReply, LookupError>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self.current.lock().unwrap().clone();
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_record_fields() {
        let r = LocationRecord::partial("1.2.3.4");
        assert_eq!(r.ip, "1.2.3.4");
        assert_eq!(r.country_code, "??");
        assert_eq!(r.city, "N/A");
        assert_eq!(r.isp, "N/A");
    }

    #[test]
    fn full_reply_carries_ip() {
        let reply = LookupReply::full(LocationRecord::partial("5.6.7.8"));
        assert_eq!(reply.ip, "5.6.7.8");
        assert!(reply.location.is_some());
    }

    #[tokio::test]
    async fn mock_provider_counts_and_swaps() {
        let mock = MockProvider::ok(LookupReply::bare("1.2.3.4"));
        assert_eq!(mock.fetch().await.unwrap().ip, "1.2.3.4");
        assert_eq!(mock.calls(), 1);

        mock.set_err();
        assert!(mock.fetch().await.is_err());
        assert_eq!(mock.calls(), 2);
    }

    #[test]
    fn provider_object_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MockProvider>();
    }
}
