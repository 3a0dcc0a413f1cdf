//! HTTP-backed location provider.
//!
//! Resolves the bare external IP first (api.ipify.org with retries, falling
//! back to api.myip.com), then geolocation detail (ip-api.com with retries,
//! falling back to ipinfo.io, then myip.com country-only). Detail failures
//! degrade to an IP-only reply; only a total IP failure is an error.

use crate::provider::{LocationProvider, LocationRecord, LookupError, LookupReply};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const USER_AGENT: &str = concat!("ipvane/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_DELAY: Duration = Duration::from_secs(1);
const IP_ATTEMPTS: u32 = 3;
const GEO_ATTEMPTS: u32 = 2;

// ── Service response types ──

#[derive(Deserialize)]
struct IpifyResponse {
    ip: String,
}

#[derive(Deserialize)]
struct MyIpResponse {
    ip: String,
    cc: String,
}

#[derive(Deserialize)]
struct IpApiResponse {
    status: String,
    message: Option<String>,
    #[serde(rename = "countryCode")]
    country_code: Option<String>,
    city: Option<String>,
    isp: Option<String>,
    query: Option<String>,
}

#[derive(Deserialize)]
struct IpInfoResponse {
    ip: Option<String>,
    country: Option<String>,
    city: Option<String>,
    org: Option<String>,
}

impl IpApiResponse {
    /// ip-api.com reports failures in-band via `status`.
    fn into_record(self, fallback_ip: &str) -> Result<LocationRecord, LookupError> {
        if self.status != "success" {
            return Err(LookupError::RequestFailed(format!(
                "ip-api.com status {}: {}",
                self.status,
                self.message.unwrap_or_default()
            )));
        }
        Ok(LocationRecord {
            ip: self.query.unwrap_or_else(|| fallback_ip.to_owned()),
            country_code: self.country_code.unwrap_or_default().to_lowercase(),
            city: self.city.unwrap_or_default(),
            isp: self.isp.unwrap_or_default(),
        })
    }
}

impl IpInfoResponse {
    fn into_record(self, fallback_ip: &str) -> LocationRecord {
        LocationRecord {
            ip: self.ip.unwrap_or_else(|| fallback_ip.to_owned()),
            country_code: self.country.unwrap_or_default().to_lowercase(),
            city: self.city.unwrap_or_default(),
            isp: self.org.unwrap_or_default(),
        }
    }
}

// ── Provider ──

/// Location provider backed by public HTTP lookup services.
pub struct HttpLocationProvider {
    client: reqwest::Client,
}

impl HttpLocationProvider {
    pub fn new() -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| LookupError::RequestFailed(e.to_string()))?;
        Ok(Self { client })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, LookupError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LookupError::RequestFailed(e.to_string()))?;
        resp.json::<T>()
            .await
            .map_err(|e| LookupError::MalformedResponse(e.to_string()))
    }

    async fn myip(&self) -> Result<MyIpResponse, LookupError> {
        self.get_json("https://api.myip.com").await
    }

    /// Bare external IP: ipify with retries, then myip.com.
    async fn external_ip(&self) -> Result<String, LookupError> {
        for attempt in 1..=IP_ATTEMPTS {
            match self
                .get_json::<IpifyResponse>("https://api.ipify.org?format=json")
                .await
            {
                Ok(body) => return Ok(body.ip),
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "ipify.org lookup failed");
                    if attempt < IP_ATTEMPTS {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }
        tracing::warn!("ipify.org exhausted, falling back to myip.com");
        Ok(self.myip().await?.ip)
    }

    async fn ip_api(&self, ip: &str) -> Result<LocationRecord, LookupError> {
        let url = format!(
            "http://ip-api.com/json/{ip}?fields=status,message,countryCode,city,isp,query"
        );
        self.get_json::<IpApiResponse>(&url).await?.into_record(ip)
    }

    async fn ip_info(&self, ip: &str) -> Result<LocationRecord, LookupError> {
        let url = format!("https://ipinfo.io/{ip}/json");
        Ok(self.get_json::<IpInfoResponse>(&url).await?.into_record(ip))
    }

    /// Geolocation detail with the full fallback chain. `None` when every
    /// service is down; the caller degrades to an IP-only reply.
    async fn geolocate(&self, ip: &str) -> Option<LocationRecord> {
        for attempt in 1..=GEO_ATTEMPTS {
            match self.ip_api(ip).await {
                Ok(record) => return Some(record),
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "ip-api.com lookup failed");
                    if attempt < GEO_ATTEMPTS {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }
        tracing::warn!("ip-api.com exhausted, falling back to ipinfo.io");
        match self.ip_info(ip).await {
            Ok(record) => return Some(record),
            Err(e) => tracing::debug!(error = %e, "ipinfo.io lookup failed"),
        }
        tracing::warn!("ipinfo.io failed, falling back to myip.com");
        match self.myip().await {
            Ok(body) => Some(LocationRecord {
                ip: body.ip,
                country_code: body.cc.to_lowercase(),
                city: "N/A".into(),
                isp: "N/A".into(),
            }),
            Err(e) => {
                tracing::debug!(error = %e, "myip.com lookup failed");
                None
            }
        }
    }

    async fn fetch_inner(&self) -> Result<LookupReply, LookupError> {
        let ip = self.external_ip().await?;
        let location = self.geolocate(&ip).await;
        if location.is_none() {
            tracing::warn!(%ip, "geolocation unavailable, degrading to IP-only reply");
        }
        Ok(LookupReply { ip, location })
    }
}

impl LocationProvider for HttpLocationProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn fetch(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<LookupReply, LookupError>> + Send + '_>> {
        Box::pin(self.fetch_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_api_success_normalizes_country_code() {
        let body = r#"{"status":"success","countryCode":"US","city":"Reston","isp":"Example Corp","query":"1.2.3.4"}"#;
        let resp: IpApiResponse = serde_json::from_str(body).unwrap();
        let record = resp.into_record("9.9.9.9").unwrap();
        assert_eq!(record.ip, "1.2.3.4");
        assert_eq!(record.country_code, "us");
        assert_eq!(record.city, "Reston");
        assert_eq!(record.isp, "Example Corp");
    }

    #[test]
    fn ip_api_failure_status_is_error() {
        let body = r#"{"status":"fail","message":"private range"}"#;
        let resp: IpApiResponse = serde_json::from_str(body).unwrap();
        let err = resp.into_record("10.0.0.1").unwrap_err();
        assert!(err.to_string().contains("private range"));
    }

    #[test]
    fn ip_api_missing_query_falls_back_to_requested_ip() {
        let body = r#"{"status":"success","countryCode":"DE","city":"Berlin","isp":"Other ISP"}"#;
        let resp: IpApiResponse = serde_json::from_str(body).unwrap();
        let record = resp.into_record("5.6.7.8").unwrap();
        assert_eq!(record.ip, "5.6.7.8");
        assert_eq!(record.country_code, "de");
    }

    #[test]
    fn ipinfo_maps_org_to_isp() {
        let body = r#"{"ip":"5.6.7.8","country":"DE","city":"Berlin","org":"AS1234 Other ISP"}"#;
        let resp: IpInfoResponse = serde_json::from_str(body).unwrap();
        let record = resp.into_record("5.6.7.8");
        assert_eq!(record.country_code, "de");
        assert_eq!(record.isp, "AS1234 Other ISP");
    }

    #[test]
    fn ipinfo_tolerates_missing_fields() {
        let resp: IpInfoResponse = serde_json::from_str("{}").unwrap();
        let record = resp.into_record("5.6.7.8");
        assert_eq!(record.ip, "5.6.7.8");
        assert_eq!(record.country_code, "");
    }
}
