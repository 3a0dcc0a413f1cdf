//! External IP and geolocation lookup.
//!
//! Defines the [`LocationProvider`] contract the scheduling core consumes,
//! plus the HTTP implementation backed by public lookup services.

pub mod http;
pub mod provider;

pub use http::HttpLocationProvider;
pub use provider::{
    LocationProvider, LocationRecord, LookupError, LookupReply, MockProvider, NO_IP,
};
