//! reqwest-backed implementations of [`RemoteOperation`](crate::RemoteOperation)
//! and [`StateFetch`](crate::StateFetch).

pub mod adapters;
pub mod client;

pub use adapters::{HttpOperation, HttpStateFetch};
pub use client::{HttpClient, HttpResponse, RateLimitInfo};
