//! Client for the inventory API that records an equipment allocation once a
//! scan is accepted. The bearer token is passed in by the caller.

pub mod client;
pub mod error;

pub use client::{AllocationClient, AllocationReceipt, AllocationRequest};
pub use error::AllocationError;
