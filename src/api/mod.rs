//! Data structures for the API, shared between client and server.

pub mod kmip;
pub mod status;
