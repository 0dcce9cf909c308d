//! REST API client module for the campus portal.
//!
//! `PortalClient` fetches news, events, timetables, grades and courses, and
//! performs admin user management. Requests carry the portal token as
//! `Authorization: Token <token>`; obtaining that token is not handled here.

pub mod client;
pub mod error;

pub use client::PortalClient;
pub use error::ApiError;
