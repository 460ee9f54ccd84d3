//! Integration tests for the Rota scheduling engine.
//!
//! These tests drive the full pipeline (constraints, slot generation,
//! conflict filtering, caching, booking writes, and external calendar
//! mirroring) against in-memory collaborators.

#[path = "integration/support.rs"]
mod support;

#[path = "integration/test_availability.rs"]
mod test_availability;

#[path = "integration/test_booking_flow.rs"]
mod test_booking_flow;

#[path = "integration/test_external_calendar.rs"]
mod test_external_calendar;
