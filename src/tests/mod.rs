//! Crate-internal test support and end-to-end pipeline tests
//!
//! Everything here runs on in-memory fakes, so no media files or fonts are
//! needed.
