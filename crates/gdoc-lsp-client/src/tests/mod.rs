//! Tests for the session bridge.

pub(crate) mod support;
