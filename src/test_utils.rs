//! Shared proptest strategies for unit tests.

use proptest::prelude::*;

/// Printable text of 1 to `max_len` characters, as a form field would carry.
pub(crate) fn arb_field_text(max_len: usize) -> impl Strategy<Value = String> {
    prop::string::string_regex(&format!("[a-zA-Z0-9 .,!?'-]{{1,{}}}", max_len))
        .expect("valid regex")
}

/// A hex session identifier of the length the memory store generates.
pub(crate) fn arb_session_token() -> impl Strategy<Value = String> {
    prop::string::string_regex("[0-9a-f]{64}").expect("valid regex")
}
