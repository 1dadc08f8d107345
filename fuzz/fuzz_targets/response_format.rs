#![no_main]

use libfuzzer_sys::fuzz_target;
use topicbot_commands::{extract_session_id, format_output};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    if let Some(session_id) = extract_session_id(&raw) {
        assert!(session_id.starts_with("ses_"));
    }

    let formatted = format_output(&raw, None);
    assert!(!formatted.is_empty());
    // Over-limit output is cut to 1950 chars plus the marker.
    assert!(formatted.chars().count() <= 2_000 + 64);
});
