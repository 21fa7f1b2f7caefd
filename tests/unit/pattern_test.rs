//! Tests for event name patterns

use craftkernel::bus::Pattern;

fn matches(pattern: &str, name: &str) -> bool {
    Pattern::compile(pattern).expect("pattern compiles").matches(name)
}

#[test]
fn test_dot_is_escaped_with_percent() {
    assert!(matches("^ui%.tick", "ui.tick"));
    assert!(matches("^ui%.tick", "ui.tickle"));
    assert!(!matches("^ui%.tick", "uiXtick"));
    assert!(matches("^ui.tick", "uiXtick"));
}

#[test]
fn test_unanchored_pattern_matches_anywhere() {
    assert!(matches("error", "task.error"));
    assert!(matches("error", "errors.found"));
    assert!(!matches("error$", "errors.found"));
}

#[test]
fn test_character_classes() {
    assert!(matches("^slot%d+$", "slot42"));
    assert!(!matches("^slot%d+$", "slotX"));
    assert!(matches("^%a+%.%a+$", "storage.changed"));
    assert!(matches("^[%w_]+$", "index_v2"));
    assert!(!matches("^[^%s]+$", "has space"));
}

#[test]
fn test_lazy_quantifier() {
    assert!(matches("^net%..-done$", "net.fetch.done"));
}

#[test]
fn test_unsupported_patterns_are_rejected() {
    for bad in ["%b()", "%f[%a]", "(a)%1", "trailing%", "[abc"] {
        assert!(Pattern::compile(bad).is_err(), "{bad} should be rejected");
    }
}
