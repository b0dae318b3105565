//! Integration tests for tag validation and combinators.

use trellis_validator::{
    PropertyTags, combine, create_tag, dirty_tag, track, validate_tag, value_for_tag,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Test that a combinator only invalidates for its own inputs.
///
/// # Panics
/// Panics if dirtying a tag outside a combinator invalidates it.
#[test]
fn combinator_isolation() {
    init();
    let first = create_tag();
    let second = create_tag();
    let third = create_tag();

    let with_second = combine([first.clone(), second.clone()]);
    let with_third = combine([first, third]);
    let second_snapshot = value_for_tag(&with_second);
    let third_snapshot = value_for_tag(&with_third);

    dirty_tag(&second);

    assert!(!validate_tag(&with_second, second_snapshot));
    assert!(validate_tag(&with_third, third_snapshot));
}

/// Test that a snapshot taken right after a read validates.
///
/// # Panics
/// Panics if the fresh snapshot is already stale.
#[test]
fn fresh_snapshot_validates() {
    init();
    let tag = create_tag();
    dirty_tag(&tag);
    assert!(validate_tag(&tag, value_for_tag(&tag)));
}

/// Test that tracked property reads feed combinators built later.
///
/// # Panics
/// Panics if a property write does not reach the outer combinator.
#[test]
fn property_reads_compose() {
    init();
    let person = PropertyTags::new();
    let ((), name_tag) = track(|| person.consume("name"));
    let ((), age_tag) = track(|| person.consume("age"));
    let both = combine([name_tag, age_tag]);
    let snapshot = value_for_tag(&both);

    assert!(validate_tag(&both, snapshot));
    person.dirty("age");
    assert!(!validate_tag(&both, snapshot));
}
