//! Integration properties that need an installed engine.
//!
//! These run against a real chemengine build; point `CHEMBRIDGE_ENGINE_ROOT`
//! at an install root and run with `--ignored --test-threads=1` (the binding
//! and the retire test are process-wide).

use lib_chem_ffi::{ChemError, EngineLibrary, Session};

fn engine_root() -> String {
    std::env::var("CHEMBRIDGE_ENGINE_ROOT")
        .expect("CHEMBRIDGE_ENGINE_ROOT must point at an engine install root")
}

fn session() -> Session {
    Session::attach(engine_root()).expect("engine session")
}

const BENZENE: &str = "C1=CC=CC=C1";

#[test]
#[ignore = "requires an installed engine"]
fn create_dispose_conserves_references() {
    let session = session();
    let baseline = session.count_references().unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| session.load_structure(BENZENE).unwrap())
        .collect();
    assert!(session.count_references().unwrap() > baseline);

    for handle in &handles {
        handle.dispose();
    }
    assert_eq!(session.count_references().unwrap(), baseline);
    assert_eq!(session.live_handles(), 0);
}

#[test]
#[ignore = "requires an installed engine"]
fn dispose_is_idempotent() {
    let session = session();
    let handle = session.load_structure(BENZENE).unwrap();
    handle.dispose();
    handle.dispose();
    handle.dispose();
    assert!(handle.is_disposed());
}

#[test]
#[ignore = "requires an installed engine"]
fn use_after_dispose_fails_closed() {
    let session = session();
    let handle = session.load_structure(BENZENE).unwrap();
    handle.dispose();
    assert!(matches!(handle.to_text(), Err(ChemError::InvalidHandle)));
    assert!(matches!(handle.count(), Err(ChemError::InvalidHandle)));
    assert!(matches!(handle.serialize(), Err(ChemError::InvalidHandle)));
}

#[test]
#[ignore = "requires an installed engine"]
fn serialize_round_trips_through_the_same_session() {
    let session = session();
    let original = session.load_structure(BENZENE).unwrap();
    let bytes = original.serialize().unwrap();
    assert!(!bytes.is_empty());

    let restored = session.deserialize(&bytes).unwrap();
    assert_eq!(
        original.representation().unwrap(),
        restored.representation().unwrap()
    );
}

#[test]
#[ignore = "requires an installed engine"]
fn iterator_terminates_and_keeps_terminating() {
    let session = session();
    let array = session
        .array_from(vec![
            session.load_structure(BENZENE).unwrap(),
            session.load_structure("CCO").unwrap(),
        ])
        .unwrap();

    let iter = array.items().unwrap();
    assert!(iter.has_next().unwrap());
    assert!(iter.has_next().unwrap(), "peek must be idempotent");

    let mut seen = 0;
    while let Some(item) = iter.next_item().unwrap() {
        assert!(!item.is_disposed());
        seen += 1;
    }
    assert_eq!(seen, 2);

    // End of sequence is sticky, never an error.
    assert!(iter.next_item().unwrap().is_none());
    assert!(iter.next_item().unwrap().is_none());
    assert!(!iter.has_next().unwrap());
}

#[test]
#[ignore = "requires an installed engine"]
fn no_match_is_none_not_an_error() {
    let session = session();
    let target = session.load_structure("CCO").unwrap();
    let query = session.load_query("[#79]").unwrap(); // gold: matches nothing here
    assert!(target.match_query(&query).unwrap().is_none());
    assert_eq!(target.count_matches(&query).unwrap(), 0);
}

#[test]
#[ignore = "requires an installed engine"]
fn options_round_trip_through_every_shape() {
    let session = session();
    session.set_option("render-comment", "hello").unwrap();
    session.set_option("render-image-size", (640, 480)).unwrap();
    session.set_option("render-coloring", true).unwrap();
    session
        .set_option("render-background-color", (1.0f32, 1.0f32, 1.0f32))
        .unwrap();
    session.set_option("max-embeddings", 64).unwrap();

    assert_eq!(session.get_option("render-comment").unwrap(), "hello");
    assert!(session.get_option_bool("render-coloring").unwrap());
    assert_eq!(session.get_option_int("max-embeddings").unwrap(), 64);
    session.reset_options().unwrap();
}

#[test]
#[ignore = "requires an installed engine; run last (retires the binding)"]
fn teardown_after_retire_is_silent() {
    let session = session();
    let handle = session.load_structure(BENZENE).unwrap();

    EngineLibrary::retire();
    handle.dispose(); // must not fault with the binding gone
    drop(session); // release degrades to a no-op
}
