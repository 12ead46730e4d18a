//! Integration tests: rule trees compiled end to end and executed by the
//! in-memory engine.

mod helpers;

mod relation_test;
mod roundtrip_test;
mod saved_filter_test;
mod scenario_test;
mod search_test;
