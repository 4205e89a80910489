/*! Integration tests for docmap.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - document: Tests for entities and sets (field access, change tracking, ownership)
 * - save: Tests for the save algorithm (inserts, partial updates, delegation)
 * - reference: Tests for lazy reference resolution
 * - registry: Tests for document classes, events and virtual properties
 * - store: Tests for the in-memory store as seen through sessions
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("docmap=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod helpers;
mod save;
mod store;
