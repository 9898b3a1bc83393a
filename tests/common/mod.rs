//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.

mod constants;
mod fixtures;
mod musicbrainz;

pub use constants::*;
pub use fixtures::TestCatalog;
pub use musicbrainz::FakeMusicBrainz;
