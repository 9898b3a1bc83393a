//! Identifiers and names shared by the end-to-end tests.

#![allow(dead_code)]

pub const RADIOHEAD_MBID: &str = "a74b1b7f-71a5-4011-9441-d0b5e4122711";
pub const KID_A_MBID: &str = "4e304316-386d-3409-af2e-78857eec5cfe";
pub const EVERYTHING_MBID: &str = "b1a9c0e9-d987-4042-ae91-78d6a3267d69";
pub const IDIOTEQUE_MBID: &str = "5a9e1b71-9e7c-4e0c-8d7e-0bb1e4b1f0c3";

pub const EVERYTHING_LENGTH_MS: u64 = 251_000;
pub const IDIOTEQUE_LENGTH_MS: u64 = 309_000;
