//! Catalog entities and the value types exchanged with the store.

use crate::timeframe::TimeRange;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Source tag used for the alias created together with an entity.
pub const CANONICAL_ALIAS_SOURCE: &str = "Canonical";

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Artist,
    Album,
    Track,
}

impl EntityKind {
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Artist => "artists",
            EntityKind::Album => "albums",
            EntityKind::Track => "tracks",
        }
    }

    pub fn alias_table(&self) -> &'static str {
        match self {
            EntityKind::Artist => "artist_aliases",
            EntityKind::Album => "album_aliases",
            EntityKind::Track => "track_aliases",
        }
    }

    /// Column referencing the entity from alias and association tables.
    pub fn owner_column(&self) -> &'static str {
        match self {
            EntityKind::Artist => "artist_id",
            EntityKind::Album => "album_id",
            EntityKind::Track => "track_id",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Artist => write!(f, "artist"),
            EntityKind::Album => write!(f, "album"),
            EntityKind::Track => write!(f, "track"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artist {
    pub id: i64,
    /// Text of the primary alias.
    pub name: String,
    pub musicbrainz_id: Option<Uuid>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Album {
    pub id: i64,
    /// Text of the primary alias.
    pub title: String,
    pub musicbrainz_id: Option<Uuid>,
    pub various_artists: bool,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track {
    pub id: i64,
    /// Text of the primary alias.
    pub title: String,
    pub album_id: i64,
    pub musicbrainz_id: Option<Uuid>,
    /// Seconds, 0 when unknown.
    pub duration: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alias {
    pub text: String,
    pub source: String,
    pub is_primary: bool,
}

/// Artist side of an artist/track or artist/album association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArtistAssociation {
    pub artist_id: i64,
    pub is_primary: bool,
}

// =============================================================================
// Creation requests
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct NewArtist {
    pub name: String,
    pub musicbrainz_id: Option<Uuid>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewAlbum {
    pub title: String,
    pub musicbrainz_id: Option<Uuid>,
    /// The first artist becomes the primary one.
    pub artist_ids: Vec<i64>,
    pub various_artists: bool,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewTrack {
    pub title: String,
    pub album_id: i64,
    pub musicbrainz_id: Option<Uuid>,
    pub duration: i64,
    /// The first artist becomes the primary one.
    pub artist_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct NewListen {
    pub user_id: i64,
    pub track_id: i64,
    pub listened_at: DateTime<Utc>,
    pub client: Option<String>,
}

// =============================================================================
// Aggregations
// =============================================================================

/// Restricts an aggregation to the listens of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    All,
    Artist(i64),
    Album(i64),
    Track(i64),
}

#[derive(Debug, Clone)]
pub struct TopQuery {
    pub range: TimeRange,
    pub scope: Scope,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ranked<T> {
    pub item: T,
    pub listen_count: i64,
    /// Dense rank by listen count, starting at 1.
    pub rank: i64,
}

/// One page of ranked items plus the total number of rankable items.
#[derive(Debug, Clone)]
pub struct RankedPage<T> {
    pub items: Vec<Ranked<T>>,
    pub total_count: i64,
}

/// Upper bound on the bucket count of an interest query.
pub const MAX_INTEREST_BUCKETS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterestBucket {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub listen_count: i64,
}
