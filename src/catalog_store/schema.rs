//! SQLite schema definitions for the listen catalog database.
//!
//! Every entity table has an integer rowid primary key and an optional, unique
//! MusicBrainz id. Display names live in the alias tables, where a partial
//! unique index allows at most one primary alias per entity.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, Index, SqlType, Table, VersionedSchema,
    DEFAULT_TIMESTAMP,
};

// =============================================================================
// Core Tables
// =============================================================================

const ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("musicbrainz_id", &SqlType::Text, is_unique = true),
        sqlite_column!("image_url", &SqlType::Text),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

const ALBUMS_TABLE: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("musicbrainz_id", &SqlType::Text, is_unique = true),
        sqlite_column!(
            "various_artists",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("image_url", &SqlType::Text),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

const TRACKS_TABLE: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("musicbrainz_id", &SqlType::Text, is_unique = true),
        sqlite_column!(
            "album_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "albums",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Restrict,
            })
        ),
        sqlite_column!(
            "duration",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ), // seconds, 0 = unknown
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[Index {
        name: "idx_tracks_album",
        columns: &["album_id"],
        unique: false,
        predicate: None,
    }],
    unique_constraints: &[],
};

// =============================================================================
// Alias Tables
// =============================================================================

const ARTIST_ALIASES_TABLE: Table = Table {
    name: "artist_aliases",
    columns: &[
        sqlite_column!(
            "artist_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "artists",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("alias", &SqlType::Text, non_null = true),
        sqlite_column!("source", &SqlType::Text, non_null = true),
        sqlite_column!(
            "is_primary",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[
        Index {
            name: "idx_artist_aliases_alias",
            columns: &["alias"],
            unique: false,
            predicate: None,
        },
        Index {
            name: "idx_artist_aliases_one_primary",
            columns: &["artist_id"],
            unique: true,
            predicate: Some("is_primary = 1"),
        },
    ],
    unique_constraints: &[&["artist_id", "alias"]],
};

const ALBUM_ALIASES_TABLE: Table = Table {
    name: "album_aliases",
    columns: &[
        sqlite_column!(
            "album_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "albums",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("alias", &SqlType::Text, non_null = true),
        sqlite_column!("source", &SqlType::Text, non_null = true),
        sqlite_column!(
            "is_primary",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[
        Index {
            name: "idx_album_aliases_alias",
            columns: &["alias"],
            unique: false,
            predicate: None,
        },
        Index {
            name: "idx_album_aliases_one_primary",
            columns: &["album_id"],
            unique: true,
            predicate: Some("is_primary = 1"),
        },
    ],
    unique_constraints: &[&["album_id", "alias"]],
};

const TRACK_ALIASES_TABLE: Table = Table {
    name: "track_aliases",
    columns: &[
        sqlite_column!(
            "track_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "tracks",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("alias", &SqlType::Text, non_null = true),
        sqlite_column!("source", &SqlType::Text, non_null = true),
        sqlite_column!(
            "is_primary",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[
        Index {
            name: "idx_track_aliases_alias",
            columns: &["alias"],
            unique: false,
            predicate: None,
        },
        Index {
            name: "idx_track_aliases_one_primary",
            columns: &["track_id"],
            unique: true,
            predicate: Some("is_primary = 1"),
        },
    ],
    unique_constraints: &[&["track_id", "alias"]],
};

// =============================================================================
// Junction Tables
// =============================================================================

const ARTIST_TRACKS_TABLE: Table = Table {
    name: "artist_tracks",
    columns: &[
        sqlite_column!(
            "artist_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "artists",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!(
            "track_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "tracks",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!(
            "is_primary",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[
        Index {
            name: "idx_artist_tracks_track",
            columns: &["track_id"],
            unique: false,
            predicate: None,
        },
        Index {
            name: "idx_artist_tracks_one_primary",
            columns: &["track_id"],
            unique: true,
            predicate: Some("is_primary = 1"),
        },
    ],
    unique_constraints: &[&["artist_id", "track_id"]],
};

const ARTIST_ALBUMS_TABLE: Table = Table {
    name: "artist_albums",
    columns: &[
        sqlite_column!(
            "artist_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "artists",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!(
            "album_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "albums",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!(
            "is_primary",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[
        Index {
            name: "idx_artist_albums_album",
            columns: &["album_id"],
            unique: false,
            predicate: None,
        },
        Index {
            name: "idx_artist_albums_one_primary",
            columns: &["album_id"],
            unique: true,
            predicate: Some("is_primary = 1"),
        },
    ],
    unique_constraints: &[&["artist_id", "album_id"]],
};

// =============================================================================
// Listening History
// =============================================================================

const LISTENS_TABLE: Table = Table {
    name: "listens",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!(
            "track_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "tracks",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("listened_at", &SqlType::Integer, non_null = true), // unix seconds
        sqlite_column!("client", &SqlType::Text),
    ],
    indices: &[
        Index {
            name: "idx_listens_listened_at",
            columns: &["listened_at"],
            unique: false,
            predicate: None,
        },
        Index {
            name: "idx_listens_track",
            columns: &["track_id"],
            unique: false,
            predicate: None,
        },
    ],
    unique_constraints: &[&["user_id", "track_id", "listened_at"]],
};

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        ARTISTS_TABLE,
        ALBUMS_TABLE,
        TRACKS_TABLE,
        ARTIST_ALIASES_TABLE,
        ALBUM_ALIASES_TABLE,
        TRACK_ALIASES_TABLE,
        ARTIST_TRACKS_TABLE,
        ARTIST_ALBUMS_TABLE,
        LISTENS_TABLE,
    ],
    migration: None,
}];
