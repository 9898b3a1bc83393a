//! SQLite-backed catalog store.
//!
//! Writes go through a single connection guarded by a mutex, reads are spread
//! over a small pool of read-only connections (WAL mode).

use super::models::*;
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use super::trait_def::{CatalogStore, DuplicateEntity};
use crate::sqlite_persistence::BASE_DB_VERSION;
use crate::timeframe::TimeRange;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, types::Type, Connection, OptionalExtension, ToSql};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

const ARTIST_SELECT: &str = "SELECT a.id,
        (SELECT x.alias FROM artist_aliases x WHERE x.artist_id = a.id AND x.is_primary = 1),
        a.musicbrainz_id, a.image_url
    FROM artists a";

const ALBUM_SELECT: &str = "SELECT al.id,
        (SELECT x.alias FROM album_aliases x WHERE x.album_id = al.id AND x.is_primary = 1),
        al.musicbrainz_id, al.various_artists, al.image_url
    FROM albums al";

const TRACK_SELECT: &str = "SELECT t.id,
        (SELECT x.alias FROM track_aliases x WHERE x.track_id = t.id AND x.is_primary = 1),
        t.album_id, t.musicbrainz_id, t.duration
    FROM tracks t";

#[derive(Clone)]
pub struct SqliteCatalogStore {
    read_pool: Vec<Arc<Mutex<Connection>>>,
    write_conn: Arc<Mutex<Connection>>,
    read_index: Arc<AtomicUsize>,
}

fn migrate_if_needed(conn: &mut Connection) -> Result<()> {
    let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    let latest_version = CATALOG_VERSIONED_SCHEMAS.len() - 1;
    let latest_schema = &CATALOG_VERSIONED_SCHEMAS[latest_version];

    let table_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |r| r.get(0),
    )?;

    if table_count == 0 {
        info!("Creating listen catalog db schema at version {}", latest_version);
        latest_schema.create(conn)?;
        return Ok(());
    }

    if db_version < BASE_DB_VERSION as i64 {
        bail!(
            "Database has user_version {} and is not a listen catalog database",
            db_version
        );
    }
    let mut current_version = (db_version - BASE_DB_VERSION as i64) as usize;

    if current_version < latest_version {
        let tx = conn.transaction()?;
        for schema in CATALOG_VERSIONED_SCHEMAS.iter().skip(current_version + 1) {
            if let Some(migration_fn) = schema.migration {
                info!(
                    "Migrating listen catalog db from version {} to {}",
                    current_version, schema.version
                );
                migration_fn(&tx)?;
            }
            current_version = schema.version;
        }
        tx.pragma_update(None, "user_version", BASE_DB_VERSION + current_version)?;
        tx.commit()?;
    }

    latest_schema.validate(conn)
}

/// Deduplicate ids keeping the first occurrence, so the first artist stays primary.
fn unique_ids(ids: &[i64]) -> Vec<i64> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(id) {
            seen.push(*id);
        }
    }
    seen
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn map_write_error(err: rusqlite::Error, kind: EntityKind) -> anyhow::Error {
    let is_unique_violation = matches!(
        &err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    );
    if is_unique_violation {
        DuplicateEntity {
            kind,
            detail: err.to_string(),
        }
        .into()
    } else {
        err.into()
    }
}

fn parse_mbid(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Uuid::parse_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn from_timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).with_context(|| format!("Timestamp {} out of range", secs))
}

/// Extra condition restricting a query over `listens l JOIN tracks t` to a scope.
fn scope_condition(scope: Scope) -> (&'static str, Option<i64>) {
    match scope {
        Scope::All => ("", None),
        Scope::Artist(id) => (
            " AND l.track_id IN (SELECT track_id FROM artist_tracks WHERE artist_id = ?)",
            Some(id),
        ),
        Scope::Album(id) => (" AND t.album_id = ?", Some(id)),
        Scope::Track(id) => (" AND l.track_id = ?", Some(id)),
    }
}

fn range_params(range: &TimeRange, scope_param: Option<i64>) -> Vec<i64> {
    let mut values = vec![range.start.timestamp(), range.end.timestamp()];
    values.extend(scope_param);
    values
}

impl SqliteCatalogStore {
    /// Open (creating if needed) the catalog database at `db_path`.
    ///
    /// `read_pool_size` connections are opened for concurrent reads.
    pub fn new<P: AsRef<Path>>(db_path: P, read_pool_size: usize) -> Result<Self> {
        let db_path_ref = db_path.as_ref();

        let mut write_conn = Connection::open_with_flags(
            db_path_ref,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open listen catalog database")?;

        write_conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate_if_needed(&mut write_conn)?;
        write_conn.pragma_update(None, "journal_mode", "WAL")?;

        let track_count: i64 = write_conn.query_row("SELECT COUNT(*) FROM tracks", [], |r| r.get(0))?;
        let listen_count: i64 =
            write_conn.query_row("SELECT COUNT(*) FROM listens", [], |r| r.get(0))?;
        info!(
            "Opened listen catalog: {} tracks, {} listens",
            track_count, listen_count
        );

        let mut read_pool = Vec::with_capacity(read_pool_size.max(1));
        for _ in 0..read_pool_size.max(1) {
            let read_conn = Connection::open_with_flags(
                db_path_ref,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            read_pool.push(Arc::new(Mutex::new(read_conn)));
        }

        Ok(SqliteCatalogStore {
            write_conn: Arc::new(Mutex::new(write_conn)),
            read_pool,
            read_index: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn get_read_conn(&self) -> Arc<Mutex<Connection>> {
        let index = self.read_index.fetch_add(1, Ordering::SeqCst) % self.read_pool.len();
        self.read_pool[index].clone()
    }

    // =========================================================================
    // Row Parsing
    // =========================================================================

    fn parse_artist_row(row: &rusqlite::Row) -> rusqlite::Result<Artist> {
        Ok(Artist {
            id: row.get(0)?,
            name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            musicbrainz_id: parse_mbid(row, 2)?,
            image_url: row.get(3)?,
        })
    }

    fn parse_album_row(row: &rusqlite::Row) -> rusqlite::Result<Album> {
        Ok(Album {
            id: row.get(0)?,
            title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            musicbrainz_id: parse_mbid(row, 2)?,
            various_artists: row.get::<_, i32>(3)? != 0,
            image_url: row.get(4)?,
        })
    }

    fn parse_track_row(row: &rusqlite::Row) -> rusqlite::Result<Track> {
        Ok(Track {
            id: row.get(0)?,
            title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            album_id: row.get(2)?,
            musicbrainz_id: parse_mbid(row, 3)?,
            duration: row.get(4)?,
        })
    }

    // =========================================================================
    // Internal Helper Methods
    // =========================================================================

    fn query_artist(conn: &Connection, clause: &str, params: &[&dyn ToSql]) -> Result<Option<Artist>> {
        let mut stmt = conn.prepare(&format!("{} {}", ARTIST_SELECT, clause))?;
        Ok(stmt.query_row(params, Self::parse_artist_row).optional()?)
    }

    fn query_album(conn: &Connection, clause: &str, params: &[&dyn ToSql]) -> Result<Option<Album>> {
        let mut stmt = conn.prepare(&format!("{} {}", ALBUM_SELECT, clause))?;
        Ok(stmt.query_row(params, Self::parse_album_row).optional()?)
    }

    fn query_track(conn: &Connection, clause: &str, params: &[&dyn ToSql]) -> Result<Option<Track>> {
        let mut stmt = conn.prepare(&format!("{} {}", TRACK_SELECT, clause))?;
        Ok(stmt.query_row(params, Self::parse_track_row).optional()?)
    }

    fn insert_primary_alias(
        conn: &Connection,
        kind: EntityKind,
        id: i64,
        alias: &str,
    ) -> Result<()> {
        conn.execute(
            &format!(
                "INSERT INTO {} ({}, alias, source, is_primary) VALUES (?1, ?2, ?3, 1)",
                kind.alias_table(),
                kind.owner_column()
            ),
            params![id, alias, CANONICAL_ALIAS_SOURCE],
        )
        .map_err(|e| map_write_error(e, kind))?;
        Ok(())
    }

    fn count_with_range(&self, sql: &str, values: Vec<i64>) -> Result<i64> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(sql)?;
        Ok(stmt.query_row(params_from_iter(values), |r| r.get(0))?)
    }

    /// Rank the `(id, listen_count)` rows produced by `counts_sql` and return
    /// one page of `(id, listen_count, rank)` plus the total number of rows.
    fn ranked_ids(
        conn: &Connection,
        counts_sql: &str,
        values: Vec<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<(i64, i64, i64)>, i64)> {
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM ({})", counts_sql),
            params_from_iter(values.iter()),
            |r| r.get(0),
        )?;

        let page_sql = format!(
            "WITH counts AS ({}),
             ranked AS (
                SELECT id, listen_count,
                       DENSE_RANK() OVER (ORDER BY listen_count DESC) AS position
                FROM counts
             )
             SELECT id, listen_count, position FROM ranked
             ORDER BY listen_count DESC, id ASC
             LIMIT ? OFFSET ?",
            counts_sql
        );
        let mut page_values = values;
        page_values.push(limit);
        page_values.push(offset);

        let mut stmt = conn.prepare(&page_sql)?;
        let rows = stmt
            .query_map(params_from_iter(page_values), |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })?
            .collect::<Result<Vec<(i64, i64, i64)>, _>>()?;
        Ok((rows, total))
    }

    fn ranked_page<T>(
        &self,
        counts_sql: &str,
        query: &TopQuery,
        load: fn(&Connection, i64) -> Result<Option<T>>,
    ) -> Result<RankedPage<T>> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        let (_, scope_param) = scope_condition(query.scope);
        let (rows, total_count) = Self::ranked_ids(
            &conn,
            counts_sql,
            range_params(&query.range, scope_param),
            query.limit,
            query.offset,
        )?;

        let mut items = Vec::with_capacity(rows.len());
        for (id, listen_count, rank) in rows {
            if let Some(item) = load(&conn, id)? {
                items.push(Ranked {
                    item,
                    listen_count,
                    rank,
                });
            }
        }
        Ok(RankedPage { items, total_count })
    }

    fn load_artist(conn: &Connection, id: i64) -> Result<Option<Artist>> {
        Self::query_artist(conn, "WHERE a.id = ?1", params![id])
    }

    fn load_album(conn: &Connection, id: i64) -> Result<Option<Album>> {
        Self::query_album(conn, "WHERE al.id = ?1", params![id])
    }

    fn load_track(conn: &Connection, id: i64) -> Result<Option<Track>> {
        Self::query_track(conn, "WHERE t.id = ?1", params![id])
    }
}

impl CatalogStore for SqliteCatalogStore {
    // =========================================================================
    // Artists
    // =========================================================================

    fn get_artist(&self, id: i64) -> Result<Option<Artist>> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        Self::load_artist(&conn, id)
    }

    fn get_artist_by_musicbrainz_id(&self, mbid: &Uuid) -> Result<Option<Artist>> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        Self::query_artist(&conn, "WHERE a.musicbrainz_id = ?1", params![mbid.to_string()])
    }

    fn get_artist_by_name(&self, name: &str) -> Result<Option<Artist>> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        Self::query_artist(
            &conn,
            "WHERE a.id IN (SELECT artist_id FROM artist_aliases WHERE alias = ?1)
             ORDER BY a.id LIMIT 1",
            params![name],
        )
    }

    fn create_artist(&self, artist: &NewArtist) -> Result<Artist> {
        let mut conn = self.write_conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO artists (musicbrainz_id, image_url) VALUES (?1, ?2)",
            params![
                artist.musicbrainz_id.map(|u| u.to_string()),
                artist.image_url
            ],
        )
        .map_err(|e| map_write_error(e, EntityKind::Artist))?;
        let id = tx.last_insert_rowid();
        Self::insert_primary_alias(&tx, EntityKind::Artist, id, &artist.name)?;
        let created = Self::load_artist(&tx, id)?.context("Created artist not readable")?;
        tx.commit()?;
        debug!("Created artist {} '{}'", id, artist.name);
        Ok(created)
    }

    fn set_artist_image(&self, id: i64, image_url: &str) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        conn.execute(
            "UPDATE artists SET image_url = ?1 WHERE id = ?2",
            params![image_url, id],
        )?;
        Ok(())
    }

    // =========================================================================
    // Albums
    // =========================================================================

    fn get_album(&self, id: i64) -> Result<Option<Album>> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        Self::load_album(&conn, id)
    }

    fn get_album_by_musicbrainz_id(&self, mbid: &Uuid) -> Result<Option<Album>> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        Self::query_album(&conn, "WHERE al.musicbrainz_id = ?1", params![mbid.to_string()])
    }

    fn get_album_by_title(&self, title: &str, artist_ids: &[i64]) -> Result<Option<Album>> {
        let artist_ids = unique_ids(artist_ids);
        let mut clause =
            String::from("WHERE al.id IN (SELECT album_id FROM album_aliases WHERE alias = ?)");
        if !artist_ids.is_empty() {
            clause.push_str(&format!(
                " AND (SELECT COUNT(*) FROM artist_albums x
                       WHERE x.album_id = al.id AND x.artist_id IN ({})) = {}",
                placeholders(artist_ids.len()),
                artist_ids.len()
            ));
        }
        clause.push_str(" ORDER BY al.id LIMIT 1");

        let mut values: Vec<&dyn ToSql> = vec![&title];
        for id in &artist_ids {
            values.push(id);
        }

        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        Self::query_album(&conn, &clause, &values)
    }

    fn create_album(&self, album: &NewAlbum) -> Result<Album> {
        let mut conn = self.write_conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO albums (musicbrainz_id, various_artists, image_url) VALUES (?1, ?2, ?3)",
            params![
                album.musicbrainz_id.map(|u| u.to_string()),
                album.various_artists as i32,
                album.image_url
            ],
        )
        .map_err(|e| map_write_error(e, EntityKind::Album))?;
        let id = tx.last_insert_rowid();
        Self::insert_primary_alias(&tx, EntityKind::Album, id, &album.title)?;
        for (index, artist_id) in unique_ids(&album.artist_ids).iter().enumerate() {
            tx.execute(
                "INSERT INTO artist_albums (artist_id, album_id, is_primary) VALUES (?1, ?2, ?3)",
                params![artist_id, id, (index == 0) as i32],
            )?;
        }
        let created = Self::load_album(&tx, id)?.context("Created album not readable")?;
        tx.commit()?;
        debug!("Created album {} '{}'", id, album.title);
        Ok(created)
    }

    fn set_album_image(&self, id: i64, image_url: &str) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        conn.execute(
            "UPDATE albums SET image_url = ?1 WHERE id = ?2",
            params![image_url, id],
        )?;
        Ok(())
    }

    // =========================================================================
    // Tracks
    // =========================================================================

    fn get_track(&self, id: i64) -> Result<Option<Track>> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        Self::load_track(&conn, id)
    }

    fn get_track_by_musicbrainz_id(&self, mbid: &Uuid) -> Result<Option<Track>> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        Self::query_track(&conn, "WHERE t.musicbrainz_id = ?1", params![mbid.to_string()])
    }

    fn get_track_by_title(
        &self,
        title: &str,
        album_id: i64,
        artist_ids: &[i64],
    ) -> Result<Option<Track>> {
        let artist_ids = unique_ids(artist_ids);
        let mut clause = String::from(
            "WHERE t.album_id = ?
             AND t.id IN (SELECT track_id FROM track_aliases WHERE alias = ?)",
        );
        if !artist_ids.is_empty() {
            clause.push_str(&format!(
                " AND (SELECT COUNT(*) FROM artist_tracks x
                       WHERE x.track_id = t.id AND x.artist_id IN ({})) = {}",
                placeholders(artist_ids.len()),
                artist_ids.len()
            ));
        }
        clause.push_str(" ORDER BY t.id LIMIT 1");

        let mut values: Vec<&dyn ToSql> = vec![&album_id, &title];
        for id in &artist_ids {
            values.push(id);
        }

        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        Self::query_track(&conn, &clause, &values)
    }

    fn create_track(&self, track: &NewTrack) -> Result<Track> {
        let mut conn = self.write_conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO tracks (musicbrainz_id, album_id, duration) VALUES (?1, ?2, ?3)",
            params![
                track.musicbrainz_id.map(|u| u.to_string()),
                track.album_id,
                track.duration
            ],
        )
        .map_err(|e| map_write_error(e, EntityKind::Track))?;
        let id = tx.last_insert_rowid();
        Self::insert_primary_alias(&tx, EntityKind::Track, id, &track.title)?;
        for (index, artist_id) in unique_ids(&track.artist_ids).iter().enumerate() {
            tx.execute(
                "INSERT INTO artist_tracks (artist_id, track_id, is_primary) VALUES (?1, ?2, ?3)",
                params![artist_id, id, (index == 0) as i32],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO artist_albums (artist_id, album_id, is_primary)
                 VALUES (?1, ?2, 0)",
                params![artist_id, track.album_id],
            )?;
        }
        let created = Self::load_track(&tx, id)?.context("Created track not readable")?;
        tx.commit()?;
        debug!("Created track {} '{}'", id, track.title);
        Ok(created)
    }

    fn update_track_duration(&self, id: i64, duration: i64) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        conn.execute(
            "UPDATE tracks SET duration = ?1 WHERE id = ?2",
            params![duration, id],
        )?;
        Ok(())
    }

    fn get_tracks_missing_duration(&self, after_id: i64, limit: usize) -> Result<Vec<Track>> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "{} WHERE t.id > ?1 AND t.duration = 0 AND t.musicbrainz_id IS NOT NULL
             ORDER BY t.id ASC LIMIT ?2",
            TRACK_SELECT
        ))?;
        let tracks = stmt
            .query_map(params![after_id, limit as i64], Self::parse_track_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    fn delete_track(&self, id: i64) -> Result<()> {
        let mut conn = self.write_conn.lock().unwrap();
        let tx = conn.transaction()?;
        let album_id: Option<i64> = tx
            .query_row("SELECT album_id FROM tracks WHERE id = ?1", params![id], |r| {
                r.get(0)
            })
            .optional()?;
        let Some(album_id) = album_id else {
            return Ok(());
        };

        tx.execute("DELETE FROM listens WHERE track_id = ?1", params![id])?;
        tx.execute("DELETE FROM track_aliases WHERE track_id = ?1", params![id])?;
        tx.execute("DELETE FROM artist_tracks WHERE track_id = ?1", params![id])?;
        tx.execute("DELETE FROM tracks WHERE id = ?1", params![id])?;

        let detached = tx.execute(
            "DELETE FROM artist_albums
             WHERE album_id = ?1 AND is_primary = 0
             AND artist_id NOT IN (
                SELECT x.artist_id FROM artist_tracks x
                JOIN tracks t ON t.id = x.track_id
                WHERE t.album_id = ?1
             )",
            params![album_id],
        )?;
        tx.commit()?;
        debug!(
            "Deleted track {}, detached {} artists from album {}",
            id, detached, album_id
        );
        Ok(())
    }

    // =========================================================================
    // Identifiers
    // =========================================================================

    fn set_musicbrainz_id_if_missing(
        &self,
        kind: EntityKind,
        id: i64,
        mbid: &Uuid,
    ) -> Result<bool> {
        let conn = self.write_conn.lock().unwrap();
        let changed = conn
            .execute(
                &format!(
                    "UPDATE {} SET musicbrainz_id = ?1 WHERE id = ?2 AND musicbrainz_id IS NULL",
                    kind.table()
                ),
                params![mbid.to_string(), id],
            )
            .map_err(|e| map_write_error(e, kind))?;
        Ok(changed > 0)
    }

    fn set_musicbrainz_id(&self, kind: EntityKind, id: i64, mbid: Option<&Uuid>) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        conn.execute(
            &format!("UPDATE {} SET musicbrainz_id = ?1 WHERE id = ?2", kind.table()),
            params![mbid.map(|u| u.to_string()), id],
        )
        .map_err(|e| map_write_error(e, kind))?;
        Ok(())
    }

    // =========================================================================
    // Aliases
    // =========================================================================

    fn get_aliases(&self, kind: EntityKind, id: i64) -> Result<Vec<Alias>> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT alias, source, is_primary FROM {} WHERE {} = ?1
             ORDER BY is_primary DESC, alias ASC",
            kind.alias_table(),
            kind.owner_column()
        ))?;
        let aliases = stmt
            .query_map(params![id], |r| {
                Ok(Alias {
                    text: r.get(0)?,
                    source: r.get(1)?,
                    is_primary: r.get::<_, i32>(2)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(aliases)
    }

    fn add_aliases(
        &self,
        kind: EntityKind,
        id: i64,
        aliases: &[String],
        source: &str,
    ) -> Result<()> {
        let mut conn = self.write_conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR IGNORE INTO {} ({}, alias, source, is_primary) VALUES (?1, ?2, ?3, 0)",
                kind.alias_table(),
                kind.owner_column()
            ))?;
            for alias in aliases {
                stmt.execute(params![id, alias, source])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn set_primary_alias(&self, kind: EntityKind, id: i64, alias: &str) -> Result<bool> {
        let mut conn = self.write_conn.lock().unwrap();
        let tx = conn.transaction()?;
        let exists = tx
            .query_row(
                &format!(
                    "SELECT 1 FROM {} WHERE {} = ?1 AND alias = ?2",
                    kind.alias_table(),
                    kind.owner_column()
                ),
                params![id, alias],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Ok(false);
        }

        // Clear first: the partial unique index allows a single primary row.
        tx.execute(
            &format!(
                "UPDATE {} SET is_primary = 0 WHERE {} = ?1 AND is_primary = 1",
                kind.alias_table(),
                kind.owner_column()
            ),
            params![id],
        )?;
        tx.execute(
            &format!(
                "UPDATE {} SET is_primary = 1 WHERE {} = ?1 AND alias = ?2",
                kind.alias_table(),
                kind.owner_column()
            ),
            params![id, alias],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn delete_alias(&self, kind: EntityKind, id: i64, alias: &str) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1 AND alias = ?2 AND is_primary = 0",
                kind.alias_table(),
                kind.owner_column()
            ),
            params![id, alias],
        )?;
        Ok(())
    }

    // =========================================================================
    // Associations
    // =========================================================================

    fn get_track_artists(&self, track_id: i64) -> Result<Vec<ArtistAssociation>> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT artist_id, is_primary FROM artist_tracks WHERE track_id = ?1
             ORDER BY is_primary DESC, artist_id ASC",
        )?;
        let artists = stmt
            .query_map(params![track_id], |r| {
                Ok(ArtistAssociation {
                    artist_id: r.get(0)?,
                    is_primary: r.get::<_, i32>(1)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(artists)
    }

    fn get_album_artists(&self, album_id: i64) -> Result<Vec<ArtistAssociation>> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT artist_id, is_primary FROM artist_albums WHERE album_id = ?1
             ORDER BY is_primary DESC, artist_id ASC",
        )?;
        let artists = stmt
            .query_map(params![album_id], |r| {
                Ok(ArtistAssociation {
                    artist_id: r.get(0)?,
                    is_primary: r.get::<_, i32>(1)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(artists)
    }

    fn add_artist_to_track(&self, track_id: i64, artist_id: i64) -> Result<()> {
        let mut conn = self.write_conn.lock().unwrap();
        let tx = conn.transaction()?;
        let album_id: i64 = tx
            .query_row(
                "SELECT album_id FROM tracks WHERE id = ?1",
                params![track_id],
                |r| r.get(0),
            )
            .optional()?
            .with_context(|| format!("Track {} does not exist", track_id))?;
        tx.execute(
            "INSERT OR IGNORE INTO artist_tracks (artist_id, track_id, is_primary) VALUES (?1, ?2, 0)",
            params![artist_id, track_id],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO artist_albums (artist_id, album_id, is_primary) VALUES (?1, ?2, 0)",
            params![artist_id, album_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn remove_artist_from_track(&self, track_id: i64, artist_id: i64) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        conn.execute(
            "DELETE FROM artist_tracks WHERE track_id = ?1 AND artist_id = ?2 AND is_primary = 0",
            params![track_id, artist_id],
        )?;
        Ok(())
    }

    fn add_artist_to_album(&self, album_id: i64, artist_id: i64) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO artist_albums (artist_id, album_id, is_primary) VALUES (?1, ?2, 0)",
            params![artist_id, album_id],
        )?;
        Ok(())
    }

    fn remove_artist_from_album(&self, album_id: i64, artist_id: i64) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        conn.execute(
            "DELETE FROM artist_albums WHERE album_id = ?1 AND artist_id = ?2 AND is_primary = 0",
            params![album_id, artist_id],
        )?;
        Ok(())
    }

    // =========================================================================
    // Listens
    // =========================================================================

    fn save_listen(&self, listen: &NewListen) -> Result<bool> {
        let conn = self.write_conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO listens (user_id, track_id, listened_at, client)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                listen.user_id,
                listen.track_id,
                listen.listened_at.timestamp(),
                listen.client
            ],
        )?;
        Ok(inserted > 0)
    }

    // =========================================================================
    // Aggregations
    // =========================================================================

    fn count_listens(&self, range: &TimeRange, scope: Scope) -> Result<i64> {
        let (condition, scope_param) = scope_condition(scope);
        self.count_with_range(
            &format!(
                "SELECT COUNT(*) FROM listens l JOIN tracks t ON t.id = l.track_id
                 WHERE l.listened_at >= ? AND l.listened_at < ?{}",
                condition
            ),
            range_params(range, scope_param),
        )
    }

    fn count_listened(&self, kind: EntityKind, range: &TimeRange) -> Result<i64> {
        let sql = match kind {
            EntityKind::Track => {
                "SELECT COUNT(DISTINCT l.track_id) FROM listens l
                 WHERE l.listened_at >= ? AND l.listened_at < ?"
            }
            EntityKind::Album => {
                "SELECT COUNT(DISTINCT t.album_id) FROM listens l
                 JOIN tracks t ON t.id = l.track_id
                 WHERE l.listened_at >= ? AND l.listened_at < ?"
            }
            EntityKind::Artist => {
                "SELECT COUNT(DISTINCT x.artist_id) FROM listens l
                 JOIN artist_tracks x ON x.track_id = l.track_id
                 WHERE l.listened_at >= ? AND l.listened_at < ?"
            }
        };
        self.count_with_range(sql, range_params(range, None))
    }

    fn count_new(&self, kind: EntityKind, range: &TimeRange) -> Result<i64> {
        let first_listens = match kind {
            EntityKind::Track => {
                "SELECT l.track_id AS id, MIN(l.listened_at) AS first_listen
                 FROM listens l GROUP BY l.track_id"
            }
            EntityKind::Album => {
                "SELECT t.album_id AS id, MIN(l.listened_at) AS first_listen
                 FROM listens l JOIN tracks t ON t.id = l.track_id GROUP BY t.album_id"
            }
            EntityKind::Artist => {
                "SELECT x.artist_id AS id, MIN(l.listened_at) AS first_listen
                 FROM listens l JOIN artist_tracks x ON x.track_id = l.track_id
                 GROUP BY x.artist_id"
            }
        };
        self.count_with_range(
            &format!(
                "SELECT COUNT(*) FROM ({}) WHERE first_listen >= ? AND first_listen < ?",
                first_listens
            ),
            range_params(range, None),
        )
    }

    fn count_time_listened(&self, range: &TimeRange, scope: Scope) -> Result<i64> {
        let (condition, scope_param) = scope_condition(scope);
        self.count_with_range(
            &format!(
                "SELECT COALESCE(SUM(t.duration), 0) FROM listens l
                 JOIN tracks t ON t.id = l.track_id
                 WHERE l.listened_at >= ? AND l.listened_at < ?{}",
                condition
            ),
            range_params(range, scope_param),
        )
    }

    fn get_top_artists(&self, query: &TopQuery) -> Result<RankedPage<Artist>> {
        let (condition, _) = scope_condition(query.scope);
        let counts_sql = format!(
            "SELECT x.artist_id AS id, COUNT(*) AS listen_count
             FROM listens l
             JOIN tracks t ON t.id = l.track_id
             JOIN artist_tracks x ON x.track_id = l.track_id
             WHERE l.listened_at >= ? AND l.listened_at < ?{}
             GROUP BY x.artist_id",
            condition
        );
        self.ranked_page(&counts_sql, query, Self::load_artist)
    }

    fn get_top_albums(&self, query: &TopQuery) -> Result<RankedPage<Album>> {
        let (condition, _) = scope_condition(query.scope);
        let counts_sql = format!(
            "SELECT t.album_id AS id, COUNT(*) AS listen_count
             FROM listens l
             JOIN tracks t ON t.id = l.track_id
             WHERE l.listened_at >= ? AND l.listened_at < ?{}
             GROUP BY t.album_id",
            condition
        );
        self.ranked_page(&counts_sql, query, Self::load_album)
    }

    fn get_top_tracks(&self, query: &TopQuery) -> Result<RankedPage<Track>> {
        let (condition, _) = scope_condition(query.scope);
        let counts_sql = format!(
            "SELECT l.track_id AS id, COUNT(*) AS listen_count
             FROM listens l
             JOIN tracks t ON t.id = l.track_id
             WHERE l.listened_at >= ? AND l.listened_at < ?{}
             GROUP BY l.track_id",
            condition
        );
        self.ranked_page(&counts_sql, query, Self::load_track)
    }

    fn get_interest(&self, scope: Scope, buckets: usize) -> Result<Vec<InterestBucket>> {
        if buckets == 0 || buckets > MAX_INTEREST_BUCKETS {
            bail!(
                "Interest bucket count must be between 1 and {}, got {}",
                MAX_INTEREST_BUCKETS,
                buckets
            );
        }
        if buckets == 0 {
            bail!("Interest requires at least one bucket");
        }
        let (condition, scope_param) = scope_condition(scope);
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();

        let (first, last): (Option<i64>, Option<i64>) = conn.query_row(
            &format!(
                "SELECT MIN(l.listened_at), MAX(l.listened_at) FROM listens l
                 JOIN tracks t ON t.id = l.track_id WHERE 1 = 1{}",
                condition
            ),
            params_from_iter(scope_param.iter()),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        let (Some(first), Some(last)) = (first, last) else {
            return Ok(Vec::new());
        };

        let span = last - first + 1;
        let count = buckets as i64;
        // Ceiling division, without overflowing on wide spans
        let width = (span / count + i64::from(span % count != 0)).max(1);

        let mut values = vec![first, width];
        values.extend(scope_param);
        let mut stmt = conn.prepare(&format!(
            "SELECT (l.listened_at - ?) / ? AS bucket, COUNT(*) FROM listens l
             JOIN tracks t ON t.id = l.track_id WHERE 1 = 1{}
             GROUP BY bucket",
            condition
        ))?;
        let counts = stmt
            .query_map(params_from_iter(values), |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut result = Vec::with_capacity(buckets);
        for index in 0..count {
            let start = first + index * width;
            result.push(InterestBucket {
                start: from_timestamp(start)?,
                end: from_timestamp(start + width)?,
                listen_count: 0,
            });
        }
        for (bucket, count) in counts {
            if let Some(entry) = result.get_mut(bucket as usize) {
                entry.listen_count += count;
            }
        }
        Ok(result)
    }

    fn get_listen_activity(&self, ranges: &[TimeRange], scope: Scope) -> Result<Vec<i64>> {
        let (condition, scope_param) = scope_condition(scope);
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT COUNT(*) FROM listens l JOIN tracks t ON t.id = l.track_id
             WHERE l.listened_at >= ? AND l.listened_at < ?{}",
            condition
        ))?;
        let mut counts = Vec::with_capacity(ranges.len());
        for range in ranges {
            let count: i64 =
                stmt.query_row(params_from_iter(range_params(range, scope_param)), |r| {
                    r.get(0)
                })?;
            counts.push(count);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn create_tmp_store() -> (SqliteCatalogStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteCatalogStore::new(temp_dir.path().join("catalog.db"), 2).unwrap();
        (store, temp_dir)
    }

    fn artist(store: &SqliteCatalogStore, name: &str) -> Artist {
        store
            .create_artist(&NewArtist {
                name: name.to_string(),
                ..Default::default()
            })
            .unwrap()
    }

    fn album(store: &SqliteCatalogStore, title: &str, artist_ids: &[i64]) -> Album {
        store
            .create_album(&NewAlbum {
                title: title.to_string(),
                artist_ids: artist_ids.to_vec(),
                ..Default::default()
            })
            .unwrap()
    }

    fn track(store: &SqliteCatalogStore, title: &str, album_id: i64, artist_ids: &[i64]) -> Track {
        store
            .create_track(&NewTrack {
                title: title.to_string(),
                album_id,
                artist_ids: artist_ids.to_vec(),
                duration: 200,
                ..Default::default()
            })
            .unwrap()
    }

    fn listen(store: &SqliteCatalogStore, track_id: i64, secs: i64) {
        store
            .save_listen(&NewListen {
                user_id: 1,
                track_id,
                listened_at: Utc.timestamp_opt(secs, 0).unwrap(),
                client: None,
            })
            .unwrap();
    }

    #[test]
    fn test_reopen_existing_database() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.db");
        {
            let store = SqliteCatalogStore::new(&path, 1).unwrap();
            artist(&store, "Reopened");
        }
        let store = SqliteCatalogStore::new(&path, 1).unwrap();
        assert!(store.get_artist_by_name("Reopened").unwrap().is_some());
    }

    #[test]
    fn test_create_track_sets_primary_alias_and_associations() {
        let (store, _tmp) = create_tmp_store();
        let a1 = artist(&store, "Artist One");
        let a2 = artist(&store, "Artist Two");
        let al = album(&store, "Album", &[a1.id]);
        let t = track(&store, "Song", al.id, &[a2.id, a1.id]);

        assert_eq!(t.title, "Song");
        let aliases = store.get_aliases(EntityKind::Track, t.id).unwrap();
        assert_eq!(aliases.len(), 1);
        assert!(aliases[0].is_primary);
        assert_eq!(aliases[0].source, CANONICAL_ALIAS_SOURCE);

        let artists = store.get_track_artists(t.id).unwrap();
        assert_eq!(artists[0], ArtistAssociation { artist_id: a2.id, is_primary: true });
        assert_eq!(artists[1], ArtistAssociation { artist_id: a1.id, is_primary: false });

        // a2 was added to the album as a secondary artist
        let album_artists = store.get_album_artists(al.id).unwrap();
        assert_eq!(album_artists.len(), 2);
        assert!(album_artists
            .iter()
            .any(|a| a.artist_id == a1.id && a.is_primary));
    }

    #[test]
    fn test_track_title_match_requires_all_artists() {
        let (store, _tmp) = create_tmp_store();
        let a1 = artist(&store, "A1");
        let a2 = artist(&store, "A2");
        let al = album(&store, "Album", &[a1.id]);
        let t = track(&store, "Song", al.id, &[a1.id]);

        let found = store.get_track_by_title("Song", al.id, &[a1.id]).unwrap();
        assert_eq!(found.map(|t| t.id), Some(t.id));
        assert!(store
            .get_track_by_title("Song", al.id, &[a1.id, a2.id])
            .unwrap()
            .is_none());
        assert!(store
            .get_track_by_title("Other", al.id, &[a1.id])
            .unwrap()
            .is_none());

        store
            .add_aliases(EntityKind::Track, t.id, &["Song (Remastered)".to_string()], "import")
            .unwrap();
        let by_alias = store
            .get_track_by_title("Song (Remastered)", al.id, &[a1.id, a1.id])
            .unwrap();
        assert_eq!(by_alias.map(|t| t.id), Some(t.id));
    }

    #[test]
    fn test_duplicate_musicbrainz_id_reports_duplicate_entity() {
        let (store, _tmp) = create_tmp_store();
        let mbid = Uuid::new_v4();
        store
            .create_artist(&NewArtist {
                name: "First".to_string(),
                musicbrainz_id: Some(mbid),
                image_url: None,
            })
            .unwrap();
        let err = store
            .create_artist(&NewArtist {
                name: "Second".to_string(),
                musicbrainz_id: Some(mbid),
                image_url: None,
            })
            .unwrap_err();
        assert!(err.downcast_ref::<DuplicateEntity>().is_some());
        // The failed creation left nothing behind
        assert!(store.get_artist_by_name("Second").unwrap().is_none());
    }

    #[test]
    fn test_set_musicbrainz_id_if_missing_never_overwrites() {
        let (store, _tmp) = create_tmp_store();
        let a = artist(&store, "A");
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        assert!(store
            .set_musicbrainz_id_if_missing(EntityKind::Artist, a.id, &first)
            .unwrap());
        assert!(!store
            .set_musicbrainz_id_if_missing(EntityKind::Artist, a.id, &second)
            .unwrap());
        assert_eq!(
            store.get_artist(a.id).unwrap().unwrap().musicbrainz_id,
            Some(first)
        );
    }

    #[test]
    fn test_alias_primary_flip_and_protected_delete() {
        let (store, _tmp) = create_tmp_store();
        let a = artist(&store, "Name");
        store
            .add_aliases(
                EntityKind::Artist,
                a.id,
                &["Alt".to_string(), "Name".to_string()],
                "import",
            )
            .unwrap();

        assert!(!store
            .set_primary_alias(EntityKind::Artist, a.id, "Missing")
            .unwrap());
        assert!(store
            .set_primary_alias(EntityKind::Artist, a.id, "Alt")
            .unwrap());
        assert_eq!(store.get_artist(a.id).unwrap().unwrap().name, "Alt");

        store.delete_alias(EntityKind::Artist, a.id, "Alt").unwrap();
        let aliases = store.get_aliases(EntityKind::Artist, a.id).unwrap();
        assert_eq!(aliases.len(), 2);
        assert_eq!(aliases.iter().filter(|a| a.is_primary).count(), 1);
    }

    #[test]
    fn test_primary_association_cannot_be_removed() {
        let (store, _tmp) = create_tmp_store();
        let a1 = artist(&store, "A1");
        let a2 = artist(&store, "A2");
        let al = album(&store, "Album", &[a1.id]);
        let t = track(&store, "Song", al.id, &[a1.id]);
        store.add_artist_to_track(t.id, a2.id).unwrap();

        store.remove_artist_from_track(t.id, a1.id).unwrap();
        store.remove_artist_from_album(al.id, a1.id).unwrap();
        assert_eq!(store.get_track_artists(t.id).unwrap().len(), 2);
        assert_eq!(store.get_album_artists(al.id).unwrap().len(), 2);

        store.remove_artist_from_track(t.id, a2.id).unwrap();
        let remaining = store.get_track_artists(t.id).unwrap();
        assert_eq!(remaining, vec![ArtistAssociation { artist_id: a1.id, is_primary: true }]);
    }

    #[test]
    fn test_delete_track_cascades_and_detaches_album_artists() {
        let (store, _tmp) = create_tmp_store();
        let a1 = artist(&store, "A1");
        let a2 = artist(&store, "A2");
        let al = album(&store, "Album", &[a1.id]);
        let kept = track(&store, "Kept", al.id, &[a1.id]);
        let deleted = track(&store, "Featuring", al.id, &[a2.id]);
        listen(&store, deleted.id, 1_700_000_000);

        store.delete_track(deleted.id).unwrap();

        assert!(store.get_track(deleted.id).unwrap().is_none());
        assert!(store.get_track(kept.id).unwrap().is_some());
        assert_eq!(
            store
                .count_listens(&TimeRange::all(), Scope::All)
                .unwrap(),
            0
        );
        let album_artists = store.get_album_artists(al.id).unwrap();
        assert_eq!(album_artists, vec![ArtistAssociation { artist_id: a1.id, is_primary: true }]);

        // Deleting an unknown track is a no-op
        store.delete_track(9999).unwrap();
    }

    #[test]
    fn test_tracks_missing_duration_keyset() {
        let (store, _tmp) = create_tmp_store();
        let a = artist(&store, "A");
        let al = album(&store, "Album", &[a.id]);
        let mut ids = Vec::new();
        for i in 0..5 {
            let t = store
                .create_track(&NewTrack {
                    title: format!("Song {}", i),
                    album_id: al.id,
                    musicbrainz_id: if i == 2 { None } else { Some(Uuid::new_v4()) },
                    duration: 0,
                    artist_ids: vec![a.id],
                })
                .unwrap();
            ids.push(t.id);
        }

        let first_page = store.get_tracks_missing_duration(0, 2).unwrap();
        assert_eq!(
            first_page.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![ids[0], ids[1]]
        );
        let second_page = store.get_tracks_missing_duration(ids[1], 2).unwrap();
        assert_eq!(
            second_page.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![ids[3], ids[4]]
        );
        assert!(store
            .get_tracks_missing_duration(ids[4], 2)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_duplicate_listen_ignored() {
        let (store, _tmp) = create_tmp_store();
        let a = artist(&store, "A");
        let al = album(&store, "Album", &[a.id]);
        let t = track(&store, "Song", al.id, &[a.id]);
        let new_listen = NewListen {
            user_id: 1,
            track_id: t.id,
            listened_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            client: Some("test".to_string()),
        };
        assert!(store.save_listen(&new_listen).unwrap());
        assert!(!store.save_listen(&new_listen).unwrap());
    }

    #[test]
    fn test_counts_and_top_tracks() {
        let (store, _tmp) = create_tmp_store();
        let a1 = artist(&store, "A1");
        let a2 = artist(&store, "A2");
        let al1 = album(&store, "Album 1", &[a1.id]);
        let al2 = album(&store, "Album 2", &[a2.id]);
        let t1 = track(&store, "T1", al1.id, &[a1.id]);
        let t2 = track(&store, "T2", al1.id, &[a1.id]);
        let t3 = track(&store, "T3", al2.id, &[a2.id]);

        let base = 1_700_000_000;
        listen(&store, t1.id, base);
        listen(&store, t1.id, base + 10);
        listen(&store, t1.id, base + 20);
        listen(&store, t2.id, base + 30);
        listen(&store, t3.id, base + 40);
        listen(&store, t3.id, base + 50);
        listen(&store, t3.id, base + 60);

        let all = TimeRange::all();
        assert_eq!(store.count_listens(&all, Scope::All).unwrap(), 7);
        assert_eq!(store.count_listens(&all, Scope::Artist(a1.id)).unwrap(), 4);
        assert_eq!(store.count_listens(&all, Scope::Album(al2.id)).unwrap(), 3);
        assert_eq!(store.count_listens(&all, Scope::Track(t2.id)).unwrap(), 1);
        assert_eq!(store.count_listened(EntityKind::Track, &all).unwrap(), 3);
        assert_eq!(store.count_listened(EntityKind::Album, &all).unwrap(), 2);
        assert_eq!(store.count_listened(EntityKind::Artist, &all).unwrap(), 2);
        assert_eq!(
            store.count_time_listened(&all, Scope::Artist(a1.id)).unwrap(),
            800
        );

        let window = TimeRange {
            start: Utc.timestamp_opt(base + 25, 0).unwrap(),
            end: Utc.timestamp_opt(base + 45, 0).unwrap(),
        };
        assert_eq!(store.count_listens(&window, Scope::All).unwrap(), 2);
        assert_eq!(store.count_new(EntityKind::Track, &window).unwrap(), 2);
        assert_eq!(store.count_new(EntityKind::Artist, &window).unwrap(), 1);

        let page = store
            .get_top_tracks(&TopQuery {
                range: all,
                scope: Scope::All,
                limit: 2,
                offset: 0,
            })
            .unwrap();
        assert_eq!(page.total_count, 3);
        assert_eq!(page.items.len(), 2);
        // t1 and t3 tie at 3 listens and share the dense rank 1
        assert_eq!(page.items[0].item.id, t1.id);
        assert_eq!(page.items[0].rank, 1);
        assert_eq!(page.items[1].item.id, t3.id);
        assert_eq!(page.items[1].rank, 1);

        let second = store
            .get_top_tracks(&TopQuery {
                range: TimeRange::all(),
                scope: Scope::All,
                limit: 2,
                offset: 2,
            })
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].item.id, t2.id);
        assert_eq!(second.items[0].rank, 2);

        let artists = store
            .get_top_artists(&TopQuery {
                range: TimeRange::all(),
                scope: Scope::All,
                limit: 10,
                offset: 0,
            })
            .unwrap();
        assert_eq!(artists.items[0].item.name, "A1");
        assert_eq!(artists.items[0].listen_count, 4);
    }

    #[test]
    fn test_interest_buckets() {
        let (store, _tmp) = create_tmp_store();
        let a = artist(&store, "A");
        let al = album(&store, "Album", &[a.id]);
        let t = track(&store, "Song", al.id, &[a.id]);

        assert!(store.get_interest(Scope::Track(t.id), 4).unwrap().is_empty());

        let base = 1_700_000_000;
        for offset in [0, 1, 2, 99] {
            listen(&store, t.id, base + offset);
        }
        let buckets = store.get_interest(Scope::Track(t.id), 4).unwrap();
        assert_eq!(buckets.len(), 4);
        assert_eq!(buckets[0].listen_count, 3);
        assert_eq!(buckets[3].listen_count, 1);
        assert_eq!(buckets.iter().map(|b| b.listen_count).sum::<i64>(), 4);
        assert_eq!(buckets[0].start.timestamp(), base);

        assert!(store.get_interest(Scope::Track(t.id), 0).is_err());
        assert!(store
            .get_interest(Scope::Track(t.id), MAX_INTEREST_BUCKETS + 1)
            .is_err());
        assert!(store.get_interest(Scope::Track(t.id), usize::MAX).is_err());
    }
}
