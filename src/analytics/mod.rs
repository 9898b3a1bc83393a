//! Read-only aggregations over the listening history.
//!
//! Every query takes a [`Timeframe`] that is normalized in the configured
//! timezone; an empty timeframe covers the whole history.

mod activity;
mod summary;

pub use activity::{ActivityPoint, ListenActivityOpts, Step, DEFAULT_ACTIVITY_RANGE};
pub use summary::{Summary, SummaryItem, SUMMARY_TOP_ITEMS};

use crate::catalog_store::{
    Album, Artist, CatalogStore, EntityKind, InterestBucket, Ranked, RankedPage, Scope, TopQuery,
    Track, MAX_INTEREST_BUCKETS,
};
use crate::error::{storage, CatalogError, CatalogResult};
use crate::timeframe::{normalize_now, TimeRange, Timeframe};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_ITEMS_PER_PAGE: i64 = 100;
pub const MAX_ITEMS_PER_PAGE: i64 = 500;

/// Pagination, scope and timeframe of a top-N query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemsQuery {
    pub limit: i64,
    pub page: i64,
    pub scope: Scope,
    pub timeframe: Timeframe,
}

impl ItemsQuery {
    /// Clamp raw request values: a missing, non-positive or oversized limit
    /// becomes the default, a page below 1 becomes 1.
    pub fn sanitized(
        limit: Option<i64>,
        page: Option<i64>,
        scope: Scope,
        timeframe: Timeframe,
    ) -> Self {
        let limit = match limit {
            Some(limit) if limit > 0 && limit <= MAX_ITEMS_PER_PAGE => limit,
            _ => DEFAULT_ITEMS_PER_PAGE,
        };
        let page = page.filter(|p| *p >= 1).unwrap_or(1);
        ItemsQuery {
            limit,
            page,
            scope,
            timeframe,
        }
    }

    fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for ItemsQuery {
    fn default() -> Self {
        ItemsQuery::sanitized(None, None, Scope::All, Timeframe::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<Ranked<T>>,
    pub total_count: i64,
    pub items_per_page: i64,
    pub current_page: i64,
    pub has_next_page: bool,
}

impl<T> Page<T> {
    fn from_ranked(ranked: RankedPage<T>, query: &ItemsQuery) -> Self {
        let has_next_page = query.offset() + (ranked.items.len() as i64) < ranked.total_count;
        Page {
            items: ranked.items,
            total_count: ranked.total_count,
            items_per_page: query.limit,
            current_page: query.page,
            has_next_page,
        }
    }
}

pub struct Analytics {
    store: Arc<dyn CatalogStore>,
    timezone: Tz,
}

impl Analytics {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Analytics {
            store,
            timezone: Tz::UTC,
        }
    }

    /// Timezone used for calendar boundaries. Defaults to UTC.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Normalize `timeframe`; an empty one covers everything.
    pub fn resolve_range(&self, timeframe: &Timeframe) -> CatalogResult<TimeRange> {
        let range = normalize_now(timeframe, self.timezone)
            .map_err(|e| CatalogError::invalid_input(e.to_string()))?;
        Ok(range.unwrap_or_else(TimeRange::all))
    }

    // =========================================================================
    // Counts
    // =========================================================================

    pub fn count_listens(&self, timeframe: &Timeframe, scope: Scope) -> CatalogResult<i64> {
        let range = self.resolve_range(timeframe)?;
        self.store
            .count_listens(&range, scope)
            .map_err(storage("count_listens"))
    }

    /// Seconds listened, summed over track durations.
    pub fn count_time_listened(&self, timeframe: &Timeframe, scope: Scope) -> CatalogResult<i64> {
        let range = self.resolve_range(timeframe)?;
        self.store
            .count_time_listened(&range, scope)
            .map_err(storage("count_time_listened"))
    }

    pub fn count_tracks(&self, timeframe: &Timeframe) -> CatalogResult<i64> {
        self.count_listened(EntityKind::Track, timeframe)
    }

    pub fn count_albums(&self, timeframe: &Timeframe) -> CatalogResult<i64> {
        self.count_listened(EntityKind::Album, timeframe)
    }

    pub fn count_artists(&self, timeframe: &Timeframe) -> CatalogResult<i64> {
        self.count_listened(EntityKind::Artist, timeframe)
    }

    pub fn count_new_tracks(&self, timeframe: &Timeframe) -> CatalogResult<i64> {
        self.count_new(EntityKind::Track, timeframe)
    }

    pub fn count_new_albums(&self, timeframe: &Timeframe) -> CatalogResult<i64> {
        self.count_new(EntityKind::Album, timeframe)
    }

    pub fn count_new_artists(&self, timeframe: &Timeframe) -> CatalogResult<i64> {
        self.count_new(EntityKind::Artist, timeframe)
    }

    fn count_listened(&self, kind: EntityKind, timeframe: &Timeframe) -> CatalogResult<i64> {
        let range = self.resolve_range(timeframe)?;
        self.store
            .count_listened(kind, &range)
            .map_err(storage("count_listened"))
    }

    fn count_new(&self, kind: EntityKind, timeframe: &Timeframe) -> CatalogResult<i64> {
        let range = self.resolve_range(timeframe)?;
        self.store
            .count_new(kind, &range)
            .map_err(storage("count_new"))
    }

    // =========================================================================
    // Top items
    // =========================================================================

    pub fn top_artists(&self, query: &ItemsQuery) -> CatalogResult<Page<Artist>> {
        if query.scope != Scope::All {
            return Err(CatalogError::invalid_input(
                "top artists cannot be scoped",
            ));
        }
        let top = self.top_query(query)?;
        let ranked = self
            .store
            .get_top_artists(&top)
            .map_err(storage("get_top_artists"))?;
        Ok(Page::from_ranked(ranked, query))
    }

    /// Optionally scoped to an artist.
    pub fn top_albums(&self, query: &ItemsQuery) -> CatalogResult<Page<Album>> {
        if !matches!(query.scope, Scope::All | Scope::Artist(_)) {
            return Err(CatalogError::invalid_input(
                "top albums can only be scoped to an artist",
            ));
        }
        let top = self.top_query(query)?;
        let ranked = self
            .store
            .get_top_albums(&top)
            .map_err(storage("get_top_albums"))?;
        Ok(Page::from_ranked(ranked, query))
    }

    /// Optionally scoped to an artist or an album.
    pub fn top_tracks(&self, query: &ItemsQuery) -> CatalogResult<Page<Track>> {
        if matches!(query.scope, Scope::Track(_)) {
            return Err(CatalogError::invalid_input(
                "top tracks cannot be scoped to a track",
            ));
        }
        let top = self.top_query(query)?;
        let ranked = self
            .store
            .get_top_tracks(&top)
            .map_err(storage("get_top_tracks"))?;
        Ok(Page::from_ranked(ranked, query))
    }

    fn top_query(&self, query: &ItemsQuery) -> CatalogResult<TopQuery> {
        let range = self.resolve_range(&query.timeframe)?;
        debug!(
            "Top query {:?} page {} x {} in [{}, {})",
            query.scope, query.page, query.limit, range.start, range.end
        );
        Ok(TopQuery {
            range,
            scope: query.scope,
            limit: query.limit,
            offset: query.offset(),
        })
    }

    // =========================================================================
    // Interest
    // =========================================================================

    /// Listens of one item split into `buckets` equal intervals between its
    /// first and last listen. Empty when the item was never listened to.
    pub fn interest(&self, scope: Scope, buckets: i64) -> CatalogResult<Vec<InterestBucket>> {
        if buckets <= 0 || buckets > MAX_INTEREST_BUCKETS as i64 {
            return Err(CatalogError::invalid_input(format!(
                "bucket count must be between 1 and {}, got {}",
                MAX_INTEREST_BUCKETS, buckets
            )));
        }
        if scope == Scope::All {
            return Err(CatalogError::invalid_input(
                "interest requires an artist, album or track",
            ));
        }
        self.store
            .get_interest(scope, buckets as usize)
            .map_err(storage("get_interest"))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::catalog_store::{
        CatalogStore, NewAlbum, NewArtist, NewListen, NewTrack, SqliteCatalogStore,
    };
    use chrono::DateTime;
    use std::sync::Arc;
    use tempfile::TempDir;

    pub struct Library {
        pub store: Arc<SqliteCatalogStore>,
        pub artists: Vec<i64>,
        pub albums: Vec<i64>,
        pub tracks: Vec<i64>,
        _tmp: TempDir,
    }

    impl Library {
        pub fn listen(&self, track_id: i64, unix: i64) {
            self.store
                .save_listen(&NewListen {
                    user_id: 1,
                    track_id,
                    listened_at: DateTime::from_timestamp(unix, 0).unwrap(),
                    client: None,
                })
                .unwrap();
        }
    }

    /// Two artists; the first has two albums with one track each, the second
    /// one album with one track. Track durations are 100, 200 and 300s.
    pub fn library() -> Library {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(SqliteCatalogStore::new(tmp.path().join("catalog.db"), 2).unwrap());
        let mut artists = Vec::new();
        for name in ["First", "Second"] {
            artists.push(
                store
                    .create_artist(&NewArtist {
                        name: name.to_string(),
                        ..Default::default()
                    })
                    .unwrap()
                    .id,
            );
        }
        let mut albums = Vec::new();
        let mut tracks = Vec::new();
        for (index, artist_id) in [artists[0], artists[0], artists[1]].into_iter().enumerate() {
            let album = store
                .create_album(&NewAlbum {
                    title: format!("Album {}", index),
                    artist_ids: vec![artist_id],
                    ..Default::default()
                })
                .unwrap();
            let track = store
                .create_track(&NewTrack {
                    title: format!("Track {}", index),
                    album_id: album.id,
                    duration: 100 * (index as i64 + 1),
                    artist_ids: vec![artist_id],
                    ..Default::default()
                })
                .unwrap();
            albums.push(album.id);
            tracks.push(track.id);
        }
        Library {
            store,
            artists,
            albums,
            tracks,
            _tmp: tmp,
        }
    }
}
