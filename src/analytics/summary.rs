//! Period summaries ("your month in music").

use super::{Analytics, ItemsQuery, Page};
use crate::catalog_store::{Album, Artist, EntityKind, Scope, Track};
use crate::error::{storage, CatalogResult};
use crate::timeframe::{Period, TimeRange, Timeframe};
use serde::Serialize;

pub const SUMMARY_TOP_ITEMS: i64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryItem<T> {
    pub item: T,
    pub listen_count: i64,
    /// Seconds.
    pub time_listened: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub title: String,
    pub range: TimeRange,
    pub top_artists: Vec<SummaryItem<Artist>>,
    pub top_albums: Vec<SummaryItem<Album>>,
    pub top_tracks: Vec<SummaryItem<Track>>,
    pub minutes_listened: i64,
    pub avg_minutes_per_day: f64,
    pub plays: i64,
    pub avg_plays_per_day: f64,
    pub unique_tracks: i64,
    pub unique_albums: i64,
    pub unique_artists: i64,
    pub new_tracks: i64,
    pub new_albums: i64,
    pub new_artists: i64,
}

impl Analytics {
    /// Summarize `timeframe`. An empty timeframe summarizes all time.
    pub fn summary(&self, timeframe: &Timeframe, title: &str) -> CatalogResult<Summary> {
        let timeframe = if timeframe.is_empty() {
            Timeframe::period(Period::AllTime)
        } else {
            timeframe.clone()
        };
        let range = self.resolve_range(&timeframe)?;
        let top = ItemsQuery::sanitized(
            Some(SUMMARY_TOP_ITEMS),
            Some(1),
            Scope::All,
            timeframe.clone(),
        );

        let top_artists = self.with_time_listened(self.top_artists(&top)?, &range, |a| {
            Scope::Artist(a.id)
        })?;
        let top_albums =
            self.with_time_listened(self.top_albums(&top)?, &range, |a| Scope::Album(a.id))?;
        let top_tracks =
            self.with_time_listened(self.top_tracks(&top)?, &range, |t| Scope::Track(t.id))?;

        let store = self.store.as_ref();
        let seconds = store
            .count_time_listened(&range, Scope::All)
            .map_err(storage("count_time_listened"))?;
        let plays = store
            .count_listens(&range, Scope::All)
            .map_err(storage("count_listens"))?;
        let days = range.duration().num_days().max(1) as f64;
        let minutes_listened = seconds / 60;

        Ok(Summary {
            title: title.to_string(),
            range,
            top_artists,
            top_albums,
            top_tracks,
            minutes_listened,
            avg_minutes_per_day: minutes_listened as f64 / days,
            plays,
            avg_plays_per_day: plays as f64 / days,
            unique_tracks: self.count_tracks(&timeframe)?,
            unique_albums: self.count_albums(&timeframe)?,
            unique_artists: self.count_artists(&timeframe)?,
            new_tracks: self.count_new(EntityKind::Track, &timeframe)?,
            new_albums: self.count_new(EntityKind::Album, &timeframe)?,
            new_artists: self.count_new(EntityKind::Artist, &timeframe)?,
        })
    }

    fn with_time_listened<T>(
        &self,
        page: Page<T>,
        range: &TimeRange,
        scope_of: impl Fn(&T) -> Scope,
    ) -> CatalogResult<Vec<SummaryItem<T>>> {
        page.items
            .into_iter()
            .map(|ranked| {
                let time_listened = self
                    .store
                    .count_time_listened(range, scope_of(&ranked.item))
                    .map_err(storage("count_time_listened"))?;
                Ok(SummaryItem {
                    item: ranked.item,
                    listen_count: ranked.listen_count,
                    time_listened,
                })
            })
            .collect()
    }
}
