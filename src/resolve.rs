//! Attribute value resolution.
//!
//! For one (track, attribute) pair the resolver walks the attribute's
//! declared strategy chain in order and stops at the first hit. Every
//! strategy failure is contained: it logs and falls through, so a bad file
//! or a dead service never aborts the run — the track just ends up absent
//! and sorts last.
//!
//! Collaborators are injected, not ambient, so tests swap in doubles and
//! run without network or audio files.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::attrs::{Attribute, Strategy, ValueKind};
use crate::library::Track;
use crate::tags::alias_matches;

/// Calendar date with a total order; Spotify release dates come in `YYYY`,
/// `YYYY-MM` and `YYYY-MM-DD` forms, missing parts default to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimpleDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl SimpleDate {
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.trim().splitn(3, '-');
        let year = parts.next()?.parse::<i32>().ok()?;
        let month = parts.next().and_then(|p| p.parse().ok()).unwrap_or(1);
        let day = parts.next().and_then(|p| p.parse().ok()).unwrap_or(1);
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return None;
        }
        Some(Self { year, month, day })
    }
}

/// Outcome of resolving one (track, attribute) pair. Transient — computed
/// per sort operation, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Number(f64),
    Date(SimpleDate),
    Text(String),
    Absent,
}

impl Resolved {
    pub fn is_absent(&self) -> bool {
        matches!(self, Resolved::Absent)
    }

    /// Short display form for verbose output.
    pub fn display(&self) -> String {
        match self {
            Resolved::Number(n) => format!("{n:.3}"),
            Resolved::Date(d) => format!("{:04}-{:02}-{:02}", d.year, d.month, d.day),
            Resolved::Text(s) => s.clone(),
            Resolved::Absent => "no data".to_string(),
        }
    }
}

/// Best remote match for a track, already reduced to the attributes the
/// catalog knows about.
#[derive(Debug, Clone, Default)]
pub struct RemoteTrack {
    pub popularity: Option<f64>,
    pub release_date: Option<String>,
}

// ---------------------------------------------------------------------------
// Collaborator seams
// ---------------------------------------------------------------------------

/// Embedded-tag reader: every alias-addressable item as (name, value).
pub trait TagSource: Send + Sync {
    fn read(&self, path: &Path) -> Result<Vec<(String, String)>, String>;
}

/// Remote metadata service: search by artist/title, best match only.
/// Service-side errors are strings; an empty result is `Ok(None)`.
#[async_trait]
pub trait MetadataService: Send + Sync {
    async fn lookup(
        &self,
        artist: Option<&str>,
        title: Option<&str>,
    ) -> Result<Option<RemoteTrack>, String>;
}

/// Local content analyzer: one scalar feature per computed attribute key.
pub trait ContentAnalyzer: Send + Sync {
    fn feature(&self, path: &Path, key: &str) -> Result<f64, String>;
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

pub struct Resolver {
    tags: Arc<dyn TagSource>,
    remote: Option<Arc<dyn MetadataService>>,
    analyzer: Arc<dyn ContentAnalyzer>,
    /// Set after the first remote failure; the strategy degrades to
    /// always-miss for the rest of the run and warns exactly once.
    remote_down: AtomicBool,
}

/// Coerce a raw tag value per the attribute's declared kind. Numeric-looking
/// text becomes a number; other text survives only for text attributes.
fn coerce(raw: &str, kind: ValueKind) -> Option<Resolved> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        if n.is_finite() {
            return Some(Resolved::Number(n));
        }
    }
    match kind {
        ValueKind::Text => Some(Resolved::Text(trimmed.to_string())),
        ValueKind::Date => SimpleDate::parse(trimmed).map(Resolved::Date),
        ValueKind::Numeric => None,
    }
}

impl Resolver {
    pub fn new(
        tags: Arc<dyn TagSource>,
        remote: Option<Arc<dyn MetadataService>>,
        analyzer: Arc<dyn ContentAnalyzer>,
    ) -> Self {
        Self {
            tags,
            remote,
            analyzer,
            remote_down: AtomicBool::new(false),
        }
    }

    /// Resolve one track against one attribute, walking the strategy chain.
    pub async fn resolve(&self, track: &Track, attr: &'static Attribute) -> Resolved {
        for strategy in attr.strategies {
            let value = match strategy {
                Strategy::EmbeddedTag => self.try_embedded(track, attr).await,
                Strategy::RemoteService => self.try_remote(track, attr).await,
                Strategy::ContentAnalysis => self.try_analysis(track, attr).await,
            };
            if let Some(value) = value {
                return value;
            }
        }
        Resolved::Absent
    }

    async fn try_embedded(&self, track: &Track, attr: &'static Attribute) -> Option<Resolved> {
        let path = track.local_path()?;
        let tags = self.tags.clone();
        let items = tokio::task::spawn_blocking(move || tags.read(&path))
            .await
            .ok()?;
        let items = match items {
            Ok(items) => items,
            Err(e) => {
                debug!(track = %track.display_name(), "tag read miss: {e}");
                return None;
            }
        };
        for alias in crate::attrs::tag_aliases(attr.key) {
            for (name, raw) in &items {
                if !alias_matches(name, alias) {
                    continue;
                }
                // beaTunes writes arousal as "valence;arousal".
                let raw = if attr.key == "mood_arousal" && raw.contains(';') {
                    raw.split(';').nth(1).unwrap_or(raw)
                } else {
                    raw
                };
                if let Some(value) = coerce(raw, attr.kind) {
                    return Some(value);
                }
            }
        }
        None
    }

    async fn try_remote(&self, track: &Track, attr: &'static Attribute) -> Option<Resolved> {
        let remote = self.remote.as_ref()?;
        if self.remote_down.load(Ordering::Relaxed) {
            return None;
        }
        if track.artist.is_none() && track.name.is_none() {
            return None;
        }
        let result = remote
            .lookup(track.artist.as_deref(), track.name.as_deref())
            .await;
        let found = match result {
            Ok(found) => found?,
            Err(e) => {
                if !self.remote_down.swap(true, Ordering::Relaxed) {
                    warn!("remote metadata service unavailable, skipping for the rest of the run: {e}");
                }
                return None;
            }
        };
        match attr.key {
            "popularity" => found.popularity.map(Resolved::Number),
            "release_date" => found
                .release_date
                .as_deref()
                .and_then(SimpleDate::parse)
                .map(Resolved::Date),
            _ => None,
        }
    }

    async fn try_analysis(&self, track: &Track, attr: &'static Attribute) -> Option<Resolved> {
        let path = track.local_path()?;
        let analyzer = self.analyzer.clone();
        let key = attr.key;
        let result = tokio::task::spawn_blocking(move || analyzer.feature(&path, key))
            .await
            .ok()?;
        match result {
            Ok(value) if value.is_finite() => Some(Resolved::Number(value)),
            Ok(value) => {
                debug!(track = %track.display_name(), "analysis produced non-finite value {value}");
                None
            }
            Err(e) => {
                debug!(track = %track.display_name(), "analysis miss: {e}");
                None
            }
        }
    }

    /// Resolve a batch of tracks concurrently under a bounded permit count.
    ///
    /// Each result lands in its original index slot, so the output order is
    /// a pure function of the input order and never of completion order.
    /// When `timeout` elapses, outstanding resolutions are abandoned and
    /// their slots stay absent; no document state is touched here either way.
    pub async fn resolve_all(
        self: &Arc<Self>,
        tracks: &[Track],
        attr: &'static Attribute,
        limit: usize,
        timeout: Option<std::time::Duration>,
    ) -> Vec<(String, Resolved)> {
        let semaphore = Arc::new(Semaphore::new(limit.max(1)));
        let mut set: JoinSet<(usize, Resolved)> = JoinSet::new();
        for (index, track) in tracks.iter().cloned().enumerate() {
            let resolver = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                (index, resolver.resolve(&track, attr).await)
            });
        }

        let mut slots: Vec<Resolved> = vec![Resolved::Absent; tracks.len()];
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        loop {
            let joined = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, set.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!(
                            "resolution timed out with {} track(s) outstanding, treating them as absent",
                            set.len()
                        );
                        set.abort_all();
                        break;
                    }
                },
                None => set.join_next().await,
            };
            match joined {
                Some(Ok((index, value))) => slots[index] = value,
                Some(Err(e)) => debug!("resolution task failed: {e}"),
                None => break,
            }
        }

        tracks
            .iter()
            .zip(slots)
            .map(|(track, value)| (track.id.clone(), value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    struct NoTags;
    impl TagSource for NoTags {
        fn read(&self, _: &Path) -> Result<Vec<(String, String)>, String> {
            Ok(Vec::new())
        }
    }

    struct FixedTags(Vec<(String, String)>);
    impl TagSource for FixedTags {
        fn read(&self, _: &Path) -> Result<Vec<(String, String)>, String> {
            Ok(self.0.clone())
        }
    }

    struct NoAnalysis;
    impl ContentAnalyzer for NoAnalysis {
        fn feature(&self, _: &Path, _: &str) -> Result<f64, String> {
            Err("no analyzer in this test".to_string())
        }
    }

    struct FixedAnalysis(f64);
    impl ContentAnalyzer for FixedAnalysis {
        fn feature(&self, _: &Path, _: &str) -> Result<f64, String> {
            Ok(self.0)
        }
    }

    /// Remote double that delays per artist, to shuffle completion order.
    struct SlowRemote {
        delays_ms: HashMap<String, u64>,
        popularity: HashMap<String, f64>,
    }

    #[async_trait]
    impl MetadataService for SlowRemote {
        async fn lookup(
            &self,
            artist: Option<&str>,
            _title: Option<&str>,
        ) -> Result<Option<RemoteTrack>, String> {
            let artist = artist.unwrap_or_default();
            if let Some(ms) = self.delays_ms.get(artist) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            Ok(self.popularity.get(artist).map(|p| RemoteTrack {
                popularity: Some(*p),
                release_date: None,
            }))
        }
    }

    struct DeadRemote;
    #[async_trait]
    impl MetadataService for DeadRemote {
        async fn lookup(
            &self,
            _: Option<&str>,
            _: Option<&str>,
        ) -> Result<Option<RemoteTrack>, String> {
            Err("connection refused".to_string())
        }
    }

    fn track(id: &str, artist: Option<&str>, location: Option<String>) -> Track {
        Track {
            id: id.to_string(),
            name: Some(format!("Song {id}")),
            artist: artist.map(|a| a.to_string()),
            location,
        }
    }

    fn file_track(id: &str, dir: &tempfile::TempDir) -> Track {
        let path = dir.path().join(format!("{id}.mp3"));
        std::fs::write(&path, b"stub").unwrap();
        track(
            id,
            Some("Artist"),
            Some(format!("file://localhost{}", path.display())),
        )
    }

    #[test]
    fn simple_date_accepts_partial_forms() {
        assert_eq!(
            SimpleDate::parse("2001"),
            Some(SimpleDate {
                year: 2001,
                month: 1,
                day: 1
            })
        );
        assert_eq!(
            SimpleDate::parse("2001-07"),
            Some(SimpleDate {
                year: 2001,
                month: 7,
                day: 1
            })
        );
        assert_eq!(
            SimpleDate::parse("2001-07-19"),
            Some(SimpleDate {
                year: 2001,
                month: 7,
                day: 19
            })
        );
        assert_eq!(SimpleDate::parse("not a date"), None);
        assert_eq!(SimpleDate::parse("2001-13"), None);
    }

    #[test]
    fn coerce_prefers_numbers() {
        assert_eq!(coerce("120", ValueKind::Numeric), Some(Resolved::Number(120.0)));
        assert_eq!(
            coerce(" 0.75 ", ValueKind::Numeric),
            Some(Resolved::Number(0.75))
        );
        assert_eq!(coerce("Am", ValueKind::Numeric), None);
        assert_eq!(
            coerce("Am", ValueKind::Text),
            Some(Resolved::Text("Am".to_string()))
        );
        assert_eq!(coerce("", ValueKind::Text), None);
    }

    #[tokio::test]
    async fn embedded_tag_wins_over_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(
            Arc::new(FixedTags(vec![("TBPM".to_string(), "90".to_string())])),
            None,
            Arc::new(FixedAnalysis(120.0)),
        );
        let attr = crate::attrs::get("beats_per_minute").unwrap();
        let value = resolver.resolve(&file_track("t", &dir), attr).await;
        assert_eq!(value, Resolved::Number(90.0));
    }

    #[tokio::test]
    async fn missing_tag_falls_through_to_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(Arc::new(NoTags), None, Arc::new(FixedAnalysis(120.0)));
        let attr = crate::attrs::get("beats_per_minute").unwrap();
        let value = resolver.resolve(&file_track("t", &dir), attr).await;
        assert_eq!(value, Resolved::Number(120.0));
    }

    #[tokio::test]
    async fn missing_file_yields_absent() {
        let resolver = Resolver::new(Arc::new(NoTags), None, Arc::new(FixedAnalysis(120.0)));
        let attr = crate::attrs::get("beats_per_minute").unwrap();
        let value = resolver
            .resolve(&track("t", Some("A"), Some("file:///nope.mp3".to_string())), attr)
            .await;
        assert_eq!(value, Resolved::Absent);
    }

    #[tokio::test]
    async fn mood_arousal_takes_second_semicolon_part() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(
            Arc::new(FixedTags(vec![(
                "----:com.apple.iTunes:MOOD_AROUSAL".to_string(),
                "0.2;0.8".to_string(),
            )])),
            None,
            Arc::new(NoAnalysis),
        );
        let attr = crate::attrs::get("mood_arousal").unwrap();
        let value = resolver.resolve(&file_track("t", &dir), attr).await;
        assert_eq!(value, Resolved::Number(0.8));
    }

    #[tokio::test]
    async fn remote_strategy_skipped_without_artist_and_title() {
        let resolver = Resolver::new(
            Arc::new(NoTags),
            Some(Arc::new(SlowRemote {
                delays_ms: HashMap::new(),
                popularity: HashMap::from([(String::new(), 50.0)]),
            })),
            Arc::new(NoAnalysis),
        );
        let attr = crate::attrs::get("popularity").unwrap();
        let anonymous = Track {
            id: "t".to_string(),
            name: None,
            artist: None,
            location: None,
        };
        assert_eq!(resolver.resolve(&anonymous, attr).await, Resolved::Absent);
    }

    #[tokio::test]
    async fn remote_failure_degrades_to_absent_for_rest_of_run() {
        let resolver = Resolver::new(Arc::new(NoTags), Some(Arc::new(DeadRemote)), Arc::new(NoAnalysis));
        let attr = crate::attrs::get("popularity").unwrap();
        let t1 = track("1", Some("A"), None);
        let t2 = track("2", Some("B"), None);
        assert_eq!(resolver.resolve(&t1, attr).await, Resolved::Absent);
        assert!(resolver.remote_down.load(Ordering::Relaxed));
        assert_eq!(resolver.resolve(&t2, attr).await, Resolved::Absent);
    }

    #[tokio::test]
    async fn release_date_resolves_to_date_value() {
        struct DateRemote;
        #[async_trait]
        impl MetadataService for DateRemote {
            async fn lookup(
                &self,
                _: Option<&str>,
                _: Option<&str>,
            ) -> Result<Option<RemoteTrack>, String> {
                Ok(Some(RemoteTrack {
                    popularity: None,
                    release_date: Some("1997-06".to_string()),
                }))
            }
        }
        let resolver = Resolver::new(Arc::new(NoTags), Some(Arc::new(DateRemote)), Arc::new(NoAnalysis));
        let attr = crate::attrs::get("release_date").unwrap();
        let value = resolver.resolve(&track("t", Some("A"), None), attr).await;
        assert_eq!(
            value,
            Resolved::Date(SimpleDate {
                year: 1997,
                month: 6,
                day: 1
            })
        );
    }

    #[tokio::test]
    async fn batch_output_order_is_independent_of_completion_order() {
        // First track finishes last; result order must still match input.
        let remote = SlowRemote {
            delays_ms: HashMap::from([
                ("A".to_string(), 80),
                ("B".to_string(), 10),
                ("C".to_string(), 1),
            ]),
            popularity: HashMap::from([
                ("A".to_string(), 10.0),
                ("B".to_string(), 20.0),
                ("C".to_string(), 30.0),
            ]),
        };
        let resolver = Arc::new(Resolver::new(
            Arc::new(NoTags),
            Some(Arc::new(remote)),
            Arc::new(NoAnalysis),
        ));
        let tracks = vec![
            track("1", Some("A"), None),
            track("2", Some("B"), None),
            track("3", Some("C"), None),
        ];
        let attr = crate::attrs::get("popularity").unwrap();
        let results = resolver.resolve_all(&tracks, attr, 3, None).await;
        assert_eq!(
            results,
            vec![
                ("1".to_string(), Resolved::Number(10.0)),
                ("2".to_string(), Resolved::Number(20.0)),
                ("3".to_string(), Resolved::Number(30.0)),
            ]
        );
    }

    #[tokio::test]
    async fn batch_timeout_leaves_slow_slots_absent() {
        let remote = SlowRemote {
            delays_ms: HashMap::from([("A".to_string(), 0), ("B".to_string(), 5_000)]),
            popularity: HashMap::from([("A".to_string(), 1.0), ("B".to_string(), 2.0)]),
        };
        let resolver = Arc::new(Resolver::new(
            Arc::new(NoTags),
            Some(Arc::new(remote)),
            Arc::new(NoAnalysis),
        ));
        let tracks = vec![track("1", Some("A"), None), track("2", Some("B"), None)];
        let attr = crate::attrs::get("popularity").unwrap();
        let results = resolver
            .resolve_all(&tracks, attr, 2, Some(Duration::from_millis(300)))
            .await;
        assert_eq!(results[0], ("1".to_string(), Resolved::Number(1.0)));
        assert_eq!(results[1], ("2".to_string(), Resolved::Absent));
    }
}
