//! End-to-end pipeline tests over an in-memory library with collaborator
//! doubles: no network, no real audio decoding.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tunesort::engine::{sort_playlist, SortRequest};
use tunesort::library::Library;
use tunesort::plist::{self, Value};
use tunesort::resolve::{ContentAnalyzer, MetadataService, RemoteTrack, Resolver, TagSource};

// ---------------------------------------------------------------------------
// Collaborator doubles
// ---------------------------------------------------------------------------

/// Tag source keyed by file stem.
struct StubTags(HashMap<String, Vec<(String, String)>>);

impl TagSource for StubTags {
    fn read(&self, path: &Path) -> Result<Vec<(String, String)>, String> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        Ok(self.0.get(stem).cloned().unwrap_or_default())
    }
}

/// Analyzer that returns a fixed tempo for any analyzable file.
struct StubAnalyzer(f64);

impl ContentAnalyzer for StubAnalyzer {
    fn feature(&self, _: &Path, key: &str) -> Result<f64, String> {
        match key {
            "bpm" | "beats_per_minute" => Ok(self.0),
            other => Err(format!("no stub feature for '{other}'")),
        }
    }
}

struct NoRemote;

#[async_trait::async_trait]
impl MetadataService for NoRemote {
    async fn lookup(
        &self,
        _: Option<&str>,
        _: Option<&str>,
    ) -> Result<Option<RemoteTrack>, String> {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

fn track_dict(id: i64, name: &str, artist: &str, location: Option<&str>) -> (String, Value) {
    let mut pairs = vec![
        ("Track ID".to_string(), Value::Integer(id)),
        ("Name".to_string(), Value::String(name.to_string())),
        ("Artist".to_string(), Value::String(artist.to_string())),
    ];
    if let Some(location) = location {
        pairs.push(("Location".to_string(), Value::String(location.to_string())));
    }
    (id.to_string(), Value::Dict(pairs))
}

fn playlist_dict(name: &str, ids: &[i64]) -> Value {
    Value::Dict(vec![
        ("Name".to_string(), Value::String(name.to_string())),
        (
            "Playlist Items".to_string(),
            Value::Array(
                ids.iter()
                    .map(|id| Value::Dict(vec![("Track ID".to_string(), Value::Integer(*id))]))
                    .collect(),
            ),
        ),
    ])
}

/// Tempo scenario: T1 has analyzable audio but no BPM tag,
/// T2 carries an embedded BPM of 90, T3 has no file at all.
struct TempoFixture {
    doc: String,
    _dir: tempfile::TempDir,
}

fn tempo_fixture() -> TempoFixture {
    let dir = tempfile::tempdir().unwrap();
    let location = |stem: &str| {
        let path = dir.path().join(format!("{stem}.mp3"));
        std::fs::write(&path, b"stub audio").unwrap();
        format!("file://localhost{}", path.display())
    };
    let t1_loc = location("t1");
    let t2_loc = location("t2");

    let root = Value::Dict(vec![
        ("Major Version".to_string(), Value::Integer(1)),
        (
            "Tracks".to_string(),
            Value::Dict(vec![
                track_dict(1, "One", "Artist A", Some(&t1_loc)),
                track_dict(2, "Two", "Artist B", Some(&t2_loc)),
                track_dict(3, "Three", "Artist C", None),
            ]),
        ),
        (
            "Playlists".to_string(),
            Value::Array(vec![playlist_dict("Mix", &[1, 2, 3])]),
        ),
    ]);
    TempoFixture {
        doc: plist::serialize(&root),
        _dir: dir,
    }
}

fn tempo_resolver() -> Arc<Resolver> {
    let tags = StubTags(HashMap::from([
        ("t1".to_string(), Vec::new()),
        (
            "t2".to_string(),
            vec![("TBPM".to_string(), "90".to_string())],
        ),
    ]));
    Arc::new(Resolver::new(
        Arc::new(tags),
        Some(Arc::new(NoRemote)),
        Arc::new(StubAnalyzer(119.7)),
    ))
}

fn request(descending: bool) -> SortRequest {
    SortRequest {
        playlist: None,
        attribute: tunesort::attrs::get("beats_per_minute").unwrap(),
        descending,
        jobs: 4,
        timeout: None,
        dry_run: false,
        rename: true,
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tempo_scenario_ascending() {
    let fixture = tempo_fixture();
    let mut library = Library::parse(&fixture.doc).unwrap();
    let report = sort_playlist(&mut library, &tempo_resolver(), &request(false))
        .await
        .unwrap();
    // T2 (embedded 90) before T1 (analyzed ~120); T3 absent, last.
    assert_eq!(report.order, vec!["2", "1", "3"]);
    assert_eq!(report.missing, 1);
}

#[tokio::test]
async fn tempo_scenario_descending_keeps_absent_last() {
    let fixture = tempo_fixture();
    let mut library = Library::parse(&fixture.doc).unwrap();
    let report = sort_playlist(&mut library, &tempo_resolver(), &request(true))
        .await
        .unwrap();
    assert_eq!(report.order, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn sole_playlist_resolves_without_a_name() {
    let fixture = tempo_fixture();
    let mut library = Library::parse(&fixture.doc).unwrap();
    let report = sort_playlist(&mut library, &tempo_resolver(), &request(false))
        .await
        .unwrap();
    assert_eq!(report.playlist, "Mix");
}

#[tokio::test]
async fn sorted_output_parses_and_carries_the_new_order() {
    let fixture = tempo_fixture();
    let mut library = Library::parse(&fixture.doc).unwrap();
    let report = sort_playlist(&mut library, &tempo_resolver(), &request(false))
        .await
        .unwrap();
    let output = library.serialize();
    let reparsed = Library::parse(&output).unwrap();
    let new_name = report.new_name.expect("playlist should be renamed");
    assert_eq!(new_name, "Mix (sorted by Track BPM, asc)");
    assert_eq!(
        reparsed.playlist_track_ids(&new_name).unwrap(),
        vec!["2", "1", "3"]
    );
    // Track records are never mutated.
    assert_eq!(
        reparsed.track("2").unwrap().artist.as_deref(),
        Some("Artist B")
    );
}

#[tokio::test]
async fn duplicate_playlist_names_reorder_only_the_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.mp3");
    std::fs::write(&path, b"stub").unwrap();
    let location = format!("file://localhost{}", path.display());

    let root = Value::Dict(vec![
        (
            "Tracks".to_string(),
            Value::Dict(vec![
                track_dict(1, "One", "A", Some(&location)),
                track_dict(2, "Two", "B", Some(&location)),
            ]),
        ),
        (
            "Playlists".to_string(),
            Value::Array(vec![
                playlist_dict("Gym", &[1, 2]),
                playlist_dict("Gym", &[2, 1]),
            ]),
        ),
    ]);
    let mut library = Library::parse(&plist::serialize(&root)).unwrap();

    let resolver = Arc::new(Resolver::new(
        Arc::new(StubTags(HashMap::new())),
        None,
        Arc::new(StubAnalyzer(100.0)),
    ));
    let mut req = request(false);
    req.playlist = Some("Gym".to_string());
    req.rename = false;
    sort_playlist(&mut library, &resolver, &req).await.unwrap();

    // First "Gym" was resolved (equal values keep input order); the second
    // keeps its original reversed order verbatim.
    assert_eq!(library.playlist_track_ids("Gym").unwrap(), vec!["1", "2"]);
    let all = library.playlists().unwrap();
    assert_eq!(all.len(), 2);
    let reparsed = Library::parse(&library.serialize()).unwrap();
    let playlists = reparsed.playlists().unwrap();
    assert_eq!(playlists[1].0, "Gym");
}

#[tokio::test]
async fn untouched_document_round_trips_byte_identically() {
    let fixture = tempo_fixture();
    let library = Library::parse(&fixture.doc).unwrap();
    assert_eq!(library.serialize(), fixture.doc);
}

#[tokio::test]
async fn second_run_is_idempotent_and_does_not_double_suffix() {
    let fixture = tempo_fixture();
    let mut library = Library::parse(&fixture.doc).unwrap();
    let first = sort_playlist(&mut library, &tempo_resolver(), &request(false))
        .await
        .unwrap();
    let first_name = first.new_name.clone().unwrap();

    let mut req = request(false);
    req.playlist = Some(first_name);
    let second = sort_playlist(&mut library, &tempo_resolver(), &req)
        .await
        .unwrap();

    assert_eq!(first.order, second.order);
    assert_eq!(
        second.new_name.as_deref(),
        Some("Mix (sorted by Track BPM, asc)")
    );
}

#[tokio::test]
async fn missing_playlist_is_fatal() {
    let fixture = tempo_fixture();
    let mut library = Library::parse(&fixture.doc).unwrap();
    let mut req = request(false);
    req.playlist = Some("No Such List".to_string());
    let err = sort_playlist(&mut library, &tempo_resolver(), &req)
        .await
        .unwrap_err();
    assert!(
        matches!(err, tunesort::error::Error::PlaylistNotFound(_)),
        "got: {err}"
    );
}
