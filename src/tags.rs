//! Embedded-tag collaborator built on `lofty`.
//!
//! Covers both container families the library holds: frame-based ID3
//! (MP3/AIFF/WAV) and atom-based MP4 ilst (M4A), plus Vorbis comments as a
//! bonus. All functions are synchronous — async callers go through
//! `spawn_blocking`.

use std::path::Path;

use lofty::config::{ParseOptions, ParsingMode};
use lofty::file::TaggedFileExt;
use lofty::probe::Probe;
use lofty::tag::{ItemKey, ItemValue};

use crate::resolve::TagSource;

/// Build `ParseOptions` with sensible defaults.
fn parse_options() -> ParseOptions {
    ParseOptions::new()
        .read_cover_art(false)
        .parsing_mode(ParsingMode::BestAttempt)
}

/// Canonical alias name for a normalized lofty `ItemKey`.
///
/// lofty folds well-known frames into typed keys (TBPM and tmpo both land
/// on the BPM keys), so those are mapped back to the frame name the alias
/// table speaks. Custom TXXX / freeform identifiers come through verbatim
/// as `Unknown`.
fn item_key_name(key: &ItemKey) -> Option<String> {
    match key {
        ItemKey::IntegerBpm | ItemKey::Bpm => Some("TBPM".to_string()),
        ItemKey::InitialKey => Some("TKEY".to_string()),
        ItemKey::Unknown(name) => Some(name.clone()),
        _ => None,
    }
}

/// Read every alias-addressable tag item of a file as (name, value) pairs,
/// in tag order.
pub fn read_tag_items(path: &Path) -> Result<Vec<(String, String)>, String> {
    let tagged = Probe::open(path)
        .map_err(|e| format!("failed to open '{}': {e}", path.display()))?
        .options(parse_options())
        .read()
        .map_err(|e| format!("failed to read tags from '{}': {e}", path.display()))?;

    let mut items = Vec::new();
    for tag in tagged.tags() {
        for item in tag.items() {
            let Some(name) = item_key_name(item.key()) else {
                continue;
            };
            let value = match item.value() {
                ItemValue::Text(text) | ItemValue::Locator(text) => text.clone(),
                ItemValue::Binary(_) => continue,
            };
            if !value.is_empty() {
                items.push((name, value));
            }
        }
    }
    Ok(items)
}

/// Case-insensitive alias match, also covering the trailing component of
/// MP4 freeform identifiers (`----:com.apple.iTunes:<name>`).
pub fn alias_matches(item_name: &str, alias: &str) -> bool {
    if item_name.eq_ignore_ascii_case(alias) {
        return true;
    }
    match item_name.rsplit(':').next() {
        Some(tail) => tail.eq_ignore_ascii_case(alias),
        None => false,
    }
}

/// The lofty-backed tag source used by the real pipeline.
pub struct LoftyTags;

impl TagSource for LoftyTags {
    fn read(&self, path: &Path) -> Result<Vec<(String, String)>, String> {
        read_tag_items(path)
    }
}
