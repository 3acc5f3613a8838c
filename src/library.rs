//! Typed model over an iTunes Music Library plist document.
//!
//! Only the `Tracks` dict and the `Playlists` array are interpreted; every
//! other subtree is opaque payload that rides through parse and serialize
//! untouched. Track records are read-only; the one mutation surface is the
//! target playlist's item order and display name.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::Error;
use crate::plist::{self, Value};

/// One track projected out of the `Tracks` dict. Identifier is the dict key.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: String,
    pub name: Option<String>,
    pub artist: Option<String>,
    pub location: Option<String>,
}

impl Track {
    /// Human-readable identification for logs and listings.
    pub fn display_name(&self) -> String {
        match (&self.artist, &self.name) {
            (Some(artist), Some(name)) => format!("{artist} - {name}"),
            (Some(artist), None) => artist.clone(),
            (None, Some(name)) => name.clone(),
            (None, None) => format!("Track {}", self.id),
        }
    }

    /// Resolve the iTunes `Location` URI to an existing local file path.
    /// Returns `None` for missing locations, non-file URIs and dead paths.
    pub fn local_path(&self) -> Option<PathBuf> {
        let location = self.location.as_deref()?;
        let stripped = location
            .strip_prefix("file://localhost")
            .or_else(|| location.strip_prefix("file://"))?;
        let decoded = percent_encoding::percent_decode_str(stripped)
            .decode_utf8()
            .ok()?;
        let path = PathBuf::from(decoded.as_ref());
        path.is_file().then_some(path)
    }
}

/// Suffix appended to a sorted playlist's name: ` (sorted by <label>, asc)`.
fn sort_suffix(label: &str, descending: bool) -> String {
    let direction = if descending { "desc" } else { "asc" };
    format!(" (sorted by {label}, {direction})")
}

/// Strip a previous sort suffix so repeated runs relabel instead of stacking.
fn strip_sort_suffix(name: &str) -> &str {
    if !name.ends_with(')') {
        return name;
    }
    match name.rfind(" (sorted by ") {
        Some(idx) if name.ends_with(", asc)") || name.ends_with(", desc)") => &name[..idx],
        _ => name,
    }
}

#[derive(Debug)]
pub struct Library {
    root: Value,
    tracks: HashMap<String, Track>,
}

impl Library {
    /// Parse a library document and project its track records.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let root = plist::parse(input).map_err(|e| Error::Document(e.to_string()))?;
        if root.as_dict().is_none() {
            return Err(Error::Document("root element is not a dict".to_string()));
        }
        let tracks_dict = root
            .get("Tracks")
            .and_then(Value::as_dict)
            .ok_or_else(|| Error::Document("no 'Tracks' dict found".to_string()))?;

        let mut tracks = HashMap::with_capacity(tracks_dict.len());
        for (id, record) in tracks_dict {
            let get_str = |key: &str| {
                record
                    .get(key)
                    .and_then(Value::as_str)
                    .map(|s| s.to_string())
            };
            tracks.insert(
                id.clone(),
                Track {
                    id: id.clone(),
                    name: get_str("Name"),
                    artist: get_str("Artist"),
                    location: get_str("Location"),
                },
            );
        }

        let library = Self { root, tracks };
        // Structural check: every playlist entry must at least be a dict.
        for (i, entry) in library.playlists_array()?.iter().enumerate() {
            if entry.as_dict().is_none() {
                return Err(Error::Document(format!(
                    "playlist entry {i} is not a dict"
                )));
            }
        }
        Ok(library)
    }

    pub fn track(&self, id: &str) -> Option<&Track> {
        self.tracks.get(id)
    }

    fn playlists_array(&self) -> Result<&[Value], Error> {
        self.root
            .get("Playlists")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Document("no 'Playlists' array found".to_string()))
    }

    fn playlist_name(entry: &Value) -> Option<&str> {
        entry.get("Name").and_then(Value::as_str)
    }

    /// All playlists as (name, item count), in document order.
    pub fn playlists(&self) -> Result<Vec<(String, usize)>, Error> {
        Ok(self
            .playlists_array()?
            .iter()
            .filter_map(|entry| {
                let name = Self::playlist_name(entry)?.to_string();
                let count = entry
                    .get("Playlist Items")
                    .and_then(Value::as_array)
                    .map_or(0, |items| items.len());
                Some((name, count))
            })
            .collect())
    }

    /// Resolve the target playlist name. First match by name in document
    /// order; with no name given, the document's sole playlist is the
    /// implicit target.
    pub fn find_playlist(&self, name: Option<&str>) -> Result<String, Error> {
        let playlists = self.playlists()?;
        match name {
            Some(wanted) => playlists
                .iter()
                .find(|(n, _)| n == wanted)
                .map(|(n, _)| n.clone())
                .ok_or_else(|| Error::PlaylistNotFound(wanted.to_string())),
            None => match playlists.len() {
                0 => Err(Error::PlaylistNotFound("<none>".to_string())),
                1 => Ok(playlists[0].0.clone()),
                n => Err(Error::AmbiguousPlaylist(n)),
            },
        }
    }

    /// Track-identifier references of the named playlist, in item order.
    /// Dangling references are returned as-is; callers decide how to skip.
    pub fn playlist_track_ids(&self, name: &str) -> Result<Vec<String>, Error> {
        let entry = self
            .playlists_array()?
            .iter()
            .find(|e| Self::playlist_name(e) == Some(name))
            .ok_or_else(|| Error::PlaylistNotFound(name.to_string()))?;
        let ids = entry
            .get("Playlist Items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("Track ID"))
                    .filter_map(Value::as_integer)
                    .map(|id| id.to_string())
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }

    fn playlist_entry_mut(&mut self, name: &str) -> Result<&mut Value, Error> {
        let entries = self
            .root
            .get_mut("Playlists")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| Error::Document("no 'Playlists' array found".to_string()))?;
        entries
            .iter_mut()
            .find(|e| Self::playlist_name(e) == Some(name))
            .ok_or_else(|| Error::PlaylistNotFound(name.to_string()))
    }

    /// Rewrite the first matching playlist's item list in the given order.
    /// Every other node of the document is left untouched.
    pub fn set_playlist_items(&mut self, name: &str, order: &[String]) -> Result<(), Error> {
        let mut items = Vec::with_capacity(order.len());
        for id in order {
            let id_num = id
                .parse::<i64>()
                .map_err(|_| Error::Document(format!("track id '{id}' is not an integer")))?;
            items.push(Value::Dict(vec![(
                "Track ID".to_string(),
                Value::Integer(id_num),
            )]));
        }
        let items = Value::Array(items);
        let entry = self.playlist_entry_mut(name)?;
        match entry.get_mut("Playlist Items") {
            Some(existing) => *existing = items,
            None => {
                entry
                    .as_dict_mut()
                    .expect("playlist entries are dicts, checked at parse")
                    .push(("Playlist Items".to_string(), items));
            }
        }
        Ok(())
    }

    /// Relabel the first matching playlist with a sort descriptor. A suffix
    /// from a previous run is replaced, never stacked.
    pub fn rename_sorted(
        &mut self,
        name: &str,
        label: &str,
        descending: bool,
    ) -> Result<String, Error> {
        let new_name = format!("{}{}", strip_sort_suffix(name), sort_suffix(label, descending));
        let entry = self.playlist_entry_mut(name)?;
        if let Some(value) = entry.get_mut("Name") {
            *value = Value::String(new_name.clone());
        }
        Ok(new_name)
    }

    pub fn serialize(&self) -> String {
        plist::serialize(&self.root)
    }
}
