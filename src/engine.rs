//! One-shot sort pipeline: extract the playlist, resolve every track,
//! rank, then mutate the document. Resolution is the only concurrent
//! phase; mutation runs strictly after every resolution has returned or
//! been abandoned.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::attrs::Attribute;
use crate::error::Error;
use crate::library::Library;
use crate::rank;
use crate::resolve::{Resolved, Resolver};

pub struct SortRequest {
    /// Playlist to sort; `None` targets the document's sole playlist.
    pub playlist: Option<String>,
    pub attribute: &'static Attribute,
    pub descending: bool,
    /// Bound on concurrent resolutions.
    pub jobs: usize,
    /// Abandon outstanding resolutions (to absent) after this long.
    pub timeout: Option<Duration>,
    /// Resolve and rank but leave the document untouched.
    pub dry_run: bool,
    /// Append the sort descriptor to the playlist name.
    pub rename: bool,
}

#[derive(Debug)]
pub struct SortReport {
    pub playlist: String,
    pub new_name: Option<String>,
    /// (track id, resolved value) in original playlist order.
    pub values: Vec<(String, Resolved)>,
    /// Final item order, a permutation of the playlist's track references.
    pub order: Vec<String>,
    pub missing: usize,
}

/// Run the full pipeline against a parsed library.
pub async fn sort_playlist(
    library: &mut Library,
    resolver: &Arc<Resolver>,
    request: &SortRequest,
) -> Result<SortReport, Error> {
    let playlist = library.find_playlist(request.playlist.as_deref())?;
    let ids = library.playlist_track_ids(&playlist)?;
    if ids.is_empty() {
        return Err(Error::EmptyPlaylist(playlist));
    }

    // Dangling references get no resolution attempt; they stay in the
    // playlist as absent entries at their original position, so the output
    // remains a permutation and the absent tail keeps playlist order.
    let mut tracks = Vec::with_capacity(ids.len());
    for id in &ids {
        match library.track(id) {
            Some(track) => tracks.push(track.clone()),
            None => {
                warn!("playlist '{playlist}' references unknown track id {id}, keeping it last");
            }
        }
    }

    let mut resolved = resolver
        .resolve_all(&tracks, request.attribute, request.jobs, request.timeout)
        .await
        .into_iter();
    let mut values = Vec::with_capacity(ids.len());
    for id in &ids {
        if library.track(id).is_some() {
            if let Some(value) = resolved.next() {
                values.push(value);
            }
        } else {
            values.push((id.clone(), Resolved::Absent));
        }
    }

    let missing = values.iter().filter(|(_, v)| v.is_absent()).count();
    let order = rank::rank(&values, request.descending);

    let mut new_name = None;
    if !request.dry_run {
        library.set_playlist_items(&playlist, &order)?;
        if request.rename {
            new_name = Some(library.rename_sorted(
                &playlist,
                request.attribute.label,
                request.descending,
            )?);
        }
    }

    Ok(SortReport {
        playlist,
        new_name,
        values,
        order,
        missing,
    })
}
