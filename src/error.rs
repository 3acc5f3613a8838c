//! Fatal error taxonomy. Per-strategy resolution misses and collaborator
//! outages are handled inside the resolver and never surface here.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or structurally unrecognized library document.
    #[error("invalid library document: {0}")]
    Document(String),
    /// Requested playlist does not exist in the document.
    #[error("playlist '{0}' not found")]
    PlaylistNotFound(String),
    /// No playlist name was given and the document has more than one.
    #[error("{0} playlists in the library; pick one with --playlist (see --list-playlists)")]
    AmbiguousPlaylist(usize),
    /// The target playlist has no item references.
    #[error("playlist '{0}' is empty, nothing to sort")]
    EmptyPlaylist(String),
    /// Unrecognized sort attribute key.
    #[error("unknown attribute '{0}' (see --list-attributes)")]
    UnknownAttribute(String),
    /// Output path unwritable or overwrite declined.
    #[error("could not write output: {0}")]
    Write(String),
}
