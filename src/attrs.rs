//! Static catalog of sortable attributes.
//!
//! Each attribute declares its ordered resolution-strategy chain as data, so
//! adding an attribute is a table edit, not a new dispatch branch.

/// One way of obtaining an attribute's value for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    EmbeddedTag,
    RemoteService,
    ContentAnalysis,
}

/// Declared comparison type of an attribute's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Numeric,
    Date,
    Text,
}

/// Grouping for listings; display order is Embedded, Remote, Computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Embedded,
    Remote,
    Computed,
}

impl Category {
    pub fn label(self) -> &'static str {
        match self {
            Category::Embedded => "Embedded Metadata",
            Category::Remote => "Spotify",
            Category::Computed => "Local Analysis",
        }
    }
}

const CATEGORY_ORDER: &[Category] = &[Category::Embedded, Category::Remote, Category::Computed];

#[derive(Debug)]
pub struct Attribute {
    pub key: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub category: Category,
    pub kind: ValueKind,
    pub strategies: &'static [Strategy],
}

use Category::{Computed, Embedded, Remote};
use Strategy::{ContentAnalysis, EmbeddedTag, RemoteService};
use ValueKind::{Date, Numeric, Text};

pub const ATTRIBUTES: &[Attribute] = &[
    // Embedded metadata
    Attribute {
        key: "beats_per_minute",
        label: "Track BPM",
        description: "Beats per minute from metadata, beat-tracked if untagged",
        category: Embedded,
        kind: Numeric,
        strategies: &[EmbeddedTag, ContentAnalysis],
    },
    Attribute {
        key: "mood_danceability",
        label: "Danceability",
        description: "Dance-ability rating",
        category: Embedded,
        kind: Numeric,
        strategies: &[EmbeddedTag],
    },
    Attribute {
        key: "initial_key",
        label: "Musical Key",
        description: "Key signature",
        category: Embedded,
        kind: Text,
        strategies: &[EmbeddedTag],
    },
    Attribute {
        key: "mood_arousal",
        label: "Mood Arousal",
        description: "Energy/arousal level",
        category: Embedded,
        kind: Numeric,
        strategies: &[EmbeddedTag],
    },
    Attribute {
        key: "beatunes_color",
        label: "Color",
        description: "beaTunes color classification",
        category: Embedded,
        kind: Text,
        strategies: &[EmbeddedTag],
    },
    // Spotify metadata
    Attribute {
        key: "popularity",
        label: "Spotify Popularity",
        description: "Spotify popularity score (0-100)",
        category: Remote,
        kind: Numeric,
        strategies: &[RemoteService],
    },
    Attribute {
        key: "release_date",
        label: "Release Date",
        description: "Album release date",
        category: Remote,
        kind: Date,
        strategies: &[RemoteService],
    },
    // Local audio analysis
    Attribute {
        key: "energy_local",
        label: "RMS Energy",
        description: "Root mean square energy",
        category: Computed,
        kind: Numeric,
        strategies: &[ContentAnalysis],
    },
    Attribute {
        key: "brightness",
        label: "Spectral Centroid",
        description: "Brightness/timbral centroid",
        category: Computed,
        kind: Numeric,
        strategies: &[ContentAnalysis],
    },
    Attribute {
        key: "percussiveness_zcr",
        label: "Zero-Crossing Rate",
        description: "Percussiveness indicator",
        category: Computed,
        kind: Numeric,
        strategies: &[ContentAnalysis],
    },
    Attribute {
        key: "percussiveness_onset",
        label: "Onset Strength",
        description: "Attack/onset detection",
        category: Computed,
        kind: Numeric,
        strategies: &[ContentAnalysis],
    },
    Attribute {
        key: "contrast",
        label: "Spectral Contrast",
        description: "Harmonic vs percussive content",
        category: Computed,
        kind: Numeric,
        strategies: &[ContentAnalysis],
    },
    Attribute {
        key: "style_and_key_similarity",
        label: "Tonal Centroid",
        description: "Tonnetz tonal centroid features",
        category: Computed,
        kind: Numeric,
        strategies: &[ContentAnalysis],
    },
    Attribute {
        key: "bpm",
        label: "Beat Tracker Tempo",
        description: "Computed tempo",
        category: Computed,
        kind: Numeric,
        strategies: &[ContentAnalysis],
    },
    Attribute {
        key: "music_genre",
        label: "MFCC Mean",
        description: "MFCC-based genre proxy",
        category: Computed,
        kind: Numeric,
        strategies: &[ContentAnalysis],
    },
    Attribute {
        key: "harmonic_content_key",
        label: "Chroma Mean",
        description: "Chroma-based harmonic content",
        category: Computed,
        kind: Numeric,
        strategies: &[ContentAnalysis],
    },
    Attribute {
        key: "timbral_changes",
        label: "Spectral Polynomial",
        description: "Spectral polynomial features",
        category: Computed,
        kind: Numeric,
        strategies: &[ContentAnalysis],
    },
    Attribute {
        key: "dynamic_changes",
        label: "MFCC Delta",
        description: "MFCC delta coefficients",
        category: Computed,
        kind: Numeric,
        strategies: &[ContentAnalysis],
    },
];

/// Embedded tag aliases per attribute. An attribute may map to several tag
/// names across frame-based (ID3) and atom-based (MP4) containers; matching
/// is case-insensitive and also covers the trailing component of MP4
/// freeform identifiers (`----:com.apple.iTunes:<name>`).
pub const TAG_ALIASES: &[(&str, &[&str])] = &[
    ("beats_per_minute", &["TBPM", "tmpo", "BPM"]),
    (
        "mood_danceability",
        &["MOOD_DANCEABILITY", "DanceabilityAlgorithm"],
    ),
    ("initial_key", &["TKEY", "initialkey", "INITIALKEY"]),
    ("mood_arousal", &["MOOD_AROUSAL"]),
    ("beatunes_color", &["beaTunes_COLOR"]),
];

/// Look up an attribute by key.
pub fn get(key: &str) -> Option<&'static Attribute> {
    ATTRIBUTES.iter().find(|a| a.key == key)
}

/// All attributes in table order.
pub fn all() -> &'static [Attribute] {
    ATTRIBUTES
}

/// Tag aliases for an attribute, empty when it has none.
pub fn tag_aliases(key: &str) -> &'static [&'static str] {
    TAG_ALIASES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, aliases)| *aliases)
        .unwrap_or(&[])
}

/// Attributes grouped by category, categories in display order and
/// attributes in table order. Stable across runs.
pub fn by_category() -> Vec<(Category, Vec<&'static Attribute>)> {
    CATEGORY_ORDER
        .iter()
        .map(|&cat| {
            (
                cat,
                ATTRIBUTES.iter().filter(|a| a.category == cat).collect(),
            )
        })
        .collect()
}
