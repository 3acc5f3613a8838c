//! Command-line surface: argument parsing, listings and the overwrite
//! confirmation. All user-facing output lives here; the engine only
//! returns data.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::attrs;
use crate::engine::SortReport;
use crate::library::Library;

#[derive(Parser)]
#[command(
    name = "tunesort",
    about = "Sort an iTunes Music Library XML playlist by embedded tags, Spotify metadata, or local audio analysis"
)]
pub struct Args {
    /// Path to the iTunes Library XML file
    pub input: PathBuf,

    /// Playlist name to sort (defaults to the sole playlist)
    #[arg(short, long)]
    pub playlist: Option<String>,

    /// Attribute key to sort by (see --list-attributes)
    #[arg(short, long, required_unless_present_any = ["list_playlists", "list_attributes"])]
    pub attribute: Option<String>,

    /// Sort in descending order (default: ascending)
    #[arg(short, long)]
    pub descending: bool,

    /// Output XML file path (default: <input>_sorted.xml)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// List all playlists and exit
    #[arg(long)]
    pub list_playlists: bool,

    /// List all sortable attributes and exit
    #[arg(long)]
    pub list_attributes: bool,

    /// Resolve and rank without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Don't rename the playlist to indicate sorting
    #[arg(long)]
    pub no_rename: bool,

    /// Max concurrent track resolutions
    #[arg(long, default_value = "4")]
    pub jobs: usize,

    /// Abandon unresolved tracks after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Overwrite the output file without asking
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Show per-track resolved values and the sort preview
    #[arg(short, long)]
    pub verbose: bool,
}

/// Default output path: `<stem>_sorted.<ext>` next to the input.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("library");
    let ext = input.extension().and_then(|e| e.to_str()).unwrap_or("xml");
    input.with_file_name(format!("{stem}_sorted.{ext}"))
}

pub fn print_playlists(library: &Library) -> Result<(), crate::error::Error> {
    let playlists = library.playlists()?;
    if playlists.is_empty() {
        println!("No playlists found in the library");
        return Ok(());
    }
    println!("Found {} playlist(s):", playlists.len());
    for (i, (name, count)) in playlists.iter().enumerate() {
        println!("  {:2}. {name} ({count} tracks)", i + 1);
    }
    Ok(())
}

pub fn print_attributes() {
    println!("Available sort attributes:");
    for (category, attributes) in attrs::by_category() {
        println!("\n{}:", category.label());
        for attr in attributes {
            println!("  {:<26} {}", attr.key, attr.description);
        }
    }
}

/// Per-track values and the head of the final order, for verbose runs.
pub fn print_report(report: &SortReport, library: &Library, verbose: bool) {
    if verbose {
        for (id, value) in &report.values {
            let name = library
                .track(id)
                .map(|t| t.display_name())
                .unwrap_or_else(|| format!("Track {id}"));
            println!("  {name}: {}", value.display());
        }
        println!("\nSort preview (first 5):");
        for (i, id) in report.order.iter().take(5).enumerate() {
            let name = library
                .track(id)
                .map(|t| t.display_name())
                .unwrap_or_else(|| format!("Track {id}"));
            println!("  {:2}. {name}", i + 1);
        }
        if report.order.len() > 5 {
            println!("  ... and {} more", report.order.len() - 5);
        }
    }
    println!(
        "Sorted {} track(s) in '{}'",
        report.order.len(),
        report.playlist
    );
    if report.missing > 0 {
        println!(
            "warning: {} track(s) had no value and were placed last",
            report.missing
        );
    }
    if let Some(new_name) = &report.new_name {
        println!("Playlist renamed to: {new_name}");
    }
}

/// Ask before clobbering an existing output file. `yes` skips the prompt.
pub fn confirm_overwrite(path: &Path, yes: bool) -> Result<bool, std::io::Error> {
    if yes || !path.exists() {
        return Ok(true);
    }
    print!("File '{}' already exists. Overwrite? [y/N]: ", path.display());
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().eq_ignore_ascii_case("y"))
}
