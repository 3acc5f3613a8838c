use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use tunesort::attrs::Strategy;
use tunesort::audio::LocalAnalyzer;
use tunesort::cli::{self, Args};
use tunesort::engine::{self, SortRequest};
use tunesort::error::Error;
use tunesort::library::Library;
use tunesort::resolve::{MetadataService, Resolver};
use tunesort::spotify::SpotifyClient;
use tunesort::tags::LoftyTags;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let input = std::fs::read_to_string(&args.input)
        .map_err(|e| Error::Document(format!("cannot read '{}': {e}", args.input.display())))?;
    let mut library = Library::parse(&input)?;

    if args.list_playlists {
        return cli::print_playlists(&library);
    }
    if args.list_attributes {
        cli::print_attributes();
        return Ok(());
    }

    // clap guarantees the attribute is present past the listing flags.
    let key = args.attribute.as_deref().unwrap_or_default();
    let attribute =
        tunesort::attrs::get(key).ok_or_else(|| Error::UnknownAttribute(key.to_string()))?;

    // The remote client is only worth constructing when the attribute can
    // use it; missing credentials degrade the strategy with one warning.
    let remote: Option<Arc<dyn MetadataService>> =
        if attribute.strategies.contains(&Strategy::RemoteService) {
            match SpotifyClient::from_env(reqwest::Client::new()) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!("Spotify unavailable, remote lookups disabled: {e}");
                    None
                }
            }
        } else {
            None
        };

    let resolver = Arc::new(Resolver::new(
        Arc::new(LoftyTags),
        remote,
        Arc::new(LocalAnalyzer),
    ));

    let request = SortRequest {
        playlist: args.playlist.clone(),
        attribute,
        descending: args.descending,
        jobs: args.jobs,
        timeout: args.timeout.map(Duration::from_secs),
        dry_run: args.dry_run,
        rename: !args.no_rename,
    };

    let report = engine::sort_playlist(&mut library, &resolver, &request).await?;
    cli::print_report(&report, &library, args.verbose);

    if args.dry_run {
        println!("Dry run - no changes written");
        return Ok(());
    }

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| cli::default_output_path(&args.input));
    let confirmed = cli::confirm_overwrite(&output, args.yes)
        .map_err(|e| Error::Write(e.to_string()))?;
    if !confirmed {
        return Err(Error::Write("overwrite declined".to_string()));
    }
    std::fs::write(&output, library.serialize())
        .map_err(|e| Error::Write(format!("'{}': {e}", output.display())))?;
    println!("Saved sorted library to: {}", output.display());
    Ok(())
}
