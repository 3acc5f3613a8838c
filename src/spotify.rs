//! Spotify Web API collaborator (client-credentials flow).
//!
//! Errors stay inside this module as strings; the resolver turns them into
//! misses. An empty search result is `Ok(None)`, never an error.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::resolve::{MetadataService, RemoteTrack};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

struct Credentials {
    client_id: String,
    client_secret: String,
}

static CREDENTIALS: OnceLock<Result<Credentials, String>> = OnceLock::new();

fn get_credentials() -> Result<&'static Credentials, String> {
    let result = CREDENTIALS.get_or_init(|| {
        let client_id = std::env::var("SPOTIFY_CLIENT_ID")
            .map_err(|_| "SPOTIFY_CLIENT_ID not set".to_string())?;
        let client_secret = std::env::var("SPOTIFY_CLIENT_SECRET")
            .map_err(|_| "SPOTIFY_CLIENT_SECRET not set".to_string())?;
        Ok(Credentials {
            client_id,
            client_secret,
        })
    });
    result.as_ref().map_err(|e| e.clone())
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct SearchResponse {
    tracks: Option<SearchTracks>,
}

#[derive(Deserialize)]
struct SearchTracks {
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: String,
}

#[derive(Deserialize)]
struct TrackResponse {
    popularity: Option<f64>,
    album: Option<AlbumResponse>,
}

#[derive(Deserialize)]
struct AlbumResponse {
    release_date: Option<String>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct SpotifyClient {
    http: Client,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    /// Build a client from `SPOTIFY_CLIENT_ID` / `SPOTIFY_CLIENT_SECRET`.
    /// Missing credentials are an error here; the caller decides whether to
    /// degrade the remote strategy or abort.
    pub fn from_env(http: Client) -> Result<Self, String> {
        get_credentials()?;
        Ok(Self {
            http,
            token: Mutex::new(None),
        })
    }

    async fn bearer_token(&self) -> Result<String, String> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.value.clone());
            }
        }

        let creds = get_credentials()?;
        let resp = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&creds.client_id, Some(&creds.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| format!("token request failed: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("token request returned HTTP {}", resp.status()));
        }
        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| format!("token response parse error: {e}"))?;

        // Refresh a minute early so in-flight requests never race expiry.
        let expires_at =
            Instant::now() + Duration::from_secs(token.expires_in.saturating_sub(60).max(30));
        let value = token.access_token.clone();
        *guard = Some(CachedToken {
            value: token.access_token,
            expires_at,
        });
        Ok(value)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, String> {
        let token = self.bearer_token().await?;
        let resp = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("Spotify HTTP {}", resp.status()));
        }
        resp.json()
            .await
            .map_err(|e| format!("JSON parse error: {e}"))
    }
}

/// Build a field-scoped search query from the optional artist and title.
fn search_query(artist: Option<&str>, title: Option<&str>) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(artist) = artist {
        parts.push(format!("artist:\"{artist}\""));
    }
    if let Some(title) = title {
        parts.push(format!("track:\"{title}\""));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

#[async_trait]
impl MetadataService for SpotifyClient {
    async fn lookup(
        &self,
        artist: Option<&str>,
        title: Option<&str>,
    ) -> Result<Option<RemoteTrack>, String> {
        let Some(query) = search_query(artist, title) else {
            return Ok(None);
        };
        let url = format!(
            "{API_BASE}/search?q={}&type=track&limit=1",
            urlencode(&query)
        );
        let search: SearchResponse = self.get_json(&url).await?;
        let Some(item) = search.tracks.and_then(|t| t.items.into_iter().next()) else {
            return Ok(None);
        };

        let details: TrackResponse = self
            .get_json(&format!("{API_BASE}/tracks/{}", item.id))
            .await?;
        Ok(Some(RemoteTrack {
            popularity: details.popularity,
            release_date: details.album.and_then(|a| a.release_date),
        }))
    }
}

fn urlencode(s: &str) -> String {
    use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
    const SET: &AsciiSet = &NON_ALPHANUMERIC
        .remove(b'-')
        .remove(b'_')
        .remove(b'.')
        .remove(b'~');
    utf8_percent_encode(s, SET).to_string()
}
