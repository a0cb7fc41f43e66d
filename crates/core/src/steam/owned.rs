use std::collections::BTreeMap;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::Deserialize;
use tracing::info;

use super::HttpGet;

const OWNED_GAMES: &str = "https://api.steampowered.com/IPlayerService/GetOwnedGames/v0001/";

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    response: OwnedGames,
}

#[derive(Debug, Default, Deserialize)]
struct OwnedGames {
    #[serde(default)]
    games: Vec<OwnedGame>,
}

#[derive(Debug, Deserialize)]
struct OwnedGame {
    appid: u64,
    playtime_forever: Option<u64>,
}

/// `GetOwnedGames` request URL for an account.
pub fn owned_games_url(api_key: &str, steam_id64: &str) -> Result<Url> {
    Url::parse_with_params(
        OWNED_GAMES,
        [
            ("key", api_key.trim()),
            ("steamid", steam_id64.trim()),
            ("include_appinfo", "0"),
            ("include_played_free_games", "1"),
            ("format", "json"),
        ],
    )
    .context("failed to build GetOwnedGames url")
}

/// App id → lifetime hours for every game the account owns.
///
/// A blank key or id yields an empty map. Request and parse failures fail
/// the whole batch.
pub async fn owned_playtime_hours<H: HttpGet>(
    http: &H,
    api_key: &str,
    steam_id64: &str,
) -> Result<BTreeMap<String, f64>> {
    if api_key.trim().is_empty() || steam_id64.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let url = owned_games_url(api_key, steam_id64)?;
    let body = http.get_text(url.as_str()).await?;
    let envelope: Envelope =
        serde_json::from_str(&body).context("failed to parse GetOwnedGames response")?;

    let hours: BTreeMap<String, f64> = envelope
        .response
        .games
        .into_iter()
        .filter_map(|game| {
            let minutes = game.playtime_forever?;
            Some((game.appid.to_string(), minutes as f64 / 60.0))
        })
        .collect();
    info!("steam: playtime for {} owned games", hours.len());
    Ok(hours)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::steam::testing::CannedHttp;

    #[test]
    fn url_escapes_and_requests_free_games() -> Result<()> {
        let url = owned_games_url(" k&y ", "76561198000000000")?;
        let query = url.query().unwrap_or_default();
        assert!(query.contains("key=k%26y"));
        assert!(query.contains("steamid=76561198000000000"));
        assert!(query.contains("include_appinfo=0"));
        assert!(query.contains("include_played_free_games=1"));
        Ok(())
    }

    #[tokio::test]
    async fn converts_minutes_to_hours() -> Result<()> {
        let http = CannedHttp::default().ok(
            "GetOwnedGames",
            r#"{"response":{"game_count":3,"games":[
                {"appid":440,"playtime_forever":90},
                {"appid":570,"playtime_forever":0},
                {"appid":10}
            ]}}"#,
        );
        let hours = owned_playtime_hours(&http, "key", "76561198000000000").await?;
        assert_eq!(hours.len(), 2);
        assert_eq!(hours["440"], 1.5);
        assert_eq!(hours["570"], 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn private_profile_yields_nothing() -> Result<()> {
        let http = CannedHttp::default().ok("GetOwnedGames", r#"{"response":{}}"#);
        assert!(owned_playtime_hours(&http, "key", "7656").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn failures_propagate_and_blank_credentials_skip_the_request() {
        let http = CannedHttp::default().fail("GetOwnedGames");
        assert!(owned_playtime_hours(&http, "key", "7656").await.is_err());

        let untouched = CannedHttp::default();
        let hours = owned_playtime_hours(&untouched, " ", "7656").await;
        assert!(matches!(hours, Ok(map) if map.is_empty()));
        assert!(untouched.requests.lock().is_empty());
    }
}
