use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use anyhow::{Context, Result};
use futures::future::join_all;
use reqwest::Url;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::HttpGet;
use crate::{
    models::{GameEntry, Platform},
    tags,
};

const APP_DETAILS: &str = "https://store.steampowered.com/api/appdetails";
const APP_HOVER: &str = "https://store.steampowered.com/apphoverpublic/";

/// Store features that show up among genres/tags but say nothing about the game.
const IGNORED: [&str; 11] = [
    "Steam Achievements",
    "Steam Cloud",
    "Steam Leaderboards",
    "Steam Trading Cards",
    "Steam Workshop",
    "Steam Turn Notifications",
    "Remote Play on Phone",
    "Remote Play on Tablet",
    "Remote Play on TV",
    "Remote Play Together",
    "Family Sharing",
];

/// Completed/total counts reported while importing tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagImportProgress {
    /// Lookups finished so far.
    pub done: usize,
    /// Lookups scheduled.
    pub total: usize,
}

/// Normalized store genres and user tags for a Steam app.
///
/// Non-numeric ids yield nothing. A failing endpoint is logged and skipped,
/// so the result may hold genres only, tags only, or neither.
pub async fn store_tags<H: HttpGet>(http: &H, app_id: &str) -> Vec<String> {
    let app_id = app_id.trim();
    if app_id.is_empty() || app_id.parse::<u32>().is_err() {
        return Vec::new();
    }

    let mut raw = Vec::new();
    match fetch_genres(http, app_id).await {
        Ok(genres) => raw.extend(genres),
        Err(err) => debug!("steam: genres for {app_id} unavailable: {err:#}"),
    }
    match fetch_hover_tags(http, app_id).await {
        Ok(found) => raw.extend(found),
        Err(err) => debug!("steam: store tags for {app_id} unavailable: {err:#}"),
    }

    let kept: Vec<&str> = raw
        .iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| !IGNORED.iter().any(|ignored| ignored.eq_ignore_ascii_case(tag)))
        .collect();
    tags::normalize_list(&kept)
}

async fn fetch_genres<H: HttpGet>(http: &H, app_id: &str) -> Result<Vec<String>> {
    let url = Url::parse_with_params(APP_DETAILS, [("appids", app_id), ("l", "english")])
        .context("failed to build appdetails url")?;
    let body = http.get_text(url.as_str()).await?;
    let doc: Value = serde_json::from_str(&body).context("failed to parse appdetails")?;
    Ok(parse_genres(&doc, app_id))
}

fn parse_genres(doc: &Value, app_id: &str) -> Vec<String> {
    let Some(root) = doc.get(app_id) else {
        return Vec::new();
    };
    if root.get("success").and_then(Value::as_bool) != Some(true) {
        return Vec::new();
    }
    root.pointer("/data/genres")
        .and_then(Value::as_array)
        .map(|genres| {
            genres
                .iter()
                .filter_map(|genre| genre.get("description").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

async fn fetch_hover_tags<H: HttpGet>(http: &H, app_id: &str) -> Result<Vec<String>> {
    let mut url = Url::parse(APP_HOVER)
        .and_then(|base| base.join(app_id))
        .context("failed to build apphoverpublic url")?;
    url.query_pairs_mut().append_pair("l", "english");
    let body = http.get_text(url.as_str()).await?;
    let doc: Value = serde_json::from_str(&body).context("failed to parse apphoverpublic")?;
    if doc.get("success").and_then(Value::as_i64) != Some(1) {
        return Ok(Vec::new());
    }
    Ok(doc.get("tags").map(read_tag_strings).unwrap_or_default())
}

/// Tags arrive as strings, `{ "name": .. }` objects, or as the keys of an object.
fn read_tag_strings(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(tag) => Some(tag.clone()),
                Value::Object(map) => map.get("name").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect(),
        Value::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

/// Look up store tags for every Steam entry with at most `concurrency`
/// requests in flight.
///
/// `on_progress` fires every `progress_every` completions and once at the
/// end. Entries that produced no tags are left out of the result.
pub async fn import_store_tags<H, F>(
    http: &H,
    entries: &[GameEntry],
    concurrency: usize,
    progress_every: usize,
    on_progress: F,
) -> BTreeMap<String, Vec<String>>
where
    H: HttpGet,
    F: Fn(TagImportProgress) + Sync,
{
    let steam: Vec<&GameEntry> = entries
        .iter()
        .filter(|entry| entry.platform == Platform::Steam)
        .collect();
    let total = steam.len();
    let semaphore = Semaphore::new(concurrency.max(1));
    let progress_every = progress_every.max(1);
    let done = AtomicUsize::new(0);

    let lookups = steam.iter().map(|entry| {
        let semaphore = &semaphore;
        let done = &done;
        let on_progress = &on_progress;
        async move {
            let tags = match semaphore.acquire().await {
                Ok(_permit) => store_tags(http, &entry.id).await,
                Err(_) => Vec::new(),
            };
            let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
            if finished % progress_every == 0 && finished != total {
                on_progress(TagImportProgress {
                    done: finished,
                    total,
                });
            }
            (entry.key(), tags)
        }
    });

    let results: BTreeMap<String, Vec<String>> = join_all(lookups)
        .await
        .into_iter()
        .filter(|(_, tags)| !tags.is_empty())
        .collect();
    on_progress(TagImportProgress { done: total, total });
    info!("steam: imported tags for {}/{} games", results.len(), total);
    results
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::steam::testing::CannedHttp;

    #[test]
    fn reads_all_tag_shapes() {
        assert_eq!(read_tag_strings(&json!(["RPG", 3, "Co-op"])), vec!["RPG", "Co-op"]);
        assert_eq!(
            read_tag_strings(&json!([{"name": "Roguelike"}, {"tagid": 4}])),
            vec!["Roguelike"]
        );
        let mut keys = read_tag_strings(&json!({"Puzzle": 12, "Indie": 40}));
        keys.sort();
        assert_eq!(keys, vec!["Indie", "Puzzle"]);
        assert!(read_tag_strings(&json!("RPG")).is_empty());
    }

    #[test]
    fn genres_require_success() {
        let ok = json!({"620": {"success": true, "data": {"genres": [
            {"id": "1", "description": "Action"}, {"id": "25", "description": "Adventure"}
        ]}}});
        assert_eq!(parse_genres(&ok, "620"), vec!["Action", "Adventure"]);
        let failed = json!({"620": {"success": false}});
        assert!(parse_genres(&failed, "620").is_empty());
        assert!(parse_genres(&ok, "400").is_empty());
    }

    #[tokio::test]
    async fn merges_genres_and_tags_dropping_store_features() {
        let http = CannedHttp::default()
            .ok(
                "appdetails?appids=620",
                r#"{"620":{"success":true,"data":{"genres":[{"description":"Action"}]}}}"#,
            )
            .ok(
                "apphoverpublic/620",
                r#"{"success":1,"tags":[{"name":"Puzzle"},{"name":"Steam Cloud"},{"name":"action"}]}"#,
            );
        assert_eq!(store_tags(&http, "620").await, vec!["action", "puzzle"]);
    }

    #[tokio::test]
    async fn one_failing_endpoint_keeps_the_other() {
        let http = CannedHttp::default()
            .fail("appdetails")
            .ok("apphoverpublic/70", r#"{"success":1,"tags":{"FPS":1,"Remote Play Together":2}}"#);
        assert_eq!(store_tags(&http, "70").await, vec!["fps"]);
    }

    #[tokio::test]
    async fn non_numeric_ids_make_no_requests() {
        let http = CannedHttp::default();
        assert!(store_tags(&http, "Fortnite").await.is_empty());
        assert!(http.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn import_is_bounded_and_reports_progress() {
        let mut http = CannedHttp::default().fail("appdetails");
        let mut entries = Vec::new();
        for id in 1..=25 {
            http = http.ok(
                &format!("apphoverpublic/{id}?"),
                r#"{"success":1,"tags":["Indie"]}"#,
            );
            entries.push(GameEntry::new(Platform::Steam, id.to_string(), format!("Game {id}")));
        }
        entries.push(GameEntry::new(Platform::Epic, "fn", "Fortnite"));

        let reports = Mutex::new(Vec::new());
        let imported = import_store_tags(&http, &entries, 3, 10, |progress| {
            reports.lock().push(progress.done)
        })
        .await;

        assert_eq!(imported.len(), 25);
        assert_eq!(imported["steam:7"], vec!["indie"]);
        assert!(!imported.contains_key("epic:fn"));
        assert_eq!(reports.into_inner(), vec![10, 20, 25]);
        assert!(http.in_flight.lock().1 <= 3);
        assert!(!http.requests.lock().iter().any(|url| url.contains("/fn")));
    }
}
