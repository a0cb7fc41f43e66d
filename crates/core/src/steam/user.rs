use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::scanner::{steam_root, ScanContext};

static ACCOUNT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)"(7656\d{13})"\s*\{(.*?)\}"#).unwrap());
static MOST_RECENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)"MostRecent"\s*"([^"]*)""#).unwrap());
static TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)"Timestamp"\s*"([^"]*)""#).unwrap());

/// SteamID64 of the account most recently signed in to the local client.
pub fn detect_local_steam_id64(ctx: &ScanContext) -> Option<String> {
    let root = steam_root(ctx)?;
    let path = root.join("config").join("loginusers.vdf");
    let text = crate::scanner::read_text(&path)?;
    let id = parse_login_users(&text);
    debug!("steam: local account from {}: {id:?}", path.display());
    id
}

/// Pick the `MostRecent` account from `loginusers.vdf`, breaking ties by the
/// largest `Timestamp`. The first account wins when nothing distinguishes them.
pub fn parse_login_users(text: &str) -> Option<String> {
    let mut best: Option<(&str, bool, i64)> = None;
    for caps in ACCOUNT_BLOCK.captures_iter(text) {
        let (Some(id), Some(body)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let body = body.as_str();
        let most_recent = field(&MOST_RECENT, body).and_then(|v| v.parse::<i64>().ok()) == Some(1);
        let timestamp = field(&TIMESTAMP, body)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(-1);

        let better = match best {
            None => true,
            Some((_, best_recent, best_ts)) => {
                (most_recent && !best_recent) || (most_recent == best_recent && timestamp > best_ts)
            }
        };
        if better {
            best = Some((id.as_str(), most_recent, timestamp));
        }
    }
    best.map(|(id, _, _)| id.to_string())
}

fn field<'a>(pattern: &Regex, body: &'a str) -> Option<&'a str> {
    pattern
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|value| value.as_str().trim())
}
