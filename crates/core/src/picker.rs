//! Uniform and playtime-weighted random selection.

use rand::Rng;

use crate::{
    config::PickerWeighting,
    models::{GameEntry, Platform},
};

/// Hours that feed the weight of an entry under the given policy.
pub fn weight_hours(entry: &GameEntry, weighting: PickerWeighting) -> f64 {
    let api = if entry.platform == Platform::Steam {
        entry.playtime_hours.unwrap_or(0.0)
    } else {
        0.0
    };
    match weighting {
        PickerWeighting::SteamHours => api,
        PickerWeighting::AnyHours => api.max(entry.tracked_playtime_hours.unwrap_or(0.0)),
    }
}

/// `sqrt(max(hours, 0) + 1)`, so every entry weighs at least 1.
pub fn weight(entry: &GameEntry, weighting: PickerWeighting) -> f64 {
    let hours = weight_hours(entry, weighting);
    let hours = if hours.is_finite() { hours.max(0.0) } else { 0.0 };
    (hours + 1.0).sqrt()
}

/// Pick one entry from `pool`.
///
/// Unweighted picks are uniform. Weighted picks draw from `[0, total)` and
/// return the first entry whose cumulative weight reaches the draw, falling
/// back to the last entry on rounding.
pub fn pick<'a, R: Rng + ?Sized>(
    pool: &'a [GameEntry],
    weighted: bool,
    weighting: PickerWeighting,
    rng: &mut R,
) -> Option<&'a GameEntry> {
    if pool.is_empty() {
        return None;
    }
    if !weighted {
        return pool.get(rng.gen_range(0..pool.len()));
    }

    let weights: Vec<f64> = pool.iter().map(|entry| weight(entry, weighting)).collect();
    let total: f64 = weights.iter().sum();
    let draw = rng.gen_range(0.0..total);

    let mut cumulative = 0.0;
    for (entry, weight) in pool.iter().zip(&weights) {
        cumulative += weight;
        if cumulative >= draw {
            return Some(entry);
        }
    }
    pool.last()
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn steam(id: &str, hours: Option<f64>) -> GameEntry {
        let mut entry = GameEntry::new(Platform::Steam, id, id);
        entry.playtime_hours = hours;
        entry
    }

    #[test]
    fn empty_pool_yields_none() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(pick(&[], false, PickerWeighting::SteamHours, &mut rng).is_none());
        assert!(pick(&[], true, PickerWeighting::SteamHours, &mut rng).is_none());
    }

    #[test]
    fn unweighted_is_roughly_uniform() {
        let pool: Vec<_> = (0..4).map(|i| steam(&i.to_string(), Some(i as f64 * 500.0))).collect();
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts = [0usize; 4];
        let draws = 40_000;
        for _ in 0..draws {
            let chosen = pick(&pool, false, PickerWeighting::SteamHours, &mut rng).unwrap();
            counts[chosen.id.parse::<usize>().unwrap()] += 1;
        }
        for count in counts {
            let share = count as f64 / draws as f64;
            assert!((share - 0.25).abs() < 0.02, "share {share}");
        }
    }

    #[test]
    fn weights_follow_square_root_of_steam_hours() {
        let heavy = steam("heavy", Some(99.0));
        let mut epic = GameEntry::new(Platform::Epic, "e", "Epic");
        epic.playtime_hours = Some(99.0);
        epic.tracked_playtime_hours = Some(24.0);

        assert_eq!(weight(&heavy, PickerWeighting::SteamHours), 10.0);
        assert_eq!(weight(&steam("neg", Some(-5.0)), PickerWeighting::SteamHours), 1.0);
        assert_eq!(weight(&epic, PickerWeighting::SteamHours), 1.0);
        assert_eq!(weight(&epic, PickerWeighting::AnyHours), 5.0);
    }

    #[test]
    fn weighted_picks_favour_played_games_but_never_starve_others() {
        let pool = vec![steam("light", None), steam("heavy", Some(99.0))];
        let mut rng = StdRng::seed_from_u64(7);
        let mut light = 0usize;
        let draws = 22_000;
        for _ in 0..draws {
            if pick(&pool, true, PickerWeighting::SteamHours, &mut rng).unwrap().id == "light" {
                light += 1;
            }
        }
        // Expected share 1 / (1 + 10).
        let share = light as f64 / draws as f64;
        assert!(light > 0);
        assert!((share - 1.0 / 11.0).abs() < 0.015, "share {share}");
    }

    #[test]
    fn seeded_picks_are_reproducible() {
        let pool: Vec<_> = (0..10).map(|i| steam(&i.to_string(), Some(i as f64))).collect();
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..20)
                .map(|_| pick(&pool, true, PickerWeighting::SteamHours, &mut rng).unwrap().id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(3), run(3));
    }
}
