//! Leaderboard computation: first and last weight per participant, the
//! difference between them, and how far that gets toward the challenge goal.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::db::models::Measurement;

/// Target weight loss for the challenge, in kilograms.
pub const GOAL_KG: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RankingRow {
    pub username: String,
    pub first_weight: Option<f64>,
    pub last_weight: Option<f64>,
    pub kg_lost: Option<f64>,
    pub pct_of_goal: Option<f64>,
}

impl RankingRow {
    fn from_weights(username: String, first: Option<f64>, last: Option<f64>) -> Self {
        let kg_lost = match (first, last) {
            (Some(first), Some(last)) => Some(first - last),
            _ => None,
        };
        Self {
            username,
            first_weight: first,
            last_weight: last,
            kg_lost,
            pct_of_goal: kg_lost.map(|kg| kg / GOAL_KG * 100.0),
        }
    }
}

/// Rows ordered by kilograms lost, highest first, unmeasured users last.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ranking {
    pub rows: Vec<RankingRow>,
}

impl Ranking {
    /// The current leader, if anyone has a measured result.
    pub fn leader(&self) -> Option<&RankingRow> {
        self.rows.first().filter(|row| row.kg_lost.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Whether a stored reading can take part in first/last selection.
pub fn is_usable_weight(weight_kg: f64) -> bool {
    weight_kg.is_finite() && weight_kg > 0.0
}

/// Build the leaderboard for every known participant.
///
/// `known_usernames` is merged with the authors found in `measurements`, so
/// both accounts without readings and readings without accounts show up.
/// Readings for a user are ordered by `recorded_at`; equal timestamps keep the
/// order they appear in `measurements`.
pub fn compute_ranking<'a, I>(measurements: &[Measurement], known_usernames: I) -> Ranking
where
    I: IntoIterator<Item = &'a str>,
{
    let mut by_user: BTreeMap<&str, Vec<&Measurement>> = BTreeMap::new();
    for username in known_usernames {
        by_user.entry(username).or_default();
    }
    for measurement in measurements {
        by_user
            .entry(measurement.username.as_str())
            .or_default()
            .push(measurement);
    }

    let mut rows: Vec<RankingRow> = by_user
        .into_iter()
        .map(|(username, readings)| {
            let (first, last) = first_and_last(readings);
            RankingRow::from_weights(username.to_string(), first, last)
        })
        .collect();

    // Stable: rows arrive alphabetically, so equal results stay alphabetical.
    rows.sort_by(|a, b| compare_kg_lost_desc(a.kg_lost, b.kg_lost));

    Ranking { rows }
}

/// Progress of a single participant, or `None` without usable readings.
pub fn personal_progress(measurements: &[Measurement], username: &str) -> Option<RankingRow> {
    let readings: Vec<&Measurement> = measurements
        .iter()
        .filter(|m| m.username == username)
        .collect();
    let (first, last) = first_and_last(readings);
    first.map(|_| RankingRow::from_weights(username.to_string(), first, last))
}

fn first_and_last(mut readings: Vec<&Measurement>) -> (Option<f64>, Option<f64>) {
    readings.retain(|m| is_usable_weight(m.weight_kg));
    readings.sort_by_key(|m| m.recorded_at);
    (
        readings.first().map(|m| m.weight_kg),
        readings.last().map(|m| m.weight_kg),
    )
}

fn compare_kg_lost_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
