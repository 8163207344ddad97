//! GET /api/v1/trends — time-windowed aggregates over insights.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use threadsight_storage::{InsightStore, TrendSample};

use crate::AppState;
use crate::api_error::ApiError;
use crate::api_types::{
    GapCount, TopicCount, TrendSentimentPoint, TrendVolumePoint, TrendsQuery, TrendsResponse,
};

const TOP_N: usize = 20;

pub async fn get_trends(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TrendsQuery>,
) -> Result<Json<TrendsResponse>, ApiError> {
    let window = query.window.unwrap_or_else(|| "7d".to_owned());
    let since = Utc::now() - parse_window(&window);
    let samples = state.store.insights_since(since).await?;
    Ok(Json(aggregate_trends(&window, &samples)))
}

/// Parse a window like `7d` or `12h`; unparseable input falls back to 7 days.
fn parse_window(window: &str) -> Duration {
    let w = window.trim().to_lowercase();
    let (digits, hours) = if let Some(p) = w.strip_suffix('d') {
        (p.to_owned(), false)
    } else if let Some(p) = w.strip_suffix('h') {
        (p.to_owned(), true)
    } else {
        return Duration::days(7);
    };
    let n: i64 = if digits.is_empty() {
        1
    } else {
        match digits.parse() {
            Ok(n) => n,
            Err(_) => return Duration::days(7),
        }
    };
    if hours { Duration::hours(n) } else { Duration::days(n) }
}

fn bucket_label(day: NaiveDate) -> String {
    day.and_time(NaiveTime::MIN).and_utc().to_rfc3339()
}

fn top_counts(counts: HashMap<String, u64>) -> Vec<(String, u64)> {
    let mut items: Vec<(String, u64)> = counts.into_iter().collect();
    items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    items.truncate(TOP_N);
    items
}

/// Pure aggregation over trend samples: per-day volume, per-day sentiment
/// histogram (positive/negative/neutral/other), and top-20 gaps and topics by
/// count.
fn aggregate_trends(window: &str, samples: &[TrendSample]) -> TrendsResponse {
    let mut volume: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    let mut sentiments: BTreeMap<NaiveDate, [u64; 4]> = BTreeMap::new();
    let mut gap_counts: HashMap<String, u64> = HashMap::new();
    let mut topic_counts: HashMap<String, u64> = HashMap::new();

    for sample in samples {
        let day = sample.created_at.date_naive();
        *volume.entry(day).or_default() += 1;
        let histogram = sentiments.entry(day).or_default();
        let slot = match sample.sentiment.as_deref().map(str::to_lowercase).as_deref() {
            Some("positive") => 0,
            Some("negative") => 1,
            Some("neutral") => 2,
            _ => 3,
        };
        histogram[slot] += 1;
        for gap in sample.gaps.iter().flatten() {
            *gap_counts.entry(gap.clone()).or_default() += 1;
        }
        for topic in sample.topics.iter().flatten() {
            *topic_counts.entry(topic.clone()).or_default() += 1;
        }
    }

    TrendsResponse {
        window: window.to_owned(),
        volume: volume
            .into_iter()
            .map(|(day, count)| TrendVolumePoint { bucket: bucket_label(day), count })
            .collect(),
        sentiment_drift: sentiments
            .into_iter()
            .map(|(day, [positive, negative, neutral, other])| TrendSentimentPoint {
                bucket: bucket_label(day),
                positive,
                negative,
                neutral,
                other,
            })
            .collect(),
        top_gaps: top_counts(gap_counts)
            .into_iter()
            .map(|(gap, count)| GapCount { gap, count })
            .collect(),
        top_topics: top_counts(topic_counts)
            .into_iter()
            .map(|(topic, count)| TopicCount { topic, count })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_parsing_with_fallback() {
        assert_eq!(parse_window("7d"), Duration::days(7));
        assert_eq!(parse_window("1D"), Duration::days(1));
        assert_eq!(parse_window("24h"), Duration::hours(24));
        assert_eq!(parse_window("d"), Duration::days(1));
        assert_eq!(parse_window("soon"), Duration::days(7));
        assert_eq!(parse_window(""), Duration::days(7));
        assert_eq!(parse_window("xd"), Duration::days(7));
    }

    fn sample(
        day: u32,
        sentiment: Option<&str>,
        topics: &[&str],
        gaps: &[&str],
    ) -> TrendSample {
        TrendSample {
            created_at: Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap(),
            sentiment: sentiment.map(ToOwned::to_owned),
            topics: Some(topics.iter().map(|s| (*s).to_owned()).collect()),
            gaps: Some(gaps.iter().map(|s| (*s).to_owned()).collect()),
        }
    }

    #[test]
    fn aggregates_volume_sentiment_and_top_lists() {
        let samples = vec![
            sample(1, Some("positive"), &["billing"], &["no ETA"]),
            sample(1, Some("negative"), &["billing", "delay"], &["no ETA", "slow response"]),
            sample(2, None, &["refund"], &[]),
            sample(2, Some("weird"), &[], &[]),
        ];
        let trends = aggregate_trends("7d", &samples);

        assert_eq!(trends.window, "7d");
        assert_eq!(trends.volume.len(), 2);
        assert_eq!(trends.volume[0].count, 2);
        assert_eq!(trends.volume[1].count, 2);
        assert!(trends.volume[0].bucket.starts_with("2024-03-01T00:00:00"));

        // Histogram per bucket sums to volume; unknown and missing sentiments
        // land in "other".
        let day1 = &trends.sentiment_drift[0];
        assert_eq!(day1.positive + day1.negative + day1.neutral + day1.other, 2);
        let day2 = &trends.sentiment_drift[1];
        assert_eq!(day2.other, 2);

        assert_eq!(trends.top_gaps[0], GapCount { gap: "no ETA".to_owned(), count: 2 });
        assert_eq!(trends.top_topics[0], TopicCount { topic: "billing".to_owned(), count: 2 });
    }

    #[test]
    fn top_lists_sort_by_count_then_name() {
        let mut counts = HashMap::new();
        counts.insert("b".to_owned(), 3_u64);
        counts.insert("a".to_owned(), 3);
        counts.insert("c".to_owned(), 5);
        let top = top_counts(counts);
        assert_eq!(
            top,
            vec![("c".to_owned(), 5), ("a".to_owned(), 3), ("b".to_owned(), 3)]
        );
    }
}
