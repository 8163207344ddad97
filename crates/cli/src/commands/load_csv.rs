//! `threadsight load-csv`: rebuild conversation threads from a tabular
//! support-tweets export and POST them to the bulk ingest endpoint.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, bail};
use threadsight_core::NormalizedMessage;
use threadsight_core::normalizer::{TabularRow, tabular_row_to_message};

const BULK_CHUNK: usize = 500;

pub async fn run(csv_path: &Path, limit: usize, base_url: &str, dry_run: bool) -> Result<()> {
    let reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("cannot open {}", csv_path.display()))?;
    let conversations = build_conversations(reader, limit)?;
    tracing::info!(count = conversations.len(), "rebuilt conversations from csv");
    if conversations.is_empty() {
        bail!(
            "no conversations built; expected columns: tweet_id, author_id, inbound, created_at, text, in_response_to_tweet_id"
        );
    }
    if dry_run {
        tracing::info!("dry run, not posting to the API");
        return Ok(());
    }

    let client = reqwest::Client::new();
    let base = base_url.trim_end_matches('/');
    let (depth_before, pid_before) = fetch_health(&client, base)
        .await
        .with_context(|| format!("API not reachable at {base}; is the server running?"))?;
    tracing::info!(queue_depth = depth_before, process_id = pid_before, "API reachable");

    let url = format!("{base}/api/v1/conversations/bulk");
    let mut total_accepted = 0_u64;
    let mut total_rejected = 0_u64;
    for (index, chunk) in conversations.chunks(BULK_CHUNK).enumerate() {
        let payload = serde_json::json!({
            "conversations": chunk
                .iter()
                .map(|messages| serde_json::json!({"messages": messages}))
                .collect::<Vec<_>>()
        });
        let response = client.post(&url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("chunk {} failed with HTTP {status}: {}", index + 1, body.get(..500).unwrap_or(&body));
        }
        let data: serde_json::Value = response.json().await?;
        let accepted = data["accepted"].as_u64().unwrap_or(0);
        let rejected = data["rejected"].as_u64().unwrap_or(0);
        total_accepted += accepted;
        total_rejected += rejected;
        if accepted == 0 && rejected > 0 {
            tracing::warn!(chunk = index + 1, rejected, first = %data["results"][0], "entire chunk rejected");
        }
        if data["backpressure"].as_bool().unwrap_or(false) {
            tracing::warn!(chunk = index + 1, "backpressure reported");
        }
    }

    match fetch_health(&client, base).await {
        Ok((depth_after, pid_after)) => {
            tracing::info!(
                accepted = total_accepted,
                rejected = total_rejected,
                queue_depth = depth_after,
                process_id = pid_after,
                "load complete"
            );
            if total_accepted > 0 && depth_after == 0 && pid_before != pid_after {
                tracing::warn!(
                    pid_before,
                    pid_after,
                    "health probes hit different processes; the queue is per-process, run a single API worker"
                );
            }
        },
        Err(_) => {
            tracing::info!(accepted = total_accepted, rejected = total_rejected, "load complete");
        },
    }
    Ok(())
}

async fn fetch_health(client: &reqwest::Client, base: &str) -> Result<(u64, u64)> {
    let body: serde_json::Value = client
        .get(format!("{base}/health"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok((
        body["queue_depth"].as_u64().unwrap_or(0),
        body["process_id"].as_u64().unwrap_or(0),
    ))
}

/// Group CSV rows into conversations by walking reply chains to their roots.
/// Each conversation's rows are ordered by `(created_at, tweet_id)`.
fn build_conversations<R: Read>(
    mut reader: csv::Reader<R>,
    limit: usize,
) -> Result<Vec<Vec<NormalizedMessage>>> {
    let mut by_id: HashMap<String, TabularRow> = HashMap::new();
    for record in reader.deserialize::<TabularRow>() {
        let row = match record {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed csv row");
                continue;
            },
        };
        let tweet_id = row.tweet_id.trim().to_owned();
        if tweet_id.is_empty() {
            continue;
        }
        by_id.insert(tweet_id, row);
    }

    let mut by_root: HashMap<String, Vec<String>> = HashMap::new();
    for tweet_id in by_id.keys() {
        by_root.entry(find_root(tweet_id, &by_id)).or_default().push(tweet_id.clone());
    }

    let mut conversations = Vec::new();
    for (root, tweet_ids) in by_root {
        if !by_id.contains_key(&root) {
            continue;
        }
        let mut rows: Vec<&TabularRow> = tweet_ids.iter().map(|t| &by_id[t]).collect();
        rows.sort_by(|a, b| {
            (a.created_at.as_str(), a.tweet_id.as_str())
                .cmp(&(b.created_at.as_str(), b.tweet_id.as_str()))
        });
        conversations.push(rows.into_iter().map(tabular_row_to_message).collect());
        if conversations.len() >= limit {
            break;
        }
    }
    Ok(conversations)
}

/// Follow `in_response_to_tweet_id` links to the thread root. The visited set
/// terminates pathological reply cycles.
fn find_root(tweet_id: &str, by_id: &HashMap<String, TabularRow>) -> String {
    let mut visited: HashSet<String> = HashSet::new();
    let mut current = tweet_id.to_owned();
    while visited.insert(current.clone()) {
        let Some(row) = by_id.get(&current) else {
            return current;
        };
        let parent = row.in_response_to_tweet_id.trim();
        if parent.is_empty() || !by_id.contains_key(parent) {
            return current;
        }
        current = parent.to_owned();
    }
    current
}
