//! Reachability check for every link in the routing file.
//!
//! Links are split into contiguous, disjoint partitions, one per worker.
//! Each worker probes its partition sequentially with a pause between
//! requests and shares nothing with the others; results are merged once all
//! workers are done.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Reachable,
    Broken(String),
    /// The server asked us to slow down; the worker stops.
    RateLimited,
}

#[async_trait::async_trait]
pub trait LinkProbe: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeResult;
}

/// Plain GET; any 2xx answer counts as reachable.
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl LinkProbe for HttpProbe {
    async fn probe(&self, url: &str) -> ProbeResult {
        match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => ProbeResult::Reachable,
            Ok(resp) if resp.status().as_u16() == 429 => ProbeResult::RateLimited,
            Ok(resp) => ProbeResult::Broken(format!("HTTP {}", resp.status().as_u16())),
            Err(e) => ProbeResult::Broken(e.to_string()),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LinkReport {
    pub reachable: usize,
    /// `(link, reason)`
    pub broken: Vec<(String, String)>,
    /// Links a stopped worker never got to.
    pub unchecked: Vec<String>,
    pub rate_limited: bool,
}

impl LinkReport {
    fn merge(&mut self, other: LinkReport) {
        self.reachable += other.reachable;
        self.broken.extend(other.broken);
        self.unchecked.extend(other.unchecked);
        self.rate_limited |= other.rate_limited;
    }
}

/// Split `items` into at most `workers` contiguous chunks of
/// `ceil(n / workers)` items.
pub fn partition<T: Clone>(items: &[T], workers: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let chunk = items.len().div_ceil(workers.max(1));
    items.chunks(chunk).map(<[T]>::to_vec).collect()
}

async fn run_worker(
    probe: Arc<dyn LinkProbe>,
    links: Vec<String>,
    pause: Duration,
    shutdown: CancellationToken,
) -> LinkReport {
    let mut report = LinkReport::default();
    let mut remaining = links.into_iter();
    let mut first = true;
    while let Some(link) = remaining.next() {
        if shutdown.is_cancelled() {
            report.unchecked.push(link);
            break;
        }
        if !first && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        first = false;
        match probe.probe(&link).await {
            ProbeResult::Reachable => report.reachable += 1,
            ProbeResult::Broken(reason) => {
                tracing::warn!("Broken link {}: {}", link, reason);
                report.broken.push((link, reason));
            }
            ProbeResult::RateLimited => {
                tracing::warn!("Rate limited while checking {}, worker stopping", link);
                report.rate_limited = true;
                report.unchecked.push(link);
                break;
            }
        }
    }
    report.unchecked.extend(remaining);
    report
}

/// Probe every link with `workers` independent tasks.
pub async fn check_links(
    probe: Arc<dyn LinkProbe>,
    links: &[String],
    workers: usize,
    pause: Duration,
    shutdown: CancellationToken,
) -> LinkReport {
    let partitions = partition(links, workers);
    tracing::info!(
        links = links.len(),
        workers = partitions.len(),
        "Checking links"
    );

    let handles: Vec<_> = partitions
        .into_iter()
        .map(|part| {
            let handle = tokio::spawn(run_worker(
                probe.clone(),
                part.clone(),
                pause,
                shutdown.clone(),
            ));
            (part, handle)
        })
        .collect();

    let mut report = LinkReport::default();
    for (part, handle) in handles {
        match handle.await {
            Ok(worker_report) => report.merge(worker_report),
            Err(e) => {
                tracing::error!("Link check worker failed: {}", e);
                report.unchecked.extend(part);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FixedProbe {
        answers: HashMap<String, ProbeResult>,
        seen: Mutex<Vec<String>>,
    }

    impl FixedProbe {
        fn new(answers: &[(&str, ProbeResult)]) -> Arc<Self> {
            Arc::new(Self {
                answers: answers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl LinkProbe for FixedProbe {
        async fn probe(&self, url: &str) -> ProbeResult {
            self.seen.lock().unwrap().push(url.to_string());
            self.answers
                .get(url)
                .cloned()
                .unwrap_or(ProbeResult::Reachable)
        }
    }

    fn links(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://x/{i}")).collect()
    }

    #[test]
    fn test_partition_sizes() {
        let sizes: Vec<usize> = partition(&links(10), 4).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
        let sizes: Vec<usize> = partition(&links(3), 4).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1, 1, 1]);
        assert!(partition::<String>(&[], 4).is_empty());
        assert_eq!(partition(&links(2), 0).len(), 1);
    }

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        let all = links(11);
        let flat: Vec<String> = partition(&all, 4).into_iter().flatten().collect();
        assert_eq!(flat, all);
    }

    #[tokio::test]
    async fn test_broken_links_reported() {
        let probe = FixedProbe::new(&[("https://x/3", ProbeResult::Broken("HTTP 404".into()))]);
        let report = check_links(
            probe.clone(),
            &links(6),
            3,
            Duration::ZERO,
            CancellationToken::new(),
        )
        .await;
        assert_eq!(report.reachable, 5);
        assert_eq!(
            report.broken,
            vec![("https://x/3".to_string(), "HTTP 404".to_string())]
        );
        assert!(!report.rate_limited);
        assert_eq!(probe.seen.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_rate_limit_stops_only_that_worker() {
        // Partitions: [0,1,2] [3,4,5]
        let probe = FixedProbe::new(&[("https://x/1", ProbeResult::RateLimited)]);
        let report = check_links(
            probe,
            &links(6),
            2,
            Duration::ZERO,
            CancellationToken::new(),
        )
        .await;
        assert!(report.rate_limited);
        assert_eq!(report.reachable, 4);
        assert_eq!(
            report.unchecked,
            vec!["https://x/1".to_string(), "https://x/2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cancelled_check_probes_nothing() {
        let probe = FixedProbe::new(&[]);
        let token = CancellationToken::new();
        token.cancel();
        let report = check_links(probe.clone(), &links(4), 2, Duration::ZERO, token).await;
        assert_eq!(report.unchecked.len(), 4);
        assert!(probe.seen.lock().unwrap().is_empty());
    }
}
