use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::CONTENT_TYPE;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

use crate::{
    channel::Channel,
    fetcher::{FetchMode, Fetched, Fetcher, Redirects},
    limiter::Limiter,
};

/// Probes channel URLs with HEAD requests, batch by batch
#[derive(Debug, Clone)]
pub struct LivenessChecker {
    fetcher: Fetcher,
    limiter: Limiter,
    timeout: Duration,
    batch_size: usize,
}

impl LivenessChecker {
    #[must_use]
    pub fn new(fetcher: Fetcher, limiter: Limiter, timeout: Duration, batch_size: usize) -> Self {
        Self {
            fetcher,
            limiter,
            timeout,
            batch_size: batch_size.max(1),
        }
    }

    /// A URL is live when a HEAD request answers with any 2xx / 3xx status.
    ///
    /// The content type is only logged. Plenty of stream servers omit or
    /// mislabel it, so it is never used to reject a channel.
    pub async fn is_active(&self, url: &str) -> bool {
        match self
            .fetcher
            .fetch(url, self.timeout, FetchMode::Head, Redirects::Short)
            .await
        {
            Ok(Fetched::Head { status, headers }) => {
                let content_type = headers
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("none");
                debug!("{url} is live ({status}, content-type: {content_type})");
                true
            }
            Ok(Fetched::Body(_)) => true,
            Err(e) => {
                debug!("{url} is not live: {e}");
                false
            }
        }
    }

    /// Probes every channel of `batch` concurrently through the limiter and
    /// returns the live ones in their original order
    pub async fn check_batch(&self, batch: &[Channel], progress: &ProgressBar) -> Vec<Channel> {
        let mut probes = JoinSet::new();
        for (index, channel) in batch.iter().enumerate() {
            let checker = self.clone();
            let url = channel.url.clone();
            let progress = progress.clone();
            probes.spawn(async move {
                let active = checker.limiter.run(checker.is_active(&url)).await;
                progress.inc(1);
                (index, active)
            });
        }

        let mut live = vec![false; batch.len()];
        while let Some(probe) = probes.join_next().await {
            match probe {
                Ok((index, active)) => live[index] = active,
                Err(e) => error!("Liveness probe task failed: {e}"),
            }
        }

        batch
            .iter()
            .zip(live)
            .filter_map(|(channel, active)| active.then(|| channel.clone()))
            .collect()
    }

    /// Runs the batches one after another and keeps the live channels
    #[instrument(skip_all, fields(channels = channels.len()))]
    pub async fn filter_active(&self, channels: &[Channel]) -> Vec<Channel> {
        let progress = progress_bar(channels.len() as u64);
        let mut active = Vec::new();

        for (number, batch) in channels.chunks(self.batch_size).enumerate() {
            let live = self.check_batch(batch, &progress).await;
            info!(
                "Batch {}: {}/{} channels live",
                number + 1,
                live.len(),
                batch.len()
            );
            active.extend(live);
        }

        progress.finish_and_clear();
        active
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template(
        "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} checked ({eta})",
    ) {
        pb.set_style(style);
    }
    pb
}
