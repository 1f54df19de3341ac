//! Batch restorer: replays a page list against a live server.

use crate::cancel::CancelSignal;
use futures::StreamExt;
use poolwarm_core::ports::{PageStream, ServerConnection};
use poolwarm_core::{
    BatchResult, Error, FetchFailure, FetchOutcome, PageDescriptor, PageFetchError, Progress,
    Result,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound on the up-front allocation for one batch.
const MAX_BATCH_PREALLOC: usize = 4096;

/// Totals for a whole restore run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreTotals {
    pub pages_fetched: u64,
    pub pages_attempted: u64,
    pub batches: usize,
    /// The run stopped early on request.
    pub cancelled: bool,
}

/// Counters shared by the concurrent fetches of one batch.
#[derive(Debug, Default)]
struct BatchTally {
    attempted: AtomicU64,
    fetched: AtomicU64,
}

impl BatchTally {
    fn record_attempt(&self) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
    }

    fn record_fetch(&self) {
        self.fetched.fetch_add(1, Ordering::Relaxed);
    }

    fn into_result(self, batch_index: usize, errors: Vec<PageFetchError>) -> BatchResult {
        BatchResult {
            batch_index,
            pages_attempted: self.attempted.into_inner(),
            pages_fetched: self.fetched.into_inner(),
            errors,
        }
    }
}

pub struct BatchRestorer {
    connection: Arc<dyn ServerConnection>,
    fetch_concurrency: usize,
    timeout: Duration,
    cancel: CancelSignal,
    expected_pages: u64,
}

impl BatchRestorer {
    pub fn new(
        connection: Arc<dyn ServerConnection>,
        fetch_concurrency: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            connection,
            fetch_concurrency,
            timeout,
            cancel: CancelSignal::never(),
            expected_pages: 0,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Reported to `on_batch` as [`Progress::pages_total`].
    pub fn with_expected_pages(mut self, pages: u64) -> Self {
        self.expected_pages = pages;
        self
    }

    /// Replay `pages` in consecutive batches of `batch_size`.
    ///
    /// Per-page failures are recorded in each [`BatchResult`] and never end
    /// the run. `on_batch` is called once after every batch with cumulative
    /// progress. A stream error from the image is fatal. Cancellation is
    /// honoured between batches only.
    pub async fn restore<F>(
        &self,
        mut pages: PageStream,
        batch_size: usize,
        mut on_batch: F,
    ) -> Result<RestoreTotals>
    where
        F: FnMut(&BatchResult, Progress),
    {
        if batch_size == 0 {
            return Err(Error::InvalidConfiguration(
                "batch size must be greater than zero".into(),
            ));
        }
        if self.fetch_concurrency == 0 {
            return Err(Error::InvalidConfiguration(
                "fetch concurrency must be greater than zero".into(),
            ));
        }

        let mut totals = RestoreTotals::default();
        let mut progress = Progress {
            pages_total: self.expected_pages,
            ..Progress::default()
        };

        loop {
            let batch = next_batch(&mut pages, batch_size).await?;
            if batch.is_empty() {
                break;
            }
            if self.cancel.is_cancelled() {
                info!(batches = totals.batches, "Restore cancelled");
                totals.cancelled = true;
                break;
            }

            let result = self.run_batch(totals.batches, batch).await;
            progress.add(&result);
            totals.pages_fetched = progress.pages_fetched;
            totals.pages_attempted = progress.pages_attempted;
            totals.batches += 1;

            debug!(
                batch = result.batch_index,
                attempted = result.pages_attempted,
                fetched = result.pages_fetched,
                failed = result.pages_failed(),
                "Batch restored"
            );
            on_batch(&result, progress);
        }

        Ok(totals)
    }

    async fn run_batch(&self, batch_index: usize, pages: Vec<PageDescriptor>) -> BatchResult {
        let tally = BatchTally::default();
        let shared = &tally;

        let mut outcomes: Vec<(usize, Option<PageFetchError>)> =
            futures::stream::iter(pages.into_iter().enumerate())
                .map(|(position, page)| async move {
                    shared.record_attempt();
                    let failure = match self.fetch(&page).await {
                        Ok(()) => {
                            shared.record_fetch();
                            None
                        }
                        Err(reason) => {
                            debug!(page = %page, %reason, "Page fetch failed");
                            Some(PageFetchError { page, reason })
                        }
                    };
                    (position, failure)
                })
                .buffer_unordered(self.fetch_concurrency)
                .collect()
                .await;

        // Completion order is arbitrary; report failures in list order.
        outcomes.sort_unstable_by_key(|(position, _)| *position);
        let errors = outcomes.into_iter().filter_map(|(_, e)| e).collect();
        tally.into_result(batch_index, errors)
    }

    async fn fetch(&self, page: &PageDescriptor) -> std::result::Result<(), FetchFailure> {
        match tokio::time::timeout(self.timeout, self.connection.fetch_page(page)).await {
            Ok(Ok(FetchOutcome::Fetched)) => Ok(()),
            Ok(Ok(FetchOutcome::MissingObject)) => Err(FetchFailure::MissingObject),
            Ok(Err(e)) => Err(FetchFailure::Server(e.to_string())),
            Err(_) => Err(FetchFailure::Timeout(self.timeout)),
        }
    }
}

async fn next_batch(pages: &mut PageStream, batch_size: usize) -> Result<Vec<PageDescriptor>> {
    let mut batch = Vec::with_capacity(batch_size.min(MAX_BATCH_PREALLOC));
    while batch.len() < batch_size {
        match pages.next().await {
            Some(page) => batch.push(page?),
            None => break,
        }
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use crate::testing::{ScriptedServer, page_stream, pages};

    fn restorer(server: &Arc<ScriptedServer>, concurrency: usize) -> BatchRestorer {
        BatchRestorer::new(server.clone(), concurrency, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_batches_partition_the_list() {
        let server = Arc::new(ScriptedServer::default());
        let mut calls = Vec::new();

        let totals = restorer(&server, 3)
            .restore(page_stream(pages(10)), 4, |batch, progress| {
                calls.push((batch.batch_index, batch.pages_attempted, progress));
            })
            .await
            .unwrap();

        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].1, 4);
        assert_eq!(calls[2].1, 2);
        assert_eq!(calls[2].2.pages_attempted, 10);
        assert_eq!(calls[2].2.pages_fetched, 10);
        assert!(calls.iter().all(|(_, _, progress)| progress.pages_total == 0));
        assert_eq!(
            totals,
            RestoreTotals {
                pages_fetched: 10,
                pages_attempted: 10,
                batches: 3,
                cancelled: false,
            }
        );
        assert_eq!(server.fetch_count(), 10);
    }

    #[tokio::test]
    async fn test_missing_table_is_not_fatal() {
        let server = Arc::new(ScriptedServer::default());
        let mut list = pages(5);
        list[2].table_name = "`shop`.`dropped`".into();
        server.mark_missing("`shop`.`dropped`");

        let mut errors = Vec::new();
        let totals = restorer(&server, 2)
            .restore(page_stream(list.clone()), 10, |batch, _| {
                errors.extend(batch.errors.clone())
            })
            .await
            .unwrap();

        assert_eq!(totals.pages_attempted, 5);
        assert_eq!(totals.pages_fetched, 4);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].page, list[2]);
        assert_eq!(errors[0].reason, FetchFailure::MissingObject);
    }

    #[tokio::test]
    async fn test_errors_reported_in_list_order() {
        let server = Arc::new(ScriptedServer::default());
        let list = pages(8);
        for page in [&list[6], &list[1], &list[4]] {
            server.fail_page(page);
        }

        let mut failed = Vec::new();
        restorer(&server, 8)
            .restore(page_stream(list.clone()), 8, |batch, _| {
                failed = batch.errors.iter().map(|e| e.page.clone()).collect();
            })
            .await
            .unwrap();

        assert_eq!(failed, vec![list[1].clone(), list[4].clone(), list[6].clone()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_times_out_per_page() {
        let server = Arc::new(ScriptedServer::default());
        let list = pages(3);
        server.stall_page(&list[0]);

        let mut reasons = Vec::new();
        let totals = BatchRestorer::new(server.clone(), 2, Duration::from_millis(50))
            .restore(page_stream(list), 3, |batch, _| {
                reasons = batch.errors.iter().map(|e| e.reason.clone()).collect();
            })
            .await
            .unwrap();

        assert_eq!(totals.pages_fetched, 2);
        assert_eq!(reasons, vec![FetchFailure::Timeout(Duration::from_millis(50))]);
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let server = Arc::new(ScriptedServer::default());
        let err = restorer(&server, 1)
            .restore(page_stream(pages(3)), 0, |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
        assert_eq!(server.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_between_batches() {
        let server = Arc::new(ScriptedServer::default());
        let (handle, signal) = cancel_pair();

        let mut seen = 0;
        let totals = restorer(&server, 2)
            .with_cancel(signal)
            .restore(page_stream(pages(9)), 3, |_, _| {
                seen += 1;
                if seen == 2 {
                    handle.cancel();
                }
            })
            .await
            .unwrap();

        assert!(totals.cancelled);
        assert_eq!(totals.batches, 2);
        assert_eq!(totals.pages_attempted, 6);
        assert_eq!(server.fetch_count(), 6);
    }

    #[tokio::test]
    async fn test_cancel_after_last_batch_is_complete() {
        let server = Arc::new(ScriptedServer::default());
        let (handle, signal) = cancel_pair();

        let totals = restorer(&server, 2)
            .with_cancel(signal)
            .restore(page_stream(pages(3)), 3, |_, _| handle.cancel())
            .await
            .unwrap();

        assert!(!totals.cancelled);
        assert_eq!(totals.pages_attempted, 3);
    }

    #[tokio::test]
    async fn test_stream_error_is_fatal() {
        let server = Arc::new(ScriptedServer::default());
        let items = vec![
            Ok(pages(1).remove(0)),
            Err(Error::ImageCorrupt("bad row".into())),
        ];
        let stream: PageStream = Box::pin(futures::stream::iter(items));

        let err = restorer(&server, 1)
            .restore(stream, 1, |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ImageCorrupt(_)));
        assert_eq!(server.fetch_count(), 1);
    }
}
