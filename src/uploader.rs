//! Bounded-concurrency batch uploads
//!
//! Each item of a batch gets its own task, gated by a semaphore of
//! `parallel` permits. Workers only send their outcome over a channel; one
//! collector task owns the result slots and the failure list, and puts every
//! uploaded item back at its original position.
//!
//! A batch either succeeds as a whole or fails as a whole: when any item
//! fails, the URLs obtained for the other items are not returned.

use crate::cdn::CdnService;
use crate::models::MediaItem;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_PARALLEL: usize = 8;

pub struct Uploader {
    cdn: Arc<dyn CdnService>,
    parallel: usize,
}

impl Uploader {
    pub fn new(cdn: Arc<dyn CdnService>, parallel: usize) -> Result<Self> {
        if parallel == 0 {
            return Err(Error::Config("parallel must be at least 1".to_string()));
        }
        Ok(Self { cdn, parallel })
    }

    pub fn parallel(&self) -> usize {
        self.parallel
    }

    /// Upload `items` and return them, in input order, with `url` set.
    ///
    /// Cancelling `cancel` stops new uploads from starting; uploads already
    /// running are left to finish. A batch cut short this way fails with
    /// [`Error::Cancelled`].
    pub async fn upload(
        &self,
        items: Vec<MediaItem>,
        cancel: &CancellationToken,
    ) -> Result<Vec<MediaItem>> {
        match items.len() {
            0 => Ok(Vec::new()),
            1 => self.upload_single(items, cancel).await,
            _ => self.upload_batch(items, cancel).await,
        }
    }

    async fn upload_single(
        &self,
        items: Vec<MediaItem>,
        cancel: &CancellationToken,
    ) -> Result<Vec<MediaItem>> {
        let Some(item) = items.into_iter().next() else {
            return Ok(Vec::new());
        };
        if cancel.is_cancelled() {
            return Err(Error::Cancelled {
                dispatched: 0,
                total: 1,
            });
        }

        let name = item.name.clone();
        let cdn = Arc::clone(&self.cdn);
        let joined = tokio::spawn(async move { upload_one(cdn.as_ref(), item).await }).await;

        let failure = match joined {
            Ok(Ok(item)) => {
                info!("Uploaded {} files", 1);
                return Ok(vec![item]);
            }
            Ok(Err(e)) => e,
            Err(e) => Error::Upload {
                name,
                source: Box::new(Error::Task(e)),
            },
        };
        Err(Error::Batch {
            total: 1,
            failures: vec![failure],
        })
    }

    async fn upload_batch(
        &self,
        items: Vec<MediaItem>,
        cancel: &CancellationToken,
    ) -> Result<Vec<MediaItem>> {
        let total = items.len();

        // Duplicate paths resolve to the last index.
        let order: HashMap<String, usize> = items
            .iter()
            .enumerate()
            .map(|(idx, item)| (item.path.clone(), idx))
            .collect();

        let (tx, mut rx) = mpsc::channel::<Result<MediaItem>>(self.parallel);

        let collector = tokio::spawn(async move {
            let mut uploaded: Vec<Option<MediaItem>> = vec![None; total];
            let mut failures = Vec::new();

            while let Some(result) = rx.recv().await {
                match result {
                    Ok(item) => {
                        if let Some(&idx) = order.get(&item.path) {
                            uploaded[idx] = Some(item);
                        }
                    }
                    Err(e) => failures.push(e),
                }
            }

            (uploaded, failures)
        });

        let semaphore = Arc::new(Semaphore::new(self.parallel));
        let mut workers = JoinSet::new();
        let mut names = HashMap::with_capacity(total);
        let mut dispatched = 0;

        for item in items {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            dispatched += 1;
            let name = item.name.clone();
            let cdn = Arc::clone(&self.cdn);
            let tx = tx.clone();

            let handle = workers.spawn(async move {
                let result = upload_one(cdn.as_ref(), item).await;
                // The collector outlives every worker, so a failed send is unreachable.
                let _ = tx.send(result).await;
                drop(permit);
            });
            names.insert(handle.id(), name);
        }
        drop(tx);

        let mut panicked = Vec::new();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                let name = names.remove(&e.id()).unwrap_or_default();
                panicked.push(Error::Upload {
                    name,
                    source: Box::new(Error::Task(e)),
                });
            }
        }

        let (uploaded, mut failures) = collector.await?;
        failures.extend(panicked);

        if !failures.is_empty() {
            return Err(Error::Batch { total, failures });
        }
        if dispatched < total {
            return Err(Error::Cancelled { dispatched, total });
        }

        info!("Uploaded {} files", total);
        Ok(uploaded.into_iter().map(Option::unwrap_or_default).collect())
    }
}

/// Upload a batch with a one-off [`Uploader`].
pub async fn upload_files(
    cancel: &CancellationToken,
    cdn: Arc<dyn CdnService>,
    parallel: usize,
    items: Vec<MediaItem>,
) -> Result<Vec<MediaItem>> {
    Uploader::new(cdn, parallel)?.upload(items, cancel).await
}

async fn upload_one(cdn: &dyn CdnService, item: MediaItem) -> Result<MediaItem> {
    debug!("Start {} uploading", item.name);
    let result = cdn.upload(&item).await;
    debug!("Uploading {} ended", item.name);

    match result {
        Ok(url) => Ok(item.with_url(url)),
        Err(e) => Err(Error::Upload {
            name: item.name,
            source: Box::new(e),
        }),
    }
}
