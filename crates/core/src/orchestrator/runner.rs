//! The orchestrator drives sessions through their lifecycle:
//!
//! ```text
//! preparing → fetching_metadata → created → downloading → downloaded
//!                                                             ↓
//!                                          initializing ←── (convert requested)
//!                                                             ↓
//!                                                         converting → completed
//!       any state → failed  (retries exhausted)
//! ```
//!
//! Work is deduplicated at two levels: the asset cache collapses concurrent
//! downloads of the same canonical URL, and the variant cache short-circuits
//! repeat conversions of the same (asset, quality, range) tuple.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::fetcher::MediaFetcher;
use crate::metrics;
use crate::queue::{Job, JobKind, JobQueue, WorkerPool};
use crate::session::{
    AssetState, ConversionSession, MetaLite, SessionState, SessionStore, StoreError,
};
use crate::transcoder::{AudioTranscoder, TranscodeRequest};
use crate::urls;

use super::types::{ConvertAccepted, OrchestratorError, QueueDepths, StatusView};

/// Priority for background downloads triggered by `prepare`.
const DOWNLOAD_PRIORITY: i32 = 10;
/// Default priority for convert jobs.
const CONVERT_PRIORITY: i32 = 5;
/// Priority for convert jobs carrying a recognized premium API key.
const CONVERT_PRIORITY_PREMIUM: i32 = 50;
/// How long a convert job waits before re-checking an unfinished download.
const SOURCE_WAIT_DELAY: Duration = Duration::from_secs(5);

pub struct Orchestrator {
    config: Config,
    store: Arc<dyn SessionStore>,
    fetcher: Arc<dyn MediaFetcher>,
    transcoder: Arc<dyn AudioTranscoder>,
    download_queue: Arc<JobQueue>,
    convert_queue: Arc<JobQueue>,
    pools: Mutex<Vec<WorkerPool>>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        store: Arc<dyn SessionStore>,
        fetcher: Arc<dyn MediaFetcher>,
        transcoder: Arc<dyn AudioTranscoder>,
    ) -> Self {
        for dir in [config.storage.streams_dir(), config.storage.outputs_dir()] {
            if let Err(e) = std::fs::create_dir_all(&dir) {
                warn!(dir = %dir.display(), error = %e, "failed to create artifact directory");
            }
        }
        let capacity = config.queue.capacity;
        Self {
            config,
            store,
            fetcher,
            transcoder,
            download_queue: Arc::new(JobQueue::new(capacity)),
            convert_queue: Arc::new(JobQueue::new(capacity)),
            pools: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the download and convert worker pools.
    pub fn start(self: &Arc<Self>) {
        let workers = self.config.queue.worker_pool_size;

        let orch = Arc::clone(self);
        let download_pool =
            WorkerPool::start(workers, Arc::clone(&self.download_queue), move |job| {
                let orch = Arc::clone(&orch);
                async move { orch.handle_download(job).await }
            });

        let orch = Arc::clone(self);
        let convert_pool =
            WorkerPool::start(workers, Arc::clone(&self.convert_queue), move |job| {
                let orch = Arc::clone(&orch);
                async move { orch.handle_convert(job).await }
            });

        let mut pools = self.lock_pools();
        pools.push(download_pool);
        pools.push(convert_pool);
        info!(workers, "orchestrator started");
    }

    /// Stop both pools; in-flight handlers run to completion.
    pub async fn stop(&self) {
        let pools: Vec<WorkerPool> = self.lock_pools().drain(..).collect();
        for pool in pools {
            pool.stop().await;
        }
        info!("orchestrator stopped");
    }

    pub fn queue_depths(&self) -> QueueDepths {
        QueueDepths {
            download: self.download_queue.len(),
            convert: self.convert_queue.len(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ------------------------------------------------------------------
    // Client-facing edges
    // ------------------------------------------------------------------

    /// Create a session for `url`, fetch its metadata and kick off the
    /// background download unless the asset cache already covers it.
    ///
    /// Every call creates a fresh session; dedup happens at the asset and
    /// variant layer, never by collapsing sessions.
    pub async fn prepare(&self, url: &str) -> Result<ConversionSession, OrchestratorError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "url is required".to_string(),
            ));
        }
        if !urls::is_allowed_domain(url, &self.config.validation.allowed_domains) {
            return Err(OrchestratorError::UnsupportedDomain);
        }

        let mut session = ConversionSession::new(url);
        self.store.create_session(&session).await?;
        metrics::SESSIONS_CREATED.inc();
        if let Err(e) = self.store.set_url_map(url, &session.id).await {
            warn!(error = %e, "failed to record url mapping");
        }

        session.state = SessionState::FetchingMetadata;
        self.persist(&session).await;

        match self.fetcher.fetch_metadata(url).await {
            Ok(meta) => {
                session.meta = MetaLite {
                    title: meta.title,
                    duration: meta.duration_seconds,
                    thumbnail: meta.thumbnail,
                };
            }
            Err(e) => {
                // Metadata is best-effort; the download can still succeed.
                warn!(url, error = %e, "metadata fetch failed");
            }
        }

        let max_duration = self.config.validation.max_video_duration_seconds;
        if max_duration > 0 && session.meta.duration > max_duration {
            session.state = SessionState::Failed;
            session.error = "video exceeds the maximum allowed duration".to_string();
            self.persist(&session).await;
            return Err(OrchestratorError::VideoTooLong);
        }

        session.asset_hash = urls::hash_string(&urls::canonical_video_id(url));
        session.state = SessionState::Created;
        self.persist(&session).await;

        // First writer of the `preparing` entry wins the download; later
        // prepares for the same canonical URL observe it and skip.
        let needs_download = match self.store.get_asset(&session.asset_hash).await {
            Ok(Some(entry)) => entry.state == AssetState::Failed,
            Ok(None) => true,
            Err(e) => {
                warn!(error = %e, "asset cache lookup failed");
                true
            }
        };
        if needs_download {
            if let Err(e) = self
                .store
                .set_asset(&session.asset_hash, "", AssetState::Preparing)
                .await
            {
                warn!(error = %e, "failed to seed asset cache entry");
            }
            let job = Job::new(JobKind::Download, &session.id, DOWNLOAD_PRIORITY);
            if !self.download_queue.enqueue(job) {
                return Err(OrchestratorError::QueueFull);
            }
        }

        Ok(session)
    }

    /// Accept a conversion request for an existing session.
    pub async fn convert(
        &self,
        session_id: &str,
        quality: &str,
        start: &str,
        end: &str,
        api_key: &str,
    ) -> Result<ConvertAccepted, OrchestratorError> {
        if session_id.is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "conversion_id is required".to_string(),
            ));
        }
        let mut session = self.get_session(session_id).await?;

        let total_duration = session.meta.duration.max(0);
        let (_, _, ok) = urls::parse_clip_bounds(
            start,
            end,
            self.config.validation.max_clip_seconds,
            total_duration,
        );
        if !ok {
            return Err(OrchestratorError::InvalidClip);
        }

        session.asset_hash = urls::hash_string(&urls::canonical_video_id(&session.url));
        session.variant_hash = variant_hash(&session.asset_hash, quality, start, end);
        session.quality = quality.to_string();
        self.persist(&session).await;

        // A completed variant short-circuits the whole pipeline.
        if let Ok(Some(output)) = self.store.get_variant(&session.variant_hash).await {
            if !output.is_empty() {
                session.output_path = output;
                session.state = SessionState::Completed;
                session.download_progress = 100;
                session.conversion_progress = 100;
                self.persist(&session).await;
                return Ok(ConvertAccepted {
                    session_id: session.id,
                    state: SessionState::Completed,
                    queue_position: 0,
                    source_ready: true,
                });
            }
        }

        let mut source_ready = !session.source_path.is_empty();
        if !source_ready {
            if let Ok(Some(asset)) = self.store.get_asset(&session.asset_hash).await {
                if asset.state == AssetState::Downloaded && !asset.source_path.is_empty() {
                    session.source_path = asset.source_path;
                    source_ready = true;
                }
            }
        }

        let mut job = Job::new(JobKind::Convert, &session.id, priority_for_api_key(api_key));
        job.quality = quality.to_string();
        job.start = start.to_string();
        job.end = end.to_string();
        job.api_key = api_key.to_string();
        if !self.convert_queue.enqueue(job) {
            return Err(OrchestratorError::QueueFull);
        }

        session.state = if source_ready {
            SessionState::Converting
        } else {
            SessionState::Queued
        };
        self.persist(&session).await;

        let queue_position = self
            .convert_queue
            .position_for_session(JobKind::Convert, &session.id);
        Ok(ConvertAccepted {
            session_id: session.id,
            state: session.state,
            queue_position,
            source_ready,
        })
    }

    /// Current state, progress and (when ready) the download URL.
    pub async fn status(&self, session_id: &str) -> Result<StatusView, OrchestratorError> {
        let session = self.get_session(session_id).await?;
        let download_url = (session.state == SessionState::Completed
            && !session.output_path.is_empty())
        .then(|| format!("/download/{}.mp3", session.id));
        let queue_position = (session.state == SessionState::Queued).then(|| {
            self.convert_queue
                .position_for_session(JobKind::Convert, &session.id)
        });
        Ok(StatusView {
            session,
            download_url,
            queue_position,
        })
    }

    /// Remove a session and best-effort remove its files. In-flight jobs for
    /// the session run to completion.
    pub async fn delete(&self, session_id: &str) -> Result<(), OrchestratorError> {
        let session = self.store.get_session(session_id).await.ok();
        if let Err(e) = self.store.delete_session(session_id).await {
            warn!(session_id, error = %e, "failed to delete session record");
        }
        if let Some(session) = session {
            if !session.output_path.is_empty() {
                let _ = tokio::fs::remove_file(&session.output_path).await;
            }
            if !session.source_path.is_empty() {
                let _ = tokio::fs::remove_file(&session.source_path).await;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Job handlers
    // ------------------------------------------------------------------

    async fn handle_download(&self, mut job: Job) {
        let Ok(mut session) = self.store.get_session(&job.session_id).await else {
            return;
        };
        let _active = ActiveJob::begin();

        session.state = SessionState::Downloading;
        self.persist(&session).await;

        if session.asset_hash.is_empty() {
            session.asset_hash = urls::hash_string(&urls::canonical_video_id(&session.url));
        }
        let output = self
            .config
            .storage
            .streams_dir()
            .join(format!("{}.source", session.asset_hash));

        let started = Instant::now();
        let (progress_tx, progress_writer) =
            self.spawn_progress_writer(&session, JobKind::Download);
        let result = self
            .fetcher
            .download(&session.url, &output, progress_tx)
            .await;
        let _ = progress_writer.await;

        match result {
            Ok(()) => {
                metrics::DOWNLOADS_COMPLETED.inc();
                metrics::DOWNLOAD_DURATION.observe(started.elapsed().as_secs_f64());
                session.source_path = output.to_string_lossy().into_owned();
                session.state = SessionState::Downloaded;
                session.download_progress = 100;
                self.persist(&session).await;
                if let Err(e) = self
                    .store
                    .set_asset(
                        &session.asset_hash,
                        &session.source_path,
                        AssetState::Downloaded,
                    )
                    .await
                {
                    warn!(error = %e, "failed to record downloaded asset");
                }
            }
            Err(e) => {
                job.attempts += 1;
                if job.attempts < self.config.queue.max_job_retries {
                    warn!(
                        session_id = %session.id,
                        attempt = job.attempts,
                        error = %e,
                        "download failed, retrying"
                    );
                    metrics::JOB_RETRIES.with_label_values(&["download"]).inc();
                    let delay = backoff_for(job.attempts);
                    self.requeue_after(Arc::clone(&self.download_queue), job, delay);
                } else {
                    error!(session_id = %session.id, error = %e, "download failed permanently");
                    session.state = SessionState::Failed;
                    session.error = e.to_string();
                    self.persist(&session).await;
                    // A failed asset entry lets the next session retry the
                    // download instead of waiting on a corpse.
                    if let Err(e) = self
                        .store
                        .set_asset(&session.asset_hash, "", AssetState::Failed)
                        .await
                    {
                        warn!(error = %e, "failed to record failed asset");
                    }
                    metrics::DOWNLOADS_FAILED.inc();
                }
            }
        }
    }

    async fn handle_convert(&self, mut job: Job) {
        let Ok(mut session) = self.store.get_session(&job.session_id).await else {
            return;
        };
        let _active = ActiveJob::begin();

        if session.asset_hash.is_empty() {
            session.asset_hash = urls::hash_string(&urls::canonical_video_id(&session.url));
        }
        // Hydrate the source from the shared asset cache so sessions for an
        // already-downloaded URL convert immediately.
        if session.source_path.is_empty() {
            if let Ok(Some(asset)) = self.store.get_asset(&session.asset_hash).await {
                if asset.state == AssetState::Downloaded && !asset.source_path.is_empty() {
                    session.source_path = asset.source_path;
                    session.state = SessionState::Downloaded;
                    session.download_progress = 100;
                    self.persist(&session).await;
                }
            }
        }

        // Source still downloading: bounce the job without touching the
        // session, so newer fields written by the download worker survive.
        if session.source_path.is_empty()
            || matches!(
                session.state,
                SessionState::Downloading | SessionState::Preparing | SessionState::Created
            )
        {
            metrics::CONVERT_REQUEUES.inc();
            self.requeue_after(Arc::clone(&self.convert_queue), job, SOURCE_WAIT_DELAY);
            return;
        }

        session.state = SessionState::Converting;
        self.persist(&session).await;

        if session.variant_hash.is_empty() {
            session.variant_hash =
                variant_hash(&session.asset_hash, &job.quality, &job.start, &job.end);
        }
        let output = self
            .config
            .storage
            .outputs_dir()
            .join(format!("{}.mp3", session.variant_hash));

        let started = Instant::now();
        let (progress_tx, progress_writer) = self.spawn_progress_writer(&session, JobKind::Convert);
        let request = TranscodeRequest {
            input_path: session.source_path.clone(),
            output_path: output.to_string_lossy().into_owned(),
            quality: job.quality.clone(),
            start: job.start.clone(),
            end: job.end.clone(),
            duration_seconds: session.meta.duration,
        };
        let result = self.transcoder.convert(request, progress_tx).await;
        let _ = progress_writer.await;

        match result {
            Ok(()) => {
                metrics::CONVERSIONS_TOTAL
                    .with_label_values(&["success"])
                    .inc();
                metrics::CONVERSION_DURATION.observe(started.elapsed().as_secs_f64());
                session.output_path = output.to_string_lossy().into_owned();
                session.conversion_progress = 100;
                session.state = SessionState::Completed;
                self.persist(&session).await;
                if let Err(e) = self
                    .store
                    .set_variant(&session.variant_hash, &session.output_path)
                    .await
                {
                    warn!(error = %e, "failed to record variant");
                }
            }
            Err(e) => {
                job.attempts += 1;
                if job.attempts < self.config.queue.max_job_retries {
                    warn!(
                        session_id = %session.id,
                        attempt = job.attempts,
                        error = %e,
                        "transcode failed, retrying"
                    );
                    metrics::JOB_RETRIES.with_label_values(&["convert"]).inc();
                    let delay = backoff_for(job.attempts);
                    self.requeue_after(Arc::clone(&self.convert_queue), job, delay);
                } else {
                    error!(session_id = %session.id, error = %e, "transcode failed permanently");
                    session.state = SessionState::Failed;
                    session.error = e.to_string();
                    self.persist(&session).await;
                    metrics::CONVERSIONS_TOTAL
                        .with_label_values(&["failed"])
                        .inc();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Forward progress percentages into the session record. The consumer
    /// owns its own snapshot; only the progress field advances.
    fn spawn_progress_writer(
        &self,
        session: &ConversionSession,
        stage: JobKind,
    ) -> (mpsc::Sender<u8>, tokio::task::JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<u8>(32);
        let store = Arc::clone(&self.store);
        let mut snapshot = session.clone();
        let handle = tokio::spawn(async move {
            while let Some(pct) = rx.recv().await {
                match stage {
                    JobKind::Download => snapshot.download_progress = pct,
                    JobKind::Convert => snapshot.conversion_progress = pct,
                }
                if let Err(e) = store.update_session(&snapshot).await {
                    warn!(session_id = %snapshot.id, error = %e, "progress update failed");
                }
            }
        });
        (tx, handle)
    }

    fn requeue_after(&self, queue: Arc<JobQueue>, job: Job, delay: Duration) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !queue.enqueue(job) {
                warn!("queue full while re-enqueuing job");
            }
        });
    }

    async fn persist(&self, session: &ConversionSession) {
        if let Err(e) = self.store.update_session(session).await {
            warn!(session_id = %session.id, error = %e, "session update failed");
        }
    }

    async fn get_session(&self, id: &str) -> Result<ConversionSession, OrchestratorError> {
        self.store.get_session(id).await.map_err(|e| match e {
            StoreError::NotFound(id) => OrchestratorError::SessionNotFound(id),
            other => OrchestratorError::Store(other),
        })
    }

    fn lock_pools(&self) -> std::sync::MutexGuard<'_, Vec<WorkerPool>> {
        self.pools
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Exact variant fingerprint layout, empty strings included, so equal
/// request tuples always share a cache slot.
fn variant_hash(asset_hash: &str, quality: &str, start: &str, end: &str) -> String {
    urls::hash_string(&format!("{asset_hash}|{quality}|{start}|{end}"))
}

/// Premium key prefixes jump the convert queue.
fn priority_for_api_key(api_key: &str) -> i32 {
    let key = api_key.to_ascii_lowercase();
    if key.starts_with("premium") || key.starts_with("pro") || key.starts_with("vip") {
        CONVERT_PRIORITY_PREMIUM
    } else {
        CONVERT_PRIORITY
    }
}

/// Exponential backoff capped at one minute.
fn backoff_for(attempt: u32) -> Duration {
    Duration::from_secs((1u64 << attempt.min(6)).min(60))
}

/// RAII guard for the active-jobs gauge.
struct ActiveJob;

impl ActiveJob {
    fn begin() -> Self {
        metrics::JOBS_ACTIVE.inc();
        ActiveJob
    }
}

impl Drop for ActiveJob {
    fn drop(&mut self) {
        metrics::JOBS_ACTIVE.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        assert_eq!(backoff_for(1), Duration::from_secs(2));
        assert_eq!(backoff_for(2), Duration::from_secs(4));
        assert_eq!(backoff_for(3), Duration::from_secs(8));
        assert_eq!(backoff_for(6), Duration::from_secs(60));
        assert_eq!(backoff_for(20), Duration::from_secs(60));
    }

    #[test]
    fn test_priority_mapping() {
        assert_eq!(priority_for_api_key("premium-123"), 50);
        assert_eq!(priority_for_api_key("PRO-abc"), 50);
        assert_eq!(priority_for_api_key("vip"), 50);
        assert_eq!(priority_for_api_key("basic-key"), 5);
        assert_eq!(priority_for_api_key(""), 5);
    }

    #[test]
    fn test_variant_hash_includes_empty_fields() {
        let with_empty = variant_hash("asset", "128", "", "");
        assert_eq!(with_empty, urls::hash_string("asset|128||"));
        assert_ne!(with_empty, variant_hash("asset", "128", "00:00:01", ""));
        assert_eq!(
            variant_hash("asset", "128", "a", "b"),
            variant_hash("asset", "128", "a", "b")
        );
    }
}
