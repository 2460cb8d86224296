use rand::Rng;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::artifacts::cleanup_old_screenshots;
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::http::FetcherFactory;
use crate::merge::merge;
use crate::probe::Prober;
use crate::progress::ProgressStore;
use crate::renderer::RenderEngineFactory;
use crate::sink::ResultSink;
use crate::targets::dedup_hosts;
use crate::throughput::Throughput;
use crate::types::{HostTarget, Protocol, RunSummary};

/// How one host ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostStatus {
    /// Written to every output and marked complete.
    Completed,
    /// Probed, but the record could not be persisted; not marked complete.
    Failed,
    /// Stopped before a full record existed; nothing written.
    Abandoned,
}

struct Tally {
    completed: u64,
    failed: u64,
    throughput: Throughput,
}

struct Shared {
    config: Arc<ScanConfig>,
    engines: Arc<dyn RenderEngineFactory>,
    fetchers: Arc<dyn FetcherFactory>,
    sink: Arc<ResultSink>,
    progress: Arc<ProgressStore>,
}

/// Drives the worker pool over a host list.
///
/// - Hosts already in the progress store are skipped.
/// - Each worker owns one rendering engine and one HTTP client for its lifetime.
/// - A host is marked complete only after its record reached every output.
/// - Cancelling the token stops dispatch; in-flight hosts get `shutdown_grace` to finish.
#[derive(Clone)]
pub struct Scanner {
    shared: Arc<Shared>,
}

impl Scanner {
    pub fn new(
        config: ScanConfig,
        engines: Arc<dyn RenderEngineFactory>,
        fetchers: Arc<dyn FetcherFactory>,
        sink: Arc<ResultSink>,
        progress: Arc<ProgressStore>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config: Arc::new(config),
                engines,
                fetchers,
                sink,
                progress,
            }),
        }
    }

    pub async fn run(
        &self,
        hosts: Vec<HostTarget>,
        cancel: CancellationToken,
    ) -> Result<RunSummary, ScanError> {
        let started = Instant::now();
        let shared = &self.shared;
        let cfg = &shared.config;

        let unique = dedup_hosts(hosts);
        let work = pending_hosts(&unique, &shared.progress.completed());
        let mut summary = RunSummary {
            unique_hosts: unique.len() as u64,
            skipped: (unique.len() - work.len()) as u64,
            scheduled: work.len() as u64,
            ..Default::default()
        };
        tracing::info!(
            unique = summary.unique_hosts,
            skipped = summary.skipped,
            scheduled = summary.scheduled,
            "work list ready"
        );

        if cfg.screenshots.enabled && cfg.screenshots.retention_days > 0 {
            let dir = cfg.screenshots.dir.clone();
            let days = cfg.screenshots.retention_days;
            let token = cancel.clone();
            match tokio::task::spawn_blocking(move || cleanup_old_screenshots(&dir, days, &token))
                .await
            {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!("screenshot cleanup failed: {e:#}"),
                Err(e) => tracing::warn!("screenshot cleanup task failed: {e}"),
            }
        }

        if work.is_empty() {
            tracing::info!("nothing to do");
            summary.elapsed_seconds = started.elapsed().as_secs_f64();
            return Ok(summary);
        }

        let tally = Arc::new(Mutex::new(Tally {
            completed: 0,
            failed: 0,
            throughput: Throughput::new(summary.scheduled, cfg.progress_interval),
        }));
        // Cancelled by the caller's token or by a fatal setup failure in any worker.
        let abort = cancel.child_token();
        let workers = cfg.concurrency.clamp(1, work.len());

        let outcome = if workers == 1 {
            run_sequential(shared.clone(), work, tally.clone(), abort).await
        } else {
            run_pool(shared.clone(), workers, work, tally.clone(), abort).await
        };

        let t = tally.lock().unwrap_or_else(PoisonError::into_inner);
        summary.completed = t.completed;
        summary.failed = t.failed;
        summary.interrupted = cancel.is_cancelled();
        summary.elapsed_seconds = started.elapsed().as_secs_f64();
        drop(t);
        outcome?;

        log_summary(&summary);
        Ok(summary)
    }
}

async fn run_sequential(
    shared: Arc<Shared>,
    work: Vec<HostTarget>,
    tally: Arc<Mutex<Tally>>,
    abort: CancellationToken,
) -> Result<(), ScanError> {
    let mut prober = launch_prober(&shared, 0).await?;
    for host in work {
        if abort.is_cancelled() {
            tracing::warn!("stop requested, not starting further hosts");
            break;
        }
        let status = process_host(&shared, &mut prober, &host, &abort).await;
        count(&tally, status);
    }
    prober.close().await;
    Ok(())
}

async fn run_pool(
    shared: Arc<Shared>,
    workers: usize,
    work: Vec<HostTarget>,
    tally: Arc<Mutex<Tally>>,
    abort: CancellationToken,
) -> Result<(), ScanError> {
    let (tx, rx) = mpsc::channel::<HostTarget>(workers);
    let rx = Arc::new(AsyncMutex::new(rx));
    let mut set = JoinSet::new();

    for id in 0..workers {
        let shared = shared.clone();
        let rx = rx.clone();
        let tally = tally.clone();
        let abort = abort.clone();
        set.spawn(async move { worker(id, shared, rx, tally, abort).await });
    }

    for host in work {
        tokio::select! {
            biased;
            _ = abort.cancelled() => {
                tracing::warn!("stop requested, not dispatching further hosts");
                break;
            }
            sent = tx.send(host) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    drop(tx);

    let grace = shared.config.shutdown_grace;
    let mut deadline: Option<Instant> = None;
    let mut fatal: Option<ScanError> = None;
    loop {
        let armed = deadline;
        let grace_timer = async move {
            match armed {
                Some(d) => time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            joined = set.join_next() => match joined {
                None => break,
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => {
                    fatal.get_or_insert(e);
                }
                Some(Err(e)) if e.is_cancelled() => {}
                Some(Err(e)) => tracing::error!("worker panicked: {e}"),
            },
            _ = abort.cancelled(), if deadline.is_none() => {
                tracing::info!(grace_s = grace.as_secs_f64(), "waiting for in-flight hosts");
                deadline = Some(Instant::now() + grace);
            }
            _ = grace_timer => {
                tracing::warn!("grace period elapsed, abandoning in-flight hosts");
                set.abort_all();
                while set.join_next().await.is_some() {}
                break;
            }
        }
    }

    match fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn worker(
    id: usize,
    shared: Arc<Shared>,
    rx: Arc<AsyncMutex<mpsc::Receiver<HostTarget>>>,
    tally: Arc<Mutex<Tally>>,
    abort: CancellationToken,
) -> Result<(), ScanError> {
    let mut prober = match launch_prober(&shared, id).await {
        Ok(p) => p,
        Err(e) => {
            abort.cancel();
            return Err(e);
        }
    };
    loop {
        let next = {
            let mut queue = rx.lock().await;
            tokio::select! {
                biased;
                _ = abort.cancelled() => None,
                host = queue.recv() => host,
            }
        };
        let Some(host) = next else { break };
        let status = process_host(&shared, &mut prober, &host, &abort).await;
        count(&tally, status);
    }
    prober.close().await;
    tracing::debug!(worker = id, "worker finished");
    Ok(())
}

/// Start a worker's engine and client. Failure here is fatal for the run.
async fn launch_prober(shared: &Shared, id: usize) -> Result<Prober, ScanError> {
    let engine = shared.engines.launch().await.map_err(|e| {
        tracing::error!(worker = id, "could not start rendering engine: {e:#}");
        ScanError::RendererUnavailable(format!("{e:#}"))
    })?;
    let fetcher = match shared.fetchers.build() {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(worker = id, "could not build HTTP client: {e:#}");
            if let Err(close_err) = engine.close().await {
                tracing::debug!("engine close failed: {close_err:#}");
            }
            return Err(ScanError::ClientUnavailable(format!("{e:#}")));
        }
    };
    tracing::debug!(worker = id, "worker ready");
    Ok(Prober::new(id, engine, fetcher, shared.config.clone()))
}

async fn process_host(
    shared: &Shared,
    prober: &mut Prober,
    host: &str,
    abort: &CancellationToken,
) -> HostStatus {
    let delay = jitter(shared.config.jitter);
    if !delay.is_zero() {
        tokio::select! {
            _ = abort.cancelled() => return HostStatus::Abandoned,
            _ = time::sleep(delay) => {}
        }
    }

    let plain = prober.probe(host, Protocol::Plain).await;
    if abort.is_cancelled() {
        tracing::info!(host, "stop requested mid-host; it will be retried on resume");
        return HostStatus::Abandoned;
    }
    let encrypted = prober.probe(host, Protocol::Encrypted).await;
    let record = merge(host, plain, encrypted);
    tracing::info!(
        host,
        classification = %record.chosen_classification,
        https = record.encrypted_loaded(),
        http = record.plain_loaded(),
        "host scanned"
    );

    let sink = shared.sink.clone();
    let progress = shared.progress.clone();
    let persisted = tokio::task::spawn_blocking(move || -> Result<bool, ScanError> {
        sink.append(&record)?;
        progress.mark_complete(&record.host).map_err(|e| ScanError::Sink {
            host: record.host.clone(),
            details: format!("progress file: {e:#}"),
        })
    })
    .await;

    match persisted {
        Ok(Ok(true)) => HostStatus::Completed,
        Ok(Ok(false)) => {
            tracing::warn!(host, "host was already marked complete");
            HostStatus::Completed
        }
        Ok(Err(e)) => {
            tracing::error!(host, "{e}");
            HostStatus::Failed
        }
        Err(e) => {
            tracing::error!(host, "persist task failed: {e}");
            HostStatus::Failed
        }
    }
}

fn count(tally: &Mutex<Tally>, status: HostStatus) {
    let mut t = tally.lock().unwrap_or_else(PoisonError::into_inner);
    match status {
        HostStatus::Completed => t.completed += 1,
        HostStatus::Failed => t.failed += 1,
        HostStatus::Abandoned => return,
    }
    t.throughput.record();
}

/// Uniform delay in `(0, max]`; zero when `max` is zero.
fn jitter(max: Duration) -> Duration {
    let max_s = max.as_secs_f64();
    if max_s <= 0.0 {
        return Duration::ZERO;
    }
    let offset: f64 = rand::thread_rng().gen_range(0.0..max_s);
    Duration::from_secs_f64(max_s - offset)
}

fn log_summary(s: &RunSummary) {
    let finished = s.completed + s.failed;
    let avg = if finished > 0 {
        s.elapsed_seconds / finished as f64
    } else {
        0.0
    };
    tracing::info!(
        processed = finished,
        total = s.scheduled,
        completed = s.completed,
        failed = s.failed,
        skipped = s.skipped,
        elapsed_s = %format!("{:.1}", s.elapsed_seconds),
        avg_s_per_host = %format!("{avg:.2}"),
        "scan finished"
    );
    if s.interrupted {
        tracing::warn!(remaining = s.remaining(), "scan interrupted; rerun with --resume to continue");
    }
}

/// Hosts in `hosts` not yet in `done`, in input order.
pub fn pending_hosts(hosts: &[HostTarget], done: &HashSet<HostTarget>) -> Vec<HostTarget> {
    hosts.iter().filter(|h| !done.contains(*h)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_in_range() {
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
        for _ in 0..100 {
            let d = jitter(Duration::from_millis(200));
            assert!(d > Duration::ZERO && d <= Duration::from_millis(200));
        }
    }

    #[test]
    fn pending_preserves_order() {
        let hosts: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let done: HashSet<String> = ["b".to_string()].into_iter().collect();
        assert_eq!(pending_hosts(&hosts, &done), vec!["a", "c"]);
    }
}
