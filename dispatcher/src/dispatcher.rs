//! Job dispatcher – turns a recording request into a pool job and answers
//! immediately.
//!
//! Everything that can fail synchronously (URL construction, mandatory
//! structural naming, a full bounded queue) is decided before the job is
//! queued and reported in the acknowledgment.  Once queued, the job's fate
//! is only visible through the forwarded upload request and the logs.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use camrec_common::config::Config;
use camrec_common::endpoint::{connection_url, redact};
use camrec_common::error::{NamingError, UrlError};
use camrec_common::naming::{opaque_name, reported_name, NamingStrategy};
use camrec_common::protocol::{Acknowledgment, MessageHeader, RecordingRequest};

use crate::forwarder::{forward, UploadSink};
use crate::pool::{PoolError, WorkerPool};
use crate::recorder::Recorder;

/// Reasons a request is rejected before it reaches a worker.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid endpoint: {0}")]
    Url(#[from] UrlError),

    #[error("cannot name artifact: {0}")]
    Naming(#[from] NamingError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Naming and placement of artifacts.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub tmp_dir: PathBuf,
    pub extension: String,
    pub naming: NamingStrategy,
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tmp_dir: config.tmp_dir.clone(),
            extension: config.artifact_ext.clone(),
            naming: config.naming,
        }
    }
}

/// Everything a worker needs for one recording.
#[derive(Debug, Clone)]
pub struct RecordingJob {
    pub url: String,
    pub local_path: PathBuf,
    /// Identifier reported to the upload collaborator.
    pub artifact_path: String,
    pub header: MessageHeader,
}

impl RecordingJob {
    /// Record, then forward the outcome.  Runs on a pool worker.
    fn run(self, recorder: &dyn Recorder, sink: &dyn UploadSink) {
        debug!(
            "Recording {} → {}",
            redact(&self.url),
            self.local_path.display()
        );
        let outcome = recorder.record(&self.url, &self.local_path);
        forward(sink, outcome, &self.artifact_path, &self.header);
    }
}

pub struct Dispatcher {
    pool: Arc<WorkerPool>,
    recorder: Arc<dyn Recorder>,
    sink: Arc<dyn UploadSink>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        pool: Arc<WorkerPool>,
        recorder: Arc<dyn Recorder>,
        sink: Arc<dyn UploadSink>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            pool,
            recorder,
            sink,
            settings,
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Accept a request and schedule it.  Returns as soon as the job is
    /// queued; `success` says nothing about the recording itself.
    pub fn submit(&self, request: RecordingRequest) -> Acknowledgment {
        match self.dispatch(&request) {
            Ok(artifact_path) => {
                info!(
                    "Accepted {} as {artifact_path} ({} pending)",
                    request.header.entity_path,
                    self.pool.pending()
                );
                Acknowledgment::accepted(&request.header)
            }
            Err(e) => {
                warn!("Rejected {}: {e}", request.header.entity_path);
                Acknowledgment::rejected(&request.header, e)
            }
        }
    }

    fn dispatch(&self, request: &RecordingRequest) -> Result<String, DispatchError> {
        let job = self.prepare(request)?;
        let artifact_path = job.artifact_path.clone();
        let recorder = self.recorder.clone();
        let sink = self.sink.clone();
        self.pool
            .execute(move || job.run(recorder.as_ref(), sink.as_ref()))?;
        Ok(artifact_path)
    }

    /// Build the URL and both names.
    pub fn prepare(&self, request: &RecordingRequest) -> Result<RecordingJob, DispatchError> {
        let url = connection_url(&request.endpoint, &request.credentials)?;
        let local_name = opaque_name(&self.settings.extension);
        let artifact_path = reported_name(
            self.settings.naming,
            &url,
            &self.settings.extension,
            &local_name,
        )?;
        Ok(RecordingJob {
            url,
            local_path: self.settings.tmp_dir.join(local_name),
            artifact_path,
            header: request.header.clone(),
        })
    }
}

// ─── tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Mutex};
    use std::time::{Duration, Instant};

    use camrec_common::endpoint::{Credentials, EndpointDescriptor};
    use camrec_common::protocol::UploadRequest;
    use indexmap::IndexMap;

    use crate::forwarder::ForwardError;
    use crate::recorder::RecordingOutcome;

    /// Sleeps for `delay`, fails for hosts starting with `bad`, and tracks
    /// how many recordings overlap.
    struct DelayRecorder {
        delay: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
        urls: Mutex<Vec<String>>,
    }

    impl DelayRecorder {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                urls: Mutex::new(Vec::new()),
            })
        }
    }

    impl Recorder for DelayRecorder {
        fn record(&self, url: &str, output: &Path) -> RecordingOutcome {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.urls.lock().unwrap().push(url.to_string());
            std::thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);

            if url.contains("://bad") {
                RecordingOutcome::Failure {
                    reason: "exited with exit status: 1".into(),
                }
            } else {
                RecordingOutcome::Success {
                    data: output.to_string_lossy().into_owned().into_bytes(),
                }
            }
        }
    }

    struct ChannelSink(Mutex<mpsc::Sender<UploadRequest>>);

    impl UploadSink for ChannelSink {
        fn send(&self, request: UploadRequest) -> Result<(), ForwardError> {
            let _ = self.0.lock().unwrap().send(request);
            Ok(())
        }
    }

    fn dispatcher(
        workers: usize,
        capacity: Option<usize>,
        recorder: Arc<DelayRecorder>,
        naming: NamingStrategy,
    ) -> (Dispatcher, mpsc::Receiver<UploadRequest>) {
        let (tx, rx) = mpsc::channel();
        let pool = Arc::new(WorkerPool::new(workers, capacity).unwrap());
        let settings = DispatchSettings {
            tmp_dir: PathBuf::from("/tmp/camrec-test"),
            extension: "mp4".into(),
            naming,
        };
        let d = Dispatcher::new(
            pool,
            recorder,
            Arc::new(ChannelSink(Mutex::new(tx))),
            settings,
        );
        (d, rx)
    }

    fn request(host: &str, path: &str, query: &[(&str, &str)]) -> RecordingRequest {
        RecordingRequest {
            header: MessageHeader::new(format!("client/{host}")),
            endpoint: EndpointDescriptor {
                protocol: "rtsp".into(),
                host: host.into(),
                port: Some(554),
                path: path.into(),
                query: query
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<IndexMap<_, _>>(),
            },
            credentials: Credentials::None,
        }
    }

    fn collect(rx: &mpsc::Receiver<UploadRequest>, n: usize) -> Vec<UploadRequest> {
        (0..n)
            .map(|_| rx.recv_timeout(Duration::from_secs(10)).unwrap())
            .collect()
    }

    #[test]
    fn test_concurrency_never_exceeds_pool_size() {
        let rec = DelayRecorder::new(Duration::from_millis(100));
        let (d, rx) = dispatcher(2, None, rec.clone(), NamingStrategy::Opaque);

        let m = 7;
        for i in 0..m {
            let ack = d.submit(request(&format!("cam{i}.local"), "s", &[]));
            assert!(ack.success);
        }

        let uploads = collect(&rx, m);
        assert_eq!(rec.peak.load(Ordering::SeqCst), 2);
        let ids: HashSet<&str> = uploads.iter().map(|u| u.path.as_str()).collect();
        assert_eq!(ids.len(), m);
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_submit_returns_before_recording_finishes() {
        let rec = DelayRecorder::new(Duration::from_millis(500));
        let (d, rx) = dispatcher(1, None, rec, NamingStrategy::Opaque);

        let started = Instant::now();
        let ack = d.submit(request("cam.local", "s", &[]));
        let elapsed = started.elapsed();

        assert!(ack.success);
        assert_eq!(ack.header.entity_path, "client/cam.local/response");
        assert!(elapsed < Duration::from_millis(250), "{elapsed:?}");
        assert!(rx.try_recv().is_err());
        assert_eq!(collect(&rx, 1).len(), 1);
    }

    #[test]
    fn test_failure_does_not_affect_other_jobs() {
        let rec = DelayRecorder::new(Duration::from_millis(20));
        let (d, rx) = dispatcher(2, None, rec, NamingStrategy::Opaque);

        for host in ["cam1.local", "bad.local", "cam2.local", "cam3.local"] {
            assert!(d.submit(request(host, "s", &[])).success);
        }

        let uploads = collect(&rx, 4);
        let failed: Vec<_> = uploads.iter().filter(|u| u.is_failure()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].header.entity_path, "client/bad.local/upload");
        assert_eq!(uploads.iter().filter(|u| !u.is_failure()).count(), 3);
    }

    #[test]
    fn test_end_to_end_with_credentials() {
        let rec = DelayRecorder::new(Duration::ZERO);
        let (d, rx) = dispatcher(1, None, rec.clone(), NamingStrategy::Structural);

        let mut req = request("cam.local", "stream1", &[]);
        req.credentials = Credentials::Basic {
            username: "u".into(),
            password: "p".into(),
        };
        assert!(d.submit(req).success);

        let upload = collect(&rx, 1).remove(0);
        assert!(!upload.data.is_empty());
        assert!(upload.path.ends_with(".mp4"));
        assert_eq!(upload.header.entity_path, "client/cam.local/upload");
        assert_eq!(
            rec.urls.lock().unwrap().as_slice(),
            ["rtsp://u:p@cam.local:554/stream1"]
        );
    }

    #[test]
    fn test_structural_identifier_reported() {
        let rec = DelayRecorder::new(Duration::ZERO);
        let (d, rx) = dispatcher(1, None, rec, NamingStrategy::Structural);

        let req = request(
            "nvr.local",
            "/Streaming/tracks/TRACK42",
            &[("starttime", "100"), ("endtime", "200")],
        );
        let job = d.prepare(&req).unwrap();
        assert_eq!(job.artifact_path, "TRACK42/100_200.mp4");
        assert!(job.local_path.starts_with("/tmp/camrec-test"));
        assert_ne!(job.local_path, Path::new("/tmp/camrec-test/TRACK42/100_200.mp4"));

        assert!(d.submit(req).success);
        let upload = collect(&rx, 1).remove(0);
        assert_eq!(upload.path, "TRACK42/100_200.mp4");
        // Local path is opaque.
        let local = String::from_utf8(upload.data).unwrap();
        assert!(!local.contains("TRACK42"));
    }

    #[test]
    fn test_rejections_are_synchronous() {
        let rec = DelayRecorder::new(Duration::ZERO);
        let (d, rx) = dispatcher(1, None, rec.clone(), NamingStrategy::StructuralRequired);

        let ack = d.submit(request("", "s", &[]));
        assert!(!ack.success);
        assert!(ack.error.unwrap().contains("host is empty"));

        let ack = d.submit(request(
            "nvr.local",
            "/Streaming/tracks/101",
            &[("starttime", "100")],
        ));
        assert!(!ack.success);
        assert!(ack.error.unwrap().contains("endtime"));

        let ack = d.submit(request(
            "nvr.local",
            "/Streaming/tracks/101",
            &[("starttime", "../../../etc/passwd"), ("endtime", "200")],
        ));
        assert!(!ack.success);
        assert!(ack.error.unwrap().contains("starttime"));

        let ack = d.submit(request(
            "nvr.local",
            "/Streaming/tracks/101",
            &[("starttime", "1\r\nX-Evil: 1"), ("endtime", "200")],
        ));
        assert!(!ack.success);

        let ack = d.submit(request("nvr.local", "/live?x=1", &[]));
        assert!(!ack.success);
        assert!(ack.error.unwrap().contains("invalid path"));

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert!(rec.urls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_bounded_queue_rejects_when_full() {
        let rec = DelayRecorder::new(Duration::from_millis(300));
        let (d, rx) = dispatcher(1, Some(1), rec, NamingStrategy::Opaque);

        assert!(d.submit(request("cam1.local", "s", &[])).success);
        assert!(d.submit(request("cam2.local", "s", &[])).success);
        let ack = d.submit(request("cam3.local", "s", &[]));
        assert!(!ack.success);
        assert!(ack.error.unwrap().contains("queue full"));

        assert_eq!(collect(&rx, 2).len(), 2);
    }

    #[test]
    fn test_unbounded_queue_accepts_everything() {
        let rec = DelayRecorder::new(Duration::from_millis(5));
        let (d, rx) = dispatcher(1, None, rec, NamingStrategy::Opaque);
        for i in 0..20 {
            assert!(d.submit(request(&format!("cam{i}.local"), "s", &[])).success);
        }
        assert_eq!(collect(&rx, 20).len(), 20);
    }
}
