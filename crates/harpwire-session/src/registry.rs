//! One shared replay run per capture file.
//!
//! The first subscriber to a file starts a run, later subscribers join it, and
//! the last one to detach stops it. A fresh subscriber after that gets a new
//! run that starts again from the beginning of the file. Runs against the same
//! file are serialized by a per-path lock, so at most one reader is ever active.
//!
//! Every subscriber has its own bounded queue. A full queue holds the run back
//! until that subscriber catches up, so no subscriber ever misses an event.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::replay::CaptureReplay;
use crate::sink::{FrameSink, SessionEvent};

/// Reference-counted registry of capture replays.
///
/// Cloning is cheap; clones share the same set of runs.
#[derive(Clone)]
pub struct ReplayRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    runs: Mutex<HashMap<PathBuf, Run>>,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
    next_id: AtomicU64,
}

struct Run {
    id: u64,
    subscribers: HashMap<u64, mpsc::Sender<SessionEvent>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ReplayRegistry {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                runs: Mutex::new(HashMap::new()),
                locks: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Subscribe to the replay of `path`, starting a run if none is active.
    ///
    /// Joining an active run delivers events from that point on. Must be
    /// called from within a Tokio runtime.
    pub fn attach(&self, path: impl AsRef<Path>) -> Subscription {
        let key = resource_key(path.as_ref());
        let (sender, receiver) = mpsc::channel(self.inner.config.replay_channel_capacity.max(1));
        let sub_id = self.inner.next_id();
        let mut runs = lock(&self.inner.runs);

        if let Some(run) = runs.get_mut(&key) {
            run.subscribers.insert(sub_id, sender);
            debug!(path = ?key, run = run.id, subscribers = run.subscribers.len(), "joined replay");
            return Subscription::new(self.clone(), key, run.id, sub_id, receiver);
        }

        let id = self.inner.next_id();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_replay(
            Arc::clone(&self.inner),
            key.clone(),
            id,
            cancel.clone(),
        ));

        info!(path = ?key, run = id, "starting replay");
        runs.insert(
            key.clone(),
            Run {
                id,
                subscribers: HashMap::from([(sub_id, sender)]),
                cancel,
                task,
            },
        );
        Subscription::new(self.clone(), key, id, sub_id, receiver)
    }

    /// Number of subscribers on the active run for `path`.
    pub fn subscriber_count(&self, path: impl AsRef<Path>) -> usize {
        let key = resource_key(path.as_ref());
        lock(&self.inner.runs)
            .get(&key)
            .map_or(0, |run| run.subscribers.len())
    }

    /// True while a run for `path` is registered.
    pub fn is_running(&self, path: impl AsRef<Path>) -> bool {
        let key = resource_key(path.as_ref());
        lock(&self.inner.runs).contains_key(&key)
    }

    /// Cancel every run and wait for the replay tasks to exit.
    ///
    /// Outstanding subscriptions see the end of their stream.
    pub async fn shutdown(&self) {
        let drained: Vec<(PathBuf, Run)> = lock(&self.inner.runs).drain().collect();
        for (path, run) in drained {
            run.cancel.cancel();
            drop(run.subscribers);
            if let Err(err) = run.task.await {
                warn!(?path, run = run.id, error = %err, "replay task did not exit cleanly");
            }
        }
    }

    fn detach(&self, key: &Path, run_id: u64, sub_id: u64) {
        let mut runs = lock(&self.inner.runs);
        let Some(run) = runs.get_mut(key) else {
            return;
        };
        if run.id != run_id {
            return;
        }

        run.subscribers.remove(&sub_id);
        debug!(path = ?key, run = run_id, subscribers = run.subscribers.len(), "left replay");
        if run.subscribers.is_empty() {
            if let Some(run) = runs.remove(key) {
                info!(path = ?key, run = run_id, "last subscriber left, stopping replay");
                run.cancel.cancel();
            }
        }
    }
}

impl Default for ReplayRegistry {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl std::fmt::Debug for ReplayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let runs = lock(&self.inner.runs);
        f.debug_struct("ReplayRegistry")
            .field("runs", &runs.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Inner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn path_lock(&self, key: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = lock(&self.locks);
        Arc::clone(locks.entry(key.to_path_buf()).or_default())
    }

    fn prune_locks(&self) {
        lock(&self.locks).retain(|_, path_lock| Arc::strong_count(path_lock) > 1);
    }

    /// Current subscribers of the run, if it is still registered.
    fn senders(&self, key: &Path, run_id: u64) -> Vec<mpsc::Sender<SessionEvent>> {
        lock(&self.runs)
            .get(key)
            .filter(|run| run.id == run_id)
            .map(|run| run.subscribers.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove the run entry if it still belongs to `run_id`, returning its subscribers.
    ///
    /// Once retired, a new `attach` starts a fresh run; everyone who joined
    /// before is in the returned set and gets the terminal event.
    fn retire(&self, key: &Path, run_id: u64) -> Vec<mpsc::Sender<SessionEvent>> {
        let mut runs = lock(&self.runs);
        if !runs.get(key).is_some_and(|run| run.id == run_id) {
            return Vec::new();
        }
        runs.remove(key)
            .map(|run| run.subscribers.into_values().collect())
            .unwrap_or_default()
    }
}

async fn run_replay(inner: Arc<Inner>, key: PathBuf, run_id: u64, cancel: CancellationToken) {
    let path_lock = inner.path_lock(&key);
    let guard = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            debug!(path = ?key, run = run_id, "replay cancelled before it started");
            return;
        }
        guard = path_lock.lock_owned() => guard,
    };

    let terminal = stream_run(&inner, &key, run_id, &cancel).await;

    drop(guard);
    inner.prune_locks();

    // The file is released before the last event goes out, so a subscriber
    // that is slow to drain it never blocks the next run.
    if let Some(event) = terminal {
        let subscribers = inner.retire(&key, run_id);
        deliver(&subscribers, &event, &cancel).await;
    }
    debug!(path = ?key, run = run_id, "replay task exiting");
}

/// Replay the capture to the run's subscribers. Returns the terminal event,
/// or `None` when the run was cancelled.
async fn stream_run(
    inner: &Inner,
    key: &Path,
    run_id: u64,
    cancel: &CancellationToken,
) -> Option<SessionEvent> {
    let mut replay = match CaptureReplay::open(key, &inner.config).await {
        Ok(replay) => replay,
        Err(err) => return Some(SessionEvent::Fault(Arc::new(err))),
    };

    info!(path = ?key, run = run_id, pace = inner.config.pace, "replaying capture");
    while let Some(event) = replay.next_event(cancel).await {
        if event.is_terminal() {
            debug!(path = ?key, run = run_id, stats = ?replay.stats(), "replay finished");
            return Some(event);
        }
        if !deliver(&inner.senders(key, run_id), &event, cancel).await {
            break;
        }
    }
    debug!(path = ?key, run = run_id, "replay cancelled");
    None
}

/// Queue `event` for every subscriber, waiting for room in full queues.
///
/// Subscribers that went away are skipped. Returns `false` if `cancel` fired.
async fn deliver(
    subscribers: &[mpsc::Sender<SessionEvent>],
    event: &SessionEvent,
    cancel: &CancellationToken,
) -> bool {
    for subscriber in subscribers {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return false,
            _ = subscriber.send(event.clone()) => {}
        }
    }
    true
}

/// A subscriber's view of a shared replay run. Dropping it detaches.
pub struct Subscription {
    registry: ReplayRegistry,
    key: PathBuf,
    run_id: u64,
    sub_id: u64,
    receiver: mpsc::Receiver<SessionEvent>,
    finished: bool,
    detached: bool,
}

impl Subscription {
    fn new(
        registry: ReplayRegistry,
        key: PathBuf,
        run_id: u64,
        sub_id: u64,
        receiver: mpsc::Receiver<SessionEvent>,
    ) -> Self {
        Self {
            registry,
            key,
            run_id,
            sub_id,
            receiver,
            finished: false,
            detached: false,
        }
    }

    /// Next event of the run, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        if self.finished {
            return None;
        }

        match self.receiver.recv().await {
            Some(event) => {
                if event.is_terminal() {
                    self.finish();
                }
                Some(event)
            }
            None => {
                self.finish();
                None
            }
        }
    }

    /// Forward every remaining event to `sink`.
    pub async fn forward_to<S: FrameSink>(&mut self, sink: &mut S) {
        while let Some(event) = self.recv().await {
            event.forward_to(sink);
        }
    }

    /// Resource key of the capture, canonicalized when possible.
    pub fn path(&self) -> &Path {
        &self.key
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self) {
        self.finished = true;
        self.receiver.close();
        self.detach();
    }

    fn detach(&mut self) {
        if !self.detached {
            self.detached = true;
            self.registry.detach(&self.key, self.run_id, self.sub_id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.key)
            .field("run_id", &self.run_id)
            .field("finished", &self.finished)
            .finish()
    }
}

fn resource_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use harpwire_frame::{Frame, Header, MessageType, PayloadType, Timestamp};

    use super::*;
    use crate::error::SessionError;

    static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

    fn write_capture(frames: &[Frame]) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "harpwire-registry-{}-{}",
            std::process::id(),
            NEXT_DIR.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("capture.bin");
        let bytes: Vec<u8> = frames.iter().flat_map(|f| f.as_bytes().to_vec()).collect();
        std::fs::write(&path, bytes).unwrap();
        (dir, path)
    }

    fn stamped(address: u8, seconds: u32) -> Frame {
        let header = Header::new(MessageType::Event, address, PayloadType::U8)
            .with_timestamp(Timestamp::new(seconds, 0));
        Frame::new(&header, &[address]).unwrap()
    }

    fn unpaced() -> SessionConfig {
        SessionConfig {
            pace: false,
            ..SessionConfig::default()
        }
    }

    async fn collect_addresses(sub: &mut Subscription) -> (Vec<u8>, bool) {
        let mut addresses = Vec::new();
        let mut completed = false;
        while let Some(event) = sub.recv().await {
            match event {
                SessionEvent::Frame(frame) => addresses.push(frame.address().unwrap()),
                SessionEvent::Completed => completed = true,
                other => panic!("unexpected event: {other:?}"),
            }
        }
        (addresses, completed)
    }

    #[tokio::test]
    async fn subscribers_share_one_run() {
        let (dir, path) = write_capture(&[stamped(1, 0), stamped(2, 0), stamped(3, 0)]);
        let registry = ReplayRegistry::new(unpaced());

        let mut first = registry.attach(&path);
        let mut second = registry.attach(&path);
        assert_eq!(first.run_id(), second.run_id());
        assert_eq!(registry.subscriber_count(&path), 2);

        let (a, a_done) = collect_addresses(&mut first).await;
        let (b, b_done) = collect_addresses(&mut second).await;
        assert_eq!(a, vec![1, 2, 3]);
        assert_eq!(a, b);
        assert!(a_done && b_done);
        assert!(!registry.is_running(&path));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn new_subscriber_after_completion_restarts_from_beginning() {
        let (dir, path) = write_capture(&[stamped(4, 0), stamped(5, 0)]);
        let registry = ReplayRegistry::new(unpaced());

        let mut first = registry.attach(&path);
        let first_run = first.run_id();
        assert_eq!(collect_addresses(&mut first).await, (vec![4, 5], true));
        drop(first);

        let mut again = registry.attach(&path);
        assert_ne!(again.run_id(), first_run);
        assert_eq!(collect_addresses(&mut again).await, (vec![4, 5], true));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn last_detach_stops_run_and_next_run_waits_for_it() {
        let (dir, path) = write_capture(&[stamped(6, 0), stamped(7, 600)]);
        let registry = ReplayRegistry::default();

        let mut sub = registry.attach(&path);
        let event = sub.recv().await.unwrap();
        assert!(matches!(event, SessionEvent::Frame(ref f) if f.address() == Some(6)));

        drop(sub);
        assert!(!registry.is_running(&path));
        assert_eq!(registry.subscriber_count(&path), 0);

        let mut fresh = registry.attach(&path);
        let event = tokio::time::timeout(Duration::from_secs(5), fresh.recv())
            .await
            .expect("fresh run should start once the old one released the file")
            .unwrap();
        assert!(matches!(event, SessionEvent::Frame(ref f) if f.address() == Some(6)));

        drop(fresh);
        registry.shutdown().await;
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_capture_faults_every_subscriber() {
        let registry = ReplayRegistry::new(unpaced());
        let path = "/nonexistent/harpwire/registry.bin";

        let mut a = registry.attach(path);
        let mut b = registry.attach(path);
        for sub in [&mut a, &mut b] {
            let event = sub.recv().await.unwrap();
            assert!(matches!(
                event,
                SessionEvent::Fault(ref e) if matches!(**e, SessionError::Transport(_))
            ));
            assert!(sub.recv().await.is_none());
            assert!(sub.is_finished());
        }
    }

    fn numbered(index: u16) -> Frame {
        let header = Header::new(MessageType::Event, (index % 256) as u8, PayloadType::U16);
        Frame::new(&header, &index.to_le_bytes()).unwrap()
    }

    async fn collect_indices(sub: &mut Subscription) -> (Vec<u16>, bool) {
        let mut indices = Vec::new();
        let mut completed = false;
        while let Some(event) = sub.recv().await {
            match event {
                SessionEvent::Frame(frame) => {
                    indices.push(u16::from_le_bytes([frame.payload()[0], frame.payload()[1]]));
                }
                SessionEvent::Completed => completed = true,
                other => panic!("unexpected event: {other:?}"),
            }
        }
        (indices, completed)
    }

    #[tokio::test]
    async fn burst_larger_than_queue_reaches_idle_subscriber_intact() {
        let frames: Vec<Frame> = (0..5_000).map(numbered).collect();
        let (dir, path) = write_capture(&frames);
        let registry = ReplayRegistry::default();

        let mut sub = registry.attach(&path);
        // Give the run every chance to outpace the subscriber.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let (indices, completed) = collect_indices(&mut sub).await;
        assert_eq!(indices, (0..5_000).collect::<Vec<u16>>());
        assert!(completed);
        assert!(!registry.is_running(&path));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn slow_and_fast_subscribers_both_see_every_frame() {
        let frames: Vec<Frame> = (0..600).map(numbered).collect();
        let (dir, path) = write_capture(&frames);
        let registry = ReplayRegistry::new(SessionConfig {
            replay_channel_capacity: 16,
            ..SessionConfig::default()
        });

        let mut fast = registry.attach(&path);
        let mut slow = registry.attach(&path);
        let slow_reader = async {
            let mut indices = Vec::new();
            while let Some(event) = slow.recv().await {
                if let SessionEvent::Frame(frame) = event {
                    indices.push(u16::from_le_bytes([frame.payload()[0], frame.payload()[1]]));
                    if indices.len() % 50 == 0 {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    }
                }
            }
            indices
        };

        let ((fast_indices, fast_done), slow_indices) =
            tokio::join!(collect_indices(&mut fast), slow_reader);

        let expected: Vec<u16> = (0..600).collect();
        assert_eq!(fast_indices, expected);
        assert!(fast_done);
        assert_eq!(slow_indices, expected);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn dropping_a_stalled_subscriber_releases_the_run() {
        let frames: Vec<Frame> = (0..200).map(numbered).collect();
        let (dir, path) = write_capture(&frames);
        let registry = ReplayRegistry::new(SessionConfig {
            replay_channel_capacity: 4,
            ..SessionConfig::default()
        });

        let stalled = registry.attach(&path);
        let mut reader = registry.attach(&path);
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(stalled);
        assert_eq!(registry.subscriber_count(&path), 1);

        let (indices, completed) = tokio::time::timeout(
            Duration::from_secs(5),
            collect_indices(&mut reader),
        )
        .await
        .expect("run should continue once the stalled subscriber is gone");
        assert_eq!(indices, (0..200).collect::<Vec<u16>>());
        assert!(completed);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn shutdown_ends_open_subscriptions() {
        let (dir, path) = write_capture(&[stamped(1, 0), stamped(2, 3_600)]);
        let registry = ReplayRegistry::default();

        let mut sub = registry.attach(&path);
        assert!(matches!(sub.recv().await, Some(SessionEvent::Frame(_))));

        registry.shutdown().await;
        assert!(!registry.is_running(&path));
        assert!(sub.recv().await.is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
