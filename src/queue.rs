//! Single-worker FIFO download queue.
//!
//! Tasks are executed strictly one at a time in submission order on a
//! dedicated task of the tokio runtime. Every task owns a cancellation token
//! (a child of the queue's shutdown token) that is checked at fixed
//! checkpoints: before metadata, before the download, on every progress
//! report and after the download returns.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{
    runtime::Handle,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span};

use crate::downloader::{FetchRequest, MediaFetcher};
use crate::error::{FetchError, SubmitError};
use crate::model::{DownloadSettings, Task, TaskEvent, TaskId, TaskStatus, TaskUpdate};
use crate::progress::{HookEvent, percent_to_fraction};

/// Highest progress reported before a task completes; 1.0 is reserved for `Completed`.
const MAX_IN_FLIGHT_PROGRESS: f32 = 0.99;

const UNKNOWN_TITLE: &str = "Unknown Title";

#[derive(Debug, Clone, Default)]
pub struct WorkerOptions {
    /// Abort a task that runs longer than this and report it as failed
    pub task_timeout: Option<Duration>,
}

#[derive(Debug, Default)]
struct Shared {
    tokens: Mutex<HashMap<TaskId, CancellationToken>>,
    current: Mutex<Option<TaskId>>,
}

impl Shared {
    fn tokens(&self) -> MutexGuard<'_, HashMap<TaskId, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> MutexGuard<'_, Option<TaskId>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle for submitting and cancelling downloads
#[derive(Debug)]
pub struct DownloadQueue {
    tx: UnboundedSender<Task>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl DownloadQueue {
    /// Spawns the worker on `runtime` and returns the queue together with
    /// the receiving end of the worker's event channel.
    pub fn start<F: MediaFetcher>(
        runtime: &Handle,
        fetcher: F,
        options: WorkerOptions,
    ) -> (Self, UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        let shutdown = CancellationToken::new();

        let worker = Worker {
            fetcher: Arc::new(fetcher),
            events: events_tx,
            shared: Arc::clone(&shared),
            shutdown: shutdown.clone(),
            options,
        };
        let handle = runtime.spawn(worker.run(rx));

        let queue = Self {
            tx,
            shared,
            shutdown,
            worker: Some(handle),
        };
        (queue, events_rx)
    }

    /// Appends a task to the queue. Never blocks.
    pub fn submit(
        &self,
        url: impl Into<String>,
        settings: DownloadSettings,
    ) -> Result<TaskId, SubmitError> {
        if self.shutdown.is_cancelled() {
            return Err(SubmitError::QueueClosed);
        }
        let task = Task {
            id: TaskId::new(),
            url: url.into(),
            settings,
        };
        let id = task.id;
        // Register before sending so a cancel right after submit always finds the token.
        self.shared
            .tokens()
            .insert(id, self.shutdown.child_token());
        if self.tx.send(task).is_err() {
            self.shared.tokens().remove(&id);
            return Err(SubmitError::QueueClosed);
        }
        info!(task = %id, "task queued");
        Ok(id)
    }

    /// Requests cancellation. Unknown and finished tasks are ignored.
    pub fn cancel(&self, id: TaskId) {
        match self.shared.tokens().get(&id) {
            Some(token) => {
                info!(task = %id, "cancellation requested");
                token.cancel();
            }
            None => debug!(task = %id, "cancel ignored, task not pending"),
        }
    }

    /// The task the worker is processing right now
    pub fn current(&self) -> Option<TaskId> {
        *self.shared.current()
    }

    /// Cancels the running task, reports queued ones as cancelled and stops
    /// the worker. Returns the worker's handle the first time, for callers
    /// that want to wait for it.
    pub fn shutdown(&mut self) -> Option<JoinHandle<()>> {
        if !self.shutdown.is_cancelled() {
            info!("shutting down download queue");
        }
        self.shutdown.cancel();
        self.worker.take()
    }
}

impl Drop for DownloadQueue {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct Worker<F> {
    fetcher: Arc<F>,
    events: UnboundedSender<TaskEvent>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    options: WorkerOptions,
}

impl<F: MediaFetcher> Worker<F> {
    async fn run(self, mut rx: UnboundedReceiver<Task>) {
        info!("download worker started");
        loop {
            let task = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = rx.recv() => match next {
                    Some(task) => task,
                    None => break,
                },
            };
            let span = info_span!("task", id = %task.id);
            self.handle(task).instrument(span).await;
        }

        // Anything still queued never runs.
        rx.close();
        while let Ok(task) = rx.try_recv() {
            self.shared.tokens().remove(&task.id);
            emit(&self.events, task.id, TaskUpdate::Status(TaskStatus::Cancelled));
        }
        info!("download worker stopped");
    }

    async fn handle(&self, task: Task) {
        let id = task.id;
        let token = self
            .shared
            .tokens()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| self.shutdown.child_token());

        if token.is_cancelled() {
            info!("skipping task cancelled before start");
            self.forget(id);
            emit(&self.events, id, TaskUpdate::Status(TaskStatus::Cancelled));
            return;
        }

        *self.shared.current() = Some(id);
        let outcome = self.execute(task, token.clone()).await;
        let terminal = match outcome {
            Ok(()) if token.is_cancelled() => TaskStatus::Cancelled,
            Ok(()) => TaskStatus::Completed,
            Err(err) if err.is_cancelled() => TaskStatus::Cancelled,
            Err(err) => {
                error!(error = %err, "download failed");
                TaskStatus::Error
            }
        };
        info!(status = ?terminal, "task finished");

        *self.shared.current() = None;
        self.forget(id);
        emit(&self.events, id, TaskUpdate::Status(terminal));
        if terminal == TaskStatus::Completed {
            emit(&self.events, id, TaskUpdate::Progress(1.0));
        }
    }

    /// Runs the task on its own tokio task so a panic cannot take the worker down.
    async fn execute(&self, task: Task, token: CancellationToken) -> Result<(), TaskFailure> {
        let fetcher = Arc::clone(&self.fetcher);
        let reporter = Reporter::new(task.id, self.events.clone());
        let task_token = token.clone();
        let mut handle = tokio::spawn(
            async move { process(fetcher.as_ref(), task, reporter, &task_token).await }
                .in_current_span(),
        );

        let joined = match self.options.task_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    // The task must be gone before its terminal status goes out.
                    token.cancel();
                    handle.abort();
                    let _ = (&mut handle).await;
                    return Err(TaskFailure::TimedOut(limit));
                }
            },
            None => handle.await,
        };
        match joined {
            Ok(result) => result.map_err(TaskFailure::Fetch),
            Err(err) if err.is_panic() => Err(TaskFailure::Panicked),
            Err(_) => Err(TaskFailure::Fetch(FetchError::Cancelled)),
        }
    }

    fn forget(&self, id: TaskId) {
        self.shared.tokens().remove(&id);
    }
}

#[derive(Debug, thiserror::Error)]
enum TaskFailure {
    #[error(transparent)]
    Fetch(FetchError),
    #[error("task panicked")]
    Panicked,
    #[error("task exceeded the {0:?} timeout")]
    TimedOut(Duration),
}

impl TaskFailure {
    fn is_cancelled(&self) -> bool {
        matches!(self, TaskFailure::Fetch(err) if err.is_cancelled())
    }
}

fn checkpoint(token: &CancellationToken) -> Result<(), FetchError> {
    if token.is_cancelled() {
        Err(FetchError::Cancelled)
    } else {
        Ok(())
    }
}

async fn process<F: MediaFetcher>(
    fetcher: &F,
    task: Task,
    mut reporter: Reporter,
    token: &CancellationToken,
) -> Result<(), FetchError> {
    reporter.status(TaskStatus::Initializing);
    reporter.progress(0.0);

    let request = FetchRequest {
        url: task.url,
        settings: task.settings,
    };

    checkpoint(token)?;
    let info = fetcher.fetch_info(&request, token).await?;
    reporter.title(info.title.unwrap_or_else(|| UNKNOWN_TITLE.to_owned()));
    if let Some(thumbnail) = info.thumbnail {
        reporter.thumbnail(thumbnail);
    }

    checkpoint(token)?;
    let mut hook = |event: HookEvent| -> Result<(), FetchError> {
        checkpoint(token)?;
        match event {
            HookEvent::Downloading { percent } => {
                if let Some(fraction) = percent_to_fraction(&percent) {
                    reporter.progress(fraction);
                    reporter.status(TaskStatus::Downloading);
                }
            }
            HookEvent::Finished => reporter.status(TaskStatus::Processing),
        }
        Ok(())
    };
    fetcher.download(&request, &mut hook).await?;

    checkpoint(token)
}

/// Emits non-terminal updates for one task, dropping anything that would
/// move its status backwards or its progress down.
struct Reporter {
    id: TaskId,
    events: UnboundedSender<TaskEvent>,
    status: TaskStatus,
    progress: f32,
}

impl Reporter {
    fn new(id: TaskId, events: UnboundedSender<TaskEvent>) -> Self {
        Self {
            id,
            events,
            status: TaskStatus::Queued,
            progress: 0.0,
        }
    }

    fn status(&mut self, status: TaskStatus) {
        if self.status.can_advance_to(status) && !status.is_terminal() {
            self.status = status;
            emit(&self.events, self.id, TaskUpdate::Status(status));
        }
    }

    fn progress(&mut self, fraction: f32) {
        if self.status.is_terminal() {
            return;
        }
        let fraction = fraction.min(MAX_IN_FLIGHT_PROGRESS);
        // The initial 0.0 is always sent; afterwards only increases go out.
        if fraction > self.progress || (self.status == TaskStatus::Initializing && fraction == 0.0) {
            self.progress = self.progress.max(fraction);
            emit(&self.events, self.id, TaskUpdate::Progress(fraction));
        }
    }

    fn title(&mut self, title: String) {
        emit(&self.events, self.id, TaskUpdate::Title(title));
    }

    fn thumbnail(&mut self, url: String) {
        emit(&self.events, self.id, TaskUpdate::Thumbnail(url));
    }
}

fn emit(events: &UnboundedSender<TaskEvent>, id: TaskId, update: TaskUpdate) {
    if events.send(TaskEvent { id, update }).is_err() {
        debug!(task = %id, "event dropped, receiver gone");
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted [`MediaFetcher`] for exercising the worker without yt-dlp.

    use std::{collections::HashMap, sync::Arc, time::Duration};

    use tokio::sync::Notify;
    use tokio_util::sync::CancellationToken;

    use crate::downloader::{FetchRequest, MediaFetcher, MediaInfo, ProgressHook};
    use crate::error::FetchError;
    use crate::progress::HookEvent;

    #[derive(Debug, Clone, Default)]
    pub enum Ending {
        #[default]
        Succeed,
        Fail(String),
        Panic,
        /// Keep reporting progress until the hook refuses
        RunUntilCancelled,
        /// Never return and never call the hook again
        Hang,
        /// Report progress `calls` times, blocking the thread for `pause` before each
        Grind { calls: u32, pause: Duration },
        /// Succeed once `release` is notified
        SucceedWhen(Arc<Notify>),
    }

    #[derive(Debug, Clone)]
    pub struct Script {
        pub title: Option<String>,
        pub thumbnail: Option<String>,
        pub steps: Vec<HookEvent>,
        pub ending: Ending,
        /// Signalled when the download phase begins
        pub started: Arc<Notify>,
        /// Metadata lookup waits for cancellation instead of answering
        pub hold_metadata: bool,
        /// Signalled when the metadata lookup begins
        pub fetching: Arc<Notify>,
    }

    impl Default for Script {
        fn default() -> Self {
            Self {
                title: Some("Example Clip".to_owned()),
                thumbnail: None,
                steps: vec![
                    downloading("10.0%"),
                    downloading("55.5%"),
                    downloading("100.0%"),
                    HookEvent::Finished,
                ],
                ending: Ending::Succeed,
                started: Arc::new(Notify::new()),
                hold_metadata: false,
                fetching: Arc::new(Notify::new()),
            }
        }
    }

    impl Script {
        pub fn ending(mut self, ending: Ending) -> Self {
            self.ending = ending;
            self
        }
    }

    pub fn downloading(percent: &str) -> HookEvent {
        HookEvent::Downloading {
            percent: percent.to_owned(),
        }
    }

    #[derive(Debug, Clone, Default)]
    pub struct ScriptedFetcher {
        scripts: Arc<HashMap<String, Script>>,
    }

    impl ScriptedFetcher {
        pub fn new(scripts: impl IntoIterator<Item = (&'static str, Script)>) -> Self {
            let scripts = scripts
                .into_iter()
                .map(|(url, script)| (url.to_owned(), script))
                .collect();
            Self {
                scripts: Arc::new(scripts),
            }
        }

        fn script(&self, url: &str) -> Script {
            self.scripts.get(url).cloned().unwrap_or_default()
        }
    }

    impl MediaFetcher for ScriptedFetcher {
        async fn fetch_info(
            &self,
            request: &FetchRequest,
            cancel: &CancellationToken,
        ) -> Result<MediaInfo, FetchError> {
            let script = self.script(&request.url);
            script.fetching.notify_one();
            if script.hold_metadata {
                cancel.cancelled().await;
            }
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            Ok(MediaInfo {
                title: script.title,
                thumbnail: script.thumbnail,
            })
        }

        async fn download(
            &self,
            request: &FetchRequest,
            hook: &mut ProgressHook<'_>,
        ) -> Result<(), FetchError> {
            let script = self.script(&request.url);
            script.started.notify_one();
            for step in script.steps {
                hook(step)?;
            }
            match script.ending {
                Ending::Succeed => Ok(()),
                Ending::Fail(message) => Err(FetchError::ToolFailed {
                    code: Some(1),
                    stderr: message,
                }),
                Ending::Panic => panic!("scripted failure"),
                Ending::RunUntilCancelled => loop {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    hook(downloading("50.0%"))?;
                },
                Ending::Hang => {
                    std::future::pending::<()>().await;
                    Ok(())
                }
                Ending::Grind { calls, pause } => {
                    for step in 0..calls {
                        std::thread::sleep(pause);
                        hook(downloading(&format!("{}%", 10 + step)))?;
                    }
                    Ok(())
                }
                Ending::SucceedWhen(release) => {
                    release.notified().await;
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, time::Duration};

    use tokio::time::timeout;

    use super::fake::{Ending, Script, ScriptedFetcher};
    use super::*;
    use crate::model::{OutputMode, Quality};

    fn settings() -> DownloadSettings {
        DownloadSettings {
            mode: OutputMode::Video,
            quality: Quality::Best,
            destination: PathBuf::from("D"),
        }
    }

    fn start(fetcher: ScriptedFetcher) -> (DownloadQueue, UnboundedReceiver<TaskEvent>) {
        DownloadQueue::start(&Handle::current(), fetcher, WorkerOptions::default())
    }

    /// Collects events until every id in `ids` has finished reporting.
    async fn until_terminal(
        rx: &mut UnboundedReceiver<TaskEvent>,
        ids: &[TaskId],
    ) -> Vec<TaskEvent> {
        let mut seen = Vec::new();
        let mut remaining: Vec<TaskId> = ids.to_vec();
        while !remaining.is_empty() {
            let event = timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for worker")
                .expect("event channel closed");
            // `Completed` is followed by the final `Progress(1.0)`.
            let done = match event.update {
                TaskUpdate::Status(TaskStatus::Completed) => false,
                TaskUpdate::Status(status) => status.is_terminal(),
                TaskUpdate::Progress(p) => p >= 1.0,
                _ => false,
            };
            if done {
                remaining.retain(|id| *id != event.id);
            }
            seen.push(event);
        }
        seen
    }

    fn updates_for(events: &[TaskEvent], id: TaskId) -> Vec<TaskUpdate> {
        events
            .iter()
            .filter(|e| e.id == id)
            .map(|e| e.update.clone())
            .collect()
    }

    fn terminal_of(updates: &[TaskUpdate]) -> Vec<TaskStatus> {
        updates
            .iter()
            .filter_map(|u| match u {
                TaskUpdate::Status(s) if s.is_terminal() => Some(*s),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn completes_with_expected_sequence() {
        let (queue, mut rx) = start(ScriptedFetcher::default());
        let id = queue.submit("http://example.com/a", settings()).unwrap();
        let events = until_terminal(&mut rx, &[id]).await;
        let updates = updates_for(&events, id);

        assert_eq!(updates[0], TaskUpdate::Status(TaskStatus::Initializing));
        assert_eq!(updates[1], TaskUpdate::Progress(0.0));
        assert_eq!(updates[2], TaskUpdate::Title("Example Clip".to_owned()));
        assert_eq!(updates[updates.len() - 2], TaskUpdate::Status(TaskStatus::Completed));
        assert_eq!(updates[updates.len() - 1], TaskUpdate::Progress(1.0));
        assert!(updates.contains(&TaskUpdate::Status(TaskStatus::Downloading)));
        assert!(updates.contains(&TaskUpdate::Status(TaskStatus::Processing)));

        let progress: Vec<f32> = updates
            .iter()
            .filter_map(|u| match u {
                TaskUpdate::Progress(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.iter().filter(|p| **p >= 1.0).count(), 1);
        assert_eq!(queue.current(), None);
    }

    #[tokio::test]
    async fn missing_title_falls_back() {
        let script = Script {
            title: None,
            thumbnail: Some("https://img/1.jpg".to_owned()),
            ..Script::default()
        };
        let (queue, mut rx) = start(ScriptedFetcher::new([("http://x/untitled", script)]));
        let id = queue.submit("http://x/untitled", settings()).unwrap();
        let updates = updates_for(&until_terminal(&mut rx, &[id]).await, id);
        assert!(updates.contains(&TaskUpdate::Title(UNKNOWN_TITLE.to_owned())));
        assert!(updates.contains(&TaskUpdate::Thumbnail("https://img/1.jpg".to_owned())));
    }

    #[tokio::test]
    async fn processes_in_submission_order() {
        let (queue, mut rx) = start(ScriptedFetcher::default());
        let a = queue.submit("http://example.com/a", settings()).unwrap();
        let b = queue.submit("http://example.com/b", settings()).unwrap();
        let events = until_terminal(&mut rx, &[a, b]).await;

        let a_done = events
            .iter()
            .position(|e| e.id == a && e.update == TaskUpdate::Status(TaskStatus::Completed))
            .unwrap();
        let b_init = events
            .iter()
            .position(|e| e.id == b && e.update == TaskUpdate::Status(TaskStatus::Initializing))
            .unwrap();
        assert!(a_done < b_init);
    }

    #[tokio::test]
    async fn cancel_before_start_reports_only_cancelled() {
        let blocker = Script::default().ending(Ending::RunUntilCancelled);
        let started = blocker.started.clone();
        let (queue, mut rx) = start(ScriptedFetcher::new([("http://slow", blocker)]));

        let a = queue.submit("http://slow", settings()).unwrap();
        let b = queue.submit("http://example.com/b", settings()).unwrap();
        started.notified().await;
        queue.cancel(b);
        queue.cancel(a);

        let events = until_terminal(&mut rx, &[a, b]).await;
        assert_eq!(
            updates_for(&events, b),
            vec![TaskUpdate::Status(TaskStatus::Cancelled)]
        );
        assert_eq!(
            terminal_of(&updates_for(&events, a)),
            vec![TaskStatus::Cancelled]
        );
    }

    #[tokio::test]
    async fn cancelling_current_task_stops_it() {
        let blocker = Script::default().ending(Ending::RunUntilCancelled);
        let started = blocker.started.clone();
        let (queue, mut rx) = start(ScriptedFetcher::new([("http://slow", blocker)]));

        let id = queue.submit("http://slow", settings()).unwrap();
        started.notified().await;
        assert_eq!(queue.current(), Some(id));
        queue.cancel(id);

        let updates = updates_for(&until_terminal(&mut rx, &[id]).await, id);
        assert_eq!(terminal_of(&updates), vec![TaskStatus::Cancelled]);
        assert!(!updates.contains(&TaskUpdate::Progress(1.0)));
    }

    #[tokio::test]
    async fn failure_reports_error_and_worker_continues() {
        let fetcher = ScriptedFetcher::new([
            ("http://broken", Script::default().ending(Ending::Fail("HTTP 404".to_owned()))),
            ("http://panics", Script::default().ending(Ending::Panic)),
        ]);
        let (queue, mut rx) = start(fetcher);
        let broken = queue.submit("http://broken", settings()).unwrap();
        let panics = queue.submit("http://panics", settings()).unwrap();
        let fine = queue.submit("http://example.com/ok", settings()).unwrap();

        let events = until_terminal(&mut rx, &[broken, panics, fine]).await;
        assert_eq!(terminal_of(&updates_for(&events, broken)), vec![TaskStatus::Error]);
        assert_eq!(terminal_of(&updates_for(&events, panics)), vec![TaskStatus::Error]);
        assert_eq!(terminal_of(&updates_for(&events, fine)), vec![TaskStatus::Completed]);
    }

    #[tokio::test]
    async fn timeout_turns_stuck_task_into_error() {
        let fetcher = ScriptedFetcher::new([("http://stuck", Script::default().ending(Ending::Hang))]);
        let options = WorkerOptions {
            task_timeout: Some(Duration::from_millis(50)),
        };
        let (queue, mut rx) = DownloadQueue::start(&Handle::current(), fetcher, options);
        let stuck = queue.submit("http://stuck", settings()).unwrap();
        let next = queue.submit("http://example.com/next", settings()).unwrap();

        let events = until_terminal(&mut rx, &[stuck, next]).await;
        assert_eq!(terminal_of(&updates_for(&events, stuck)), vec![TaskStatus::Error]);
        assert_eq!(terminal_of(&updates_for(&events, next)), vec![TaskStatus::Completed]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timed_out_task_is_silent_after_error() {
        let grinding = Script::default().ending(Ending::Grind {
            calls: 40,
            pause: Duration::from_millis(5),
        });
        let fetcher = ScriptedFetcher::new([("http://grind", grinding)]);
        let options = WorkerOptions {
            task_timeout: Some(Duration::from_millis(50)),
        };
        let (queue, mut rx) = DownloadQueue::start(&Handle::current(), fetcher, options);
        let slow = queue.submit("http://grind", settings()).unwrap();
        let next = queue.submit("http://example.com/next", settings()).unwrap();

        let mut events = until_terminal(&mut rx, &[slow, next]).await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        let updates = updates_for(&events, slow);
        let error_at = updates
            .iter()
            .position(|u| *u == TaskUpdate::Status(TaskStatus::Error))
            .expect("timed out task reports Error");
        assert_eq!(error_at, updates.len() - 1, "updates after Error: {:?}", &updates[error_at..]);

        let slow_last = events.iter().rposition(|e| e.id == slow).unwrap();
        let next_first = events.iter().position(|e| e.id == next).unwrap();
        assert!(slow_last < next_first);
        assert_eq!(terminal_of(&updates_for(&events, next)), vec![TaskStatus::Completed]);
    }

    #[tokio::test]
    async fn cancel_during_metadata_lookup() {
        let script = Script {
            hold_metadata: true,
            ..Script::default()
        };
        let fetching = script.fetching.clone();
        let (queue, mut rx) = start(ScriptedFetcher::new([("http://meta", script)]));

        let id = queue.submit("http://meta", settings()).unwrap();
        fetching.notified().await;
        queue.cancel(id);

        let updates = updates_for(&until_terminal(&mut rx, &[id]).await, id);
        assert_eq!(
            updates,
            vec![
                TaskUpdate::Status(TaskStatus::Initializing),
                TaskUpdate::Progress(0.0),
                TaskUpdate::Status(TaskStatus::Cancelled),
            ]
        );
    }

    #[tokio::test]
    async fn cancel_after_download_returns_wins_over_completed() {
        let release = Arc::new(tokio::sync::Notify::new());
        let script = Script::default().ending(Ending::SucceedWhen(release.clone()));
        let started = script.started.clone();
        let (queue, mut rx) = start(ScriptedFetcher::new([("http://late", script)]));

        let id = queue.submit("http://late", settings()).unwrap();
        started.notified().await;
        queue.cancel(id);
        release.notify_one();

        let updates = updates_for(&until_terminal(&mut rx, &[id]).await, id);
        assert_eq!(terminal_of(&updates), vec![TaskStatus::Cancelled]);
        assert!(!updates.contains(&TaskUpdate::Status(TaskStatus::Completed)));
        assert!(!updates.contains(&TaskUpdate::Progress(1.0)));
    }

    #[tokio::test]
    async fn cancelling_finished_or_unknown_task_is_noop() {
        let (queue, mut rx) = start(ScriptedFetcher::default());
        let id = queue.submit("http://example.com/a", settings()).unwrap();
        until_terminal(&mut rx, &[id]).await;

        queue.cancel(id);
        queue.cancel(TaskId::new());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn progress_never_moves_backwards() {
        let script = Script {
            steps: vec![
                super::fake::downloading("40%"),
                super::fake::downloading("20%"),
                super::fake::downloading("N/A"),
                HookEvent::Finished,
                super::fake::downloading("70%"),
            ],
            ..Script::default()
        };
        let (queue, mut rx) = start(ScriptedFetcher::new([("http://two-streams", script)]));
        let id = queue.submit("http://two-streams", settings()).unwrap();
        let updates = updates_for(&until_terminal(&mut rx, &[id]).await, id);

        let statuses: Vec<TaskStatus> = updates
            .iter()
            .filter_map(|u| match u {
                TaskUpdate::Status(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![
                TaskStatus::Initializing,
                TaskStatus::Downloading,
                TaskStatus::Processing,
                TaskStatus::Completed,
            ]
        );
        let progress: Vec<f32> = updates
            .iter()
            .filter_map(|u| match u {
                TaskUpdate::Progress(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![0.0, 0.4, 0.7, 1.0]);
    }

    #[tokio::test]
    async fn shutdown_cancels_running_and_queued_tasks() {
        let blocker = Script::default().ending(Ending::RunUntilCancelled);
        let started = blocker.started.clone();
        let (mut queue, mut rx) = start(ScriptedFetcher::new([("http://slow", blocker)]));

        let a = queue.submit("http://slow", settings()).unwrap();
        let b = queue.submit("http://example.com/b", settings()).unwrap();
        started.notified().await;
        queue.shutdown().unwrap().await.unwrap();

        let events = until_terminal(&mut rx, &[a, b]).await;
        assert_eq!(terminal_of(&updates_for(&events, a)), vec![TaskStatus::Cancelled]);
        assert_eq!(
            updates_for(&events, b),
            vec![TaskUpdate::Status(TaskStatus::Cancelled)]
        );
        assert_eq!(
            queue.submit("http://example.com/c", settings()),
            Err(SubmitError::QueueClosed)
        );
    }
}
