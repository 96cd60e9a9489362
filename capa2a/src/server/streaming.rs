//! Streaming fan-out for a single task.
//!
//! A [`StreamingTask`] turns the store's update feed for one task into an
//! ordered push feed for any number of [`StreamCallback`] subscribers.
//!
//! - Monitoring starts on the first subscription and never restarts once
//!   stopped.
//! - Every new subscriber first receives the task's current status, fetched
//!   fresh from the store. Status updates that the catch-up already covers
//!   are not sent to it again.
//! - Each update is broadcast to all subscribers concurrently. A subscriber
//!   whose delivery fails is dropped.
//! - A status event is `final` exactly when the state is terminal. After the
//!   first final event monitoring stops, so nothing follows it.
//! - Monitoring also stops after a configurable ceiling. Subscribing to a
//!   stopped feed yields the catch-up event and nothing else.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::events::{StreamEvent, TaskUpdate};
use super::lock;
use super::task_store::{ListenerHandle, TaskStore};
use crate::error::{A2AError, Result};
use crate::types::{Task, TaskArtifactUpdateEvent, TaskStatus, TaskStatusUpdateEvent};

// Deadline used when the ceiling is too large to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// An external observer of a streamed task.
///
/// Returning an error from either method removes the subscriber.
#[async_trait]
pub trait StreamCallback: Send + Sync {
    /// Called for each status change, including the initial catch-up.
    async fn on_status_update(&self, event: TaskStatusUpdateEvent) -> Result<()>;

    /// Called for each attached artifact.
    async fn on_artifact_update(&self, event: TaskArtifactUpdateEvent) -> Result<()>;
}

/// A [`StreamCallback`] that forwards events into a channel.
///
/// Delivery fails once the receiver is dropped.
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    sender: mpsc::UnboundedSender<StreamEvent>,
}

impl ChannelSubscriber {
    /// Creates a subscriber and the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<StreamEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { sender }), receiver)
    }

    fn forward(&self, event: StreamEvent) -> Result<()> {
        self.sender
            .send(event)
            .map_err(|_| A2AError::ServiceUnavailable("stream receiver dropped".into()))
    }
}

#[async_trait]
impl StreamCallback for ChannelSubscriber {
    async fn on_status_update(&self, event: TaskStatusUpdateEvent) -> Result<()> {
        self.forward(StreamEvent::StatusUpdate(event))
    }

    async fn on_artifact_update(&self, event: TaskArtifactUpdateEvent) -> Result<()> {
        self.forward(StreamEvent::ArtifactUpdate(event))
    }
}

/// Why monitoring stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A final status event was delivered.
    FinalDelivered,
    /// The monitoring ceiling elapsed first.
    TimedOut,
    /// [`StreamingTask::dispose`] was called.
    Disposed,
}

/// Lifecycle of the fan-out itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// No subscriber yet.
    Unstarted,
    /// Forwarding store updates.
    Monitoring,
    /// Done; no further events will be produced.
    Stopped(StopReason),
}

struct Subscriber {
    callback: Arc<dyn StreamCallback>,
    // Status sent as catch-up, until a newer one is delivered.
    caught_up: Option<TaskStatus>,
}

impl Subscriber {
    // True if a status-only update carries nothing the catch-up did not.
    fn has_seen(&self, status: &TaskStatus) -> bool {
        self.caught_up
            .as_ref()
            .is_some_and(|seen| seen == status || status.timestamp < seen.timestamp)
    }
}

struct Inner {
    task_id: String,
    context_id: String,
    store: Arc<TaskStore>,
    timeout: Duration,
    subscribers: Mutex<Vec<Subscriber>>,
    state: Mutex<MonitorState>,
    listener: Mutex<Option<ListenerHandle>>,
    // Held while a catch-up or a broadcast is in flight.
    delivery: tokio::sync::Mutex<()>,
}

/// Push feed for one task. Cloning shares the same feed.
#[derive(Clone)]
pub struct StreamingTask {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for StreamingTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingTask")
            .field("task_id", &self.inner.task_id)
            .field("state", &self.state())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl StreamingTask {
    /// Wraps a stored task. Nothing is monitored until the first subscribe.
    #[must_use]
    pub fn new(task: &Task, store: Arc<TaskStore>, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                task_id: task.id.clone(),
                context_id: task.context_id.clone(),
                store,
                timeout,
                subscribers: Mutex::new(Vec::new()),
                state: Mutex::new(MonitorState::Unstarted),
                listener: Mutex::new(None),
                delivery: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// The streamed task's ID.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.inner.task_id
    }

    /// The streamed task's context ID.
    #[must_use]
    pub fn context_id(&self) -> &str {
        &self.inner.context_id
    }

    /// Current lifecycle state of the feed.
    #[must_use]
    pub fn state(&self) -> MonitorState {
        *lock(&self.inner.state)
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.subscribers).len()
    }

    /// Adds a subscriber and sends it the task's current status.
    ///
    /// The first call starts monitoring. A catch-up event that is already
    /// final is the subscriber's only event, as is any catch-up on a stopped
    /// feed. Subscribing the same callback
    /// twice is a no-op. Fails with `TaskNotFound` if the task is gone.
    pub async fn subscribe(&self, callback: Arc<dyn StreamCallback>) -> Result<()> {
        let inner = &self.inner;
        let _delivery = inner.delivery.lock().await;

        if lock(&inner.subscribers)
            .iter()
            .any(|s| Arc::ptr_eq(&s.callback, &callback))
        {
            return Ok(());
        }
        if *lock(&inner.state) == MonitorState::Unstarted {
            self.start_monitoring();
        }

        let task = inner.store.get_task(&inner.task_id, None).await?;
        let is_final = task.is_terminal();
        if let Err(e) = callback
            .on_status_update(task.status_update_event(is_final))
            .await
        {
            warn!(task_id = %inner.task_id, error = %e, "Stream subscriber failed during catch-up");
            return Ok(());
        }

        let mut subscribers = lock(&inner.subscribers);
        if is_final {
            if subscribers.is_empty() {
                drop(subscribers);
                inner.stop(StopReason::FinalDelivered);
            }
        } else if let MonitorState::Stopped(reason) = *lock(&inner.state) {
            debug!(task_id = %inner.task_id, reason = ?reason, "Feed stopped, catch-up only");
        } else {
            subscribers.push(Subscriber {
                callback,
                caught_up: Some(task.status),
            });
            debug!(task_id = %inner.task_id, count = subscribers.len(), "Stream subscriber added");
        }
        Ok(())
    }

    /// Removes a subscriber. Monitoring continues even with no subscribers.
    ///
    /// Returns true if the callback was registered.
    pub fn unsubscribe_callback(&self, callback: &Arc<dyn StreamCallback>) -> bool {
        let mut subscribers = lock(&self.inner.subscribers);
        let before = subscribers.len();
        subscribers.retain(|s| !Arc::ptr_eq(&s.callback, callback));
        before != subscribers.len()
    }

    /// Stops monitoring and drops every subscriber. Idempotent.
    pub fn dispose(&self) {
        if self.inner.stop(StopReason::Disposed) {
            debug!(task_id = %self.inner.task_id, "Stream disposed");
        }
    }

    /// Reads the latest task state from the store.
    pub async fn get_task(&self) -> Result<Task> {
        self.inner.store.get_task(&self.inner.task_id, None).await
    }

    fn start_monitoring(&self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self
            .inner
            .store
            .on_task_update(self.inner.task_id.clone(), move |update: &TaskUpdate| {
                let _ = tx.send(update.clone());
            });
        *lock(&self.inner.listener) = Some(handle);
        *lock(&self.inner.state) = MonitorState::Monitoring;
        debug!(task_id = %self.inner.task_id, "Stream monitoring started");
        tokio::spawn(Arc::clone(&self.inner).monitor(rx));
    }
}

impl Inner {
    async fn monitor(self: Arc<Self>, mut updates: mpsc::UnboundedReceiver<TaskUpdate>) {
        let now = tokio::time::Instant::now();
        let deadline = now
            .checked_add(self.timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        loop {
            let update = match tokio::time::timeout_at(deadline, updates.recv()).await {
                Ok(Some(update)) => update,
                Ok(None) => break,
                Err(_) => {
                    if self.stop(StopReason::TimedOut) {
                        info!(task_id = %self.task_id, "Stream monitoring timed out");
                    }
                    break;
                }
            };

            let _delivery = self.delivery.lock().await;
            if matches!(*lock(&self.state), MonitorState::Stopped(_)) {
                break;
            }
            let is_final = update.task.is_terminal();
            self.broadcast(&update).await;
            if is_final {
                self.stop(StopReason::FinalDelivered);
                debug!(task_id = %self.task_id, "Final event delivered");
                break;
            }
        }
    }

    async fn broadcast(&self, update: &TaskUpdate) {
        // A final status always goes out.
        let status_only = update.artifact.is_none() && !update.task.is_terminal();
        let mut recipients: Vec<Arc<dyn StreamCallback>> = lock(&self.subscribers)
            .iter_mut()
            .filter_map(|s| {
                if status_only {
                    if s.has_seen(&update.task.status) {
                        return None;
                    }
                    s.caught_up = None;
                }
                Some(Arc::clone(&s.callback))
            })
            .collect();

        for event in update.to_stream_events() {
            if recipients.is_empty() {
                return;
            }
            let results =
                join_all(recipients.iter().map(|s| deliver(s.as_ref(), event.clone()))).await;
            let failed: Vec<Arc<dyn StreamCallback>> = recipients
                .iter()
                .zip(results)
                .filter_map(|(subscriber, result)| {
                    let e = result.err()?;
                    warn!(task_id = %self.task_id, error = %e, "Removing stream subscriber after failed delivery");
                    Some(Arc::clone(subscriber))
                })
                .collect();
            if !failed.is_empty() {
                let dropped = |callback: &Arc<dyn StreamCallback>| {
                    failed.iter().any(|f| Arc::ptr_eq(f, callback))
                };
                recipients.retain(|s| !dropped(s));
                lock(&self.subscribers).retain(|s| !dropped(&s.callback));
            }
        }
    }

    /// Moves to `Stopped`, drops every subscriber and detaches from the
    /// store. Returns false if already stopped.
    fn stop(&self, reason: StopReason) -> bool {
        {
            let mut state = lock(&self.state);
            if matches!(*state, MonitorState::Stopped(_)) {
                return false;
            }
            *state = MonitorState::Stopped(reason);
        }
        lock(&self.subscribers).clear();
        if let Some(handle) = lock(&self.listener).take() {
            handle.unsubscribe();
        }
        true
    }
}

async fn deliver(subscriber: &dyn StreamCallback, event: StreamEvent) -> Result<()> {
    match event {
        StreamEvent::StatusUpdate(e) => subscriber.on_status_update(e).await,
        StreamEvent::ArtifactUpdate(e) => subscriber.on_artifact_update(e).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Artifact, Message, TaskState};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<StreamEvent>>,
        failures: AtomicUsize,
        fail: bool,
    }

    impl Recorder {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn events(&self) -> Vec<StreamEvent> {
            self.events.lock().unwrap().clone()
        }

        fn record(&self, event: StreamEvent) -> Result<()> {
            if self.fail {
                self.failures.fetch_add(1, Ordering::SeqCst);
                return Err(A2AError::InternalError("subscriber broke".into()));
            }
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    #[async_trait]
    impl StreamCallback for Recorder {
        async fn on_status_update(&self, event: TaskStatusUpdateEvent) -> Result<()> {
            self.record(StreamEvent::StatusUpdate(event))
        }

        async fn on_artifact_update(&self, event: TaskArtifactUpdateEvent) -> Result<()> {
            self.record(StreamEvent::ArtifactUpdate(event))
        }
    }

    async fn setup() -> (Arc<TaskStore>, Task, StreamingTask) {
        let store = Arc::new(TaskStore::new());
        let task = store
            .create_task(Message::user_text("stream me"), None)
            .await
            .unwrap();
        let stream = StreamingTask::new(&task, Arc::clone(&store), Duration::from_secs(60));
        (store, task, stream)
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_single_final_event_is_last() {
        let (store, task, stream) = setup().await;
        let recorder = Arc::new(Recorder::default());
        stream.subscribe(recorder.clone()).await.unwrap();
        assert_eq!(stream.state(), MonitorState::Monitoring);

        store.add_artifact(&task.id, Artifact::text("response", "8")).await.unwrap();
        store.update_task_status(&task.id, TaskState::Completed, None).await.unwrap();
        wait_until(|| recorder.events().iter().any(StreamEvent::is_final)).await;

        // Events after the final one are never forwarded.
        store.update_task_status(&task.id, TaskState::Working, None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let events = recorder.events();
        assert_eq!(events.iter().filter(|e| e.is_final()).count(), 1);
        assert!(events.last().unwrap().is_final());
        assert_eq!(events.len(), 4);
        assert!(matches!(events[2], StreamEvent::ArtifactUpdate(_)));
        assert_eq!(stream.state(), MonitorState::Stopped(StopReason::FinalDelivered));
        assert_eq!(store.listener_count(&task.id), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_events_carry_task_ids() {
        let (store, task, stream) = setup().await;
        let recorder = Arc::new(Recorder::default());
        stream.subscribe(recorder.clone()).await.unwrap();

        store.update_task_status(&task.id, TaskState::InputRequired, None).await.unwrap();
        store.update_task_status(&task.id, TaskState::Working, None).await.unwrap();
        store.update_task_status(&task.id, TaskState::Failed, None).await.unwrap();
        wait_until(|| recorder.events().iter().any(StreamEvent::is_final)).await;

        for event in recorder.events() {
            assert_eq!(event.task_id(), task.id);
            assert_eq!(event.context_id(), task.context_id);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failing_subscriber_is_isolated() {
        let (store, task, stream) = setup().await;
        let good = Arc::new(Recorder::default());
        let bad = Arc::new(Recorder::failing());
        stream.subscribe(good.clone()).await.unwrap();
        stream.subscribe(bad.clone()).await.unwrap();

        // The failing catch-up keeps it out of the set.
        assert_eq!(bad.failures.load(Ordering::SeqCst), 1);
        assert_eq!(stream.subscriber_count(), 1);

        store.add_artifact(&task.id, Artifact::text("a", "1")).await.unwrap();
        store.update_task_status(&task.id, TaskState::Completed, None).await.unwrap();
        wait_until(|| good.events().iter().any(StreamEvent::is_final)).await;
        assert_eq!(good.events().len(), 4);
        assert_eq!(bad.failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_subscriber_removed_after_one_failed_broadcast() {
        struct FailAfterCatchUp {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl StreamCallback for FailAfterCatchUp {
            async fn on_status_update(&self, _event: TaskStatusUpdateEvent) -> Result<()> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(())
                } else {
                    Err(A2AError::InternalError("gone".into()))
                }
            }

            async fn on_artifact_update(&self, _event: TaskArtifactUpdateEvent) -> Result<()> {
                Err(A2AError::InternalError("gone".into()))
            }
        }

        let (store, task, stream) = setup().await;
        let flaky = Arc::new(FailAfterCatchUp {
            calls: AtomicUsize::new(0),
        });
        let good = Arc::new(Recorder::default());
        stream.subscribe(flaky.clone()).await.unwrap();
        stream.subscribe(good.clone()).await.unwrap();
        assert_eq!(stream.subscriber_count(), 2);

        store.update_task_status(&task.id, TaskState::InputRequired, None).await.unwrap();
        wait_until(|| stream.subscriber_count() == 1).await;
        assert_eq!(good.events().len(), 2);

        store.update_task_status(&task.id, TaskState::Completed, None).await.unwrap();
        wait_until(|| good.events().iter().any(StreamEvent::is_final)).await;
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_single_final() {
        let (store, task, stream) = setup().await;
        store.update_task_status(&task.id, TaskState::Completed, None).await.unwrap();

        let recorder = Arc::new(Recorder::default());
        stream.subscribe(recorder.clone()).await.unwrap();

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_final());
        match &events[0] {
            StreamEvent::StatusUpdate(e) => assert_eq!(e.status.state, TaskState::Completed),
            StreamEvent::ArtifactUpdate(_) => panic!("expected a status update"),
        }
        assert_eq!(stream.state(), MonitorState::Stopped(StopReason::FinalDelivered));
        assert_eq!(store.listener_count(&task.id), 0);
        assert_eq!(stream.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_catch_up_reads_fresh_state() {
        let (store, task, stream) = setup().await;
        store.update_task_status(&task.id, TaskState::InputRequired, None).await.unwrap();

        let recorder = Arc::new(Recorder::default());
        stream.subscribe(recorder.clone()).await.unwrap();
        match &recorder.events()[0] {
            StreamEvent::StatusUpdate(e) => {
                assert_eq!(e.status.state, TaskState::InputRequired);
                assert!(!e.r#final);
            }
            StreamEvent::ArtifactUpdate(_) => panic!("expected a status update"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_subscribe_is_ignored() {
        let (_store, _task, stream) = setup().await;
        let recorder = Arc::new(Recorder::default());
        stream.subscribe(recorder.clone()).await.unwrap();
        stream.subscribe(recorder.clone()).await.unwrap();
        assert_eq!(stream.subscriber_count(), 1);
        assert_eq!(recorder.events().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unsubscribe_keeps_monitoring() {
        let (store, task, stream) = setup().await;
        let recorder = Arc::new(Recorder::default());
        let callback: Arc<dyn StreamCallback> = recorder.clone();
        stream.subscribe(Arc::clone(&callback)).await.unwrap();

        assert!(stream.unsubscribe_callback(&callback));
        assert!(!stream.unsubscribe_callback(&callback));
        assert_eq!(stream.state(), MonitorState::Monitoring);

        store.update_task_status(&task.id, TaskState::Completed, None).await.unwrap();
        wait_until(|| stream.state() == MonitorState::Stopped(StopReason::FinalDelivered)).await;
        assert_eq!(recorder.events().len(), 1);
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let (store, task, stream) = setup().await;
        let recorder = Arc::new(Recorder::default());
        stream.subscribe(recorder.clone()).await.unwrap();

        stream.dispose();
        stream.dispose();
        assert_eq!(stream.state(), MonitorState::Stopped(StopReason::Disposed));
        assert_eq!(stream.subscriber_count(), 0);
        assert_eq!(store.listener_count(&task.id), 0);

        store.update_task_status(&task.id, TaskState::Completed, None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(recorder.events().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitoring_times_out() {
        let store = Arc::new(TaskStore::new());
        let task = store.create_task(Message::user_text("stuck"), None).await.unwrap();
        let stream = StreamingTask::new(&task, Arc::clone(&store), Duration::from_secs(10));
        stream.subscribe(Arc::new(Recorder::default())).await.unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(stream.state(), MonitorState::Stopped(StopReason::TimedOut));
        assert_eq!(store.listener_count(&task.id), 0);
    }

    #[tokio::test]
    async fn test_channel_subscriber() {
        let (store, task, stream) = setup().await;
        let (subscriber, mut events) = ChannelSubscriber::new();
        stream.subscribe(subscriber).await.unwrap();

        store.update_task_status(&task.id, TaskState::Canceled, None).await.unwrap();
        let first = events.recv().await.unwrap();
        assert!(!first.is_final());
        let last = events.recv().await.unwrap();
        assert!(last.is_final());
        assert_eq!(stream.get_task().await.unwrap().state(), TaskState::Canceled);
    }

    #[tokio::test]
    async fn test_subscribe_to_missing_task() {
        let store = Arc::new(TaskStore::new());
        let ghost = Task::new("ghost", "ctx");
        let stream = StreamingTask::new(&ghost, store, Duration::from_secs(1));
        let err = stream
            .subscribe(Arc::new(Recorder::default()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "TaskNotFound");
    }

    #[tokio::test]
    async fn test_subscribe_after_dispose_gets_catch_up_only() {
        let (store, task, stream) = setup().await;
        stream.subscribe(Arc::new(Recorder::default())).await.unwrap();
        stream.dispose();

        let late = Arc::new(Recorder::default());
        stream.subscribe(late.clone()).await.unwrap();
        assert_eq!(stream.subscriber_count(), 0);
        assert_eq!(stream.state(), MonitorState::Stopped(StopReason::Disposed));

        store.update_task_status(&task.id, TaskState::Completed, None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let events = late.events();
        assert_eq!(events.len(), 1);
        assert!(!events[0].is_final());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_after_timeout_gets_catch_up_only() {
        let store = Arc::new(TaskStore::new());
        let task = store.create_task(Message::user_text("stuck"), None).await.unwrap();
        let stream = StreamingTask::new(&task, Arc::clone(&store), Duration::from_secs(10));
        stream.subscribe(Arc::new(Recorder::default())).await.unwrap();
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(stream.state(), MonitorState::Stopped(StopReason::TimedOut));
        assert_eq!(stream.subscriber_count(), 0);

        let late = Arc::new(Recorder::default());
        stream.subscribe(late.clone()).await.unwrap();
        assert_eq!(stream.subscriber_count(), 0);
        assert_eq!(late.events().len(), 1);
        assert_eq!(store.listener_count(&task.id), 0);
    }

    #[tokio::test]
    async fn test_unrepresentable_timeout_still_streams() {
        let store = Arc::new(TaskStore::new());
        let task = store.create_task(Message::user_text("patient"), None).await.unwrap();
        let stream = StreamingTask::new(&task, Arc::clone(&store), Duration::MAX);
        let recorder = Arc::new(Recorder::default());
        stream.subscribe(recorder.clone()).await.unwrap();
        assert_eq!(stream.state(), MonitorState::Monitoring);

        store.update_task_status(&task.id, TaskState::Completed, None).await.unwrap();
        wait_until(|| stream.state() == MonitorState::Stopped(StopReason::FinalDelivered)).await;
        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert!(events[1].is_final());
    }

    #[tokio::test]
    async fn test_update_covered_by_catch_up_is_not_repeated() {
        let (store, task, stream) = setup().await;
        let stale = store.get_task(&task.id, None).await.unwrap();
        store.update_task_status(&task.id, TaskState::InputRequired, None).await.unwrap();

        let recorder = Arc::new(Recorder::default());
        stream.subscribe(recorder.clone()).await.unwrap();
        let current = store.get_task(&task.id, None).await.unwrap();

        // Updates that landed between listener registration and the catch-up
        // fetch are replayed by the feed; the subscriber has already seen them.
        stream.inner.broadcast(&TaskUpdate::status(stale)).await;
        stream.inner.broadcast(&TaskUpdate::status(current)).await;
        assert_eq!(recorder.events().len(), 1);

        store.update_task_status(&task.id, TaskState::Working, None).await.unwrap();
        wait_until(|| recorder.events().len() == 2).await;
        match &recorder.events()[1] {
            StreamEvent::StatusUpdate(e) => assert_eq!(e.status.state, TaskState::Working),
            StreamEvent::ArtifactUpdate(_) => panic!("expected a status update"),
        }
    }
}
