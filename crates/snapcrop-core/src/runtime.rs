//! Async session driver.
//!
//! A [`CropSession`] is owned by a single tokio task. Commands arrive over an
//! unbounded channel and are applied in order, so the session never sees
//! concurrent mutation. Decode and encode run on the blocking pool and post
//! their tagged results back into the same queue. A result from an older
//! generation is dropped by the session when it is dequeued.
//!
//! The task ends when every [`SessionHandle`] is dropped or on
//! [`SessionHandle::shutdown`]. Either way the session is dropped on the task
//! and its live preview released.

use std::time::Instant;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::oneshot;

use crate::artifact::{ArtifactPayload, PreviewBackend};
use crate::config::{CropShape, CropperConfig};
use crate::intake::{ImageFile, IntakeError};
use crate::raster::RasterError;
use crate::region::CropRegion;
use crate::session::{
    CropSession, DecodeOutcome, Notification, PendingDecode, PendingRaster, RasterOutcome,
    SessionError, SessionObserver, SessionSnapshot, SessionState, Tagged,
};

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum Command {
    DropFiles(Vec<ImageFile>, Reply<()>),
    Pan(f64, f64),
    Drag(f64, f64),
    Zoom(f64),
    StepZoom(i32),
    AspectRatio(f64),
    Shape(CropShape),
    Commit(Reply<()>),
    Recrop(Reply<()>),
    Cancel(Reply<()>),
    Reset,
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

enum Message {
    Command(Command),
    Decoded(DecodeOutcome),
    Encoded(RasterOutcome),
    Shutdown(oneshot::Sender<()>),
}

/// Everything a session reports, as a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    RegionChanged(CropRegion),
    Notification(Notification),
    ArtifactReady(ArtifactPayload),
}

/// Observer that forwards to an event channel.
#[derive(Debug, Clone)]
pub struct EventObserver {
    events: UnboundedSender<SessionEvent>,
}

impl EventObserver {
    pub fn new(events: UnboundedSender<SessionEvent>) -> Self {
        Self { events }
    }

    fn send(&self, event: SessionEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }
}

impl SessionObserver for EventObserver {
    fn state_changed(&mut self, state: SessionState) {
        self.send(SessionEvent::StateChanged(state));
    }

    fn region_changed(&mut self, region: CropRegion) {
        self.send(SessionEvent::RegionChanged(region));
    }

    fn notify(&mut self, notification: &Notification) {
        self.send(SessionEvent::Notification(notification.clone()));
    }

    fn artifact_ready(&mut self, payload: &ArtifactPayload) {
        self.send(SessionEvent::ArtifactReady(payload.clone()));
    }
}

/// Cheap, cloneable handle to a running session task.
///
/// Commands that can be rejected (`drop_files`, `commit`, `recrop`,
/// `cancel`) resolve once the session has accepted or refused them. The
/// decode or encode they start completes later and is reported through the
/// observer.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inbox: UnboundedSender<Message>,
}

impl SessionHandle {
    /// Validate a drop and start decoding it.
    pub async fn drop_files(&self, files: Vec<ImageFile>) -> Result<(), SessionError> {
        self.request(|reply| Command::DropFiles(files, reply))
            .await?
    }

    pub fn pan(&self, pan_x: f64, pan_y: f64) -> Result<(), SessionError> {
        self.send(Command::Pan(pan_x, pan_y))
    }

    pub fn drag(&self, dx: f64, dy: f64) -> Result<(), SessionError> {
        self.send(Command::Drag(dx, dy))
    }

    pub fn zoom(&self, zoom: f64) -> Result<(), SessionError> {
        self.send(Command::Zoom(zoom))
    }

    pub fn step_zoom(&self, steps: i32) -> Result<(), SessionError> {
        self.send(Command::StepZoom(steps))
    }

    pub fn aspect_ratio(&self, ratio: f64) -> Result<(), SessionError> {
        self.send(Command::AspectRatio(ratio))
    }

    pub fn shape(&self, shape: CropShape) -> Result<(), SessionError> {
        self.send(Command::Shape(shape))
    }

    /// Start rasterizing the current region.
    pub async fn commit(&self) -> Result<(), SessionError> {
        self.request(Command::Commit).await?
    }

    pub async fn recrop(&self) -> Result<(), SessionError> {
        self.request(Command::Recrop).await?
    }

    pub async fn cancel(&self) -> Result<(), SessionError> {
        self.request(Command::Cancel).await?
    }

    pub fn reset(&self) -> Result<(), SessionError> {
        self.send(Command::Reset)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(Command::Snapshot).await
    }

    /// Stop the task and wait until the session has been dropped.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        let (reply, done) = oneshot::channel();
        self.inbox
            .send(Message::Shutdown(reply))
            .map_err(|_| SessionError::Closed)?;
        done.await.map_err(|_| SessionError::Closed)
    }

    fn send(&self, command: Command) -> Result<(), SessionError> {
        self.inbox
            .send(Message::Command(command))
            .map_err(|_| SessionError::Closed)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(build(reply))?;
        response.await.map_err(|_| SessionError::Closed)
    }
}

/// Spawn a session task that reports through an event stream.
///
/// Must be called from within a tokio runtime.
pub fn spawn_session<B>(
    config: CropperConfig,
    backend: B,
) -> Result<(SessionHandle, UnboundedReceiver<SessionEvent>), SessionError>
where
    B: PreviewBackend + Send + 'static,
{
    let (events, receiver) = mpsc::unbounded_channel();
    let handle = spawn_session_with(config, backend, EventObserver::new(events))?;
    Ok((handle, receiver))
}

/// Spawn a session task with a custom observer.
///
/// Must be called from within a tokio runtime.
pub fn spawn_session_with<B, O>(
    config: CropperConfig,
    backend: B,
    observer: O,
) -> Result<SessionHandle, SessionError>
where
    B: PreviewBackend + Send + 'static,
    O: SessionObserver + Send + 'static,
{
    let session = CropSession::with_observer(config, backend, observer)?;
    let (inbox, queue) = mpsc::unbounded_channel();
    let driver = Driver {
        session,
        inbox: inbox.downgrade(),
    };
    tokio::spawn(driver.run(queue));
    Ok(SessionHandle { inbox })
}

struct Driver<B: PreviewBackend, O: SessionObserver> {
    session: CropSession<B, O>,
    // Weak so that dropping every handle closes the queue
    inbox: WeakUnboundedSender<Message>,
}

impl<B, O> Driver<B, O>
where
    B: PreviewBackend + Send + 'static,
    O: SessionObserver + Send + 'static,
{
    async fn run(mut self, mut queue: UnboundedReceiver<Message>) {
        log::debug!("session task started");
        let mut on_shutdown = None;

        while let Some(message) = queue.recv().await {
            match message {
                Message::Shutdown(done) => {
                    on_shutdown = Some(done);
                    break;
                }
                Message::Command(command) => self.handle(command),
                Message::Decoded(outcome) => {
                    // Failures are already reported to the observer
                    let _ = self.session.finish_load(outcome);
                }
                Message::Encoded(outcome) => {
                    let _ = self.session.finish_commit(outcome);
                }
            }
        }

        drop(queue);
        drop(self);
        log::debug!("session task finished");
        if let Some(done) = on_shutdown {
            let _ = done.send(());
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::DropFiles(files, reply) => {
                let result = self.session.begin_load(&files);
                let _ = reply.send(result.map(|pending| self.start_decode(pending)));
            }
            Command::Pan(x, y) => self.session.set_pan(x, y),
            Command::Drag(dx, dy) => self.session.drag(dx, dy),
            Command::Zoom(zoom) => self.session.set_zoom(zoom),
            Command::StepZoom(steps) => self.session.step_zoom(steps),
            Command::AspectRatio(ratio) => self.session.set_aspect_ratio(ratio),
            Command::Shape(shape) => self.session.set_shape(shape),
            Command::Commit(reply) => {
                let result = self.session.begin_commit();
                let _ = reply.send(result.map(|pending| self.start_encode(pending)));
            }
            Command::Recrop(reply) => {
                let _ = reply.send(self.session.recrop());
            }
            Command::Cancel(reply) => {
                let _ = reply.send(self.session.cancel());
            }
            Command::Reset => self.session.reset(),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.session.snapshot());
            }
        }
    }

    fn start_decode(&self, pending: PendingDecode) {
        let inbox = self.inbox.clone();
        let generation = pending.generation();

        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = match tokio::task::spawn_blocking(move || pending.run()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let err = IntakeError::DecodeError(format!("decode task failed: {}", e));
                    Tagged::new(generation, Err(err))
                }
            };
            log::debug!("decode finished in {:?}", started.elapsed());

            if let Some(inbox) = inbox.upgrade() {
                let _ = inbox.send(Message::Decoded(outcome));
            }
        });
    }

    fn start_encode(&self, pending: PendingRaster) {
        let inbox = self.inbox.clone();
        let generation = pending.generation();

        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = match tokio::task::spawn_blocking(move || pending.run()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let err = RasterError::EncodeFailure(format!("encode task failed: {}", e));
                    Tagged::new(generation, Err(err))
                }
            };
            log::debug!("encode finished in {:?}", started.elapsed());

            if let Some(inbox) = inbox.upgrade() {
                let _ = inbox.send(Message::Encoded(outcome));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{init_logger, png_file, RecordingPreviews};
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(10);

    /// Wait for the first event matching `pred`, skipping others.
    async fn wait_for(
        events: &mut UnboundedReceiver<SessionEvent>,
        pred: impl Fn(&SessionEvent) -> bool,
    ) -> SessionEvent {
        timeout(WAIT, async {
            loop {
                let event = events.recv().await.expect("event stream closed");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    #[tokio::test]
    async fn test_load_and_commit() {
        init_logger();
        let previews = RecordingPreviews::new();
        let (handle, mut events) =
            spawn_session(CropperConfig::default(), previews.clone()).unwrap();

        handle.drop_files(vec![png_file("cat.png", 80, 60)]).await.unwrap();
        wait_for(&mut events, |e| {
            *e == SessionEvent::StateChanged(SessionState::Cropping)
        })
        .await;

        handle.commit().await.unwrap();
        let event = wait_for(&mut events, |e| {
            matches!(e, SessionEvent::ArtifactReady(_))
        })
        .await;

        let SessionEvent::ArtifactReady(payload) = event else {
            unreachable!()
        };
        assert_eq!(payload.name, "cat.jpg");
        assert_eq!(payload.mime_type, "image/jpeg");

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state, SessionState::Ready);
        assert_eq!(previews.live_count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_drop_resolves_with_error() {
        let (handle, mut events) =
            spawn_session(CropperConfig::default(), RecordingPreviews::new()).unwrap();
        let file = ImageFile::new("huge.png", "image/png", vec![0u8; 15 * 1024 * 1024]);

        let result = handle.drop_files(vec![file]).await;

        assert!(matches!(
            result,
            Err(SessionError::Intake(IntakeError::TooLarge { .. }))
        ));
        assert_eq!(
            events.recv().await,
            Some(SessionEvent::Notification(Notification::FileTooLarge { limit_mb: 10.0 }))
        );
        assert_eq!(handle.snapshot().await.unwrap().state, SessionState::Empty);
    }

    #[tokio::test]
    async fn test_reset_during_decode_never_loads() {
        let (handle, mut events) =
            spawn_session(CropperConfig::default(), RecordingPreviews::new()).unwrap();

        handle.drop_files(vec![png_file("big.png", 1200, 900)]).await.unwrap();
        handle.reset().unwrap();

        let loaded = timeout(
            Duration::from_millis(500),
            wait_for(&mut events, |e| {
                *e == SessionEvent::StateChanged(SessionState::Loaded)
            }),
        )
        .await;
        assert!(loaded.is_err(), "stale decode was applied");

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state, SessionState::Empty);
        assert_eq!(snapshot.source_size, None);
    }

    #[tokio::test]
    async fn test_interaction_commands() {
        let (handle, mut events) =
            spawn_session(CropperConfig::default(), RecordingPreviews::new()).unwrap();
        handle.drop_files(vec![png_file("a.png", 80, 60)]).await.unwrap();
        wait_for(&mut events, |e| {
            *e == SessionEvent::StateChanged(SessionState::Cropping)
        })
        .await;

        handle.zoom(2.0).unwrap();
        handle.pan(1.0, 1.0).unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.region, Some(CropRegion::new(50, 30, 30, 30)));
    }

    #[tokio::test]
    async fn test_commit_in_wrong_state() {
        let (handle, _events) =
            spawn_session(CropperConfig::default(), RecordingPreviews::new()).unwrap();
        assert!(matches!(
            handle.commit().await,
            Err(SessionError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_shutdown_releases_preview() {
        let previews = RecordingPreviews::new();
        let (handle, mut events) =
            spawn_session(CropperConfig::default(), previews.clone()).unwrap();
        handle.drop_files(vec![png_file("a.png", 20, 20)]).await.unwrap();
        wait_for(&mut events, |e| {
            *e == SessionEvent::StateChanged(SessionState::Cropping)
        })
        .await;
        handle.commit().await.unwrap();
        wait_for(&mut events, |e| matches!(e, SessionEvent::ArtifactReady(_))).await;

        handle.shutdown().await.unwrap();

        assert_eq!(previews.live_count(), 0);
        assert_eq!(handle.snapshot().await, Err(SessionError::Closed));
    }

    #[tokio::test]
    async fn test_invalid_config_fails_to_spawn() {
        let mut config = CropperConfig::default();
        config.jpeg_quality = 0;
        assert!(spawn_session(config, RecordingPreviews::new()).is_err());
    }
}
