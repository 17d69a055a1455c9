//! Filter control surface.
//!
//! A [`FilterSession`] is one task that owns the current image and
//! control values. Every change bumps a generation counter; changes are
//! coalesced for a short quiet period and then rendered through the
//! shared filter module. Results from superseded generations, and
//! decodes from superseded uploads, are dropped, so the latest request
//! always wins.
//!
//! All user-visible problems are published as [`Notice`]s rather than
//! ending the session.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tint_shared::{ParamChange, PixelBuffer, TransformParams};
use tint_wasm::{FilterError, SharedFilterModule};

use crate::acquire::{AcquireError, ImageAcquirer, SourceImage};

const COMMAND_QUEUE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Quiet period before a burst of changes is rendered
    pub debounce: Duration,
    /// Notices buffered per subscriber
    pub notice_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(30),
            notice_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Filtering,
    /// The module failed to load or a filter run failed; frames are
    /// published unfiltered until a later run succeeds.
    FiltersUnavailable,
}

/// User-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    ModuleUnavailable(String),
    FilterFailed(String),
    UnsupportedFormat(String),
    CameraAccess(String),
    ImageFailed(String),
    InvalidParams(String),
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::ModuleUnavailable(msg) => write!(f, "filters unavailable: {msg}"),
            Notice::FilterFailed(msg) => write!(f, "filter failed: {msg}"),
            Notice::UnsupportedFormat(mime) => {
                write!(f, "{mime} is not supported, only PNG and JPG files are allowed")
            }
            Notice::CameraAccess(msg) => write!(f, "camera unavailable: {msg}"),
            Notice::ImageFailed(msg) => write!(f, "could not open image: {msg}"),
            Notice::InvalidParams(msg) => write!(f, "invalid setting: {msg}"),
        }
    }
}

/// The rendered output of one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFrame {
    pub generation: u64,
    pub params: TransformParams,
    pub image: PixelBuffer,
    /// False when the image is shown unfiltered because filtering failed
    pub filtered: bool,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("filter session has shut down")]
    Closed,
}

enum Command {
    Change(ParamChange),
    Params(TransformParams),
    Image(SourceImage),
    Load(Box<dyn ImageAcquirer>),
    Shutdown,
}

enum Event {
    Decoded {
        request: u64,
        result: Result<SourceImage, AcquireError>,
    },
    Rendered {
        generation: u64,
        params: TransformParams,
        source: PixelBuffer,
        result: Result<PixelBuffer, FilterError>,
    },
}

pub struct FilterSession {
    module: Arc<SharedFilterModule>,
    debounce: Duration,
    params: TransformParams,
    image: Option<SourceImage>,
    generation: u64,
    /// Latest image request; decodes for older requests are stale
    image_request: u64,
    /// When set, a render is due at this instant
    deadline: Option<Instant>,
    in_flight: Option<JoinHandle<()>>,
    events_tx: mpsc::UnboundedSender<Event>,
    frames: watch::Sender<Option<RenderedFrame>>,
    state: watch::Sender<SessionState>,
    notices: broadcast::Sender<Notice>,
}

impl FilterSession {
    /// Start a session task against `module`.
    pub fn spawn(module: Arc<SharedFilterModule>, config: SessionConfig) -> SessionHandle {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (frames, frames_rx) = watch::channel(None);
        let (state, state_rx) = watch::channel(SessionState::Idle);
        let (notices, _) = broadcast::channel(config.notice_capacity.max(1));

        let session = FilterSession {
            module,
            debounce: config.debounce,
            params: TransformParams::default(),
            image: None,
            generation: 0,
            image_request: 0,
            deadline: None,
            in_flight: None,
            events_tx,
            frames,
            state,
            notices: notices.clone(),
        };
        let task = tokio::spawn(session.run(commands_rx, events_rx));

        SessionHandle {
            commands: commands_tx,
            frames: frames_rx,
            state: state_rx,
            notices,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        if let Err(e) = self.module.ensure_loaded().await {
            warn!("filter module failed to load: {}", e);
            self.state.send_replace(SessionState::FiltersUnavailable);
            self.notify(Notice::ModuleUnavailable(e.to_string()));
        }

        loop {
            let deadline = self.deadline;
            let due = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = events.recv() => self.handle_event(event),
                _ = due => self.start_render(),
            }
        }

        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
        debug!("filter session stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Change(change) => match self.params.apply(change) {
                Ok(params) => self.set_params(params),
                Err(e) => self.notify(Notice::InvalidParams(e.to_string())),
            },
            Command::Params(params) => match params.validate() {
                Ok(()) => self.set_params(params),
                Err(e) => self.notify(Notice::InvalidParams(e.to_string())),
            },
            Command::Image(image) => {
                // supersedes any upload still decoding
                self.image_request += 1;
                self.set_image(image);
            }
            Command::Load(mut acquirer) => {
                self.image_request += 1;
                let request = self.image_request;
                let events = self.events_tx.clone();
                debug!(request, source = %acquirer.describe(), "acquiring image");
                tokio::spawn(async move {
                    let result = acquirer.acquire().await;
                    let _ = events.send(Event::Decoded { request, result });
                });
            }
            Command::Shutdown => {}
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Decoded { request, result } => {
                if request != self.image_request {
                    debug!(request, latest = self.image_request, "dropping stale image decode");
                    return;
                }
                match result {
                    Ok(image) => self.set_image(image),
                    Err(AcquireError::UnsupportedFormat(mime)) => {
                        self.notify(Notice::UnsupportedFormat(mime))
                    }
                    Err(AcquireError::CameraAccess(msg)) => self.notify(Notice::CameraAccess(msg)),
                    Err(e) => self.notify(Notice::ImageFailed(e.to_string())),
                }
            }
            Event::Rendered {
                generation,
                params,
                source,
                result,
            } => {
                if generation != self.generation {
                    debug!(generation, latest = self.generation, "dropping stale render");
                    return;
                }
                self.in_flight = None;
                let frame = match result {
                    Ok(image) => {
                        self.state.send_replace(SessionState::Idle);
                        RenderedFrame {
                            generation,
                            params,
                            image,
                            filtered: true,
                        }
                    }
                    Err(e) => {
                        warn!(generation, "rendering without filters: {}", e);
                        self.state.send_replace(SessionState::FiltersUnavailable);
                        self.notify(match e {
                            FilterError::Load(e) => Notice::ModuleUnavailable(e.to_string()),
                            FilterError::Marshal(e) => Notice::FilterFailed(e.to_string()),
                        });
                        RenderedFrame {
                            generation,
                            params,
                            image: source,
                            filtered: false,
                        }
                    }
                };
                self.frames.send_replace(Some(frame));
            }
        }
    }

    fn set_params(&mut self, params: TransformParams) {
        if params != self.params {
            self.params = params;
            self.invalidate();
        }
    }

    fn set_image(&mut self, image: SourceImage) {
        info!(
            width = image.width(),
            height = image.height(),
            origin = ?image.origin,
            "new source image"
        );
        self.image = Some(image);
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.generation += 1;
        if self.image.is_some() {
            self.deadline = Some(Instant::now() + self.debounce);
        }
    }

    fn start_render(&mut self) {
        self.deadline = None;
        let Some(image) = &self.image else {
            return;
        };

        if let Some(task) = self.in_flight.take() {
            debug!("aborting superseded render");
            task.abort();
        }

        let generation = self.generation;
        let params = self.params;
        let source = image.pixels.clone();
        let module = self.module.clone();
        let events = self.events_tx.clone();

        if *self.state.borrow() != SessionState::FiltersUnavailable {
            self.state.send_replace(SessionState::Filtering);
        }
        debug!(generation, ?params, "rendering");

        self.in_flight = Some(tokio::spawn(async move {
            let result = module.apply(&source, &params).await;
            let _ = events.send(Event::Rendered {
                generation,
                params,
                source,
                result,
            });
        }));
    }

    fn notify(&self, notice: Notice) {
        info!("{}", notice);
        // no subscribers is fine
        let _ = self.notices.send(notice);
    }
}

/// Client side of a running [`FilterSession`].
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    frames: watch::Receiver<Option<RenderedFrame>>,
    state: watch::Receiver<SessionState>,
    notices: broadcast::Sender<Notice>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }

    pub async fn change(&self, change: ParamChange) -> Result<(), SessionError> {
        self.send(Command::Change(change)).await
    }

    pub async fn set_brightness(&self, value: i32) -> Result<(), SessionError> {
        self.change(ParamChange::Brightness(value)).await
    }

    pub async fn set_contrast(&self, value: i32) -> Result<(), SessionError> {
        self.change(ParamChange::Contrast(value)).await
    }

    pub async fn set_grayscale(&self, value: i32) -> Result<(), SessionError> {
        self.change(ParamChange::Grayscale(value)).await
    }

    pub async fn set_params(&self, params: TransformParams) -> Result<(), SessionError> {
        self.send(Command::Params(params)).await
    }

    pub async fn set_image(&self, image: SourceImage) -> Result<(), SessionError> {
        self.send(Command::Image(image)).await
    }

    /// Acquire an image in the background; it replaces the current one
    /// unless a newer image arrives first.
    pub async fn load(&self, acquirer: impl ImageAcquirer + 'static) -> Result<(), SessionError> {
        self.send(Command::Load(Box::new(acquirer))).await
    }

    pub fn frames(&self) -> watch::Receiver<Option<RenderedFrame>> {
        self.frames.clone()
    }

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Wait for the first frame rendered with exactly `params`.
    pub async fn frame_for(&self, params: TransformParams) -> Result<RenderedFrame, SessionError> {
        let mut frames = self.frames.clone();
        let frame = frames
            .wait_for(|frame| frame.as_ref().is_some_and(|f| f.params == params))
            .await
            .map_err(|_| SessionError::Closed)?;
        (*frame).clone().ok_or(SessionError::Closed)
    }

    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown).await;
        let _ = self.task.await;
    }
}
