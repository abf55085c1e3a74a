//! Generic runtime for session orchestration.
//!
//! The Runtime drives the client event loop, coordinating between:
//! - [`Session`]: channel, call and chat state machines
//! - [`Driver`]: transport and user I/O
//! - [`MediaBackend`]: devices and peer connection
//! - [`FileUploader`]: attachment uploads
//!
//! One input is processed at a time. Every action it produces is executed,
//! and every completion fed back, before the next input is polled.

use huddle_client::{CallAction, CallInput, Session, SessionAction, SessionConfig};
use huddle_core::{ChannelAction, Environment};
use huddle_proto::{RoomId, encode};
use tracing::{debug, error, warn};

use crate::{
    Command, Driver, FileUploader, Input, MediaBackend, OutgoingFile, RuntimeError,
    upload::UploadError,
};

/// Whether the runtime keeps polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Poll the next input
    Continue,
    /// Input source exhausted or user quit
    Quit,
}

/// Generic runtime that executes session actions against platform traits.
///
/// # Type Parameters
///
/// - `D`: transport and UI driver
/// - `M`: media backend
/// - `U`: file uploader
/// - `E`: environment for time and randomness
pub struct Runtime<D, M, U, E>
where
    D: Driver,
    M: MediaBackend,
    U: FileUploader,
    E: Environment,
{
    driver: D,
    media: M,
    uploader: U,
    session: Session<E>,
}

impl<D, M, U, E> Runtime<D, M, U, E>
where
    D: Driver,
    M: MediaBackend,
    U: FileUploader,
    E: Environment,
{
    /// Create a runtime with a fresh, disconnected session.
    pub fn new(driver: D, media: M, uploader: U, env: E, config: SessionConfig) -> Self {
        Self { driver, media, uploader, session: Session::new(env, config) }
    }

    /// The session (read-only).
    pub fn session(&self) -> &Session<E> {
        &self.session
    }

    /// The driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The media backend.
    pub fn media(&self) -> &M {
        &self.media
    }

    /// Run until the input source is exhausted or the user quits, then shut
    /// the session down.
    ///
    /// # Errors
    ///
    /// - `RuntimeError::Session` if the session was already started
    /// - `RuntimeError::Driver` if the driver fails to read input or render
    pub async fn run(&mut self) -> Result<(), RuntimeError<D::Error>> {
        self.start().await?;
        while self.step().await? == Flow::Continue {}
        self.shutdown().await
    }

    /// Start connecting the channel.
    ///
    /// # Errors
    ///
    /// - `RuntimeError::Session` if the session was already started
    /// - `RuntimeError::Driver` if rendering fails
    pub async fn start(&mut self) -> Result<(), RuntimeError<D::Error>> {
        let actions = self.session.connect()?;
        self.execute(actions).await
    }

    /// Poll and process one input.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Driver` if the driver fails.
    pub async fn step(&mut self) -> Result<Flow, RuntimeError<D::Error>> {
        match self.driver.next_input().await.map_err(RuntimeError::Driver)? {
            Some(input) => self.handle_input(input).await,
            None => Ok(Flow::Quit),
        }
    }

    /// Hang up, stop typing and close the channel.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Driver` if rendering fails.
    pub async fn shutdown(&mut self) -> Result<(), RuntimeError<D::Error>> {
        let actions = self.session.shutdown();
        self.execute(actions).await
    }

    /// Process one input and everything it causes.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Driver` if rendering fails.
    pub async fn handle_input(&mut self, input: Input) -> Result<Flow, RuntimeError<D::Error>> {
        let actions = match input {
            Input::Command(Command::Quit) => return Ok(Flow::Quit),
            Input::Command(command) => self.command(command).await?,
            Input::Inbound(text) => self.session.handle_inbound_text(&text),
            Input::Peer(signal) => self.call(signal.into()),
            Input::Tick => self.session.tick(),
            Input::ChannelLost => self.session.channel_lost(),
            Input::ChannelRestored => match self.session.channel_opened() {
                Ok(actions) => actions,
                Err(error) => {
                    debug!(%error, "ignoring channel restore");
                    Vec::new()
                },
            },
        };

        self.execute(actions).await?;
        Ok(Flow::Continue)
    }

    async fn command(
        &mut self,
        command: Command,
    ) -> Result<Vec<SessionAction>, RuntimeError<D::Error>> {
        let actions = match command {
            Command::SelectRoom(room_id) => self.session.select_room(room_id),
            Command::LoadPage(page) => self.session.load_page(page).unwrap_or_else(|error| {
                warn!(page, %error, "cannot load page");
                Vec::new()
            }),
            Command::SendMessage { room_id, content } => {
                self.session.send_message(room_id, content)
            },
            Command::SendFile { room_id, file } => return self.send_file(room_id, file).await,
            Command::Keystroke(room_id) => self.session.keystroke(&room_id),
            Command::StopTyping(room_id) => self.session.stop_typing(room_id),
            Command::CreatePrivateRoom(user_id) => self.session.create_private_room(user_id),
            Command::StartCall(room_id) => self.call(CallInput::Initiate { room_id }),
            Command::AcceptCall => self.call(CallInput::Accept),
            Command::RejectCall => self.call(CallInput::Reject),
            Command::EndCall => self.call(CallInput::End),
            Command::Quit => Vec::new(),
        };
        Ok(actions)
    }

    async fn send_file(
        &mut self,
        room_id: RoomId,
        file: OutgoingFile,
    ) -> Result<Vec<SessionAction>, RuntimeError<D::Error>> {
        let name = file.name.clone();
        match self.uploader.upload(&room_id, file).await {
            Ok(attachment) => Ok(self.session.send_attachment(room_id, attachment)),
            Err(error) => {
                warn!(%room_id, %name, %error, "upload failed");
                self.report_upload_failure(&room_id, &error)?;
                Ok(Vec::new())
            },
        }
    }

    fn report_upload_failure(
        &mut self,
        room_id: &RoomId,
        error: &UploadError,
    ) -> Result<(), RuntimeError<D::Error>> {
        self.driver.upload_failed(room_id, error).map_err(RuntimeError::Driver)
    }

    fn call(&mut self, input: CallInput) -> Vec<SessionAction> {
        match self.session.handle_call(input) {
            Ok(actions) => actions,
            Err(error) => {
                warn!(%error, "call input rejected");
                Vec::new()
            },
        }
    }

    /// Execute actions until none remain.
    async fn execute(&mut self, initial: Vec<SessionAction>) -> Result<(), RuntimeError<D::Error>> {
        let mut pending = initial;
        // set once a send fails; later sends of the same batch are dropped
        let mut lost = false;

        while !pending.is_empty() {
            let actions = std::mem::take(&mut pending);

            for action in actions {
                match action {
                    SessionAction::Send(event) if lost => {
                        debug!(event = event.name(), "channel lost, dropping outbound event");
                    },
                    SessionAction::Send(event) => match encode(&event) {
                        Ok(text) => {
                            if let Err(error) = self.driver.send_text(text).await {
                                warn!(event = event.name(), %error, "send failed, channel lost");
                                lost = true;
                                pending.extend(self.session.channel_lost());
                            }
                        },
                        Err(error) => error!(%error, "cannot encode outbound event"),
                    },
                    SessionAction::Call(action) => {
                        if let Some(completion) = self.perform(action).await {
                            pending.extend(self.call(completion));
                        }
                    },
                    SessionAction::Channel(ChannelAction::Open) => {
                        lost = false;
                        pending.extend(self.open_channel().await);
                    },
                    SessionAction::Channel(ChannelAction::Close { reason }) => {
                        self.driver.disconnect(&reason).await;
                    },
                    SessionAction::Notify(notice) => {
                        self.driver.notify(&notice).map_err(RuntimeError::Driver)?;
                    },
                }
            }
        }

        Ok(())
    }

    async fn open_channel(&mut self) -> Vec<SessionAction> {
        match self.driver.connect().await {
            Ok(()) => self.session.channel_opened().unwrap_or_else(|error| {
                debug!(%error, "channel opened late");
                Vec::new()
            }),
            Err(error) => {
                warn!(%error, "connect failed");
                self.session.channel_lost()
            },
        }
    }

    /// Run one media primitive. Returns the completion to feed back, if any.
    async fn perform(&mut self, action: CallAction) -> Option<CallInput> {
        match action {
            CallAction::AcquireMedia { attempt } => Some(match self.media.acquire().await {
                Ok(media) => CallInput::MediaAcquired { attempt, media },
                Err(error) => CallInput::MediaFailed { attempt, error },
            }),
            CallAction::ReleaseMedia(media) => {
                self.media.release(media).await;
                None
            },
            CallAction::OpenPeer { attempt, ice_servers, local_media } => self
                .media
                .open_peer(attempt, ice_servers, local_media)
                .await
                .err()
                .map(|error| CallInput::PeerFailed { attempt, error }),
            CallAction::ClosePeer { attempt } => {
                self.media.close_peer(attempt).await;
                None
            },
            CallAction::CreateOffer { attempt } => {
                Some(match self.media.create_offer(attempt).await {
                    Ok(offer) => CallInput::OfferCreated { attempt, offer },
                    Err(error) => CallInput::PeerFailed { attempt, error },
                })
            },
            CallAction::CreateAnswer { attempt } => {
                Some(match self.media.create_answer(attempt).await {
                    Ok(answer) => CallInput::AnswerCreated { attempt, answer },
                    Err(error) => CallInput::PeerFailed { attempt, error },
                })
            },
            CallAction::SetRemoteDescription { attempt, description } => {
                Some(match self.media.set_remote_description(attempt, description).await {
                    Ok(()) => CallInput::RemoteDescriptionApplied { attempt },
                    Err(error) => CallInput::PeerFailed { attempt, error },
                })
            },
            CallAction::AddIceCandidate { attempt, candidate } => self
                .media
                .add_ice_candidate(attempt, candidate)
                .await
                .err()
                .map(|error| CallInput::PeerFailed { attempt, error }),
            CallAction::Emit(_) | CallAction::Notify(_) => {
                warn!(?action, "unexpected call action reached the runtime");
                None
            },
        }
    }
}
