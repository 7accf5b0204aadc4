//! Session orchestrator
//!
//! A [`Companion`] owns at most one call at a time and moves it through
//! `Inactive -> Preparing -> Active -> Closing -> Inactive`. Everything that
//! can happen during a call (session events, captured blocks, finished
//! voices, pre-roll progress, tool results) arrives as a [`CompanionEvent`]
//! and is handled synchronously by [`Companion::handle_event`].

mod backend;
mod call;

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use rand::seq::SliceRandom;
use tokio::sync::mpsc;

use crate::Config;
use crate::console::UiEvent;
use crate::live::{LiveConnector, ServerMessage, SessionEvent, SessionSetup};
use crate::persona::{SongRequest, build_system_instruction, default_playlist};
use crate::tools::{
    MusicSearch, NewsSource, NowPlaying, ToolDispatcher, ToolEffect, ToolOutcome,
    tool_declarations,
};
use crate::transcript::{TranscriptMessage, TurnTranscript};
use crate::voice::{
    AudioBlock, CapturePipeline, EncodedAudioPacket, MusicPlayer, OUTPUT_SAMPLE_RATE,
    PlaybackScheduler, VoiceId, decode_bytes,
};

pub use backend::{AudioBackend, CpalBackend};
use call::Call;

/// Status shown while no call is running
pub const IDLE_STATUS: &str = "Press Enter to start";

/// Default live model
pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Default prebuilt voice
pub const DEFAULT_VOICE: &str = "Zephyr";

/// Default length of the opening song clip
pub const DEFAULT_PREROLL: Duration = Duration::from_secs(10);

/// Default catalogue country for the opening song
pub const DEFAULT_MUSIC_COUNTRY: &str = "FI";

/// Lifecycle of the companion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No call
    Inactive,
    /// Microphone acquired; pre-roll or session setup in progress
    Preparing,
    /// Session open and microphone streaming
    Active,
    /// Releasing the call
    Closing,
}

/// User commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start when idle, stop otherwise
    Toggle,
    /// Stop and exit
    Quit,
}

/// Everything the orchestrator reacts to
#[derive(Debug)]
pub enum CompanionEvent {
    /// A user command
    Command(Command),
    /// Something from the remote session
    Session(SessionEvent),
    /// A block of captured microphone audio
    CaptureBlock(AudioBlock),
    /// A speech voice finished playing
    PlaybackEnded(VoiceId),
    /// The music track finished playing
    MusicEnded,
    /// Opening song lookup finished; `Some` when its clip started playing
    PrerollResolved(Option<NowPlaying>),
    /// The opening clip ran for its full length
    PrerollElapsed(Option<NowPlaying>),
    /// A tool call finished
    ToolFinished(ToolOutcome),
}

/// Tunables for a companion
#[derive(Debug, Clone)]
pub struct CompanionSettings {
    /// Live model identifier
    pub model: String,
    /// Prebuilt voice name
    pub voice: String,
    /// How long the opening clip plays
    pub preroll: Duration,
    /// Catalogue country for the opening song
    pub music_country: Option<String>,
    /// Songs to choose the opening clip from
    pub playlist: Vec<SongRequest>,
}

impl Default for CompanionSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_LIVE_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            preroll: DEFAULT_PREROLL,
            music_country: Some(DEFAULT_MUSIC_COUNTRY.to_string()),
            playlist: default_playlist(),
        }
    }
}

impl From<&Config> for CompanionSettings {
    fn from(config: &Config) -> Self {
        Self {
            model: config.live_model.clone(),
            voice: config.voice.clone(),
            preroll: config.preroll,
            music_country: config.music_country.clone(),
            playlist: config.playlist.clone(),
        }
    }
}

/// Collaborators a companion talks to
pub struct CompanionDeps {
    /// Microphone and speaker
    pub backend: Arc<dyn AudioBackend>,
    /// Remote session factory
    pub connector: Arc<dyn LiveConnector>,
    /// Music catalogue
    pub search: Arc<dyn MusicSearch>,
    /// Headline digest
    pub news: Arc<dyn NewsSource>,
    /// Music player
    pub music: Arc<dyn MusicPlayer>,
    /// Natural ends of music tracks
    pub music_ended: Option<mpsc::UnboundedReceiver<VoiceId>>,
}

/// The session orchestrator
pub struct Companion {
    settings: CompanionSettings,
    backend: Arc<dyn AudioBackend>,
    connector: Arc<dyn LiveConnector>,
    search: Arc<dyn MusicSearch>,
    music: Arc<dyn MusicPlayer>,
    music_ended: Option<mpsc::UnboundedReceiver<VoiceId>>,
    tools: ToolDispatcher,
    ui: mpsc::UnboundedSender<UiEvent>,
    phase: Phase,
    call: Option<Call>,
    turn: TurnTranscript,
    transcript: Vec<TranscriptMessage>,
    now_playing: Option<NowPlaying>,
    status: String,
}

async fn recv_opt<T>(rx: Option<&mut mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_call_event(call: Option<&mut Call>) -> CompanionEvent {
    match call {
        Some(call) => call.next_event().await,
        None => std::future::pending().await,
    }
}

impl Companion {
    /// Create an idle companion reporting to `ui`
    #[must_use]
    pub fn new(
        deps: CompanionDeps,
        settings: CompanionSettings,
        ui: mpsc::UnboundedSender<UiEvent>,
    ) -> Self {
        Self {
            settings,
            tools: ToolDispatcher::new(Arc::clone(&deps.search), deps.news),
            backend: deps.backend,
            connector: deps.connector,
            search: deps.search,
            music: deps.music,
            music_ended: deps.music_ended,
            ui,
            phase: Phase::Inactive,
            call: None,
            turn: TurnTranscript::new(),
            transcript: Vec::new(),
            now_playing: None,
            status: IDLE_STATUS.to_string(),
        }
    }

    /// Current phase
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Finished transcript, oldest first
    #[must_use]
    pub fn transcript(&self) -> &[TranscriptMessage] {
        &self.transcript
    }

    /// Partial text of the turn in progress
    #[must_use]
    pub const fn turn(&self) -> &TurnTranscript {
        &self.turn
    }

    /// Track shown as playing
    #[must_use]
    pub const fn now_playing(&self) -> Option<&NowPlaying> {
        self.now_playing.as_ref()
    }

    /// Last status message
    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Start a call when idle, otherwise stop the current one
    pub fn toggle(&mut self) {
        if self.phase == Phase::Inactive {
            self.start();
        } else {
            self.stop();
        }
    }

    /// Begin a call: microphone, opening song, then the remote session
    pub fn start(&mut self) {
        if self.phase != Phase::Inactive {
            tracing::debug!(phase = ?self.phase, "start ignored, call already running");
            return;
        }

        self.phase = Phase::Preparing;
        self.set_status("Getting microphone...");

        let microphone = match self.backend.acquire_microphone() {
            Ok(microphone) => microphone,
            Err(e) => {
                tracing::warn!(error = %e, "failed to acquire microphone");
                self.teardown();
                self.set_status("Could not access microphone.");
                return;
            }
        };

        let mut call = Call::new(CapturePipeline::new(microphone));
        tracing::info!(call_id = %call.id, "call starting");

        let song = self.settings.playlist.choose(&mut rand::thread_rng()).cloned();
        match song {
            Some(song) => {
                self.set_status("Finding a memory...");
                call.preroll = Some(self.preroll(song));
                self.call = Some(call);
            }
            None => {
                self.call = Some(call);
                self.open_session(None);
            }
        }
    }

    /// Stop the current call; no-op when idle
    pub fn stop(&mut self) {
        if self.phase == Phase::Inactive && self.call.is_none() {
            tracing::debug!("stop ignored, no call running");
            return;
        }
        self.teardown();
        self.set_status(IDLE_STATUS);
    }

    /// Wait for the next event
    ///
    /// A closed command channel is reported as [`Command::Quit`].
    pub async fn next_event(
        &mut self,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> CompanionEvent {
        tokio::select! {
            command = commands.recv() => CompanionEvent::Command(command.unwrap_or(Command::Quit)),
            Some(_) = recv_opt(self.music_ended.as_mut()) => CompanionEvent::MusicEnded,
            event = next_call_event(self.call.as_mut()) => event,
        }
    }

    /// Drive the companion until a quit command
    pub async fn run(&mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.emit(UiEvent::Status(self.status.clone()));
        loop {
            let event = self.next_event(&mut commands).await;
            if !self.handle_event(event) {
                break;
            }
        }
        self.stop();
        tracing::info!("companion stopped");
    }

    /// Apply one event
    ///
    /// Returns `false` once the companion should exit.
    pub fn handle_event(&mut self, event: CompanionEvent) -> bool {
        match event {
            CompanionEvent::Command(Command::Toggle) => self.toggle(),
            CompanionEvent::Command(Command::Quit) => return false,
            CompanionEvent::Session(event) => self.on_session_event(event),
            CompanionEvent::CaptureBlock(block) => self.on_capture_block(&block),
            CompanionEvent::PlaybackEnded(voice) => {
                if let Some(playback) = self.live_call().and_then(|c| c.playback.as_mut()) {
                    playback.on_voice_ended(voice);
                }
            }
            CompanionEvent::MusicEnded => {
                tracing::debug!("music finished");
                self.set_now_playing(None);
            }
            CompanionEvent::PrerollResolved(played) => self.on_preroll_resolved(played),
            CompanionEvent::PrerollElapsed(played) => self.on_preroll_elapsed(played),
            CompanionEvent::ToolFinished(outcome) => self.on_tool_finished(outcome),
        }
        true
    }

    fn live_call(&mut self) -> Option<&mut Call> {
        self.call.as_mut().filter(|call| !call.cancelled)
    }

    fn emit(&self, event: UiEvent) {
        // The presenter may already be gone during shutdown
        let _ = self.ui.send(event);
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        self.emit(UiEvent::Status(self.status.clone()));
    }

    fn set_now_playing(&mut self, now_playing: Option<NowPlaying>) {
        if self.now_playing != now_playing {
            self.now_playing = now_playing;
            self.emit(UiEvent::NowPlaying(self.now_playing.clone()));
        }
    }

    fn emit_partial(&self) {
        self.emit(UiEvent::Partial {
            input: self.turn.input().to_string(),
            output: self.turn.output().to_string(),
        });
    }

    /// Look up and start the opening song
    fn preroll(&self, song: SongRequest) -> BoxFuture<'static, Option<NowPlaying>> {
        let search = Arc::clone(&self.search);
        let music = Arc::clone(&self.music);
        let country = self.settings.music_country.clone();

        async move {
            let track = match search.search(&song.song, &song.artist, country.as_deref()).await {
                Ok(Some(track)) => track,
                Ok(None) => {
                    tracing::info!(song = %song.song, artist = %song.artist, "opening song not found");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "opening song lookup failed, skipping intro");
                    return None;
                }
            };

            match music.play(&track.preview_url).await {
                Ok(()) => Some(NowPlaying::from(&track)),
                Err(e) => {
                    tracing::warn!(error = %e, "opening song playback failed");
                    None
                }
            }
        }
        .boxed()
    }

    fn on_preroll_resolved(&mut self, played: Option<NowPlaying>) {
        let preroll = self.settings.preroll;
        let Some(call) = self.live_call() else {
            if played.is_some() {
                self.music.stop();
            }
            return;
        };

        match played {
            Some(song) => {
                tracing::debug!(song = %song.song, seconds = preroll.as_secs_f64(), "opening song playing");
                call.preroll_timer = Some((Box::pin(tokio::time::sleep(preroll)), song.clone()));
                self.set_now_playing(Some(song));
            }
            None => {
                self.set_now_playing(None);
                self.open_session(None);
            }
        }
    }

    fn on_preroll_elapsed(&mut self, played: Option<NowPlaying>) {
        if self.live_call().is_none() {
            return;
        }
        self.music.stop();
        self.set_now_playing(None);
        self.open_session(played);
    }

    fn open_session(&mut self, played: Option<NowPlaying>) {
        self.set_status("Connecting to companion...");
        self.emit(UiEvent::Active(true));

        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let output = match self.backend.open_output(OUTPUT_SAMPLE_RATE, ended_tx) {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(error = %e, "failed to open audio output");
                self.teardown();
                self.set_status("Could not open the speaker.");
                return;
            }
        };

        let setup = SessionSetup {
            model: self.settings.model.clone(),
            voice: self.settings.voice.clone(),
            system_instruction: build_system_instruction(played.as_ref(), &chrono::Local::now()),
            tools: tool_declarations(),
        };
        let session = self.connector.open(setup);

        let Some(call) = self.live_call() else {
            output.close();
            return;
        };
        call.playback = Some(PlaybackScheduler::new(output));
        call.playback_ended = Some(ended_rx);
        call.session = Some(session.handle);
        call.session_events = Some(session.events);
        tracing::info!(call_id = %call.id, opening_song = played.is_some(), "session requested");
    }

    fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Opened => self.on_opened(),
            SessionEvent::Message(message) => self.on_message(message),
            SessionEvent::Error(e) => {
                tracing::error!(error = %e, "session error");
                self.teardown();
                self.set_status("Connection error. Please try again.");
            }
            SessionEvent::Closed(reason) => {
                tracing::info!(?reason, "session closed");
                self.teardown();
                self.set_status("Connection closed. Press Enter to restart.");
            }
        }
    }

    fn on_opened(&mut self) {
        let Some(call) = self.live_call() else {
            tracing::warn!("session opened after the call was cancelled, ignoring");
            return;
        };
        let Some(session) = call.session.clone() else {
            return;
        };

        if let Err(e) = session.send_audio(EncodedAudioPacket::silence()) {
            tracing::warn!(error = %e, "failed to send opening nudge");
        }

        let blocks = call.blocks_tx.clone();
        if let Err(e) = call.capture.begin(blocks) {
            tracing::warn!(error = %e, "failed to start capture");
            self.teardown();
            self.set_status("Could not access microphone.");
            return;
        }

        tracing::info!(call_id = %call.id, "session open, capturing");
        self.phase = Phase::Active;
        self.set_status("Connected. Speak whenever you like.");
    }

    fn on_capture_block(&mut self, block: &AudioBlock) {
        let active = self.phase == Phase::Active;
        let session = self
            .live_call()
            .filter(|_| active)
            .and_then(|call| call.session.as_ref());
        let Some(session) = session else {
            tracing::trace!("capture block dropped, no active session");
            return;
        };

        if let Err(e) = session.send_audio(EncodedAudioPacket::from_samples(block.samples())) {
            tracing::debug!(error = %e, "capture block not sent");
        }
    }

    fn on_message(&mut self, message: ServerMessage) {
        if self.live_call().is_none() {
            tracing::debug!("message for a cancelled call, ignoring");
            return;
        }

        let mut partial_changed = false;
        if let Some(delta) = &message.input_transcription {
            self.turn.push_input(delta);
            partial_changed = true;
        }
        if let Some(delta) = &message.output_transcription {
            self.turn.push_output(delta);
            partial_changed = true;
        }
        if message.turn_complete {
            for line in self.turn.flush() {
                self.transcript.push(line.clone());
                self.emit(UiEvent::Transcript(line));
            }
            partial_changed = true;
        }
        if partial_changed {
            self.emit_partial();
        }

        for fc in message.tool_calls {
            if let Some(status) = ToolDispatcher::status_for(&fc) {
                self.set_status(status);
            }
            let pending = self.tools.execute(fc);
            if let Some(call) = self.live_call() {
                call.tools.push(pending);
            }
        }

        let Some(playback) = self.live_call().and_then(|c| c.playback.as_mut()) else {
            return;
        };
        if message.interrupted {
            tracing::debug!("model interrupted, cancelling queued speech");
            playback.cancel_all();
        }
        for data in &message.audio {
            match decode_bytes(data) {
                Ok(bytes) => {
                    playback.schedule(&bytes);
                }
                Err(e) => tracing::warn!(error = %e, "undecodable audio chunk"),
            }
        }
        if message.turn_complete {
            playback.flush();
        }
    }

    fn on_tool_finished(&mut self, outcome: ToolOutcome) {
        if self.live_call().is_none() {
            tracing::debug!(tool = %outcome.name, "tool finished after the call ended");
            return;
        }

        match &outcome.effect {
            ToolEffect::None => {}
            ToolEffect::Play(track) => {
                self.set_now_playing(Some(NowPlaying::from(track)));
                let music = Arc::clone(&self.music);
                let url = track.preview_url.clone();
                let task = tokio::spawn(async move {
                    if let Err(e) = music.play(&url).await {
                        tracing::warn!(error = %e, url, "music playback failed");
                    }
                });
                if let Some(call) = self.live_call() {
                    call.set_music_task(task);
                }
            }
            ToolEffect::StopMusic => {
                if let Some(call) = self.live_call() {
                    call.abort_music();
                }
                self.music.stop();
                self.set_now_playing(None);
            }
        }
        if let Some(status) = &outcome.status {
            self.set_status(status.clone());
        }

        let response = outcome.response();
        if let Some(session) = self.live_call().and_then(|c| c.session.as_ref())
            && let Err(e) = session.send_tool_response(response)
        {
            tracing::warn!(error = %e, tool = %outcome.name, "tool response not sent");
        }
    }

    /// Release the current call and return to `Inactive`
    ///
    /// Safe to call at any point, including when no call exists.
    fn teardown(&mut self) {
        self.phase = Phase::Closing;

        if let Some(call) = self.call.as_mut() {
            call.cancelled = true;
            call.abort_music();
            call.close_session();
        }
        self.music.stop();
        if let Some(mut call) = self.call.take() {
            call.release();
            tracing::info!(call_id = %call.id, "call ended");
        }

        self.set_now_playing(None);
        self.turn.clear();
        self.emit_partial();
        self.phase = Phase::Inactive;
        self.emit(UiEvent::Active(false));
    }
}
