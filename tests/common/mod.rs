//! Shared test utilities
//!
//! Fakes for every collaborator of the companion, so calls can be driven
//! without audio hardware or network access.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use kindly::companion::{AudioBackend, CompanionDeps, CompanionSettings};
use kindly::console::UiEvent;
use kindly::live::{ClientMessage, LiveConnector, LiveSession, SessionHandle, SessionSetup};
use kindly::tools::{MusicSearch, NewsSource, Track};
use kindly::voice::{
    AudioOutput, CaptureTap, Microphone, Mixer, MixerHandle, MusicPlayer, VoiceId,
};
use kindly::{Companion, Error, Result, SessionEvent};

/// What happened to the fake microphone
#[derive(Default)]
pub struct MicState {
    pub acquired: usize,
    pub attached: bool,
    pub released: bool,
    pub tap: Option<CaptureTap>,
}

pub struct FakeMicrophone(Arc<Mutex<MicState>>);

impl Microphone for FakeMicrophone {
    fn attach(&mut self, tap: CaptureTap) -> Result<()> {
        let mut state = self.0.lock().unwrap();
        state.attached = true;
        state.tap = Some(tap);
        Ok(())
    }

    fn detach(&mut self) {
        let mut state = self.0.lock().unwrap();
        state.attached = false;
        state.tap = None;
    }

    fn release(&mut self) {
        self.detach();
        self.0.lock().unwrap().released = true;
    }
}

/// Hands out fake microphones and manually clocked mixers
#[derive(Default)]
pub struct FakeBackend {
    pub deny_microphone: bool,
    pub mic: Arc<Mutex<MicState>>,
    pub outputs: Mutex<Vec<MixerHandle>>,
}

impl FakeBackend {
    /// Feed samples through the attached capture tap
    pub fn speak(&self, samples: &[f32]) {
        let mut state = self.mic.lock().unwrap();
        let tap = state.tap.as_mut().expect("microphone not attached");
        tap.push_interleaved(samples, 1);
    }

    /// The most recently opened output
    pub fn output(&self) -> MixerHandle {
        self.outputs.lock().unwrap().last().cloned().expect("no output opened")
    }
}

impl AudioBackend for FakeBackend {
    fn acquire_microphone(&self) -> Result<Box<dyn Microphone>> {
        if self.deny_microphone {
            return Err(Error::PermissionDenied("denied by test".to_string()));
        }
        let mut state = self.mic.lock().unwrap();
        state.acquired += 1;
        state.released = false;
        Ok(Box::new(FakeMicrophone(Arc::clone(&self.mic))))
    }

    fn open_output(
        &self,
        sample_rate: u32,
        ended: mpsc::UnboundedSender<VoiceId>,
    ) -> Result<Box<dyn AudioOutput>> {
        let handle = MixerHandle::new(Mixer::new(sample_rate, Some(ended)));
        self.outputs.lock().unwrap().push(handle.clone());
        Ok(Box::new(handle))
    }
}

/// Remote end of one opened session
pub struct RemoteEnd {
    pub setup: SessionSetup,
    pub outbound: mpsc::UnboundedReceiver<ClientMessage>,
    pub events: mpsc::UnboundedSender<SessionEvent>,
}

/// Connector whose sessions are driven by the test
#[derive(Default)]
pub struct ScriptedConnector {
    pub sessions: Mutex<Vec<RemoteEnd>>,
}

impl ScriptedConnector {
    pub fn opened(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Push an event from the remote side of the latest session
    pub fn emit(&self, event: SessionEvent) {
        let sessions = self.sessions.lock().unwrap();
        let _ = sessions.last().expect("no session").events.send(event);
    }

    /// Drain everything the companion sent on the latest session
    pub fn sent(&self) -> Vec<ClientMessage> {
        let mut sessions = self.sessions.lock().unwrap();
        let remote = sessions.last_mut().expect("no session");
        let mut sent = Vec::new();
        while let Ok(message) = remote.outbound.try_recv() {
            sent.push(message);
        }
        sent
    }

    pub fn system_instruction(&self) -> String {
        let sessions = self.sessions.lock().unwrap();
        sessions.last().expect("no session").setup.system_instruction.clone()
    }
}

impl LiveConnector for ScriptedConnector {
    fn open(&self, setup: SessionSetup) -> LiveSession {
        let (command_tx, outbound) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();
        self.sessions.lock().unwrap().push(RemoteEnd {
            setup,
            outbound,
            events,
        });
        LiveSession {
            handle: SessionHandle::new(command_tx),
            events: event_rx,
        }
    }
}

/// Music search returning a fixed answer
#[derive(Default)]
pub struct StubSearch {
    pub track: Option<Track>,
    pub fail: bool,
    pub queries: Mutex<Vec<(String, String, Option<String>)>>,
}

#[async_trait]
impl MusicSearch for StubSearch {
    async fn search(&self, song: &str, artist: &str, country: Option<&str>) -> Result<Option<Track>> {
        self.queries.lock().unwrap().push((
            song.to_string(),
            artist.to_string(),
            country.map(ToString::to_string),
        ));
        if self.fail {
            return Err(Error::Collaborator("catalogue offline".to_string()));
        }
        Ok(self.track.clone())
    }
}

/// News source returning a fixed digest
pub struct StubNews(pub &'static str);

#[async_trait]
impl NewsSource for StubNews {
    async fn headlines(&self) -> Result<String> {
        Ok(self.0.to_string())
    }
}

/// Music player that only records calls
#[derive(Default)]
pub struct FakePlayer {
    pub plays: Mutex<Vec<String>>,
    pub stops: Mutex<usize>,
    pub fail: bool,
    /// How long a track takes to load before it counts as played
    pub load_delay: Mutex<Duration>,
}

#[async_trait]
impl MusicPlayer for FakePlayer {
    async fn play(&self, url: &str) -> Result<()> {
        let delay = *self.load_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.plays.lock().unwrap().push(url.to_string());
        if self.fail {
            return Err(Error::Audio("no speaker".to_string()));
        }
        Ok(())
    }

    fn stop(&self) {
        *self.stops.lock().unwrap() += 1;
    }
}

/// A preview track
pub fn track(name: &str, artist: &str) -> Track {
    Track {
        name: name.to_string(),
        artist: artist.to_string(),
        preview_url: format!("https://previews.test/{}.m4a", name.to_lowercase()),
    }
}

/// A companion wired to fakes
pub struct Harness {
    pub companion: Companion,
    pub backend: Arc<FakeBackend>,
    pub connector: Arc<ScriptedConnector>,
    pub search: Arc<StubSearch>,
    pub player: Arc<FakePlayer>,
    pub ui: mpsc::UnboundedReceiver<UiEvent>,
    pub commands: mpsc::UnboundedReceiver<kindly::Command>,
    pub command_tx: mpsc::UnboundedSender<kindly::Command>,
}

impl Harness {
    /// Companion without an opening song
    pub fn new() -> Self {
        Self::with(FakeBackend::default(), StubSearch::default(), CompanionSettings {
            playlist: Vec::new(),
            ..CompanionSettings::default()
        })
    }

    pub fn with(backend: FakeBackend, search: StubSearch, settings: CompanionSettings) -> Self {
        let backend = Arc::new(backend);
        let connector = Arc::new(ScriptedConnector::default());
        let search = Arc::new(search);
        let player = Arc::new(FakePlayer::default());
        let (ui_tx, ui) = mpsc::unbounded_channel();
        let (command_tx, commands) = mpsc::unbounded_channel();

        let deps = CompanionDeps {
            backend: Arc::clone(&backend) as Arc<dyn AudioBackend>,
            connector: Arc::clone(&connector) as Arc<dyn LiveConnector>,
            search: Arc::clone(&search) as Arc<dyn MusicSearch>,
            news: Arc::new(StubNews("Tonight's top stories.")),
            music: Arc::clone(&player) as Arc<dyn MusicPlayer>,
            music_ended: None,
        };

        Self {
            companion: Companion::new(deps, settings, ui_tx),
            backend,
            connector,
            search,
            player,
            ui,
            commands,
            command_tx,
        }
    }

    /// Wait for and apply the next event
    pub async fn step(&mut self) -> String {
        let event = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            self.companion.next_event(&mut self.commands),
        )
        .await
        .expect("no event arrived");
        let label = format!("{event:?}");
        self.companion.handle_event(event);
        label
    }

    /// Everything the companion reported so far
    pub fn ui_events(&mut self) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.ui.try_recv() {
            events.push(event);
        }
        events
    }
}
