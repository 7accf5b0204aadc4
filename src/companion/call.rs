//! Resources owned by one start/stop cycle

use std::pin::Pin;

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use uuid::Uuid;

use super::CompanionEvent;
use crate::live::{SessionEvent, SessionHandle};
use crate::tools::{NowPlaying, ToolOutcome};
use crate::voice::{AudioBlock, CapturePipeline, PlaybackScheduler, VoiceId};

/// One call, from microphone acquisition to teardown
///
/// Every resource lives here so a call is released as a unit. `cancelled`
/// is set before anything is released; event handlers check it before
/// touching the call.
pub(super) struct Call {
    pub id: Uuid,
    pub cancelled: bool,
    pub capture: CapturePipeline,
    pub blocks_tx: mpsc::UnboundedSender<AudioBlock>,
    blocks: mpsc::UnboundedReceiver<AudioBlock>,
    pub playback: Option<PlaybackScheduler>,
    pub playback_ended: Option<mpsc::UnboundedReceiver<VoiceId>>,
    pub session: Option<SessionHandle>,
    pub session_events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    pub preroll: Option<BoxFuture<'static, Option<NowPlaying>>>,
    pub preroll_timer: Option<(Pin<Box<Sleep>>, NowPlaying)>,
    pub tools: FuturesUnordered<BoxFuture<'static, ToolOutcome>>,
    music_task: Option<JoinHandle<()>>,
}

async fn recv_opt<T>(rx: Option<&mut mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn poll_preroll(
    preroll: Option<&mut BoxFuture<'static, Option<NowPlaying>>>,
) -> Option<NowPlaying> {
    match preroll {
        Some(preroll) => preroll.await,
        None => std::future::pending().await,
    }
}

async fn wait_timer(timer: Option<&mut (Pin<Box<Sleep>>, NowPlaying)>) {
    match timer {
        Some((sleep, _)) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

impl Call {
    pub fn new(capture: CapturePipeline) -> Self {
        let (blocks_tx, blocks) = mpsc::unbounded_channel();
        Self {
            id: Uuid::new_v4(),
            cancelled: false,
            capture,
            blocks_tx,
            blocks,
            playback: None,
            playback_ended: None,
            session: None,
            session_events: None,
            preroll: None,
            preroll_timer: None,
            tools: FuturesUnordered::new(),
            music_task: None,
        }
    }

    /// Wait for the next thing to happen on this call
    ///
    /// Completed one-shot sources (pre-roll, timer) are cleared so they are
    /// never polled again.
    pub async fn next_event(&mut self) -> CompanionEvent {
        enum Ready {
            Event(CompanionEvent),
            Preroll(Option<NowPlaying>),
            Timer,
        }

        let ready = tokio::select! {
            Some(event) = recv_opt(self.session_events.as_mut()) => Ready::Event(CompanionEvent::Session(event)),
            Some(block) = self.blocks.recv() => Ready::Event(CompanionEvent::CaptureBlock(block)),
            Some(voice) = recv_opt(self.playback_ended.as_mut()) => Ready::Event(CompanionEvent::PlaybackEnded(voice)),
            Some(outcome) = self.tools.next(), if !self.tools.is_empty() => {
                Ready::Event(CompanionEvent::ToolFinished(outcome))
            }
            played = poll_preroll(self.preroll.as_mut()) => Ready::Preroll(played),
            () = wait_timer(self.preroll_timer.as_mut()) => Ready::Timer,
        };

        match ready {
            Ready::Event(event) => event,
            Ready::Preroll(played) => {
                self.preroll = None;
                CompanionEvent::PrerollResolved(played)
            }
            Ready::Timer => {
                let song = self.preroll_timer.take().map(|(_, song)| song);
                CompanionEvent::PrerollElapsed(song)
            }
        }
    }

    /// Close the remote session; best-effort
    pub fn close_session(&mut self) {
        self.session_events = None;
        if let Some(session) = self.session.take()
            && let Err(e) = session.close()
        {
            tracing::debug!(call_id = %self.id, error = %e, "session close not delivered");
        }
    }

    /// Track a music load started by a tool, aborting any earlier one
    pub fn set_music_task(&mut self, task: JoinHandle<()>) {
        if let Some(previous) = self.music_task.replace(task) {
            previous.abort();
        }
    }

    /// Abort a music load still in flight
    pub fn abort_music(&mut self) {
        if let Some(task) = self.music_task.take() {
            task.abort();
        }
    }

    /// Release audio resources and drop pending work
    pub fn release(&mut self) {
        self.abort_music();
        self.preroll = None;
        self.preroll_timer = None;
        self.tools = FuturesUnordered::new();

        if let Some(mut playback) = self.playback.take() {
            playback.close();
        }
        self.playback_ended = None;
        self.capture.stop();
    }
}
