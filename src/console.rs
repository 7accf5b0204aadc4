//! Terminal presentation
//!
//! The companion reports state changes as [`UiEvent`]s. [`Console`] folds
//! them into a [`StatusLine`] and prints what changed; stdin lines are turned
//! into [`Command`]s.

use std::io::{BufRead, Write};

use tokio::sync::mpsc;

use crate::companion::Command;
use crate::tools::NowPlaying;
use crate::transcript::TranscriptMessage;

/// State changes reported by the companion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// The dial turned on or off
    Active(bool),
    /// New status message
    Status(String),
    /// Music shown as playing changed
    NowPlaying(Option<NowPlaying>),
    /// Text of the turn in progress
    Partial {
        /// Listener text so far
        input: String,
        /// Kindly's text so far
        output: String,
    },
    /// A finished utterance
    Transcript(TranscriptMessage),
}

/// Computes the status to display
#[derive(Debug, Clone, Default)]
pub struct StatusLine {
    active: bool,
    status: String,
    now_playing: Option<NowPlaying>,
    input: String,
    output: String,
}

impl StatusLine {
    /// Fold in one event
    pub fn apply(&mut self, event: &UiEvent) {
        match event {
            UiEvent::Active(active) => self.active = *active,
            UiEvent::Status(status) => self.status.clone_from(status),
            UiEvent::NowPlaying(now_playing) => self.now_playing.clone_from(now_playing),
            UiEvent::Partial { input, output } => {
                self.input.clone_from(input);
                self.output.clone_from(output);
            }
            UiEvent::Transcript(_) => {}
        }
    }

    /// Whether the dial is on
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Status to show
    ///
    /// Music wins, then live speech while a call is active, then the last
    /// status message.
    #[must_use]
    pub fn display(&self) -> String {
        if let Some(playing) = &self.now_playing {
            return format!("Now Playing: \"{}\" by {}", playing.song, playing.artist);
        }
        if self.active {
            if !self.input.is_empty() {
                return "Listening...".to_string();
            }
            if !self.output.is_empty() {
                return "Kindly is speaking...".to_string();
            }
        }
        self.status.clone()
    }
}

/// Prints companion state to a terminal
pub struct Console<W> {
    out: W,
    line: StatusLine,
    shown: Option<String>,
}

impl<W: Write> Console<W> {
    /// Print to `out`
    #[must_use]
    pub fn new(out: W) -> Self {
        Self {
            out,
            line: StatusLine::default(),
            shown: None,
        }
    }

    /// Current status line state
    #[must_use]
    pub const fn status_line(&self) -> &StatusLine {
        &self.line
    }

    /// Apply and print one event
    ///
    /// # Errors
    ///
    /// Returns error if writing to the terminal fails
    pub fn render(&mut self, event: &UiEvent) -> std::io::Result<()> {
        let was_active = self.line.is_active();
        self.line.apply(event);

        match event {
            UiEvent::Active(active) if *active != was_active => {
                writeln!(self.out, "{}", if *active { "((( on air )))" } else { "--- off air ---" })?;
            }
            UiEvent::Transcript(message) => {
                writeln!(self.out, "{}: {}", message.speaker, message.text.trim())?;
            }
            _ => {}
        }

        let display = self.line.display();
        if self.shown.as_deref() != Some(display.as_str()) && !display.is_empty() {
            writeln!(self.out, "[{display}]")?;
            self.shown = Some(display);
        }
        self.out.flush()
    }

    /// Print events until the companion goes away
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<UiEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.render(&event) {
                tracing::warn!(error = %e, "failed to write to terminal");
            }
        }
    }
}

/// Map one line of input to a command
#[must_use]
pub fn parse_command(line: &str) -> Command {
    match line.trim().to_lowercase().as_str() {
        "q" | "quit" | "exit" => Command::Quit,
        _ => Command::Toggle,
    }
}

/// Forward stdin lines as commands until EOF or quit
///
/// Reads on a dedicated thread so a pending read never holds up shutdown.
///
/// # Errors
///
/// Returns error if the thread cannot be spawned
pub fn spawn_command_reader(
    commands: mpsc::UnboundedSender<Command>,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("kindly-stdin".to_string())
        .spawn(move || {
            let mut lines = std::io::stdin().lock().lines();
            loop {
                let command = match lines.next() {
                    Some(Ok(line)) => parse_command(&line),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "failed to read stdin");
                        Command::Quit
                    }
                    None => Command::Quit,
                };
                if commands.send(command).is_err() || command == Command::Quit {
                    break;
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Speaker;

    fn playing() -> NowPlaying {
        NowPlaying {
            song: "Marraskuu".to_string(),
            artist: "Miljoonasade".to_string(),
        }
    }

    #[test]
    fn now_playing_wins() {
        let mut line = StatusLine::default();
        line.apply(&UiEvent::Active(true));
        line.apply(&UiEvent::Status("Connected.".to_string()));
        line.apply(&UiEvent::Partial {
            input: "hi".to_string(),
            output: String::new(),
        });
        line.apply(&UiEvent::NowPlaying(Some(playing())));
        assert_eq!(line.display(), "Now Playing: \"Marraskuu\" by Miljoonasade");

        line.apply(&UiEvent::NowPlaying(None));
        assert_eq!(line.display(), "Listening...");
    }

    #[test]
    fn speaking_only_while_active() {
        let mut line = StatusLine::default();
        line.apply(&UiEvent::Status("Press Enter to start".to_string()));
        line.apply(&UiEvent::Partial {
            input: String::new(),
            output: "Hello".to_string(),
        });
        assert_eq!(line.display(), "Press Enter to start");

        line.apply(&UiEvent::Active(true));
        assert_eq!(line.display(), "Kindly is speaking...");
    }

    #[test]
    fn console_prints_changes_once() {
        let mut console = Console::new(Vec::new());
        console.render(&UiEvent::Status("Getting microphone...".to_string())).unwrap();
        console.render(&UiEvent::Status("Getting microphone...".to_string())).unwrap();
        console.render(&UiEvent::Active(true)).unwrap();
        console
            .render(&UiEvent::Transcript(TranscriptMessage {
                speaker: Speaker::Model,
                text: "Hello there ".to_string(),
            }))
            .unwrap();

        let printed = String::from_utf8(console.out).unwrap();
        assert_eq!(
            printed,
            "[Getting microphone...]\n((( on air )))\nKindly: Hello there\n"
        );
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command(""), Command::Toggle);
        assert_eq!(parse_command(" Q "), Command::Quit);
        assert_eq!(parse_command("quit"), Command::Quit);
        assert_eq!(parse_command("start"), Command::Toggle);
    }
}
