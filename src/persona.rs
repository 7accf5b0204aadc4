//! Kindly's persona
//!
//! The radio-host character, the nostalgia playlist used for the opening
//! song, and the system instruction handed to the live model.

use chrono::{DateTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use crate::tools::NowPlaying;

/// A song to look up in the catalogue
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SongRequest {
    /// Performing artist
    pub artist: String,
    /// Song title
    pub song: String,
}

impl SongRequest {
    fn new(artist: &str, song: &str) -> Self {
        Self {
            artist: artist.to_string(),
            song: song.to_string(),
        }
    }
}

/// Finnish hits used for the opening memory segment
#[must_use]
pub fn default_playlist() -> Vec<SongRequest> {
    [
        ("Dingo", "Autiotalo"),
        ("Eppu Normaali", "Vuonna '85"),
        ("Popeda", "Kuuma kesä"),
        ("Leevi and the Leavings", "Teuvo, maanteiden kuningas"),
        ("J. Karjalainen", "Ankkurinappi"),
        ("Yö", "Joutsenlaulu"),
        ("Hassisen Kone", "Rappiolla"),
        ("Neljä Ruusua", "Juppihippipunkkari"),
        ("Miljoonasade", "Marraskuu"),
        ("Apulanta", "Mitä kuuluu"),
    ]
    .into_iter()
    .map(|(artist, song)| SongRequest::new(artist, song))
    .collect()
}

const BASE_INSTRUCTION: &str = "\
You are Kindly, an AI companion who sounds like a familiar, warm radio host keeping an older adult company.
You are patient, cheerful and respectful, and you never talk down to the listener.
Be a gentle, curious conversationalist. Help the listener revisit memories and tell stories from their life, \
and build open-ended follow-up questions from what they say. Listen actively and show real interest.

When the listener stays quiet after a turn, allow a short natural pause of a few seconds, then carry on with the \
broadcast or bring up a new topic that fits. The experience should feel like continuous, ambient radio.

Once any opening memory segment is over, settle into your regular programme schedule:
- Around mid-day, run a \"Movement Minute\": encourage seated stretches or simple movements as a light exercise show.
- In the afternoon, host \"Memory Lane\": use a nostalgic reference such as an old song or jingle and ask \
where they were when they used to hear it.
- In the evening, host the \"Evening Reflection Show\": ask how their day was and listen patiently.

You can play a song the listener asks for with the 'playMusic' tool and stop it with the 'stopMusic' tool.
You can read the latest world news headlines with the 'getNewsHeadlines' tool.

Above all you are a bridge back to the world around them. Encourage calling family, chatting with neighbours \
and joining local community events. You are a companion, not a replacement for people.
Keep your replies short and speak clearly.";

fn opening(played: Option<&NowPlaying>) -> String {
    match played {
        Some(track) => format!(
            "When the session begins, a short clip of \"{song}\" by {artist} has just finished playing for the listener.
You must speak first. Do not wait for the listener.
Start by gently talking with them about the song they just heard and the memories it brings back. \
Stay flexible and keep the conversation moving. For example: \"We just listened to '{song}' by {artist}... \
Does that bring back any memories for you?\"",
            song = track.song,
            artist = track.artist,
        ),
        None => "When the session begins, you must speak first. Do not wait for the listener. \
Start by greeting them warmly, for example: \"Hello there, it's Kindly. So nice of you to tune in.\""
            .to_string(),
    }
}

/// Name of the programme slot for an hour of the day
#[must_use]
pub const fn programme_slot(hour: u32) -> &'static str {
    match hour {
        5..=10 => "morning",
        11..=13 => "mid-day",
        14..=17 => "afternoon",
        18..=22 => "evening",
        _ => "late night",
    }
}

fn clock_note<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "For your schedule: it is currently {} local time ({}).",
        now.format("%A, %H:%M"),
        programme_slot(now.hour()),
    )
}

/// Build the system instruction for a new session
///
/// `played` is the song whose clip actually finished playing during the
/// pre-roll, if any; the model then opens by talking about it.
#[must_use]
pub fn build_system_instruction<Tz: TimeZone>(
    played: Option<&NowPlaying>,
    now: &DateTime<Tz>,
) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}\n\n{}\n\n{}", opening(played), BASE_INSTRUCTION, clock_note(now))
}
