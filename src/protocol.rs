//! Brain wire protocol types and the frame decoder.
//!
//! One frame = one UTF-8 text line. The Brain speaks a loose, human-readable
//! protocol:
//!
//! ```text
//! "ACK"                      — acknowledgment sentinel, consumed by the bridge
//! "[AUDIO] <path>"           — play the synthesized voice clip at <path>
//! "[<TAG>] <free text>"      — chat line with a leading emotion tag
//! "<free text>"              — plain chat line
//! ```
//!
//! `<TAG>` is matched strictly: the substring between the first `[` and the
//! first `]` must be exactly one of the recognized emotion tags
//! (case-insensitive). Anything else — unknown tags, reversed or unpaired
//! brackets — leaves the frame untouched and it decodes as plain chat.
//! Decoding is total: every line yields at least one [`Event`], never an
//! error.

// Rust guideline compliant 2026-02

use chrono::{DateTime, Utc};

// ─── Emotion tags ──────────────────────────────────────────────────────────

/// Recognized emotion tags the Brain can attach to a chat line.
///
/// The set is closed: a bracketed token outside this list is not a control
/// signal and stays embedded in the chat text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmotionTag {
    /// Baseline expression.
    Normal,
    /// Smile / raised cheeks.
    Happy,
    /// Downcast expression.
    Sad,
    /// Brows down, mouth tight.
    Angry,
    /// Wide eyes.
    Surprised,
    /// Blush / averted gaze.
    Shy,
    /// High-energy variant of Happy.
    Excited,
    /// Pondering pose.
    Think,
}

impl EmotionTag {
    /// All recognized tags, in wire-name order.
    pub const ALL: [EmotionTag; 8] = [
        EmotionTag::Happy,
        EmotionTag::Sad,
        EmotionTag::Angry,
        EmotionTag::Surprised,
        EmotionTag::Shy,
        EmotionTag::Excited,
        EmotionTag::Normal,
        EmotionTag::Think,
    ];

    /// The wire spelling of the tag (upper-case, no brackets).
    pub fn as_str(self) -> &'static str {
        match self {
            EmotionTag::Normal => "NORMAL",
            EmotionTag::Happy => "HAPPY",
            EmotionTag::Sad => "SAD",
            EmotionTag::Angry => "ANGRY",
            EmotionTag::Surprised => "SURPRISED",
            EmotionTag::Shy => "SHY",
            EmotionTag::Excited => "EXCITED",
            EmotionTag::Think => "THINK",
        }
    }

    /// Parse a candidate tag token (without brackets), case-insensitively.
    ///
    /// Returns `None` for anything outside the recognized set.
    pub fn parse(token: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|tag| token.eq_ignore_ascii_case(tag.as_str()))
    }
}

impl std::fmt::Display for EmotionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Protocol literals ─────────────────────────────────────────────────────

/// Acknowledgment frame sent by the Brain after a handshake.
pub const ACK_FRAME: &str = "ACK";

/// Prefix of an audio-cue frame.
const AUDIO_PREFIX: &str = "[AUDIO]";

/// Build the handshake frame announcing this client to the Brain.
///
/// Also reused verbatim as the heartbeat frame.
pub fn handshake_frame(client_name: &str) -> String {
    format!("{client_name} Connected")
}

// ─── Events ────────────────────────────────────────────────────────────────

/// A decoded control event, immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Switch the avatar's expression.
    Emotion {
        /// The recognized tag.
        tag: EmotionTag,
    },
    /// Play a voice clip from disk.
    Audio {
        /// Absolute or relative path as sent by the Brain, trimmed.
        path: String,
    },
    /// Display a chat line.
    Chat {
        /// The line with any recognized tag span removed, trimmed.
        text: String,
        /// The tag the line arrived with, `Normal` for plain chat.
        emotion: EmotionTag,
    },
    /// Acknowledgment sentinel. Counted by the dispatcher, never delivered
    /// to handlers.
    Ack,
    /// A frame with no usable content (empty or whitespace-only).
    Unknown {
        /// The raw frame text.
        text: String,
    },
}

impl Event {
    /// The registry key this event dispatches under.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Emotion { .. } => EventKind::Emotion,
            Event::Audio { .. } => EventKind::Audio,
            Event::Chat { .. } => EventKind::Chat,
            Event::Ack => EventKind::Ack,
            Event::Unknown { .. } => EventKind::Unknown,
        }
    }
}

/// Event discriminant used as the handler-registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`Event::Emotion`]
    Emotion,
    /// [`Event::Audio`]
    Audio,
    /// [`Event::Chat`]
    Chat,
    /// [`Event::Ack`]
    Ack,
    /// [`Event::Unknown`]
    Unknown,
}

// ─── Raw frames ────────────────────────────────────────────────────────────

/// One received line, stamped on arrival by the listener.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// UTF-8 payload (newline delimiter already stripped).
    pub text: String,
    /// Arrival time at the bridge.
    pub received_at: DateTime<Utc>,
}

impl RawFrame {
    /// Stamp a received line with the current time.
    pub fn new(text: String) -> Self {
        Self {
            text,
            received_at: Utc::now(),
        }
    }
}

// ─── Decoder ───────────────────────────────────────────────────────────────

/// Decode one frame into its events. Total: always yields at least one.
///
/// Decision order, first match wins:
///
/// 1. Exact `"ACK"` → [`Event::Ack`].
/// 2. `"[AUDIO] <path>"` → [`Event::Audio`] with the path trimmed.
/// 3. A recognized tag between the first `[` and the first `]` →
///    [`Event::Emotion`], then [`Event::Chat`] with that one bracketed span
///    removed and the remainder trimmed (suppressed when nothing remains).
/// 4. Everything else → [`Event::Chat`] with the line unchanged, or
///    [`Event::Unknown`] when the line is blank.
pub fn decode_line(line: &str) -> Vec<Event> {
    // 1. Acknowledgment sentinel — exact match only; "ACK" inside a longer
    //    line is ordinary chat.
    if line == ACK_FRAME {
        return vec![Event::Ack];
    }

    // 2. Audio cue.
    if let Some(rest) = line.strip_prefix(AUDIO_PREFIX) {
        return vec![Event::Audio {
            path: rest.trim().to_string(),
        }];
    }

    // 3. Leading recognized emotion tag. The span checked is strictly the
    //    first '[' to the first ']'; reversed or unpaired brackets fail the
    //    window check and fall through.
    if let Some((tag, remainder)) = split_tagged(line) {
        let mut events = vec![Event::Emotion { tag }];
        if !remainder.is_empty() {
            events.push(Event::Chat {
                text: remainder,
                emotion: tag,
            });
        }
        return events;
    }

    // 4. Plain chat, or nothing at all.
    if line.trim().is_empty() {
        return vec![Event::Unknown {
            text: line.to_string(),
        }];
    }
    vec![Event::Chat {
        text: line.to_string(),
        emotion: EmotionTag::Normal,
    }]
}

/// Extract a recognized tag from the first bracketed span of `line`.
///
/// Returns the tag and the line with exactly that span removed and trimmed,
/// or `None` when the span is absent, malformed, or not a recognized tag.
fn split_tagged(line: &str) -> Option<(EmotionTag, String)> {
    let start = line.find('[')?;
    let end = line.find(']')?;
    if end <= start {
        return None;
    }
    let tag = EmotionTag::parse(&line[start + 1..end])?;
    let mut remainder = String::with_capacity(line.len());
    remainder.push_str(&line[..start]);
    remainder.push_str(&line[end + 1..]);
    Some((tag, remainder.trim().to_string()))
}

// ─── Tests ─────────────────────────────────────────────────────────────────
