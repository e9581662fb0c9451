//! Splits streamed assistant output into speakable segments for the
//! avatar.
//!
//! The first segment waits for `FIRST_SEGMENT_MIN_CHARS` characters so
//! the avatar doesn't start on a lone word. After that a segment is cut
//! whenever a chunk ends on sentence punctuation. Whatever is left when
//! the stream ends goes out as the final segment.
use serde::Serialize;

pub const FIRST_SEGMENT_MIN_CHARS: usize = 20;
pub const SENTENCE_TERMINATORS: [char; 9] = ['。', '！', '？', '；', ',', '.', '!', '?', ';'];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub text: String,
    pub is_start: bool,
    pub is_end: bool,
}

/// Receives narration for the avatar. Neither `narrate` nor `interrupt`
/// may block the caller: implementations enqueue the request in call
/// order and resolve delivery in the background, logging failures.
pub trait NarrationSink: Send + Sync {
    fn is_active(&self) -> bool;

    fn narrate(&self, segment: Segment);

    /// Stops any narration in progress. Anything narrated after this
    /// call is queued behind the interrupt.
    fn interrupt(&self);
}

#[derive(Debug, Default)]
pub struct NarrationSegmenter {
    pending: String,
    first_sent: bool,
    produced: bool,
}

impl NarrationSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next chunk of the stream, returning a segment when one
    /// is ready to be spoken.
    pub fn push(&mut self, chunk: &str) -> Option<Segment> {
        if chunk.is_empty() {
            return None;
        }
        self.pending.push_str(chunk);
        self.produced = true;

        if !self.first_sent {
            if self.pending.chars().count() >= FIRST_SEGMENT_MIN_CHARS {
                self.first_sent = true;
                return Some(self.flush(true, false));
            }
            return None;
        }

        let ends_sentence = chunk
            .chars()
            .last()
            .is_some_and(|c| SENTENCE_TERMINATORS.contains(&c));
        if ends_sentence && !self.pending.is_empty() {
            return Some(self.flush(false, false));
        }
        None
    }

    /// Closes out narration. Sends an empty end marker if the stream
    /// produced text but nothing is pending so the avatar can reset.
    pub fn finish(mut self) -> Option<Segment> {
        if !self.pending.is_empty() {
            let is_start = !self.first_sent;
            return Some(self.flush(is_start, true));
        }
        if self.produced {
            return Some(Segment {
                text: String::new(),
                is_start: false,
                is_end: true,
            });
        }
        None
    }

    fn flush(&mut self, is_start: bool, is_end: bool) -> Segment {
        Segment {
            text: std::mem::take(&mut self.pending),
            is_start,
            is_end,
        }
    }
}
