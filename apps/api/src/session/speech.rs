//! Voice input: transcript normalization, recognizer alternative selection,
//! error classification and the recording toggle.
//!
//! The recognizer itself runs on the client; it relays results and lifecycle
//! events here and follows the returned directives.

use std::time::Duration;

use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};

/// Below this, a better-scored alternative replaces the top hypothesis.
pub const LOW_CONFIDENCE_THRESHOLD: f32 = 0.7;
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(100);

const FILLER_PATTERNS: &[&str] = &[
    r"(?i)\b(ahh|uhh|umm|uhm|ah|uh|er|um|eh|oh)\b",
    r"(?i)\b(like|you know|I mean|sort of|kind of)\b",
    r"(?i)\b(actually|basically|literally)\b",
];

const DEFAULT_CORRECTIONS: &[(&str, &str)] = &[
    ("da", "the"),
    ("dis", "this"),
    ("dat", "that"),
    ("wat", "what"),
    ("wud", "would"),
    ("wudnt", "wouldn't"),
    ("cud", "could"),
    ("shud", "should"),
    ("hav", "have"),
    ("havnt", "haven't"),
    ("dont", "don't"),
    ("wont", "won't"),
    ("cant", "can't"),
    ("isnt", "isn't"),
    ("wasnt", "wasn't"),
    ("werent", "weren't"),
];

/// Word-level fixes for informal or misrecognized forms. Matching is
/// whole-word and case-insensitive.
#[derive(Debug, Clone)]
pub struct DialectCorrections {
    pairs: Vec<(String, String)>,
}

impl DialectCorrections {
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            pairs: pairs.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }
}

impl Default for DialectCorrections {
    fn default() -> Self {
        Self::new(
            DEFAULT_CORRECTIONS
                .iter()
                .map(|(w, r)| (w.to_string(), r.to_string())),
        )
    }
}

/// Cleans final recognizer chunks before they reach the draft answer.
///
/// Pipeline: strip fillers → dialect corrections → tidy punctuation left
/// behind and collapse whitespace → capitalize the first letter.
#[derive(Debug, Clone)]
pub struct TranscriptNormalizer {
    fillers: Vec<Regex>,
    corrections: Vec<(Regex, String)>,
    space_before_punct: Regex,
    repeated_punct: Regex,
    leading_punct: Regex,
    whitespace: Regex,
}

impl TranscriptNormalizer {
    pub fn new(corrections: &DialectCorrections) -> Result<Self, regex::Error> {
        let fillers = FILLER_PATTERNS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        let corrections = corrections
            .pairs
            .iter()
            .map(|(wrong, right)| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(wrong)))
                    .map(|re| (re, right.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            fillers,
            corrections,
            space_before_punct: Regex::new(r"\s+([,;:])")?,
            repeated_punct: Regex::new(r"([,;:])(?:\s*[,;:])+")?,
            leading_punct: Regex::new(r"^[\s,;:]+")?,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    pub fn clean(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mut cleaned = text.to_string();
        for filler in &self.fillers {
            cleaned = filler.replace_all(&cleaned, "").into_owned();
        }
        for (pattern, replacement) in &self.corrections {
            cleaned = pattern
                .replace_all(&cleaned, NoExpand(replacement))
                .into_owned();
        }

        // Removing "like," from "on, like, a" leaves "on, , a".
        cleaned = self.space_before_punct.replace_all(&cleaned, "$1").into_owned();
        cleaned = self.repeated_punct.replace_all(&cleaned, "$1").into_owned();
        cleaned = self.leading_punct.replace(&cleaned, "").into_owned();
        cleaned = self.whitespace.replace_all(&cleaned, " ").trim().to_string();

        capitalize_first(&cleaned)
    }
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if !first.is_uppercase() => {
            first.to_uppercase().collect::<String>() + chars.as_str()
        }
        _ => text.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alternative {
    pub transcript: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// One recognizer result with its ranked hypotheses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    pub is_final: bool,
    pub alternatives: Vec<Alternative>,
}

impl RecognitionResult {
    /// Top hypothesis, unless it is below the confidence threshold and a later
    /// alternative scores strictly higher.
    pub fn best_transcript(&self) -> Option<&str> {
        let (top, rest) = self.alternatives.split_first()?;
        let top_confidence = top.confidence.unwrap_or(0.0);
        if top_confidence < LOW_CONFIDENCE_THRESHOLD {
            if let Some(better) = rest
                .iter()
                .find(|alt| alt.confidence.unwrap_or(0.0) > top_confidence)
            {
                return Some(&better.transcript);
            }
        }
        Some(&top.transcript)
    }
}

/// Normalizes the final results of a recognizer event into one chunk.
/// Interim results are discarded.
pub fn merge_final_results(
    normalizer: &TranscriptNormalizer,
    results: &[RecognitionResult],
) -> Option<String> {
    let chunks: Vec<String> = results
        .iter()
        .filter(|r| r.is_final)
        .filter_map(|r| r.best_transcript())
        .map(|t| normalizer.clean(t))
        .filter(|t| !t.is_empty())
        .collect();

    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join(" "))
    }
}

/// Appends a chunk to the draft with a single separating space.
pub fn append_to_draft(draft: &mut String, chunk: &str) {
    if !draft.is_empty() && !draft.ends_with(' ') {
        draft.push(' ');
    }
    draft.push_str(chunk);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecognizerErrorKind {
    NoSpeech,
    AudioCapture,
    NotAllowed,
    Network,
    #[serde(untagged)]
    Other(String),
}

/// User-facing message for a recognizer error.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SpeechNotice {
    pub message: String,
}

impl RecognizerErrorKind {
    /// `None` for errors the user should not see.
    pub fn notice(&self) -> Option<SpeechNotice> {
        let message = match self {
            RecognizerErrorKind::NoSpeech | RecognizerErrorKind::Other(_) => return None,
            RecognizerErrorKind::AudioCapture => {
                "Microphone not found. Please check your microphone settings."
            }
            RecognizerErrorKind::NotAllowed => {
                "Microphone permission denied. Please allow microphone access."
            }
            RecognizerErrorKind::Network => "Network error. Please check your connection.",
        };
        Some(SpeechNotice {
            message: message.to_string(),
        })
    }

    /// Silence while thinking is normal and keeps the recorder running.
    pub fn stops_recording(&self) -> bool {
        !matches!(self, RecognizerErrorKind::NoSpeech)
    }
}

/// Instruction for the client-side recognizer.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum CaptureDirective {
    Start,
    Stop,
    RestartAfter { delay_ms: u64 },
    Nothing,
}

/// Key chord sent by the client; Ctrl+Space or Cmd+Space toggles recording.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyChord {
    pub key: String,
    #[serde(default)]
    pub ctrl_key: bool,
    #[serde(default)]
    pub meta_key: bool,
}

impl KeyChord {
    pub fn is_recording_toggle(&self) -> bool {
        (self.ctrl_key || self.meta_key) && self.key == " "
    }
}

/// Recording state for one session.
#[derive(Debug, Clone)]
pub struct SpeechCapture {
    recording: bool,
    restart_delay: Duration,
}

impl SpeechCapture {
    pub fn new(restart_delay: Duration) -> Self {
        Self {
            recording: false,
            restart_delay,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn toggle(&mut self) -> CaptureDirective {
        self.recording = !self.recording;
        if self.recording {
            CaptureDirective::Start
        } else {
            CaptureDirective::Stop
        }
    }

    pub fn stop(&mut self) -> CaptureDirective {
        if self.recording {
            self.recording = false;
            CaptureDirective::Stop
        } else {
            CaptureDirective::Nothing
        }
    }

    pub fn on_error(&mut self, kind: &RecognizerErrorKind) -> Option<SpeechNotice> {
        if kind.stops_recording() {
            self.recording = false;
        }
        kind.notice()
    }

    /// The engine ended on its own. Restart after a short delay if the user
    /// still wants to record, so an engine that dies on start cannot spin.
    pub fn on_end(&self) -> CaptureDirective {
        if self.recording {
            CaptureDirective::RestartAfter {
                delay_ms: self.restart_delay.as_millis() as u64,
            }
        } else {
            CaptureDirective::Nothing
        }
    }

    pub fn on_restart_failed(&mut self) {
        self.recording = false;
    }
}
