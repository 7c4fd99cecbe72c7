use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Bot,
    User,
}

/// One message in the interview transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn bot(content: impl Into<String>) -> Self {
        Self {
            role: Role::Bot,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

/// Questions asked and answers given, ignoring blank turns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscriptCounts {
    pub questions: usize,
    pub answers: usize,
}

impl TranscriptCounts {
    pub fn is_degenerate(&self) -> bool {
        self.answers == 0
    }

    pub fn is_partial(&self) -> bool {
        self.answers > 0 && self.answers < self.questions
    }
}

pub fn count_turns(turns: &[Turn]) -> TranscriptCounts {
    turns
        .iter()
        .filter(|t| t.has_content())
        .fold(TranscriptCounts::default(), |mut counts, turn| {
            match turn.role {
                Role::Bot => counts.questions += 1,
                Role::User => counts.answers += 1,
            }
            counts
        })
}

/// Serializes the transcript into the "Interviewer: ... / Candidate: ..." document
/// the summary service consumes.
pub fn render_transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| {
            let speaker = match t.role {
                Role::Bot => "Interviewer",
                Role::User => "Candidate",
            };
            format!("{speaker}: {}", t.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
