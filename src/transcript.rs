//! Consultation transcript state

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConsultError;

/// Who said a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Patient,
    Doctor,
}

impl Speaker {
    /// Label shown to patients and written into reports
    pub fn label(self) -> &'static str {
        match self {
            Speaker::Patient => "환자",
            Speaker::Doctor => "의사",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Patient => write!(f, "patient"),
            Speaker::Doctor => write!(f, "doctor"),
        }
    }
}

/// One utterance in the consultation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    speaker: Speaker,
    text: String,
}

impl Turn {
    pub fn speaker(&self) -> Speaker {
        self.speaker
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Ordered, append-only history of a single consultation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TranscriptStore {
    turns: Vec<Turn>,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a turn at the end of the transcript.
    ///
    /// Whitespace-only text is rejected the same way as empty text.
    pub fn append(
        &mut self,
        speaker: Speaker,
        text: impl Into<String>,
    ) -> Result<(), ConsultError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ConsultError::invalid(format!(
                "{} message must not be empty",
                speaker
            )));
        }
        self.turns.push(Turn { speaker, text });
        Ok(())
    }

    /// Drop every turn
    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn first(&self) -> Option<&Turn> {
        self.turns.first()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }
}
