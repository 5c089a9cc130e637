//! Finished consultation record and its two renderings

use chrono::{DateTime, Local};
use serde_json::{json, Value};

use crate::error::ConsultError;
use crate::script::{field_title, ExtractionResult};
use crate::transcript::{TranscriptStore, Turn};

/// Maximum characters of the first/last turn shown in the report summary
pub const PREVIEW_CHARS: usize = 50;

/// Timestamp format used in file names
const TIMESTAMP_KEY_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Human-readable completion time
const DISPLAY_FORMAT: &str = "%Y년 %m월 %d일 %H:%M:%S";

/// A consultation bundled for persistence
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    user_id: String,
    created_at: DateTime<Local>,
    turns: Vec<Turn>,
    script: ExtractionResult,
}

impl SessionRecord {
    /// Bundle a transcript snapshot and an extraction attempt.
    pub fn finalize(
        user_id: &str,
        transcript: &TranscriptStore,
        script: ExtractionResult,
        now: DateTime<Local>,
    ) -> Result<Self, ConsultError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(ConsultError::invalid("user id must not be empty"));
        }
        if transcript.is_empty() {
            return Err(ConsultError::invalid("cannot finalize an empty transcript"));
        }

        Ok(Self {
            user_id: user_id.to_string(),
            created_at: now,
            turns: transcript.turns().to_vec(),
            script,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn script(&self) -> &ExtractionResult {
        &self.script
    }

    /// `YYYYmmdd_HHMMSS` key used to name stored files
    pub fn timestamp_key(&self) -> String {
        self.created_at.format(TIMESTAMP_KEY_FORMAT).to_string()
    }

    /// Machine-readable rendering of the whole record
    pub fn to_structured_document(&self) -> Value {
        let messages: Vec<Value> = self
            .turns
            .iter()
            .enumerate()
            .map(|(i, turn)| {
                json!({
                    "id": i + 1,
                    "role": turn.speaker().label(),
                    "speaker": turn.speaker(),
                    "content": turn.text(),
                })
            })
            .collect();

        let consultation_script = match &self.script {
            ExtractionResult::Success(fields) => json!(fields),
            ExtractionResult::Failure(failure) => json!({
                "error": failure.reason,
                "kind": failure.kind,
                "raw_response": failure.raw_text,
            }),
        };

        json!({
            "user_id": self.user_id,
            "timestamp": self.timestamp_key(),
            "created_at": self.created_at.to_rfc3339(),
            "created_at_display": self.created_at.format(DISPLAY_FORMAT).to_string(),
            "conversation": {
                "total_messages": self.turns.len(),
                "messages": messages,
            },
            "consultation_script": consultation_script,
        })
    }

    /// Markdown report for people
    pub fn to_human_report(&self) -> String {
        let mut report = String::new();

        report.push_str("# 의사 상담 완료 보고서\n\n");
        report.push_str("## 사용자 정보\n");
        report.push_str(&format!("- **사용자 ID**: {}\n", self.user_id));
        report.push_str(&format!(
            "- **상담 완료일시**: {}\n\n",
            self.created_at.format(DISPLAY_FORMAT)
        ));

        report.push_str("## 상담 요약\n");
        report.push_str(&format!("- **총 대화 수**: {}개\n", self.turns.len()));
        if let (Some(first), Some(last)) = (self.turns.first(), self.turns.last()) {
            report.push_str(&format!("- **상담 시작**: {}\n", preview_turn(first)));
            report.push_str(&format!("- **상담 종료**: {}\n", preview_turn(last)));
        }
        report.push('\n');

        match &self.script {
            ExtractionResult::Success(fields) => {
                report.push_str("## 환자가 꼭 말해야 할 내용\n\n");
                for (key, value) in fields.patient_must_tell.entries() {
                    push_field(&mut report, key, value);
                }
                report.push_str("## 의사가 꼭 말해야 할 내용\n\n");
                for (key, value) in fields.doctor_must_tell.entries() {
                    push_field(&mut report, key, value);
                }
            }
            ExtractionResult::Failure(failure) => {
                report.push_str("## 스크립트 생성 실패\n\n");
                report.push_str(&format!(
                    "상담 스크립트를 생성하지 못했습니다 ({}): {}\n\n",
                    failure.kind, failure.reason
                ));
                let fence = code_fence_for(&failure.raw_text);
                report.push_str(&format!("### 원본 응답\n\n{}\n", fence));
                report.push_str(&failure.raw_text);
                report.push_str(&format!("\n{}\n", fence));
            }
        }

        report
    }
}

fn push_field(report: &mut String, key: &str, value: &str) {
    report.push_str(&format!("### {} (`{}`)\n{}\n\n", field_title(key), key, value));
}

/// Backtick fence longer than any backtick run inside `text`
fn code_fence_for(text: &str) -> String {
    let longest = text
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

fn preview_turn(turn: &Turn) -> String {
    format!("{}: {}", turn.speaker().label(), preview(turn.text(), PREVIEW_CHARS))
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `...`
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
