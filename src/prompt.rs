//! Prompt construction for the doctor persona and the script summary
//!
//! Both builders are pure: the same transcript and instruction text always
//! produce the same messages.

use serde::{Deserialize, Serialize};

use crate::error::ConsultError;
use crate::transcript::{Speaker, TranscriptStore};

/// Role of a message in a chat completion request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl From<Speaker> for ChatRole {
    fn from(speaker: Speaker) -> Self {
        match speaker {
            Speaker::Patient => ChatRole::User,
            Speaker::Doctor => ChatRole::Assistant,
        }
    }
}

/// Message in a completion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Placeholder replaced by the rendered conversation in the summary template
pub const CONVERSATION_PLACEHOLDER: &str = "{conversation}";

/// System prompt for the doctor persona.
pub const DOCTOR_PERSONA_PROMPT: &str = r#"당신은 50대 남성의 경험 많은 내과 의사입니다. 환자와의 대화에서 다음 사항을 지켜주세요:

1. 무심한 말투로 대화하세요.
2. 의학용어는 쉽게 설명하되, 간결하게 하세요.
3. 환자의 메시지에 대해 간결하게, 적절한 응답을 해주세요.
4. 길게 말하지 말고, 존대말로 하세요.

환자는 다음의 사항 중에 하나 또는 여러 개를 물어볼거야.
환자의 메시지에 따라 적절한 응답을 해주세요.

환자 입장에서 꼭 말해야 하는 것:
1. symptom_location: 어디가 아픈지 구체적인 위치
2. symptom_timing: 언제부터 아픈지 시작 시기
3. symptom_severity: 증상이 얼마나 심한지 강도
4. current_medication: 현재 복용 중인 약물
5. allergy_info: 알레르기 여부

진료과정 중에 의사한테 꼭 들어야 하는 것:
6. diagnosis_info: 의사의 진단명과 진단 근거
7. prescription_info: 처방약의 이름과 복용 방법
8. side_effects: 약의 부작용과 주의사항
9. followup_plan: 다음 진료 계획과 재방문 시기
10. emergency_plan: 증상 악화 시 언제 다시 와야 하는지"#;

/// System prompt for the script summary request.
pub const SCRIPT_WRITER_PROMPT: &str =
    "당신은 의료 상담 전문가입니다. 환자와 의사가 준비해야 할 내용을 체계적으로 정리해주세요.";

/// User prompt template for the script summary request.
/// Use `{conversation}` placeholder for the rendered transcript.
pub const SCRIPT_SUMMARY_TEMPLATE: &str = r#"다음은 환자와 의사의 상담 내용입니다:

{conversation}

이 대화 내용을 바탕으로, 환자가 실제 의사를 만났을 때 준비해야 할 내용을 정리해주세요.

다음 형식으로 JSON 형태로 응답해주세요. JSON 외의 다른 설명은 붙이지 마세요:

{
    "patient_must_tell": {
        "symptom_location": "어디가 아픈지 구체적인 위치",
        "symptom_timing": "언제부터 아픈지 시작 시기",
        "symptom_severity": "증상이 얼마나 심한지 강도",
        "current_medication": "현재 복용 중인 약물",
        "allergy_info": "알레르기 여부"
    },
    "doctor_must_tell": {
        "diagnosis_info": "의사의 진단명과 진단 근거",
        "prescription_info": "처방약의 이름과 복용 방법",
        "side_effects": "약의 부작용과 주의사항",
        "followup_plan": "다음 진료 계획과 재방문 시기",
        "emergency_plan": "증상 악화 시 언제 다시 와야 하는지"
    }
}"#;

fn ensure_not_empty(transcript: &TranscriptStore) -> Result<(), ConsultError> {
    if transcript.is_empty() {
        return Err(ConsultError::invalid(
            "transcript is empty; talk to the doctor first",
        ));
    }
    Ok(())
}

/// Build the chat request for the next doctor reply.
///
/// The persona instruction comes first, followed by every turn in order.
pub fn build_chat_request(
    transcript: &TranscriptStore,
    persona_instruction: &str,
) -> Result<Vec<ChatMessage>, ConsultError> {
    ensure_not_empty(transcript)?;

    let mut messages = Vec::with_capacity(transcript.len() + 1);
    messages.push(ChatMessage::system(persona_instruction));
    messages.extend(transcript.turns().iter().map(|turn| ChatMessage {
        role: turn.speaker().into(),
        content: turn.text().to_string(),
    }));
    Ok(messages)
}

/// Render the transcript as one `speaker: text` line per turn
pub fn render_conversation(transcript: &TranscriptStore) -> String {
    transcript
        .turns()
        .iter()
        .map(|turn| format!("{}: {}", turn.speaker().label(), turn.text()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the request asking for the two-group consultation script.
pub fn build_summary_request(
    transcript: &TranscriptStore,
    summary_template: &str,
) -> Result<Vec<ChatMessage>, ConsultError> {
    ensure_not_empty(transcript)?;

    let prompt =
        summary_template.replace(CONVERSATION_PLACEHOLDER, &render_conversation(transcript));
    Ok(vec![
        ChatMessage::system(SCRIPT_WRITER_PROMPT),
        ChatMessage::user(prompt),
    ])
}
