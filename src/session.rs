//! Consultation session state management

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::error::{ConsultError, ResponseError};
use crate::gateway::{CompletionGateway, CompletionParams};
use crate::prompt;
use crate::record::SessionRecord;
use crate::script::{self, ExtractionResult};
use crate::storage;
use crate::transcript::{Speaker, TranscriptStore};

/// Everything one consultation accumulates between reset and save
#[derive(Debug, Default)]
pub struct ConsultationSession {
    user_id: Option<String>,
    transcript: TranscriptStore,
    script: Option<ExtractionResult>,
}

impl ConsultationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the doctor's opening line already in the transcript
    pub fn with_greeting(greeting: &str) -> Self {
        let mut session = Self::new();
        session.greet(greeting);
        session
    }

    fn greet(&mut self, greeting: &str) {
        // An empty greeting means the patient speaks first
        if self.transcript.append(Speaker::Doctor, greeting).is_err() {
            info!("No greeting configured");
        }
    }

    pub fn set_user_id(&mut self, user_id: &str) -> Result<(), ConsultError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(ConsultError::invalid("user id must not be empty"));
        }
        storage::validate_user_id(user_id).map_err(|e| ConsultError::invalid(e.to_string()))?;
        self.user_id = Some(user_id.to_string());
        Ok(())
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn transcript(&self) -> &TranscriptStore {
        &self.transcript
    }

    /// Most recent extraction attempt, if any
    pub fn script(&self) -> Option<&ExtractionResult> {
        self.script.as_ref()
    }

    /// Record the patient's message and ask the doctor persona for a reply.
    ///
    /// The patient turn is kept when the service fails; the error is returned
    /// for display and no doctor turn is added. Any held script no longer
    /// covers the transcript once a turn is added, so it is dropped.
    pub async fn send_patient_message(
        &mut self,
        gateway: &dyn CompletionGateway,
        params: CompletionParams,
        text: &str,
    ) -> Result<String, ConsultError> {
        self.transcript.append(Speaker::Patient, text)?;
        if self.script.take().is_some() {
            info!("Conversation continued; held script discarded");
        }
        let messages =
            prompt::build_chat_request(&self.transcript, prompt::DOCTOR_PERSONA_PROMPT)?;

        let reply = gateway.complete(&messages, params).await.map_err(|e| {
            warn!(error = %e, "Doctor reply failed");
            ConsultError::from(e)
        })?;

        let reply = reply.trim();
        if reply.is_empty() {
            warn!("Doctor reply was empty");
            return Err(ResponseError::InvalidResponse("doctor reply was empty".into()).into());
        }
        self.transcript.append(Speaker::Doctor, reply)?;
        Ok(reply.to_string())
    }

    /// Ask the service for the consultation script and keep the result.
    ///
    /// A service error leaves any earlier result in place. A reply that does
    /// not validate is kept as a failure so it can be inspected or retried.
    pub async fn generate_script(
        &mut self,
        gateway: &dyn CompletionGateway,
        params: CompletionParams,
    ) -> Result<&ExtractionResult, ConsultError> {
        let messages =
            prompt::build_summary_request(&self.transcript, prompt::SCRIPT_SUMMARY_TEMPLATE)?;

        let raw = gateway.complete(&messages, params).await.map_err(|e| {
            warn!(error = %e, "Script request failed");
            ConsultError::from(e)
        })?;

        let result = script::extract(&raw);
        match &result {
            ExtractionResult::Success(_) => info!("Consultation script generated"),
            ExtractionResult::Failure(failure) => warn!(
                kind = %failure.kind,
                reason = %failure.reason,
                "Consultation script did not validate"
            ),
        }
        Ok(&*self.script.insert(result))
    }

    /// Bundle the transcript and the latest script for saving
    pub fn finalize(&self, now: DateTime<Local>) -> Result<SessionRecord, ConsultError> {
        let user_id = self
            .user_id
            .as_deref()
            .ok_or_else(|| ConsultError::invalid("set a user id before saving"))?;
        let script = self
            .script
            .clone()
            .ok_or_else(|| ConsultError::invalid("generate a script before saving"))?;
        SessionRecord::finalize(user_id, &self.transcript, script, now)
    }

    /// Forget the conversation and any script derived from it
    pub fn reset(&mut self) {
        self.transcript.reset();
        self.script = None;
        info!("Consultation reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{ChatMessage, ChatRole};
    use crate::script::FailureKind;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const WELL_FORMED: &str = r#"{
        "patient_must_tell": {
            "symptom_location": "머리 전체",
            "symptom_timing": "3일 전부터",
            "symptom_severity": "중간 정도",
            "current_medication": "없음",
            "allergy_info": "없음"
        },
        "doctor_must_tell": {
            "diagnosis_info": "긴장성 두통 의심",
            "prescription_info": "진통제 하루 두 번",
            "side_effects": "속쓰림 가능",
            "followup_plan": "일주일 후 재방문",
            "emergency_plan": "구토 동반 시 즉시 내원"
        }
    }"#;

    const PARAMS: CompletionParams = CompletionParams {
        max_tokens: 100,
        temperature: 0.0,
    };

    /// Gateway that replays canned answers and records every request
    struct ScriptedGateway {
        replies: Mutex<VecDeque<Result<String, ResponseError>>>,
        requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedGateway {
        fn new(replies: Vec<Result<String, ResponseError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<Vec<ChatMessage>> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionGateway for ScriptedGateway {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _params: CompletionParams,
        ) -> Result<String, ResponseError> {
            self.requests.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ResponseError::InvalidResponse("no reply queued".into())))
        }
    }

    fn server_error() -> ResponseError {
        ResponseError::ServerError {
            status: 429,
            message: "quota exceeded".into(),
        }
    }

    #[tokio::test]
    async fn test_chat_exchange_appends_both_turns() {
        let gateway = ScriptedGateway::new(vec![Ok("언제부터 아프셨나요?".into())]);
        let mut session = ConsultationSession::with_greeting("안녕하세요! 어떻게 오셨나요?");

        let reply = session
            .send_patient_message(&gateway, PARAMS, "머리가 아파요")
            .await
            .unwrap();

        assert_eq!(reply, "언제부터 아프셨나요?");
        assert_eq!(session.transcript().len(), 3);
        assert_eq!(session.transcript().last().unwrap().speaker(), Speaker::Doctor);

        let requests = gateway.requests();
        assert_eq!(requests.len(), 1);
        // system + greeting + patient message
        assert_eq!(requests[0].len(), 3);
        assert_eq!(requests[0][0].role, ChatRole::System);
        assert_eq!(requests[0][1].role, ChatRole::Assistant);
        assert_eq!(requests[0][2].role, ChatRole::User);
    }

    #[tokio::test]
    async fn test_service_error_keeps_transcript_consistent() {
        let gateway = ScriptedGateway::new(vec![Err(server_error())]);
        let mut session = ConsultationSession::new();

        let err = session
            .send_patient_message(&gateway, PARAMS, "머리가 아파요")
            .await
            .unwrap_err();

        assert!(matches!(err, ConsultError::Service(_)));
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.transcript().last().unwrap().speaker(), Speaker::Patient);
    }

    #[tokio::test]
    async fn test_empty_message_is_not_sent() {
        let gateway = ScriptedGateway::new(vec![]);
        let mut session = ConsultationSession::new();

        let err = session
            .send_patient_message(&gateway, PARAMS, "   ")
            .await
            .unwrap_err();

        assert!(matches!(err, ConsultError::InvalidInput(_)));
        assert!(gateway.requests().is_empty());
    }

    #[tokio::test]
    async fn test_generate_script_requires_conversation() {
        let gateway = ScriptedGateway::new(vec![Ok(WELL_FORMED.into())]);
        let mut session = ConsultationSession::new();

        let err = session.generate_script(&gateway, PARAMS).await.unwrap_err();
        assert!(matches!(err, ConsultError::InvalidInput(_)));
        assert!(gateway.requests().is_empty());
    }

    #[tokio::test]
    async fn test_full_consultation_to_report() {
        let gateway = ScriptedGateway::new(vec![
            Ok("언제부터 아프셨나요?".into()),
            Ok("그렇군요. 진통제 처방해 드릴게요.".into()),
            Ok(WELL_FORMED.into()),
        ]);
        let mut session = ConsultationSession::new();
        session.set_user_id("user001").unwrap();
        session
            .send_patient_message(&gateway, PARAMS, "머리가 아파요")
            .await
            .unwrap();
        session
            .send_patient_message(&gateway, PARAMS, "3일 전부터요")
            .await
            .unwrap();

        let result = session.generate_script(&gateway, PARAMS).await.unwrap();
        assert!(result.is_success());

        let summary_request = gateway.requests().pop().unwrap();
        assert_eq!(summary_request.len(), 2);
        assert!(summary_request[1].content.contains("환자: 3일 전부터요"));

        let now = Local.with_ymd_and_hms(2024, 3, 5, 14, 30, 9).unwrap();
        let record = session.finalize(now).unwrap();
        let report = record.to_human_report();
        assert!(report.contains("user001"));
        assert!(report.contains("### Emergency Plan (`emergency_plan`)"));
    }

    #[tokio::test]
    async fn test_malformed_script_is_kept_as_failure() {
        let gateway = ScriptedGateway::new(vec![Ok("not json".into())]);
        let mut session = ConsultationSession::with_greeting("안녕하세요");

        let result = session.generate_script(&gateway, PARAMS).await.unwrap();
        let failure = result.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Malformed);
        assert_eq!(failure.raw_text, "not json");
        assert!(session.script().is_some());
    }

    #[tokio::test]
    async fn test_service_error_keeps_previous_script() {
        let gateway = ScriptedGateway::new(vec![Ok(WELL_FORMED.into()), Err(server_error())]);
        let mut session = ConsultationSession::with_greeting("안녕하세요");

        session.generate_script(&gateway, PARAMS).await.unwrap();
        let err = session.generate_script(&gateway, PARAMS).await.unwrap_err();

        assert!(matches!(err, ConsultError::Service(_)));
        assert!(session.script().unwrap().is_success());
    }

    #[tokio::test]
    async fn test_reset_drops_transcript_and_script() {
        let gateway = ScriptedGateway::new(vec![Ok(WELL_FORMED.into())]);
        let mut session = ConsultationSession::with_greeting("안녕하세요");
        session.set_user_id("user001").unwrap();
        session.generate_script(&gateway, PARAMS).await.unwrap();

        session.reset();

        assert!(session.transcript().is_empty());
        assert!(session.script().is_none());
        assert_eq!(session.user_id(), Some("user001"));
        assert!(matches!(
            session.finalize(Local::now()),
            Err(ConsultError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_new_turn_discards_held_script() {
        let gateway = ScriptedGateway::new(vec![
            Ok(WELL_FORMED.into()),
            Ok("가슴은 언제부터 아프셨나요?".into()),
        ]);
        let mut session = ConsultationSession::with_greeting("안녕하세요");
        session.set_user_id("user001").unwrap();
        session.generate_script(&gateway, PARAMS).await.unwrap();

        session
            .send_patient_message(&gateway, PARAMS, "사실 가슴도 아파요")
            .await
            .unwrap();

        assert!(session.script().is_none());
        assert!(matches!(
            session.finalize(Local::now()),
            Err(ConsultError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_doctor_reply_is_service_error() {
        let gateway = ScriptedGateway::new(vec![Ok("  \n ".into())]);
        let mut session = ConsultationSession::new();

        let err = session
            .send_patient_message(&gateway, PARAMS, "머리가 아파요")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ConsultError::Service(ResponseError::InvalidResponse(_))
        ));
        assert_eq!(session.transcript().len(), 1);
    }

    #[test]
    fn test_set_user_id_rejects_path_like_ids() {
        let mut session = ConsultationSession::new();
        for bad in ["../x", "a/b", ".."] {
            assert!(matches!(
                session.set_user_id(bad),
                Err(ConsultError::InvalidInput(_))
            ));
        }
        assert!(session.user_id().is_none());
        session.set_user_id(" user001 ").unwrap();
        assert_eq!(session.user_id(), Some("user001"));
    }

    #[test]
    fn test_finalize_requires_user_id() {
        let session = ConsultationSession::with_greeting("안녕하세요");
        assert!(matches!(
            session.finalize(Local::now()),
            Err(ConsultError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_empty_greeting_starts_empty() {
        let session = ConsultationSession::with_greeting("");
        assert!(session.transcript().is_empty());
    }
}
