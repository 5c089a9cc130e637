//! Terminal front-end
//!
//! Plain lines are sent to the doctor persona; lines starting with `/` are
//! commands. Errors are printed and the loop keeps going.

use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use consult_script::config::Config;
use consult_script::error::ConsultError;
use consult_script::gateway::CompletionGateway;
use consult_script::script::{field_title, ExtractionResult};
use consult_script::session::ConsultationSession;
use consult_script::storage::ConsultationStore;
use consult_script::transcript::TranscriptStore;

const HELP: &str = "\
명령어:
  /id <사용자 ID>   사용자 ID 설정
  /history          전체 대화 내용 보기
  /script           상담 스크립트 생성
  /save             상담 완료 및 저장
  /reset            대화 초기화
  /help             도움말
  /quit             종료
그 외 입력은 의사에게 보내는 메시지입니다.";

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Say(String),
    SetUser(String),
    History,
    Script,
    Save,
    Reset,
    Help,
    Quit,
    Unknown(String),
}

/// Parse one input line. Blank lines yield `None`.
pub(crate) fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Say(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let command = match name {
        "id" | "user" => Command::SetUser(arg.to_string()),
        "history" => Command::History,
        "script" => Command::Script,
        "save" => Command::Save,
        "reset" => Command::Reset,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    };
    Some(command)
}

/// Numbered transcript with role labels
pub(crate) fn format_history(transcript: &TranscriptStore) -> String {
    if transcript.is_empty() {
        return "대화 내용이 없습니다.".to_string();
    }
    transcript
        .turns()
        .iter()
        .enumerate()
        .map(|(i, turn)| format!("{}. {}: {}", i + 1, turn.speaker().label(), turn.text()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Console rendering of an extraction attempt
pub(crate) fn format_script(result: &ExtractionResult) -> String {
    match result {
        ExtractionResult::Success(fields) => {
            let mut out = String::from("[환자가 꼭 말해야 할 내용]\n");
            for (key, value) in fields.patient_must_tell.entries() {
                out.push_str(&format!("- {}: {}\n", field_title(key), value));
            }
            out.push_str("\n[의사가 꼭 말해야 할 내용]\n");
            for (key, value) in fields.doctor_must_tell.entries() {
                out.push_str(&format!("- {}: {}\n", field_title(key), value));
            }
            out
        }
        ExtractionResult::Failure(failure) => format!(
            "스크립트 생성 실패 ({}): {}\n원본 응답:\n{}\n/script 로 다시 시도할 수 있습니다.",
            failure.kind, failure.reason, failure.raw_text
        ),
    }
}

pub(crate) struct Console {
    session: ConsultationSession,
    gateway: Box<dyn CompletionGateway>,
    store: ConsultationStore,
    config: Config,
}

impl Console {
    pub(crate) fn new(
        config: Config,
        gateway: Box<dyn CompletionGateway>,
        store: ConsultationStore,
    ) -> Self {
        Self {
            session: ConsultationSession::with_greeting(&config.chat.greeting),
            gateway,
            store,
            config,
        }
    }

    /// Run one command. `Ok(None)` ends the loop.
    async fn handle(&mut self, command: Command) -> Result<Option<String>, ConsultError> {
        let reply = match command {
            Command::Say(text) => {
                let reply = self
                    .session
                    .send_patient_message(self.gateway.as_ref(), self.config.chat.params(), &text)
                    .await?;
                format!("의사: {}", reply)
            }
            Command::SetUser(user_id) => {
                self.session.set_user_id(&user_id)?;
                format!("{}님 환영합니다!", user_id.trim())
            }
            Command::History => format_history(self.session.transcript()),
            Command::Script => {
                println!("상담 스크립트를 생성하고 있습니다...");
                let result = self
                    .session
                    .generate_script(self.gateway.as_ref(), self.config.script)
                    .await?;
                format_script(result)
            }
            Command::Save => {
                let record = self.session.finalize(Local::now())?;
                let paths = self.store.save(&record)?;
                format!(
                    "저장되었습니다.\n  {}\n  {}",
                    paths.json.display(),
                    paths.markdown.display()
                )
            }
            Command::Reset => {
                self.session.reset();
                "대화가 초기화되었습니다.".to_string()
            }
            Command::Help => HELP.to_string(),
            Command::Quit => return Ok(None),
            Command::Unknown(name) => {
                format!("알 수 없는 명령어입니다: /{}\n{}", name, HELP)
            }
        };
        Ok(Some(reply))
    }

    /// Read lines from stdin until `/quit` or end of input
    pub(crate) async fn run(mut self) -> anyhow::Result<()> {
        println!("AI 의사 상담 시스템 (/help 로 명령어 보기)");
        if let Some(greeting) = self.session.transcript().first() {
            println!("의사: {}", greeting.text());
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let Some(command) = parse_command(&line) else {
                continue;
            };
            match self.handle(command).await {
                Ok(Some(reply)) => println!("{}", reply),
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Command failed");
                    println!("오류: {}", e);
                }
            }
        }

        info!("Console closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consult_script::script::extract;
    use consult_script::transcript::Speaker;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("   "), None);
        assert_eq!(
            parse_command(" 머리가 아파요 "),
            Some(Command::Say("머리가 아파요".into()))
        );
        assert_eq!(
            parse_command("/id user001"),
            Some(Command::SetUser("user001".into()))
        );
        assert_eq!(parse_command("/id"), Some(Command::SetUser(String::new())));
        assert_eq!(parse_command("/script"), Some(Command::Script));
        assert_eq!(parse_command("/exit"), Some(Command::Quit));
        assert_eq!(
            parse_command("/nope"),
            Some(Command::Unknown("nope".into()))
        );
    }

    #[test]
    fn test_format_history_numbers_turns() {
        let mut transcript = TranscriptStore::new();
        assert_eq!(format_history(&transcript), "대화 내용이 없습니다.");

        transcript.append(Speaker::Doctor, "어떻게 오셨나요?").unwrap();
        transcript.append(Speaker::Patient, "배가 아파요").unwrap();
        assert_eq!(
            format_history(&transcript),
            "1. 의사: 어떻게 오셨나요?\n2. 환자: 배가 아파요"
        );
    }

    #[test]
    fn test_format_script_failure_shows_raw_text() {
        let text = format_script(&extract("not json"));
        assert!(text.contains("not json"));
        assert!(text.contains("/script"));
    }
}
