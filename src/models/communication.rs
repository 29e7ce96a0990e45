use serde::{Deserialize, Serialize};

use super::session::{Participant, SessionSnapshot};

/// Messages this client publishes on the stream endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    SubmitAnswer {
        participant_id: String,
        question_id: String,
        selected_answer_ids: Vec<String>,
        duration: i64,
    },
    NextQuestion {
        question_index: usize,
    },
    EndQuiz {},
}

/// Messages received from the stream endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    QuizUpdate {
        quiz: SessionSnapshot,
    },
    QuestionChange {
        question_index: usize,
        #[serde(default)]
        time_limit: Option<u32>,
    },
    ParticipantAnswer {
        participant_id: String,
        #[serde(default)]
        score: Option<i64>,
    },
    QuizEnded {
        #[serde(default)]
        participants: Option<Vec<Participant>>,
    },
    #[serde(other)]
    Unknown,
}

/// Body of the durable answer submission.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnswerSubmission {
    pub question_id: String,
    pub selected_answer_ids: Vec<String>,
    pub duration: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndCause {
    SessionTimer,
    LastQuestion,
    Remote,
    Snapshot,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceCause {
    QuestionTimer,
    UserAction,
    Remote,
    Snapshot,
}

/// What the event loop reports to whoever renders the quiz.
#[derive(Debug, Clone, PartialEq)]
pub enum QuizNotice {
    Loaded {
        question_index: usize,
        question_count: usize,
    },
    LoadFailed {
        error_text: String,
    },
    QuestionChanged {
        question_index: usize,
        time_limit: u32,
        cause: AdvanceCause,
    },
    Tick {
        question_left: Option<i64>,
        session_left: Option<i64>,
    },
    ParticipantAnswered {
        participant_id: String,
    },
    AnswerSubmitted {
        question_id: String,
        selected_answer_ids: Vec<String>,
        duration: i64,
    },
    ConnectionChanged {
        connected: bool,
    },
    Ended {
        results: Vec<Participant>,
        cause: EndCause,
    },
}

/// User-initiated operations fed into the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    SelectOption { option_id: String },
    Submit,
    Advance,
    EndQuiz,
    Retry,
    Quit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_answer_serializes_with_type_tag() {
        let command = ClientCommand::SubmitAnswer {
            participant_id: "p1".to_string(),
            question_id: "q1".to_string(),
            selected_answer_ids: vec!["a".to_string()],
            duration: 5,
        };

        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["type"], "submit_answer");
        assert_eq!(value["selected_answer_ids"][0], "a");
        assert_eq!(value["duration"], 5);
    }

    #[test]
    fn end_quiz_serializes_as_bare_envelope() {
        let text = serde_json::to_string(&ClientCommand::EndQuiz {}).unwrap();
        assert_eq!(text, r#"{"type":"end_quiz"}"#);
    }

    #[test]
    fn unknown_event_type_parses_as_unknown() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"chat_message","text":"hi"}"#).unwrap();
        assert_eq!(event, ServerEvent::Unknown);
    }

    #[test]
    fn question_change_time_limit_is_optional() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"question_change","question_index":2}"#).unwrap();
        assert_eq!(
            event,
            ServerEvent::QuestionChange {
                question_index: 2,
                time_limit: None
            }
        );
    }
}
