use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    Timed,
    Free,
    AdminControlled,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Single,
    Multiple,
    Text,
}

impl QuestionType {
    /// Single and text questions finalize on the first selection.
    pub fn is_single_pick(&self) -> bool {
        match self {
            QuestionType::Single | QuestionType::Text => true,
            QuestionType::Multiple => false,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct QuizOption {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<QuizOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u32>,
}

impl Question {
    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|option| option.id == option_id)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Participant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub answered: bool,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub is_online: bool,
}

/// Body of the session fetch, also carried by `quiz_update` stream events.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    pub id: String,
    pub mode: Mode,
    pub time_per_question: u32,
    pub is_active: bool,
    #[serde(default)]
    pub current_question_index: usize,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

/// Client-side mirror of a live quiz run.
///
/// Owned by the controller; participants keep their join order so results
/// can break score ties by it.
#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    pub id: String,
    pub is_active: bool,
    pub mode: Mode,
    pub questions: Vec<Question>,
    pub current_index: usize,
    pub time_per_question: u32,
    pub end_time: Option<DateTime<Utc>>,
    pub participants: Vec<Participant>,
}

impl Session {
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        Session {
            id: snapshot.id,
            is_active: snapshot.is_active,
            mode: snapshot.mode,
            questions: snapshot.questions,
            current_index: snapshot.current_question_index,
            time_per_question: snapshot.time_per_question,
            end_time: snapshot.end_time,
            participants: snapshot.participants,
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    /// Time limit of the question at `index`, falling back to the session default.
    pub fn time_limit_for(&self, index: usize) -> u32 {
        self.questions
            .get(index)
            .and_then(|question| question.time_limit)
            .unwrap_or(self.time_per_question)
    }

    pub fn participant_mut(&mut self, participant_id: &str) -> Option<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|participant| participant.id == participant_id)
    }

    pub fn reset_answered(&mut self) {
        self.participants
            .iter_mut()
            .for_each(|participant| participant.answered = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_json() -> &'static str {
        r#"{
            "id": "s1",
            "mode": "admin-controlled",
            "time_per_question": 20,
            "is_active": true,
            "current_question_index": 1,
            "questions": [
                {"id": "q1", "text": "One?", "question_type": "single",
                 "options": [{"id": "a", "text": "A"}]},
                {"id": "q2", "text": "Two?", "question_type": "multiple",
                 "options": [{"id": "b", "text": "B", "is_correct": true}], "time_limit": 45}
            ],
            "participants": [{"id": "p1", "name": "Ann", "score": 3}],
            "end_time": "2026-10-19T12:00:00Z"
        }"#
    }

    #[test]
    fn snapshot_parses_with_defaults() {
        let snapshot: SessionSnapshot = serde_json::from_str(snapshot_json()).unwrap();

        assert_eq!(snapshot.mode, Mode::AdminControlled);
        assert_eq!(snapshot.questions[1].question_type, QuestionType::Multiple);
        assert_eq!(snapshot.questions[0].options[0].is_correct, None);
        assert!(!snapshot.participants[0].answered);
        assert!(snapshot.end_time.is_some());
    }

    #[test]
    fn time_limit_falls_back_to_session_default() {
        let snapshot: SessionSnapshot = serde_json::from_str(snapshot_json()).unwrap();
        let session = Session::from_snapshot(snapshot);

        assert_eq!(session.time_limit_for(0), 20);
        assert_eq!(session.time_limit_for(1), 45);
        assert_eq!(session.time_limit_for(7), 20);
    }
}
