use std::collections::BTreeSet;

use crate::models::{communication::AnswerSubmission, session::Question, session::QuestionType};

/// Why a selection or submit was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NoQuestion,
    AlreadyAnswered,
    TimeExpired,
    UnknownOption,
    EmptySelection,
    NotMultiple,
    SessionNotActive,
    ManualAdvanceNotAllowed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// Single/text pick, finalized and ready to submit.
    Finalized(Vec<String>),
    /// Multiple-choice toggle, still pending.
    Toggled(Vec<String>),
}

/// Per-question selection held by the answer pipeline.
///
/// Insertion order is kept for submission; the set mirrors it for toggling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    chosen: Vec<String>,
    members: BTreeSet<String>,
    finalized: bool,
}

impl Selection {
    pub fn clear(&mut self) {
        self.chosen.clear();
        self.members.clear();
        self.finalized = false;
    }

    /// Marks the question as answered elsewhere, keeping whatever was chosen.
    pub fn lock(&mut self) {
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn chosen(&self) -> &[String] {
        &self.chosen
    }

    /// Applies `option_id` according to the question type. Text questions
    /// accept the typed answer in place of an option id.
    pub fn select(
        &mut self,
        question: &Question,
        option_id: &str,
    ) -> Result<SelectOutcome, Rejection> {
        if self.finalized {
            return Err(Rejection::AlreadyAnswered);
        }
        if !question.has_option(option_id) && question.question_type != QuestionType::Text {
            return Err(Rejection::UnknownOption);
        }

        if question.question_type.is_single_pick() {
            self.chosen = vec![option_id.to_string()];
            self.members = self.chosen.iter().cloned().collect();
            self.finalized = true;
            return Ok(SelectOutcome::Finalized(self.chosen.clone()));
        }

        if self.members.remove(option_id) {
            self.chosen.retain(|chosen| chosen != option_id);
        } else {
            self.members.insert(option_id.to_string());
            self.chosen.push(option_id.to_string());
        }
        Ok(SelectOutcome::Toggled(self.chosen.clone()))
    }

    /// Finalizes a pending multiple-choice selection.
    pub fn finalize(&mut self, question: &Question) -> Result<Vec<String>, Rejection> {
        if self.finalized {
            return Err(Rejection::AlreadyAnswered);
        }
        if question.question_type != QuestionType::Multiple {
            return Err(Rejection::NotMultiple);
        }
        if self.chosen.is_empty() {
            return Err(Rejection::EmptySelection);
        }
        self.finalized = true;
        Ok(self.chosen.clone())
    }
}

/// Builds the submission for a finalized selection.
///
/// Duration is `time_limit - question_left` and is not clamped; the question
/// countdown never goes below zero so it stays within `0..=time_limit`.
pub fn build_submission(
    question: &Question,
    selected: Vec<String>,
    time_limit: u32,
    question_left: i64,
) -> AnswerSubmission {
    AnswerSubmission {
        question_id: question.id.clone(),
        selected_answer_ids: selected,
        duration: i64::from(time_limit) - question_left,
    }
}
