use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::{
    handlers::{
        answer_handler::{build_submission, Rejection, SelectOutcome, Selection},
        timer_handler::{seconds_until, TickOutcome, TimerEngine, TimerKind},
    },
    helpers::rank_results,
    models::{
        communication::{
            AdvanceCause, AnswerSubmission, ClientCommand, EndCause, QuizNotice, ServerEvent,
        },
        session::{Mode, Participant, Session, SessionSnapshot},
    },
};

/// Side effects requested by a controller transition, executed by the event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Fetch,
    SubmitAnswer(AnswerSubmission),
    Publish(ClientCommand),
    ArmTimer(TimerKind),
    CancelTimer(TimerKind),
    Notify(QuizNotice),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveQuiz {
    pub session: Session,
    pub selection: Selection,
    pub timers: TimerEngine,
    /// Limit the current question was armed with, used for answer durations.
    pub time_limit: u32,
    pub answered: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Results {
    pub participants: Vec<Participant>,
    pub cause: EndCause,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Loading,
    Active(Box<ActiveQuiz>),
    Ended(Results),
    Error(String),
}

/// Live quiz state machine: `loading -> active -> ended`, `loading -> error`.
///
/// Every input (timer tick, inbound event, user action) runs to completion
/// against the aggregate and returns the effects it needs executed.
pub struct SessionController {
    participant_id: String,
    phase: Phase,
}

impl SessionController {
    pub fn new(participant_id: impl Into<String>) -> Self {
        SessionController {
            participant_id: participant_id.into(),
            phase: Phase::Loading,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn active(&self) -> Option<&ActiveQuiz> {
        match &self.phase {
            Phase::Active(active) => Some(active.as_ref()),
            _ => None,
        }
    }

    pub fn is_ended(&self) -> bool {
        matches!(self.phase, Phase::Ended(_))
    }

    pub fn on_loaded(&mut self, snapshot: SessionSnapshot, now: DateTime<Utc>) -> Vec<Effect> {
        match self.phase {
            Phase::Loading | Phase::Error(_) => (),
            _ => {
                debug!("Ignoring session snapshot outside of loading");
                return vec![];
            }
        }

        let session = Session::from_snapshot(snapshot);
        info!(
            "Session {} loaded at question {} of {}",
            session.id,
            session.current_index,
            session.questions.len()
        );

        let already_answered = session
            .participants
            .iter()
            .any(|participant| participant.id == self.participant_id && participant.answered);
        let mut selection = Selection::default();
        if already_answered {
            selection.lock();
        }
        let mut active = ActiveQuiz {
            time_limit: session.time_limit_for(session.current_index),
            session,
            selection,
            timers: TimerEngine::default(),
            answered: already_answered,
        };

        let mut effects = vec![Effect::Notify(QuizNotice::Loaded {
            question_index: active.session.current_index,
            question_count: active.session.questions.len(),
        })];

        if !active.session.is_active {
            let participants = active.session.participants.clone();
            self.phase = Phase::Active(Box::new(active));
            effects.extend(self.end(EndCause::Snapshot, Some(participants)));
            return effects;
        }
        if active.session.current_question().is_none() {
            self.phase = Phase::Active(Box::new(active));
            effects.extend(self.end(EndCause::LastQuestion, None));
            return effects;
        }

        let question_expired = arm_question_timer(&mut active, &mut effects);
        let session_expired = arm_session_timer(&mut active, now, &mut effects);
        self.phase = Phase::Active(Box::new(active));

        if session_expired {
            effects.extend(self.end(EndCause::SessionTimer, None));
        } else if question_expired {
            effects.extend(self.advance_next(AdvanceCause::QuestionTimer));
        }
        effects
    }

    pub fn on_load_failed(&mut self, error_text: impl Into<String>) -> Vec<Effect> {
        if !matches!(self.phase, Phase::Loading) {
            return vec![];
        }
        let error_text = error_text.into();
        warn!("Session load failed: {}", error_text);
        self.phase = Phase::Error(error_text.clone());
        vec![Effect::Notify(QuizNotice::LoadFailed { error_text })]
    }

    pub fn retry(&mut self) -> Result<Vec<Effect>, Rejection> {
        match self.phase {
            Phase::Error(_) => {
                info!("Retrying session load");
                self.phase = Phase::Loading;
                Ok(vec![Effect::Fetch])
            }
            _ => Err(Rejection::SessionNotActive),
        }
    }

    pub fn on_tick(&mut self, kind: TimerKind) -> Vec<Effect> {
        let active = match &mut self.phase {
            Phase::Active(active) => active,
            _ => return vec![Effect::CancelTimer(kind)],
        };

        match active.timers.tick(kind) {
            TickOutcome::Ignored => vec![],
            TickOutcome::Running(_) => vec![Effect::Notify(QuizNotice::Tick {
                question_left: active.timers.question_left(),
                session_left: active.timers.session_left(),
            })],
            TickOutcome::Expired => {
                let mut effects = vec![Effect::CancelTimer(kind)];
                match kind {
                    TimerKind::Question => {
                        info!("Question timer expired");
                        if active.session.mode == Mode::Timed {
                            effects.extend(self.advance_next(AdvanceCause::QuestionTimer));
                        }
                    }
                    TimerKind::Session => {
                        info!("Session timer expired");
                        effects.extend(self.end(EndCause::SessionTimer, None));
                    }
                }
                effects
            }
        }
    }

    pub fn on_server_event(&mut self, event: ServerEvent, now: DateTime<Utc>) -> Vec<Effect> {
        match event {
            ServerEvent::QuizUpdate { quiz } => self.apply_snapshot(quiz, now),
            ServerEvent::QuestionChange {
                question_index,
                time_limit,
            } => {
                let current = match self.active() {
                    Some(active) => active.session.current_index,
                    None => return vec![],
                };
                if question_index <= current {
                    debug!(
                        "Ignoring question change to {} while at {}",
                        question_index, current
                    );
                    return vec![];
                }
                self.advance_to(question_index, time_limit, AdvanceCause::Remote)
            }
            ServerEvent::ParticipantAnswer {
                participant_id,
                score,
            } => {
                let is_local = participant_id == self.participant_id;
                let active = match &mut self.phase {
                    Phase::Active(active) => active,
                    _ => return vec![],
                };
                match active.session.participant_mut(&participant_id) {
                    Some(participant) => {
                        participant.answered = true;
                        if let Some(score) = score {
                            participant.score = score;
                        }
                        if is_local && !active.answered {
                            info!("Answer for this participant recorded remotely, locking");
                            active.answered = true;
                            active.selection.lock();
                        }
                        vec![Effect::Notify(QuizNotice::ParticipantAnswered { participant_id })]
                    }
                    None => {
                        warn!("Answer from unknown participant: {}", participant_id);
                        vec![]
                    }
                }
            }
            ServerEvent::QuizEnded { participants } => self.end(EndCause::Remote, participants),
            ServerEvent::Unknown => vec![],
        }
    }

    pub fn select_option(&mut self, option_id: &str) -> Result<Vec<Effect>, Rejection> {
        let active = self.answerable()?;
        let question = active
            .session
            .current_question()
            .ok_or(Rejection::NoQuestion)?
            .clone();

        match active.selection.select(&question, option_id)? {
            SelectOutcome::Finalized(selected) => Ok(self.finalize_submission(selected)),
            SelectOutcome::Toggled(_) => Ok(vec![]),
        }
    }

    pub fn submit(&mut self) -> Result<Vec<Effect>, Rejection> {
        let active = self.answerable()?;
        let question = active
            .session
            .current_question()
            .ok_or(Rejection::NoQuestion)?
            .clone();

        let selected = active.selection.finalize(&question)?;
        Ok(self.finalize_submission(selected))
    }

    /// Explicit "next question" from the user.
    pub fn advance(&mut self) -> Result<Vec<Effect>, Rejection> {
        let active = self.active().ok_or(Rejection::SessionNotActive)?;
        let mode = active.session.mode;
        let next = active.session.current_index + 1;
        let publish = Effect::Publish(ClientCommand::NextQuestion {
            question_index: next,
        });

        match mode {
            Mode::Timed => Err(Rejection::ManualAdvanceNotAllowed),
            Mode::AdminControlled => Ok(vec![publish]),
            Mode::Free => {
                let mut effects = vec![publish];
                effects.extend(self.advance_to(next, None, AdvanceCause::UserAction));
                Ok(effects)
            }
        }
    }

    pub fn end_quiz(&mut self) -> Result<Vec<Effect>, Rejection> {
        if self.active().is_none() {
            return Err(Rejection::SessionNotActive);
        }
        let mut effects = vec![Effect::Publish(ClientCommand::EndQuiz {})];
        effects.extend(self.end(EndCause::Local, None));
        Ok(effects)
    }

    fn answerable(&mut self) -> Result<&mut ActiveQuiz, Rejection> {
        let active = match &mut self.phase {
            Phase::Active(active) => active.as_mut(),
            _ => return Err(Rejection::SessionNotActive),
        };
        if active.answered {
            return Err(Rejection::AlreadyAnswered);
        }
        if active.session.mode == Mode::Timed && active.timers.question.is_expired() {
            return Err(Rejection::TimeExpired);
        }
        Ok(active)
    }

    fn finalize_submission(&mut self, selected: Vec<String>) -> Vec<Effect> {
        let participant_id = self.participant_id.clone();
        let active = match &mut self.phase {
            Phase::Active(active) => active,
            _ => return vec![],
        };
        let question = match active.session.current_question() {
            Some(question) => question.clone(),
            None => return vec![],
        };

        let question_left = active
            .timers
            .question_left()
            .unwrap_or_else(|| i64::from(active.time_limit));
        let submission = build_submission(&question, selected, active.time_limit, question_left);

        active.answered = true;
        if let Some(participant) = active.session.participant_mut(&participant_id) {
            participant.answered = true;
        }
        info!(
            "Answer finalized for question {} after {}s",
            submission.question_id, submission.duration
        );

        vec![
            Effect::SubmitAnswer(submission.clone()),
            Effect::Publish(ClientCommand::SubmitAnswer {
                participant_id,
                question_id: submission.question_id.clone(),
                selected_answer_ids: submission.selected_answer_ids.clone(),
                duration: submission.duration,
            }),
            Effect::Notify(QuizNotice::AnswerSubmitted {
                question_id: submission.question_id,
                selected_answer_ids: submission.selected_answer_ids,
                duration: submission.duration,
            }),
        ]
    }

    fn advance_next(&mut self, cause: AdvanceCause) -> Vec<Effect> {
        match self.active() {
            Some(active) => {
                let next = active.session.current_index + 1;
                self.advance_to(next, None, cause)
            }
            None => vec![],
        }
    }

    fn advance_to(
        &mut self,
        target: usize,
        time_limit: Option<u32>,
        cause: AdvanceCause,
    ) -> Vec<Effect> {
        let active = match &mut self.phase {
            Phase::Active(active) => active,
            _ => return vec![],
        };
        if target <= active.session.current_index {
            return vec![];
        }
        if target >= active.session.questions.len() {
            info!("Advanced past the last question ({:?})", cause);
            return self.end(EndCause::LastQuestion, None);
        }

        active.selection.clear();
        active.answered = false;
        active.session.reset_answered();
        active.session.current_index = target;
        let limit = time_limit.unwrap_or_else(|| active.session.time_limit_for(target));
        active.time_limit = limit;
        info!(
            "Advanced to question {} ({:?}), limit {}s",
            target, cause, active.time_limit
        );

        let mut effects = vec![Effect::Notify(QuizNotice::QuestionChanged {
            question_index: target,
            time_limit: active.time_limit,
            cause,
        })];
        if arm_question_timer(active, &mut effects) {
            effects.extend(self.advance_next(AdvanceCause::QuestionTimer));
        }
        effects
    }

    fn apply_snapshot(&mut self, snapshot: SessionSnapshot, now: DateTime<Utc>) -> Vec<Effect> {
        match self.phase {
            Phase::Loading | Phase::Error(_) => return self.on_loaded(snapshot, now),
            Phase::Ended(_) => return vec![],
            Phase::Active(_) => (),
        }
        let participant_id = self.participant_id.clone();
        let active = match &mut self.phase {
            Phase::Active(active) => active,
            _ => return vec![],
        };

        let mut session = Session::from_snapshot(snapshot);
        if !session.is_active {
            return self.end(EndCause::Snapshot, Some(session.participants));
        }
        if session.current_index < active.session.current_index {
            warn!(
                "Snapshot is behind local question {}, keeping local index",
                active.session.current_index
            );
            session.current_index = active.session.current_index;
            session.reset_answered();
        }

        let mut effects = vec![];
        let question_changed = session.current_index != active.session.current_index;
        let snapshot_answered = session
            .participants
            .iter()
            .any(|participant| participant.id == participant_id && participant.answered);

        if question_changed {
            active.session = session;
            active.selection.clear();
            active.answered = snapshot_answered;
            if snapshot_answered {
                active.selection.lock();
            }
            active.time_limit = active.session.time_limit_for(active.session.current_index);
            effects.push(Effect::Notify(QuizNotice::QuestionChanged {
                question_index: active.session.current_index,
                time_limit: active.time_limit,
                cause: AdvanceCause::Snapshot,
            }));
            if active.session.current_question().is_none() {
                return self.end_with(effects, EndCause::LastQuestion);
            }
            if arm_question_timer(active, &mut effects) {
                effects.extend(self.advance_next(AdvanceCause::QuestionTimer));
                return effects;
            }
        } else {
            let answered = active.answered || snapshot_answered;
            active.session = session;
            active.answered = answered;
            if answered {
                active.selection.lock();
                if let Some(participant) = active.session.participant_mut(&participant_id) {
                    participant.answered = true;
                }
            }
        }

        let session_idle = !active.timers.session.is_running() && !active.timers.session.is_expired();
        if session_idle && arm_session_timer(active, now, &mut effects) {
            return self.end_with(effects, EndCause::SessionTimer);
        }
        effects
    }

    fn end_with(&mut self, mut effects: Vec<Effect>, cause: EndCause) -> Vec<Effect> {
        effects.extend(self.end(cause, None));
        effects
    }

    /// Idempotent termination: only the first call from `active` has effects.
    fn end(&mut self, cause: EndCause, participants: Option<Vec<Participant>>) -> Vec<Effect> {
        let active = match &mut self.phase {
            Phase::Active(active) => active,
            _ => return vec![],
        };

        active.timers.cancel_all();
        if let Some(participants) = participants {
            active.session.participants = participants;
        }
        active.session.is_active = false;

        let results = rank_results(&active.session.participants);
        info!("Session {} ended ({:?})", active.session.id, cause);
        self.phase = Phase::Ended(Results {
            participants: results.clone(),
            cause,
        });

        vec![
            Effect::CancelTimer(TimerKind::Question),
            Effect::CancelTimer(TimerKind::Session),
            Effect::Notify(QuizNotice::Ended { results, cause }),
        ]
    }
}

/// Arms (or cancels) the question countdown for the current question. In timed
/// mode the deadline runs whether or not this participant has answered.
/// Returns `true` when the limit is already spent and the question must be skipped.
fn arm_question_timer(active: &mut ActiveQuiz, effects: &mut Vec<Effect>) -> bool {
    if active.session.mode != Mode::Timed {
        active.timers.question.cancel();
        effects.push(Effect::CancelTimer(TimerKind::Question));
        return false;
    }

    match active.timers.question.arm(i64::from(active.time_limit)) {
        TickOutcome::Expired => {
            effects.push(Effect::CancelTimer(TimerKind::Question));
            true
        }
        _ => {
            effects.push(Effect::ArmTimer(TimerKind::Question));
            false
        }
    }
}

/// Arms the session countdown from the end timestamp, if any.
/// Returns `true` when the deadline has already passed.
fn arm_session_timer(
    active: &mut ActiveQuiz,
    now: DateTime<Utc>,
    effects: &mut Vec<Effect>,
) -> bool {
    let end_time = match active.session.end_time {
        Some(end_time) => end_time,
        None => return false,
    };

    match active.timers.session.arm(seconds_until(end_time, now)) {
        TickOutcome::Expired => true,
        _ => {
            effects.push(Effect::ArmTimer(TimerKind::Session));
            false
        }
    }
}
