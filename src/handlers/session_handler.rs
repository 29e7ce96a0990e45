use crate::{
    api::SessionApi,
    client_messages::publish_command,
    config::QuizConfig,
    error::ApiError,
    handlers::{
        connection_handler::{ConnectionEvent, ConnectionManager},
        game_handler::{Effect, Phase, SessionController},
        timer_handler::{next_tick, Ticker, TimerKind},
    },
    helpers::parse_server_event,
    models::{
        communication::{AnswerSubmission, QuizNotice, ServerEvent, UserAction},
        session::SessionSnapshot,
    },
};
use chrono::Utc;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;

type FetchResult = Result<SessionSnapshot, ApiError>;
type SubmitResult = (String, Result<(), ApiError>);

/// Handle to a running live quiz.
///
/// Dropping the handle tears the session down just like [`LiveQuiz::shutdown`].
pub struct LiveQuiz {
    actions: UnboundedSender<UserAction>,
    task: JoinHandle<Phase>,
}

impl LiveQuiz {
    /// Starts loading `session_id` and returns the handle with the notice stream.
    pub fn start<A: SessionApi>(
        api: Arc<A>,
        config: QuizConfig,
        session_id: impl Into<String>,
        participant_id: impl Into<String>,
    ) -> (Self, UnboundedReceiver<QuizNotice>) {
        let (actions, actions_rx) = unbounded();
        let (notices, notices_rx) = unbounded();

        let task = tokio::spawn(run_live_quiz(
            api,
            config,
            session_id.into(),
            participant_id.into(),
            actions_rx,
            notices,
        ));

        (LiveQuiz { actions, task }, notices_rx)
    }

    /// Queues a user action; `false` once the session loop is gone.
    pub fn perform(&self, action: UserAction) -> bool {
        self.actions.unbounded_send(action).is_ok()
    }

    pub fn select_option(&self, option_id: impl Into<String>) -> bool {
        self.perform(UserAction::SelectOption {
            option_id: option_id.into(),
        })
    }

    pub fn submit(&self) -> bool {
        self.perform(UserAction::Submit)
    }

    pub fn advance(&self) -> bool {
        self.perform(UserAction::Advance)
    }

    pub fn retry(&self) -> bool {
        self.perform(UserAction::Retry)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the session and returns the phase it was left in.
    pub async fn shutdown(self) -> Option<Phase> {
        self.perform(UserAction::Quit);
        self.finished().await
    }

    /// Waits for the session to end on its own.
    pub async fn finished(self) -> Option<Phase> {
        match self.task.await {
            Ok(phase) => Some(phase),
            Err(error) => {
                warn!("Live quiz task failed: {}", error);
                None
            }
        }
    }
}

struct SessionRuntime<A: SessionApi> {
    api: Arc<A>,
    session_id: String,
    controller: SessionController,
    connection: ConnectionManager,
    notices: UnboundedSender<QuizNotice>,
    fetch_tx: UnboundedSender<FetchResult>,
    submit_tx: UnboundedSender<SubmitResult>,
    question_ticker: Option<Ticker>,
    session_ticker: Option<Ticker>,
}

/// Drives one live quiz until it ends or the user quits.
///
/// Timer ticks, stream messages, user actions and request completions are
/// handled one at a time on this task, so each controller transition sees a
/// consistent aggregate.
pub async fn run_live_quiz<A: SessionApi>(
    api: Arc<A>,
    config: QuizConfig,
    session_id: String,
    participant_id: String,
    mut actions: UnboundedReceiver<UserAction>,
    notices: UnboundedSender<QuizNotice>,
) -> Phase {
    let (connection, mut connection_events) =
        ConnectionManager::new(config.ws_url.clone(), config.reconnect_delay);
    let (fetch_tx, mut fetch_rx) = unbounded::<FetchResult>();
    let (submit_tx, mut submit_rx) = unbounded::<SubmitResult>();

    let mut runtime = SessionRuntime {
        api,
        session_id,
        controller: SessionController::new(participant_id),
        connection,
        notices,
        fetch_tx,
        submit_tx,
        question_ticker: None,
        session_ticker: None,
    };
    info!("Starting live quiz {}", &runtime.session_id);
    runtime.execute(vec![Effect::Fetch]);

    loop {
        tokio::select! {
            action = actions.next() => match action {
                Some(UserAction::Quit) | None => {
                    info!("Live quiz {} closed by user", &runtime.session_id);
                    break;
                }
                Some(action) => runtime.handle_action(action),
            },
            Some(fetched) = fetch_rx.next() => runtime.handle_fetch(fetched),
            Some(event) = connection_events.next() => runtime.handle_connection_event(event),
            _ = next_tick(&mut runtime.question_ticker) => {
                let effects = runtime.controller.on_tick(TimerKind::Question);
                runtime.execute(effects);
            }
            _ = next_tick(&mut runtime.session_ticker) => {
                let effects = runtime.controller.on_tick(TimerKind::Session);
                runtime.execute(effects);
            }
            Some((question_id, outcome)) = submit_rx.next() => match outcome {
                Ok(()) => info!("Answer to {} stored", question_id),
                Err(error) => warn!("Answer to {} not stored: {}", question_id, error),
            },
        }

        if runtime.controller.is_ended() {
            break;
        }
    }

    runtime.question_ticker = None;
    runtime.session_ticker = None;
    runtime.connection.close().await;
    info!("Live quiz {} torn down", &runtime.session_id);

    runtime.controller.phase().clone()
}

impl<A: SessionApi> SessionRuntime<A> {
    fn handle_action(&mut self, action: UserAction) {
        let outcome = match &action {
            UserAction::SelectOption { option_id } => self.controller.select_option(option_id),
            UserAction::Submit => self.controller.submit(),
            UserAction::Advance => self.controller.advance(),
            UserAction::EndQuiz => self.controller.end_quiz(),
            UserAction::Retry => self.controller.retry(),
            UserAction::Quit => Ok(vec![]),
        };

        match outcome {
            Ok(effects) => self.execute(effects),
            Err(rejection) => debug!("Rejected {:?}: {:?}", action, rejection),
        }
    }

    fn handle_fetch(&mut self, fetched: FetchResult) {
        match fetched {
            Ok(snapshot) => {
                let effects = self.controller.on_loaded(snapshot, Utc::now());
                self.execute(effects);
                if !self.controller.is_ended() {
                    self.connection.set_session(Some(self.session_id.clone()));
                }
            }
            Err(error) => {
                let effects = self.controller.on_load_failed(error.to_string());
                self.execute(effects);
            }
        }
    }

    fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => self.notify(QuizNotice::ConnectionChanged { connected: true }),
            ConnectionEvent::Disconnected => {
                self.notify(QuizNotice::ConnectionChanged { connected: false })
            }
            ConnectionEvent::Message(raw) => match parse_server_event(&raw) {
                Ok(ServerEvent::Unknown) => info!("Ignoring unknown stream message: {}", raw),
                Ok(event) => {
                    let effects = self.controller.on_server_event(event, Utc::now());
                    self.execute(effects);
                }
                Err(error) => warn!("{}", error),
            },
        }
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Fetch => self.spawn_fetch(),
                Effect::SubmitAnswer(submission) => self.spawn_submission(submission),
                Effect::Publish(command) => {
                    let _ = publish_command(&command, &self.connection);
                }
                Effect::ArmTimer(TimerKind::Question) => self.question_ticker = Some(Ticker::start()),
                Effect::ArmTimer(TimerKind::Session) => self.session_ticker = Some(Ticker::start()),
                Effect::CancelTimer(TimerKind::Question) => self.question_ticker = None,
                Effect::CancelTimer(TimerKind::Session) => self.session_ticker = None,
                Effect::Notify(notice) => self.notify(notice),
            }
        }
    }

    fn notify(&self, notice: QuizNotice) {
        if self.notices.unbounded_send(notice).is_err() {
            debug!("No one is listening for quiz notices");
        }
    }

    fn spawn_fetch(&self) {
        let api = self.api.clone();
        let session_id = self.session_id.clone();
        let fetch_tx = self.fetch_tx.clone();

        tokio::spawn(async move {
            let fetched = api.fetch_session(&session_id).await;
            if fetch_tx.unbounded_send(fetched).is_err() {
                debug!("Discarding session fetch for {}, quiz closed", session_id);
            }
        });
    }

    /// Fire-and-forget durable submission; the result is dropped if the quiz
    /// has been torn down by the time it completes.
    fn spawn_submission(&self, submission: AnswerSubmission) {
        let api = self.api.clone();
        let session_id = self.session_id.clone();
        let submit_tx = self.submit_tx.clone();

        tokio::spawn(async move {
            let outcome = api.submit_answer(&session_id, &submission).await;
            if submit_tx
                .unbounded_send((submission.question_id, outcome))
                .is_err()
            {
                debug!("Discarding submission result for {}, quiz closed", session_id);
            }
        });
    }
}
