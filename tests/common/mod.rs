#![allow(dead_code)]

use futures_channel::mpsc::{unbounded, UnboundedReceiver};
use futures_util::StreamExt;
use live_quiz_client::{
    api::SessionApi,
    error::ApiError,
    models::{
        communication::{AnswerSubmission, QuizNotice},
        session::{Mode, Participant, Question, QuestionType, QuizOption, SessionSnapshot},
    },
};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;

pub type ServerStream = WebSocketStream<TcpStream>;

pub const WAIT: Duration = Duration::from_secs(10);

/// Accepts websocket clients on a random local port and hands each one over.
pub async fn start_server() -> (String, UnboundedReceiver<ServerStream>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("test server address");
    let (tx, rx) = unbounded();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await {
                if tx.unbounded_send(ws_stream).is_err() {
                    return;
                }
            }
        }
    });

    (format!("ws://{}/ws/live-quiz", addr), rx)
}

pub async fn next_connection(connections: &mut UnboundedReceiver<ServerStream>) -> ServerStream {
    tokio::time::timeout(WAIT, connections.next())
        .await
        .expect("client should connect")
        .expect("server closed")
}

/// Next text frame the server receives from the client.
pub async fn next_text(stream: &mut ServerStream) -> String {
    loop {
        let msg = tokio::time::timeout(WAIT, stream.next())
            .await
            .expect("client should send")
            .expect("stream ended")
            .expect("read error");
        if let tungstenite::Message::Text(text) = msg {
            return text;
        }
    }
}

pub async fn send_text(stream: &mut ServerStream, text: &str) {
    use futures_util::SinkExt;
    stream
        .send(tungstenite::Message::Text(text.to_string()))
        .await
        .expect("server send");
}

/// Skips notices until one matches `predicate`.
pub async fn wait_for_notice<F>(notices: &mut UnboundedReceiver<QuizNotice>, predicate: F) -> QuizNotice
where
    F: Fn(&QuizNotice) -> bool,
{
    tokio::time::timeout(WAIT, async {
        while let Some(notice) = notices.next().await {
            if predicate(&notice) {
                return notice;
            }
        }
        panic!("notice stream ended");
    })
    .await
    .expect("expected notice did not arrive")
}

pub async fn eventually<F>(check: F)
where
    F: Fn() -> bool,
{
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition never became true")
}

#[derive(Default)]
pub struct FakeApi {
    pub snapshot: Mutex<Option<SessionSnapshot>>,
    pub submissions: Mutex<Vec<(String, AnswerSubmission)>>,
    pub fetches: AtomicUsize,
    /// Answer requests are still recorded but answered with a 500.
    pub fail_submissions: AtomicBool,
}

impl FakeApi {
    pub fn with_snapshot(snapshot: SessionSnapshot) -> Self {
        FakeApi {
            snapshot: Mutex::new(Some(snapshot)),
            ..Default::default()
        }
    }

    pub fn submissions(&self) -> Vec<(String, AnswerSubmission)> {
        self.submissions.lock().unwrap().clone()
    }
}

impl SessionApi for FakeApi {
    async fn fetch_session(&self, _session_id: &str) -> Result<SessionSnapshot, ApiError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.snapshot.lock().unwrap().clone() {
            Some(snapshot) => Ok(snapshot),
            None => Err(ApiError::Status(503)),
        }
    }

    async fn submit_answer(
        &self,
        session_id: &str,
        submission: &AnswerSubmission,
    ) -> Result<(), ApiError> {
        self.submissions
            .lock()
            .unwrap()
            .push((session_id.to_string(), submission.clone()));
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(ApiError::Status(500));
        }
        Ok(())
    }
}

pub fn snapshot(mode: Mode, time_per_question: u32) -> SessionSnapshot {
    let question = |id: &str, question_type| Question {
        id: id.to_string(),
        text: format!("What about {id}?"),
        question_type,
        options: ["a", "b"]
            .iter()
            .map(|option| QuizOption {
                id: option.to_string(),
                text: option.to_uppercase(),
                is_correct: None,
            })
            .collect(),
        time_limit: None,
    };
    let participant = |id: &str, score| Participant {
        id: id.to_string(),
        name: id.to_uppercase(),
        avatar: None,
        answered: false,
        score,
        is_online: true,
    };

    SessionSnapshot {
        id: "s1".to_string(),
        mode,
        time_per_question,
        is_active: true,
        current_question_index: 0,
        questions: vec![
            question("q1", QuestionType::Single),
            question("q2", QuestionType::Multiple),
            question("q3", QuestionType::Single),
        ],
        participants: vec![participant("me", 5), participant("ann", 20)],
        end_time: None,
    }
}
