mod common;

use common::{
    eventually, next_connection, next_text, send_text, snapshot, start_server, wait_for_notice,
    FakeApi,
};
use live_quiz_client::{
    config::QuizConfig,
    handlers::{game_handler::Phase, session_handler::LiveQuiz},
    models::{
        communication::{AdvanceCause, EndCause, QuizNotice, UserAction},
        session::Mode,
    },
};
use std::{sync::Arc, time::Duration};

fn config(ws_url: String) -> QuizConfig {
    QuizConfig::default()
        .with_ws_url(ws_url)
        .with_reconnect_delay(Duration::from_millis(50))
}

#[tokio::test]
async fn answers_are_stored_and_published() {
    let (ws_url, mut connections) = start_server().await;
    let api = Arc::new(FakeApi::with_snapshot(snapshot(Mode::AdminControlled, 30)));
    let (quiz, mut notices) = LiveQuiz::start(api.clone(), config(ws_url), "s1", "me");

    wait_for_notice(&mut notices, |n| matches!(n, QuizNotice::Loaded { .. })).await;
    let mut server = next_connection(&mut connections).await;
    wait_for_notice(&mut notices, |n| {
        matches!(n, QuizNotice::ConnectionChanged { connected: true })
    })
    .await;

    assert!(quiz.select_option("b"));
    wait_for_notice(&mut notices, |n| matches!(n, QuizNotice::AnswerSubmitted { .. })).await;

    let published: serde_json::Value =
        serde_json::from_str(&next_text(&mut server).await).expect("json command");
    assert_eq!(published["type"], "submit_answer");
    assert_eq!(published["participant_id"], "me");
    assert_eq!(published["question_id"], "q1");
    assert_eq!(published["selected_answer_ids"][0], "b");

    eventually(|| api.submissions().len() == 1).await;
    let (session_id, submission) = api.submissions().remove(0);
    assert_eq!(session_id, "s1");
    assert_eq!(submission.selected_answer_ids, vec!["b".to_string()]);

    // A second pick on the same question is ignored.
    assert!(quiz.select_option("a"));
    send_text(
        &mut server,
        r#"{"type":"question_change","question_index":1,"time_limit":15}"#,
    )
    .await;
    let changed = wait_for_notice(&mut notices, |n| {
        matches!(n, QuizNotice::QuestionChanged { .. })
    })
    .await;
    assert_eq!(
        changed,
        QuizNotice::QuestionChanged {
            question_index: 1,
            time_limit: 15,
            cause: AdvanceCause::Remote,
        }
    );
    assert_eq!(api.submissions().len(), 1);

    quiz.shutdown().await;
}

#[tokio::test]
async fn failed_answer_request_still_publishes_and_keeps_the_lock() {
    let (ws_url, mut connections) = start_server().await;
    let api = Arc::new(FakeApi::with_snapshot(snapshot(Mode::AdminControlled, 30)));
    api.fail_submissions
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let (quiz, mut notices) = LiveQuiz::start(api.clone(), config(ws_url), "s1", "me");

    let mut server = next_connection(&mut connections).await;
    wait_for_notice(&mut notices, |n| {
        matches!(n, QuizNotice::ConnectionChanged { connected: true })
    })
    .await;

    assert!(quiz.select_option("b"));
    let published: serde_json::Value =
        serde_json::from_str(&next_text(&mut server).await).expect("json command");
    assert_eq!(published["type"], "submit_answer");
    assert_eq!(published["selected_answer_ids"][0], "b");

    eventually(|| api.submissions().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(quiz.select_option("a"));

    match quiz.shutdown().await {
        Some(Phase::Active(active)) => {
            assert!(active.answered);
            assert_eq!(active.selection.chosen(), ["b".to_string()]);
        }
        other => panic!("unexpected phase: {other:?}"),
    }
    assert_eq!(api.submissions().len(), 1);
}

#[tokio::test]
async fn remote_end_produces_ranked_results() {
    let (ws_url, mut connections) = start_server().await;
    let api = Arc::new(FakeApi::with_snapshot(snapshot(Mode::Free, 30)));
    let (quiz, mut notices) = LiveQuiz::start(api, config(ws_url), "s1", "me");

    let mut server = next_connection(&mut connections).await;
    wait_for_notice(&mut notices, |n| {
        matches!(n, QuizNotice::ConnectionChanged { connected: true })
    })
    .await;

    send_text(&mut server, "definitely not json").await;
    send_text(&mut server, r#"{"type":"chat","text":"hello"}"#).await;
    send_text(
        &mut server,
        r#"{"type":"participant_answer","participant_id":"ann","score":25}"#,
    )
    .await;
    wait_for_notice(&mut notices, |n| {
        matches!(n, QuizNotice::ParticipantAnswered { participant_id } if participant_id == "ann")
    })
    .await;

    send_text(&mut server, r#"{"type":"quiz_ended"}"#).await;
    let ended = wait_for_notice(&mut notices, |n| matches!(n, QuizNotice::Ended { .. })).await;
    match ended {
        QuizNotice::Ended { results, cause } => {
            assert_eq!(cause, EndCause::Remote);
            assert_eq!(results[0].id, "ann");
            assert_eq!(results[0].score, 25);
        }
        other => panic!("unexpected notice: {other:?}"),
    }

    match quiz.finished().await {
        Some(Phase::Ended(results)) => assert_eq!(results.participants.len(), 2),
        other => panic!("unexpected phase: {other:?}"),
    }
}

#[tokio::test]
async fn timed_questions_advance_on_their_own() {
    let (ws_url, _connections) = start_server().await;
    let api = Arc::new(FakeApi::with_snapshot(snapshot(Mode::Timed, 1)));
    let (quiz, mut notices) = LiveQuiz::start(api, config(ws_url), "s1", "me");

    let first = wait_for_notice(&mut notices, |n| {
        matches!(n, QuizNotice::QuestionChanged { .. })
    })
    .await;
    assert_eq!(
        first,
        QuizNotice::QuestionChanged {
            question_index: 1,
            time_limit: 1,
            cause: AdvanceCause::QuestionTimer,
        }
    );

    let ended = wait_for_notice(&mut notices, |n| matches!(n, QuizNotice::Ended { .. })).await;
    assert!(matches!(
        ended,
        QuizNotice::Ended {
            cause: EndCause::LastQuestion,
            ..
        }
    ));
    assert!(matches!(quiz.finished().await, Some(Phase::Ended(_))));
}

#[tokio::test]
async fn failed_load_can_be_retried() {
    let (ws_url, mut connections) = start_server().await;
    let api = Arc::new(FakeApi::default());
    let (quiz, mut notices) = LiveQuiz::start(api.clone(), config(ws_url), "s1", "me");

    wait_for_notice(&mut notices, |n| matches!(n, QuizNotice::LoadFailed { .. })).await;
    assert!(quiz.select_option("a"));

    *api.snapshot.lock().unwrap() = Some(snapshot(Mode::Free, 30));
    assert!(quiz.retry());
    wait_for_notice(&mut notices, |n| matches!(n, QuizNotice::Loaded { .. })).await;
    let _server = next_connection(&mut connections).await;
    assert_eq!(api.fetches.load(std::sync::atomic::Ordering::SeqCst), 2);

    match quiz.shutdown().await {
        Some(Phase::Active(active)) => assert!(!active.answered),
        other => panic!("unexpected phase: {other:?}"),
    }
}

#[tokio::test]
async fn shutdown_closes_the_stream() {
    let (ws_url, mut connections) = start_server().await;
    let api = Arc::new(FakeApi::with_snapshot(snapshot(Mode::Free, 30)));
    let (quiz, mut notices) = LiveQuiz::start(api, config(ws_url), "s1", "me");

    let mut server = next_connection(&mut connections).await;
    wait_for_notice(&mut notices, |n| {
        matches!(n, QuizNotice::ConnectionChanged { connected: true })
    })
    .await;

    assert!(quiz.perform(UserAction::Quit));
    quiz.finished().await;

    let closed = tokio::time::timeout(common::WAIT, async {
        use futures_util::StreamExt;
        loop {
            match server.next().await {
                Some(Ok(tungstenite::Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(tokio::time::timeout(Duration::from_millis(50), futures_util::StreamExt::next(&mut connections))
        .await
        .is_err());
}
