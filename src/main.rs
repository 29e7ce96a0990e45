use futures_util::StreamExt;
use live_quiz_client::{
    api::HttpSessionApi,
    config::QuizConfig,
    handlers::session_handler::LiveQuiz,
    loggers::file_logger::init_file_logger,
    models::communication::{QuizNotice, UserAction},
};
use log::{info, warn};
use std::{env, process::ExitCode, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match QuizConfig::load() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{}", error);
            return ExitCode::FAILURE;
        }
    };
    if let Err(error) = init_file_logger(config.log_level) {
        eprintln!("Logger unavailable: {}", error);
    }

    let mut args = env::args().skip(1);
    let (session_id, participant_id) = match (args.next(), args.next()) {
        (Some(session_id), Some(participant_id)) => (session_id, participant_id),
        _ => {
            eprintln!("usage: live-quiz <session_id> <participant_id>");
            return ExitCode::FAILURE;
        }
    };
    info!("App started for session {}", &session_id);

    let api = Arc::new(HttpSessionApi::new(config.clone()));
    let (quiz, mut notices) = LiveQuiz::start(api, config, session_id, participant_id);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            notice = notices.next() => match notice {
                Some(notice) => print_notice(&notice),
                None => break,
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => match parse_action(&line) {
                    Some(action) => {
                        if !quiz.perform(action) {
                            break;
                        }
                    }
                    None => println!("commands: <option id> | submit | next | end | retry | quit"),
                },
                Ok(None) => break,
                Err(error) => {
                    warn!("stdin closed: {}", error);
                    break;
                }
            },
        }
    }

    quiz.shutdown().await;
    ExitCode::SUCCESS
}

fn parse_action(line: &str) -> Option<UserAction> {
    match line.trim() {
        "" => None,
        "submit" => Some(UserAction::Submit),
        "next" => Some(UserAction::Advance),
        "end" => Some(UserAction::EndQuiz),
        "retry" => Some(UserAction::Retry),
        "quit" => Some(UserAction::Quit),
        option_id => Some(UserAction::SelectOption {
            option_id: option_id.to_string(),
        }),
    }
}

fn print_notice(notice: &QuizNotice) {
    match notice {
        QuizNotice::Loaded {
            question_index,
            question_count,
        } => println!("loaded: question {} of {}", question_index + 1, question_count),
        QuizNotice::LoadFailed { error_text } => {
            println!("could not load quiz: {} (type retry)", error_text)
        }
        QuizNotice::QuestionChanged {
            question_index,
            time_limit,
            ..
        } => println!("question {} ({}s)", question_index + 1, time_limit),
        QuizNotice::Tick {
            question_left,
            session_left,
        } => {
            if let Some(left) = question_left {
                println!("{}s left", left);
            } else if let Some(left) = session_left {
                println!("{}s left in session", left);
            }
        }
        QuizNotice::ParticipantAnswered { participant_id } => {
            println!("{} answered", participant_id)
        }
        QuizNotice::AnswerSubmitted {
            selected_answer_ids,
            duration,
            ..
        } => println!("answered {:?} in {}s", selected_answer_ids, duration),
        QuizNotice::ConnectionChanged { connected } => {
            println!("{}", if *connected { "connected" } else { "reconnecting..." })
        }
        QuizNotice::Ended { results, .. } => {
            println!("quiz ended");
            for (place, participant) in results.iter().enumerate() {
                println!("{}. {} - {}", place + 1, participant.name, participant.score);
            }
        }
    }
}
