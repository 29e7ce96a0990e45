//! Client-side synchronizer for live quiz sessions.
//!
//! A [`handlers::session_handler::LiveQuiz`] loads a session snapshot, keeps a
//! stream connection to the session endpoint open, counts down question and
//! session deadlines, and reconciles the participant's answers with the events
//! broadcast by the server.

pub mod api;
pub mod client_messages;
pub mod config;
pub mod error;
pub mod helpers;

pub mod handlers {
    pub mod answer_handler;
    pub mod connection_handler;
    pub mod game_handler;
    pub mod session_handler;
    pub mod timer_handler;
}

pub mod loggers {
    pub mod file_logger;
}

pub mod models {
    pub mod communication;
    pub mod session;
}
