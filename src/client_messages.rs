use log::{info, warn};

use crate::{
    error::ConnectionError, handlers::connection_handler::ConnectionManager,
    models::communication::ClientCommand,
};

/// Serializes `command` and publishes it on the session stream.
///
/// Failures are logged and returned; callers treat publishing as best effort.
pub fn publish_command(
    command: &ClientCommand,
    connection: &ConnectionManager,
) -> Result<(), ConnectionError> {
    let payload = serde_json::to_string(command)?;

    match connection.send(&payload) {
        Ok(()) => {
            info!("Published {}", command_name(command));
            Ok(())
        }
        Err(error) => {
            warn!("Could not publish {}: {}", command_name(command), error);
            Err(error)
        }
    }
}

fn command_name(command: &ClientCommand) -> &'static str {
    match command {
        ClientCommand::SubmitAnswer { .. } => "submit_answer",
        ClientCommand::NextQuestion { .. } => "next_question",
        ClientCommand::EndQuiz {} => "end_quiz",
    }
}
