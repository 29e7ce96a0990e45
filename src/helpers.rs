use tungstenite::Message;

use crate::{
    error::MessageError,
    models::{communication::ServerEvent, session::Participant},
};

pub fn parse_server_event(raw: &str) -> Result<ServerEvent, MessageError> {
    let parsed_msg: ServerEvent = serde_json::from_str(raw)?;
    Ok(parsed_msg)
}

/// Text payload of a websocket frame; control and binary frames have none.
pub fn message_text(msg: &Message) -> Result<String, MessageError> {
    match msg {
        Message::Text(text) => Ok(text.clone()),
        _ => Err(MessageError::NotText),
    }
}

/// Participants ordered for the results view: score descending, ties keep
/// their join order.
pub fn rank_results(participants: &[Participant]) -> Vec<Participant> {
    let mut ranked = participants.to_vec();
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
}
