use std::future::Future;

use log::info;
use reqwest::Client;

use crate::{
    config::QuizConfig,
    error::ApiError,
    models::{communication::AnswerSubmission, session::SessionSnapshot},
};

/// Request/response collaborators of a live quiz: the initial session fetch
/// and the durable answer submission.
pub trait SessionApi: Send + Sync + 'static {
    fn fetch_session(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<SessionSnapshot, ApiError>> + Send;

    fn submit_answer(
        &self,
        session_id: &str,
        submission: &AnswerSubmission,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

pub struct HttpSessionApi {
    client: Client,
    config: QuizConfig,
}

impl HttpSessionApi {
    pub fn new(config: QuizConfig) -> Self {
        HttpSessionApi {
            client: Client::new(),
            config,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl SessionApi for HttpSessionApi {
    async fn fetch_session(&self, session_id: &str) -> Result<SessionSnapshot, ApiError> {
        let url = self.config.session_url(session_id);
        info!("Fetching session snapshot: {}", &url);

        let response = self.authorize(self.client.get(&url)).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }

        let body = response.text().await?;
        let snapshot: SessionSnapshot = serde_json::from_str(&body)?;
        Ok(snapshot)
    }

    async fn submit_answer(
        &self,
        session_id: &str,
        submission: &AnswerSubmission,
    ) -> Result<(), ApiError> {
        let url = self.config.answer_url(session_id);

        let response = self
            .authorize(self.client.post(&url))
            .json(submission)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}
