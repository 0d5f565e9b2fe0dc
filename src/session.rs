use tracing::{debug, error, info, instrument};

use crate::{
    Error, Result,
    collector::{CollectorConfig, Turn, TurnCollector},
    queue::MessageQueue,
    transport::Transport,
    types::{ClientContent, ClientMessage, Content, Part, ServerMessage},
};

/// One live connection to a model
///
/// Owns the delivery queue its transport pushes to. A failed connection closes
/// the session before the error is returned; open a new session to carry on.
pub struct LiveSession<T> {
    model: Box<str>,
    transport: Option<T>,
    collector: TurnCollector,
}

impl<T: Transport> LiveSession<T> {
    /// Wraps an already opened transport that pushes to `queue`
    pub fn new(model: &str, transport: T, queue: MessageQueue, config: CollectorConfig) -> Self {
        Self {
            model: model.into(),
            transport: Some(transport),
            collector: TurnCollector::new(queue, config),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn collector(&self) -> &TurnCollector {
        &self.collector
    }

    pub fn config_mut(&mut self) -> &mut CollectorConfig {
        self.collector.config_mut()
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    #[instrument(name = "live_session_send", skip_all, fields(model = %self.model))]
    pub async fn send_client_content(
        &mut self,
        turns: Vec<Content>,
        turn_complete: bool,
    ) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(Error::SessionClosed)?;
        let message = ClientMessage::ClientContent(ClientContent {
            turns,
            turn_complete,
        });

        match transport.send(&message).await {
            Ok(()) => {
                debug!(turn_complete, "client content sent");
                Ok(())
            }
            Err(error) => Err(self.fail(error).await),
        }
    }

    /// Sends one user turn made of `text` and marks it complete
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.send_client_content(vec![Content::user_text(text)], true)
            .await
    }

    /// Sends one complete user turn made of `parts`
    pub async fn send_parts(&mut self, parts: Vec<Part>) -> Result<()> {
        self.send_client_content(vec![Content::user(parts)], true)
            .await
    }

    pub async fn next_message(&mut self) -> Result<ServerMessage> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        match self.collector.next_message().await {
            Ok(message) => Ok(message),
            Err(error) => Err(self.fail(error).await),
        }
    }

    /// Waits for the model's reply to the last submission
    ///
    /// A [Error::TurnTimeout] leaves the session open, but the rest of the
    /// abandoned reply stays queued and is what the next call returns.
    #[instrument(name = "live_session_collect_turn", skip_all, fields(model = %self.model))]
    pub async fn collect_turn(&mut self) -> Result<Turn> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        match self.collector.collect_turn().await {
            Ok(turn) => Ok(turn),
            Err(error) => Err(self.fail(error).await),
        }
    }

    /// Sends `text` as a complete turn and collects the reply
    pub async fn ask(&mut self, text: &str) -> Result<Turn> {
        self.send_text(text).await?;
        self.collect_turn().await
    }

    /// Closes the connection; closing an already closed session does nothing
    #[instrument(name = "live_session_close", skip_all, fields(model = %self.model))]
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut transport) = self.transport.take() else {
            return Ok(());
        };
        transport.close().await?;
        info!("live session closed");
        Ok(())
    }

    async fn fail(&mut self, error: Error) -> Error {
        if error.is_transport() {
            if let Err(close_error) = self.close().await {
                error!(%close_error, "error closing session");
            }
        }
        error
    }
}
