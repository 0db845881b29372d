use tracing::{debug, info, warn};

use crate::config::{API_KEY_VAR, Config};
use crate::context::ContextStore;
use crate::error::{ChatError, ContextError};
use crate::model::Message;
use crate::model_gateway::{ModelGateway, ModelGatewayRequest};

/// One conversation thread backed by a [`ContextStore`].
///
/// Every call to [`send_message`](Self::send_message) reloads the stored
/// turns, so nothing is cached between calls.
pub struct ChatSession<'a, S, G> {
    cfg: &'a Config,
    store: S,
    gateway: G,
}

impl<'a, S, G> ChatSession<'a, S, G>
where
    S: ContextStore,
    G: ModelGateway,
{
    pub fn new(cfg: &'a Config, store: S, gateway: G) -> Self {
        Self {
            cfg,
            store,
            gateway,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Stored turns, or an empty history when the store cannot be read.
    pub fn load_context(&self) -> Vec<Message> {
        match self.store.load() {
            Ok(messages) => {
                debug!(message_count = messages.len(), "loaded conversation context");
                messages
            }
            Err(err) => {
                warn!(error = %err, "could not load context, starting a new conversation");
                Vec::new()
            }
        }
    }

    pub fn clear_context(&self) -> Result<(), ContextError> {
        self.store.clear()?;
        info!("conversation context cleared");
        Ok(())
    }

    /// Runs one turn. The store is only written after the model replied.
    pub async fn send_message(&self, prompt: &str) -> Result<String, ChatError> {
        let mut context = self.load_context();
        context.push(Message::user(prompt));

        let api_key = self
            .cfg
            .api_key
            .clone()
            .ok_or(ChatError::Configuration { var: API_KEY_VAR })?;

        let response = self
            .gateway
            .chat(ModelGatewayRequest {
                api_key,
                messages: context.clone(),
            })
            .await
            .map_err(|err| {
                warn!(error = %format!("{err:#}"), "model request failed; context not saved");
                ChatError::request(err)
            })?;

        context.push(Message::assistant(response.content.clone()));
        self.store.save(&context)?;
        info!(message_count = context.len(), "conversation context saved");

        Ok(response.content)
    }
}
