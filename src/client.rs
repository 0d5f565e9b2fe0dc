use std::{ops::Deref, sync::Arc, time::Duration};

use futures::FutureExt as _;
use secrecy::{ExposeSecret as _, SecretString};
use tracing::info;

use crate::{
    Error, LiveSession, Result,
    collector::CollectorConfig,
    queue::MessageQueue,
    transport::WebSocketTransport,
    types::{Content, GenerationConfig, Modality, Setup},
};

const BASE_URI: &str = "wss://generativelanguage.googleapis.com";
const DEFAULT_API_VERSION: &str = "v1alpha";

/// Handle to the Live API, cheap to clone
///
/// Build one explicitly and pass it to whatever opens sessions.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Deref for Client {
    type Target = ClientInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Client {
    pub fn new(key: impl Into<SecretString>) -> Self {
        Self {
            inner: ClientInner::new(key.into(), BASE_URI.into(), DEFAULT_API_VERSION.into()),
        }
    }

    /// Reads the key from `GEMINI_API_KEY`
    pub fn from_env() -> Result<Self> {
        std::env::var("GEMINI_API_KEY")
            .map(Self::new)
            .map_err(|_| Error::MissingApiKey)
    }

    /// Points the client at another server, e.g. `ws://127.0.0.1:9000`
    pub fn endpoint(self, base_uri: &str) -> Self {
        Self {
            inner: ClientInner::new(
                self.key.expose_secret().into(),
                base_uri.trim_end_matches('/').into(),
                self.api_version.clone(),
            ),
        }
    }

    pub fn api_version(self, api_version: &str) -> Self {
        Self {
            inner: ClientInner::new(
                self.key.expose_secret().into(),
                self.base_uri.clone(),
                api_version.into(),
            ),
        }
    }

    /// Starts building a live session for `model`, awaiting it connects
    pub fn live(&self, model: &str) -> Connect {
        Connect::new(self, model)
    }
}

pub struct ClientInner {
    key: SecretString,
    base_uri: Box<str>,
    api_version: Box<str>,
}

impl ClientInner {
    fn new(key: SecretString, base_uri: Box<str>, api_version: Box<str>) -> Arc<Self> {
        Self {
            key,
            base_uri,
            api_version,
        }
        .into()
    }

    fn live_url(&self) -> String {
        format!(
            "{}/ws/google.ai.generativelanguage.{}.GenerativeService.BidiGenerateContent?key={}",
            self.base_uri,
            self.api_version,
            self.key.expose_secret()
        )
    }
}

/// A live session waiting to be opened
///
/// Answers with text unless told otherwise.
pub struct Connect {
    client: Client,
    model: Box<str>,
    setup: Setup,
    collector: CollectorConfig,
}

impl Connect {
    fn new(client: &Client, model: &str) -> Self {
        let model = model.strip_prefix("models/").unwrap_or(model);
        Self {
            client: client.clone(),
            model: model.into(),
            setup: Setup {
                model: format!("models/{model}"),
                generation_config: Some(GenerationConfig {
                    response_modalities: vec![Modality::Text],
                    ..Default::default()
                }),
                system_instruction: None,
            },
            collector: CollectorConfig::default(),
        }
    }

    pub fn response_modalities(&mut self, modalities: Vec<Modality>) {
        self.setup
            .generation_config
            .get_or_insert_default()
            .response_modalities = modalities;
    }

    pub fn config(&mut self, config: GenerationConfig) {
        self.setup.generation_config = Some(config);
    }

    pub fn system_instruction(&mut self, instruction: &str) {
        self.setup.system_instruction = Some(Content {
            role: None,
            ..Content::user_text(instruction)
        });
    }

    pub fn poll_interval(&mut self, interval: Duration) {
        self.collector.poll_interval = interval;
    }

    /// Bounds every turn to `max_polls` queue checks
    pub fn max_polls(&mut self, max_polls: u32) {
        self.collector.max_polls = Some(max_polls);
    }

    pub fn setup(&self) -> &Setup {
        &self.setup
    }
}

impl IntoFuture for Connect {
    type Output = Result<LiveSession<WebSocketTransport>>;
    type IntoFuture = futures::future::BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        async move {
            info!(model = %self.model, "connecting to live API");
            let queue = MessageQueue::new();
            let transport =
                WebSocketTransport::connect(&self.client.live_url(), self.setup, queue.producer())
                    .await?;
            Ok(LiveSession::new(
                &self.model,
                transport,
                queue,
                self.collector,
            ))
        }
        .boxed()
    }
}
