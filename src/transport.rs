//! The connection a [crate::LiveSession] talks through

use futures::{
    SinkExt as _, StreamExt as _,
    stream::{SplitSink, SplitStream},
};
use tokio::{net::TcpStream, task::JoinHandle};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    Error, Result,
    queue::QueueProducer,
    types::{ClientMessage, ServerMessage, Setup},
};

/// Outgoing half of a live connection
///
/// Incoming messages don't go through the trait: an implementation is handed a
/// [QueueProducer] when it is opened and pushes whatever the server sends onto it.
pub trait Transport: Send {
    fn send(&mut self, message: &ClientMessage) -> impl Future<Output = Result<()>> + Send;

    /// Must be safe to call more than once
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [Transport] over the `BidiGenerateContent` websocket
pub struct WebSocketTransport {
    sink: SplitSink<Socket, Message>,
    reader: JoinHandle<()>,
    closed: bool,
}

impl WebSocketTransport {
    /// Connects to `url`, sends `setup` and waits for `setupComplete`
    ///
    /// Once set up, a background task parses every frame the server sends and
    /// pushes it to `producer`.
    #[instrument(name = "websocket_transport_connect", skip_all, fields(model = %setup.model))]
    pub async fn connect(url: &str, setup: Setup, producer: QueueProducer) -> Result<Self> {
        let (socket, _) = connect_async(url).await?;
        debug!("websocket connection established");

        let (mut sink, mut stream) = socket.split();

        let json = serde_json::to_string(&ClientMessage::Setup(setup))?;
        trace!("setup message: {json}");
        sink.send(Message::Text(json.into())).await?;

        await_setup_complete(&mut stream).await?;
        info!("live session set up");

        Ok(Self {
            sink,
            reader: tokio::spawn(read_frames(stream, producer)),
            closed: false,
        })
    }
}

impl Transport for WebSocketTransport {
    async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        let json = serde_json::to_string(message)?;
        trace!("client message: {json}");
        self.sink.send(Message::Text(json.into())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.reader.abort();
        self.sink.close().await?;
        debug!("websocket closed");
        Ok(())
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

enum Frame {
    Message(serde_json::Result<ServerMessage>),
    Closed(Option<String>),
    Control,
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Frame::Message(serde_json::from_str(text.as_str())),
            Message::Binary(bytes) => Frame::Message(serde_json::from_slice(&bytes)),
            Message::Close(frame) => Frame::Closed(
                frame
                    .map(|frame| frame.reason.as_str().to_owned())
                    .filter(|reason| !reason.is_empty()),
            ),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Frame::Control,
        }
    }
}

fn go_away_reason(message: &ServerMessage) -> Option<String> {
    let go_away = message.go_away.as_ref()?;
    Some(match &go_away.time_left {
        Some(time_left) => format!("server sent goAway, {time_left} left"),
        None => "server sent goAway".into(),
    })
}

async fn await_setup_complete(stream: &mut SplitStream<Socket>) -> Result<()> {
    while let Some(frame) = stream.next().await {
        let message = match Frame::from(frame?) {
            Frame::Message(message) => message?,
            Frame::Closed(reason) => {
                return Err(Error::Setup(format!(
                    "connection closed before setup complete: {}",
                    reason.as_deref().unwrap_or("no reason given")
                )));
            }
            Frame::Control => continue,
        };

        if message.is_setup_complete() {
            return Ok(());
        }
        if let Some(reason) = go_away_reason(&message) {
            return Err(Error::Setup(reason));
        }
        warn!(?message, "unexpected message during setup");
    }

    Err(Error::Setup("connection closed before setup complete".into()))
}

async fn read_frames(mut stream: SplitStream<Socket>, producer: QueueProducer) {
    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => Frame::from(frame),
            Err(error) => {
                error!(%error, "websocket read failed");
                producer.error(error.to_string());
                return;
            }
        };

        match frame {
            Frame::Message(Ok(message)) => {
                if let Some(reason) = go_away_reason(&message) {
                    warn!("{reason}");
                    producer.closed(Some(reason));
                    return;
                }
                producer.message(message);
            }
            Frame::Message(Err(error)) => {
                error!(%error, "invalid server message");
                producer.error(format!("invalid server message: {error}"));
            }
            Frame::Closed(reason) => {
                info!(?reason, "server closed the connection");
                producer.closed(reason);
                return;
            }
            Frame::Control => {}
        }
    }

    producer.closed(None);
}
