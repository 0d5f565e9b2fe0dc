//! Assembles queued server messages into turns

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use tracing::{debug, instrument, trace, warn};

use crate::{
    Error, Result,
    blob::{self, PcmFormat},
    queue::{Delivery, MessageQueue},
    types::{InlineData, ServerMessage},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How the collector waits on an empty queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Fixed pause between checks of an empty queue
    pub poll_interval: Duration,
    /// Queue checks allowed per turn before giving up with [Error::TurnTimeout]
    ///
    /// `None` waits for as long as the connection stays up.
    pub max_polls: Option<u32>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingFirstMessage,
    Accumulating,
    Complete,
    TimedOut,
}

/// Everything the model sent in reply to one submission
///
/// The last message is the only one flagged `turnComplete`.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    messages: Vec<ServerMessage>,
}

impl Turn {
    pub fn messages(&self) -> &[ServerMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<ServerMessage> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The text of the whole turn, see [assemble_text]
    pub fn text(&self) -> String {
        assemble_text(&self.messages)
    }

    /// Binary parts in message order, then part order
    pub fn inline_data(&self) -> impl Iterator<Item = &InlineData> {
        self.messages
            .iter()
            .flat_map(ServerMessage::parts)
            .filter_map(|part| part.inline_data.as_ref())
    }

    /// Decodes the binary parts whose MIME type starts with `mime_prefix` and
    /// joins them in message order, then part order
    ///
    /// Live audio arrives this way, one `audio/pcm;rate=24000` chunk at a time.
    pub fn concat_inline_data(&self, mime_prefix: &str) -> Result<Bytes> {
        let mut joined = BytesMut::new();
        for inline_data in self
            .inline_data()
            .filter(|inline_data| inline_data.mime_type.starts_with(mime_prefix))
        {
            joined.extend_from_slice(&inline_data.decode()?);
        }
        Ok(joined.freeze())
    }

    /// Joins every `audio/pcm` chunk of the turn into one WAV file at `path`
    ///
    /// Returns the number of PCM bytes written, zero for a turn without audio.
    pub async fn save_wav(&self, path: impl AsRef<Path>, format: PcmFormat) -> Result<usize> {
        let pcm = self.concat_inline_data("audio/pcm")?;
        blob::write_wav(path, &pcm, format).await?;
        Ok(pcm.len())
    }

    /// Decodes every binary part and writes it to the path `path_for` picks
    ///
    /// `path_for` gets the index of the blob within the turn. Parent
    /// directories must already exist.
    pub async fn save_inline_data(
        &self,
        mut path_for: impl FnMut(usize, &InlineData) -> PathBuf,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (index, inline_data) in self.inline_data().enumerate() {
            let path = path_for(index, inline_data);
            blob::write_blob(&path, &inline_data.decode()?).await?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Concatenates the text parts of `messages`, in message order then part order
///
/// Binary parts are skipped.
pub fn assemble_text(messages: &[ServerMessage]) -> String {
    messages
        .iter()
        .flat_map(ServerMessage::parts)
        .filter_map(|part| part.text.as_deref())
        .collect()
}

/// Drains a session's queue one turn at a time
///
/// Methods take `&mut self`, so only one turn can be in flight per queue.
#[derive(Debug)]
pub struct TurnCollector {
    queue: MessageQueue,
    config: CollectorConfig,
    state: TurnState,
}

impl TurnCollector {
    pub fn new(queue: MessageQueue, config: CollectorConfig) -> Self {
        Self {
            queue,
            config,
            state: TurnState::AwaitingFirstMessage,
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut CollectorConfig {
        &mut self.config
    }

    /// State of the current, or most recent, turn
    pub fn state(&self) -> TurnState {
        self.state
    }

    fn poll(&self) -> Option<Result<ServerMessage>> {
        let delivery = self.queue.pop()?;
        Some(match delivery {
            Delivery::Message(message) => {
                if !message.parts().is_empty() {
                    debug!(parts = ?message.parts(), "streaming response");
                }
                Ok(message)
            }
            Delivery::Error(error) => Err(Error::Transport(error)),
            Delivery::Closed(reason) => Err(Error::Closed { reason }),
        })
    }

    /// Takes the next message off the queue, waiting for one if it is empty
    ///
    /// Errors and closure pushed by the transport come back as `Err`.
    #[instrument(name = "turn_collector_next_message", skip(self))]
    pub async fn next_message(&mut self) -> Result<ServerMessage> {
        loop {
            if let Some(polled) = self.poll() {
                return polled;
            }
            trace!("queue empty, waiting {:?}", self.config.poll_interval);
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Collects messages until one is flagged `turnComplete`
    ///
    /// With `max_polls` set to `K`, every queue check that doesn't finish the
    /// turn counts against `K`, and the `K`th such check ends the turn with
    /// [Error::TurnTimeout].
    ///
    /// A timeout leaves the queue alone: whatever the server still sends for
    /// the abandoned turn, its `turnComplete` message included, is what the
    /// next call returns.
    #[instrument(name = "turn_collector_collect_turn", skip(self))]
    pub async fn collect_turn(&mut self) -> Result<Turn> {
        let mut budget = PollBudget::new(self.config.max_polls);
        let mut messages = Vec::new();
        self.state = TurnState::AwaitingFirstMessage;

        while budget.spend() {
            match self.poll() {
                Some(Ok(message)) => {
                    let complete = message.is_turn_complete();
                    messages.push(message);
                    if complete {
                        self.state = TurnState::Complete;
                        debug!(messages = messages.len(), "turn complete");
                        return Ok(Turn { messages });
                    }
                    self.state = TurnState::Accumulating;
                }
                Some(Err(error)) => {
                    warn!(%error, "transport failed mid-turn");
                    return Err(error);
                }
                None if budget.is_exhausted() => {}
                None => tokio::time::sleep(self.config.poll_interval).await,
            }
        }

        let attempts = budget.used;
        self.state = TurnState::TimedOut;
        warn!(attempts, received = messages.len(), "timed out waiting for complete turn");
        Err(Error::TurnTimeout { attempts })
    }
}

/// Queue checks left in a turn
///
/// Unbounded turns don't count at all.
#[derive(Debug, Clone, Copy)]
struct PollBudget {
    max: Option<u32>,
    used: u32,
}

impl PollBudget {
    fn new(max: Option<u32>) -> Self {
        Self { max, used: 0 }
    }

    fn is_exhausted(&self) -> bool {
        self.max.is_some_and(|max| self.used >= max)
    }

    /// Takes one check, `false` once there are none left
    fn spend(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        if self.max.is_some() {
            self.used += 1;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;
    use crate::types::Part;

    const INTERVAL: Duration = DEFAULT_POLL_INTERVAL;

    fn text(text: &str, complete: bool) -> ServerMessage {
        ServerMessage::model_turn(vec![Part::text(text)], complete)
    }

    fn collector(max_polls: Option<u32>) -> (TurnCollector, crate::queue::QueueProducer) {
        let queue = MessageQueue::new();
        let producer = queue.producer();
        let config = CollectorConfig {
            poll_interval: INTERVAL,
            max_polls,
        };
        (TurnCollector::new(queue, config), producer)
    }

    #[tokio::test(start_paused = true)]
    async fn collects_two_message_turn() {
        let (mut collector, producer) = collector(None);
        producer.message(text("A", false));
        producer.message(text("B", true));

        let turn = collector.collect_turn().await.unwrap();

        assert_eq!(turn.len(), 2);
        assert_eq!(turn.text(), "AB");
        assert_eq!(collector.state(), TurnState::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_exactly_the_pushed_messages_in_order() {
        let (mut collector, producer) = collector(None);
        let pushed: Vec<_> = (0..20).map(|i| text(&i.to_string(), i == 19)).collect();
        for message in &pushed {
            producer.message(message.clone());
        }
        // belongs to the next turn
        producer.message(text("next", true));

        let turn = collector.collect_turn().await.unwrap();
        assert_eq!(turn.messages(), pushed.as_slice());

        let next = collector.collect_turn().await.unwrap();
        assert_eq!(next.text(), "next");
    }

    #[tokio::test(start_paused = true)]
    async fn waits_through_empty_intervals() {
        let (mut collector, producer) = collector(None);
        let start = Instant::now();

        tokio::spawn(async move {
            tokio::time::sleep(INTERVAL * 3).await;
            producer.message(text("late", true));
        });

        let turn = collector.collect_turn().await.unwrap();

        assert_eq!(turn.len(), 1);
        assert!(start.elapsed() >= INTERVAL * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_return_before_completion() {
        let (mut collector, producer) = collector(None);
        producer.message(text("A", false));
        producer.message(text("B", false));

        let pending = tokio::time::timeout(INTERVAL * 50, collector.collect_turn()).await;
        assert!(pending.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_exactly_k_polls() {
        let (mut collector, _producer) = collector(Some(5));
        let start = Instant::now();

        let error = collector.collect_turn().await.unwrap_err();

        assert!(matches!(error, Error::TurnTimeout { attempts: 5 }));
        // five checks, four pauses between them
        assert!(start.elapsed() >= INTERVAL * 4);
        assert!(start.elapsed() < INTERVAL * 5);
        assert_eq!(collector.state(), TurnState::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_on_last_allowed_poll_succeeds() {
        let (mut collector, producer) = collector(Some(5));

        tokio::spawn(async move {
            tokio::time::sleep(INTERVAL * 4 - Duration::from_millis(1)).await;
            producer.message(text("just in time", true));
        });

        let turn = collector.collect_turn().await.unwrap();
        assert_eq!(turn.text(), "just in time");
    }

    #[tokio::test(start_paused = true)]
    async fn non_final_messages_count_against_the_bound() {
        let (mut collector, producer) = collector(Some(3));
        for i in 0..10 {
            producer.message(text(&i.to_string(), false));
        }

        let error = collector.collect_turn().await.unwrap_err();

        assert!(matches!(error, Error::TurnTimeout { attempts: 3 }));
        assert_eq!(collector.queue.len(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn new_turn_after_timeout() {
        let (mut collector, producer) = collector(Some(2));
        assert!(collector.collect_turn().await.is_err());

        producer.message(text("again", true));
        let turn = collector.collect_turn().await.unwrap();
        assert_eq!(turn.text(), "again");
        assert_eq!(collector.state(), TurnState::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_transport_errors() {
        let (mut collector, producer) = collector(None);
        producer.message(text("A", false));
        producer.error("connection reset");

        let error = collector.collect_turn().await.unwrap_err();
        assert!(matches!(error, Error::Transport(ref e) if e == "connection reset"));
        assert_eq!(collector.state(), TurnState::Accumulating);

        producer.closed(Some("bye".into()));
        let error = collector.next_message().await.unwrap_err();
        assert!(matches!(error, Error::Closed { reason: Some(ref r) } if r == "bye"));
    }

    #[tokio::test(start_paused = true)]
    async fn next_message_is_fifo_and_waits() {
        let (mut collector, producer) = collector(None);
        producer.message(text("1", false));
        producer.message(text("2", false));

        assert_eq!(collector.next_message().await.unwrap().parts()[0], Part::text("1"));
        assert_eq!(collector.next_message().await.unwrap().parts()[0], Part::text("2"));

        let start = Instant::now();
        tokio::spawn(async move {
            tokio::time::sleep(INTERVAL * 2).await;
            producer.message(text("3", false));
        });
        assert_eq!(collector.next_message().await.unwrap().parts()[0], Part::text("3"));
        assert!(start.elapsed() >= INTERVAL * 2);
    }

    #[test]
    fn binary_parts_are_left_out_of_text() {
        let messages = [
            ServerMessage::model_turn(vec![Part::inline_data("image/png", b"png")], false),
            text("caption", true),
        ];
        assert_eq!(assemble_text(&messages), "caption");
    }

    #[test]
    fn assembly_depends_on_order() {
        let a = text("A", false);
        let b = text("B", true);
        assert_ne!(
            assemble_text(&[a.clone(), b.clone()]),
            assemble_text(&[b, a])
        );
    }

    #[tokio::test]
    async fn saves_binary_parts() {
        let dir = tempfile::tempdir().unwrap();
        let turn = Turn {
            messages: vec![
                ServerMessage::model_turn(vec![Part::inline_data("image/png", b"first")], false),
                ServerMessage::model_turn(
                    vec![Part::text("two images"), Part::inline_data("image/png", b"second")],
                    true,
                ),
            ],
        };

        let written = turn
            .save_inline_data(|index, _| dir.path().join(format!("image_{index}.png")))
            .await
            .unwrap();

        assert_eq!(written.len(), 2);
        assert_eq!(std::fs::read(&written[0]).unwrap(), b"first");
        assert_eq!(std::fs::read(&written[1]).unwrap(), b"second");
        assert_eq!(turn.text(), "two images");
    }

    #[tokio::test(start_paused = true)]
    async fn late_fragments_of_a_timed_out_turn_come_back_next() {
        let (mut collector, producer) = collector(Some(2));
        producer.message(text("old ", false));
        assert!(matches!(
            collector.collect_turn().await,
            Err(Error::TurnTimeout { attempts: 2 })
        ));

        producer.message(text("tail", true));
        producer.message(text("fresh", true));

        assert_eq!(collector.collect_turn().await.unwrap().text(), "tail");
        assert_eq!(collector.collect_turn().await.unwrap().text(), "fresh");
    }

    #[test]
    fn unbounded_budget_never_counts() {
        let mut budget = PollBudget {
            max: None,
            used: u32::MAX,
        };
        for _ in 0..3 {
            assert!(budget.spend());
        }
        assert_eq!(budget.used, u32::MAX);

        let mut bounded = PollBudget::new(Some(2));
        assert!(bounded.spend());
        assert!(bounded.spend());
        assert!(bounded.is_exhausted());
        assert!(!bounded.spend());
        assert_eq!(bounded.used, 2);
    }

    fn pcm(chunk: &[u8], complete: bool) -> ServerMessage {
        ServerMessage::model_turn(
            vec![Part::inline_data("audio/pcm;rate=24000", chunk)],
            complete,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn audio_chunks_join_into_one_buffer() {
        let (mut collector, producer) = collector(None);
        producer.message(pcm(&[1, 2], false));
        producer.message(ServerMessage::model_turn(
            vec![
                Part::inline_data("audio/pcm;rate=24000", &[3, 4]),
                Part::inline_data("image/png", b"not audio"),
                Part::inline_data("audio/pcm;rate=24000", &[5, 6]),
            ],
            false,
        ));
        producer.message(pcm(&[7, 8], true));

        let turn = collector.collect_turn().await.unwrap();

        assert_eq!(turn.len(), 3);
        assert_eq!(
            turn.concat_inline_data("audio/pcm").unwrap().as_ref(),
            [1, 2, 3, 4, 5, 6, 7, 8]
        );
        assert_eq!(turn.concat_inline_data("image/").unwrap().as_ref(), b"not audio");
    }

    #[tokio::test]
    async fn saves_audio_turn_as_one_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("response.wav");
        let turn = Turn {
            messages: vec![pcm(&[1, 2, 3, 4], false), pcm(&[5, 6], true)],
        };

        let written = turn.save_wav(&path, PcmFormat::LIVE_OUTPUT).await.unwrap();

        assert_eq!(written, 6);
        let wav = std::fs::read(&path).unwrap();
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 6);
        assert_eq!(&wav[44..], [1, 2, 3, 4, 5, 6]);
    }
}
