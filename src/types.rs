//! Contains every type exchanged with the Live API

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::Result;

/// The producer of the content
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// Kind of content the model is allowed to answer with
///
/// [API Reference](https://ai.google.dev/api/generate-content#Modality)
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Modality {
    Text,
    Image,
    Audio,
}

/// The base structured datatype containing multi-part content of a message
///
/// Model turns sent by the Live API usually leave `role` out.
///
/// [API Reference](https://ai.google.dev/api/caching#Content)
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some(Role::User),
            parts,
        }
    }

    pub fn user_text(text: &str) -> Self {
        Self::user(vec![Part::text(text)])
    }
}

/// A datatype containing media that is part of a multi-part [Content] message
///
/// [API Reference](https://ai.google.dev/api/caching#Part)
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Encodes `data` and wraps it as an inline blob
    pub fn inline_data(mime_type: &str, data: &[u8]) -> Self {
        Self {
            inline_data: Some(InlineData::from_bytes(mime_type, data)),
            ..Default::default()
        }
    }
}

/// Inline media bytes, carried base64 encoded on the wire
///
/// [API Reference](https://ai.google.dev/api/caching#Blob)
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

impl InlineData {
    /// Wraps data that is already base64 encoded
    pub fn new(mime_type: &str, data: &str) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn from_bytes(mime_type: &str, data: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: STANDARD.encode(data),
        }
    }

    pub fn decode(&self) -> Result<Bytes> {
        Ok(STANDARD.decode(&self.data)?.into())
    }
}

/// Configuration options for model generation and outputs
///
/// [API Reference](https://ai.google.dev/api/live#bidigeneratecontentsetup)
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_modalities: Vec<Modality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<i32>,
}

/// First message of every session, sent before anything else
///
/// [API Reference](https://ai.google.dev/api/live#bidigeneratecontentsetup)
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

/// Incremental update of the conversation, delivered from the client
///
/// [API Reference](https://ai.google.dev/api/live#bidigeneratecontentclientcontent)
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    #[serde(default)]
    pub turns: Vec<Content>,
    #[serde(default)]
    pub turn_complete: bool,
}

/// Messages the client sends over the socket
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    ClientContent(ClientContent),
}

/// One message pushed by the server
///
/// Every field is optional; a message usually carries exactly one of them.
///
/// [API Reference](https://ai.google.dev/api/live#bidigeneratecontentservermessage)
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_complete: Option<SetupComplete>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_content: Option<ServerContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub go_away: Option<GoAway>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
}

impl ServerMessage {
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    pub fn is_turn_complete(&self) -> bool {
        self.server_content
            .as_ref()
            .is_some_and(|content| content.turn_complete)
    }

    /// Parts of the model turn, empty when the message has none
    pub fn parts(&self) -> &[Part] {
        self.server_content
            .as_ref()
            .and_then(|content| content.model_turn.as_ref())
            .map(|turn| turn.parts.as_slice())
            .unwrap_or_default()
    }

    /// Builds a message carrying a model turn, mostly useful when faking a server
    pub fn model_turn(parts: Vec<Part>, turn_complete: bool) -> Self {
        Self {
            server_content: Some(ServerContent {
                model_turn: Some(Content { role: None, parts }),
                turn_complete,
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct SetupComplete {}

/// Content generated by the model in response to client messages
///
/// [API Reference](https://ai.google.dev/api/live#bidigeneratecontentservercontent)
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub generation_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

/// Notice that the server will soon disconnect
///
/// [API Reference](https://ai.google.dev/api/live#goaway)
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_left: Option<String>,
}

/// Token usage of the session so far
///
/// [API Reference](https://ai.google.dev/api/live#usagemetadata)
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub response_token_count: u64,
    #[serde(default)]
    pub total_token_count: u64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn setup_wire_shape() {
        let message = ClientMessage::Setup(Setup {
            model: "models/gemini-2.0-flash-exp".into(),
            generation_config: Some(GenerationConfig {
                response_modalities: vec![Modality::Text],
                ..Default::default()
            }),
            system_instruction: None,
        });

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "setup": {
                    "model": "models/gemini-2.0-flash-exp",
                    "generationConfig": { "responseModalities": ["TEXT"] }
                }
            })
        );
    }

    #[test]
    fn client_content_wire_shape() {
        let message = ClientMessage::ClientContent(ClientContent {
            turns: vec![Content::user(vec![
                Part::text("This image is just black, can you see it?"),
                Part::inline_data("image/png", &[0, 1, 2]),
            ])],
            turn_complete: true,
        });

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "clientContent": {
                    "turns": [{
                        "role": "user",
                        "parts": [
                            { "text": "This image is just black, can you see it?" },
                            { "inlineData": { "mimeType": "image/png", "data": "AAEC" } }
                        ]
                    }],
                    "turnComplete": true
                }
            })
        );
    }

    #[test]
    fn parses_server_content() {
        let message: ServerMessage = serde_json::from_value(json!({
            "serverContent": {
                "modelTurn": { "parts": [{ "text": "The" }] },
                "turnComplete": true,
                "someFutureField": 1
            }
        }))
        .unwrap();

        assert!(message.is_turn_complete());
        assert!(!message.is_setup_complete());
        assert_eq!(message.parts(), &[Part::text("The")]);
    }

    #[test]
    fn parses_setup_complete_and_go_away() {
        let setup: ServerMessage = serde_json::from_str(r#"{"setupComplete":{}}"#).unwrap();
        assert!(setup.is_setup_complete());
        assert!(setup.parts().is_empty());

        let go_away: ServerMessage =
            serde_json::from_str(r#"{"goAway":{"timeLeft":"5s"}}"#).unwrap();
        assert_eq!(go_away.go_away.unwrap().time_left.as_deref(), Some("5s"));
    }

    #[test]
    fn inline_data_decodes() {
        // 2x2 black PNG
        let png = InlineData::new(
            "image/png",
            "iVBORw0KGgoAAAANSUhEUgAAAAIAAAACCAIAAAD91JpzAAAAC0lEQVR4nGNgQAYAAA4AAamRc7EAAAAASUVORK5CYII=",
        );
        let bytes = png.decode().unwrap();
        assert_eq!(&bytes[1..4], b"PNG");

        assert!(InlineData::new("image/png", "not base64!").decode().is_err());
    }
}
