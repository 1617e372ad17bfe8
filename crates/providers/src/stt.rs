//! Deepgram-style speech-to-text client
//!
//! Batch transcription over HTTP plus live streaming sessions over
//! websocket. Streaming sessions are tuned for the telephony leg: µ-law
//! 8kHz input, interim results on, utterance-end detection by trailing
//! silence, and trade-vocabulary keyword boosting.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use leadline_core::{
    Error, Result, SpeechToText, SttEvent, SttSink, TranscriptResult, WordTimestamp,
};

const PROVIDER: &str = "stt";
const BASE_HTTP_URL: &str = "https://api.deepgram.com/v1/listen";
const BASE_WS_URL: &str = "wss://api.deepgram.com/v1/listen";
const MODEL: &str = "nova-2";
/// Delay before the single transcribe-url retry; hosted recordings can
/// lag a few seconds behind the callback that announces them.
const URL_RETRY_DELAY: Duration = Duration::from_secs(2);
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Trade vocabulary boosted during recognition. Phone audio mangles
/// exactly these words, and they drive classification.
const BOOSTED_KEYWORDS: &[&str] = &[
    "plumber",
    "tap",
    "toilet",
    "cistern",
    "drain",
    "leak",
    "burst",
    "pipe",
    "hot water",
    "gas fitting",
    "gutter",
    "downpipe",
];

pub struct DeepgramStt {
    client: reqwest::Client,
    api_key: String,
    language: String,
    utterance_end_ms: u32,
    endpointing_ms: u32,
}

// Batch response shape.
#[derive(Deserialize)]
struct ListenResponse {
    #[serde(default)]
    metadata: Option<ListenMetadata>,
    results: ListenResults,
}

#[derive(Deserialize)]
struct ListenMetadata {
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Deserialize)]
struct ListenResults {
    channels: Vec<ListenChannel>,
}

#[derive(Deserialize)]
struct ListenChannel {
    alternatives: Vec<ListenAlternative>,
}

#[derive(Deserialize)]
struct ListenAlternative {
    transcript: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    words: Vec<ListenWord>,
}

#[derive(Deserialize)]
struct ListenWord {
    word: String,
    start: f64,
    end: f64,
    #[serde(default)]
    confidence: f32,
}

// Streaming message shape, discriminated by `type`.
#[derive(Deserialize)]
struct StreamMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    channel: Option<StreamChannel>,
    #[serde(default)]
    is_final: bool,
}

#[derive(Deserialize)]
struct StreamChannel {
    alternatives: Vec<StreamAlternative>,
}

#[derive(Deserialize)]
struct StreamAlternative {
    transcript: String,
    #[serde(default)]
    confidence: f32,
}

impl DeepgramStt {
    pub fn new(
        client: reqwest::Client,
        api_key: String,
        language: String,
        utterance_end_ms: u32,
        endpointing_ms: u32,
    ) -> Self {
        Self {
            client,
            api_key,
            language,
            utterance_end_ms,
            endpointing_ms,
        }
    }

    fn stream_url(&self) -> Result<url::Url> {
        let mut params: Vec<(&str, String)> = vec![
            ("model", MODEL.to_string()),
            ("language", self.language.clone()),
            ("encoding", "mulaw".to_string()),
            ("sample_rate", "8000".to_string()),
            ("channels", "1".to_string()),
            ("punctuate", "true".to_string()),
            ("smart_format", "true".to_string()),
            ("interim_results", "true".to_string()),
            ("vad_events", "true".to_string()),
            ("utterance_end_ms", self.utterance_end_ms.to_string()),
            ("endpointing", self.endpointing_ms.to_string()),
        ];
        for keyword in BOOSTED_KEYWORDS {
            params.push(("keywords", format!("{keyword}:2")));
        }
        url::Url::parse_with_params(BASE_WS_URL, &params)
            .map_err(|e| Error::permanent(PROVIDER, e.to_string()))
    }

    fn batch_url(&self) -> Result<url::Url> {
        url::Url::parse_with_params(
            BASE_HTTP_URL,
            &[
                ("model", MODEL),
                ("language", self.language.as_str()),
                ("smart_format", "true"),
                ("punctuate", "true"),
            ],
        )
        .map_err(|e| Error::permanent(PROVIDER, e.to_string()))
    }

    async fn parse_listen_response(&self, response: reqwest::Response) -> Result<TranscriptResult> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(crate::retry::classify_status(PROVIDER, status, &body));
        }

        let parsed: ListenResponse = response
            .json()
            .await
            .map_err(|e| Error::permanent(PROVIDER, format!("malformed response: {e}")))?;

        let alternative = parsed
            .results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .ok_or_else(|| Error::permanent(PROVIDER, "response contained no transcript"))?;

        Ok(TranscriptResult {
            text: alternative.transcript,
            confidence: alternative.confidence,
            is_final: true,
            words: alternative
                .words
                .into_iter()
                .map(|w| WordTimestamp {
                    word: w.word,
                    start_secs: w.start,
                    end_secs: w.end,
                    confidence: w.confidence,
                })
                .collect(),
            duration_secs: parsed.metadata.and_then(|m| m.duration).unwrap_or(0.0),
        })
    }
}

/// Map one streaming websocket text frame onto an event. `None` for
/// frames the session does not care about (metadata, empty transcripts).
fn parse_stream_message(raw: &str) -> Option<SttEvent> {
    let message: StreamMessage = serde_json::from_str(raw).ok()?;
    match message.kind.as_str() {
        "Results" => {
            let alt = message.channel?.alternatives.into_iter().next()?;
            if alt.transcript.trim().is_empty() {
                return None;
            }
            Some(SttEvent::Transcript {
                text: alt.transcript,
                confidence: alt.confidence,
                is_final: message.is_final,
            })
        }
        "UtteranceEnd" => Some(SttEvent::UtteranceEnd),
        "SpeechStarted" => Some(SttEvent::SpeechStarted),
        _ => None,
    }
}

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Audio-in half of one live session. Closing twice is a no-op.
struct StreamSink {
    writer: Mutex<Option<WsWriter>>,
}

#[async_trait]
impl SttSink for StreamSink {
    async fn send_audio(&self, chunk: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| Error::Audio("recognizer stream already closed".into()))?;
        writer
            .send(Message::Binary(chunk.to_vec()))
            .await
            .map_err(|e| Error::transient(PROVIDER, e.to_string()))
    }

    async fn close(&self) {
        let Some(mut writer) = self.writer.lock().await.take() else {
            return;
        };
        // Best effort: tell the recognizer to flush, then close.
        let _ = writer
            .send(Message::Text(r#"{"type":"CloseStream"}"#.to_string()))
            .await;
        let _ = writer.close().await;
    }
}

#[async_trait]
impl SpeechToText for DeepgramStt {
    async fn transcribe(&self, audio: &[u8], mime: &str) -> Result<TranscriptResult> {
        let response = self
            .client
            .post(self.batch_url()?)
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.api_key))
            .header(reqwest::header::CONTENT_TYPE, mime)
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| crate::retry::classify_reqwest(PROVIDER, e))?;
        self.parse_listen_response(response).await
    }

    async fn transcribe_url(&self, url: &str) -> Result<TranscriptResult> {
        let send = || async {
            let response = self
                .client
                .post(self.batch_url()?)
                .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.api_key))
                .json(&serde_json::json!({ "url": url }))
                .send()
                .await
                .map_err(|e| crate::retry::classify_reqwest(PROVIDER, e))?;
            self.parse_listen_response(response).await
        };

        match send().await {
            Ok(result) => Ok(result),
            Err(first) => {
                // Hosted recordings may not be ready yet; one delayed retry.
                warn!(error = %first, "transcribe_url failed, retrying once");
                tokio::time::sleep(URL_RETRY_DELAY).await;
                send().await
            }
        }
    }

    async fn open_stream(&self) -> Result<(Box<dyn SttSink>, mpsc::Receiver<SttEvent>)> {
        let mut request = self
            .stream_url()?
            .as_str()
            .into_client_request()
            .map_err(|e| Error::permanent(PROVIDER, e.to_string()))?;
        request.headers_mut().insert(
            AUTHORIZATION,
            format!("Token {}", self.api_key)
                .parse()
                .map_err(|_| Error::permanent(PROVIDER, "api key is not header-safe"))?,
        );

        let (socket, _) = connect_async(request)
            .await
            .map_err(|e| Error::transient(PROVIDER, e.to_string()))?;
        debug!(language = %self.language, "recognizer stream opened");

        let (writer, mut reader) = socket.split();
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if let Some(event) = parse_stream_message(&text) {
                            if events_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            let _ = events_tx.send(SttEvent::Closed).await;
        });

        Ok((
            Box::new(StreamSink {
                writer: Mutex::new(Some(writer)),
            }),
            events_rx,
        ))
    }

    fn model_name(&self) -> &str {
        MODEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stt() -> DeepgramStt {
        DeepgramStt::new(
            reqwest::Client::new(),
            "key".into(),
            "en-AU".into(),
            1_500,
            300,
        )
    }

    #[test]
    fn stream_url_carries_telephony_tuning() {
        let url = stt().stream_url().unwrap();
        let query = url.query().unwrap();
        assert!(query.contains("encoding=mulaw"));
        assert!(query.contains("sample_rate=8000"));
        assert!(query.contains("utterance_end_ms=1500"));
        assert!(query.contains("endpointing=300"));
        assert!(query.contains("language=en-AU"));
        assert!(query.contains("keywords=plumber%3A2"));
    }

    #[test]
    fn final_transcript_frame_parses() {
        let raw = r#"{"type":"Results","is_final":true,"channel":{"alternatives":[{"transcript":"my tap is leaking","confidence":0.93}]}}"#;
        match parse_stream_message(raw) {
            Some(SttEvent::Transcript {
                text,
                confidence,
                is_final,
            }) => {
                assert_eq!(text, "my tap is leaking");
                assert!((confidence - 0.93).abs() < 1e-6);
                assert!(is_final);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn empty_transcripts_are_dropped() {
        let raw = r#"{"type":"Results","is_final":false,"channel":{"alternatives":[{"transcript":"  ","confidence":0.0}]}}"#;
        assert!(parse_stream_message(raw).is_none());
    }

    #[test]
    fn control_frames_map_to_events() {
        assert!(matches!(
            parse_stream_message(r#"{"type":"UtteranceEnd","last_word_end":2.1}"#),
            Some(SttEvent::UtteranceEnd)
        ));
        assert!(matches!(
            parse_stream_message(r#"{"type":"SpeechStarted","timestamp":0.5}"#),
            Some(SttEvent::SpeechStarted)
        ));
        assert!(parse_stream_message(r#"{"type":"Metadata"}"#).is_none());
        assert!(parse_stream_message("not json").is_none());
    }

    #[test]
    fn batch_response_shape_parses() {
        let raw = r#"{
            "metadata": {"duration": 3.4},
            "results": {"channels": [{"alternatives": [{
                "transcript": "blocked drain in robina",
                "confidence": 0.97,
                "words": [{"word": "blocked", "start": 0.1, "end": 0.5, "confidence": 0.98}]
            }]}]}
        }"#;
        let parsed: ListenResponse = serde_json::from_str(raw).unwrap();
        let alt = &parsed.results.channels[0].alternatives[0];
        assert_eq!(alt.transcript, "blocked drain in robina");
        assert_eq!(alt.words.len(), 1);
        assert_eq!(parsed.metadata.unwrap().duration, Some(3.4));
    }
}
