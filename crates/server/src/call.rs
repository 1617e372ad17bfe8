//! Live call handling over the telephony media stream
//!
//! One socket per call. Inbound frames carry base64 µ-law audio that is
//! forwarded to the streaming recognizer; utterance boundaries come from
//! the recognizer, not from silence in the audio. The agent speaks first,
//! and the caller can interrupt it at any 20ms frame boundary: speech
//! events arriving mid-playback clear the telephony buffer and stop the
//! response (barge-in).
//!
//! The lead is created lazily on the first utterance that reaches
//! classification, so a call that never classifies (recognizer down,
//! caller hangs up on the greeting, nothing but noise) leaves no record
//! behind. Invariants kept on every exit path: the recognizer connection
//! is closed, and a created lead is announced to the dashboard exactly
//! once.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use leadline_core::{
    LeadEvent, LeadStore, SpeechToText, SttEvent, SttSink, TextToSpeech, UtteranceBuffer,
};

use crate::state::AppState;

/// Outbound µ-law frame size: 160 bytes is 20ms at 8kHz. Barge-in is
/// checked between frames, so this bounds interruption latency.
const FRAME_BYTES: usize = 160;

const REPEAT_PROMPT: &str =
    "Sorry, the line cut out a bit there. Could you say that again for me?";
const ERROR_PROMPT: &str =
    "Sorry, something went wrong on our end. We've got your number and will call you back.";
const STT_DOWN_PROMPT: &str =
    "Sorry, we're having trouble taking calls right now. Please try again shortly.";

/// Inbound media-stream frames. Unknown events (marks, DTMF) are ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum InboundFrame {
    Connected,
    Start { start: StartMeta },
    Media { media: MediaPayload },
    Stop,
    #[serde(other)]
    Ignored,
}

#[derive(Debug, Deserialize)]
struct StartMeta {
    #[serde(rename = "streamSid")]
    stream_sid: String,
    #[serde(rename = "customParameters", default)]
    custom_parameters: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct MediaPayload {
    /// Base64-encoded µ-law 8kHz audio.
    payload: String,
}

/// Signals from the socket-reader task to the session loop.
enum ReaderSignal {
    Stopped,
    SocketClosed,
}

enum SpeakEnd {
    Completed,
    BargedIn,
    SocketClosed,
}

/// What to do at an utterance boundary, decided before anything is
/// spoken or persisted.
enum UtteranceDisposition {
    /// Not enough accumulated speech to act on; keep listening.
    Accumulate,
    /// Below the confidence floor: the buffer was discarded whole, ask
    /// the caller to repeat.
    AskRepeat,
    /// Confident enough; this transcript goes to classification.
    Classify(String),
}

/// Entry point for one voice socket.
pub async fn handle_voice_socket(socket: WebSocket, state: AppState) {
    let (ws_tx, mut ws_rx) = socket.split();

    // The stream is silent until the start frame announces who is calling.
    let Some(start) = await_start(&mut ws_rx).await else {
        debug!("voice socket closed before start frame");
        return;
    };

    let business_id = start
        .custom_parameters
        .get("business_id")
        .cloned()
        .unwrap_or_else(|| "default".to_string());
    let caller = start
        .custom_parameters
        .get("from")
        .cloned()
        .unwrap_or_default();

    let intake = match LeadIntake::begin(state, business_id, caller).await {
        Ok(intake) => intake,
        Err(err) => {
            warn!(error = %err, "failed to begin call session");
            return;
        }
    };
    let mut session = CallSession {
        ws_tx,
        stream_sid: start.stream_sid,
        intake,
        replay: VecDeque::new(),
        sink: None,
    };
    session.run(ws_rx).await;
}

async fn await_start(ws_rx: &mut SplitStream<WebSocket>) -> Option<StartMeta> {
    while let Some(Ok(frame)) = ws_rx.next().await {
        if let Message::Text(text) = frame {
            match serde_json::from_str::<InboundFrame>(&text) {
                Ok(InboundFrame::Start { start }) => return Some(start),
                Ok(InboundFrame::Stop) => return None,
                Ok(_) => {}
                Err(err) => debug!(error = %err, "unparseable pre-start frame"),
            }
        }
    }
    None
}

/// Socket-independent intake state for one call: accumulates the
/// utterance, gates it on confidence, and owns the lead lifecycle. No
/// lead exists until the first transcript passes the gate.
struct LeadIntake {
    state: AppState,
    business_id: String,
    business_name: String,
    caller: String,
    buffer: UtteranceBuffer,
    lead_id: Option<String>,
    /// Taken exactly once when the call ends.
    created_event: Option<LeadEvent>,
}

impl LeadIntake {
    async fn begin(
        state: AppState,
        business_id: String,
        caller: String,
    ) -> leadline_core::Result<Self> {
        let store = state.manager.store().clone();
        let business_name = match store.get_business(&business_id).await? {
            Some(profile) => profile.business_name,
            None => {
                // First call for this business: seed a default profile so
                // pricing has rates to work with.
                let profile = leadline_core::BusinessProfile::new(
                    business_id.clone(),
                    state.settings.call.default_business_name.clone(),
                );
                store.upsert_business(&profile).await?;
                profile.business_name
            }
        };
        info!(business_id, "call started");

        Ok(Self {
            state,
            business_id,
            business_name,
            caller,
            buffer: UtteranceBuffer::new(),
            lead_id: None,
            created_event: None,
        })
    }

    fn on_transcript(&mut self, text: &str, confidence: f32, is_final: bool) {
        if is_final {
            self.buffer.push_final(text, confidence);
        } else {
            self.buffer.set_interim(text);
        }
    }

    /// The caller has paused long enough; decide what the accumulated
    /// buffer is worth. Anything below the confidence floor is discarded
    /// whole, never partially classified.
    fn utterance_ended(&mut self) -> UtteranceDisposition {
        if !self.buffer.is_substantial() {
            return UtteranceDisposition::Accumulate;
        }
        if self.buffer.avg_confidence() < self.state.settings.call.min_confidence {
            info!(
                business_id = %self.business_id,
                confidence = self.buffer.avg_confidence(),
                "utterance below confidence floor, asking caller to repeat"
            );
            self.buffer.reset();
            return UtteranceDisposition::AskRepeat;
        }
        let text = self.buffer.transcript().to_string();
        self.buffer.reset();
        UtteranceDisposition::Classify(text)
    }

    /// Run one confident transcript through the pipeline, creating the
    /// lead on the first pass. Returns the reply to speak.
    async fn handle_transcript(&mut self, text: &str) -> leadline_core::Result<String> {
        let lead_id = match &self.lead_id {
            Some(id) => id.clone(),
            None => {
                let (lead, event) = self
                    .state
                    .manager
                    .create_lead(&self.business_id, &self.caller, "")
                    .await?;
                info!(lead_id = %lead.id, business_id = %self.business_id, "lead created");
                self.lead_id = Some(lead.id.clone());
                self.created_event = Some(event);
                lead.id
            }
        };

        let outcome = self
            .state
            .manager
            .process_customer_message(&lead_id, text)
            .await?;
        self.state
            .registry
            .broadcast_batch(&self.business_id, &outcome.events);
        Ok(outcome.reply)
    }

    /// Announce the lead to the dashboard, exactly once and only if the
    /// call classified something.
    async fn finish(&mut self) {
        let Some(event) = self.created_event.take() else {
            return;
        };
        let Some(lead_id) = self.lead_id.clone() else {
            return;
        };
        // Refresh the snapshot so the dashboard sees the final state,
        // not the empty lead from first classification.
        let event = match self.state.manager.store().get_lead(&lead_id).await {
            Ok(Some(lead)) => LeadEvent::LeadCreated {
                lead: Box::new(lead),
            },
            _ => event,
        };
        self.state.registry.broadcast(&self.business_id, &event);
        info!(lead_id = %lead_id, "lead announced");
    }
}

struct CallSession {
    ws_tx: SplitSink<WebSocket, Message>,
    stream_sid: String,
    intake: LeadIntake,
    /// Events drained from the recognizer while the agent was speaking;
    /// replayed in order before the next socket read.
    replay: VecDeque<SttEvent>,
    sink: Option<Arc<dyn SttSink>>,
}

impl CallSession {
    async fn run(&mut self, ws_rx: SplitStream<WebSocket>) {
        // A closed dummy channel keeps the speak path uniform when no
        // recognizer is available.
        let (_tx, dummy_rx) = mpsc::channel(1);
        let mut stt_rx = dummy_rx;

        let recogniser = match &self.intake.state.stt {
            Some(stt) => match stt.open_stream().await {
                Ok((sink, events)) => {
                    self.sink = Some(Arc::from(sink));
                    stt_rx = events;
                    true
                }
                Err(err) => {
                    warn!(business_id = %self.intake.business_id, error = %err, "recognizer unavailable");
                    false
                }
            },
            None => false,
        };

        let (signal_tx, mut signal_rx) = mpsc::channel(8);
        tokio::spawn(forward_media(ws_rx, self.sink.clone(), signal_tx));

        if recogniser {
            let greeting = format!(
                "G'day, you've reached {}. Tell me what's going on and \
                 I'll sort out a quote for you.",
                self.intake.business_name
            );
            self.speak(&mut stt_rx, &greeting).await;
        } else {
            self.speak(&mut stt_rx, STT_DOWN_PROMPT).await;
        }

        let mut stt_alive = recogniser;
        loop {
            // Events drained during playback replay before new ones.
            while let Some(event) = self.replay.pop_front() {
                self.on_event(&mut stt_rx, event).await;
            }

            tokio::select! {
                signal = signal_rx.recv() => match signal {
                    Some(ReaderSignal::Stopped) | Some(ReaderSignal::SocketClosed) | None => break,
                },
                event = stt_rx.recv(), if stt_alive => match event {
                    Some(event) => self.on_event(&mut stt_rx, event).await,
                    None => {
                        // The call stays up for the caller, recognition is
                        // just gone for the remainder.
                        debug!(business_id = %self.intake.business_id, "recognizer event stream ended");
                        stt_alive = false;
                    }
                },
            }
        }

        self.finish().await;
    }

    async fn on_event(&mut self, stt_rx: &mut mpsc::Receiver<SttEvent>, event: SttEvent) {
        match event {
            SttEvent::Transcript {
                text,
                confidence,
                is_final,
            } => self.intake.on_transcript(&text, confidence, is_final),
            SttEvent::UtteranceEnd => match self.intake.utterance_ended() {
                UtteranceDisposition::Accumulate => {}
                UtteranceDisposition::AskRepeat => {
                    self.speak(stt_rx, REPEAT_PROMPT).await;
                }
                UtteranceDisposition::Classify(text) => {
                    info!(business_id = %self.intake.business_id, chars = text.len(), "processing utterance");
                    match self.intake.handle_transcript(&text).await {
                        Ok(reply) => {
                            self.speak(stt_rx, &reply).await;
                        }
                        Err(err) => {
                            warn!(business_id = %self.intake.business_id, error = %err, "pipeline failed for utterance");
                            self.speak(stt_rx, ERROR_PROMPT).await;
                        }
                    }
                }
            },
            SttEvent::SpeechStarted => {}
            SttEvent::Closed => {
                debug!(business_id = %self.intake.business_id, "recognizer closed the stream");
            }
        }
    }

    /// Stream synthesized audio to the caller in 20ms frames, aborting
    /// the moment the recognizer reports inbound speech.
    async fn speak(&mut self, stt_rx: &mut mpsc::Receiver<SttEvent>, text: &str) -> SpeakEnd {
        let Some(tts) = self.intake.state.tts.clone() else {
            debug!(business_id = %self.intake.business_id, "no synthesis provider, reply not spoken");
            return SpeakEnd::Completed;
        };

        let mut audio = match tts.stream(text).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(business_id = %self.intake.business_id, error = %err, "synthesis failed");
                return SpeakEnd::Completed;
            }
        };

        while let Some(chunk) = audio.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!(business_id = %self.intake.business_id, error = %err, "synthesis stream failed");
                    return SpeakEnd::Completed;
                }
            };
            for frame in chunk.chunks(FRAME_BYTES) {
                if drain_recognizer(stt_rx, &mut self.replay) {
                    info!(business_id = %self.intake.business_id, "caller barged in, clearing playback");
                    let _ = self.send_clear().await;
                    return SpeakEnd::BargedIn;
                }
                if self.send_media(frame).await.is_err() {
                    return SpeakEnd::SocketClosed;
                }
            }
        }
        SpeakEnd::Completed
    }

    async fn send_media(&mut self, frame: &[u8]) -> Result<(), axum::Error> {
        let message = json!({
            "event": "media",
            "streamSid": self.stream_sid,
            "media": { "payload": BASE64.encode(frame) },
        });
        self.ws_tx.send(Message::Text(message.to_string())).await
    }

    async fn send_clear(&mut self) -> Result<(), axum::Error> {
        let message = json!({ "event": "clear", "streamSid": self.stream_sid });
        self.ws_tx.send(Message::Text(message.to_string())).await
    }

    /// Runs on every exit path: closes the recognizer and lets the
    /// intake announce its lead, if one was ever created.
    async fn finish(&mut self) {
        if let Some(sink) = &self.sink {
            sink.close().await;
        }
        self.intake.finish().await;
        info!(business_id = %self.intake.business_id, "call finished");
    }
}

/// Pull any recognizer events that arrived during playback. Returns true
/// when the caller started speaking; all events are queued for replay
/// either way.
fn drain_recognizer(stt_rx: &mut mpsc::Receiver<SttEvent>, replay: &mut VecDeque<SttEvent>) -> bool {
    let mut barged = false;
    while let Ok(event) = stt_rx.try_recv() {
        if matches!(
            event,
            SttEvent::SpeechStarted | SttEvent::Transcript { .. }
        ) {
            barged = true;
        }
        replay.push_back(event);
    }
    barged
}

/// Reader task: decodes inbound audio and feeds the recognizer until the
/// stream stops or the socket drops.
async fn forward_media(
    mut ws_rx: SplitStream<WebSocket>,
    sink: Option<Arc<dyn SttSink>>,
    signal_tx: mpsc::Sender<ReaderSignal>,
) {
    while let Some(frame) = ws_rx.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(_) => continue,
            Err(_) => break,
        };
        match serde_json::from_str::<InboundFrame>(&text) {
            Ok(InboundFrame::Media { media }) => {
                let Some(sink) = &sink else { continue };
                match BASE64.decode(media.payload.as_bytes()) {
                    Ok(audio) => {
                        if let Err(err) = sink.send_audio(&audio).await {
                            warn!(error = %err, "recognizer rejected audio, stopping forwarder");
                            break;
                        }
                    }
                    Err(err) => debug!(error = %err, "undecodable media payload"),
                }
            }
            Ok(InboundFrame::Stop) => {
                let _ = signal_tx.send(ReaderSignal::Stopped).await;
                return;
            }
            Ok(_) => {}
            Err(err) => debug!(error = %err, "unparseable media-stream frame"),
        }
    }
    let _ = signal_tx.send(ReaderSignal::SocketClosed).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use leadline_classifier::Classifier;
    use leadline_config::Settings;
    use leadline_core::{JobType, LeadStatus, UrgencyLevel};
    use leadline_orchestrator::{InMemoryLeadStore, LeadManager, NoopCache};
    use leadline_providers::{ServiceAreaResolver, TwilioSms};

    fn test_state() -> AppState {
        let manager = Arc::new(LeadManager::new(
            Arc::new(InMemoryLeadStore::new()),
            Arc::new(NoopCache),
            Arc::new(Classifier::keyword_only()),
            Arc::new(ServiceAreaResolver::new(vec![])),
            Arc::new(TwilioSms::mock()),
            "http://localhost:3000".into(),
            Duration::from_secs(60),
        ));
        AppState::new(Arc::new(Settings::default()), manager, None, None)
    }

    #[test]
    fn start_frame_parses_with_custom_parameters() {
        let raw = r#"{
            "event": "start",
            "start": {
                "streamSid": "MZ123",
                "customParameters": {"business_id": "biz-1", "from": "+61400000000"}
            }
        }"#;
        match serde_json::from_str::<InboundFrame>(raw) {
            Ok(InboundFrame::Start { start }) => {
                assert_eq!(start.stream_sid, "MZ123");
                assert_eq!(
                    start.custom_parameters.get("business_id").map(String::as_str),
                    Some("biz-1")
                );
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn media_and_stop_frames_parse() {
        let media = r#"{"event":"media","media":{"payload":"AAAA"}}"#;
        assert!(matches!(
            serde_json::from_str::<InboundFrame>(media),
            Ok(InboundFrame::Media { .. })
        ));
        assert!(matches!(
            serde_json::from_str::<InboundFrame>(r#"{"event":"stop"}"#),
            Ok(InboundFrame::Stop)
        ));
    }

    #[test]
    fn unknown_events_are_ignored_not_errors() {
        assert!(matches!(
            serde_json::from_str::<InboundFrame>(r#"{"event":"mark","mark":{"name":"x"}}"#),
            Ok(InboundFrame::Ignored)
        ));
        assert!(matches!(
            serde_json::from_str::<InboundFrame>(r#"{"event":"dtmf"}"#),
            Ok(InboundFrame::Ignored)
        ));
    }

    #[tokio::test]
    async fn call_without_classification_leaves_no_lead() {
        let state = test_state();
        let mut feed = state.registry.register("biz-1");
        let mut intake =
            LeadIntake::begin(state.clone(), "biz-1".into(), "+61400000000".into())
                .await
                .unwrap();

        // Caller connected and hung up without a usable utterance.
        intake.finish().await;

        assert!(state
            .manager
            .store()
            .list_leads("biz-1")
            .await
            .unwrap()
            .is_empty());
        assert!(feed.try_recv().is_err());
    }

    #[tokio::test]
    async fn low_confidence_utterance_is_discarded_whole() {
        let state = test_state();
        let mut intake =
            LeadIntake::begin(state.clone(), "biz-1".into(), "+61400000000".into())
                .await
                .unwrap();

        intake.on_transcript("something about water maybe", 0.12, true);
        assert!(matches!(
            intake.utterance_ended(),
            UtteranceDisposition::AskRepeat
        ));
        // Buffer reset; nothing was classified, no lead exists.
        assert_eq!(intake.buffer.transcript(), "");
        assert!(intake.lead_id.is_none());

        intake.finish().await;
        assert!(state
            .manager
            .store()
            .list_leads("biz-1")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn short_fragments_keep_accumulating() {
        let state = test_state();
        let mut intake =
            LeadIntake::begin(state, "biz-1".into(), String::new()).await.unwrap();
        intake.on_transcript("yes", 0.95, true);
        assert!(matches!(
            intake.utterance_ended(),
            UtteranceDisposition::Accumulate
        ));
        // Still there, waiting for the rest of the sentence.
        assert_eq!(intake.buffer.transcript(), "yes");
    }

    #[tokio::test]
    async fn emergency_call_creates_and_announces_one_lead() {
        let state = test_state();
        let mut intake =
            LeadIntake::begin(state.clone(), "biz-1".into(), "+61400000000".into())
                .await
                .unwrap();

        intake.on_transcript("a pipe burst and water is flooding the laundry", 0.92, true);
        let UtteranceDisposition::Classify(text) = intake.utterance_ended() else {
            panic!("confident utterance should classify");
        };
        let reply = intake.handle_transcript(&text).await.unwrap();
        assert!(reply.contains("pipe burst"));

        let leads = state.manager.store().list_leads("biz-1").await.unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].status, LeadStatus::TradieReview);
        assert_eq!(leads[0].job_type, Some(JobType::PipeBurst));
        assert_eq!(leads[0].urgency, UrgencyLevel::Emergency);

        // Exactly one announcement, carrying the final snapshot.
        let mut feed = state.registry.register("biz-1");
        intake.finish().await;
        intake.finish().await;
        let payload = feed.try_recv().unwrap();
        assert!(payload.contains("lead_created"));
        assert!(payload.contains("tradie_review"));
        assert!(feed.try_recv().is_err());
    }

    #[tokio::test]
    async fn drained_speech_events_trigger_barge_in_and_replay() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(SttEvent::SpeechStarted).await.unwrap();
        tx.send(SttEvent::UtteranceEnd).await.unwrap();

        let mut replay = VecDeque::new();
        assert!(drain_recognizer(&mut rx, &mut replay));
        // Everything drained is queued in arrival order.
        assert!(matches!(replay[0], SttEvent::SpeechStarted));
        assert!(matches!(replay[1], SttEvent::UtteranceEnd));

        // An utterance boundary alone is not inbound speech.
        let (tx2, mut rx2) = mpsc::channel(8);
        tx2.send(SttEvent::UtteranceEnd).await.unwrap();
        let mut replay2 = VecDeque::new();
        assert!(!drain_recognizer(&mut rx2, &mut replay2));
        assert_eq!(replay2.len(), 1);
    }
}
