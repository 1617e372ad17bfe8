//! Shared application state

use std::sync::Arc;

use leadline_config::Settings;
use leadline_core::{SpeechToText, TextToSpeech};
use leadline_orchestrator::LeadManager;

use crate::registry::BroadcastRegistry;

/// Everything a handler needs, injected once at startup. Speech providers
/// are optional: without them the REST surface still works and the voice
/// socket degrades to text-free call handling.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub manager: Arc<LeadManager>,
    pub registry: Arc<BroadcastRegistry>,
    pub stt: Option<Arc<dyn SpeechToText>>,
    pub tts: Option<Arc<dyn TextToSpeech>>,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        manager: Arc<LeadManager>,
        stt: Option<Arc<dyn SpeechToText>>,
        tts: Option<Arc<dyn TextToSpeech>>,
    ) -> Self {
        Self {
            settings,
            manager,
            registry: Arc::new(BroadcastRegistry::new()),
            stt,
            tts,
        }
    }
}
