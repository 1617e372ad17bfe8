//! Lead intake server binary
//!
//! Wires the configured providers into the pipeline and serves the HTTP
//! and WebSocket surface. Every provider key is optional; missing ones
//! route that concern to its fallback (keyword classification, free
//! geocoding, mock SMS) so a keyless checkout still runs end to end.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use leadline_classifier::Classifier;
use leadline_config::load_settings;
use leadline_core::{
    DistanceProvider, LanguageModel, SmsSender, SnapshotCache, SpeechToText, TextToSpeech,
};
use leadline_orchestrator::{InMemoryLeadStore, LeadManager, MemoryCache, NoopCache};
use leadline_providers::{
    DeepgramStt, ElevenLabsTts, GeocodeRouteProvider, MatrixProvider, OpenRouterLlm,
    ServiceAreaResolver, TwilioCredentials, TwilioSms,
};
use leadline_server::{create_router, AppState};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Arc::new(load_settings(None)?);
    let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

    let stt: Option<Arc<dyn SpeechToText>> = settings.providers.stt_api_key.clone().map(|key| {
        Arc::new(DeepgramStt::new(
            client.clone(),
            key,
            settings.call.language.clone(),
            settings.call.utterance_end_ms,
            settings.call.endpointing_ms,
        )) as Arc<dyn SpeechToText>
    });

    let tts: Option<Arc<dyn TextToSpeech>> = settings.providers.tts_api_key.clone().map(|key| {
        Arc::new(ElevenLabsTts::new(
            client.clone(),
            key,
            settings.providers.tts_voice_id.clone(),
        )) as Arc<dyn TextToSpeech>
    });

    let llm: Option<Arc<dyn LanguageModel>> = match settings.providers.llm_api_key.clone() {
        Some(key) => Some(Arc::new(OpenRouterLlm::new(
            key,
            settings.providers.llm_base_url.clone(),
            settings.providers.llm_model.clone(),
        )?)),
        None => None,
    };

    let mut distance_chain: Vec<Arc<dyn DistanceProvider>> = Vec::new();
    if let Some(key) = settings.providers.maps_api_key.clone() {
        distance_chain.push(Arc::new(MatrixProvider::new(client.clone(), key)));
    }
    distance_chain.push(Arc::new(GeocodeRouteProvider::new(client.clone())));

    let sms_credentials = match (
        settings.providers.sms_account_sid.clone(),
        settings.providers.sms_auth_token.clone(),
        settings.providers.sms_from_number.clone(),
    ) {
        (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioCredentials {
            account_sid,
            auth_token,
            from_number,
        }),
        _ => None,
    };
    let sms: Arc<dyn SmsSender> = Arc::new(TwilioSms::new(client.clone(), sms_credentials));

    let cache: Arc<dyn SnapshotCache> = if settings.cache.enabled {
        Arc::new(MemoryCache::new())
    } else {
        Arc::new(NoopCache)
    };

    let manager = Arc::new(LeadManager::new(
        Arc::new(InMemoryLeadStore::new()),
        cache,
        Arc::new(Classifier::new(llm)),
        Arc::new(ServiceAreaResolver::new(distance_chain)),
        sms,
        settings.providers.link_base_url.clone(),
        Duration::from_secs(settings.cache.classification_ttl_secs),
    ));

    let state = AppState::new(settings.clone(), manager, stt, tts);
    let router = create_router(state);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "lead intake server listening");
    axum::serve(listener, router).await?;
    Ok(())
}
