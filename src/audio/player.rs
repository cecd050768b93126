use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::GuildId;
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::error::EngineError;

/// Notificación de fin de pista. El subsistema de voz la envía por canal y
/// el motor la procesa dentro de la exclusión del guild; el callback del
/// reproductor nunca toca el estado directamente.
#[derive(Debug)]
pub struct TrackEndEvent {
    pub guild_id: GuildId,
    /// Número de serie del arranque que originó la notificación; el motor
    /// descarta las que no corresponden a la pista vigente.
    pub generation: u64,
    pub error: Option<String>,
}

/// Superficie de reproducción por guild. El motor solo habla con este trait;
/// la implementación real usa songbird y las pruebas usan un doble en memoria.
#[async_trait]
pub trait PlaybackTarget: Send + Sync {
    /// Inicia la reproducción del localizador con el volumen dado. Dispara
    /// exactamente una notificación de fin por cada inicio exitoso, marcada
    /// con el número de serie recibido.
    async fn start(
        &self,
        guild_id: GuildId,
        locator: &str,
        volume: f32,
        generation: u64,
    ) -> Result<(), EngineError>;

    async fn pause(&self, guild_id: GuildId);
    async fn resume(&self, guild_id: GuildId);
    async fn stop(&self, guild_id: GuildId);
    async fn set_volume(&self, guild_id: GuildId, volume: f32);
    async fn is_playing(&self, guild_id: GuildId) -> bool;
    async fn is_paused(&self, guild_id: GuildId) -> bool;
}

/// Implementación songbird: reproduce URLs de audio directo como streams
/// HTTP sobre el `Call` del guild.
pub struct SongbirdPlayer {
    calls: Arc<DashMap<GuildId, Arc<Mutex<Call>>>>,
    current_tracks: DashMap<GuildId, TrackHandle>,
    http: reqwest::Client,
    events: mpsc::UnboundedSender<TrackEndEvent>,
}

impl SongbirdPlayer {
    pub fn new(
        calls: Arc<DashMap<GuildId, Arc<Mutex<Call>>>>,
        events: mpsc::UnboundedSender<TrackEndEvent>,
    ) -> Self {
        Self {
            calls,
            current_tracks: DashMap::new(),
            http: reqwest::Client::new(),
            events,
        }
    }
}

#[async_trait]
impl PlaybackTarget for SongbirdPlayer {
    async fn start(
        &self,
        guild_id: GuildId,
        locator: &str,
        volume: f32,
        generation: u64,
    ) -> Result<(), EngineError> {
        let call = self
            .calls
            .get(&guild_id)
            .map(|c| c.value().clone())
            .ok_or(EngineError::NotConnected)?;

        let input = Input::from(HttpRequest::new(self.http.clone(), locator.to_string()));

        let track_handle = {
            let mut handler = call.lock().await;
            handler.play_input(input)
        };

        let _ = track_handle.set_volume(volume);

        // Fin y error comparten la bandera: una sola notificación por inicio
        let notifier = TrackEndNotifier {
            guild_id,
            generation,
            events: self.events.clone(),
            fired: Arc::new(AtomicBool::new(false)),
        };

        track_handle
            .add_event(Event::Track(TrackEvent::End), notifier.clone())
            .map_err(|e| EngineError::PlaybackError(e.to_string()))?;
        track_handle
            .add_event(Event::Track(TrackEvent::Error), notifier)
            .map_err(|e| EngineError::PlaybackError(e.to_string()))?;

        self.current_tracks.insert(guild_id, track_handle);
        info!("🎧 Pista iniciada en guild {}", guild_id);
        Ok(())
    }

    async fn pause(&self, guild_id: GuildId) {
        if let Some(track) = self.current_tracks.get(&guild_id) {
            let _ = track.pause();
        }
    }

    async fn resume(&self, guild_id: GuildId) {
        if let Some(track) = self.current_tracks.get(&guild_id) {
            let _ = track.play();
        }
    }

    async fn stop(&self, guild_id: GuildId) {
        if let Some((_, track)) = self.current_tracks.remove(&guild_id) {
            let _ = track.stop();
        }
    }

    async fn set_volume(&self, guild_id: GuildId, volume: f32) {
        if let Some(track) = self.current_tracks.get(&guild_id) {
            let _ = track.set_volume(volume);
        }
    }

    async fn is_playing(&self, guild_id: GuildId) -> bool {
        if let Some(track) = self.current_tracks.get(&guild_id) {
            if let Ok(info) = track.get_info().await {
                return matches!(info.playing, PlayMode::Play);
            }
        }
        false
    }

    async fn is_paused(&self, guild_id: GuildId) -> bool {
        if let Some(track) = self.current_tracks.get(&guild_id) {
            if let Ok(info) = track.get_info().await {
                return matches!(info.playing, PlayMode::Pause);
            }
        }
        false
    }
}

/// Handler de songbird para el fin de una pista: publica el evento en el
/// canal del motor en lugar de avanzar la cola desde el hilo del driver.
struct TrackEndNotifier {
    guild_id: GuildId,
    generation: u64,
    events: mpsc::UnboundedSender<TrackEndEvent>,
    fired: Arc<AtomicBool>,
}

impl Clone for TrackEndNotifier {
    fn clone(&self) -> Self {
        Self {
            guild_id: self.guild_id,
            generation: self.generation,
            events: self.events.clone(),
            fired: self.fired.clone(),
        }
    }
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = match ctx {
            EventContext::Track(list) => list.iter().find_map(|(state, _)| {
                if let PlayMode::Errored(e) = &state.playing {
                    Some(e.to_string())
                } else {
                    None
                }
            }),
            _ => None,
        };

        if self.fired.swap(true, Ordering::SeqCst) {
            return None;
        }

        debug!("Pista terminada en guild {}", self.guild_id);
        let _ = self.events.send(TrackEndEvent {
            guild_id: self.guild_id,
            generation: self.generation,
            error,
        });

        None
    }
}
