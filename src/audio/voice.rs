use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{Call, Songbird};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::EngineError;

/// Enlace de voz por guild: conectar (o mover, es la misma operación) y
/// desconectar. El motor nunca toca songbird directamente.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), EngineError>;
    async fn disconnect(&self, guild_id: GuildId) -> Result<(), EngineError>;
}

pub struct SongbirdVoice {
    manager: Arc<Songbird>,
    calls: Arc<DashMap<GuildId, Arc<Mutex<Call>>>>,
}

impl SongbirdVoice {
    pub fn new(manager: Arc<Songbird>, calls: Arc<DashMap<GuildId, Arc<Mutex<Call>>>>) -> Self {
        Self { manager, calls }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdVoice {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), EngineError> {
        match self.manager.join(guild_id, channel_id).await {
            Ok(call) => {
                self.calls.insert(guild_id, call);
                info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
                Ok(())
            }
            Err(e) => Err(EngineError::ConnectError(e.to_string())),
        }
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), EngineError> {
        self.calls.remove(&guild_id);
        self.manager
            .remove(guild_id)
            .await
            .map_err(|e| EngineError::ConnectError(e.to_string()))?;

        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }
}
