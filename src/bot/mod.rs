//! Superficie Discord del bot: registro de comandos, enrutamiento de
//! interacciones y limpieza ante cambios de estado de voz. Toda la lógica de
//! colas vive en [`crate::audio::engine::QueueEngine`]; este módulo solo
//! traduce entre Discord y el motor.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{audio::engine::QueueEngine, config::Config, sources::TrackResolver};

/// Handler principal del bot: implementa [`EventHandler`] de serenity y
/// delega cada comando en una operación del motor.
pub struct RitmoBot {
    config: Arc<Config>,
    pub engine: Arc<QueueEngine>,
    pub resolver: Arc<dyn TrackResolver>,
}

impl RitmoBot {
    pub fn new(
        config: Config,
        engine: Arc<QueueEngine>,
        resolver: Arc<dyn TrackResolver>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            engine,
            resolver,
        }
    }

    /// Registra los comandos slash, globales o por guild según configuración.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::from(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for RitmoBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Detecta cuando el bot es desconectado del canal de voz por un tercero
    /// y reinicia el estado del guild para que el próximo uso arranque limpio.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id {
            return;
        }

        if old.is_some() && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                self.engine.handle_disconnected(guild_id).await;
            }
        }
    }
}
