use anyhow::Result;
use dashmap::DashMap;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod sources;

use crate::audio::{engine::QueueEngine, player::SongbirdPlayer, voice::SongbirdVoice};
use crate::bot::RitmoBot;
use crate::config::Config;
use crate::sources::YtDlpResolver;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ritmo_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Ritmo Bot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Infraestructura de voz: el manager de songbird y el mapa de llamadas
    // compartido entre el reproductor y el enlace de voz
    let manager = Songbird::serenity();
    let calls = Arc::new(DashMap::new());
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let player = Arc::new(SongbirdPlayer::new(calls.clone(), events_tx));
    let voice = Arc::new(SongbirdVoice::new(manager.clone(), calls));

    // El motor de colas: una instancia por proceso, estado por guild
    let engine = Arc::new(QueueEngine::new(
        player,
        voice,
        config.max_queue_size,
        config.default_volume,
    ));

    let resolver = Arc::new(YtDlpResolver::new(
        config.resolve_timeout_secs,
        config.max_playlist_size,
    ));

    if let Err(e) = resolver.verify_dependencies().await {
        warn!("⚠️ yt-dlp no disponible al arrancar: {}", e);
    }

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = RitmoBot::new(config.clone(), engine.clone(), resolver);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(manager)
        .await?;

    // Bombeo de notificaciones de fin de pista: cada evento se entrega al
    // motor dentro de la exclusión del guild, nunca desde el hilo del driver
    let pump_engine = engine.clone();
    let pump_http = client.http.clone();
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let messages = pump_engine
                .handle_track_end(event.guild_id, event.generation, event.error)
                .await;

            for (channel, message) in messages {
                if let Err(e) = channel.say(&pump_http, message).await {
                    warn!("⚠️ No se pudo publicar en el canal de texto: {:?}", e);
                }
            }
        }
    });

    // Manejar shutdown graceful
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Error al registrar Ctrl+C");
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        std::process::exit(0);
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
