use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, RoleId, UserId},
    },
    prelude::Context,
};
use tracing::info;

use crate::{
    audio::engine::{EnqueueOutcome, VoteOutcome},
    bot::RitmoBot,
    error::EngineError,
};

/// Enruta un comando slash a la operación del motor que corresponde. Cada
/// comando produce exactamente una respuesta: éxito o el error tipado.
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &RitmoBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, command, bot).await?,
        "playlist" => handle_playlist(ctx, command, bot).await?,
        "search" => handle_search(ctx, command, bot).await?,
        "pause" => handle_pause(ctx, command, bot).await?,
        "resume" => handle_resume(ctx, command, bot).await?,
        "skip" => handle_skip(ctx, command, bot).await?,
        "voteskip" => handle_voteskip(ctx, command, bot).await?,
        "stop" => handle_stop(ctx, command, bot).await?,
        "shuffle" => handle_shuffle(ctx, command, bot).await?,
        "remove" => handle_remove(ctx, command, bot).await?,
        "volume" => handle_volume(ctx, command, bot).await?,
        "nowplaying" => handle_nowplaying(ctx, command, bot).await?,
        "djrole" => handle_djrole(ctx, command, bot).await?,
        _ => {
            respond(ctx, &command, "❌ Comando no reconocido").await?;
        }
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(ctx: &Context, command: CommandInteraction, bot: &RitmoBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let query = required_str_option(&command, "query")?.to_string();

    // Defer: la resolución puede tardar
    defer(ctx, &command).await?;

    let track = match bot.resolver.resolve(&query, command.user.id).await {
        Ok(track) => track,
        Err(e) => return edit_response(ctx, &command, &format!("❌ {e}")).await,
    };

    let voice_channel = user_voice_channel(ctx, guild_id, command.user.id);
    let outcome = bot
        .engine
        .enqueue(guild_id, voice_channel, command.channel_id, vec![track])
        .await;

    let message = match outcome {
        Ok(EnqueueOutcome::Started { title, .. }) => {
            format!("🎵 Reproduciendo ahora: **{title}**")
        }
        Ok(EnqueueOutcome::Queued { title, .. }) => format!("➕ Agregado a la cola: **{title}**"),
        Err(e) => format!("❌ {e}"),
    };

    edit_response(ctx, &command, &message).await
}

async fn handle_playlist(ctx: &Context, command: CommandInteraction, bot: &RitmoBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let url = required_str_option(&command, "url")?.to_string();

    defer(ctx, &command).await?;

    let resolution = match bot.resolver.resolve_playlist(&url, command.user.id).await {
        Ok(resolution) => resolution,
        Err(e) => return edit_response(ctx, &command, &format!("❌ {e}")).await,
    };

    if resolution.tracks.is_empty() {
        let e = EngineError::InvalidPlaylist;
        return edit_response(ctx, &command, &format!("❌ {e}")).await;
    }

    let attempted = resolution.attempted;
    let voice_channel = user_voice_channel(ctx, guild_id, command.user.id);
    let outcome = bot
        .engine
        .enqueue(guild_id, voice_channel, command.channel_id, resolution.tracks)
        .await;

    let message = match outcome {
        Ok(EnqueueOutcome::Started { added, .. }) | Ok(EnqueueOutcome::Queued { added, .. }) => {
            format!("➕ Agregadas {added} de {attempted} canciones de la playlist a la cola.")
        }
        Err(e) => format!("❌ {e}"),
    };

    edit_response(ctx, &command, &message).await
}

async fn handle_search(ctx: &Context, command: CommandInteraction, bot: &RitmoBot) -> Result<()> {
    let query = required_str_option(&command, "query")?.to_string();

    defer(ctx, &command).await?;

    let message = match bot.resolver.search(&query, 5).await {
        Ok(titles) => {
            let listing = titles
                .iter()
                .enumerate()
                .map(|(i, title)| format!("{}. {}", i + 1, title))
                .collect::<Vec<_>>()
                .join("\n");
            format!("🔎 Resultados para **{query}**:\n{listing}")
        }
        Err(e) => format!("❌ {e}"),
    };

    edit_response(ctx, &command, &message).await
}

async fn handle_pause(ctx: &Context, command: CommandInteraction, bot: &RitmoBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let message = match bot.engine.pause(guild_id).await {
        Ok(()) => "⏸️ Reproducción pausada".to_string(),
        Err(e) => format!("❌ {e}"),
    };

    respond(ctx, &command, &message).await
}

async fn handle_resume(ctx: &Context, command: CommandInteraction, bot: &RitmoBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let message = match bot.engine.resume(guild_id).await {
        Ok(()) => "▶️ Reproducción reanudada".to_string(),
        Err(e) => format!("❌ {e}"),
    };

    respond(ctx, &command, &message).await
}

async fn handle_skip(ctx: &Context, command: CommandInteraction, bot: &RitmoBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let roles = requester_roles(&command);

    let message = match bot.engine.skip(guild_id, &roles).await {
        Ok(title) => format!("⏭️ Saltada: **{title}**"),
        Err(e) => format!("❌ {e}"),
    };

    respond(ctx, &command, &message).await
}

async fn handle_voteskip(ctx: &Context, command: CommandInteraction, bot: &RitmoBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let voter_channel = user_voice_channel(ctx, guild_id, command.user.id);
    let members = voter_channel
        .map(|channel| members_in_voice_channel(ctx, guild_id, channel))
        .unwrap_or(0);

    let message = match bot
        .engine
        .vote_skip(guild_id, command.user.id, voter_channel, members)
        .await
    {
        Ok(VoteOutcome::Skipped) => "⏭️ Votación exitosa, canción saltada.".to_string(),
        Ok(VoteOutcome::Tally { votes, required }) => {
            format!("🗳️ Voto registrado. {votes}/{required} votos para saltar.")
        }
        Err(e) => format!("❌ {e}"),
    };

    respond(ctx, &command, &message).await
}

async fn handle_stop(ctx: &Context, command: CommandInteraction, bot: &RitmoBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let message = match bot.engine.stop(guild_id).await {
        Ok(()) => "⏹️ Reproducción detenida y cola limpiada".to_string(),
        Err(e) => format!("❌ {e}"),
    };

    respond(ctx, &command, &message).await
}

async fn handle_shuffle(ctx: &Context, command: CommandInteraction, bot: &RitmoBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let message = match bot.engine.shuffle(guild_id).await {
        Ok(count) => format!("🔀 Cola mezclada ({count} canciones)"),
        Err(e) => format!("❌ {e}"),
    };

    respond(ctx, &command, &message).await
}

async fn handle_remove(ctx: &Context, command: CommandInteraction, bot: &RitmoBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let position = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "position")
        .and_then(|opt| opt.value.as_i64())
        .ok_or_else(|| anyhow::anyhow!("Posición no proporcionada"))?;

    let message = match bot.engine.remove(guild_id, position).await {
        Ok(title) => format!("🗑️ Quitada de la cola: **{title}**"),
        Err(e) => format!("❌ {e}"),
    };

    respond(ctx, &command, &message).await
}

async fn handle_volume(ctx: &Context, command: CommandInteraction, bot: &RitmoBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let roles = requester_roles(&command);

    let level = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "level")
        .and_then(|opt| opt.value.as_i64())
        .ok_or_else(|| anyhow::anyhow!("Nivel de volumen no proporcionado"))?;

    let message = match bot.engine.set_volume(guild_id, &roles, level).await {
        Ok(level) => format!("🔊 Volumen ajustado a {level}%"),
        Err(e) => format!("❌ {e}"),
    };

    respond(ctx, &command, &message).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: CommandInteraction,
    bot: &RitmoBot,
) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let message = match bot.engine.now_playing(guild_id).await {
        Some(title) => format!("🎵 Reproduciendo ahora: **{title}**"),
        None => format!("❌ {}", EngineError::NothingPlaying),
    };

    respond(ctx, &command, &message).await
}

async fn handle_djrole(ctx: &Context, command: CommandInteraction, bot: &RitmoBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    let can_manage = command
        .member
        .as_ref()
        .and_then(|member| member.permissions)
        .map(|permissions| permissions.manage_guild())
        .unwrap_or(false);

    if !can_manage {
        return respond(
            ctx,
            &command,
            "❌ Necesitas el permiso de Gestionar Servidor para configurar el rol de DJ.",
        )
        .await;
    }

    let role = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "role")
        .and_then(|opt| opt.value.as_role_id())
        .ok_or_else(|| anyhow::anyhow!("Rol no proporcionado"))?;

    bot.engine.set_dj_role(guild_id, role).await;

    respond(ctx, &command, &format!("🎚️ Rol de DJ configurado: <@&{role}>")).await
}

// Funciones auxiliares

fn required_str_option<'a>(command: &'a CommandInteraction, name: &str) -> Result<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Opción '{}' no proporcionada", name))
}

fn requester_roles(command: &CommandInteraction) -> Vec<RoleId> {
    command
        .member
        .as_ref()
        .map(|member| member.roles.clone())
        .unwrap_or_default()
}

/// Canal de voz del usuario según el caché de la guild, si está en uno.
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

/// Cantidad de miembros en un canal de voz, bot incluido.
fn members_in_voice_channel(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> usize {
    guild_id
        .to_guild_cached(&ctx.cache)
        .map(|guild| {
            guild
                .voice_states
                .values()
                .filter(|voice_state| voice_state.channel_id == Some(channel_id))
                .count()
        })
        .unwrap_or(0)
}

async fn respond(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(content),
            ),
        )
        .await?;

    Ok(())
}

async fn defer(ctx: &Context, command: &CommandInteraction) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    Ok(())
}

async fn edit_response(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;

    Ok(())
}
