use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId, RoleId, UserId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    audio::{
        player::PlaybackTarget,
        queue::{GuildQueueState, Track},
        voice::VoiceGateway,
    },
    error::EngineError,
};

/// Resultado de encolar pistas: distingue "reproduciendo ahora" de
/// "agregado a la cola" según el estado capturado ANTES de encolar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Started { title: String, added: usize },
    Queued { title: String, added: usize },
}

/// Resultado de un voto para saltar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    Skipped,
    Tally { votes: usize, required: usize },
}

/// El motor de colas: un registro explícito de estado por guild, sin
/// globales. Cada operación que lee-y-escribe el estado de un guild toma el
/// mutex de ese guild durante toda la transición, incluidas las esperas de
/// I/O; guilds distintos avanzan en paralelo.
pub struct QueueEngine {
    guilds: DashMap<GuildId, Arc<Mutex<GuildQueueState>>>,
    player: Arc<dyn PlaybackTarget>,
    voice: Arc<dyn VoiceGateway>,
    max_queue_size: usize,
    default_volume: f32,
}

impl QueueEngine {
    pub fn new(
        player: Arc<dyn PlaybackTarget>,
        voice: Arc<dyn VoiceGateway>,
        max_queue_size: usize,
        default_volume: f32,
    ) -> Self {
        Self {
            guilds: DashMap::new(),
            player,
            voice,
            max_queue_size,
            default_volume,
        }
    }

    fn state_for(&self, guild_id: GuildId) -> Arc<Mutex<GuildQueueState>> {
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(GuildQueueState::new(
                    self.max_queue_size,
                    self.default_volume,
                )))
            })
            .clone()
    }

    /// Encola pistas ya resueltas. Conecta o mueve el enlace de voz al canal
    /// del solicitante y, si el guild estaba inactivo, arranca la
    /// reproducción de inmediato.
    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        user_channel: Option<ChannelId>,
        text_channel: ChannelId,
        tracks: Vec<Track>,
    ) -> Result<EnqueueOutcome, EngineError> {
        let channel = user_channel.ok_or(EngineError::NotInVoiceChannel)?;
        if tracks.is_empty() {
            return Err(EngineError::NoResults);
        }

        let state = self.state_for(guild_id);
        let mut st = state.lock().await;

        match st.voice_channel {
            Some(bound) if bound == channel => {}
            _ => {
                // connect también mueve si ya estábamos en otro canal
                self.voice.connect(guild_id, channel).await?;
                st.voice_channel = Some(channel);
            }
        }
        st.text_channel = Some(text_channel);

        // Instantánea previa al encolado: decide el mensaje al usuario
        let was_active =
            self.player.is_playing(guild_id).await || self.player.is_paused(guild_id).await;

        let first_title = tracks[0].title.clone();
        let mut added = 0;
        for track in tracks {
            match st.push_track(track) {
                Ok(()) => added += 1,
                Err(e) => {
                    if added == 0 {
                        return Err(e);
                    }
                    warn!("⚠️ Cola llena en guild {}, se agregaron {} pistas", guild_id, added);
                    break;
                }
            }
        }

        if was_active {
            Ok(EnqueueOutcome::Queued {
                title: first_title,
                added,
            })
        } else {
            self.advance(guild_id, &mut st).await;
            match st.current.as_ref() {
                Some(track) => Ok(EnqueueOutcome::Started {
                    title: track.title.clone(),
                    added,
                }),
                // Todas las pistas encoladas fallaron al arrancar
                None => Err(EngineError::PlaybackError(
                    "ninguna pista pudo iniciarse".to_string(),
                )),
            }
        }
    }

    /// El paso de secuenciación central: saca la siguiente pista y la
    /// arranca, o deja el guild inactivo y libera la voz cuando la cola se
    /// agota. Siempre corre con el estado del guild ya bloqueado. Un error
    /// al arrancar cuenta como "pista terminada" y se sigue con la próxima.
    async fn advance(&self, guild_id: GuildId, st: &mut GuildQueueState) {
        loop {
            let next = st
                .pop_into_current()
                .map(|t| (t.locator.clone(), t.title.clone()));

            match next {
                Some((locator, title)) => {
                    st.generation = st.generation.wrapping_add(1);
                    let generation = st.generation;
                    match self
                        .player
                        .start(guild_id, &locator, st.volume, generation)
                        .await
                    {
                        Ok(()) => {
                            info!("🎵 Reproduciendo: {}", title);
                            break;
                        }
                        Err(e) => {
                            error!("❌ No se pudo iniciar {}: {}", title, e);
                            st.current = None;
                            continue;
                        }
                    }
                }
                None => {
                    st.current = None;
                    st.vote.reset();
                    if st.voice_channel.take().is_some() {
                        if let Err(e) = self.voice.disconnect(guild_id).await {
                            warn!("⚠️ Error al desconectar en guild {}: {}", guild_id, e);
                        }
                        info!("📭 Cola vacía, desconectado en guild {}", guild_id);
                    }
                    break;
                }
            }
        }
    }

    /// Procesa una notificación de fin de pista (natural, por stop/skip o
    /// por error del reproductor) y avanza la cola. La notificación lleva el
    /// número de serie del arranque que la originó: si no coincide con el
    /// vigente, la pista ya fue reemplazada y el evento se descarta. Los
    /// eventos tardíos sobre un guild ya vaciado son un no-op. Devuelve los
    /// mensajes a publicar en el canal de texto: el diagnóstico si la pista
    /// terminó con error y el anuncio de la siguiente pista si la hay.
    pub async fn handle_track_end(
        &self,
        guild_id: GuildId,
        generation: u64,
        error: Option<String>,
    ) -> Vec<(ChannelId, String)> {
        let state = self.state_for(guild_id);
        let mut st = state.lock().await;

        if generation != st.generation {
            info!(
                "🕰️ Notificación obsoleta descartada en guild {} ({} != {})",
                guild_id, generation, st.generation
            );
            return Vec::new();
        }
        if st.current.is_none() && st.is_empty() && st.voice_channel.is_none() {
            return Vec::new();
        }

        let mut messages = Vec::new();
        if let Some(e) = error {
            let title = st
                .current
                .as_ref()
                .map(|t| t.title.as_str())
                .unwrap_or("pista desconocida");
            error!("❌ Error de reproducción en guild {}: {} ({})", guild_id, e, title);
            if let Some(ch) = st.text_channel {
                messages.push((ch, format!("⚠️ Error reproduciendo **{}**: {}", title, e)));
            }
        }

        st.current = None;
        self.advance(guild_id, &mut st).await;

        if let (Some(track), Some(ch)) = (st.current.as_ref(), st.text_channel) {
            messages.push((ch, format!("🎵 Reproduciendo ahora: **{}**", track.title)));
        }

        messages
    }

    /// Salta la pista actual. Requiere el rol de DJ (sin rol configurado se
    /// deniega). El avance real lo dispara la notificación de fin que
    /// produce el stop.
    pub async fn skip(
        &self,
        guild_id: GuildId,
        requester_roles: &[RoleId],
    ) -> Result<String, EngineError> {
        let state = self.state_for(guild_id);
        let st = state.lock().await;

        check_dj(&st, requester_roles)?;

        let active =
            self.player.is_playing(guild_id).await || self.player.is_paused(guild_id).await;
        if !active {
            return Err(EngineError::NothingPlaying);
        }

        let title = st
            .current
            .as_ref()
            .map(|t| t.title.clone())
            .unwrap_or_else(|| "desconocida".to_string());

        self.player.stop(guild_id).await;
        info!("⏭️ Pista saltada en guild {}: {}", guild_id, title);
        Ok(title)
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<(), EngineError> {
        let state = self.state_for(guild_id);
        let st = state.lock().await;

        if st.voice_channel.is_none() {
            return Err(EngineError::NotConnected);
        }
        if !self.player.is_playing(guild_id).await {
            return Err(EngineError::NothingPlaying);
        }

        self.player.pause(guild_id).await;
        info!("⏸️ Reproducción pausada en guild {}", guild_id);
        Ok(())
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<(), EngineError> {
        let state = self.state_for(guild_id);
        let st = state.lock().await;

        if st.voice_channel.is_none() {
            return Err(EngineError::NotConnected);
        }
        if !self.player.is_paused(guild_id).await {
            return Err(EngineError::NotPaused);
        }

        self.player.resume(guild_id).await;
        info!("▶️ Reproducción reanudada en guild {}", guild_id);
        Ok(())
    }

    /// Detiene todo: pista actual, cola, votación y enlace de voz. El
    /// volumen y el rol de DJ del guild se conservan.
    pub async fn stop(&self, guild_id: GuildId) -> Result<(), EngineError> {
        let state = self.state_for(guild_id);
        let mut st = state.lock().await;

        if st.voice_channel.is_none() {
            return Err(EngineError::NotConnected);
        }

        st.reset_playback();
        self.player.stop(guild_id).await;
        if let Err(e) = self.voice.disconnect(guild_id).await {
            warn!("⚠️ Error al desconectar en guild {}: {}", guild_id, e);
        }

        info!("⏹️ Reproducción detenida y cola limpiada en guild {}", guild_id);
        Ok(())
    }

    /// Fija el volumen (0-100) sobre la pista en vivo y sobre el estado
    /// almacenado para las pistas futuras. Requiere el rol de DJ.
    pub async fn set_volume(
        &self,
        guild_id: GuildId,
        requester_roles: &[RoleId],
        level: i64,
    ) -> Result<u8, EngineError> {
        let state = self.state_for(guild_id);
        let mut st = state.lock().await;

        check_dj(&st, requester_roles)?;

        if !(0..=100).contains(&level) {
            return Err(EngineError::OutOfRange);
        }

        let ratio = level as f32 / 100.0;
        st.volume = ratio;
        self.player.set_volume(guild_id, ratio).await;

        info!("🔊 Volumen de guild {} fijado en {}%", guild_id, level);
        Ok(level as u8)
    }

    pub async fn now_playing(&self, guild_id: GuildId) -> Option<String> {
        let state = self.state_for(guild_id);
        let st = state.lock().await;
        st.current.as_ref().map(|t| t.title.clone())
    }

    /// Mezcla al azar las pistas pendientes. La pista actual sigue sonando.
    pub async fn shuffle(&self, guild_id: GuildId) -> Result<usize, EngineError> {
        let state = self.state_for(guild_id);
        let mut st = state.lock().await;

        if st.is_empty() {
            return Err(EngineError::EmptyQueue);
        }

        st.shuffle();
        info!("🔀 Cola mezclada en guild {} ({} pistas)", guild_id, st.len());
        Ok(st.len())
    }

    /// Quita de la cola la pista en la posición dada (1 = la siguiente en
    /// sonar) y devuelve su título.
    pub async fn remove(&self, guild_id: GuildId, position: i64) -> Result<String, EngineError> {
        let state = self.state_for(guild_id);
        let mut st = state.lock().await;

        if position < 1 {
            return Err(EngineError::NoSuchPosition);
        }

        let track = st
            .remove_at(position as usize - 1)
            .ok_or(EngineError::NoSuchPosition)?;

        info!("🗑️ Pista quitada de la cola de guild {}: {}", guild_id, track.title);
        Ok(track.title)
    }

    /// Registra un voto para saltar la pista actual. `members_in_channel`
    /// es el total de miembros del canal de la votación, bot incluido; la
    /// mayoría requerida excluye al bot del denominador.
    pub async fn vote_skip(
        &self,
        guild_id: GuildId,
        voter: UserId,
        voter_channel: Option<ChannelId>,
        members_in_channel: usize,
    ) -> Result<VoteOutcome, EngineError> {
        let state = self.state_for(guild_id);
        let mut st = state.lock().await;

        if st.current.is_none() {
            return Err(EngineError::NothingPlaying);
        }
        let channel = voter_channel.ok_or(EngineError::NotInVoiceChannel)?;
        if let Some(bound) = st.voice_channel {
            if bound != channel {
                return Err(EngineError::WrongChannel);
            }
        }

        let votes = st.vote.cast(channel, voter)?;
        let required = members_in_channel.saturating_sub(1) / 2 + 1;

        if votes >= required {
            info!("🗳️ Votación exitosa en guild {} ({}/{})", guild_id, votes, required);
            st.vote.reset();
            self.player.stop(guild_id).await;
            Ok(VoteOutcome::Skipped)
        } else {
            Ok(VoteOutcome::Tally { votes, required })
        }
    }

    /// Configura el rol de DJ del guild. El chequeo de permisos del
    /// solicitante es responsabilidad del despachador.
    pub async fn set_dj_role(&self, guild_id: GuildId, role: RoleId) {
        let state = self.state_for(guild_id);
        let mut st = state.lock().await;
        st.dj_role = Some(role);
        info!("🎚️ Rol de DJ de guild {} configurado: {}", guild_id, role);
    }

    /// El bot fue desconectado a la fuerza (kick, cierre del canal): se
    /// vacía el estado para que el próximo encolado arranque limpio.
    pub async fn handle_disconnected(&self, guild_id: GuildId) {
        let state = self.state_for(guild_id);
        let mut st = state.lock().await;

        self.player.stop(guild_id).await;
        st.reset_playback();
        info!("🔌 Estado de guild {} reiniciado tras desconexión", guild_id);
    }
}

/// Política de DJ: cerrada por defecto. Sin rol configurado, toda acción
/// reservada a DJs se deniega.
fn check_dj(st: &GuildQueueState, requester_roles: &[RoleId]) -> Result<(), EngineError> {
    match st.dj_role {
        Some(role) if requester_roles.contains(&role) => Ok(()),
        _ => Err(EngineError::NotAuthorized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum FakeMode {
        Playing,
        Paused,
    }

    #[derive(Default)]
    struct FakeInner {
        started: Vec<String>,
        start_volumes: Vec<f32>,
        mode: HashMap<GuildId, FakeMode>,
        live_volume: HashMap<GuildId, f32>,
        generations: HashMap<GuildId, u64>,
        failing: HashSet<String>,
        stops: usize,
    }

    /// Doble de reproducción: registra cada inicio y simula el estado
    /// playing/paused. Las notificaciones de fin las dispara cada prueba
    /// llamando a `handle_track_end`, igual que haría el bombeo de eventos.
    #[derive(Default)]
    struct FakePlayer {
        inner: StdMutex<FakeInner>,
    }

    impl FakePlayer {
        fn fail_on(&self, locator: &str) {
            self.inner.lock().unwrap().failing.insert(locator.to_string());
        }

        fn started(&self) -> Vec<String> {
            self.inner.lock().unwrap().started.clone()
        }

        fn stops(&self) -> usize {
            self.inner.lock().unwrap().stops
        }

        fn last_start_volume(&self) -> Option<f32> {
            self.inner.lock().unwrap().start_volumes.last().copied()
        }

        fn live_volume(&self, guild_id: GuildId) -> Option<f32> {
            self.inner.lock().unwrap().live_volume.get(&guild_id).copied()
        }

        /// Número de serie del último arranque exitoso, como lo llevaría la
        /// notificación de fin de esa pista.
        fn generation(&self, guild_id: GuildId) -> u64 {
            self.inner
                .lock()
                .unwrap()
                .generations
                .get(&guild_id)
                .copied()
                .unwrap_or(0)
        }
    }

    #[async_trait]
    impl PlaybackTarget for FakePlayer {
        async fn start(
            &self,
            guild_id: GuildId,
            locator: &str,
            volume: f32,
            generation: u64,
        ) -> Result<(), EngineError> {
            let mut inner = self.inner.lock().unwrap();
            if inner.failing.contains(locator) {
                return Err(EngineError::PlaybackError("stream rechazado".to_string()));
            }
            inner.started.push(locator.to_string());
            inner.start_volumes.push(volume);
            inner.mode.insert(guild_id, FakeMode::Playing);
            inner.live_volume.insert(guild_id, volume);
            inner.generations.insert(guild_id, generation);
            Ok(())
        }

        async fn pause(&self, guild_id: GuildId) {
            self.inner.lock().unwrap().mode.insert(guild_id, FakeMode::Paused);
        }

        async fn resume(&self, guild_id: GuildId) {
            self.inner.lock().unwrap().mode.insert(guild_id, FakeMode::Playing);
        }

        async fn stop(&self, guild_id: GuildId) {
            let mut inner = self.inner.lock().unwrap();
            inner.mode.remove(&guild_id);
            inner.stops += 1;
        }

        async fn set_volume(&self, guild_id: GuildId, volume: f32) {
            self.inner.lock().unwrap().live_volume.insert(guild_id, volume);
        }

        async fn is_playing(&self, guild_id: GuildId) -> bool {
            self.inner.lock().unwrap().mode.get(&guild_id) == Some(&FakeMode::Playing)
        }

        async fn is_paused(&self, guild_id: GuildId) -> bool {
            self.inner.lock().unwrap().mode.get(&guild_id) == Some(&FakeMode::Paused)
        }
    }

    #[derive(Default)]
    struct FakeVoice {
        connected: StdMutex<HashMap<GuildId, ChannelId>>,
        connects: AtomicUsize,
        disconnects: AtomicUsize,
    }

    #[async_trait]
    impl VoiceGateway for FakeVoice {
        async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), EngineError> {
            self.connected.lock().unwrap().insert(guild_id, channel_id);
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn disconnect(&self, guild_id: GuildId) -> Result<(), EngineError> {
            self.connected.lock().unwrap().remove(&guild_id);
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    const GUILD: GuildId = GuildId::new(100);
    const VOICE: ChannelId = ChannelId::new(200);
    const TEXT: ChannelId = ChannelId::new(300);
    const DJ: RoleId = RoleId::new(400);

    fn engine() -> (Arc<QueueEngine>, Arc<FakePlayer>, Arc<FakeVoice>) {
        let player = Arc::new(FakePlayer::default());
        let voice = Arc::new(FakeVoice::default());
        let engine = Arc::new(QueueEngine::new(player.clone(), voice.clone(), 500, 1.0));
        (engine, player, voice)
    }

    fn track(title: &str) -> Track {
        Track::new(format!("loc:{title}"), title.to_string(), UserId::new(1))
    }

    async fn enqueue_one(engine: &QueueEngine, title: &str) -> EnqueueOutcome {
        engine
            .enqueue(GUILD, Some(VOICE), TEXT, vec![track(title)])
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn first_enqueue_starts_rest_stay_queued() {
        let (engine, player, _) = engine();

        let outcome = engine
            .enqueue(GUILD, Some(VOICE), TEXT, vec![track("a"), track("b"), track("c")])
            .await
            .unwrap();

        assert_eq!(
            outcome,
            EnqueueOutcome::Started {
                title: "a".to_string(),
                added: 3
            }
        );
        assert_eq!(player.started(), vec!["loc:a"]);
        assert_eq!(engine.now_playing(GUILD).await, Some("a".to_string()));

        let state = engine.state_for(GUILD);
        let st = state.lock().await;
        assert_eq!(st.titles(), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn enqueue_on_busy_guild_reports_queued() {
        let (engine, _, _) = engine();

        enqueue_one(&engine, "a").await;
        let outcome = enqueue_one(&engine, "b").await;

        assert_eq!(
            outcome,
            EnqueueOutcome::Queued {
                title: "b".to_string(),
                added: 1
            }
        );
        // "a" sigue siendo la actual
        assert_eq!(engine.now_playing(GUILD).await, Some("a".to_string()));
    }

    #[tokio::test]
    async fn enqueue_without_voice_channel_fails() {
        let (engine, player, _) = engine();

        let result = engine.enqueue(GUILD, None, TEXT, vec![track("a")]).await;

        assert_eq!(result, Err(EngineError::NotInVoiceChannel));
        assert!(player.started().is_empty());
    }

    #[tokio::test]
    async fn completions_chain_until_queue_is_drained() {
        let (engine, player, voice) = engine();

        engine
            .enqueue(GUILD, Some(VOICE), TEXT, vec![track("a"), track("b"), track("c")])
            .await
            .unwrap();

        engine.handle_track_end(GUILD, player.generation(GUILD), None).await;
        assert_eq!(engine.now_playing(GUILD).await, Some("b".to_string()));

        engine.handle_track_end(GUILD, player.generation(GUILD), None).await;
        engine.handle_track_end(GUILD, player.generation(GUILD), None).await;

        assert_eq!(player.started(), vec!["loc:a", "loc:b", "loc:c"]);
        assert_eq!(engine.now_playing(GUILD).await, None);
        assert_eq!(voice.disconnects.load(Ordering::SeqCst), 1);

        let state = engine.state_for(GUILD);
        assert!(state.lock().await.is_empty());
    }

    #[tokio::test]
    async fn late_completion_on_idle_guild_is_a_noop() {
        let (engine, _, voice) = engine();

        engine.handle_track_end(GUILD, 0, None).await;
        engine.handle_track_end(GUILD, 0, None).await;

        assert_eq!(voice.disconnects.load(Ordering::SeqCst), 0);
        assert_eq!(engine.now_playing(GUILD).await, None);
    }

    #[tokio::test]
    async fn start_failure_falls_through_to_next_track() {
        let (engine, player, _) = engine();
        player.fail_on("loc:bad");

        let outcome = engine
            .enqueue(GUILD, Some(VOICE), TEXT, vec![track("bad"), track("good")])
            .await
            .unwrap();

        assert_eq!(
            outcome,
            EnqueueOutcome::Started {
                title: "good".to_string(),
                added: 2
            }
        );
        assert_eq!(player.started(), vec!["loc:good"]);
    }

    #[tokio::test]
    async fn playback_error_produces_diagnostic_and_advances() {
        let (engine, player, _) = engine();

        engine
            .enqueue(GUILD, Some(VOICE), TEXT, vec![track("a"), track("b")])
            .await
            .unwrap();

        let messages = engine
            .handle_track_end(
                GUILD,
                player.generation(GUILD),
                Some("códec no soportado".to_string()),
            )
            .await;

        // Primero el diagnóstico, después el anuncio de la siguiente pista
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].0, TEXT);
        assert!(messages[0].1.contains("a"));
        assert!(messages[0].1.contains("códec no soportado"));
        assert!(messages[1].1.contains("b"));
        assert_eq!(engine.now_playing(GUILD).await, Some("b".to_string()));
    }

    #[tokio::test]
    async fn skip_requires_configured_dj_role() {
        let (engine, _, _) = engine();
        enqueue_one(&engine, "a").await;

        // Sin rol configurado la política es cerrada
        let result = engine.skip(GUILD, &[DJ]).await;
        assert_eq!(result, Err(EngineError::NotAuthorized));

        engine.set_dj_role(GUILD, DJ).await;
        let result = engine.skip(GUILD, &[RoleId::new(999)]).await;
        assert_eq!(result, Err(EngineError::NotAuthorized));
    }

    #[tokio::test]
    async fn skip_stops_current_and_completion_advances() {
        let (engine, player, _) = engine();
        engine.set_dj_role(GUILD, DJ).await;

        engine
            .enqueue(GUILD, Some(VOICE), TEXT, vec![track("a"), track("b")])
            .await
            .unwrap();

        let skipped = engine.skip(GUILD, &[DJ]).await.unwrap();
        assert_eq!(skipped, "a");
        assert_eq!(player.stops(), 1);

        // El stop induce la notificación de fin; el bombeo la entrega
        engine.handle_track_end(GUILD, player.generation(GUILD), None).await;
        assert_eq!(engine.now_playing(GUILD).await, Some("b".to_string()));
    }

    #[tokio::test]
    async fn skip_with_nothing_playing_fails() {
        let (engine, _, _) = engine();
        engine.set_dj_role(GUILD, DJ).await;

        let result = engine.skip(GUILD, &[DJ]).await;
        assert_eq!(result, Err(EngineError::NothingPlaying));
    }

    #[tokio::test]
    async fn pause_resume_preconditions() {
        let (engine, _, _) = engine();

        assert_eq!(engine.pause(GUILD).await, Err(EngineError::NotConnected));
        assert_eq!(engine.resume(GUILD).await, Err(EngineError::NotConnected));

        enqueue_one(&engine, "a").await;

        assert_eq!(engine.resume(GUILD).await, Err(EngineError::NotPaused));
        engine.pause(GUILD).await.unwrap();
        assert_eq!(engine.pause(GUILD).await, Err(EngineError::NothingPlaying));
        engine.resume(GUILD).await.unwrap();
        engine.pause(GUILD).await.unwrap();
    }

    #[tokio::test]
    async fn stop_clears_state_but_volume_persists() {
        let (engine, player, voice) = engine();
        engine.set_dj_role(GUILD, DJ).await;

        engine
            .enqueue(GUILD, Some(VOICE), TEXT, vec![track("a"), track("b")])
            .await
            .unwrap();
        engine.set_volume(GUILD, &[DJ], 50).await.unwrap();

        engine.stop(GUILD).await.unwrap();
        assert_eq!(voice.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(engine.now_playing(GUILD).await, None);

        // La notificación inducida por el stop no debe desconectar de nuevo
        engine.handle_track_end(GUILD, player.generation(GUILD), None).await;
        assert_eq!(voice.disconnects.load(Ordering::SeqCst), 1);

        // Encolar de nuevo funciona desde cero y conserva el volumen
        let outcome = enqueue_one(&engine, "c").await;
        assert_eq!(
            outcome,
            EnqueueOutcome::Started {
                title: "c".to_string(),
                added: 1
            }
        );
        assert_eq!(player.last_start_volume(), Some(0.5));
    }

    #[tokio::test]
    async fn stale_end_after_stop_leaves_new_track_playing() {
        let (engine, player, voice) = engine();

        enqueue_one(&engine, "a").await;
        let stale_generation = player.generation(GUILD);

        // El stop encola una notificación que el bombeo todavía no entregó
        engine.stop(GUILD).await.unwrap();
        assert_eq!(voice.disconnects.load(Ordering::SeqCst), 1);

        // Antes de que llegue, un usuario vuelve a encolar
        enqueue_one(&engine, "c").await;

        // La notificación vieja llega tarde: no debe tocar la pista nueva
        let messages = engine.handle_track_end(GUILD, stale_generation, None).await;
        assert!(messages.is_empty());
        assert_eq!(engine.now_playing(GUILD).await, Some("c".to_string()));
        assert!(player.inner.lock().unwrap().mode.get(&GUILD) == Some(&FakeMode::Playing));
        assert_eq!(voice.disconnects.load(Ordering::SeqCst), 1);

        // La notificación legítima de "c" sí avanza
        engine.handle_track_end(GUILD, player.generation(GUILD), None).await;
        assert_eq!(engine.now_playing(GUILD).await, None);
        assert_eq!(voice.disconnects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn enqueue_reports_failure_when_no_track_starts() {
        let (engine, player, voice) = engine();
        player.fail_on("loc:bad1");
        player.fail_on("loc:bad2");

        let result = engine
            .enqueue(GUILD, Some(VOICE), TEXT, vec![track("bad1"), track("bad2")])
            .await;

        assert!(matches!(result, Err(EngineError::PlaybackError(_))));
        assert_eq!(engine.now_playing(GUILD).await, None);
        assert!(player.started().is_empty());
        // El enlace de voz no queda colgado tras el fracaso
        assert_eq!(voice.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn organic_advance_announces_next_track() {
        let (engine, player, _) = engine();

        engine
            .enqueue(GUILD, Some(VOICE), TEXT, vec![track("a"), track("b")])
            .await
            .unwrap();

        let messages = engine.handle_track_end(GUILD, player.generation(GUILD), None).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, TEXT);
        assert!(messages[0].1.contains("b"));

        // Con la cola agotada no hay nada que anunciar
        let messages = engine.handle_track_end(GUILD, player.generation(GUILD), None).await;
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn shuffle_requires_pending_tracks() {
        let (engine, _, _) = engine();

        assert_eq!(engine.shuffle(GUILD).await, Err(EngineError::EmptyQueue));

        // Solo la pista actual: la cola pendiente sigue vacía
        enqueue_one(&engine, "a").await;
        assert_eq!(engine.shuffle(GUILD).await, Err(EngineError::EmptyQueue));

        enqueue_one(&engine, "b").await;
        enqueue_one(&engine, "c").await;
        assert_eq!(engine.shuffle(GUILD).await.unwrap(), 2);

        // La actual no cambia por mezclar
        assert_eq!(engine.now_playing(GUILD).await, Some("a".to_string()));
    }

    #[tokio::test]
    async fn remove_takes_the_track_at_the_position() {
        let (engine, _, _) = engine();

        engine
            .enqueue(GUILD, Some(VOICE), TEXT, vec![track("a"), track("b"), track("c")])
            .await
            .unwrap();

        // Posición 1 es la siguiente en sonar ("b"); "a" es la actual
        let removed = engine.remove(GUILD, 2).await.unwrap();
        assert_eq!(removed, "c");

        assert_eq!(engine.remove(GUILD, 2).await, Err(EngineError::NoSuchPosition));
        assert_eq!(engine.remove(GUILD, 0).await, Err(EngineError::NoSuchPosition));

        let state = engine.state_for(GUILD);
        assert_eq!(state.lock().await.titles(), vec!["b"]);
    }

    #[tokio::test]
    async fn stop_when_not_connected_fails() {
        let (engine, _, _) = engine();
        assert_eq!(engine.stop(GUILD).await, Err(EngineError::NotConnected));
    }

    #[tokio::test]
    async fn volume_bounds_and_exact_ratio() {
        let (engine, player, _) = engine();
        engine.set_dj_role(GUILD, DJ).await;
        enqueue_one(&engine, "a").await;

        assert_eq!(
            engine.set_volume(GUILD, &[DJ], -1).await,
            Err(EngineError::OutOfRange)
        );
        assert_eq!(
            engine.set_volume(GUILD, &[DJ], 101).await,
            Err(EngineError::OutOfRange)
        );

        assert_eq!(engine.set_volume(GUILD, &[DJ], 50).await.unwrap(), 50);
        assert_eq!(player.live_volume(GUILD), Some(0.5));

        let state = engine.state_for(GUILD);
        assert_eq!(state.lock().await.volume, 0.5);
    }

    #[tokio::test]
    async fn volume_requires_dj_role() {
        let (engine, _, _) = engine();
        enqueue_one(&engine, "a").await;

        assert_eq!(
            engine.set_volume(GUILD, &[DJ], 50).await,
            Err(EngineError::NotAuthorized)
        );
    }

    #[tokio::test]
    async fn vote_skip_majority_of_five_humans() {
        let (engine, player, _) = engine();
        enqueue_one(&engine, "a").await;

        // 6 miembros en el canal contando al bot: se requieren 3 votos
        let outcome = engine
            .vote_skip(GUILD, UserId::new(11), Some(VOICE), 6)
            .await
            .unwrap();
        assert_eq!(outcome, VoteOutcome::Tally { votes: 1, required: 3 });

        // Re-votar no suma
        let outcome = engine
            .vote_skip(GUILD, UserId::new(11), Some(VOICE), 6)
            .await
            .unwrap();
        assert_eq!(outcome, VoteOutcome::Tally { votes: 1, required: 3 });

        let outcome = engine
            .vote_skip(GUILD, UserId::new(12), Some(VOICE), 6)
            .await
            .unwrap();
        assert_eq!(outcome, VoteOutcome::Tally { votes: 2, required: 3 });

        let outcome = engine
            .vote_skip(GUILD, UserId::new(13), Some(VOICE), 6)
            .await
            .unwrap();
        assert_eq!(outcome, VoteOutcome::Skipped);
        assert_eq!(player.stops(), 1);

        // La votación quedó reiniciada
        let state = engine.state_for(GUILD);
        assert_eq!(state.lock().await.vote, crate::audio::queue::VoteSkip::NoVote);
    }

    #[tokio::test]
    async fn vote_from_wrong_channel_is_rejected() {
        let (engine, _, _) = engine();
        enqueue_one(&engine, "a").await;

        engine
            .vote_skip(GUILD, UserId::new(11), Some(VOICE), 6)
            .await
            .unwrap();

        let result = engine
            .vote_skip(GUILD, UserId::new(12), Some(ChannelId::new(999)), 6)
            .await;
        assert_eq!(result, Err(EngineError::WrongChannel));

        // El rechazo no movió el conteo
        let outcome = engine
            .vote_skip(GUILD, UserId::new(13), Some(VOICE), 6)
            .await
            .unwrap();
        assert_eq!(outcome, VoteOutcome::Tally { votes: 2, required: 3 });
    }

    #[tokio::test]
    async fn vote_with_nothing_playing_fails() {
        let (engine, _, _) = engine();

        let result = engine.vote_skip(GUILD, UserId::new(11), Some(VOICE), 6).await;
        assert_eq!(result, Err(EngineError::NothingPlaying));
    }

    #[tokio::test]
    async fn vote_resets_when_track_changes() {
        let (engine, player, _) = engine();

        engine
            .enqueue(GUILD, Some(VOICE), TEXT, vec![track("a"), track("b")])
            .await
            .unwrap();

        engine
            .vote_skip(GUILD, UserId::new(11), Some(VOICE), 6)
            .await
            .unwrap();

        // Cambio de pista: el consenso anterior deja de valer
        engine.handle_track_end(GUILD, player.generation(GUILD), None).await;

        let outcome = engine
            .vote_skip(GUILD, UserId::new(12), Some(VOICE), 6)
            .await
            .unwrap();
        assert_eq!(outcome, VoteOutcome::Tally { votes: 1, required: 3 });
    }

    #[tokio::test]
    async fn two_member_channel_skips_on_single_vote() {
        let (engine, player, _) = engine();
        enqueue_one(&engine, "a").await;

        // Bot más un humano: basta un voto
        let outcome = engine
            .vote_skip(GUILD, UserId::new(11), Some(VOICE), 2)
            .await
            .unwrap();
        assert_eq!(outcome, VoteOutcome::Skipped);
        assert_eq!(player.stops(), 1);
    }

    #[tokio::test]
    async fn forced_disconnect_resets_for_clean_reuse() {
        let (engine, _, voice) = engine();

        engine
            .enqueue(GUILD, Some(VOICE), TEXT, vec![track("a"), track("b")])
            .await
            .unwrap();

        engine.handle_disconnected(GUILD).await;
        assert_eq!(engine.now_playing(GUILD).await, None);

        let outcome = enqueue_one(&engine, "c").await;
        assert_eq!(
            outcome,
            EnqueueOutcome::Started {
                title: "c".to_string(),
                added: 1
            }
        );
        // Reconexión real: dos connects en total
        assert_eq!(voice.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn queue_full_reports_partial_adds() {
        let player = Arc::new(FakePlayer::default());
        let voice = Arc::new(FakeVoice::default());
        let engine = QueueEngine::new(player.clone(), voice, 2, 1.0);

        let outcome = engine
            .enqueue(GUILD, Some(VOICE), TEXT, vec![track("a"), track("b"), track("c")])
            .await
            .unwrap();

        // "a" pasa a actual, "b" llena la cola; "c" se descarta
        assert_eq!(
            outcome,
            EnqueueOutcome::Started {
                title: "a".to_string(),
                added: 2
            }
        );
    }

    #[tokio::test]
    async fn guilds_are_isolated() {
        let (engine, player, _) = engine();
        let other = GuildId::new(101);

        enqueue_one(&engine, "a").await;
        engine
            .enqueue(other, Some(ChannelId::new(201)), TEXT, vec![track("x")])
            .await
            .unwrap();

        assert_eq!(engine.now_playing(GUILD).await, Some("a".to_string()));
        assert_eq!(engine.now_playing(other).await, Some("x".to_string()));

        engine.handle_track_end(GUILD, player.generation(GUILD), None).await;
        assert_eq!(engine.now_playing(GUILD).await, None);
        assert_eq!(engine.now_playing(other).await, Some("x".to_string()));
        assert_eq!(player.started(), vec!["loc:a", "loc:x"]);
    }
}
