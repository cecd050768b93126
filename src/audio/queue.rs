use chrono::{DateTime, Utc};
use serenity::model::id::{ChannelId, RoleId, UserId};
use std::collections::{HashSet, VecDeque};
use tracing::info;

use crate::error::EngineError;

/// Una pista lista para reproducir: localizador de audio directo más su
/// título, tal como los entrega el resolutor.
#[derive(Debug, Clone)]
pub struct Track {
    pub locator: String,
    pub title: String,
    #[allow(dead_code)]
    pub requested_by: UserId,
    #[allow(dead_code)]
    pub added_at: DateTime<Utc>,
}

impl Track {
    pub fn new(locator: String, title: String, requested_by: UserId) -> Self {
        Self {
            locator,
            title,
            requested_by,
            added_at: Utc::now(),
        }
    }
}

/// Estado de la votación para saltar la pista actual. La votación siempre
/// queda ligada a un único canal de voz durante la vida de la pista.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteSkip {
    NoVote,
    VoteOpen {
        channel: ChannelId,
        voters: HashSet<UserId>,
    },
}

impl VoteSkip {
    /// Registra un voto. Abre la votación si no existía; los re-votos no
    /// cuentan doble. Devuelve el total de votos acumulados.
    pub fn cast(&mut self, channel: ChannelId, voter: UserId) -> Result<usize, EngineError> {
        match self {
            VoteSkip::NoVote => {
                let mut voters = HashSet::new();
                voters.insert(voter);
                *self = VoteSkip::VoteOpen { channel, voters };
                Ok(1)
            }
            VoteSkip::VoteOpen {
                channel: bound,
                voters,
            } => {
                if *bound != channel {
                    return Err(EngineError::WrongChannel);
                }
                voters.insert(voter);
                Ok(voters.len())
            }
        }
    }

    pub fn reset(&mut self) {
        *self = VoteSkip::NoVote;
    }
}

/// Estado mutable de un guild: cola FIFO, pista actual, enlaces de voz y
/// texto, votación en curso, volumen y rol de DJ. Solo el motor lo toca, y
/// siempre bajo la exclusión de ese guild.
#[derive(Debug)]
pub struct GuildQueueState {
    items: VecDeque<Track>,
    pub current: Option<Track>,
    pub voice_channel: Option<ChannelId>,
    pub text_channel: Option<ChannelId>,
    pub vote: VoteSkip,
    pub volume: f32,
    pub dj_role: Option<RoleId>,
    /// Número de serie del último arranque de pista en este guild. Las
    /// notificaciones de fin llevan el número de la pista que las originó;
    /// las que no coinciden con el actual son obsoletas y se descartan.
    pub generation: u64,
    max_size: usize,
}

impl GuildQueueState {
    pub fn new(max_size: usize, default_volume: f32) -> Self {
        Self {
            items: VecDeque::new(),
            current: None,
            voice_channel: None,
            text_channel: None,
            vote: VoteSkip::NoVote,
            volume: default_volume,
            dj_role: None,
            generation: 0,
            max_size,
        }
    }

    /// Agrega una pista al final de la cola.
    pub fn push_track(&mut self, track: Track) -> Result<(), EngineError> {
        if self.items.len() >= self.max_size {
            return Err(EngineError::QueueFull(self.max_size));
        }

        info!("➕ Agregado a la cola: {}", track.title);
        self.items.push_back(track);
        Ok(())
    }

    /// Saca la siguiente pista y la convierte en la actual en un solo paso;
    /// la cola nunca contiene la pista actual. Una pista nueva reinicia
    /// cualquier votación abierta.
    pub fn pop_into_current(&mut self) -> Option<&Track> {
        let next = self.items.pop_front();
        self.vote.reset();
        self.current = next;
        self.current.as_ref()
    }

    /// Vacía el guild: cola, pista actual, votación y enlace de voz. El
    /// volumen y el rol de DJ sobreviven al reinicio.
    pub fn reset_playback(&mut self) {
        self.items.clear();
        self.current = None;
        self.vote.reset();
        self.voice_channel = None;
    }

    /// Mezcla las pistas pendientes; la pista actual no se toca.
    pub fn shuffle(&mut self) {
        use rand::seq::SliceRandom;
        let mut rng = rand::thread_rng();
        self.items.make_contiguous().shuffle(&mut rng);
    }

    /// Quita la pista en la posición dada (0 = la siguiente en sonar).
    pub fn remove_at(&mut self, index: usize) -> Option<Track> {
        self.items.remove(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[cfg(test)]
    pub fn titles(&self) -> Vec<&str> {
        self.items.iter().map(|t| t.title.as_str()).collect()
    }
}
