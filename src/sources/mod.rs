pub mod ytdlp;

use async_trait::async_trait;
use serenity::model::id::UserId;

pub use ytdlp::YtDlpResolver;

use crate::{audio::queue::Track, error::EngineError};

/// Resultado de resolver una playlist: las pistas que sí se pudieron
/// resolver y cuántas entradas se intentaron en total.
#[derive(Debug)]
pub struct PlaylistResolution {
    pub tracks: Vec<Track>,
    pub attempted: usize,
}

/// Traduce consultas, URLs y playlists en pistas reproducibles. El motor
/// nunca resuelve nada por su cuenta: el despachador es dueño del resolutor
/// y de su espera acotada.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resuelve una búsqueda o URL en una única pista.
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Track, EngineError>;

    /// Resuelve cada entrada de la playlist por separado; los fallos
    /// individuales se registran y se omiten, nunca abortan el lote.
    async fn resolve_playlist(
        &self,
        url: &str,
        requested_by: UserId,
    ) -> Result<PlaylistResolution, EngineError>;

    /// Devuelve hasta `limit` títulos candidatos para la consulta.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>, EngineError>;
}
