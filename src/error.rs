use thiserror::Error;

/// Resultado visible de un comando: cada operación del motor devuelve o un
/// éxito tipado o una de estas variantes, nunca un panic ni un error crudo.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Debes estar en un canal de voz.")]
    NotInVoiceChannel,

    #[error("Necesitas el rol de DJ para usar este comando.")]
    NotAuthorized,

    #[error("No hay nada reproduciéndose ahora mismo.")]
    NothingPlaying,

    #[error("La reproducción no está pausada.")]
    NotPaused,

    #[error("No estoy conectado a ningún canal de voz.")]
    NotConnected,

    #[error("El volumen debe estar entre 0 y 100.")]
    OutOfRange,

    #[error("No se encontraron resultados.")]
    NoResults,

    #[error("No se pudo resolver la pista: {0}")]
    ResolutionFailed(String),

    #[error("La playlist está vacía o no es válida.")]
    InvalidPlaylist,

    #[error("Debes estar en el mismo canal de voz que la votación en curso.")]
    WrongChannel,

    #[error("No se pudo conectar al canal de voz: {0}")]
    ConnectError(String),

    #[error("Error de reproducción: {0}")]
    PlaybackError(String),

    #[error("La cola está llena (máximo {0} canciones).")]
    QueueFull(usize),

    #[error("La cola está vacía.")]
    EmptyQueue,

    #[error("No hay ninguna canción en esa posición de la cola.")]
    NoSuchPosition,
}
