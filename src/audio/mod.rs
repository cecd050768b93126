//! Núcleo de audio: el motor de colas por guild, su estado y las costuras
//! hacia songbird (reproducción y enlace de voz).

pub mod engine;
pub mod player;
pub mod queue;
pub mod voice;
