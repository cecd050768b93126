use async_trait::async_trait;
use serde::Deserialize;
use serenity::model::id::UserId;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};
use url::Url;

use super::{PlaylistResolution, TrackResolver};
use crate::{audio::queue::Track, error::EngineError};

/// Resolutor basado en yt-dlp: extrae título y URL de audio directo sin
/// descargar nada. Cada invocación corre con una espera acotada.
pub struct YtDlpResolver {
    timeout: Duration,
    max_playlist_size: usize,
}

#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    title: Option<String>,
    url: Option<String>,
}

impl YtDlpResolver {
    pub fn new(timeout_secs: u64, max_playlist_size: usize) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            max_playlist_size,
        }
    }

    /// Verifica que yt-dlp esté instalado y pueda ejecutarse.
    pub async fn verify_dependencies(&self) -> Result<(), EngineError> {
        let output = tokio::process::Command::new("yt-dlp")
            .arg("--version")
            .output()
            .await
            .map_err(|e| EngineError::ResolutionFailed(e.to_string()))?;

        if !output.status.success() {
            return Err(EngineError::ResolutionFailed(
                "yt-dlp no está disponible".to_string(),
            ));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!("✅ yt-dlp versión: {}", version.trim());
        Ok(())
    }

    fn is_url(input: &str) -> bool {
        Url::parse(input)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false)
    }

    /// Ejecuta yt-dlp con los argumentos dados y devuelve stdout, acotado
    /// por el timeout del resolutor.
    async fn run(&self, args: &[&str]) -> Result<String, EngineError> {
        let mut cmd = tokio::process::Command::new("yt-dlp");
        cmd.args([
            "--socket-timeout",
            "15",
            "--retries",
            "2",
            "--quiet",
            "--no-warnings",
        ]);
        cmd.args(args);

        let output = timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                EngineError::ResolutionFailed("tiempo de espera agotado".to_string())
            })?
            .map_err(|e| EngineError::ResolutionFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::ResolutionFailed(
                stderr.lines().last().unwrap_or("yt-dlp falló").to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn parse_entry(line: &str) -> Option<YtDlpEntry> {
        serde_json::from_str(line).ok()
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Track, EngineError> {
        let target = if Self::is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{query}")
        };

        let stdout = self
            .run(&["-j", "--no-playlist", "-f", "bestaudio/best", target.as_str()])
            .await?;

        let entry = stdout
            .lines()
            .find_map(Self::parse_entry)
            .ok_or(EngineError::NoResults)?;

        let locator = entry.url.ok_or(EngineError::NoResults)?;
        let title = entry
            .title
            .unwrap_or_else(|| "Título desconocido".to_string());

        info!("🔎 Resuelto: {}", title);
        Ok(Track::new(locator, title, requested_by))
    }

    async fn resolve_playlist(
        &self,
        url: &str,
        requested_by: UserId,
    ) -> Result<PlaylistResolution, EngineError> {
        if !Self::is_url(url) {
            return Err(EngineError::InvalidPlaylist);
        }

        // Primero el listado plano, después cada entrada por separado
        let stdout = self
            .run(&["-j", "--flat-playlist", url])
            .await
            .map_err(|_| EngineError::InvalidPlaylist)?;

        let entry_urls: Vec<String> = stdout
            .lines()
            .filter_map(Self::parse_entry)
            .filter_map(|e| e.url)
            .take(self.max_playlist_size)
            .collect();

        if entry_urls.is_empty() {
            return Err(EngineError::InvalidPlaylist);
        }

        let attempted = entry_urls.len();
        let mut tracks = Vec::with_capacity(attempted);

        for entry_url in entry_urls {
            match self.resolve(&entry_url, requested_by).await {
                Ok(track) => tracks.push(track),
                Err(e) => {
                    warn!("⚠️ Entrada de playlist omitida ({}): {}", entry_url, e);
                }
            }
        }

        info!("📃 Playlist resuelta: {}/{} pistas", tracks.len(), attempted);
        Ok(PlaylistResolution { tracks, attempted })
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>, EngineError> {
        let target = format!("ytsearch{limit}:{query}");
        let stdout = self.run(&["-j", "--flat-playlist", target.as_str()]).await?;

        let titles: Vec<String> = stdout
            .lines()
            .filter_map(Self::parse_entry)
            .filter_map(|e| e.title)
            .take(limit)
            .collect();

        if titles.is_empty() {
            return Err(EngineError::NoResults);
        }

        Ok(titles)
    }
}
