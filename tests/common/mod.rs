//! Shared helpers for integration tests
//!
//! Tests drive the public API only: a scripted [`SourceAdapter`] stands in
//! for the media host and the router is served on an ephemeral port.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use media_dl::{
    Config, MediaDownloader, MediaMetadata, MediaStream, NoOpTranscoder, OutputFormat,
    RequestProfile, Result, SourceAdapter,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

pub const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

/// Source serving fixed bytes and recording every profile it was called with
pub struct ScriptedSource {
    pub title: String,
    pub body: Vec<u8>,
    pub profiles: Mutex<Vec<RequestProfile>>,
}

impl ScriptedSource {
    pub fn new(title: &str, body: &[u8]) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_vec(),
            profiles: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded_profiles(&self) -> Vec<RequestProfile> {
        self.profiles.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceAdapter for ScriptedSource {
    async fn fetch_metadata(
        &self,
        _url: &Url,
        _format: Option<OutputFormat>,
        profile: &RequestProfile,
    ) -> Result<MediaMetadata> {
        self.profiles.lock().unwrap().push(profile.clone());
        Ok(MediaMetadata {
            title: self.title.clone(),
            channel_name: Some("Integration".into()),
            duration_secs: Some(215),
            view_count: Some(2_500_000),
            filesize: Some(self.body.len() as u64),
            ..Default::default()
        })
    }

    async fn open_stream(
        &self,
        _url: &Url,
        _format: OutputFormat,
        _profile: &RequestProfile,
    ) -> Result<MediaStream> {
        let chunks: Vec<std::io::Result<Bytes>> = self
            .body
            .chunks(3)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(MediaStream {
            total_bytes: Some(self.body.len() as u64),
            body: futures::stream::iter(chunks).boxed(),
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Config rooted in `dir` with no external tool lookup
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.download.download_dir = dir.path().join("downloads");
    config.download.temp_dir = dir.path().join("temp");
    config.tools.search_path = false;
    config
}

/// Downloader around `source` with the given config tweaks
pub async fn create_downloader(
    source: Arc<dyn SourceAdapter>,
    configure: impl FnOnce(&mut Config),
) -> (Arc<MediaDownloader>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    configure(&mut config);
    let downloader = MediaDownloader::with_components(config, source, Arc::new(NoOpTranscoder))
        .await
        .unwrap();
    (Arc::new(downloader), dir)
}

/// Serve the router on an ephemeral port; returns the base URL
pub async fn spawn_server(downloader: Arc<MediaDownloader>) -> String {
    let config = Arc::new(downloader.config().clone());
    let app = media_dl::api::create_router(downloader, config);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    format!("http://{addr}")
}

/// Poll GET /progress until the job is terminal
pub async fn poll_until_terminal(
    client: &reqwest::Client,
    base: &str,
    job_id: &str,
) -> serde_json::Value {
    for _ in 0..200 {
        let snapshot: serde_json::Value = client
            .get(format!("{base}/progress"))
            .query(&[("jobId", job_id)])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if snapshot["status"] == "completed" || snapshot["status"] == "error" {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {job_id} never finished");
}
