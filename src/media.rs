use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use crossbeam_channel::{unbounded, Receiver, Sender};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use reqwest::blocking::Client as HttpClient;

use crate::proxy;
use crate::settings::SettingsHandle;

static IMAGE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://[^\s<>]+?\.(?:jpg|jpeg|png|gif|webp)$").expect("image url pattern")
});

static IMAGE_URL_IN_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)https?://[^\s<>]+?\.(?:jpg|jpeg|png|gif|webp)").expect("image url pattern")
});

pub fn is_image_url(url: &str) -> bool {
    IMAGE_URL.is_match(url)
}

/// Image URLs embedded in a block of text, first occurrence wins.
pub fn image_urls(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for found in IMAGE_URL_IN_TEXT.find_iter(text) {
        let url = found.as_str().to_string();
        if !seen.contains(&url) {
            seen.push(url);
        }
    }
    seen
}

#[derive(Debug, Clone)]
pub struct Config {
    pub max_width: u32,
    pub max_height: u32,
    pub workers: usize,
    pub http_client: Option<HttpClient>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_width: 800,
            max_height: 600,
            workers: 2,
            http_client: None,
        }
    }
}

/// Outcome of resolving one URL: `display` is either a `data:image/png`
/// URI or the original URL when the image could not be inlined.
#[derive(Debug)]
pub struct Resolved {
    pub url: String,
    pub display: String,
}

struct Job {
    url: String,
    tx: Sender<Resolved>,
}

struct Inner {
    cfg: Config,
    settings: SettingsHandle,
    cache: RwLock<HashMap<String, String>>,
    jobs: Sender<Job>,
    stop: Sender<()>,
}

pub struct Manager {
    inner: Arc<Inner>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl Manager {
    pub fn new(settings: SettingsHandle, cfg: Config) -> Self {
        let mut cfg = cfg;
        if cfg.workers == 0 {
            cfg.workers = 2;
        }

        let (job_tx, job_rx) = unbounded();
        let (stop_tx, stop_rx) = unbounded();

        let inner = Arc::new(Inner {
            cfg,
            settings,
            cache: RwLock::new(HashMap::new()),
            jobs: job_tx,
            stop: stop_tx,
        });

        let mut handles = Vec::new();
        for _ in 0..inner.cfg.workers {
            let rx_jobs = job_rx.clone();
            let rx_stop = stop_rx.clone();
            let worker_inner = inner.clone();
            handles.push(thread::spawn(move || worker_inner.worker(rx_jobs, rx_stop)));
        }

        Self { inner, handles }
    }

    /// Runs the resolve on the worker pool; the result arrives on the
    /// returned channel.
    pub fn enqueue(&self, url: String) -> Receiver<Resolved> {
        let (tx, rx) = unbounded();
        let _ = self.inner.jobs.send(Job { url, tx });
        rx
    }

    /// Resolves on the calling thread. Failures of any kind degrade to the
    /// original URL.
    pub fn resolve(&self, url: &str) -> String {
        self.inner.resolve(url)
    }

    /// Empties the cache. A resolution already in flight may repopulate its
    /// key afterwards; that only costs a refetch.
    pub fn clear_cache(&self) {
        self.inner.cache.write().clear();
    }

    fn shutdown(&mut self) {
        for _ in &self.handles {
            let _ = self.inner.stop.send(());
        }
        while let Some(handle) = self.handles.pop() {
            let _ = handle.join();
        }
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn worker(&self, jobs: Receiver<Job>, stop: Receiver<()>) {
        loop {
            crossbeam_channel::select! {
                recv(stop) -> _ => break,
                recv(jobs) -> msg => {
                    match msg {
                        Ok(job) => self.process(job),
                        Err(_) => break,
                    }
                }
            }
        }
    }

    fn process(&self, job: Job) {
        let display = self.resolve(&job.url);
        let _ = job.tx.send(Resolved {
            url: job.url,
            display,
        });
    }

    fn resolve(&self, url: &str) -> String {
        if !is_image_url(url) {
            return url.to_string();
        }

        if let Some(hit) = self.cache.read().get(url) {
            return hit.clone();
        }

        match self.fetch_encoded(url) {
            Ok(data_uri) => {
                self.cache
                    .write()
                    .insert(url.to_string(), data_uri.clone());
                data_uri
            }
            Err(_) => url.to_string(),
        }
    }

    fn fetch_encoded(&self, url: &str) -> Result<String> {
        let client = self.client()?;
        let resp = client.get(url).send().context("image: download")?;
        if !resp.status().is_success() {
            return Err(anyhow!("image: request failed: {}", resp.status()));
        }
        let bytes = resp.bytes().context("image: body")?;
        if bytes.is_empty() {
            return Err(anyhow!("image: empty body"));
        }

        let decoded = image::load_from_memory(&bytes).context("image: decode")?;
        let bounded = shrink_to_bounds(decoded, self.cfg.max_width, self.cfg.max_height);

        let mut png = Vec::new();
        bounded
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .context("image: encode")?;
        Ok(format!("data:image/png;base64,{}", BASE64.encode(&png)))
    }

    fn client(&self) -> Result<HttpClient> {
        if let Some(client) = self.cfg.http_client.clone() {
            return Ok(client);
        }
        let snapshot = self.settings.snapshot();
        let builder = HttpClient::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(30));
        let client = proxy::resolve(&snapshot.proxy)
            .apply(builder)?
            .build()
            .context("image: build http client")?;
        Ok(client)
    }
}

/// Downsamples with a bilinear filter when either dimension exceeds the
/// bounds, preserving aspect ratio with scale = min(maxW/w, maxH/h).
fn shrink_to_bounds(image: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width <= max_width && height <= max_height {
        return image;
    }

    let scale = f64::min(
        f64::from(max_width) / f64::from(width),
        f64::from(max_height) / f64::from(height),
    );
    let new_width = ((f64::from(width) * scale) as u32).max(1);
    let new_height = ((f64::from(height) * scale) as u32).max(1);
    image.resize_exact(new_width, new_height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager() -> Manager {
        Manager::new(
            SettingsHandle::new(Settings::default()),
            Config {
                http_client: Some(HttpClient::new()),
                ..Config::default()
            },
        )
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::new_rgb8(width, height)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// Loopback server that answers every request with the same body and
    /// counts how many it served.
    fn serve(body: Vec<u8>, max_requests: usize) -> (String, Arc<AtomicUsize>) {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let url = format!("http://{}/pic.png", addr);
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        thread::spawn(move || {
            for request in server.incoming_requests().take(max_requests) {
                seen.fetch_add(1, Ordering::SeqCst);
                let _ = request.respond(tiny_http::Response::from_data(body.clone()));
            }
        });
        (url, hits)
    }

    #[test]
    fn image_suffix_pattern() {
        assert!(is_image_url("https://example.com/a.png"));
        assert!(is_image_url("http://example.com/a.JPEG"));
        assert!(is_image_url("https://example.com/pic.webp"));
        assert!(!is_image_url("https://example.com/page.html"));
        assert!(!is_image_url("https://example.com/a.png?x=1"));
        assert!(!is_image_url("ftp://example.com/a.png"));
    }

    #[test]
    fn extracts_image_urls_from_text() {
        let text = "look https://a.com/x.png and https://b.com/y.jpg, \
                    again https://a.com/x.png but not https://c.com/page.html";
        assert_eq!(
            image_urls(text),
            vec![
                "https://a.com/x.png".to_string(),
                "https://b.com/y.jpg".to_string()
            ]
        );
    }

    #[test]
    fn non_image_url_passes_through_without_cache_entry() {
        let manager = manager();
        let url = "https://example.com/page.html";
        assert_eq!(manager.resolve(url), url);
        assert!(manager.inner.cache.read().is_empty());
    }

    #[test]
    fn second_resolve_hits_the_cache() {
        let (url, hits) = serve(png_bytes(4, 4), 4);
        let manager = manager();

        let first = manager.resolve(&url);
        assert!(first.starts_with("data:image/png;base64,"));
        let second = manager.resolve(&url);
        assert_eq!(first, second);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_fetch_degrades_to_the_original_url() {
        // 200 with an empty body.
        let (url, _) = serve(Vec::new(), 1);
        let manager = manager();
        assert_eq!(manager.resolve(&url), url);
        assert!(manager.inner.cache.read().is_empty());
    }

    #[test]
    fn undecodable_body_degrades_to_the_original_url() {
        let (url, _) = serve(b"not an image".to_vec(), 1);
        let manager = manager();
        assert_eq!(manager.resolve(&url), url);
    }

    #[test]
    fn clear_cache_forces_a_refetch() {
        let (url, hits) = serve(png_bytes(4, 4), 4);
        let manager = manager();
        manager.resolve(&url);
        manager.clear_cache();
        manager.resolve(&url);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn enqueue_resolves_on_the_worker_pool() {
        let (url, _) = serve(png_bytes(4, 4), 4);
        let manager = manager();
        let resolved = manager.enqueue(url.clone()).recv().unwrap();
        assert_eq!(resolved.url, url);
        assert!(resolved.display.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn oversized_images_shrink_preserving_aspect_ratio() {
        let shrunk = shrink_to_bounds(DynamicImage::new_rgb8(1600, 600), 800, 600);
        assert_eq!(shrunk.dimensions(), (800, 300));

        let shrunk = shrink_to_bounds(DynamicImage::new_rgb8(400, 1200), 800, 600);
        assert_eq!(shrunk.dimensions(), (200, 600));
    }

    #[test]
    fn images_within_bounds_are_untouched() {
        let kept = shrink_to_bounds(DynamicImage::new_rgb8(800, 600), 800, 600);
        assert_eq!(kept.dimensions(), (800, 600));
    }
}
