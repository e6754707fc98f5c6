//! Biomass tile fetcher with an on-disk cache.
//!
//! Tiles are addressed by a [`TileSource`], which renders the remote URL and
//! the local file name for a `(tile, year)` pair. A tile whose local file
//! already exists is never downloaded again; there is no checksum or expiry.
//!
//! Downloads are streamed into `<name>.part` and renamed into place only once
//! complete, so an interrupted transfer never shows up as a cached tile.

use crate::{Result, TileError, TileId};
use carbon_metrics::metric_defs;
use carbon_metrics::metrics::counter;
use std::fs;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::cell::Cell;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Default remote location of the ESA CCI above-ground biomass tiles.
pub const DEFAULT_URL_TEMPLATE: &str =
    "https://dap.ceda.ac.uk/neodc/esacci/biomass/data/agb/maps/v5.01/geotiff/{year}/{filename}";

/// Default tile file name.
pub const DEFAULT_FILENAME_TEMPLATE: &str =
    "{tile}_ESACCI-BIOMASS-L4-AGB-MERGED-100m-{year}-fv5.0.tif";

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default whole-transfer timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Size of the buffer used when streaming a response body to disk.
const CHUNK_SIZE: usize = 64 * 1024;

/// URL and file-name templates for a tiled product.
///
/// Templates understand `{tile}`, `{year}` and, in the URL only, `{filename}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileSource {
    url_template: String,
    filename_template: String,
}

impl Default for TileSource {
    fn default() -> Self {
        Self::new(DEFAULT_URL_TEMPLATE, DEFAULT_FILENAME_TEMPLATE)
    }
}

impl TileSource {
    /// Create a source from its two templates.
    pub fn new(url_template: impl Into<String>, filename_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            filename_template: filename_template.into(),
        }
    }

    /// Local file name of a tile.
    pub fn filename(&self, tile: TileId, year: u16) -> String {
        render(&self.filename_template, tile, year, "")
    }

    /// Remote URL of a tile.
    pub fn url(&self, tile: TileId, year: u16) -> String {
        let filename = self.filename(tile, year);
        render(&self.url_template, tile, year, &filename)
    }

    /// Bind a tile and year to their URL and local path under `dir`.
    pub fn tile_file(&self, tile: TileId, year: u16, dir: &Path) -> TileFile {
        TileFile {
            tile,
            year,
            url: self.url(tile, year),
            path: dir.join(self.filename(tile, year)),
        }
    }
}

fn render(template: &str, tile: TileId, year: u16, filename: &str) -> String {
    template
        .replace("{filename}", filename)
        .replace("{tile}", &tile.name())
        .replace("{year}", &year.to_string())
}

/// A tile bound to a product year, its remote URL and its cache path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileFile {
    /// Grid cell.
    pub tile: TileId,
    /// Product year.
    pub year: u16,
    /// Remote URL.
    pub url: String,
    /// Local path in the cache directory.
    pub path: PathBuf,
}

/// Percentage of a transfer received, when the total size is known.
fn percent(downloaded: u64, total: Option<u64>) -> Option<f64> {
    match total {
        Some(total) if total > 0 => Some(downloaded as f64 / total as f64 * 100.0),
        _ => None,
    }
}

/// Download statistics for the fetcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    /// Tiles downloaded this session.
    pub tiles_downloaded: usize,
    /// Tiles found in the cache this session.
    pub cache_hits: usize,
    /// Tiles that failed to download this session.
    pub failures: usize,
    /// Total bytes downloaded this session.
    pub bytes_downloaded: u64,
}

/// Fetches tiles into a cache directory.
///
/// Tiles are fetched one after another; the session counters are plain
/// cells and the fetcher is not shared between threads.
pub struct TileFetcher {
    /// Cache directory for downloaded tiles.
    cache_dir: PathBuf,
    /// URL and file-name templates.
    source: TileSource,
    /// HTTP client for downloading tiles.
    client: reqwest::blocking::Client,
    /// Deadline for a whole transfer, body included.
    timeout: Duration,
    tiles_downloaded: Cell<usize>,
    cache_hits: Cell<usize>,
    failures: Cell<usize>,
    bytes_downloaded: Cell<u64>,
}

impl std::fmt::Debug for TileFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileFetcher")
            .field("cache_dir", &self.cache_dir)
            .field("source", &self.source)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TileFetcher {
    /// Create a fetcher with the default timeouts.
    pub fn new<P: AsRef<Path>>(cache_dir: P, source: TileSource) -> Result<Self> {
        Self::with_timeouts(cache_dir, source, DEFAULT_CONNECT_TIMEOUT, DEFAULT_TIMEOUT)
    }

    /// Create a fetcher with explicit connect and total timeouts.
    pub fn with_timeouts<P: AsRef<Path>>(
        cache_dir: P,
        source: TileSource,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self::with_client(cache_dir, source, client)?.with_total_timeout(timeout))
    }

    /// Create a fetcher around a preconfigured HTTP client.
    ///
    /// The whole-transfer deadline starts at [`DEFAULT_TIMEOUT`]; see
    /// [`TileFetcher::with_total_timeout`].
    pub fn with_client<P: AsRef<Path>>(
        cache_dir: P,
        source: TileSource,
        client: reqwest::blocking::Client,
    ) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();

        // Create cache directory if it doesn't exist
        fs::create_dir_all(&cache_dir)?;

        Ok(Self {
            cache_dir,
            source,
            client,
            timeout: DEFAULT_TIMEOUT,
            tiles_downloaded: Cell::new(0),
            cache_hits: Cell::new(0),
            failures: Cell::new(0),
            bytes_downloaded: Cell::new(0),
        })
    }

    /// Limit how long a single tile transfer may take, from request to last byte.
    ///
    /// A transfer that is still running at the deadline is abandoned and its
    /// partial file removed.
    pub fn with_total_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the tile source.
    pub fn source(&self) -> &TileSource {
        &self.source
    }

    /// Bind a tile and year to this fetcher's cache directory.
    pub fn tile_file(&self, tile: TileId, year: u16) -> TileFile {
        self.source.tile_file(tile, year, &self.cache_dir)
    }

    /// Check if a tile is cached locally.
    pub fn is_cached(&self, file: &TileFile) -> bool {
        file.path.exists()
    }

    /// Get download statistics for this session.
    pub fn download_stats(&self) -> DownloadStats {
        DownloadStats {
            tiles_downloaded: self.tiles_downloaded.get(),
            cache_hits: self.cache_hits.get(),
            failures: self.failures.get(),
            bytes_downloaded: self.bytes_downloaded.get(),
        }
    }

    /// Fetch a tile, using the cache if available.
    ///
    /// Returns the path to the local tile file.
    pub fn fetch(&self, file: &TileFile) -> Result<PathBuf> {
        let year = file.year.to_string();

        if self.is_cached(file) {
            info!(path = %file.path.display(), "Tile already downloaded");
            self.cache_hits.set(self.cache_hits.get() + 1);
            counter!(metric_defs::TILE_CACHE_HITS.name, "year" => year).increment(1);
            return Ok(file.path.clone());
        }

        info!(tile = %file.tile, url = %file.url, "Downloading tile");
        match self.download(file) {
            Ok(bytes) => {
                self.tiles_downloaded.set(self.tiles_downloaded.get() + 1);
                self.bytes_downloaded.set(self.bytes_downloaded.get() + bytes);
                counter!(metric_defs::TILES_DOWNLOADED.name, "year" => year).increment(1);
                counter!(metric_defs::BYTES_DOWNLOADED.name).increment(bytes);
                info!(path = %file.path.display(), bytes, "Downloaded tile");
                Ok(file.path.clone())
            }
            Err(e) => {
                self.failures.set(self.failures.get() + 1);
                counter!(metric_defs::TILE_DOWNLOAD_FAILURES.name, "year" => year).increment(1);
                Err(e)
            }
        }
    }

    /// Fetch every tile of a year, skipping the ones that fail.
    ///
    /// Failures are logged and the tile is left out of the result, so the
    /// returned list may be shorter than `tiles`.
    pub fn fetch_year(&self, tiles: &[TileId], year: u16) -> Vec<PathBuf> {
        let mut available = Vec::with_capacity(tiles.len());
        for &tile in tiles {
            let file = self.tile_file(tile, year);
            match self.fetch(&file) {
                Ok(path) => available.push(path),
                Err(e) => warn!(tile = %tile, year, error = %e, "Failed to download tile"),
            }
        }
        available
    }

    /// Stream a tile to its `.part` file and move it into place.
    fn download(&self, file: &TileFile) -> Result<u64> {
        if let Some(parent) = file.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let started = Instant::now();
        let mut response = self.client.get(&file.url).send()?;
        if !response.status().is_success() {
            return Err(TileError::DownloadFailed {
                tile: file.tile.name(),
                year: file.year,
                reason: format!("HTTP {}", response.status()),
            });
        }

        let part_path = partial_path(&file.path);
        let result = self
            .stream_body(&mut response, &part_path, file, started)
            .and_then(|bytes| {
                fs::rename(&part_path, &file.path)?;
                Ok(bytes)
            });
        if result.is_err() {
            let _ = fs::remove_file(&part_path);
        }
        result
    }

    fn stream_body(
        &self,
        response: &mut reqwest::blocking::Response,
        part_path: &Path,
        file: &TileFile,
        started: Instant,
    ) -> Result<u64> {
        let total = response.content_length();
        let mut out = BufWriter::new(fs::File::create(part_path)?);
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut downloaded = 0u64;
        let mut last_logged_decile = 0u64;

        loop {
            if started.elapsed() > self.timeout {
                return Err(TileError::DownloadFailed {
                    tile: file.tile.name(),
                    year: file.year,
                    reason: format!(
                        "exceeded total timeout of {}s after {} bytes",
                        self.timeout.as_secs_f64(),
                        downloaded
                    ),
                });
            }

            let n = response.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])?;
            downloaded += n as u64;

            if let Some(percent) = percent(downloaded, total) {
                let decile = (percent / 10.0) as u64;
                if decile > last_logged_decile {
                    last_logged_decile = decile;
                    info!(tile = %file.tile, "Downloading: {:.2}% ({}/{} bytes)", percent, downloaded, total.unwrap_or(0));
                }
            }
        }
        out.flush()?;

        if let Some(total) = total {
            if downloaded != total {
                return Err(TileError::DownloadFailed {
                    tile: file.tile.name(),
                    year: file.year,
                    reason: format!("truncated transfer ({} of {} bytes)", downloaded, total),
                });
            }
        }

        Ok(downloaded)
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}
