// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Background tile fetching with a sha256-keyed disk cache.
//!
//! Tiles are requested by `{z}/{x}/{y}` coordinate against a URL template.
//! Downloads run on detached threads; decoded tiles land in a shared state
//! map and an optional notify hook fires so a UI can repaint.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use log::{debug, warn};
use sha2::{Digest, Sha256};

use crate::decode::{decode_tile, DecodedTile};

const CACHE_DURATION_DAYS: u64 = 7;

/// Slippy-map tile address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub zoom: u8,
}

impl TileCoord {
    #[must_use]
    pub fn new(x: u32, y: u32, zoom: u8) -> Self {
        Self { x, y, zoom }
    }

    /// The tile containing a WGS-84 position at the given zoom.
    #[must_use]
    pub fn containing(lon: f64, lat: f64, zoom: u8) -> Self {
        let n = f64::from(1u32 << zoom);
        let x = ((lon + 180.0) / 360.0 * n).floor();
        let lat_rad = lat.to_radians();
        let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0
            * n)
            .floor();
        let max = (n - 1.0).max(0.0);
        Self {
            x: x.clamp(0.0, max) as u32,
            y: y.clamp(0.0, max) as u32,
            zoom,
        }
    }
}

/// All tiles covering a WGS-84 bounding box at the given zoom.
#[must_use]
pub fn tiles_in_bounds(west: f64, south: f64, east: f64, north: f64, zoom: u8) -> Vec<TileCoord> {
    let min = TileCoord::containing(west, north, zoom);
    let max = TileCoord::containing(east, south, zoom);

    let mut tiles = Vec::new();
    for y in min.y..=max.y {
        for x in min.x..=max.x {
            tiles.push(TileCoord::new(x, y, zoom));
        }
    }
    tiles
}

/// Lifecycle state of one requested tile.
#[derive(Debug, Clone)]
pub enum TileState {
    Loading,
    Ready(Arc<DecodedTile>),
    /// Server reported no data for this tile (404/204). Normal outside the
    /// data extent; not an error.
    Empty,
    Failed(String),
}

/// Caching background fetcher for one vector tile endpoint.
pub struct TileFetcher {
    template: String,
    cache_dir: PathBuf,
    tiles: Arc<Mutex<HashMap<TileCoord, TileState>>>,
    in_flight: Arc<Mutex<HashSet<TileCoord>>>,
    notify: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl fmt::Debug for TileFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileFetcher")
            .field("template", &self.template)
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}

impl TileFetcher {
    /// Create a fetcher for a `{z}/{x}/{y}` URL template, caching raw tile
    /// payloads under `cache_dir`.
    pub fn new(template: impl Into<String>, cache_dir: PathBuf) -> Self {
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            warn!("failed to create tile cache directory: {}", e);
        }
        cleanup_old_tiles(&cache_dir);

        Self {
            template: template.into(),
            cache_dir,
            tiles: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            notify: None,
        }
    }

    /// Register a hook that fires whenever a tile changes state, e.g. an
    /// egui repaint request.
    #[must_use]
    pub fn with_notify(mut self, notify: impl Fn() + Send + Sync + 'static) -> Self {
        self.notify = Some(Arc::new(notify));
        self
    }

    /// The request URL for a tile coordinate.
    #[must_use]
    pub fn url_for(&self, coord: TileCoord) -> String {
        self.template
            .replace("{z}", &coord.zoom.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string())
    }

    fn cache_path(&self, coord: TileCoord) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(self.url_for(coord).as_bytes());
        self.cache_dir
            .join(format!("{:x}.mvt", hasher.finalize()))
    }

    /// Get a decoded tile, queueing a download if it is not yet available.
    ///
    /// Returns `None` while the tile is loading, empty, or failed.
    pub fn get(&self, coord: TileCoord) -> Option<Arc<DecodedTile>> {
        let mut tiles = self.tiles.lock().unwrap();

        match tiles.get(&coord) {
            Some(TileState::Ready(tile)) => return Some(Arc::clone(tile)),
            Some(_) => return None,
            None => {}
        }

        // Try the disk cache before hitting the network.
        let cache_path = self.cache_path(coord);
        if cache_path.exists() {
            match fs::read(&cache_path).map_err(|e| e.to_string()).and_then(|bytes| {
                decode_tile(&bytes).map_err(|e| e.to_string())
            }) {
                Ok(tile) => {
                    let tile = Arc::new(tile);
                    tiles.insert(coord, TileState::Ready(Arc::clone(&tile)));
                    return Some(tile);
                }
                Err(e) => {
                    debug!("stale cached tile {:?}: {}", coord, e);
                    let _ = fs::remove_file(&cache_path);
                }
            }
        }

        tiles.insert(coord, TileState::Loading);
        drop(tiles);
        self.queue_download(coord);
        None
    }

    /// Number of tiles currently downloading.
    #[must_use]
    pub fn loading_count(&self) -> usize {
        let tiles = self.tiles.lock().unwrap();
        tiles
            .values()
            .filter(|state| matches!(state, TileState::Loading))
            .count()
    }

    /// Number of tiles that failed to download or decode.
    #[must_use]
    pub fn error_count(&self) -> usize {
        let tiles = self.tiles.lock().unwrap();
        tiles
            .values()
            .filter(|state| matches!(state, TileState::Failed(_)))
            .count()
    }

    fn queue_download(&self, coord: TileCoord) {
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            if !in_flight.insert(coord) {
                return;
            }
        }

        let url = self.url_for(coord);
        let cache_path = self.cache_path(coord);
        let tiles = Arc::clone(&self.tiles);
        let in_flight = Arc::clone(&self.in_flight);
        let notify = self.notify.clone();

        std::thread::spawn(move || {
            let state = download_tile(&url, &cache_path);
            debug!("tile {:?} -> {}", coord, state_name(&state));

            tiles.lock().unwrap().insert(coord, state);
            in_flight.lock().unwrap().remove(&coord);
            if let Some(notify) = notify {
                notify();
            }
        });
    }
}

fn state_name(state: &TileState) -> &'static str {
    match state {
        TileState::Loading => "loading",
        TileState::Ready(_) => "ready",
        TileState::Empty => "empty",
        TileState::Failed(_) => "failed",
    }
}

fn download_tile(url: &str, cache_path: &Path) -> TileState {
    let response = match reqwest::blocking::get(url) {
        Ok(response) => response,
        Err(e) => return TileState::Failed(e.to_string()),
    };

    let status = response.status();
    if status.as_u16() == 404 || status.as_u16() == 204 {
        return TileState::Empty;
    }
    if !status.is_success() {
        return TileState::Failed(format!("HTTP {}", status));
    }

    let bytes = match response.bytes() {
        Ok(bytes) => bytes,
        Err(e) => return TileState::Failed(e.to_string()),
    };
    if bytes.is_empty() {
        return TileState::Empty;
    }

    if let Err(e) = fs::write(cache_path, &bytes) {
        warn!("failed to cache tile: {}", e);
    }

    match decode_tile(&bytes) {
        Ok(tile) => TileState::Ready(Arc::new(tile)),
        Err(e) => TileState::Failed(e.to_string()),
    }
}

fn cleanup_old_tiles(cache_dir: &Path) {
    let now = SystemTime::now();
    let max_age = Duration::from_secs(CACHE_DURATION_DAYS * 24 * 60 * 60);

    if let Ok(entries) = fs::read_dir(cache_dir) {
        for entry in entries.flatten() {
            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                if let Ok(age) = now.duration_since(modified) {
                    if age > max_age {
                        let _ = fs::remove_file(entry.path());
                        debug!("removed old cached tile {:?}", entry.path());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_template_substitution() {
        let fetcher = TileFetcher::new(
            "http://localhost:3000/bathy/{z}/{x}/{y}",
            std::env::temp_dir().join("mvt-client-test"),
        );
        let url = fetcher.url_for(TileCoord::new(1209, 1539, 12));
        assert_eq!(url, "http://localhost:3000/bathy/12/1209/1539");
    }

    #[test]
    fn test_containing_tile_at_origin() {
        let coord = TileCoord::containing(0.0, 0.0, 1);
        assert_eq!(coord, TileCoord::new(1, 1, 1));
    }

    #[test]
    fn test_containing_tile_clamps_poles() {
        let coord = TileCoord::containing(0.0, 89.9, 2);
        assert_eq!(coord.y, 0);
        let coord = TileCoord::containing(-180.0, -89.9, 2);
        assert_eq!((coord.x, coord.y), (0, 3));
    }

    #[test]
    fn test_tiles_in_bounds_world_at_zoom_zero() {
        let tiles = tiles_in_bounds(-179.9, -85.0, 179.9, 85.0, 0);
        assert_eq!(tiles, vec![TileCoord::new(0, 0, 0)]);
    }

    #[test]
    fn test_tiles_in_bounds_rectangular() {
        // A box straddling the Greenwich meridian at mid latitude.
        let tiles = tiles_in_bounds(-0.5, 51.3, 0.3, 51.7, 10);
        assert!(!tiles.is_empty());

        let center = TileCoord::containing(-0.1, 51.5, 10);
        assert!(tiles.contains(&center));

        // Row-major, contiguous block.
        let xs: Vec<u32> = tiles.iter().map(|t| t.x).collect();
        let ys: Vec<u32> = tiles.iter().map(|t| t.y).collect();
        let (min_x, max_x) = (*xs.iter().min().unwrap(), *xs.iter().max().unwrap());
        let (min_y, max_y) = (*ys.iter().min().unwrap(), *ys.iter().max().unwrap());
        assert_eq!(
            tiles.len(),
            ((max_x - min_x + 1) * (max_y - min_y + 1)) as usize
        );
    }

    #[test]
    fn test_cache_filename_is_stable() {
        let dir = std::env::temp_dir().join("mvt-client-test");
        let a = TileFetcher::new("http://localhost:3000/bathy/{z}/{x}/{y}", dir.clone());
        let b = TileFetcher::new("http://localhost:3000/bathy/{z}/{x}/{y}", dir);
        let coord = TileCoord::new(3, 4, 5);
        assert_eq!(a.cache_path(coord), b.cache_path(coord));

        let other = a.cache_path(TileCoord::new(4, 3, 5));
        assert_ne!(a.cache_path(coord), other);
    }
}
