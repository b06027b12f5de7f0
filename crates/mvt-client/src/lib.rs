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

//! Client library for fetching, caching, and decoding Mapbox Vector Tiles.
//!
//! The library is split into layers that can be used independently or
//! composed together:
//!
//! - **Wire layer**: committed protobuf types for the MVT 2.1 format
//!   ([`proto`])
//! - **Decode layer**: command-stream geometry decoding and typed feature
//!   properties ([`decode`])
//! - **Fetch layer**: background HTTP downloads with a sha256-keyed disk
//!   cache and per-tile state tracking ([`fetch`])
//!
//! # Quick Start
//!
//! Fetch and decode tiles from a `{z}/{x}/{y}` endpoint:
//!
//! ```no_run
//! use mvt_client::{TileCoord, TileFetcher};
//!
//! let fetcher = TileFetcher::new(
//!     "http://localhost:3000/bathy/{z}/{x}/{y}",
//!     std::env::temp_dir().join("tiles"),
//! );
//!
//! if let Some(tile) = fetcher.get(TileCoord::new(1209, 1539, 12)) {
//!     for layer in &tile.layers {
//!         println!("{}: {} features", layer.name, layer.features.len());
//!     }
//! }
//! ```
//!
//! # Decoding Only
//!
//! Raw payloads (optionally gzip or zlib compressed) decode without any
//! network setup:
//!
//! ```no_run
//! use mvt_client::decode_tile;
//!
//! let bytes = std::fs::read("12_1209_1539.mvt").unwrap();
//! let tile = decode_tile(&bytes).unwrap();
//! if let Some(layer) = tile.layer("bathy_pol") {
//!     for feature in &layer.features {
//!         let depth = feature.properties.get("depth_min").and_then(|v| v.as_f64());
//!         println!("{:?} min depth {:?}", feature.id, depth);
//!     }
//! }
//! ```

pub mod decode;
pub mod fetch;
pub mod proto;

pub use decode::{
    decode_tile, DecodeError, DecodedLayer, DecodedTile, Feature, Geometry, Polygon, Value,
};
pub use fetch::{tiles_in_bounds, TileCoord, TileFetcher, TileState};
