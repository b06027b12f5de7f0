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

//! Tile decoding: protobuf payload to typed layers, features, and geometry.
//!
//! Geometry arrives as a zig-zag encoded command stream (`MoveTo`, `LineTo`,
//! `ClosePath`) in tile-local integer coordinates. Payloads may be gzip or
//! zlib compressed; both are detected by magic bytes.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;

use flate2::read::{GzDecoder, ZlibDecoder};
use prost::Message;
use thiserror::Error;

use crate::proto;
use crate::proto::GeomType;

const CMD_MOVE_TO: u32 = 1;
const CMD_LINE_TO: u32 = 2;
const CMD_CLOSE_PATH: u32 = 7;

/// Errors that can occur while decoding a tile payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("protobuf decode failed: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("decompression failed: {0}")]
    Decompress(#[from] std::io::Error),

    #[error("unsupported layer version {0}")]
    UnsupportedVersion(u32),

    #[error("unknown geometry command {command}")]
    UnknownCommand { command: u32 },

    #[error("truncated geometry: {missing} parameter integers missing")]
    TruncatedGeometry { missing: usize },

    #[error("tag index {index} out of range in layer '{layer}'")]
    TagIndex { layer: String, index: u32 },
}

/// A typed feature property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Float(f32),
    Double(f64),
    Int(i64),
    Uint(u64),
    Bool(bool),
}

impl Value {
    /// Coerce this value to a number.
    ///
    /// Integers and floats pass through, strings are trimmed and parsed as
    /// `f64`, booleans map to 1/0. Anything unparseable yields `None`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(f64::from(*f)),
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            Value::Uint(u) => Some(*u as f64),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// A polygon as an exterior ring plus zero or more holes, in tile-local
/// integer coordinates. Rings are not closed; the last vertex does not
/// repeat the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polygon {
    pub exterior: Vec<[i32; 2]>,
    pub holes: Vec<Vec<[i32; 2]>>,
}

/// Decoded feature geometry in tile-local integer coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Points(Vec<[i32; 2]>),
    Lines(Vec<Vec<[i32; 2]>>),
    Polygons(Vec<Polygon>),
}

impl Geometry {
    /// Short human-readable kind name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Points(_) => "point",
            Geometry::Lines(_) => "line",
            Geometry::Polygons(_) => "polygon",
        }
    }
}

/// A decoded feature with its resolved property map.
#[derive(Debug, Clone)]
pub struct Feature {
    pub id: Option<u64>,
    pub geometry: Geometry,
    pub properties: HashMap<String, Value>,
}

/// A decoded named layer.
#[derive(Debug, Clone)]
pub struct DecodedLayer {
    pub name: String,
    /// Width and height of the tile-local coordinate system.
    pub extent: u32,
    pub features: Vec<Feature>,
}

/// A fully decoded tile.
#[derive(Debug, Clone, Default)]
pub struct DecodedTile {
    pub layers: Vec<DecodedLayer>,
}

impl DecodedTile {
    /// Look up a layer by its source-layer name.
    #[must_use]
    pub fn layer(&self, name: &str) -> Option<&DecodedLayer> {
        self.layers.iter().find(|l| l.name == name)
    }
}

/// Decode a raw tile payload, decompressing first if needed.
pub fn decode_tile(bytes: &[u8]) -> Result<DecodedTile, DecodeError> {
    let raw = decompress(bytes)?;
    let tile = proto::Tile::decode(raw.as_slice())?;

    let mut layers = Vec::with_capacity(tile.layers.len());
    for layer in tile.layers {
        layers.push(decode_layer(layer)?);
    }
    Ok(DecodedTile { layers })
}

fn decompress(bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b {
        let mut out = Vec::new();
        GzDecoder::new(bytes).read_to_end(&mut out)?;
        return Ok(out);
    }
    if bytes.len() >= 2 && bytes[0] == 0x78 && matches!(bytes[1], 0x01 | 0x9c | 0xda) {
        let mut out = Vec::new();
        ZlibDecoder::new(bytes).read_to_end(&mut out)?;
        return Ok(out);
    }
    Ok(bytes.to_vec())
}

fn decode_layer(layer: proto::Layer) -> Result<DecodedLayer, DecodeError> {
    if layer.version > 2 {
        return Err(DecodeError::UnsupportedVersion(layer.version));
    }

    let extent = layer.extent();
    let mut features = Vec::with_capacity(layer.features.len());

    for feature in &layer.features {
        let properties = resolve_tags(&layer, feature)?;
        let kind = feature.geom_type();
        if kind == GeomType::Unknown {
            continue;
        }
        let geometry = decode_geometry(kind, &feature.geometry)?;
        features.push(Feature {
            id: feature.id,
            geometry,
            properties,
        });
    }

    Ok(DecodedLayer {
        name: layer.name,
        extent,
        features,
    })
}

/// Resolve a feature's tag pairs against the layer key/value tables.
///
/// A dangling odd tag at the end is ignored; an index past either table is
/// an error.
fn resolve_tags(
    layer: &proto::Layer,
    feature: &proto::Feature,
) -> Result<HashMap<String, Value>, DecodeError> {
    let mut properties = HashMap::with_capacity(feature.tags.len() / 2);

    for pair in feature.tags.chunks_exact(2) {
        let key = layer
            .keys
            .get(pair[0] as usize)
            .ok_or_else(|| DecodeError::TagIndex {
                layer: layer.name.clone(),
                index: pair[0],
            })?;
        let value = layer
            .values
            .get(pair[1] as usize)
            .ok_or_else(|| DecodeError::TagIndex {
                layer: layer.name.clone(),
                index: pair[1],
            })?;

        if let Some(value) = convert_value(value) {
            properties.insert(key.clone(), value);
        }
    }

    Ok(properties)
}

fn convert_value(value: &proto::Value) -> Option<Value> {
    if let Some(ref s) = value.string_value {
        Some(Value::String(s.clone()))
    } else if let Some(f) = value.float_value {
        Some(Value::Float(f))
    } else if let Some(d) = value.double_value {
        Some(Value::Double(d))
    } else if let Some(i) = value.int_value {
        Some(Value::Int(i))
    } else if let Some(i) = value.sint_value {
        Some(Value::Int(i))
    } else if let Some(u) = value.uint_value {
        Some(Value::Uint(u))
    } else {
        value.bool_value.map(Value::Bool)
    }
}

/// Decode the zig-zag parameter integer of a geometry command.
fn zigzag(v: u32) -> i32 {
    ((v >> 1) as i32) ^ -((v & 1) as i32)
}

/// Twice the signed area of a ring by the surveyor's formula. Positive
/// marks an exterior ring in tile coordinates.
fn signed_area2(ring: &[[i32; 2]]) -> i64 {
    let mut sum = 0i64;
    for i in 0..ring.len() {
        let [x1, y1] = ring[i];
        let [x2, y2] = ring[(i + 1) % ring.len()];
        sum += i64::from(x1) * i64::from(y2) - i64::from(x2) * i64::from(y1);
    }
    sum
}

/// Walk a command stream into paths. Each path carries whether it was
/// terminated by `ClosePath`.
fn decode_paths(geometry: &[u32]) -> Result<Vec<(Vec<[i32; 2]>, bool)>, DecodeError> {
    let mut paths: Vec<(Vec<[i32; 2]>, bool)> = Vec::new();
    let mut current: Vec<[i32; 2]> = Vec::new();
    let mut cursor = [0i32, 0i32];
    let mut i = 0usize;

    while i < geometry.len() {
        let cmd_int = geometry[i];
        let command = cmd_int & 0x7;
        let count = (cmd_int >> 3) as usize;
        i += 1;

        match command {
            CMD_MOVE_TO | CMD_LINE_TO => {
                let needed = count * 2;
                if geometry.len() - i < needed {
                    return Err(DecodeError::TruncatedGeometry {
                        missing: needed - (geometry.len() - i),
                    });
                }
                if command == CMD_MOVE_TO && !current.is_empty() {
                    paths.push((std::mem::take(&mut current), false));
                }
                for _ in 0..count {
                    cursor[0] += zigzag(geometry[i]);
                    cursor[1] += zigzag(geometry[i + 1]);
                    current.push(cursor);
                    i += 2;
                }
            }
            CMD_CLOSE_PATH => {
                if !current.is_empty() {
                    paths.push((std::mem::take(&mut current), true));
                }
            }
            _ => {
                return Err(DecodeError::UnknownCommand { command });
            }
        }
    }

    if !current.is_empty() {
        paths.push((current, false));
    }
    Ok(paths)
}

fn decode_geometry(kind: GeomType, geometry: &[u32]) -> Result<Geometry, DecodeError> {
    let paths = decode_paths(geometry)?;

    match kind {
        GeomType::Point => {
            let points = paths.into_iter().flat_map(|(p, _)| p).collect();
            Ok(Geometry::Points(points))
        }
        GeomType::Linestring => {
            let lines = paths
                .into_iter()
                .map(|(p, _)| p)
                .filter(|p| p.len() >= 2)
                .collect();
            Ok(Geometry::Lines(lines))
        }
        GeomType::Polygon => {
            let mut polygons: Vec<Polygon> = Vec::new();
            for (ring, _) in paths {
                if ring.len() < 3 {
                    continue;
                }
                let area = signed_area2(&ring);
                if area > 0 || polygons.is_empty() {
                    polygons.push(Polygon {
                        exterior: ring,
                        holes: Vec::new(),
                    });
                } else if area < 0 {
                    if let Some(last) = polygons.last_mut() {
                        last.holes.push(ring);
                    }
                }
                // area == 0: degenerate ring, dropped
            }
            Ok(Geometry::Polygons(polygons))
        }
        GeomType::Unknown => Ok(Geometry::Points(Vec::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn cmd(id: u32, count: u32) -> u32 {
        (count << 3) | id
    }

    fn param(v: i32) -> u32 {
        ((v << 1) ^ (v >> 31)) as u32
    }

    #[test]
    fn test_zigzag_decoding() {
        assert_eq!(zigzag(0), 0);
        assert_eq!(zigzag(1), -1);
        assert_eq!(zigzag(2), 1);
        assert_eq!(zigzag(3), -2);
        assert_eq!(zigzag(50), 25);
        assert_eq!(zigzag(34), 17);
    }

    #[test]
    fn test_decode_single_point() {
        let geometry = vec![cmd(CMD_MOVE_TO, 1), param(25), param(17)];
        let decoded = decode_geometry(GeomType::Point, &geometry).unwrap();
        assert_eq!(decoded, Geometry::Points(vec![[25, 17]]));
    }

    #[test]
    fn test_decode_multi_point() {
        let geometry = vec![
            cmd(CMD_MOVE_TO, 2),
            param(5),
            param(7),
            param(3),
            param(2),
        ];
        let decoded = decode_geometry(GeomType::Point, &geometry).unwrap();
        assert_eq!(decoded, Geometry::Points(vec![[5, 7], [8, 9]]));
    }

    #[test]
    fn test_decode_line() {
        // MoveTo(2,2), LineTo(0,8),(8,0)
        let geometry = vec![9, 4, 4, 18, 0, 16, 16, 0];
        let decoded = decode_geometry(GeomType::Linestring, &geometry).unwrap();
        assert_eq!(
            decoded,
            Geometry::Lines(vec![vec![[2, 2], [2, 10], [10, 10]]])
        );
    }

    #[test]
    fn test_decode_multi_line_resets_on_move_to() {
        let geometry = vec![
            cmd(CMD_MOVE_TO, 1),
            param(0),
            param(0),
            cmd(CMD_LINE_TO, 1),
            param(10),
            param(0),
            cmd(CMD_MOVE_TO, 1),
            param(0),
            param(10),
            cmd(CMD_LINE_TO, 1),
            param(10),
            param(0),
        ];
        let decoded = decode_geometry(GeomType::Linestring, &geometry).unwrap();
        assert!(matches!(decoded, Geometry::Lines(ref lines) if lines.len() == 2));
    }

    #[test]
    fn test_decode_polygon_with_hole() {
        // Exterior 0,0 -> 10,0 -> 10,10 -> 0,10 (positive signed area),
        // hole wound the opposite way inside it.
        let geometry = vec![
            cmd(CMD_MOVE_TO, 1),
            param(0),
            param(0),
            cmd(CMD_LINE_TO, 3),
            param(10),
            param(0),
            param(0),
            param(10),
            param(-10),
            param(0),
            cmd(CMD_CLOSE_PATH, 1),
            cmd(CMD_MOVE_TO, 1),
            param(2),
            param(-8),
            cmd(CMD_LINE_TO, 3),
            param(0),
            param(6),
            param(6),
            param(0),
            param(0),
            param(-6),
            cmd(CMD_CLOSE_PATH, 1),
        ];
        let decoded = decode_geometry(GeomType::Polygon, &geometry).unwrap();
        let Geometry::Polygons(polygons) = decoded else {
            panic!("expected polygons");
        };
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].exterior.len(), 4);
        assert_eq!(polygons[0].holes.len(), 1);
        assert_eq!(polygons[0].holes[0].len(), 4);
    }

    #[test]
    fn test_unknown_command_rejected() {
        let geometry = vec![cmd(3, 1), param(0), param(0)];
        let result = decode_geometry(GeomType::Point, &geometry);
        assert!(matches!(
            result,
            Err(DecodeError::UnknownCommand { command: 3 })
        ));
    }

    #[test]
    fn test_truncated_geometry_rejected() {
        let geometry = vec![cmd(CMD_MOVE_TO, 2), param(1), param(1)];
        let result = decode_geometry(GeomType::Point, &geometry);
        assert!(matches!(
            result,
            Err(DecodeError::TruncatedGeometry { missing: 2 })
        ));
    }

    fn sample_tile() -> proto::Tile {
        proto::Tile {
            layers: vec![proto::Layer {
                version: 2,
                name: "bathy_pol".to_string(),
                features: vec![proto::Feature {
                    id: Some(7),
                    tags: vec![0, 0, 1, 1],
                    geom_type: Some(GeomType::Polygon as i32),
                    geometry: vec![
                        cmd(CMD_MOVE_TO, 1),
                        param(0),
                        param(0),
                        cmd(CMD_LINE_TO, 3),
                        param(100),
                        param(0),
                        param(0),
                        param(100),
                        param(-100),
                        param(0),
                        cmd(CMD_CLOSE_PATH, 1),
                    ],
                }],
                keys: vec!["depth_min".to_string(), "depth_max".to_string()],
                values: vec![
                    proto::Value {
                        double_value: Some(-10.0),
                        ..Default::default()
                    },
                    proto::Value {
                        string_value: Some("-5".to_string()),
                        ..Default::default()
                    },
                ],
                extent: None,
            }],
        }
    }

    #[test]
    fn test_decode_full_tile() {
        let bytes = sample_tile().encode_to_vec();
        let tile = decode_tile(&bytes).unwrap();

        let layer = tile.layer("bathy_pol").unwrap();
        assert_eq!(layer.extent, 4096);
        assert_eq!(layer.features.len(), 1);

        let feature = &layer.features[0];
        assert_eq!(feature.id, Some(7));
        assert_eq!(
            feature.properties.get("depth_min"),
            Some(&Value::Double(-10.0))
        );
        assert_eq!(
            feature.properties.get("depth_max"),
            Some(&Value::String("-5".to_string()))
        );
        assert!(matches!(feature.geometry, Geometry::Polygons(_)));
    }

    #[test]
    fn test_decode_gzipped_tile() {
        let bytes = sample_tile().encode_to_vec();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bytes).unwrap();
        let compressed = encoder.finish().unwrap();

        let tile = decode_tile(&compressed).unwrap();
        assert!(tile.layer("bathy_pol").is_some());
    }

    #[test]
    fn test_unsupported_layer_version_rejected() {
        let mut tile = sample_tile();
        tile.layers[0].version = 3;
        let bytes = tile.encode_to_vec();
        assert!(matches!(
            decode_tile(&bytes),
            Err(DecodeError::UnsupportedVersion(3))
        ));
    }

    #[test]
    fn test_tag_index_out_of_range_rejected() {
        let mut tile = sample_tile();
        tile.layers[0].features[0].tags = vec![0, 9];
        let bytes = tile.encode_to_vec();
        assert!(matches!(
            decode_tile(&bytes),
            Err(DecodeError::TagIndex { index: 9, .. })
        ));
    }

    #[test]
    fn test_value_coercion() {
        assert_eq!(Value::Double(-7.5).as_f64(), Some(-7.5));
        assert_eq!(Value::Int(-3).as_f64(), Some(-3.0));
        assert_eq!(Value::Uint(4).as_f64(), Some(4.0));
        assert_eq!(Value::String(" -5.5 ".to_string()).as_f64(), Some(-5.5));
        assert_eq!(Value::String("deep".to_string()).as_f64(), None);
        assert_eq!(Value::Bool(true).as_f64(), Some(1.0));
        assert_eq!(Value::Bool(false).as_f64(), Some(0.0));
    }

    #[test]
    fn test_dangling_tag_ignored() {
        let mut tile = sample_tile();
        tile.layers[0].features[0].tags = vec![0, 0, 1];
        let bytes = tile.encode_to_vec();
        let tile = decode_tile(&bytes).unwrap();
        let feature = &tile.layer("bathy_pol").unwrap().features[0];
        assert_eq!(feature.properties.len(), 1);
    }
}
