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

//! Wire types for the Mapbox Vector Tile format, version 2.1.
//!
//! These mirror `vector_tile.proto` and are committed directly instead of
//! being generated at build time, so no protoc installation is required.

/// A complete vector tile. The container for one or more named layers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Tile {
    #[prost(message, repeated, tag = "3")]
    pub layers: Vec<Layer>,
}

/// A named layer with its own coordinate extent and key/value tables.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Layer {
    /// Any compliant decoder must reject tiles with a version it does not
    /// understand; v1 and v2 share this layout.
    #[prost(uint32, tag = "15")]
    pub version: u32,

    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(message, repeated, tag = "2")]
    pub features: Vec<Feature>,

    /// Shared property keys, referenced by even-positioned feature tags.
    #[prost(string, repeated, tag = "3")]
    pub keys: Vec<String>,

    /// Shared property values, referenced by odd-positioned feature tags.
    #[prost(message, repeated, tag = "4")]
    pub values: Vec<Value>,

    /// Width and height of the tile coordinate system.
    #[prost(uint32, optional, tag = "5", default = 4096)]
    pub extent: Option<u32>,
}

/// One feature: a geometry command stream plus tag pairs into the layer's
/// key/value tables.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Feature {
    #[prost(uint64, optional, tag = "1")]
    pub id: Option<u64>,

    /// Alternating key-index / value-index pairs.
    #[prost(uint32, repeated, tag = "2")]
    pub tags: Vec<u32>,

    #[prost(enumeration = "GeomType", optional, tag = "3", default = "Unknown")]
    pub geom_type: Option<i32>,

    /// Zig-zag encoded geometry command stream.
    #[prost(uint32, repeated, tag = "4")]
    pub geometry: Vec<u32>,
}

/// Typed property value. Exactly one field is set per value.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Value {
    #[prost(string, optional, tag = "1")]
    pub string_value: Option<String>,

    #[prost(float, optional, tag = "2")]
    pub float_value: Option<f32>,

    #[prost(double, optional, tag = "3")]
    pub double_value: Option<f64>,

    #[prost(int64, optional, tag = "4")]
    pub int_value: Option<i64>,

    #[prost(uint64, optional, tag = "5")]
    pub uint_value: Option<u64>,

    #[prost(sint64, optional, tag = "6")]
    pub sint_value: Option<i64>,

    #[prost(bool, optional, tag = "7")]
    pub bool_value: Option<bool>,
}

/// Geometry kind of a feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum GeomType {
    Unknown = 0,
    Point = 1,
    Linestring = 2,
    Polygon = 3,
}
