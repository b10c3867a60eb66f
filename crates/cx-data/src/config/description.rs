//! Dataset description ingested by the registry and view factory

use std::collections::HashMap;

use cx_core::{DatasetError, FilterMode, Result, SourceInfo, SourceKind};
use glam::Mat4;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Top-level dataset description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetDescription {
    /// Source descriptors keyed by registry name
    pub data: IndexMap<String, SourceDescriptor>,

    /// Views to construct, in display order
    #[serde(default)]
    pub views: Vec<ViewDescriptor>,

    /// Frame URLs keyed by source name
    #[serde(default)]
    pub images: HashMap<String, Vec<String>>,
}

impl DatasetDescription {
    /// Parse a description from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| DatasetError::config(format!("invalid dataset description: {}", e)))
    }

    /// URLs listed for a source name
    pub fn urls(&self, name: &str) -> &[String] {
        self.images.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A source entry, tagged with its declared kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceDescriptor {
    Volume(VolumeDescriptor),
    Surface(SurfaceDescriptor),
}

impl SourceDescriptor {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceDescriptor::Volume(_) => SourceKind::Volume,
            SourceDescriptor::Surface(_) => SourceKind::Surface,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SourceDescriptor::Volume(v) => &v.name,
            SourceDescriptor::Surface(s) => &s.name,
        }
    }
}

/// Mosaic-atlas volume
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeDescriptor {
    pub name: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub raw: bool,
    #[serde(default)]
    pub min: f32,
    #[serde(default)]
    pub max: f32,
    /// Atlas grid as `[cols, rows]`
    pub mosaic: [u32; 2],
    /// Tile shape until the first image arrives
    #[serde(default)]
    pub shape: Option<[u32; 2]>,
}

impl VolumeDescriptor {
    pub fn info(&self, frame_count: usize) -> SourceInfo {
        SourceInfo {
            name: self.name.clone(),
            subject: self.subject.clone(),
            raw: self.raw,
            min: self.min,
            max: self.max,
            frame_count,
        }
    }
}

/// Per-vertex time series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceDescriptor {
    pub name: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub raw: bool,
    #[serde(default)]
    pub min: f32,
    #[serde(default)]
    pub max: f32,
    /// First element of the right hemisphere
    pub split: usize,
    pub frames: usize,
}

impl SurfaceDescriptor {
    pub fn info(&self) -> SourceInfo {
        SourceInfo {
            name: self.name.clone(),
            subject: self.subject.clone(),
            raw: self.raw,
            min: self.min,
            max: self.max,
            frame_count: self.frames,
        }
    }
}

/// One entry of a view's `data` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotRef {
    Single(String),
    Pair([String; 2]),
}

impl SlotRef {
    pub fn names(&self) -> Vec<&str> {
        match self {
            SlotRef::Single(name) => vec![name.as_str()],
            SlotRef::Pair([a, b]) => vec![a.as_str(), b.as_str()],
        }
    }
}

/// Playback attributes of a view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewAttrs {
    #[serde(default = "default_rate")]
    pub rate: f64,
    #[serde(default)]
    pub delay: f64,
    #[serde(default)]
    pub filter: FilterMode,
    #[serde(default)]
    pub stim: Option<String>,
}

fn default_rate() -> f64 {
    1.0
}

impl Default for ViewAttrs {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            delay: 0.0,
            filter: FilterMode::default(),
            stim: None,
        }
    }
}

/// A range bound, either a scalar or a dual-range pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RangeValue {
    Scalar(f32),
    Pair([f32; 2]),
}

impl RangeValue {
    /// Component form; a scalar fills component 0
    pub fn as_pair(&self) -> [f32; 2] {
        match *self {
            RangeValue::Scalar(v) => [v, 0.0],
            RangeValue::Pair(pair) => pair,
        }
    }
}

/// A row-major 4x4 transform, shared or given per slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformValue {
    Single([f32; 16]),
    PerSlot(Vec<[f32; 16]>),
}

/// Convert a row-major 16-array into a matrix
pub fn row_major_to_mat4(values: &[f32; 16]) -> Mat4 {
    Mat4::from_cols_array(values).transpose()
}

impl TransformValue {
    /// Transform applied to `slot`; identity when none is given
    pub fn for_slot(&self, slot: usize) -> Mat4 {
        match self {
            TransformValue::Single(values) => row_major_to_mat4(values),
            TransformValue::PerSlot(list) => list
                .get(slot)
                .map(row_major_to_mat4)
                .unwrap_or(Mat4::IDENTITY),
        }
    }
}

/// A view entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewDescriptor {
    pub data: Vec<SlotRef>,
    pub name: String,
    #[serde(default, alias = "description")]
    pub desc: String,
    #[serde(default)]
    pub attrs: ViewAttrs,
    #[serde(default)]
    pub cmap: Vec<String>,
    #[serde(default)]
    pub vmin: Vec<RangeValue>,
    #[serde(default)]
    pub vmax: Vec<RangeValue>,
    #[serde(default)]
    pub state: Option<serde_json::Value>,
    #[serde(default)]
    pub xfm: Vec<TransformValue>,
}

impl ViewDescriptor {
    /// Source names bound to the view's slots, in slot order
    pub fn slot_names(&self) -> Vec<&str> {
        self.data.iter().flat_map(SlotRef::names).collect()
    }

    /// Colormap for `slot`, falling back to the last listed entry
    pub fn colormap_for(&self, slot: usize) -> Option<&str> {
        self.cmap.get(slot).or(self.cmap.last()).map(String::as_str)
    }

    /// `(vmin, vmax)` for `slot`, falling back to the last listed entries
    pub fn range_for(&self, slot: usize) -> ([f32; 2], [f32; 2]) {
        let pick = |list: &[RangeValue]| {
            list.get(slot)
                .or(list.last())
                .map(RangeValue::as_pair)
                .unwrap_or([0.0, 0.0])
        };
        (pick(&self.vmin), pick(&self.vmax))
    }

    /// Transform for `slot`
    pub fn transform_for(&self, slot: usize) -> Mat4 {
        self.xfm
            .first()
            .map(|xfm| xfm.for_slot(slot))
            .unwrap_or(Mat4::IDENTITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTION: &str = r#"{
        "data": {
            "anat": {"kind": "volume", "name": "anat", "subject": "S1", "mosaic": [6, 6], "min": 0, "max": 1},
            "ret": {"kind": "surface", "name": "ret", "split": 4, "frames": 3, "raw": true}
        },
        "views": [
            {"data": ["anat"], "name": "Anatomy", "desc": "T1", "attrs": {"rate": 2, "filter": "trilinear"},
             "cmap": ["gray"], "vmin": [0], "vmax": [[1, 2]],
             "xfm": [[1,0,0,5, 0,1,0,6, 0,0,1,7, 0,0,0,1]]},
            {"data": [["anat", "ret"]], "name": "Pair", "attrs": {}}
        ],
        "images": {"anat": ["a0.png", "a1.png"], "ret": ["ret.npy"]}
    }"#;

    #[test]
    fn test_parse_description() {
        let desc = DatasetDescription::from_json(DESCRIPTION).unwrap();
        assert_eq!(desc.data.len(), 2);
        assert_eq!(desc.data["anat"].kind(), SourceKind::Volume);
        assert_eq!(desc.data["ret"].kind(), SourceKind::Surface);
        assert_eq!(desc.urls("anat").len(), 2);
        assert!(desc.urls("missing").is_empty());

        let view = &desc.views[0];
        assert_eq!(view.attrs.rate, 2.0);
        assert_eq!(view.attrs.delay, 0.0);
        assert_eq!(view.attrs.filter, FilterMode::Trilinear);
        assert_eq!(view.range_for(0), ([0.0, 0.0], [1.0, 2.0]));
        assert_eq!(view.colormap_for(0), Some("gray"));
    }

    #[test]
    fn test_pair_slot_refs_flatten() {
        let desc = DatasetDescription::from_json(DESCRIPTION).unwrap();
        assert_eq!(desc.views[1].slot_names(), vec!["anat", "ret"]);
        assert_eq!(desc.views[1].attrs, ViewAttrs::default());
    }

    #[test]
    fn test_row_major_transform() {
        let desc = DatasetDescription::from_json(DESCRIPTION).unwrap();
        let xfm = desc.views[0].transform_for(1);
        let moved = xfm.transform_point3(glam::Vec3::ZERO);
        assert_eq!(moved, glam::Vec3::new(5.0, 6.0, 7.0));
    }

    #[test]
    fn test_missing_kind_is_rejected() {
        let json = r#"{"data": {"x": {"name": "x", "mosaic": [1, 1]}}}"#;
        assert!(matches!(
            DatasetDescription::from_json(json),
            Err(DatasetError::Configuration(_))
        ));
    }
}
