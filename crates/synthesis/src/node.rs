//! The image node model.
//!
//! Every node shares placement, class and render state. What differs lives
//! in a tagged [`Payload`]: leaves carry a source reference, synthetic nodes
//! carry child links.

use crate::arena::NodeId;
use crate::source::ProjectionDef;
use imagery_common::{Affine, LutHandle, Rect, SynthError, SynthResult};
use renderer::overlay::RangeRings;
use serde::{Deserialize, Serialize};

/// Render status of a node during and between passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderStatus {
    /// Outside the clip, collapsed, or excluded by a failure.
    NotVisible,
    /// Must be rendered from source.
    Generate,
    /// Freshly composed in memory, not yet persisted.
    Exists,
    /// A cache artifact matches the current geometry.
    OnDisk,
}

impl RenderStatus {
    pub fn is_visible(self) -> bool {
        self != RenderStatus::NotVisible
    }
}

/// Semantic class of an image. Selects the composite plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ImageClass {
    #[default]
    Unknown,
    Geographic,
    Underlay,
    Satellite,
    Radar,
    Overlay,
}

/// Composite planes in back to front order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Plane {
    Geographic,
    Underlay,
    Satellite,
    Radar,
    Overlay,
}

impl ImageClass {
    pub fn plane(self) -> Plane {
        match self {
            ImageClass::Underlay => Plane::Underlay,
            ImageClass::Satellite => Plane::Satellite,
            ImageClass::Radar => Plane::Radar,
            ImageClass::Overlay => Plane::Overlay,
            ImageClass::Unknown | ImageClass::Geographic => Plane::Geographic,
        }
    }
}

/// Kind of synthetic node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SynthKind {
    Combined,
    Blended,
    Composite,
}

/// Where an image sits on the map, in map units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Degrees, normalised to [-180, 180].
    pub rotation: f64,
    pub rotation_x: f64,
    pub rotation_y: f64,
    /// Stretch to the extent instead of keeping the source aspect ratio.
    pub adjust_aspect: bool,
}

impl Placement {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            rotation: 0.0,
            rotation_x: x,
            rotation_y: y,
            adjust_aspect: false,
        }
    }

    /// Rotate about map point `(rx, ry)`.
    pub fn with_rotation(mut self, angle: f64, rx: f64, ry: f64) -> Self {
        self.rotation = normalize_rotation(angle);
        self.rotation_x = rx;
        self.rotation_y = ry;
        self
    }

    pub fn with_adjust_aspect(mut self, adjust: bool) -> Self {
        self.adjust_aspect = adjust;
        self
    }
}

/// Fold an angle into [-180, 180]; tiny angles become 0.
pub fn normalize_rotation(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    let mut a = angle % 360.0;
    if a > 180.0 {
        a -= 360.0;
    } else if a < -180.0 {
        a += 360.0;
    }
    if a.abs() < 1e-4 {
        0.0
    } else {
        a
    }
}

/// Blend setting of Blended and Composite nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlendRatio {
    percent: u8,
    enabled: bool,
}

impl Default for BlendRatio {
    fn default() -> Self {
        Self {
            percent: 100,
            enabled: true,
        }
    }
}

impl BlendRatio {
    /// Clamp `percent` into 0..=100. Out of range input is reported along
    /// with the clamped ratio, which callers still apply.
    pub fn clamped(percent: i32, enabled: bool) -> (Self, Option<SynthError>) {
        let clamped = percent.clamp(0, 100);
        let err = (clamped != percent).then(|| {
            SynthError::invalid_parameter(
                "blend_ratio",
                format!("{} is outside 0..=100, using {}", percent, clamped),
            )
        });
        (
            Self {
                percent: clamped as u8,
                enabled,
            },
            err,
        )
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Blending has an effect only when enabled and below 100 percent.
    pub fn is_active(&self) -> bool {
        self.enabled && self.percent < 100
    }
}

/// Link from a synthetic node to a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildLink {
    pub id: NodeId,
    /// Owned children are destroyed with the parent; leaves are borrowed.
    pub owned: bool,
}

/// Fields shared by every leaf kind.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafSource {
    pub source_ref: String,
    /// Assigned LUT, overriding the source's native palette.
    pub lut: Option<LutHandle>,
    pub brightness: Option<f64>,
    pub projection: Option<ProjectionDef>,
    /// Source pixel dimensions once known.
    pub(crate) dims: Option<(usize, usize)>,
    /// The source or a color setting changed since the last pass.
    pub(crate) dirty: bool,
}

impl LeafSource {
    pub fn new(source_ref: impl Into<String>) -> Self {
        Self {
            source_ref: source_ref.into(),
            lut: None,
            brightness: None,
            projection: None,
            dims: None,
            dirty: true,
        }
    }

    pub fn dims(&self) -> Option<(usize, usize)> {
        self.dims
    }
}

/// Children and blend state of a synthetic node.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthData {
    pub kind: SynthKind,
    pub children: Vec<ChildLink>,
    pub blend: BlendRatio,
    pub(crate) dirty: bool,
}

/// Kind specific node data.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Ordinary raster: RGB or paletted.
    File(LeafSource),
    /// Data valued raster sampled through a value LUT.
    Grid(LeafSource),
    /// Radar image, polar or gridded.
    Radar {
        source: LeafSource,
        range_rings: Option<RangeRings>,
    },
    Synth(SynthData),
}

impl Payload {
    pub fn leaf(&self) -> Option<&LeafSource> {
        match self {
            Payload::File(s) | Payload::Grid(s) => Some(s),
            Payload::Radar { source, .. } => Some(source),
            Payload::Synth(_) => None,
        }
    }

    pub fn leaf_mut(&mut self) -> Option<&mut LeafSource> {
        match self {
            Payload::File(s) | Payload::Grid(s) => Some(s),
            Payload::Radar { source, .. } => Some(source),
            Payload::Synth(_) => None,
        }
    }

    pub fn synth(&self) -> Option<&SynthData> {
        match self {
            Payload::Synth(d) => Some(d),
            _ => None,
        }
    }

    pub fn synth_mut(&mut self) -> Option<&mut SynthData> {
        match self {
            Payload::Synth(d) => Some(d),
            _ => None,
        }
    }

    /// Leaves whose pixels carry physical values.
    pub fn is_data_valued(&self) -> bool {
        matches!(self, Payload::Grid(_) | Payload::Radar { .. })
    }
}

/// Last resolved placement in the window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedGeometry {
    /// Destination rectangle in window pixels, clipped.
    pub dest: Rect,
    /// Forward transform from source pixels to destination pixels.
    pub affine: Affine,
    pub scale_x: f64,
    pub scale_y: f64,
}

/// A node of the composition tree.
#[derive(Debug, Clone)]
pub struct ImageNode {
    pub payload: Payload,
    pub class: ImageClass,
    pub placement: Placement,
    pub status: RenderStatus,
    pub geometry: Option<ResolvedGeometry>,
    /// Synthetic node that owns this one.
    pub(crate) owner: Option<NodeId>,
    /// Set when the placement was explicitly assigned to a synthetic node.
    pub(crate) placed: bool,
}

impl ImageNode {
    pub fn leaf(payload: Payload, class: ImageClass, placement: Placement) -> Self {
        Self {
            payload,
            class,
            placement,
            status: RenderStatus::NotVisible,
            geometry: None,
            owner: None,
            placed: true,
        }
    }

    pub fn synthetic(kind: SynthKind, children: Vec<ChildLink>, placement: Placement) -> Self {
        Self {
            payload: Payload::Synth(SynthData {
                kind,
                children,
                blend: BlendRatio::default(),
                dirty: true,
            }),
            class: ImageClass::Unknown,
            placement,
            status: RenderStatus::NotVisible,
            geometry: None,
            owner: None,
            placed: false,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self.payload, Payload::Synth(_))
    }

    pub fn children(&self) -> &[ChildLink] {
        match &self.payload {
            Payload::Synth(d) => &d.children,
            _ => &[],
        }
    }

    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    pub(crate) fn synth_mut_or_invalid(&mut self, id: NodeId) -> SynthResult<&mut SynthData> {
        self.payload
            .synth_mut()
            .ok_or_else(|| SynthError::InvalidNode(format!("{} is not a synthetic image", id)))
    }

    pub(crate) fn leaf_mut_or_invalid(&mut self, id: NodeId) -> SynthResult<&mut LeafSource> {
        self.payload
            .leaf_mut()
            .ok_or_else(|| SynthError::InvalidNode(format!("{} is not a leaf image", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_normalisation() {
        assert_eq!(normalize_rotation(0.00001), 0.0);
        assert_eq!(normalize_rotation(270.0), -90.0);
        assert_eq!(normalize_rotation(-270.0), 90.0);
        assert_eq!(normalize_rotation(180.0), 180.0);
        assert_eq!(normalize_rotation(540.0), 180.0);
        assert_eq!(normalize_rotation(f64::NAN), 0.0);
    }

    #[test]
    fn test_blend_ratio_clamps_and_reports() {
        let (r, err) = BlendRatio::clamped(150, true);
        assert_eq!(r.percent(), 100);
        assert!(!r.is_active());
        assert_eq!(err.unwrap().code(), "InvalidParameter");

        let (r, err) = BlendRatio::clamped(-5, true);
        assert_eq!(r.percent(), 0);
        assert!(r.is_active());
        assert!(err.is_some());

        let (r, err) = BlendRatio::clamped(40, false);
        assert!(err.is_none());
        assert!(!r.is_active());
    }

    #[test]
    fn test_default_blend_is_inactive() {
        assert!(!BlendRatio::default().is_active());
    }

    #[test]
    fn test_class_planes() {
        assert_eq!(ImageClass::Unknown.plane(), Plane::Geographic);
        assert_eq!(ImageClass::Radar.plane(), Plane::Radar);
        assert!(Plane::Underlay < Plane::Satellite && Plane::Radar < Plane::Overlay);
    }

    #[test]
    fn test_leaf_accessors() {
        let p = Payload::Radar {
            source: LeafSource::new("radar.bin"),
            range_rings: None,
        };
        assert!(p.is_data_valued());
        assert_eq!(p.leaf().unwrap().source_ref, "radar.bin");
        assert!(p.synth().is_none());
        assert!(!Payload::File(LeafSource::new("a")).is_data_valued());
    }
}
