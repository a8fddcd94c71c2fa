//! The public engine: node lifecycle, settings and rendering entry points.

use crate::arena::{NodeArena, NodeId};
use crate::context::{Diagnostic, RenderContext};
use crate::geometry;
use crate::node::{
    normalize_rotation, BlendRatio, ChildLink, ImageClass, ImageNode, LeafSource, Payload,
    Placement, RenderStatus, SynthKind,
};
use crate::orchestrator::{Orchestrator, PassSettings, Sources};
use crate::source::{Decoder, ProjectionDef, Reprojector, SourcePixels};
use imagery_common::{ClipRect, EngineConfig, Lut, LutHandle, LutRegistry, SynthError, SynthResult, Viewport};
use renderer::overlay::RangeRings;
use renderer::resample::{inverse_pixel, mask_bit};
use renderer::{output, png, PixelLayout, Raster};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use storage::{CacheStats, RenderCache};

/// Kind of leaf image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeafKind {
    File,
    Grid,
    Radar,
}

/// Everything needed to create a leaf image.
#[derive(Debug, Clone)]
pub struct LeafSpec {
    pub kind: LeafKind,
    pub source_ref: String,
    pub class: ImageClass,
    pub placement: Placement,
    pub lut: Option<LutHandle>,
    pub brightness: Option<f64>,
    pub projection: Option<ProjectionDef>,
    pub range_rings: Option<RangeRings>,
}

impl LeafSpec {
    pub fn new(kind: LeafKind, source_ref: impl Into<String>, placement: Placement) -> Self {
        Self {
            kind,
            source_ref: source_ref.into(),
            class: ImageClass::Unknown,
            placement,
            lut: None,
            brightness: None,
            projection: None,
            range_rings: None,
        }
    }

    pub fn file(source_ref: impl Into<String>, placement: Placement) -> Self {
        Self::new(LeafKind::File, source_ref, placement)
    }

    pub fn grid(source_ref: impl Into<String>, placement: Placement) -> Self {
        Self::new(LeafKind::Grid, source_ref, placement)
    }

    pub fn radar(source_ref: impl Into<String>, placement: Placement) -> Self {
        Self::new(LeafKind::Radar, source_ref, placement)
    }

    pub fn class(mut self, class: ImageClass) -> Self {
        self.class = class;
        self
    }

    pub fn lut(mut self, lut: LutHandle) -> Self {
        self.lut = Some(lut);
        self
    }

    pub fn brightness(mut self, brightness: f64) -> Self {
        self.brightness = Some(brightness);
        self
    }

    pub fn projection(mut self, projection: ProjectionDef) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn range_rings(mut self, rings: RangeRings) -> Self {
        self.range_rings = Some(rings);
        self
    }
}

/// A rendered image positioned in library coordinates (origin bottom-left).
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub data: Vec<u8>,
}

/// Result of a render request. `image` is `None` when nothing is visible.
#[derive(Debug, Clone, Default)]
pub struct RenderOutput {
    pub image: Option<RenderedImage>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Last resolved placement of a node, in library coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeGeometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub status: RenderStatus,
}

/// Image synthesis engine.
///
/// Owns the node tree, the LUT registry and the render cache. Sources are
/// read through the [`Decoder`] given at construction.
pub struct SynthesisEngine {
    config: EngineConfig,
    nodes: NodeArena<ImageNode>,
    luts: LutRegistry,
    cache: RenderCache,
    decoder: Box<dyn Decoder>,
    reprojector: Option<Box<dyn Reprojector>>,
    viewport: Viewport,
    last_clip: Option<ClipRect>,
    target_projection: Option<ProjectionDef>,
    class_brightness: HashMap<ImageClass, f64>,
    shut_down: bool,
}

impl SynthesisEngine {
    /// Create an engine, preparing the scratch directory of the render cache.
    pub fn new(config: EngineConfig, decoder: impl Decoder + 'static) -> SynthResult<Self> {
        config.validate().map_err(SynthError::Config)?;
        let cache = RenderCache::open(
            config.work_directory.clone(),
            config.compression_level,
            config.cache_enabled,
        )?;
        tracing::info!(
            work_dir = %config.work_directory.display(),
            cache_enabled = config.cache_enabled,
            "synthesis engine ready"
        );
        Ok(Self {
            config,
            nodes: NodeArena::new(),
            luts: LutRegistry::new(),
            cache,
            decoder: Box::new(decoder),
            reprojector: None,
            viewport: Viewport::identity(512, 512),
            last_clip: None,
            target_projection: None,
            class_brightness: HashMap::new(),
            shut_down: false,
        })
    }

    pub fn with_reprojector(mut self, reprojector: impl Reprojector + 'static) -> Self {
        self.reprojector = Some(Box::new(reprojector));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Replace the map to window mapping. Geometry is re-resolved on the
    /// next pass, so nothing is invalidated here.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Projection images are displayed in. Leaves with a projection are
    /// decoded again on the next pass.
    pub fn set_target_projection(&mut self, projection: Option<ProjectionDef>) {
        if self.target_projection == projection {
            return;
        }
        self.target_projection = projection;
        self.mark_leaves_dirty(|leaf, _| leaf.projection.is_some());
    }

    pub fn register_lut(&mut self, lut: Lut) -> LutHandle {
        self.luts.register(lut)
    }

    pub fn luts(&self) -> &LutRegistry {
        &self.luts
    }

    pub fn cache_stats(&self) -> &CacheStats {
        self.cache.stats()
    }

    // ========================================================================
    // Node creation
    // ========================================================================

    pub fn create_image(&mut self, spec: LeafSpec) -> SynthResult<NodeId> {
        if let Some(lut) = spec.lut {
            self.luts.get(lut)?;
        }
        if let Some(b) = spec.brightness {
            check_brightness(b)?;
        }
        let mut source = LeafSource::new(spec.source_ref);
        source.lut = spec.lut;
        source.brightness = spec.brightness;
        source.projection = spec.projection;

        let payload = match spec.kind {
            LeafKind::File => Payload::File(source),
            LeafKind::Grid => Payload::Grid(source),
            LeafKind::Radar => Payload::Radar {
                source,
                range_rings: spec.range_rings,
            },
        };
        let mut placement = spec.placement;
        placement.rotation = normalize_rotation(placement.rotation);
        let id = self.nodes.insert(ImageNode::leaf(payload, spec.class, placement));
        tracing::debug!(node = %id, kind = ?spec.kind, class = ?spec.class, "created image");
        Ok(id)
    }

    /// Layer children with Combine.
    pub fn combine(&mut self, children: &[NodeId]) -> SynthResult<NodeId> {
        self.create_synthetic(SynthKind::Combined, children)
    }

    /// Layer children with Blend at the node's blend ratio.
    pub fn blend(&mut self, children: &[NodeId]) -> SynthResult<NodeId> {
        self.create_synthetic(SynthKind::Blended, children)
    }

    /// Layer children by class plane.
    pub fn composite(&mut self, children: &[NodeId]) -> SynthResult<NodeId> {
        self.create_synthetic(SynthKind::Composite, children)
    }

    fn create_synthetic(&mut self, kind: SynthKind, children: &[NodeId]) -> SynthResult<NodeId> {
        let links = self.link_children(None, children)?;
        let placement = geometry::full_map(&self.viewport);
        let id = self
            .nodes
            .insert(ImageNode::synthetic(kind, links.clone(), placement));
        self.adopt(id, &links);
        tracing::debug!(node = %id, kind = ?kind, children = links.len(), "created synthetic image");
        Ok(id)
    }

    /// Replace the children of a synthetic node, keeping its identity.
    pub fn redefine(&mut self, id: NodeId, children: &[NodeId]) -> SynthResult<()> {
        self.node(id)?;
        let links = self.link_children(Some(id), children)?;
        let node = self.node_mut(id)?;
        let data = node.synth_mut_or_invalid(id)?;
        let old = std::mem::replace(&mut data.children, links.clone());
        data.dirty = true;

        for link in old.iter().filter(|l| l.owned) {
            if !links.iter().any(|n| n.id == link.id) {
                if let Some(child) = self.nodes.get_mut(link.id) {
                    child.owner = None;
                }
            }
        }
        self.adopt(id, &links);
        self.cache.purge_token(&id.token());
        tracing::debug!(node = %id, children = links.len(), "redefined synthetic image");
        Ok(())
    }

    /// Validate a child list. Synthetic children are owned and may only have
    /// one parent; leaves are borrowed and may be shared.
    fn link_children(&self, parent: Option<NodeId>, children: &[NodeId]) -> SynthResult<Vec<ChildLink>> {
        if children.is_empty() {
            return Err(SynthError::invalid_parameter("children", "at least one child is required"));
        }
        let mut seen = HashSet::new();
        let mut links = Vec::with_capacity(children.len());
        for &child in children {
            let node = self.node(child)?;
            if Some(child) == parent {
                return Err(SynthError::invalid_parameter(
                    "children",
                    format!("{} cannot contain itself", child),
                ));
            }
            let owned = node.is_synthetic();
            if owned {
                if !seen.insert(child) {
                    return Err(SynthError::invalid_parameter(
                        "children",
                        format!("{} listed twice", child),
                    ));
                }
                if node.owner.is_some() && node.owner != parent {
                    return Err(SynthError::invalid_parameter(
                        "children",
                        format!("{} already belongs to another image", child),
                    ));
                }
                if let Some(p) = parent {
                    if self.is_ancestor(child, p) {
                        return Err(SynthError::invalid_parameter(
                            "children",
                            format!("{} is an ancestor of {}", child, p),
                        ));
                    }
                }
            }
            links.push(ChildLink { id: child, owned });
        }
        Ok(links)
    }

    /// True when `candidate` is `id` or owns it, directly or transitively.
    fn is_ancestor(&self, candidate: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(n) = current {
            if n == candidate {
                return true;
            }
            current = self.nodes.get(n).and_then(|node| node.owner);
        }
        false
    }

    fn adopt(&mut self, parent: NodeId, links: &[ChildLink]) {
        for link in links.iter().filter(|l| l.owned) {
            if let Some(child) = self.nodes.get_mut(link.id) {
                child.owner = Some(parent);
            }
        }
    }

    /// Destroy a node. Owned children go with it; borrowed leaves are only
    /// detached. Every cache artifact naming a destroyed node is purged.
    pub fn destroy(&mut self, id: NodeId) -> SynthResult<()> {
        self.node(id)?;
        let parents: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.children().iter().any(|c| c.id == id))
            .map(|(p, _)| p)
            .collect();
        for parent in parents {
            if let Some(data) = self.nodes.get_mut(parent).and_then(|n| n.payload.synth_mut()) {
                data.children.retain(|c| c.id != id);
                data.dirty = true;
            }
            self.cache.purge_token(&parent.token());
        }
        self.destroy_subtree(id);
        Ok(())
    }

    fn destroy_subtree(&mut self, id: NodeId) {
        let Some(node) = self.nodes.remove(id) else {
            return;
        };
        let purged = self.cache.purge_token(&id.token());
        tracing::debug!(node = %id, purged, "destroyed image");
        for link in node.children().iter().filter(|l| l.owned) {
            self.destroy_subtree(link.id);
        }
    }

    // ========================================================================
    // Node settings
    // ========================================================================

    pub fn node(&self, id: NodeId) -> SynthResult<&ImageNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| SynthError::InvalidNode(format!("{} does not exist", id)))
    }

    fn node_mut(&mut self, id: NodeId) -> SynthResult<&mut ImageNode> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| SynthError::InvalidNode(format!("{} does not exist", id)))
    }

    fn leaf_mut(&mut self, id: NodeId) -> SynthResult<&mut LeafSource> {
        self.node_mut(id)?.leaf_mut_or_invalid(id)
    }

    /// Set the blend percentage. Out of range values are clamped and applied,
    /// then reported as `InvalidParameter`.
    pub fn set_blend_ratio(&mut self, id: NodeId, percent: i32) -> SynthResult<()> {
        let data = self.node_mut(id)?.synth_mut_or_invalid(id)?;
        let (ratio, err) = BlendRatio::clamped(percent, data.blend.enabled());
        if ratio != data.blend {
            data.blend = ratio;
            data.dirty = true;
        }
        match err {
            Some(e) => {
                tracing::warn!(node = %id, percent, "blend ratio clamped");
                Err(e)
            }
            None => Ok(()),
        }
    }

    pub fn set_blend_state(&mut self, id: NodeId, enabled: bool) -> SynthResult<()> {
        let data = self.node_mut(id)?.synth_mut_or_invalid(id)?;
        let (ratio, _) = BlendRatio::clamped(data.blend.percent() as i32, enabled);
        if ratio != data.blend {
            data.blend = ratio;
            data.dirty = true;
        }
        Ok(())
    }

    pub fn blend_ratio(&self, id: NodeId) -> SynthResult<BlendRatio> {
        self.node(id)?
            .payload
            .synth()
            .map(|d| d.blend)
            .ok_or_else(|| SynthError::InvalidNode(format!("{} is not a synthetic image", id)))
    }

    /// Assign a LUT, or `None` to fall back to the source's native palette.
    pub fn set_lut(&mut self, id: NodeId, lut: Option<LutHandle>) -> SynthResult<()> {
        if let Some(h) = lut {
            self.luts.get(h)?;
        }
        let leaf = self.leaf_mut(id)?;
        if leaf.lut != lut {
            leaf.lut = lut;
            leaf.dirty = true;
        }
        Ok(())
    }

    /// Per image brightness; `None` falls back to the class, then the engine.
    pub fn set_brightness(&mut self, id: NodeId, brightness: Option<f64>) -> SynthResult<()> {
        if let Some(b) = brightness {
            check_brightness(b)?;
        }
        let leaf = self.leaf_mut(id)?;
        if leaf.brightness != brightness {
            leaf.brightness = brightness;
            leaf.dirty = true;
        }
        Ok(())
    }

    pub fn set_class_brightness(&mut self, class: ImageClass, brightness: Option<f64>) -> SynthResult<()> {
        match brightness {
            Some(b) => {
                check_brightness(b)?;
                self.class_brightness.insert(class, b);
            }
            None => {
                self.class_brightness.remove(&class);
            }
        }
        self.mark_leaves_dirty(|leaf, c| c == class && leaf.brightness.is_none());
        Ok(())
    }

    pub fn set_default_brightness(&mut self, brightness: f64) -> SynthResult<()> {
        check_brightness(brightness)?;
        if self.config.brightness != brightness {
            self.config.brightness = brightness;
            self.mark_leaves_dirty(|leaf, _| leaf.brightness.is_none());
        }
        Ok(())
    }

    pub fn set_greyscale(&mut self, greyscale: bool) {
        if self.config.force_greyscale != greyscale {
            self.config.force_greyscale = greyscale;
            self.mark_leaves_dirty(|_, _| true);
        }
    }

    /// Change the class of a node. Parents regroup their planes.
    pub fn set_class(&mut self, id: NodeId, class: ImageClass) -> SynthResult<()> {
        let node = self.node_mut(id)?;
        if node.class == class {
            return Ok(());
        }
        node.class = class;
        if let Some(leaf) = node.payload.leaf_mut() {
            leaf.dirty = true;
        }
        self.mark_parents_dirty(id);
        Ok(())
    }

    pub fn set_placement(&mut self, id: NodeId, placement: Placement) -> SynthResult<()> {
        let node = self.node_mut(id)?;
        let mut placement = placement;
        placement.rotation = if node.is_synthetic() {
            0.0
        } else {
            normalize_rotation(placement.rotation)
        };
        node.placement = placement;
        node.placed = true;
        Ok(())
    }

    /// Rotate a leaf about map point `(rx, ry)`.
    pub fn set_rotation(&mut self, id: NodeId, angle: f64, rx: f64, ry: f64) -> SynthResult<()> {
        let node = self.node_mut(id)?;
        node.leaf_mut_or_invalid(id)?;
        node.placement = node.placement.with_rotation(angle, rx, ry);
        Ok(())
    }

    /// Point a leaf at a new source, or mark the current one as changed.
    pub fn set_source(&mut self, id: NodeId, source_ref: impl Into<String>) -> SynthResult<()> {
        let leaf = self.leaf_mut(id)?;
        leaf.source_ref = source_ref.into();
        leaf.dims = None;
        leaf.dirty = true;
        tracing::debug!(node = %id, source = %leaf.source_ref, "source changed");
        Ok(())
    }

    pub fn set_range_rings(&mut self, id: NodeId, rings: Option<RangeRings>) -> SynthResult<()> {
        match &mut self.node_mut(id)?.payload {
            Payload::Radar {
                source,
                range_rings,
            } => {
                if *range_rings != rings {
                    *range_rings = rings;
                    source.dirty = true;
                }
                Ok(())
            }
            _ => Err(SynthError::InvalidNode(format!("{} is not a radar image", id))),
        }
    }

    fn mark_leaves_dirty(&mut self, pred: impl Fn(&LeafSource, ImageClass) -> bool) {
        for id in self.nodes.ids() {
            if let Some(node) = self.nodes.get_mut(id) {
                let class = node.class;
                if let Some(leaf) = node.payload.leaf_mut() {
                    if pred(leaf, class) {
                        leaf.dirty = true;
                    }
                }
            }
        }
    }

    fn mark_parents_dirty(&mut self, id: NodeId) {
        for parent in self.nodes.ids() {
            if let Some(data) = self.nodes.get_mut(parent).and_then(|n| n.payload.synth_mut()) {
                if data.children.iter().any(|c| c.id == id) {
                    data.dirty = true;
                }
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn status(&self, id: NodeId) -> SynthResult<RenderStatus> {
        Ok(self.node(id)?.status)
    }

    pub fn geometry(&self, id: NodeId) -> SynthResult<Option<NodeGeometry>> {
        let node = self.node(id)?;
        let height = self.viewport.window_height;
        Ok(node.geometry.map(|g| NodeGeometry {
            x: g.dest.x,
            y: g.dest.library_y(height),
            width: g.dest.width,
            height: g.dest.height,
            status: node.status,
        }))
    }

    pub fn is_data_image(&self, id: NodeId) -> SynthResult<bool> {
        Ok(self.node(id)?.payload.is_data_valued())
    }

    /// Data value under library window pixel `(x, y)`.
    pub fn sample_value(&self, id: NodeId, x: i32, y: i32) -> SynthResult<Option<f64>> {
        Ok(self.sample_values(id, &[(x, y)])?.pop().flatten())
    }

    /// Data values under several pixels, decoding the source once.
    pub fn sample_values(&self, id: NodeId, points: &[(i32, i32)]) -> SynthResult<Vec<Option<f64>>> {
        let node = self.node(id)?;
        let none = || vec![None; points.len()];
        if !node.payload.is_data_valued() {
            return Ok(none());
        }
        let Some(leaf) = node.payload.leaf() else {
            return Ok(none());
        };

        let mut ctx = RenderContext::new();
        let (image, hint) =
            self.sources()
                .prepare(id, &leaf.source_ref, leaf.projection.as_ref(), &mut ctx)?;
        let mut placement = node.placement;
        if let Some(h) = hint {
            placement.x = h.origin_x;
            placement.y = h.origin_y;
            placement.width = h.width;
            placement.height = h.height;
        }
        let clip = self.last_clip.unwrap_or_else(|| self.viewport.full_clip());
        let res = geometry::resolve(&placement, image.width, image.height, true, &self.viewport, &clip);
        if res.degenerate {
            return Ok(none());
        }
        let Some(inv) = res.geometry.affine.invert() else {
            return Ok(none());
        };
        let dest = res.geometry.dest;
        let top = self.viewport.window_height as i32 - 1;
        let polar = image.polar_grid();

        let values = points
            .iter()
            .map(|&(x, y)| {
                let wy = top - y;
                if !dest.contains(x, wy) {
                    return None;
                }
                let (rx, ry) = (x - dest.x, wy - dest.y);
                if let Some(polar) = &polar {
                    let (fx, fy) = inv.apply(rx as f64 + 0.5, ry as f64 + 0.5);
                    return polar.value_at(fx, fy);
                }
                let (sx, sy) = inverse_pixel(&inv, rx, ry, image.width, image.height)?;
                let pos = sy * image.width + sx;
                if let Some(mask) = &image.mask {
                    if !mask_bit(mask, pos) {
                        return None;
                    }
                }
                match &image.pixels {
                    SourcePixels::Coded { data, codec } => codec.decode(data, pos),
                    SourcePixels::Indexed { data, .. } => data.get(pos).map(|v| *v as f64),
                    _ => None,
                }
            })
            .collect();
        Ok(values)
    }

    fn sources(&self) -> Sources<'_> {
        Sources {
            decoder: self.decoder.as_ref(),
            reprojector: self.reprojector.as_deref(),
            target_projection: self.target_projection.as_ref(),
        }
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Render `id` over the whole window.
    pub fn render(&mut self, id: NodeId, layout: PixelLayout) -> SynthResult<RenderOutput> {
        let clip = self.viewport.full_clip();
        self.render_to_raster(id, clip, layout)
    }

    /// Render `id` inside `clip` and convert it to `layout`.
    pub fn render_to_raster(&mut self, id: NodeId, clip: ClipRect, layout: PixelLayout) -> SynthResult<RenderOutput> {
        let (raster, diagnostics) = self.render_raster(id, clip)?;
        let height = self.viewport.window_height;
        let image = raster.map(|r| {
            let rect = r.rect();
            RenderedImage {
                x: rect.x,
                y: rect.library_y(height),
                width: rect.width,
                height: rect.height,
                layout,
                data: output::to_layout(&r, layout),
            }
        });
        Ok(RenderOutput { image, diagnostics })
    }

    /// Run a composition pass and return the internal raster.
    pub fn render_raster(&mut self, id: NodeId, clip: ClipRect) -> SynthResult<(Option<Raster>, Vec<Diagnostic>)> {
        self.node(id)?;
        self.last_clip = Some(clip);
        let settings = PassSettings {
            viewport: self.viewport,
            clip,
            brightness: self.config.brightness,
            class_brightness: &self.class_brightness,
            greyscale: self.config.force_greyscale,
            max_raster_pixels: self.config.max_raster_pixels,
        };
        let sources = Sources {
            decoder: self.decoder.as_ref(),
            reprojector: self.reprojector.as_deref(),
            target_projection: self.target_projection.as_ref(),
        };
        let orchestrator = Orchestrator::new(&mut self.nodes, &self.luts, &mut self.cache, sources, settings);
        let (raster, ctx) = orchestrator.run(id);
        Ok((raster, ctx.into_diagnostics()))
    }

    /// Render over the whole window and encode as PNG.
    pub fn to_png(&mut self, id: NodeId) -> SynthResult<Option<Vec<u8>>> {
        let clip = self.viewport.full_clip();
        let (raster, _) = self.render_raster(id, clip)?;
        raster
            .map(|r| png::encode_raster(&r, self.config.compression_level.max(1)))
            .transpose()
    }

    /// Remove this process's scratch files. Also run on drop.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        if self.config.purge_on_shutdown {
            let removed = self.cache.purge_all();
            tracing::info!(removed, "synthesis engine shut down");
        }
    }
}

impl Drop for SynthesisEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn check_brightness(b: f64) -> SynthResult<()> {
    if b.is_finite() && b >= 0.0 {
        Ok(())
    } else {
        Err(SynthError::invalid_parameter("brightness", format!("{} is not a valid factor", b)))
    }
}
