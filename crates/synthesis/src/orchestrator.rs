//! The composition pass.
//!
//! A pass runs in two phases over the tree below the requested node:
//!
//! 1. **Scan** (children first): decode sources whose dimensions are unknown
//!    or stale, resolve geometry, assign each node a [`RenderStatus`] and a
//!    changed flag. Every changed node purges the cache artifacts naming it,
//!    which takes its ancestors' artifacts with it.
//! 2. **Create**: produce rasters on demand. Unchanged nodes try the disk
//!    cache first; everything else is rendered from source or composed from
//!    its children and stored again.
//!
//! A failing node is reported to the [`RenderContext`] and left out. The pass
//! itself only fails when nothing is visible.

use crate::arena::{NodeArena, NodeId};
use crate::context::RenderContext;
use crate::geometry::{self, full_map};
use crate::node::{ImageClass, ImageNode, Payload, Plane, RenderStatus, SynthKind};
use crate::source::{DecodedImage, Decoder, GeometryHint, ProjectionDef, Reprojector, SourcePixels};
use imagery_common::{ClipRect, Lut, LutRegistry, SynthError, SynthResult, Viewport};
use renderer::composite::Compositor;
use renderer::resample::{resample_coded, resample_indexed, resample_polar, resample_rgb, SourceGrid};
use renderer::{ColorMapper, Raster};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use storage::{CacheKey, RenderCache};

/// Settings that hold for a whole pass.
pub(crate) struct PassSettings<'a> {
    pub viewport: Viewport,
    pub clip: ClipRect,
    pub brightness: f64,
    pub class_brightness: &'a HashMap<ImageClass, f64>,
    pub greyscale: bool,
    pub max_raster_pixels: usize,
}

/// Source access shared by rendering and sampling.
pub(crate) struct Sources<'a> {
    pub decoder: &'a dyn Decoder,
    pub reprojector: Option<&'a dyn Reprojector>,
    pub target_projection: Option<&'a ProjectionDef>,
}

impl Sources<'_> {
    /// Decode `source_ref` and reproject it when its projection differs from
    /// the display projection. Returns the placement hint of a reprojection.
    pub fn prepare(
        &self,
        id: NodeId,
        source_ref: &str,
        projection: Option<&ProjectionDef>,
        ctx: &mut RenderContext,
    ) -> SynthResult<(DecodedImage, Option<GeometryHint>)> {
        let image = self.decoder.decode(source_ref)?;
        image.validate(source_ref)?;

        let (Some(from), Some(to)) = (projection, self.target_projection) else {
            return Ok((image, None));
        };
        if from.is_compatible(to) {
            return Ok((image, None));
        }
        match self.reprojector {
            Some(r) => {
                let (out, hint) = r.reproject(&image, from, to)?;
                out.validate(source_ref)?;
                tracing::debug!(node = %id, from = %from.name, to = %to.name, "reprojected source");
                Ok((out, Some(hint)))
            }
            None => {
                ctx.warn(
                    Some(id),
                    "NoReprojector",
                    format!("'{}' is in {} and is drawn without reprojection", source_ref, from.name),
                );
                Ok((image, None))
            }
        }
    }
}

/// Cache key of the subtree rooted at `id`.
pub(crate) fn cache_key(nodes: &NodeArena<ImageNode>, id: NodeId) -> CacheKey {
    let mut key = CacheKey::new();
    push_key(nodes, id, &mut key);
    key
}

fn push_key(nodes: &NodeArena<ImageNode>, id: NodeId, key: &mut CacheKey) {
    key.push_node(id.token());
    if let Some(Payload::Synth(d)) = nodes.get(id).map(|n| &n.payload) {
        key.push_child_count(d.children.len());
        for c in &d.children {
            push_key(nodes, c.id, key);
        }
    }
}

/// A drawing step of a synthetic node.
enum Layer {
    Single(NodeId, Compositor),
    /// Satellite and radar planes merged separately, the radar plane
    /// blended onto the satellite plane, then layered as one.
    Blend {
        satellite: Vec<NodeId>,
        radar: Vec<NodeId>,
        percent: u8,
    },
}

pub(crate) struct Orchestrator<'a> {
    nodes: &'a mut NodeArena<ImageNode>,
    luts: &'a LutRegistry,
    cache: &'a mut RenderCache,
    sources: Sources<'a>,
    settings: PassSettings<'a>,
    ctx: RenderContext,
    /// Changed flag of every scanned node.
    scanned: HashMap<NodeId, bool>,
    in_scan: HashSet<NodeId>,
    /// Sources decoded during the scan, consumed by create.
    decoded: HashMap<NodeId, DecodedImage>,
    rasters: HashMap<NodeId, Raster>,
    /// Outstanding consumers of each node's raster.
    consumers: HashMap<NodeId, usize>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        nodes: &'a mut NodeArena<ImageNode>,
        luts: &'a LutRegistry,
        cache: &'a mut RenderCache,
        sources: Sources<'a>,
        settings: PassSettings<'a>,
    ) -> Self {
        Self {
            nodes,
            luts,
            cache,
            sources,
            settings,
            ctx: RenderContext::new(),
            scanned: HashMap::new(),
            in_scan: HashSet::new(),
            decoded: HashMap::new(),
            rasters: HashMap::new(),
            consumers: HashMap::new(),
        }
    }

    /// Run a full pass for `root`.
    pub fn run(mut self, root: NodeId) -> (Option<Raster>, RenderContext) {
        self.ctx.push_label(format!("render {}", root));
        self.scan(root);

        let visible = self.status(root).is_visible();
        let raster = if visible && self.ensure_raster(root) {
            self.rasters.remove(&root)
        } else {
            None
        };
        if raster.is_none() {
            tracing::debug!(node = %root, "nothing visible");
        }
        self.ctx.pop_label();
        (raster, self.ctx)
    }

    fn status(&self, id: NodeId) -> RenderStatus {
        self.nodes
            .get(id)
            .map_or(RenderStatus::NotVisible, |n| n.status)
    }

    fn set_status(&mut self, id: NodeId, status: RenderStatus) {
        if let Some(n) = self.nodes.get_mut(id) {
            n.status = status;
        }
    }

    // ========================================================================
    // Scan
    // ========================================================================

    fn scan(&mut self, id: NodeId) -> bool {
        if let Some(&changed) = self.scanned.get(&id) {
            return changed;
        }
        if !self.in_scan.insert(id) {
            self.ctx.warn(Some(id), "Cycle", "node reached through itself, skipped");
            return false;
        }
        let changed = match self.nodes.get(id).map(ImageNode::is_synthetic) {
            Some(true) => self.scan_synthetic(id),
            Some(false) => self.scan_leaf(id),
            None => {
                self.ctx.warn(Some(id), "InvalidNode", "child no longer exists");
                false
            }
        };
        self.in_scan.remove(&id);
        self.scanned.insert(id, changed);
        changed
    }

    fn scan_leaf(&mut self, id: NodeId) -> bool {
        let Some(leaf) = self.nodes.get(id).and_then(|n| n.payload.leaf()) else {
            return false;
        };
        self.ctx.push_label(format!("leaf {} '{}'", id, leaf.source_ref));
        let changed = self.scan_leaf_inner(id);
        self.ctx.pop_label();
        changed
    }

    fn scan_leaf_inner(&mut self, id: NodeId) -> bool {
        let Some(leaf) = self.nodes.get(id).and_then(|n| n.payload.leaf()) else {
            return false;
        };
        let mut dims = leaf.dims;
        let dirty = leaf.dirty;

        if dirty || dims.is_none() {
            match self.prepare_leaf(id) {
                Ok(image) => {
                    dims = Some((image.width, image.height));
                    self.decoded.insert(id, image);
                }
                Err(e) => {
                    self.ctx.error(Some(id), &e);
                    if let Some(n) = self.nodes.get_mut(id) {
                        n.status = RenderStatus::NotVisible;
                        n.geometry = None;
                    }
                    self.cache.purge_token(&id.token());
                    return true;
                }
            }
        }
        let Some((w, h)) = dims else {
            return false;
        };

        let (viewport, clip) = (self.settings.viewport, self.settings.clip);
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        let res = geometry::resolve(&node.placement, w, h, true, &viewport, &clip);
        let geometry_changed = node.geometry != Some(res.geometry);
        node.geometry = Some(res.geometry);
        if let Some(leaf) = node.payload.leaf_mut() {
            leaf.dims = Some((w, h));
            leaf.dirty = false;
        }

        let changed = if res.degenerate {
            node.status = RenderStatus::NotVisible;
            geometry_changed || dirty
        } else {
            if geometry_changed || dirty || node.status == RenderStatus::NotVisible {
                node.status = RenderStatus::Generate;
            }
            geometry_changed || dirty || node.status == RenderStatus::Generate
        };
        tracing::debug!(node = %id, status = ?node.status, changed, dest = ?res.geometry.dest, "scanned leaf");

        if changed {
            self.cache.purge_token(&id.token());
        }
        changed
    }

    fn scan_synthetic(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        let children: Vec<NodeId> = node.children().iter().map(|c| c.id).collect();
        let mut changed = node.payload.synth().map_or(false, |d| d.dirty);
        let placement = if node.placed {
            node.placement
        } else {
            full_map(&self.settings.viewport)
        };

        self.ctx.push_label(format!("synthetic {}", id));
        let mut any_visible = false;
        let mut class: Option<ImageClass> = None;
        for &child in &children {
            changed |= self.scan(child);
            let Some(c) = self.nodes.get(child) else {
                continue;
            };
            class = match class {
                None => Some(c.class),
                Some(k) if k == c.class => Some(k),
                Some(_) => Some(ImageClass::Unknown),
            };
            if c.status.is_visible() {
                any_visible = true;
                *self.consumers.entry(child).or_default() += 1;
            }
        }
        self.ctx.pop_label();

        let viewport = self.settings.viewport;
        let (w, h) = (
            viewport.pixel_width(placement.width).max(0) as usize,
            viewport.pixel_height(placement.height).max(0) as usize,
        );
        let res = geometry::resolve(&placement, w, h, false, &viewport, &self.settings.clip);

        let Some(node) = self.nodes.get_mut(id) else {
            return changed;
        };
        changed |= node.geometry != Some(res.geometry);
        node.geometry = Some(res.geometry);
        node.class = class.unwrap_or_default();
        if let Some(d) = node.payload.synth_mut() {
            d.dirty = false;
        }
        node.status = if res.degenerate || !any_visible {
            RenderStatus::NotVisible
        } else if changed || node.status != RenderStatus::OnDisk {
            RenderStatus::Generate
        } else {
            RenderStatus::OnDisk
        };
        tracing::debug!(node = %id, status = ?node.status, changed, "scanned synthetic");

        if changed {
            self.cache.purge_token(&id.token());
        }
        changed
    }

    /// Decode a leaf's source and apply any reprojection hint to its placement.
    fn prepare_leaf(&mut self, id: NodeId) -> SynthResult<DecodedImage> {
        let leaf = self
            .nodes
            .get(id)
            .and_then(|n| n.payload.leaf())
            .ok_or_else(|| SynthError::InvalidNode(id.to_string()))?;
        let (source_ref, projection) = (leaf.source_ref.clone(), leaf.projection.clone());
        let (image, hint) = self
            .sources
            .prepare(id, &source_ref, projection.as_ref(), &mut self.ctx)?;
        if let (Some(hint), Some(node)) = (hint, self.nodes.get_mut(id)) {
            node.placement.x = hint.origin_x;
            node.placement.y = hint.origin_y;
            node.placement.width = hint.width;
            node.placement.height = hint.height;
        }
        Ok(image)
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Make sure the raster of `id` is in the pass. False when the node is
    /// not visible or failed.
    fn ensure_raster(&mut self, id: NodeId) -> bool {
        if self.rasters.contains_key(&id) {
            return true;
        }
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        if !node.status.is_visible() {
            return false;
        }
        let raster = if node.is_synthetic() {
            self.ctx.push_label(format!("synthetic {}", id));
            let r = self.create_synthetic(id);
            self.ctx.pop_label();
            r
        } else {
            self.ctx.push_label(format!("leaf {}", id));
            let r = self.create_leaf(id);
            self.ctx.pop_label();
            r
        };
        match raster {
            Some(r) => {
                self.rasters.insert(id, r);
                true
            }
            None => {
                self.set_status(id, RenderStatus::NotVisible);
                false
            }
        }
    }

    /// Drop a child's raster once its last consumer has used it.
    fn release(&mut self, id: NodeId) {
        let remaining = match self.consumers.get_mut(&id) {
            Some(n) => {
                *n = n.saturating_sub(1);
                *n
            }
            None => 0,
        };
        if remaining == 0 {
            self.rasters.remove(&id);
        }
    }

    fn allocate(&mut self, id: NodeId) -> Option<Raster> {
        let dest = self.nodes.get(id)?.geometry?.dest;
        match Raster::transparent(dest, self.settings.max_raster_pixels) {
            Ok(r) => Some(r),
            Err(e) => {
                self.ctx.error(Some(id), &e);
                None
            }
        }
    }

    /// Load the cached raster of an `OnDisk` node, demoting it to `Generate`
    /// on a miss.
    fn load_cached(&mut self, id: NodeId, key: &CacheKey, raster: &Raster) -> Option<Raster> {
        if self.status(id) != RenderStatus::OnDisk {
            return None;
        }
        let rect = raster.rect();
        let loaded = match self.cache.try_load(key, rect.width, rect.height) {
            Ok(Some(pixels)) => Raster::from_data(rect, pixels).ok(),
            Ok(None) => None,
            Err(e) => {
                self.ctx.warn(Some(id), e.code(), e.to_string());
                None
            }
        };
        if loaded.is_some() {
            tracing::debug!(node = %id, key = %key, "raster loaded from cache");
        } else {
            self.set_status(id, RenderStatus::Generate);
        }
        loaded
    }

    /// Persist a fresh raster. A failure leaves the node rendered but unsaved.
    fn store(&mut self, id: NodeId, key: &CacheKey, raster: &Raster, fresh: RenderStatus) {
        if !self.cache.is_enabled() {
            self.set_status(id, fresh);
            return;
        }
        let rect = raster.rect();
        match self.cache.store(key, rect.width, rect.height, raster.data()) {
            Ok(()) => self.set_status(id, RenderStatus::OnDisk),
            Err(e) => {
                self.ctx.warn(Some(id), e.code(), e.to_string());
                self.set_status(id, fresh);
            }
        }
    }

    fn create_leaf(&mut self, id: NodeId) -> Option<Raster> {
        let mut raster = self.allocate(id)?;
        let key = cache_key(self.nodes, id);
        if let Some(cached) = self.load_cached(id, &key, &raster) {
            return Some(cached);
        }

        let image = match self.decoded.remove(&id) {
            Some(image) => image,
            None => match self.prepare_leaf(id) {
                Ok(image) => image,
                Err(e) => {
                    self.ctx.error(Some(id), &e);
                    return None;
                }
            },
        };
        if let Err(e) = self.draw_leaf(id, &image, &mut raster) {
            self.ctx.error(Some(id), &e);
            return None;
        }
        tracing::debug!(node = %id, width = raster.width(), height = raster.height(), "rendered leaf");

        self.store(id, &key, &raster, RenderStatus::Generate);
        Some(raster)
    }

    fn brightness(&self, node: &ImageNode) -> f64 {
        node.payload
            .leaf()
            .and_then(|l| l.brightness)
            .or_else(|| self.settings.class_brightness.get(&node.class).copied())
            .unwrap_or(self.settings.brightness)
    }

    fn lut(&self, node: &ImageNode, image: &DecodedImage) -> SynthResult<Arc<Lut>> {
        let handle = node
            .payload
            .leaf()
            .and_then(|l| l.lut)
            .or(image.native_lut)
            .ok_or_else(|| SynthError::invalid_parameter("lut", "image has no lookup table"))?;
        self.luts.get(handle)
    }

    /// Resample a decoded source into the node's raster.
    fn draw_leaf(&self, id: NodeId, image: &DecodedImage, raster: &mut Raster) -> SynthResult<()> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| SynthError::InvalidNode(id.to_string()))?;
        let geometry = node
            .geometry
            .ok_or_else(|| SynthError::InvalidNode(format!("{} has no geometry", id)))?;
        let inv = geometry
            .affine
            .invert()
            .ok_or_else(|| SynthError::invalid_parameter("placement", "transform is singular"))?;
        let brightness = self.brightness(node);
        let greyscale = self.settings.greyscale;
        let grid = SourceGrid::new(image.width, image.height).with_mask(image.mask.as_deref());

        match &image.pixels {
            SourcePixels::Rgb(data) => {
                resample_rgb(data, grid, &inv, raster, &ColorMapper::direct(brightness, greyscale));
            }
            SourcePixels::Indexed { data, remap } => {
                let mapper = ColorMapper::new(&*self.lut(node, image)?, brightness, greyscale);
                let assigned = node.payload.leaf().and_then(|l| l.lut);
                let native = assigned.is_none() || assigned == image.native_lut;
                let remap = remap.as_deref().filter(|_| native);
                resample_indexed(data, grid, &inv, raster, &mapper, remap);
            }
            SourcePixels::Coded { data, codec } => {
                let mapper = ColorMapper::new(&*self.lut(node, image)?, brightness, greyscale);
                resample_coded(data, grid, &inv, raster, codec, &mapper);
            }
            SourcePixels::Polar { .. } => {
                let mapper = ColorMapper::new(&*self.lut(node, image)?, brightness, greyscale);
                if let Some(polar) = image.polar_grid() {
                    resample_polar(&polar, &inv, raster, &mapper);
                }
            }
        }

        if let Payload::Radar {
            range_rings: Some(rings),
            ..
        } = &node.payload
        {
            let (cx, cy) = (image.width as f64 / 2.0, image.height as f64 / 2.0);
            let (x, y) = geometry.affine.apply(cx, cy);
            rings.draw(
                raster,
                x.floor() as i32,
                y.floor() as i32,
                cx.min(cy),
                geometry.scale_x,
                geometry.scale_y,
            );
        }
        Ok(())
    }

    fn create_synthetic(&mut self, id: NodeId) -> Option<Raster> {
        let mut raster = self.allocate(id)?;
        let key = cache_key(self.nodes, id);
        if let Some(cached) = self.load_cached(id, &key, &raster) {
            return Some(cached);
        }

        let mut drawn = 0;
        for layer in self.plan(id) {
            match layer {
                Layer::Single(child, op) => {
                    if !self.ensure_raster(child) {
                        continue;
                    }
                    if let Some(src) = self.rasters.get(&child) {
                        layer_op(drawn, op).apply(&mut raster, src);
                        drawn += 1;
                    }
                    self.release(child);
                }
                Layer::Blend {
                    satellite,
                    radar,
                    percent,
                } => {
                    let sat = self.merge_plane(id, satellite);
                    let rad = self.merge_plane(id, radar);
                    let merged = match (sat, rad) {
                        (Some(mut sat), Some(rad)) => {
                            Compositor::Blend(percent).apply(&mut sat, &rad);
                            tracing::debug!(node = %id, percent, "blended satellite and radar planes");
                            Some(sat)
                        }
                        (sat, rad) => sat.or(rad),
                    };
                    if let Some(merged) = merged {
                        layer_op(drawn, Compositor::Combine).apply(&mut raster, &merged);
                        drawn += 1;
                    }
                }
            }
        }

        if drawn == 0 {
            self.ctx.warn(Some(id), "NoVisibleChildren", "every child failed or is hidden");
            return None;
        }
        tracing::debug!(node = %id, children = drawn, "composed synthetic image");
        self.store(id, &key, &raster, RenderStatus::Exists);
        Some(raster)
    }

    /// Layer one composite plane into a scratch raster the size of `id`.
    /// `None` when no child of the plane could be drawn.
    fn merge_plane(&mut self, id: NodeId, children: Vec<NodeId>) -> Option<Raster> {
        let mut scratch = self.allocate(id)?;
        let mut drawn = 0;
        for child in children {
            if !self.ensure_raster(child) {
                continue;
            }
            if let Some(src) = self.rasters.get(&child) {
                layer_op(drawn, Compositor::Combine).apply(&mut scratch, src);
                drawn += 1;
            }
            self.release(child);
        }
        (drawn > 0).then_some(scratch)
    }

    /// Drawing steps of a synthetic node, back to front.
    fn plan(&self, id: NodeId) -> Vec<Layer> {
        let Some(data) = self.nodes.get(id).and_then(|n| n.payload.synth()) else {
            return Vec::new();
        };
        let visible: Vec<NodeId> = data
            .children
            .iter()
            .map(|c| c.id)
            .filter(|c| self.status(*c).is_visible())
            .collect();

        match data.kind {
            SynthKind::Combined => visible
                .into_iter()
                .map(|c| Layer::Single(c, Compositor::Combine))
                .collect(),
            SynthKind::Blended => {
                let op = if data.blend.is_active() {
                    Compositor::Blend(data.blend.percent())
                } else {
                    Compositor::Combine
                };
                visible.into_iter().map(|c| Layer::Single(c, op)).collect()
            }
            SynthKind::Composite => {
                let mut planes: BTreeMap<Plane, Vec<NodeId>> = BTreeMap::new();
                for c in visible {
                    let class = self.nodes.get(c).map_or(ImageClass::Unknown, |n| n.class);
                    planes.entry(class.plane()).or_default().push(c);
                }
                let mut take = |p: Plane| planes.remove(&p).unwrap_or_default();
                let (geo, under, sat, radar, over) = (
                    take(Plane::Geographic),
                    take(Plane::Underlay),
                    take(Plane::Satellite),
                    take(Plane::Radar),
                    take(Plane::Overlay),
                );

                let single = |ids: Vec<NodeId>| ids.into_iter().map(|c| Layer::Single(c, Compositor::Combine));
                let mut layers: Vec<Layer> = single(geo).chain(single(under)).collect();
                if data.blend.is_active() && !sat.is_empty() && !radar.is_empty() {
                    layers.push(Layer::Blend {
                        satellite: sat,
                        radar,
                        percent: data.blend.percent(),
                    });
                } else {
                    layers.extend(single(sat).chain(single(radar)));
                }
                layers.extend(single(over));
                layers
            }
        }
    }
}

/// The first layer of a raster is copied, later ones use `op`.
fn layer_op(drawn: usize, op: Compositor) -> Compositor {
    if drawn == 0 {
        Compositor::Copy
    } else {
        op
    }
}
