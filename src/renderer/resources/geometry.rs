//! Geometry to buffer ownership.
//!
//! Records which attribute buffers belong to a geometry so that disposing
//! the geometry frees all of them, and so that streams replaced on a live
//! geometry do not leak their device buffers.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::buffer::BufferCache;
use crate::renderer::core::device::GpuDevice;
use crate::resources::geometry::Geometry;
use crate::resources::version_tracker::ResourceId;

#[derive(Debug, Default)]
struct GeometryRecord {
    layout_version: u64,
    streams: SmallVec<[ResourceId; 8]>,
}

#[derive(Debug, Default)]
pub struct GeometryCache {
    records: FxHashMap<ResourceId, GeometryRecord>,
}

impl GeometryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the streams of `geometry`. When its attribute set changed
    /// since the last call, buffers of streams no longer present are freed.
    pub fn track<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        buffers: &mut BufferCache,
        geometry: &Geometry,
    ) {
        let record = self.records.entry(geometry.id()).or_default();
        if !record.streams.is_empty() && record.layout_version == geometry.layout_version() {
            return;
        }
        let current = stream_ids(geometry);
        for stale in record.streams.iter().filter(|id| !current.contains(*id)) {
            buffers.remove(device, *stale);
        }
        record.streams = current;
        record.layout_version = geometry.layout_version();
    }

    /// Frees every buffer of a disposed geometry. Returns `false` when the
    /// geometry was never tracked.
    pub fn dispose<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        buffers: &mut BufferCache,
        geometry: ResourceId,
    ) -> bool {
        let Some(record) = self.records.remove(&geometry) else {
            return false;
        };
        for stream in record.streams {
            buffers.remove(device, stream);
        }
        log::debug!("Geometry {geometry}: disposed");
        true
    }

    pub fn invalidate(&mut self) {
        self.records.clear();
    }

    /// Live geometries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn stream_ids(geometry: &Geometry) -> SmallVec<[ResourceId; 8]> {
    let mut ids: SmallVec<[ResourceId; 8]> = geometry.attributes().map(|(_, a)| a.id()).collect();
    ids.extend(geometry.index().map(|i| i.id()));
    for (_, list) in geometry.morph_streams() {
        ids.extend(list.iter().map(|a| a.id()));
    }
    ids
}
