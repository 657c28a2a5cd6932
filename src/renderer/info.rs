//! Frame statistics and reports.

use crate::errors::ProgramDiagnostics;
use crate::resources::version_tracker::ResourceId;

/// Per-frame counters plus live resource totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderInfo {
    pub frame: u64,
    pub draw_calls: u32,
    pub triangles: u32,
    pub lines: u32,
    pub points: u32,
    /// Draws skipped because their program failed to compile.
    pub skipped_draws: u32,
    /// Non-fatal resource warnings raised this frame.
    pub warnings: u32,
    pub geometries: usize,
    pub textures: usize,
    pub programs: usize,
    pub state_changes: u64,
    pub uniform_uploads: u64,
}

impl RenderInfo {
    /// Clears the per-frame counters; totals are refreshed by the renderer.
    pub fn reset_frame(&mut self, frame: u64) {
        *self = Self {
            frame,
            geometries: self.geometries,
            textures: self.textures,
            programs: self.programs,
            ..Self::default()
        };
    }

    pub fn record_draw(&mut self, topology: wgpu::PrimitiveTopology, count: u32, instances: u32) {
        use wgpu::PrimitiveTopology as T;
        self.draw_calls += 1;
        let primitives = match topology {
            T::TriangleList => count / 3,
            T::TriangleStrip => count.saturating_sub(2),
            T::LineList => count / 2,
            T::LineStrip => count.saturating_sub(1),
            T::PointList => count,
        };
        let primitives = primitives.saturating_mul(instances.max(1));
        match topology {
            T::TriangleList | T::TriangleStrip => self.triangles += primitives,
            T::LineList | T::LineStrip => self.lines += primitives,
            T::PointList => self.points += primitives,
        }
    }
}

/// Stage of the per-frame state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FramePhase {
    #[default]
    Idle,
    BuildLists,
    RenderShadows,
    RenderTransmissive,
    RenderMain,
    Resolve,
}

/// A program that failed while rendering a material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileFailure {
    pub material: ResourceId,
    pub diagnostics: ProgramDiagnostics,
}

/// Outcome of one successful [`Renderer::render`](super::Renderer::render).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Phases entered, in order, ending with [`FramePhase::Idle`].
    pub phases: Vec<FramePhase>,
    /// Programs that failed for the first time this frame.
    pub compile_failures: Vec<CompileFailure>,
    pub info: RenderInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instanced_draws_multiply_primitives() {
        let mut info = RenderInfo::default();
        info.record_draw(wgpu::PrimitiveTopology::TriangleList, 36, 4);
        info.record_draw(wgpu::PrimitiveTopology::LineStrip, 5, 1);
        assert_eq!(info.draw_calls, 2);
        assert_eq!(info.triangles, 48);
        assert_eq!(info.lines, 4);
    }

    #[test]
    fn reset_keeps_live_totals() {
        let mut info = RenderInfo {
            draw_calls: 3,
            programs: 2,
            ..RenderInfo::default()
        };
        info.reset_frame(7);
        assert_eq!(info.draw_calls, 0);
        assert_eq!(info.programs, 2);
        assert_eq!(info.frame, 7);
    }
}
