//! Backend configuration shared by every pass in the lowering pipeline.

/// Knobs describing the target and which optional pipeline stages run. The
/// `Default` implementation matches the production target: 64 lanes per
/// vector register with hardware loops enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Number of lanes in a vector register (and bits in a lane mask)
    pub simd_width: u32,
    /// Lower trip-count markers into hardware loop instructions. When this is
    /// off, functions still carrying loop markers are rejected at selection.
    pub hardware_loops: bool,
    /// Drop unconditional branches whose target is the next block in layout
    pub elide_fallthrough_branches: bool,
    /// Lay blocks out in reverse post order before instruction selection
    pub reorder_blocks: bool,
}

impl CodegenOptions {
    pub const DEFAULT_SIMD_WIDTH: u32 = 64;

    pub fn with_simd_width(mut self, simd_width: u32) -> Self {
        self.simd_width = simd_width;
        self
    }
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            simd_width: Self::DEFAULT_SIMD_WIDTH,
            hardware_loops: true,
            elide_fallthrough_branches: true,
            reorder_blocks: true,
        }
    }
}
