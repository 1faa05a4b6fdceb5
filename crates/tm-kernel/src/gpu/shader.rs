//! WGSL source of the tiled matmul kernel.

use crate::config::TileStrategy;

/// WGSL for one kernel variant.
///
/// `Specialized` bakes `tile` in as a `const`. `Runtime` declares `TILE` as
/// a pipeline-overridable constant bound when the pipeline is created, with
/// local tiles sized for the largest tile the device accepts
/// (`max_tile_area` cells).
pub(crate) fn matmul_wgsl(strategy: TileStrategy, tile: usize, max_tile_area: usize) -> String {
    let (tile_decl, area) = match strategy {
        TileStrategy::Specialized => (format!("const TILE: u32 = {tile}u;"), tile * tile),
        TileStrategy::Runtime => ("override TILE: u32 = 1u;".to_string(), max_tile_area),
    };
    format!(
        r#"// Tiled matmul: C[N,N] = A[N,N] @ B[N,N]

struct Dims {{
    n: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}}

@group(0) @binding(0) var<storage, read> A: array<f32>;
@group(0) @binding(1) var<storage, read> B: array<f32>;
@group(0) @binding(2) var<storage, read_write> C: array<f32>;
@group(0) @binding(3) var<uniform> dims: Dims;

{tile_decl}

var<workgroup> tile_a: array<f32, {area}>;
var<workgroup> tile_b: array<f32, {area}>;

@compute @workgroup_size(TILE, TILE)
fn main(
    @builtin(workgroup_id) wid: vec3<u32>,
    @builtin(local_invocation_id) lid: vec3<u32>,
) {{
    let n = dims.n;
    let ly = lid.y;
    let lx = lid.x;
    let gy = wid.y * TILE + ly;
    let gx = wid.x * TILE + lx;

    var acc: f32 = 0.0;
    let phases = (n + TILE - 1u) / TILE;

    for (var p: u32 = 0u; p < phases; p = p + 1u) {{
        let a_col = p * TILE + lx;
        let b_row = p * TILE + ly;

        var a_val: f32 = 0.0;
        if (gy < n && a_col < n) {{
            a_val = A[gy * n + a_col];
        }}
        var b_val: f32 = 0.0;
        if (b_row < n && gx < n) {{
            b_val = B[b_row * n + gx];
        }}
        tile_a[ly * TILE + lx] = a_val;
        tile_b[ly * TILE + lx] = b_val;

        workgroupBarrier();

        for (var k: u32 = 0u; k < TILE; k = k + 1u) {{
            acc = acc + tile_a[ly * TILE + k] * tile_b[k * TILE + lx];
        }}

        workgroupBarrier();
    }}

    if (gy < n && gx < n) {{
        C[gy * n + gx] = acc;
    }}
}}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specialized_bakes_tile() {
        let src = matmul_wgsl(TileStrategy::Specialized, 8, 256);
        assert!(src.contains("const TILE: u32 = 8u;"));
        assert!(src.contains("array<f32, 64>"));
        assert!(!src.contains("override"));
    }

    #[test]
    fn test_runtime_uses_override() {
        let src = matmul_wgsl(TileStrategy::Runtime, 8, 256);
        assert!(src.contains("override TILE: u32"));
        assert!(src.contains("array<f32, 256>"));
    }

    #[test]
    fn test_two_barriers_per_phase() {
        let src = matmul_wgsl(TileStrategy::Specialized, 16, 256);
        assert_eq!(src.matches("workgroupBarrier();").count(), 2);
    }
}
