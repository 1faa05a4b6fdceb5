use std::env;
use std::fs;
use std::path::PathBuf;

/// Tile sizes that always get a specialized kernel variant.
const BASE_FAMILY: [usize; 7] = [1, 2, 4, 8, 10, 16, 32];

fn main() {
    println!("cargo:rerun-if-env-changed=TM_TILE_SIZE");
    println!("cargo:rerun-if-changed=build.rs");

    let raw = env::var("TM_TILE_SIZE").unwrap_or_else(|_| "16".to_string());
    let tile: usize = raw
        .trim()
        .parse()
        .unwrap_or_else(|_| panic!("TM_TILE_SIZE must be a positive integer, got {raw:?}"));
    assert!(tile > 0, "TM_TILE_SIZE must be at least 1");

    println!("cargo:rustc-env=TM_DEFAULT_TILE={tile}");

    // The build-time tile always has its own variant.
    let mut family = BASE_FAMILY.to_vec();
    family.push(tile);
    family.sort_unstable();
    family.dedup();

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));

    let list = family
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    fs::write(
        out_dir.join("specialized_tiles.rs"),
        format!(
            "/// Tile sizes that have a compile-time specialized kernel variant.\n\
             pub const SPECIALIZED_TILES: &[usize] = &[{list}];\n"
        ),
    )
    .expect("failed to write specialized_tiles.rs");

    let arms: String = family
        .iter()
        .map(|t| {
            format!(
                "            {t} => {{\n                \
                     let $width = Fixed::<{t}>;\n                \
                     $body\n            \
                 }}\n"
            )
        })
        .collect();
    fs::write(
        out_dir.join("fixed_width.rs"),
        format!(
            "/// Select the compile-time variant for `$tile`, bind it to `$width` and\n\
             /// evaluate `$body`.\n\
             macro_rules! with_fixed_width {{\n    \
                 ($tile:expr, $width:ident => $body:expr) => {{\n        \
                     match $tile {{\n\
             {arms}            \
                         other => Err(KernelError::UnspecializedTile {{\n                \
                             tile: other,\n                \
                             available: SPECIALIZED_TILES,\n            \
                         }}),\n        \
                     }}\n    \
                 }};\n\
             }}\n"
        ),
    )
    .expect("failed to write fixed_width.rs");
}
