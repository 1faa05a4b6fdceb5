use std::io::Write;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tm_kernel::TileStrategy;
use tracing::{debug, info, warn};

use crate::error::{Result, SweepError};
use crate::record::{Record, RecordWriter};

/// Every (strategy, tile) cell, `repetitions` times each, at a fixed N.
#[derive(Debug, Clone)]
pub struct Sweep {
    pub bin: PathBuf,
    pub n: usize,
    pub tiles: Vec<usize>,
    pub repetitions: usize,
    pub device: Option<String>,
    /// Rebuilds `bin` before its runs when set: once per tile for the
    /// specialized cells, once for all runtime cells.
    pub build: Option<BuildCommand>,
}

/// Totals of a finished sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepSummary {
    pub recorded: usize,
    pub failed: usize,
    pub compiled: usize,
}

/// The command that produces the kernel binary. The build-time tile is
/// passed in `TM_TILE_SIZE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl BuildCommand {
    /// `cargo build --release -p tm-cli`, run from the current directory.
    pub fn cargo_release(cargo: PathBuf) -> Self {
        Self {
            program: cargo,
            args: ["build", "--release", "-p", "tm-cli"]
                .into_iter()
                .map(OsString::from)
                .collect(),
        }
    }

    /// Wall time of one build, or `None` if it failed. `tile: None` builds
    /// with the default build-time tile.
    pub fn time(&self, tile: Option<usize>) -> Option<Duration> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        match tile {
            Some(tile) => cmd.env("TM_TILE_SIZE", tile.to_string()),
            None => cmd.env_remove("TM_TILE_SIZE"),
        };

        let start = Instant::now();
        let output = cmd.output();
        let elapsed = start.elapsed();

        match output {
            Ok(out) if out.status.success() => {
                debug!(?tile, elapsed_ms = elapsed.as_secs_f64() * 1e3, "build complete");
                Some(elapsed)
            }
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                warn!(status = %out.status, stderr = %stderr.trim_end(), "build failed");
                None
            }
            Err(e) => {
                warn!("failed to start {}: {e}", self.program.display());
                None
            }
        }
    }
}

impl Sweep {
    /// Cells in execution order: all tiles specialized, then all runtime.
    pub fn cells(&self) -> impl Iterator<Item = (TileStrategy, usize)> + '_ {
        [TileStrategy::Specialized, TileStrategy::Runtime]
            .into_iter()
            .flat_map(move |m| self.tiles.iter().map(move |&t| (m, t)))
    }

    /// Arguments for one invocation of the kernel binary.
    pub fn args(&self, method: TileStrategy, tile: usize) -> Vec<String> {
        let mut args = vec![
            self.n.to_string(),
            "--tile".to_string(),
            tile.to_string(),
            "--strategy".to_string(),
            method.to_string(),
        ];
        if let Some(device) = &self.device {
            args.push("--device".to_string());
            args.push(device.clone());
        }
        args
    }

    /// Run the whole sweep, appending one record per successful invocation
    /// to `runs` and, when building, one per successful build to
    /// `compiles`.
    ///
    /// # Errors
    /// `NoTiles` before anything runs; `MissingBinary` if `bin` is absent
    /// when its runs are due; `Io` if a record file cannot be written.
    /// Failed invocations and builds are skipped, not errors.
    pub fn run<W: Write>(
        &self,
        runs: &mut RecordWriter<W>,
        mut compiles: Option<&mut RecordWriter<W>>,
    ) -> Result<SweepSummary> {
        if self.tiles.is_empty() {
            return Err(SweepError::NoTiles);
        }
        if self.build.is_none() && !self.bin.is_file() {
            return Err(SweepError::MissingBinary(self.bin.clone()));
        }

        let mut summary = SweepSummary::default();
        // The runtime binary does not depend on the tile, so it is built once.
        let mut runtime_build: Option<Option<Duration>> = None;
        for (method, tile) in self.cells() {
            if let Some(build) = &self.build {
                info!(%method, tile, "building");
                let duration = match method {
                    TileStrategy::Specialized => build.time(Some(tile)),
                    TileStrategy::Runtime => *runtime_build.get_or_insert_with(|| build.time(None)),
                };
                let Some(duration) = duration else {
                    warn!(%method, tile, "build failed; runs skipped");
                    summary.failed += self.repetitions;
                    continue;
                };
                if let Some(compiles) = compiles.as_deref_mut() {
                    compiles.write(&Record {
                        method,
                        tile,
                        repetition: 1,
                        duration,
                    })?;
                }
                summary.compiled += 1;
                if !self.bin.is_file() {
                    return Err(SweepError::MissingBinary(self.bin.clone()));
                }
            }

            info!(%method, tile, n = self.n, "measuring");
            let args = self.args(method, tile);
            for repetition in 1..=self.repetitions {
                match self.time_once(&args) {
                    Some(duration) => {
                        runs.write(&Record {
                            method,
                            tile,
                            repetition,
                            duration,
                        })?;
                        summary.recorded += 1;
                    }
                    None => {
                        warn!(%method, tile, repetition, "run failed; skipped");
                        summary.failed += 1;
                    }
                }
            }
        }
        Ok(summary)
    }

    /// Wall time of one process from spawn to exit, or `None` if it could
    /// not be started or exited unsuccessfully.
    fn time_once(&self, args: &[String]) -> Option<Duration> {
        let start = Instant::now();
        let output = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output();
        let elapsed = start.elapsed();

        match output {
            Ok(out) if out.status.success() => {
                debug!(?args, elapsed_ms = elapsed.as_secs_f64() * 1e3, "run complete");
                Some(elapsed)
            }
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                warn!(status = %out.status, stderr = %stderr.trim_end(), "kernel binary failed");
                None
            }
            Err(e) => {
                warn!("failed to start {}: {e}", self.bin.display());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep(bin: &str) -> Sweep {
        Sweep {
            bin: PathBuf::from(bin),
            n: 64,
            tiles: vec![2, 4],
            repetitions: 3,
            device: None,
            build: None,
        }
    }

    fn unix_tool(names: [&'static str; 2]) -> Option<&'static str> {
        names.into_iter().find(|p| std::path::Path::new(p).is_file())
    }

    fn stand_in_build(program: &str) -> BuildCommand {
        BuildCommand {
            program: PathBuf::from(program),
            args: Vec::new(),
        }
    }

    #[test]
    fn test_cells_order() {
        let s = sweep("tiled-matmul");
        let cells: Vec<_> = s.cells().collect();
        assert_eq!(
            cells,
            [
                (TileStrategy::Specialized, 2),
                (TileStrategy::Specialized, 4),
                (TileStrategy::Runtime, 2),
                (TileStrategy::Runtime, 4),
            ]
        );
    }

    #[test]
    fn test_args() {
        let mut s = sweep("tiled-matmul");
        assert_eq!(
            s.args(TileStrategy::Runtime, 8),
            ["64", "--tile", "8", "--strategy", "runtime"]
        );
        s.device = Some("host".to_string());
        assert_eq!(
            s.args(TileStrategy::Specialized, 2),
            ["64", "--tile", "2", "--strategy", "specialized", "--device", "host"]
        );
    }

    #[test]
    fn test_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let s = sweep(dir.path().join("absent").to_str().unwrap());
        let mut w = RecordWriter::new(Vec::new()).unwrap();
        assert!(matches!(s.run(&mut w, None), Err(SweepError::MissingBinary(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_runs_recorded() {
        let Some(bin) = unix_tool(["/bin/true", "/usr/bin/true"]) else {
            return;
        };
        let s = sweep(bin);
        let mut w = RecordWriter::new(Vec::new()).unwrap();
        let summary = s.run(&mut w, None).unwrap();
        assert_eq!(summary, SweepSummary {
                recorded: 12,
                failed: 0,
                compiled: 0
            });

        let text = String::from_utf8(w.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 13);
        assert!(text.lines().nth(1).unwrap().starts_with("specialized,2,1,"));
        assert!(text.lines().last().unwrap().starts_with("runtime,4,3,"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_runs_skipped() {
        let Some(bin) = unix_tool(["/bin/false", "/usr/bin/false"]) else {
            return;
        };
        let s = sweep(bin);
        let mut w = RecordWriter::new(Vec::new()).unwrap();
        let summary = s.run(&mut w, None).unwrap();
        assert_eq!(summary, SweepSummary {
                recorded: 0,
                failed: 12,
                compiled: 0
            });
        let text = String::from_utf8(w.into_inner()).unwrap();
        assert_eq!(text, "method,tile,repetition,duration_ms\n");
    }

    #[test]
    fn test_no_tiles() {
        let mut s = sweep("tiled-matmul");
        s.tiles.clear();
        let mut w = RecordWriter::new(Vec::new()).unwrap();
        assert!(matches!(s.run(&mut w, None), Err(SweepError::NoTiles)));
    }

    #[test]
    fn test_cargo_release_command() {
        let build = BuildCommand::cargo_release(PathBuf::from("cargo"));
        assert_eq!(build.program, PathBuf::from("cargo"));
        assert_eq!(build.args, ["build", "--release", "-p", "tm-cli"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_builds_recorded() {
        let Some(bin) = unix_tool(["/bin/true", "/usr/bin/true"]) else {
            return;
        };
        let mut s = sweep(bin);
        s.build = Some(stand_in_build(bin));
        let mut runs = RecordWriter::new(Vec::new()).unwrap();
        let mut compiles = RecordWriter::new(Vec::new()).unwrap();
        let summary = s.run(&mut runs, Some(&mut compiles)).unwrap();
        assert_eq!(
            summary,
            SweepSummary {
                recorded: 12,
                failed: 0,
                compiled: 4
            }
        );

        let text = String::from_utf8(compiles.into_inner()).unwrap();
        let rows: Vec<&str> = text.lines().skip(1).collect();
        assert_eq!(rows.len(), 4);
        assert!(rows[0].starts_with("specialized,2,1,"));
        assert!(rows[1].starts_with("specialized,4,1,"));
        assert!(rows[2].starts_with("runtime,2,1,"));
        assert!(rows[3].starts_with("runtime,4,1,"));

        // One runtime build serves every runtime tile.
        let duration = |row: &str| row.rsplit(',').next().unwrap().to_string();
        assert_eq!(duration(rows[2]), duration(rows[3]));

        let text = String::from_utf8(runs.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 13);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_build_skips_runs() {
        let (Some(bin), Some(fail)) = (
            unix_tool(["/bin/true", "/usr/bin/true"]),
            unix_tool(["/bin/false", "/usr/bin/false"]),
        ) else {
            return;
        };
        let mut s = sweep(bin);
        s.build = Some(stand_in_build(fail));
        let mut runs = RecordWriter::new(Vec::new()).unwrap();
        let mut compiles = RecordWriter::new(Vec::new()).unwrap();
        let summary = s.run(&mut runs, Some(&mut compiles)).unwrap();
        assert_eq!(
            summary,
            SweepSummary {
                recorded: 0,
                failed: 12,
                compiled: 0
            }
        );
        assert_eq!(
            String::from_utf8(compiles.into_inner()).unwrap(),
            "method,tile,repetition,duration_ms\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_built_binary_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let Some(ok) = unix_tool(["/bin/true", "/usr/bin/true"]) else {
            return;
        };
        let mut s = sweep(dir.path().join("absent").to_str().unwrap());
        s.build = Some(stand_in_build(ok));
        let mut runs = RecordWriter::new(Vec::new()).unwrap();
        let mut compiles = RecordWriter::new(Vec::new()).unwrap();
        assert!(matches!(
            s.run(&mut runs, Some(&mut compiles)),
            Err(SweepError::MissingBinary(_))
        ));
        // The first build was still recorded.
        let text = String::from_utf8(compiles.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
