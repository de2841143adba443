//! Kernel source loading and host-side compilation.
//!
//! Kernel sources are WGSL files that may pull in shared declarations with
//! `#include "file.wgsl"` lines. Includes are resolved against the kernel's own
//! directory first, then the configured include dirs, and each file is spliced in
//! at most once. The expanded source is parsed and validated with naga so that a
//! broken kernel is reported with a full diagnostic log before any device
//! resources are created for it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::error::ComputeError;

pub(crate) const ENTRY_SIMULATE: &str = "simulate";
pub(crate) const ENTRY_RENDER_BACKGROUND: &str = "render_background";
pub(crate) const ENTRY_RENDER_PARTICLES: &str = "render_particles";

const INCLUDE_DIRECTIVE: &str = "#include";

/// Raw kernel text and the file it came from.
#[derive(Debug, Clone)]
pub(crate) struct KernelSource {
    pub path: PathBuf,
    pub text: String,
}

impl KernelSource {
    /// Reads the first candidate that exists.
    pub(crate) fn load(candidates: &[PathBuf]) -> Result<Self, ComputeError> {
        let mut last_error = None;
        for path in candidates {
            match std::fs::read_to_string(path) {
                Ok(text) => {
                    log::info!("Loaded kernel source from {}", path.display());
                    return Ok(Self {
                        path: path.clone(),
                        text,
                    });
                }
                Err(source) => {
                    log::debug!("Kernel candidate {} unavailable: {source}", path.display());
                    last_error = Some((path.clone(), source));
                }
            }
        }

        let (path, source) = last_error.unwrap_or_else(|| {
            (
                PathBuf::new(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "no kernel paths configured"),
            )
        });
        Err(ComputeError::KernelSource { path, source })
    }
}

/// Names of the three kernels, checked to exist as compute entry points.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EntryPoints {
    pub simulate: &'static str,
    pub render_background: &'static str,
    pub render_particles: &'static str,
}

/// A kernel module that passed host-side validation.
#[derive(Debug)]
pub(crate) struct CompiledKernel {
    /// Source with every include spliced in; handed to the device as-is.
    pub source: String,
    pub module: naga::Module,
}

impl CompiledKernel {
    /// Looks up the three kernels. Fails on the first one missing.
    pub(crate) fn resolve_entry_points(&self) -> Result<EntryPoints, ComputeError> {
        for name in [ENTRY_SIMULATE, ENTRY_RENDER_BACKGROUND, ENTRY_RENDER_PARTICLES] {
            let found = self
                .module
                .entry_points
                .iter()
                .any(|entry| entry.name == name && entry.stage == naga::ShaderStage::Compute);
            if !found {
                return Err(ComputeError::EntryPointMissing {
                    name: name.to_string(),
                });
            }
        }

        Ok(EntryPoints {
            simulate: ENTRY_SIMULATE,
            render_background: ENTRY_RENDER_BACKGROUND,
            render_particles: ENTRY_RENDER_PARTICLES,
        })
    }
}

/// A validated kernel whose three entry points are known to exist.
#[derive(Debug)]
pub(crate) struct PreparedKernel {
    pub compiled: CompiledKernel,
    pub entry_points: EntryPoints,
}

/// Host-side kernel setup: load the first readable candidate, compile it, then
/// resolve the entry points. A compile failure returns before entry point lookup.
pub(crate) fn prepare(candidates: &[PathBuf], include_dirs: &[PathBuf]) -> Result<PreparedKernel, ComputeError> {
    let source = KernelSource::load(candidates)?;
    let compiled = compile(&source, include_dirs)?;
    let entry_points = compiled.resolve_entry_points()?;
    Ok(PreparedKernel { compiled, entry_points })
}

/// Expands includes, then parses and validates the result.
pub(crate) fn compile(source: &KernelSource, include_dirs: &[PathBuf]) -> Result<CompiledKernel, ComputeError> {
    let expanded = resolve_includes(source, include_dirs)?;

    let module = naga::front::wgsl::parse_str(&expanded).map_err(|err| ComputeError::CompileError {
        log: err.emit_to_string(&expanded),
    })?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    validator
        .validate(&module)
        .map_err(|err| ComputeError::CompileError {
            log: err.emit_to_string(&expanded),
        })?;

    log::debug!(
        "Kernel {} validated ({} entry points)",
        source.path.display(),
        module.entry_points.len()
    );

    Ok(CompiledKernel {
        source: expanded,
        module,
    })
}

/// Splices `#include "name"` lines into the source.
pub(crate) fn resolve_includes(source: &KernelSource, include_dirs: &[PathBuf]) -> Result<String, ComputeError> {
    let mut search_path = Vec::with_capacity(include_dirs.len() + 1);
    if let Some(parent) = source.path.parent() {
        search_path.push(parent.to_path_buf());
    }
    search_path.extend(include_dirs.iter().cloned());

    let mut included = HashSet::new();
    let mut out = String::with_capacity(source.text.len());
    expand(&source.text, &source.path, &search_path, &mut included, &mut out)?;
    Ok(out)
}

fn expand(
    text: &str,
    from: &Path,
    search_path: &[PathBuf],
    included: &mut HashSet<PathBuf>,
    out: &mut String,
) -> Result<(), ComputeError> {
    for line in text.lines() {
        let Some(name) = parse_include(line) else {
            out.push_str(line);
            out.push('\n');
            continue;
        };

        let path = search_path
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| ComputeError::Include {
                name: name.to_string(),
                from: from.to_path_buf(),
            })?;

        // Include once
        let key = path.canonicalize().unwrap_or_else(|_| path.clone());
        if !included.insert(key) {
            continue;
        }

        let nested = std::fs::read_to_string(&path)
            .map_err(|source| ComputeError::KernelSource { path: path.clone(), source })?;
        expand(&nested, &path, search_path, included, out)?;
    }
    Ok(())
}

fn parse_include(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix(INCLUDE_DIRECTIVE)?;
    let name = rest.trim().strip_prefix('"')?.strip_suffix('"')?;
    (!name.is_empty()).then_some(name)
}
