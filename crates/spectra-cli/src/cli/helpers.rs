use anyhow::{Context, bail};
use globset::{Glob, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};

/// Expands a mix of literal paths and glob patterns. Literal paths must
/// exist; a pattern matches recursively under the current directory.
pub(super) fn expand_inputs(patterns: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for pattern in patterns {
        let literal = PathBuf::from(pattern);
        if literal.is_file() {
            files.push(literal);
            continue;
        }

        if !pattern.contains(['*', '?', '[']) {
            bail!("input '{pattern}' does not exist");
        }

        let glob = Glob::new(pattern)
            .with_context(|| format!("invalid glob pattern '{pattern}'"))?;
        let set = GlobSetBuilder::new().add(glob).build()?;

        let mut candidates = Vec::new();
        walk_files(Path::new("."), &mut candidates)?;

        let before = files.len();
        for candidate in candidates {
            let relative = candidate.strip_prefix(".").unwrap_or(&candidate);
            if set.is_match(relative) {
                files.push(candidate.clone());
            }
        }
        if files.len() == before {
            bail!("pattern '{pattern}' matched no files");
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn walk_files(dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("cannot read directory '{}'", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

pub(super) fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("cannot read input '{}'", path.display()))
}

/// `LOW,HIGH` viewport argument.
pub(super) fn parse_viewport(raw: &str) -> anyhow::Result<(f64, f64)> {
    let Some((low, high)) = raw.split_once(',') else {
        bail!("viewport must be 'LOW,HIGH', got '{raw}'");
    };
    let low: f64 = low.trim().parse().context("viewport low bound")?;
    let high: f64 = high.trim().parse().context("viewport high bound")?;
    if !low.is_finite() || !high.is_finite() || low >= high {
        bail!("viewport bounds must be finite with LOW < HIGH");
    }
    Ok((low, high))
}
