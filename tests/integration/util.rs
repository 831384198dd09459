//! Shared helpers for the integration suite.

use std::path::PathBuf;
use std::sync::Once;

use anyhow::{Context, Result};

static INIT: Once = Once::new();

/// Initialize tracing once for the whole test binary. Honors RUST_LOG.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Per-test scratch directory under the system temp dir.
pub fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join(format!("ferry-integration-{}", std::process::id()))
        .join(name);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Write an input file and return its path.
pub fn write_input(dir: &std::path::Path, name: &str, data: &[u8]) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, data).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Deterministic non-repeating test bytes.
pub fn pattern_bytes(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i.wrapping_mul(31).wrapping_add(i >> 8) % 251) as u8)
        .collect()
}
