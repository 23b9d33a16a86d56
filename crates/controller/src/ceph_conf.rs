//! Rendering of the daemon configuration file.

use std::path::Path;

use tracing::info;

static CEPH_CONF_TEMPLATE: &str = include_str!("../templates/ceph.conf");

/// Renders the daemon configuration for the given monitor endpoints.
///
/// The output depends only on its inputs, so every node holding the same
/// sorted endpoint list renders an identical file.
#[must_use]
pub fn render(fsid: &str, endpoints: &[String]) -> String {
    CEPH_CONF_TEMPLATE
        .replace("{mon_hosts}", &endpoints.join(" "))
        .replace("{fsid}", fsid)
}

/// Renders and writes the daemon configuration to `path`.
///
/// # Errors
///
/// Returns an error if the parent directory or the file cannot be written.
pub async fn write(path: &Path, fsid: &str, endpoints: &[String]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    tokio::fs::write(path, render(fsid, endpoints)).await?;

    info!("wrote {} with {} monitor(s)", path.display(), endpoints.len());

    Ok(())
}
