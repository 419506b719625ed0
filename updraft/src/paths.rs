//! Storage key layout. Update clients read these paths directly, so the
//! formats here must not change.

pub const WINDOWS_MANIFEST: &str = "RELEASES";
pub const DARWIN_MANIFEST: &str = "RELEASES.json";

pub fn lock_key(app_slug: &str) -> String {
    format!("{app_slug}/.lock")
}

pub fn arch_dir(app_slug: &str, channel_id: &str, platform: &str, arch: &str) -> String {
    format!("{app_slug}/{channel_id}/{platform}/{arch}")
}

pub fn artifact_key(
    app_slug: &str,
    channel_id: &str,
    platform: &str,
    arch: &str,
    file_name: &str,
) -> String {
    format!("{}/{file_name}", arch_dir(app_slug, channel_id, platform, arch))
}

pub fn windows_manifest_key(app_slug: &str, channel_id: &str, arch: &str) -> String {
    artifact_key(app_slug, channel_id, "win32", arch, WINDOWS_MANIFEST)
}

pub fn darwin_manifest_key(app_slug: &str, channel_id: &str, arch: &str) -> String {
    artifact_key(app_slug, channel_id, "darwin", arch, DARWIN_MANIFEST)
}

/// Percentile-scoped copy of a manifest, e.g. `RELEASES-42`.
pub fn variant_key(manifest_key: &str, bucket: u8) -> String {
    format!("{manifest_key}-{bucket}")
}

pub fn latest_key(
    app_slug: &str,
    channel_id: &str,
    platform: &str,
    arch: &str,
    app_name: &str,
    extension: &str,
) -> String {
    format!("{app_slug}/{channel_id}/latest/{platform}/{arch}/{app_name}.{extension}")
}

pub fn ref_key(latest_key: &str) -> String {
    format!("{latest_key}.ref")
}

pub fn index_version_prefix(app_slug: &str, channel_id: &str, version: &str) -> String {
    format!("{app_slug}/{channel_id}/_index/{version}")
}

pub fn index_key(
    app_slug: &str,
    channel_id: &str,
    version: &str,
    platform: &str,
    arch: &str,
    file_name: &str,
) -> String {
    format!(
        "{}/{platform}/{arch}/{file_name}",
        index_version_prefix(app_slug, channel_id, version)
    )
}

pub fn draft_prefix(app_slug: &str, channel_id: &str, save_string: &str) -> String {
    format!("{app_slug}/{channel_id}/_drafts/{save_string}")
}

pub fn draft_key(app_slug: &str, channel_id: &str, save_string: &str, file_name: &str) -> String {
    format!("{}/{file_name}", draft_prefix(app_slug, channel_id, save_string))
}

pub fn versions_file_key(app_slug: &str, channel_id: &str) -> String {
    format!("{app_slug}/{channel_id}/versions.json")
}

/// Joins a public base URL and a storage key into an absolute URL.
pub fn public_url(base_url: &str, key: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        key.trim_start_matches('/')
    )
}

/// Extension of a file name without the leading dot, if any.
pub fn extension(file_name: &str) -> Option<&str> {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
}
