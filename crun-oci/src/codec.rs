//! OCI image index/manifest/config decoding and platform selection.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// `(media_type, digest, size)` plus whatever else a descriptor carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    /// The descriptor's media type, e.g. `"application/vnd.oci.image.manifest.v1+json"`.
    #[serde(rename = "mediaType")]
    pub media_type: String,
    /// `"sha256:<hex>"`.
    pub digest: String,
    /// Size in bytes, as reported by the registry.
    pub size: u64,
    /// Platform qualifier, present on entries inside an [`Index`].
    #[serde(default)]
    pub platform: Option<Platform>,
}

/// `(os, architecture, variant?)` as carried on index entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    /// e.g. `"linux"`.
    pub os: String,
    /// e.g. `"amd64"`, `"arm64"`.
    pub architecture: String,
    /// e.g. `"v8"` for arm variants. Ignored by [`select_platform_manifest`].
    #[serde(default)]
    pub variant: Option<String>,
}

/// A multi-arch image index: schema version plus an ordered list of
/// platform-qualified manifest descriptors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    /// OCI schema version, always `2`.
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    /// The index's own media type.
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
    /// Per-platform manifest descriptors, in registry order.
    pub manifests: Vec<Descriptor>,
}

/// A single-platform image manifest: one config descriptor plus ordered
/// layer descriptors (base layer first, top layer last).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// OCI schema version, always `2`.
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    /// The manifest's own media type.
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
    /// The image config blob's descriptor.
    pub config: Descriptor,
    /// Layer descriptors, base first, top last.
    pub layers: Vec<Descriptor>,
}

/// The nested runtime-config block of an [`ImageConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// `K=V` environment entries.
    #[serde(rename = "Env", default)]
    pub env: Vec<String>,
    /// Entrypoint argv, if set.
    #[serde(rename = "Entrypoint", default)]
    pub entrypoint: Vec<String>,
    /// Default command argv, if set.
    #[serde(rename = "Cmd", default)]
    pub cmd: Vec<String>,
    /// Working directory; empty means unset (caller defaults to `/`).
    #[serde(rename = "WorkingDir", default)]
    pub working_dir: String,
    /// Declared exposed ports, `"<port>/<proto>"` keys.
    #[serde(rename = "ExposedPorts", default)]
    pub exposed_ports: serde_json::Map<String, serde_json::Value>,
    /// The signal used to request graceful termination, e.g. `"SIGTERM"`.
    #[serde(rename = "StopSignal", default)]
    pub stop_signal: String,
}

/// An OCI image config blob (the JSON pointed to by a manifest's `config`
/// descriptor).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageConfig {
    /// CPU architecture, e.g. `"amd64"`.
    #[serde(default)]
    pub architecture: String,
    /// Operating system, e.g. `"linux"`.
    #[serde(default)]
    pub os: String,
    /// The nested runtime settings, under the `"config"` key in the blob.
    #[serde(rename = "config", default)]
    pub runtime: RuntimeConfig,
}

/// The host `(os, architecture)` pair, as observed at runtime.
#[derive(Debug, Clone, Copy)]
pub struct HostPlatform {
    /// `std::env::consts::OS`, e.g. `"linux"`.
    pub os: &'static str,
    /// OCI/Docker architecture name, e.g. `"amd64"`, `"arm64"`.
    pub arch: &'static str,
}

impl HostPlatform {
    /// The platform this binary was compiled for, with `arch` translated
    /// from Rust's `std::env::consts::ARCH` naming to the OCI/Docker
    /// naming registries use (`"x86_64"` -> `"amd64"`, `"aarch64"` ->
    /// `"arm64"`) — the two vocabularies disagree even though `os` happens
    /// to match.
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS,
            arch: oci_arch(std::env::consts::ARCH),
        }
    }
}

/// Maps a `std::env::consts::ARCH` value to its OCI/Docker equivalent.
/// Unrecognized values pass through unchanged.
fn oci_arch(rust_arch: &'static str) -> &'static str {
    match rust_arch {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "arm" => "arm",
        other => other,
    }
}

/// The base64-JSON sniff prefix used by [`decode_index`] and
/// [`decode_manifest_auto`]: `base64("{"`.
const BASE64_JSON_PREFIX: &str = "eyJ";

/// Decodes an image index, transparently unwrapping a base64-JSON payload.
pub fn decode_index(bytes: &[u8]) -> Result<Index> {
    let json = unwrap_base64_json(bytes)?;
    Ok(serde_json::from_slice(&json)?)
}

/// Decodes a single-platform manifest: JSON if it starts with `{`, else
/// base64-JSON.
pub fn decode_manifest_auto(bytes: &[u8]) -> Result<Manifest> {
    let json = unwrap_base64_json(bytes)?;
    Ok(serde_json::from_slice(&json)?)
}

/// Decodes an image config blob: same auto-detection as
/// [`decode_manifest_auto`].
pub fn decode_image_config(bytes: &[u8]) -> Result<ImageConfig> {
    let json = unwrap_base64_json(bytes)?;
    Ok(serde_json::from_slice(&json)?)
}

/// Returns `bytes` unchanged if it looks like raw JSON (`{` first, or the
/// known base64 sniff prefix is absent), else base64-decodes it first.
fn unwrap_base64_json(bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.first() == Some(&b'{') {
        return Ok(bytes.to_vec());
    }
    if bytes.starts_with(BASE64_JSON_PREFIX.as_bytes()) {
        use base64::Engine as _;
        return base64::engine::general_purpose::STANDARD
            .decode(bytes)
            .map_err(|e| Error::Codec(format!("base64 decode: {e}")));
    }
    Ok(bytes.to_vec())
}

/// Returns the first index entry whose `os` and `architecture` both match.
/// `variant` is ignored. Fails with [`Error::NotFound`] if none match.
pub fn select_platform_manifest(index: &Index, os: &str, arch: &str) -> Result<&Descriptor> {
    index
        .manifests
        .iter()
        .find(|d| {
            d.platform
                .as_ref()
                .is_some_and(|p| p.os == os && p.architecture == arch)
        })
        .ok_or_else(|| Error::NotFound(format!("no manifest for {os}/{arch}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> Index {
        Index {
            schema_version: 2,
            media_type: None,
            manifests: vec![
                Descriptor {
                    media_type: "application/vnd.oci.image.manifest.v1+json".into(),
                    digest: "sha256:aaaa".into(),
                    size: 1,
                    platform: Some(Platform {
                        os: "linux".into(),
                        architecture: "arm64".into(),
                        variant: None,
                    }),
                },
                Descriptor {
                    media_type: "application/vnd.oci.image.manifest.v1+json".into(),
                    digest: "sha256:bbbb".into(),
                    size: 1,
                    platform: Some(Platform {
                        os: "linux".into(),
                        architecture: "amd64".into(),
                        variant: None,
                    }),
                },
            ],
        }
    }

    #[test]
    fn oci_arch_translates_rust_triple_names() {
        assert_eq!(oci_arch("x86_64"), "amd64");
        assert_eq!(oci_arch("aarch64"), "arm64");
        assert_eq!(oci_arch("riscv64"), "riscv64");
    }

    #[test]
    fn selects_matching_platform() {
        let idx = sample_index();
        let d = select_platform_manifest(&idx, "linux", "amd64").unwrap();
        assert_eq!(d.digest, "sha256:bbbb");
    }

    #[test]
    fn fails_on_platform_mismatch() {
        let idx = sample_index();
        assert!(matches!(
            select_platform_manifest(&idx, "linux", "riscv64"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn decodes_raw_json_manifest() {
        let raw = br#"{"schemaVersion":2,"config":{"mediaType":"a","digest":"sha256:c","size":1},"layers":[]}"#;
        let m = decode_manifest_auto(raw).unwrap();
        assert_eq!(m.schema_version, 2);
        assert_eq!(m.config.digest, "sha256:c");
    }

    #[test]
    fn image_config_strips_config_wrapper() {
        let raw = br#"{"architecture":"amd64","os":"linux","config":{"Env":["A=B"],"Entrypoint":["/bin/sh"],"Cmd":["-c","true"]}}"#;
        let cfg = decode_image_config(raw).unwrap();
        assert_eq!(cfg.runtime.env, vec!["A=B".to_string()]);
        assert_eq!(cfg.runtime.entrypoint, vec!["/bin/sh".to_string()]);
    }
}
