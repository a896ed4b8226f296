//! On-disk store layout: tag → digest → manifest → blobs → extracted layers.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::{self, Manifest};
use crate::error::{Error, Result};
use crate::fsutil;
use crate::reference::{digest_hex, Reference};

/// Owns the on-disk tree rooted at `root_dir` (spec §3's `RootDir`).
#[derive(Debug, Clone)]
pub struct Store {
    /// The store's root directory.
    root_dir: PathBuf,
}

impl Store {
    /// Creates a handle over the store rooted at `root_dir`. Does not touch
    /// the filesystem; call [`Store::init`] to create the top-level tree.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// The store's root directory.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Creates the top-level `images/`, `blobs/`, `layers/`, `containers/`
    /// directories. Fails if `root_dir` is empty: an unset root would
    /// otherwise silently resolve every store path relative to the process's
    /// current directory.
    pub fn init(&self) -> Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(Error::Filesystem("root dir is empty".into()));
        }
        for dir in ["images", "blobs", "layers", "containers"] {
            fsutil::ensure_dir(&self.root_dir.join(dir))?;
        }
        Ok(())
    }

    /// `images/<repo>/tags/<tag>`.
    pub fn tag_path(&self, reference: &Reference) -> PathBuf {
        self.root_dir
            .join("images")
            .join(&reference.repo)
            .join("tags")
            .join(&reference.tag)
    }

    /// `images/<repo>/manifests/<hex>/manifest.json`.
    pub fn manifest_path(&self, repo: &str, hex: &str) -> PathBuf {
        self.root_dir
            .join("images")
            .join(repo)
            .join("manifests")
            .join(hex)
            .join("manifest.json")
    }

    /// `blobs/<hex>`.
    pub fn blob_path(&self, hex: &str) -> PathBuf {
        self.root_dir.join("blobs").join(hex)
    }

    /// `blobs/` directory, used as the destination root for downloads.
    pub fn blobs_dir(&self) -> PathBuf {
        self.root_dir.join("blobs")
    }

    /// `layers/` directory.
    pub fn layers_dir(&self) -> PathBuf {
        self.root_dir.join("layers")
    }

    /// `layers/<hex>/`.
    pub fn layer_path(&self, hex: &str) -> PathBuf {
        self.layers_dir().join(hex)
    }

    /// `containers/<id>/`.
    pub fn container_dir(&self, id: &str) -> PathBuf {
        self.root_dir.join("containers").join(id)
    }

    /// Writes the tag pointer `images/<repo>/tags/<tag>` with contents
    /// `"sha256:<hex>"` (the full digest string, not trimmed).
    pub fn save_tag(&self, reference: &Reference, digest: &str) -> Result<()> {
        fsutil::atomic_save(&self.tag_path(reference), digest.as_bytes())
    }

    /// Reads a tag file, returning the raw `"sha256:<hex>"` digest string.
    pub fn read_tag(&self, reference: &Reference) -> Result<String> {
        let path = self.tag_path(reference);
        fs::read_to_string(&path)
            .map_err(|_| Error::NotFound(format!("no tag file for {}", reference.display())))
    }

    /// Atomically saves manifest bytes to their content-addressed path.
    pub fn save_manifest(&self, repo: &str, hex: &str, bytes: &[u8]) -> Result<()> {
        fsutil::atomic_save(&self.manifest_path(repo, hex), bytes)
    }

    /// Loads and decodes the manifest for `repo`/`hex`.
    pub fn load_manifest(&self, repo: &str, hex: &str) -> Result<Manifest> {
        let bytes = fs::read(self.manifest_path(repo, hex))?;
        codec::decode_manifest_auto(&bytes)
    }

    /// Resolves a reference all the way to its decoded manifest and hex
    /// digest, via its tag file.
    pub fn resolve(&self, reference: &Reference) -> Result<(String, Manifest)> {
        let digest = self.read_tag(reference)?;
        let hex = digest_hex(digest.trim()).map_err(|_| {
            Error::Codec(format!(
                "tag file for {} does not contain a valid digest",
                reference.display()
            ))
        })?;
        let manifest = self.load_manifest(&reference.repo, hex)?;
        Ok((hex.to_owned(), manifest))
    }

    /// Enumerates every `images/<repo>/tags/<tag>` as `"repo:tag"`.
    pub fn list_images(&self) -> Result<Vec<String>> {
        let images_dir = self.root_dir.join("images");
        let mut out = Vec::new();
        let Ok(repos) = fs::read_dir(&images_dir) else {
            return Ok(out);
        };
        for repo_entry in repos {
            let repo_entry = repo_entry?;
            if !repo_entry.file_type()?.is_dir() {
                continue;
            }
            let repo = repo_entry.file_name().to_string_lossy().into_owned();
            let tags_dir = repo_entry.path().join("tags");
            let Ok(tags) = fs::read_dir(&tags_dir) else {
                continue;
            };
            for tag_entry in tags {
                let tag_entry = tag_entry?;
                if !tag_entry.file_type()?.is_file() {
                    continue;
                }
                let tag = tag_entry.file_name().to_string_lossy().into_owned();
                out.push(format!("{repo}:{tag}"));
            }
        }
        out.sort();
        Ok(out)
    }

    /// Returns every container id whose `image` file contents equal
    /// `"repo:tag"`.
    pub fn containers_using_image(&self, reference: &str) -> Result<Vec<String>> {
        let containers_dir = self.root_dir.join("containers");
        let mut out = Vec::new();
        let Ok(entries) = fs::read_dir(&containers_dir) else {
            return Ok(out);
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let image_file = entry.path().join("image");
            if let Ok(contents) = fs::read_to_string(&image_file) {
                if contents.trim() == reference {
                    out.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
        }
        out.sort();
        Ok(out)
    }

    /// Walks every tag file under `images/*/tags/*`, loads each referenced
    /// manifest, and returns the set of hex-suffix digests (config + every
    /// layer) still in use. Malformed or missing manifests are skipped
    /// silently; they must not cause false negatives against other tags.
    pub fn referenced_digests(&self) -> Result<HashSet<String>> {
        let mut live = HashSet::new();
        let images_dir = self.root_dir.join("images");
        let Ok(repos) = fs::read_dir(&images_dir) else {
            return Ok(live);
        };
        for repo_entry in repos.flatten() {
            let Ok(file_type) = repo_entry.file_type() else {
                continue;
            };
            if !file_type.is_dir() {
                continue;
            }
            let repo = repo_entry.file_name().to_string_lossy().into_owned();
            let tags_dir = repo_entry.path().join("tags");
            let Ok(tags) = fs::read_dir(&tags_dir) else {
                continue;
            };
            for tag_entry in tags.flatten() {
                let Ok(digest) = fs::read_to_string(tag_entry.path()) else {
                    continue;
                };
                let Ok(hex) = digest_hex(digest.trim()) else {
                    continue;
                };
                let Ok(manifest) = self.load_manifest(&repo, hex) else {
                    continue;
                };
                if let Ok(config_hex) = digest_hex(&manifest.config.digest) {
                    live.insert(config_hex.to_owned());
                }
                for layer in &manifest.layers {
                    if let Ok(layer_hex) = digest_hex(&layer.digest) {
                        live.insert(layer_hex.to_owned());
                    }
                }
            }
        }
        Ok(live)
    }

    /// Best-effort removal (ignoring "not empty") of `images/<repo>/tags`,
    /// `images/<repo>/manifests`, `images/<repo>`.
    pub fn clean_empty_parents(&self, repo: &str) {
        let repo_dir = self.root_dir.join("images").join(repo);
        for sub in ["tags", "manifests"] {
            let _ = fs::remove_dir(repo_dir.join(sub));
        }
        let _ = fs::remove_dir(&repo_dir);
    }

    /// Refuses if any container's `image` file equals the reference
    /// (returning the first such id as [`Error::InUse`]). Otherwise removes
    /// the tag file and manifest directory, recomputes
    /// [`Store::referenced_digests`] over what remains, and removes every
    /// digest in the removed manifest that is no longer live. Best-effort
    /// removes the now-possibly-empty `images/<repo>` subtree.
    pub fn remove_image(&self, reference: &Reference) -> Result<()> {
        let display = reference.display();
        let using = self.containers_using_image(&display)?;
        if let Some(container_id) = using.into_iter().next() {
            return Err(Error::InUse {
                image: display,
                container_id,
            });
        }

        let (hex, manifest) = self.resolve(reference)?;
        let mut doomed = HashSet::new();
        if let Ok(config_hex) = digest_hex(&manifest.config.digest) {
            doomed.insert(config_hex.to_owned());
        }
        for layer in &manifest.layers {
            if let Ok(layer_hex) = digest_hex(&layer.digest) {
                doomed.insert(layer_hex.to_owned());
            }
        }

        let _ = fs::remove_file(self.tag_path(reference));
        let manifest_dir = self
            .root_dir
            .join("images")
            .join(&reference.repo)
            .join("manifests")
            .join(&hex);
        let _ = fs::remove_dir_all(&manifest_dir);

        let live = self.referenced_digests()?;
        for digest in doomed {
            if live.contains(&digest) {
                continue;
            }
            let _ = fs::remove_file(self.blob_path(&digest));
            let _ = fs::remove_dir_all(self.layer_path(&digest));
        }

        self.clean_empty_parents(&reference.repo);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, Store) {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path());
        store.init().unwrap();
        (tmp, store)
    }

    #[test]
    fn init_rejects_empty_root_dir() {
        let store = Store::new("");
        assert!(matches!(store.init(), Err(Error::Filesystem(_))));
    }

    #[test]
    fn paths_follow_layout() {
        let (_tmp, store) = store();
        let r = Reference::parse("nginx:1-alpine-perl").unwrap();
        assert!(store.tag_path(&r).ends_with("images/nginx/tags/1-alpine-perl"));
        assert!(store
            .manifest_path("nginx", "deadbeef")
            .ends_with("images/nginx/manifests/deadbeef/manifest.json"));
        assert!(store.blob_path("deadbeef").ends_with("blobs/deadbeef"));
        assert!(store.layer_path("deadbeef").ends_with("layers/deadbeef"));
    }

    #[test]
    fn save_and_read_tag_roundtrip() {
        let (_tmp, store) = store();
        let r = Reference::parse("nginx:1-alpine-perl").unwrap();
        let digest = "sha256:".to_string() + &"a".repeat(64);
        store.save_tag(&r, &digest).unwrap();
        assert_eq!(store.read_tag(&r).unwrap(), digest);
    }

    #[test]
    fn list_images_reports_repo_colon_tag() {
        let (_tmp, store) = store();
        let r = Reference::parse("nginx:1-alpine-perl").unwrap();
        let digest = "sha256:".to_string() + &"a".repeat(64);
        store.save_tag(&r, &digest).unwrap();
        assert_eq!(store.list_images().unwrap(), vec!["nginx:1-alpine-perl"]);
    }

    #[test]
    fn list_images_empty_store() {
        let (_tmp, store) = store();
        assert!(store.list_images().unwrap().is_empty());
    }

    #[test]
    fn containers_using_image_matches_contents() {
        let (_tmp, store) = store();
        let container_dir = store.container_dir("abc123def456");
        fs::create_dir_all(&container_dir).unwrap();
        fs::write(container_dir.join("image"), "nginx:1-alpine-perl").unwrap();
        let hits = store.containers_using_image("nginx:1-alpine-perl").unwrap();
        assert_eq!(hits, vec!["abc123def456"]);
        assert!(store
            .containers_using_image("other:tag")
            .unwrap()
            .is_empty());
    }

    fn digest_of(byte: u8) -> String {
        format!("sha256:{}", hex::encode([byte; 32]))
    }

    /// Pulls a fake image: writes its manifest, tag file, and empty blob
    /// placeholders for config + layers, without going through the real
    /// registry/pull path.
    fn plant_image(store: &Store, reference: &Reference, config: &str, layers: &[&str]) {
        let manifest = Manifest {
            schema_version: 2,
            media_type: None,
            config: codec::Descriptor {
                media_type: "application/vnd.oci.image.config.v1+json".into(),
                digest: config.into(),
                size: 1,
                platform: None,
            },
            layers: layers
                .iter()
                .map(|d| codec::Descriptor {
                    media_type: "application/vnd.oci.image.layer.v1.tar+gzip".into(),
                    digest: (*d).to_string(),
                    size: 1,
                    platform: None,
                })
                .collect(),
        };
        let bytes = serde_json::to_vec(&manifest).unwrap();
        // This fake setup keys the manifest file by the config digest's hex,
        // standing in for the real manifest's own content digest.
        let manifest_hex = digest_hex(config).unwrap();
        store.save_manifest(&reference.repo, manifest_hex, &bytes).unwrap();
        store
            .save_tag(reference, &format!("sha256:{manifest_hex}"))
            .unwrap();
        for digest in std::iter::once(config).chain(layers.iter().copied()) {
            let hex = digest_hex(digest).unwrap();
            fs::write(store.blob_path(hex), b"x").unwrap();
            fs::create_dir_all(store.layer_path(hex)).unwrap();
        }
    }

    #[test]
    fn remove_image_refuses_when_in_use() {
        let (_tmp, store) = store();
        let r = Reference::parse("nginx:1-alpine-perl").unwrap();
        plant_image(&store, &r, &digest_of(1), &[digest_of(2).as_str()]);
        let container_dir = store.container_dir("abc123def456");
        fs::create_dir_all(&container_dir).unwrap();
        fs::write(container_dir.join("image"), "nginx:1-alpine-perl").unwrap();

        let err = store.remove_image(&r).unwrap_err();
        assert!(matches!(err, Error::InUse { .. }));
        assert!(store.tag_path(&r).exists());
    }

    #[test]
    fn remove_image_keeps_digests_shared_by_another_tag() {
        let (_tmp, store) = store();
        let shared_layer = digest_of(9);
        let r1 = Reference::parse("nginx:1.25-alpine").unwrap();
        let r2 = Reference::parse("nginx:1-alpine-perl").unwrap();
        plant_image(&store, &r1, &digest_of(1), &[shared_layer.as_str()]);
        plant_image(&store, &r2, &digest_of(2), &[shared_layer.as_str()]);

        store.remove_image(&r1).unwrap();

        assert!(!store.tag_path(&r1).exists());
        assert!(!store.blob_path(digest_hex(&digest_of(1)).unwrap()).exists());
        assert!(store.blob_path(digest_hex(&shared_layer).unwrap()).exists());
        assert!(store
            .layer_path(digest_hex(&shared_layer).unwrap())
            .exists());
    }

    #[test]
    fn referenced_digests_skips_malformed_manifest() {
        let (_tmp, store) = store();
        let r = Reference::parse("nginx:1-alpine-perl").unwrap();
        let hex = digest_hex(&digest_of(1)).unwrap();
        store.save_tag(&r, &format!("sha256:{hex}")).unwrap();
        // no manifest written at images/nginx/manifests/<hex>/manifest.json
        let live = store.referenced_digests().unwrap();
        assert!(live.is_empty());
    }
}
