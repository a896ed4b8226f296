//! Image reference parsing (`ParseImage` in spec terms).

use crate::error::{Error, Result};

/// A parsed `repo:tag` image reference.
///
/// `repo` is the *local* form as written on the command line (no implicit
/// `library/` prefix); [`Reference::registry_repo`] computes the
/// registry-facing form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Repository name, e.g. `"nginx"` or `"someorg/someapp"`.
    pub repo: String,
    /// Tag, e.g. `"1-alpine-perl"`. Never `"latest"`.
    pub tag: String,
}

impl Reference {
    /// Parses `"repo:tag"`.
    ///
    /// Rejects an empty repo, an empty tag, the `latest` tag, and any string
    /// with more than one `:` separator.
    pub fn parse(image: &str) -> Result<Self> {
        let parts: Vec<&str> = image.split(':').collect();
        let (repo, tag) = match parts.as_slice() {
            [repo, tag] => (*repo, *tag),
            [_] => {
                return Err(Error::InvalidReference(
                    image.to_owned(),
                    "missing tag (e.g. \"nginx:1-alpine-perl\")",
                ));
            }
            _ => {
                return Err(Error::InvalidReference(
                    image.to_owned(),
                    "too many ':' separators",
                ));
            }
        };

        if repo.is_empty() {
            return Err(Error::InvalidReference(image.to_owned(), "empty repository"));
        }
        if tag.is_empty() {
            return Err(Error::InvalidReference(image.to_owned(), "empty tag"));
        }
        if tag == "latest" {
            return Err(Error::InvalidReference(
                image.to_owned(),
                "the \"latest\" tag is not supported",
            ));
        }

        Ok(Self {
            repo: repo.to_owned(),
            tag: tag.to_owned(),
        })
    }

    /// The registry-facing repository name: prefixes `library/` for
    /// unqualified (no `/`) repos, same as Docker Hub's official-image
    /// convention.
    pub fn registry_repo(&self) -> String {
        if self.repo.contains('/') {
            self.repo.clone()
        } else {
            format!("library/{}", self.repo)
        }
    }

    /// The canonical `"repo:tag"` string, as stored in `containers/<id>/image`.
    pub fn display(&self) -> String {
        format!("{}:{}", self.repo, self.tag)
    }
}

/// Strips the `sha256:` prefix from a digest string.
///
/// Validates the prefix rather than blindly slicing seven characters, per
/// the open question flagged in the original design: a malformed digest
/// (missing or wrong prefix) is a [`Error::Codec`], not a panic or silent
/// truncation.
pub fn digest_hex(digest: &str) -> Result<&str> {
    digest
        .strip_prefix("sha256:")
        .filter(|hex| hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
        .ok_or_else(|| Error::Codec(format!("not a valid sha256 digest: {digest:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repo_and_tag() {
        let r = Reference::parse("nginx:1-alpine-perl").unwrap();
        assert_eq!(r.repo, "nginx");
        assert_eq!(r.tag, "1-alpine-perl");
    }

    #[test]
    fn rejects_missing_tag() {
        assert!(Reference::parse("nginx").is_err());
    }

    #[test]
    fn rejects_latest() {
        assert!(Reference::parse("nginx:latest").is_err());
    }

    #[test]
    fn rejects_extra_colon() {
        assert!(Reference::parse("a:b:c").is_err());
    }

    #[test]
    fn rejects_empty_repo_or_tag() {
        assert!(Reference::parse(":x").is_err());
        assert!(Reference::parse("x:").is_err());
    }

    #[test]
    fn registry_repo_prefixes_library() {
        assert_eq!(
            Reference::parse("nginx:1").unwrap().registry_repo(),
            "library/nginx"
        );
        assert_eq!(
            Reference::parse("someorg/app:1").unwrap().registry_repo(),
            "someorg/app"
        );
    }

    #[test]
    fn digest_hex_validates_prefix() {
        let d = "sha256:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
        assert_eq!(digest_hex(d).unwrap().len(), 64);
        assert!(digest_hex("aaaa").is_err());
    }
}
