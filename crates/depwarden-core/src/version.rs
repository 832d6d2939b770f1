use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::{BuildMetadata, Prerelease, Version};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("version string is empty")]
    Empty,
    #[error("invalid version '{input}': release segment '{segment}' is not numeric")]
    NonNumericRelease { input: String, segment: String },
    #[error("invalid version '{input}': epoch '{epoch}' is not numeric")]
    InvalidEpoch { input: String, epoch: String },
    #[error("invalid version '{input}': unsupported suffix '{suffix}'")]
    UnsupportedSuffix { input: String, suffix: String },
}

/// A package version as published by a package index.
///
/// Accepts strict semver as well as the looser shapes Python packaging uses
/// (`1.1`, `2.0rc1`, `1.0.post2`, `1!2.0`, `1.2.3.4`, `v3`). The original text is preserved for
/// display and serialization; ordering and equality use the normalized form.
/// Epochs, release components past the third, and post segments are kept in
/// the build metadata, so they only break ties between otherwise equal versions.
#[derive(Debug, Clone)]
pub struct PackageVersion {
    raw: String,
    version: Version,
}

impl PackageVersion {
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(VersionError::Empty);
        }

        let unprefixed = raw
            .strip_prefix('v')
            .or_else(|| raw.strip_prefix('V'))
            .unwrap_or(raw);

        if let Ok(version) = Version::parse(unprefixed) {
            return Ok(Self {
                raw: raw.to_string(),
                version,
            });
        }

        let version = normalize_loose(raw, unprefixed)?;
        Ok(Self {
            raw: raw.to_string(),
            version,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn semver(&self) -> &Version {
        &self.version
    }

    pub fn major(&self) -> u64 {
        self.version.major
    }

    pub fn is_prerelease(&self) -> bool {
        !self.version.pre.is_empty()
    }
}

fn normalize_loose(raw: &str, input: &str) -> Result<Version, VersionError> {
    let (epoch, input) = match input.split_once('!') {
        Some((epoch, rest)) => {
            let epoch = epoch
                .parse::<u64>()
                .map_err(|_| VersionError::InvalidEpoch {
                    input: raw.to_string(),
                    epoch: epoch.to_string(),
                })?;
            (Some(epoch), rest)
        }
        None => (None, input),
    };
    let (public, local) = match input.split_once('+') {
        Some((public, local)) => (public, Some(local)),
        None => (input, None),
    };

    let release_end = public
        .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
        .unwrap_or(public.len());
    let release = public[..release_end].trim_end_matches('.');
    let suffix = &public[release.len()..];

    if release.is_empty() {
        return Err(VersionError::NonNumericRelease {
            input: raw.to_string(),
            segment: public.to_string(),
        });
    }

    let mut components = Vec::new();
    for segment in release.split('.') {
        let value = segment
            .parse::<u64>()
            .map_err(|_| VersionError::NonNumericRelease {
                input: raw.to_string(),
                segment: segment.to_string(),
            })?;
        components.push(value);
    }
    let extra_release = components.split_off(components.len().min(3));
    components.resize(3, 0);

    let mut version = Version::new(components[0], components[1], components[2]);
    let suffixes = parse_suffixes(raw, suffix)?;

    let mut pre = Vec::new();
    if let Some((label, number)) = suffixes.pre {
        pre.push(format!("{label}.{number}"));
    }
    let mut post = Vec::new();
    if let Some(number) = suffixes.post {
        post.push(format!("post.{number}"));
    }
    // dev attaches to the segment it follows; a bare dev release is a pre-release
    if let Some(number) = suffixes.dev {
        let dev = format!("dev.{number}");
        if !post.is_empty() {
            post.push(dev);
        } else {
            pre.push(dev);
        }
    }
    if !pre.is_empty() {
        version.pre = Prerelease::new(&pre.join(".")).map_err(|_| {
            VersionError::UnsupportedSuffix {
                input: raw.to_string(),
                suffix: suffix.to_string(),
            }
        })?;
    }

    let mut build = Vec::new();
    if let Some(epoch) = epoch {
        build.push(format!("epoch.{epoch}"));
    }
    if !extra_release.is_empty() {
        let extra: Vec<String> = extra_release.iter().map(ToString::to_string).collect();
        build.push(format!("rel.{}", extra.join(".")));
    }
    build.extend(post);
    if let Some(local) = local {
        build.push(local.replace(['_', '-'], "."));
    }
    if !build.is_empty() {
        version.build = BuildMetadata::new(&build.join(".")).map_err(|_| {
            VersionError::UnsupportedSuffix {
                input: raw.to_string(),
                suffix: build.join("."),
            }
        })?;
    }

    Ok(version)
}

#[derive(Debug, Default)]
struct Suffixes {
    pre: Option<(&'static str, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
}

/// Splits the text after the release into its pre, post and dev segments,
/// which must appear at most once each and in that order.
fn parse_suffixes(raw: &str, suffix: &str) -> Result<Suffixes, VersionError> {
    let lowered = suffix.to_ascii_lowercase();
    let unsupported = || VersionError::UnsupportedSuffix {
        input: raw.to_string(),
        suffix: suffix.to_string(),
    };

    let mut suffixes = Suffixes::default();
    let mut phase = 0;
    let mut rest = lowered.trim_start_matches(['-', '_', '.']);
    while !rest.is_empty() {
        let label_end = rest
            .find(|ch: char| !ch.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let label = &rest[..label_end];
        let after_label = rest[label_end..].trim_start_matches(['-', '_', '.']);
        let digits_end = after_label
            .find(|ch: char| !ch.is_ascii_digit())
            .unwrap_or(after_label.len());
        let digits = &after_label[..digits_end];
        if label.is_empty() && digits.is_empty() {
            return Err(unsupported());
        }
        let number = if digits.is_empty() {
            0
        } else {
            digits.parse::<u64>().map_err(|_| unsupported())?
        };

        let next_phase = match label {
            "a" | "alpha" => {
                suffixes.pre = Some(("alpha", number));
                1
            }
            "b" | "beta" => {
                suffixes.pre = Some(("beta", number));
                1
            }
            "c" | "rc" | "pre" | "preview" => {
                suffixes.pre = Some(("rc", number));
                1
            }
            "post" | "rev" | "r" | "" => {
                suffixes.post = Some(number);
                2
            }
            "dev" => {
                suffixes.dev = Some(number);
                3
            }
            _ => return Err(unsupported()),
        };
        if next_phase <= phase {
            return Err(unsupported());
        }
        phase = next_phase;
        rest = after_label[digits_end..].trim_start_matches(['-', '_', '.']);
    }

    Ok(suffixes)
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for PackageVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
    }
}

impl Eq for PackageVersion {}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version.cmp(&other.version)
    }
}

impl Serialize for PackageVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for PackageVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
