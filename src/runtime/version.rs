//! Parser for `java -version` output

use regex::Regex;
use std::sync::LazyLock;

// The pattern is a constant; compiling it cannot fail at runtime
#[allow(clippy::expect_used)]
static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"version "([^"]+)""#).expect("valid version pattern"));

/// Version reported by a Java runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaVersion {
    /// Version string as printed, e.g. `17.0.2` or `1.8.0_292`
    pub raw: String,
    /// Major version, e.g. `17` or `8`
    pub major: u32,
}

/// Extract the version from `java -version` output
///
/// Handles both vendors' banners (`java version "1.8.0_292"`,
/// `openjdk version "21.0.1" 2023-10-17`). Returns `None` when no quoted version
/// is present, which is the case for anything that is not a Java launcher.
pub fn parse_java_version(output: &str) -> Option<JavaVersion> {
    let captures = VERSION_PATTERN.captures(output)?;
    let raw = captures.get(1)?.as_str().to_string();
    let major = major_version(&raw)?;
    Some(JavaVersion { raw, major })
}

/// Major version of a Java version string
///
/// Legacy scheme `1.x.y_z` maps to `x`; the modern scheme maps to its first
/// component. Pre-release and build suffixes (`22-ea`, `17.0.2+8`) are ignored.
pub fn major_version(version: &str) -> Option<u32> {
    let mut parts = version
        .trim()
        .split(|c: char| !c.is_ascii_digit())
        .filter(|p| !p.is_empty());

    let first: u32 = parts.next()?.parse().ok()?;
    if first == 1 {
        match parts.next() {
            Some(second) => second.parse().ok(),
            None => Some(1),
        }
    } else {
        Some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_openjdk_banner() {
        let output = "openjdk version \"17.0.2\" 2022-01-18\n\
                      OpenJDK Runtime Environment (build 17.0.2+8-86)\n\
                      OpenJDK 64-Bit Server VM (build 17.0.2+8-86, mixed mode, sharing)";

        let version = parse_java_version(output);
        assert_eq!(
            version,
            Some(JavaVersion {
                raw: "17.0.2".into(),
                major: 17
            })
        );
    }

    #[test]
    fn parses_legacy_oracle_banner() {
        let output = "java version \"1.8.0_292\"\nJava(TM) SE Runtime Environment";

        let version = parse_java_version(output).map(|v| v.major);
        assert_eq!(version, Some(8));
    }

    #[test]
    fn parses_bare_major_and_early_access() {
        assert_eq!(major_version("21"), Some(21));
        assert_eq!(major_version("22-ea"), Some(22));
        assert_eq!(major_version("17.0.2+8"), Some(17));
        assert_eq!(major_version("1.7.0_80"), Some(7));
    }

    #[test]
    fn rejects_non_java_output() {
        assert_eq!(
            parse_java_version("'java' is not recognized as an internal or external command"),
            None
        );
        assert_eq!(parse_java_version(""), None);
        assert_eq!(parse_java_version("version \"beta\""), None);
    }
}
