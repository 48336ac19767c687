//! Catalog of target format identifiers understood by the converter
//!
//! Identifiers are keyed by `(edition, game version)`: `(Bedrock, "1.21.70")` is
//! `BEDROCK_1_21_70`. The catalog only drives selection and classification; the
//! converter remains the authority on what it accepts, and identifiers outside the
//! catalog are passed through as [`TargetFormat::Custom`](crate::TargetFormat).

use crate::types::Edition;

const JAVA_FORMATS: &[&str] = &[
    "JAVA_1_8_8",
    "JAVA_1_9",
    "JAVA_1_9_3",
    "JAVA_1_10",
    "JAVA_1_10_2",
    "JAVA_1_11",
    "JAVA_1_11_2",
    "JAVA_1_12",
    "JAVA_1_12_2",
    "JAVA_1_13",
    "JAVA_1_13_2",
    "JAVA_1_14",
    "JAVA_1_14_4",
    "JAVA_1_15",
    "JAVA_1_15_2",
    "JAVA_1_16",
    "JAVA_1_16_5",
    "JAVA_1_17",
    "JAVA_1_17_1",
    "JAVA_1_18",
    "JAVA_1_18_2",
    "JAVA_1_19",
    "JAVA_1_19_4",
    "JAVA_1_20",
    "JAVA_1_20_5",
    "JAVA_1_20_6",
    "JAVA_1_21",
    "JAVA_1_21_5",
];

const BEDROCK_FORMATS: &[&str] = &[
    "BEDROCK_1_12",
    "BEDROCK_1_13",
    "BEDROCK_1_13_60",
    "BEDROCK_1_14",
    "BEDROCK_1_14_60",
    "BEDROCK_1_16",
    "BEDROCK_1_16_220",
    "BEDROCK_1_17",
    "BEDROCK_1_17_40",
    "BEDROCK_1_18",
    "BEDROCK_1_18_30",
    "BEDROCK_1_19",
    "BEDROCK_1_19_80",
    "BEDROCK_1_20",
    "BEDROCK_1_20_80",
    "BEDROCK_1_21",
    "BEDROCK_1_21_70",
];

/// All known identifiers for an edition, oldest first
pub fn formats(edition: Edition) -> &'static [&'static str] {
    match edition {
        Edition::Java => JAVA_FORMATS,
        Edition::Bedrock => BEDROCK_FORMATS,
    }
}

/// Newest known identifier for an edition (the default selection)
pub fn latest(edition: Edition) -> &'static str {
    let list = formats(edition);
    // Both lists are non-empty constants
    list[list.len() - 1]
}

/// Edition of a catalog identifier, `None` if the identifier is not in the catalog
pub fn edition_of(id: &str) -> Option<Edition> {
    Edition::ALL
        .into_iter()
        .find(|edition| formats(*edition).contains(&id))
}

/// Identifier for a dotted game version, e.g. `(Java, "1.20.5")` → `JAVA_1_20_5`
pub fn lookup(edition: Edition, game_version: &str) -> Option<&'static str> {
    let wanted = format!(
        "{}{}",
        edition.format_prefix(),
        game_version.trim().replace('.', "_")
    );
    formats(edition).iter().copied().find(|id| *id == wanted)
}

/// Dotted game version of an identifier, e.g. `BEDROCK_1_21_70` → `1.21.70`
pub fn game_version(id: &str) -> Option<String> {
    let edition = edition_of(id)?;
    id.strip_prefix(edition.format_prefix())
        .map(|rest| rest.replace('_', "."))
}
