//! Option files: a JSON map of engine option name to value.
//!
//! Shapes mirror the engine's setter entry points: text, integer, float,
//! boolean, an `[x, y]` integer pair, an `[r, g, b]` float triple.

use anyhow::{bail, Context, Result};
use lib_chem_ffi::OptionValue;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FileValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Pair([i64; 2]),
    Triple([f64; 3]),
}

fn to_i32(value: i64, name: &str) -> Result<i32> {
    i32::try_from(value).with_context(|| format!("option '{name}': {value} does not fit in i32"))
}

impl FileValue {
    fn into_option(self, name: &str) -> Result<OptionValue> {
        Ok(match self {
            Self::Bool(v) => OptionValue::Bool(v),
            Self::Int(v) => OptionValue::Int(to_i32(v, name)?),
            Self::Float(v) => OptionValue::Float(v as f32),
            Self::Text(v) => OptionValue::Text(v),
            Self::Pair([x, y]) => OptionValue::Point(to_i32(x, name)?, to_i32(y, name)?),
            Self::Triple([r, g, b]) => OptionValue::Color(r as f32, g as f32, b as f32),
        })
    }
}

/// Parse an option file into (name, value) pairs, sorted by name so the
/// application order is stable.
pub fn parse(content: &str) -> Result<Vec<(String, OptionValue)>> {
    let raw: BTreeMap<String, FileValue> =
        serde_json::from_str(content).context("option file is not a JSON object")?;
    if raw.is_empty() {
        bail!("option file contains no options");
    }
    raw.into_iter()
        .map(|(name, value)| {
            let value = value.into_option(&name)?;
            Ok((name, value))
        })
        .collect()
}

/// Load and parse an option file.
pub fn load(path: &Path) -> Result<Vec<(String, OptionValue)>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading option file {path:?}"))?;
    parse(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_chem_ffi::OptionKind;

    #[test]
    fn shapes_map_to_option_kinds() {
        let options = parse(
            r#"{
                "render-comment": "demo",
                "max-embeddings": 64,
                "render-relative-thickness": 1.5,
                "render-coloring": true,
                "render-image-size": [640, 480],
                "render-background-color": [1.0, 1.0, 1.0]
            }"#,
        )
        .unwrap();

        let kinds: BTreeMap<_, _> = options
            .iter()
            .map(|(name, value)| (name.as_str(), value.kind()))
            .collect();
        assert_eq!(kinds["render-comment"], OptionKind::Text);
        assert_eq!(kinds["max-embeddings"], OptionKind::Int);
        assert_eq!(kinds["render-relative-thickness"], OptionKind::Float);
        assert_eq!(kinds["render-coloring"], OptionKind::Bool);
        assert_eq!(kinds["render-image-size"], OptionKind::Point);
        assert_eq!(kinds["render-background-color"], OptionKind::Color);
    }

    #[test]
    fn bool_wins_over_int() {
        let options = parse(r#"{"flag": true}"#).unwrap();
        assert_eq!(options[0].1, OptionValue::Bool(true));
    }

    #[test]
    fn out_of_range_int_is_rejected() {
        assert!(parse(r#"{"big": 5000000000}"#).is_err());
    }

    #[test]
    fn wrong_arity_is_rejected() {
        // Neither a pair nor a triple.
        assert!(parse(r#"{"size": [1, 2, 3, 4]}"#).is_err());
    }

    #[test]
    fn empty_file_is_rejected() {
        assert!(parse("{}").is_err());
    }
}
