//! Verification input parsing
//!
//! `verify` takes whatever the previous stage produced: a single record,
//! a bare ID, a list of either, or the JSON printed by `convert`.

use anyhow::Context;
use serde::Deserialize;
use tiershift_core::VolumeId;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Item {
    Id(String),
    Record {
        #[serde(alias = "VolumeId")]
        volume_id: String,
    },
}

#[derive(Debug, Deserialize)]
struct Skipped {
    volume_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VerifyInput {
    Many(Vec<Item>),
    Conversion {
        volume_ids: Vec<String>,
        #[serde(default)]
        skipped: Vec<Skipped>,
    },
    One(Item),
}

fn item_id(item: Item) -> VolumeId {
    match item {
        Item::Id(id) | Item::Record { volume_id: id } => VolumeId::new(id),
    }
}

/// Volume IDs named by a JSON document, in document order
pub(crate) fn parse_volume_ids(text: &str) -> anyhow::Result<Vec<VolumeId>> {
    let input: VerifyInput =
        serde_json::from_str(text).context("verification input is not a volume, ID or list")?;
    let ids = match input {
        VerifyInput::Many(items) => items.into_iter().map(item_id).collect(),
        VerifyInput::Conversion {
            volume_ids,
            skipped,
        } => volume_ids
            .into_iter()
            .map(VolumeId::new)
            .chain(skipped.into_iter().map(|s| VolumeId::new(s.volume_id)))
            .collect(),
        VerifyInput::One(item) => vec![item_id(item)],
    };
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(text: &str) -> Vec<String> {
        parse_volume_ids(text)
            .unwrap()
            .into_iter()
            .map(|id| id.as_str().to_string())
            .collect()
    }

    #[test]
    fn test_single_record() {
        assert_eq!(
            ids(r#"{"volume_id": "vol-1", "availability_zone": "az"}"#),
            vec!["vol-1"]
        );
    }

    #[test]
    fn test_provider_style_key() {
        assert_eq!(ids(r#"{"VolumeId": "vol-1"}"#), vec!["vol-1"]);
    }

    #[test]
    fn test_bare_id() {
        assert_eq!(ids(r#""vol-9""#), vec!["vol-9"]);
    }

    #[test]
    fn test_mixed_list_keeps_order_and_duplicates() {
        assert_eq!(
            ids(r#"["vol-2", {"volume_id": "vol-1"}, "vol-2"]"#),
            vec!["vol-2", "vol-1", "vol-2"]
        );
    }

    #[test]
    fn test_conversion_output_includes_skipped() {
        let text = r#"{
            "status": "partial",
            "volume_ids": ["vol-1"],
            "skipped": [{"volume_id": "vol-2", "reason": "already at target tier"}],
            "failed": [{"volume_id": "vol-3", "error": "rejected"}]
        }"#;
        assert_eq!(ids(text), vec!["vol-1", "vol-2"]);
    }

    #[test]
    fn test_empty_list() {
        assert!(ids("[]").is_empty());
    }

    #[test]
    fn test_number_is_rejected() {
        assert!(parse_volume_ids("42").is_err());
    }
}
