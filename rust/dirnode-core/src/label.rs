use crate::error::{Error, Result};
use crate::record::Record;

/// A string projection of a record used for DHT indexing, shaped
/// `/<kind>/<value>` per spec.md §3.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(String);

impl Label {
    pub fn new(kind: &str, value: &str) -> Self {
        Label(format!("/{kind}/{value}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> Option<&str> {
        self.0.splitn(3, '/').nth(1)
    }
}

impl std::str::FromStr for Label {
    type Err = Error;

    /// Parses a wire-format label (`/<kind>/<value>`), e.g. one received
    /// over `RoutingService`'s `Publish`/`Unpublish` RPCs.
    fn from_str(raw: &str) -> Result<Self> {
        let mut parts = raw.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(""), Some(kind), Some(value)) if !kind.is_empty() && !value.is_empty() => {
                Ok(Label::new(kind, value))
            }
            _ => Err(Error::InvalidArgument(format!("malformed label: {raw}"))),
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Label> for String {
    fn from(value: Label) -> Self {
        value.0
    }
}

/// Derives every label a record yields: one per skill, locator type, module
/// (extension name), and the record's own name.
pub fn labels_for(record: &Record) -> Vec<Label> {
    let mut labels = Vec::new();

    labels.push(Label::new("names", &record.name));

    for skill in &record.skills {
        labels.push(Label::new("skills", &skill.name));
        if !skill.id.is_empty() {
            labels.push(Label::new("skills", &skill.id));
        }
    }

    for locator in &record.locators {
        labels.push(Label::new("locators", &locator.kind));
    }

    for extension in &record.extensions {
        labels.push(Label::new("modules", &extension.name));
    }

    labels.sort();
    labels.dedup();
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Locator, Skill};
    use std::collections::BTreeMap;

    #[test]
    fn derives_one_label_per_distinct_dimension() {
        let record = Record {
            name: "agent-x".into(),
            version: "v1".into(),
            description: None,
            authors: vec![],
            created_at: chrono::Utc::now(),
            skills: vec![Skill {
                id: "10201".into(),
                name: "natural_language_processing".into(),
                annotations: BTreeMap::new(),
            }],
            locators: vec![Locator {
                kind: "docker-image".into(),
                url: "oci://example.com/x".into(),
                size: None,
                digest: None,
                annotations: BTreeMap::new(),
            }],
            extensions: vec![],
            signature: None,
            tags: vec![],
            previous_record_cid: None,
            annotations: BTreeMap::new(),
        };

        let labels: Vec<String> = labels_for(&record).into_iter().map(String::from).collect();
        assert!(labels.contains(&"/names/agent-x".to_string()));
        assert!(labels.contains(&"/skills/natural_language_processing".to_string()));
        assert!(labels.contains(&"/skills/10201".to_string()));
        assert!(labels.contains(&"/locators/docker-image".to_string()));
    }

    #[test]
    fn label_kind_parses_leading_segment() {
        let label = Label::new("skills", "natural_language_processing");
        assert_eq!(label.kind(), Some("skills"));
    }

    #[test]
    fn from_str_round_trips_with_display() {
        let label: Label = "/skills/natural_language_processing".parse().unwrap();
        assert_eq!(label.as_str(), "/skills/natural_language_processing");
    }

    #[test]
    fn from_str_rejects_malformed_labels() {
        assert!("skills/foo".parse::<Label>().is_err());
        assert!("/skills".parse::<Label>().is_err());
    }
}
