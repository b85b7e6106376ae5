/// Entity groups emitted by the token-classification model.
///
/// A BIO tag such as `B-PER` carries the group `PER`; the group is reported
/// under the normalized entity-type name returned by [`EntityGroup::name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityGroup {
    Person,
    Organization,
    Location,
    Misc,
}

impl EntityGroup {
    /// Normalized entity-type name used in spans and reports.
    pub const fn name(&self) -> &'static str {
        match self {
            EntityGroup::Person => "PERSON",
            EntityGroup::Organization => "ORGANIZATION",
            EntityGroup::Location => "LOCATION",
            EntityGroup::Misc => "NRP",
        }
    }

    /// Group suffix as it appears in the model's BIO tags.
    pub const fn tag(&self) -> &'static str {
        match self {
            EntityGroup::Person => "PER",
            EntityGroup::Organization => "ORG",
            EntityGroup::Location => "LOC",
            EntityGroup::Misc => "MISC",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "PER" => Some(EntityGroup::Person),
            "ORG" => Some(EntityGroup::Organization),
            "LOC" => Some(EntityGroup::Location),
            "MISC" => Some(EntityGroup::Misc),
            _ => None,
        }
    }

    pub const fn all() -> [EntityGroup; 4] {
        [
            EntityGroup::Person,
            EntityGroup::Organization,
            EntityGroup::Location,
            EntityGroup::Misc,
        ]
    }
}

/// Prefix of a BIO tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BioPrefix {
    Begin,
    Inside,
}

/// A parsed token tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BioTag<'a> {
    Outside,
    Entity { prefix: BioPrefix, group: &'a str },
}

impl<'a> BioTag<'a> {
    /// Parses a raw label string.
    ///
    /// `O` is outside. `B-X`/`I-X` split at the first dash. A bare label without
    /// a dash is treated as the beginning of its own group, and an unknown
    /// prefix is treated as a continuation.
    pub fn parse(label: &'a str) -> Self {
        if label == "O" {
            return BioTag::Outside;
        }
        match label.split_once('-') {
            Some((prefix, group)) => {
                let prefix = if prefix == "B" {
                    BioPrefix::Begin
                } else {
                    BioPrefix::Inside
                };
                BioTag::Entity { prefix, group }
            }
            None => BioTag::Entity {
                prefix: BioPrefix::Begin,
                group: label,
            },
        }
    }
}

/// Default CoNLL-2003 label table used when the model ships none.
pub const DEFAULT_ID2LABEL: [&str; 9] = [
    "O", "B-MISC", "I-MISC", "B-PER", "I-PER", "B-ORG", "I-ORG", "B-LOC", "I-LOC",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_names() {
        assert_eq!(EntityGroup::from_tag("PER").map(|g| g.name()), Some("PERSON"));
        assert_eq!(EntityGroup::from_tag("ORG").map(|g| g.name()), Some("ORGANIZATION"));
        assert_eq!(EntityGroup::from_tag("LOC").map(|g| g.name()), Some("LOCATION"));
        assert_eq!(EntityGroup::from_tag("MISC").map(|g| g.name()), Some("NRP"));
        assert_eq!(EntityGroup::from_tag("DATE"), None);

        for group in EntityGroup::all() {
            assert_eq!(EntityGroup::from_tag(group.tag()), Some(group));
        }
    }

    #[test]
    fn test_bio_parse() {
        assert_eq!(BioTag::parse("O"), BioTag::Outside);
        assert_eq!(
            BioTag::parse("B-PER"),
            BioTag::Entity {
                prefix: BioPrefix::Begin,
                group: "PER"
            }
        );
        assert_eq!(
            BioTag::parse("I-LOC"),
            BioTag::Entity {
                prefix: BioPrefix::Inside,
                group: "LOC"
            }
        );
        assert_eq!(
            BioTag::parse("PER"),
            BioTag::Entity {
                prefix: BioPrefix::Begin,
                group: "PER"
            }
        );
        // Only the first dash separates prefix and group
        assert_eq!(
            BioTag::parse("B-STREET-NAME"),
            BioTag::Entity {
                prefix: BioPrefix::Begin,
                group: "STREET-NAME"
            }
        );
    }
}
