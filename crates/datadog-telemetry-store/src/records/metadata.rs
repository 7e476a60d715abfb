// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;

use rusqlite::types::{Type, Value};
use rusqlite::Row;
use time::OffsetDateTime;

use super::{conversion_error, millis, text, UnknownVariant};
use crate::error::StoreError;
use crate::record::Record;
use crate::timestamp::from_millis;

/// What a metadata value describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataType {
    Resource,
    RequiredResource,
    CustomProperty,
    PersonaTag,
}

impl MetadataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataType::Resource => "resource",
            MetadataType::RequiredResource => "required_resource",
            MetadataType::CustomProperty => "custom_property",
            MetadataType::PersonaTag => "persona_tag",
        }
    }
}

impl FromStr for MetadataType {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "resource" => Ok(MetadataType::Resource),
            "required_resource" => Ok(MetadataType::RequiredResource),
            "custom_property" => Ok(MetadataType::CustomProperty),
            "persona_tag" => Ok(MetadataType::PersonaTag),
            other => Err(UnknownVariant {
                kind: "metadata type",
                value: other.to_string(),
            }),
        }
    }
}

/// Scope over which a metadata value stays valid.
///
/// The matching `lifespan_id` holds the session id, the process id, or an
/// empty string for permanent values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataLifespan {
    Session,
    Process,
    Permanent,
}

impl MetadataLifespan {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataLifespan::Session => "session",
            MetadataLifespan::Process => "process",
            MetadataLifespan::Permanent => "permanent",
        }
    }
}

impl FromStr for MetadataLifespan {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "session" => Ok(MetadataLifespan::Session),
            "process" => Ok(MetadataLifespan::Process),
            "permanent" => Ok(MetadataLifespan::Permanent),
            other => Err(UnknownVariant {
                kind: "metadata lifespan",
                value: other.to_string(),
            }),
        }
    }
}

/// A key-value pair. `(key, kind, lifespan, lifespan_id)` is unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    pub id: String,
    pub key: String,
    pub value: String,
    pub kind: MetadataType,
    pub lifespan: MetadataLifespan,
    pub lifespan_id: String,
    pub collected_at: OffsetDateTime,
}

impl MetadataRecord {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        kind: MetadataType,
        lifespan: MetadataLifespan,
        lifespan_id: impl Into<String>,
        collected_at: OffsetDateTime,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key: key.into(),
            value: value.into(),
            kind,
            lifespan,
            lifespan_id: lifespan_id.into(),
            collected_at,
        }
    }
}

impl Record for MetadataRecord {
    const TABLE: &'static str = "metadata";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "key",
        "value",
        "type",
        "lifespan",
        "lifespan_id",
        "collected_at",
    ];
    const KEY_COLUMNS: &'static [&'static str] = &["id"];

    fn values(&self) -> Result<Vec<Value>, StoreError> {
        Ok(vec![
            text(self.id.as_str()),
            text(self.key.as_str()),
            text(self.value.as_str()),
            text(self.kind.as_str()),
            text(self.lifespan.as_str()),
            text(self.lifespan_id.as_str()),
            millis(self.collected_at),
        ])
    }

    fn key(&self) -> Vec<Value> {
        vec![text(self.id.as_str())]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            key: row.get(1)?,
            value: row.get(2)?,
            kind: row
                .get::<_, String>(3)?
                .parse()
                .map_err(|err| conversion_error(3, Type::Text, err))?,
            lifespan: row
                .get::<_, String>(4)?
                .parse()
                .map_err(|err| conversion_error(4, Type::Text, err))?,
            lifespan_id: row.get(5)?,
            collected_at: from_millis(6, row.get(6)?)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_parse_back() {
        for kind in [
            MetadataType::Resource,
            MetadataType::RequiredResource,
            MetadataType::CustomProperty,
            MetadataType::PersonaTag,
        ] {
            assert_eq!(kind.as_str().parse::<MetadataType>().unwrap(), kind);
        }
        for lifespan in [
            MetadataLifespan::Session,
            MetadataLifespan::Process,
            MetadataLifespan::Permanent,
        ] {
            assert_eq!(
                lifespan.as_str().parse::<MetadataLifespan>().unwrap(),
                lifespan
            );
        }
        assert!("forever".parse::<MetadataLifespan>().is_err());
    }
}
