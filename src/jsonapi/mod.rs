//! JSON:API document model
//!
//! Only the parts of the format the engine produces and consumes are modelled:
//! primary data (resources or linkage), links, meta and error objects.
//! Compound documents (`included`) are not supported.

pub mod params;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub use params::Params;

/// Media type of every document
pub const MEDIA_TYPE: &str = "application/vnd.api+json";

/// Top level document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PrimaryData>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorObject>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl Document {
    pub fn single(resource: Resource) -> Self {
        Self {
            data: Some(PrimaryData::One(Some(Box::new(resource)))),
            ..Default::default()
        }
    }

    /// `data: null`
    pub fn null(links: Links) -> Self {
        Self {
            data: Some(PrimaryData::One(None)),
            links: Some(links),
            ..Default::default()
        }
    }

    pub fn collection(resources: Vec<Resource>, links: Links) -> Self {
        Self {
            data: Some(PrimaryData::Many(resources)),
            links: Some(links),
            ..Default::default()
        }
    }

    pub fn linkage(linkage: Linkage, links: Links) -> Self {
        Self {
            data: Some(PrimaryData::Linkage(linkage)),
            links: Some(links),
            ..Default::default()
        }
    }

    pub fn errors(errors: Vec<ErrorObject>) -> Self {
        Self {
            errors,
            ..Default::default()
        }
    }

    /// The single resource of the document, if any
    pub fn resource(&self) -> Option<&Resource> {
        match &self.data {
            Some(PrimaryData::One(Some(resource))) => Some(resource),
            _ => None,
        }
    }

    pub fn resource_mut(&mut self) -> Option<&mut Resource> {
        match &mut self.data {
            Some(PrimaryData::One(Some(resource))) => Some(resource),
            _ => None,
        }
    }

    /// The resources of a collection document
    pub fn resources(&self) -> &[Resource] {
        match &self.data {
            Some(PrimaryData::Many(resources)) => resources,
            _ => &[],
        }
    }
}

/// Primary data of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    One(Option<Box<Resource>>),
    Many(Vec<Resource>),
    Linkage(Linkage),
}

/// Resource object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, Value>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub relationships: IndexMap<String, Relationship>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, id: Option<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id,
            attributes: IndexMap::new(),
            relationships: IndexMap::new(),
            links: None,
        }
    }
}

/// Relationship object
///
/// `data` is `None` when the key is absent and `Some(Linkage::One(None))`
/// when it is an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Linkage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Linkage>, D::Error> {
    Linkage::deserialize(deserializer).map(Some)
}

/// Resource linkage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Linkage {
    One(Option<Identifier>),
    Many(Vec<Identifier>),
}

/// Resource identifier object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
}

impl Identifier {
    pub fn new(resource_type: impl Into<String>, id: impl ToString) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.to_string(),
        }
    }
}

/// Links object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Links {
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl Links {
    pub fn to_self(link: impl Into<String>) -> Self {
        Self {
            self_link: Some(link.into()),
            ..Default::default()
        }
    }
}

/// Error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

/// Request body carrying a single resource
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDocument {
    pub data: Resource,
}

/// Request body carrying relationship linkage
#[derive(Debug, Clone, Deserialize)]
pub struct LinkageDocument {
    pub data: Linkage,
}
