//! Operations, wire intents and pipeline stages

use axum::http::StatusCode;
use std::fmt;

/// The operation a callback observes
///
/// Several wire intents share one operation: relationship mutations run as
/// [`Operation::Update`] and reading a relationship runs as [`Operation::Find`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Find,
    Create,
    Update,
    Delete,
    CollectionAction,
    ResourceAction,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Find => "find",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::CollectionAction => "collection_action",
            Operation::ResourceAction => "resource_action",
        }
    }

    /// Whether the operation writes to the store
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Operation::Create | Operation::Update | Operation::Delete
        )
    }

    pub fn is_action(&self) -> bool {
        matches!(
            self,
            Operation::CollectionAction | Operation::ResourceAction
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The wire level intent of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    ListResources,
    FindResource,
    CreateResource,
    UpdateResource,
    DeleteResource,
    GetRelatedResources,
    GetRelationship,
    SetRelationship,
    AppendToRelationship,
    RemoveFromRelationship,
    CollectionAction,
    ResourceAction,
}

impl Intent {
    /// The operation callbacks observe for this intent
    ///
    /// For [`Intent::GetRelatedResources`] this is the operation of the subject
    /// lookup; the target controller runs List or Find on its own context.
    pub fn operation(&self) -> Operation {
        match self {
            Intent::ListResources => Operation::List,
            Intent::FindResource | Intent::GetRelatedResources | Intent::GetRelationship => {
                Operation::Find
            }
            Intent::CreateResource => Operation::Create,
            Intent::UpdateResource
            | Intent::SetRelationship
            | Intent::AppendToRelationship
            | Intent::RemoveFromRelationship => Operation::Update,
            Intent::DeleteResource => Operation::Delete,
            Intent::CollectionAction => Operation::CollectionAction,
            Intent::ResourceAction => Operation::ResourceAction,
        }
    }

    /// Whether the intent mutates stored documents
    pub fn is_mutation(&self) -> bool {
        self.operation().is_write()
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Intent::ListResources => "list_resources",
            Intent::FindResource => "find_resource",
            Intent::CreateResource => "create_resource",
            Intent::UpdateResource => "update_resource",
            Intent::DeleteResource => "delete_resource",
            Intent::GetRelatedResources => "get_related_resources",
            Intent::GetRelationship => "get_relationship",
            Intent::SetRelationship => "set_relationship",
            Intent::AppendToRelationship => "append_to_relationship",
            Intent::RemoveFromRelationship => "remove_from_relationship",
            Intent::CollectionAction => "collection_action",
            Intent::ResourceAction => "resource_action",
        };
        f.write_str(name)
    }
}

/// Pipeline stages that run callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Authorizer,
    Validator,
    Decorator,
    Notifier,
    /// A collection, resource or group action handler
    Action,
}

impl Stage {
    /// Status used when a callback of this stage fails with a safe error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Stage::Authorizer => StatusCode::UNAUTHORIZED,
            Stage::Validator | Stage::Action => StatusCode::BAD_REQUEST,
            Stage::Decorator | Stage::Notifier => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Authorizer => "authorizer",
            Stage::Validator => "validator",
            Stage::Decorator => "decorator",
            Stage::Notifier => "notifier",
            Stage::Action => "action",
        };
        f.write_str(name)
    }
}
