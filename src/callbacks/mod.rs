//! Built-in callbacks
//!
//! Ready-made authorizers, validators and normalizers covering the usual needs
//! of a resource. Everything here is built on the public [`Callback`] API and
//! can be mixed freely with application callbacks.
//!
//! [`Callback`]: crate::core::callback::Callback

pub mod authorizers;
pub mod normalizers;
pub mod references;
pub mod validators;

pub use authorizers::{
    hidden_fields_authorizer, owner_authorizer, policy_authorizer, protected_fields_authorizer,
};
pub use normalizers::{Normalizer, attribute_normalizer};
pub use references::{dependent_resources_validator, verify_references_validator};
pub use validators::{
    FieldFormat, Rule, attribute_validator, timestamp_validator, unique_attribute_validator,
};
