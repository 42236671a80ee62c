//! Armillary Core Types and Definitions
//!
//! This crate provides the foundational data types of the Armillary model
//! store. It includes:
//!
//! - **Identifiers**: Process-unique element ids and interned names ([`identifier`] module)
//! - **Values**: Scalar, reference, and ordered collection field values ([`value::Value`])
//! - **Kinds**: The closed set of element shapes and their capabilities ([`kind`] module)
//! - **Elements**: The stored unit of the model graph ([`element::Element`])

pub mod element;
pub mod identifier;
pub mod kind;
pub mod value;
