//! Core vocabulary for mosql: the canonical type catalog, the document
//! flattener, and the mapping model entities shared by every other crate.
//!
//! Nothing in this crate touches a database or the network. The entities are
//! plain owned data; the persistence layer and the export pipeline both work
//! against them.

pub mod catalog;
pub mod flatten;
pub mod ident;
pub mod model;

pub use catalog::{raw_type_tag, CanonicalType, TypeError, LEAF_TYPES};
pub use flatten::{flatten, DiagnosticKind, FlatDocument, FlatValue, FlattenDiagnostic};
pub use ident::snake_case;
pub use model::{
    format_collection_list, to_collection_list, Connection, Export, FieldMapping, Schema, User,
    UserLogin, GENERATED_VERSION,
};
