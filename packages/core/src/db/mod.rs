//! Database Layer
//!
//! This module handles all database interactions using an embedded libsql
//! database:
//!
//! - Database initialization and connection management (`TreeDatabase`)
//! - SQL primitives over locations, assignments and trash (`TreeStore`)
//! - Seams to the content store and the language service
//! - Trash query value objects and their SQL converter
//! - Domain events broadcast after committed mutations
//!
//! # Architecture
//!
//! `TreeStore` borrows a connection and never manages transactions itself;
//! the service layer opens one transaction per logical operation and hands
//! the store to the operations layer.

pub mod content_gateway;
mod database;
mod error;
pub mod events;
pub mod translation;
pub mod trash_query;
mod tree_store;

pub use content_gateway::{ContentGateway, ContentRecord, SqlContentGateway};
pub use database::TreeDatabase;
pub use error::DatabaseError;
pub use events::TreeEvent;
pub use translation::{
    LanguageMaskTable, LanguageSelection, LanguageTableFull, TranslationFilter,
    TranslationNotFound, ALWAYS_AVAILABLE_BIT, MAX_LANGUAGES,
};
pub use trash_query::{
    QueryError, SortDirection, SqlFragment, SqlTrashQueryConverter, TrashCriterion, TrashQuery,
    TrashQueryConverter, TrashResult, TrashSortClause,
};
pub use tree_store::{TreeStore, DEFAULT_ID_BATCH_SIZE};
