//! Type handlers for stowage.
//!
//! A [`TypeHandler`] is the codec between one persisted type id and one
//! runtime type: it validates and decodes [`RawRecord`](stowage_types::RawRecord)s
//! into [`Instance`](stowage_types::Instance)s and decomposes instances back
//! into records. The [`TypeHandlerRegistry`] creates and caches exactly one
//! handler per type id.
//!
//! # Handler kinds
//!
//! | Kind          | When                                              |
//! |---------------|---------------------------------------------------|
//! | Reflective    | the stored lineage only knows the current shape   |
//! | Legacy        | older stored shapes differ from the current shape |
//! | Deleted       | the stored type no longer exists at runtime       |
//! | Unreachable   | no live root can reach the type                   |
//! | Custom        | installed by the application                      |
//!
//! # Design Rules
//!
//! - Handlers are immutable once created and shared as `Arc<dyn TypeHandler>`.
//! - A handler's type id never changes.
//! - Creation for one type id happens at most once per registry, even under
//!   concurrent callers.

pub mod error;
pub mod evaluator;
pub mod handler;
pub mod legacy;
pub mod reflective;
pub mod registry;
pub mod runtime;
pub mod special;

pub use error::{HandlerError, HandlerResult};
pub use evaluator::{FieldEvaluator, FieldFilter, TypeEvaluator, TypeFilter};
pub use handler::{HandlerKind, TypeHandler};
pub use legacy::LegacyTypeHandler;
pub use reflective::ReflectiveTypeHandler;
pub use registry::TypeHandlerRegistry;
pub use runtime::{FieldDescriptor, RuntimeType, RuntimeTypeCatalog};
pub use special::{DeletedTypeHandler, UnreachableTypeHandler};
