//! Legacy member mapping for stowage.
//!
//! When the shape a type was stored with differs from its current shape,
//! the [`MemberCorrespondenceResolver`] decides which stored member feeds
//! which current member. Resolution runs in three tiers:
//!
//! 1. **Exact**: same name, declared type and reference flag.
//! 2. **Refactoring**: an entry of the user supplied [`RefactoringMapping`].
//! 3. **Similarity**: a [`MemberMatcher`] scores the remaining pairs and a
//!    maximum-weight assignment picks the best global pairing.
//!
//! # Design Rules
//!
//! - Resolution is a pure function of its inputs. Ties are broken by
//!   stored member order, then current member order.
//! - No current member is fed by two stored members.
//! - Strict mode refuses a similarity result with an equally good
//!   alternative instead of picking one.

pub mod assignment;
pub mod correspondence;
pub mod error;
pub mod matcher;
pub mod refactoring;
pub mod resolver;

pub use correspondence::{MemberBinding, MemberCorrespondence, Resolution};
pub use error::{MappingError, MappingResult};
pub use matcher::{DefaultMemberMatcher, MemberMatcher};
pub use refactoring::{MemberTarget, RefactoringMapping, TypeRename};
pub use resolver::{MemberCorrespondenceResolver, ResolverConfig};
