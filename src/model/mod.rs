//! Entities stored in the index: projects, files, symbols, and the
//! relations between them.

mod file;
mod owner;
mod project;
mod relation;
mod symbol;

pub use file::FileRecord;
pub use owner::OwnerRow;
pub use project::ProjectBoundary;
pub use relation::{Relation, RelationEndpoint};
pub use symbol::Symbol;
