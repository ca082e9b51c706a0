//! Folder entities and tree operation results.

pub mod model;
pub mod tree;

pub use model::{CreateFolder, FolderRecord};
pub use tree::{CascadeSummary, DeletedTree, TreeDeletion};
