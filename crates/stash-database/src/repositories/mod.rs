//! PostgreSQL repository implementations.

pub mod file;
pub mod folder;
pub mod locks;
pub mod quota;
pub mod upload;

pub use file::PgFileRepository;
pub use folder::PgFolderRepository;
pub use locks::PgOwnerLocks;
pub use quota::PgQuotaLedger;
pub use upload::PgUploadSessionRepository;
