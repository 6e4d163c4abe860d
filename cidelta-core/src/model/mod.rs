//! Value types shared by every component.

pub mod build;
pub mod groups;
pub mod ids;
pub mod request;

pub use build::{Build, BuildReference, BuildResult, RootBuild, TestBuild};
pub use groups::{JobGroups, RootDiff};
pub use ids::{
    BranchName, CommitId, IDENTIFIER_CODECS, IdentifierCodec, IdentifierKind, JobName, RootName,
    codec,
};
pub use request::{Request, RequestStatus, RequestTarget};
pub use test::FailedTest;
