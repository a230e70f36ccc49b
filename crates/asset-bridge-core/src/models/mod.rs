pub mod error;
pub mod manager;
pub mod package;

pub use error::{CoreError, CoreErrorKind};
pub use manager::{AssetAction, DetectionInfo, ManagerDescriptor, ManagerId};
pub use package::{PackageNode, RequirementMap, RootPackage};
