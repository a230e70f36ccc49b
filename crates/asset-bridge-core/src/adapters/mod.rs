pub(crate) mod detect_utils;
pub mod manager;
pub mod npm;
pub mod pnpm;
pub(crate) mod process_utils;
pub mod yarn;

pub use manager::{
    AdapterOptions, AdapterResult, AssetManager, AssetManagerAdapter, INSTALLED_DIR,
    ManagerVariant, base_installed, build_command, ensure_version_matches,
};
pub use npm::{NPM_DESCRIPTOR, Npm, NpmManager};
pub use pnpm::{PNPM_DESCRIPTOR, Pnpm, PnpmManager};
pub use yarn::{YARN_DESCRIPTOR, Yarn, YarnManager};
