//! Preparing and running an installed version: descriptor resolution, classpath,
//! natives, argument templating and the game process itself.

pub mod arguments;
pub mod classpath;
pub mod natives;
pub mod process;
pub mod registry;
pub mod rules;
pub mod types;
pub mod version_parser;

pub use crate::game::installer::types::OsType;
pub use arguments::{build_game_arguments, build_jvm_arguments, ArgumentContext, MemoryBudget};
pub use classpath::{build_classpath, library_tasks, maven_to_path, ClasspathBuild};
pub use natives::extract_natives;
pub use process::{kill_process, launch_game, prepare_launch, PreparedLaunch};
pub use registry::ProcessRegistry;
pub use rules::RuleContext;
pub use types::{LaunchEvent, LaunchHandle, LaunchSpec, RunningGame};
pub use version_parser::{
    list_installed_versions, load_descriptor, merge_descriptors, resolve_version,
    VersionDescriptor,
};
