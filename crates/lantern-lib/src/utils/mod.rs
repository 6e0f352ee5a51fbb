pub mod process;

pub use process::LanternCommandExt;
