pub mod settings;
pub mod loader;

pub use settings::*;
pub use loader::ENV_PREFIX;
