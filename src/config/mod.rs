// 配置模块

pub mod env;
pub mod settings;

pub use env::EnvConfig;
pub use settings::RuntimeSettings;
