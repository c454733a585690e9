//! This module is responsible for preparing the resources needed by the application, such as directories, configurations, logs, etc.
//!

pub mod resource {
    use super::{InitError, TagscopeProperty};

    /// Initialize the application resources and return a TagscopeProperty instance containing paths and configurations.
    ///
    pub fn init() -> Result<TagscopeProperty, InitError> {
        let paths = crate::module::util::path::dir::create_default_app_sub_dir()?;
        let conf = crate::module::util::conf::toml::load(&paths.dir.data)?;
        Ok(TagscopeProperty { path: paths, conf })
    }
}

/// Startup failures; the only fatal errors in the program.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("can't prepare directories: {0}")]
    Dir(#[from] std::io::Error),
    #[error("can't load config: {0}")]
    Config(#[from] crate::module::util::conf::ConfigError),
}

/// This struct represents the properties of the app, such as paths and configurations.
///
#[derive(Debug, Clone)]
pub struct TagscopeProperty {
    pub path: crate::module::util::path::TagscopePath, // The paths of the app resources
    pub conf: crate::module::util::conf::Config,       // The configurations of the app
}
