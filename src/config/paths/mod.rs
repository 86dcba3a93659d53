//! Platform directory resolution.

mod xdg_root;

pub use xdg_root::{config_home, data_home, default_module_root, global_config_path, APP_DIR};
