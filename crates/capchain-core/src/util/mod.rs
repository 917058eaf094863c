// Utility modules

pub mod detect;
pub mod temp_files;
