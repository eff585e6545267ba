pub mod proc_loader;
pub mod proc_validator;
pub mod providers;
pub mod settings;
