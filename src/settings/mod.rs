// Settings module
// JSON settings file in the application directory

pub mod settings;

pub use settings::AppSettings;
