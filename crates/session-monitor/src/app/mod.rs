pub mod builder;
pub mod core;
pub mod services;

pub use builder::ApplicationBuilder;
pub use self::core::Application;
pub use services::ApplicationServices;
