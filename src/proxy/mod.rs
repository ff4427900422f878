pub mod errors;
pub mod handlers;
pub mod mappers;
pub mod server;
pub mod upstream;

pub use server::AppState;
