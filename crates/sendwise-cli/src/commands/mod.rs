pub mod generate_key;
pub mod serve;

pub use generate_key::GenerateKeyCommand;
pub use serve::ServeCommand;
