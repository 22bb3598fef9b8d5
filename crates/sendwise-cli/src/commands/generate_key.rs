use clap::Args;
use sendwise_core::EncryptionService;

/// Prints a random 256-bit key as 64 hex characters
#[derive(Args)]
pub struct GenerateKeyCommand {}

impl GenerateKeyCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        println!("{}", EncryptionService::generate_hex_key());
        Ok(())
    }
}
