use super::Parser;

#[derive(Parser, Debug)]
#[command(name = "mediavault", about = "Authenticated media storage and streaming server")]
pub struct Cli {
    /// Path to a settings file; defaults to the profile's file under `settings/`.
    #[arg(long)]
    pub settings: Option<String>,
}
