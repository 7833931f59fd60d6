use crate::commands::login::LoginArgs;
use crate::commands::logout::LogoutArgs;
use crate::commands::upload::UploadArgs;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "studyup",
    about = "Bulk uploader for imaging studies into a research data platform"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload a local folder into a project
    Upload(UploadArgs),
    /// Store credentials for a platform server
    Login(LoginArgs),
    /// Remove stored credentials
    Logout(LogoutArgs),
}
