use crate::config::LoginConfig;
use clap::Parser;

#[derive(Debug, Parser)]
pub struct LogoutArgs {
    /// URL of the platform server (optional if only one entry exists)
    pub url: Option<String>,
}

pub fn logout(args: LogoutArgs) -> anyhow::Result<()> {
    let config = LoginConfig::load()?;
    let url = match args.url {
        Some(url) => url,
        None => config.single_entry()?.url.clone(),
    };
    LoginConfig::logout(url.as_str())?;
    println!("Logged out from {url}");
    Ok(())
}
