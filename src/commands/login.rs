use crate::config::{LoginConfig, LoginEntry};
use crate::platform::{Credentials, HttpPlatform, Platform};
use crate::rt::block_on;
use clap::Parser;
use dialoguer::{Input, Password};

#[derive(Debug, Parser)]
pub struct LoginArgs {
    /// URL of the platform server
    pub url: Option<String>,
    /// Account username (prompted when omitted)
    #[arg(short, long)]
    pub username: Option<String>,
    /// Account password (prompted when omitted)
    #[arg(short, long)]
    pub password: Option<String>,
}

/// Verify the credentials against the server, then store them for later
/// runs. An existing entry for the same server is replaced.
pub fn login(args: LoginArgs) -> anyhow::Result<()> {
    let url = match args.url {
        Some(url) => url,
        None => Input::<String>::new()
            .with_prompt("Server URL")
            .interact_text()?,
    };
    let username = match args.username {
        Some(username) => username,
        None => Input::<String>::new()
            .with_prompt("Username")
            .interact_text()?,
    };
    let password = match args.password {
        Some(password) => password,
        None => Password::new().with_prompt("Password").interact()?,
    };

    block_on(async move {
        let platform = HttpPlatform::new(url.as_str())?;
        platform
            .authenticate(&Credentials {
                username: username.clone(),
                password: password.clone(),
            })
            .await?;

        LoginConfig::login(LoginEntry::new(url.as_str(), username, password))?;
        println!("Logged in successfully!");
        Ok(())
    })?
}
