use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Maximum number of direct children (files + folders) the platform permits
/// under one project or folder.
pub const MAX_CHILDREN_PER_CONTAINER: usize = 10_000;

/// Environment variables consulted when no credential flags are given.
pub static USERNAME_ENV: &str = "STUDYUP_USER";
pub static PASSWORD_ENV: &str = "STUDYUP_PASSWORD";

pub fn default_thread_count() -> usize {
    num_cpus::get().max(1)
}

#[derive(Serialize, Deserialize, Debug, Default, Ord, PartialOrd, Eq, PartialEq)]
pub struct LoginConfig {
    pub entries: Vec<LoginEntry>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct LoginEntry {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl LoginEntry {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl LoginConfig {
    const APP_NAME: &'static str = "studyup";
    const CONFIG_NAME: &'static str = "credentials";

    pub fn single_entry(&self) -> anyhow::Result<&LoginEntry> {
        match self.entries.len() {
            0 => anyhow::bail!("No stored credentials, please log in first."),
            1 => Ok(self.entries.first().unwrap()),
            _ => anyhow::bail!("Several servers are configured, please pass --url."),
        }
    }

    pub fn find_entry_by_url(&self, url: &str) -> anyhow::Result<&LoginEntry> {
        self.entries
            .iter()
            .find(|entry| entry.url == url)
            .ok_or_else(|| anyhow::anyhow!("No stored credentials for {}", url))
    }

    /// Note: when run with sudo this loads from root's config directory,
    /// which may not be expected.
    pub fn load() -> anyhow::Result<Self> {
        confy::load::<Self>(Self::APP_NAME, Self::CONFIG_NAME).with_context(|| {
            format!(
                "failed to load config file `{}.{}`",
                Self::APP_NAME,
                Self::CONFIG_NAME,
            )
        })
    }

    fn store(&self) -> anyhow::Result<()> {
        confy::store(Self::APP_NAME, Self::CONFIG_NAME, self).with_context(|| {
            format!(
                "failed to store config file `{}.{}`",
                Self::APP_NAME,
                Self::CONFIG_NAME,
            )
        })
    }

    pub fn login(entry: LoginEntry) -> anyhow::Result<()> {
        let mut config = Self::load()?;

        if let Some((idx, _)) = config
            .entries
            .iter()
            .enumerate()
            .find(|(_, existing)| existing.url == entry.url)
        {
            config.entries.remove(idx);
        }

        config.entries.push(entry);
        config.store()
    }

    pub fn logout(url: impl Into<String>) -> anyhow::Result<()> {
        let mut config = Self::load()?;
        let url = url.into();
        config.entries.retain(|entry| entry.url != url);
        config.store()
    }
}
