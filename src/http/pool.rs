use anyhow::{Context, Result, anyhow};
use log::debug;
use reqwest::Client;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use url::Url;

const USER_AGENT: &str = concat!("extpm/", env!("EXTPM_VERSION"));

/// `scheme://host:port` of a URL; connections are shared per origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    scheme: String,
    host: String,
    port: u16,
}

impl Origin {
    pub fn from_url(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("URL {} has no host", url))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| anyhow!("URL {} has no port", url))?;
        Ok(Self {
            scheme: url.scheme().to_string(),
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Keep-alive clients keyed by origin.
///
/// Cloning shares the underlying map. Eviction is last-writer-wins: a client
/// inserted concurrently with an eviction may be dropped.
#[derive(Clone, Default)]
pub struct ConnectionPool {
    clients: Arc<Mutex<HashMap<Origin, Client>>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the client for `origin` and whether it was already pooled.
    pub fn checkout(&self, origin: &Origin) -> Result<(Client, bool)> {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(origin) {
            return Ok((client.clone(), true));
        }

        debug!("Opening connection pool for {}", origin);
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build HTTP client")?;
        clients.insert(origin.clone(), client.clone());
        Ok((client, false))
    }

    pub fn evict(&self, origin: &Origin) {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if clients.remove(origin).is_some() {
            debug!("Dropped pooled connection for {}", origin);
        }
    }

    #[cfg(test)]
    pub(crate) fn seed(&self, origin: &Origin, client: Client) {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        clients.insert(origin.clone(), client);
    }

    pub fn len(&self) -> usize {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
