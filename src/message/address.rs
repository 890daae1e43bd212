//! Mutable absolute URI for one HTTP message.

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("invalid address `{address}`: {source}")]
    Parse {
        address: String,
        #[source]
        source: url::ParseError,
    },
    #[error("address rejected component `{component}` value `{value}`")]
    Component { component: &'static str, value: String },
}

/// Absolute URI with mutable scheme, host, port, path and query. Transforms
/// mutate it through the context views; the host propagates the final value
/// to its outbound request on the request side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    url: Url,
}

impl Address {
    pub fn parse(address: &str) -> Result<Self, AddressError> {
        let url = Url::parse(address).map_err(|source| AddressError::Parse {
            address: address.to_string(),
            source,
        })?;
        Ok(Self { url })
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    pub fn port(&self) -> Option<u16> {
        self.url.port()
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn set_scheme(&mut self, scheme: &str) -> Result<(), AddressError> {
        self.url
            .set_scheme(scheme)
            .map_err(|_| AddressError::Component {
                component: "scheme",
                value: scheme.to_string(),
            })
    }

    pub fn set_host(&mut self, host: &str) -> Result<(), AddressError> {
        self.url
            .set_host(Some(host))
            .map_err(|source| AddressError::Parse {
                address: host.to_string(),
                source,
            })
    }

    pub fn set_port(&mut self, port: Option<u16>) -> Result<(), AddressError> {
        self.url.set_port(port).map_err(|_| AddressError::Component {
            component: "port",
            value: port.map(|p| p.to_string()).unwrap_or_default(),
        })
    }

    pub fn set_path(&mut self, path: &str) {
        self.url.set_path(path);
    }

    /// Replaces the whole address.
    pub fn set(&mut self, address: &str) -> Result<(), AddressError> {
        *self = Address::parse(address)?;
        Ok(())
    }

    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect()
    }

    pub fn set_query_param(&mut self, name: &str, value: &str) {
        let mut pairs = self.query_pairs();
        pairs.retain(|(key, _)| key != name);
        pairs.push((name.to_string(), value.to_string()));
        self.write_query(&pairs);
    }

    pub fn remove_query_param(&mut self, name: &str) -> bool {
        let mut pairs = self.query_pairs();
        let before = pairs.len();
        pairs.retain(|(key, _)| key != name);
        let removed = pairs.len() != before;
        if removed {
            self.write_query(&pairs);
        }
        removed
    }

    fn write_query(&mut self, pairs: &[(String, String)]) {
        if pairs.is_empty() {
            self.url.set_query(None);
            return;
        }
        let mut serializer = self.url.query_pairs_mut();
        serializer.clear();
        for (key, value) in pairs {
            serializer.append_pair(key, value);
        }
        drop(serializer);
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.url.as_str())
    }
}
