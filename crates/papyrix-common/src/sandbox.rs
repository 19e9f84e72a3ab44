use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use url::{Host, Url};
use crate::error::PapyrixError;

/// Browser-like UA; several mirrors reject obvious bot agents outright.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// A capped HTTP client that only talks to approved domains.
///
/// Two request paths exist:
/// - [`SandboxClient::get`] for the APIs and mirror landing pages we know by name
///   (exact host or any subdomain of an allowlisted host);
/// - [`SandboxClient::get_external`] for document links harvested from those
///   responses, which may live on any public http(s) host or on an
///   allowlisted one, but never on loopback, private, link-local or bare
///   hostnames otherwise.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Creates a client with the default Papyrix allowlist.
    pub fn new() -> Result<Self, PapyrixError> {
        Self::with_user_agent(BROWSER_USER_AGENT)
    }

    pub fn with_user_agent(user_agent: &str) -> Result<Self, PapyrixError> {
        let mut allowlist = HashSet::new();
        let domains = vec![
            "api.openalex.org",   // OpenAlex
            "api.crossref.org",   // CrossRef
            "api.unpaywall.org",  // Unpaywall
            "doi.org",            // DOI resolver
        ];

        for d in domains {
            allowlist.insert(d.to_string());
        }

        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(60))
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| PapyrixError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.trim().to_lowercase());
    }

    /// Allowlists the host of a full mirror URL such as `https://sci-hub.se/`.
    pub fn allow_url_host(&mut self, url: &str) {
        if let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(String::from)) {
            self.allow_domain(&host);
        }
    }

    /// Validates if a URL is permitted under the current sandbox policy.
    pub fn is_allowed(&self, url: &str) -> bool {
        if let Ok(parsed) = Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                // Check exact match or if it's a subdomain of an allowed domain
                for allowed in &self.allowlist {
                    if host == allowed || host.ends_with(&format!(".{}", allowed)) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// GET against an allowlisted host.
    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, PapyrixError> {
        if !self.is_allowed(url) {
            return Err(PapyrixError::Security(format!(
                "domain not in allowlist for URL {}",
                url
            )));
        }

        Ok(self.client.get(url))
    }

    /// GET against an arbitrary public http(s) URL, or any allowlisted one.
    pub fn get_external(&self, url: &str) -> Result<reqwest::RequestBuilder, PapyrixError> {
        if !is_public_http_url(url) && !self.is_allowed(url) {
            return Err(PapyrixError::Security(format!(
                "refusing non-public or non-http URL {}",
                url
            )));
        }

        Ok(self.client.get(url))
    }
}

/// True for `http`/`https` URLs on a dotted public name or a globally
/// routable IP address.
pub fn is_public_http_url(url_str: &str) -> bool {
    let parsed = match Url::parse(url_str) {
        Ok(u) => u,
        Err(_) => return false,
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }

    match parsed.host() {
        Some(Host::Domain(name)) => {
            let name = name.trim_end_matches('.').to_ascii_lowercase();
            name.contains('.') && name != "localhost" && !name.ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => is_public_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => is_public_ip(IpAddr::V6(ip)),
        None => false,
    }
}

fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    !(ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 100.64.0.0/10 carrier-grade NAT
        || (ip.octets()[0] == 100 && (ip.octets()[1] & 0xc0) == 64))
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    !(ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00 // unique local
        || (first & 0xffc0) == 0xfe80) // link-local
}
