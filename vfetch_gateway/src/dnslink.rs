//! DNSLink: `dnslink=<path>` TXT records on `_dnslink.<domain>`.

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::error::ResolveErrorKind;
use vfetch_core::ContentPath;

use crate::error::ResolutionError;

const DNSLINK_PREFIX: &str = "dnslink=";
const DNSLINK_SUBDOMAIN: &str = "_dnslink.";

/// TXT lookups, kept behind a trait so resolution can run without DNS.
#[async_trait]
pub trait TxtResolver: Send + Sync {
    /// Every TXT string at `name`; a name without TXT records yields an
    /// empty list.
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, String>;
}

/// Looks TXT records up with the system's DNS configuration.
pub struct SystemTxtResolver {
    resolver: TokioAsyncResolver,
}

impl SystemTxtResolver {
    pub fn new() -> Result<Self, ResolutionError> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().map_err(|err| {
            ResolutionError::DnsLink {
                domain: String::new(),
                reason: format!("failed to read system DNS configuration: {err}"),
            }
        })?;
        Ok(Self { resolver })
    }
}

#[async_trait]
impl TxtResolver for SystemTxtResolver {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, String> {
        let lookup = match self.resolver.txt_lookup(name).await {
            Ok(lookup) => lookup,
            Err(err) if matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. }) => {
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.to_string()),
        };
        Ok(lookup
            .iter()
            .map(|txt| {
                // long values are split across several character strings
                txt.txt_data()
                    .iter()
                    .map(|part| String::from_utf8_lossy(part))
                    .collect::<String>()
            })
            .collect())
    }
}

/// Resolves `domain` to the path its DNSLink record names.
///
/// `_dnslink.<domain>` is consulted first and the bare domain second. The
/// result may itself be mutable.
pub async fn resolve_dnslink(
    resolver: &dyn TxtResolver,
    domain: &str,
) -> Result<ContentPath, ResolutionError> {
    let failed = |reason: String| ResolutionError::DnsLink {
        domain: domain.to_string(),
        reason,
    };
    if !is_domain(domain) {
        return Err(ResolutionError::invalid_name(
            domain,
            "neither an IPNS name nor a domain",
        ));
    }

    for name in [format!("{DNSLINK_SUBDOMAIN}{domain}"), domain.to_string()] {
        let records = resolver.lookup_txt(&name).await.map_err(&failed)?;
        let mut links: Vec<&str> = records
            .iter()
            .filter_map(|record| record.trim().strip_prefix(DNSLINK_PREFIX))
            .collect();
        if links.is_empty() {
            continue;
        }
        links.sort_unstable();
        for link in links {
            match ContentPath::parse(link.trim()) {
                Ok(path) => {
                    tracing::debug!(domain, %path, "resolved DNSLink");
                    return Ok(path);
                }
                Err(err) => tracing::warn!(domain, link, %err, "ignoring malformed DNSLink"),
            }
        }
        return Err(failed(format!("no valid dnslink record at {name}")));
    }
    Err(failed("no dnslink record".into()))
}

fn is_domain(s: &str) -> bool {
    s.contains('.')
        && s.len() <= 253
        && s.trim_end_matches('.').split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        })
}
