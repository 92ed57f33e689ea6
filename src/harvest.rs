//! Cookie harvesting
//!
//! Collects the cookies of every configured domain from a [`CookieSource`]
//! and formats them the way a `Cookie` request header would carry them.

use futures_util::future::join_all;

use crate::browser::Cookie;
use crate::config::DomainTarget;
use crate::error::Result;
use crate::model::CookieCounts;

/// Anything that can list the cookies belonging to a domain.
#[allow(async_fn_in_trait)]
pub trait CookieSource {
    /// Cookies whose domain matches `domain` (leading-dot convention).
    async fn get_all(&self, domain: &str) -> Result<Vec<Cookie>>;

    /// One list per entry of `domains`, in the same order. Sources that read
    /// a whole jar at once override this to read it a single time.
    async fn get_for_domains(&self, domains: &[&str]) -> Result<Vec<Vec<Cookie>>> {
        join_all(domains.iter().map(|domain| self.get_all(domain)))
            .await
            .into_iter()
            .collect()
    }
}

/// Cookies collected for one configured target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainHarvest {
    pub target: DomainTarget,
    pub cookies: Vec<Cookie>,
}

impl DomainHarvest {
    /// `None` when the domain yielded nothing, so "not captured" never
    /// travels as an empty string.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            None
        } else {
            Some(format_cookies(&self.cookies))
        }
    }
}

/// Result of one harvest, in configuration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Harvest {
    pub domains: Vec<DomainHarvest>,
}

impl Harvest {
    pub fn total(&self) -> usize {
        self.domains.iter().map(|d| d.cookies.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn counts(&self) -> CookieCounts {
        self.domains
            .iter()
            .map(|d| (d.target.name.clone(), d.cookies.len()))
            .collect()
    }

    /// Zero for every configured domain
    pub fn zero_counts(targets: &[DomainTarget]) -> CookieCounts {
        targets.iter().map(|t| (t.name.clone(), 0)).collect()
    }
}

/// Look up every target in one batch and group the results.
pub async fn harvest<C: CookieSource>(source: &C, targets: &[DomainTarget]) -> Result<Harvest> {
    let wanted: Vec<&str> = targets.iter().map(|target| target.domain.as_str()).collect();
    let mut results = source.get_for_domains(&wanted).await?.into_iter();

    let mut domains = Vec::with_capacity(targets.len());
    for target in targets {
        let cookies = results.next().unwrap_or_default();
        log::debug!("{}: {} cookies for {}", target.name, cookies.len(), target.domain);
        domains.push(DomainHarvest {
            target: target.clone(),
            cookies,
        });
    }
    Ok(Harvest { domains })
}

/// `name=value` pairs joined with `"; "`; an empty list gives `""`.
pub fn format_cookies(cookies: &[Cookie]) -> String {
    cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}
