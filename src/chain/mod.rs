//! Linked-server chain model.
//!
//! A [`ServerChain`] is the ordered path from the directly connected server to
//! the final target: one [`Hop`] per linked server, each optionally carrying a
//! login to impersonate once execution reaches that server. The compact text
//! notation accepted on the command line is
//! `host1[:login1],host2[:login2],...` — no escaping exists for literal
//! commas or colons inside hostnames; that is a documented limitation of the
//! format, not something parsing tries to repair.

pub mod builder;
pub mod traverse;

use crate::error::ChainError;

/// One server along the chain, with an optional login to impersonate there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    hostname: String,
    impersonation: Option<String>,
}

impl Hop {
    pub fn new(hostname: &str, impersonation: Option<&str>) -> Result<Self, ChainError> {
        let hostname = hostname.trim();
        if hostname.is_empty() {
            return Err(ChainError::InvalidHop);
        }
        let impersonation = impersonation
            .map(str::trim)
            .filter(|login| !login.is_empty())
            .map(str::to_owned);
        Ok(Self {
            hostname: hostname.to_owned(),
            impersonation,
        })
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Login to run `EXECUTE AS LOGIN` with on this hop, if any.
    pub fn impersonation(&self) -> Option<&str> {
        self.impersonation.as_deref()
    }
}

/// Ordered list of hops. Index 0 is the first linked server reachable from
/// the directly connected instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerChain {
    hops: Vec<Hop>,
}

impl ServerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses chain notation. An empty string is a valid empty chain.
    pub fn parse(text: &str) -> Result<Self, ChainError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Self::new());
        }

        let mut hops = Vec::new();
        for token in text.split(',') {
            let token = token.trim();
            let mut parts = token.split(':');
            let hostname = parts.next().unwrap_or_default();
            let impersonation = parts.next();
            if parts.next().is_some() {
                return Err(ChainError::MalformedChain {
                    segment: token.to_owned(),
                    reason: "at most one ':'-separated impersonation login per hop",
                });
            }
            if hostname.trim().is_empty() {
                return Err(ChainError::MalformedChain {
                    segment: token.to_owned(),
                    reason: "empty hostname",
                });
            }
            hops.push(Hop::new(hostname, impersonation)?);
        }
        Ok(Self { hops })
    }

    /// Adds one hop at the tail.
    pub fn append(&mut self, hostname: &str, impersonation: Option<&str>) -> Result<(), ChainError> {
        self.hops.push(Hop::new(hostname, impersonation)?);
        Ok(())
    }

    /// Inverse of [`ServerChain::parse`] for well-formed input.
    pub fn notation(&self) -> String {
        self.hops
            .iter()
            .map(|hop| match hop.impersonation() {
                Some(login) => format!("{}:{}", hop.hostname(), login),
                None => hop.hostname().to_owned(),
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Chain consisting of the first `n` hops. Used by the traversal driver
    /// to probe each prefix of the declared path.
    pub fn prefix(&self, n: usize) -> Self {
        Self {
            hops: self.hops[..n.min(self.hops.len())].to_vec(),
        }
    }

    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_hosts() {
        let chain = ServerChain::parse("SQL02,SQL03").unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.hops()[0].hostname(), "SQL02");
        assert_eq!(chain.hops()[0].impersonation(), None);
        assert_eq!(chain.hops()[1].hostname(), "SQL03");
    }

    #[test]
    fn parse_with_impersonation() {
        let chain = ServerChain::parse("SQL02:alice, SQL03 : bob ").unwrap();
        assert_eq!(chain.hops()[0].impersonation(), Some("alice"));
        assert_eq!(chain.hops()[1].hostname(), "SQL03");
        assert_eq!(chain.hops()[1].impersonation(), Some("bob"));
    }

    #[test]
    fn parse_empty_text_is_empty_chain() {
        let chain = ServerChain::parse("").unwrap();
        assert!(chain.is_empty());
        assert_eq!(chain.notation(), "");
    }

    #[test]
    fn parse_rejects_extra_colon_segment() {
        let err = ServerChain::parse("SQL02:alice:extra").unwrap_err();
        assert!(matches!(err, ChainError::MalformedChain { .. }));
    }

    #[test]
    fn parse_rejects_empty_hostname() {
        assert!(matches!(
            ServerChain::parse("SQL02,,SQL03"),
            Err(ChainError::MalformedChain { .. })
        ));
        assert!(matches!(
            ServerChain::parse(":alice"),
            Err(ChainError::MalformedChain { .. })
        ));
    }

    #[test]
    fn empty_impersonation_means_none() {
        let chain = ServerChain::parse("SQL02:").unwrap();
        assert_eq!(chain.hops()[0].impersonation(), None);
        assert_eq!(chain.notation(), "SQL02");
    }

    #[test]
    fn notation_round_trips() {
        for text in ["SQL02", "SQL02,SQL03:svcacct", "a:x,b,c:y"] {
            let chain = ServerChain::parse(text).unwrap();
            let reparsed = ServerChain::parse(&chain.notation()).unwrap();
            assert_eq!(chain, reparsed);
        }
    }

    #[test]
    fn append_validates_hostname() {
        let mut chain = ServerChain::new();
        assert!(matches!(chain.append("  ", None), Err(ChainError::InvalidHop)));
        chain.append("SQL05", Some("svc")).unwrap();
        assert_eq!(chain.notation(), "SQL05:svc");
    }

    #[test]
    fn prefix_takes_leading_hops() {
        let chain = ServerChain::parse("a,b,c").unwrap();
        assert_eq!(chain.prefix(2).notation(), "a,b");
        assert_eq!(chain.prefix(9).len(), 3);
        assert!(chain.prefix(0).is_empty());
    }
}
