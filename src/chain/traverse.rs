//! Chain traversal and loop detection.
//!
//! Before a multi-hop chain is trusted for real work it can be walked
//! hop-by-hop: each prefix of the chain is probed with a small context read,
//! and the resulting execution-state fingerprint (declared hostname, mapped
//! user, system user, sysadmin bit) is compared against everything seen so
//! far. A repeat means the topology is circular and deeper recursion would be
//! unbounded, so the walk aborts right there.
//!
//! Every probe is a live, blocking round trip through the one open
//! connection; a transport failure at hop `i` says nothing about hops
//! `0..i-1` (already confirmed reachable) and is propagated as-is, never
//! folded into [`ChainError::LinkedServerLoop`].

use std::hash::{Hash, Hasher};

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;

use crate::chain::builder::{build_query_chain, TraversalMode};
use crate::chain::ServerChain;
use crate::error::ChainError;

/// Context read issued at every hop. The quoted `'sysadmin'` literal rides
/// through the full quote escalation on every probe, so a builder regression
/// surfaces on the very first walk.
pub const CONTEXT_PROBE_SQL: &str =
    "SELECT SYSTEM_USER AS [login], USER_NAME() AS [username], \
     IS_SRVROLEMEMBER('sysadmin') AS [sysadmin];";

/// What the context probe reports for whichever server executed it.
#[derive(Debug, Clone)]
pub struct ProbeReply {
    pub system_user: String,
    pub mapped_user: String,
    pub is_admin: bool,
}

/// Executes an already-routed probe statement. The live connection implements
/// this; tests substitute a scripted sequence of replies.
#[async_trait]
pub trait ProbeRunner {
    async fn probe(&mut self, sql: &str) -> Result<ProbeReply>;
}

/// Runtime identity of "who is running code, and where" at one point of a
/// walk. Two fingerprints are the same state iff all three strings match
/// case-insensitively and the admin bit matches exactly.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub hostname: String,
    pub mapped_user: String,
    pub system_user: String,
    pub is_admin: bool,
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.hostname.eq_ignore_ascii_case(&other.hostname)
            && self.mapped_user.eq_ignore_ascii_case(&other.mapped_user)
            && self.system_user.eq_ignore_ascii_case(&other.system_user)
            && self.is_admin == other.is_admin
    }
}

impl Eq for Fingerprint {}

impl Hash for Fingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hostname.to_ascii_lowercase().hash(state);
        self.mapped_user.to_ascii_lowercase().hash(state);
        self.system_user.to_ascii_lowercase().hash(state);
        self.is_admin.hash(state);
    }
}

/// Walks the declared chain, probing each prefix in `ReadOnlyOpenQuery` mode.
/// Returns the per-hop fingerprints of a cycle-free chain; fails with
/// [`ChainError::LinkedServerLoop`] the moment a fingerprint repeats, without
/// touching deeper hops.
pub async fn verify_chain<P>(chain: &ServerChain, runner: &mut P) -> Result<Vec<Fingerprint>>
where
    P: ProbeRunner + ?Sized,
{
    let mut seen: Vec<Fingerprint> = Vec::with_capacity(chain.len());

    for (index, hop) in chain.hops().iter().enumerate() {
        let sql = build_query_chain(
            &chain.prefix(index + 1),
            CONTEXT_PROBE_SQL,
            TraversalMode::ReadOnlyOpenQuery,
        )?;
        debug!("probing hop {} ({})", index, hop.hostname());

        let reply = runner
            .probe(&sql)
            .await
            .with_context(|| format!("context probe failed at hop {} ({})", index, hop.hostname()))?;

        let fingerprint = Fingerprint {
            hostname: hop.hostname().to_owned(),
            mapped_user: reply.mapped_user,
            system_user: reply.system_user,
            is_admin: reply.is_admin,
        };
        debug!(
            "hop {}: {} as {} (mapped {}, sysadmin: {})",
            index,
            fingerprint.hostname,
            fingerprint.system_user,
            fingerprint.mapped_user,
            fingerprint.is_admin
        );

        if let Some(first_index) = seen.iter().position(|known| *known == fingerprint) {
            return Err(ChainError::LinkedServerLoop {
                hostname: fingerprint.hostname,
                first_index,
                repeat_index: index,
            }
            .into());
        }
        seen.push(fingerprint);
    }

    Ok(seen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted probe runner: pops one canned reply per probe, recording the
    /// SQL it was asked to run.
    struct Script {
        replies: VecDeque<Result<ProbeReply>>,
        issued: Vec<String>,
    }

    impl Script {
        fn new(replies: Vec<Result<ProbeReply>>) -> Self {
            Self {
                replies: replies.into(),
                issued: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl ProbeRunner for Script {
        async fn probe(&mut self, sql: &str) -> Result<ProbeReply> {
            self.issued.push(sql.to_owned());
            self.replies.pop_front().expect("probe past end of script")
        }
    }

    fn reply(mapped: &str, system: &str, admin: bool) -> Result<ProbeReply> {
        Ok(ProbeReply {
            mapped_user: mapped.to_owned(),
            system_user: system.to_owned(),
            is_admin: admin,
        })
    }

    fn distinct_replies(n: usize) -> Vec<Result<ProbeReply>> {
        (0..n)
            .map(|i| reply(&format!("user{i}"), &format!("DOMAIN\\svc{i}"), i % 2 == 0))
            .collect()
    }

    #[async_std::test]
    async fn cycle_free_chain_completes_with_n_probes() {
        let chain = ServerChain::parse("A,B,C").unwrap();
        let mut runner = Script::new(distinct_replies(3));
        let path = verify_chain(&chain, &mut runner).await.unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(runner.issued.len(), 3);
        assert_eq!(path[2].hostname, "C");
    }

    #[async_std::test]
    async fn repeated_state_stops_the_walk() {
        // Hops 0..5 where hop 5 reproduces hop 2's context under the same
        // hostname: the driver must fail after probing hop 5 and never go on.
        let chain = ServerChain::parse("A,B,C,D,E,C,G").unwrap();
        let mut replies = distinct_replies(5);
        replies.push(reply("user2", "DOMAIN\\svc2", true));
        let mut runner = Script::new(replies);

        let err = verify_chain(&chain, &mut runner).await.unwrap_err();
        assert_eq!(runner.issued.len(), 6);
        match err.downcast_ref::<ChainError>() {
            Some(ChainError::LinkedServerLoop {
                hostname,
                first_index,
                repeat_index,
            }) => {
                assert_eq!(hostname, "C");
                assert_eq!(*first_index, 2);
                assert_eq!(*repeat_index, 5);
            }
            other => panic!("expected loop error, got {other:?}"),
        }
    }

    #[async_std::test]
    async fn fingerprint_comparison_is_case_insensitive() {
        let chain = ServerChain::parse("sql01,SQL01").unwrap();
        let mut runner = Script::new(vec![
            reply("dbo", "CORP\\Operator", true),
            reply("DBO", "corp\\operator", true),
        ]);
        let err = verify_chain(&chain, &mut runner).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChainError>(),
            Some(ChainError::LinkedServerLoop { repeat_index: 1, .. })
        ));
    }

    #[async_std::test]
    async fn same_context_on_different_hosts_is_not_a_loop() {
        // Shared service identity across two distinct hostnames is accepted;
        // hostname-string equality is the documented notion of "same server".
        let chain = ServerChain::parse("A,B").unwrap();
        let mut runner = Script::new(vec![
            reply("dbo", "svc_sql", true),
            reply("dbo", "svc_sql", true),
        ]);
        assert!(verify_chain(&chain, &mut runner).await.is_ok());
    }

    #[async_std::test]
    async fn transport_failure_is_not_reported_as_a_loop() {
        let chain = ServerChain::parse("A,B,C").unwrap();
        let mut runner = Script::new(vec![
            reply("u0", "s0", false),
            Err(anyhow::anyhow!("connection reset by peer")),
        ]);
        let err = verify_chain(&chain, &mut runner).await.unwrap_err();
        assert!(err.downcast_ref::<ChainError>().is_none());
        assert!(format!("{err:#}").contains("hop 1 (B)"));
        assert_eq!(runner.issued.len(), 2);
    }

    #[async_std::test]
    async fn probes_route_through_growing_prefixes() {
        let chain = ServerChain::parse("A,B").unwrap();
        let mut runner = Script::new(distinct_replies(2));
        verify_chain(&chain, &mut runner).await.unwrap();
        assert!(runner.issued[0].starts_with("SELECT * FROM OPENQUERY([A],"));
        assert!(runner.issued[1].contains("OPENQUERY([B],"));
        // The second probe still enters through the first hop.
        assert!(runner.issued[1].starts_with("SELECT * FROM OPENQUERY([A],"));
    }
}
