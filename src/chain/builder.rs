//! Chained query construction.
//!
//! Produces the SQL text to hand to the *first* hop so that the target query
//! executes, transitively, at the *last* hop of a [`ServerChain`].
//!
//! Two constructions exist:
//!
//! * [`TraversalMode::ReadOnlyOpenQuery`] nests `OPENQUERY` calls outside-in.
//!   Each `OPENQUERY` boundary is a string literal from its parent's point of
//!   view, so every quote inside it must be escaped for that parent, whose
//!   own escaping sits inside yet another literal one level further out. The
//!   delimiter at nesting level k is a run of 2^k single quotes, and a
//!   literal quote inside the innermost query surfaces as a run of 2^N for a
//!   chain of N hops. Getting that escalation right for arbitrary depth is
//!   this module's whole reason to exist.
//!
//! * [`TraversalMode::RemoteProcedureCall`] folds `EXEC ('...') AT [server]`
//!   layers inside-out, doubling quotes once per layer. The destination
//!   linked server must have RPC Out enabled; that is the caller's problem
//!   (see the `rpc` action), not checked here.

use crate::chain::{Hop, ServerChain};
use crate::error::ChainError;

/// How a chained statement travels to the final hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalMode {
    /// Nested `OPENQUERY`: read-only, works without RPC Out. The default for
    /// enumeration and the only mode the loop-detection probe uses.
    ReadOnlyOpenQuery,
    /// Nested `EXEC (...) AT`: required for statements with side effects at
    /// the final hop.
    RemoteProcedureCall,
}

/// Builds the statement to send to the first hop. Purely textual: hostnames
/// are never resolved and reachability is never checked.
pub fn build_query_chain(
    chain: &ServerChain,
    query: &str,
    mode: TraversalMode,
) -> Result<String, ChainError> {
    if chain.is_empty() {
        return Err(ChainError::EmptyChain);
    }
    Ok(match mode {
        TraversalMode::ReadOnlyOpenQuery => build_openquery(chain.hops(), query, 0),
        TraversalMode::RemoteProcedureCall => build_exec_at(chain.hops(), query),
    })
}

/// Run of 2^level consecutive single quotes: the string delimiter at the
/// given nesting level.
fn quote_run(level: u32) -> String {
    "'".repeat(1usize << level)
}

/// Replaces each single quote with a run of 2^level quotes, re-delimiting
/// text for a literal nested `level` deep.
fn escalate(text: &str, level: u32) -> String {
    text.replace('\'', &quote_run(level))
}

/// `EXECUTE AS LOGIN = '<login>'; <query>; REVERT;` with the query's
/// trailing semicolon stripped so the wrapper supplies exactly one.
fn wrap_impersonation(login: &str, query: &str) -> String {
    let trimmed = query.trim().trim_end_matches(';').trim_end();
    format!("EXECUTE AS LOGIN = '{login}'; {trimmed}; REVERT;")
}

/// Recursive OPENQUERY construction. `depth` is 0 at the outermost call and
/// grows by one per consumed hop; the base case therefore escapes the target
/// query for a literal nested `hops.len()` levels deep.
fn build_openquery(hops: &[Hop], query: &str, depth: u32) -> String {
    let (hop, rest) = hops
        .split_first()
        .expect("build_openquery called with at least one hop");
    let delim = quote_run(depth);

    if rest.is_empty() {
        // Final hop: impersonation (if any) runs on the target itself, so it
        // wraps the raw query before the escaping for this depth is applied.
        let inner = match hop.impersonation() {
            Some(login) => wrap_impersonation(login, query),
            None => query.to_owned(),
        };
        let inner = escalate(&inner, depth + 1);
        format!(
            "SELECT * FROM OPENQUERY([{}], {delim}{inner}{delim})",
            hop.hostname()
        )
    } else {
        let inner = build_openquery(rest, query, depth + 1);
        match hop.impersonation() {
            // The prologue is plain text at this level's literal, one deeper
            // than the statement that carries the delimiter, so its quotes
            // escalate independently of the recursive text.
            Some(login) => {
                let prologue = escalate(&format!("EXECUTE AS LOGIN = '{login}'; "), depth + 1);
                format!(
                    "SELECT * FROM OPENQUERY([{}], {delim}{prologue}{inner}; REVERT;{delim})",
                    hop.hostname()
                )
            }
            None => format!(
                "SELECT * FROM OPENQUERY([{}], {delim}{inner}{delim})",
                hop.hostname()
            ),
        }
    }
}

/// Iterative `EXEC (...) AT` construction, last hop first. Each layer doubles
/// quotes exactly once relative to its parent; the compounding seen in the
/// final text comes only from successive layers re-escaping the accumulator.
fn build_exec_at(hops: &[Hop], query: &str) -> String {
    let mut acc = query.to_owned();
    for hop in hops.iter().rev() {
        if let Some(login) = hop.impersonation() {
            acc = wrap_impersonation(login, &acc);
        }
        acc = format!("EXEC ('{}') AT [{}]", acc.replace('\'', "''"), hop.hostname());
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(text: &str) -> ServerChain {
        ServerChain::parse(text).unwrap()
    }

    #[test]
    fn empty_chain_is_rejected() {
        let err = build_query_chain(&ServerChain::new(), "SELECT 1", TraversalMode::ReadOnlyOpenQuery)
            .unwrap_err();
        assert!(matches!(err, ChainError::EmptyChain));
    }

    #[test]
    fn openquery_single_hop() {
        let sql = build_query_chain(&chain("SQL02"), "SELECT 'x'", TraversalMode::ReadOnlyOpenQuery)
            .unwrap();
        assert_eq!(sql, "SELECT * FROM OPENQUERY([SQL02], 'SELECT ''x''')");
    }

    #[test]
    fn openquery_two_hops_golden() {
        // The worked example: SQL02,SQL03:svcacct with SELECT 1.
        let sql = build_query_chain(
            &chain("SQL02,SQL03:svcacct"),
            "SELECT 1",
            TraversalMode::ReadOnlyOpenQuery,
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM OPENQUERY([SQL02], 'SELECT * FROM OPENQUERY([SQL03], \
             ''EXECUTE AS LOGIN = ''''svcacct''''; SELECT 1; REVERT;'')')"
        );
    }

    #[test]
    fn openquery_three_hops_delimiters() {
        let sql = build_query_chain(&chain("A,B,C"), "SELECT 1", TraversalMode::ReadOnlyOpenQuery)
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM OPENQUERY([A], 'SELECT * FROM OPENQUERY([B], \
             ''SELECT * FROM OPENQUERY([C], ''''SELECT 1'''')'')')"
        );
    }

    #[test]
    fn openquery_escalates_inner_literal_to_two_pow_n() {
        // A query containing one literal quote pair: the run around the `x`
        // must be 2^N quotes for N hops.
        for (text, n) in [("A", 1u32), ("A,B", 2), ("A,B,C", 3)] {
            let sql = build_query_chain(&chain(text), "SELECT 'x'", TraversalMode::ReadOnlyOpenQuery)
                .unwrap();
            let run = "'".repeat(1usize << n);
            assert!(
                sql.contains(&format!("{run}x{run}")),
                "expected a 2^{n} quote run in {sql}"
            );
            assert!(!sql.contains(&format!("'{run}x")), "run too long in {sql}");
        }
    }

    #[test]
    fn openquery_intermediate_impersonation_placement() {
        let sql = build_query_chain(&chain("A:alice,B"), "SELECT 1", TraversalMode::ReadOnlyOpenQuery)
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM OPENQUERY([A], 'EXECUTE AS LOGIN = ''alice''; \
             SELECT * FROM OPENQUERY([B], ''SELECT 1''); REVERT;')"
        );
    }

    #[test]
    fn no_synthetic_server_reference_ever_appears() {
        for text in ["A", "A,B", "A:x,B,C:y", "A,B,C,D"] {
            for mode in [TraversalMode::ReadOnlyOpenQuery, TraversalMode::RemoteProcedureCall] {
                let sql = build_query_chain(&chain(text), "SELECT 1", mode).unwrap();
                assert!(!sql.contains("[0]"), "synthetic hop leaked into {sql}");
            }
        }
    }

    #[test]
    fn exec_at_two_hops_flat_doubling() {
        let sql = build_query_chain(&chain("A,B"), "SELECT 'x'", TraversalMode::RemoteProcedureCall)
            .unwrap();
        assert_eq!(sql, "EXEC ('EXEC (''SELECT ''''x'''''') AT [B]') AT [A]");
    }

    #[test]
    fn exec_at_impersonation_wraps_its_own_hop_only() {
        // alice wraps the whole forward query at A; carol wraps only C's
        // portion, nested inside the [A] and [B] layers.
        let sql = build_query_chain(
            &chain("A:alice,B,C:carol"),
            "SELECT 1",
            TraversalMode::RemoteProcedureCall,
        )
        .unwrap();
        assert_eq!(
            sql,
            "EXEC ('EXECUTE AS LOGIN = ''alice''; EXEC (''EXEC (''''EXECUTE AS LOGIN = \
             ''''''''carol''''''''; SELECT 1; REVERT;'''') AT [C]'') AT [B]; REVERT;') AT [A]"
        );
    }

    #[test]
    fn impersonation_wrapper_strips_trailing_semicolon() {
        assert_eq!(
            wrap_impersonation("bob", "SELECT 1 ; "),
            "EXECUTE AS LOGIN = 'bob'; SELECT 1; REVERT;"
        );
    }
}
